use crate::config::OpnConfig;
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use core_logic::{Entity, Operation, Outcome};
use ethers::prelude::*;
use ethers::types::transaction::eip2718::TypedTransaction;
use serde_json::{Map, Value};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Sends the claim call to the reward contract from each account.
pub struct ClaimOperation {
    provider: Provider<Http>,
    network_name: String,
    chain_id: u64,
    explorer_url: String,
    contract: Address,
    calldata: Bytes,
    gas_limit: U256,
    gas_buffer_percent: u64,
    receipt_timeout: Duration,
    min_balance: f64,
    terminal_markers: Vec<String>,
}

impl ClaimOperation {
    pub fn new(config: &OpnConfig, provider: Provider<Http>) -> Result<Self> {
        let claim = &config.claim;
        let contract = claim
            .contract_address
            .parse::<Address>()
            .with_context(|| format!("Invalid contract address {}", claim.contract_address))?;
        let calldata = claim
            .claim_data
            .parse::<Bytes>()
            .with_context(|| format!("Invalid claim data {}", claim.claim_data))?;

        Ok(Self {
            provider,
            network_name: config.network_name.clone(),
            chain_id: config.chain_id,
            explorer_url: config.explorer_url.trim_end_matches('/').to_string(),
            contract,
            calldata,
            gas_limit: U256::from(claim.gas_limit),
            gas_buffer_percent: claim.gas_buffer_percent,
            receipt_timeout: Duration::from_secs(claim.receipt_timeout_secs),
            min_balance: claim.min_balance,
            terminal_markers: claim.terminal_markers.clone(),
        })
    }

    fn classify(&self, error: &anyhow::Error) -> Outcome {
        let markers: Vec<&str> = self.terminal_markers.iter().map(String::as_str).collect();
        Outcome::from_error(error, &markers)
    }

    fn tx_link(&self, tx_hash: &str) -> String {
        format!("{}/tx/{}", self.explorer_url, tx_hash)
    }

    async fn build_transaction(&self, from: Address) -> Result<TransactionRequest, Outcome> {
        let nonce = self
            .provider
            .get_transaction_count(from, None)
            .await
            .map_err(|e| self.classify(&anyhow!(e).context("Failed to fetch nonce")))?;
        let gas_price = self
            .provider
            .get_gas_price()
            .await
            .map_err(|e| self.classify(&anyhow!(e).context("Failed to fetch gas price")))?;

        let tx = TransactionRequest::new()
            .from(from)
            .to(self.contract)
            .value(0u64)
            .data(self.calldata.clone())
            .gas(self.gas_limit)
            .gas_price(gas_price)
            .nonce(nonce)
            .chain_id(self.chain_id);

        let typed: TypedTransaction = tx.clone().into();
        match self.provider.estimate_gas(&typed, None).await {
            Ok(estimate) => {
                let gas = buffered_gas(estimate, self.gas_buffer_percent);
                debug!("Gas estimate {} -> limit {}", estimate, gas);
                Ok(tx.gas(gas))
            }
            Err(e) => {
                // Estimation reverts carry the contract reason, e.g. "already claimed".
                let outcome = self.classify(&anyhow!(e));
                if outcome.is_terminal() {
                    return Err(outcome);
                }
                warn!(
                    "Gas estimation failed, using default {}: {}",
                    self.gas_limit,
                    outcome.detail().reason.as_deref().unwrap_or_default()
                );
                Ok(tx)
            }
        }
    }
}

/// `estimate * (100 + buffer) / 100`
pub fn buffered_gas(estimate: U256, buffer_percent: u64) -> U256 {
    estimate * U256::from(100 + buffer_percent) / U256::from(100u64)
}

/// Only an explicit status of 1 counts as a successful claim. A mined revert
/// is retried and ends as `failed`; "already claimed" is caught earlier, when
/// gas estimation reverts with the contract's reason.
pub fn classify_receipt(status: Option<U64>) -> Outcome {
    match status {
        Some(s) if s == U64::from(1) => Outcome::success(),
        Some(_) => Outcome::retryable("transaction reverted on chain (status 0)"),
        None => Outcome::retryable("receipt has no status"),
    }
}

#[async_trait]
impl Operation for ClaimOperation {
    fn name(&self) -> &str {
        "claim"
    }

    fn is_eligible(&self, entity: &Entity) -> bool {
        entity.balance().map_or(true, |b| b >= self.min_balance)
    }

    fn metadata(&self) -> Map<String, Value> {
        let mut meta = Map::new();
        meta.insert("network".to_string(), Value::from(self.network_name.clone()));
        meta.insert("chain_id".to_string(), Value::from(self.chain_id));
        meta.insert(
            "contract".to_string(),
            Value::from(format!("{:?}", self.contract)),
        );
        meta
    }

    async fn attempt(&self, entity: &Entity, attempt: u32) -> Outcome {
        let wallet = match entity.private_key().parse::<LocalWallet>() {
            Ok(w) => w.with_chain_id(self.chain_id),
            // Normally rejected at load time.
            Err(e) => return Outcome::retryable(format!("invalid private key: {}", e)),
        };

        let tx = match self.build_transaction(wallet.address()).await {
            Ok(tx) => tx,
            Err(outcome) => return outcome,
        };

        let client = SignerMiddleware::new(self.provider.clone(), wallet);
        let pending = match client.send_transaction(tx, None).await {
            Ok(p) => p,
            Err(e) => return self.classify(&anyhow!(e).context("Failed to send transaction")),
        };

        let tx_hash = format!("{:?}", *pending);
        info!(
            "[{}] Claim tx sent (attempt {}): {}",
            entity.index() + 1,
            attempt,
            tx_hash
        );

        let outcome = match tokio::time::timeout(self.receipt_timeout, pending).await {
            Err(_) => Outcome::retryable(format!(
                "no receipt after {}s",
                self.receipt_timeout.as_secs()
            )),
            Ok(Err(e)) => self.classify(&anyhow!(e).context("Failed to get transaction receipt")),
            Ok(Ok(None)) => Outcome::retryable("transaction dropped from mempool"),
            Ok(Ok(Some(receipt))) => classify_receipt(receipt.status),
        };

        outcome
            .with_token(tx_hash.clone())
            .with_field("explorer_url", self.tx_link(&tx_hash))
            .with_field("tx_hash", tx_hash)
    }
}
