use anyhow::{bail, Result};
use core_logic::{with_retry, NetworkError, RetryPolicy};
use ethers::providers::Middleware;
use tracing::info;

/// Baseline connectivity check before a transaction run. Failing here aborts
/// the whole run; no entity has been touched yet.
pub async fn check_rpc<M: Middleware>(provider: &M, rpc_url: &str, expected_chain_id: u64) -> Result<u64> {
    let policy = RetryPolicy::new(3, 1000);

    let block = with_retry(&policy, "RPC connectivity check", move || async move {
        provider.get_block_number().await.map_err(|e| {
            anyhow::Error::new(NetworkError::ConnectionRefused {
                endpoint: rpc_url.to_string(),
                reason: e.to_string(),
            })
        })
    })
    .await?;

    let chain_id = provider
        .get_chainid()
        .await
        .map_err(|e| NetworkError::InvalidResponse {
            endpoint: rpc_url.to_string(),
            reason: e.to_string(),
        })?;

    if chain_id.as_u64() != expected_chain_id {
        bail!(
            "RPC {} reports chain id {}, expected {}",
            rpc_url,
            chain_id,
            expected_chain_id
        );
    }

    info!(target: "batch", "Connected to {} (chain {}, block {})", rpc_url, chain_id, block);
    Ok(block.as_u64())
}
