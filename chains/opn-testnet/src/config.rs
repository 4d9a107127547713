use anyhow::Result;
use config::{Config, Environment, File};
use core_logic::{BatchConfig, ConfigError};
use serde::Deserialize;

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct OpnConfig {
    pub network_name: String,
    pub rpc_url: String,
    pub chain_id: u64,
    pub explorer_url: String,
    /// Key file; auto-detected (wallet.json, pv.txt) when unset.
    pub wallet_file: Option<String>,
    pub proxy_file: Option<String>,
    pub claim: ClaimSettings,
    pub faucet: FaucetSettings,
}

impl Default for OpnConfig {
    fn default() -> Self {
        Self {
            network_name: "OPN Testnet".to_string(),
            rpc_url: "https://testnet-rpc.iopn.tech".to_string(),
            chain_id: 984,
            explorer_url: "https://testnet.iopn.tech".to_string(),
            wallet_file: None,
            proxy_file: None,
            claim: ClaimSettings::default(),
            faucet: FaucetSettings::default(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct ClaimSettings {
    pub contract_address: String,
    pub claim_data: String,
    /// Used when gas estimation fails.
    pub gas_limit: u64,
    pub gas_buffer_percent: u64,
    pub receipt_timeout_secs: u64,
    pub min_balance: f64,
    /// Error substrings that mean the claim can never succeed for this account.
    pub terminal_markers: Vec<String>,
    pub output: String,
    pub batch: BatchConfig,
}

impl Default for ClaimSettings {
    fn default() -> Self {
        Self {
            contract_address: "0xbc5c49abc5282994bd2c641438391d5e2e730c25".to_string(),
            claim_data: "0x4e71d92d".to_string(),
            gas_limit: 200_000,
            gas_buffer_percent: 20,
            receipt_timeout_secs: 120,
            min_balance: 0.0001,
            terminal_markers: vec!["already claimed".to_string()],
            output: "claim_results.json".to_string(),
            batch: BatchConfig::claim(),
        }
    }
}

#[derive(Debug, Deserialize, Clone)]
#[serde(default)]
pub struct FaucetSettings {
    pub url: String,
    pub referer: String,
    pub site_key: String,
    pub page_title: String,
    pub already_claimed_marker: String,
    pub request_timeout_secs: u64,
    pub captcha_api_url: String,
    pub captcha_timeout_secs: u64,
    /// Credential for the captcha solving service.
    pub user_token: Option<String>,
    pub output: String,
    pub batch: BatchConfig,
}

impl Default for FaucetSettings {
    fn default() -> Self {
        Self {
            url: "https://faucet.iopn.tech/api/faucet/claim".to_string(),
            referer: "https://faucet.iopn.tech/".to_string(),
            site_key: "6Ld1uvorAAAAAKwGWoEHDYIq_yo3dSvshmNQ9ykF".to_string(),
            page_title: "OPN Chain Faucet".to_string(),
            already_claimed_marker: "already claimed".to_string(),
            request_timeout_secs: 30,
            captcha_api_url: "http://api.nocaptcha.io/api/wanda/recaptcha/universal".to_string(),
            captcha_timeout_secs: 120,
            user_token: None,
            output: "faucet_results.json".to_string(),
            batch: BatchConfig::faucet(),
        }
    }
}

impl OpnConfig {
    /// TOML file (optional) overlaid by `OPN_*` env vars, e.g.
    /// `OPN_CLAIM__BATCH__CONCURRENCY=4`, then the legacy variables.
    pub fn load(path: &str) -> Result<Self> {
        let settings = Config::builder()
            .add_source(File::with_name(path).required(false))
            .add_source(
                Environment::with_prefix("OPN")
                    .prefix_separator("_")
                    .separator("__")
                    .try_parsing(true),
            )
            .build()?;

        let mut config: Self = settings.try_deserialize().map_err(|e| anyhow::anyhow!(e))?;
        config.apply_legacy_env(|key| std::env::var(key).ok());
        config.validate()?;
        Ok(config)
    }

    /// `MAX_WORKERS` and `USER_TOKEN` from older `.env` files.
    pub fn apply_legacy_env(&mut self, lookup: impl Fn(&str) -> Option<String>) {
        if let Some(workers) = lookup("MAX_WORKERS").and_then(|v| v.trim().parse::<usize>().ok()) {
            self.claim.batch.concurrency = workers;
        }
        if self.faucet.user_token.is_none() {
            self.faucet.user_token = lookup("USER_TOKEN").filter(|t| !t.trim().is_empty());
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if reqwest::Url::parse(&self.rpc_url).is_err() {
            return Err(ConfigError::InvalidRpcUrl {
                url: self.rpc_url.clone(),
            });
        }
        if reqwest::Url::parse(&self.faucet.url).is_err() {
            return Err(ConfigError::InvalidValue {
                field: "faucet.url".to_string(),
                reason: format!("not a URL: {}", self.faucet.url),
            });
        }
        if self.claim.contract_address.trim().is_empty() {
            return Err(ConfigError::MissingField {
                field: "claim.contract_address".to_string(),
            });
        }
        self.claim.batch.validate()?;
        self.faucet.batch.validate()?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::io::Write;

    #[test]
    fn test_missing_file_uses_defaults() {
        let config = OpnConfig::load("definitely-missing-config.toml").unwrap();
        assert_eq!(config.chain_id, 984);
        assert_eq!(config.claim.claim_data, "0x4e71d92d");
        assert_eq!(config.faucet.batch.concurrency, 5);
    }

    #[test]
    fn test_toml_overrides() {
        let mut file = tempfile::Builder::new().suffix(".toml").tempfile().unwrap();
        writeln!(
            file,
            r#"
rpc_url = "http://127.0.0.1:8545"
chain_id = 31337

[claim]
min_balance = 0.5

[claim.batch]
concurrency = 7

[faucet]
already_claimed_marker = "claimed recently"
"#
        )
        .unwrap();

        let config = OpnConfig::load(file.path().to_str().unwrap()).unwrap();
        assert_eq!(config.rpc_url, "http://127.0.0.1:8545");
        assert_eq!(config.chain_id, 31337);
        assert_eq!(config.claim.min_balance, 0.5);
        assert_eq!(config.claim.batch.concurrency, 7);
        assert_eq!(config.claim.batch.max_attempts, 3);
        assert_eq!(config.claim.gas_limit, 200_000);
        assert_eq!(config.faucet.already_claimed_marker, "claimed recently");
    }

    #[test]
    fn test_legacy_env() {
        let vars: HashMap<&str, &str> = [("MAX_WORKERS", "9"), ("USER_TOKEN", "tok-123")].into();
        let mut config = OpnConfig::default();
        config.apply_legacy_env(|k| vars.get(k).map(|v| v.to_string()));

        assert_eq!(config.claim.batch.concurrency, 9);
        assert_eq!(config.faucet.user_token.as_deref(), Some("tok-123"));
    }

    #[test]
    fn test_legacy_env_keeps_explicit_token() {
        let mut config = OpnConfig::default();
        config.faucet.user_token = Some("from-file".to_string());
        config.apply_legacy_env(|_| Some("from-env".to_string()));
        assert_eq!(config.faucet.user_token.as_deref(), Some("from-file"));
    }

    #[test]
    fn test_validate_rejects_bad_rpc() {
        let config = OpnConfig {
            rpc_url: "not a url".to_string(),
            ..OpnConfig::default()
        };
        assert!(matches!(
            config.validate(),
            Err(ConfigError::InvalidRpcUrl { .. })
        ));
    }
}
