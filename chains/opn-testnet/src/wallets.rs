use anyhow::{bail, Context, Result};
use core_logic::{Entity, LoadedKeys, WalletError};
use ethers::prelude::*;
use ethers::utils::{format_ether, hex, to_checksum};
use serde::Serialize;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Derives the checksummed address for a normalized key.
pub fn derive_address(private_key: &str) -> Result<String, WalletError> {
    let wallet = private_key
        .parse::<LocalWallet>()
        .map_err(|e| WalletError::DerivationFailed {
            reason: e.to_string(),
        })?;
    Ok(to_checksum(&wallet.address(), None))
}

/// Turns loaded keys into entities, skipping keys that do not form a valid
/// secp256k1 secret. Entities are numbered by their position in the result.
pub fn into_entities(loaded: &LoadedKeys) -> Vec<Entity> {
    let mut accounts = Vec::with_capacity(loaded.keys.len());

    for (file_idx, key) in &loaded.keys {
        match derive_address(key) {
            Ok(address) => {
                info!(target: "batch", "  [{}] {}", file_idx + 1, address);
                accounts.push((address, key.clone()));
            }
            Err(e) => warn!(target: "batch", "  [{}] Failed to load wallet: {}", file_idx + 1, e),
        }
    }

    accounts
        .into_iter()
        .enumerate()
        .map(|(i, (address, key))| Entity::new(i, address, key))
        .collect()
}

/// Looks up each account's native balance. Accounts whose balance cannot be
/// read are dropped, like any other unloadable input.
pub async fn with_balances<M: Middleware>(provider: &M, entities: Vec<Entity>, symbol: &str) -> Vec<Entity> {
    let mut loaded = Vec::with_capacity(entities.len());

    for entity in &entities {
        let address = match entity.address().parse::<Address>() {
            Ok(a) => a,
            Err(e) => {
                warn!(target: "batch", "  [{}] Invalid address {}: {}", entity.index() + 1, entity.address(), e);
                continue;
            }
        };

        match provider.get_balance(address, None).await {
            Ok(wei) => {
                let balance: f64 = format_ether(wei).parse().unwrap_or(0.0);
                info!(
                    target: "batch",
                    "  [{}] {} (balance: {:.6} {})",
                    entity.index() + 1,
                    entity.address(),
                    balance,
                    symbol
                );
                loaded.push((entity.address().to_string(), entity.private_key().to_string(), balance));
            }
            Err(e) => warn!(
                target: "batch",
                "  [{}] Failed to load balance for {}: {}",
                entity.index() + 1,
                entity.address(),
                e
            ),
        }
    }

    loaded
        .into_iter()
        .enumerate()
        .map(|(i, (address, key, balance))| Entity::new(i, address, key).with_balance(balance))
        .collect()
}

#[derive(Debug, Clone, Serialize)]
pub struct GeneratedWallet {
    pub index: usize,
    pub address: String,
    pub private_key: String,
}

pub fn generate(count: usize) -> Vec<GeneratedWallet> {
    let mut rng = rand::thread_rng();
    (0..count)
        .map(|i| {
            let wallet = LocalWallet::new(&mut rng);
            GeneratedWallet {
                index: i + 1,
                address: to_checksum(&wallet.address(), None),
                private_key: format!("0x{}", hex::encode(wallet.signer().to_bytes())),
            }
        })
        .collect()
}

/// Writes `<name>.json` (array of keys) and `<name>_detail.json`
/// (index, address, key). Returns the detail file path.
pub fn write_generated(path: &Path, wallets: &[GeneratedWallet], force: bool) -> Result<PathBuf> {
    if path.exists() && !force {
        bail!("{} already exists (use --force to overwrite)", path.display());
    }

    let keys: Vec<&str> = wallets.iter().map(|w| w.private_key.as_str()).collect();
    std::fs::write(path, serde_json::to_string_pretty(&keys)?)
        .with_context(|| format!("Failed to write {}", path.display()))?;

    let stem = path
        .file_stem()
        .and_then(|s| s.to_str())
        .unwrap_or("wallet");
    let detail_path = path.with_file_name(format!("{}_detail.json", stem));
    std::fs::write(&detail_path, serde_json::to_string_pretty(wallets)?)
        .with_context(|| format!("Failed to write {}", detail_path.display()))?;

    Ok(detail_path)
}

#[cfg(test)]
mod tests {
    use super::*;
    use core_logic::WalletManager;

    const KEY: &str = "0x4c0883a69102937d6231471b5dbb6204fe5129617082792ae468d01a3f362318";
    const ADDRESS: &str = "0x2c7536E3605D9C16a7a3D7b1898e529396a65c23";

    #[test]
    fn test_derive_known_address() {
        let address = derive_address(KEY).unwrap();
        assert_eq!(address.to_lowercase(), ADDRESS.to_lowercase());
    }

    #[test]
    fn test_zero_key_is_rejected() {
        let zero = format!("0x{}", "0".repeat(64));
        assert!(derive_address(&zero).is_err());
    }

    #[test]
    fn test_into_entities_reindexes() {
        let content = format!(r#"["{}", "0x{}", "{}"]"#, KEY, "0".repeat(64), KEY);
        let loaded = WalletManager::parse(&content, true).unwrap();
        let entities = into_entities(&loaded);

        assert_eq!(entities.len(), 2);
        assert_eq!(entities[0].index(), 0);
        assert_eq!(entities[1].index(), 1);
        assert_eq!(entities[1].private_key(), KEY);
    }

    #[test]
    fn test_generate_and_write() {
        let wallets = generate(3);
        assert_eq!(wallets.len(), 3);
        for w in &wallets {
            assert_eq!(derive_address(&w.private_key).unwrap(), w.address);
        }

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("wallet.json");
        let detail = write_generated(&path, &wallets, false).unwrap();
        assert!(detail.ends_with("wallet_detail.json"));

        let loaded = WalletManager::load(&path).unwrap();
        assert_eq!(loaded.count(), 3);

        assert!(write_generated(&path, &wallets, false).is_err());
        assert!(write_generated(&path, &wallets, true).is_ok());
    }
}
