use crate::error::WalletError;
use serde_json::Value;
use std::fs;
use std::path::{Path, PathBuf};
use tracing::{info, warn};

/// Keys read from a key file, split into usable and rejected entries.
/// Positions refer to the entry's place in the file (0-based).
#[derive(Debug, Default)]
pub struct LoadedKeys {
    pub keys: Vec<(usize, String)>,
    pub rejected: Vec<(usize, WalletError)>,
}

impl LoadedKeys {
    pub fn count(&self) -> usize {
        self.keys.len()
    }
}

/// Loads raw private keys from `wallet.json` (JSON array of strings) or a
/// plain-text file with one key per line.
pub struct WalletManager;

impl WalletManager {
    pub const WALLET_FILE: &'static str = "wallet.json";
    const PV_FILE: &'static str = "pv.txt";

    /// Picks the explicit path if given, otherwise the first existing default
    /// in the current dir or the workspace root (../../).
    pub fn resolve_path(explicit: Option<&str>) -> PathBuf {
        if let Some(path) = explicit {
            return PathBuf::from(path);
        }

        let candidates = [
            PathBuf::from(Self::WALLET_FILE),
            PathBuf::from("../..").join(Self::WALLET_FILE),
            PathBuf::from(Self::PV_FILE),
        ];

        candidates
            .iter()
            .find(|p| p.is_file())
            .cloned()
            .unwrap_or_else(|| PathBuf::from(Self::WALLET_FILE))
    }

    /// Reads and normalizes every key. Failing to read the file at all is an
    /// error; malformed entries are reported and skipped.
    pub fn load(path: &Path) -> Result<LoadedKeys, WalletError> {
        if !path.exists() {
            return Err(WalletError::FileNotFound {
                path: path.display().to_string(),
            });
        }

        let content = fs::read_to_string(path).map_err(|e| WalletError::Unreadable {
            path: path.display().to_string(),
            reason: e.to_string(),
        })?;

        let is_json = path.extension().is_some_and(|ext| ext == "json");
        let loaded = Self::parse(&content, is_json).map_err(|e| match e {
            WalletError::Unreadable { reason, .. } => WalletError::Unreadable {
                path: path.display().to_string(),
                reason,
            },
            other => other,
        })?;

        for (idx, err) in &loaded.rejected {
            warn!(target: "batch", "  [{}] Skipping key: {}", idx + 1, err);
        }
        info!(
            target: "batch",
            "Loaded {} keys from {:?} ({} rejected)",
            loaded.keys.len(),
            path,
            loaded.rejected.len()
        );

        Ok(loaded)
    }

    pub fn parse(content: &str, is_json: bool) -> Result<LoadedKeys, WalletError> {
        let entries: Vec<Option<String>> = if is_json {
            let json: Value = serde_json::from_str(content).map_err(|e| WalletError::Unreadable {
                path: String::new(),
                reason: e.to_string(),
            })?;
            let items = json.as_array().ok_or_else(|| WalletError::Unreadable {
                path: String::new(),
                reason: "expected a JSON array of private keys".to_string(),
            })?;
            items.iter().map(|v| v.as_str().map(str::to_string)).collect()
        } else {
            content
                .lines()
                .map(str::trim)
                .filter(|l| !l.is_empty() && !l.starts_with('#'))
                .map(|l| Some(l.to_string()))
                .collect()
        };

        let mut loaded = LoadedKeys::default();
        for (idx, entry) in entries.into_iter().enumerate() {
            let normalized = entry
                .ok_or(WalletError::InvalidKeyFormat)
                .and_then(|raw| Self::normalize_key(&raw));
            match normalized {
                Ok(key) => loaded.keys.push((idx, key)),
                Err(e) => loaded.rejected.push((idx, e)),
            }
        }
        Ok(loaded)
    }

    /// Canonical form: trimmed, lowercase hex, `0x`-prefixed, 32 bytes.
    pub fn normalize_key(raw: &str) -> Result<String, WalletError> {
        let trimmed = raw.trim();
        let body = trimmed
            .strip_prefix("0x")
            .or_else(|| trimmed.strip_prefix("0X"))
            .unwrap_or(trimmed);

        if body.is_empty() || !body.chars().all(|c| c.is_ascii_hexdigit()) {
            return Err(WalletError::InvalidKeyFormat);
        }
        if body.len() != 64 {
            return Err(WalletError::InvalidKeyLength { length: body.len() });
        }

        hex::decode(body).map_err(|_| WalletError::InvalidKeyFormat)?;
        Ok(format!("0x{}", body.to_lowercase()))
    }
}
