//! Configuration management for Cellar.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

use crate::error::{CoreError, Result};
use crate::types::Price;

/// Environment variable holding the pass-phrase the file key is derived from.
pub const FILE_PASSWORD_ENV: &str = "CELLAR_FILE_PASSWORD";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub storage: StorageConfig,
    pub server: ServerConfig,
    pub market: MarketConfig,
}

/// On-disk layout. Every name except `data_dir` is relative to `data_dir`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StorageConfig {
    pub data_dir: PathBuf,
    pub ledger_dir: String,
    pub catalog_dir: String,
    pub manifest_file: String,
    pub certificate_dir: String,
    pub credentials_file: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServerConfig {
    pub server_id: String,
    pub key_file: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MarketConfig {
    pub initial_balance: Price,
}

impl Config {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config =
            toml::from_str(&content).map_err(|e| CoreError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    pub fn default_config() -> Self {
        Self {
            storage: StorageConfig {
                data_dir: PathBuf::from("data"),
                ledger_dir: "blockchain".to_string(),
                catalog_dir: "catalog".to_string(),
                manifest_file: "catalog/HMAC.manifest".to_string(),
                certificate_dir: "certs".to_string(),
                credentials_file: "catalog/users.creds".to_string(),
            },
            server: ServerConfig {
                server_id: "cellar-server".to_string(),
                key_file: "keys/server.key".to_string(),
            },
            market: MarketConfig {
                initial_balance: Price::from_cents(20_000),
            },
        }
    }

    /// Rejects empty names and paths escaping the data directory.
    pub fn validate(&self) -> Result<()> {
        let names = [
            ("storage.ledger_dir", &self.storage.ledger_dir),
            ("storage.catalog_dir", &self.storage.catalog_dir),
            ("storage.manifest_file", &self.storage.manifest_file),
            ("storage.certificate_dir", &self.storage.certificate_dir),
            ("storage.credentials_file", &self.storage.credentials_file),
            ("server.key_file", &self.server.key_file),
        ];
        for (field, value) in names {
            if value.trim().is_empty() {
                return Err(CoreError::Config(format!("{} must not be empty", field)));
            }
            let path = Path::new(value.as_str());
            if path.is_absolute() || value.split(['/', '\\']).any(|part| part == "..") {
                return Err(CoreError::Config(format!(
                    "{} must be relative to storage.data_dir: {}",
                    field, value
                )));
            }
        }
        if self.server.server_id.trim().is_empty() {
            return Err(CoreError::Config("server.server_id must not be empty".to_string()));
        }
        Ok(())
    }

    /// Returns a copy of this configuration rooted at another data directory.
    pub fn with_data_dir(mut self, data_dir: impl Into<PathBuf>) -> Self {
        self.storage.data_dir = data_dir.into();
        self
    }

    pub fn ledger_dir(&self) -> PathBuf {
        self.storage.data_dir.join(&self.storage.ledger_dir)
    }

    pub fn catalog_dir(&self) -> PathBuf {
        self.storage.data_dir.join(&self.storage.catalog_dir)
    }

    pub fn manifest_path(&self) -> PathBuf {
        self.storage.data_dir.join(&self.storage.manifest_file)
    }

    pub fn certificate_dir(&self) -> PathBuf {
        self.storage.data_dir.join(&self.storage.certificate_dir)
    }

    pub fn credentials_path(&self) -> PathBuf {
        self.storage.data_dir.join(&self.storage.credentials_file)
    }

    pub fn server_key_path(&self) -> PathBuf {
        self.storage.data_dir.join(&self.server.key_file)
    }
}

impl Default for Config {
    fn default() -> Self {
        Self::default_config()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default_config();
        assert!(config.validate().is_ok());
        assert_eq!(config.market.initial_balance.to_string(), "200.00");
        assert_eq!(config.ledger_dir(), PathBuf::from("data/blockchain"));
    }

    #[test]
    fn test_parse_toml() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("cellar.toml");
        std::fs::write(
            &path,
            r#"
[storage]
data_dir = "/var/lib/cellar"
ledger_dir = "chain"
catalog_dir = "catalog"
manifest_file = "catalog/HMAC.manifest"
certificate_dir = "certs"
credentials_file = "catalog/users.creds"

[server]
server_id = "cellar-eu-1"
key_file = "keys/server.key"

[market]
initial_balance = "150.50"
"#,
        )
        .unwrap();

        let config = Config::from_file(&path).unwrap();
        assert_eq!(config.server.server_id, "cellar-eu-1");
        assert_eq!(config.market.initial_balance, Price::from_cents(15_050));
        assert_eq!(config.ledger_dir(), PathBuf::from("/var/lib/cellar/chain"));
    }

    #[test]
    fn test_rejects_escaping_paths() {
        let mut config = Config::default_config();
        config.storage.ledger_dir = "../elsewhere".to_string();
        assert!(matches!(config.validate(), Err(CoreError::Config(_))));

        let mut config = Config::default_config();
        config.server.key_file = String::new();
        assert!(config.validate().is_err());
    }
}
