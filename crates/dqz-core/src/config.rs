use crate::{CoreError, CoreResult, DEFAULT_WELCOME_BALANCE, MAX_BALANCE};
use log::debug;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;

/// Runtime configuration for a DQZ deployment.
/// Economic hard limits (capacity, exchange rate) are compile-time constants
/// and deliberately absent here.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct DqzConfig {
    #[serde(default = "default_data_dir")]
    pub data_dir: String,
    #[serde(default = "default_welcome_balance")]
    pub welcome_balance: u64,
    #[serde(default)]
    pub vip: VipPlan,
    #[serde(default)]
    pub storage: StoragePolicy,
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct VipPlan {
    pub duration_days: u32,
    pub cost: u64,
}

/// How hard the ledger retries a storage failure before giving up.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct StoragePolicy {
    pub retry_attempts: u32,
    /// First backoff delay; doubles on each retry.
    pub retry_base_delay_ms: u64,
}

fn default_data_dir() -> String {
    "dqz_database".to_string()
}

fn default_welcome_balance() -> u64 {
    DEFAULT_WELCOME_BALANCE
}

impl Default for VipPlan {
    fn default() -> Self {
        Self {
            duration_days: 30,
            cost: 500,
        }
    }
}

impl Default for StoragePolicy {
    fn default() -> Self {
        Self {
            retry_attempts: 3,
            retry_base_delay_ms: 50,
        }
    }
}

impl Default for DqzConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            welcome_balance: default_welcome_balance(),
            vip: VipPlan::default(),
            storage: StoragePolicy::default(),
        }
    }
}

impl DqzConfig {
    /// Load config from a TOML file. Missing keys take their defaults.
    pub fn load_from_file(path: &Path) -> CoreResult<Self> {
        let content = fs::read_to_string(path)
            .map_err(|e| CoreError::Config(format!("{}: {}", path.display(), e)))?;
        let config: DqzConfig =
            toml::from_str(&content).map_err(|e| CoreError::Config(e.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// Overlay `DQZ_*` environment variables on top of `self`.
    /// Useful for containerized deployments.
    pub fn apply_env(mut self) -> CoreResult<Self> {
        if let Ok(dir) = std::env::var("DQZ_DATA_DIR") {
            debug!("config override DQZ_DATA_DIR={}", dir);
            self.data_dir = dir;
        }
        if let Some(v) = env_number("DQZ_WELCOME_BALANCE")? {
            self.welcome_balance = v;
        }
        if let Some(v) = env_number("DQZ_VIP_DAYS")? {
            self.vip.duration_days = u32::try_from(v)
                .map_err(|_| CoreError::Config("DQZ_VIP_DAYS out of range".to_string()))?;
        }
        if let Some(v) = env_number("DQZ_VIP_COST")? {
            self.vip.cost = v;
        }
        if let Some(v) = env_number("DQZ_STORAGE_RETRIES")? {
            self.storage.retry_attempts = u32::try_from(v)
                .map_err(|_| CoreError::Config("DQZ_STORAGE_RETRIES out of range".to_string()))?;
        }
        self.validate()?;
        Ok(self)
    }

    /// Save config to a TOML file.
    pub fn save_to_file(&self, path: &Path) -> CoreResult<()> {
        let content =
            toml::to_string_pretty(self).map_err(|e| CoreError::Config(e.to_string()))?;
        fs::write(path, content)
            .map_err(|e| CoreError::Config(format!("{}: {}", path.display(), e)))?;
        Ok(())
    }

    pub fn validate(&self) -> CoreResult<()> {
        if self.data_dir.is_empty() {
            return Err(CoreError::Config("data_dir cannot be empty".to_string()));
        }
        if self.welcome_balance > MAX_BALANCE {
            return Err(CoreError::Config(format!(
                "welcome_balance {} exceeds wallet capacity {}",
                self.welcome_balance, MAX_BALANCE
            )));
        }
        if self.vip.duration_days == 0 {
            return Err(CoreError::Config(
                "vip.duration_days must be at least 1".to_string(),
            ));
        }
        if self.storage.retry_attempts == 0 {
            return Err(CoreError::Config(
                "storage.retry_attempts must be at least 1".to_string(),
            ));
        }
        Ok(())
    }
}

fn env_number(key: &str) -> CoreResult<Option<u64>> {
    match std::env::var(key) {
        Ok(raw) => {
            let value = raw
                .parse()
                .map_err(|e| CoreError::Config(format!("{}={}: {}", key, raw, e)))?;
            debug!("config override {}={}", key, value);
            Ok(Some(value))
        }
        Err(_) => Ok(None),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_is_valid() {
        assert!(DqzConfig::default().validate().is_ok());
    }

    #[test]
    fn test_partial_file_takes_defaults() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dqz.toml");
        fs::write(&path, "welcome_balance = 250\n[vip]\nduration_days = 7\ncost = 90\n").unwrap();

        let config = DqzConfig::load_from_file(&path).unwrap();
        assert_eq!(config.welcome_balance, 250);
        assert_eq!(config.vip.duration_days, 7);
        assert_eq!(config.vip.cost, 90);
        assert_eq!(config.storage, StoragePolicy::default());
        assert_eq!(config.data_dir, "dqz_database");
    }

    #[test]
    fn test_save_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("dqz.toml");
        let mut config = DqzConfig::default();
        config.data_dir = "/var/lib/dqz".to_string();
        config.save_to_file(&path).unwrap();
        assert_eq!(DqzConfig::load_from_file(&path).unwrap(), config);
    }

    #[test]
    fn test_env_overrides() {
        // Only test in this crate touching DQZ_* variables.
        std::env::set_var("DQZ_VIP_COST", "250");
        std::env::set_var("DQZ_STORAGE_RETRIES", "5");
        let config = DqzConfig::default().apply_env().unwrap();
        assert_eq!(config.vip.cost, 250);
        assert_eq!(config.storage.retry_attempts, 5);

        std::env::set_var("DQZ_VIP_COST", "lots");
        assert!(matches!(
            DqzConfig::default().apply_env(),
            Err(CoreError::Config(_))
        ));
        std::env::remove_var("DQZ_VIP_COST");
        std::env::remove_var("DQZ_STORAGE_RETRIES");
    }

    #[test]
    fn test_rejects_welcome_above_capacity() {
        let config = DqzConfig {
            welcome_balance: MAX_BALANCE + 1,
            ..DqzConfig::default()
        };
        assert!(matches!(config.validate(), Err(CoreError::Config(_))));
    }
}
