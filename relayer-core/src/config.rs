//! Service configuration (spec.md §6.2).

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Per-chain connection and contract settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChainConfig {
    pub rpc_url: String,
    pub submission_key: String,
    pub htlc_address: String,
    pub bridge_address: String,
}

/// Top-level service configuration, enumerated in spec.md §6.2.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ServiceConfig {
    pub chain_a: ChainConfig,
    pub chain_b: ChainConfig,

    /// `K`, confirmation depth. Default 3.
    #[serde(default = "defaults::confirmation_depth")]
    pub confirmation_depth: u64,

    /// Default 5s.
    #[serde(default = "defaults::polling_interval_secs")]
    pub polling_interval_secs: u64,

    /// `W`, default 100.
    #[serde(default = "defaults::max_blocks_per_query")]
    pub max_blocks_per_query: u64,

    /// Early-refund window, default 3600s.
    #[serde(default = "defaults::order_timeout_buffer_secs")]
    pub order_timeout_buffer_secs: u64,

    /// Default 1000.
    #[serde(default = "defaults::max_pending_orders")]
    pub max_pending_orders: usize,

    #[serde(default = "defaults::min_timelock_secs")]
    pub min_timelock_secs: u64,
    #[serde(default = "defaults::max_timelock_secs")]
    pub max_timelock_secs: u64,
    #[serde(default = "defaults::default_timelock_secs")]
    pub default_timelock_secs: u64,

    #[serde(default = "defaults::retry_attempts")]
    pub retry_attempts: u32,
    #[serde(default = "defaults::retry_base_delay_secs")]
    pub retry_base_delay_secs: u64,

    /// Minimum `timelock_src - timelock_tgt` gap (I2's `Δ`).
    #[serde(default = "defaults::min_timelock_skew_secs")]
    pub min_timelock_skew_secs: u64,

    #[serde(default = "defaults::timeout_sweep_interval_secs")]
    pub timeout_sweep_interval_secs: u64,
    #[serde(default = "defaults::reconciliation_interval_secs")]
    pub reconciliation_interval_secs: u64,
    #[serde(default = "defaults::fee_refresh_interval_secs")]
    pub fee_refresh_interval_secs: u64,
    #[serde(default = "defaults::health_check_interval_secs")]
    pub health_check_interval_secs: u64,

    #[serde(default = "defaults::max_concurrent_submissions")]
    pub max_concurrent_submissions: u32,
}

mod defaults {
    pub fn confirmation_depth() -> u64 {
        3
    }
    pub fn polling_interval_secs() -> u64 {
        5
    }
    pub fn max_blocks_per_query() -> u64 {
        100
    }
    pub fn order_timeout_buffer_secs() -> u64 {
        3600
    }
    pub fn max_pending_orders() -> usize {
        1000
    }
    pub fn min_timelock_secs() -> u64 {
        3600
    }
    pub fn max_timelock_secs() -> u64 {
        7 * 24 * 3600
    }
    pub fn default_timelock_secs() -> u64 {
        24 * 3600
    }
    pub fn retry_attempts() -> u32 {
        3
    }
    pub fn retry_base_delay_secs() -> u64 {
        5
    }
    pub fn min_timelock_skew_secs() -> u64 {
        2 * 3600
    }
    pub fn timeout_sweep_interval_secs() -> u64 {
        60
    }
    pub fn reconciliation_interval_secs() -> u64 {
        5 * 60
    }
    pub fn fee_refresh_interval_secs() -> u64 {
        5 * 60
    }
    pub fn health_check_interval_secs() -> u64 {
        30
    }
    pub fn max_concurrent_submissions() -> u32 {
        16
    }
}

impl ServiceConfig {
    /// Load configuration from a TOML file. Missing required per-chain
    /// fields are a `Fatal` condition (spec.md §7) — the caller should abort
    /// startup on error rather than fall back to a default.
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path_ref = path.as_ref();
        let contents = fs::read_to_string(path_ref).map_err(|source| ConfigError::Read {
            path: path_ref.display().to_string(),
            source,
        })?;
        let config: ServiceConfig =
            toml::from_str(&contents).map_err(|source| ConfigError::Parse {
                path: path_ref.display().to_string(),
                source,
            })?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.chain_a.rpc_url.is_empty() {
            return Err(ConfigError::MissingField("chain_a.rpc_url".into()));
        }
        if self.chain_b.rpc_url.is_empty() {
            return Err(ConfigError::MissingField("chain_b.rpc_url".into()));
        }
        if self.min_timelock_secs >= self.max_timelock_secs {
            return Err(ConfigError::InvalidValue {
                field: "min_timelock_secs/max_timelock_secs".into(),
                reason: "min must be strictly less than max".into(),
            });
        }
        Ok(())
    }

    pub fn polling_interval(&self) -> Duration {
        Duration::from_secs(self.polling_interval_secs)
    }

    pub fn retry_base_delay(&self) -> Duration {
        Duration::from_secs(self.retry_base_delay_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_fill_in_when_omitted() {
        let toml_str = r#"
            [chain_a]
            rpc_url = "http://a.example"
            submission_key = "key-a"
            htlc_address = "0xA"
            bridge_address = "0xAB"

            [chain_b]
            rpc_url = "http://b.example"
            submission_key = "key-b"
            htlc_address = "0xB"
            bridge_address = "0xBB"
        "#;
        let config: ServiceConfig = toml::from_str(toml_str).unwrap();
        assert_eq!(config.confirmation_depth, 3);
        assert_eq!(config.max_blocks_per_query, 100);
        assert_eq!(config.max_pending_orders, 1000);
    }

    #[test]
    fn rejects_inverted_timelock_bounds() {
        let toml_str = r#"
            min_timelock_secs = 100
            max_timelock_secs = 50

            [chain_a]
            rpc_url = "http://a.example"
            submission_key = "key-a"
            htlc_address = "0xA"
            bridge_address = "0xAB"

            [chain_b]
            rpc_url = "http://b.example"
            submission_key = "key-b"
            htlc_address = "0xB"
            bridge_address = "0xBB"
        "#;
        let config: ServiceConfig = toml::from_str(toml_str).unwrap();
        assert!(config.validate().is_err());
    }
}
