//! Runtime Configuration
//!
//! All tunables for the cross-chain deployment engine, loadable from
//! environment variables (with a .env file) or a TOML file. Environment
//! wins for secrets; TOML is handy for the numeric knobs.

use eyre::Result;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::Path;

use crate::discovery::DiscoveryConfig;
use crate::engine::EngineConfig;

// ============================================
// MAIN CONFIGURATION
// ============================================

/// Top-level configuration for the deployment engine
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    // ========== Network Settings ==========
    /// Source chain RPC URL
    pub rpc_url: String,

    /// Source chain ID (8453 = Base)
    pub chain_id: u64,

    // ========== External Services ==========
    /// Base URL of the yield/route aggregation API
    pub yield_api_url: String,

    /// Optional backend endpoint for transaction history records
    pub recorder_url: Option<String>,

    /// Deployer private key (KEEP SECRET - env only, never written to disk)
    pub private_key: Option<String>,

    // ========== Discovery Settings ==========
    /// Pause between per-chain yield queries (rate limiting)
    pub discovery_delay_ms: u64,

    /// Minimum pool TVL in USD for a protocol to be listed
    pub min_tvl_usd: f64,

    /// How long discovered protocol lists stay cached
    pub discovery_cache_ttl_secs: u64,

    // ========== Execution Settings ==========
    /// Gas limit forwarded for the destination-side deployment call
    pub dest_gas_limit: u64,

    /// Gas limit for the source chain executor transaction
    pub source_tx_gas_limit: u64,

    /// Slippage tolerance for destination routes, in basis points
    pub slippage_bps: u32,

    /// Reject prepared payloads older than this before the final send
    pub max_payload_age_secs: u64,
}

impl Config {
    /// Load configuration from environment variables and .env file
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();

        Ok(Self {
            // Network
            rpc_url: env::var("RPC_URL")
                .unwrap_or_else(|_| "https://mainnet.base.org".to_string()),
            chain_id: env::var("CHAIN_ID")
                .unwrap_or_else(|_| "8453".to_string())
                .parse()
                .unwrap_or(8453),

            // External services
            yield_api_url: env::var("YIELD_API_URL")
                .unwrap_or_else(|_| "https://api.enso.finance".to_string()),
            recorder_url: env::var("RECORDER_URL").ok(),
            private_key: env::var("DEPLOYER_PRIVATE_KEY").ok(),

            // Discovery
            discovery_delay_ms: env::var("DISCOVERY_DELAY_MS")
                .unwrap_or_else(|_| "1000".to_string())
                .parse()
                .unwrap_or(1000),
            min_tvl_usd: env::var("MIN_TVL_USD")
                .unwrap_or_else(|_| "1000000.0".to_string())
                .parse()
                .unwrap_or(1_000_000.0),
            discovery_cache_ttl_secs: env::var("DISCOVERY_CACHE_TTL_SECS")
                .unwrap_or_else(|_| "120".to_string())
                .parse()
                .unwrap_or(120),

            // Execution
            dest_gas_limit: env::var("DEST_GAS_LIMIT")
                .unwrap_or_else(|_| "400000".to_string())
                .parse()
                .unwrap_or(400_000),
            source_tx_gas_limit: env::var("SOURCE_TX_GAS_LIMIT")
                .unwrap_or_else(|_| "600000".to_string())
                .parse()
                .unwrap_or(600_000),
            slippage_bps: env::var("SLIPPAGE_BPS")
                .unwrap_or_else(|_| "100".to_string())
                .parse()
                .unwrap_or(100),
            max_payload_age_secs: env::var("MAX_PAYLOAD_AGE_SECS")
                .unwrap_or_else(|_| "120".to_string())
                .parse()
                .unwrap_or(120),
        })
    }

    /// Load configuration from a TOML file (secrets still come from env)
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let mut config: Self = toml::from_str(&content)?;
        if config.private_key.is_none() {
            dotenvy::dotenv().ok();
            config.private_key = env::var("DEPLOYER_PRIVATE_KEY").ok();
        }
        Ok(config)
    }

    /// Save configuration to a TOML file, with the key redacted
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let mut redacted = self.clone();
        redacted.private_key = None;
        let content = toml::to_string_pretty(&redacted)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Validate configuration before running a deployment
    pub fn validate(&self) -> Result<()> {
        if self.rpc_url.is_empty() || self.rpc_url.contains("YOUR_API_KEY") {
            return Err(eyre::eyre!(
                "Invalid RPC_URL - please set a valid RPC endpoint"
            ));
        }
        if self.yield_api_url.is_empty() {
            return Err(eyre::eyre!("YIELD_API_URL must be set"));
        }
        if self.slippage_bps > 1_000 {
            return Err(eyre::eyre!(
                "SLIPPAGE_BPS > 1000 (10%) is almost certainly a mistake (currently {})",
                self.slippage_bps
            ));
        }
        if self.max_payload_age_secs == 0 {
            return Err(eyre::eyre!(
                "MAX_PAYLOAD_AGE_SECS must be > 0 or every payload is stale on arrival"
            ));
        }
        Ok(())
    }

    /// Engine tunables derived from this config
    pub fn engine_config(&self) -> EngineConfig {
        EngineConfig {
            dest_gas_limit: self.dest_gas_limit,
            source_tx_gas_limit: self.source_tx_gas_limit,
            slippage_bps: self.slippage_bps,
            max_payload_age_secs: self.max_payload_age_secs,
        }
    }

    /// Discovery tunables derived from this config
    pub fn discovery_config(&self) -> DiscoveryConfig {
        DiscoveryConfig {
            delay_ms: self.discovery_delay_ms,
            min_tvl_usd: self.min_tvl_usd,
            cache_ttl_secs: self.discovery_cache_ttl_secs,
        }
    }

    /// Print configuration summary
    pub fn print_summary(&self) {
        println!("╔════════════════════════════════════════════════════════════╗");
        println!("║              CROSSFLOW - CONFIGURATION                     ║");
        println!("╠════════════════════════════════════════════════════════════╣");
        println!("║ Source Chain ID:   {:^40} ║", self.chain_id);
        println!("╠════════════════════════════════════════════════════════════╣");
        println!("║ DISCOVERY                                                  ║");
        println!("║ • Query Delay:     {:>37} ms ║", self.discovery_delay_ms);
        println!("║ • Min TVL:         ${:<39.0} ║", self.min_tvl_usd);
        println!("║ • Cache TTL:       {:>38} s ║", self.discovery_cache_ttl_secs);
        println!("╠════════════════════════════════════════════════════════════╣");
        println!("║ EXECUTION                                                  ║");
        println!("║ • Dest Gas Limit:  {:^40} ║", self.dest_gas_limit);
        println!("║ • Source Gas Limit:{:^40} ║", self.source_tx_gas_limit);
        println!("║ • Slippage:        {:>36} bps ║", self.slippage_bps);
        println!("║ • Max Payload Age: {:>38} s ║", self.max_payload_age_secs);
        println!("╠════════════════════════════════════════════════════════════╣");
        println!("║ SERVICES                                                   ║");
        println!(
            "║ • Recorder:        {:^40} ║",
            if self.recorder_url.is_some() {
                "✓ Configured"
            } else {
                "✗ Disabled"
            }
        );
        println!(
            "║ • Deployer Key:    {:^40} ║",
            if self.private_key.is_some() {
                "✓ Configured"
            } else {
                "✗ Not Set"
            }
        );
        println!("╚════════════════════════════════════════════════════════════╝");
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            rpc_url: "https://mainnet.base.org".to_string(),
            chain_id: 8453,
            yield_api_url: "https://api.enso.finance".to_string(),
            recorder_url: None,
            private_key: None,
            discovery_delay_ms: 1000,
            min_tvl_usd: 1_000_000.0,
            discovery_cache_ttl_secs: 120,
            dest_gas_limit: 400_000,
            source_tx_gas_limit: 600_000,
            slippage_bps: 100,
            max_payload_age_secs: 120,
        }
    }
}

// ============================================
// TESTS
// ============================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        let config = Config::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.chain_id, 8453);
        assert_eq!(config.slippage_bps, 100);
    }

    #[test]
    fn test_validate_rejects_absurd_slippage() {
        let config = Config {
            slippage_bps: 5_000,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_rejects_zero_payload_age() {
        let config = Config {
            max_payload_age_secs: 0,
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_derived_configs_track_fields() {
        let config = Config {
            discovery_delay_ms: 250,
            dest_gas_limit: 500_000,
            ..Default::default()
        };
        assert_eq!(config.discovery_config().delay_ms, 250);
        assert_eq!(config.engine_config().dest_gas_limit, 500_000);
    }

    #[test]
    fn test_save_redacts_private_key() {
        let config = Config {
            private_key: Some("0xdeadbeef".to_string()),
            ..Default::default()
        };
        let path = std::env::temp_dir().join("crossflow_config_test.toml");
        config.save_to_file(&path).unwrap();
        let raw = fs::read_to_string(&path).unwrap();
        assert!(!raw.contains("deadbeef"));
        fs::remove_file(&path).ok();
    }
}
