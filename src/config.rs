//! Configuration for the swap engine
//!
//! Values come from the environment (with `.env` support) or a TOML file.
//! Everything has a Harmony mainnet default except the aggregator address
//! and the signing key.

use alloy_primitives::Address;
use eyre::Result;
use serde::{Deserialize, Serialize};
use std::env;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

use crate::chain::{TxOverrides, FALLBACK_GAS_LIMIT};
use crate::executor::{AllowanceCache, ExecutorSettings, IntentParams};
use crate::routing::{RoutingParams, MAX_SUPPORTED_HOPS};
use crate::tokens::{fallback_intermediates, WONE};
use crate::whitelist::MAX_FEE_BPS;

/// Most parts the aggregator contract accepts
pub const MAX_PARTS_LIMIT: usize = 10;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    // ========== Network Settings ==========
    pub rpc_url: String,

    /// Harmony mainnet shard 0 = 1666600000
    pub chain_id: u64,

    /// Deployed AggregatorMultiSplit
    pub aggregator_address: Option<String>,

    /// Must match the aggregator's WETH()
    pub wrapped_native_address: String,

    /// Never written back to disk
    #[serde(skip_serializing, default)]
    pub wallet_private_key: Option<String>,

    // ========== Routing Settings ==========
    pub max_parts: usize,
    pub multisplit_auto: bool,
    pub max_hops: usize,

    /// Used when the caller passes none; registry defaults if empty
    pub intermediate_tokens: Vec<String>,

    pub quote_debounce_ms: u64,

    // ========== Execution Settings ==========
    pub slippage_bps: u16,

    /// Assumed contract fee when computing minOut
    pub contract_fee_bps: u16,

    pub deadline_secs: u64,
    pub swap_gas_limit: u64,
    pub gas_price_gwei: Option<f64>,
    pub confirm_timeout_secs: u64,

    // ========== Allowance Cache ==========
    pub allowance_ttl_secs: u64,
    pub max_allowance_ttl_secs: u64,
    pub allowance_cache_size: usize,
}

fn env_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse().ok())
        .unwrap_or(default)
}

fn env_list(key: &str) -> Vec<String> {
    env::var(key)
        .map(|s| {
            s.split(',')
                .map(|item| item.trim().to_string())
                .filter(|item| !item.is_empty())
                .collect()
        })
        .unwrap_or_default()
}

impl Config {
    /// Load configuration from environment variables and .env file
    pub fn from_env() -> Result<Self> {
        dotenvy::dotenv().ok();
        let defaults = Self::default();

        Ok(Self {
            // Network
            rpc_url: env::var("RPC_URL").unwrap_or(defaults.rpc_url),
            chain_id: env_or("CHAIN_ID", defaults.chain_id),
            aggregator_address: env::var("AGGREGATOR_ADDRESS").ok().filter(|s| !s.is_empty()),
            wrapped_native_address: env::var("WRAPPED_NATIVE_ADDRESS")
                .unwrap_or(defaults.wrapped_native_address),
            wallet_private_key: env::var("WALLET_PRIVATE_KEY").ok().filter(|s| !s.is_empty()),

            // Routing
            max_parts: env_or("MAX_PARTS", defaults.max_parts),
            multisplit_auto: env_or("MULTISPLIT_AUTO", defaults.multisplit_auto),
            max_hops: env_or("MAX_HOPS", defaults.max_hops),
            intermediate_tokens: env_list("INTERMEDIATE_TOKENS"),
            quote_debounce_ms: env_or("QUOTE_DEBOUNCE_MS", defaults.quote_debounce_ms),

            // Execution
            slippage_bps: env_or("SLIPPAGE_BPS", defaults.slippage_bps),
            contract_fee_bps: env_or("CONTRACT_FEE_BPS", defaults.contract_fee_bps),
            deadline_secs: env_or("DEADLINE_SECS", defaults.deadline_secs),
            swap_gas_limit: env_or("SWAP_GAS_LIMIT", defaults.swap_gas_limit),
            gas_price_gwei: env::var("GAS_PRICE_GWEI").ok().and_then(|v| v.trim().parse().ok()),
            confirm_timeout_secs: env_or("CONFIRM_TIMEOUT_SECS", defaults.confirm_timeout_secs),

            // Allowance cache
            allowance_ttl_secs: env_or("ALLOWANCE_TTL_SECS", defaults.allowance_ttl_secs),
            max_allowance_ttl_secs: env_or("MAX_ALLOWANCE_TTL_SECS", defaults.max_allowance_ttl_secs),
            allowance_cache_size: env_or("ALLOWANCE_CACHE_SIZE", defaults.allowance_cache_size),
        })
    }

    /// Load configuration from a TOML file
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to a TOML file
    pub fn save_to_file<P: AsRef<Path>>(&self, path: P) -> Result<()> {
        let content = toml::to_string_pretty(self)?;
        fs::write(path, content)?;
        Ok(())
    }

    /// Sanity checks that do not need a node
    pub fn validate(&self) -> Result<()> {
        if self.rpc_url.is_empty() {
            return Err(eyre::eyre!("RPC_URL is empty"));
        }
        if !(1..=MAX_PARTS_LIMIT).contains(&self.max_parts) {
            return Err(eyre::eyre!(
                "MAX_PARTS must be between 1 and {} (currently {})",
                MAX_PARTS_LIMIT,
                self.max_parts
            ));
        }
        if !(1..=MAX_SUPPORTED_HOPS).contains(&self.max_hops) {
            return Err(eyre::eyre!(
                "MAX_HOPS must be between 1 and {} (currently {})",
                MAX_SUPPORTED_HOPS,
                self.max_hops
            ));
        }
        if self.contract_fee_bps > MAX_FEE_BPS {
            return Err(eyre::eyre!("CONTRACT_FEE_BPS above {} is rejected by the contract", MAX_FEE_BPS));
        }
        if u32::from(self.slippage_bps) + u32::from(self.contract_fee_bps) >= 10_000 {
            return Err(eyre::eyre!("SLIPPAGE_BPS + CONTRACT_FEE_BPS leaves no minimum output"));
        }
        if self.deadline_secs == 0 {
            return Err(eyre::eyre!("DEADLINE_SECS must be positive"));
        }
        if self.max_allowance_ttl_secs < self.allowance_ttl_secs {
            return Err(eyre::eyre!("MAX_ALLOWANCE_TTL_SECS is shorter than ALLOWANCE_TTL_SECS"));
        }
        self.wrapped_native()?;
        if let Some(raw) = &self.aggregator_address {
            parse_address("AGGREGATOR_ADDRESS", raw)?;
        }
        for raw in &self.intermediate_tokens {
            parse_address("INTERMEDIATE_TOKENS", raw)?;
        }
        Ok(())
    }

    pub fn wrapped_native(&self) -> Result<Address> {
        parse_address("WRAPPED_NATIVE_ADDRESS", &self.wrapped_native_address)
    }

    /// Required for anything that touches the aggregator
    pub fn aggregator(&self) -> Result<Address> {
        match &self.aggregator_address {
            Some(raw) => parse_address("AGGREGATOR_ADDRESS", raw),
            None => Err(eyre::eyre!("AGGREGATOR_ADDRESS is not set")),
        }
    }

    /// Configured fallback intermediates, or the registry defaults
    pub fn intermediates(&self) -> Vec<Address> {
        let parsed: Vec<Address> = self
            .intermediate_tokens
            .iter()
            .filter_map(|s| Address::from_str(s.trim()).ok())
            .collect();
        if parsed.is_empty() {
            fallback_intermediates()
        } else {
            parsed
        }
    }

    pub fn routing_params(&self) -> Result<RoutingParams> {
        Ok(RoutingParams {
            wrapped_native: self.wrapped_native()?,
            max_hops: self.max_hops,
            max_parts: self.max_parts,
            multisplit_auto: self.multisplit_auto,
        })
    }

    pub fn intent_params(&self) -> IntentParams {
        IntentParams {
            slippage_bps: self.slippage_bps,
            fee_bps: self.contract_fee_bps,
            max_parts: self.max_parts,
            deadline_secs: self.deadline_secs,
        }
    }

    pub fn tx_overrides(&self) -> TxOverrides {
        TxOverrides {
            gas_limit: if self.swap_gas_limit == 0 {
                FALLBACK_GAS_LIMIT
            } else {
                self.swap_gas_limit
            },
            gas_price_wei: self
                .gas_price_gwei
                .filter(|g| *g > 0.0)
                .map(|g| (g * 1e9) as u128),
        }
    }

    pub fn executor_settings(&self) -> Result<ExecutorSettings> {
        Ok(ExecutorSettings {
            wrapped_native: self.wrapped_native()?,
            confirm_timeout: Duration::from_secs(self.confirm_timeout_secs),
        })
    }

    pub fn allowance_cache(&self) -> AllowanceCache {
        AllowanceCache::new(
            Duration::from_secs(self.allowance_ttl_secs),
            Duration::from_secs(self.max_allowance_ttl_secs),
            self.allowance_cache_size,
        )
    }

    pub fn quote_debounce(&self) -> Duration {
        Duration::from_millis(self.quote_debounce_ms)
    }

    /// Print configuration summary
    pub fn print_summary(&self) {
        let set = |present: bool| if present { "✓ Configured" } else { "✗ Not Set" };

        println!("╔════════════════════════════════════════════════════════════╗");
        println!("║              SPLITSWAP - CONFIGURATION                     ║");
        println!("╠════════════════════════════════════════════════════════════╣");
        println!("║ Chain ID:          {:^40} ║", self.chain_id);
        println!("║ Aggregator:        {:^40} ║", set(self.aggregator_address.is_some()));
        println!("║ Wallet Key:        {:^40} ║", set(self.wallet_private_key.is_some()));
        println!("╠════════════════════════════════════════════════════════════╣");
        println!("║ ROUTING                                                    ║");
        println!("║ • Max Hops:        {:^40} ║", self.max_hops);
        println!("║ • Max Parts:       {:^40} ║", self.max_parts);
        println!("║ • Multi-split:     {:^40} ║", if self.multisplit_auto { "auto" } else { "off" });
        println!("║ • Intermediates:   {:^40} ║", self.intermediates().len());
        println!("╠════════════════════════════════════════════════════════════╣");
        println!("║ EXECUTION                                                  ║");
        println!("║ • Slippage:        {:>37.2} % ║", self.slippage_bps as f64 / 100.0);
        println!("║ • Contract Fee:    {:>37.2} % ║", self.contract_fee_bps as f64 / 100.0);
        println!("║ • Deadline:        {:>38} s ║", self.deadline_secs);
        println!("║ • Gas Limit:       {:^40} ║", self.tx_overrides().gas_limit);
        println!("║ • Confirm Timeout: {:>38} s ║", self.confirm_timeout_secs);
        println!("╚════════════════════════════════════════════════════════════╝");
    }
}

fn parse_address(key: &str, raw: &str) -> Result<Address> {
    Address::from_str(raw.trim()).map_err(|e| eyre::eyre!("invalid {} '{}': {}", key, raw, e))
}

impl Default for Config {
    fn default() -> Self {
        Self {
            rpc_url: "https://api.harmony.one".to_string(),
            chain_id: 1_666_600_000,
            aggregator_address: None,
            wrapped_native_address: format!("{:?}", WONE),
            wallet_private_key: None,
            max_parts: 3,
            multisplit_auto: true,
            max_hops: 3,
            intermediate_tokens: vec![],
            quote_debounce_ms: 300,
            slippage_bps: 200,
            contract_fee_bps: 25,
            deadline_secs: 900,
            swap_gas_limit: FALLBACK_GAS_LIMIT,
            gas_price_gwei: None,
            confirm_timeout_secs: 180,
            allowance_ttl_secs: 300,
            max_allowance_ttl_secs: 1800,
            allowance_cache_size: 1000,
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
    fn test_default_config() {
        let config = Config::default();
        config.validate().unwrap();
        assert_eq!(config.wrapped_native().unwrap(), WONE);
        assert!(config.aggregator().is_err());
        assert_eq!(config.intermediates(), fallback_intermediates());

        let params = config.routing_params().unwrap();
        assert_eq!(params.max_parts, 3);
        assert!(params.multisplit_auto);
    }

    #[test]
    fn test_validate_rejects_out_of_range() {
        let mut config = Config::default();
        config.max_parts = 11;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.max_hops = 4;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.slippage_bps = 9_980;
        assert!(config.validate().is_err());

        let mut config = Config::default();
        config.aggregator_address = Some("0x1234".to_string());
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_tx_overrides() {
        let mut config = Config::default();
        assert_eq!(config.tx_overrides(), TxOverrides::default());

        config.swap_gas_limit = 0;
        config.gas_price_gwei = Some(100.0);
        let overrides = config.tx_overrides();
        assert_eq!(overrides.gas_limit, FALLBACK_GAS_LIMIT);
        assert_eq!(overrides.gas_price_wei, Some(100_000_000_000));
    }

    #[test]
    fn test_toml_round_trip_drops_key() {
        let mut config = Config::default();
        config.wallet_private_key = Some("secret".to_string());
        config.aggregator_address = Some(format!("{:?}", Address::repeat_byte(0xa9)));

        let text = toml::to_string_pretty(&config).unwrap();
        assert!(!text.contains("secret"));

        let back: Config = toml::from_str(&text).unwrap();
        assert_eq!(back.aggregator().unwrap(), Address::repeat_byte(0xa9));
        assert!(back.wallet_private_key.is_none());
    }
}
