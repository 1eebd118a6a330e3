//! Configuration management for the Nexus bridge
//!
//! Loads configuration from TOML files with environment variable substitution.

use anyhow::{Context, Result};
use lazy_static::lazy_static;
use regex::Regex;
use serde::Deserialize;
use std::collections::HashMap;
use std::env;
use std::path::PathBuf;
use std::time::Duration;

lazy_static! {
    static ref ENV_VAR_PATTERN: Regex = Regex::new(r"\$\{([A-Z_][A-Z0-9_]*)\}").unwrap();
}

/// Root configuration structure
#[derive(Debug, Clone, Deserialize)]
pub struct Settings {
    #[serde(default)]
    pub bridge: BridgeConfig,
    pub wallet: WalletConfig,
    #[serde(default)]
    pub deploy: DeployConfig,
    pub api: ApiConfig,
    pub metrics: MetricsConfig,
    /// Per-token contract address overrides, keyed by token symbol
    #[serde(default)]
    pub tokens: HashMap<String, TokenOverride>,
}

/// Transfer policy: defaults for the intent and the fixed delays of the flow
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub default_source_chain: u64,
    pub default_destination_chain: u64,
    pub default_token: String,
    pub estimate_debounce_ms: u64,
    pub approval_reset_ms: u64,
    pub transfer_reset_ms: u64,
    pub adapter_version: u16,
    pub destination_gas: u64,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            default_source_chain: 5,
            default_destination_chain: 1,
            default_token: "ETH".to_string(),
            estimate_debounce_ms: 800,
            approval_reset_ms: 2_000,
            transfer_reset_ms: 3_000,
            adapter_version: 1,
            destination_gas: 200_000,
        }
    }
}

impl BridgeConfig {
    pub fn estimate_debounce(&self) -> Duration {
        Duration::from_millis(self.estimate_debounce_ms)
    }

    pub fn approval_reset(&self) -> Duration {
        Duration::from_millis(self.approval_reset_ms)
    }

    pub fn transfer_reset(&self) -> Duration {
        Duration::from_millis(self.transfer_reset_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct WalletConfig {
    /// Environment variable holding the signing key
    pub private_key_env: String,
    /// Network the wallet starts on; the only one it knows until others are added
    pub initial_chain_id: u64,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DeployConfig {
    /// Hex file with the OFT creation bytecode
    pub bytecode_path: Option<String>,
    /// Minimum send amount passed to the constructor, in whole native units
    pub min_send_amount: String,
}

impl Default for DeployConfig {
    fn default() -> Self {
        Self {
            bytecode_path: None,
            min_send_amount: "0.0001".to_string(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ApiConfig {
    pub host: String,
    pub port: u16,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MetricsConfig {
    pub enabled: bool,
    pub port: u16,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct TokenOverride {
    /// Chain id (as a string key) to contract address
    #[serde(default)]
    pub addresses: HashMap<String, String>,
}

impl Settings {
    /// Load settings from configuration files
    pub fn load() -> Result<Self> {
        let config_path = env::var("NEXUS_BRIDGE_CONFIG")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("config/default.toml"));

        Self::load_from(&config_path)
    }

    /// Load settings from a specific file
    pub fn load_from(config_path: &PathBuf) -> Result<Self> {
        let config_str = std::fs::read_to_string(config_path)
            .with_context(|| format!("Failed to read config file: {:?}", config_path))?;

        Self::parse(&config_str)
    }

    /// Parse settings from TOML text
    pub fn parse(config_str: &str) -> Result<Self> {
        // Substitute environment variables
        let config_str = substitute_env_vars(config_str);

        let settings: Settings =
            toml::from_str(&config_str).with_context(|| "Failed to parse configuration")?;

        settings.validate()?;

        Ok(settings)
    }

    /// Validate configuration
    fn validate(&self) -> Result<()> {
        if self.bridge.default_source_chain == self.bridge.default_destination_chain {
            tracing::warn!(
                "Default source and destination are both chain {}",
                self.bridge.default_source_chain
            );
        }

        if self.wallet.private_key_env.is_empty() {
            anyhow::bail!("wallet.private_key_env must name an environment variable");
        }

        for (symbol, overrides) in &self.tokens {
            for (chain, address) in &overrides.addresses {
                chain.parse::<u64>().with_context(|| {
                    format!("Token {} override has invalid chain id {:?}", symbol, chain)
                })?;
                address.parse::<ethers::types::Address>().with_context(|| {
                    format!("Token {} override has invalid address {:?}", symbol, address)
                })?;
            }
        }

        Ok(())
    }
}

/// Substitute environment variables in the format ${VAR_NAME}
fn substitute_env_vars(input: &str) -> String {
    let mut result = input.to_string();

    for cap in ENV_VAR_PATTERN.captures_iter(input) {
        let var_name = &cap[1];
        let var_value = env::var(var_name).unwrap_or_default();
        result = result.replace(&cap[0], &var_value);
    }

    result
}
