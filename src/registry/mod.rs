//! Registry module - static chain and token lookup tables
//!
//! This module provides:
//! - Network descriptors (routing ids, RPC endpoints, mainnet/testnet split)
//! - Token descriptors with per-network OFT contract addresses
//! - LayerZero endpoint addresses used when deploying a new OFT

pub mod networks;
pub mod tokens;

pub use networks::{NetworkDescriptor, NetworkKind, LZ_ENDPOINTS, NETWORKS};
pub use tokens::{is_unset, TokenDescriptor, TokenInterface};

use crate::config::TokenOverride;
use crate::error::{BridgeError, BridgeResult};

use ethers::types::Address;
use std::collections::HashMap;
use tracing::info;

/// Immutable lookup tables shared by every component
#[derive(Debug, Clone)]
pub struct Registry {
    networks: Vec<NetworkDescriptor>,
    tokens: Vec<TokenDescriptor>,
    endpoints: HashMap<u64, Address>,
}

impl Registry {
    /// Built-in networks, tokens and endpoints
    pub fn builtin() -> Self {
        Self {
            networks: NETWORKS.to_vec(),
            tokens: tokens::builtin_tokens(),
            endpoints: LZ_ENDPOINTS.clone(),
        }
    }

    /// Built-in tables with configured token addresses layered on top
    pub fn with_overrides(overrides: &HashMap<String, TokenOverride>) -> BridgeResult<Self> {
        let mut registry = Self::builtin();

        for (symbol, token_override) in overrides {
            let token = registry
                .tokens
                .iter_mut()
                .find(|t| t.symbol == *symbol)
                .ok_or_else(|| BridgeError::UnknownToken(symbol.clone()))?;

            for (chain, address) in &token_override.addresses {
                let chain_id: u64 = chain
                    .parse()
                    .map_err(|_| BridgeError::Config(format!("invalid chain id {:?}", chain)))?;
                let address: Address = address
                    .parse()
                    .map_err(|_| BridgeError::Config(format!("invalid address {:?}", address)))?;

                info!("Using {} contract {:?} on chain {}", symbol, address, chain_id);
                token.addresses.insert(chain_id, address);
            }
        }

        Ok(registry)
    }

    pub fn networks(&self) -> &[NetworkDescriptor] {
        &self.networks
    }

    pub fn tokens(&self) -> &[TokenDescriptor] {
        &self.tokens
    }

    pub fn network(&self, chain_id: u64) -> Option<&NetworkDescriptor> {
        self.networks.iter().find(|n| n.chain_id == chain_id)
    }

    pub fn require_network(&self, chain_id: u64) -> BridgeResult<&NetworkDescriptor> {
        self.network(chain_id)
            .ok_or(BridgeError::UnknownNetwork { chain_id })
    }

    pub fn token(&self, symbol: &str) -> Option<&TokenDescriptor> {
        self.tokens.iter().find(|t| t.symbol == symbol)
    }

    pub fn require_token(&self, symbol: &str) -> BridgeResult<&TokenDescriptor> {
        self.token(symbol)
            .ok_or_else(|| BridgeError::UnknownToken(symbol.to_string()))
    }

    /// LayerZero endpoint for a chain
    pub fn endpoint(&self, chain_id: u64) -> Option<Address> {
        self.endpoints.get(&chain_id).copied()
    }
}
