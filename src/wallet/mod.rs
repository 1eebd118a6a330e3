//! Wallet provider boundary
//!
//! Mirrors the EIP-1193 surface a browser wallet exposes: account access,
//! active chain, chain switching with the add-chain fallback, and change
//! notifications. `KeyWallet` implements it over a local signing key.

mod local;

pub use local::{KeyWallet, SignerClient};

use async_trait::async_trait;
use ethers::types::Address;
use serde::Serialize;
use thiserror::Error;
use tokio::sync::broadcast;

#[cfg(test)]
use mockall::automock;

/// EIP-1193 code for a request the user declined
pub const USER_REJECTED_CODE: i64 = 4001;

/// EIP-3326 code for a chain the wallet has never been told about
pub const UNRECOGNIZED_CHAIN_CODE: i64 = 4902;

/// Errors reported by the wallet provider
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum WalletError {
    #[error("User rejected the request")]
    UserRejected,

    #[error("Unrecognized chain ID {0}")]
    UnrecognizedChain(u64),

    #[error("Wallet error {code}: {message}")]
    Rpc { code: i64, message: String },
}

impl WalletError {
    pub fn code(&self) -> i64 {
        match self {
            WalletError::UserRejected => USER_REJECTED_CODE,
            WalletError::UnrecognizedChain(_) => UNRECOGNIZED_CHAIN_CODE,
            WalletError::Rpc { code, .. } => *code,
        }
    }
}

/// Notifications raised by the wallet outside of any request
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum WalletEvent {
    AccountsChanged { accounts: Vec<Address> },
    ChainChanged { chain_id: u64 },
}

/// Metadata for `wallet_addEthereumChain`
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct AddChainParams {
    pub chain_id: u64,
    pub chain_name: String,
    pub rpc_urls: Vec<String>,
    pub native_currency_name: String,
    pub native_currency_symbol: String,
    pub native_currency_decimals: u8,
}

#[cfg_attr(test, automock)]
#[async_trait]
pub trait WalletProvider: Send + Sync {
    /// Ask for account access (`eth_requestAccounts`)
    async fn request_accounts(&self) -> Result<Vec<Address>, WalletError>;

    /// Accounts already exposed to us, without prompting
    async fn accounts(&self) -> Result<Vec<Address>, WalletError>;

    /// Active chain id
    async fn chain_id(&self) -> Result<u64, WalletError>;

    /// `wallet_switchEthereumChain`
    async fn switch_chain(&self, chain_id: u64) -> Result<(), WalletError>;

    /// `wallet_addEthereumChain`
    async fn add_chain(&self, params: AddChainParams) -> Result<(), WalletError>;

    /// Account and chain change notifications
    fn subscribe(&self) -> broadcast::Receiver<WalletEvent>;
}
