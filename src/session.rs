//! Wallet session: account access, active network and network switching

use crate::error::{BridgeError, BridgeResult};
use crate::registry::NetworkDescriptor;
use crate::units::NATIVE_DECIMALS;
use crate::wallet::{
    AddChainParams, WalletError, WalletEvent, WalletProvider, UNRECOGNIZED_CHAIN_CODE,
    USER_REJECTED_CODE,
};

use ethers::types::Address;
use serde::Serialize;
use std::sync::Arc;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Connected account, active network and signing capability
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct Session {
    pub account: Option<Address>,
    pub active_chain: Option<u64>,
    pub can_sign: bool,
}

impl Session {
    pub fn is_connected(&self) -> bool {
        self.account.is_some()
    }

    /// True when the wallet is on `chain_id`
    pub fn is_on(&self, chain_id: u64) -> bool {
        self.active_chain == Some(chain_id)
    }
}

/// Talks to the wallet provider, if there is one
#[derive(Clone)]
pub struct SessionManager {
    wallet: Option<Arc<dyn WalletProvider>>,
}

impl SessionManager {
    pub fn new(wallet: Option<Arc<dyn WalletProvider>>) -> Self {
        Self { wallet }
    }

    fn wallet(&self) -> BridgeResult<&Arc<dyn WalletProvider>> {
        self.wallet.as_ref().ok_or(BridgeError::NoWalletFound)
    }

    /// Request account access
    pub async fn connect(&self) -> BridgeResult<Address> {
        let wallet = self.wallet()?;

        let accounts = wallet.request_accounts().await.map_err(|e| match e {
            WalletError::UserRejected => BridgeError::UserRejected,
            other => BridgeError::ConnectionFailed(other.to_string()),
        })?;

        let account = accounts
            .first()
            .copied()
            .ok_or_else(|| BridgeError::ConnectionFailed("wallet returned no accounts".to_string()))?;

        info!("Wallet connected: {:?}", account);
        Ok(account)
    }

    /// Read the current session without prompting
    pub async fn load(&self) -> BridgeResult<Session> {
        let wallet = match &self.wallet {
            Some(wallet) => wallet,
            None => return Ok(Session::default()),
        };

        let accounts = wallet
            .accounts()
            .await
            .map_err(|e| BridgeError::ConnectionFailed(e.to_string()))?;
        let chain_id = wallet
            .chain_id()
            .await
            .map_err(|e| BridgeError::ConnectionFailed(e.to_string()))?;

        let account = accounts.first().copied();
        Ok(Session {
            account,
            active_chain: Some(chain_id),
            can_sign: account.is_some(),
        })
    }

    /// Ask the wallet to move to `target`, adding the network first if the
    /// wallet has never seen it
    pub async fn switch_network(&self, target: &NetworkDescriptor) -> BridgeResult<()> {
        let wallet = self.wallet()?;

        let switched = wallet
            .switch_chain(target.chain_id)
            .await
            .map_err(|e| switch_error(target, e));

        match switched {
            Ok(()) => {
                debug!("Switched wallet to {}", target.name);
                Ok(())
            }
            Err(BridgeError::NetworkUnrecognized { chain_id }) => {
                info!("Chain {} unknown to wallet, requesting add", chain_id);
                wallet
                    .add_chain(add_chain_params(target))
                    .await
                    .map_err(|e| BridgeError::AddNetworkFailed(e.to_string()))
            }
            Err(e) => {
                warn!("Network switch to {} failed: {}", target.name, e);
                Err(e)
            }
        }
    }

    /// Wallet change notifications, when a wallet is present
    pub fn subscribe(&self) -> Option<broadcast::Receiver<WalletEvent>> {
        self.wallet.as_ref().map(|w| w.subscribe())
    }
}

/// Classify a failed switch by its EIP-1193 code
fn switch_error(target: &NetworkDescriptor, e: WalletError) -> BridgeError {
    match e.code() {
        USER_REJECTED_CODE => BridgeError::UserRejected,
        UNRECOGNIZED_CHAIN_CODE => BridgeError::NetworkUnrecognized {
            chain_id: target.chain_id,
        },
        _ => BridgeError::SwitchNetworkFailed(e.to_string()),
    }
}

fn add_chain_params(network: &NetworkDescriptor) -> AddChainParams {
    AddChainParams {
        chain_id: network.chain_id,
        chain_name: network.name.to_string(),
        rpc_urls: vec![network.rpc_url.to_string()],
        native_currency_name: network.symbol.to_string(),
        native_currency_symbol: network.symbol.to_string(),
        native_currency_decimals: NATIVE_DECIMALS as u8,
    }
}
