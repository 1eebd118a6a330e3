//! Local-key wallet with browser-wallet semantics

use super::{AddChainParams, WalletError, WalletEvent, WalletProvider};
use crate::error::{BridgeError, BridgeResult};
use crate::registry::NetworkDescriptor;

use async_trait::async_trait;
use dashmap::DashMap;
use ethers::prelude::*;
use ethers::providers::{Http, Provider};
use ethers::signers::{LocalWallet, Signer};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, RwLock};
use tracing::{debug, info, warn};

/// Signing client bound to the wallet's active chain
pub type SignerClient = SignerMiddleware<Provider<Http>, LocalWallet>;

struct ActiveChain {
    chain_id: u64,
    client: Arc<SignerClient>,
}

/// Wallet backed by a private key held in memory.
///
/// Like a browser extension it only knows the chains it started on or was
/// asked to add, and only exposes its account after `request_accounts`.
pub struct KeyWallet {
    signer: LocalWallet,
    /// Chains the wallet can switch to: chain id -> RPC URL
    known_chains: DashMap<u64, String>,
    active: RwLock<ActiveChain>,
    authorized: AtomicBool,
    events: broadcast::Sender<WalletEvent>,
}

impl KeyWallet {
    /// Create a wallet starting on `network`
    pub fn new(signer: LocalWallet, network: &NetworkDescriptor) -> BridgeResult<Self> {
        let client = connect_client(&signer, network.chain_id, network.rpc_url)
            .map_err(|e| BridgeError::Config(e.to_string()))?;

        let known_chains = DashMap::new();
        known_chains.insert(network.chain_id, network.rpc_url.to_string());

        let (events, _) = broadcast::channel(64);

        info!(
            "Wallet {:?} ready on {} (chain {})",
            signer.address(),
            network.name,
            network.chain_id
        );

        Ok(Self {
            signer,
            known_chains,
            active: RwLock::new(ActiveChain {
                chain_id: network.chain_id,
                client,
            }),
            authorized: AtomicBool::new(false),
            events,
        })
    }

    /// Load the signing key from an environment variable.
    ///
    /// Returns `Ok(None)` when the variable is not set, which the session
    /// reports as "no wallet found".
    pub fn from_env(var: &str, network: &NetworkDescriptor) -> BridgeResult<Option<Self>> {
        let key = match std::env::var(var) {
            Ok(key) => key,
            Err(_) => {
                warn!("{} is not set, running without a wallet", var);
                return Ok(None);
            }
        };

        let signer = key
            .trim()
            .parse::<LocalWallet>()
            .map_err(|e| BridgeError::Config(format!("Invalid private key: {}", e)))?;

        Self::new(signer, network).map(Some)
    }

    pub fn address(&self) -> Address {
        self.signer.address()
    }

    /// Signing client for the active chain
    pub async fn client(&self) -> Arc<SignerClient> {
        self.active.read().await.client.clone()
    }

    /// Revoke account access, as a user disconnecting the site would
    pub fn disconnect(&self) {
        if self.authorized.swap(false, Ordering::SeqCst) {
            let _ = self
                .events
                .send(WalletEvent::AccountsChanged { accounts: vec![] });
        }
    }
}

fn connect_client(
    signer: &LocalWallet,
    chain_id: u64,
    rpc_url: &str,
) -> Result<Arc<SignerClient>, WalletError> {
    let provider = Provider::<Http>::try_from(rpc_url)
        .map_err(|e| WalletError::Rpc {
            code: -32603,
            message: format!("Invalid RPC URL {}: {}", rpc_url, e),
        })?
        .interval(Duration::from_millis(500));

    let signer = signer.clone().with_chain_id(chain_id);
    Ok(Arc::new(SignerMiddleware::new(provider, signer)))
}

#[async_trait]
impl WalletProvider for KeyWallet {
    async fn request_accounts(&self) -> Result<Vec<Address>, WalletError> {
        if !self.authorized.swap(true, Ordering::SeqCst) {
            let _ = self.events.send(WalletEvent::AccountsChanged {
                accounts: vec![self.address()],
            });
        }
        Ok(vec![self.address()])
    }

    async fn accounts(&self) -> Result<Vec<Address>, WalletError> {
        if self.authorized.load(Ordering::SeqCst) {
            Ok(vec![self.address()])
        } else {
            Ok(vec![])
        }
    }

    async fn chain_id(&self) -> Result<u64, WalletError> {
        Ok(self.active.read().await.chain_id)
    }

    async fn switch_chain(&self, chain_id: u64) -> Result<(), WalletError> {
        if self.active.read().await.chain_id == chain_id {
            return Ok(());
        }

        let rpc_url = self
            .known_chains
            .get(&chain_id)
            .map(|entry| entry.value().clone())
            .ok_or(WalletError::UnrecognizedChain(chain_id))?;

        let client = connect_client(&self.signer, chain_id, &rpc_url)?;
        *self.active.write().await = ActiveChain { chain_id, client };

        debug!("Wallet switched to chain {}", chain_id);
        let _ = self.events.send(WalletEvent::ChainChanged { chain_id });
        Ok(())
    }

    async fn add_chain(&self, params: AddChainParams) -> Result<(), WalletError> {
        let rpc_url = params.rpc_urls.first().cloned().ok_or(WalletError::Rpc {
            code: -32602,
            message: "rpcUrls must not be empty".to_string(),
        })?;

        info!(
            "Wallet adding chain {} ({}) via {}",
            params.chain_name, params.chain_id, rpc_url
        );
        self.known_chains.insert(params.chain_id, rpc_url);

        // Wallets offer to switch right after adding
        self.switch_chain(params.chain_id).await
    }

    fn subscribe(&self) -> broadcast::Receiver<WalletEvent> {
        self.events.subscribe()
    }
}
