//! Transfer orchestrator
//!
//! Owns the bridge model and runs every user-triggered flow against it:
//! connecting, switching networks, editing the intent, approving, bridging
//! and deploying. The model lock is never held across a wallet or chain
//! call. A flow marks the model busy, releases the lock and hands its
//! remote work to a spawned task, which re-acquires the lock to record the
//! outcome whether or not the caller is still waiting.

use super::estimator::FeeEstimator;
use super::fetcher::{BalanceFetcher, FetchRequest};
use super::state::{
    derive_action, transfer_value, ActionView, BridgeModel, BridgeState, Deployment, Quote,
    TransferIntent,
};
use crate::chain::{ChainGateway, DeployArgs, RoutingPayload};
use crate::config::{BridgeConfig, DeployConfig};
use crate::error::{BridgeError, BridgeResult};
use crate::metrics;
use crate::registry::{is_unset, NetworkDescriptor, Registry};
use crate::session::{Session, SessionManager};
use crate::units::{self, NATIVE_DECIMALS};
use crate::wallet::WalletEvent;

use ethers::types::{Address, TxHash, U256};
use serde::Serialize;
use std::future::Future;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, Mutex};
use tracing::{debug, error, info, warn};

/// Everything a client needs to render the bridge
#[derive(Debug, Clone, Serialize)]
pub struct BridgeView {
    pub session: Session,
    pub intent: TransferIntent,
    pub state: BridgeState,
    pub deployment: Deployment,
    pub token_address: Address,
    /// Only present while it still matches the intent
    pub quote: Option<Quote>,
    pub estimating: bool,
    pub action: ActionView,
    pub error: Option<String>,
    pub last_tx: Option<TxHash>,
    pub deployed_address: Option<Address>,
}

impl BridgeView {
    fn new(model: &BridgeModel, registry: &Registry) -> Self {
        let token_address = registry
            .token(&model.intent.token)
            .map(|token| model.token_address(token))
            .unwrap_or_else(Address::zero);

        Self {
            session: model.session.clone(),
            intent: model.intent.clone(),
            state: model.state,
            deployment: model.deployment,
            token_address,
            quote: model.valid_quote().cloned(),
            estimating: model.estimating,
            action: derive_action(model, registry),
            error: model.visible_error().map(str::to_string),
            last_tx: model.last_tx,
            deployed_address: model.deployed_address,
        }
    }
}

/// Reject a new flow or input change while another flow is running
fn ensure_idle(model: &BridgeModel) -> BridgeResult<()> {
    if model.deployment == Deployment::Deploying {
        return Err(BridgeError::Busy {
            state: "deploying".to_string(),
        });
    }
    if model.state != BridgeState::Idle {
        return Err(BridgeError::Busy {
            state: model.state.to_string(),
        });
    }
    Ok(())
}

/// Keep source and destination distinct after `source` changed
fn separate_destination(model: &mut BridgeModel, previous_source: u64) {
    if model.intent.destination == model.intent.source {
        model.intent.destination = previous_source;
    }
}

/// Run the remote half of a flow on its own task so its outcome is
/// recorded even when the caller stops waiting
async fn run_detached<T, F>(flow: F) -> BridgeResult<T>
where
    T: Send + 'static,
    F: Future<Output = BridgeResult<T>> + Send + 'static,
{
    tokio::spawn(flow)
        .await
        .map_err(|e| BridgeError::Internal(format!("Flow task failed: {}", e)))?
}

/// Return to `Idle` after `delay`, unless the state moved on meanwhile
fn reset_after(
    model: Arc<Mutex<BridgeModel>>,
    armed: BridgeState,
    delay: Duration,
    clear_intent: bool,
) {
    tokio::spawn(async move {
        tokio::time::sleep(delay).await;
        let mut model = model.lock().await;
        if model.state != armed {
            return;
        }
        model.state = BridgeState::Idle;
        if clear_intent {
            model.intent.amount.clear();
            model.quote = None;
        }
        debug!("Bridge state reset from {}", armed);
    });
}

pub struct Orchestrator {
    session: SessionManager,
    gateway: Arc<dyn ChainGateway>,
    registry: Arc<Registry>,
    config: BridgeConfig,
    deploy: DeployConfig,
    model: Arc<Mutex<BridgeModel>>,
    estimator: FeeEstimator,
    fetcher: BalanceFetcher,
}

impl Orchestrator {
    pub fn new(
        session: SessionManager,
        gateway: Arc<dyn ChainGateway>,
        registry: Arc<Registry>,
        config: BridgeConfig,
        deploy: DeployConfig,
    ) -> Self {
        let intent = TransferIntent::new(
            config.default_source_chain,
            config.default_destination_chain,
            config.default_token.clone(),
        );
        let model = Arc::new(Mutex::new(BridgeModel::new(intent)));
        let estimator =
            FeeEstimator::new(gateway.clone(), registry.clone(), model.clone(), config.clone());
        let fetcher = BalanceFetcher::new(gateway.clone());

        Self {
            session,
            gateway,
            registry,
            config,
            deploy,
            model,
            estimator,
            fetcher,
        }
    }

    pub async fn view(&self) -> BridgeView {
        let model = self.model.lock().await;
        BridgeView::new(&model, &self.registry)
    }

    async fn set_error(&self, e: &BridgeError) {
        if e.is_user_visible() {
            self.model.lock().await.error = Some(e.to_string());
        }
    }

    /// Ask the wallet for account access, then load everything for it
    pub async fn connect(&self) -> BridgeResult<()> {
        self.model.lock().await.error = None;
        match self.session.connect().await {
            Ok(_) => self.reinitialize().await,
            Err(e) => {
                warn!("Wallet connection failed: {}", e);
                self.set_error(&e).await;
                Err(e)
            }
        }
    }

    /// Reload the session and every value derived from it.
    ///
    /// Safe to call any number of times; it replaces the page reload a
    /// browser dApp would do on account or chain changes.
    pub async fn reinitialize(&self) -> BridgeResult<()> {
        let session = self.session.load().await?;

        {
            let mut model = self.model.lock().await;
            if let Some(chain_id) = session.active_chain {
                let supported = self.registry.network(chain_id).is_some();
                if supported && chain_id != model.intent.source && model.state == BridgeState::Idle
                {
                    debug!("Adopting active network {} as source", chain_id);
                    let previous = model.intent.source;
                    model.intent.source = chain_id;
                    separate_destination(&mut model, previous);
                }
            }
            model.session = session;
            model.invalidate_derived();
        }

        if let Err(e) = self.refresh().await {
            warn!("Failed to refresh chain data: {}", e);
        }
        self.estimator.schedule().await;
        Ok(())
    }

    /// React to an account or chain change reported by the wallet
    pub async fn handle_wallet_event(&self, event: WalletEvent) -> BridgeResult<()> {
        match &event {
            WalletEvent::AccountsChanged { accounts } if accounts.is_empty() => {
                info!("Wallet disconnected");
                self.estimator.cancel().await;
                let mut model = self.model.lock().await;
                model.session = Session::default();
                model.invalidate_derived();
                model.intent.balance = "0.0".to_string();
                Ok(())
            }
            WalletEvent::AccountsChanged { .. } | WalletEvent::ChainChanged { .. } => {
                debug!("Wallet event: {:?}", event);
                self.reinitialize().await
            }
        }
    }

    /// Follow wallet notifications until the wallet goes away
    pub async fn watch_wallet(&self) {
        let mut events = match self.session.subscribe() {
            Some(events) => events,
            None => return,
        };

        loop {
            match events.recv().await {
                Ok(event) => {
                    if let Err(e) = self.handle_wallet_event(event).await {
                        error!("Error handling wallet event: {}", e);
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("Missed {} wallet events, reloading session", skipped);
                    if let Err(e) = self.reinitialize().await {
                        error!("Error reloading session: {}", e);
                    }
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    }

    /// Move the wallet to `chain_id` and make it the transfer source
    pub async fn switch_network(&self, chain_id: u64) -> BridgeResult<()> {
        let network = self.registry.require_network(chain_id)?.clone();
        {
            let mut model = self.model.lock().await;
            ensure_idle(&model)?;
            model.error = None;
        }

        if let Err(e) = self.session.switch_network(&network).await {
            metrics::record_network_switch("failed");
            self.set_error(&e).await;
            return Err(e);
        }
        metrics::record_network_switch("ok");
        info!("Switched to {}", network.name);

        {
            let mut model = self.model.lock().await;
            let previous = model.intent.source;
            model.intent.source = chain_id;
            separate_destination(&mut model, previous);
        }
        self.reinitialize().await
    }

    /// Re-read balance, minimum, allowance and deployment status
    pub async fn refresh(&self) -> BridgeResult<()> {
        let (request, key) = {
            let model = self.model.lock().await;
            let token = self.registry.require_token(&model.intent.token)?.clone();
            // The gateway talks to the active chain, so only read it when
            // that is where the token lives
            let account = model
                .session
                .account
                .filter(|_| model.session.is_on(model.intent.source));
            let request = FetchRequest {
                account,
                token_address: model.token_address(&token),
                token,
                amount: model.intent.amount.clone(),
            };
            (request, model.quote_key())
        };

        let snapshot = self.fetcher.fetch(&request).await?;

        let mut model = self.model.lock().await;
        if model.quote_key() != key {
            debug!("Discarding chain data for superseded inputs");
            return Ok(());
        }

        let snapshot = match snapshot {
            Some(snapshot) => snapshot,
            None => {
                model.intent.balance = "0.0".to_string();
                return Ok(());
            }
        };

        let not_deployed = BridgeError::ContractNotDeployed {
            network: String::new(),
        }
        .to_string();
        let network = self.registry.require_network(model.intent.source)?;
        if snapshot.deployment == Deployment::NotDeployed
            && network.is_mainnet()
            && !is_unset(&request.token_address)
        {
            model.error = Some(not_deployed);
        } else if model.error.as_deref() == Some(not_deployed.as_str()) {
            model.error = None;
        }

        if model.deployment != Deployment::Deploying {
            model.deployment = snapshot.deployment;
        }
        model.intent.balance = snapshot.balance;
        model.intent.min_send_amount = snapshot.min_send_amount;
        model.intent.needs_approval = snapshot.needs_approval;
        Ok(())
    }

    /// Drop everything derived from the old inputs and recompute it
    async fn after_input(&self) {
        self.model.lock().await.invalidate_derived();
        if let Err(e) = self.refresh().await {
            warn!("Failed to refresh chain data: {}", e);
        }
        self.estimator.schedule().await;
    }

    /// Switch the wallet to the source when a connected account is elsewhere
    async fn follow_source(&self) -> BridgeResult<()> {
        let (connected, source) = {
            let model = self.model.lock().await;
            (
                model.session.is_connected() && !model.session.is_on(model.intent.source),
                model.intent.source,
            )
        };
        if connected {
            self.switch_network(source).await
        } else {
            Ok(())
        }
    }

    pub async fn select_source(&self, chain_id: u64) -> BridgeResult<()> {
        self.registry.require_network(chain_id)?;
        {
            let mut model = self.model.lock().await;
            ensure_idle(&model)?;
            let previous = model.intent.source;
            model.intent.source = chain_id;
            separate_destination(&mut model, previous);
        }
        self.after_input().await;
        self.follow_source().await
    }

    /// Picking the current source as destination swaps the two
    pub async fn select_destination(&self, chain_id: u64) -> BridgeResult<()> {
        self.registry.require_network(chain_id)?;
        let swapped = {
            let mut model = self.model.lock().await;
            ensure_idle(&model)?;
            if chain_id == model.intent.source {
                model.intent.source = model.intent.destination;
                model.intent.destination = chain_id;
                true
            } else {
                model.intent.destination = chain_id;
                false
            }
        };
        self.after_input().await;
        if swapped {
            self.follow_source().await
        } else {
            Ok(())
        }
    }

    pub async fn select_token(&self, symbol: &str) -> BridgeResult<()> {
        let token = self.registry.require_token(symbol)?;
        {
            let mut model = self.model.lock().await;
            ensure_idle(&model)?;
            model.intent.token = token.symbol.clone();
            model.deployment = Deployment::Deployed;
        }
        self.after_input().await;
        Ok(())
    }

    pub async fn set_amount(&self, amount: &str) -> BridgeResult<()> {
        let amount = amount.trim();
        {
            let mut model = self.model.lock().await;
            ensure_idle(&model)?;
            if !amount.is_empty() {
                let token = self.registry.require_token(&model.intent.token)?;
                units::parse_amount(amount, token.decimals)?;
            }
            model.intent.amount = amount.to_string();
        }
        self.after_input().await;
        Ok(())
    }

    /// Use the whole displayed balance as the amount
    pub async fn set_max(&self) -> BridgeResult<()> {
        let balance = self.model.lock().await.intent.balance.clone();
        self.set_amount(&balance).await
    }

    /// Exchange source and destination; a connected wallet follows the new source
    pub async fn swap_chains(&self) -> BridgeResult<()> {
        {
            let mut model = self.model.lock().await;
            ensure_idle(&model)?;
            let intent = &mut model.intent;
            std::mem::swap(&mut intent.source, &mut intent.destination);
        }
        self.after_input().await;
        self.follow_source().await
    }

    /// Run whatever the primary button currently offers
    pub async fn primary_action(&self) -> BridgeResult<()> {
        use super::state::Action;

        let (view, unsupported) = {
            let model = self.model.lock().await;
            let view = derive_action(&model, &self.registry);
            let unsupported = match self.registry.token(&model.intent.token) {
                Some(token) if !is_unset(&model.token_address(token)) => {
                    BridgeError::ContractNotDeployed {
                        network: self.source_name(&model),
                    }
                }
                _ => BridgeError::TokenNotSupported {
                    symbol: model.intent.token.clone(),
                    network: self.source_name(&model),
                },
            };
            (view, unsupported)
        };
        debug!("Primary action: {}", view.label);

        match view.action {
            Action::Connect => self.connect().await,
            Action::SwitchNetwork { chain_id } => self.switch_network(chain_id).await,
            Action::Unsupported => Err(unsupported),
            Action::Deploy => self.deploy().await,
            Action::Wait => Err(BridgeError::Busy { state: view.label }),
            Action::Approve => self.approve().await,
            Action::Bridge => self.bridge().await,
        }
    }

    fn source_name(&self, model: &BridgeModel) -> String {
        self.registry
            .network(model.intent.source)
            .map(|n| n.name.to_string())
            .unwrap_or_else(|| model.intent.source.to_string())
    }

    /// Grant the OFT an unlimited allowance over the user's tokens
    pub async fn approve(&self) -> BridgeResult<()> {
        let token_address = {
            let mut model = self.model.lock().await;
            ensure_idle(&model)?;
            if !model.session.can_sign {
                return Err(BridgeError::NotConnected);
            }
            let token = self.registry.require_token(&model.intent.token)?;
            let address = model.token_address(token);
            if token.is_native || is_unset(&address) {
                return Err(BridgeError::TokenNotSupported {
                    symbol: token.symbol.clone(),
                    network: self.source_name(&model),
                });
            }
            model.state = BridgeState::Approving;
            model.error = None;
            address
        };

        info!("Approving {:?}", token_address);
        let gateway = self.gateway.clone();
        let model = self.model.clone();
        let reset = self.config.approval_reset();

        run_detached(async move {
            let result = async {
                let tx_hash = gateway
                    .approve(token_address, token_address, U256::MAX)
                    .await?;
                gateway.wait_for_confirmation(tx_hash).await
            }
            .await;

            let mut state = model.lock().await;
            match result {
                Ok(()) => {
                    metrics::record_approval("ok");
                    state.intent.needs_approval = false;
                    state.state = BridgeState::Idle;
                    info!("Approval confirmed");
                    Ok(())
                }
                Err(e) => {
                    metrics::record_approval("failed");
                    error!("Approval failed: {}", e);
                    let err = BridgeError::ApprovalFailed(e.reason_or_message());
                    state.state = BridgeState::Failed;
                    state.error = Some(err.to_string());
                    drop(state);
                    if err.auto_resets() {
                        reset_after(model.clone(), BridgeState::Failed, reset, false);
                    }
                    Err(err)
                }
            }
        })
        .await
    }

    /// Send the current intent across with the quoted fee attached
    pub async fn bridge(&self) -> BridgeResult<()> {
        let mut model = self.model.lock().await;
        ensure_idle(&model)?;

        let account = match model.session.account {
            Some(account) if model.session.can_sign => account,
            _ => return Err(BridgeError::NotConnected),
        };
        if !model.session.is_on(model.intent.source) {
            let source = model.intent.source;
            drop(model);
            return self.switch_network(source).await;
        }

        let quote = match (&model.quote, model.valid_quote()) {
            (None, _) => return Err(BridgeError::NoQuote),
            (Some(_), None) => return Err(BridgeError::StaleQuote),
            (Some(_), Some(quote)) => quote.clone(),
        };

        let token = self.registry.require_token(&model.intent.token)?;
        let token_address = model.token_address(token);
        if is_unset(&token_address) {
            return Err(BridgeError::TokenNotSupported {
                symbol: token.symbol.clone(),
                network: self.source_name(&model),
            });
        }
        let amount = units::parse_amount(&model.intent.amount, token.decimals)?;
        let destination = self.registry.require_network(model.intent.destination)?;
        let payload = RoutingPayload::new(
            destination.lz_chain_id,
            account,
            self.config.adapter_version,
            self.config.destination_gas,
        );
        let value = transfer_value(&quote, token, amount);
        let source = model.intent.source;

        model.state = BridgeState::Bridging;
        model.error = None;
        model.last_tx = None;
        drop(model);

        info!(
            "Bridging {} {} from {} to {} (value {})",
            quote.amount, token.symbol, source, destination.name, value
        );
        metrics::record_transfer_submitted(source);

        let gateway = self.gateway.clone();
        let model = self.model.clone();
        let reset = self.config.transfer_reset();
        let request = payload.send_request(account, amount);

        let outcome = run_detached(async move {
            let result = async {
                let tx_hash = gateway.send_from(token_address, request, value).await?;
                model.lock().await.last_tx = Some(tx_hash);
                gateway.wait_for_confirmation(tx_hash).await?;
                Ok::<_, BridgeError>(tx_hash)
            }
            .await;

            match result {
                Ok(tx_hash) => {
                    metrics::record_transfer_completed(source);
                    info!("Transfer confirmed: {:?}", tx_hash);
                    model.lock().await.state = BridgeState::Completed;
                    reset_after(model.clone(), BridgeState::Completed, reset, true);
                    Ok(())
                }
                Err(e) => {
                    metrics::record_transfer_failed(source);
                    error!("Transfer failed: {}", e);
                    let err = BridgeError::TransferFailed(e.reason_or_message());
                    {
                        let mut state = model.lock().await;
                        state.state = BridgeState::Failed;
                        state.error = Some(err.to_string());
                    }
                    if err.auto_resets() {
                        reset_after(model.clone(), BridgeState::Failed, reset, false);
                    }
                    Err(err)
                }
            }
        })
        .await;

        if outcome.is_ok() {
            if let Err(e) = self.refresh().await {
                warn!("Failed to refresh chain data: {}", e);
            }
        }
        outcome
    }

    /// Deploy a native OFT on the source network and adopt it as the
    /// token's contract there
    pub async fn deploy(&self) -> BridgeResult<()> {
        let (network, symbol, args) = {
            let mut model = self.model.lock().await;
            ensure_idle(&model)?;
            if !model.session.can_sign {
                return Err(BridgeError::NotConnected);
            }
            let network = self.registry.require_network(model.intent.source)?.clone();
            if !model.session.is_on(network.chain_id) {
                drop(model);
                return self.switch_network(network.chain_id).await;
            }

            let args = match self.deploy_args(&network) {
                Ok(args) => args,
                Err(e) => {
                    if e.is_user_visible() {
                        model.error = Some(e.to_string());
                    }
                    return Err(e);
                }
            };
            model.deployment = Deployment::Deploying;
            model.error = None;
            (network, model.intent.token.clone(), args)
        };
        info!("Deploying {} on {}", args.name, network.name);

        let gateway = self.gateway.clone();
        let model = self.model.clone();
        let chain_id = network.chain_id;

        let outcome = run_detached(async move {
            let result = gateway.deploy(args).await;

            let mut state = model.lock().await;
            match result {
                Ok(address) => {
                    metrics::record_deployment("ok");
                    info!("Deployed {} OFT at {:?}", symbol, address);
                    state.deployment = Deployment::Deployed;
                    state.deployed_address = Some(address);
                    state.deployed.insert((symbol, chain_id), address);
                    state.invalidate_derived();
                    Ok(())
                }
                Err(e) => {
                    metrics::record_deployment("failed");
                    error!("Deployment failed: {}", e);
                    let err = BridgeError::DeploymentFailed(e.reason_or_message());
                    state.deployment = Deployment::NotDeployed;
                    state.error = Some(err.to_string());
                    Err(err)
                }
            }
        })
        .await;

        if outcome.is_ok() {
            if let Err(e) = self.refresh().await {
                warn!("Failed to refresh chain data: {}", e);
            }
            self.estimator.schedule().await;
        }
        outcome
    }

    fn deploy_args(&self, network: &NetworkDescriptor) -> BridgeResult<DeployArgs> {
        let endpoint = self.registry.endpoint(network.chain_id).ok_or_else(|| {
            BridgeError::EndpointNotConfigured {
                network: network.name.to_string(),
            }
        })?;

        Ok(DeployArgs {
            name: format!("Native {} ETH", network.name),
            symbol: format!("N{}", network.symbol),
            endpoint,
            min_send_amount: units::parse_amount(&self.deploy.min_send_amount, NATIVE_DECIMALS)?,
        })
    }
}
