//! Bridge state object and the pure functions that derive the view from it

use crate::registry::{is_unset, NetworkKind, Registry, TokenDescriptor};
use crate::session::Session;

use ethers::types::{Address, TxHash, U256};
use serde::Serialize;
use std::collections::HashMap;

/// Lifecycle of the approve / bridge transactions
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum BridgeState {
    Idle,
    Approving,
    Bridging,
    Completed,
    Failed,
}

impl std::fmt::Display for BridgeState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            BridgeState::Idle => "idle",
            BridgeState::Approving => "approving",
            BridgeState::Bridging => "bridging",
            BridgeState::Completed => "completed",
            BridgeState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Whether the token contract exists on the source network
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Deployment {
    NotDeployed,
    Deploying,
    Deployed,
}

/// What the user wants to move, and what we know about it on-chain
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TransferIntent {
    pub source: u64,
    pub destination: u64,
    pub token: String,
    pub amount: String,
    /// Smallest units
    pub min_send_amount: U256,
    pub needs_approval: bool,
    pub balance: String,
}

impl TransferIntent {
    pub fn new(source: u64, destination: u64, token: impl Into<String>) -> Self {
        Self {
            source,
            destination,
            token: token.into(),
            amount: String::new(),
            min_send_amount: U256::zero(),
            needs_approval: false,
            balance: "0.0".to_string(),
        }
    }
}

/// Everything a fee quote depends on
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct QuoteKey {
    pub account: Option<Address>,
    pub active_chain: Option<u64>,
    pub source: u64,
    pub destination: u64,
    pub token: String,
    pub amount: String,
}

/// Externally computed fee for one prospective transfer
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Quote {
    pub native_fee: String,
    pub zro_fee: String,
    /// Smallest units, attached as value when sending
    pub native_fee_wei: U256,
    pub amount: String,
    pub estimated_received: String,
    pub key: QuoteKey,
}

/// The single state object owned by the orchestrator
#[derive(Debug, Clone, Serialize)]
pub struct BridgeModel {
    pub session: Session,
    pub intent: TransferIntent,
    pub deployment: Deployment,
    pub state: BridgeState,
    pub quote: Option<Quote>,
    pub estimating: bool,
    /// Errors owned by the fee estimator (minimum amount)
    pub estimate_error: Option<String>,
    pub error: Option<String>,
    pub last_tx: Option<TxHash>,
    pub deployed_address: Option<Address>,
    /// Contracts deployed from this session: (symbol, chain id) -> address
    #[serde(skip)]
    pub deployed: HashMap<(String, u64), Address>,
}

impl BridgeModel {
    pub fn new(intent: TransferIntent) -> Self {
        Self {
            session: Session::default(),
            intent,
            deployment: Deployment::Deployed,
            state: BridgeState::Idle,
            quote: None,
            estimating: false,
            estimate_error: None,
            error: None,
            last_tx: None,
            deployed_address: None,
            deployed: HashMap::new(),
        }
    }

    /// Parameters the current quote must have been computed for
    pub fn quote_key(&self) -> QuoteKey {
        QuoteKey {
            account: self.session.account,
            active_chain: self.session.active_chain,
            source: self.intent.source,
            destination: self.intent.destination,
            token: self.intent.token.clone(),
            amount: self.intent.amount.clone(),
        }
    }

    /// The quote, only if it still describes the current intent on the
    /// account's active network
    pub fn valid_quote(&self) -> Option<&Quote> {
        self.quote.as_ref().filter(|q| {
            q.key == self.quote_key() && q.key.active_chain == Some(self.intent.source)
        })
    }

    /// Error shown to the user, transaction errors first
    pub fn visible_error(&self) -> Option<&str> {
        self.error.as_deref().or(self.estimate_error.as_deref())
    }

    /// Forget everything derived from chain reads
    pub fn invalidate_derived(&mut self) {
        self.quote = None;
        self.estimating = false;
        self.estimate_error = None;
        self.intent.needs_approval = false;
        self.intent.min_send_amount = U256::zero();
    }

    /// Token contract address on the source chain, preferring contracts
    /// deployed from this session over the registry
    pub fn token_address(&self, token: &TokenDescriptor) -> Address {
        self.deployed
            .get(&(token.symbol.clone(), self.intent.source))
            .copied()
            .unwrap_or_else(|| token.address_on(self.intent.source))
    }
}

/// What pressing the primary button does
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Action {
    Connect,
    SwitchNetwork { chain_id: u64 },
    Unsupported,
    Deploy,
    Wait,
    Approve,
    Bridge,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ActionView {
    pub action: Action,
    pub label: String,
    pub enabled: bool,
}

impl ActionView {
    fn new(action: Action, label: impl Into<String>, enabled: bool) -> Self {
        Self {
            action,
            label: label.into(),
            enabled,
        }
    }
}

/// Derive the primary action. Order matters: an earlier rule always wins.
pub fn derive_action(model: &BridgeModel, registry: &Registry) -> ActionView {
    let intent = &model.intent;
    let idle = model.state == BridgeState::Idle;

    if !model.session.is_connected() {
        return ActionView::new(Action::Connect, "Connect Wallet", true);
    }

    let source = registry.network(intent.source);
    let source_name = source.map(|n| n.name).unwrap_or("Unknown Network");

    if !model.session.is_on(intent.source) {
        return ActionView::new(
            Action::SwitchNetwork {
                chain_id: intent.source,
            },
            format!("Switch to {}", source_name),
            idle,
        );
    }

    let token = match registry.token(&intent.token) {
        Some(token) => token,
        None => return ActionView::new(Action::Unsupported, "Token Not Supported", false),
    };
    let kind = source.map(|n| n.kind).unwrap_or(NetworkKind::Mainnet);
    let unset = is_unset(&model.token_address(token));

    if kind == NetworkKind::Mainnet {
        if unset {
            return ActionView::new(Action::Unsupported, "Token Not Supported", false);
        }
        if model.deployment == Deployment::NotDeployed {
            return ActionView::new(Action::Unsupported, "Contract Not Deployed", false);
        }
    } else if unset || model.deployment != Deployment::Deployed {
        return match model.deployment {
            Deployment::Deploying => ActionView::new(Action::Deploy, "Deploying...", false),
            _ => ActionView::new(Action::Deploy, "Deploy Contract", idle),
        };
    }

    match model.state {
        BridgeState::Approving => return ActionView::new(Action::Wait, "Approving...", false),
        BridgeState::Bridging => return ActionView::new(Action::Wait, "Confirming...", false),
        BridgeState::Completed => return ActionView::new(Action::Wait, "Success!", false),
        BridgeState::Failed => return ActionView::new(Action::Wait, "Failed", false),
        BridgeState::Idle => {}
    }

    if intent.needs_approval && !token.is_native {
        return ActionView::new(Action::Approve, "Approve Token", true);
    }

    if model.valid_quote().is_some() {
        ActionView::new(Action::Bridge, format!("Bridge {}", token.symbol), true)
    } else if model.estimating {
        ActionView::new(Action::Bridge, "Estimating...", false)
    } else {
        ActionView::new(Action::Bridge, "Enter Amount", false)
    }
}

/// Native value to attach to `sendFrom`: the fee, plus the amount itself
/// when the token is the chain's native asset
pub fn transfer_value(quote: &Quote, token: &TokenDescriptor, amount_wei: U256) -> U256 {
    if token.is_native {
        quote.native_fee_wei + amount_wei
    } else {
        quote.native_fee_wei
    }
}

#[cfg(test)]
pub(crate) mod tests {
    use super::*;
    use crate::units;

    pub fn account() -> Address {
        "0x1111111111111111111111111111111111111111".parse().unwrap()
    }

    /// Connected model on `chain`, bridging `token` from it to Ethereum
    pub fn connected_model(chain: u64, token: &str) -> BridgeModel {
        let mut model = BridgeModel::new(TransferIntent::new(chain, 1, token));
        model.session = Session {
            account: Some(account()),
            active_chain: Some(chain),
            can_sign: true,
        };
        model
    }

    pub fn quote_for(model: &BridgeModel, fee_wei: u64) -> Quote {
        Quote {
            native_fee: "0.01".to_string(),
            zro_fee: "0.0".to_string(),
            native_fee_wei: U256::from(fee_wei),
            amount: model.intent.amount.clone(),
            estimated_received: model.intent.amount.clone(),
            key: model.quote_key(),
        }
    }

    #[test]
    fn test_disconnected_offers_connect() {
        let registry = Registry::builtin();
        let model = BridgeModel::new(TransferIntent::new(5, 1, "ETH"));
        let view = derive_action(&model, &registry);
        assert_eq!(view.action, Action::Connect);
        assert_eq!(view.label, "Connect Wallet");
    }

    #[test]
    fn test_wrong_network_offers_switch() {
        let registry = Registry::builtin();
        let mut model = connected_model(5, "ETH");
        model.session.active_chain = Some(1);
        model.intent.amount = "1".to_string();
        model.intent.needs_approval = true;

        let view = derive_action(&model, &registry);
        assert_eq!(view.action, Action::SwitchNetwork { chain_id: 5 });
        assert_eq!(view.label, "Switch to Goerli");
        assert!(view.enabled);
    }

    #[test]
    fn test_unset_on_mainnet_is_never_submittable() {
        let registry = Registry::builtin();
        for network in registry.networks().iter().filter(|n| n.is_mainnet()) {
            for token in registry.tokens() {
                if !is_unset(&token.address_on(network.chain_id)) {
                    continue;
                }
                for amount in ["", "0.5", "1000"] {
                    let mut model = connected_model(network.chain_id, &token.symbol);
                    model.intent.amount = amount.to_string();
                    model.quote = Some(quote_for(&model, 1));

                    let view = derive_action(&model, &registry);
                    assert_eq!(view.action, Action::Unsupported);
                    assert_eq!(view.label, "Token Not Supported");
                    assert!(!view.enabled);
                }
            }
        }
    }

    #[test]
    fn test_unset_on_testnet_offers_deploy() {
        let registry = Registry::builtin();
        for network in registry.networks().iter().filter(|n| !n.is_mainnet()) {
            for token in registry.tokens() {
                if !is_unset(&token.address_on(network.chain_id)) {
                    continue;
                }
                let mut model = connected_model(network.chain_id, &token.symbol);
                model.intent.amount = "1".to_string();
                model.quote = Some(quote_for(&model, 1));

                let view = derive_action(&model, &registry);
                assert_eq!(view.action, Action::Deploy);
                assert_eq!(view.label, "Deploy Contract");
            }
        }
    }

    #[test]
    fn test_deploying_disables_deploy() {
        let registry = Registry::builtin();
        let mut model = connected_model(11155111, "ETH");
        model.deployment = Deployment::Deploying;

        let view = derive_action(&model, &registry);
        assert_eq!(view.label, "Deploying...");
        assert!(!view.enabled);
    }

    #[test]
    fn test_missing_code_on_mainnet_is_disabled() {
        let registry = Registry::builtin();
        let mut model = connected_model(1, "ETH");
        model.deployment = Deployment::NotDeployed;

        let view = derive_action(&model, &registry);
        assert_eq!(view.action, Action::Unsupported);
        assert!(!view.enabled);
    }

    #[test]
    fn test_session_deployment_overrides_registry() {
        let registry = Registry::builtin();
        let mut model = connected_model(11155111, "ETH");
        model
            .deployed
            .insert(("ETH".to_string(), 11155111), account());
        model.intent.amount = "1".to_string();
        model.quote = Some(quote_for(&model, 1));

        let view = derive_action(&model, &registry);
        assert_eq!(view.label, "Bridge ETH");
    }

    #[test]
    fn test_needs_approval_then_bridge() {
        let registry = Registry::builtin();
        let mut model = connected_model(5, "METH");
        model
            .deployed
            .insert(("METH".to_string(), 5), account());
        model.intent.amount = "10".to_string();
        model.intent.needs_approval = true;
        model.quote = Some(quote_for(&model, 1));

        let view = derive_action(&model, &registry);
        assert_eq!(view.action, Action::Approve);
        assert_eq!(view.label, "Approve Token");

        model.intent.needs_approval = false;
        let view = derive_action(&model, &registry);
        assert_eq!(view.action, Action::Bridge);
        assert_eq!(view.label, "Bridge METH");
        assert!(view.enabled);
    }

    #[test]
    fn test_native_tokens_never_need_approval() {
        let registry = Registry::builtin();
        let mut model = connected_model(5, "ETH");
        model.intent.amount = "0.5".to_string();
        model.intent.needs_approval = true;
        model.quote = Some(quote_for(&model, 1));

        assert_eq!(derive_action(&model, &registry).action, Action::Bridge);
    }

    #[test]
    fn test_busy_states_disable_the_button() {
        let registry = Registry::builtin();
        let mut model = connected_model(5, "ETH");
        model.intent.amount = "0.5".to_string();
        model.quote = Some(quote_for(&model, 1));

        for (state, label) in [
            (BridgeState::Approving, "Approving..."),
            (BridgeState::Bridging, "Confirming..."),
            (BridgeState::Completed, "Success!"),
            (BridgeState::Failed, "Failed"),
        ] {
            model.state = state;
            let view = derive_action(&model, &registry);
            assert_eq!(view.label, label);
            assert!(!view.enabled);
        }
    }

    #[test]
    fn test_stale_quote_is_not_valid() {
        let registry = Registry::builtin();
        let mut model = connected_model(5, "ETH");
        model.intent.amount = "0.5".to_string();
        model.quote = Some(quote_for(&model, 1));
        assert!(model.valid_quote().is_some());

        model.intent.amount = "0.6".to_string();
        assert!(model.valid_quote().is_none());
        assert_eq!(derive_action(&model, &registry).label, "Enter Amount");

        model.intent.amount = "0.5".to_string();
        model.intent.destination = 42161;
        assert!(model.valid_quote().is_none());

        model.intent.destination = 1;
        model.session.active_chain = Some(1);
        assert!(model.valid_quote().is_none());
    }

    #[test]
    fn test_estimating_label() {
        let registry = Registry::builtin();
        let mut model = connected_model(5, "ETH");
        model.intent.amount = "0.5".to_string();
        model.estimating = true;

        let view = derive_action(&model, &registry);
        assert_eq!(view.label, "Estimating...");
        assert!(!view.enabled);
    }

    #[test]
    fn test_transfer_value_adds_amount_for_native() {
        let registry = Registry::builtin();
        let mut model = connected_model(5, "ETH");
        model.intent.amount = "0.5".to_string();
        let quote = quote_for(&model, 1_000);

        let eth = registry.token("ETH").unwrap();
        let amount = units::parse_amount(&model.intent.amount, eth.decimals).unwrap();
        assert_eq!(
            transfer_value(&quote, eth, amount),
            U256::from(500_000_000_000_001_000u64)
        );

        let meth = registry.token("METH").unwrap();
        assert_eq!(transfer_value(&quote, meth, amount), U256::from(1_000u64));
    }
}
