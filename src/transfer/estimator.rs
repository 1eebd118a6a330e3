//! Debounced, single-flight fee estimation
//!
//! Every qualifying input change calls [`FeeEstimator::schedule`], which bumps
//! a generation counter, aborts the pending debounce task and starts a new
//! one. A finished estimate is only stored if its generation is still the
//! newest and the model still describes the inputs it was computed for, so a
//! slow response can never overwrite a fresher quote.

use super::state::{BridgeModel, Deployment, Quote, QuoteKey};
use crate::chain::{ChainGateway, RoutingPayload};
use crate::config::BridgeConfig;
use crate::error::{BridgeError, BridgeResult};
use crate::registry::{is_unset, Registry};
use crate::units::{self, NATIVE_DECIMALS};

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

#[derive(Clone)]
struct EstimateJob {
    gateway: Arc<dyn ChainGateway>,
    registry: Arc<Registry>,
    model: Arc<Mutex<BridgeModel>>,
    config: BridgeConfig,
    generation: Arc<AtomicU64>,
}

pub struct FeeEstimator {
    job: EstimateJob,
    pending: Mutex<Option<JoinHandle<()>>>,
}

impl FeeEstimator {
    pub fn new(
        gateway: Arc<dyn ChainGateway>,
        registry: Arc<Registry>,
        model: Arc<Mutex<BridgeModel>>,
        config: BridgeConfig,
    ) -> Self {
        Self {
            job: EstimateJob {
                gateway,
                registry,
                model,
                config,
                generation: Arc::new(AtomicU64::new(0)),
            },
            pending: Mutex::new(None),
        }
    }

    /// Drop the current quote and restart the debounce window
    pub async fn schedule(&self) {
        let generation = self.job.generation.fetch_add(1, Ordering::SeqCst) + 1;

        let key = {
            let mut model = self.job.model.lock().await;
            model.quote = None;
            model.estimate_error = None;
            model.estimating = !model.intent.amount.trim().is_empty();
            model.quote_key()
        };

        let mut pending = self.pending.lock().await;
        if let Some(handle) = pending.take() {
            handle.abort();
        }

        let job = self.job.clone();
        *pending = Some(tokio::spawn(async move {
            tokio::time::sleep(job.config.estimate_debounce()).await;
            job.run(generation, key).await;
        }));
    }

    /// Stop any pending estimate without scheduling a new one
    pub async fn cancel(&self) {
        self.job.generation.fetch_add(1, Ordering::SeqCst);
        if let Some(handle) = self.pending.lock().await.take() {
            handle.abort();
        }
        self.job.model.lock().await.estimating = false;
    }
}

impl EstimateJob {
    fn is_current(&self, generation: u64) -> bool {
        self.generation.load(Ordering::SeqCst) == generation
    }

    async fn run(&self, generation: u64, key: QuoteKey) {
        if !self.is_current(generation) {
            return;
        }

        let outcome = self.estimate(&key).await;

        let mut model = self.model.lock().await;
        if !self.is_current(generation) || model.quote_key() != key {
            debug!("Discarding estimate for superseded inputs");
            return;
        }

        model.estimating = false;
        match outcome {
            Ok(Some(quote)) => {
                debug!("Quote ready: {} native fee", quote.native_fee);
                crate::metrics::record_estimate("ok");
                model.quote = Some(quote);
            }
            Ok(None) => {}
            Err(e @ BridgeError::BelowMinimumAmount { .. }) => {
                crate::metrics::record_estimate("below_minimum");
                model.estimate_error = Some(e.to_string());
            }
            Err(e) => {
                // Transient failures are retried by the next input change;
                // showing them would only make the view flicker
                warn!("Estimation failed: {}", e);
                crate::metrics::record_estimate("failed");
            }
        }
    }

    /// Compute a quote for `key`, or `Ok(None)` when estimating makes no sense
    async fn estimate(&self, key: &QuoteKey) -> BridgeResult<Option<Quote>> {
        let token = match self.registry.token(&key.token) {
            Some(token) => token,
            None => return Ok(None),
        };
        if units::is_blank_amount(&key.amount, token.decimals) {
            return Ok(None);
        }

        let (deployment, min_send_amount, token_address) = {
            let model = self.model.lock().await;
            (
                model.deployment,
                model.intent.min_send_amount,
                model.token_address(token),
            )
        };
        let (account, active_chain) = match (key.account, key.active_chain) {
            (Some(account), Some(active_chain)) => (account, active_chain),
            _ => return Ok(None),
        };
        if deployment != Deployment::Deployed || is_unset(&token_address) {
            return Ok(None);
        }
        if active_chain != key.source {
            return Ok(None);
        }

        let amount = units::parse_amount(&key.amount, token.decimals)?;
        if amount < min_send_amount {
            return Err(BridgeError::BelowMinimumAmount {
                minimum: units::format_amount(min_send_amount, token.decimals)?,
            });
        }

        let destination = self.registry.require_network(key.destination)?;
        let payload = RoutingPayload::new(
            destination.lz_chain_id,
            account,
            self.config.adapter_version,
            self.config.destination_gas,
        );

        let (native_fee, zro_fee) = self
            .gateway
            .estimate_send_fee(token_address, payload.fee_request(amount))
            .await
            .map_err(|e| BridgeError::EstimationFailed(e.reason_or_message()))?;

        Ok(Some(Quote {
            native_fee: units::format_amount(native_fee, NATIVE_DECIMALS)?,
            zro_fee: units::format_amount(zro_fee, NATIVE_DECIMALS)?,
            native_fee_wei: native_fee,
            amount: key.amount.clone(),
            // Nothing is deducted on the way: the fee is paid in native gas
            estimated_received: key.amount.clone(),
            key: key.clone(),
        }))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::chain::{DeployArgs, FeeRequest, MockChainGateway, SendRequest};
    use crate::transfer::state::tests::connected_model;
    use async_trait::async_trait;
    use ethers::types::{Address, Bytes, TxHash, U256};
    use std::time::Duration;

    fn config() -> BridgeConfig {
        BridgeConfig::default()
    }

    fn build(
        gateway: Arc<dyn ChainGateway>,
        model: BridgeModel,
    ) -> (FeeEstimator, Arc<Mutex<BridgeModel>>) {
        let model = Arc::new(Mutex::new(model));
        let estimator = FeeEstimator::new(
            gateway,
            Arc::new(Registry::builtin()),
            model.clone(),
            config(),
        );
        (estimator, model)
    }

    fn fee_gateway(fee_wei: u64) -> MockChainGateway {
        let mut gateway = MockChainGateway::new();
        gateway
            .expect_estimate_send_fee()
            .returning(move |_, _| Ok((U256::from(fee_wei), U256::zero())));
        gateway
    }

    #[tokio::test(start_paused = true)]
    async fn test_quote_after_debounce() {
        let mut gateway = MockChainGateway::new();
        gateway
            .expect_estimate_send_fee()
            .withf(|token, request| {
                *token == "0x2e5221B0f855Be4ea5Cefffb8311EED0563B6e87".parse::<Address>().unwrap()
                    && request.dst_chain_id == 101
                    && request.amount == units::parse_amount("0.5", 18).unwrap()
                    && !request.use_zro
                    && request.adapter_params.len() == 34
            })
            .times(1)
            .returning(|_, _| Ok((U256::from(10_000_000_000_000_000u64), U256::zero())));

        let mut model = connected_model(5, "ETH");
        model.intent.amount = "0.5".to_string();
        let (estimator, model) = build(Arc::new(gateway), model);

        estimator.schedule().await;
        assert!(model.lock().await.estimating);

        tokio::time::sleep(Duration::from_millis(700)).await;
        assert!(model.lock().await.quote.is_none());

        tokio::time::sleep(Duration::from_millis(200)).await;
        let model = model.lock().await;
        let quote = model.valid_quote().expect("quote after debounce");
        assert!(quote.native_fee.starts_with("0.01"));
        assert_eq!(quote.estimated_received, "0.5");
        assert!(!model.estimating);
    }

    #[tokio::test(start_paused = true)]
    async fn test_restarting_debounce_issues_one_call() {
        let mut gateway = MockChainGateway::new();
        gateway
            .expect_estimate_send_fee()
            .withf(|_, request| request.amount == units::parse_amount("0.7", 18).unwrap())
            .times(1)
            .returning(|_, _| Ok((U256::from(1u64), U256::zero())));

        let mut initial = connected_model(5, "ETH");
        initial.intent.amount = "0.5".to_string();
        let (estimator, model) = build(Arc::new(gateway), initial);

        estimator.schedule().await;
        tokio::time::sleep(Duration::from_millis(500)).await;
        model.lock().await.intent.amount = "0.7".to_string();
        estimator.schedule().await;

        tokio::time::sleep(Duration::from_millis(1_000)).await;
        assert_eq!(model.lock().await.valid_quote().unwrap().amount, "0.7");
    }

    #[tokio::test(start_paused = true)]
    async fn test_below_minimum_skips_remote_call() {
        let mut gateway = MockChainGateway::new();
        gateway.expect_estimate_send_fee().never();

        let mut initial = connected_model(5, "ETH");
        initial.intent.amount = "0.00001".to_string();
        initial.intent.min_send_amount = units::parse_amount("0.0001", 18).unwrap();
        let (estimator, model) = build(Arc::new(gateway), initial);

        estimator.schedule().await;
        tokio::time::sleep(Duration::from_millis(900)).await;

        let model = model.lock().await;
        assert!(model.quote.is_none());
        assert!(model
            .estimate_error
            .as_deref()
            .unwrap()
            .starts_with("Min amount: 0.0001"));
    }

    #[tokio::test(start_paused = true)]
    async fn test_skips_when_not_on_source_or_not_deployed() {
        let mut gateway = MockChainGateway::new();
        gateway.expect_estimate_send_fee().never();

        let mut wrong_chain = connected_model(5, "ETH");
        wrong_chain.intent.amount = "1".to_string();
        wrong_chain.session.active_chain = Some(1);

        let mut undeployed = connected_model(5, "ETH");
        undeployed.intent.amount = "1".to_string();
        undeployed.deployment = Deployment::NotDeployed;

        let mut unset = connected_model(11155111, "ETH");
        unset.intent.amount = "1".to_string();

        let mut zero = connected_model(5, "ETH");
        zero.intent.amount = "0".to_string();

        let gateway: Arc<dyn ChainGateway> = Arc::new(gateway);
        for initial in [wrong_chain, undeployed, unset, zero] {
            let (estimator, model) = build(gateway.clone(), initial);
            estimator.schedule().await;
            tokio::time::sleep(Duration::from_millis(900)).await;

            let model = model.lock().await;
            assert!(model.quote.is_none());
            assert!(model.estimate_error.is_none());
            assert!(!model.estimating);
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_failed_estimate_is_silent() {
        let mut gateway = MockChainGateway::new();
        gateway.expect_estimate_send_fee().returning(|_, _| {
            Err(BridgeError::Remote {
                reason: None,
                message: "header not found".to_string(),
            })
        });

        let mut initial = connected_model(5, "ETH");
        initial.intent.amount = "1".to_string();
        let (estimator, model) = build(Arc::new(gateway), initial);

        estimator.schedule().await;
        tokio::time::sleep(Duration::from_millis(900)).await;

        let model = model.lock().await;
        assert!(model.quote.is_none());
        assert!(model.error.is_none());
        assert!(model.estimate_error.is_none());
        assert!(!model.estimating);
    }

    #[tokio::test(start_paused = true)]
    async fn test_cancel_drops_pending_estimate() {
        let (estimator, model) = {
            let mut initial = connected_model(5, "ETH");
            initial.intent.amount = "1".to_string();
            let mut gateway = MockChainGateway::new();
            gateway.expect_estimate_send_fee().never();
            build(Arc::new(gateway), initial)
        };

        estimator.schedule().await;
        estimator.cancel().await;
        tokio::time::sleep(Duration::from_millis(900)).await;
        assert!(model.lock().await.quote.is_none());
        assert!(!model.lock().await.estimating);
    }

    /// Answers fee requests after a delay that depends on the amount
    struct SlowGateway;

    #[async_trait]
    impl ChainGateway for SlowGateway {
        async fn code_at(&self, _: Address) -> BridgeResult<Bytes> {
            unimplemented!()
        }
        async fn native_balance(&self, _: Address) -> BridgeResult<U256> {
            unimplemented!()
        }
        async fn token_balance(&self, _: Address, _: Address) -> BridgeResult<U256> {
            unimplemented!()
        }
        async fn min_send_amount(&self, _: Address) -> BridgeResult<U256> {
            unimplemented!()
        }
        async fn allowance(&self, _: Address, _: Address, _: Address) -> BridgeResult<U256> {
            unimplemented!()
        }
        async fn estimate_send_fee(&self, _: Address, request: FeeRequest) -> BridgeResult<(U256, U256)> {
            // 1 ETH answers slowly, anything else quickly
            let slow = request.amount == units::parse_amount("1", 18).unwrap();
            let delay = if slow { 5_000 } else { 10 };
            tokio::time::sleep(Duration::from_millis(delay)).await;
            Ok((request.amount / 100, U256::zero()))
        }
        async fn approve(&self, _: Address, _: Address, _: U256) -> BridgeResult<TxHash> {
            unimplemented!()
        }
        async fn send_from(&self, _: Address, _: SendRequest, _: U256) -> BridgeResult<TxHash> {
            unimplemented!()
        }
        async fn wait_for_confirmation(&self, _: TxHash) -> BridgeResult<()> {
            unimplemented!()
        }
        async fn deploy(&self, _: DeployArgs) -> BridgeResult<Address> {
            unimplemented!()
        }
    }

    #[tokio::test(start_paused = true)]
    async fn test_late_response_never_overwrites_newer_quote() {
        let mut initial = connected_model(5, "ETH");
        initial.intent.amount = "1".to_string();
        let model = Arc::new(Mutex::new(initial));
        let registry = Arc::new(Registry::builtin());

        // Two independent estimators share the model, so the slow request
        // cannot simply be aborted by the second schedule call
        let first = FeeEstimator::new(Arc::new(SlowGateway), registry.clone(), model.clone(), config());
        first.schedule().await;
        tokio::time::sleep(Duration::from_millis(900)).await;

        model.lock().await.intent.amount = "2".to_string();
        let second = FeeEstimator::new(Arc::new(SlowGateway), registry, model.clone(), config());
        second.schedule().await;

        tokio::time::sleep(Duration::from_millis(10_000)).await;
        let model = model.lock().await;
        let quote = model.valid_quote().expect("newer quote kept");
        assert_eq!(quote.amount, "2");
        assert_eq!(quote.native_fee_wei, units::parse_amount("0.02", 18).unwrap());
    }

    #[tokio::test(start_paused = true)]
    async fn test_fee_gateway_quote_matches_model() {
        let mut initial = connected_model(5, "ETH");
        initial.intent.amount = "3".to_string();
        let (estimator, model) = build(Arc::new(fee_gateway(42)), initial);

        estimator.schedule().await;
        tokio::time::sleep(Duration::from_millis(900)).await;

        let model = model.lock().await;
        assert_eq!(model.valid_quote().unwrap().native_fee_wei, U256::from(42u64));
        assert_eq!(model.valid_quote().unwrap().key, model.quote_key());
    }
}
