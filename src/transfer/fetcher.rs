//! Balance, minimum-send and allowance reads for the active account

use super::state::Deployment;
use crate::chain::ChainGateway;
use crate::error::BridgeResult;
use crate::registry::{is_unset, TokenDescriptor};
use crate::units;

use ethers::types::{Address, U256};
use std::sync::Arc;
use tracing::debug;

/// What the fetcher needs to know about the intent
#[derive(Debug, Clone)]
pub struct FetchRequest {
    pub account: Option<Address>,
    pub token: TokenDescriptor,
    pub token_address: Address,
    pub amount: String,
}

/// On-chain facts for one account/token/network combination
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChainSnapshot {
    pub deployment: Deployment,
    pub balance: String,
    pub min_send_amount: U256,
    pub needs_approval: bool,
}

impl ChainSnapshot {
    fn not_deployed() -> Self {
        Self {
            deployment: Deployment::NotDeployed,
            balance: "0.0".to_string(),
            min_send_amount: U256::zero(),
            needs_approval: false,
        }
    }
}

pub struct BalanceFetcher {
    gateway: Arc<dyn ChainGateway>,
}

impl BalanceFetcher {
    pub fn new(gateway: Arc<dyn ChainGateway>) -> Self {
        Self { gateway }
    }

    /// Read everything the view needs about the token on the active network.
    ///
    /// Returns `Ok(None)` without touching the chain when no account is
    /// connected.
    pub async fn fetch(&self, request: &FetchRequest) -> BridgeResult<Option<ChainSnapshot>> {
        let account = match request.account {
            Some(account) => account,
            None => return Ok(None),
        };
        let token = &request.token;
        let address = request.token_address;

        if is_unset(&address) {
            debug!("{} has no contract on this network", token.symbol);
            return Ok(Some(ChainSnapshot::not_deployed()));
        }

        let code = self.gateway.code_at(address).await?;
        if code.is_empty() {
            debug!("No code at {:?} for {}", address, token.symbol);
            return Ok(Some(ChainSnapshot::not_deployed()));
        }

        let balance = async {
            if token.is_native {
                self.gateway.native_balance(account).await
            } else {
                self.gateway.token_balance(address, account).await
            }
        };
        let (raw_balance, min_send_amount) =
            futures::join!(balance, self.gateway.min_send_amount(address));
        let raw_balance = raw_balance?;

        let min_send_amount = match min_send_amount {
            Ok(min) => min,
            Err(e) => {
                debug!("minSendAmount unavailable for {}: {}", token.symbol, e);
                U256::zero()
            }
        };

        let needs_approval = if !token.is_native && !request.amount.trim().is_empty() {
            let amount = units::parse_amount(&request.amount, token.decimals)?;
            // The OFT pulls tokens itself, so it is also the spender
            let allowance = self.gateway.allowance(address, account, address).await?;
            allowance < amount
        } else {
            false
        };

        Ok(Some(ChainSnapshot {
            deployment: Deployment::Deployed,
            balance: units::format_balance(raw_balance, token.decimals),
            min_send_amount,
            needs_approval,
        }))
    }
}
