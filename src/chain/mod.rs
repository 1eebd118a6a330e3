//! Chain module - chain queries, OFT contract calls and deployment
//!
//! This module provides:
//! - The `ChainGateway` boundary used by the transfer flow
//! - Routing payload encoding for LayerZero sends
//! - An ethers-backed gateway bound to the wallet's active chain

pub mod contracts;
pub mod gateway;

pub use gateway::{EthersGateway, OfflineGateway};

use crate::error::BridgeResult;

use async_trait::async_trait;
use ethers::types::{Address, Bytes, TxHash, U256};

#[cfg(test)]
use mockall::automock;

/// Arguments for `estimateSendFee`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeeRequest {
    pub dst_chain_id: u16,
    pub to_address: Bytes,
    pub amount: U256,
    pub use_zro: bool,
    pub adapter_params: Bytes,
}

/// Arguments for `sendFrom`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SendRequest {
    pub from: Address,
    pub dst_chain_id: u16,
    pub to_address: Bytes,
    pub amount: U256,
    pub refund_address: Address,
    pub zro_payment_address: Address,
    pub adapter_params: Bytes,
}

/// Constructor arguments for a new native OFT
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DeployArgs {
    pub name: String,
    pub symbol: String,
    pub endpoint: Address,
    pub min_send_amount: U256,
}

/// Destination routing for one transfer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoutingPayload {
    pub dst_chain_id: u16,
    pub to_address: Bytes,
    pub adapter_params: Bytes,
}

impl RoutingPayload {
    pub fn new(dst_chain_id: u16, recipient: Address, adapter_version: u16, gas: u64) -> Self {
        Self {
            dst_chain_id,
            to_address: recipient_bytes(recipient),
            adapter_params: adapter_params(adapter_version, gas),
        }
    }

    pub fn fee_request(&self, amount: U256) -> FeeRequest {
        FeeRequest {
            dst_chain_id: self.dst_chain_id,
            to_address: self.to_address.clone(),
            amount,
            use_zro: false,
            adapter_params: self.adapter_params.clone(),
        }
    }

    /// Send from `account`, refunding excess fees to it and paying no ZRO
    pub fn send_request(&self, account: Address, amount: U256) -> SendRequest {
        SendRequest {
            from: account,
            dst_chain_id: self.dst_chain_id,
            to_address: self.to_address.clone(),
            amount,
            refund_address: account,
            zro_payment_address: Address::zero(),
            adapter_params: self.adapter_params.clone(),
        }
    }
}

/// Packed `(uint16 version, uint256 gas)` adapter parameters
pub fn adapter_params(version: u16, gas: u64) -> Bytes {
    let mut word = [0u8; 32];
    U256::from(gas).to_big_endian(&mut word);

    let mut out = Vec::with_capacity(34);
    out.extend_from_slice(&version.to_be_bytes());
    out.extend_from_slice(&word);
    Bytes::from(out)
}

/// Packed 20-byte recipient address
pub fn recipient_bytes(recipient: Address) -> Bytes {
    Bytes::from(recipient.as_bytes().to_vec())
}

/// Chain queries and contract calls against the wallet's active network
#[cfg_attr(test, automock)]
#[async_trait]
pub trait ChainGateway: Send + Sync {
    /// Deployed bytecode at `address` (empty when nothing is deployed)
    async fn code_at(&self, address: Address) -> BridgeResult<Bytes>;

    async fn native_balance(&self, owner: Address) -> BridgeResult<U256>;

    async fn token_balance(&self, token: Address, owner: Address) -> BridgeResult<U256>;

    async fn min_send_amount(&self, token: Address) -> BridgeResult<U256>;

    async fn allowance(&self, token: Address, owner: Address, spender: Address)
        -> BridgeResult<U256>;

    /// Returns `(native_fee, zro_fee)`
    async fn estimate_send_fee(&self, token: Address, request: FeeRequest)
        -> BridgeResult<(U256, U256)>;

    async fn approve(&self, token: Address, spender: Address, amount: U256) -> BridgeResult<TxHash>;

    async fn send_from(&self, token: Address, request: SendRequest, value: U256)
        -> BridgeResult<TxHash>;

    /// Wait until the transaction is mined; errors if it reverted
    async fn wait_for_confirmation(&self, tx_hash: TxHash) -> BridgeResult<()>;

    /// Create a native OFT and return its address once mined
    async fn deploy(&self, args: DeployArgs) -> BridgeResult<Address>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_adapter_params_layout() {
        let params = adapter_params(1, 200_000);
        assert_eq!(params.len(), 34);
        assert_eq!(&params[..2], &[0x00, 0x01]);
        // 200_000 = 0x030d40, right-aligned in the word
        let mut word = [0u8; 32];
        word[29..].copy_from_slice(&[0x03, 0x0d, 0x40]);
        assert_eq!(&params[2..], &word[..]);
    }

    #[test]
    fn test_routing_payload_requests() {
        let account: Address = "0x2e5221B0f855Be4ea5Cefffb8311EED0563B6e87".parse().unwrap();
        let payload = RoutingPayload::new(101, account, 1, 200_000);
        assert_eq!(payload.to_address.as_ref(), account.as_bytes());

        let send = payload.send_request(account, U256::from(5u64));
        assert_eq!(send.refund_address, account);
        assert_eq!(send.zro_payment_address, Address::zero());
        assert_eq!(send.dst_chain_id, 101);

        let fee = payload.fee_request(U256::from(5u64));
        assert!(!fee.use_zro);
        assert_eq!(fee.adapter_params, payload.adapter_params);
    }
}
