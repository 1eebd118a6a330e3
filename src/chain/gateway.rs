//! Ethers-backed gateway bound to the wallet's active chain

use super::contracts::{native_oft_deploy_abi, OftToken};
use super::{ChainGateway, DeployArgs, FeeRequest, SendRequest};
use crate::error::{BridgeError, BridgeResult};
use crate::wallet::{KeyWallet, SignerClient};

use async_trait::async_trait;
use ethers::contract::{ContractError, ContractFactory};
use ethers::prelude::*;
use std::fmt::Display;
use std::path::Path;
use std::sync::Arc;
use tracing::{debug, info};

/// Gateway that signs with the local wallet and talks to whatever chain the
/// wallet is currently on, the way a dApp uses the injected provider
pub struct EthersGateway {
    wallet: Arc<KeyWallet>,
    /// OFT creation bytecode; deployment is unavailable without it
    creation_bytecode: Option<Bytes>,
}

impl EthersGateway {
    pub fn new(wallet: Arc<KeyWallet>, creation_bytecode: Option<Bytes>) -> Self {
        Self {
            wallet,
            creation_bytecode,
        }
    }

    /// Read hex-encoded creation bytecode from disk
    pub fn load_bytecode(path: impl AsRef<Path>) -> BridgeResult<Bytes> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path).map_err(|e| {
            BridgeError::Config(format!("Failed to read bytecode {:?}: {}", path, e))
        })?;

        let trimmed = text.trim();
        let hex_str = trimmed.strip_prefix("0x").unwrap_or(trimmed);
        let bytes = hex::decode(hex_str)
            .map_err(|e| BridgeError::Config(format!("Invalid bytecode hex: {}", e)))?;

        Ok(Bytes::from(bytes))
    }

    async fn token(&self, address: Address) -> OftToken<SignerClient> {
        OftToken::new(address, self.wallet.client().await)
    }
}

fn contract_error<M: Middleware>(e: ContractError<M>) -> BridgeError {
    BridgeError::Remote {
        reason: e.decode_revert::<String>(),
        message: e.to_string(),
    }
}

fn provider_error(e: impl Display) -> BridgeError {
    BridgeError::Remote {
        reason: None,
        message: e.to_string(),
    }
}

#[async_trait]
impl ChainGateway for EthersGateway {
    async fn code_at(&self, address: Address) -> BridgeResult<Bytes> {
        let client = self.wallet.client().await;
        client.get_code(address, None).await.map_err(provider_error)
    }

    async fn native_balance(&self, owner: Address) -> BridgeResult<U256> {
        let client = self.wallet.client().await;
        client.get_balance(owner, None).await.map_err(provider_error)
    }

    async fn token_balance(&self, token: Address, owner: Address) -> BridgeResult<U256> {
        self.token(token)
            .await
            .balance_of(owner)
            .call()
            .await
            .map_err(contract_error)
    }

    async fn min_send_amount(&self, token: Address) -> BridgeResult<U256> {
        self.token(token)
            .await
            .min_send_amount()
            .call()
            .await
            .map_err(contract_error)
    }

    async fn allowance(
        &self,
        token: Address,
        owner: Address,
        spender: Address,
    ) -> BridgeResult<U256> {
        self.token(token)
            .await
            .allowance(owner, spender)
            .call()
            .await
            .map_err(contract_error)
    }

    async fn estimate_send_fee(
        &self,
        token: Address,
        request: FeeRequest,
    ) -> BridgeResult<(U256, U256)> {
        self.token(token)
            .await
            .estimate_send_fee(
                request.dst_chain_id,
                request.to_address,
                request.amount,
                request.use_zro,
                request.adapter_params,
            )
            .call()
            .await
            .map_err(contract_error)
    }

    async fn approve(&self, token: Address, spender: Address, amount: U256) -> BridgeResult<TxHash> {
        let contract = self.token(token).await;
        let call = contract.approve(spender, amount);
        let pending = call.send().await.map_err(contract_error)?;

        let tx_hash = pending.tx_hash();
        info!("Approval sent: {:?}", tx_hash);
        Ok(tx_hash)
    }

    async fn send_from(
        &self,
        token: Address,
        request: SendRequest,
        value: U256,
    ) -> BridgeResult<TxHash> {
        let contract = self.token(token).await;
        let call = contract
            .send_from(
                request.from,
                request.dst_chain_id,
                request.to_address,
                request.amount,
                request.refund_address,
                request.zro_payment_address,
                request.adapter_params,
            )
            .value(value);
        let pending = call.send().await.map_err(contract_error)?;

        let tx_hash = pending.tx_hash();
        info!("Transfer sent: {:?} (value {})", tx_hash, value);
        Ok(tx_hash)
    }

    async fn wait_for_confirmation(&self, tx_hash: TxHash) -> BridgeResult<()> {
        let client = self.wallet.client().await;
        let receipt = PendingTransaction::new(tx_hash, client.provider())
            .await
            .map_err(provider_error)?;

        match receipt {
            Some(receipt) if receipt.status == Some(U64::from(1)) => {
                debug!(
                    "Transaction {:?} confirmed in block {:?}",
                    tx_hash, receipt.block_number
                );
                Ok(())
            }
            Some(_) => Err(BridgeError::Remote {
                reason: Some("transaction reverted".to_string()),
                message: format!("Transaction {:?} reverted", tx_hash),
            }),
            None => Err(BridgeError::Remote {
                reason: None,
                message: format!("Transaction {:?} was dropped", tx_hash),
            }),
        }
    }

    async fn deploy(&self, args: DeployArgs) -> BridgeResult<Address> {
        let bytecode = self
            .creation_bytecode
            .clone()
            .ok_or_else(|| BridgeError::Config("No OFT creation bytecode configured".to_string()))?;

        let factory = ContractFactory::new(native_oft_deploy_abi()?, bytecode, self.wallet.client().await);

        info!(
            "Deploying {} ({}) with endpoint {:?}",
            args.name, args.symbol, args.endpoint
        );

        let deployer = factory
            .deploy((args.name, args.symbol, args.endpoint, args.min_send_amount))
            .map_err(contract_error)?;
        let contract = deployer.send().await.map_err(contract_error)?;

        Ok(contract.address())
    }
}

/// Stand-in used when no signing key is configured. The session never gets
/// an account without a wallet, so these calls only happen on misuse.
pub struct OfflineGateway;

#[async_trait]
impl ChainGateway for OfflineGateway {
    async fn code_at(&self, _: Address) -> BridgeResult<Bytes> {
        Err(BridgeError::NoWalletFound)
    }

    async fn native_balance(&self, _: Address) -> BridgeResult<U256> {
        Err(BridgeError::NoWalletFound)
    }

    async fn token_balance(&self, _: Address, _: Address) -> BridgeResult<U256> {
        Err(BridgeError::NoWalletFound)
    }

    async fn min_send_amount(&self, _: Address) -> BridgeResult<U256> {
        Err(BridgeError::NoWalletFound)
    }

    async fn allowance(&self, _: Address, _: Address, _: Address) -> BridgeResult<U256> {
        Err(BridgeError::NoWalletFound)
    }

    async fn estimate_send_fee(&self, _: Address, _: FeeRequest) -> BridgeResult<(U256, U256)> {
        Err(BridgeError::NoWalletFound)
    }

    async fn approve(&self, _: Address, _: Address, _: U256) -> BridgeResult<TxHash> {
        Err(BridgeError::NoWalletFound)
    }

    async fn send_from(&self, _: Address, _: SendRequest, _: U256) -> BridgeResult<TxHash> {
        Err(BridgeError::NoWalletFound)
    }

    async fn wait_for_confirmation(&self, _: TxHash) -> BridgeResult<()> {
        Err(BridgeError::NoWalletFound)
    }

    async fn deploy(&self, _: DeployArgs) -> BridgeResult<Address> {
        Err(BridgeError::NoWalletFound)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[tokio::test]
    async fn test_offline_gateway_needs_wallet() {
        let gateway = OfflineGateway;
        assert!(matches!(
            gateway.code_at(Address::zero()).await,
            Err(BridgeError::NoWalletFound)
        ));
        assert!(matches!(
            gateway.deploy(DeployArgs {
                name: "Native Goerli ETH".to_string(),
                symbol: "NETH".to_string(),
                endpoint: Address::zero(),
                min_send_amount: U256::zero(),
            })
            .await,
            Err(BridgeError::NoWalletFound)
        ));
    }

    #[test]
    fn test_load_bytecode_accepts_prefixed_hex() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "0x6080604052").unwrap();

        let bytes = EthersGateway::load_bytecode(file.path()).unwrap();
        assert_eq!(bytes.as_ref(), &[0x60, 0x80, 0x60, 0x40, 0x52]);
    }

    #[test]
    fn test_load_bytecode_rejects_garbage() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        write!(file, "not hex").unwrap();

        assert!(matches!(
            EthersGateway::load_bytecode(file.path()),
            Err(BridgeError::Config(_))
        ));
    }
}
