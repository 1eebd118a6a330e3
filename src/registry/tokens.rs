//! Bridgeable token definitions

use ethers::types::Address;
use serde::Serialize;
use std::collections::HashMap;

/// Which OFT binding the token contract speaks
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TokenInterface {
    /// Wraps the chain's native asset; value travels with the call
    NativeOft,
    /// ERC-20 style OFT that needs an allowance before sending
    Erc20Oft,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TokenDescriptor {
    pub symbol: String,
    pub name: String,
    pub decimals: u32,
    pub is_native: bool,
    pub interface: TokenInterface,
    /// Chain id to contract address; the zero address marks "unset"
    pub addresses: HashMap<u64, Address>,
}

impl TokenDescriptor {
    /// Contract address on a chain, or the zero sentinel when none is known
    pub fn address_on(&self, chain_id: u64) -> Address {
        self.addresses
            .get(&chain_id)
            .copied()
            .unwrap_or_else(Address::zero)
    }
}

/// True for the sentinel used by unset addresses
pub fn is_unset(address: &Address) -> bool {
    address.is_zero()
}

const GOERLI_NATIVE_OFT: &str = "0x2e5221B0f855Be4ea5Cefffb8311EED0563B6e87";
const MAINNET_NATIVE_OFT: &str = "0x4f7A67464B5976d7547c860109e4432d50AfB38e";

/// Chains every token has an explicit entry for
const LISTED_CHAINS: [u64; 9] = [1, 5, 11155111, 97, 80001, 42161, 137, 56, 421613];

fn placeholder_addresses() -> HashMap<u64, Address> {
    LISTED_CHAINS
        .iter()
        .map(|chain_id| (*chain_id, Address::zero()))
        .collect()
}

pub fn builtin_tokens() -> Vec<TokenDescriptor> {
    let mut native = placeholder_addresses();
    native.insert(1, MAINNET_NATIVE_OFT.parse().unwrap_or_default());
    native.insert(5, GOERLI_NATIVE_OFT.parse().unwrap_or_default());

    vec![
        TokenDescriptor {
            symbol: "ETH".to_string(),
            name: "Native Ether".to_string(),
            decimals: 18,
            is_native: true,
            interface: TokenInterface::NativeOft,
            addresses: native,
        },
        TokenDescriptor {
            symbol: "METH".to_string(),
            name: "Mock Ether OFT".to_string(),
            decimals: 18,
            is_native: false,
            interface: TokenInterface::Erc20Oft,
            addresses: placeholder_addresses(),
        },
    ]
}
