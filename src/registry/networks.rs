//! Static network table and LayerZero endpoint addresses

use ethers::types::Address;
use lazy_static::lazy_static;
use serde::Serialize;
use std::collections::HashMap;

/// Production or test network
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum NetworkKind {
    Mainnet,
    Testnet,
}

/// A network the bridge can route through
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct NetworkDescriptor {
    pub chain_id: u64,
    /// LayerZero v1 routing id
    pub lz_chain_id: u16,
    pub name: &'static str,
    pub symbol: &'static str,
    pub rpc_url: &'static str,
    pub kind: NetworkKind,
}

impl NetworkDescriptor {
    pub fn is_mainnet(&self) -> bool {
        self.kind == NetworkKind::Mainnet
    }
}

const fn network(
    chain_id: u64,
    lz_chain_id: u16,
    name: &'static str,
    symbol: &'static str,
    rpc_url: &'static str,
    kind: NetworkKind,
) -> NetworkDescriptor {
    NetworkDescriptor {
        chain_id,
        lz_chain_id,
        name,
        symbol,
        rpc_url,
        kind,
    }
}

pub const NETWORKS: [NetworkDescriptor; 9] = [
    // Mainnets
    network(1, 101, "Ethereum", "ETH", "https://eth.llamarpc.com", NetworkKind::Mainnet),
    network(42161, 110, "Arbitrum", "ETH", "https://arb1.arbitrum.io/rpc", NetworkKind::Mainnet),
    network(137, 109, "Polygon", "MATIC", "https://polygon-rpc.com", NetworkKind::Mainnet),
    network(56, 102, "BNB Chain", "BNB", "https://bsc-dataseed.binance.org", NetworkKind::Mainnet),
    // Testnets
    network(5, 10121, "Goerli", "ETH", "https://rpc.ankr.com/eth_goerli", NetworkKind::Testnet),
    network(11155111, 10161, "Sepolia", "SEP", "https://rpc.sepolia.org", NetworkKind::Testnet),
    network(
        421613,
        10143,
        "Arbitrum Goerli",
        "AGOR",
        "https://goerli-rollup.arbitrum.io/rpc",
        NetworkKind::Testnet,
    ),
    network(80001, 10109, "Mumbai", "MATIC", "https://rpc-mumbai.maticvigil.com", NetworkKind::Testnet),
    network(
        97,
        10102,
        "BSC Testnet",
        "tBNB",
        "https://data-seed-prebsc-1-s1.binance.org:8545",
        NetworkKind::Testnet,
    ),
];

lazy_static! {
    /// LayerZero endpoint per chain, needed to deploy a new OFT
    pub static ref LZ_ENDPOINTS: HashMap<u64, Address> = [
        (1, "0x66A71Dcef29A0fFBDBE3c6a460a3B5BC225Cd675"),
        (5, "0xbfD2135BFfbb0B5378b56643c2Df8a87552Bfa23"),
        (11155111, "0xae92d5aD7583AD66E49A0c67BAd18F6ba52dDDc1"),
        (42161, "0x3c2269811836af69497E5F486A85D7316753cf62"),
        (137, "0x3c2269811836af69497E5F486A85D7316753cf62"),
        (56, "0x3c2269811836af69497E5F486A85D7316753cf62"),
        (80001, "0xf69186dfBa60DdB133E91E9A4B5673624293d8F8"),
        (97, "0x6Fcb97553D41516Cb228ac03FdC8B9a0a9df04A1"),
        (421613, "0x6aB5Ae6822647046626e83ee6dB8187151E1d5ab"),
    ]
    .into_iter()
    .map(|(chain_id, address)| (chain_id, address.parse().unwrap()))
    .collect();
}
