//! OFT contract bindings

use crate::error::{BridgeError, BridgeResult};

use ethers::abi::{parse_abi, Abi};
use ethers::contract::abigen;

// Union of the native and ERC-20 OFT interfaces; the ERC-20 only methods
// are never called on native tokens.
abigen!(
    OftToken,
    r#"[
        function sendFrom(address _from, uint16 _dstChainId, bytes _toAddress, uint256 _amount, address _refundAddress, address _zroPaymentAddress, bytes _adapterParams) external payable
        function estimateSendFee(uint16 _dstChainId, bytes _toAddress, uint256 _amount, bool _useZro, bytes _adapterParams) external view returns (uint256 nativeFee, uint256 zroFee)
        function deposit() external payable
        function balanceOf(address account) external view returns (uint256)
        function approve(address spender, uint256 amount) external returns (bool)
        function allowance(address owner, address spender) external view returns (uint256)
        function minSendAmount() external view returns (uint256)
        function circulatingSupply() external view returns (uint256)
    ]"#
);

/// Constructor of the native OFT creation template
pub const NATIVE_OFT_CONSTRUCTOR: &str =
    "constructor(string _name, string _symbol, address _lzEndpoint, uint256 _minSendAmount)";

/// ABI used with the creation bytecode when deploying
pub fn native_oft_deploy_abi() -> BridgeResult<Abi> {
    parse_abi(&[NATIVE_OFT_CONSTRUCTOR]).map_err(|e| BridgeError::Config(e.to_string()))
}
