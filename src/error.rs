//! Error types for the Nexus bridge

use thiserror::Error;

/// Main error type for the bridge.
///
/// The `Display` text of each variant is what the user sees in the error
/// slot of the bridge view, so keep it short and human readable.
#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("No crypto wallet found.")]
    NoWalletFound,

    #[error("Wallet request was rejected.")]
    UserRejected,

    #[error("Failed to connect wallet.")]
    ConnectionFailed(String),

    #[error("Network {chain_id} is not recognized by the wallet")]
    NetworkUnrecognized { chain_id: u64 },

    #[error("Failed to add network.")]
    AddNetworkFailed(String),

    #[error("Failed to switch network: {0}")]
    SwitchNetworkFailed(String),

    #[error("LZ Endpoint not found for {network}")]
    EndpointNotConfigured { network: String },

    #[error("Contract not deployed on this network.")]
    ContractNotDeployed { network: String },

    #[error("Token {symbol} is not supported on {network}")]
    TokenNotSupported { symbol: String, network: String },

    #[error("Min amount: {minimum}")]
    BelowMinimumAmount { minimum: String },

    #[error("Fee estimation failed: {0}")]
    EstimationFailed(String),

    #[error("Approval failed")]
    ApprovalFailed(String),

    #[error("Deployment failed: {0}")]
    DeploymentFailed(String),

    #[error("{0}")]
    TransferFailed(String),

    #[error("{message}")]
    Remote {
        reason: Option<String>,
        message: String,
    },

    #[error("Invalid amount: {0}")]
    InvalidAmount(String),

    #[error("Network {chain_id} not found")]
    UnknownNetwork { chain_id: u64 },

    #[error("Token {0} not found")]
    UnknownToken(String),

    #[error("Wallet not connected")]
    NotConnected,

    #[error("No fee quote available")]
    NoQuote,

    #[error("Fee quote is out of date, wait for a new estimate")]
    StaleQuote,

    #[error("Another transaction is in progress ({state})")]
    Busy { state: String },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl BridgeError {
    /// Remote revert reason when the node returned one, otherwise the
    /// plain error text.
    pub fn reason_or_message(&self) -> String {
        match self {
            BridgeError::Remote {
                reason: Some(reason),
                ..
            } => reason.clone(),
            BridgeError::Remote { message, .. } => message.clone(),
            other => other.to_string(),
        }
    }

    /// Check if the error belongs in the user-visible error slot
    pub fn is_user_visible(&self) -> bool {
        !matches!(
            self,
            BridgeError::EstimationFailed(_) | BridgeError::NetworkUnrecognized { .. }
        )
    }

    /// Check if the failed flow returns to idle after the configured delay
    pub fn auto_resets(&self) -> bool {
        matches!(
            self,
            BridgeError::ApprovalFailed(_) | BridgeError::TransferFailed(_)
        )
    }
}

/// Result type for bridge operations
pub type BridgeResult<T> = Result<T, BridgeError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reason_preferred_over_message() {
        let err = BridgeError::Remote {
            reason: Some("OFTCore: amount too small".to_string()),
            message: "execution reverted".to_string(),
        };
        assert_eq!(err.reason_or_message(), "OFTCore: amount too small");

        let err = BridgeError::Remote {
            reason: None,
            message: "execution reverted".to_string(),
        };
        assert_eq!(err.reason_or_message(), "execution reverted");
    }

    #[test]
    fn test_estimation_failures_stay_silent() {
        assert!(!BridgeError::EstimationFailed("timeout".into()).is_user_visible());
        assert!(!BridgeError::NetworkUnrecognized { chain_id: 5 }.is_user_visible());
        assert!(BridgeError::NoWalletFound.is_user_visible());
        assert!(BridgeError::ApprovalFailed("x".into()).auto_resets());
        assert!(!BridgeError::BelowMinimumAmount { minimum: "1".into() }.auto_resets());
    }
}
