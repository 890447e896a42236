//! Failure taxonomy surfaced to callers of the engine.

use alloy_primitives::{Address, B256};
use serde::Serialize;
use thiserror::Error;

/// Coarse failure classes, one per user-facing outcome.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum FailureKind {
    InvalidInput,
    NoRoute,
    ApprovalError,
    ConfigMismatch,
    Reverted,
    UserRejected,
    NetworkError,
    Timeout,
}

impl std::fmt::Display for FailureKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            FailureKind::InvalidInput => "InvalidInput",
            FailureKind::NoRoute => "NoRoute",
            FailureKind::ApprovalError => "ApprovalError",
            FailureKind::ConfigMismatch => "ConfigMismatch",
            FailureKind::Reverted => "Reverted",
            FailureKind::UserRejected => "UserRejected",
            FailureKind::NetworkError => "NetworkError",
            FailureKind::Timeout => "Timeout",
        };
        write!(f, "{}", name)
    }
}

#[derive(Debug, Clone, Error)]
pub enum SwapError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("no route with liquidity for {token_in:?} -> {token_out:?}")]
    NoRoute { token_in: Address, token_out: Address },

    #[error("approval failed: {0}")]
    Approval(String),

    #[error("configuration mismatch: {0}")]
    ConfigMismatch(String),

    #[error("transaction reverted: {reason}")]
    Reverted { reason: String, tx_hash: Option<B256> },

    #[error("request rejected by signer")]
    UserRejected,

    #[error("network error: {0}")]
    Network(String),

    #[error("timed out: {0}")]
    Timeout(String),
}

/// Substrings that identify an insufficient-output revert
const SLIPPAGE_MARKERS: [&str; 5] = [
    "slippage",
    "insufficient output",
    "insufficient_output_amount",
    "minout",
    "too little received",
];

impl SwapError {
    pub fn reverted(reason: impl Into<String>) -> Self {
        SwapError::Reverted {
            reason: reason.into(),
            tx_hash: None,
        }
    }

    pub fn kind(&self) -> FailureKind {
        match self {
            SwapError::InvalidInput(_) => FailureKind::InvalidInput,
            SwapError::NoRoute { .. } => FailureKind::NoRoute,
            SwapError::Approval(_) => FailureKind::ApprovalError,
            SwapError::ConfigMismatch(_) => FailureKind::ConfigMismatch,
            SwapError::Reverted { .. } => FailureKind::Reverted,
            SwapError::UserRejected => FailureKind::UserRejected,
            SwapError::Network(_) => FailureKind::NetworkError,
            SwapError::Timeout(_) => FailureKind::Timeout,
        }
    }

    /// Revert caused by realized output falling under the minimum
    pub fn is_slippage(&self) -> bool {
        match self {
            SwapError::Reverted { reason, .. } => {
                let reason = reason.to_lowercase();
                SLIPPAGE_MARKERS.iter().any(|m| reason.contains(m))
            }
            _ => false,
        }
    }

    /// Wrap any failure that happened while approving
    pub fn into_approval(self) -> Self {
        match self {
            SwapError::Approval(_) => self,
            other => SwapError::Approval(other.to_string()),
        }
    }

    /// Short message suitable for a toast or a CLI status line
    pub fn user_message(&self) -> String {
        match self {
            SwapError::InvalidInput(msg) => format!("Invalid swap request: {}", msg),
            SwapError::NoRoute { .. } => "No liquidity route found for this pair".to_string(),
            SwapError::Approval(_) => "Token approval failed, please approve again".to_string(),
            SwapError::ConfigMismatch(msg) => format!("Aggregator misconfigured: {}", msg),
            SwapError::Reverted { .. } if self.is_slippage() => {
                "Price moved beyond your slippage tolerance, try increasing slippage".to_string()
            }
            SwapError::Reverted { reason, .. } => format!("Transaction reverted: {}", reason),
            SwapError::UserRejected => "Transaction rejected by user".to_string(),
            SwapError::Network(_) => "Network error, please retry".to_string(),
            SwapError::Timeout(_) => "Transaction not confirmed before the deadline".to_string(),
        }
    }

    /// Classify a raw signer/RPC error message.
    pub fn classify(message: &str) -> Self {
        let lower = message.to_lowercase();

        if lower.contains("user rejected")
            || lower.contains("user denied")
            || lower.contains("rejected by user")
        {
            return SwapError::UserRejected;
        }

        if let Some(idx) = message.find("execution reverted") {
            let rest = message[idx + "execution reverted".len()..]
                .trim_start_matches(|c: char| c == ':' || c.is_whitespace());
            let reason = if rest.is_empty() { "execution reverted" } else { rest };
            return SwapError::reverted(reason);
        }

        if lower.contains("revert") {
            return SwapError::reverted(message);
        }

        if lower.contains("insufficient funds") {
            return SwapError::reverted("insufficient funds for transaction");
        }

        if lower.contains("timeout") || lower.contains("timed out") {
            return SwapError::Timeout(message.to_string());
        }

        SwapError::Network(message.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_classify_messages() {
        assert_eq!(
            SwapError::classify("MetaMask: user rejected transaction").kind(),
            FailureKind::UserRejected
        );
        assert_eq!(
            SwapError::classify("connection refused").kind(),
            FailureKind::NetworkError
        );
        assert_eq!(
            SwapError::classify("request timed out after 30s").kind(),
            FailureKind::Timeout
        );

        match SwapError::classify("server returned an error response: execution reverted: Expired") {
            SwapError::Reverted { reason, .. } => assert_eq!(reason, "Expired"),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn test_slippage_message() {
        let err = SwapError::reverted("Insufficient output");
        assert!(err.is_slippage());
        assert!(err.user_message().contains("slippage"));

        let err = SwapError::reverted("Router not allowed");
        assert!(!err.is_slippage());
        assert_eq!(err.user_message(), "Transaction reverted: Router not allowed");

        assert!(SwapError::Network("eof".into()).user_message().contains("retry"));
    }

    #[test]
    fn test_into_approval_keeps_cause() {
        let err = SwapError::Network("eof".into()).into_approval();
        assert_eq!(err.kind(), FailureKind::ApprovalError);
        assert!(err.to_string().contains("eof"));
    }
}
