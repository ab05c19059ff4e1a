//! Error types for the Yellow ClearNode client.
//!
//! Two layers live here:
//!
//! - [`YellowError`]: the internal error hierarchy, derived with `thiserror`.
//!   Every fallible function in the workspace returns it.
//! - [`ReasonCode`]: the closed, public taxonomy attached to every fallback
//!   result. Downstream code switches on it to retry, change provider, or
//!   surface the failure to a user.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type alias using `YellowError`.
pub type Result<T> = std::result::Result<T, YellowError>;

/// Main error type for all internal operations.
///
/// Display strings are deliberately keyword-bearing: the provider classifies
/// failures from their lower-cased text, so the wording is part of the contract.
#[derive(Debug, Error)]
pub enum YellowError {
    // ═══════════════════════════════════════════════════════════════════════════
    // CONNECTION ERRORS
    // ═══════════════════════════════════════════════════════════════════════════
    /// Socket could not be opened.
    #[error("WebSocket connection failed: {0}")]
    ConnectionFailed(String),

    /// Socket closed before the handshake completed.
    #[error("WebSocket connection closed before established")]
    ClosedBeforeEstablished,

    /// Operation requires an open socket.
    #[error("WebSocket is not connected")]
    NotConnected,

    /// The client tore the connection down.
    #[error("Connection closed by client")]
    ClosedByClient,

    /// Automatic reconnection gave up.
    #[error("Reconnection failed after {attempts} attempts, ClearNode unavailable")]
    ReconnectExhausted {
        /// Attempts made before giving up
        attempts: u32,
    },

    /// Transport-level failure on an open socket.
    #[error("WebSocket error: {0}")]
    WebSocket(String),

    /// A correlated request received no reply in time.
    #[error("Request timeout: no '{method}' reply after {timeout_ms}ms")]
    Timeout {
        /// Correlation method name
        method: String,
        /// Timeout that elapsed
        timeout_ms: u64,
    },

    // ═══════════════════════════════════════════════════════════════════════════
    // RELAY / PROTOCOL ERRORS
    // ═══════════════════════════════════════════════════════════════════════════
    /// ClearNode answered with an error payload.
    #[error("ClearNode rejected {method}: {message}")]
    Relay {
        /// Request method that was rejected
        method: String,
        /// Relay-provided reason
        message: String,
    },

    /// Reply was missing a field the protocol requires.
    #[error("Malformed {method} response: {reason}")]
    MalformedResponse {
        /// Reply method
        method: String,
        /// What was missing or wrong
        reason: String,
    },

    // ═══════════════════════════════════════════════════════════════════════════
    // AUTHENTICATION ERRORS
    // ═══════════════════════════════════════════════════════════════════════════
    /// The auth handshake did not succeed.
    #[error("Authentication failed: {0}")]
    AuthFailed(String),

    /// No live session is available.
    #[error("Session not authenticated")]
    NotAuthenticated,

    /// Wallet or session key refused to sign.
    #[error("Signing failed: {0}")]
    SigningFailed(String),

    // ═══════════════════════════════════════════════════════════════════════════
    // CHANNEL ERRORS
    // ═══════════════════════════════════════════════════════════════════════════
    /// No cached channel with this id.
    #[error("Channel not found: {0}")]
    ChannelNotFound(String),

    /// Channel is under dispute and cannot be operated cooperatively.
    #[error("Channel {0} is in dispute")]
    ChannelInDispute(String),

    /// Sender cannot cover a transfer line.
    #[error("Insufficient channel balance: requested {requested}, available {available}")]
    InsufficientChannelBalance {
        /// Requested amount (decimal)
        requested: String,
        /// Available amount (decimal)
        available: String,
    },

    // ═══════════════════════════════════════════════════════════════════════════
    // CHAIN ERRORS
    // ═══════════════════════════════════════════════════════════════════════════
    /// A read-only contract call failed.
    #[error("On-chain query failed for channel {channel_id}: {reason}")]
    ChainQuery {
        /// Channel being queried
        channel_id: String,
        /// Underlying failure
        reason: String,
    },

    /// A settlement transaction failed or reverted.
    #[error("Transaction failed: {reason}")]
    TransactionFailed {
        /// Underlying failure
        reason: String,
        /// Hash of the transaction, if it was broadcast
        tx_hash: Option<String>,
    },

    /// Chain id is not in the supported set.
    #[error("Unsupported chain: {0}")]
    UnsupportedChain(u64),

    // ═══════════════════════════════════════════════════════════════════════════
    // VALIDATION & CONFIG ERRORS
    // ═══════════════════════════════════════════════════════════════════════════
    /// Required parameters are absent or blank.
    #[error("Missing required parameters: {}", .0.join(", "))]
    MissingParams(Vec<String>),

    /// Input validation failed.
    #[error("Validation error: {0}")]
    ValidationError(String),

    /// Configuration error.
    #[error("Configuration error: {0}")]
    ConfigError(String),

    // ═══════════════════════════════════════════════════════════════════════════
    // SERIALIZATION ERRORS
    // ═══════════════════════════════════════════════════════════════════════════
    /// JSON serialization/deserialization error.
    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),

    /// Invalid hex encoding.
    #[error("Invalid hex encoding: {0}")]
    HexError(#[from] hex::FromHexError),

    // ═══════════════════════════════════════════════════════════════════════════
    // INTERNAL ERRORS
    // ═══════════════════════════════════════════════════════════════════════════
    /// Internal invariant violation (should never happen).
    #[error("Internal error: {0}")]
    InternalError(String),
}

impl YellowError {
    /// Returns true if retrying the same call may succeed.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            YellowError::ConnectionFailed(_)
                | YellowError::ClosedBeforeEstablished
                | YellowError::NotConnected
                | YellowError::WebSocket(_)
                | YellowError::Timeout { .. }
                | YellowError::ChainQuery { .. }
        )
    }

    /// Failure of a transaction that was never broadcast.
    pub fn tx_failed(reason: impl Into<String>) -> Self {
        YellowError::TransactionFailed {
            reason: reason.into(),
            tx_hash: None,
        }
    }

    /// Hash of the broadcast transaction behind a settlement failure.
    pub fn tx_hash(&self) -> Option<&str> {
        match self {
            YellowError::TransactionFailed { tx_hash, .. } => tx_hash.as_deref(),
            _ => None,
        }
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// REASON CODES
// ═══════════════════════════════════════════════════════════════════════════════

/// Machine-readable reason attached to every fallback result.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ReasonCode {
    /// Required input is absent or blank.
    MissingParams,
    /// Chain id outside the supported set.
    UnsupportedChain,
    /// Wallet-level balance too low.
    InsufficientBalance,
    /// Channel allocation too low for the requested transfer.
    InsufficientChannelBalance,
    /// No solver answered the intent.
    NoSolverQuotes,
    /// ClearNode unreachable or unclassified failure.
    YellowUnavailable,
    /// On-chain settlement failed or reverted.
    YellowTxFailed,
    /// Session handshake failed or expired.
    YellowAuthFailed,
    /// A relay round trip timed out.
    YellowTimeout,
    /// Channel is under dispute.
    YellowChannelDispute,
    /// WebSocket transport error.
    YellowWsError,
}

impl ReasonCode {
    /// Every code in the taxonomy.
    pub const ALL: [ReasonCode; 11] = [
        ReasonCode::MissingParams,
        ReasonCode::UnsupportedChain,
        ReasonCode::InsufficientBalance,
        ReasonCode::InsufficientChannelBalance,
        ReasonCode::NoSolverQuotes,
        ReasonCode::YellowUnavailable,
        ReasonCode::YellowTxFailed,
        ReasonCode::YellowAuthFailed,
        ReasonCode::YellowTimeout,
        ReasonCode::YellowChannelDispute,
        ReasonCode::YellowWsError,
    ];

    /// Wire representation of the code.
    pub fn as_str(&self) -> &'static str {
        match self {
            ReasonCode::MissingParams => "MISSING_PARAMS",
            ReasonCode::UnsupportedChain => "UNSUPPORTED_CHAIN",
            ReasonCode::InsufficientBalance => "INSUFFICIENT_BALANCE",
            ReasonCode::InsufficientChannelBalance => "INSUFFICIENT_CHANNEL_BALANCE",
            ReasonCode::NoSolverQuotes => "NO_SOLVER_QUOTES",
            ReasonCode::YellowUnavailable => "YELLOW_UNAVAILABLE",
            ReasonCode::YellowTxFailed => "YELLOW_TX_FAILED",
            ReasonCode::YellowAuthFailed => "YELLOW_AUTH_FAILED",
            ReasonCode::YellowTimeout => "YELLOW_TIMEOUT",
            ReasonCode::YellowChannelDispute => "YELLOW_CHANNEL_DISPUTE",
            ReasonCode::YellowWsError => "YELLOW_WS_ERROR",
        }
    }
}

impl std::fmt::Display for ReasonCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = YellowError::InsufficientChannelBalance {
            requested: "500".into(),
            available: "100".into(),
        };
        assert!(err.to_string().contains("500"));
        assert!(err.to_string().contains("100"));

        let err = YellowError::MissingParams(vec!["inputToken".into(), "inputAmount".into()]);
        assert_eq!(
            err.to_string(),
            "Missing required parameters: inputToken, inputAmount"
        );
    }

    #[test]
    fn test_error_classification() {
        assert!(YellowError::NotConnected.is_recoverable());
        assert!(YellowError::Timeout { method: "transfer".into(), timeout_ms: 10 }.is_recoverable());
        assert!(!YellowError::AuthFailed("bad".into()).is_recoverable());

    }

    #[test]
    fn test_transaction_failure_carries_hash() {
        let err = YellowError::TransactionFailed {
            reason: "close 0xabc reverted".into(),
            tx_hash: Some("0xabc".into()),
        };
        assert_eq!(err.to_string(), "Transaction failed: close 0xabc reverted");
        assert_eq!(err.tx_hash(), Some("0xabc"));

        let err = YellowError::tx_failed("nonce too low");
        assert_eq!(err.tx_hash(), None);
        assert_eq!(YellowError::NotConnected.tx_hash(), None);
    }

    #[test]
    fn test_json_error_conversion() {
        let json_result: std::result::Result<serde_json::Value, _> = serde_json::from_str("invalid");
        let result: Result<serde_json::Value> = json_result.map_err(YellowError::from);
        assert!(matches!(result, Err(YellowError::JsonError(_))));
    }

    #[test]
    fn test_reason_code_wire_format() {
        for code in ReasonCode::ALL {
            let json = serde_json::to_string(&code).unwrap();
            assert_eq!(json, format!("\"{}\"", code.as_str()));
            let back: ReasonCode = serde_json::from_str(&json).unwrap();
            assert_eq!(back, code);
        }
    }
}
