//! Session types for ClearNode authentication.

use serde::{Deserialize, Serialize};

/// Asset allowance granted to a session key.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Allowance {
    /// Asset identifier (e.g., "usdc")
    pub asset: String,
    /// Maximum allowed amount (decimal string)
    pub amount: String,
}

/// Parameters of an authentication handshake.
///
/// Remembered after a successful handshake so the session can be replayed.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthParams {
    /// Requested allowances
    pub allowances: Vec<Allowance>,
    /// Session lifetime in seconds
    pub ttl_secs: u64,
    /// Application name presented to the relay
    pub application: String,
    /// Application scope
    pub scope: String,
}

/// A live (or expired) authenticated session.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SessionInfo {
    /// Ephemeral session key address
    pub session_address: String,
    /// Expiry (unix seconds)
    #[serde(with = "crate::serialization::lenient_u64")]
    pub expires_at: u64,
    /// Whether the session is still considered authenticated
    pub authenticated: bool,
}

impl SessionInfo {
    /// Returns true if the session has reached its expiry at `now`.
    pub fn is_expired_at(&self, now: u64) -> bool {
        now >= self.expires_at
    }
}
