//! Tagged results returned by every public provider operation.

use serde::{Deserialize, Serialize};

use crate::error::{ReasonCode, YellowError};

/// Fallback descriptor: the operation failed and the caller should fall back.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Fallback {
    /// Always true; lets untyped consumers detect fallbacks with one check
    pub enabled: bool,
    /// Machine-readable reason
    pub reason_code: ReasonCode,
    /// Human-readable explanation
    pub message: String,
    /// Channel id obtained before the failure, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel_id: Option<String>,
    /// Transaction hash obtained before the failure, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tx_hash: Option<String>,
    /// Revert reason extracted from a failed transaction
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub revert_reason: Option<String>,
}

impl Fallback {
    /// Creates a fallback with the given reason.
    pub fn new(reason_code: ReasonCode, message: impl Into<String>) -> Self {
        Self {
            enabled: true,
            reason_code,
            message: message.into(),
            channel_id: None,
            tx_hash: None,
            revert_reason: None,
        }
    }

    /// Attaches the channel id obtained so far.
    pub fn with_channel_id(mut self, channel_id: impl Into<String>) -> Self {
        self.channel_id = Some(channel_id.into());
        self
    }

    /// Attaches the transaction hash obtained so far.
    pub fn with_tx_hash(mut self, tx_hash: impl Into<String>) -> Self {
        self.tx_hash = Some(tx_hash.into());
        self
    }

    /// Attaches an extracted revert reason.
    pub fn with_revert_reason(mut self, reason: Option<String>) -> Self {
        self.revert_reason = reason;
        self
    }
}

/// Success payload or fallback descriptor.
///
/// Serializes untagged: a success is the bare payload, a fallback is
/// `{"fallback": {...}}`.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Outcome<T> {
    /// A fallback-tagged failure.
    Fallback {
        /// Failure descriptor
        fallback: Fallback,
    },
    /// The operation succeeded.
    Success(T),
}

impl<T> Outcome<T> {
    /// Wraps a fallback.
    pub fn fallback(fallback: Fallback) -> Self {
        Outcome::Fallback { fallback }
    }

    /// Returns true for a success.
    pub fn is_success(&self) -> bool {
        matches!(self, Outcome::Success(_))
    }

    /// Returns the success payload, if any.
    pub fn success(&self) -> Option<&T> {
        match self {
            Outcome::Success(value) => Some(value),
            Outcome::Fallback { .. } => None,
        }
    }

    /// Returns the fallback descriptor, if any.
    pub fn as_fallback(&self) -> Option<&Fallback> {
        match self {
            Outcome::Fallback { fallback } => Some(fallback),
            Outcome::Success(_) => None,
        }
    }

    /// Returns the fallback reason code, if any.
    pub fn reason_code(&self) -> Option<ReasonCode> {
        self.as_fallback().map(|f| f.reason_code)
    }

    /// Converts into a standard `Result`.
    pub fn into_result(self) -> std::result::Result<T, Fallback> {
        match self {
            Outcome::Success(value) => Ok(value),
            Outcome::Fallback { fallback } => Err(fallback),
        }
    }

    /// Maps the success payload.
    pub fn map<U>(self, f: impl FnOnce(T) -> U) -> Outcome<U> {
        match self {
            Outcome::Success(value) => Outcome::Success(f(value)),
            Outcome::Fallback { fallback } => Outcome::Fallback { fallback },
        }
    }
}

impl<T: Serialize> Outcome<T> {
    /// Renders the outcome as JSON with every unsafe integer stringified.
    pub fn to_json_safe(&self) -> crate::error::Result<serde_json::Value> {
        crate::serialization::to_json_safe(self)
    }
}

impl<T> From<Fallback> for Outcome<T> {
    fn from(fallback: Fallback) -> Self {
        Outcome::fallback(fallback)
    }
}

/// Builds a fallback from an error and a reason code chosen by the caller.
impl From<(ReasonCode, &YellowError)> for Fallback {
    fn from((code, err): (ReasonCode, &YellowError)) -> Self {
        Fallback::new(code, err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fallback_wire_format() {
        let outcome: Outcome<u32> = Fallback::new(ReasonCode::YellowTimeout, "slow")
            .with_channel_id("0xc")
            .into();
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["fallback"]["enabled"], true);
        assert_eq!(json["fallback"]["reasonCode"], "YELLOW_TIMEOUT");
        assert_eq!(json["fallback"]["channelId"], "0xc");
        assert!(json["fallback"].get("txHash").is_none());
    }

    #[test]
    fn test_success_is_bare_payload() {
        let outcome = Outcome::Success(serde_json::json!({"channelId": "0x1"}));
        let json = serde_json::to_value(&outcome).unwrap();
        assert_eq!(json["channelId"], "0x1");
        assert!(outcome.is_success());
        assert!(outcome.reason_code().is_none());
    }

    #[test]
    fn test_to_json_safe_stringifies_big_integers() {
        let outcome = Outcome::Success(serde_json::json!({"nonce": u64::MAX, "small": 7}));
        let json = outcome.to_json_safe().unwrap();
        assert_eq!(json["nonce"], u64::MAX.to_string());
        assert_eq!(json["small"], 7);
    }

    #[test]
    fn test_into_result() {
        let ok: Outcome<u8> = Outcome::Success(3);
        assert_eq!(ok.into_result().unwrap(), 3);

        let err: Outcome<u8> = Fallback::new(ReasonCode::MissingParams, "x").into();
        assert_eq!(err.into_result().unwrap_err().reason_code, ReasonCode::MissingParams);
    }
}
