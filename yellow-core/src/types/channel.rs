//! Channel state and allocation types.

use serde::{Deserialize, Serialize};

use crate::constants::{INTENT_FINALIZE, INTENT_RESIZE};
use crate::error::{Result, YellowError};

/// On-chain lifecycle status of a channel.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ChannelStatus {
    /// Channel does not exist on-chain.
    Void,
    /// Channel created, awaiting all participants.
    Initial,
    /// Channel is funded and operating.
    Active,
    /// A challenge is running.
    Dispute,
    /// Channel is closed and settled.
    Final,
}

impl ChannelStatus {
    /// Wire representation of the status.
    pub fn as_str(&self) -> &'static str {
        match self {
            ChannelStatus::Void => "VOID",
            ChannelStatus::Initial => "INITIAL",
            ChannelStatus::Active => "ACTIVE",
            ChannelStatus::Dispute => "DISPUTE",
            ChannelStatus::Final => "FINAL",
        }
    }

    /// Parses a relay-provided status label, case-insensitively.
    pub fn parse(label: &str) -> Option<Self> {
        match label.trim().to_ascii_uppercase().as_str() {
            "VOID" => Some(ChannelStatus::Void),
            "INITIAL" | "JOINING" => Some(ChannelStatus::Initial),
            "ACTIVE" | "OPEN" => Some(ChannelStatus::Active),
            "DISPUTE" | "CHALLENGED" => Some(ChannelStatus::Dispute),
            "FINAL" | "CLOSED" => Some(ChannelStatus::Final),
            _ => None,
        }
    }
}

impl std::fmt::Display for ChannelStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One participant's claim within a channel.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelAllocation {
    /// Destination address
    pub destination: String,
    /// Token address
    pub token: String,
    /// Amount (decimal string, smallest units)
    pub amount: String,
}

impl ChannelAllocation {
    /// Creates a new allocation.
    pub fn new(
        destination: impl Into<String>,
        token: impl Into<String>,
        amount: impl Into<String>,
    ) -> Self {
        Self {
            destination: destination.into(),
            token: token.into(),
            amount: amount.into(),
        }
    }

    /// Checks that all fields are present and the amount is a non-negative integer.
    pub fn validate(&self) -> Result<()> {
        if self.destination.trim().is_empty() {
            return Err(YellowError::ValidationError("allocation destination is empty".into()));
        }
        if self.token.trim().is_empty() {
            return Err(YellowError::ValidationError("allocation token is empty".into()));
        }
        crate::serialization::parse_amount(&self.amount)?;
        Ok(())
    }
}

/// A cached channel state.
///
/// Replaced wholesale on every update; never mutated in place while shared.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelState {
    /// Channel ID (opaque, non-empty)
    pub channel_id: String,
    /// Lifecycle status
    pub status: ChannelStatus,
    /// Chain the channel lives on
    #[serde(with = "crate::serialization::lenient_u64")]
    pub chain_id: u64,
    /// Token address
    pub token: String,
    /// Ordered balance allocations
    pub allocations: Vec<ChannelAllocation>,
    /// Monotonic state version
    #[serde(with = "crate::serialization::lenient_u64")]
    pub state_version: u64,
    /// Protocol label of the latest state (INITIALIZE, OPERATE, RESIZE, FINALIZE)
    pub state_intent: String,
    /// Hash of the latest signed state
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state_hash: Option<String>,
    /// Adjudicator contract address
    pub adjudicator: String,
    /// Challenge period in seconds
    #[serde(with = "crate::serialization::lenient_u64")]
    pub challenge_period: u64,
    /// When a running challenge expires (unix seconds)
    #[serde(
        default,
        skip_serializing_if = "Option::is_none",
        with = "crate::serialization::lenient_u64_option"
    )]
    pub challenge_expiration: Option<u64>,
    /// Creation timestamp (unix seconds)
    #[serde(with = "crate::serialization::lenient_u64")]
    pub created_at: u64,
    /// Last update timestamp (unix seconds)
    #[serde(with = "crate::serialization::lenient_u64")]
    pub updated_at: u64,
}

impl ChannelState {
    /// Checks structural invariants.
    pub fn validate(&self) -> Result<()> {
        if self.channel_id.trim().is_empty() {
            return Err(YellowError::ValidationError("channel id is empty".into()));
        }
        if self.chain_id == 0 {
            return Err(YellowError::ValidationError("chain id must be positive".into()));
        }
        if self.allocations.is_empty() {
            return Err(YellowError::ValidationError(format!(
                "channel {} has no allocations",
                self.channel_id
            )));
        }
        for alloc in &self.allocations {
            alloc.validate()?;
        }
        Ok(())
    }

    /// Returns the allocation held by `destination`, matched case-insensitively.
    pub fn allocation_for(&self, destination: &str) -> Option<&ChannelAllocation> {
        self.allocations
            .iter()
            .find(|a| a.destination.eq_ignore_ascii_case(destination))
    }

    /// Returns a copy transitioned to `FINAL` with a `FINALIZE` state.
    pub fn finalized(&self, now: u64) -> Self {
        Self {
            status: ChannelStatus::Final,
            state_intent: INTENT_FINALIZE.into(),
            state_version: self.state_version.saturating_add(1),
            updated_at: now,
            ..self.clone()
        }
    }

    /// Returns a copy with `destination`'s allocation set to `amount` under a `RESIZE` state.
    ///
    /// Adds an allocation line for `destination` if it has none.
    pub fn resized(&self, destination: &str, amount: &str, now: u64) -> Self {
        let mut allocations = self.allocations.clone();
        match allocations
            .iter_mut()
            .find(|a| a.destination.eq_ignore_ascii_case(destination))
        {
            Some(alloc) => alloc.amount = amount.to_string(),
            None => allocations.push(ChannelAllocation::new(destination, &self.token, amount)),
        }

        Self {
            allocations,
            state_intent: INTENT_RESIZE.into(),
            state_version: self.state_version.saturating_add(1),
            updated_at: now,
            ..self.clone()
        }
    }
}
