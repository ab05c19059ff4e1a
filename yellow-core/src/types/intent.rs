//! Operation parameters and results: channel operations, transfers, intents.

use serde::{Deserialize, Serialize};

use super::channel::{ChannelAllocation, ChannelState};

// ═══════════════════════════════════════════════════════════════════════════════
// CHANNEL OPERATIONS
// ═══════════════════════════════════════════════════════════════════════════════

/// Parameters for opening a channel.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateChannelParams {
    /// Chain to open the channel on
    #[serde(with = "crate::serialization::lenient_u64")]
    pub chain_id: u64,
    /// Token address
    pub token: String,
}

/// Parameters for changing the caller's allocation.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ResizeChannelParams {
    /// Channel to resize
    pub channel_id: String,
    /// New allocation amount for the caller (decimal string)
    pub amount: String,
    /// Where released funds go; defaults to the caller
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub funds_destination: Option<String>,
}

/// Parameters for a cooperative close.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CloseChannelParams {
    /// Channel to close
    pub channel_id: String,
    /// Where settled funds go; defaults to the caller
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub funds_destination: Option<String>,
}

/// Result of a successful create/resize/close.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ChannelOperationResult {
    /// Channel ID
    pub channel_id: String,
    /// Settlement transaction hash
    pub tx_hash: String,
    /// Channel state after the operation
    pub state: ChannelState,
    /// Withdrawal transaction hash (close only, best effort)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub withdrawal_tx_hash: Option<String>,
}

// ═══════════════════════════════════════════════════════════════════════════════
// TRANSFERS
// ═══════════════════════════════════════════════════════════════════════════════

/// One line of a transfer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferAllocation {
    /// Token address (or ledger asset symbol)
    pub token: String,
    /// Amount to transfer (decimal string)
    pub amount: String,
}

/// Transfer request within the ledger.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferRequest {
    /// Destination address
    pub destination: String,
    /// Allocations to transfer
    pub allocations: Vec<TransferAllocation>,
}

/// Result of a relay-accepted transfer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferResult {
    /// Relay-assigned transfer id, if any
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub transfer_id: Option<String>,
    /// Destination address
    pub destination: String,
    /// Transferred lines
    pub allocations: Vec<TransferAllocation>,
    /// Acceptance timestamp (unix seconds)
    #[serde(with = "crate::serialization::lenient_u64")]
    pub timestamp: u64,
}

// ═══════════════════════════════════════════════════════════════════════════════
// INTENTS
// ═══════════════════════════════════════════════════════════════════════════════

/// A cross-chain swap intent.
///
/// The five routing fields are optional at the type level so that partially
/// filled requests from untyped callers can be rejected with a precise
/// `MISSING_PARAMS` result instead of a deserialization failure.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntentRequest {
    /// Source chain id (decimal)
    #[serde(default)]
    pub source_chain: Option<String>,
    /// Destination chain id (decimal)
    #[serde(default)]
    pub destination_chain: Option<String>,
    /// Input token address
    #[serde(default)]
    pub input_token: Option<String>,
    /// Output token address
    #[serde(default)]
    pub output_token: Option<String>,
    /// Input amount (decimal string)
    #[serde(default)]
    pub input_amount: Option<String>,
    /// Recipient on the destination chain; defaults to the caller
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub recipient: Option<String>,
    /// Minimum acceptable output (decimal string)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub min_amount_out: Option<String>,
    /// Whether to build a clearing result with settlement proof
    #[serde(default)]
    pub settle: bool,
}

/// A solver quote for an intent.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct YellowQuote {
    /// Quoting solver
    pub solver_id: String,
    /// Channel the intent runs through
    pub channel_id: String,
    /// Input amount (decimal string)
    pub amount_in: String,
    /// Quoted output amount (decimal string)
    pub amount_out: String,
    /// Estimated fill time in seconds (positive)
    #[serde(with = "crate::serialization::lenient_u64")]
    pub estimated_time: u64,
    /// Quote timestamp (unix seconds, positive)
    #[serde(with = "crate::serialization::lenient_u64")]
    pub timestamp: u64,
}

/// Proof that a clearing was settled.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettlementProof {
    /// Hash of the settled state
    pub state_hash: String,
    /// Participant signatures over the state
    pub signatures: Vec<String>,
    /// Settlement transaction, if anchored on-chain
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tx_hash: Option<String>,
    /// Allocations after clearing
    pub final_allocations: Vec<ChannelAllocation>,
}

/// Outcome of solver clearing.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClearingResult {
    /// Channel ID
    pub channel_id: String,
    /// Matched input (decimal string)
    pub matched_amount_in: String,
    /// Matched output (decimal string)
    pub matched_amount_out: String,
    /// Net settlement (decimal string)
    pub net_settlement: String,
    /// Settlement proof
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub settlement_proof: Option<SettlementProof>,
    /// Clearing timestamp (unix seconds)
    #[serde(with = "crate::serialization::lenient_u64")]
    pub timestamp: u64,
}

/// Result of a successful intent execution.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct IntentExecution {
    /// Relay-assigned intent id
    pub intent_id: String,
    /// Channel the intent ran through
    pub channel_id: String,
    /// Accepted quote
    pub quote: YellowQuote,
    /// Clearing, when requested and reported
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub clearing: Option<ClearingResult>,
}
