//! Lookup tables for ClearNode vocabularies.

use serde_json::Value;

use crate::status::{EventMapping, ExecutionStatus, StepStatus};

use ExecutionStatus::*;
use StepStatus::*;

/// Every key of the ClearNode event table, in normalized form.
pub const YELLOW_EVENT_KEYS: &[&str] = &[
    "intent_created",
    "quote_requested",
    "quote_received",
    "intent_submitted",
    "channel_created",
    "channel_opened",
    "channel_resized",
    "channel_funded",
    "transfer_completed",
    "clearing_started",
    "clearing_completed",
    "channel_closing",
    "channel_closed",
    "channel_challenged",
    "intent_failed",
    "channel_error",
    "quote_expired",
    "intent_expired",
];

/// Every key of the channel status table, in normalized form.
pub const CHANNEL_STATUS_KEYS: &[&str] = &[
    "void",
    "initial",
    "joining",
    "active",
    "open",
    "dispute",
    "challenged",
    "final",
    "closed",
];

/// Every key of the state intent table, in normalized form.
pub const STATE_INTENT_KEYS: &[&str] = &["initialize", "operate", "resize", "finalize"];

/// Normalizes a vocabulary key: trim, lowercase, and collapse every run of
/// whitespace, hyphens, or underscores into a single underscore.
pub fn normalize_key(raw: &str) -> String {
    let mut out = String::with_capacity(raw.len());
    let mut pending_sep = false;
    for ch in raw.trim().chars() {
        if ch.is_whitespace() || ch == '-' || ch == '_' {
            pending_sep = true;
            continue;
        }
        if pending_sep && !out.is_empty() {
            out.push('_');
        }
        pending_sep = false;
        out.extend(ch.to_lowercase());
    }
    out
}

/// Maps a ClearNode event name.
pub fn map_yellow_event(event: &str) -> Option<EventMapping> {
    let mapping = match normalize_key(event).as_str() {
        "intent_created" => EventMapping::new(Created, "Intent created", Completed),
        "quote_requested" => EventMapping::new(Created, "Requesting solver quotes", InProgress),
        "quote_received" => EventMapping::new(Quoted, "Quote received", Completed),
        "intent_submitted" => EventMapping::new(Executing, "Intent submitted", InProgress),
        "channel_created" | "channel_opened" => {
            EventMapping::new(Executing, "Channel opened", Completed)
        }
        "channel_resized" | "channel_funded" => {
            EventMapping::new(Executing, "Channel funded", Completed)
        }
        "transfer_completed" => EventMapping::new(Settling, "Transfer completed", Completed),
        "clearing_started" => EventMapping::new(Settling, "Clearing", InProgress),
        "clearing_completed" => EventMapping::new(Settled, "Clearing completed", Completed),
        "channel_closing" => EventMapping::new(Settling, "Closing channel", InProgress),
        "channel_closed" => EventMapping::new(Settled, "Channel closed", Completed),
        "channel_challenged" => EventMapping::new(Settling, "Channel challenged", InProgress),
        "intent_failed" => EventMapping::new(Aborted, "Intent failed", Failed),
        "channel_error" => EventMapping::new(Aborted, "Channel error", Failed),
        "quote_expired" => EventMapping::new(Expired, "Quote expired", Failed),
        "intent_expired" => EventMapping::new(Expired, "Intent expired", Failed),
        _ => return None,
    };
    Some(mapping)
}

/// Maps a channel status label.
pub fn map_channel_status(status: &str) -> Option<EventMapping> {
    let mapping = match normalize_key(status).as_str() {
        "void" => EventMapping::new(Created, "Channel not opened", Pending),
        "initial" | "joining" => EventMapping::new(Executing, "Opening channel", InProgress),
        "active" | "open" => EventMapping::new(Executing, "Channel active", Completed),
        "dispute" | "challenged" => EventMapping::new(Settling, "Channel in dispute", InProgress),
        "final" | "closed" => EventMapping::new(Settled, "Channel finalized", Completed),
        _ => return None,
    };
    Some(mapping)
}

/// Maps a state intent label.
pub fn map_state_intent(intent: &str) -> Option<EventMapping> {
    let mapping = match normalize_key(intent).as_str() {
        "initialize" => EventMapping::new(Executing, "Initializing channel state", InProgress),
        "operate" => EventMapping::new(Executing, "Operating", InProgress),
        "resize" => EventMapping::new(Executing, "Resizing channel", InProgress),
        "finalize" => EventMapping::new(Settled, "Final state signed", Completed),
        _ => return None,
    };
    Some(mapping)
}

/// Infers a mapping from a notification.
///
/// Tries the `event` field, then `channelStatus`, then `stateIntent`, and
/// returns the first field that maps. Non-string fields are skipped.
pub fn infer_mapping(notification: &Value) -> Option<EventMapping> {
    let field = |name: &str| notification.get(name).and_then(Value::as_str);

    field("event")
        .and_then(map_yellow_event)
        .or_else(|| field("channelStatus").and_then(map_channel_status))
        .or_else(|| field("stateIntent").and_then(map_state_intent))
}
