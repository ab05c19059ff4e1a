//! Error text classification.
//!
//! Every failure reaching a public provider operation is reduced to a
//! [`ReasonCode`] by keyword matching over its lower-cased message. Groups are
//! checked in a fixed priority order; the first hit wins.

use yellow_core::error::{ReasonCode, YellowError};

const TIMEOUT_PHRASES: &[&str] = &["timeout", "timed out"];

const AUTH_PHRASES: &[&str] = &[
    "auth",
    "unauthorized",
    "not authenticated",
    "session expired",
    "invalid signature",
    "signing",
];

const REVERT_PHRASES: &[&str] = &[
    "revert",
    "transaction failed",
    "tx failed",
    "insufficient funds for gas",
];

const CONNECTIVITY_PHRASES: &[&str] = &[
    "websocket",
    "not connected",
    "connection",
    "disconnected",
    "econnrefused",
    "network",
    "unavailable",
    "reconnect",
    "socket",
];

const DISPUTE_PHRASES: &[&str] = &["dispute"];

const CHANNEL_BALANCE_PHRASES: &[&str] = &["insufficient channel balance"];

const BALANCE_PHRASES: &[&str] = &["insufficient balance", "insufficient funds", "exceeds balance"];

/// Ordered keyword groups.
const RULES: &[(&[&str], ReasonCode)] = &[
    (TIMEOUT_PHRASES, ReasonCode::YellowTimeout),
    (AUTH_PHRASES, ReasonCode::YellowAuthFailed),
    (REVERT_PHRASES, ReasonCode::YellowTxFailed),
    (CONNECTIVITY_PHRASES, ReasonCode::YellowUnavailable),
    (DISPUTE_PHRASES, ReasonCode::YellowChannelDispute),
    (CHANNEL_BALANCE_PHRASES, ReasonCode::InsufficientChannelBalance),
    (BALANCE_PHRASES, ReasonCode::InsufficientBalance),
];

/// Maps free-form error text to a reason code.
///
/// Unmatched text defaults to `YELLOW_UNAVAILABLE` so that every failure is
/// fallback-eligible.
pub fn map_error_to_reason_code(message: &str) -> ReasonCode {
    let text = message.to_lowercase();
    RULES
        .iter()
        .find(|(phrases, _)| phrases.iter().any(|p| text.contains(p)))
        .map(|(_, code)| *code)
        .unwrap_or(ReasonCode::YellowUnavailable)
}

/// Classifies an internal error by its display text.
pub fn classify(err: &YellowError) -> ReasonCode {
    map_error_to_reason_code(&err.to_string())
}

/// Revert markers, most specific first.
const REVERT_MARKERS: &[&str] = &[
    "reverted with reason string",
    "reverted with reason",
    "reverted with data",
    "execution reverted",
    "reverted",
    "revert",
];

/// Extracts the revert reason from transaction failure text.
///
/// Finds the first marker (most specific first) that ends on a word boundary
/// and returns the text after it, stripped of separators and quotes, up to the
/// first line break. A marker with nothing after it yields `None`. Runs in
/// linear time regardless of input shape.
pub fn extract_revert_reason(message: &str) -> Option<String> {
    // ASCII lowercasing keeps byte offsets aligned with `message`.
    let lower = message.to_ascii_lowercase();
    let end = REVERT_MARKERS
        .iter()
        .find_map(|m| find_word(&lower, m).map(|idx| idx + m.len()))?;

    let rest = &message[end..];
    let line = rest.split(['\n', '\r']).next().unwrap_or_default();
    let reason = line
        .trim_start_matches(|c: char| c == ':' || c == '\'' || c == '"' || c.is_whitespace())
        .trim_end_matches(|c: char| c == '\'' || c == '"' || c.is_whitespace());

    (!reason.is_empty()).then(|| reason.to_string())
}

/// Offset of the first `word` in `text` not followed by a word character.
fn find_word(text: &str, word: &str) -> Option<usize> {
    text.match_indices(word).map(|(idx, _)| idx).find(|idx| {
        text[idx + word.len()..]
            .chars()
            .next()
            .map_or(true, |c| !(c.is_alphanumeric() || c == '_'))
    })
}
