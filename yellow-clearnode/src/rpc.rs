//! ClearNode RPC message shapes.
//!
//! Outbound messages are `{"method", "params", "sig"?, "timestamp"}`.
//! Inbound replies are matched by method name, looked up in order at
//! `method`, `type`, `response.method`, and finally the `res[1]` slot of the
//! array envelope some relays still emit.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use yellow_core::types::{unix_now, Allowance, ChannelAllocation, TransferAllocation};

/// Outbound relay request.
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct RpcRequest {
    /// Method name (also the correlation key)
    pub method: String,
    /// Method parameters
    pub params: Value,
    /// Session-key signatures over `[method, params]`
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sig: Vec<String>,
    /// Send time (unix seconds)
    pub timestamp: u64,
}

impl RpcRequest {
    /// Builds an unsigned request.
    pub fn new<P: Serialize>(method: &str, params: &P) -> serde_json::Result<Self> {
        Ok(Self {
            method: method.to_string(),
            params: serde_json::to_value(params)?,
            sig: Vec::new(),
            timestamp: unix_now(),
        })
    }

    /// Bytes covered by a session signature: `json([method, params])`.
    pub fn signing_payload(&self) -> serde_json::Result<Vec<u8>> {
        serde_json::to_vec(&(&self.method, &self.params))
    }

    /// Serializes to the wire format.
    pub fn to_json(&self) -> serde_json::Result<Value> {
        serde_json::to_value(self)
    }
}

/// Returns the correlation method of an inbound message.
pub fn extract_method(msg: &Value) -> Option<&str> {
    msg.get("method")
        .and_then(Value::as_str)
        .or_else(|| msg.get("type").and_then(Value::as_str))
        .or_else(|| {
            msg.get("response")
                .and_then(|r| r.get("method"))
                .and_then(Value::as_str)
        })
        .or_else(|| msg.get("res").and_then(|r| r.get(1)).and_then(Value::as_str))
}

/// Returns the payload of an inbound message.
///
/// Looks at `data`, `response.data`, `res[2]`, `params`, and falls back to
/// the message itself.
pub fn extract_payload(msg: &Value) -> &Value {
    msg.get("data")
        .or_else(|| msg.get("response").and_then(|r| r.get("data")))
        .or_else(|| msg.get("res").and_then(|r| r.get(2)))
        .or_else(|| msg.get("params"))
        .unwrap_or(msg)
}

/// Returns the relay error carried by a reply, if any.
///
/// `error` may be a string or an object with a `message`; it is looked up at
/// the top level, in `response`, and in the payload.
pub fn extract_error(msg: &Value) -> Option<String> {
    fn read(err: &Value) -> Option<String> {
        match err {
            Value::String(s) => Some(s.clone()),
            Value::Object(o) => Some(
                o.get("message")
                    .and_then(Value::as_str)
                    .map(str::to_string)
                    .unwrap_or_else(|| err.to_string()),
            ),
            Value::Null | Value::Bool(false) => None,
            other => Some(other.to_string()),
        }
    }

    msg.get("error")
        .and_then(read)
        .or_else(|| msg.get("response").and_then(|r| r.get("error")).and_then(read))
        .or_else(|| extract_payload(msg).get("error").and_then(read))
}

/// Reads a string field, accepting camelCase or snake_case keys.
pub fn str_field<'a>(payload: &'a Value, camel: &str, snake: &str) -> Option<&'a str> {
    payload
        .get(camel)
        .or_else(|| payload.get(snake))
        .and_then(Value::as_str)
        .filter(|s| !s.trim().is_empty())
}

/// Reads an unsigned integer field that may arrive as a number or a decimal string.
pub fn u64_field(payload: &Value, camel: &str, snake: &str) -> Option<u64> {
    match payload.get(camel).or_else(|| payload.get(snake))? {
        Value::Number(n) => n.as_u64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

/// Reads an amount field that may arrive as a number or a decimal string.
pub fn amount_field(payload: &Value, camel: &str, snake: &str) -> Option<String> {
    match payload.get(camel).or_else(|| payload.get(snake))? {
        Value::Number(n) => n.as_u64().map(|v| v.to_string()),
        Value::String(s) if !s.trim().is_empty() => Some(s.trim().to_string()),
        _ => None,
    }
}

/// Reads a list of non-blank strings (e.g. signatures).
pub fn string_list_field(payload: &Value, camel: &str, snake: &str) -> Vec<String> {
    payload
        .get(camel)
        .or_else(|| payload.get(snake))
        .and_then(Value::as_array)
        .map(|items| {
            items
                .iter()
                .filter_map(Value::as_str)
                .filter(|s| !s.trim().is_empty())
                .map(str::to_string)
                .collect()
        })
        .unwrap_or_default()
}

/// Reads an allocation list, skipping malformed entries.
pub fn allocations_field(payload: &Value) -> Option<Vec<ChannelAllocation>> {
    let items = payload.get("allocations")?.as_array()?;
    let allocations: Vec<ChannelAllocation> = items
        .iter()
        .filter_map(|item| {
            Some(ChannelAllocation {
                destination: str_field(item, "destination", "participant")?.to_string(),
                token: str_field(item, "token", "asset")?.to_string(),
                amount: amount_field(item, "amount", "amount")?,
            })
        })
        .collect();
    (!allocations.is_empty()).then_some(allocations)
}

// ═══════════════════════════════════════════════════════════════════════════════
// REQUEST PARAMETERS
// ═══════════════════════════════════════════════════════════════════════════════

/// `auth_request` parameters.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthRequestParams {
    /// Long-lived wallet address
    pub address: String,
    /// Ephemeral session key address
    pub participant: String,
    /// Requested allowances
    pub allowances: Vec<Allowance>,
    /// Session expiry (unix seconds)
    pub expires_at: u64,
    /// Application name
    pub application: String,
    /// Application scope
    pub scope: String,
}

/// `auth_verify` parameters.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct AuthVerifyParams {
    /// Ephemeral session key address
    pub participant: String,
    /// EIP-712 signature of the challenge by the wallet
    pub signature: String,
    /// Challenge being answered
    pub challenge: String,
}

/// `create_channel` parameters.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateChannelRequest {
    /// Chain id
    pub chain_id: u64,
    /// Token address
    pub token: String,
    /// Channel owner
    pub participant: String,
}

/// `resize_channel` parameters.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ResizeChannelRequest {
    /// Channel id
    pub channel_id: String,
    /// New allocation for the owner (decimal)
    pub allocate_amount: String,
    /// Where released funds go
    pub funds_destination: String,
}

/// `close_channel` parameters.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CloseChannelRequest {
    /// Channel id
    pub channel_id: String,
    /// Where settled funds go
    pub funds_destination: String,
}

/// `transfer` parameters.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TransferParams {
    /// Destination address
    pub destination: String,
    /// Transferred lines
    pub allocations: Vec<TransferAllocation>,
}

/// `submit_intent` parameters.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SubmitIntentParams {
    /// Client-generated idempotency key
    pub client_intent_id: String,
    /// Channel carrying the input funds
    pub channel_id: String,
    /// Source chain id
    pub source_chain_id: u64,
    /// Destination chain id
    pub destination_chain_id: u64,
    /// Input token
    pub input_token: String,
    /// Output token
    pub output_token: String,
    /// Input amount (decimal)
    pub input_amount: String,
    /// Recipient on the destination chain
    pub recipient: String,
    /// Minimum acceptable output (decimal)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub min_amount_out: Option<String>,
    /// Whether the relay should clear and settle immediately
    pub settle: bool,
}

/// `get_ledger_balances` parameters.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LedgerQueryParams {
    /// Account whose channels are listed
    pub participant: String,
}
