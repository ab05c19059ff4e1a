//! # Yellow Events
//!
//! Pure lookup tables that translate three independent vocabularies into one
//! canonical execution status:
//!
//! - ClearNode event names (`channel_created`, `quote_received`, ...)
//! - Channel statuses (`ACTIVE`, `DISPUTE`, ...)
//! - State intents (`RESIZE`, `FINALIZE`, ...)
//!
//! ```rust
//! use yellow_events::{map_yellow_event, ExecutionStatus};
//!
//! let mapping = map_yellow_event("Clearing-Completed").unwrap();
//! assert_eq!(mapping.execution_status, ExecutionStatus::Settled);
//! assert!(mapping.is_terminal);
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

mod mapper;
mod status;

pub use mapper::{
    infer_mapping, map_channel_status, map_state_intent, map_yellow_event, normalize_key,
    CHANNEL_STATUS_KEYS, STATE_INTENT_KEYS, YELLOW_EVENT_KEYS,
};
pub use status::{EventMapping, ExecutionStatus, StepStatus};
