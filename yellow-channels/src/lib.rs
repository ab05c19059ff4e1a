//! Channel state cache for the Yellow ClearNode client.
//!
//! Holds the latest known state of every channel keyed by channel id, and
//! queries the custody contract when the cache needs ground truth.

mod manager;

pub use manager::{ChannelStateManager, TokenBalance};
