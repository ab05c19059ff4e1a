//! Domain types for the Yellow ClearNode client.
//!
//! This module contains all the core data structures used throughout the
//! workspace. All public types are serializable and every amount crosses the
//! wire as a decimal string.

mod channel;
mod config;
mod intent;
mod outcome;
mod session;

pub use channel::*;
pub use config::*;
pub use intent::*;
pub use outcome::*;
pub use session::*;

/// Current unix time in seconds.
pub fn unix_now() -> u64 {
    chrono::Utc::now().timestamp().max(0) as u64
}
