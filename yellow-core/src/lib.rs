//! # Yellow Core
//!
//! Core types, errors, and collaborator traits for the Yellow ClearNode client.
//!
//! This crate provides the foundational building blocks used by all other crates
//! in the workspace:
//!
//! - **Types**: channel states, allocations, quotes, clearing results, sessions
//! - **Errors**: the internal `YellowError` hierarchy and the public `ReasonCode` taxonomy
//! - **Config**: `YellowConfig` with presets, environment overlay, and validation
//! - **Traits**: wallet signing, chain reads, and on-chain settlement seams
//! - **Serialization**: the JSON-safe pass applied to every outbound result
//!
//! ## Example
//!
//! ```rust
//! use yellow_core::{ChannelAllocation, serialization};
//!
//! let alloc = ChannelAllocation::new("0xabc", "0xdef", "1000000");
//! let json = serialization::encode(&alloc).unwrap();
//! assert!(json.contains("\"1000000\""));
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms, clippy::all)]

pub mod constants;
pub mod error;
pub mod serialization;
pub mod traits;
pub mod types;

// Re-export commonly used items at crate root
pub use constants::*;
pub use error::{ReasonCode, Result, YellowError};
pub use traits::*;
pub use types::*;
