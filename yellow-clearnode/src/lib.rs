//! # Yellow ClearNode Client
//!
//! Client-side engine for the Yellow ClearNode state-channel relay. It keeps
//! an authenticated WebSocket session to the ClearNode, opens, resizes and
//! closes payment channels, anchors their states in the custody contract, and
//! routes cross-chain intents to solvers through those channels.
//!
//! ## Flow
//!
//! 1. [`YellowProvider::connect`] opens the socket and authorizes an ephemeral
//!    session key with the wallet (EIP-712 challenge).
//! 2. Channel operations are negotiated with the relay, signed by the session
//!    key, then settled on-chain through a [`ChannelSettlement`].
//! 3. [`YellowProvider::execute_intent`] reuses (or opens) a channel for the
//!    input token and asks solvers for a quote.
//!
//! Every public operation returns an [`Outcome`]: either the payload or a
//! fallback descriptor carrying a [`ReasonCode`], so callers can route around
//! the ClearNode without matching on error types.
//!
//! ## Example
//!
//! ```rust,ignore
//! use yellow_clearnode::YellowProvider;
//! use yellow_core::types::{CreateChannelParams, Outcome, YellowConfig};
//!
//! let provider = YellowProvider::with_wallet(YellowConfig::from_env()?, wallet)?;
//! provider.connect().await;
//!
//! match provider
//!     .create_channel(CreateChannelParams { chain_id: 42161, token: usdc.into() })
//!     .await
//! {
//!     Outcome::Success(result) => println!("opened {}", result.channel_id),
//!     Outcome::Fallback { fallback } => println!("fallback: {}", fallback.reason_code),
//! }
//! ```

#![forbid(unsafe_code)]
#![warn(missing_docs, rust_2018_idioms)]

pub mod classify;
pub mod connection;
pub mod events;
pub mod provider;
pub mod rpc;
pub mod session;
pub mod settlement;

#[cfg(test)]
mod test_support;

pub use classify::{classify, extract_revert_reason, map_error_to_reason_code};
pub use connection::{ClearNodeConnection, ConnectionConfig, ConnectionEvent, ConnectionState};
pub use events::{EventBus, EventListener, ListenerId, ProviderEvent, ProviderEventKind, ProviderStatus};
pub use provider::YellowProvider;
pub use session::{SessionKeyManager, SessionSigner};
pub use settlement::{CustodyReader, CustodySettlement};

pub use yellow_core::error::{ReasonCode, YellowError};
pub use yellow_core::traits::{ChainReader, ChannelSettlement, WalletSigner};
pub use yellow_core::types::Outcome;
