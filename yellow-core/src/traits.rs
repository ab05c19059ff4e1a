//! Collaborator interfaces.
//!
//! The client never owns a wallet key, an RPC endpoint, or a transaction
//! sender directly. These traits are the seams through which they are
//! injected, enabling modularity and testing.

use async_trait::async_trait;
use ethers::signers::{LocalWallet, Signer};
use ethers::types::transaction::eip712::TypedData;
use ethers::types::{Address, Signature, H256, U256};
use serde::{Deserialize, Serialize};

use crate::error::{Result, YellowError};
use crate::types::ChannelAllocation;

// ═══════════════════════════════════════════════════════════════════════════════
// WALLET SIGNER
// ═══════════════════════════════════════════════════════════════════════════════

/// Long-lived wallet that authorizes session keys.
#[async_trait]
pub trait WalletSigner: Send + Sync {
    /// Wallet account address.
    fn address(&self) -> Address;

    /// Produces an EIP-712 signature over `data`.
    async fn sign_typed_data(&self, data: &TypedData) -> Result<Signature>;
}

#[async_trait]
impl WalletSigner for LocalWallet {
    fn address(&self) -> Address {
        Signer::address(self)
    }

    async fn sign_typed_data(&self, data: &TypedData) -> Result<Signature> {
        Signer::sign_typed_data(self, data)
            .await
            .map_err(|e| YellowError::SigningFailed(e.to_string()))
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// CHAIN READER
// ═══════════════════════════════════════════════════════════════════════════════

/// Read-only access to the custody contract.
#[async_trait]
pub trait ChainReader: Send + Sync {
    /// Calls `getChannelBalances(bytes32 channelId, address[] tokens) -> uint256[]`.
    async fn get_channel_balances(
        &self,
        custody: Address,
        channel_id: H256,
        tokens: &[Address],
    ) -> Result<Vec<U256>>;
}

// ═══════════════════════════════════════════════════════════════════════════════
// ON-CHAIN SETTLEMENT
// ═══════════════════════════════════════════════════════════════════════════════

/// Fixed channel parameters, as negotiated with the relay.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChannelDefinition {
    /// Participant addresses (caller first, broker second)
    pub participants: Vec<String>,
    /// Adjudicator contract address
    pub adjudicator: String,
    /// Challenge period in seconds
    pub challenge: u64,
    /// Channel nonce
    pub nonce: u64,
}

/// A relay-negotiated state ready to be anchored on-chain.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SettlementRequest {
    /// Channel ID (32-byte hex)
    pub channel_id: String,
    /// Channel definition; required for creation
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub channel: Option<ChannelDefinition>,
    /// State intent label
    pub intent: String,
    /// State version
    pub version: u64,
    /// Application state data (hex)
    pub state_data: String,
    /// Allocations of the state
    pub allocations: Vec<ChannelAllocation>,
    /// Signatures over the state (hex)
    pub signatures: Vec<String>,
}

/// Sends custody-contract transactions.
///
/// Each method returns the transaction hash once the transaction is mined.
#[async_trait]
pub trait ChannelSettlement: Send + Sync {
    /// Opens the channel on-chain with its initial state.
    async fn create(&self, request: &SettlementRequest) -> Result<String>;

    /// Anchors a resized state.
    async fn resize(&self, request: &SettlementRequest) -> Result<String>;

    /// Anchors the final state and closes the channel.
    async fn close(&self, request: &SettlementRequest) -> Result<String>;

    /// Withdraws the caller's settled funds from custody.
    async fn withdraw(&self, token: &str, amount: &str) -> Result<String>;
}
