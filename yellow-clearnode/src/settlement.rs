//! Custody contract bindings.
//!
//! [`CustodyReader`] and [`CustodySettlement`] back the [`ChainReader`] and
//! [`ChannelSettlement`] seams with real calls against the custody contract
//! over any `ethers` middleware.

use std::str::FromStr;
use std::sync::Arc;

use async_trait::async_trait;
use ethers::contract::{ContractCall, ContractError};
use ethers::providers::Middleware;
use ethers::types::{Address, Bytes, TransactionReceipt, H256, U256, U64};
use tracing::{debug, info, instrument, warn};

use yellow_core::constants::{INTENT_FINALIZE, INTENT_INITIALIZE, INTENT_OPERATE, INTENT_RESIZE};
use yellow_core::error::{Result, YellowError};
use yellow_core::serialization::parse_amount;
use yellow_core::traits::{ChainReader, ChannelDefinition, ChannelSettlement, SettlementRequest};
use yellow_core::types::ChannelAllocation;

#[allow(missing_docs)]
mod bindings {
    use ethers::contract::abigen;

    abigen!(
        Custody,
        r#"[
            struct Allocation { address destination; address token; uint256 amount; }
            struct Channel { address[] participants; address adjudicator; uint64 challenge; uint64 nonce; }
            struct State { uint8 intent; uint256 version; bytes data; Allocation[] allocations; bytes[] sigs; }
            function create(Channel ch, State initial) external returns (bytes32 channelId)
            function resize(bytes32 channelId, State candidate, State[] proofs) external
            function close(bytes32 channelId, State candidate, State[] proofs) external
            function withdraw(address token, uint256 amount) external
            function getChannelBalances(bytes32 channelId, address[] tokens) external view returns (uint256[] balances)
        ]"#
    );
}

pub use bindings::{Allocation, Channel, Custody, State};

/// On-chain code of a state intent label.
pub fn intent_code(intent: &str) -> Result<u8> {
    match intent.trim().to_ascii_uppercase().as_str() {
        INTENT_OPERATE => Ok(0),
        INTENT_INITIALIZE => Ok(1),
        INTENT_RESIZE => Ok(2),
        INTENT_FINALIZE => Ok(3),
        other => Err(YellowError::ValidationError(format!("unknown state intent '{other}'"))),
    }
}

fn parse_address(field: &str, value: &str) -> Result<Address> {
    Address::from_str(value.trim())
        .map_err(|e| YellowError::ValidationError(format!("invalid {field} '{value}': {e}")))
}

fn parse_channel_id(value: &str) -> Result<[u8; 32]> {
    H256::from_str(value.trim())
        .map(|h| h.0)
        .map_err(|e| YellowError::ValidationError(format!("invalid channel id '{value}': {e}")))
}

fn decode_hex(value: &str) -> Result<Bytes> {
    let raw = value.trim().trim_start_matches("0x");
    Ok(Bytes::from(hex::decode(raw)?))
}

fn to_allocation(alloc: &ChannelAllocation) -> Result<Allocation> {
    Ok(Allocation {
        destination: parse_address("allocation destination", &alloc.destination)?,
        token: parse_address("allocation token", &alloc.token)?,
        amount: parse_amount(&alloc.amount)?,
    })
}

/// Converts a negotiated state into its ABI form.
pub fn to_state(request: &SettlementRequest) -> Result<State> {
    Ok(State {
        intent: intent_code(&request.intent)?,
        version: U256::from(request.version),
        data: decode_hex(&request.state_data)?,
        allocations: request
            .allocations
            .iter()
            .map(to_allocation)
            .collect::<Result<Vec<_>>>()?,
        sigs: request
            .signatures
            .iter()
            .map(|s| decode_hex(s))
            .collect::<Result<Vec<_>>>()?,
    })
}

/// Converts a channel definition into its ABI form.
pub fn to_channel(def: &ChannelDefinition) -> Result<Channel> {
    Ok(Channel {
        participants: def
            .participants
            .iter()
            .map(|p| parse_address("participant", p))
            .collect::<Result<Vec<_>>>()?,
        adjudicator: parse_address("adjudicator", &def.adjudicator)?,
        challenge: def.challenge,
        nonce: def.nonce,
    })
}

// ═══════════════════════════════════════════════════════════════════════════════
// READS
// ═══════════════════════════════════════════════════════════════════════════════

/// Read-only custody access over an `ethers` middleware.
pub struct CustodyReader<M> {
    client: Arc<M>,
}

impl<M: Middleware> CustodyReader<M> {
    /// Creates a reader.
    pub fn new(client: Arc<M>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl<M: Middleware + 'static> ChainReader for CustodyReader<M> {
    async fn get_channel_balances(
        &self,
        custody: Address,
        channel_id: H256,
        tokens: &[Address],
    ) -> Result<Vec<U256>> {
        let contract = Custody::new(custody, self.client.clone());
        contract
            .get_channel_balances(channel_id.0, tokens.to_vec())
            .call()
            .await
            .map_err(|e| YellowError::ChainQuery {
                channel_id: format!("{channel_id:?}"),
                reason: e.to_string(),
            })
    }
}

// ═══════════════════════════════════════════════════════════════════════════════
// WRITES
// ═══════════════════════════════════════════════════════════════════════════════

/// Custody transactions signed by the middleware's account.
pub struct CustodySettlement<M> {
    contract: Custody<M>,
}

impl<M: Middleware + 'static> CustodySettlement<M> {
    /// Creates a settlement client for the custody contract at `custody`.
    pub fn new(custody: Address, client: Arc<M>) -> Self {
        Self {
            contract: Custody::new(custody, client),
        }
    }

    /// Sends a call and waits for a successful receipt.
    async fn submit<D>(&self, label: &str, call: ContractCall<M, D>) -> Result<String>
    where
        D: ethers::abi::Detokenize + Send + Sync,
    {
        let pending = call.send().await.map_err(tx_error)?;
        let tx_hash = pending.tx_hash();
        debug!(label, tx_hash = ?tx_hash, "Transaction submitted");

        let broadcast = |reason: String| YellowError::TransactionFailed {
            reason,
            tx_hash: Some(format!("{tx_hash:?}")),
        };
        let receipt: TransactionReceipt = pending
            .await
            .map_err(|e| broadcast(e.to_string()))?
            .ok_or_else(|| broadcast(format!("{label} {tx_hash:?} dropped from mempool")))?;

        if receipt.status != Some(U64::one()) {
            warn!(label, tx_hash = ?receipt.transaction_hash, "Transaction reverted");
            return Err(YellowError::TransactionFailed {
                reason: format!("{label} {:?} reverted", receipt.transaction_hash),
                tx_hash: Some(format!("{:?}", receipt.transaction_hash)),
            });
        }
        info!(label, tx_hash = ?receipt.transaction_hash, "Transaction confirmed");
        Ok(format!("{:?}", receipt.transaction_hash))
    }
}

fn tx_error<M: Middleware>(err: ContractError<M>) -> YellowError {
    YellowError::tx_failed(err.to_string())
}

#[async_trait]
impl<M: Middleware + 'static> ChannelSettlement for CustodySettlement<M> {
    #[instrument(skip(self, request), fields(channel_id = %request.channel_id))]
    async fn create(&self, request: &SettlementRequest) -> Result<String> {
        let def = request.channel.as_ref().ok_or_else(|| {
            YellowError::ValidationError("channel definition required to create".into())
        })?;
        let call = self.contract.create(to_channel(def)?, to_state(request)?);
        self.submit("create", call).await
    }

    #[instrument(skip(self, request), fields(channel_id = %request.channel_id))]
    async fn resize(&self, request: &SettlementRequest) -> Result<String> {
        let id = parse_channel_id(&request.channel_id)?;
        let call = self.contract.resize(id, to_state(request)?, Vec::new());
        self.submit("resize", call).await
    }

    #[instrument(skip(self, request), fields(channel_id = %request.channel_id))]
    async fn close(&self, request: &SettlementRequest) -> Result<String> {
        let id = parse_channel_id(&request.channel_id)?;
        let call = self.contract.close(id, to_state(request)?, Vec::new());
        self.submit("close", call).await
    }

    #[instrument(skip(self))]
    async fn withdraw(&self, token: &str, amount: &str) -> Result<String> {
        let call = self
            .contract
            .withdraw(parse_address("token", token)?, parse_amount(amount)?);
        self.submit("withdraw", call).await
    }
}
