//! In-memory channel state cache.

use std::collections::HashMap;
use std::str::FromStr;
use std::sync::Arc;

use ethers::types::{Address, H256, U256};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};
use tracing::{debug, warn};

use yellow_core::error::{Result, YellowError};
use yellow_core::serialization::{decimal_u256, u256_to_decimal};
use yellow_core::traits::ChainReader;
use yellow_core::types::{unix_now, ChannelState, ChannelStatus};

/// On-chain balance of one token locked in a channel.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenBalance {
    /// Token address
    pub token: String,
    /// Locked amount
    #[serde(with = "decimal_u256")]
    pub amount: U256,
}

/// Entries plus their insertion order.
#[derive(Default)]
struct Entries {
    states: HashMap<String, ChannelState>,
    order: Vec<String>,
}

impl Entries {
    fn put(&mut self, state: ChannelState) {
        if !self.states.contains_key(&state.channel_id) {
            self.order.push(state.channel_id.clone());
        }
        self.states.insert(state.channel_id.clone(), state);
    }

    fn ordered(&self) -> impl Iterator<Item = &ChannelState> {
        self.order.iter().filter_map(|id| self.states.get(id))
    }
}

/// Cache of channel states keyed by channel id.
///
/// Thread-safe. States are replaced wholesale; readers always get clones, so a
/// snapshot never changes under the caller.
pub struct ChannelStateManager {
    entries: RwLock<Entries>,
    chain: Arc<dyn ChainReader>,
    custody: Address,
}

impl ChannelStateManager {
    /// Creates an empty cache that reads balances from `custody` through `chain`.
    pub fn new(chain: Arc<dyn ChainReader>, custody: Address) -> Self {
        Self {
            entries: RwLock::new(Entries::default()),
            chain,
            custody,
        }
    }

    /// Replaces the cached state of `state.channel_id`.
    pub fn update_channel(&self, state: ChannelState) {
        debug!(
            channel_id = %state.channel_id,
            status = %state.status,
            version = state.state_version,
            "Caching channel state"
        );
        self.entries.write().put(state);
    }

    /// Atomically derives a new state from the cached one and stores it.
    ///
    /// `f` runs under the write lock, so concurrent read-compute-write cycles
    /// on the same channel serialize. Returns the stored state, or `None` if
    /// the channel is not cached.
    pub fn update_with(
        &self,
        channel_id: &str,
        f: impl FnOnce(&ChannelState) -> ChannelState,
    ) -> Option<ChannelState> {
        let mut entries = self.entries.write();
        let next = f(entries.states.get(channel_id)?);
        entries.put(next.clone());
        Some(next)
    }

    /// Returns the cached state of a channel.
    pub fn get_channel(&self, channel_id: &str) -> Option<ChannelState> {
        self.entries.read().states.get(channel_id).cloned()
    }

    /// Returns a snapshot of every cached state in insertion order.
    pub fn get_all_channels(&self) -> Vec<ChannelState> {
        self.entries.read().ordered().cloned().collect()
    }

    /// Returns the first `ACTIVE` channel for `token` (case-insensitive).
    ///
    /// Scans in insertion order; with more than one active channel per token
    /// the oldest cached one wins.
    pub fn find_open_channel(&self, token: &str) -> Option<ChannelState> {
        self.entries
            .read()
            .ordered()
            .find(|s| s.status == ChannelStatus::Active && s.token.eq_ignore_ascii_case(token))
            .cloned()
    }

    /// Clears all cached states.
    pub fn clear(&self) {
        let mut entries = self.entries.write();
        entries.states.clear();
        entries.order.clear();
    }

    /// Returns the number of cached channels.
    pub fn len(&self) -> usize {
        self.entries.read().states.len()
    }

    /// Returns true if the cache is empty.
    pub fn is_empty(&self) -> bool {
        self.entries.read().states.is_empty()
    }

    /// Queries the custody contract for the balances locked in a channel.
    ///
    /// Any failure (bad id, bad token address, RPC error, length mismatch) is
    /// reported as a `ChainQuery` error naming the channel.
    pub async fn query_on_chain_balances(
        &self,
        channel_id: &str,
        tokens: &[String],
    ) -> Result<Vec<TokenBalance>> {
        let chain_err = |reason: String| YellowError::ChainQuery {
            channel_id: channel_id.to_string(),
            reason,
        };

        let id = H256::from_str(channel_id.trim())
            .map_err(|e| chain_err(format!("invalid channel id: {e}")))?;
        let addresses = tokens
            .iter()
            .map(|t| {
                Address::from_str(t.trim())
                    .map_err(|e| chain_err(format!("invalid token address '{t}': {e}")))
            })
            .collect::<Result<Vec<_>>>()?;

        let amounts = self
            .chain
            .get_channel_balances(self.custody, id, &addresses)
            .await
            .map_err(|e| chain_err(e.to_string()))?;

        if amounts.len() != tokens.len() {
            return Err(chain_err(format!(
                "expected {} balances, got {}",
                tokens.len(),
                amounts.len()
            )));
        }

        Ok(tokens
            .iter()
            .zip(amounts)
            .map(|(token, amount)| TokenBalance {
                token: token.clone(),
                amount,
            })
            .collect())
    }

    /// Refreshes `owner`'s allocations of a cached channel from the chain.
    ///
    /// Queries every token the cached state mentions, overwrites the amount
    /// of `owner`'s allocation for each queried token, and caches the merged
    /// state. Returns `Ok(None)` if nothing is cached for the channel.
    pub async fn refresh_from_chain(
        &self,
        channel_id: &str,
        owner: &str,
    ) -> Result<Option<ChannelState>> {
        let Some(cached) = self.get_channel(channel_id) else {
            return Ok(None);
        };

        let mut tokens: Vec<String> = Vec::new();
        for token in std::iter::once(&cached.token).chain(cached.allocations.iter().map(|a| &a.token)) {
            if !token.trim().is_empty() && !tokens.iter().any(|t| t.eq_ignore_ascii_case(token)) {
                tokens.push(token.clone());
            }
        }
        if tokens.is_empty() {
            return Ok(Some(cached));
        }

        let balances = self.query_on_chain_balances(channel_id, &tokens).await?;

        let merged = self.update_with(channel_id, |current| {
            let mut next = current.clone();
            for alloc in next
                .allocations
                .iter_mut()
                .filter(|a| a.destination.eq_ignore_ascii_case(owner))
            {
                if let Some(balance) = balances.iter().find(|b| b.token.eq_ignore_ascii_case(&alloc.token)) {
                    alloc.amount = u256_to_decimal(balance.amount);
                }
            }
            next.updated_at = unix_now();
            next
        });

        if merged.is_none() {
            warn!(channel_id, "Channel evicted while refreshing balances");
        }
        Ok(merged)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use parking_lot::Mutex;
    use yellow_core::types::ChannelAllocation;

    const TOKEN: &str = "0xaaa0000000000000000000000000000000000001";
    const OTHER_TOKEN: &str = "0xbbb0000000000000000000000000000000000002";
    const OWNER: &str = "0x1111111111111111111111111111111111111111";
    const CHANNEL: &str = "0x00000000000000000000000000000000000000000000000000000000000000c1";

    /// Chain reader that answers from a fixed table or fails.
    struct FixedChain {
        balances: Mutex<Option<Vec<U256>>>,
    }

    #[async_trait]
    impl ChainReader for FixedChain {
        async fn get_channel_balances(
            &self,
            _custody: Address,
            _channel_id: H256,
            _tokens: &[Address],
        ) -> Result<Vec<U256>> {
            self.balances
                .lock()
                .clone()
                .ok_or_else(|| YellowError::InternalError("rpc down".into()))
        }
    }

    fn manager(balances: Option<Vec<U256>>) -> ChannelStateManager {
        ChannelStateManager::new(
            Arc::new(FixedChain {
                balances: Mutex::new(balances),
            }),
            Address::repeat_byte(0x01),
        )
    }

    fn state(id: &str, token: &str, status: ChannelStatus) -> ChannelState {
        ChannelState {
            channel_id: id.into(),
            status,
            chain_id: 42161,
            token: token.into(),
            allocations: vec![ChannelAllocation::new(OWNER, token, "0")],
            state_version: 0,
            state_intent: "INITIALIZE".into(),
            state_hash: None,
            adjudicator: "0xadj".into(),
            challenge_period: 3600,
            challenge_expiration: None,
            created_at: 1,
            updated_at: 1,
        }
    }

    #[test]
    fn test_update_get() {
        let cache = manager(None);
        cache.update_channel(state("a", TOKEN, ChannelStatus::Active));
        assert_eq!(cache.get_channel("a").unwrap().token, TOKEN);
        assert!(cache.get_channel("missing").is_none());
    }

    #[test]
    fn test_update_replaces_wholesale() {
        let cache = manager(None);
        cache.update_channel(state("a", TOKEN, ChannelStatus::Active));
        let mut next = state("a", TOKEN, ChannelStatus::Final);
        next.state_version = 3;
        cache.update_channel(next.clone());
        assert_eq!(cache.get_channel("a").unwrap(), next);
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn test_snapshot_is_defensive() {
        let cache = manager(None);
        cache.update_channel(state("a", TOKEN, ChannelStatus::Active));
        let mut snapshot = cache.get_all_channels();
        snapshot[0].status = ChannelStatus::Dispute;
        snapshot.clear();
        assert_eq!(cache.get_channel("a").unwrap().status, ChannelStatus::Active);
    }

    #[test]
    fn test_find_open_channel_insertion_order() {
        let cache = manager(None);
        cache.update_channel(state("closed", TOKEN, ChannelStatus::Final));
        cache.update_channel(state("first", TOKEN, ChannelStatus::Active));
        cache.update_channel(state("second", TOKEN, ChannelStatus::Active));
        cache.update_channel(state("other", OTHER_TOKEN, ChannelStatus::Active));

        assert_eq!(cache.find_open_channel(TOKEN).unwrap().channel_id, "first");
        assert_eq!(
            cache.find_open_channel(&TOKEN.to_uppercase().replace("0X", "0x")).unwrap().channel_id,
            "first"
        );
        assert_eq!(cache.find_open_channel(OTHER_TOKEN).unwrap().channel_id, "other");
        assert!(cache.find_open_channel("0xdead").is_none());
    }

    #[test]
    fn test_update_with() {
        let cache = manager(None);
        cache.update_channel(state("a", TOKEN, ChannelStatus::Active));
        let next = cache
            .update_with("a", |s| s.resized(OWNER, "5", 2))
            .unwrap();
        assert_eq!(next.state_version, 1);
        assert_eq!(cache.get_channel("a").unwrap().allocations[0].amount, "5");
        assert!(cache.update_with("missing", |s| s.clone()).is_none());
    }

    #[test]
    fn test_clear() {
        let cache = manager(None);
        cache.update_channel(state("a", TOKEN, ChannelStatus::Active));
        cache.update_channel(state("b", TOKEN, ChannelStatus::Active));
        cache.clear();
        assert!(cache.is_empty());
        assert!(cache.get_all_channels().is_empty());
    }

    #[tokio::test]
    async fn test_query_on_chain_balances() {
        let cache = manager(Some(vec![U256::from(42u64)]));
        let balances = cache
            .query_on_chain_balances(CHANNEL, &[TOKEN.to_string()])
            .await
            .unwrap();
        assert_eq!(balances.len(), 1);
        assert_eq!(balances[0].amount, U256::from(42u64));

        let json = serde_json::to_value(&balances[0]).unwrap();
        assert_eq!(json["amount"], "42");
    }

    #[tokio::test]
    async fn test_query_failure_names_channel() {
        let cache = manager(None);
        let err = cache
            .query_on_chain_balances(CHANNEL, &[TOKEN.to_string()])
            .await
            .unwrap_err();
        assert!(matches!(err, YellowError::ChainQuery { .. }));
        assert!(err.to_string().contains(CHANNEL));

        let err = cache
            .query_on_chain_balances("not-hex", &[TOKEN.to_string()])
            .await
            .unwrap_err();
        assert!(err.to_string().contains("not-hex"));
    }

    #[tokio::test]
    async fn test_query_length_mismatch() {
        let cache = manager(Some(vec![]));
        let err = cache
            .query_on_chain_balances(CHANNEL, &[TOKEN.to_string()])
            .await
            .unwrap_err();
        assert!(err.to_string().contains("expected 1 balances"));
    }

    #[tokio::test]
    async fn test_refresh_from_chain_merges_owner_allocation() {
        let cache = manager(Some(vec![U256::from(777u64)]));
        let mut cached = state(CHANNEL, TOKEN, ChannelStatus::Active);
        cached.allocations.push(ChannelAllocation::new("0xbroker", TOKEN, "9"));
        cache.update_channel(cached);

        let refreshed = cache.refresh_from_chain(CHANNEL, OWNER).await.unwrap().unwrap();
        assert_eq!(refreshed.allocation_for(OWNER).unwrap().amount, "777");
        assert_eq!(refreshed.allocation_for("0xbroker").unwrap().amount, "9");
        assert_eq!(cache.get_channel(CHANNEL).unwrap(), refreshed);
    }

    #[tokio::test]
    async fn test_refresh_uncached_is_none() {
        let cache = manager(Some(vec![U256::one()]));
        assert!(cache.refresh_from_chain(CHANNEL, OWNER).await.unwrap().is_none());
    }
}
