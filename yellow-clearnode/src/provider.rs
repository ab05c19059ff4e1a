//! The Yellow provider.
//!
//! Orchestrates the connection, the session, the channel cache, and on-chain
//! settlement. Only [`YellowProvider::new`] may fail; every other public
//! operation returns an [`Outcome`], classifying any internal error into a
//! [`ReasonCode`] so callers can fall back uniformly.

use std::str::FromStr;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use ethers::middleware::SignerMiddleware;
use ethers::providers::{Http, Provider};
use ethers::signers::{LocalWallet, Signer};
use ethers::types::U256;
use parking_lot::RwLock;
use serde::Serialize;
use serde_json::Value;
use tracing::{debug, info, instrument, warn};
use uuid::Uuid;

use yellow_channels::ChannelStateManager;
use yellow_core::constants::*;
use yellow_core::error::{ReasonCode, Result, YellowError};
use yellow_core::serialization::{parse_amount, u256_to_decimal};
use yellow_core::traits::{
    ChainReader, ChannelDefinition, ChannelSettlement, SettlementRequest, WalletSigner,
};
use yellow_core::types::*;
use yellow_events::infer_mapping;

use crate::classify::{classify, extract_revert_reason};
use crate::connection::{ClearNodeConnection, ConnectionConfig, ConnectionEvent};
use crate::events::{EventBus, EventListener, ListenerId, ProviderEvent, ProviderEventKind, ProviderStatus};
use crate::rpc::{self, *};
use crate::session::SessionKeyManager;
use crate::settlement::{CustodyReader, CustodySettlement};

/// Client-side ClearNode protocol engine.
pub struct YellowProvider {
    config: YellowConfig,
    connection: ClearNodeConnection,
    session: Arc<SessionKeyManager>,
    channels: Arc<ChannelStateManager>,
    settlement: Arc<dyn ChannelSettlement>,
    status: Arc<RwLock<ProviderStatus>>,
    events: Arc<EventBus>,
    notifications_wired: AtomicBool,
}

impl YellowProvider {
    /// Creates a provider.
    ///
    /// Fails only on an invalid configuration.
    pub fn new(
        config: YellowConfig,
        wallet: Arc<dyn WalletSigner>,
        chain: Arc<dyn ChainReader>,
        settlement: Arc<dyn ChannelSettlement>,
    ) -> Result<Self> {
        config.validate()?;
        let custody = config.custody()?;

        let connection = ClearNodeConnection::new(ConnectionConfig::from(&config));
        let session = Arc::new(SessionKeyManager::new(
            connection.clone(),
            wallet,
            AuthParams {
                allowances: config.allowances.clone(),
                ttl_secs: config.session_ttl_secs,
                application: config.application.clone(),
                scope: config.scope.clone(),
            },
        ));
        let channels = Arc::new(ChannelStateManager::new(chain, custody));
        let status = Arc::new(RwLock::new(ProviderStatus::Disconnected));
        let events = Arc::new(EventBus::new());

        {
            let status = status.clone();
            let events = events.clone();
            // weak: the session owns the connection that owns this listener
            let session = Arc::downgrade(&session);
            connection.on_event(Arc::new(move |event| {
                let next = match event {
                    ConnectionEvent::Connected => ProviderStatus::Connected,
                    ConnectionEvent::Disconnected => ProviderStatus::Disconnected,
                    ConnectionEvent::Reconnecting { .. } => {
                        if let Some(session) = session.upgrade() {
                            session.expire();
                        }
                        ProviderStatus::Connecting
                    }
                    ConnectionEvent::Error(_) => ProviderStatus::Error,
                };
                set_status(&status, &events, next);
            }));
        }

        info!(ws_url = %config.ws_url, chain_id = config.chain_id, "Yellow provider created");
        Ok(Self {
            config,
            connection,
            session,
            channels,
            settlement,
            status,
            events,
            notifications_wired: AtomicBool::new(false),
        })
    }

    /// Creates a provider that reads and settles through `config.rpc_url`,
    /// signing transactions and challenges with `wallet`.
    pub fn with_wallet(config: YellowConfig, wallet: LocalWallet) -> Result<Self> {
        config.validate()?;
        let custody = config.custody()?;
        let rpc = Provider::<Http>::try_from(config.rpc_url.as_str())
            .map_err(|e| YellowError::ConfigError(format!("invalid rpc_url: {e}")))?;
        let wallet = wallet.with_chain_id(config.chain_id);

        let chain = Arc::new(CustodyReader::new(Arc::new(rpc.clone())));
        let signer = Arc::new(SignerMiddleware::new(rpc, wallet.clone()));
        let settlement = Arc::new(CustodySettlement::new(custody, signer));
        Self::new(config, Arc::new(wallet), chain, settlement)
    }

    /// Configuration in use.
    pub fn config(&self) -> &YellowConfig {
        &self.config
    }

    /// Current provider status.
    pub fn status(&self) -> ProviderStatus {
        *self.status.read()
    }

    /// Channel cache.
    pub fn channels(&self) -> &ChannelStateManager {
        &self.channels
    }

    /// Session manager.
    pub fn session(&self) -> &SessionKeyManager {
        &self.session
    }

    /// Subscribes to provider events of one kind.
    pub fn on(&self, kind: ProviderEventKind, listener: EventListener) -> ListenerId {
        self.events.on(kind, listener)
    }

    /// Unsubscribes a listener.
    pub fn off(&self, id: ListenerId) -> bool {
        self.events.off(id)
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // LIFECYCLE
    // ═══════════════════════════════════════════════════════════════════════════

    /// Connects to the ClearNode and authenticates a session.
    #[instrument(skip(self))]
    pub async fn connect(&self) -> Outcome<SessionInfo> {
        set_status(&self.status, &self.events, ProviderStatus::Connecting);

        let result = async {
            self.connection.connect().await?;
            self.wire_notifications();
            self.session.ensure_authenticated().await
        }
        .await;

        match result {
            Ok(info) => {
                set_status(&self.status, &self.events, ProviderStatus::Connected);
                Outcome::Success(info)
            }
            Err(e) => {
                set_status(&self.status, &self.events, ProviderStatus::Error);
                fail("connect", &e)
            }
        }
    }

    /// Closes the connection and forgets the session. The cache survives.
    pub fn disconnect(&self) -> Outcome<()> {
        self.connection.disconnect();
        // the connection dropped its handlers
        self.notifications_wired.store(false, Ordering::SeqCst);
        self.session.invalidate();
        set_status(&self.status, &self.events, ProviderStatus::Disconnected);
        Outcome::Success(())
    }

    /// Applies relay push notifications to the cache.
    fn wire_notifications(&self) {
        if self.notifications_wired.swap(true, Ordering::SeqCst) {
            return;
        }
        let channels = self.channels.clone();
        self.connection.on_message(Arc::new(move |message| {
            apply_notification(&channels, message);
            Ok(())
        }));
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // CHANNELS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Opens a channel for `token` on `chain_id`.
    #[instrument(skip(self), fields(chain_id = params.chain_id, token = %params.token))]
    pub async fn create_channel(&self, params: CreateChannelParams) -> Outcome<ChannelOperationResult> {
        if params.token.trim().is_empty() {
            return missing(vec!["token"]);
        }
        if !self.config.supports_chain(params.chain_id) {
            return unsupported_chain(params.chain_id);
        }
        self.try_create_channel(&params)
            .await
            .unwrap_or_else(|e| fail("create_channel", &e))
    }

    async fn try_create_channel(&self, params: &CreateChannelParams) -> Result<Outcome<ChannelOperationResult>> {
        self.session.ensure_authenticated().await?;
        let owner = self.session.wallet_address();

        let reply = self
            .relay(
                METHOD_CREATE_CHANNEL,
                &CreateChannelRequest {
                    chain_id: params.chain_id,
                    token: params.token.clone(),
                    participant: owner.clone(),
                },
            )
            .await?;
        let payload = rpc::extract_payload(&reply);
        let channel_id = require_channel_id(METHOD_CREATE_CHANNEL, payload)?;

        let now = unix_now();
        let state = ChannelState {
            channel_id: channel_id.clone(),
            status: rpc::str_field(payload, "status", "channelStatus")
                .and_then(ChannelStatus::parse)
                .unwrap_or(ChannelStatus::Active),
            chain_id: params.chain_id,
            token: params.token.clone(),
            allocations: rpc::allocations_field(payload)
                .unwrap_or_else(|| vec![ChannelAllocation::new(&owner, &params.token, "0")]),
            state_version: rpc::u64_field(payload, "stateVersion", "state_version").unwrap_or(0),
            state_intent: rpc::str_field(payload, "stateIntent", "state_intent")
                .unwrap_or(INTENT_INITIALIZE)
                .to_string(),
            state_hash: rpc::str_field(payload, "stateHash", "state_hash").map(str::to_string),
            adjudicator: rpc::str_field(payload, "adjudicator", "adjudicator")
                .unwrap_or(&self.config.adjudicator_address)
                .to_string(),
            challenge_period: rpc::u64_field(payload, "challengePeriod", "challenge_period")
                .unwrap_or(self.config.challenge_duration),
            challenge_expiration: None,
            created_at: now,
            updated_at: now,
        };

        let request = SettlementRequest {
            channel_id: channel_id.clone(),
            channel: Some(ChannelDefinition {
                participants: vec![owner, format!("{:?}", self.config.broker()?)],
                adjudicator: state.adjudicator.clone(),
                challenge: state.challenge_period,
                nonce: rpc::u64_field(payload, "nonce", "nonce").unwrap_or(now),
            }),
            intent: state.state_intent.clone(),
            version: state.state_version,
            state_data: state_data(payload),
            allocations: state.allocations.clone(),
            signatures: rpc::string_list_field(payload, "signatures", "sigs"),
        };
        let tx_hash = match self.settlement.create(&request).await {
            Ok(hash) => hash,
            Err(e) => return Ok(tx_failed("create_channel", &channel_id, &e)),
        };

        self.channels.update_channel(state.clone());
        self.events.emit(&ProviderEvent::ChannelCreated(state.clone()));
        info!(channel_id = %channel_id, tx_hash = %tx_hash, "Channel created");

        Ok(Outcome::Success(ChannelOperationResult {
            channel_id,
            tx_hash,
            state,
            withdrawal_tx_hash: None,
        }))
    }

    /// Sets the caller's allocation in a channel to `amount`.
    #[instrument(skip(self), fields(channel_id = %params.channel_id, amount = %params.amount))]
    pub async fn resize_channel(&self, params: ResizeChannelParams) -> Outcome<ChannelOperationResult> {
        let mut absent = Vec::new();
        if params.channel_id.trim().is_empty() {
            absent.push("channelId");
        }
        if params.amount.trim().is_empty() {
            absent.push("amount");
        }
        if !absent.is_empty() {
            return missing(absent);
        }
        self.try_resize_channel(&params)
            .await
            .unwrap_or_else(|e| fail::<ChannelOperationResult>("resize_channel", &e).with_channel_id(&params.channel_id))
    }

    async fn try_resize_channel(&self, params: &ResizeChannelParams) -> Result<Outcome<ChannelOperationResult>> {
        parse_amount(&params.amount)?;
        let cached = self.cached_channel(&params.channel_id)?;
        if cached.status == ChannelStatus::Dispute {
            return Err(YellowError::ChannelInDispute(cached.channel_id));
        }

        self.session.ensure_authenticated().await?;
        let owner = self.session.wallet_address();
        let destination = params.funds_destination.clone().unwrap_or_else(|| owner.clone());

        let reply = self
            .relay(
                METHOD_RESIZE_CHANNEL,
                &ResizeChannelRequest {
                    channel_id: params.channel_id.clone(),
                    allocate_amount: params.amount.clone(),
                    funds_destination: destination,
                },
            )
            .await?;
        let payload = rpc::extract_payload(&reply);
        let relay_allocations = rpc::allocations_field(payload);
        let relay_hash = rpc::str_field(payload, "stateHash", "state_hash").map(str::to_string);

        let now = unix_now();
        let derive = |current: &ChannelState| {
            let mut next = current.resized(&owner, &params.amount, now);
            if let Some(allocations) = &relay_allocations {
                next.allocations = allocations.clone();
            }
            if relay_hash.is_some() {
                next.state_hash = relay_hash.clone();
            }
            next
        };

        let preview = derive(&cached);
        let request = SettlementRequest {
            channel_id: params.channel_id.clone(),
            channel: None,
            intent: preview.state_intent.clone(),
            version: preview.state_version,
            state_data: state_data(payload),
            allocations: preview.allocations.clone(),
            signatures: rpc::string_list_field(payload, "signatures", "sigs"),
        };
        let tx_hash = match self.settlement.resize(&request).await {
            Ok(hash) => hash,
            Err(e) => return Ok(tx_failed("resize_channel", &params.channel_id, &e)),
        };

        let state = self
            .channels
            .update_with(&params.channel_id, derive)
            .ok_or_else(|| YellowError::ChannelNotFound(params.channel_id.clone()))?;
        self.events.emit(&ProviderEvent::ChannelResized(state.clone()));
        info!(version = state.state_version, tx_hash = %tx_hash, "Channel resized");

        Ok(Outcome::Success(ChannelOperationResult {
            channel_id: params.channel_id.clone(),
            tx_hash,
            state,
            withdrawal_tx_hash: None,
        }))
    }

    /// Cooperatively closes a channel and withdraws the caller's funds.
    ///
    /// Refuses without touching the network if the channel is cached as
    /// `DISPUTE`. The withdrawal is best effort and never fails the close.
    #[instrument(skip(self), fields(channel_id = %params.channel_id))]
    pub async fn close_channel(&self, params: CloseChannelParams) -> Outcome<ChannelOperationResult> {
        if params.channel_id.trim().is_empty() {
            return missing(vec!["channelId"]);
        }
        if let Some(cached) = self.channels.get_channel(&params.channel_id) {
            if cached.status == ChannelStatus::Dispute {
                warn!("Refusing to close a disputed channel");
                let err = YellowError::ChannelInDispute(cached.channel_id);
                return Fallback::new(ReasonCode::YellowChannelDispute, err.to_string())
                    .with_channel_id(&params.channel_id)
                    .into();
            }
        }
        self.try_close_channel(&params)
            .await
            .unwrap_or_else(|e| fail::<ChannelOperationResult>("close_channel", &e).with_channel_id(&params.channel_id))
    }

    async fn try_close_channel(&self, params: &CloseChannelParams) -> Result<Outcome<ChannelOperationResult>> {
        let cached = self.cached_channel(&params.channel_id)?;
        self.session.ensure_authenticated().await?;
        let owner = self.session.wallet_address();

        let reply = self
            .relay(
                METHOD_CLOSE_CHANNEL,
                &CloseChannelRequest {
                    channel_id: params.channel_id.clone(),
                    funds_destination: params.funds_destination.clone().unwrap_or_else(|| owner.clone()),
                },
            )
            .await?;
        let payload = rpc::extract_payload(&reply);
        let relay_allocations = rpc::allocations_field(payload);
        let relay_hash = rpc::str_field(payload, "stateHash", "state_hash").map(str::to_string);

        let now = unix_now();
        let derive = |current: &ChannelState| {
            let mut next = current.finalized(now);
            if let Some(allocations) = &relay_allocations {
                next.allocations = allocations.clone();
            }
            if relay_hash.is_some() {
                next.state_hash = relay_hash.clone();
            }
            next
        };

        let preview = derive(&cached);
        let request = SettlementRequest {
            channel_id: params.channel_id.clone(),
            channel: None,
            intent: preview.state_intent.clone(),
            version: preview.state_version,
            state_data: state_data(payload),
            allocations: preview.allocations.clone(),
            signatures: rpc::string_list_field(payload, "signatures", "sigs"),
        };
        let tx_hash = match self.settlement.close(&request).await {
            Ok(hash) => hash,
            Err(e) => return Ok(tx_failed("close_channel", &params.channel_id, &e)),
        };

        let state = self
            .channels
            .update_with(&params.channel_id, derive)
            .ok_or_else(|| YellowError::ChannelNotFound(params.channel_id.clone()))?;

        let withdrawal_tx_hash = self.withdraw_after_close(&state, &owner).await;
        self.events.emit(&ProviderEvent::ChannelClosed(state.clone()));
        info!(tx_hash = %tx_hash, "Channel closed");

        Ok(Outcome::Success(ChannelOperationResult {
            channel_id: params.channel_id.clone(),
            tx_hash,
            state,
            withdrawal_tx_hash,
        }))
    }

    async fn withdraw_after_close(&self, state: &ChannelState, owner: &str) -> Option<String> {
        let amount = state
            .allocation_for(owner)
            .and_then(|a| parse_amount(&a.amount).ok())
            .filter(|a| !a.is_zero())?;
        match self
            .settlement
            .withdraw(&state.token, &u256_to_decimal(amount))
            .await
        {
            Ok(hash) => Some(hash),
            Err(e) => {
                warn!(channel_id = %state.channel_id, error = %e, "Withdrawal after close failed");
                None
            }
        }
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // TRANSFERS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Transfers funds off-chain to `destination`.
    ///
    /// Every line is checked against the caller's allocation in the open
    /// channel for its token before anything is sent.
    #[instrument(skip(self), fields(destination = %request.destination))]
    pub async fn transfer(&self, request: TransferRequest) -> Outcome<TransferResult> {
        let mut absent = Vec::new();
        if request.destination.trim().is_empty() {
            absent.push("destination");
        }
        if request.allocations.is_empty() {
            absent.push("allocations");
        }
        if !absent.is_empty() {
            return missing(absent);
        }

        match self.try_transfer(&request).await {
            Ok(result) => Outcome::Success(result),
            Err(YellowError::Relay { message, .. }) if message.to_lowercase().contains("balance") => {
                Fallback::new(ReasonCode::InsufficientChannelBalance, message).into()
            }
            Err(e) => fail("transfer", &e),
        }
    }

    async fn try_transfer(&self, request: &TransferRequest) -> Result<TransferResult> {
        let owner = self.session.wallet_address();
        for line in &request.allocations {
            self.check_channel_balance(&owner, line)?;
        }

        self.session.ensure_authenticated().await?;
        let reply = self
            .relay(
                METHOD_TRANSFER,
                &TransferParams {
                    destination: request.destination.clone(),
                    allocations: request.allocations.clone(),
                },
            )
            .await?;
        let payload = rpc::extract_payload(&reply);

        Ok(TransferResult {
            transfer_id: rpc::str_field(payload, "transferId", "transfer_id")
                .or_else(|| rpc::str_field(payload, "id", "id"))
                .map(str::to_string),
            destination: request.destination.clone(),
            allocations: request.allocations.clone(),
            timestamp: unix_now(),
        })
    }

    /// Fails with `InsufficientChannelBalance` if `line` exceeds what `owner`
    /// holds in the open channel for its token (no channel or no entry is 0).
    fn check_channel_balance(&self, owner: &str, line: &TransferAllocation) -> Result<()> {
        let requested = parse_amount(&line.amount)?;
        let available = self
            .channels
            .find_open_channel(&line.token)
            .and_then(|channel| {
                channel
                    .allocation_for(owner)
                    .and_then(|a| parse_amount(&a.amount).ok())
            })
            .unwrap_or_else(U256::zero);

        if requested > available {
            debug!(token = %line.token, %requested, %available, "Transfer exceeds channel balance");
            return Err(YellowError::InsufficientChannelBalance {
                requested: u256_to_decimal(requested),
                available: u256_to_decimal(available),
            });
        }
        Ok(())
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // INTENTS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Routes a cross-chain intent to solvers through a channel for its input token.
    #[instrument(skip(self, request))]
    pub async fn execute_intent(&self, request: IntentRequest) -> Outcome<IntentExecution> {
        let absent = missing_intent_fields(&request);
        if !absent.is_empty() {
            return missing(absent);
        }

        let (source, destination) = match (
            parse_chain(request.source_chain.as_deref()),
            parse_chain(request.destination_chain.as_deref()),
        ) {
            (Some(s), Some(d)) => (s, d),
            (None, _) => return unsupported_chain_label(request.source_chain.as_deref()),
            (_, None) => return unsupported_chain_label(request.destination_chain.as_deref()),
        };
        for chain in [source, destination] {
            if !self.config.supports_chain(chain) {
                return unsupported_chain(chain);
            }
        }

        match self.try_execute_intent(&request, source, destination).await {
            Ok(outcome) => outcome,
            Err(e) => fail("execute_intent", &e),
        }
    }

    async fn try_execute_intent(
        &self,
        request: &IntentRequest,
        source: u64,
        destination: u64,
    ) -> Result<Outcome<IntentExecution>> {
        // presence checked by the caller
        let input_token = request.input_token.clone().unwrap_or_default();
        let output_token = request.output_token.clone().unwrap_or_default();
        let input_amount = request.input_amount.clone().unwrap_or_default();
        let input_amount = u256_to_decimal(parse_amount(&input_amount)?);

        self.session.ensure_authenticated().await?;
        let owner = self.session.wallet_address();

        let channel = match self.channels.find_open_channel(&input_token) {
            Some(channel) => channel,
            None => {
                debug!(token = %input_token, "No open channel for input token, creating one");
                let created = self
                    .create_channel(CreateChannelParams {
                        chain_id: source,
                        token: input_token.clone(),
                    })
                    .await;
                match created {
                    Outcome::Success(result) => result.state,
                    Outcome::Fallback { fallback } => return Ok(fallback.into()),
                }
            }
        };

        let client_intent_id = Uuid::new_v4().to_string();
        let submit = SubmitIntentParams {
            client_intent_id: client_intent_id.clone(),
            channel_id: channel.channel_id.clone(),
            source_chain_id: source,
            destination_chain_id: destination,
            input_token,
            output_token,
            input_amount: input_amount.clone(),
            recipient: request.recipient.clone().unwrap_or(owner),
            min_amount_out: request.min_amount_out.clone(),
            settle: request.settle,
        };
        let reply = match self.relay(METHOD_SUBMIT_INTENT, &submit).await {
            Err(e @ YellowError::Timeout { .. }) => {
                return Ok(
                    Fallback::new(ReasonCode::NoSolverQuotes, format!("No solver quoted in time: {e}"))
                        .with_channel_id(&channel.channel_id)
                        .into(),
                );
            }
            reply => reply?,
        };
        let payload = rpc::extract_payload(&reply);

        let Some(quote) = normalize_quote(payload, &channel.channel_id, &input_amount, request) else {
            return Ok(Fallback::new(ReasonCode::NoSolverQuotes, "No solver quoted the intent")
                .with_channel_id(&channel.channel_id)
                .into());
        };
        let intent_id = rpc::str_field(payload, "intentId", "intent_id")
            .map(str::to_string)
            .unwrap_or(client_intent_id);
        info!(intent_id = %intent_id, solver = %quote.solver_id, amount_out = %quote.amount_out, "Quote received");
        self.events.emit(&ProviderEvent::QuoteReceived(quote.clone()));

        let clearing = request.settle.then(|| normalize_clearing(payload, &channel, &quote));
        if let Some(clearing) = &clearing {
            self.events.emit(&ProviderEvent::ClearingCompleted(clearing.clone()));
        }

        Ok(Outcome::Success(IntentExecution {
            intent_id,
            channel_id: channel.channel_id,
            quote,
            clearing,
        }))
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // QUERIES
    // ═══════════════════════════════════════════════════════════════════════════

    /// Lists the caller's channels.
    ///
    /// Prefers a fresh relay query; falls back to the cache when the relay is
    /// unreachable or fails.
    #[instrument(skip(self))]
    pub async fn get_channels(&self) -> Outcome<Vec<ChannelState>> {
        match self.fetch_channels().await {
            Ok(fresh) => Outcome::Success(fresh),
            Err(e) => {
                let cached = self.channels.get_all_channels();
                if cached.is_empty() {
                    fail("get_channels", &e)
                } else {
                    debug!(error = %e, count = cached.len(), "Serving cached channels");
                    Outcome::Success(cached)
                }
            }
        }
    }

    async fn fetch_channels(&self) -> Result<Vec<ChannelState>> {
        if !self.connection.is_connected() {
            return Err(YellowError::NotConnected);
        }
        self.session.ensure_authenticated().await?;
        let owner = self.session.wallet_address();
        let reply = self
            .relay(
                METHOD_GET_LEDGER_BALANCES,
                &LedgerQueryParams {
                    participant: owner,
                },
            )
            .await?;
        let payload = rpc::extract_payload(&reply);
        let entries = payload
            .get("channels")
            .and_then(Value::as_array)
            .or_else(|| payload.as_array())
            .ok_or_else(|| YellowError::MalformedResponse {
                method: METHOD_GET_LEDGER_BALANCES.into(),
                reason: "no channel list".into(),
            })?;

        let fresh: Vec<ChannelState> = entries
            .iter()
            .filter_map(|entry| self.parse_channel_entry(entry))
            .collect();
        for state in &fresh {
            self.channels.update_channel(state.clone());
        }
        Ok(fresh)
    }

    /// Builds a channel state from a relay listing entry, filling gaps from
    /// the cache and the configuration.
    fn parse_channel_entry(&self, entry: &Value) -> Option<ChannelState> {
        let channel_id = rpc::str_field(entry, "channelId", "channel_id")?;
        let cached = self.channels.get_channel(channel_id);
        let now = unix_now();

        let allocations = rpc::allocations_field(entry)
            .or_else(|| cached.as_ref().map(|c| c.allocations.clone()))?;
        let token = rpc::str_field(entry, "token", "token")
            .map(str::to_string)
            .or_else(|| cached.as_ref().map(|c| c.token.clone()))
            .or_else(|| allocations.first().map(|a| a.token.clone()))?;

        Some(ChannelState {
            channel_id: channel_id.to_string(),
            status: rpc::str_field(entry, "status", "channelStatus")
                .and_then(ChannelStatus::parse)
                .or(cached.as_ref().map(|c| c.status))
                .unwrap_or(ChannelStatus::Active),
            chain_id: rpc::u64_field(entry, "chainId", "chain_id")
                .or(cached.as_ref().map(|c| c.chain_id))
                .unwrap_or(self.config.chain_id),
            token,
            allocations,
            state_version: rpc::u64_field(entry, "stateVersion", "state_version")
                .or(cached.as_ref().map(|c| c.state_version))
                .unwrap_or(0),
            state_intent: rpc::str_field(entry, "stateIntent", "state_intent")
                .map(str::to_string)
                .or_else(|| cached.as_ref().map(|c| c.state_intent.clone()))
                .unwrap_or_else(|| INTENT_OPERATE.to_string()),
            state_hash: rpc::str_field(entry, "stateHash", "state_hash")
                .map(str::to_string)
                .or_else(|| cached.as_ref().and_then(|c| c.state_hash.clone())),
            adjudicator: rpc::str_field(entry, "adjudicator", "adjudicator")
                .map(str::to_string)
                .unwrap_or_else(|| self.config.adjudicator_address.clone()),
            challenge_period: rpc::u64_field(entry, "challengePeriod", "challenge_period")
                .unwrap_or(self.config.challenge_duration),
            challenge_expiration: rpc::u64_field(entry, "challengeExpiration", "challenge_expiration"),
            created_at: cached.as_ref().map_or(now, |c| c.created_at),
            updated_at: now,
        })
    }

    /// Returns a channel's state, refreshed from the chain when possible.
    #[instrument(skip(self))]
    pub async fn get_channel_state(&self, channel_id: &str) -> Outcome<ChannelState> {
        let Some(cached) = self.channels.get_channel(channel_id) else {
            let err = YellowError::ChannelNotFound(channel_id.to_string());
            return fail::<ChannelState>("get_channel_state", &err).with_channel_id(channel_id);
        };

        let owner = self.session.wallet_address();
        match self.channels.refresh_from_chain(channel_id, &owner).await {
            Ok(Some(refreshed)) => Outcome::Success(refreshed),
            Ok(None) => Outcome::Success(cached),
            Err(e) => {
                warn!(error = %e, "On-chain refresh failed, serving cached state");
                Outcome::Success(cached)
            }
        }
    }

    // ═══════════════════════════════════════════════════════════════════════════
    // HELPERS
    // ═══════════════════════════════════════════════════════════════════════════

    /// Signs and sends a relay request, failing on a relay error reply.
    async fn relay<P: Serialize>(&self, method: &str, params: &P) -> Result<Value> {
        let mut request = RpcRequest::new(method, params)?;
        self.session.session_signer()?.sign_request(&mut request)?;

        let reply = self
            .connection
            .send_and_wait(&request.to_json()?, method, None)
            .await?;
        if let Some(message) = rpc::extract_error(&reply) {
            warn!(method, error = %message, "ClearNode rejected request");
            return Err(YellowError::Relay {
                method: method.to_string(),
                message,
            });
        }
        Ok(reply)
    }

    fn cached_channel(&self, channel_id: &str) -> Result<ChannelState> {
        self.channels
            .get_channel(channel_id)
            .ok_or_else(|| YellowError::ChannelNotFound(channel_id.to_string()))
    }
}

trait WithChannelId {
    fn with_channel_id(self, channel_id: &str) -> Self;
}

impl<T> WithChannelId for Outcome<T> {
    fn with_channel_id(self, channel_id: &str) -> Self {
        match self {
            Outcome::Fallback { fallback } => fallback.with_channel_id(channel_id).into(),
            success => success,
        }
    }
}

fn set_status(status: &RwLock<ProviderStatus>, events: &EventBus, next: ProviderStatus) {
    let changed = {
        let mut current = status.write();
        let changed = *current != next;
        *current = next;
        changed
    };
    if changed {
        debug!(status = ?next, "Provider status changed");
        events.emit(&ProviderEvent::StatusChanged(next));
    }
}

/// Classifies `err` into a fallback.
fn fail<T>(operation: &str, err: &YellowError) -> Outcome<T> {
    let code = classify(err);
    warn!(
        operation,
        reason_code = %code,
        recoverable = err.is_recoverable(),
        error = %err,
        "Operation fell back"
    );
    Fallback::new(code, err.to_string()).into()
}

fn tx_failed<T>(operation: &str, channel_id: &str, err: &YellowError) -> Outcome<T> {
    let message = err.to_string();
    warn!(
        operation,
        channel_id,
        tx_hash = err.tx_hash(),
        error = %message,
        "Settlement failed after relay accepted"
    );
    let fallback = Fallback::new(ReasonCode::YellowTxFailed, message.clone())
        .with_channel_id(channel_id)
        .with_revert_reason(extract_revert_reason(&message));
    match err.tx_hash() {
        Some(hash) => fallback.with_tx_hash(hash).into(),
        None => fallback.into(),
    }
}

fn missing<T>(fields: Vec<&str>) -> Outcome<T> {
    let err = YellowError::MissingParams(fields.into_iter().map(str::to_string).collect());
    Fallback::new(ReasonCode::MissingParams, err.to_string()).into()
}

fn unsupported_chain<T>(chain_id: u64) -> Outcome<T> {
    Fallback::new(
        ReasonCode::UnsupportedChain,
        YellowError::UnsupportedChain(chain_id).to_string(),
    )
    .into()
}

fn unsupported_chain_label<T>(label: Option<&str>) -> Outcome<T> {
    Fallback::new(
        ReasonCode::UnsupportedChain,
        format!("Unsupported chain: {}", label.unwrap_or_default().trim()),
    )
    .into()
}

fn parse_chain(label: Option<&str>) -> Option<u64> {
    label.and_then(|l| u64::from_str(l.trim()).ok()).filter(|id| *id > 0)
}

fn is_blank(value: &Option<String>) -> bool {
    value.as_deref().map_or(true, |v| v.trim().is_empty())
}

/// Names of the required intent fields that are absent or blank.
pub fn missing_intent_fields(request: &IntentRequest) -> Vec<&'static str> {
    [
        ("sourceChain", &request.source_chain),
        ("destinationChain", &request.destination_chain),
        ("inputToken", &request.input_token),
        ("outputToken", &request.output_token),
        ("inputAmount", &request.input_amount),
    ]
    .into_iter()
    .filter(|(_, value)| is_blank(value))
    .map(|(name, _)| name)
    .collect()
}

fn require_channel_id(method: &str, payload: &Value) -> Result<String> {
    rpc::str_field(payload, "channelId", "channel_id")
        .map(str::to_string)
        .ok_or_else(|| YellowError::MalformedResponse {
            method: method.to_string(),
            reason: "missing channelId".into(),
        })
}

fn state_data(payload: &Value) -> String {
    rpc::str_field(payload, "stateData", "state_data")
        .unwrap_or("0x")
        .to_string()
}

/// Builds a quote from a `submit_intent` reply, or `None` if nobody quoted.
fn normalize_quote(
    payload: &Value,
    channel_id: &str,
    input_amount: &str,
    request: &IntentRequest,
) -> Option<YellowQuote> {
    let quote = match payload.get("quote") {
        Some(q) if q.is_object() => q,
        _ if rpc::str_field(payload, "solverId", "solver_id").is_some()
            || rpc::amount_field(payload, "amountOut", "amount_out").is_some() =>
        {
            payload
        }
        _ => return None,
    };

    let now = unix_now();
    Some(YellowQuote {
        solver_id: rpc::str_field(quote, "solverId", "solver_id")
            .unwrap_or("unknown")
            .to_string(),
        channel_id: channel_id.to_string(),
        amount_in: rpc::amount_field(quote, "amountIn", "amount_in")
            .unwrap_or_else(|| input_amount.to_string()),
        amount_out: rpc::amount_field(quote, "amountOut", "amount_out")
            .or_else(|| request.min_amount_out.clone())
            .unwrap_or_else(|| input_amount.to_string()),
        estimated_time: rpc::u64_field(quote, "estimatedTime", "estimated_time")
            .filter(|t| *t > 0)
            .unwrap_or(DEFAULT_QUOTE_ESTIMATED_TIME_SECS),
        timestamp: rpc::u64_field(quote, "timestamp", "timestamp")
            .filter(|t| *t > 0)
            .unwrap_or(now),
    })
}

/// Builds a clearing result, defaulting matched amounts to the quote.
fn normalize_clearing(payload: &Value, channel: &ChannelState, quote: &YellowQuote) -> ClearingResult {
    let empty = Value::Null;
    let clearing = payload.get("clearing").filter(|c| c.is_object()).unwrap_or(&empty);
    let proof_source = clearing
        .get("settlementProof")
        .or_else(|| clearing.get("settlement_proof"))
        .filter(|p| p.is_object())
        .unwrap_or(clearing);

    let settlement_proof = rpc::str_field(proof_source, "stateHash", "state_hash")
        .map(str::to_string)
        .or_else(|| channel.state_hash.clone())
        .map(|state_hash| SettlementProof {
            state_hash,
            signatures: rpc::string_list_field(proof_source, "signatures", "sigs"),
            tx_hash: rpc::str_field(proof_source, "txHash", "tx_hash").map(str::to_string),
            final_allocations: rpc::allocations_field(proof_source)
                .unwrap_or_else(|| channel.allocations.clone()),
        });

    ClearingResult {
        channel_id: channel.channel_id.clone(),
        matched_amount_in: rpc::amount_field(clearing, "matchedAmountIn", "matched_amount_in")
            .unwrap_or_else(|| quote.amount_in.clone()),
        matched_amount_out: rpc::amount_field(clearing, "matchedAmountOut", "matched_amount_out")
            .unwrap_or_else(|| quote.amount_out.clone()),
        net_settlement: rpc::amount_field(clearing, "netSettlement", "net_settlement")
            .unwrap_or_else(|| quote.amount_out.clone()),
        settlement_proof,
        timestamp: rpc::u64_field(clearing, "timestamp", "timestamp")
            .filter(|t| *t > 0)
            .unwrap_or_else(unix_now),
    }
}

/// Applies a pushed channel update to the cache, if it names a cached channel.
fn apply_notification(channels: &ChannelStateManager, message: &Value) {
    let payload = rpc::extract_payload(message);
    let Some(mapping) = infer_mapping(payload).or_else(|| infer_mapping(message)) else {
        return;
    };
    debug!(
        status = ?mapping.execution_status,
        step = mapping.step_label,
        terminal = mapping.is_terminal,
        "ClearNode notification"
    );

    let Some(channel_id) = rpc::str_field(payload, "channelId", "channel_id") else {
        return;
    };
    let Some(status) =
        rpc::str_field(payload, "channelStatus", "channel_status").and_then(ChannelStatus::parse)
    else {
        return;
    };
    let challenge_expiration = rpc::u64_field(payload, "challengeExpiration", "challenge_expiration");
    channels.update_with(channel_id, |current| ChannelState {
        status,
        challenge_expiration: challenge_expiration.or(current.challenge_expiration),
        updated_at: unix_now(),
        ..current.clone()
    });
}
