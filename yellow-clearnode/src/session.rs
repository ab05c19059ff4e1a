//! Ephemeral session keys.
//!
//! The long-lived wallet never signs channel traffic. Instead it authorizes a
//! freshly generated session key once per session through a four-message
//! handshake:
//!
//! 1. `auth_request` (wallet address, session key, allowances, expiry, scope)
//! 2. `auth_challenge` from the ClearNode
//! 3. `auth_verify` with the wallet's EIP-712 signature of the challenge
//! 4. confirmation from the ClearNode
//!
//! After that, relay messages are signed with the session key only.

use std::sync::Arc;

use ethers::signers::{LocalWallet, Signer};
use ethers::types::transaction::eip712::TypedData;
use ethers::types::{Address, Signature, H256};
use ethers::utils::{keccak256, to_checksum};
use parking_lot::RwLock;
use serde_json::{json, Value};
use tracing::{debug, info, instrument, warn};

use yellow_core::constants::*;
use yellow_core::error::{Result, YellowError};
use yellow_core::traits::WalletSigner;
use yellow_core::types::{unix_now, AuthParams, SessionInfo};

use crate::connection::ClearNodeConnection;
use crate::rpc::{self, AuthRequestParams, AuthVerifyParams, RpcRequest};

/// Signs payloads with the ephemeral session key.
#[derive(Clone, Debug)]
pub struct SessionSigner {
    key: LocalWallet,
}

impl SessionSigner {
    /// Session key address.
    pub fn address(&self) -> Address {
        Signer::address(&self.key)
    }

    /// Signs `keccak256(payload)`.
    pub fn sign(&self, payload: &[u8]) -> Result<Signature> {
        self.key
            .sign_hash(H256::from(keccak256(payload)))
            .map_err(|e| YellowError::SigningFailed(e.to_string()))
    }

    /// Appends a session signature over `[method, params]` to a request.
    pub fn sign_request(&self, request: &mut RpcRequest) -> Result<()> {
        let signature = self.sign(&request.signing_payload()?)?;
        request.sig.push(signature_hex(&signature));
        Ok(())
    }
}

#[derive(Default)]
struct SessionState {
    key: Option<LocalWallet>,
    info: Option<SessionInfo>,
    last_params: Option<AuthParams>,
}

/// Owns the session key and drives authentication over a connection.
pub struct SessionKeyManager {
    connection: ClearNodeConnection,
    wallet: Arc<dyn WalletSigner>,
    defaults: AuthParams,
    state: RwLock<SessionState>,
    // serializes handshakes; two concurrent ones would share method names
    handshake: tokio::sync::Mutex<()>,
}

impl SessionKeyManager {
    /// Creates a manager. `defaults` are used until a handshake succeeds.
    pub fn new(
        connection: ClearNodeConnection,
        wallet: Arc<dyn WalletSigner>,
        defaults: AuthParams,
    ) -> Self {
        Self {
            connection,
            wallet,
            defaults,
            state: RwLock::new(SessionState::default()),
            handshake: tokio::sync::Mutex::new(()),
        }
    }

    /// Long-lived wallet address, checksummed.
    pub fn wallet_address(&self) -> String {
        to_checksum(&self.wallet.address(), None)
    }

    /// Runs the full handshake with a fresh session key.
    pub async fn authenticate(&self, params: AuthParams) -> Result<SessionInfo> {
        let _guard = self.handshake.lock().await;
        self.run_handshake(params).await
    }

    /// Returns true if a session exists and has not expired.
    ///
    /// An expired session is marked unauthenticated as a side effect.
    pub fn is_authenticated(&self) -> bool {
        let mut state = self.state.write();
        let Some(info) = state.info.as_mut() else {
            return false;
        };
        if info.authenticated && info.is_expired_at(unix_now()) {
            debug!(session = %info.session_address, "Session expired");
            info.authenticated = false;
        }
        info.authenticated
    }

    /// Current session, if any (live or expired).
    pub fn session(&self) -> Option<SessionInfo> {
        self.state.read().info.clone()
    }

    /// Signer for the current session key.
    pub fn session_signer(&self) -> Result<SessionSigner> {
        self.state
            .read()
            .key
            .clone()
            .map(|key| SessionSigner { key })
            .ok_or(YellowError::NotAuthenticated)
    }

    /// Forgets the session key, the session, and the remembered parameters.
    pub fn invalidate(&self) {
        *self.state.write() = SessionState::default();
    }

    /// Marks the session unauthenticated but keeps the parameters for replay.
    ///
    /// Used when the socket was re-established and the relay no longer knows
    /// the session key.
    pub fn expire(&self) {
        if let Some(info) = self.state.write().info.as_mut() {
            info.authenticated = false;
        }
    }

    /// Invalidates and replays the last successful parameters.
    pub async fn reauthenticate(&self) -> Result<SessionInfo> {
        let _guard = self.handshake.lock().await;
        self.replay().await
    }

    /// Returns the live session, re-authenticating if there is none.
    pub async fn ensure_authenticated(&self) -> Result<SessionInfo> {
        if let Some(info) = self.live_session() {
            return Ok(info);
        }
        let _guard = self.handshake.lock().await;
        // another caller may have finished a handshake while we waited
        if let Some(info) = self.live_session() {
            return Ok(info);
        }
        self.replay().await
    }

    fn live_session(&self) -> Option<SessionInfo> {
        if self.is_authenticated() {
            self.session()
        } else {
            None
        }
    }

    async fn replay(&self) -> Result<SessionInfo> {
        let params = self
            .state
            .read()
            .last_params
            .clone()
            .unwrap_or_else(|| self.defaults.clone());
        self.invalidate();
        self.run_handshake(params).await
    }

    #[instrument(skip(self, params), fields(application = %params.application))]
    async fn run_handshake(&self, params: AuthParams) -> Result<SessionInfo> {
        let key = LocalWallet::new(&mut rand::thread_rng());
        let participant = to_checksum(&Signer::address(&key), None);
        let expires_at = unix_now().saturating_add(params.ttl_secs);
        info!(session = %participant, "Authenticating with ClearNode");

        let request = RpcRequest::new(
            METHOD_AUTH_REQUEST,
            &AuthRequestParams {
                address: self.wallet_address(),
                participant: participant.clone(),
                allowances: params.allowances.clone(),
                expires_at,
                application: params.application.clone(),
                scope: params.scope.clone(),
            },
        )?;
        let reply = self
            .connection
            .send_and_wait(&request.to_json()?, METHOD_AUTH_CHALLENGE, None)
            .await?;
        if let Some(err) = rpc::extract_error(&reply) {
            return Err(YellowError::AuthFailed(err));
        }
        let challenge = extract_challenge(&reply)
            .ok_or_else(|| YellowError::AuthFailed("auth_challenge carried no challenge".into()))?;

        let typed = challenge_typed_data(&challenge)?;
        let signature = self.wallet.sign_typed_data(&typed).await?;

        let verify = RpcRequest::new(
            METHOD_AUTH_VERIFY,
            &AuthVerifyParams {
                participant: participant.clone(),
                signature: signature_hex(&signature),
                challenge,
            },
        )?;
        let reply = self
            .connection
            .send_and_wait(&verify.to_json()?, METHOD_AUTH_VERIFY, None)
            .await?;
        if let Some(err) = rpc::extract_error(&reply) {
            warn!(error = %err, "ClearNode rejected auth_verify");
            return Err(YellowError::AuthFailed(err));
        }
        if !verify_accepted(&reply) {
            return Err(YellowError::AuthFailed(
                "ClearNode did not confirm the session".into(),
            ));
        }

        let info = SessionInfo {
            session_address: participant,
            expires_at,
            authenticated: true,
        };
        *self.state.write() = SessionState {
            key: Some(key),
            info: Some(info.clone()),
            last_params: Some(params),
        };
        info!(session = %info.session_address, expires_at, "Session authenticated");
        Ok(info)
    }
}

/// `0x`-prefixed 65-byte signature.
fn signature_hex(signature: &Signature) -> String {
    format!("0x{}", hex::encode(signature.to_vec()))
}

/// Reads the challenge from the payload or the top level.
fn extract_challenge(reply: &Value) -> Option<String> {
    let payload = rpc::extract_payload(reply);
    [payload, reply].into_iter().find_map(|source| {
        ["challenge", "challengeMessage", "challenge_message"]
            .into_iter()
            .find_map(|key| source.get(key).and_then(Value::as_str))
            .filter(|c| !c.trim().is_empty())
            .map(str::to_string)
    })
}

/// True if any recognized location carries an explicit success marker.
fn verify_accepted(reply: &Value) -> bool {
    let sources = [
        Some(reply),
        reply.get("response"),
        Some(rpc::extract_payload(reply)),
    ];
    sources.into_iter().flatten().any(|source| {
        let flag = |key: &str| source.get(key).and_then(Value::as_bool) == Some(true);
        let status_ok = source
            .get("status")
            .and_then(Value::as_str)
            .map(|s| s.eq_ignore_ascii_case("ok") || s.eq_ignore_ascii_case("authenticated"))
            .unwrap_or(false);
        flag("authenticated") || flag("success") || status_ok
    })
}

/// EIP-712 payload the wallet signs to answer a challenge.
pub fn challenge_typed_data(challenge: &str) -> Result<TypedData> {
    let mut types = serde_json::Map::new();
    types.insert(
        "EIP712Domain".into(),
        json!([
            {"name": "name", "type": "string"},
            {"name": "version", "type": "string"}
        ]),
    );
    types.insert(
        AUTH_PRIMARY_TYPE.into(),
        json!([{"name": "challenge", "type": "string"}]),
    );

    let data = json!({
        "types": types,
        "primaryType": AUTH_PRIMARY_TYPE,
        "domain": {"name": AUTH_DOMAIN_NAME, "version": AUTH_DOMAIN_VERSION},
        "message": {"challenge": challenge},
    });
    serde_json::from_value(data).map_err(|e| YellowError::SigningFailed(e.to_string()))
}
