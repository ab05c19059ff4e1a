//! Shared fixtures for unit tests: an in-process WebSocket server and a
//! scripted ClearNode that completes the auth handshake.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use ethers::types::{Address, H256, U256};
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

use yellow_core::constants::{METHOD_AUTH_CHALLENGE, METHOD_AUTH_REQUEST, METHOD_AUTH_VERIFY};
use yellow_core::error::{Result, YellowError};
use yellow_core::traits::{ChainReader, ChannelSettlement, SettlementRequest};
use yellow_core::types::ReconnectConfig;

use crate::connection::ConnectionConfig;

pub(crate) type ServerWs = WebSocketStream<TcpStream>;

/// Challenge issued by [`auth_relay`].
pub(crate) const CHALLENGE: &str = "c7f1a3e0-challenge";

/// Installs a test subscriber honouring `RUST_LOG`.
pub(crate) fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

/// Serves every accepted socket with `handler(ws, accept_index)`.
pub(crate) async fn spawn_server<F, Fut>(handler: F) -> (String, JoinHandle<()>)
where
    F: Fn(ServerWs, usize) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = ()> + Send + 'static,
{
    let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    let handler = Arc::new(handler);
    let handle = tokio::spawn(async move {
        let mut index = 0;
        while let Ok((tcp, _)) = listener.accept().await {
            let handler = handler.clone();
            let n = index;
            index += 1;
            tokio::spawn(async move {
                if let Ok(ws) = tokio_tungstenite::accept_async(tcp).await {
                    handler(ws, n).await;
                }
            });
        }
    });
    (format!("ws://{addr}"), handle)
}

pub(crate) fn connection_config(url: &str) -> ConnectionConfig {
    ConnectionConfig {
        url: url.to_string(),
        connect_timeout: Duration::from_secs(2),
        request_timeout: Duration::from_secs(2),
        reconnect: ReconnectConfig {
            enabled: true,
            max_attempts: 3,
            initial_delay_ms: 20,
        },
    }
}

pub(crate) async fn reply(ws: &mut ServerWs, message: Value) {
    ws.send(Message::Text(message.to_string())).await.unwrap();
}

/// Answers a non-auth request given its method and params, or stays silent.
pub(crate) type Responder = Arc<dyn Fn(&str, &Value) -> Option<Value> + Send + Sync>;

/// Plays the ClearNode side of the auth handshake and hands every other
/// request to `respond`.
///
/// Requests are recorded into `log` so tests can inspect what was sent.
pub(crate) async fn scripted_relay(mut ws: ServerWs, log: Arc<Mutex<Vec<Value>>>, respond: Responder) {
    while let Some(Ok(Message::Text(text))) = ws.next().await {
        let req: Value = serde_json::from_str(&text).unwrap();
        log.lock().push(req.clone());
        let method = req["method"].as_str().unwrap_or_default().to_string();
        let answer = match method.as_str() {
            METHOD_AUTH_REQUEST => Some(
                json!({"method": METHOD_AUTH_CHALLENGE, "data": {"challenge_message": CHALLENGE}}),
            ),
            METHOD_AUTH_VERIFY => Some(json!({"method": METHOD_AUTH_VERIFY, "data": {"success": true}})),
            other => respond(other, &req["params"]),
        };
        if let Some(answer) = answer {
            reply(&mut ws, answer).await;
        }
    }
}

/// Completes the auth handshake and ignores everything else.
pub(crate) async fn auth_relay(ws: ServerWs, log: Arc<Mutex<Vec<Value>>>) {
    scripted_relay(ws, log, Arc::new(|_, _| None)).await
}

/// Chain reader answering with fixed balances, or failing when unset.
#[derive(Default)]
pub(crate) struct MockChain {
    pub(crate) balances: Mutex<Option<Vec<U256>>>,
}

impl MockChain {
    pub(crate) fn with_balances(balances: Vec<U256>) -> Self {
        Self {
            balances: Mutex::new(Some(balances)),
        }
    }
}

#[async_trait]
impl ChainReader for MockChain {
    async fn get_channel_balances(
        &self,
        _custody: Address,
        channel_id: H256,
        _tokens: &[Address],
    ) -> Result<Vec<U256>> {
        self.balances.lock().clone().ok_or_else(|| YellowError::ChainQuery {
            channel_id: format!("{channel_id:?}"),
            reason: "rpc unreachable".into(),
        })
    }
}

/// Settlement that records every call and can be told to revert one operation.
#[derive(Default)]
pub(crate) struct MockSettlement {
    pub(crate) calls: Mutex<Vec<String>>,
    pub(crate) fail_on: Mutex<Option<(&'static str, String)>>,
    pub(crate) requests: Mutex<Vec<SettlementRequest>>,
}

impl MockSettlement {
    pub(crate) fn fail(&self, operation: &'static str, message: &str) {
        *self.fail_on.lock() = Some((operation, message.to_string()));
    }

    pub(crate) fn calls(&self) -> Vec<String> {
        self.calls.lock().clone()
    }

    fn record(&self, operation: &'static str) -> Result<String> {
        let mut calls = self.calls.lock();
        calls.push(operation.to_string());
        let tx_hash = format!("0x{:064x}", calls.len());
        if let Some((op, message)) = self.fail_on.lock().as_ref() {
            if *op == operation {
                // mined, then reverted
                return Err(YellowError::TransactionFailed {
                    reason: message.clone(),
                    tx_hash: Some(tx_hash),
                });
            }
        }
        Ok(tx_hash)
    }
}

#[async_trait]
impl ChannelSettlement for MockSettlement {
    async fn create(&self, request: &SettlementRequest) -> Result<String> {
        self.requests.lock().push(request.clone());
        self.record("create")
    }

    async fn resize(&self, _request: &SettlementRequest) -> Result<String> {
        self.record("resize")
    }

    async fn close(&self, _request: &SettlementRequest) -> Result<String> {
        self.record("close")
    }

    async fn withdraw(&self, _token: &str, _amount: &str) -> Result<String> {
        self.record("withdraw")
    }
}
