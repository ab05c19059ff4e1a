//! Scripted ClearNode and in-memory collaborators for end-to-end tests.

#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use ethers::signers::LocalWallet;
use ethers::types::{Address, H256, U256};
use futures::{SinkExt, StreamExt};
use parking_lot::Mutex;
use serde_json::{json, Value};
use tokio::net::{TcpListener, TcpStream};
use tokio::task::JoinHandle;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::WebSocketStream;

use yellow_clearnode::{ChainReader, ChannelSettlement, ProviderStatus, YellowError, YellowProvider};
use yellow_core::error::Result;
use yellow_core::traits::SettlementRequest;
use yellow_core::types::{ReconnectConfig, YellowConfig};

pub const TOKEN: &str = "0xAAA0000000000000000000000000000000000001";
pub const DEAD_URL: &str = "ws://127.0.0.1:9";

/// How the scripted ClearNode misbehaves.
#[derive(Clone, Default)]
pub struct Script {
    /// Push a dispute for the last opened channel before answering a ledger query.
    pub dispute_on_ledger_query: bool,
    /// Reject every transfer with this error.
    pub transfer_error: Option<String>,
    /// Drop the first connection when it receives `create_channel`.
    pub drop_first_on_create: bool,
}

struct NodeState {
    script: Script,
    log: Mutex<Vec<Value>>,
    opened: AtomicUsize,
    last_channel: Mutex<Option<String>>,
}

/// In-process ClearNode speaking the relay protocol over a local socket.
pub struct MockClearNode {
    pub url: String,
    state: Arc<NodeState>,
    _server: JoinHandle<()>,
}

impl MockClearNode {
    pub async fn start(script: Script) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("ws://{}", listener.local_addr().unwrap());
        let state = Arc::new(NodeState {
            script,
            log: Mutex::new(Vec::new()),
            opened: AtomicUsize::new(0),
            last_channel: Mutex::new(None),
        });

        let node = state.clone();
        let server = tokio::spawn(async move {
            let mut index = 0;
            while let Ok((tcp, _)) = listener.accept().await {
                let node = node.clone();
                let n = index;
                index += 1;
                tokio::spawn(async move {
                    if let Ok(ws) = tokio_tungstenite::accept_async(tcp).await {
                        serve(ws, n, node).await;
                    }
                });
            }
        });

        Self {
            url,
            state,
            _server: server,
        }
    }

    /// Methods received so far, in order.
    pub fn methods(&self) -> Vec<String> {
        self.state
            .log
            .lock()
            .iter()
            .map(|r| r["method"].as_str().unwrap_or_default().to_string())
            .collect()
    }

    pub fn count(&self, method: &str) -> usize {
        self.methods().iter().filter(|m| *m == method).count()
    }
}

async fn send(ws: &mut WebSocketStream<TcpStream>, message: Value) {
    ws.send(Message::Text(message.to_string())).await.unwrap();
}

async fn serve(mut ws: WebSocketStream<TcpStream>, index: usize, node: Arc<NodeState>) {
    while let Some(Ok(Message::Text(text))) = ws.next().await {
        let req: Value = serde_json::from_str(&text).unwrap();
        node.log.lock().push(req.clone());
        let method = req["method"].as_str().unwrap_or_default().to_string();
        let params = &req["params"];

        let reply = match method.as_str() {
            // array envelope: [request id, method, payload, timestamp]
            "auth_request" => json!({"res": [1, "auth_challenge", {"challenge_message": "mock-challenge"}, 0]}),
            "auth_verify" => json!({"method": "auth_verify", "data": {"success": true}}),
            "create_channel" => {
                if node.script.drop_first_on_create && index == 0 {
                    let _ = ws.close(None).await;
                    return;
                }
                let n = node.opened.fetch_add(1, Ordering::SeqCst) + 1;
                let id = format!("0x{n:064x}");
                *node.last_channel.lock() = Some(id.clone());
                json!({"method": "create_channel", "data": {"channelId": id, "status": "open", "nonce": n}})
            }
            "resize_channel" | "close_channel" => {
                json!({"method": method, "data": {"channelId": params["channelId"], "stateHash": "0x5eed"}})
            }
            "transfer" => match &node.script.transfer_error {
                Some(error) => json!({"method": "transfer", "error": error}),
                None => json!({"method": "transfer", "data": {"transferId": "tr-1"}}),
            },
            "submit_intent" => json!({"method": "submit_intent", "data": {
                "intentId": "intent-1",
                "quote": {"solverId": "solver-1", "amountOut": "995000"},
            }}),
            "get_ledger_balances" => {
                let last = node.last_channel.lock().clone();
                if let (true, Some(id)) = (node.script.dispute_on_ledger_query, last) {
                    send(
                        &mut ws,
                        json!({"method": "cu", "params": {"channelId": id, "channelStatus": "dispute"}}),
                    )
                    .await;
                }
                json!({"method": "get_ledger_balances", "data": {"channels": []}})
            }
            _ => continue,
        };
        send(&mut ws, reply).await;
    }
}

/// Chain reader that is always unreachable.
pub struct OfflineChain;

#[async_trait]
impl ChainReader for OfflineChain {
    async fn get_channel_balances(&self, _custody: Address, channel_id: H256, _tokens: &[Address]) -> Result<Vec<U256>> {
        Err(YellowError::ChainQuery {
            channel_id: format!("{channel_id:?}"),
            reason: "offline".into(),
        })
    }
}

/// Settlement that records calls and mints sequential hashes.
#[derive(Default)]
pub struct RecordingSettlement {
    calls: Mutex<Vec<&'static str>>,
}

impl RecordingSettlement {
    pub fn calls(&self) -> Vec<&'static str> {
        self.calls.lock().clone()
    }

    fn record(&self, call: &'static str) -> Result<String> {
        let mut calls = self.calls.lock();
        calls.push(call);
        Ok(format!("0x{:064x}", calls.len()))
    }
}

#[async_trait]
impl ChannelSettlement for RecordingSettlement {
    async fn create(&self, _request: &SettlementRequest) -> Result<String> {
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

pub fn init_tracing() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

pub fn config(url: &str, request_timeout_ms: u64) -> YellowConfig {
    YellowConfig {
        ws_url: url.into(),
        request_timeout_ms,
        connect_timeout_ms: 2_000,
        reconnect: ReconnectConfig {
            enabled: true,
            max_attempts: 3,
            initial_delay_ms: 20,
        },
        ..YellowConfig::arbitrum()
    }
}

pub fn provider(config: YellowConfig) -> (YellowProvider, Arc<RecordingSettlement>) {
    init_tracing();
    let settlement = Arc::new(RecordingSettlement::default());
    let provider = YellowProvider::new(
        config,
        Arc::new(LocalWallet::new(&mut rand::thread_rng())),
        Arc::new(OfflineChain),
        settlement.clone(),
    )
    .unwrap();
    (provider, settlement)
}

/// Polls until `provider` reports `wanted`.
pub async fn wait_for_status(provider: &YellowProvider, wanted: ProviderStatus) {
    for _ in 0..200 {
        if provider.status() == wanted {
            return;
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("provider never reached {wanted:?}");
}
