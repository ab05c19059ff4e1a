//! End-to-end provider flows against a scripted ClearNode.

mod common;

use std::sync::Arc;

use parking_lot::Mutex;

use common::*;
use yellow_clearnode::{ProviderEvent, ProviderEventKind, ProviderStatus, ReasonCode};
use yellow_core::constants::{INTENT_FINALIZE, INTENT_INITIALIZE, INTENT_RESIZE};
use yellow_core::types::*;

async fn open_channel(provider: &yellow_clearnode::YellowProvider) -> ChannelOperationResult {
    provider
        .create_channel(CreateChannelParams {
            chain_id: 42161,
            token: TOKEN.into(),
        })
        .await
        .into_result()
        .unwrap()
}

async fn fund(provider: &yellow_clearnode::YellowProvider, channel_id: &str, amount: &str) {
    provider
        .resize_channel(ResizeChannelParams {
            channel_id: channel_id.into(),
            amount: amount.into(),
            funds_destination: None,
        })
        .await
        .into_result()
        .unwrap();
}

fn transfer(amount: &str) -> TransferRequest {
    TransferRequest {
        destination: "0x3333333333333333333333333333333333333333".into(),
        allocations: vec![TransferAllocation {
            token: TOKEN.into(),
            amount: amount.into(),
        }],
    }
}

#[tokio::test]
async fn test_create_resize_close_on_arbitrum() {
    let node = MockClearNode::start(Script::default()).await;
    let (provider, settlement) = provider(config(&node.url, 2_000));
    assert!(provider.connect().await.is_success());
    let owner = provider.session().wallet_address();

    let created = open_channel(&provider).await;
    assert_eq!(created.state.chain_id, 42161);
    assert_eq!(created.state.status, ChannelStatus::Active);
    assert_eq!(created.state.state_intent, INTENT_INITIALIZE);
    assert_eq!(created.state.allocation_for(&owner).unwrap().amount, "0");

    let resized = provider
        .resize_channel(ResizeChannelParams {
            channel_id: created.channel_id.clone(),
            amount: "1000000".into(),
            funds_destination: None,
        })
        .await
        .into_result()
        .unwrap();
    assert_eq!(resized.state.state_intent, INTENT_RESIZE);
    assert_eq!(resized.state.state_version, 1);
    assert_eq!(resized.state.allocation_for(&owner).unwrap().amount, "1000000");

    let closed = provider
        .close_channel(CloseChannelParams {
            channel_id: created.channel_id.clone(),
            funds_destination: None,
        })
        .await
        .into_result()
        .unwrap();
    assert_eq!(closed.state.status, ChannelStatus::Final);
    assert_eq!(closed.state.state_intent, INTENT_FINALIZE);
    assert_eq!(closed.state.state_version, 2);
    assert_eq!(closed.state.state_hash.as_deref(), Some("0x5eed"));
    assert!(closed.withdrawal_tx_hash.is_some());

    assert_eq!(
        node.methods(),
        vec!["auth_request", "auth_verify", "create_channel", "resize_channel", "close_channel"]
    );
    assert_eq!(settlement.calls(), vec!["create", "resize", "close", "withdraw"]);

    // a closed channel is no longer offered for transfers
    let outcome = provider.transfer(transfer("1")).await;
    assert_eq!(outcome.reason_code(), Some(ReasonCode::InsufficientChannelBalance));
}

#[tokio::test]
async fn test_disputed_channel_cannot_be_closed() {
    let node = MockClearNode::start(Script {
        dispute_on_ledger_query: true,
        ..Script::default()
    })
    .await;
    let (provider, settlement) = provider(config(&node.url, 2_000));
    assert!(provider.connect().await.is_success());
    let created = open_channel(&provider).await;

    // the relay pushes the dispute ahead of the ledger reply
    assert!(provider.get_channels().await.is_success());
    let cached = provider.channels().get_channel(&created.channel_id).unwrap();
    assert_eq!(cached.status, ChannelStatus::Dispute);

    let outcome = provider
        .close_channel(CloseChannelParams {
            channel_id: created.channel_id.clone(),
            funds_destination: None,
        })
        .await;
    let fallback = outcome.as_fallback().unwrap();
    assert_eq!(fallback.reason_code, ReasonCode::YellowChannelDispute);
    assert_eq!(fallback.channel_id.as_deref(), Some(created.channel_id.as_str()));

    assert_eq!(node.count("close_channel"), 0);
    assert_eq!(settlement.calls(), vec!["create"]);
}

#[tokio::test]
async fn test_missing_intent_fields_open_no_channel() {
    let node = MockClearNode::start(Script::default()).await;
    let (provider, settlement) = provider(config(&node.url, 2_000));
    assert!(provider.connect().await.is_success());

    let outcome = provider
        .execute_intent(IntentRequest {
            source_chain: Some("42161".into()),
            destination_chain: Some("8453".into()),
            output_token: Some(TOKEN.into()),
            input_amount: Some("1000000".into()),
            ..Default::default()
        })
        .await;
    let fallback = outcome.as_fallback().unwrap();
    assert_eq!(fallback.reason_code, ReasonCode::MissingParams);
    assert!(fallback.message.contains("inputToken"));

    assert!(provider.channels().is_empty());
    assert!(settlement.calls().is_empty());
    assert_eq!(node.methods(), vec!["auth_request", "auth_verify"]);
}

#[tokio::test]
async fn test_intent_routes_through_new_channel() {
    let node = MockClearNode::start(Script::default()).await;
    let (provider, _settlement) = provider(config(&node.url, 2_000));
    assert!(provider.connect().await.is_success());

    let quotes = Arc::new(Mutex::new(Vec::new()));
    let sink = quotes.clone();
    provider.on(
        ProviderEventKind::QuoteReceived,
        Arc::new(move |event| {
            if let ProviderEvent::QuoteReceived(quote) = event {
                sink.lock().push(quote.clone());
            }
        }),
    );

    let execution = provider
        .execute_intent(IntentRequest {
            source_chain: Some("42161".into()),
            destination_chain: Some("8453".into()),
            input_token: Some(TOKEN.into()),
            output_token: Some("0xBBB0000000000000000000000000000000000002".into()),
            input_amount: Some("1000000".into()),
            ..Default::default()
        })
        .await
        .into_result()
        .unwrap();
    assert_eq!(execution.intent_id, "intent-1");
    assert_eq!(execution.quote.solver_id, "solver-1");
    assert_eq!(execution.quote.amount_out, "995000");
    assert!(execution.clearing.is_none());
    assert_eq!(quotes.lock().len(), 1);
    assert_eq!(
        node.methods(),
        vec!["auth_request", "auth_verify", "create_channel", "submit_intent"]
    );
}

#[tokio::test]
async fn test_transfer_beyond_channel_balance_is_rejected_locally() {
    let node = MockClearNode::start(Script::default()).await;
    let (provider, _settlement) = provider(config(&node.url, 2_000));
    assert!(provider.connect().await.is_success());
    let created = open_channel(&provider).await;
    fund(&provider, &created.channel_id, "1000000").await;

    let outcome = provider.transfer(transfer("2000000")).await;
    let fallback = outcome.as_fallback().unwrap();
    assert_eq!(fallback.reason_code, ReasonCode::InsufficientChannelBalance);
    assert_eq!(node.count("transfer"), 0);

    let sent = provider.transfer(transfer("500")).await.into_result().unwrap();
    assert_eq!(sent.transfer_id.as_deref(), Some("tr-1"));
    assert_eq!(node.count("transfer"), 1);
}

#[tokio::test]
async fn test_relay_balance_rejection_maps_to_channel_balance() {
    let node = MockClearNode::start(Script {
        transfer_error: Some("insufficient balance in unified ledger".into()),
        ..Script::default()
    })
    .await;
    let (provider, _settlement) = provider(config(&node.url, 2_000));
    assert!(provider.connect().await.is_success());
    let created = open_channel(&provider).await;
    fund(&provider, &created.channel_id, "1000").await;

    let outcome = provider.transfer(transfer("10")).await;
    assert_eq!(outcome.reason_code(), Some(ReasonCode::InsufficientChannelBalance));
}

#[tokio::test]
async fn test_connect_failure_is_a_fallback() {
    let (provider, _settlement) = provider(config(DEAD_URL, 2_000));
    let outcome = provider.connect().await;
    assert_eq!(provider.status(), ProviderStatus::Error);

    let json = serde_json::to_value(&outcome).unwrap();
    assert_eq!(json["fallback"]["enabled"], true);
    assert_eq!(json["fallback"]["reasonCode"], "YELLOW_UNAVAILABLE");
    assert!(json["fallback"]["message"].as_str().unwrap().contains("WebSocket"));
}

#[tokio::test]
async fn test_session_reestablished_after_reconnect() {
    let node = MockClearNode::start(Script {
        drop_first_on_create: true,
        ..Script::default()
    })
    .await;
    let (provider, _settlement) = provider(config(&node.url, 500));
    let statuses = Arc::new(Mutex::new(Vec::new()));
    let sink = statuses.clone();
    provider.on(
        ProviderEventKind::StatusChanged,
        Arc::new(move |event| {
            if let ProviderEvent::StatusChanged(status) = event {
                sink.lock().push(*status);
            }
        }),
    );
    assert!(provider.connect().await.is_success());

    // the first socket dies under the request, which then times out
    let first = provider
        .create_channel(CreateChannelParams {
            chain_id: 42161,
            token: TOKEN.into(),
        })
        .await;
    assert_eq!(first.reason_code(), Some(ReasonCode::YellowTimeout));
    wait_for_status(&provider, ProviderStatus::Connected).await;
    assert!(statuses
        .lock()
        .windows(2)
        .any(|w| w == [ProviderStatus::Connected, ProviderStatus::Connecting]));

    // the session was expired by the reconnect and is re-established
    let second = open_channel(&provider).await;
    assert!(!second.channel_id.is_empty());
    assert_eq!(node.count("auth_request"), 2);
    assert_eq!(node.count("auth_verify"), 2);
}
