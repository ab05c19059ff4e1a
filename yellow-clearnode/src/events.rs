//! Provider events and the per-kind subscriber lists.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use parking_lot::RwLock;
use serde::Serialize;

use yellow_core::types::{ChannelState, ClearingResult, YellowQuote};
use yellow_events::{map_yellow_event, EventMapping};

/// Connection status as seen by provider callers.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderStatus {
    /// No connection.
    Disconnected,
    /// Connecting or reconnecting.
    Connecting,
    /// Connected and authenticated.
    Connected,
    /// The last connect attempt failed.
    Error,
}

/// Event kinds a listener can subscribe to.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderEventKind {
    /// A channel was opened.
    ChannelCreated,
    /// A channel allocation changed.
    ChannelResized,
    /// A channel was closed.
    ChannelClosed,
    /// A solver quote arrived for an intent.
    QuoteReceived,
    /// Solver clearing finished for an intent.
    ClearingCompleted,
    /// The provider status changed.
    StatusChanged,
}

impl ProviderEventKind {
    /// Wire name of the kind.
    pub fn as_str(&self) -> &'static str {
        match self {
            ProviderEventKind::ChannelCreated => "channel_created",
            ProviderEventKind::ChannelResized => "channel_resized",
            ProviderEventKind::ChannelClosed => "channel_closed",
            ProviderEventKind::QuoteReceived => "quote_received",
            ProviderEventKind::ClearingCompleted => "clearing_completed",
            ProviderEventKind::StatusChanged => "status_changed",
        }
    }
}

/// A provider event with its payload.
#[derive(Clone, Debug, Serialize)]
#[serde(tag = "type", content = "payload", rename_all = "snake_case")]
pub enum ProviderEvent {
    /// New channel state after creation.
    ChannelCreated(ChannelState),
    /// Channel state after a resize.
    ChannelResized(ChannelState),
    /// Final channel state after a close.
    ChannelClosed(ChannelState),
    /// Accepted quote.
    QuoteReceived(YellowQuote),
    /// Clearing result.
    ClearingCompleted(ClearingResult),
    /// New status.
    StatusChanged(ProviderStatus),
}

impl ProviderEvent {
    /// Kind of the event.
    pub fn kind(&self) -> ProviderEventKind {
        match self {
            ProviderEvent::ChannelCreated(_) => ProviderEventKind::ChannelCreated,
            ProviderEvent::ChannelResized(_) => ProviderEventKind::ChannelResized,
            ProviderEvent::ChannelClosed(_) => ProviderEventKind::ChannelClosed,
            ProviderEvent::QuoteReceived(_) => ProviderEventKind::QuoteReceived,
            ProviderEvent::ClearingCompleted(_) => ProviderEventKind::ClearingCompleted,
            ProviderEvent::StatusChanged(_) => ProviderEventKind::StatusChanged,
        }
    }

    /// Canonical execution status for progress displays, if the event has one.
    pub fn mapping(&self) -> Option<EventMapping> {
        map_yellow_event(self.kind().as_str())
    }
}

/// Handle returned by [`EventBus::on`], used to unsubscribe.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct ListenerId(u64);

/// Event callback.
pub type EventListener = Arc<dyn Fn(&ProviderEvent) + Send + Sync>;

/// Per-kind listener lists.
#[derive(Default)]
pub struct EventBus {
    next_id: AtomicU64,
    listeners: RwLock<HashMap<ProviderEventKind, Vec<(ListenerId, EventListener)>>>,
}

impl EventBus {
    /// Creates an empty bus.
    pub fn new() -> Self {
        Self::default()
    }

    /// Subscribes `listener` to events of `kind`.
    pub fn on(&self, kind: ProviderEventKind, listener: EventListener) -> ListenerId {
        let id = ListenerId(self.next_id.fetch_add(1, Ordering::Relaxed));
        self.listeners.write().entry(kind).or_default().push((id, listener));
        id
    }

    /// Unsubscribes a listener. Returns false if it was not subscribed.
    pub fn off(&self, id: ListenerId) -> bool {
        let mut listeners = self.listeners.write();
        for list in listeners.values_mut() {
            if let Some(pos) = list.iter().position(|(lid, _)| *lid == id) {
                list.remove(pos);
                return true;
            }
        }
        false
    }

    /// Delivers `event` to every listener of its kind, in subscription order.
    pub fn emit(&self, event: &ProviderEvent) {
        // clone out so listeners may subscribe or unsubscribe re-entrantly
        let targets: Vec<EventListener> = self
            .listeners
            .read()
            .get(&event.kind())
            .map(|list| list.iter().map(|(_, l)| l.clone()).collect())
            .unwrap_or_default();
        for listener in targets {
            listener(event);
        }
    }

    /// Number of listeners subscribed to `kind`.
    pub fn listener_count(&self, kind: ProviderEventKind) -> usize {
        self.listeners.read().get(&kind).map_or(0, Vec::len)
    }
}
