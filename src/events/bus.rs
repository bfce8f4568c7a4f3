//! A pub/sub event bus keyed by string event types.
//!
//! Fan-out is sequential from the caller's point of view and per-handler
//! isolated: a handler that returns an error (or whose future fails) is
//! logged and skipped, never propagated to the emitter. `emit` mirrors that
//! contract; `emit_async` additionally hands the caller every handler's
//! outcome so tests can assert on failures that would otherwise only be
//! logged.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use futures::future::BoxFuture;
use serde_json::Value;
use tokio::sync::RwLock;

use crate::error::KernelResult;

/// Types reserved by the kernel; a default logger is subscribed to both at
/// bus construction so no failure of this kind is ever silent.
pub const RESERVED_SYSTEM_ERROR: &str = "system:error";
pub const RESERVED_DEADLOCK: &str = "deadlock-detected";

/// A single observation of a state transition, namespaced by type
/// (`agent:*`, `task:*`, `session:*`, `swarm:*`, `tool:*`, `system:*`).
#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Event {
    pub id: String,
    pub event_type: String,
    pub timestamp: DateTime<Utc>,
    pub source_id: String,
    pub payload: Value,
}

impl Event {
    #[must_use]
    pub fn new(event_type: impl Into<String>, source_id: impl Into<String>, payload: Value) -> Self {
        Self {
            id: crate::ids::generate("evt_"),
            event_type: event_type.into(),
            timestamp: Utc::now(),
            source_id: source_id.into(),
            payload,
        }
    }
}

/// A subscribed callback. Boxed so both sync-looking closures (via an
/// immediately-ready future) and genuinely async handlers fit the same slot.
pub type EventHandler = Arc<dyn Fn(&Event) -> BoxFuture<'static, KernelResult<()>> + Send + Sync>;

/// Opaque handle returned by `subscribe`, passed back to `unsubscribe`.
/// Unsubscribing twice with the same token is a no-op.
#[derive(Debug, Clone)]
pub struct SubscriptionToken {
    event_type: String,
    id: HandlerId,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct HandlerId(u64);

struct Subscription {
    id: HandlerId,
    handler: EventHandler,
}

/// The kernel's in-process event bus.
pub struct EventBus {
    subscribers: RwLock<HashMap<String, Vec<Subscription>>>,
    next_id: AtomicU64,
}

impl std::fmt::Debug for EventBus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EventBus").finish_non_exhaustive()
    }
}

impl Default for EventBus {
    fn default() -> Self {
        Self::new()
    }
}

impl EventBus {
    /// Construct a bus with the mandatory default logger already subscribed
    /// to both reserved event types.
    #[must_use]
    pub fn new() -> Self {
        let bus = Self {
            subscribers: RwLock::new(HashMap::new()),
            next_id: AtomicU64::new(0),
        };
        bus
    }

    /// Install the default logger onto the reserved event types. Called once
    /// by the kernel at startup; idempotent in effect (repeated calls just
    /// add more loggers, which is harmless but wasteful) so callers should
    /// only call it once.
    pub async fn install_default_logger(&self) {
        let logger: EventHandler = Arc::new(|event: &Event| {
            let event = event.clone();
            Box::pin(async move {
                tracing::error!(
                    event_type = %event.event_type,
                    source_id = %event.source_id,
                    payload = %event.payload,
                    "unhandled system event"
                );
                Ok(())
            })
        });
        self.subscribe(RESERVED_SYSTEM_ERROR, logger.clone()).await;
        self.subscribe(RESERVED_DEADLOCK, logger).await;
    }

    /// Subscribe `handler` to `event_type`. `"*"` subscribes to every event
    /// type; wildcard handlers are dispatched after explicit-type handlers.
    pub async fn subscribe(&self, event_type: impl Into<String>, handler: EventHandler) -> SubscriptionToken {
        let event_type = event_type.into();
        let id = HandlerId(self.next_id.fetch_add(1, Ordering::SeqCst));
        let mut subs = self.subscribers.write().await;
        subs.entry(event_type.clone())
            .or_default()
            .push(Subscription { id, handler });
        SubscriptionToken { event_type, id }
    }

    /// Remove a subscription. A second call with the same token is a no-op.
    pub async fn unsubscribe(&self, token: &SubscriptionToken) {
        let mut subs = self.subscribers.write().await;
        if let Some(list) = subs.get_mut(&token.event_type) {
            list.retain(|s| s.id != token.id);
        }
    }

    async fn dispatch_order(&self, event_type: &str) -> Vec<EventHandler> {
        let subs = self.subscribers.read().await;
        let mut handlers: Vec<EventHandler> = subs
            .get(event_type)
            .map(|list| list.iter().map(|s| s.handler.clone()).collect())
            .unwrap_or_default();
        if event_type != "*" {
            if let Some(wildcard) = subs.get("*") {
                handlers.extend(wildcard.iter().map(|s| s.handler.clone()));
            }
        }
        handlers
    }

    /// Fan out `event` to every current subscriber of its type (plus
    /// wildcard subscribers) in registration order. Handler failures are
    /// logged and swallowed; this call never fails.
    pub async fn emit(&self, event: Event) {
        for handler in self.dispatch_order(&event.event_type).await {
            if let Err(err) = handler(&event).await {
                tracing::warn!(
                    event_type = %event.event_type,
                    error = %err,
                    "event handler failed"
                );
            }
        }
    }

    /// Like `emit`, but returns every handler's outcome instead of only
    /// logging failures, for test observability.
    pub async fn emit_async(&self, event: &Event) -> Vec<KernelResult<()>> {
        let mut results = Vec::new();
        for handler in self.dispatch_order(&event.event_type).await {
            results.push(handler(event).await);
        }
        results
    }

    /// Number of subscribers currently registered for `event_type` (for
    /// tests and diagnostics; does not include wildcard subscribers).
    pub async fn subscriber_count(&self, event_type: &str) -> usize {
        self.subscribers.read().await.get(event_type).map_or(0, Vec::len)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering as AtomicOrdering};
    use std::sync::Mutex;

    fn handler_that(order: Arc<Mutex<Vec<&'static str>>>, tag: &'static str) -> EventHandler {
        Arc::new(move |_event: &Event| {
            let order = order.clone();
            Box::pin(async move {
                order.lock().unwrap().push(tag);
                Ok(())
            })
        })
    }

    #[tokio::test]
    async fn emits_to_subscribers_in_registration_order() {
        let bus = EventBus::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        bus.subscribe("task:created", handler_that(order.clone(), "first")).await;
        bus.subscribe("task:created", handler_that(order.clone(), "second")).await;

        bus.emit(Event::new("task:created", "test", Value::Null)).await;

        assert_eq!(*order.lock().unwrap(), vec!["first", "second"]);
    }

    #[tokio::test]
    async fn wildcard_subscribers_dispatch_after_explicit_ones() {
        let bus = EventBus::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        bus.subscribe("*", handler_that(order.clone(), "wild")).await;
        bus.subscribe("task:created", handler_that(order.clone(), "explicit")).await;

        bus.emit(Event::new("task:created", "test", Value::Null)).await;

        assert_eq!(*order.lock().unwrap(), vec!["explicit", "wild"]);
    }

    #[tokio::test]
    async fn unsubscribe_is_idempotent() {
        let bus = EventBus::new();
        let calls = Arc::new(AtomicUsize::new(0));
        let calls_clone = calls.clone();
        let token = bus
            .subscribe(
                "task:created",
                Arc::new(move |_: &Event| {
                    let calls_clone = calls_clone.clone();
                    Box::pin(async move {
                        calls_clone.fetch_add(1, AtomicOrdering::SeqCst);
                        Ok(())
                    })
                }),
            )
            .await;

        bus.unsubscribe(&token).await;
        bus.unsubscribe(&token).await;

        bus.emit(Event::new("task:created", "test", Value::Null)).await;
        assert_eq!(calls.load(AtomicOrdering::SeqCst), 0);
    }

    #[tokio::test]
    async fn handler_failure_is_isolated_and_does_not_stop_fanout() {
        let bus = EventBus::new();
        let order = Arc::new(Mutex::new(Vec::new()));
        bus.subscribe(
            "task:created",
            Arc::new(|_: &Event| Box::pin(async { Err(crate::error::KernelError::External("boom".into())) })),
        )
        .await;
        bus.subscribe("task:created", handler_that(order.clone(), "after-failure")).await;

        bus.emit(Event::new("task:created", "test", Value::Null)).await;

        assert_eq!(*order.lock().unwrap(), vec!["after-failure"]);
    }

    #[tokio::test]
    async fn emit_async_aggregates_every_handler_result() {
        let bus = EventBus::new();
        bus.subscribe(
            "task:created",
            Arc::new(|_: &Event| Box::pin(async { Err(crate::error::KernelError::External("boom".into())) })),
        )
        .await;
        bus.subscribe("task:created", Arc::new(|_: &Event| Box::pin(async { Ok(()) }))).await;

        let results = bus.emit_async(&Event::new("task:created", "test", Value::Null)).await;

        assert_eq!(results.len(), 2);
        assert!(results[0].is_err());
        assert!(results[1].is_ok());
    }

    #[tokio::test]
    async fn default_logger_is_subscribed_to_reserved_types() {
        let bus = EventBus::new();
        bus.install_default_logger().await;
        assert_eq!(bus.subscriber_count(RESERVED_SYSTEM_ERROR).await, 1);
        assert_eq!(bus.subscriber_count(RESERVED_DEADLOCK).await, 1);
    }
}
