//! Bounded per-agent inboxes and topology-aware broadcast fan-out.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::{json, Value};
use tokio::sync::RwLock;

use crate::agents::AgentId;
use crate::error::{KernelError, KernelResult};
use crate::events::{Event, EventBus};

use super::topology::Topology;

#[derive(Debug, Clone, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(untagged)]
pub enum MessageTarget {
    Direct(AgentId),
    Broadcast,
}

#[derive(Debug, Clone, serde::Serialize, serde::Deserialize)]
pub struct Message {
    pub id: String,
    pub message_type: String,
    pub from: AgentId,
    pub to: MessageTarget,
    pub payload: Value,
    pub timestamp: DateTime<Utc>,
    pub correlation_id: Option<String>,
}

impl Message {
    #[must_use]
    pub fn new(message_type: impl Into<String>, from: AgentId, to: MessageTarget, payload: Value) -> Self {
        Self {
            id: crate::ids::generate("msg_"),
            message_type: message_type.into(),
            from,
            to,
            payload,
            timestamp: Utc::now(),
            correlation_id: None,
        }
    }

    #[must_use]
    pub fn with_correlation_id(mut self, correlation_id: impl Into<String>) -> Self {
        self.correlation_id = Some(correlation_id.into());
        self
    }
}

/// Per-agent bounded inbox with oldest-drop-on-overflow semantics. Delivery
/// order from a given sender to a given receiver is preserved because a
/// single inbox is a single `VecDeque` pushed to under its own lock;
/// cross-sender interleaving is whatever order `send`/`broadcast` calls
/// happen to race in.
pub struct MessageBus {
    inboxes: RwLock<HashMap<AgentId, VecDeque<Message>>>,
    capacity: usize,
    topology: Arc<RwLock<Topology>>,
    events: Arc<EventBus>,
}

impl MessageBus {
    #[must_use]
    pub fn new(capacity: usize, topology: Arc<RwLock<Topology>>, events: Arc<EventBus>) -> Self {
        Self { inboxes: RwLock::new(HashMap::new()), capacity, topology, events }
    }

    pub async fn register_agent(&self, id: AgentId) {
        self.inboxes.write().await.entry(id).or_default();
    }

    pub async fn remove_agent(&self, id: &AgentId) {
        self.inboxes.write().await.remove(id);
    }

    async fn push(&self, to: &AgentId, message: Message) {
        let overflowed = {
            let mut inboxes = self.inboxes.write().await;
            let inbox = inboxes.entry(to.clone()).or_default();
            let overflowed = inbox.len() >= self.capacity;
            if overflowed {
                inbox.pop_front();
            }
            inbox.push_back(message);
            overflowed
        };
        if overflowed {
            self.events
                .emit(Event::new(
                    "system:error",
                    to.to_string(),
                    json!({ "reason": "inbox overflow", "agentId": to.0, "droppedOldest": true }),
                ))
                .await;
        }
    }

    /// Deliver directly to `message.to`. Fails if `to` is a broadcast
    /// target — use `broadcast` for that.
    pub async fn send(&self, message: Message) -> KernelResult<()> {
        match message.to.clone() {
            MessageTarget::Direct(to) => {
                self.push(&to, message).await;
                Ok(())
            }
            MessageTarget::Broadcast => Err(KernelError::Validation(
                "send requires a direct target; use broadcast for fan-out".into(),
            )),
        }
    }

    /// Fan out to every topology-determined recipient of a broadcast from
    /// `from`, each receiving an individually addressed copy carrying the
    /// same correlation id.
    pub async fn broadcast(&self, from: &AgentId, message_type: impl Into<String>, payload: Value) -> Vec<Message> {
        let message_type = message_type.into();
        let correlation_id = crate::ids::generate("corr_");
        let targets = self.topology.read().await.broadcast_targets(from);
        let mut sent = Vec::with_capacity(targets.len());
        for target in targets {
            let msg = Message::new(message_type.clone(), from.clone(), MessageTarget::Direct(target.clone()), payload.clone())
                .with_correlation_id(correlation_id.clone());
            self.push(&target, msg.clone()).await;
            sent.push(msg);
        }
        sent
    }

    /// Drain and return every pending message for `id`, oldest first.
    pub async fn drain_inbox(&self, id: &AgentId) -> Vec<Message> {
        self.inboxes.write().await.get_mut(id).map(|q| q.drain(..).collect()).unwrap_or_default()
    }

    pub async fn inbox_len(&self, id: &AgentId) -> usize {
        self.inboxes.read().await.get(id).map_or(0, VecDeque::len)
    }
}
