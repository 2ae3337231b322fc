//! src/hub/registry.rs
//!
//! GroupRegistry — the one shared mutable structure in the service. Tracks
//! which live connections are subscribed to which topics and delivers
//! events to them. Created once at process start and injected into the
//! notifier; membership is entirely in-memory and reset on restart, so
//! clients re-join after reconnecting.
//!
//! Delivery is fire-and-forget and at-most-once per subscriber at time of
//! send: the subscriber set is snapshotted under the read lock and sends
//! happen outside it, so a slow or failed connection never delays the
//! rest of the topic.

use crate::hub::protocol::ProjectEvent;
use std::collections::{HashMap, HashSet};
use tokio::sync::{RwLock, mpsc};
use tracing::{debug, warn};
use uuid::Uuid;

pub type ConnectionId = Uuid;

/// Sending half of a connection's outbound event queue.
pub type EventSender = mpsc::UnboundedSender<ProjectEvent>;

#[derive(Default)]
struct RegistryState {
    /// Outbound queue per live connection.
    connections: HashMap<ConnectionId, EventSender>,
    /// Topic -> subscribed connections. Topics are free-form strings;
    /// the registry is prefix-agnostic.
    topics: HashMap<String, HashSet<ConnectionId>>,
    /// Reverse index so leave-all does not scan every topic.
    memberships: HashMap<ConnectionId, HashSet<String>>,
}

/// Process-wide group membership registry.
#[derive(Default)]
pub struct GroupRegistry {
    state: RwLock<RegistryState>,
}

impl GroupRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a freshly connected client.
    pub async fn register(&self, connection_id: ConnectionId, sender: EventSender) {
        let mut state = self.state.write().await;
        state.connections.insert(connection_id, sender);
        debug!(%connection_id, "connection registered");
    }

    /// Drop a connection and all of its subscriptions. Called implicitly
    /// when the transport disconnects. Idempotent.
    pub async fn unregister(&self, connection_id: ConnectionId) {
        let mut state = self.state.write().await;
        state.connections.remove(&connection_id);
        remove_memberships(&mut state, connection_id);
        debug!(%connection_id, "connection unregistered");
    }

    /// Subscribe a connection to a topic. Joining a topic twice is a
    /// no-op; joining from an unregistered connection is ignored.
    pub async fn join(&self, connection_id: ConnectionId, topic: &str) {
        let mut state = self.state.write().await;
        if !state.connections.contains_key(&connection_id) {
            warn!(%connection_id, topic, "join from unknown connection ignored");
            return;
        }
        state
            .topics
            .entry(topic.to_string())
            .or_default()
            .insert(connection_id);
        state
            .memberships
            .entry(connection_id)
            .or_default()
            .insert(topic.to_string());
        debug!(%connection_id, topic, "joined topic");
    }

    /// Unsubscribe a connection from a topic. Idempotent.
    pub async fn leave(&self, connection_id: ConnectionId, topic: &str) {
        let mut state = self.state.write().await;
        if let Some(members) = state.topics.get_mut(topic) {
            members.remove(&connection_id);
            if members.is_empty() {
                state.topics.remove(topic);
            }
        }
        if let Some(joined) = state.memberships.get_mut(&connection_id) {
            joined.remove(topic);
            if joined.is_empty() {
                state.memberships.remove(&connection_id);
            }
        }
        debug!(%connection_id, topic, "left topic");
    }

    /// Remove a connection from every topic it had joined, keeping the
    /// connection itself registered.
    pub async fn leave_all(&self, connection_id: ConnectionId) {
        let mut state = self.state.write().await;
        remove_memberships(&mut state, connection_id);
    }

    /// Deliver an event to every current subscriber of a topic.
    ///
    /// Failures to individual subscribers are logged and skipped; they
    /// never abort delivery to the rest. Returns the number of
    /// subscribers the event was handed to.
    pub async fn send_to_topic(&self, topic: &str, event: &ProjectEvent) -> usize {
        let targets = {
            let state = self.state.read().await;
            match state.topics.get(topic) {
                Some(members) => members
                    .iter()
                    .filter_map(|id| state.connections.get(id).map(|tx| (*id, tx.clone())))
                    .collect::<Vec<_>>(),
                None => Vec::new(),
            }
        };
        deliver(targets, event)
    }

    /// Deliver an event to every currently connected client regardless of
    /// subscription.
    pub async fn broadcast_all(&self, event: &ProjectEvent) -> usize {
        let targets = {
            let state = self.state.read().await;
            state
                .connections
                .iter()
                .map(|(id, tx)| (*id, tx.clone()))
                .collect::<Vec<_>>()
        };
        deliver(targets, event)
    }

    /// Number of live connections (used by the readiness probe).
    pub async fn connection_count(&self) -> usize {
        self.state.read().await.connections.len()
    }
}

fn remove_memberships(state: &mut RegistryState, connection_id: ConnectionId) {
    if let Some(joined) = state.memberships.remove(&connection_id) {
        for topic in joined {
            if let Some(members) = state.topics.get_mut(&topic) {
                members.remove(&connection_id);
                if members.is_empty() {
                    state.topics.remove(&topic);
                }
            }
        }
    }
}

fn deliver(targets: Vec<(ConnectionId, EventSender)>, event: &ProjectEvent) -> usize {
    let mut delivered = 0;
    for (connection_id, sender) in targets {
        match sender.send(event.clone()) {
            Ok(()) => delivered += 1,
            Err(err) => {
                warn!(%connection_id, "dropping event for dead connection: {}", err);
            }
        }
    }
    delivered
}
