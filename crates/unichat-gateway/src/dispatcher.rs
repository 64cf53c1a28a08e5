// SPDX-FileCopyrightText: 2026 Unichat Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Realtime dispatcher: which socket belongs to which user, and which rooms
//! each socket follows.
//!
//! [`Registry`] is the [`EventSink`] handed to the engines. An event for a
//! user with no live socket is dropped. Sync batches wait for room in the
//! socket's buffer; every other emission is dropped when the buffer is full.

use std::collections::HashSet;
use std::sync::Arc;

use async_trait::async_trait;
use dashmap::DashMap;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};
use unichat_bridge::PlatformStatusStore;
use unichat_core::types::PlatformStatusChanged;
use unichat_core::{EventSink, HealthStatus, Platform, RealtimeEvent, ServiceAdapter, UnichatError};
use unichat_sync::SyncEngine;

/// Identifies one WebSocket connection.
pub type ConnectionId = String;

struct Connection {
    tx: mpsc::Sender<String>,
    user_id: Option<String>,
    rooms: HashSet<String>,
}

/// Connection, user, and room subscription tables.
#[derive(Default)]
pub struct Registry {
    connections: DashMap<ConnectionId, Connection>,
    /// user id -> the connection that registered last.
    users: DashMap<String, ConnectionId>,
    /// room id -> subscribed connections.
    rooms: DashMap<String, HashSet<ConnectionId>>,
}

impl Registry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a socket's outbound channel and returns its connection id.
    pub fn attach(&self, tx: mpsc::Sender<String>) -> ConnectionId {
        let id = uuid::Uuid::new_v4().to_string();
        self.connections.insert(
            id.clone(),
            Connection {
                tx,
                user_id: None,
                rooms: HashSet::new(),
            },
        );
        id
    }

    /// Binds `user_id` to the connection, replacing any earlier connection
    /// for that user.
    ///
    /// Returns the user the connection was bound to before, when it differs
    /// and that user is no longer bound anywhere.
    pub fn bind_user(&self, connection: &str, user_id: &str) -> Option<String> {
        let previous = {
            let mut entry = self.connections.get_mut(connection)?;
            entry.user_id.replace(user_id.to_string())
        };
        if let Some(old) = self.users.insert(user_id.to_string(), connection.to_string())
            && old != connection
        {
            debug!(user_id, old_connection = %old, "user re-registered on a new connection");
        }

        let previous = previous.filter(|p| p != user_id)?;
        self.users
            .remove_if(&previous, |_, owner| owner == connection)
            .map(|(user, _)| user)
    }

    pub fn join_room(&self, connection: &str, room_id: &str) -> bool {
        let Some(mut entry) = self.connections.get_mut(connection) else {
            return false;
        };
        entry.rooms.insert(room_id.to_string());
        drop(entry);
        self.rooms
            .entry(room_id.to_string())
            .or_default()
            .insert(connection.to_string());
        true
    }

    pub fn leave_room(&self, connection: &str, room_id: &str) {
        if let Some(mut entry) = self.connections.get_mut(connection) {
            entry.rooms.remove(room_id);
        }
        self.unsubscribe(connection, room_id);
    }

    /// Drops the connection and its subscriptions.
    ///
    /// Returns the user it was bound to if that user still pointed at this
    /// connection. A user who already reconnected elsewhere is left alone.
    pub fn detach(&self, connection: &str) -> Option<String> {
        let (_, removed) = self.connections.remove(connection)?;
        for room_id in &removed.rooms {
            self.unsubscribe(connection, room_id);
        }
        let user_id = removed.user_id?;
        self.users
            .remove_if(&user_id, |_, owner| owner == connection)
            .map(|(user, _)| user)
    }

    fn unsubscribe(&self, connection: &str, room_id: &str) {
        if let Some(mut members) = self.rooms.get_mut(room_id) {
            members.remove(connection);
        }
        self.rooms.remove_if(room_id, |_, members| members.is_empty());
    }

    pub fn is_online(&self, user_id: &str) -> bool {
        self.users.contains_key(user_id)
    }

    /// Connection currently bound to `user_id`.
    pub fn connection_of(&self, user_id: &str) -> Option<ConnectionId> {
        self.users.get(user_id).map(|c| c.clone())
    }

    pub fn user_of(&self, connection: &str) -> Option<String> {
        self.connections.get(connection)?.user_id.clone()
    }

    pub fn connection_count(&self) -> usize {
        self.connections.len()
    }

    fn deliver(&self, connection: &str, frame: &str) {
        let Some(entry) = self.connections.get(connection) else {
            return;
        };
        match entry.tx.try_send(frame.to_string()) {
            Ok(()) => {}
            Err(mpsc::error::TrySendError::Full(_)) => {
                warn!(connection, "outbound buffer full, event dropped");
            }
            Err(mpsc::error::TrySendError::Closed(_)) => {
                debug!(connection, "socket closed, event dropped");
            }
        }
    }
}

fn encode(event: &RealtimeEvent) -> Option<String> {
    match serde_json::to_string(event) {
        Ok(frame) => Some(frame),
        Err(e) => {
            warn!(event = event.name(), error = %e, "event not serializable");
            None
        }
    }
}

#[async_trait]
impl EventSink for Registry {
    fn emit_to_user(&self, user_id: &str, event: RealtimeEvent) {
        let Some(connection) = self.connection_of(user_id) else {
            debug!(user_id, event = event.name(), "user offline, event dropped");
            return;
        };
        if let Some(frame) = encode(&event) {
            self.deliver(&connection, &frame);
        }
    }

    fn emit_to_room(&self, room_id: &str, event: RealtimeEvent) {
        let subscribers: Vec<ConnectionId> = match self.rooms.get(room_id) {
            Some(members) => members.iter().cloned().collect(),
            None => return,
        };
        if let Some(frame) = encode(&event) {
            for connection in &subscribers {
                self.deliver(connection, &frame);
            }
        }
    }

    async fn deliver_to_user(&self, user_id: &str, event: RealtimeEvent) {
        let tx = self
            .connection_of(user_id)
            .and_then(|connection| self.connections.get(&connection).map(|c| c.tx.clone()));
        let Some(tx) = tx else {
            debug!(user_id, event = event.name(), "user offline, event dropped");
            return;
        };
        if let Some(frame) = encode(&event)
            && tx.send(frame).await.is_err()
        {
            debug!(user_id, "socket closed, event dropped");
        }
    }
}

/// Registers users on their sockets and ties each registration to the
/// user's sync loop.
pub struct Dispatcher {
    registry: Arc<Registry>,
    sync: Arc<SyncEngine>,
    statuses: Arc<PlatformStatusStore>,
}

impl Dispatcher {
    pub fn new(
        registry: Arc<Registry>,
        sync: Arc<SyncEngine>,
        statuses: Arc<PlatformStatusStore>,
    ) -> Self {
        Self {
            registry,
            sync,
            statuses,
        }
    }

    pub fn registry(&self) -> &Arc<Registry> {
        &self.registry
    }

    pub fn sync(&self) -> &Arc<SyncEngine> {
        &self.sync
    }

    /// Binds the user, pushes the current status of every bridged platform,
    /// then (re)starts the user's sync loop.
    pub fn register(&self, connection: &str, user_id: &str) {
        if let Some(previous) = self.registry.bind_user(connection, user_id) {
            self.sync.stop(&previous);
        }

        for platform in Platform::BRIDGED {
            let status = self.statuses.get(platform, Some(user_id));
            self.registry.emit_to_user(
                user_id,
                RealtimeEvent::PlatformStatus(PlatformStatusChanged {
                    platform,
                    connected: status.connected,
                    last_updated: status.last_updated,
                    user_id: Some(user_id.to_string()),
                }),
            );
        }

        self.sync.start(user_id);
        info!(user_id, connection, "user registered");
    }

    /// Removes the connection; stops the sync loop when the user has no
    /// newer connection.
    pub fn unregister(&self, connection: &str) {
        match self.registry.detach(connection) {
            Some(user_id) => {
                self.sync.stop(&user_id);
                info!(user_id = %user_id, connection, "user disconnected");
            }
            None => debug!(connection, "connection closed"),
        }
    }
}

#[async_trait]
impl ServiceAdapter for Dispatcher {
    fn name(&self) -> &str {
        "realtime-dispatcher"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    async fn health_check(&self) -> Result<HealthStatus, UnichatError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), UnichatError> {
        self.sync.stop_all();
        info!(
            connections = self.registry.connection_count(),
            "realtime dispatcher shut down"
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use unichat_core::types::SyncFailure;

    fn failure() -> RealtimeEvent {
        RealtimeEvent::SyncError(SyncFailure {
            error: "Sync failed".into(),
            details: "x".into(),
        })
    }

    #[test]
    fn events_reach_the_bound_connection() {
        let registry = Registry::new();
        let (tx, mut rx) = mpsc::channel(4);
        let conn = registry.attach(tx);
        registry.bind_user(&conn, "@a:hs");

        registry.emit_to_user("@a:hs", failure());
        let frame: serde_json::Value = serde_json::from_str(&rx.try_recv().unwrap()).unwrap();
        assert_eq!(frame["event"], "sync_error");
        assert_eq!(frame["data"]["error"], "Sync failed");
    }

    #[test]
    fn offline_users_get_nothing_queued() {
        let registry = Registry::new();
        registry.emit_to_user("@nobody:hs", failure());

        let (tx, mut rx) = mpsc::channel(4);
        let conn = registry.attach(tx);
        registry.bind_user(&conn, "@nobody:hs");
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn reconnect_overwrites_and_stale_close_is_ignored() {
        let registry = Registry::new();
        let (old_tx, mut old_rx) = mpsc::channel(4);
        let (new_tx, mut new_rx) = mpsc::channel(4);
        let old = registry.attach(old_tx);
        let new = registry.attach(new_tx);
        registry.bind_user(&old, "@a:hs");
        registry.bind_user(&new, "@a:hs");

        registry.emit_to_user("@a:hs", failure());
        assert!(old_rx.try_recv().is_err());
        assert!(new_rx.try_recv().is_ok());

        assert_eq!(registry.detach(&old), None);
        assert!(registry.is_online("@a:hs"));
        assert_eq!(registry.detach(&new).as_deref(), Some("@a:hs"));
        assert!(!registry.is_online("@a:hs"));
    }

    #[test]
    fn switching_users_releases_the_previous_one() {
        let registry = Registry::new();
        let (tx, _rx) = mpsc::channel(4);
        let conn = registry.attach(tx);
        assert_eq!(registry.bind_user(&conn, "@a:hs"), None);
        assert_eq!(registry.bind_user(&conn, "@a:hs"), None);
        assert_eq!(registry.bind_user(&conn, "@b:hs").as_deref(), Some("@a:hs"));
        assert!(!registry.is_online("@a:hs"));
        assert_eq!(registry.user_of(&conn).as_deref(), Some("@b:hs"));
    }

    #[test]
    fn room_fan_out_follows_subscriptions() {
        let registry = Registry::new();
        let (tx1, mut rx1) = mpsc::channel(4);
        let (tx2, mut rx2) = mpsc::channel(4);
        let c1 = registry.attach(tx1);
        let c2 = registry.attach(tx2);
        registry.join_room(&c1, "!r:hs");
        registry.join_room(&c2, "!r:hs");
        registry.leave_room(&c2, "!r:hs");

        registry.emit_to_room("!r:hs", failure());
        assert!(rx1.try_recv().is_ok());
        assert!(rx2.try_recv().is_err());

        registry.detach(&c1);
        registry.emit_to_room("!r:hs", failure());
        assert!(!registry.join_room(&c1, "!r:hs"));
    }

    #[tokio::test]
    async fn batch_delivery_waits_for_buffer_space() {
        let registry = Arc::new(Registry::new());
        let (tx, mut rx) = mpsc::channel(1);
        let conn = registry.attach(tx);
        registry.bind_user(&conn, "@a:hs");

        let sender = {
            let registry = Arc::clone(&registry);
            tokio::spawn(async move {
                for _ in 0..5 {
                    registry.deliver_to_user("@a:hs", failure()).await;
                }
            })
        };

        let mut received = 0;
        while received < 5 {
            assert!(rx.recv().await.is_some());
            received += 1;
        }
        sender.await.unwrap();
        assert!(rx.try_recv().is_err());
    }

    #[tokio::test]
    async fn batch_delivery_to_offline_users_returns_at_once() {
        let registry = Registry::new();
        registry.deliver_to_user("@nobody:hs", failure()).await;

        let (tx, mut rx) = mpsc::channel(1);
        let conn = registry.attach(tx);
        registry.bind_user(&conn, "@nobody:hs");
        assert!(rx.try_recv().is_err());
    }

    #[test]
    fn full_buffers_drop_instead_of_blocking() {
        let registry = Registry::new();
        let (tx, mut rx) = mpsc::channel(1);
        let conn = registry.attach(tx);
        registry.bind_user(&conn, "@a:hs");
        registry.emit_to_user("@a:hs", failure());
        registry.emit_to_user("@a:hs", failure());
        assert!(rx.try_recv().is_ok());
        assert!(rx.try_recv().is_err());
    }
}
