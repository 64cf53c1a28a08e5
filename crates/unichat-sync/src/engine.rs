// SPDX-FileCopyrightText: 2026 Unichat Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Per-user sync loops.
//!
//! One long-poll loop runs per connected user. Each cycle fetches a batch,
//! auto-joins invites, emits `rooms_updated` (joined rooms plus the invites
//! just accepted) followed by the batch's messages and reactions in timeline
//! order, and only then advances the cursor. Each event waits for room in the
//! user's connection before the next is handed over. A cancelled loop
//! discards whatever it had in flight.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use dashmap::DashMap;
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};
use unichat_config::model::{MatrixConfig, SyncConfig};
use unichat_core::types::{RoomsUpdated, SyncComplete, SyncFailure};
use unichat_core::{EventSink, HealthStatus, RealtimeEvent, ServiceAdapter, UnichatError};
use unichat_matrix::{MatrixClient, MediaResolver};

use crate::summary::{Summarizer, sort_by_activity, summary_platform};
use crate::timeline::{RoomContext, timeline_events};

#[derive(Debug, Clone, Copy)]
pub struct SyncSettings {
    /// Server-side long-poll window.
    pub timeout_ms: u64,
    pub error_backoff: Duration,
    pub stale_window: Duration,
    /// Timeline events per room on initial and listing syncs.
    pub room_list_timeline_limit: u32,
}

impl SyncSettings {
    pub fn from_config(matrix: &MatrixConfig, sync: &SyncConfig) -> Self {
        Self {
            timeout_ms: matrix.sync_timeout_ms,
            error_backoff: Duration::from_millis(sync.error_backoff_ms),
            stale_window: Duration::from_secs(sync.stale_event_window_secs),
            room_list_timeline_limit: sync.room_list_timeline_limit,
        }
    }

    /// Filter keeping initial batches light.
    pub fn list_filter(&self) -> Value {
        json!({ "room": { "timeline": { "limit": self.room_list_timeline_limit } } })
    }
}

/// What one cycle did to the cursor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CycleOutcome {
    /// Batch dispatched; continue from this token.
    Advanced(String),
    /// Timeout-class failure; retry immediately from the same cursor.
    KeepCursor,
    /// Other failure, already reported to the user; wait before retrying.
    Backoff,
    /// The loop was stopped; nothing was dispatched.
    Cancelled,
}

#[derive(Debug)]
struct LoopHandle {
    generation: u64,
    cancel: CancellationToken,
}

/// A fetched, not yet dispatched batch.
struct Batch {
    next_batch: String,
    events: Vec<RealtimeEvent>,
}

pub struct SyncEngine {
    client: MatrixClient,
    summarizer: Summarizer,
    resolver: MediaResolver,
    sink: Arc<dyn EventSink>,
    settings: SyncSettings,
    loops: DashMap<String, LoopHandle>,
    generation: AtomicU64,
}

impl SyncEngine {
    pub fn new(
        client: MatrixClient,
        summarizer: Summarizer,
        sink: Arc<dyn EventSink>,
        settings: SyncSettings,
    ) -> Self {
        let resolver = client.media_resolver();
        Self {
            client,
            summarizer,
            resolver,
            sink,
            settings,
            loops: DashMap::new(),
            generation: AtomicU64::new(0),
        }
    }

    /// Starts the user's loop, replacing (and cancelling) any existing one.
    pub fn start(self: &Arc<Self>, user_id: &str) {
        let generation = self.generation.fetch_add(1, Ordering::Relaxed) + 1;
        let cancel = CancellationToken::new();
        let previous = self.loops.insert(
            user_id.to_string(),
            LoopHandle {
                generation,
                cancel: cancel.clone(),
            },
        );
        if let Some(previous) = previous {
            debug!(user_id, old = previous.generation, new = generation, "replacing sync loop");
            previous.cancel.cancel();
        }

        let engine = Arc::clone(self);
        let user_id = user_id.to_string();
        tokio::spawn(async move { engine.run_loop(user_id, generation, cancel).await });
    }

    /// Stops the user's loop. Returns whether one was running.
    pub fn stop(&self, user_id: &str) -> bool {
        match self.loops.remove(user_id) {
            Some((_, handle)) => {
                handle.cancel.cancel();
                info!(user_id, "sync loop stop requested");
                true
            }
            None => false,
        }
    }

    pub fn stop_all(&self) {
        for entry in self.loops.iter() {
            entry.cancel.cancel();
        }
        self.loops.clear();
    }

    pub fn is_running(&self, user_id: &str) -> bool {
        self.loops.contains_key(user_id)
    }

    pub fn active_loops(&self) -> usize {
        self.loops.len()
    }

    async fn run_loop(self: Arc<Self>, user_id: String, generation: u64, cancel: CancellationToken) {
        info!(user_id = %user_id, generation, "sync loop started");
        let mut cursor: Option<String> = None;

        while !cancel.is_cancelled() {
            match self.run_cycle(&user_id, cursor.as_deref(), &cancel).await {
                CycleOutcome::Advanced(next) => cursor = Some(next),
                CycleOutcome::KeepCursor => {}
                CycleOutcome::Backoff => {
                    tokio::select! {
                        _ = cancel.cancelled() => {}
                        _ = tokio::time::sleep(self.settings.error_backoff) => {}
                    }
                }
                CycleOutcome::Cancelled => break,
            }
        }

        self.loops
            .remove_if(&user_id, |_, handle| handle.generation == generation);
        info!(user_id = %user_id, generation, "sync loop stopped");
    }

    /// Runs one sync cycle for `user_id` from `cursor`.
    pub async fn run_cycle(
        &self,
        user_id: &str,
        cursor: Option<&str>,
        cancel: &CancellationToken,
    ) -> CycleOutcome {
        let fetched = tokio::select! {
            biased;
            _ = cancel.cancelled() => return CycleOutcome::Cancelled,
            fetched = self.fetch_batch(cursor) => fetched,
        };

        match fetched {
            Ok(batch) => {
                if cancel.is_cancelled() {
                    return CycleOutcome::Cancelled;
                }
                debug!(user_id, events = batch.events.len(), next_batch = %batch.next_batch, "dispatching sync batch");
                for event in batch.events {
                    tokio::select! {
                        biased;
                        _ = cancel.cancelled() => return CycleOutcome::Cancelled,
                        _ = self.sink.deliver_to_user(user_id, event) => {}
                    }
                }
                CycleOutcome::Advanced(batch.next_batch)
            }
            Err(e) if e.is_timeout_class() => {
                debug!(user_id, error = %e, "sync timed out, keeping cursor");
                CycleOutcome::KeepCursor
            }
            Err(e) => {
                warn!(user_id, error = %e, "sync failed");
                self.report_failure(user_id, &e);
                CycleOutcome::Backoff
            }
        }
    }

    /// One immediate full sync: emits the room list and `sync_complete`.
    ///
    /// Does not touch the running loop's cursor.
    pub async fn sync_once(&self, user_id: &str) -> Result<SyncComplete, UnichatError> {
        let filter = self.settings.list_filter();
        let sync = match self.client.sync(None, 0, Some(&filter)).await {
            Ok(sync) => sync,
            Err(e) => {
                self.report_failure(user_id, &e);
                return Err(e);
            }
        };
        let rooms = self.summarizer.summarize(&sync.rooms).await;
        let complete = SyncComplete {
            next_batch: sync.next_batch.clone(),
            rooms: rooms.len(),
        };
        self.sink.emit_to_user(
            user_id,
            RealtimeEvent::RoomsUpdated(RoomsUpdated {
                rooms,
                next_batch: sync.next_batch,
            }),
        );
        self.sink
            .emit_to_user(user_id, RealtimeEvent::SyncComplete(complete.clone()));
        Ok(complete)
    }

    async fn fetch_batch(&self, cursor: Option<&str>) -> Result<Batch, UnichatError> {
        let filter = cursor.is_none().then(|| self.settings.list_filter());
        let sync = self
            .client
            .sync(cursor, self.settings.timeout_ms, filter.as_ref())
            .await?;

        let now_ms = Utc::now().timestamp_millis();
        let mut summaries = Vec::with_capacity(sync.rooms.join.len() + sync.rooms.invite.len());

        for (room_id, room) in sync.rooms.invite.iter() {
            match self.client.join(room_id).await {
                Ok(_) => {
                    info!(room_id, "auto-joined invited room");
                    summaries.push(self.summarizer.invited(room_id, room));
                }
                Err(e) => warn!(room_id, error = %e, "auto-join failed"),
            }
        }

        let mut timeline = Vec::new();
        for (room_id, room) in sync.rooms.join.iter() {
            let summary = self.summarizer.joined(room_id, room).await;
            let context = RoomContext {
                room_id,
                room_name: &summary.name,
                platform: summary_platform(&summary),
            };
            timeline.extend(timeline_events(
                context,
                &room.timeline,
                &self.resolver,
                now_ms,
                self.settings.stale_window,
            ));
            summaries.push(summary);
        }
        sort_by_activity(&mut summaries);

        let mut events = Vec::with_capacity(timeline.len() + 1);
        if cursor.is_none() || !summaries.is_empty() {
            events.push(RealtimeEvent::RoomsUpdated(RoomsUpdated {
                rooms: summaries,
                next_batch: sync.next_batch.clone(),
            }));
        }
        events.extend(timeline);
        Ok(Batch {
            next_batch: sync.next_batch,
            events,
        })
    }

    fn report_failure(&self, user_id: &str, error: &UnichatError) {
        self.sink.emit_to_user(
            user_id,
            RealtimeEvent::SyncError(SyncFailure {
                error: "Sync failed".into(),
                details: error.to_string(),
            }),
        );
    }
}

#[async_trait]
impl ServiceAdapter for SyncEngine {
    fn name(&self) -> &str {
        "sync-engine"
    }

    fn version(&self) -> semver::Version {
        semver::Version::new(0, 1, 0)
    }

    async fn health_check(&self) -> Result<HealthStatus, UnichatError> {
        Ok(HealthStatus::Healthy)
    }

    async fn shutdown(&self) -> Result<(), UnichatError> {
        let active = self.active_loops();
        self.stop_all();
        info!(active, "sync loops stopped");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn settings_follow_config() {
        let settings = SyncSettings::from_config(&MatrixConfig::default(), &SyncConfig::default());
        assert_eq!(settings.timeout_ms, 60_000);
        assert_eq!(settings.error_backoff, Duration::from_secs(5));
        assert_eq!(settings.stale_window, Duration::from_secs(60));
        assert_eq!(
            settings.list_filter(),
            json!({ "room": { "timeline": { "limit": 1 } } })
        );
    }
}
