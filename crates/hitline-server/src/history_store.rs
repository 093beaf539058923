use std::collections::{HashMap, VecDeque};

use async_trait::async_trait;
use serde::Serialize;
use tokio::sync::RwLock;

use hitline_core::error::PersistenceError;
use hitline_core::history::{PersistReceipt, PersistStatus, SessionHistoryEntry};

use crate::ports::GameHistoryPort;

/// Default maximum number of sessions kept before the oldest is evicted.
const DEFAULT_MAX_ENTRIES: usize = 1000;

/// Aggregate statistics about the history store.
#[derive(Debug, Clone, Serialize)]
pub struct HistoryStats {
    pub total_stored: usize,
    pub total_writes: u64,
}

#[derive(Default)]
struct Inner {
    entries: HashMap<String, SessionHistoryEntry>,
    /// Insertion order of game ids, for eviction.
    order: VecDeque<String>,
    writes: u64,
}

/// In-memory, bounded session history keyed by game id.
pub struct InMemoryHistoryStore {
    inner: RwLock<Inner>,
    max_entries: usize,
}

impl Default for InMemoryHistoryStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemoryHistoryStore {
    pub fn new() -> Self {
        Self::with_capacity(DEFAULT_MAX_ENTRIES)
    }

    pub fn with_capacity(max_entries: usize) -> Self {
        Self {
            inner: RwLock::new(Inner::default()),
            max_entries: max_entries.max(1),
        }
    }

    /// The most recent `count` entries, newest first.
    pub async fn recent(&self, count: usize) -> Vec<SessionHistoryEntry> {
        let inner = self.inner.read().await;
        inner
            .order
            .iter()
            .rev()
            .take(count)
            .filter_map(|id| inner.entries.get(id).cloned())
            .collect()
    }

    pub async fn stats(&self) -> HistoryStats {
        let inner = self.inner.read().await;
        HistoryStats {
            total_stored: inner.entries.len(),
            total_writes: inner.writes,
        }
    }
}

#[async_trait]
impl GameHistoryPort for InMemoryHistoryStore {
    async fn create_or_update(
        &self,
        entry: &SessionHistoryEntry,
    ) -> Result<PersistReceipt, PersistenceError> {
        if entry.game_id.is_empty() {
            return Err(PersistenceError {
                game_id: String::new(),
                message: "game id must not be empty".to_string(),
            });
        }
        let mut inner = self.inner.write().await;
        inner.writes += 1;
        let status = if inner
            .entries
            .insert(entry.game_id.clone(), entry.clone())
            .is_some()
        {
            PersistStatus::Updated
        } else {
            inner.order.push_back(entry.game_id.clone());
            PersistStatus::Created
        };
        while inner.order.len() > self.max_entries {
            if let Some(oldest) = inner.order.pop_front() {
                inner.entries.remove(&oldest);
            }
        }
        tracing::debug!(game_id = %entry.game_id, ?status, "Stored session history");
        Ok(PersistReceipt {
            status,
            persisted: true,
            error: None,
        })
    }

    async fn get(&self, game_id: &str) -> Option<SessionHistoryEntry> {
        self.inner.read().await.entries.get(game_id).cloned()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use hitline_core::history::{FinalizeSnapshot, build_history_entry};
    use hitline_core::session::Session;
    use hitline_core::test_helpers::{basic_params, make_device_ids};

    fn entry(game_id: &str) -> SessionHistoryEntry {
        let mut session = Session::default();
        session.configure(make_device_ids(2), &basic_params(game_id));
        session.started_at = Some(1_000);
        let snapshot = FinalizeSnapshot::capture(&session, &[], vec![], 2_000);
        build_history_entry(snapshot, None).unwrap()
    }

    #[tokio::test]
    async fn create_then_update_is_idempotent() {
        let store = InMemoryHistoryStore::new();
        let first = store.create_or_update(&entry("g1")).await.unwrap();
        assert_eq!(first.status, PersistStatus::Created);
        let second = store.create_or_update(&entry("g1")).await.unwrap();
        assert_eq!(second.status, PersistStatus::Updated);

        let stats = store.stats().await;
        assert_eq!(stats.total_stored, 1);
        assert_eq!(stats.total_writes, 2);
        assert!(store.get("g1").await.is_some());
    }

    #[tokio::test]
    async fn evicts_oldest_beyond_capacity() {
        let store = InMemoryHistoryStore::with_capacity(2);
        for id in ["g1", "g2", "g3"] {
            store.create_or_update(&entry(id)).await.unwrap();
        }
        assert!(store.get("g1").await.is_none());
        let recent: Vec<String> = store
            .recent(10)
            .await
            .into_iter()
            .map(|e| e.game_id)
            .collect();
        assert_eq!(recent, vec!["g3".to_string(), "g2".to_string()]);
    }

    #[tokio::test]
    async fn rejects_empty_game_id() {
        let store = InMemoryHistoryStore::new();
        let mut bad = entry("g1");
        bad.game_id.clear();
        assert!(store.create_or_update(&bad).await.is_err());
    }
}
