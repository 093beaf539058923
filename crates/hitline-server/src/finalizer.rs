//! Turns a stopped session into a history entry and hands it to storage.

use std::sync::Arc;

use serde::Serialize;

use hitline_core::error::FinalizeError;
use hitline_core::history::{
    FinalizeSnapshot, PersistStatus, SessionHistoryEntry, build_history_entry,
};
use hitline_core::scoring::SessionScoreResult;

use crate::ports::GameHistoryPort;

/// Result of a finalize that got as far as storage.
#[derive(Debug, Clone, Serialize)]
pub struct FinalizeReport {
    pub entry: SessionHistoryEntry,
    pub status: Option<PersistStatus>,
    pub persisted: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
}

pub struct SessionFinalizer {
    history: Arc<dyn GameHistoryPort>,
}

impl SessionFinalizer {
    pub fn new(history: Arc<dyn GameHistoryPort>) -> Self {
        Self { history }
    }

    /// Build the entry and submit it.
    ///
    /// Only the computation can fail; a storage failure is reported in the
    /// returned report so the session can still complete.
    pub async fn finalize(
        &self,
        snapshot: FinalizeSnapshot,
        precomputed: Option<SessionScoreResult>,
    ) -> Result<FinalizeReport, FinalizeError> {
        let entry = build_history_entry(snapshot, precomputed).inspect_err(|e| {
            tracing::error!(error = %e, "Finalize computation failed");
        })?;
        tracing::info!(
            game_id = %entry.game_id,
            score = ?entry.score.score,
            valid = entry.score.is_valid,
            hits = entry.total_hits,
            reason = %entry.stop_reason,
            "Session finalized"
        );
        Ok(self.persist(entry).await)
    }

    /// Submit an entry, turning every failure into a warning.
    pub async fn persist(&self, entry: SessionHistoryEntry) -> FinalizeReport {
        match self.history.create_or_update(&entry).await {
            Ok(receipt) if receipt.persisted => FinalizeReport {
                entry,
                status: Some(receipt.status),
                persisted: true,
                warning: None,
            },
            Ok(receipt) => {
                let warning = receipt
                    .error
                    .unwrap_or_else(|| "history store did not persist the entry".to_string());
                tracing::warn!(game_id = %entry.game_id, %warning, "History not persisted");
                FinalizeReport {
                    entry,
                    status: Some(receipt.status),
                    persisted: false,
                    warning: Some(warning),
                }
            },
            Err(e) => {
                tracing::warn!(game_id = %entry.game_id, error = %e, "History write failed");
                FinalizeReport {
                    entry,
                    status: None,
                    persisted: false,
                    warning: Some(e.to_string()),
                }
            },
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use async_trait::async_trait;
    use hitline_core::error::PersistenceError;
    use hitline_core::history::PersistReceipt;
    use hitline_core::session::{HitRecord, Session};
    use hitline_core::test_helpers::{goal_params, make_device_ids};

    use crate::history_store::InMemoryHistoryStore;

    struct RefusingStore;

    #[async_trait]
    impl GameHistoryPort for RefusingStore {
        async fn create_or_update(
            &self,
            entry: &SessionHistoryEntry,
        ) -> Result<PersistReceipt, PersistenceError> {
            Err(PersistenceError {
                game_id: entry.game_id.clone(),
                message: "disk full".to_string(),
            })
        }

        async fn get(&self, _game_id: &str) -> Option<SessionHistoryEntry> {
            None
        }
    }

    fn snapshot(started_at: Option<u64>, stopped_at: u64) -> FinalizeSnapshot {
        let mut session = Session::default();
        session.configure(make_device_ids(1), &goal_params("g1", &[("target-1", 2)]));
        session.started_at = started_at;
        let hits = vec![
            HitRecord::new("target-1", 1_500),
            HitRecord::new("target-1", 2_500),
        ];
        FinalizeSnapshot::capture(&session, &hits, vec![], stopped_at)
    }

    #[tokio::test]
    async fn persists_computed_entry() {
        let store = Arc::new(InMemoryHistoryStore::new());
        let finalizer = SessionFinalizer::new(Arc::clone(&store) as Arc<dyn GameHistoryPort>);
        let report = finalizer.finalize(snapshot(Some(1_000), 3_000), None).await.unwrap();
        assert!(report.persisted);
        assert_eq!(report.status, Some(PersistStatus::Created));
        assert_eq!(report.entry.score.score, Some(1.5));
        assert!(store.get("g1").await.is_some());
    }

    #[tokio::test]
    async fn storage_failure_becomes_warning() {
        let finalizer = SessionFinalizer::new(Arc::new(RefusingStore));
        let report = finalizer.finalize(snapshot(Some(1_000), 3_000), None).await.unwrap();
        assert!(!report.persisted);
        assert!(report.warning.unwrap().contains("disk full"));
    }

    #[tokio::test]
    async fn computation_failure_is_an_error() {
        let finalizer = SessionFinalizer::new(Arc::new(InMemoryHistoryStore::new()));
        let err = finalizer.finalize(snapshot(None, 3_000), None).await.unwrap_err();
        assert_eq!(err, FinalizeError::MissingStartTime);
    }
}
