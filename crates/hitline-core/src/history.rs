use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::device::DeviceId;
use crate::error::FinalizeError;
use crate::scoring::{SessionScoreResult, calculate_session_score, hit_counts};
use crate::session::{HitRecord, Session, StopReason};

/// Everything the finalizer needs, copied out of the live session so later
/// mutation cannot leak into the record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FinalizeSnapshot {
    pub session_id: Uuid,
    pub game_id: String,
    pub device_ids: Vec<DeviceId>,
    pub hits: Vec<HitRecord>,
    pub goal_shots_per_target: BTreeMap<DeviceId, u32>,
    pub target_order: Option<Vec<DeviceId>>,
    pub desired_duration_seconds: Option<u64>,
    pub room_id: Option<String>,
    pub room_name: Option<String>,
    pub preset_id: Option<String>,
    pub started_at: Option<u64>,
    pub stopped_at: u64,
    pub stop_reason: StopReason,
    pub failed_device_ids: Vec<DeviceId>,
}

impl FinalizeSnapshot {
    pub fn capture(
        session: &Session,
        hits: &[HitRecord],
        failed_device_ids: Vec<DeviceId>,
        stopped_at: u64,
    ) -> Self {
        Self {
            session_id: session.id,
            game_id: session.game_id.clone(),
            device_ids: session.device_ids.clone(),
            hits: hits.to_vec(),
            goal_shots_per_target: session.goal_shots_per_target.clone(),
            target_order: session.target_order.clone(),
            desired_duration_seconds: session.desired_duration_seconds,
            room_id: session.room_id.clone(),
            room_name: session.room_name.clone(),
            preset_id: session.preset_id.clone(),
            started_at: session.started_at,
            stopped_at,
            stop_reason: session.stop_reason.unwrap_or_default(),
            failed_device_ids,
        }
    }
}

/// Immutable record of a finished session.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SessionHistoryEntry {
    pub game_id: String,
    pub session_id: Uuid,
    pub device_ids: Vec<DeviceId>,
    pub hits: Vec<HitRecord>,
    pub score: SessionScoreResult,
    pub goal_shots_per_target: BTreeMap<DeviceId, u32>,
    pub target_order: Option<Vec<DeviceId>>,
    pub desired_duration_seconds: Option<u64>,
    pub room_id: Option<String>,
    pub room_name: Option<String>,
    pub preset_id: Option<String>,
    pub started_at: u64,
    pub stopped_at: u64,
    pub duration_ms: u64,
    pub stop_reason: StopReason,
    pub total_hits: usize,
    pub hits_by_device: BTreeMap<DeviceId, u32>,
    pub failed_device_ids: Vec<DeviceId>,
}

/// Build the history entry for a snapshot. A precomputed score is reused
/// as-is; otherwise the score is computed from the snapshot's hits.
pub fn build_history_entry(
    snapshot: FinalizeSnapshot,
    precomputed: Option<SessionScoreResult>,
) -> Result<SessionHistoryEntry, FinalizeError> {
    if snapshot.device_ids.is_empty() {
        return Err(FinalizeError::EmptyRoster);
    }
    let started_at = snapshot.started_at.ok_or(FinalizeError::MissingStartTime)?;
    if snapshot.stopped_at < started_at {
        return Err(FinalizeError::StopBeforeStart {
            started_at,
            stopped_at: snapshot.stopped_at,
        });
    }

    let score = precomputed.unwrap_or_else(|| {
        calculate_session_score(
            &snapshot.hits,
            &snapshot.goal_shots_per_target,
            started_at,
            snapshot.target_order.as_deref(),
        )
    });

    Ok(SessionHistoryEntry {
        hits_by_device: hit_counts(&snapshot.hits),
        total_hits: snapshot.hits.len(),
        duration_ms: snapshot.stopped_at - started_at,
        game_id: snapshot.game_id,
        session_id: snapshot.session_id,
        device_ids: snapshot.device_ids,
        hits: snapshot.hits,
        score,
        goal_shots_per_target: snapshot.goal_shots_per_target,
        target_order: snapshot.target_order,
        desired_duration_seconds: snapshot.desired_duration_seconds,
        room_id: snapshot.room_id,
        room_name: snapshot.room_name,
        preset_id: snapshot.preset_id,
        started_at,
        stopped_at: snapshot.stopped_at,
        stop_reason: snapshot.stop_reason,
        failed_device_ids: snapshot.failed_device_ids,
    })
}

/// Whether a create-or-update call inserted or replaced the record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PersistStatus {
    Created,
    Updated,
}

/// Answer of the game history port.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PersistReceipt {
    pub status: PersistStatus,
    pub persisted: bool,
    #[serde(default)]
    pub error: Option<String>,
}
