use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::Json;
use serde::{Deserialize, Serialize};

use hitline_core::bus::DEVICE_STOPPED;
use hitline_core::device::{DeviceId, DispatchOutcome};
use hitline_core::history::SessionHistoryEntry;
use hitline_core::session::{HitRecord, SessionParams};

use crate::coordinator::{FlushSummary, SessionStatus, StopOutcome};
use crate::error::AppError;
use crate::state::AppState;

/// Longest device id accepted over HTTP.
const MAX_DEVICE_ID_LEN: usize = 128;

#[derive(Debug, Deserialize)]
pub struct StartSessionBody {
    pub device_ids: Vec<DeviceId>,
    #[serde(default)]
    pub params: SessionParams,
}

#[derive(Debug, Default, Deserialize)]
pub struct RetryBody {
    #[serde(default)]
    pub device_ids: Option<Vec<DeviceId>>,
}

/// Request body for posting hits: one record or a batch.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
pub enum PostHitsBody {
    Single(HitRecord),
    Batch(Vec<HitRecord>),
}

#[derive(Debug, Serialize)]
pub struct PostHitsResponse {
    pub accepted: usize,
    pub rejected: usize,
}

#[derive(Debug, Serialize)]
pub struct DeviceStoppedResponse {
    pub device_id: DeviceId,
    pub queued: bool,
}

fn validate_device_id(device_id: &str) -> Result<(), AppError> {
    if device_id.is_empty() {
        return Err(AppError::BadRequest("device_id must not be empty".to_string()));
    }
    if device_id.len() > MAX_DEVICE_ID_LEN {
        return Err(AppError::BadRequest(format!(
            "device_id exceeds {MAX_DEVICE_ID_LEN} chars"
        )));
    }
    Ok(())
}

/// POST /api/v1/session/start
pub async fn start_session(
    State(state): State<AppState>,
    Json(body): Json<StartSessionBody>,
) -> Result<Json<DispatchOutcome>, AppError> {
    for id in &body.device_ids {
        validate_device_id(id)?;
    }
    let outcome = state.session.start(body.device_ids, body.params).await?;
    Ok(Json(outcome))
}

/// POST /api/v1/session/stop
pub async fn stop_session(State(state): State<AppState>) -> Result<Json<StopOutcome>, AppError> {
    Ok(Json(state.session.stop().await?))
}

/// POST /api/v1/session/retry
pub async fn retry_failed(
    State(state): State<AppState>,
    Json(body): Json<RetryBody>,
) -> Result<Json<DispatchOutcome>, AppError> {
    Ok(Json(state.session.retry_failed(body.device_ids).await?))
}

/// GET /api/v1/session
pub async fn get_session(State(state): State<AppState>) -> Result<Json<SessionStatus>, AppError> {
    Ok(Json(state.session.status().await?))
}

/// POST /api/v1/hits
pub async fn post_hits(
    State(state): State<AppState>,
    Json(body): Json<PostHitsBody>,
) -> Result<Json<PostHitsResponse>, AppError> {
    let hits = match body {
        PostHitsBody::Single(hit) => vec![hit],
        PostHitsBody::Batch(hits) => {
            let limit = state.config.limits.hit_batch_limit;
            if hits.len() > limit {
                return Err(AppError::BadRequest(format!(
                    "Batch size {} exceeds limit of {limit}",
                    hits.len()
                )));
            }
            hits
        },
    };
    for hit in &hits {
        validate_device_id(&hit.device_id)?;
    }

    let mut accepted = 0;
    let mut rejected = 0;
    for hit in hits {
        if state.session.record_hit(hit).await? {
            accepted += 1;
        } else {
            rejected += 1;
        }
    }
    Ok(Json(PostHitsResponse { accepted, rejected }))
}

/// POST /api/v1/devices/{device_id}/stopped
pub async fn device_stopped(
    State(state): State<AppState>,
    Path(device_id): Path<DeviceId>,
) -> Result<(StatusCode, Json<DeviceStoppedResponse>), AppError> {
    validate_device_id(&device_id)?;
    match state.session.bus().call(&DEVICE_STOPPED, device_id.clone()) {
        Some(true) => Ok((
            StatusCode::ACCEPTED,
            Json(DeviceStoppedResponse {
                device_id,
                queued: true,
            }),
        )),
        _ => Err(AppError::Unavailable(
            "session coordinator is not accepting device reports".to_string(),
        )),
    }
}

/// GET /api/v1/history/{game_id}
pub async fn get_history(
    State(state): State<AppState>,
    Path(game_id): Path<String>,
) -> Result<Json<SessionHistoryEntry>, AppError> {
    state
        .history
        .get(&game_id)
        .await
        .map(Json)
        .ok_or_else(|| AppError::NotFound(format!("No history for game {game_id}")))
}

/// POST /api/v1/history/flush
pub async fn flush_history(State(state): State<AppState>) -> Result<Json<FlushSummary>, AppError> {
    Ok(Json(state.session.flush_pending_history().await?))
}
