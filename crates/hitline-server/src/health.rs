use std::sync::atomic::Ordering;

use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use serde::Serialize;

use hitline_core::lifecycle::Lifecycle;

use crate::state::AppState;

/// Structured health check response.
#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub connections: ConnectionInfo,
    pub session: SessionInfo,
}

#[derive(Serialize)]
pub struct ConnectionInfo {
    pub sse: usize,
}

#[derive(Serialize)]
pub struct SessionInfo {
    pub lifecycle: Option<Lifecycle>,
    pub devices: usize,
    pub pending_history: usize,
}

/// Structured health check endpoint. Returns server status, connection
/// counts and the coordinator's lifecycle as JSON.
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let sse = state.sse_subscriber_count.load(Ordering::Relaxed);
    let status = state.session.status().await.ok();

    Json(HealthResponse {
        status: if status.is_some() { "healthy" } else { "degraded" },
        version: env!("CARGO_PKG_VERSION"),
        connections: ConnectionInfo { sse },
        session: SessionInfo {
            lifecycle: status.as_ref().map(|s| s.lifecycle),
            devices: state.device_count,
            pending_history: status.map_or(0, |s| s.pending_history),
        },
    })
}

/// Readiness check: the coordinator is alive and there is a fleet to drive.
pub async fn readiness_check(State(state): State<AppState>) -> (StatusCode, &'static str) {
    if !state.session.is_alive() {
        return (StatusCode::SERVICE_UNAVAILABLE, "not ready: coordinator stopped");
    }
    if state.device_count == 0 {
        return (StatusCode::SERVICE_UNAVAILABLE, "not ready: no devices configured");
    }
    (StatusCode::OK, "ready")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn health_response_serializes() {
        let resp = HealthResponse {
            status: "healthy",
            version: "0.1.0",
            connections: ConnectionInfo { sse: 2 },
            session: SessionInfo {
                lifecycle: Some(Lifecycle::Running),
                devices: 3,
                pending_history: 0,
            },
        };
        let json = serde_json::to_string(&resp).unwrap();
        assert!(json.contains("\"healthy\""));
        assert!(json.contains("\"sse\":2"));
        assert!(json.contains("\"lifecycle\":\"running\""));
    }
}
