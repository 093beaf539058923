pub mod api;
pub mod auth;
pub mod config;
pub mod coordinator;
pub mod dispatcher;
pub mod error;
pub mod finalizer;
pub mod fleet;
pub mod health;
pub mod history_store;
pub mod ports;
pub mod sse;
pub mod state;
pub mod ticker;

use std::sync::Arc;

use axum::Router;
use axum::middleware;
use axum::routing::{get, post};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;

use config::ServerConfig;
use coordinator::{CoordinatorPorts, spawn_session_coordinator};
use fleet::SimulatedFleet;
use history_store::InMemoryHistoryStore;
use ports::{DeviceCommandPort, DeviceRegistry, GameHistoryPort};
use state::AppState;

/// Build the Axum router and application state from a config, driving the
/// simulated fleet it describes.
pub fn build_app(config: ServerConfig) -> (Router<()>, AppState) {
    let fleet = Arc::new(
        SimulatedFleet::from_config(&config.devices.simulated)
            .with_jitter_ms(config.devices.latency_jitter_ms),
    );
    let history = Arc::new(InMemoryHistoryStore::with_capacity(
        config.limits.max_history_entries,
    ));
    let device_count = fleet.len();
    let ports = CoordinatorPorts::new(
        Arc::clone(&fleet) as Arc<dyn DeviceCommandPort>,
        history as Arc<dyn GameHistoryPort>,
    )
    .with_registry(fleet as Arc<dyn DeviceRegistry>);
    build_app_with(config, ports, device_count)
}

/// Build the router around caller-supplied ports.
pub fn build_app_with(
    config: ServerConfig,
    ports: CoordinatorPorts,
    device_count: usize,
) -> (Router<()>, AppState) {
    let history = Arc::clone(&ports.history);
    let (session, _join) = spawn_session_coordinator(ports, config.coordinator());
    let state = AppState::new(config, session, history, device_count);

    // API routes (behind bearer auth middleware)
    let api_routes = Router::new()
        .route("/session", get(api::get_session))
        .route("/session/start", post(api::start_session))
        .route("/session/stop", post(api::stop_session))
        .route("/session/retry", post(api::retry_failed))
        .route("/session/events", get(sse::session_event_stream))
        .route("/hits", post(api::post_hits))
        .route("/devices/{device_id}/stopped", post(api::device_stopped))
        .route("/history/flush", post(api::flush_history))
        .route("/history/{game_id}", get(api::get_history))
        .layer(middleware::from_fn_with_state(
            state.clone(),
            bearer_auth_layer,
        ));

    let app = Router::new()
        .route("/health", get(health::health_check))
        .route("/ready", get(health::readiness_check))
        .nest("/api/v1", api_routes)
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(state.clone());

    (app, state)
}

/// Middleware wrapper that injects AuthConfig into request extensions for the
/// bearer auth middleware.
async fn bearer_auth_layer(
    axum::extract::State(state): axum::extract::State<AppState>,
    mut request: axum::extract::Request,
    next: middleware::Next,
) -> Result<axum::response::Response, axum::http::StatusCode> {
    request.extensions_mut().insert(state.auth.clone());
    auth::bearer_auth_middleware(request.headers().clone(), request, next).await
}
