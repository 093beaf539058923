use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use crate::auth::AuthConfig;
use crate::config::ServerConfig;
use crate::coordinator::SessionHandle;
use crate::ports::GameHistoryPort;

#[derive(Clone)]
pub struct AppState {
    pub session: SessionHandle,
    pub history: Arc<dyn GameHistoryPort>,
    pub auth: AuthConfig,
    pub config: Arc<ServerConfig>,
    pub sse_subscriber_count: Arc<AtomicUsize>,
    /// Devices known to the configured fleet.
    pub device_count: usize,
}

impl AppState {
    pub fn new(
        config: ServerConfig,
        session: SessionHandle,
        history: Arc<dyn GameHistoryPort>,
        device_count: usize,
    ) -> Self {
        let auth = AuthConfig {
            bearer_token: config.auth.bearer_token.clone(),
        };
        Self {
            session,
            history,
            auth,
            config: Arc::new(config),
            sse_subscriber_count: Arc::new(AtomicUsize::new(0)),
            device_count,
        }
    }
}

/// Increments a counter on creation and decrements it on drop.
pub struct ConnectionGuard {
    counter: Arc<AtomicUsize>,
}

impl ConnectionGuard {
    pub fn new(counter: Arc<AtomicUsize>) -> Self {
        counter.fetch_add(1, Ordering::Relaxed);
        Self { counter }
    }
}

impl Drop for ConnectionGuard {
    fn drop(&mut self) {
        self.counter.fetch_sub(1, Ordering::Relaxed);
    }
}
