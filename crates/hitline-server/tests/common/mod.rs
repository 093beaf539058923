use std::net::SocketAddr;
use std::time::Duration;

use serde_json::Value;

use hitline_server::build_app;
use hitline_server::config::{AuthFileConfig, ServerConfig, SimulatedDeviceConfig};

pub struct TestServer {
    pub addr: SocketAddr,
    client: reqwest::Client,
    _shutdown: tokio::task::JoinHandle<()>,
}

/// A simulated target that answers every command.
pub fn device(id: &str) -> SimulatedDeviceConfig {
    SimulatedDeviceConfig {
        id: id.to_string(),
        name: None,
        online: true,
        fail_start: false,
        fail_stop: false,
        latency_ms: 0,
    }
}

/// Three healthy lanes plus `lane-bad`, which refuses to start.
pub fn default_config() -> ServerConfig {
    let mut config = ServerConfig::default();
    config.devices.simulated = vec![
        device("lane-1"),
        device("lane-2"),
        device("lane-3"),
        SimulatedDeviceConfig {
            fail_start: true,
            ..device("lane-bad")
        },
    ];
    config.session.goal_settle_delay_ms = 50;
    config
}

impl TestServer {
    /// Start a test server with no auth.
    pub async fn new() -> Self {
        Self::from_config(default_config()).await
    }

    /// Start a test server with a bearer token.
    pub async fn with_auth(token: &str) -> Self {
        let config = ServerConfig {
            auth: AuthFileConfig {
                bearer_token: Some(token.to_string()),
            },
            ..default_config()
        };
        Self::from_config(config).await
    }

    pub async fn from_config(config: ServerConfig) -> Self {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();

        let (app, _state) = build_app(config);

        let handle = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        // Give the server a moment to start accepting
        tokio::time::sleep(Duration::from_millis(20)).await;

        Self {
            addr,
            client: reqwest::Client::new(),
            _shutdown: handle,
        }
    }

    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn api(&self, path: &str) -> String {
        format!("{}/api/v1{path}", self.base_url())
    }

    /// POST a JSON body and return the status with the parsed response.
    pub async fn post(&self, path: &str, body: Value) -> (u16, Value) {
        let resp = self
            .client
            .post(self.api(path))
            .json(&body)
            .send()
            .await
            .unwrap();
        let status = resp.status().as_u16();
        let body = resp.json().await.unwrap_or(Value::Null);
        (status, body)
    }

    pub async fn get(&self, path: &str) -> (u16, Value) {
        let resp = self.client.get(self.api(path)).send().await.unwrap();
        let status = resp.status().as_u16();
        let body = resp.json().await.unwrap_or(Value::Null);
        (status, body)
    }

    /// Poll the session until its lifecycle matches, or panic after 5s.
    pub async fn wait_for_lifecycle(&self, lifecycle: &str) -> Value {
        let deadline = tokio::time::Instant::now() + Duration::from_secs(5);
        loop {
            let (_, status) = self.get("/session").await;
            if status["lifecycle"] == lifecycle {
                return status;
            }
            assert!(
                tokio::time::Instant::now() < deadline,
                "Timed out waiting for {lifecycle}, last status: {status}"
            );
            tokio::time::sleep(Duration::from_millis(20)).await;
        }
    }
}

/// Current wall-clock time in epoch milliseconds.
pub fn now_ms() -> u64 {
    hitline_core::time::now_ms()
}
