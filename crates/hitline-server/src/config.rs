use std::time::Duration;

use serde::Deserialize;

use crate::coordinator::CoordinatorConfig;

/// Top-level server configuration, loaded from `hitline.toml`.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    pub listen_addr: String,
    pub auth: AuthFileConfig,
    pub devices: DevicesConfig,
    pub session: SessionConfig,
    pub limits: LimitsConfig,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            listen_addr: "0.0.0.0:8080".to_string(),
            auth: AuthFileConfig::default(),
            devices: DevicesConfig::default(),
            session: SessionConfig::default(),
            limits: LimitsConfig::default(),
        }
    }
}

/// Auth section of the config file.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct AuthFileConfig {
    pub bearer_token: Option<String>,
}

/// Device transport settings.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct DevicesConfig {
    /// Per-device deadline for a start or stop command.
    pub command_timeout_ms: u64,
    /// Refuse to start unless every selected device reports online.
    pub require_online: bool,
    /// Upper bound of the random delay added to each simulated command.
    pub latency_jitter_ms: u64,
    /// Targets served by the built-in simulated fleet.
    pub simulated: Vec<SimulatedDeviceConfig>,
}

impl Default for DevicesConfig {
    fn default() -> Self {
        Self {
            command_timeout_ms: 2000,
            require_online: false,
            latency_jitter_ms: 0,
            simulated: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct SimulatedDeviceConfig {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default = "default_true")]
    pub online: bool,
    #[serde(default)]
    pub fail_start: bool,
    #[serde(default)]
    pub fail_stop: bool,
    #[serde(default)]
    pub latency_ms: u64,
}

fn default_true() -> bool {
    true
}

/// Session timing.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub tick_interval_ms: u64,
    pub goal_settle_delay_ms: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: 1000,
            goal_settle_delay_ms: 500,
        }
    }
}

/// Infrastructure limits (buffer sizes, subscriber caps, batch sizes).
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LimitsConfig {
    pub hit_batch_limit: usize,
    pub broadcast_capacity: usize,
    pub max_sse_subscribers: usize,
    pub max_history_entries: usize,
}

impl Default for LimitsConfig {
    fn default() -> Self {
        Self {
            hit_batch_limit: 500,
            broadcast_capacity: 1024,
            max_sse_subscribers: 100,
            max_history_entries: 1000,
        }
    }
}

impl ServerConfig {
    /// Check the configuration. Problems that make the server unusable are
    /// returned as errors; questionable choices are only logged.
    pub fn validate(&self) -> Result<(), String> {
        if self.listen_addr.parse::<std::net::SocketAddr>().is_err() {
            return Err(format!(
                "listen_addr {:?} is not a valid socket address",
                self.listen_addr
            ));
        }

        if self.auth.bearer_token.is_some() {
            tracing::warn!(
                "bearer_token is set in config file, prefer the HITLINE_API_TOKEN env var in production"
            );
        }

        if self.devices.command_timeout_ms == 0 {
            return Err("devices.command_timeout_ms must be > 0".to_string());
        }
        for device in &self.devices.simulated {
            if device.id.trim().is_empty() {
                return Err("devices.simulated entries need a non-empty id".to_string());
            }
        }
        if self.devices.simulated.is_empty() {
            tracing::warn!("No simulated devices configured, every start will fail");
        }

        if self.session.tick_interval_ms == 0 {
            return Err("session.tick_interval_ms must be > 0".to_string());
        }

        if self.limits.hit_batch_limit == 0 {
            return Err("limits.hit_batch_limit must be > 0".to_string());
        }
        if self.limits.broadcast_capacity == 0 {
            return Err("limits.broadcast_capacity must be > 0".to_string());
        }
        if self.limits.max_sse_subscribers == 0 {
            return Err("limits.max_sse_subscribers must be > 0".to_string());
        }
        if self.limits.max_history_entries == 0 {
            return Err("limits.max_history_entries must be > 0".to_string());
        }
        Ok(())
    }

    /// Coordinator tuning derived from this configuration.
    pub fn coordinator(&self) -> CoordinatorConfig {
        CoordinatorConfig {
            command_timeout: Duration::from_millis(self.devices.command_timeout_ms),
            tick_interval: Duration::from_millis(self.session.tick_interval_ms),
            goal_settle_delay: Duration::from_millis(self.session.goal_settle_delay_ms),
            require_online: self.devices.require_online,
            broadcast_capacity: self.limits.broadcast_capacity,
            max_pending_history: self.limits.max_history_entries,
        }
    }

    /// Load config from `hitline.toml` if it exists, then apply env var overrides.
    pub fn load() -> Self {
        let mut config = match std::fs::read_to_string("hitline.toml") {
            Ok(content) => match toml::from_str::<ServerConfig>(&content) {
                Ok(cfg) => {
                    tracing::info!("Loaded configuration from hitline.toml");
                    cfg
                },
                Err(e) => {
                    tracing::warn!("Failed to parse hitline.toml: {e}, using defaults");
                    ServerConfig::default()
                },
            },
            Err(_) => {
                tracing::info!("No hitline.toml found, using defaults");
                ServerConfig::default()
            },
        };

        if let Ok(addr) = std::env::var("HITLINE_LISTEN_ADDR")
            && !addr.is_empty()
        {
            config.listen_addr = addr;
        }
        if let Ok(token) = std::env::var("HITLINE_API_TOKEN")
            && !token.is_empty()
        {
            config.auth.bearer_token = Some(token);
        }
        if let Ok(val) = std::env::var("HITLINE_COMMAND_TIMEOUT_MS")
            && let Ok(n) = val.parse::<u64>()
        {
            config.devices.command_timeout_ms = n;
        }
        if let Ok(val) = std::env::var("HITLINE_TICK_INTERVAL_MS")
            && let Ok(n) = val.parse::<u64>()
        {
            config.session.tick_interval_ms = n;
        }
        if let Ok(val) = std::env::var("HITLINE_REQUIRE_ONLINE")
            && let Ok(flag) = val.parse::<bool>()
        {
            config.devices.require_online = flag;
        }

        config
    }
}
