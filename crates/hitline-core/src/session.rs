use std::collections::{BTreeMap, HashSet};
use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::device::DeviceId;
use crate::error::ValidationError;
use crate::lifecycle::Lifecycle;

/// A single hit reported by a target device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HitRecord {
    pub device_id: DeviceId,
    pub timestamp_ms: u64,
}

impl HitRecord {
    pub fn new(device_id: impl Into<DeviceId>, timestamp_ms: u64) -> Self {
        Self {
            device_id: device_id.into(),
            timestamp_ms,
        }
    }
}

/// Why a running session was stopped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    #[default]
    Manual,
    Duration,
    Goal,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Manual => write!(f, "manual"),
            Self::Duration => write!(f, "duration"),
            Self::Goal => write!(f, "goal"),
        }
    }
}

/// Caller-supplied session parameters, checked before any dispatch.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionParams {
    /// Reuse an existing game id instead of generating one.
    pub game_id: Option<String>,
    pub desired_duration_seconds: Option<u64>,
    pub goal_shots_per_target: BTreeMap<DeviceId, u32>,
    pub target_order: Option<Vec<DeviceId>>,
    pub room_id: Option<String>,
    pub room_name: Option<String>,
    pub preset_id: Option<String>,
    /// Reject the start if any selected device is offline.
    pub require_online: bool,
    /// Forwarded verbatim to the device start command.
    pub custom: serde_json::Map<String, serde_json::Value>,
}

/// Check the roster shape: non-empty, no duplicates.
pub fn validate_roster(device_ids: &[DeviceId]) -> Result<(), ValidationError> {
    if device_ids.is_empty() {
        return Err(ValidationError::EmptyRoster);
    }
    let mut seen = HashSet::with_capacity(device_ids.len());
    for id in device_ids {
        if id.trim().is_empty() {
            return Err(ValidationError::Invalid("device id must not be blank".to_string()));
        }
        if !seen.insert(id.as_str()) {
            return Err(ValidationError::DuplicateDevice(id.clone()));
        }
    }
    Ok(())
}

impl SessionParams {
    /// Validate the parameters against the roster they will run on.
    pub fn validate(&self, device_ids: &[DeviceId]) -> Result<(), ValidationError> {
        validate_roster(device_ids)?;

        if self.desired_duration_seconds == Some(0) {
            return Err(ValidationError::ZeroDuration);
        }

        for device_id in self.goal_shots_per_target.keys() {
            if !device_ids.contains(device_id) {
                return Err(ValidationError::GoalOutsideRoster(device_id.clone()));
            }
        }

        if let Some(ref order) = self.target_order {
            let mut seen = HashSet::with_capacity(order.len());
            for device_id in order {
                if !device_ids.contains(device_id) {
                    return Err(ValidationError::OrderOutsideRoster(device_id.clone()));
                }
                if !seen.insert(device_id.as_str()) {
                    return Err(ValidationError::DuplicateOrderEntry(device_id.clone()));
                }
            }
        }

        Ok(())
    }
}

/// The session aggregate. Owned and mutated by exactly one coordinator.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub id: Uuid,
    pub game_id: String,
    pub device_ids: Vec<DeviceId>,
    pub lifecycle: Lifecycle,
    pub started_at: Option<u64>,
    pub stopped_at: Option<u64>,
    pub desired_duration_seconds: Option<u64>,
    pub goal_shots_per_target: BTreeMap<DeviceId, u32>,
    pub target_order: Option<Vec<DeviceId>>,
    pub room_id: Option<String>,
    pub room_name: Option<String>,
    pub preset_id: Option<String>,
    pub stop_reason: Option<StopReason>,
}

impl Default for Session {
    fn default() -> Self {
        Self {
            id: Uuid::nil(),
            game_id: String::new(),
            device_ids: Vec::new(),
            lifecycle: Lifecycle::Idle,
            started_at: None,
            stopped_at: None,
            desired_duration_seconds: None,
            goal_shots_per_target: BTreeMap::new(),
            target_order: None,
            room_id: None,
            room_name: None,
            preset_id: None,
            stop_reason: None,
        }
    }
}

impl Session {
    /// Load a new roster and parameters into the aggregate. The lifecycle is
    /// left alone; the caller drives it through the transition table.
    pub fn configure(&mut self, device_ids: Vec<DeviceId>, params: &SessionParams) {
        self.id = Uuid::new_v4();
        self.game_id = params
            .game_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        self.device_ids = device_ids;
        self.started_at = None;
        self.stopped_at = None;
        self.desired_duration_seconds = params.desired_duration_seconds;
        self.goal_shots_per_target = params.goal_shots_per_target.clone();
        self.target_order = params.target_order.clone();
        self.room_id = params.room_id.clone();
        self.room_name = params.room_name.clone();
        self.preset_id = params.preset_id.clone();
        self.stop_reason = None;
    }

    /// Clear everything but the lifecycle.
    pub fn clear(&mut self) {
        let lifecycle = self.lifecycle;
        *self = Self {
            lifecycle,
            ..Self::default()
        };
    }

    pub fn has_goals(&self) -> bool {
        self.goal_shots_per_target.values().any(|&g| g > 0)
    }
}
