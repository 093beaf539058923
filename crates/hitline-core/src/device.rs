use std::collections::BTreeMap;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Identifier of a remote target device.
pub type DeviceId = String;

/// Command sent to a device over the command port.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceMethod {
    Start,
    Stop,
}

impl fmt::Display for DeviceMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Start => write!(f, "start"),
            Self::Stop => write!(f, "stop"),
        }
    }
}

/// Last known command outcome for a single device.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeviceCommandOutcome {
    #[default]
    Idle,
    Pending,
    Success,
    Error,
}

/// Per-device answer returned by the device command port.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceCommandResult {
    pub device_id: DeviceId,
    pub success: bool,
    #[serde(default)]
    pub error: Option<String>,
}

impl DeviceCommandResult {
    pub fn ok(device_id: impl Into<DeviceId>) -> Self {
        Self {
            device_id: device_id.into(),
            success: true,
            error: None,
        }
    }

    pub fn failed(device_id: impl Into<DeviceId>, error: impl Into<String>) -> Self {
        Self {
            device_id: device_id.into(),
            success: false,
            error: Some(error.into()),
        }
    }
}

/// Aggregated result of one dispatch batch.
///
/// Both ID lists keep the order in which the devices were requested.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct DispatchOutcome {
    pub success_ids: Vec<DeviceId>,
    pub error_ids: Vec<DeviceId>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub errors: BTreeMap<DeviceId, String>,
}

impl DispatchOutcome {
    pub fn is_empty(&self) -> bool {
        self.success_ids.is_empty() && self.error_ids.is_empty()
    }

    pub fn any_succeeded(&self) -> bool {
        !self.success_ids.is_empty()
    }

    pub fn all_failed(&self) -> bool {
        self.success_ids.is_empty() && !self.error_ids.is_empty()
    }
}

/// Device metadata as resolved by the device registry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceInfo {
    pub id: DeviceId,
    pub name: String,
    pub online: bool,
}
