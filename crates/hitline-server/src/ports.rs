//! Boundaries to the outside world: device transport, history storage and
//! the device registry.

use async_trait::async_trait;

use hitline_core::device::{DeviceCommandResult, DeviceId, DeviceInfo, DeviceMethod};
use hitline_core::error::{DeviceCommandError, PersistenceError};
use hitline_core::history::{PersistReceipt, SessionHistoryEntry};

/// Sends commands to remote target devices.
///
/// Implementations report per-device results and must not retry on their
/// own. An `Err` means the whole call failed to reach any device.
#[async_trait]
pub trait DeviceCommandPort: Send + Sync {
    async fn send(
        &self,
        device_ids: &[DeviceId],
        method: DeviceMethod,
        params: &serde_json::Value,
    ) -> Result<Vec<DeviceCommandResult>, DeviceCommandError>;
}

/// Stores finished sessions. `create_or_update` must be idempotent per
/// `game_id`.
#[async_trait]
pub trait GameHistoryPort: Send + Sync {
    async fn create_or_update(
        &self,
        entry: &SessionHistoryEntry,
    ) -> Result<PersistReceipt, PersistenceError>;

    async fn get(&self, game_id: &str) -> Option<SessionHistoryEntry>;
}

/// Resolves device metadata before dispatch. Unknown ids are omitted from
/// the answer.
#[async_trait]
pub trait DeviceRegistry: Send + Sync {
    async fn resolve(&self, device_ids: &[DeviceId]) -> Vec<DeviceInfo>;
}
