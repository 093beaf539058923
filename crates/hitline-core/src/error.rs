//! Error taxonomy shared by every Hitline component.
//!
//! A run that misses its goals or breaks the target order is not an error:
//! it is reported through `SessionScoreResult::is_valid`.

use thiserror::Error;

use crate::device::{DeviceId, DispatchOutcome};
use crate::lifecycle::Lifecycle;

/// Malformed input, rejected before any command is dispatched.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ValidationError {
    #[error("no devices selected")]
    EmptyRoster,
    #[error("device {0} listed more than once")]
    DuplicateDevice(DeviceId),
    #[error("devices offline: {}", .0.join(", "))]
    OfflineDevices(Vec<DeviceId>),
    #[error("devices not found in registry: {}", .0.join(", "))]
    UnknownDevices(Vec<DeviceId>),
    #[error("goal configured for device {0} outside the roster")]
    GoalOutsideRoster(DeviceId),
    #[error("target order entry {0} is not in the roster")]
    OrderOutsideRoster(DeviceId),
    #[error("target order lists device {0} more than once")]
    DuplicateOrderEntry(DeviceId),
    #[error("desired duration must be greater than zero")]
    ZeroDuration,
    #[error("{0}")]
    Invalid(String),
}

/// A lifecycle transition that the state table does not allow.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum StateError {
    #[error("invalid lifecycle transition {from} -> {to}")]
    InvalidTransition { from: Lifecycle, to: Lifecycle },
    #[error("a session is already active ({0})")]
    SessionActive(Lifecycle),
    #[error("session is not running ({0})")]
    NotRunning(Lifecycle),
    #[error("cannot roll back to running from {0}")]
    RollbackNotAllowed(Lifecycle),
}

/// Failure of a single device command. Recorded per device, never fatal to
/// the batch.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DeviceCommandError {
    #[error("device {device_id} rejected command: {message}")]
    Rejected { device_id: DeviceId, message: String },
    #[error("device {device_id} did not answer within {timeout_ms} ms")]
    Timeout { device_id: DeviceId, timeout_ms: u64 },
    #[error("device {device_id} missing from port response")]
    NoResponse { device_id: DeviceId },
    #[error("transport failure: {0}")]
    Transport(String),
}

/// History write failure. Logged and surfaced as a warning; the in-memory
/// entry is kept.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("failed to persist history for game {game_id}: {message}")]
pub struct PersistenceError {
    pub game_id: String,
    pub message: String,
}

/// The finalize snapshot could not be turned into a history entry.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum FinalizeError {
    #[error("session has no start timestamp")]
    MissingStartTime,
    #[error("stop time {stopped_at} precedes start time {started_at}")]
    StopBeforeStart { started_at: u64, stopped_at: u64 },
    #[error("session roster is empty")]
    EmptyRoster,
}

/// Top-level error returned by session operations.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SessionError {
    #[error(transparent)]
    Validation(#[from] ValidationError),
    #[error(transparent)]
    State(#[from] StateError),
    #[error("every device failed to {method}: {}", .outcome.error_ids.join(", "))]
    AllDevicesFailed {
        method: crate::device::DeviceMethod,
        outcome: DispatchOutcome,
    },
    #[error(transparent)]
    Finalize(#[from] FinalizeError),
    #[error(transparent)]
    Persistence(#[from] PersistenceError),
    #[error("session coordinator is not running")]
    CoordinatorGone,
}
