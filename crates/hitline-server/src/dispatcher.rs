//! Concurrent start/stop fan-out with per-device outcome tracking.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use futures::future::join_all;

use hitline_core::bus::Callback;
use hitline_core::device::{
    DeviceCommandOutcome, DeviceCommandResult, DeviceId, DeviceMethod, DispatchOutcome,
};
use hitline_core::error::{DeviceCommandError, StateError, ValidationError};
use hitline_core::lifecycle::Lifecycle;

use crate::ports::{DeviceCommandPort, DeviceRegistry};

/// Default time a single device may take to answer a command.
pub const DEFAULT_COMMAND_TIMEOUT: Duration = Duration::from_millis(2000);

/// Fired every time a device's command outcome changes.
pub type OutcomeObserver = Callback<(DeviceId, DeviceCommandOutcome)>;

/// Fired after every lifecycle transition the dispatcher makes, as `(from, to)`.
pub type TransitionObserver = Callback<(Lifecycle, Lifecycle)>;

pub struct DeviceCommandDispatcher {
    port: Arc<dyn DeviceCommandPort>,
    command_timeout: Duration,
    outcomes: BTreeMap<DeviceId, DeviceCommandOutcome>,
    /// Payload of the last start batch, reused by retries.
    last_start_payload: serde_json::Value,
    on_outcome: OutcomeObserver,
    on_transition: TransitionObserver,
}

impl DeviceCommandDispatcher {
    pub fn new(port: Arc<dyn DeviceCommandPort>, command_timeout: Duration) -> Self {
        Self {
            port,
            command_timeout,
            outcomes: BTreeMap::new(),
            last_start_payload: serde_json::Value::Null,
            on_outcome: Callback::none(),
            on_transition: Callback::none(),
        }
    }

    pub fn with_observer(mut self, observer: OutcomeObserver) -> Self {
        self.on_outcome = observer;
        self
    }

    pub fn with_transition_observer(mut self, observer: TransitionObserver) -> Self {
        self.on_transition = observer;
        self
    }

    pub fn outcomes(&self) -> &BTreeMap<DeviceId, DeviceCommandOutcome> {
        &self.outcomes
    }

    pub fn outcome(&self, device_id: &str) -> DeviceCommandOutcome {
        self.outcomes.get(device_id).copied().unwrap_or_default()
    }

    /// Devices of `roster` whose last command failed, in roster order.
    pub fn error_ids(&self, roster: &[DeviceId]) -> Vec<DeviceId> {
        roster
            .iter()
            .filter(|id| self.outcome(id) == DeviceCommandOutcome::Error)
            .cloned()
            .collect()
    }

    /// Forget every outcome. Called when a new session is configured.
    pub fn reset(&mut self) {
        self.outcomes.clear();
        self.last_start_payload = serde_json::Value::Null;
    }

    /// Reject the roster if any device is unknown to the registry or offline.
    pub async fn ensure_online(
        registry: &dyn DeviceRegistry,
        device_ids: &[DeviceId],
    ) -> Result<(), ValidationError> {
        let infos = registry.resolve(device_ids).await;
        let unknown: Vec<DeviceId> = device_ids
            .iter()
            .filter(|id| !infos.iter().any(|info| &info.id == *id))
            .cloned()
            .collect();
        if !unknown.is_empty() {
            return Err(ValidationError::UnknownDevices(unknown));
        }
        let offline: Vec<DeviceId> = device_ids
            .iter()
            .filter(|id| infos.iter().any(|info| &info.id == *id && !info.online))
            .cloned()
            .collect();
        if !offline.is_empty() {
            return Err(ValidationError::OfflineDevices(offline));
        }
        Ok(())
    }

    /// Send `start` to every device and settle the lifecycle.
    ///
    /// Requires `Configuring`. Moves to `Launching` for the batch, then to
    /// `Running` if at least one device accepted, otherwise to `Error`.
    pub async fn start(
        &mut self,
        lifecycle: &mut Lifecycle,
        device_ids: &[DeviceId],
        game_id: &str,
        params: &serde_json::Map<String, serde_json::Value>,
    ) -> Result<DispatchOutcome, StateError> {
        if *lifecycle != Lifecycle::Configuring {
            return Err(StateError::InvalidTransition {
                from: *lifecycle,
                to: Lifecycle::Launching,
            });
        }
        self.advance(lifecycle, Lifecycle::Launching)?;

        self.last_start_payload = serde_json::json!({
            "game_id": game_id,
            "params": params,
        });
        let payload = self.last_start_payload.clone();
        let outcome = self.send_batch(DeviceMethod::Start, device_ids, &payload).await;

        if outcome.any_succeeded() {
            self.advance(lifecycle, Lifecycle::Running)?;
            if !outcome.error_ids.is_empty() {
                tracing::warn!(
                    failed = ?outcome.error_ids,
                    started = outcome.success_ids.len(),
                    "Session running with partial device failures"
                );
            }
        } else {
            self.advance(lifecycle, Lifecycle::Error)?;
            tracing::error!(failed = ?outcome.error_ids, "No device accepted start");
        }
        Ok(outcome)
    }

    /// Send `stop` to every roster device, whatever its earlier outcome.
    ///
    /// Requires `Launching` or `Running`. Ends in `Finalizing` even when every
    /// stop command failed.
    pub async fn stop(
        &mut self,
        lifecycle: &mut Lifecycle,
        device_ids: &[DeviceId],
        game_id: &str,
    ) -> Result<DispatchOutcome, StateError> {
        self.advance(lifecycle, Lifecycle::Stopping)?;
        let payload = serde_json::json!({ "game_id": game_id });
        let outcome = self.send_batch(DeviceMethod::Stop, device_ids, &payload).await;
        if !outcome.error_ids.is_empty() {
            tracing::warn!(failed = ?outcome.error_ids, "Some devices did not stop cleanly");
        }
        self.advance(lifecycle, Lifecycle::Finalizing)?;
        Ok(outcome)
    }

    /// Resend `start` to devices whose last command failed.
    ///
    /// `requested` narrows the retry to those ids; ids not currently in error
    /// are ignored. While `Running` only the subset is contacted and the
    /// lifecycle stays put. From `Error` the start flow is replayed on the
    /// subset, which may bring the session to `Running`.
    pub async fn retry_failed(
        &mut self,
        lifecycle: &mut Lifecycle,
        roster: &[DeviceId],
        requested: Option<&[DeviceId]>,
    ) -> Result<DispatchOutcome, StateError> {
        let subset: Vec<DeviceId> = self
            .error_ids(roster)
            .into_iter()
            .filter(|id| requested.is_none_or(|req| req.contains(id)))
            .collect();
        if subset.is_empty() {
            tracing::debug!("Nothing to retry");
            return Ok(DispatchOutcome::default());
        }
        tracing::info!(devices = ?subset, "Retrying failed devices");

        match *lifecycle {
            Lifecycle::Running => {
                let payload = self.last_start_payload.clone();
                Ok(self.send_batch(DeviceMethod::Start, &subset, &payload).await)
            },
            Lifecycle::Error => {
                let payload = self.last_start_payload.clone();
                let game_id = payload
                    .get("game_id")
                    .and_then(|v| v.as_str())
                    .unwrap_or_default()
                    .to_string();
                let params = payload
                    .get("params")
                    .and_then(|v| v.as_object())
                    .cloned()
                    .unwrap_or_default();
                self.advance(lifecycle, Lifecycle::Idle)?;
                self.advance(lifecycle, Lifecycle::Configuring)?;
                self.start(lifecycle, &subset, &game_id, &params).await
            },
            other => Err(StateError::NotRunning(other)),
        }
    }

    fn advance(&self, lifecycle: &mut Lifecycle, to: Lifecycle) -> Result<(), StateError> {
        let from = *lifecycle;
        lifecycle.transition(to)?;
        self.on_transition.invoke((from, to));
        Ok(())
    }

    fn set_outcome(&mut self, device_id: &DeviceId, outcome: DeviceCommandOutcome) {
        self.outcomes.insert(device_id.clone(), outcome);
        self.on_outcome.invoke((device_id.clone(), outcome));
    }

    /// One command per device, all in flight together. A device that does
    /// not answer within the timeout counts as failed; one slow or failing
    /// device never blocks the others.
    async fn send_batch(
        &mut self,
        method: DeviceMethod,
        device_ids: &[DeviceId],
        payload: &serde_json::Value,
    ) -> DispatchOutcome {
        for id in device_ids {
            self.set_outcome(id, DeviceCommandOutcome::Pending);
        }

        let timeout = self.command_timeout;
        let port = Arc::clone(&self.port);
        let calls = device_ids.iter().map(|id| {
            let port = Arc::clone(&port);
            async move { send_one(&*port, id, method, payload, timeout).await }
        });
        let results = join_all(calls).await;

        let mut outcome = DispatchOutcome::default();
        for (id, result) in device_ids.iter().zip(results) {
            match result {
                Ok(()) => {
                    self.set_outcome(id, DeviceCommandOutcome::Success);
                    outcome.success_ids.push(id.clone());
                },
                Err(e) => {
                    tracing::warn!(device = %id, %method, error = %e, "Device command failed");
                    self.set_outcome(id, DeviceCommandOutcome::Error);
                    outcome.error_ids.push(id.clone());
                    outcome.errors.insert(id.clone(), e.to_string());
                },
            }
        }
        tracing::info!(
            %method,
            succeeded = outcome.success_ids.len(),
            failed = outcome.error_ids.len(),
            "Dispatch complete"
        );
        outcome
    }
}

async fn send_one(
    port: &dyn DeviceCommandPort,
    device_id: &DeviceId,
    method: DeviceMethod,
    payload: &serde_json::Value,
    timeout: Duration,
) -> Result<(), DeviceCommandError> {
    let call = port.send(std::slice::from_ref(device_id), method, payload);
    let results = match tokio::time::timeout(timeout, call).await {
        Ok(results) => results?,
        Err(_) => {
            return Err(DeviceCommandError::Timeout {
                device_id: device_id.clone(),
                timeout_ms: u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX),
            });
        },
    };
    match results.into_iter().find(|r| &r.device_id == device_id) {
        Some(DeviceCommandResult { success: true, .. }) => Ok(()),
        Some(DeviceCommandResult { error, .. }) => Err(DeviceCommandError::Rejected {
            device_id: device_id.clone(),
            message: error.unwrap_or_else(|| "unspecified error".to_string()),
        }),
        None => Err(DeviceCommandError::NoResponse {
            device_id: device_id.clone(),
        }),
    }
}
