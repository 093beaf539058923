//! In-process stand-in for a fleet of networked targets.
//!
//! Serves as both the device command port and the device registry when no
//! hardware is attached, and drives the test suites.

use std::collections::BTreeMap;
use std::sync::{Mutex, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use rand::Rng;

use hitline_core::device::{DeviceCommandResult, DeviceId, DeviceInfo, DeviceMethod};
use hitline_core::error::DeviceCommandError;

use crate::config::SimulatedDeviceConfig;
use crate::ports::{DeviceCommandPort, DeviceRegistry};

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SimulatedDevice {
    pub id: DeviceId,
    pub name: String,
    pub online: bool,
    pub fail_start: bool,
    pub fail_stop: bool,
    pub latency_ms: u64,
}

impl SimulatedDevice {
    pub fn new(id: impl Into<DeviceId>) -> Self {
        let id = id.into();
        Self {
            name: id.clone(),
            id,
            online: true,
            fail_start: false,
            fail_stop: false,
            latency_ms: 0,
        }
    }

    pub fn offline(mut self) -> Self {
        self.online = false;
        self
    }

    pub fn failing_start(mut self) -> Self {
        self.fail_start = true;
        self
    }

    pub fn failing_stop(mut self) -> Self {
        self.fail_stop = true;
        self
    }

    pub fn with_latency_ms(mut self, latency_ms: u64) -> Self {
        self.latency_ms = latency_ms;
        self
    }
}

impl From<&SimulatedDeviceConfig> for SimulatedDevice {
    fn from(cfg: &SimulatedDeviceConfig) -> Self {
        Self {
            id: cfg.id.clone(),
            name: cfg.name.clone().unwrap_or_else(|| cfg.id.clone()),
            online: cfg.online,
            fail_start: cfg.fail_start,
            fail_stop: cfg.fail_stop,
            latency_ms: cfg.latency_ms,
        }
    }
}

#[derive(Default)]
pub struct SimulatedFleet {
    devices: Mutex<BTreeMap<DeviceId, SimulatedDevice>>,
    calls: Mutex<Vec<(DeviceId, DeviceMethod)>>,
    jitter_ms: u64,
}

impl SimulatedFleet {
    pub fn new(devices: Vec<SimulatedDevice>) -> Self {
        Self {
            devices: Mutex::new(devices.into_iter().map(|d| (d.id.clone(), d)).collect()),
            calls: Mutex::new(Vec::new()),
            jitter_ms: 0,
        }
    }

    pub fn from_config(devices: &[SimulatedDeviceConfig]) -> Self {
        Self::new(devices.iter().map(SimulatedDevice::from).collect())
    }

    /// Add up to `jitter_ms` of random latency to every command.
    pub fn with_jitter_ms(mut self, jitter_ms: u64) -> Self {
        self.jitter_ms = jitter_ms;
        self
    }

    pub fn len(&self) -> usize {
        self.devices
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn update(&self, device_id: &str, f: impl FnOnce(&mut SimulatedDevice)) {
        let mut devices = self.devices.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(device) = devices.get_mut(device_id) {
            f(device);
        }
    }

    pub fn set_online(&self, device_id: &str, online: bool) {
        self.update(device_id, |d| d.online = online);
    }

    pub fn set_fail_start(&self, device_id: &str, fail: bool) {
        self.update(device_id, |d| d.fail_start = fail);
    }

    pub fn set_fail_stop(&self, device_id: &str, fail: bool) {
        self.update(device_id, |d| d.fail_stop = fail);
    }

    /// Every command a device has received, oldest first.
    pub fn calls_for(&self, device_id: &str) -> Vec<DeviceMethod> {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|(id, _)| id == device_id)
            .map(|&(_, method)| method)
            .collect()
    }

    pub fn call_count(&self, method: DeviceMethod) -> usize {
        self.calls
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .iter()
            .filter(|&&(_, m)| m == method)
            .count()
    }

    fn answer(&self, device_id: &DeviceId, method: DeviceMethod) -> DeviceCommandResult {
        let device = {
            let devices = self.devices.lock().unwrap_or_else(PoisonError::into_inner);
            devices.get(device_id).cloned()
        };
        let Some(device) = device else {
            return DeviceCommandResult::failed(device_id.clone(), "unknown device");
        };
        if !device.online {
            return DeviceCommandResult::failed(device_id.clone(), "device offline");
        }
        let failing = match method {
            DeviceMethod::Start => device.fail_start,
            DeviceMethod::Stop => device.fail_stop,
        };
        if failing {
            return DeviceCommandResult::failed(device_id.clone(), format!("{method} refused"));
        }
        DeviceCommandResult::ok(device_id.clone())
    }

    fn latency_for(&self, device_ids: &[DeviceId]) -> Duration {
        let base = {
            let devices = self.devices.lock().unwrap_or_else(PoisonError::into_inner);
            device_ids
                .iter()
                .filter_map(|id| devices.get(id))
                .map(|d| d.latency_ms)
                .max()
                .unwrap_or(0)
        };
        let jitter = if self.jitter_ms > 0 {
            rand::rng().random_range(0..=self.jitter_ms)
        } else {
            0
        };
        Duration::from_millis(base + jitter)
    }
}

#[async_trait]
impl DeviceCommandPort for SimulatedFleet {
    async fn send(
        &self,
        device_ids: &[DeviceId],
        method: DeviceMethod,
        _params: &serde_json::Value,
    ) -> Result<Vec<DeviceCommandResult>, DeviceCommandError> {
        let latency = self.latency_for(device_ids);
        if !latency.is_zero() {
            tokio::time::sleep(latency).await;
        }
        {
            let mut calls = self.calls.lock().unwrap_or_else(PoisonError::into_inner);
            calls.extend(device_ids.iter().map(|id| (id.clone(), method)));
        }
        let results = device_ids.iter().map(|id| self.answer(id, method)).collect();
        tracing::debug!(?device_ids, %method, "Simulated fleet handled command");
        Ok(results)
    }
}

#[async_trait]
impl DeviceRegistry for SimulatedFleet {
    async fn resolve(&self, device_ids: &[DeviceId]) -> Vec<DeviceInfo> {
        let devices = self.devices.lock().unwrap_or_else(PoisonError::into_inner);
        device_ids
            .iter()
            .filter_map(|id| devices.get(id))
            .map(|d| DeviceInfo {
                id: d.id.clone(),
                name: d.name.clone(),
                online: d.online,
            })
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn answers_each_device_independently() {
        let fleet = SimulatedFleet::new(vec![
            SimulatedDevice::new("a"),
            SimulatedDevice::new("b").failing_start(),
            SimulatedDevice::new("c").offline(),
        ]);
        let ids: Vec<DeviceId> = vec!["a".into(), "b".into(), "c".into(), "ghost".into()];
        let results = fleet
            .send(&ids, DeviceMethod::Start, &serde_json::Value::Null)
            .await
            .unwrap();
        assert!(results[0].success);
        assert_eq!(results[1].error.as_deref(), Some("start refused"));
        assert_eq!(results[2].error.as_deref(), Some("device offline"));
        assert_eq!(results[3].error.as_deref(), Some("unknown device"));
        assert_eq!(fleet.call_count(DeviceMethod::Start), 4);
    }

    #[tokio::test]
    async fn registry_omits_unknown_devices() {
        let fleet = SimulatedFleet::new(vec![SimulatedDevice::new("a").offline()]);
        let infos = fleet.resolve(&["a".to_string(), "zz".to_string()]).await;
        assert_eq!(infos.len(), 1);
        assert!(!infos[0].online);

        fleet.set_online("a", true);
        let infos = fleet.resolve(&["a".to_string()]).await;
        assert!(infos[0].online);
    }

    #[tokio::test(start_paused = true)]
    async fn latency_delays_the_answer() {
        let fleet = SimulatedFleet::new(vec![SimulatedDevice::new("a").with_latency_ms(300)]);
        let started = tokio::time::Instant::now();
        fleet
            .send(&["a".to_string()], DeviceMethod::Stop, &serde_json::Value::Null)
            .await
            .unwrap();
        assert!(started.elapsed() >= Duration::from_millis(300));
    }

    #[tokio::test(start_paused = true)]
    async fn jitter_stays_within_bounds() {
        let fleet = SimulatedFleet::new(vec![SimulatedDevice::new("a").with_latency_ms(100)])
            .with_jitter_ms(50);
        let ids = ["a".to_string()];
        for _ in 0..20 {
            let started = tokio::time::Instant::now();
            fleet
                .send(&ids, DeviceMethod::Start, &serde_json::Value::Null)
                .await
                .unwrap();
            let elapsed = started.elapsed();
            assert!(elapsed >= Duration::from_millis(100), "{elapsed:?}");
            assert!(elapsed <= Duration::from_millis(150), "{elapsed:?}");
        }
        assert_eq!(fleet.call_count(DeviceMethod::Start), 20);
    }

    #[tokio::test]
    async fn stop_failures_can_be_toggled() {
        let fleet = SimulatedFleet::new(vec![SimulatedDevice::new("a")]);
        let ids = ["a".to_string()];
        fleet.set_fail_stop("a", true);
        let results = fleet
            .send(&ids, DeviceMethod::Stop, &serde_json::Value::Null)
            .await
            .unwrap();
        assert_eq!(results[0].error.as_deref(), Some("stop refused"));

        fleet.set_fail_stop("a", false);
        let results = fleet
            .send(&ids, DeviceMethod::Stop, &serde_json::Value::Null)
            .await
            .unwrap();
        assert!(results[0].success);
    }

    #[test]
    fn builds_from_config() {
        let cfg = SimulatedDeviceConfig {
            id: "lane-1".into(),
            name: Some("Lane 1".into()),
            online: true,
            fail_start: true,
            fail_stop: true,
            latency_ms: 25,
        };
        let device = SimulatedDevice::from(&cfg);
        assert_eq!(device.name, "Lane 1");
        assert!(device.fail_start);
        assert!(device.fail_stop);
        assert_eq!(device.latency_ms, 25);
    }
}
