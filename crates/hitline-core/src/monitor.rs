use std::collections::{BTreeMap, BTreeSet};

use crate::device::DeviceId;
use crate::session::StopReason;

/// Decides when a running session should stop on its own.
///
/// Two one-shot triggers: the duration trigger fires once the elapsed time
/// reaches the desired duration, and the goal trigger fires once every goal
/// device has stopped. A single-device roster fires the goal trigger as soon
/// as that device stops, whatever its goal. The monitor has no clock of its
/// own; the caller feeds it elapsed seconds.
#[derive(Debug, Clone, Default)]
pub struct TerminationMonitor {
    armed: bool,
    roster: Vec<DeviceId>,
    goal_devices: BTreeSet<DeviceId>,
    desired_duration_secs: Option<u64>,
    stopped: BTreeSet<DeviceId>,
    duration_fired: bool,
    goal_fired: bool,
}

impl TerminationMonitor {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start watching a session that just entered `Running`.
    pub fn arm(
        &mut self,
        roster: &[DeviceId],
        goal_shots_per_target: &BTreeMap<DeviceId, u32>,
        desired_duration_secs: Option<u64>,
    ) {
        self.disarm();
        self.roster = roster.to_vec();
        self.goal_devices = goal_shots_per_target
            .iter()
            .filter(|&(id, &goal)| goal > 0 && roster.contains(id))
            .map(|(id, _)| id.clone())
            .collect();
        self.desired_duration_secs = desired_duration_secs;
        self.armed = true;
    }

    /// Pause both triggers while a stop is in flight. Fired flags survive so
    /// a rolled-back stop does not re-fire the same trigger.
    pub fn suspend(&mut self) {
        self.armed = false;
    }

    /// Resume after a rolled-back stop.
    pub fn resume(&mut self) {
        if !self.roster.is_empty() {
            self.armed = true;
        }
    }

    /// Forget the session entirely, resetting both one-shot flags.
    pub fn disarm(&mut self) {
        *self = Self::default();
    }

    pub fn is_armed(&self) -> bool {
        self.armed
    }

    /// Feed the running elapsed-seconds counter.
    pub fn on_tick(&mut self, elapsed_secs: u64) -> Option<StopReason> {
        if !self.armed || self.duration_fired {
            return None;
        }
        let limit = self.desired_duration_secs?;
        if elapsed_secs >= limit {
            self.duration_fired = true;
            return Some(StopReason::Duration);
        }
        None
    }

    /// Add a device to the termination set.
    pub fn mark_device_stopped(&mut self, device_id: &str) -> Option<StopReason> {
        if !self.armed || !self.roster.iter().any(|id| id == device_id) {
            return None;
        }
        self.stopped.insert(device_id.to_string());
        if self.goal_fired {
            return None;
        }

        let single_device_done = self.roster.len() == 1 && self.stopped.contains(&self.roster[0]);
        let all_goals_done =
            !self.goal_devices.is_empty() && self.goal_devices.is_subset(&self.stopped);

        if single_device_done || all_goals_done {
            self.goal_fired = true;
            return Some(StopReason::Goal);
        }
        None
    }

    pub fn stopped_devices(&self) -> &BTreeSet<DeviceId> {
        &self.stopped
    }

    pub fn duration_fired(&self) -> bool {
        self.duration_fired
    }

    pub fn goal_fired(&self) -> bool {
        self.goal_fired
    }
}
