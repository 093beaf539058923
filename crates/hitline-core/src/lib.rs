pub mod bus;
pub mod device;
pub mod error;
pub mod history;
pub mod lifecycle;
pub mod monitor;
pub mod scoring;
pub mod session;
pub mod telemetry;
pub mod time;

#[cfg(any(test, feature = "test-helpers"))]
pub mod test_helpers {
    use std::collections::BTreeMap;

    use crate::device::DeviceId;
    use crate::session::{HitRecord, SessionParams};

    /// Device ids `target-1` .. `target-n`.
    pub fn make_device_ids(n: usize) -> Vec<DeviceId> {
        (0..n).map(|i| format!("target-{}", i + 1)).collect()
    }

    /// Build a goal map from `(device, goal)` pairs.
    pub fn goals(entries: &[(&str, u32)]) -> BTreeMap<DeviceId, u32> {
        entries
            .iter()
            .map(|&(id, goal)| (id.to_string(), goal))
            .collect()
    }

    /// Hits at `start_ms + offset` for each `(device, offset)` pair.
    pub fn hits_at(start_ms: u64, entries: &[(&str, u64)]) -> Vec<HitRecord> {
        entries
            .iter()
            .map(|&(id, offset)| HitRecord::new(id, start_ms + offset))
            .collect()
    }

    /// Parameters with a fixed game id, no goals and no time limit.
    pub fn basic_params(game_id: &str) -> SessionParams {
        SessionParams {
            game_id: Some(game_id.to_string()),
            ..SessionParams::default()
        }
    }

    /// Parameters for a single-target goal session.
    pub fn goal_params(game_id: &str, goal_entries: &[(&str, u32)]) -> SessionParams {
        SessionParams {
            game_id: Some(game_id.to_string()),
            goal_shots_per_target: goals(goal_entries),
            ..SessionParams::default()
        }
    }

    /// Parameters with a time limit in seconds.
    pub fn timed_params(game_id: &str, seconds: u64) -> SessionParams {
        SessionParams {
            game_id: Some(game_id.to_string()),
            desired_duration_seconds: Some(seconds),
            ..SessionParams::default()
        }
    }
}
