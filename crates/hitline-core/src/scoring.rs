//! Deterministic session scoring.
//!
//! All times in a [`SessionScoreResult`] are seconds rounded to two decimals.
//! Scoring never fails: unmet goals and order violations produce a result
//! with `is_valid == false`.

use std::collections::{BTreeMap, HashMap};

use serde::{Deserialize, Serialize};

use crate::device::DeviceId;
use crate::session::HitRecord;
use crate::time::ms_to_secs;

/// Outcome of scoring one session's hit history.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionScoreResult {
    /// Final time in seconds; `None` when there is nothing to score or the
    /// run is invalid.
    pub score: Option<f64>,
    pub is_valid: bool,
    /// Per-device deltas between consecutive hits on that device.
    pub splits_by_target: BTreeMap<DeviceId, Vec<f64>>,
    /// Deltas between consecutive hits that landed on different devices.
    pub transition_times: Vec<f64>,
    /// Seconds from start at which each goal device received its last
    /// required hit, or `None` if it never did.
    pub last_required_hit_time_by_target: BTreeMap<DeviceId, Option<f64>>,
}

/// Score a hit history against per-device goals and an optional target order.
///
/// Goals of zero are treated as "no requirement". When no device has a
/// positive goal the score is the span between first and last hit (or, for a
/// single hit, the time from session start).
pub fn calculate_session_score(
    hit_history: &[HitRecord],
    goal_shots_per_target: &BTreeMap<DeviceId, u32>,
    start_time_ms: u64,
    target_order: Option<&[DeviceId]>,
) -> SessionScoreResult {
    let sorted = sorted_hits(hit_history);
    let splits_by_target = compute_splits(&sorted);
    let transition_times = compute_transitions(&sorted);

    let goals: BTreeMap<&str, u32> = goal_shots_per_target
        .iter()
        .filter(|&(_, &goal)| goal > 0)
        .map(|(id, &goal)| (id.as_str(), goal))
        .collect();

    let (score, is_valid, last_required_hit_time_by_target) = if goals.is_empty() {
        (score_without_goals(&sorted, start_time_ms), true, BTreeMap::new())
    } else {
        match target_order {
            Some(order) if order.len() > 1 => score_ordered(&sorted, &goals, start_time_ms, order),
            _ => score_unordered(&sorted, &goals, start_time_ms),
        }
    };

    SessionScoreResult {
        score,
        is_valid,
        splits_by_target,
        transition_times,
        last_required_hit_time_by_target,
    }
}

/// Fast goal check that ignores order and timing: every device with a
/// positive goal has at least that many hits.
pub fn is_run_valid(hit_history: &[HitRecord], goal_shots_per_target: &BTreeMap<DeviceId, u32>) -> bool {
    if goal_shots_per_target.values().all(|&g| g == 0) {
        return true;
    }
    let counts = hit_counts(hit_history);
    goal_shots_per_target
        .iter()
        .all(|(id, &goal)| counts.get(id).copied().unwrap_or(0) >= goal)
}

/// Number of hits recorded per device.
pub fn hit_counts(hit_history: &[HitRecord]) -> BTreeMap<DeviceId, u32> {
    let mut counts = BTreeMap::new();
    for hit in hit_history {
        *counts.entry(hit.device_id.clone()).or_insert(0) += 1;
    }
    counts
}

/// Stable sort by timestamp; equal timestamps keep arrival order.
fn sorted_hits(hit_history: &[HitRecord]) -> Vec<&HitRecord> {
    let mut sorted: Vec<&HitRecord> = hit_history.iter().collect();
    sorted.sort_by_key(|h| h.timestamp_ms);
    sorted
}

fn delta_secs(later_ms: u64, earlier_ms: u64) -> f64 {
    ms_to_secs(i128::from(later_ms) - i128::from(earlier_ms))
}

fn compute_splits(sorted: &[&HitRecord]) -> BTreeMap<DeviceId, Vec<f64>> {
    let mut last_seen: HashMap<&str, u64> = HashMap::new();
    let mut splits: BTreeMap<DeviceId, Vec<f64>> = BTreeMap::new();
    for hit in sorted {
        let entry = splits.entry(hit.device_id.clone()).or_default();
        if let Some(prev) = last_seen.insert(hit.device_id.as_str(), hit.timestamp_ms) {
            entry.push(delta_secs(hit.timestamp_ms, prev));
        }
    }
    splits
}

fn compute_transitions(sorted: &[&HitRecord]) -> Vec<f64> {
    sorted
        .windows(2)
        .filter(|pair| pair[0].device_id != pair[1].device_id)
        .map(|pair| delta_secs(pair[1].timestamp_ms, pair[0].timestamp_ms))
        .collect()
}

fn score_without_goals(sorted: &[&HitRecord], start_time_ms: u64) -> Option<f64> {
    match sorted {
        [] => None,
        [only] => Some(delta_secs(only.timestamp_ms, start_time_ms)),
        [first, .., last] => Some(delta_secs(last.timestamp_ms, first.timestamp_ms)),
    }
}

type GoalScore = (Option<f64>, bool, BTreeMap<DeviceId, Option<f64>>);

fn max_recorded(times: &BTreeMap<DeviceId, Option<f64>>) -> Option<f64> {
    times.values().flatten().copied().reduce(f64::max)
}

fn score_unordered(sorted: &[&HitRecord], goals: &BTreeMap<&str, u32>, start_time_ms: u64) -> GoalScore {
    let mut is_valid = true;
    let mut times = BTreeMap::new();

    for (&device_id, &required) in goals {
        let kth = sorted
            .iter()
            .filter(|h| h.device_id == device_id)
            .nth(required as usize - 1);
        match kth {
            Some(hit) => {
                times.insert(
                    device_id.to_string(),
                    Some(delta_secs(hit.timestamp_ms, start_time_ms)),
                );
            },
            None => {
                times.insert(device_id.to_string(), None);
                is_valid = false;
            },
        }
    }

    let score = if is_valid { max_recorded(&times) } else { None };
    (score, is_valid, times)
}

fn score_ordered(
    sorted: &[&HitRecord],
    goals: &BTreeMap<&str, u32>,
    start_time_ms: u64,
    order: &[DeviceId],
) -> GoalScore {
    let goal_of = |idx: usize| goals.get(order[idx].as_str()).copied().unwrap_or(0);
    let position: HashMap<&str, usize> = order
        .iter()
        .enumerate()
        .map(|(i, id)| (id.as_str(), i))
        .collect();

    let mut is_valid = true;
    let mut times: BTreeMap<DeviceId, Option<f64>> = BTreeMap::new();
    let mut current = 0usize;
    let mut hits_on_current = 0u32;

    for hit in sorted {
        // Hits on devices outside the order are ignored.
        let Some(&idx) = position.get(hit.device_id.as_str()) else {
            continue;
        };

        if idx < current {
            is_valid = false;
            break;
        }

        if idx > current {
            if hits_on_current < goal_of(current) {
                is_valid = false;
                break;
            }
            // Skipped targets are never revisited, even if hit later.
            for skipped in current + 1..idx {
                if goal_of(skipped) > 0 {
                    times.insert(order[skipped].clone(), None);
                    is_valid = false;
                }
            }
            current = idx;
            hits_on_current = 0;
        }

        hits_on_current += 1;
        let goal = goal_of(current);
        if goal > 0 && hits_on_current == goal {
            times.insert(
                order[current].clone(),
                Some(delta_secs(hit.timestamp_ms, start_time_ms)),
            );
        }
    }

    for idx in 0..order.len() {
        if goal_of(idx) == 0 {
            continue;
        }
        let reached = times.get(&order[idx]).is_some_and(Option::is_some);
        if !reached {
            times.insert(order[idx].clone(), None);
            is_valid = false;
        }
    }

    let score = if is_valid { max_recorded(&times) } else { None };
    (score, is_valid, times)
}
