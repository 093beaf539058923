use std::collections::BTreeMap;

use crate::device::DeviceId;
use crate::scoring::{SessionScoreResult, calculate_session_score};
use crate::session::HitRecord;

/// Append-only hit buffer for the running session.
#[derive(Debug, Clone, Default)]
pub struct HitAggregator {
    hits: Vec<HitRecord>,
    counts: BTreeMap<DeviceId, u32>,
}

impl HitAggregator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a hit and return the new hit count for its device.
    pub fn record(&mut self, hit: HitRecord) -> u32 {
        let count = self.counts.entry(hit.device_id.clone()).or_insert(0);
        *count += 1;
        let count = *count;
        self.hits.push(hit);
        count
    }

    pub fn counts(&self) -> &BTreeMap<DeviceId, u32> {
        &self.counts
    }

    pub fn len(&self) -> usize {
        self.hits.len()
    }

    pub fn is_empty(&self) -> bool {
        self.hits.is_empty()
    }

    pub fn hits(&self) -> &[HitRecord] {
        &self.hits
    }

    /// Owned copy of the history, taken at finalize time.
    pub fn snapshot(&self) -> Vec<HitRecord> {
        self.hits.clone()
    }

    /// Score the hits collected so far.
    pub fn live_splits(
        &self,
        goal_shots_per_target: &BTreeMap<DeviceId, u32>,
        start_time_ms: u64,
        target_order: Option<&[DeviceId]>,
    ) -> SessionScoreResult {
        calculate_session_score(&self.hits, goal_shots_per_target, start_time_ms, target_order)
    }

    pub fn clear(&mut self) {
        self.hits.clear();
        self.counts.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn record_tracks_counts() {
        let mut agg = HitAggregator::new();
        assert_eq!(agg.record(HitRecord::new("a", 10)), 1);
        assert_eq!(agg.record(HitRecord::new("a", 20)), 2);
        assert_eq!(agg.record(HitRecord::new("b", 30)), 1);
        assert_eq!(agg.counts()["a"], 2);
        assert!(!agg.counts().contains_key("missing"));
        assert_eq!(agg.len(), 3);
    }

    #[test]
    fn snapshot_is_independent_of_later_hits() {
        let mut agg = HitAggregator::new();
        agg.record(HitRecord::new("a", 10));
        let snap = agg.snapshot();
        agg.record(HitRecord::new("a", 20));
        assert_eq!(snap.len(), 1);
        assert_eq!(agg.len(), 2);
    }

    #[test]
    fn live_splits_scores_current_buffer() {
        let mut agg = HitAggregator::new();
        agg.record(HitRecord::new("a", 1_000));
        agg.record(HitRecord::new("a", 1_400));
        let result = agg.live_splits(&BTreeMap::new(), 0, None);
        assert_eq!(result.splits_by_target["a"], vec![0.4]);
        assert_eq!(result.score, Some(0.4));
    }

    #[test]
    fn clear_resets_everything() {
        let mut agg = HitAggregator::new();
        agg.record(HitRecord::new("a", 10));
        agg.clear();
        assert!(agg.is_empty());
        assert!(agg.counts().is_empty());
    }
}
