//! Offset Tracker - Tracks processed and committed offsets per owned partition
//!
//! Offsets are only tracked for partitions this consumer currently owns. A
//! partition enters the tracker on assignment, stops accepting new offsets once
//! its revocation starts, and leaves the tracker when the revocation finishes.
//! Offsets stored here are "next offset to consume" (last processed + 1), which
//! is what Kafka expects to be committed.

use std::collections::{HashMap, HashSet};

use dashmap::DashMap;
use tracing::{debug, warn};

use crate::kafka::types::{Partition, PartitionState};

#[derive(Debug, Default, Clone, Copy)]
struct TrackedPartition {
    revoking: bool,
    /// Next offset to consume (highest processed + 1)
    processed_offset: Option<i64>,
    committed_offset: Option<i64>,
}

impl TrackedPartition {
    fn pending(&self) -> Option<i64> {
        match (self.processed_offset, self.committed_offset) {
            (Some(processed), Some(committed)) if processed <= committed => None,
            (processed, _) => processed,
        }
    }
}

/// Thread-safe tracker shared between the rebalance thread and whatever
/// thread acknowledges messages.
#[derive(Default)]
pub struct OffsetTracker {
    partitions: DashMap<Partition, TrackedPartition>,
}

impl OffsetTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Start tracking a newly owned partition. Offsets from an earlier
    /// ownership are discarded: other group members may have committed past
    /// them in between.
    pub fn assign(&self, partition: &Partition) {
        if self
            .partitions
            .insert(partition.clone(), TrackedPartition::default())
            .is_some()
        {
            debug!(
                topic = partition.topic(),
                partition = partition.partition_number(),
                "Reset offset tracking for re-assigned partition"
            );
        } else {
            debug!(
                topic = partition.topic(),
                partition = partition.partition_number(),
                "Tracking offsets for assigned partition"
            );
        }
    }

    /// Stop accepting offsets for a partition that is about to be revoked.
    pub fn begin_revoke(&self, partition: &Partition) {
        if let Some(mut state) = self.partitions.get_mut(partition) {
            state.revoking = true;
        }
    }

    /// Forget a partition once its revocation is complete.
    pub fn clear_partition(&self, partition: &Partition) {
        if self.partitions.remove(partition).is_some() {
            debug!(
                topic = partition.topic(),
                partition = partition.partition_number(),
                "Cleared offset tracking for revoked partition"
            );
        }
    }

    /// Forget every tracked partition missing from `owned` and return them.
    /// Covers revocations the tracker was never told about.
    pub fn retain_owned(&self, owned: &HashSet<Partition>) -> Vec<Partition> {
        let mut released = Vec::new();
        self.partitions.retain(|partition, _| {
            let keep = owned.contains(partition);
            if !keep {
                released.push(partition.clone());
            }
            keep
        });
        released.sort();
        released
    }

    pub fn state(&self, partition: &Partition) -> PartitionState {
        match self.partitions.get(partition) {
            Some(state) if state.revoking => PartitionState::Revoked,
            Some(_) => PartitionState::Assigned,
            None => PartitionState::Unassigned,
        }
    }

    /// Record `next_offset` as processed. Returns `false` (and records
    /// nothing) unless the partition is assigned and not being revoked.
    /// Offsets never move backwards.
    pub fn mark_processed(&self, partition: &Partition, next_offset: i64) -> bool {
        let Some(mut state) = self.partitions.get_mut(partition) else {
            return false;
        };
        if state.revoking {
            return false;
        }

        match state.processed_offset {
            Some(current) if next_offset <= current => {
                warn!(
                    topic = partition.topic(),
                    partition = partition.partition_number(),
                    current_offset = current,
                    offset = next_offset,
                    "Ignoring out of order acknowledgement"
                );
            }
            _ => state.processed_offset = Some(next_offset),
        }
        true
    }

    /// Offsets processed past the last commit, for every tracked partition.
    pub fn pending_offsets(&self) -> HashMap<Partition, i64> {
        self.partitions
            .iter()
            .filter_map(|entry| entry.value().pending().map(|o| (entry.key().clone(), o)))
            .collect()
    }

    /// Like `pending_offsets`, restricted to `partitions`.
    pub fn pending_offsets_for<'a>(
        &self,
        partitions: impl IntoIterator<Item = &'a Partition>,
    ) -> HashMap<Partition, i64> {
        partitions
            .into_iter()
            .filter_map(|partition| {
                self.partitions
                    .get(partition)
                    .and_then(|state| state.pending())
                    .map(|offset| (partition.clone(), offset))
            })
            .collect()
    }

    pub fn mark_committed(&self, partition: &Partition, offset: i64) {
        if let Some(mut state) = self.partitions.get_mut(partition) {
            let advances = match state.committed_offset {
                Some(committed) => offset > committed,
                None => true,
            };
            if advances {
                state.committed_offset = Some(offset);
            }
        }
    }

    pub fn committed_offset(&self, partition: &Partition) -> Option<i64> {
        self.partitions
            .get(partition)
            .and_then(|state| state.committed_offset)
    }

    pub fn processed_offset(&self, partition: &Partition) -> Option<i64> {
        self.partitions
            .get(partition)
            .and_then(|state| state.processed_offset)
    }

    pub fn partition_count(&self) -> usize {
        self.partitions.len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_partition(num: i32) -> Partition {
        Partition::new("test-topic", num)
    }

    #[test]
    fn test_offsets_for_unassigned_partition_are_rejected() {
        let tracker = OffsetTracker::new();
        let partition = test_partition(0);

        assert!(!tracker.mark_processed(&partition, 10));
        assert_eq!(tracker.state(&partition), PartitionState::Unassigned);
        assert!(tracker.pending_offsets().is_empty());
    }

    #[test]
    fn test_partition_lifecycle() {
        let tracker = OffsetTracker::new();
        let partition = test_partition(0);

        tracker.assign(&partition);
        assert_eq!(tracker.state(&partition), PartitionState::Assigned);
        assert!(tracker.mark_processed(&partition, 5));

        tracker.begin_revoke(&partition);
        assert_eq!(tracker.state(&partition), PartitionState::Revoked);
        assert!(!tracker.mark_processed(&partition, 6));
        assert_eq!(tracker.processed_offset(&partition), Some(5));

        tracker.clear_partition(&partition);
        assert_eq!(tracker.state(&partition), PartitionState::Unassigned);
        assert_eq!(tracker.partition_count(), 0);
    }

    #[test]
    fn test_reassign_starts_fresh() {
        let tracker = OffsetTracker::new();
        let partition = test_partition(1);

        tracker.assign(&partition);
        tracker.mark_processed(&partition, 100);
        tracker.mark_committed(&partition, 90);
        tracker.begin_revoke(&partition);
        tracker.assign(&partition);

        assert_eq!(tracker.state(&partition), PartitionState::Assigned);
        assert_eq!(tracker.processed_offset(&partition), None);
        assert_eq!(tracker.committed_offset(&partition), None);
        assert!(tracker.pending_offsets().is_empty());
    }

    #[test]
    fn test_retain_owned_releases_the_rest() {
        let tracker = OffsetTracker::new();
        let (p0, p1, p2) = (test_partition(0), test_partition(1), test_partition(2));
        for p in [&p0, &p1, &p2] {
            tracker.assign(p);
            tracker.mark_processed(p, 5);
        }

        let owned: HashSet<Partition> = [p1.clone()].into_iter().collect();
        let released = tracker.retain_owned(&owned);

        assert_eq!(released, vec![p0.clone(), p2.clone()]);
        assert_eq!(tracker.state(&p0), PartitionState::Unassigned);
        assert_eq!(tracker.state(&p1), PartitionState::Assigned);
        assert!(!tracker.mark_processed(&p2, 6));
        assert_eq!(tracker.pending_offsets().len(), 1);
    }

    #[test]
    fn test_processed_offset_never_goes_backwards() {
        let tracker = OffsetTracker::new();
        let partition = test_partition(0);
        tracker.assign(&partition);

        tracker.mark_processed(&partition, 200);
        tracker.mark_processed(&partition, 150);

        assert_eq!(tracker.processed_offset(&partition), Some(200));
    }

    #[test]
    fn test_pending_offsets_exclude_committed() {
        let tracker = OffsetTracker::new();
        let (p0, p1, p2) = (test_partition(0), test_partition(1), test_partition(2));
        for p in [&p0, &p1, &p2] {
            tracker.assign(p);
        }
        tracker.mark_processed(&p0, 10);
        tracker.mark_processed(&p1, 20);

        let pending = tracker.pending_offsets();
        assert_eq!(pending.len(), 2);
        assert_eq!(pending[&p0], 10);
        assert_eq!(pending[&p1], 20);

        tracker.mark_committed(&p0, 10);
        let pending = tracker.pending_offsets();
        assert_eq!(pending.len(), 1);
        assert!(pending.contains_key(&p1));

        tracker.mark_processed(&p0, 11);
        assert_eq!(tracker.pending_offsets_for([&p0, &p2])[&p0], 11);
        assert_eq!(tracker.pending_offsets_for([&p2]).len(), 0);
    }

    #[test]
    fn test_committed_offset_only_advances() {
        let tracker = OffsetTracker::new();
        let partition = test_partition(0);
        tracker.assign(&partition);

        tracker.mark_committed(&partition, 30);
        tracker.mark_committed(&partition, 20);

        assert_eq!(tracker.committed_offset(&partition), Some(30));
    }
}
