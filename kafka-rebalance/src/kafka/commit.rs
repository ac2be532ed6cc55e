//! Commit handlers: offset bookkeeping that has to follow partition ownership.
//!
//! The rebalance bridge notifies the active handler when partitions are
//! assigned (always) and revoked (only when no user listener is attached).
//! Handlers never fail outward; commit errors are logged and counted.
//!
//! Because a listener can hide a revocation from the handler, periodic commits
//! check the consumer's current assignment and drop any tracked partition that
//! is no longer owned.

use std::collections::HashSet;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

use rdkafka::consumer::{CommitMode, Consumer};
use rdkafka::error::KafkaError;
use rdkafka::{Offset, TopicPartitionList};
use thiserror::Error;
use tracing::{debug, error, info, warn};

use crate::kafka::listener::ConsumerHandle;
use crate::kafka::offset_tracker::OffsetTracker;
use crate::kafka::types::{partition_set, Partition};
use crate::metrics_const::{
    ACKNOWLEDGEMENTS_DROPPED, OFFSET_COMMITS, TRACKED_PARTITIONS, UNOWNED_PARTITIONS_RELEASED,
};

pub trait CommitHandler: Send + Sync {
    fn name(&self) -> &'static str;

    /// Start bookkeeping for newly owned partitions. Runs before any user
    /// listener sees the assignment.
    fn partitions_assigned(&self, partitions: &TopicPartitionList);

    /// Flush and forget partitions that are about to be lost.
    fn partitions_revoked(&self, partitions: &TopicPartitionList);

    /// Record that the message at `offset` has been processed.
    fn acknowledge(&self, _partition: &Partition, _offset: i64) {}

    /// Commit whatever has been acknowledged since the last commit.
    fn commit(&self) {}
}

#[derive(Error, Debug)]
pub enum CommitError {
    #[error("Consumer is no longer available")]
    ConsumerGone,
    #[error("Kafka commit failed: {0}")]
    Kafka(#[from] KafkaError),
}

/// Where committed offsets go. The consumer handle in production; a recorder
/// in tests.
pub trait OffsetCommitter: Send + Sync {
    /// Partitions the consumer owns right now.
    fn assignment(&self) -> Result<HashSet<Partition>, CommitError>;

    fn commit_offsets(&self, offsets: &TopicPartitionList, mode: CommitMode)
        -> Result<(), CommitError>;
}

impl OffsetCommitter for ConsumerHandle {
    fn assignment(&self) -> Result<HashSet<Partition>, CommitError> {
        let consumer = self.upgrade().ok_or(CommitError::ConsumerGone)?;
        Ok(partition_set(&consumer.assignment()?))
    }

    fn commit_offsets(
        &self,
        offsets: &TopicPartitionList,
        mode: CommitMode,
    ) -> Result<(), CommitError> {
        let consumer = self.upgrade().ok_or(CommitError::ConsumerGone)?;
        consumer.commit(offsets, mode)?;
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommitStrategy {
    /// Offsets are left to librdkafka's auto commit.
    Ignore,
    /// Commit the latest acknowledged offset per partition.
    Latest,
}

#[derive(Error, Debug, PartialEq, Eq)]
#[error("Unknown commit strategy `{0}`, expected `ignore` or `latest`")]
pub struct CommitStrategyError(String);

impl CommitStrategy {
    pub fn default_for(auto_commit: bool) -> Self {
        if auto_commit {
            Self::Ignore
        } else {
            Self::Latest
        }
    }

    pub fn build(self, committer: Arc<dyn OffsetCommitter>) -> Arc<dyn CommitHandler> {
        match self {
            Self::Ignore => Arc::new(IgnoreCommitHandler),
            Self::Latest => Arc::new(LatestCommitHandler::new(committer)),
        }
    }
}

impl FromStr for CommitStrategy {
    type Err = CommitStrategyError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "ignore" => Ok(Self::Ignore),
            "latest" => Ok(Self::Latest),
            _ => Err(CommitStrategyError(s.to_string())),
        }
    }
}

impl fmt::Display for CommitStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Ignore => write!(f, "ignore"),
            Self::Latest => write!(f, "latest"),
        }
    }
}

pub struct IgnoreCommitHandler;

impl CommitHandler for IgnoreCommitHandler {
    fn name(&self) -> &'static str {
        "ignore"
    }

    fn partitions_assigned(&self, _partitions: &TopicPartitionList) {}

    fn partitions_revoked(&self, _partitions: &TopicPartitionList) {}
}

pub struct LatestCommitHandler {
    tracker: OffsetTracker,
    committer: Arc<dyn OffsetCommitter>,
}

impl LatestCommitHandler {
    pub fn new(committer: Arc<dyn OffsetCommitter>) -> Self {
        Self {
            tracker: OffsetTracker::new(),
            committer,
        }
    }

    pub fn tracker(&self) -> &OffsetTracker {
        &self.tracker
    }

    fn commit_pending(
        &self,
        pending: impl IntoIterator<Item = (Partition, i64)>,
        mode: CommitMode,
    ) {
        let pending: Vec<(Partition, i64)> = pending.into_iter().collect();
        if pending.is_empty() {
            return;
        }

        let mut tpl = TopicPartitionList::new();
        for (partition, offset) in &pending {
            if let Err(e) = tpl.add_partition_offset(
                partition.topic(),
                partition.partition_number(),
                Offset::Offset(*offset),
            ) {
                error!(%partition, offset, error = ?e, "Failed to build offset commit list");
                return;
            }
        }

        let mode_label = match mode {
            CommitMode::Sync => "sync",
            CommitMode::Async => "async",
        };
        match self.committer.commit_offsets(&tpl, mode) {
            Ok(()) => {
                for (partition, offset) in &pending {
                    self.tracker.mark_committed(partition, *offset);
                }
                metrics::counter!(OFFSET_COMMITS, "mode" => mode_label, "status" => "success")
                    .increment(1);
                debug!(partitions = pending.len(), mode = mode_label, "Committed offsets");
            }
            Err(e) => {
                metrics::counter!(OFFSET_COMMITS, "mode" => mode_label, "status" => "failure")
                    .increment(1);
                error!(
                    partitions = pending.len(),
                    mode = mode_label,
                    "Failed to commit offsets: {e:#}"
                );
            }
        }
    }
}

impl CommitHandler for LatestCommitHandler {
    fn name(&self) -> &'static str {
        "latest"
    }

    fn partitions_assigned(&self, partitions: &TopicPartitionList) {
        for partition in partition_set(partitions) {
            self.tracker.assign(&partition);
        }
        metrics::gauge!(TRACKED_PARTITIONS).set(self.tracker.partition_count() as f64);
    }

    fn partitions_revoked(&self, partitions: &TopicPartitionList) {
        let revoked = partition_set(partitions);
        for partition in &revoked {
            self.tracker.begin_revoke(partition);
        }

        let pending = self.tracker.pending_offsets_for(&revoked);
        if !pending.is_empty() {
            info!(
                partitions = pending.len(),
                "Committing pending offsets before revocation"
            );
        }
        self.commit_pending(pending, CommitMode::Sync);

        for partition in &revoked {
            self.tracker.clear_partition(partition);
        }
        metrics::gauge!(TRACKED_PARTITIONS).set(self.tracker.partition_count() as f64);
    }

    fn acknowledge(&self, partition: &Partition, offset: i64) {
        if !self.tracker.mark_processed(partition, offset + 1) {
            metrics::counter!(ACKNOWLEDGEMENTS_DROPPED).increment(1);
            debug!(
                %partition,
                offset, "Dropping acknowledgement for partition not owned by this consumer"
            );
        }
    }

    fn commit(&self) {
        let owned = match self.committer.assignment() {
            Ok(owned) => owned,
            Err(e) => {
                error!("Skipping offset commit, current assignment unavailable: {e}");
                return;
            }
        };

        let released = self.tracker.retain_owned(&owned);
        if !released.is_empty() {
            metrics::counter!(UNOWNED_PARTITIONS_RELEASED).increment(released.len() as u64);
            warn!(
                partitions = ?released,
                "Dropping offsets for partitions revoked without notifying the commit handler"
            );
            metrics::gauge!(TRACKED_PARTITIONS).set(self.tracker.partition_count() as f64);
        }

        self.commit_pending(self.tracker.pending_offsets(), CommitMode::Async);
    }
}
