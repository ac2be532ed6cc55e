use std::collections::HashSet;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use anyhow::{bail, Result};
use rdkafka::config::ClientConfig;
use rdkafka::consumer::{BaseConsumer, CommitMode};
use rdkafka::{Offset, TopicPartitionList};

use super::commit::{CommitError, CommitHandler, OffsetCommitter};
use super::context::CoordinatedConsumerContext;
use super::listener::{ConsumerHandle, KafkaConsumerRebalanceListener};
use super::types::{partition_set, Partition};

/// Test utilities for kafka module tests
pub fn create_test_consumer(group_id: &str) -> BaseConsumer<CoordinatedConsumerContext> {
    ClientConfig::new()
        .set("bootstrap.servers", "localhost:9092")
        .set("group.id", group_id)
        .set("enable.auto.commit", "false")
        .set("auto.offset.reset", "earliest")
        .create_with_context(CoordinatedConsumerContext::new(group_id))
        .expect("Consumer creation failed")
}

pub fn test_partitions(topic: &str, partitions: &[i32]) -> TopicPartitionList {
    let mut tpl = TopicPartitionList::new();
    for partition in partitions {
        tpl.add_partition_offset(topic, *partition, Offset::Invalid)
            .unwrap();
    }
    tpl
}

/// One observed call, in the order it happened across every recorder sharing
/// a `CallLog`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Call {
    CommitAssigned(HashSet<Partition>),
    CommitRevoked(HashSet<Partition>),
    ListenerAssigned(HashSet<Partition>),
    ListenerRevoked(HashSet<Partition>),
}

pub type CallLog = Arc<Mutex<Vec<Call>>>;

pub fn new_call_log() -> CallLog {
    Arc::new(Mutex::new(Vec::new()))
}

// Test implementation of KafkaConsumerRebalanceListener that tracks calls
#[derive(Default)]
pub struct RecordingListener {
    pub assigned_count: AtomicUsize,
    pub revoked_count: AtomicUsize,
    pub fail_on_assign: AtomicBool,
    pub fail_on_revoke: AtomicBool,
    pub saw_live_consumer: AtomicBool,
    log: Option<CallLog>,
}

impl RecordingListener {
    pub fn with_log(log: CallLog) -> Self {
        Self {
            log: Some(log),
            ..Default::default()
        }
    }

    pub fn failing_on_assign(self) -> Self {
        self.fail_on_assign.store(true, Ordering::SeqCst);
        self
    }

    pub fn failing_on_revoke(self) -> Self {
        self.fail_on_revoke.store(true, Ordering::SeqCst);
        self
    }

    fn record(&self, call: Call) {
        if let Some(log) = &self.log {
            log.lock().unwrap().push(call);
        }
    }
}

impl KafkaConsumerRebalanceListener for RecordingListener {
    fn on_partitions_revoked(
        &self,
        consumer: &ConsumerHandle,
        partitions: &TopicPartitionList,
    ) -> Result<()> {
        self.revoked_count.fetch_add(1, Ordering::SeqCst);
        self.saw_live_consumer
            .store(consumer.is_live(), Ordering::SeqCst);
        self.record(Call::ListenerRevoked(partition_set(partitions)));
        if self.fail_on_revoke.load(Ordering::SeqCst) {
            bail!("listener refused revocation");
        }
        Ok(())
    }

    fn on_partitions_assigned(
        &self,
        consumer: &ConsumerHandle,
        partitions: &TopicPartitionList,
    ) -> Result<()> {
        self.assigned_count.fetch_add(1, Ordering::SeqCst);
        self.saw_live_consumer
            .store(consumer.is_live(), Ordering::SeqCst);
        self.record(Call::ListenerAssigned(partition_set(partitions)));
        if self.fail_on_assign.load(Ordering::SeqCst) {
            bail!("listener refused assignment");
        }
        Ok(())
    }
}

pub struct RecordingCommitHandler {
    log: CallLog,
}

impl RecordingCommitHandler {
    pub fn new(log: CallLog) -> Self {
        Self { log }
    }
}

impl CommitHandler for RecordingCommitHandler {
    fn name(&self) -> &'static str {
        "recording"
    }

    fn partitions_assigned(&self, partitions: &TopicPartitionList) {
        self.log
            .lock()
            .unwrap()
            .push(Call::CommitAssigned(partition_set(partitions)));
    }

    fn partitions_revoked(&self, partitions: &TopicPartitionList) {
        self.log
            .lock()
            .unwrap()
            .push(Call::CommitRevoked(partition_set(partitions)));
    }
}

#[derive(Debug)]
pub struct RecordedCommit {
    pub offsets: Vec<(Partition, i64)>,
    pub mode: CommitMode,
}

/// Records successful commits. `fail_next` makes the following commit fail
/// without being recorded. The reported assignment is whatever the test last
/// set, standing in for librdkafka's view of owned partitions.
#[derive(Default)]
pub struct RecordingCommitter {
    commits: Mutex<Vec<RecordedCommit>>,
    assignment: Mutex<HashSet<Partition>>,
    fail_next: AtomicBool,
}

impl RecordingCommitter {
    pub fn fail_next(&self) {
        self.fail_next.store(true, Ordering::SeqCst);
    }

    pub fn set_assignment(&self, partitions: &[&Partition]) {
        *self.assignment.lock().unwrap() = partitions.iter().map(|p| (*p).clone()).collect();
    }

    pub fn take_commits(&self) -> Vec<RecordedCommit> {
        std::mem::take(&mut *self.commits.lock().unwrap())
    }
}

impl OffsetCommitter for RecordingCommitter {
    fn assignment(&self) -> Result<HashSet<Partition>, CommitError> {
        Ok(self.assignment.lock().unwrap().clone())
    }

    fn commit_offsets(
        &self,
        offsets: &TopicPartitionList,
        mode: CommitMode,
    ) -> Result<(), CommitError> {
        if self.fail_next.swap(false, Ordering::SeqCst) {
            return Err(CommitError::ConsumerGone);
        }

        let mut recorded: Vec<(Partition, i64)> = offsets
            .elements()
            .into_iter()
            .map(|elem| {
                let offset = elem.offset().to_raw().unwrap_or_default();
                (Partition::from(elem), offset)
            })
            .collect();
        recorded.sort();
        self.commits.lock().unwrap().push(RecordedCommit {
            offsets: recorded,
            mode,
        });
        Ok(())
    }
}
