use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Instant;

use rdkafka::consumer::{BaseConsumer, ConsumerContext, Rebalance, StreamConsumer};
use rdkafka::{ClientContext, TopicPartitionList};
use tracing::{debug, error, info, warn};

use crate::kafka::rebalance_bridge::{
    DefaultRebalanceCallback, RebalanceCallback, RebalanceError, RebalancePhase,
};
use crate::kafka::types::describe_partitions;
use crate::metrics_const::{
    REBALANCE_CALLBACK_DURATION, REBALANCE_ERRORS, REBALANCE_EVENTS, REBALANCE_FAULTS_DROPPED,
    REBALANCE_LISTENER_FAILURES,
};

pub type CoordinatedStreamConsumer = StreamConsumer<CoordinatedConsumerContext>;

/// Holds the one rebalance callback a consumer runs. Only
/// `injector::install` replaces it.
pub struct RebalanceSlot {
    active: RwLock<Arc<dyn RebalanceCallback>>,
}

impl RebalanceSlot {
    fn new(initial: Arc<dyn RebalanceCallback>) -> Self {
        Self {
            active: RwLock::new(initial),
        }
    }

    /// The callback to run for the next event. The lock is released before
    /// the callback runs, so a slow callback never blocks an install.
    pub fn current(&self) -> Arc<dyn RebalanceCallback> {
        self.active
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }

    pub(crate) fn active(&self) -> &RwLock<Arc<dyn RebalanceCallback>> {
        &self.active
    }
}

/// rdkafka consumer context for coordinated consumers.
///
/// librdkafka invokes `pre_rebalance`/`post_rebalance` on the thread polling
/// the consumer, one event at a time. Revocations are routed to the active
/// callback before the partitions are given up, assignments after they are
/// taken. Callback failures cannot be returned through rdkafka, so the latest
/// one is parked here until the consumer's owner takes it.
pub struct CoordinatedConsumerContext {
    consumer_group: String,
    slot: RebalanceSlot,
    pending_fault: Mutex<Option<RebalanceError>>,
}

impl CoordinatedConsumerContext {
    pub fn new(consumer_group: impl Into<String>) -> Self {
        let consumer_group = consumer_group.into();
        let default_callback = Arc::new(DefaultRebalanceCallback::new(consumer_group.clone()));
        Self {
            consumer_group,
            slot: RebalanceSlot::new(default_callback),
            pending_fault: Mutex::new(None),
        }
    }

    pub fn consumer_group(&self) -> &str {
        &self.consumer_group
    }

    pub fn rebalance_slot(&self) -> &RebalanceSlot {
        &self.slot
    }

    /// Take the rebalance failure recorded since the last call, if any.
    pub fn take_rebalance_fault(&self) -> Option<RebalanceError> {
        self.pending_fault
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .take()
    }

    pub fn has_rebalance_fault(&self) -> bool {
        self.pending_fault
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .is_some()
    }

    fn record_fault(&self, fault: RebalanceError) {
        let mut pending = self
            .pending_fault
            .lock()
            .unwrap_or_else(PoisonError::into_inner);
        if let Some(previous) = pending.replace(fault) {
            metrics::counter!(REBALANCE_FAULTS_DROPPED).increment(1);
            warn!(
                consumer_group = %self.consumer_group,
                error = ?previous,
                "Replacing unobserved rebalance failure with a newer one"
            );
        }
    }

    fn dispatch(&self, phase: RebalancePhase, partitions: &TopicPartitionList) {
        if partitions.count() == 0 {
            debug!(
                consumer_group = %self.consumer_group,
                event_type = phase.as_str(),
                "Rebalance event carries no partitions"
            );
        } else {
            info!(
                consumer_group = %self.consumer_group,
                event_type = phase.as_str(),
                partitions = %describe_partitions(partitions),
                "Rebalance event"
            );
        }
        metrics::counter!(REBALANCE_EVENTS, "event_type" => phase.as_str()).increment(1);

        let callback = self.slot.current();
        let started = Instant::now();
        let result = match phase {
            RebalancePhase::Revoke => callback.on_partitions_revoked(partitions),
            RebalancePhase::Assign => callback.on_partitions_assigned(partitions),
        };
        metrics::histogram!(REBALANCE_CALLBACK_DURATION, "event_type" => phase.as_str())
            .record(started.elapsed().as_secs_f64());

        if let Err(e) = result {
            metrics::counter!(REBALANCE_LISTENER_FAILURES, "event_type" => phase.as_str())
                .increment(1);
            error!(
                consumer_group = %self.consumer_group,
                event_type = phase.as_str(),
                "Rebalance callback failed: {e}"
            );
            self.record_fault(e);
        }
    }
}

impl ClientContext for CoordinatedConsumerContext {}

impl ConsumerContext for CoordinatedConsumerContext {
    fn pre_rebalance(&self, _base_consumer: &BaseConsumer<Self>, rebalance: &Rebalance) {
        match rebalance {
            Rebalance::Revoke(partitions) => self.dispatch(RebalancePhase::Revoke, partitions),
            Rebalance::Assign(partitions) => {
                debug!(
                    consumer_group = %self.consumer_group,
                    "Pre-rebalance assign event for {} partitions",
                    partitions.count()
                );
            }
            Rebalance::Error(e) => {
                metrics::counter!(REBALANCE_ERRORS).increment(1);
                error!(consumer_group = %self.consumer_group, "Rebalance error: {}", e);
            }
        }
    }

    fn post_rebalance(&self, _base_consumer: &BaseConsumer<Self>, rebalance: &Rebalance) {
        match rebalance {
            Rebalance::Assign(partitions) => self.dispatch(RebalancePhase::Assign, partitions),
            Rebalance::Revoke(partitions) => {
                debug!(
                    consumer_group = %self.consumer_group,
                    "Post-rebalance revoke event for {} partitions",
                    partitions.count()
                );
            }
            Rebalance::Error(e) => {
                error!(consumer_group = %self.consumer_group, "Post-rebalance error: {}", e);
            }
        }
    }

    fn commit_callback(
        &self,
        result: rdkafka::error::KafkaResult<()>,
        offsets: &TopicPartitionList,
    ) {
        match result {
            Ok(_) => {
                debug!(
                    "Successfully committed offsets for {} partitions",
                    offsets.count()
                );
            }
            Err(e) => {
                warn!("Failed to commit offsets: {}", e);
            }
        }
    }
}
