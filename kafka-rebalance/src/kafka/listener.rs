use std::fmt;
use std::sync::{Arc, Weak};

use anyhow::Result;
use rdkafka::TopicPartitionList;

use crate::kafka::context::CoordinatedStreamConsumer;

/// Reference to the consumer a rebalance listener is attached to.
///
/// Holds a `Weak` pointer so the callback stored inside the consumer's own
/// context never keeps the consumer alive. Listeners upgrade it when they need
/// to act on the consumer (commit, seek, pause) from within a callback.
#[derive(Clone, Default)]
pub struct ConsumerHandle {
    consumer: Weak<CoordinatedStreamConsumer>,
}

impl ConsumerHandle {
    pub fn new(consumer: &Arc<CoordinatedStreamConsumer>) -> Self {
        Self {
            consumer: Arc::downgrade(consumer),
        }
    }

    /// A handle that refers to no consumer. Upgrading it always yields `None`.
    pub fn detached() -> Self {
        Self::default()
    }

    pub fn upgrade(&self) -> Option<Arc<CoordinatedStreamConsumer>> {
        self.consumer.upgrade()
    }

    pub fn is_live(&self) -> bool {
        self.consumer.strong_count() > 0
    }
}

impl fmt::Debug for ConsumerHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ConsumerHandle")
            .field("live", &self.is_live())
            .finish()
    }
}

/// User-supplied rebalance callbacks, looked up by name for a consumer group.
///
/// Both methods run inline on the consumer's poll thread, so they stall
/// consumption until they return. Returning `Err` marks the rebalance as failed
/// for this consumer: the error is surfaced once through the consumer's `recv`.
///
/// When a listener is attached to a consumer, the commit handler is NOT told
/// about revocations. Any flush of pending offsets before partitions are lost
/// is the listener's responsibility (the handle can be upgraded to commit).
pub trait KafkaConsumerRebalanceListener: Send + Sync {
    /// Called before the consumer gives up ownership of `partitions`.
    fn on_partitions_revoked(
        &self,
        consumer: &ConsumerHandle,
        partitions: &TopicPartitionList,
    ) -> Result<()>;

    /// Called after the consumer takes ownership of `partitions`, once the
    /// commit handler has started tracking them.
    fn on_partitions_assigned(
        &self,
        consumer: &ConsumerHandle,
        partitions: &TopicPartitionList,
    ) -> Result<()>;
}
