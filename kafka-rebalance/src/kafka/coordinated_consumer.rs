use std::sync::Arc;

use rdkafka::config::ClientConfig;
use rdkafka::consumer::Consumer;
use rdkafka::error::KafkaError;
use rdkafka::message::{BorrowedMessage, Message};
use thiserror::Error;
use tracing::{info, warn};

use crate::kafka::channel::ChannelConfig;
use crate::kafka::commit::{CommitHandler, CommitStrategy};
use crate::kafka::context::{CoordinatedConsumerContext, CoordinatedStreamConsumer};
use crate::kafka::injector::{install, InjectionError};
use crate::kafka::listener::ConsumerHandle;
use crate::kafka::listener_registry::{resolve, ListenerLookup, ListenerResolutionError};
use crate::kafka::rebalance_bridge::{build_callback, RebalanceError};
use crate::kafka::types::Partition;

/// Failures that stop a coordinated consumer from starting.
#[derive(Error, Debug)]
pub enum CoordinationError {
    #[error(transparent)]
    ListenerResolution(#[from] ListenerResolutionError),
    #[error(transparent)]
    Injection(#[from] InjectionError),
    #[error("Channel `{0}` has no topics to subscribe to")]
    NoTopics(String),
    #[error("Failed to create Kafka consumer: {0}")]
    Create(#[source] KafkaError),
    #[error("Failed to subscribe to topics {topics:?}: {source}")]
    Subscribe {
        topics: Vec<String>,
        #[source]
        source: KafkaError,
    },
}

#[derive(Error, Debug)]
pub enum ConsumerError {
    #[error(transparent)]
    Rebalance(#[from] RebalanceError),
    #[error("Kafka error: {0}")]
    Kafka(#[from] KafkaError),
}

/// A stream consumer whose rebalance events are routed through the commit
/// handler and the rebalance listener resolved for its consumer group.
pub struct CoordinatedConsumer {
    consumer: Arc<CoordinatedStreamConsumer>,
    commit_handler: Arc<dyn CommitHandler>,
    channel: ChannelConfig,
}

impl CoordinatedConsumer {
    pub fn new(
        client_config: &ClientConfig,
        channel: ChannelConfig,
        listeners: &dyn ListenerLookup,
        commit_strategy: CommitStrategy,
    ) -> Result<Self, CoordinationError> {
        Self::with_commit_handler(client_config, channel, listeners, |handle| {
            commit_strategy.build(Arc::new(handle))
        })
    }

    /// Build the consumer with a custom commit handler. `commit_handler` is
    /// called once, with a handle to the freshly created consumer.
    pub fn with_commit_handler(
        client_config: &ClientConfig,
        channel: ChannelConfig,
        listeners: &dyn ListenerLookup,
        commit_handler: impl FnOnce(ConsumerHandle) -> Arc<dyn CommitHandler>,
    ) -> Result<Self, CoordinationError> {
        if channel.topics().is_empty() {
            return Err(CoordinationError::NoTopics(channel.channel().to_string()));
        }
        let consumer_group = channel.consumer_group().to_string();

        let mut client_config = client_config.clone();
        client_config.set("group.id", &consumer_group);

        // The context starts out with the default callback; the bridge can
        // only be built once the consumer exists.
        let consumer: CoordinatedStreamConsumer = client_config
            .create_with_context(CoordinatedConsumerContext::new(consumer_group.as_str()))
            .map_err(CoordinationError::Create)?;
        let consumer = Arc::new(consumer);
        let handle = ConsumerHandle::new(&consumer);

        let commit_handler = commit_handler(handle.clone());
        let listener = resolve(&channel, &consumer_group, listeners)?;
        let callback = build_callback(listener, commit_handler.clone(), &consumer_group, handle);
        install(consumer.as_ref(), callback)?;

        let topics: Vec<&str> = channel.topics().iter().map(String::as_str).collect();
        consumer
            .subscribe(&topics)
            .map_err(|source| CoordinationError::Subscribe {
                topics: channel.topics().to_vec(),
                source,
            })?;

        info!(
            channel = channel.channel(),
            consumer_group = %consumer_group,
            topics = ?channel.topics(),
            commit_handler = commit_handler.name(),
            "Coordinated consumer started"
        );

        Ok(Self {
            consumer,
            commit_handler,
            channel,
        })
    }

    /// Receive the next message. A rebalance failure recorded since the last
    /// call is returned instead, once.
    pub async fn recv(&self) -> Result<BorrowedMessage<'_>, ConsumerError> {
        self.check_rebalance()?;
        let message = self.consumer.recv().await?;
        self.check_rebalance()?;
        Ok(message)
    }

    pub fn take_rebalance_fault(&self) -> Option<RebalanceError> {
        self.consumer.context().take_rebalance_fault()
    }

    fn check_rebalance(&self) -> Result<(), RebalanceError> {
        match self.take_rebalance_fault() {
            Some(fault) => Err(fault),
            None => Ok(()),
        }
    }

    /// Mark `message` as processed for the commit handler.
    pub fn acknowledge<M: Message>(&self, message: &M) {
        self.commit_handler.acknowledge(
            &Partition::new(message.topic(), message.partition()),
            message.offset(),
        );
    }

    pub fn commit(&self) {
        self.commit_handler.commit();
    }

    /// Final commit, then leave the group.
    pub fn shutdown(self) {
        self.commit_handler.commit();
        self.consumer.unsubscribe();
        if let Some(fault) = self.take_rebalance_fault() {
            warn!(
                channel = self.channel.channel(),
                "Rebalance failure pending at shutdown: {fault}"
            );
        }
        info!(channel = self.channel.channel(), "Coordinated consumer stopped");
    }

    pub fn handle(&self) -> ConsumerHandle {
        ConsumerHandle::new(&self.consumer)
    }

    pub fn context(&self) -> &CoordinatedConsumerContext {
        self.consumer.context()
    }

    pub fn channel(&self) -> &ChannelConfig {
        &self.channel
    }

    pub fn consumer_group(&self) -> &str {
        self.channel.consumer_group()
    }

    pub fn commit_handler(&self) -> &Arc<dyn CommitHandler> {
        &self.commit_handler
    }
}
