use std::sync::Arc;

use anyhow::{Context, Result};
use rdkafka::error::KafkaError;
use rdkafka::message::Message;
use rdkafka::TopicPartitionList;
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use kafka_rebalance::config::Config;
use kafka_rebalance::kafka::types::describe_partitions;
use kafka_rebalance::kafka::{
    ChannelConfig, ConsumerError, ConsumerHandle, CoordinatedConsumer,
    KafkaConsumerRebalanceListener, NamedListeners,
};

/// Registered under the consumer group, and under `REBALANCE_LISTENER_NAME`
/// when that is set.
///
/// While it is attached the commit handler does not see revocations, so
/// offsets acknowledged since the last periodic commit are not flushed
/// before partitions move.
struct LoggingRebalanceListener;

impl KafkaConsumerRebalanceListener for LoggingRebalanceListener {
    fn on_partitions_revoked(
        &self,
        consumer: &ConsumerHandle,
        partitions: &TopicPartitionList,
    ) -> Result<()> {
        info!(
            live = consumer.is_live(),
            partitions = %describe_partitions(partitions),
            "Partitions revoked"
        );
        Ok(())
    }

    fn on_partitions_assigned(
        &self,
        consumer: &ConsumerHandle,
        partitions: &TopicPartitionList,
    ) -> Result<()> {
        info!(
            live = consumer.is_live(),
            partitions = %describe_partitions(partitions),
            "Partitions assigned"
        );
        Ok(())
    }
}

fn demo_listeners(channel: &ChannelConfig) -> NamedListeners {
    let listener: Arc<dyn KafkaConsumerRebalanceListener> = Arc::new(LoggingRebalanceListener);
    let mut listeners = NamedListeners::new();
    listeners.register(channel.consumer_group(), listener.clone());
    if let Some(name) = channel.rebalance_listener_name() {
        if name != channel.consumer_group() {
            listeners.register(name, listener);
        }
    }
    listeners
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    info!("Starting Kafka rebalance coordination consumer");

    let config = Config::init_with_defaults()
        .context("Failed to load configuration from environment variables")?;
    info!("Configuration loaded: {:?}", config);

    let channel = config.to_channel_config();
    let client_config = config.to_client_config(&channel);
    let commit_strategy = config
        .commit_strategy()
        .context("Invalid COMMIT_STRATEGY")?;

    let listeners = demo_listeners(&channel);

    let consumer = CoordinatedConsumer::new(&client_config, channel, &listeners, commit_strategy)
        .context("Failed to start coordinated consumer")?;

    let mut commit_interval = tokio::time::interval(config.commit_interval());
    let shutdown = tokio::signal::ctrl_c();
    tokio::pin!(shutdown);

    let result = loop {
        tokio::select! {
            _ = &mut shutdown => {
                info!("Shutdown signal received, starting graceful shutdown");
                break Ok(());
            }

            _ = commit_interval.tick() => {
                consumer.commit();
            }

            received = consumer.recv() => match received {
                Ok(message) => {
                    debug!(
                        topic = message.topic(),
                        partition = message.partition(),
                        offset = message.offset(),
                        "Received message"
                    );
                    consumer.acknowledge(&message);
                }
                Err(ConsumerError::Rebalance(e)) => {
                    break Err(
                        anyhow::Error::new(e).context("Consumer can no longer honor its assignment")
                    );
                }
                Err(ConsumerError::Kafka(e @ KafkaError::MessageConsumptionFatal(_))) => {
                    break Err(anyhow::Error::new(e).context("Fatal Kafka consumer error"));
                }
                Err(ConsumerError::Kafka(e)) => {
                    warn!("Kafka consumer error: {e}");
                }
            }
        }
    };

    consumer.shutdown();
    info!("Graceful shutdown completed");

    result
}

#[cfg(test)]
mod tests {
    use super::*;
    use kafka_rebalance::kafka::resolve;

    fn channel(group: Option<&str>, listener_name: Option<&str>) -> ChannelConfig {
        ChannelConfig::new("events", vec!["events".into()], group.map(String::from))
            .with_rebalance_listener_name(listener_name.map(String::from))
    }

    #[test]
    fn test_listener_found_by_group() {
        let channel = channel(Some("g1"), None);
        let listeners = demo_listeners(&channel);

        let resolved = resolve(&channel, channel.consumer_group(), &listeners).unwrap();
        assert!(resolved.is_some());
    }

    #[test]
    fn test_listener_found_by_configured_name() {
        let channel = channel(None, Some("audit"));
        let listeners = demo_listeners(&channel);

        assert_eq!(listeners.len(), 2);
        let resolved = resolve(&channel, channel.consumer_group(), &listeners).unwrap();
        assert!(resolved.is_some());
    }

    #[test]
    fn test_name_matching_group_is_registered_once() {
        let channel = channel(Some("g1"), Some("g1"));
        let listeners = demo_listeners(&channel);

        assert_eq!(listeners.len(), 1);
        assert!(resolve(&channel, "g1", &listeners).unwrap().is_some());
    }
}
