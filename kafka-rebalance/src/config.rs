use std::time::Duration;

use envconfig::Envconfig;
use rdkafka::ClientConfig;

use crate::kafka::channel::ChannelConfig;
use crate::kafka::commit::{CommitStrategy, CommitStrategyError};
use crate::kafka::config::ConsumerConfigBuilder;

#[derive(Envconfig, Clone, Debug)]
pub struct Config {
    // Kafka configuration
    #[envconfig(default = "localhost:9092")]
    pub kafka_hosts: String,

    #[envconfig(default = "false")]
    pub kafka_tls: bool,

    // Without a group id the channel gets a random one
    pub kafka_consumer_group: Option<String>,

    // Comma separated
    #[envconfig(default = "events")]
    pub kafka_consumer_topic: String,

    #[envconfig(default = "earliest")]
    pub kafka_consumer_offset_reset: String,

    #[envconfig(default = "false")]
    pub kafka_consumer_auto_commit: bool,

    #[envconfig(default = "5000")]
    pub kafka_consumer_auto_commit_interval_ms: u32,

    #[envconfig(default = "60000")]
    pub kafka_session_timeout_ms: u32,

    #[envconfig(default = "5000")]
    pub kafka_heartbeat_interval_ms: u32,

    #[envconfig(default = "300000")]
    pub kafka_max_poll_interval_ms: u32,

    // Rebalance coordination
    #[envconfig(default = "events")]
    pub channel_name: String,

    pub rebalance_listener_name: Option<String>,

    // ignore | latest, defaults from kafka_consumer_auto_commit
    pub commit_strategy: Option<String>,

    #[envconfig(default = "5000")]
    pub commit_interval_ms: u64,
}

impl Config {
    pub fn init_with_defaults() -> Result<Self, envconfig::Error> {
        Config::init_from_env()
    }

    pub fn topics(&self) -> Vec<String> {
        self.kafka_consumer_topic
            .split(',')
            .map(str::trim)
            .filter(|topic| !topic.is_empty())
            .map(String::from)
            .collect()
    }

    pub fn commit_interval(&self) -> Duration {
        Duration::from_millis(self.commit_interval_ms)
    }

    pub fn commit_strategy(&self) -> Result<CommitStrategy, CommitStrategyError> {
        match &self.commit_strategy {
            Some(strategy) => strategy.parse(),
            None => Ok(CommitStrategy::default_for(
                self.kafka_consumer_auto_commit,
            )),
        }
    }

    pub fn to_channel_config(&self) -> ChannelConfig {
        ChannelConfig::new(
            self.channel_name.clone(),
            self.topics(),
            self.kafka_consumer_group.clone(),
        )
        .with_rebalance_listener_name(self.rebalance_listener_name.clone())
    }

    /// rdkafka settings for `channel`. The group id comes from the channel so
    /// a generated group is used consistently.
    pub fn to_client_config(&self, channel: &ChannelConfig) -> ClientConfig {
        let mut builder =
            ConsumerConfigBuilder::for_group_consumer(&self.kafka_hosts, channel.consumer_group())
                .with_tls(self.kafka_tls)
                .with_offset_reset(&self.kafka_consumer_offset_reset)
                .with_session_timeout_ms(self.kafka_session_timeout_ms)
                .with_heartbeat_interval_ms(self.kafka_heartbeat_interval_ms)
                .with_max_poll_interval_ms(self.kafka_max_poll_interval_ms)
                .with_auto_commit(self.kafka_consumer_auto_commit);

        if self.kafka_consumer_auto_commit {
            builder =
                builder.with_auto_commit_interval_ms(self.kafka_consumer_auto_commit_interval_ms);
        }
        builder.build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn config(vars: &[(&str, &str)]) -> Config {
        let env: HashMap<String, String> = vars
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        Config::init_from_hashmap(&env).unwrap()
    }

    #[test]
    fn test_defaults() {
        let config = config(&[]);

        assert_eq!(config.kafka_hosts, "localhost:9092");
        assert_eq!(config.topics(), vec!["events".to_string()]);
        assert_eq!(config.kafka_consumer_group, None);
        assert_eq!(config.rebalance_listener_name, None);
        assert_eq!(config.commit_strategy().unwrap(), CommitStrategy::Latest);
        assert_eq!(config.commit_interval(), Duration::from_secs(5));
    }

    #[test]
    fn test_channel_config_from_env() {
        let config = config(&[
            ("KAFKA_CONSUMER_GROUP", "g1"),
            ("KAFKA_CONSUMER_TOPIC", "a, b,,c"),
            ("CHANNEL_NAME", "orders"),
            ("REBALANCE_LISTENER_NAME", "alpha"),
        ]);

        let channel = config.to_channel_config();
        assert_eq!(channel.channel(), "orders");
        assert_eq!(channel.consumer_group(), "g1");
        assert_eq!(channel.topics(), ["a", "b", "c"].map(String::from));
        assert_eq!(channel.rebalance_listener_name(), Some("alpha"));
    }

    #[test]
    fn test_client_config_uses_channel_group() {
        let config = config(&[("KAFKA_CONSUMER_AUTO_COMMIT", "true")]);
        let channel = config.to_channel_config();

        let client = config.to_client_config(&channel);
        assert_eq!(client.get("group.id"), Some(channel.consumer_group()));
        assert_eq!(client.get("enable.auto.commit"), Some("true"));
        assert_eq!(client.get("auto.commit.interval.ms"), Some("5000"));
        assert_eq!(config.commit_strategy().unwrap(), CommitStrategy::Ignore);
    }

    #[test]
    fn test_explicit_commit_strategy_wins() {
        let explicit = config(&[
            ("KAFKA_CONSUMER_AUTO_COMMIT", "true"),
            ("COMMIT_STRATEGY", "latest"),
        ]);
        assert_eq!(explicit.commit_strategy().unwrap(), CommitStrategy::Latest);

        let unknown = config(&[("COMMIT_STRATEGY", "throttled")]);
        assert!(unknown.commit_strategy().is_err());
    }
}
