use uuid::Uuid;

/// Per-channel consumer settings read once when the consumer is built.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChannelConfig {
    channel: String,
    topics: Vec<String>,
    consumer_group: String,
    rebalance_listener_name: Option<String>,
}

impl ChannelConfig {
    /// Without an explicit `group_id` the channel gets its own random group,
    /// fixed for the lifetime of this config.
    pub fn new(channel: impl Into<String>, topics: Vec<String>, group_id: Option<String>) -> Self {
        let consumer_group = group_id
            .filter(|group| !group.is_empty())
            .unwrap_or_else(|| Uuid::new_v4().to_string());

        Self {
            channel: channel.into(),
            topics,
            consumer_group,
            rebalance_listener_name: None,
        }
    }

    pub fn with_rebalance_listener_name(mut self, name: Option<String>) -> Self {
        self.rebalance_listener_name = name.filter(|name| !name.is_empty());
        self
    }

    pub fn channel(&self) -> &str {
        &self.channel
    }

    pub fn topics(&self) -> &[String] {
        &self.topics
    }

    pub fn consumer_group(&self) -> &str {
        &self.consumer_group
    }

    pub fn rebalance_listener_name(&self) -> Option<&str> {
        self.rebalance_listener_name.as_deref()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rstest::rstest;

    #[test]
    fn test_explicit_group_is_kept() {
        let config = ChannelConfig::new("orders", vec!["orders".into()], Some("g1".into()));
        assert_eq!(config.consumer_group(), "g1");
        assert_eq!(config.channel(), "orders");
        assert_eq!(config.topics(), ["orders".to_string()]);
        assert_eq!(config.rebalance_listener_name(), None);
    }

    #[test]
    fn test_missing_group_generates_stable_uuid() {
        let config = ChannelConfig::new("orders", vec![], None);
        let group = config.consumer_group().to_string();

        assert!(Uuid::parse_str(&group).is_ok());
        assert_eq!(config.consumer_group(), group);

        let other = ChannelConfig::new("orders", vec![], Some(String::new()));
        assert_ne!(other.consumer_group(), group);
    }

    #[rstest]
    #[case(None, None)]
    #[case(Some(""), None)]
    #[case(Some("alpha"), Some("alpha"))]
    fn test_listener_name(#[case] configured: Option<&str>, #[case] expected: Option<&str>) {
        let config = ChannelConfig::new("c", vec![], Some("g".into()))
            .with_rebalance_listener_name(configured.map(String::from));
        assert_eq!(config.rebalance_listener_name(), expected);
    }
}
