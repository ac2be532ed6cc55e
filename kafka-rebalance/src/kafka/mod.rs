// Kafka module - rebalance coordination for group consumers
pub mod channel;
pub mod commit;
pub mod config;
pub mod context;
pub mod coordinated_consumer;
pub mod injector;
pub mod listener;
pub mod listener_registry;
pub mod offset_tracker;
pub mod rebalance_bridge;
pub mod types;

// Used in "mod tests" and tests/ directory (integration tests)
pub mod test_utils;

// Public API
pub use channel::ChannelConfig;
pub use commit::{CommitHandler, CommitStrategy};
pub use config::ConsumerConfigBuilder;
pub use coordinated_consumer::{ConsumerError, CoordinatedConsumer, CoordinationError};
pub use injector::{install, InjectionError};
pub use listener::{ConsumerHandle, KafkaConsumerRebalanceListener};
pub use listener_registry::{resolve, ListenerLookup, ListenerResolutionError, NamedListeners};
pub use rebalance_bridge::{build_callback, RebalanceCallback, RebalanceError};
