// ==== Rebalance coordination metrics ====
/// Counter for rebalance events routed to the active callback (label: event_type)
pub const REBALANCE_EVENTS: &str = "kafka_rebalance_events_total";

/// Counter for rebalance listener failures (label: event_type)
pub const REBALANCE_LISTENER_FAILURES: &str = "kafka_rebalance_listener_failures_total";

/// Counter for rebalance faults replaced before the consumer observed them
pub const REBALANCE_FAULTS_DROPPED: &str = "kafka_rebalance_faults_dropped_total";

/// Counter for rebalance errors reported by librdkafka
pub const REBALANCE_ERRORS: &str = "kafka_rebalance_errors_total";

/// Counter for rebalance callbacks installed over the consumer's current one
pub const REBALANCE_CALLBACK_INSTALLS: &str = "kafka_rebalance_callback_installs_total";

/// Histogram for time spent inside the active rebalance callback
pub const REBALANCE_CALLBACK_DURATION: &str = "kafka_rebalance_callback_duration_seconds";

// ==== Commit handler metrics ====
/// Counter for offset commits (labels: mode, status)
pub const OFFSET_COMMITS: &str = "kafka_offset_commits_total";

/// Counter for acknowledgements dropped because the partition is not assigned
pub const ACKNOWLEDGEMENTS_DROPPED: &str = "kafka_acknowledgements_dropped_total";

/// Gauge for the number of partitions tracked by the commit handler
pub const TRACKED_PARTITIONS: &str = "kafka_commit_tracked_partitions";

/// Counter for tracked partitions dropped at commit time because the consumer
/// no longer owns them
pub const UNOWNED_PARTITIONS_RELEASED: &str = "kafka_commit_unowned_partitions_released_total";
