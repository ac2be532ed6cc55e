//! Rebalance coordination for Kafka group consumers.
//!
//! A coordinated consumer resolves a user rebalance listener for its consumer
//! group, composes it with the commit handler into a single rebalance
//! callback, and installs that callback into the consumer's rdkafka context
//! in place of the default one registered at construction.
//!
//! ## Error logging (anyhow)
//!
//! When logging `anyhow::Error` or other error types that implement `std::error::Error` with
//! a cause chain, use formats that include the full chain so root causes are visible in logs:
//!
//! - **Inline format:** `{e:#}`: full chain on one line (`outer: middle: root cause`).
//! - **Structured field:** `error = ?e`: full chain with `Caused by:` sections (Debug).
//!
//! When constructing errors, use `.context()` / `.with_context()` so the original error remains
//! the source. Avoid `anyhow!("...{e}")`, which formats the error into a string and drops the chain.

pub mod config;
pub mod kafka;
pub mod metrics_const;

pub use kafka::{CoordinatedConsumer, KafkaConsumerRebalanceListener};
