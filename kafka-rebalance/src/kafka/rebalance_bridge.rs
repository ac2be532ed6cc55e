//! The callback that actually runs when the group protocol moves partitions.
//!
//! `RebalanceBridge` composes the commit handler with the (optional) user
//! listener resolved for the consumer group:
//!
//! ```text
//! revoke:  listener present -> listener.on_partitions_revoked     (commit handler NOT called)
//!          no listener      -> commit_handler.partitions_revoked
//!
//! assign:  commit_handler.partitions_assigned                     (always, first)
//!          listener present -> listener.on_partitions_assigned
//! ```
//!
//! The revoke asymmetry is part of the listener contract: a listener owns any
//! flush that has to happen before partitions are lost. Listener failures are
//! logged and handed back to the caller, once per event, and never retried here.

use std::fmt;
use std::sync::Arc;

use rdkafka::TopicPartitionList;
use thiserror::Error;
use tracing::{error, info, warn};

use crate::kafka::commit::CommitHandler;
use crate::kafka::listener::ConsumerHandle;
use crate::kafka::listener_registry::CandidateListener;
use crate::kafka::types::describe_partitions;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RebalancePhase {
    Revoke,
    Assign,
}

impl RebalancePhase {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Revoke => "revoke",
            Self::Assign => "assign",
        }
    }
}

impl fmt::Display for RebalancePhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Error, Debug)]
pub enum RebalanceError {
    #[error("Rebalance listener for consumer group `{consumer_group}` failed during {phase}: {source}")]
    ListenerFailed {
        consumer_group: String,
        phase: RebalancePhase,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },
}

impl RebalanceError {
    pub fn phase(&self) -> RebalancePhase {
        match self {
            Self::ListenerFailed { phase, .. } => *phase,
        }
    }

    pub fn consumer_group(&self) -> &str {
        match self {
            Self::ListenerFailed { consumer_group, .. } => consumer_group,
        }
    }
}

/// Invoked by the consumer context for every rebalance event. Exactly one is
/// active per consumer (see `injector::install`).
pub trait RebalanceCallback: Send + Sync {
    /// Short human readable description, used when callbacks are swapped.
    fn describe(&self) -> String;

    fn on_partitions_revoked(&self, partitions: &TopicPartitionList) -> Result<(), RebalanceError>;

    fn on_partitions_assigned(&self, partitions: &TopicPartitionList)
        -> Result<(), RebalanceError>;
}

/// What a freshly built consumer context runs until the bridge is installed.
/// It has no commit handler to notify, so events are only logged.
pub struct DefaultRebalanceCallback {
    consumer_group: String,
}

impl DefaultRebalanceCallback {
    pub fn new(consumer_group: impl Into<String>) -> Self {
        Self {
            consumer_group: consumer_group.into(),
        }
    }
}

impl RebalanceCallback for DefaultRebalanceCallback {
    fn describe(&self) -> String {
        format!("default callback for group `{}`", self.consumer_group)
    }

    fn on_partitions_revoked(&self, partitions: &TopicPartitionList) -> Result<(), RebalanceError> {
        warn!(
            consumer_group = %self.consumer_group,
            partitions = %describe_partitions(partitions),
            "Partitions revoked before a rebalance callback was installed"
        );
        Ok(())
    }

    fn on_partitions_assigned(
        &self,
        partitions: &TopicPartitionList,
    ) -> Result<(), RebalanceError> {
        warn!(
            consumer_group = %self.consumer_group,
            partitions = %describe_partitions(partitions),
            "Partitions assigned before a rebalance callback was installed"
        );
        Ok(())
    }
}

pub struct RebalanceBridge {
    listener: Option<CandidateListener>,
    commit_handler: Arc<dyn CommitHandler>,
    consumer_group: String,
    consumer: ConsumerHandle,
}

impl RebalanceBridge {
    pub fn new(
        listener: Option<CandidateListener>,
        commit_handler: Arc<dyn CommitHandler>,
        consumer_group: impl Into<String>,
        consumer: ConsumerHandle,
    ) -> Self {
        Self {
            listener,
            commit_handler,
            consumer_group: consumer_group.into(),
            consumer,
        }
    }

    pub fn has_listener(&self) -> bool {
        self.listener.is_some()
    }

    fn listener_failed(&self, phase: RebalancePhase, e: anyhow::Error) -> RebalanceError {
        RebalanceError::ListenerFailed {
            consumer_group: self.consumer_group.clone(),
            phase,
            source: e.into(),
        }
    }
}

/// Compose the callback for one consumer. Built once, after the consumer and
/// its commit handler exist, and installed over the consumer's default.
pub fn build_callback(
    listener: Option<CandidateListener>,
    commit_handler: Arc<dyn CommitHandler>,
    consumer_group: &str,
    consumer: ConsumerHandle,
) -> Arc<dyn RebalanceCallback> {
    Arc::new(RebalanceBridge::new(
        listener,
        commit_handler,
        consumer_group,
        consumer,
    ))
}

impl RebalanceCallback for RebalanceBridge {
    fn describe(&self) -> String {
        format!(
            "rebalance bridge for group `{}` (commit handler: {}, listener: {})",
            self.consumer_group,
            self.commit_handler.name(),
            if self.has_listener() { "yes" } else { "no" }
        )
    }

    fn on_partitions_revoked(&self, partitions: &TopicPartitionList) -> Result<(), RebalanceError> {
        let Some(listener) = &self.listener else {
            self.commit_handler.partitions_revoked(partitions);
            return Ok(());
        };

        info!(
            consumer_group = %self.consumer_group,
            partitions = %describe_partitions(partitions),
            "Executing consumer revoked rebalance listener"
        );
        match listener.on_partitions_revoked(&self.consumer, partitions) {
            Ok(()) => {
                info!(
                    consumer_group = %self.consumer_group,
                    "Executed consumer revoked rebalance listener"
                );
                Ok(())
            }
            Err(e) => {
                error!(
                    consumer_group = %self.consumer_group,
                    "Unable to execute consumer revoked rebalance listener: {e:#}"
                );
                Err(self.listener_failed(RebalancePhase::Revoke, e))
            }
        }
    }

    fn on_partitions_assigned(
        &self,
        partitions: &TopicPartitionList,
    ) -> Result<(), RebalanceError> {
        self.commit_handler.partitions_assigned(partitions);

        let Some(listener) = &self.listener else {
            return Ok(());
        };

        match listener.on_partitions_assigned(&self.consumer, partitions) {
            Ok(()) => {
                info!(
                    consumer_group = %self.consumer_group,
                    partitions = %describe_partitions(partitions),
                    "Executed consumer assigned rebalance listener"
                );
                Ok(())
            }
            Err(e) => {
                error!(
                    consumer_group = %self.consumer_group,
                    "Unable to execute consumer assigned rebalance listener: {e:#}"
                );
                Err(self.listener_failed(RebalancePhase::Assign, e))
            }
        }
    }
}
