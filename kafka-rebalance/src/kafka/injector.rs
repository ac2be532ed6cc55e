//! Replaces the rebalance callback of an already constructed consumer.
//!
//! The consumer context is fixed when rdkafka builds the consumer, and at that
//! point it can only hold `DefaultRebalanceCallback`: the bridge needs the
//! consumer handle and the commit handler, which exist only afterwards. The
//! context's `RebalanceSlot` is the single place where the callback can be
//! swapped, and `install` is the only code that swaps it.

use std::sync::{Arc, PoisonError};

use rdkafka::consumer::{BaseConsumer, Consumer, StreamConsumer};
use thiserror::Error;
use tracing::{error, info};

use crate::kafka::context::{CoordinatedConsumerContext, RebalanceSlot};
use crate::kafka::listener::ConsumerHandle;
use crate::kafka::rebalance_bridge::RebalanceCallback;
use crate::metrics_const::REBALANCE_CALLBACK_INSTALLS;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum InjectionError {
    #[error("Cannot install rebalance callback: consumer is no longer available")]
    ConsumerGone,
    #[error("Cannot install rebalance callback: callback slot for group `{consumer_group}` is poisoned")]
    SlotPoisoned { consumer_group: String },
}

/// Anything that gives access to a coordinated consumer's context.
pub trait RebalanceCallbackHost {
    fn with_context<R>(
        &self,
        f: impl FnOnce(&CoordinatedConsumerContext) -> R,
    ) -> Result<R, InjectionError>;
}

impl RebalanceCallbackHost for BaseConsumer<CoordinatedConsumerContext> {
    fn with_context<R>(
        &self,
        f: impl FnOnce(&CoordinatedConsumerContext) -> R,
    ) -> Result<R, InjectionError> {
        Ok(f(self.context()))
    }
}

impl RebalanceCallbackHost for StreamConsumer<CoordinatedConsumerContext> {
    fn with_context<R>(
        &self,
        f: impl FnOnce(&CoordinatedConsumerContext) -> R,
    ) -> Result<R, InjectionError> {
        Ok(f(self.context()))
    }
}

impl RebalanceCallbackHost for ConsumerHandle {
    fn with_context<R>(
        &self,
        f: impl FnOnce(&CoordinatedConsumerContext) -> R,
    ) -> Result<R, InjectionError> {
        let consumer = self.upgrade().ok_or(InjectionError::ConsumerGone)?;
        Ok(f(consumer.context()))
    }
}

/// Make `callback` the consumer's only rebalance callback, dropping whatever
/// was there. Events already running finish on the callback they started with.
pub fn install(
    consumer: &impl RebalanceCallbackHost,
    callback: Arc<dyn RebalanceCallback>,
) -> Result<(), InjectionError> {
    let result = consumer.with_context(|context| {
        replace(context.rebalance_slot(), context.consumer_group(), callback)
    });

    match result {
        Ok(Ok(())) => Ok(()),
        Ok(Err(e)) | Err(e) => {
            error!("Failed to install rebalance callback: {e}");
            Err(e)
        }
    }
}

fn replace(
    slot: &RebalanceSlot,
    consumer_group: &str,
    callback: Arc<dyn RebalanceCallback>,
) -> Result<(), InjectionError> {
    let mut active = slot
        .active()
        .write()
        .map_err(|_: PoisonError<_>| InjectionError::SlotPoisoned {
            consumer_group: consumer_group.to_string(),
        })?;

    let installed = callback.describe();
    let previous = std::mem::replace(&mut *active, callback);
    drop(active);

    metrics::counter!(REBALANCE_CALLBACK_INSTALLS).increment(1);
    info!(
        consumer_group,
        previous = %previous.describe(),
        installed = %installed,
        "Installed rebalance callback"
    );
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kafka::rebalance_bridge::DefaultRebalanceCallback;
    use crate::kafka::test_utils::create_test_consumer;

    #[test]
    fn test_install_replaces_default_callback() {
        let consumer = create_test_consumer("g1");
        let callback: Arc<dyn RebalanceCallback> =
            Arc::new(DefaultRebalanceCallback::new("replacement"));

        install(&consumer, callback.clone()).unwrap();

        let active = consumer.context().rebalance_slot().current();
        assert!(Arc::ptr_eq(&active, &callback));
    }

    #[test]
    fn test_second_install_replaces_first() {
        let consumer = create_test_consumer("g1");
        let first: Arc<dyn RebalanceCallback> = Arc::new(DefaultRebalanceCallback::new("first"));
        let second: Arc<dyn RebalanceCallback> = Arc::new(DefaultRebalanceCallback::new("second"));

        install(&consumer, first.clone()).unwrap();
        install(&consumer, second.clone()).unwrap();

        let active = consumer.context().rebalance_slot().current();
        assert!(Arc::ptr_eq(&active, &second));
        // Only the test still holds the first callback
        assert_eq!(Arc::strong_count(&first), 1);
    }

    #[test]
    fn test_install_through_detached_handle_fails() {
        let callback: Arc<dyn RebalanceCallback> = Arc::new(DefaultRebalanceCallback::new("g1"));

        let err = install(&ConsumerHandle::detached(), callback).unwrap_err();
        assert_eq!(err, InjectionError::ConsumerGone);
    }

    #[test]
    fn test_install_into_poisoned_slot_fails() {
        let consumer = create_test_consumer("g1");
        let context = consumer.context().clone();
        let poisoner = context.clone();
        let poisoned = std::thread::spawn(move || {
            let _guard = poisoner.rebalance_slot().active().write().unwrap();
            panic!("poison the slot");
        })
        .join();
        assert!(poisoned.is_err());

        let callback: Arc<dyn RebalanceCallback> = Arc::new(DefaultRebalanceCallback::new("g1"));
        let err = install(&consumer, callback).unwrap_err();
        assert_eq!(
            err,
            InjectionError::SlotPoisoned {
                consumer_group: "g1".into()
            }
        );

        // Events keep running on the callback that was active before
        assert_eq!(
            context.rebalance_slot().current().describe(),
            "default callback for group `g1`"
        );
    }
}
