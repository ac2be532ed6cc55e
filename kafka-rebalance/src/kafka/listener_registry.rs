//! Resolution of the user rebalance listener for one consumer.
//!
//! A listener is picked by the channel's configured listener name if there is
//! one, otherwise by the consumer group name. A configured name that matches no
//! candidate is a misconfiguration and stops the consumer from starting; a group
//! name that matches nothing just means the consumer runs without a listener.
//! Either path fails if more than one candidate carries the name.

use std::collections::HashMap;
use std::fmt;
use std::sync::Arc;

use thiserror::Error;
use tracing::{debug, info};

use crate::kafka::channel::ChannelConfig;
use crate::kafka::listener::KafkaConsumerRebalanceListener;

pub type CandidateListener = Arc<dyn KafkaConsumerRebalanceListener>;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ListenerResolutionError {
    #[error("Unable to find rebalance listener `{name}` for channel `{channel}`")]
    Missing { name: String, channel: String },

    #[error(
        "Unable to select rebalance listener `{name}` for channel `{channel}`: {count} candidates match"
    )]
    Ambiguous {
        name: String,
        channel: String,
        count: usize,
    },
}

/// Source of candidate listeners, keyed by name.
pub trait ListenerLookup {
    fn lookup_by_name(&self, name: &str) -> Vec<CandidateListener>;
}

impl<F> ListenerLookup for F
where
    F: Fn(&str) -> Vec<CandidateListener>,
{
    fn lookup_by_name(&self, name: &str) -> Vec<CandidateListener> {
        self(name)
    }
}

/// Static name -> listeners registry. Registering twice under one name is
/// allowed here and reported as ambiguous at resolution time.
#[derive(Default, Clone)]
pub struct NamedListeners {
    listeners: HashMap<String, Vec<CandidateListener>>,
}

impl NamedListeners {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn register(&mut self, name: impl Into<String>, listener: CandidateListener) {
        self.listeners.entry(name.into()).or_default().push(listener);
    }

    pub fn with(mut self, name: impl Into<String>, listener: CandidateListener) -> Self {
        self.register(name, listener);
        self
    }

    pub fn len(&self) -> usize {
        self.listeners.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl ListenerLookup for NamedListeners {
    fn lookup_by_name(&self, name: &str) -> Vec<CandidateListener> {
        self.listeners.get(name).cloned().unwrap_or_default()
    }
}

impl fmt::Debug for NamedListeners {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut counts: Vec<(&str, usize)> = self
            .listeners
            .iter()
            .map(|(name, listeners)| (name.as_str(), listeners.len()))
            .collect();
        counts.sort();
        f.debug_struct("NamedListeners")
            .field("listeners", &counts)
            .finish()
    }
}

/// Pick the rebalance listener for `consumer_group` on this channel, if any.
pub fn resolve(
    channel: &ChannelConfig,
    consumer_group: &str,
    candidates: &dyn ListenerLookup,
) -> Result<Option<CandidateListener>, ListenerResolutionError> {
    if let Some(name) = channel.rebalance_listener_name() {
        info!(
            channel = channel.channel(),
            listener = name,
            "Loading rebalance listener from configured name"
        );
        return match single(name, channel, candidates.lookup_by_name(name))? {
            Some(listener) => Ok(Some(listener)),
            None => Err(ListenerResolutionError::Missing {
                name: name.to_string(),
                channel: channel.channel().to_string(),
            }),
        };
    }

    let listener = single(
        consumer_group,
        channel,
        candidates.lookup_by_name(consumer_group),
    )?;
    match &listener {
        Some(_) => info!(
            channel = channel.channel(),
            consumer_group, "Loading rebalance listener from group id"
        ),
        None => debug!(
            channel = channel.channel(),
            consumer_group, "No rebalance listener registered for consumer group"
        ),
    }
    Ok(listener)
}

fn single(
    name: &str,
    channel: &ChannelConfig,
    mut matching: Vec<CandidateListener>,
) -> Result<Option<CandidateListener>, ListenerResolutionError> {
    if matching.len() > 1 {
        return Err(ListenerResolutionError::Ambiguous {
            name: name.to_string(),
            channel: channel.channel().to_string(),
            count: matching.len(),
        });
    }
    Ok(matching.pop())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::kafka::test_utils::RecordingListener;

    fn channel(listener_name: Option<&str>) -> ChannelConfig {
        ChannelConfig::new("orders", vec!["orders".into()], Some("g1".into()))
            .with_rebalance_listener_name(listener_name.map(String::from))
    }

    fn listener() -> CandidateListener {
        Arc::new(RecordingListener::default())
    }

    #[test]
    fn test_configured_name_with_single_match_is_selected() {
        let alpha = listener();
        let candidates = NamedListeners::new()
            .with("alpha", alpha.clone())
            .with("g1", listener());

        let resolved = resolve(&channel(Some("alpha")), "g1", &candidates)
            .unwrap()
            .unwrap();
        assert!(Arc::ptr_eq(&resolved, &alpha));
    }

    #[test]
    fn test_configured_name_without_match_is_missing() {
        // A listener named after the group must not be used as a fallback
        let candidates = NamedListeners::new().with("g1", listener());

        let err = resolve(&channel(Some("alpha")), "g1", &candidates)
            .err()
            .unwrap();
        assert_eq!(
            err,
            ListenerResolutionError::Missing {
                name: "alpha".into(),
                channel: "orders".into(),
            }
        );
    }

    #[test]
    fn test_configured_name_with_two_matches_is_ambiguous() {
        let candidates = NamedListeners::new()
            .with("alpha", listener())
            .with("alpha", listener());

        let err = resolve(&channel(Some("alpha")), "g1", &candidates)
            .err()
            .unwrap();
        assert_eq!(
            err,
            ListenerResolutionError::Ambiguous {
                name: "alpha".into(),
                channel: "orders".into(),
                count: 2,
            }
        );
        assert!(err.to_string().contains("2 candidates"));
    }

    #[test]
    fn test_group_name_match_is_selected() {
        let group_listener = listener();
        let candidates = NamedListeners::new().with("g1", group_listener.clone());

        let resolved = resolve(&channel(None), "g1", &candidates).unwrap().unwrap();
        assert!(Arc::ptr_eq(&resolved, &group_listener));
    }

    #[test]
    fn test_no_group_match_resolves_to_none() {
        let candidates = NamedListeners::new().with("other", listener());
        assert!(resolve(&channel(None), "g1", &candidates).unwrap().is_none());
        assert!(resolve(&channel(None), "g1", &NamedListeners::new())
            .unwrap()
            .is_none());
    }

    #[test]
    fn test_group_name_with_several_matches_is_ambiguous() {
        let candidates = NamedListeners::new()
            .with("g1", listener())
            .with("g1", listener())
            .with("g1", listener());

        let err = resolve(&channel(None), "g1", &candidates).err().unwrap();
        assert!(matches!(
            err,
            ListenerResolutionError::Ambiguous { ref name, count: 3, .. } if name == "g1"
        ));
    }

    #[test]
    fn test_closure_lookup() {
        let alpha = listener();
        let for_lookup = alpha.clone();
        let lookup = move |name: &str| {
            if name == "alpha" {
                vec![for_lookup.clone()]
            } else {
                vec![]
            }
        };

        let resolved = resolve(&channel(Some("alpha")), "g1", &lookup)
            .unwrap()
            .unwrap();
        assert!(Arc::ptr_eq(&resolved, &alpha));
        assert!(resolve(&channel(None), "g1", &lookup).unwrap().is_none());
    }

    #[test]
    fn test_registry_counts_every_registration() {
        let registry = NamedListeners::new()
            .with("a", listener())
            .with("a", listener())
            .with("b", listener());
        assert_eq!(registry.len(), 3);
        assert!(!registry.is_empty());
        assert_eq!(
            format!("{registry:?}"),
            r#"NamedListeners { listeners: [("a", 2), ("b", 1)] }"#
        );
    }
}
