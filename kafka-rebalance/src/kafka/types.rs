use std::collections::HashSet;
use std::fmt;

use rdkafka::topic_partition_list::TopicPartitionListElem;
use rdkafka::TopicPartitionList;

#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Partition {
    topic: String,
    partition_number: i32,
}

impl Partition {
    pub fn new(topic: impl Into<String>, partition_number: i32) -> Self {
        Self {
            topic: topic.into(),
            partition_number,
        }
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn partition_number(&self) -> i32 {
        self.partition_number
    }
}

impl fmt::Display for Partition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}-{}", self.topic, self.partition_number)
    }
}

impl From<TopicPartitionListElem<'_>> for Partition {
    fn from(elem: TopicPartitionListElem<'_>) -> Self {
        Self::new(elem.topic(), elem.partition())
    }
}

/// Lifecycle of a partition as seen by this consumer.
///
/// `Unassigned -> Assigned -> Revoked -> Unassigned -> ...`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PartitionState {
    Unassigned,
    Assigned,
    Revoked,
}

/// Unordered view of the partitions carried by a rebalance event.
pub fn partition_set(partitions: &TopicPartitionList) -> HashSet<Partition> {
    partitions
        .elements()
        .into_iter()
        .map(Partition::from)
        .collect()
}

/// Sorted, compact rendering for log fields, e.g. `events-0, events-3`.
pub fn describe_partitions(partitions: &TopicPartitionList) -> String {
    let mut all: Vec<Partition> = partition_set(partitions).into_iter().collect();
    all.sort();
    all.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

pub fn partition_list<'a>(
    partitions: impl IntoIterator<Item = &'a Partition>,
) -> TopicPartitionList {
    let mut tpl = TopicPartitionList::new();
    for partition in partitions {
        tpl.add_partition(partition.topic(), partition.partition_number());
    }
    tpl
}

#[cfg(test)]
mod tests {
    use super::*;
    use rdkafka::Offset;

    #[test]
    fn test_partition_set_ignores_order_and_offsets() {
        let mut tpl = TopicPartitionList::new();
        tpl.add_partition_offset("t", 1, Offset::Beginning).unwrap();
        tpl.add_partition_offset("t", 0, Offset::Offset(42)).unwrap();

        let set = partition_set(&tpl);
        assert_eq!(set.len(), 2);
        assert!(set.contains(&Partition::new("t", 0)));
        assert!(set.contains(&Partition::new("t", 1)));
    }

    #[test]
    fn test_partition_list_round_trips_partitions() {
        let partitions = [Partition::new("a", 0), Partition::new("b", 7)];
        let tpl = partition_list(&partitions);

        assert_eq!(tpl.count(), 2);
        assert_eq!(partition_set(&tpl), partitions.into_iter().collect());
    }

    #[test]
    fn test_describe_partitions_is_sorted() {
        let tpl = partition_list(&[Partition::new("t", 3), Partition::new("t", 0)]);
        assert_eq!(describe_partitions(&tpl), "t-0, t-3");
        assert_eq!(describe_partitions(&TopicPartitionList::new()), "");
    }
}
