//! Collaborator interfaces consumed from the surrounding consumer runtime.
//!
//! Commanding never owns partitions. It borrows the live assignment, the
//! per-subscription-group client, and the per-partition coordinators from the
//! runtime that drives the fetch loops:
//!
//! ```text
//! AssignmentSource  → process-wide live view, read by the listener/matcher
//! ConsumerClient    → one per subscription group, used on its fetch loop
//! CoordinatorRegistry → per-partition pause/seek state, owned by that loop
//! ```

use crate::error::Result;
use async_trait::async_trait;
use std::collections::BTreeMap;

/// Partition ids of one topic currently owned by a client.
pub type TopicAssignment = BTreeMap<String, Vec<u32>>;

/// The live assignment of one subscription group.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SubscriptionAssignment {
    pub consumer_group_id: String,
    pub subscription_group_id: String,
    /// Every topic the subscription group consumes, with owned partitions.
    /// A topic with no owned partitions maps to an empty list.
    pub topics: TopicAssignment,
}

impl SubscriptionAssignment {
    pub fn owns_topic(&self, topic: &str) -> bool {
        self.topics.get(topic).is_some_and(|p| !p.is_empty())
    }

    pub fn owns_partition(&self, topic: &str, partition: u32) -> bool {
        self.topics
            .get(topic)
            .is_some_and(|p| p.contains(&partition))
    }
}

/// Process-wide, live (rebalance-aware) view of partition ownership.
#[async_trait]
pub trait AssignmentSource: Send + Sync {
    async fn snapshot(&self) -> Vec<SubscriptionAssignment>;
}

/// The consumer client of one subscription group.
///
/// Only the thread driving that subscription group's fetch loop calls these.
#[async_trait]
pub trait ConsumerClient: Send + Sync {
    /// Stop fetching the partition for `duration_ms`.
    async fn pause(&self, topic: &str, partition: u32, duration_ms: u64) -> Result<()>;

    /// Move the fetch position of the partition to `offset`.
    async fn seek(&self, topic: &str, partition: u32, offset: i64) -> Result<()>;

    /// Store `offset` as consumed. Returns `false` when the partition is no
    /// longer assigned to this client.
    async fn mark_as_consumed(&self, topic: &str, partition: u32, offset: i64) -> Result<bool>;

    /// Partitions currently assigned to this client, by topic.
    async fn current_assignment(&self) -> TopicAssignment;
}

/// Pause and seek state of a single partition.
pub trait PartitionCoordinator: Send {
    fn is_paused(&self) -> bool;

    /// Deadline of the current pause in ms since epoch, if any.
    fn paused_until(&self) -> Option<i64>;

    /// Pause for `duration_ms` from now.
    fn pause(&mut self, duration_ms: u64);

    /// End the pause now.
    fn expire(&mut self);

    fn attempts(&self) -> u32;

    fn reset_attempts(&mut self);

    fn seek_offset(&self) -> Option<i64>;

    fn set_seek_offset(&mut self, offset: Option<i64>);
}

/// Coordinators of the partitions a fetch loop drives.
pub trait CoordinatorRegistry: Send {
    /// Coordinator for the partition, created on first use.
    fn find_or_create(&mut self, topic: &str, partition: u32) -> &mut dyn PartitionCoordinator;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_subscription_ownership() {
        let mut topics = TopicAssignment::new();
        topics.insert("orders".to_string(), vec![0, 3]);
        topics.insert("payments".to_string(), vec![]);

        let assignment = SubscriptionAssignment {
            consumer_group_id: "cg1".to_string(),
            subscription_group_id: "sg1".to_string(),
            topics,
        };

        assert!(assignment.owns_topic("orders"));
        assert!(!assignment.owns_topic("payments"));
        assert!(!assignment.owns_topic("refunds"));
        assert!(assignment.owns_partition("orders", 3));
        assert!(!assignment.owns_partition("orders", 1));
    }
}
