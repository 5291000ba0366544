//! Matcher - Does This Command Apply To Us?
//!
//! A composite AND over sub-matchers. Which sub-matchers take part depends on
//! the scope of the command:
//!
//! | Sub-matcher       | process | partition              | topic |
//! |-------------------|---------|------------------------|-------|
//! | message kind      | yes     | yes                    | yes   |
//! | schema version    | yes     | yes                    | yes   |
//! | process id        | yes     | yes                    | yes   |
//! | consumer group id | -       | if `consumer_group_id` | -     |
//! | topic             | -       | yes                    | -     |
//! | partition id      | -       | yes                    | -     |
//!
//! Ownership is read from the *live* assignment snapshot, so a process stops
//! matching partition commands as soon as a rebalance takes the partition away.
//! Topic broadcasts are not pre-filtered on ownership: the listener answers
//! `skipped` for processes whose share of the consumer group lacks the topic.

use crate::client::SubscriptionAssignment;
use crate::commands::{CommandId, CommandScope};
use crate::request::{MessageKind, WireMessage, BROADCAST, SCHEMA_VERSION};
use tracing::debug;

/// One predicate of the composite matcher.
pub trait SubMatcher: Send + Sync {
    fn name(&self) -> &'static str;

    /// Whether this predicate takes part for the given message.
    fn applies(&self, _scope: CommandScope, _message: &WireMessage) -> bool {
        true
    }

    fn matches(&self, message: &WireMessage, assignment: &[SubscriptionAssignment]) -> bool;
}

/// Only `command` messages are executed; acceptances and results are echoes.
pub struct MessageKindMatcher;

impl SubMatcher for MessageKindMatcher {
    fn name(&self) -> &'static str {
        "message_kind"
    }

    fn matches(&self, message: &WireMessage, _: &[SubscriptionAssignment]) -> bool {
        message.kind == MessageKind::Command
    }
}

pub struct SchemaVersionMatcher {
    expected: String,
}

impl SchemaVersionMatcher {
    pub fn new(expected: impl Into<String>) -> Self {
        Self {
            expected: expected.into(),
        }
    }
}

impl SubMatcher for SchemaVersionMatcher {
    fn name(&self) -> &'static str {
        "schema_version"
    }

    fn matches(&self, message: &WireMessage, _: &[SubscriptionAssignment]) -> bool {
        message.schema_version == self.expected
    }
}

/// Broadcast (`*`) or addressed to this process.
pub struct ProcessIdMatcher {
    process_id: String,
}

impl ProcessIdMatcher {
    pub fn new(process_id: impl Into<String>) -> Self {
        Self {
            process_id: process_id.into(),
        }
    }
}

impl SubMatcher for ProcessIdMatcher {
    fn name(&self) -> &'static str {
        "process_id"
    }

    fn matches(&self, message: &WireMessage, _: &[SubscriptionAssignment]) -> bool {
        message.routing_key == BROADCAST || message.routing_key == self.process_id
    }
}

/// This process currently owns a partition of the named consumer group.
pub struct ConsumerGroupIdMatcher;

impl SubMatcher for ConsumerGroupIdMatcher {
    fn name(&self) -> &'static str {
        "consumer_group_id"
    }

    fn applies(&self, scope: CommandScope, message: &WireMessage) -> bool {
        scope == CommandScope::Partition && message.fields.contains_key("consumer_group_id")
    }

    fn matches(&self, message: &WireMessage, assignment: &[SubscriptionAssignment]) -> bool {
        let Some(group) = message.fields.get("consumer_group_id").and_then(|v| v.as_str()) else {
            return false;
        };

        assignment
            .iter()
            .filter(|s| s.consumer_group_id == group)
            .any(|s| s.topics.values().any(|partitions| !partitions.is_empty()))
    }
}

/// This process currently owns a partition of the named topic.
pub struct TopicMatcher;

impl SubMatcher for TopicMatcher {
    fn name(&self) -> &'static str {
        "topic"
    }

    fn applies(&self, scope: CommandScope, _: &WireMessage) -> bool {
        scope == CommandScope::Partition
    }

    fn matches(&self, message: &WireMessage, assignment: &[SubscriptionAssignment]) -> bool {
        let Some(topic) = message.fields.get("topic").and_then(|v| v.as_str()) else {
            return false;
        };

        assignment.iter().any(|s| s.owns_topic(topic))
    }
}

/// This process currently owns the named partition.
pub struct PartitionIdMatcher;

impl SubMatcher for PartitionIdMatcher {
    fn name(&self) -> &'static str {
        "partition_id"
    }

    fn applies(&self, scope: CommandScope, _: &WireMessage) -> bool {
        scope == CommandScope::Partition
    }

    fn matches(&self, message: &WireMessage, assignment: &[SubscriptionAssignment]) -> bool {
        let topic = message.fields.get("topic").and_then(|v| v.as_str());
        let partition = message
            .fields
            .get("partition_id")
            .and_then(|v| v.as_u64())
            .and_then(|p| u32::try_from(p).ok());

        match (topic, partition) {
            (Some(topic), Some(partition)) => {
                assignment.iter().any(|s| s.owns_partition(topic, partition))
            }
            _ => false,
        }
    }
}

/// Composite matcher for one process.
pub struct Matcher {
    matchers: Vec<Box<dyn SubMatcher>>,
}

impl Matcher {
    /// The standard matcher set for `process_id`.
    pub fn new(process_id: impl Into<String>) -> Self {
        Self::with_matchers(vec![
            Box::new(MessageKindMatcher),
            Box::new(SchemaVersionMatcher::new(SCHEMA_VERSION)),
            Box::new(ProcessIdMatcher::new(process_id)),
            Box::new(ConsumerGroupIdMatcher),
            Box::new(TopicMatcher),
            Box::new(PartitionIdMatcher),
        ])
    }

    pub fn with_matchers(matchers: Vec<Box<dyn SubMatcher>>) -> Self {
        Self { matchers }
    }

    /// True when every applicable sub-matcher accepts the message.
    ///
    /// Messages with unknown command names are matched as process-scoped so
    /// that a command addressed to us surfaces as an unknown-command error
    /// instead of being silently filtered out.
    pub fn matches(&self, message: &WireMessage, assignment: &[SubscriptionAssignment]) -> bool {
        let scope = message
            .name
            .parse::<CommandId>()
            .map(|id| id.scope())
            .unwrap_or(CommandScope::Process);

        for matcher in &self.matchers {
            if !matcher.applies(scope, message) {
                continue;
            }

            if !matcher.matches(message, assignment) {
                debug!(
                    command = %message.name,
                    matcher = matcher.name(),
                    "Command does not apply to this process"
                );
                return false;
            }
        }

        true
    }
}
