//! Tracker - Pending Command Queue
//!
//! The listener never touches partition state. It appends deferred commands
//! here, and the fetch loop that owns the target partitions drains them on its
//! own task, either to execute them (pre-poll) or to reject them (rebalance).
//!
//! One lock guards a map of FIFO queues keyed by [`Scope`]. Draining is
//! destructive: the key's queue is removed and returned in arrival order.

use crate::metrics;
use crate::request::Request;
use std::collections::{HashMap, VecDeque};
use std::fmt;
use tokio::sync::Mutex;

/// Ownership scope a deferred command is addressed to.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Scope {
    /// One partition, executed by the fetch loop of its subscription group.
    Partition {
        subscription_group_id: String,
        topic: String,
        partition: u32,
    },
    /// Every locally owned partition of a topic within a consumer group.
    Topic {
        consumer_group_id: String,
        topic: String,
    },
}

impl Scope {
    pub fn partition(
        subscription_group_id: impl Into<String>,
        topic: impl Into<String>,
        partition: u32,
    ) -> Self {
        Scope::Partition {
            subscription_group_id: subscription_group_id.into(),
            topic: topic.into(),
            partition,
        }
    }

    pub fn topic(consumer_group_id: impl Into<String>, topic: impl Into<String>) -> Self {
        Scope::Topic {
            consumer_group_id: consumer_group_id.into(),
            topic: topic.into(),
        }
    }
}

impl fmt::Display for Scope {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Scope::Partition {
                subscription_group_id,
                topic,
                partition,
            } => write!(f, "{}:{}:{}", subscription_group_id, topic, partition),
            Scope::Topic {
                consumer_group_id,
                topic,
            } => write!(f, "{}:{}", consumer_group_id, topic),
        }
    }
}

/// Pending commands per scope.
#[derive(Debug, Default)]
pub struct Tracker {
    queues: Mutex<HashMap<Scope, VecDeque<Request>>>,
}

impl Tracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Queue a request behind everything already pending for `scope`.
    pub async fn append(&self, scope: Scope, request: Request) {
        let mut queues = self.queues.lock().await;
        queues.entry(scope).or_default().push_back(request);
        metrics::set_pending(queues.values().map(VecDeque::len).sum());
    }

    /// Remove and return everything pending for `scope`, oldest first.
    pub async fn drain(&self, scope: &Scope) -> Vec<Request> {
        let mut queues = self.queues.lock().await;
        let drained = queues
            .remove(scope)
            .map(Vec::from)
            .unwrap_or_default();
        metrics::set_pending(queues.values().map(VecDeque::len).sum());
        drained
    }

    /// Total number of pending requests across scopes.
    pub async fn len(&self) -> usize {
        self.queues.lock().await.values().map(VecDeque::len).sum()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    pub async fn contains(&self, scope: &Scope) -> bool {
        self.queues.lock().await.contains_key(scope)
    }
}
