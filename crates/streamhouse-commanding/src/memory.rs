//! In-memory collaborators.
//!
//! Used by the test suites and by embedders that want to drive commanding
//! without a broker: every trait the manager consumes has a memory-backed
//! implementation here that records what it was asked to do.

use crate::client::{
    AssignmentSource, ConsumerClient, CoordinatorRegistry, PartitionCoordinator,
    SubscriptionAssignment, TopicAssignment,
};
use crate::dispatcher::Publisher;
use crate::error::{CommandingError, Result};
use crate::listener::{CommandSource, InboundRecord};
use crate::process::{ProcessSignal, SignalSender};
use crate::request::{current_timestamp_ms, WireMessage};
use async_trait::async_trait;
use std::collections::HashMap;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, RwLock};
use std::time::Duration;
use tokio::sync::mpsc;

/// A call made against a [`MemoryClient`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ClientCall {
    Pause {
        topic: String,
        partition: u32,
        duration_ms: u64,
    },
    MarkAsConsumed {
        topic: String,
        partition: u32,
        offset: i64,
    },
    Seek {
        topic: String,
        partition: u32,
        offset: i64,
    },
}

#[derive(Debug, Default)]
struct ClientState {
    assignment: TopicAssignment,
    calls: Vec<ClientCall>,
    failing_pauses: Vec<(String, u32)>,
}

/// Consumer client of one subscription group. Clones share state.
#[derive(Debug, Clone, Default)]
pub struct MemoryClient {
    state: Arc<Mutex<ClientState>>,
}

impl MemoryClient {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace the owned partitions of `topic`.
    pub fn assign(&self, topic: &str, partitions: Vec<u32>) {
        let mut state = self.lock();
        state.assignment.insert(topic.to_string(), partitions);
    }

    /// Drop one partition from the assignment.
    pub fn revoke(&self, topic: &str, partition: u32) {
        let mut state = self.lock();
        if let Some(partitions) = state.assignment.get_mut(topic) {
            partitions.retain(|p| *p != partition);
        }
    }

    /// Make every later `pause` of this partition fail.
    pub fn fail_pause(&self, topic: &str, partition: u32) {
        self.lock()
            .failing_pauses
            .push((topic.to_string(), partition));
    }

    /// Every call received so far, in order.
    pub fn calls(&self) -> Vec<ClientCall> {
        self.lock().calls.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, ClientState> {
        self.state.lock().unwrap_or_else(|e| e.into_inner())
    }
}

#[async_trait]
impl ConsumerClient for MemoryClient {
    async fn pause(&self, topic: &str, partition: u32, duration_ms: u64) -> Result<()> {
        let mut state = self.lock();
        let failing = state
            .failing_pauses
            .iter()
            .any(|(t, p)| t == topic && *p == partition);
        if failing {
            return Err(CommandingError::Client(format!(
                "pause of {}/{} refused",
                topic, partition
            )));
        }

        state.calls.push(ClientCall::Pause {
            topic: topic.to_string(),
            partition,
            duration_ms,
        });
        Ok(())
    }

    async fn seek(&self, topic: &str, partition: u32, offset: i64) -> Result<()> {
        self.lock().calls.push(ClientCall::Seek {
            topic: topic.to_string(),
            partition,
            offset,
        });
        Ok(())
    }

    async fn mark_as_consumed(&self, topic: &str, partition: u32, offset: i64) -> Result<bool> {
        let mut state = self.lock();
        state.calls.push(ClientCall::MarkAsConsumed {
            topic: topic.to_string(),
            partition,
            offset,
        });

        Ok(state
            .assignment
            .get(topic)
            .is_some_and(|p| p.contains(&partition)))
    }

    async fn current_assignment(&self) -> TopicAssignment {
        self.lock()
            .assignment
            .iter()
            .filter(|(_, partitions)| !partitions.is_empty())
            .map(|(topic, partitions)| (topic.clone(), partitions.clone()))
            .collect()
    }
}

/// Pause and seek state of one partition.
#[derive(Debug, Clone, Default)]
pub struct PauseTracker {
    paused_until: Option<i64>,
    attempts: u32,
    seek_offset: Option<i64>,
}

impl PauseTracker {
    /// Count one failed processing attempt.
    pub fn record_attempt(&mut self) {
        self.attempts += 1;
    }
}

impl PartitionCoordinator for PauseTracker {
    fn is_paused(&self) -> bool {
        self.paused_until
            .is_some_and(|until| until > current_timestamp_ms())
    }

    fn paused_until(&self) -> Option<i64> {
        self.paused_until
    }

    fn pause(&mut self, duration_ms: u64) {
        let duration = i64::try_from(duration_ms).unwrap_or(i64::MAX);
        self.paused_until = Some(current_timestamp_ms().saturating_add(duration));
    }

    fn expire(&mut self) {
        self.paused_until = Some(current_timestamp_ms());
    }

    fn attempts(&self) -> u32 {
        self.attempts
    }

    fn reset_attempts(&mut self) {
        self.attempts = 0;
    }

    fn seek_offset(&self) -> Option<i64> {
        self.seek_offset
    }

    fn set_seek_offset(&mut self, offset: Option<i64>) {
        self.seek_offset = offset;
    }
}

/// Coordinators of one fetch loop, keyed by `(topic, partition)`.
#[derive(Debug, Default)]
pub struct MemoryCoordinators {
    trackers: HashMap<(String, u32), PauseTracker>,
}

impl MemoryCoordinators {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tracker_mut(&mut self, topic: &str, partition: u32) -> &mut PauseTracker {
        self.trackers
            .entry((topic.to_string(), partition))
            .or_default()
    }
}

impl CoordinatorRegistry for MemoryCoordinators {
    fn find_or_create(&mut self, topic: &str, partition: u32) -> &mut dyn PartitionCoordinator {
        self.tracker_mut(topic, partition)
    }
}

/// Process-wide assignment view that tests rebalance by hand.
#[derive(Debug, Default)]
pub struct MemoryAssignment {
    subscriptions: RwLock<Vec<SubscriptionAssignment>>,
}

impl MemoryAssignment {
    pub fn new(subscriptions: Vec<SubscriptionAssignment>) -> Self {
        Self {
            subscriptions: RwLock::new(subscriptions),
        }
    }

    /// Replace the whole view, as a rebalance would.
    pub fn set(&self, subscriptions: Vec<SubscriptionAssignment>) {
        *self
            .subscriptions
            .write()
            .unwrap_or_else(|e| e.into_inner()) = subscriptions;
    }
}

#[async_trait]
impl AssignmentSource for MemoryAssignment {
    async fn snapshot(&self) -> Vec<SubscriptionAssignment> {
        self.subscriptions
            .read()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

/// A record handed to a [`RecordingPublisher`].
#[derive(Debug, Clone)]
pub struct RecordedMessage {
    pub topic: String,
    pub key: Option<String>,
    pub payload: Vec<u8>,
    pub message: WireMessage,
}

impl RecordedMessage {
    /// The record as a consumer of the commands topic would see it.
    pub fn to_inbound(&self) -> InboundRecord {
        InboundRecord {
            key: self.key.clone(),
            payload: self.payload.clone(),
        }
    }
}

/// Publisher that keeps every record it is given.
#[derive(Debug, Default)]
pub struct RecordingPublisher {
    records: Mutex<Vec<RecordedMessage>>,
    failures: AtomicUsize,
}

impl RecordingPublisher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fail the next `count` publishes.
    pub fn fail_next(&self, count: usize) {
        self.failures.store(count, Ordering::SeqCst);
    }

    pub fn records(&self) -> Vec<RecordedMessage> {
        self.records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .clone()
    }
}

#[async_trait]
impl Publisher for RecordingPublisher {
    async fn publish(&self, topic: &str, key: Option<&str>, payload: Vec<u8>) -> Result<()> {
        let failing = self
            .failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(CommandingError::Dispatch(format!(
                "publish to {} refused",
                topic
            )));
        }

        let message = WireMessage::decode(&payload)?;
        self.records
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(RecordedMessage {
                topic: topic.to_string(),
                key: key.map(str::to_string),
                payload,
                message,
            });
        Ok(())
    }
}

/// Signal sender that records instead of raising.
#[derive(Debug, Default)]
pub struct RecordingSignals {
    sent: Mutex<Vec<ProcessSignal>>,
    failing: AtomicBool,
}

impl RecordingSignals {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following send fail.
    pub fn fail(&self) {
        self.failing.store(true, Ordering::SeqCst);
    }

    pub fn sent(&self) -> Vec<ProcessSignal> {
        self.sent.lock().unwrap_or_else(|e| e.into_inner()).clone()
    }
}

impl SignalSender for RecordingSignals {
    fn send(&self, signal: ProcessSignal) -> Result<()> {
        if self.failing.load(Ordering::SeqCst) {
            return Err(CommandingError::Client(format!("{} signal refused", signal)));
        }

        self.sent
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .push(signal);
        Ok(())
    }
}

/// Command source fed through a channel.
pub struct ChannelSource {
    rx: mpsc::UnboundedReceiver<InboundRecord>,
    poll_failures: Arc<AtomicUsize>,
}

/// Producer half of a [`ChannelSource`].
#[derive(Clone)]
pub struct ChannelFeed {
    tx: mpsc::UnboundedSender<InboundRecord>,
    poll_failures: Arc<AtomicUsize>,
}

impl ChannelSource {
    pub fn new() -> (Self, ChannelFeed) {
        let (tx, rx) = mpsc::unbounded_channel();
        let poll_failures = Arc::new(AtomicUsize::new(0));

        (
            Self {
                rx,
                poll_failures: Arc::clone(&poll_failures),
            },
            ChannelFeed { tx, poll_failures },
        )
    }
}

impl ChannelFeed {
    /// Deliver a raw record. Returns false once the source is gone.
    pub fn send(&self, record: InboundRecord) -> bool {
        self.tx.send(record).is_ok()
    }

    /// Encode and deliver a message, keyed by its routing key.
    pub fn send_message(&self, message: &WireMessage) -> Result<bool> {
        let payload = message.encode()?;
        Ok(self.send(InboundRecord {
            key: message.record_key().map(str::to_string),
            payload,
        }))
    }

    /// Fail the next `count` polls.
    pub fn fail_next_polls(&self, count: usize) {
        self.poll_failures.store(count, Ordering::SeqCst);
    }
}

#[async_trait]
impl CommandSource for ChannelSource {
    async fn poll(&mut self, max_wait: Duration) -> Result<Option<InboundRecord>> {
        let failing = self
            .poll_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if failing {
            return Err(CommandingError::Source("broker unavailable".to_string()));
        }

        match tokio::time::timeout(max_wait, self.rx.recv()).await {
            Ok(Some(record)) => Ok(Some(record)),
            Ok(None) => {
                // Every feed is gone; behave like an idle topic.
                tokio::time::sleep(max_wait).await;
                Ok(None)
            }
            Err(_) => Ok(None),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_memory_client_assignment_hides_empty_topics() {
        let client = MemoryClient::new();
        client.assign("orders", vec![1]);
        client.revoke("orders", 1);
        client.assign("payments", vec![0]);

        let assignment = client.current_assignment().await;
        assert!(!assignment.contains_key("orders"));
        assert_eq!(assignment["payments"], vec![0]);
        assert!(!client.mark_as_consumed("orders", 1, 0).await.unwrap());
    }

    #[test]
    fn test_pause_tracker_expire() {
        let mut tracker = PauseTracker::default();
        assert!(!tracker.is_paused());

        tracker.pause(60_000);
        assert!(tracker.is_paused());

        tracker.expire();
        assert!(!tracker.is_paused());
    }

    #[tokio::test]
    async fn test_channel_source_times_out_and_fails_on_demand() {
        let (mut source, feed) = ChannelSource::new();
        feed.fail_next_polls(1);

        assert!(source.poll(Duration::from_millis(5)).await.is_err());
        assert!(source.poll(Duration::from_millis(5)).await.unwrap().is_none());

        feed.send(InboundRecord {
            key: Some("*".to_string()),
            payload: b"{}".to_vec(),
        });
        let record = source.poll(Duration::from_millis(5)).await.unwrap().unwrap();
        assert_eq!(record.key.as_deref(), Some("*"));
    }
}
