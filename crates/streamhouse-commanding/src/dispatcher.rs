//! Dispatcher - Publishing Commands, Acceptances and Results
//!
//! All three message kinds go to the single-partition commands topic. Every
//! publish is fire-and-forget: the message is queued onto one background
//! delivery task and the caller returns immediately. The single delivery task
//! keeps messages from one process in the order they were dispatched.
//!
//! Publish failures are logged and counted, never retried and never surfaced
//! to the caller.
//!
//! ## Routing
//!
//! | Message                  | Record key          |
//! |--------------------------|---------------------|
//! | command to one process   | target process id   |
//! | broadcast command        | `*`                 |
//! | un-targeted command      | none                |
//! | acceptance / result      | reporting process id|

use crate::error::Result;
use crate::metrics;
use crate::request::{Fields, MessageKind, WireMessage};
use async_trait::async_trait;
use tokio::sync::{mpsc, oneshot};
use tracing::{debug, error};

/// Sink for encoded records on the commands topic.
#[async_trait]
pub trait Publisher: Send + Sync {
    async fn publish(&self, topic: &str, key: Option<&str>, payload: Vec<u8>) -> Result<()>;
}

enum Outbound {
    Message(WireMessage),
    Flush(oneshot::Sender<()>),
}

/// Handle for publishing onto the commands topic. Cheap to clone.
#[derive(Clone)]
pub struct Dispatcher {
    tx: mpsc::UnboundedSender<Outbound>,
}

impl Dispatcher {
    /// Spawn the delivery task. Must be called inside a tokio runtime.
    pub fn spawn(publisher: std::sync::Arc<dyn Publisher>, topic: impl Into<String>) -> Self {
        let topic = topic.into();
        let (tx, mut rx) = mpsc::unbounded_channel::<Outbound>();

        tokio::spawn(async move {
            while let Some(outbound) = rx.recv().await {
                match outbound {
                    Outbound::Message(message) => {
                        deliver(publisher.as_ref(), &topic, message).await
                    }
                    Outbound::Flush(done) => {
                        let _ = done.send(());
                    }
                }
            }

            debug!(topic = %topic, "Dispatcher delivery task stopped");
        });

        Self { tx }
    }

    /// Publish a command for `routing_key` (a process id, `*`, or empty).
    pub fn request(&self, name: &str, fields: Fields, routing_key: &str) {
        self.enqueue(WireMessage::new(MessageKind::Command, name, routing_key, fields));
    }

    /// Report that `process_id` accepted a command for later execution.
    pub fn acceptance(&self, name: &str, process_id: &str, fields: Fields) {
        self.enqueue(WireMessage::new(MessageKind::Acceptance, name, process_id, fields));
    }

    /// Report the terminal outcome of a command executed by `process_id`.
    pub fn result(&self, name: &str, process_id: &str, fields: Fields) {
        self.enqueue(WireMessage::new(MessageKind::Result, name, process_id, fields));
    }

    /// Wait until everything dispatched so far has been handed to the publisher.
    pub async fn flush(&self) {
        let (done_tx, done_rx) = oneshot::channel();
        if self.tx.send(Outbound::Flush(done_tx)).is_ok() {
            let _ = done_rx.await;
        }
    }

    fn enqueue(&self, message: WireMessage) {
        let kind = message.kind;
        let name = message.name.clone();

        if self.tx.send(Outbound::Message(message)).is_err() {
            metrics::record_dispatch_failure(kind);
            error!(
                kind = %kind,
                command = %name,
                "Dispatcher delivery task is gone, dropping message"
            );
        }
    }
}

async fn deliver(publisher: &dyn Publisher, topic: &str, message: WireMessage) {
    let payload = match message.encode() {
        Ok(payload) => payload,
        Err(e) => {
            metrics::record_dispatch_failure(message.kind);
            error!(
                kind = %message.kind,
                command = %message.name,
                error = %e,
                "Failed to encode message"
            );
            return;
        }
    };

    match publisher.publish(topic, message.record_key(), payload).await {
        Ok(()) => {
            debug!(
                kind = %message.kind,
                command = %message.name,
                routing_key = %message.routing_key,
                "Dispatched message"
            );
        }
        Err(e) => {
            metrics::record_dispatch_failure(message.kind);
            error!(
                kind = %message.kind,
                command = %message.name,
                error = %e,
                "Failed to dispatch message"
            );
        }
    }
}
