//! Listener - Consuming The Commands Topic
//!
//! One background task per process polls the commands topic, filters every
//! record through the [`Matcher`], and routes what matches:
//!
//! ```text
//! record ─ decode ─ match ─┬─ process scope   → command runs inline
//!                          ├─ partition scope → tracker + acceptance
//!                          └─ topic scope     → skipped result, or tracker + acceptance
//! ```
//!
//! A failure while handling one record is logged, counted, and never stops the
//! loop. A failed poll backs off for `pause_timeout_ms` before polling again.
//! Cancellation is checked between records, so the record being handled when
//! [`Manager::stop`] is called always finishes.
//!
//! [`Manager::stop`]: crate::manager::Manager::stop

use crate::client::{AssignmentSource, SubscriptionAssignment};
use crate::commands::{self, CommandContext, CommandId, CommandScope};
use crate::config::CommandingConfig;
use crate::error::{CommandingError, Result};
use crate::matcher::Matcher;
use crate::metrics;
use crate::request::{Request, Status, WireMessage};
use crate::tracker::{Scope, Tracker};
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

/// A raw record read from the commands topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundRecord {
    pub key: Option<String>,
    pub payload: Vec<u8>,
}

/// Consumer of the single-partition commands topic.
#[async_trait]
pub trait CommandSource: Send {
    /// Wait up to `max_wait` for the next record.
    async fn poll(&mut self, max_wait: Duration) -> Result<Option<InboundRecord>>;
}

/// Routes matching commands to inline execution or to the tracker.
pub struct Listener {
    ctx: CommandContext,
    matcher: Matcher,
    tracker: Arc<Tracker>,
    assignment: Arc<dyn AssignmentSource>,
    pause_timeout: Duration,
    max_wait: Duration,
}

impl Listener {
    pub fn new(
        ctx: CommandContext,
        tracker: Arc<Tracker>,
        assignment: Arc<dyn AssignmentSource>,
        config: &CommandingConfig,
    ) -> Self {
        Self {
            matcher: Matcher::new(ctx.process.id.clone()),
            ctx,
            tracker,
            assignment,
            pause_timeout: config.pause_timeout(),
            max_wait: config.max_wait_time(),
        }
    }

    /// Poll until cancelled, then hand the source back.
    pub async fn run(
        self,
        mut source: Box<dyn CommandSource>,
        cancel: CancellationToken,
    ) -> Box<dyn CommandSource> {
        info!(process_id = %self.ctx.process.id, "Command listener started");

        loop {
            let polled = tokio::select! {
                _ = cancel.cancelled() => break,
                polled = source.poll(self.max_wait) => polled,
            };

            match polled {
                Ok(Some(record)) => {
                    if let Err(e) = self.handle(&record).await {
                        metrics::record_error(e.kind());
                        match e {
                            CommandingError::Decode(_) => warn!(
                                process_id = %self.ctx.process.id,
                                key = ?record.key,
                                error = %e,
                                "Dropping malformed command record"
                            ),
                            _ => error!(
                                process_id = %self.ctx.process.id,
                                key = ?record.key,
                                error = %e,
                                "Command handling failed"
                            ),
                        }
                    }
                }
                Ok(None) => {}
                Err(e) => {
                    metrics::record_error(e.kind());
                    warn!(
                        process_id = %self.ctx.process.id,
                        error = %e,
                        backoff_ms = self.pause_timeout.as_millis() as u64,
                        "Commands poll failed, backing off"
                    );

                    tokio::select! {
                        _ = cancel.cancelled() => break,
                        _ = tokio::time::sleep(self.pause_timeout) => {}
                    }
                }
            }
        }

        info!(process_id = %self.ctx.process.id, "Command listener stopped");
        source
    }

    /// Handle one record from the commands topic.
    pub async fn handle(&self, record: &InboundRecord) -> Result<()> {
        let message = WireMessage::decode(&record.payload)?;
        let assignment = self.assignment.snapshot().await;

        if !self.matcher.matches(&message, &assignment) {
            return Ok(());
        }

        let request = message.into_request();
        let id = CommandId::of(&request)?;
        metrics::record_received(id.as_str());

        debug!(
            process_id = %self.ctx.process.id,
            command = %id,
            routing_key = %request.routing_key(),
            "Command matched"
        );

        match id.scope() {
            CommandScope::Process => commands::execute(id, &self.ctx, &request).await,
            CommandScope::Partition => self.defer_partition(request, &assignment).await,
            CommandScope::Topic => self.defer_topic(request, &assignment).await,
        }
    }

    async fn defer_partition(
        &self,
        request: Request,
        assignment: &[SubscriptionAssignment],
    ) -> Result<()> {
        let topic = request.str_field("topic")?;
        let partition = request.partition_field("partition_id")?;
        let consumer_group_id = request.optional_str("consumer_group_id")?;
        let subscription_group_id = request.optional_str("subscription_group_id")?;

        // An explicit subscription group only narrows the search: the command
        // is queued for a fetch loop that actually owns the partition, or not
        // at all.
        let owner = assignment.iter().find(|s| {
            s.owns_partition(topic, partition)
                && consumer_group_id.map_or(true, |cg| s.consumer_group_id == cg)
                && subscription_group_id.map_or(true, |sg| s.subscription_group_id == sg)
        });

        let Some(owner) = owner else {
            debug!(
                process_id = %self.ctx.process.id,
                topic = %topic,
                partition_id = partition,
                subscription_group_id = ?subscription_group_id,
                "Partition not owned by the addressed subscription group, dropping command"
            );
            return Ok(());
        };

        let scope = Scope::partition(owner.subscription_group_id.clone(), topic, partition);
        self.enqueue(scope, request).await
    }

    async fn defer_topic(
        &self,
        request: Request,
        assignment: &[SubscriptionAssignment],
    ) -> Result<()> {
        let name = request.name()?;
        let topic = request.str_field("topic")?;
        let consumer_group_id = request.str_field("consumer_group_id")?;

        let owned = assignment
            .iter()
            .any(|s| s.consumer_group_id == consumer_group_id && s.owns_topic(topic));

        if !owned {
            warn!(
                process_id = %self.ctx.process.id,
                command = %name,
                consumer_group_id = %consumer_group_id,
                topic = %topic,
                "Topic not consumed here by this consumer group, skipping"
            );
            self.ctx.dispatcher.result(
                name,
                &self.ctx.process.id,
                request.result_fields(Status::Skipped),
            );
            metrics::record_result(name, Status::Skipped);
            return Ok(());
        }

        let scope = Scope::topic(consumer_group_id, topic);
        self.enqueue(scope, request).await
    }

    async fn enqueue(&self, scope: Scope, request: Request) -> Result<()> {
        let name = request.name()?.to_string();
        let fields = request.fields().clone();

        debug!(
            process_id = %self.ctx.process.id,
            command = %name,
            scope = %scope,
            "Command queued"
        );
        self.tracker.append(scope, request).await;
        self.ctx.dispatcher.acceptance(&name, &self.ctx.process.id, fields);
        Ok(())
    }
}
