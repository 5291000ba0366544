//! Executor - Running Deferred Commands On Their Fetch Loop
//!
//! The executor drains the tracker for a scope and either runs each request
//! synchronously on the calling fetch loop ([`Executor::execute`]) or answers
//! it with `rebalance_rejected` without running it ([`Executor::reject`]).
//!
//! Failures are isolated per request: an unknown command or a bad field is
//! logged and counted, publishes no result, and does not stop the drain.

use crate::client::{ConsumerClient, CoordinatorRegistry};
use crate::dispatcher::Dispatcher;
use crate::error::Result;
use crate::handlers::Handler;
use crate::metrics;
use crate::request::{Request, Status};
use crate::tracker::{Scope, Tracker};
use std::sync::Arc;
use tracing::{error, warn};

/// What a fetch loop lends the executor while it runs commands.
pub struct FetchContext<'a> {
    pub consumer_group_id: &'a str,
    pub subscription_group_id: &'a str,
    pub client: &'a dyn ConsumerClient,
    pub coordinators: &'a mut dyn CoordinatorRegistry,
}

/// Drains and runs (or rejects) deferred commands.
#[derive(Clone)]
pub struct Executor {
    process_id: String,
    tracker: Arc<Tracker>,
    dispatcher: Dispatcher,
}

impl Executor {
    pub fn new(
        process_id: impl Into<String>,
        tracker: Arc<Tracker>,
        dispatcher: Dispatcher,
    ) -> Self {
        Self {
            process_id: process_id.into(),
            tracker,
            dispatcher,
        }
    }

    /// Run everything pending for `scope` on the calling fetch loop.
    ///
    /// Returns the number of requests that produced a result.
    pub async fn execute(&self, ctx: &mut FetchContext<'_>, scope: &Scope) -> usize {
        let mut executed = 0;

        for request in self.tracker.drain(scope).await {
            match self.run(ctx, &request).await {
                Ok(()) => executed += 1,
                Err(e) => {
                    metrics::record_error(e.kind());
                    error!(
                        process_id = %self.process_id,
                        scope = %scope,
                        command = ?request.name().ok(),
                        error = %e,
                        "Command execution failed"
                    );
                }
            }
        }

        executed
    }

    /// Answer everything pending for `scope` with `rebalance_rejected`.
    ///
    /// Returns the number of rejected requests.
    pub async fn reject(&self, scope: &Scope) -> usize {
        let pending = self.tracker.drain(scope).await;
        let mut rejected = 0;

        for request in pending {
            let name = match request.name() {
                Ok(name) => name,
                Err(e) => {
                    metrics::record_error(e.kind());
                    error!(scope = %scope, error = %e, "Dropping nameless command");
                    continue;
                }
            };

            self.dispatcher.result(
                name,
                &self.process_id,
                request.result_fields(Status::RebalanceRejected),
            );
            metrics::record_result(name, Status::RebalanceRejected);
            rejected += 1;

            warn!(
                process_id = %self.process_id,
                scope = %scope,
                command = %name,
                "Command rejected by rebalance"
            );
        }

        rejected
    }

    async fn run(&self, ctx: &mut FetchContext<'_>, request: &Request) -> Result<()> {
        let name = request.name()?;

        let fields = match Handler::build(request)? {
            Handler::Partition(handler) => {
                let status = handler.call(ctx.client, &mut *ctx.coordinators).await?;
                metrics::record_result(name, status);
                request.result_fields(status)
            }
            Handler::Topic(handler) => {
                let outcome = handler.call(ctx.client, &mut *ctx.coordinators).await?;
                metrics::record_result(name, Status::Applied);
                outcome.result_fields(request)
            }
        };

        self.dispatcher.result(name, &self.process_id, fields);
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::PartitionCoordinator;
    use crate::memory::{MemoryClient, MemoryCoordinators, RecordingPublisher};
    use crate::request::{Fields, MessageKind};
    use serde_json::json;

    struct Fixture {
        executor: Executor,
        tracker: Arc<Tracker>,
        publisher: Arc<RecordingPublisher>,
        dispatcher: Dispatcher,
        client: MemoryClient,
        coordinators: MemoryCoordinators,
    }

    fn fixture() -> Fixture {
        let tracker = Arc::new(Tracker::new());
        let publisher = Arc::new(RecordingPublisher::new());
        let dispatcher = Dispatcher::spawn(publisher.clone(), "commands");
        let client = MemoryClient::new();
        client.assign("orders", vec![0, 1]);

        Fixture {
            executor: Executor::new("p-1", Arc::clone(&tracker), dispatcher.clone()),
            tracker,
            publisher,
            dispatcher,
            client,
            coordinators: MemoryCoordinators::new(),
        }
    }

    fn request(name: &str, value: serde_json::Value) -> Request {
        Request::new(name, value.as_object().cloned().unwrap_or_else(Fields::new))
    }

    fn pause(partition: u32) -> Request {
        request(
            "partitions.pause",
            json!({
                "topic": "orders",
                "partition_id": partition,
                "duration_ms": 1000,
                "prevent_override": false
            }),
        )
    }

    #[tokio::test]
    async fn test_execute_runs_in_order_and_reports() {
        let mut f = fixture();
        let scope = Scope::partition("sg1", "orders", 0);
        f.tracker.append(scope.clone(), pause(0)).await;
        f.tracker
            .append(
                scope.clone(),
                request(
                    "partitions.resume",
                    json!({"topic": "orders", "partition_id": 0, "reset_attempts": false}),
                ),
            )
            .await;

        let mut ctx = FetchContext {
            consumer_group_id: "cg1",
            subscription_group_id: "sg1",
            client: &f.client,
            coordinators: &mut f.coordinators,
        };
        assert_eq!(f.executor.execute(&mut ctx, &scope).await, 2);
        f.dispatcher.flush().await;

        let records = f.publisher.records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].message.name, "partitions.pause");
        assert_eq!(records[1].message.name, "partitions.resume");
        assert!(records.iter().all(|r| {
            r.message.kind == MessageKind::Result && r.message.fields["status"] == "applied"
        }));
        assert!(f.tracker.is_empty().await);
    }

    #[tokio::test]
    async fn test_unknown_command_publishes_nothing_and_continues() {
        let mut f = fixture();
        let scope = Scope::partition("sg1", "orders", 1);
        f.tracker
            .append(scope.clone(), request("partitions.explode", json!({})))
            .await;
        f.tracker.append(scope.clone(), pause(1)).await;

        let mut ctx = FetchContext {
            consumer_group_id: "cg1",
            subscription_group_id: "sg1",
            client: &f.client,
            coordinators: &mut f.coordinators,
        };
        assert_eq!(f.executor.execute(&mut ctx, &scope).await, 1);
        f.dispatcher.flush().await;

        let records = f.publisher.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].message.name, "partitions.pause");
    }

    #[tokio::test]
    async fn test_failed_client_pause_publishes_no_result() {
        let mut f = fixture();
        f.client.fail_pause("orders", 1);
        let scope = Scope::partition("sg1", "orders", 1);
        f.tracker.append(scope.clone(), pause(1)).await;

        let mut ctx = FetchContext {
            consumer_group_id: "cg1",
            subscription_group_id: "sg1",
            client: &f.client,
            coordinators: &mut f.coordinators,
        };
        assert_eq!(f.executor.execute(&mut ctx, &scope).await, 0);
        f.dispatcher.flush().await;

        assert!(f.publisher.records().is_empty());
        assert!(!f.coordinators.tracker_mut("orders", 1).is_paused());
        assert!(f.tracker.is_empty().await);
    }

    #[tokio::test]
    async fn test_reject_publishes_one_result_per_request() {
        let f = fixture();
        let scope = Scope::topic("cg1", "orders");
        f.tracker
            .append(
                scope.clone(),
                request(
                    "topics.pause",
                    json!({"topic": "orders", "duration_ms": 0, "prevent_override": false}),
                ),
            )
            .await;
        f.tracker
            .append(
                scope.clone(),
                request("topics.resume", json!({"topic": "orders", "reset_attempts": true})),
            )
            .await;

        assert_eq!(f.executor.reject(&scope).await, 2);
        f.dispatcher.flush().await;

        assert!(f.tracker.drain(&scope).await.is_empty());
        let records = f.publisher.records();
        assert_eq!(records.len(), 2);
        assert!(records
            .iter()
            .all(|r| r.message.fields["status"] == "rebalance_rejected"));
        assert!(f.client.calls().is_empty());
    }

    #[tokio::test]
    async fn test_topic_command_reports_partition_lists() {
        let mut f = fixture();
        let scope = Scope::topic("cg1", "orders");
        f.tracker
            .append(
                scope.clone(),
                request(
                    "topics.pause",
                    json!({"topic": "orders", "duration_ms": 0, "prevent_override": true}),
                ),
            )
            .await;

        let mut ctx = FetchContext {
            consumer_group_id: "cg1",
            subscription_group_id: "sg1",
            client: &f.client,
            coordinators: &mut f.coordinators,
        };
        f.executor.execute(&mut ctx, &scope).await;
        f.dispatcher.flush().await;

        let records = f.publisher.records();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].message.fields["partitions_affected"], json!([0, 1]));
        assert_eq!(records[0].message.fields["partitions_prevented"], json!([]));
    }
}
