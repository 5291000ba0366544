//! Fetch-loop hook.
//!
//! The consumer runtime calls this from every subscription group's fetch loop:
//!
//! - [`FetchLoopHook::before_poll`] right before each poll, to execute queued
//!   commands for the partitions about to be polled;
//! - [`FetchLoopHook::on_partitions_assigned`] and
//!   [`FetchLoopHook::on_partitions_revoked`] from the rebalance callbacks, to
//!   reject every queued command for the partitions (and their topics) the
//!   rebalance touched. Nothing queued before a rebalance survives it.

use crate::client::TopicAssignment;
use crate::executor::{Executor, FetchContext};
use crate::tracker::Scope;
use tracing::debug;

#[derive(Clone)]
pub struct FetchLoopHook {
    executor: Executor,
}

impl FetchLoopHook {
    pub fn new(executor: Executor) -> Self {
        Self { executor }
    }

    /// Execute queued commands for everything this fetch loop owns.
    pub async fn before_poll(&self, ctx: &mut FetchContext<'_>) -> usize {
        let assignment = ctx.client.current_assignment().await;
        let mut executed = 0;

        for (topic, partitions) in &assignment {
            let scope = Scope::topic(ctx.consumer_group_id, topic.as_str());
            executed += self.executor.execute(ctx, &scope).await;

            for partition in partitions {
                let scope = Scope::partition(ctx.subscription_group_id, topic.as_str(), *partition);
                executed += self.executor.execute(ctx, &scope).await;
            }
        }

        if executed > 0 {
            debug!(
                subscription_group_id = %ctx.subscription_group_id,
                executed,
                "Executed queued commands before poll"
            );
        }

        executed
    }

    /// Rebalance barrier for newly assigned partitions.
    pub async fn on_partitions_assigned(
        &self,
        ctx: &FetchContext<'_>,
        partitions: &TopicAssignment,
    ) -> usize {
        self.reject_touched(ctx, partitions).await
    }

    /// Rebalance barrier for revoked partitions.
    pub async fn on_partitions_revoked(
        &self,
        ctx: &FetchContext<'_>,
        partitions: &TopicAssignment,
    ) -> usize {
        self.reject_touched(ctx, partitions).await
    }

    async fn reject_touched(&self, ctx: &FetchContext<'_>, partitions: &TopicAssignment) -> usize {
        let mut rejected = 0;

        for (topic, ids) in partitions {
            rejected += self
                .executor
                .reject(&Scope::topic(ctx.consumer_group_id, topic.as_str()))
                .await;

            for partition in ids {
                rejected += self
                    .executor
                    .reject(&Scope::partition(
                        ctx.subscription_group_id,
                        topic.as_str(),
                        *partition,
                    ))
                    .await;
            }
        }

        rejected
    }
}
