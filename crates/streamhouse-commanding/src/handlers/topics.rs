//! Topic-scoped handlers: pause and resume every locally owned partition.
//!
//! Topic commands are broadcast. Each process applies the partition semantics
//! independently to the partitions of the topic its fetch loop owns at
//! execution time and reports one aggregated result.

use super::partitions::{duration_ms, pause_partition, resume_partition};
use crate::client::{ConsumerClient, CoordinatorRegistry};
use crate::error::Result;
use crate::request::{Fields, Request, Status};
use serde_json::Value;
use tracing::{info, warn};

/// Aggregated outcome across the owned partitions of a topic.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TopicOutcome {
    pub partitions_affected: Vec<u32>,
    pub partitions_prevented: Vec<u32>,
    /// Partitions whose client pause failed; left untouched.
    pub partitions_failed: Vec<u32>,
}

impl TopicOutcome {
    /// Result fields: request fields, status and both partition lists, plus
    /// `partitions_failed` when any partition could not be paused.
    pub fn result_fields(&self, request: &Request) -> Fields {
        let mut fields = request.result_fields(Status::Applied);
        fields.insert(
            "partitions_affected".to_string(),
            Value::from(self.partitions_affected.clone()),
        );
        fields.insert(
            "partitions_prevented".to_string(),
            Value::from(self.partitions_prevented.clone()),
        );
        if !self.partitions_failed.is_empty() {
            fields.insert(
                "partitions_failed".to_string(),
                Value::from(self.partitions_failed.clone()),
            );
        }
        fields
    }
}

/// `topics.pause`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicPause {
    pub topic: String,
    pub duration_ms: u64,
    pub prevent_override: bool,
}

impl TopicPause {
    pub fn from_request(request: &Request) -> Result<Self> {
        Ok(Self {
            topic: request.str_field("topic")?.to_string(),
            duration_ms: duration_ms(request)?,
            prevent_override: request.bool_field("prevent_override")?,
        })
    }

    pub async fn call(
        &self,
        client: &dyn ConsumerClient,
        coordinators: &mut dyn CoordinatorRegistry,
    ) -> Result<TopicOutcome> {
        let mut outcome = TopicOutcome::default();

        for partition in owned_partitions(client, &self.topic).await {
            let coordinator = coordinators.find_or_create(&self.topic, partition);
            let status = pause_partition(
                client,
                coordinator,
                &self.topic,
                partition,
                self.duration_ms,
                self.prevent_override,
            )
            .await;

            match status {
                Ok(Status::Prevented) => outcome.partitions_prevented.push(partition),
                Ok(_) => outcome.partitions_affected.push(partition),
                Err(e) => {
                    warn!(
                        topic = %self.topic,
                        partition_id = partition,
                        error = %e,
                        "Partition pause failed, continuing with the rest of the topic"
                    );
                    outcome.partitions_failed.push(partition);
                }
            }
        }

        info!(
            topic = %self.topic,
            affected = ?outcome.partitions_affected,
            prevented = ?outcome.partitions_prevented,
            failed = ?outcome.partitions_failed,
            "Topic pause handled"
        );
        Ok(outcome)
    }
}

/// `topics.resume`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopicResume {
    pub topic: String,
    pub reset_attempts: bool,
}

impl TopicResume {
    pub fn from_request(request: &Request) -> Result<Self> {
        Ok(Self {
            topic: request.str_field("topic")?.to_string(),
            reset_attempts: request.bool_field("reset_attempts")?,
        })
    }

    pub async fn call(
        &self,
        client: &dyn ConsumerClient,
        coordinators: &mut dyn CoordinatorRegistry,
    ) -> Result<TopicOutcome> {
        let mut outcome = TopicOutcome::default();

        for partition in owned_partitions(client, &self.topic).await {
            let coordinator = coordinators.find_or_create(&self.topic, partition);
            resume_partition(coordinator, self.reset_attempts);
            outcome.partitions_affected.push(partition);
        }

        info!(
            topic = %self.topic,
            affected = ?outcome.partitions_affected,
            reset_attempts = self.reset_attempts,
            "Topic resume handled"
        );
        Ok(outcome)
    }
}

/// A decoded topic-scoped command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TopicHandler {
    Pause(TopicPause),
    Resume(TopicResume),
}

impl TopicHandler {
    pub async fn call(
        &self,
        client: &dyn ConsumerClient,
        coordinators: &mut dyn CoordinatorRegistry,
    ) -> Result<TopicOutcome> {
        match self {
            TopicHandler::Pause(h) => h.call(client, coordinators).await,
            TopicHandler::Resume(h) => h.call(client, coordinators).await,
        }
    }
}

async fn owned_partitions(client: &dyn ConsumerClient, topic: &str) -> Vec<u32> {
    let mut partitions = client
        .current_assignment()
        .await
        .remove(topic)
        .unwrap_or_default();
    partitions.sort_unstable();
    partitions
}
