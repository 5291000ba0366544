//! Partition-scoped handlers: pause, resume, seek.
//!
//! Handlers mutate pause and seek state, so they only ever run on the fetch
//! loop that owns the partition, after being drained from the tracker.
//!
//! ## State machine per (topic, partition)
//!
//! ```text
//! pause(d, prevent_override)
//!   paused && prevent_override        → prevented
//!   otherwise                         → pause_until = now + (d == 0 ? FOREVER : d)
//!                                       client.pause(...)           → applied
//! resume(reset_attempts)              → pause_until = now
//!                                       reset_attempts? attempts = 0 → applied
//! seek(o, prevent_overtaking, force_resume)
//!   prevent_overtaking && seek_offset >= o → prevented
//!   !mark_as_consumed(o - 1)          → lost_partition
//!   otherwise                         → client.seek(o), seek_offset = o,
//!                                       attempts = 0, force_resume? expire
//!                                                                    → applied
//! ```

use crate::client::{ConsumerClient, CoordinatorRegistry, PartitionCoordinator};
use crate::error::{CommandingError, Result};
use crate::request::{Request, Status};
use tracing::{info, warn};

/// Pause length used when a pause of `0` ms ("until resumed") is requested.
pub const FOREVER_MS: u64 = 10 * 365 * 24 * 60 * 60 * 1000;

/// Read the requested pause duration, accepting `duration` as an alias.
pub(crate) fn duration_ms(request: &Request) -> Result<u64> {
    if request.contains("duration_ms") {
        request.u64_field("duration_ms")
    } else {
        request.u64_field("duration")
    }
}

/// Apply pause semantics to one partition.
pub(crate) async fn pause_partition(
    client: &dyn ConsumerClient,
    coordinator: &mut dyn PartitionCoordinator,
    topic: &str,
    partition: u32,
    duration_ms: u64,
    prevent_override: bool,
) -> Result<Status> {
    if coordinator.is_paused() && prevent_override {
        return Ok(Status::Prevented);
    }

    let duration_ms = if duration_ms == 0 {
        FOREVER_MS
    } else {
        duration_ms
    };

    client.pause(topic, partition, duration_ms).await?;
    coordinator.pause(duration_ms);

    Ok(Status::Applied)
}

/// Apply resume semantics to one partition.
pub(crate) fn resume_partition(
    coordinator: &mut dyn PartitionCoordinator,
    reset_attempts: bool,
) -> Status {
    coordinator.expire();
    if reset_attempts {
        coordinator.reset_attempts();
    }
    Status::Applied
}

/// `partitions.pause`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Pause {
    pub topic: String,
    pub partition: u32,
    pub duration_ms: u64,
    pub prevent_override: bool,
}

impl Pause {
    pub fn from_request(request: &Request) -> Result<Self> {
        Ok(Self {
            topic: request.str_field("topic")?.to_string(),
            partition: request.partition_field("partition_id")?,
            duration_ms: duration_ms(request)?,
            prevent_override: request.bool_field("prevent_override")?,
        })
    }

    pub async fn call(
        &self,
        client: &dyn ConsumerClient,
        coordinator: &mut dyn PartitionCoordinator,
    ) -> Result<Status> {
        let status = pause_partition(
            client,
            coordinator,
            &self.topic,
            self.partition,
            self.duration_ms,
            self.prevent_override,
        )
        .await?;

        info!(
            topic = %self.topic,
            partition_id = self.partition,
            duration_ms = self.duration_ms,
            status = %status,
            "Partition pause handled"
        );
        Ok(status)
    }
}

/// `partitions.resume`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Resume {
    pub topic: String,
    pub partition: u32,
    pub reset_attempts: bool,
}

impl Resume {
    pub fn from_request(request: &Request) -> Result<Self> {
        Ok(Self {
            topic: request.str_field("topic")?.to_string(),
            partition: request.partition_field("partition_id")?,
            reset_attempts: request.bool_field("reset_attempts")?,
        })
    }

    pub fn call(&self, coordinator: &mut dyn PartitionCoordinator) -> Status {
        let status = resume_partition(coordinator, self.reset_attempts);

        info!(
            topic = %self.topic,
            partition_id = self.partition,
            reset_attempts = self.reset_attempts,
            "Partition resumed"
        );
        status
    }
}

/// `partitions.seek`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Seek {
    pub topic: String,
    pub partition: u32,
    pub offset: i64,
    pub prevent_overtaking: bool,
    pub force_resume: bool,
}

impl Seek {
    pub fn from_request(request: &Request) -> Result<Self> {
        let offset = request.i64_field("offset")?;
        check_offset(offset)?;

        Ok(Self {
            topic: request.str_field("topic")?.to_string(),
            partition: request.partition_field("partition_id")?,
            offset,
            prevent_overtaking: request.bool_field("prevent_overtaking")?,
            force_resume: request.bool_field("force_resume")?,
        })
    }

    pub async fn call(
        &self,
        client: &dyn ConsumerClient,
        coordinator: &mut dyn PartitionCoordinator,
    ) -> Result<Status> {
        check_offset(self.offset)?;

        if self.prevent_overtaking {
            if let Some(current) = coordinator.seek_offset() {
                if current >= self.offset {
                    return Ok(Status::Prevented);
                }
            }
        }

        // Marking offset - 1 keeps a poison message at `offset` from pinning
        // the partition after a later rebalance.
        let still_assigned = client
            .mark_as_consumed(&self.topic, self.partition, self.offset - 1)
            .await?;

        if !still_assigned {
            warn!(
                topic = %self.topic,
                partition_id = self.partition,
                offset = self.offset,
                "Partition lost before seek"
            );
            return Ok(Status::LostPartition);
        }

        client.seek(&self.topic, self.partition, self.offset).await?;
        coordinator.set_seek_offset(Some(self.offset));
        coordinator.reset_attempts();

        if self.force_resume {
            coordinator.expire();
        }

        info!(
            topic = %self.topic,
            partition_id = self.partition,
            offset = self.offset,
            force_resume = self.force_resume,
            "Partition seek applied"
        );
        Ok(Status::Applied)
    }
}

/// Seek targets are log positions; negative offsets never name one.
fn check_offset(offset: i64) -> Result<()> {
    if offset < 0 {
        return Err(CommandingError::InvalidField {
            field: "offset".to_string(),
            expected: "non-negative offset",
        });
    }
    Ok(())
}

/// A decoded partition-scoped command.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PartitionHandler {
    Pause(Pause),
    Resume(Resume),
    Seek(Seek),
}

impl PartitionHandler {
    pub fn topic(&self) -> &str {
        match self {
            PartitionHandler::Pause(h) => &h.topic,
            PartitionHandler::Resume(h) => &h.topic,
            PartitionHandler::Seek(h) => &h.topic,
        }
    }

    pub fn partition(&self) -> u32 {
        match self {
            PartitionHandler::Pause(h) => h.partition,
            PartitionHandler::Resume(h) => h.partition,
            PartitionHandler::Seek(h) => h.partition,
        }
    }

    /// Run against the partition's coordinator on the owning fetch loop.
    pub async fn call(
        &self,
        client: &dyn ConsumerClient,
        coordinators: &mut dyn CoordinatorRegistry,
    ) -> Result<Status> {
        let coordinator = coordinators.find_or_create(self.topic(), self.partition());

        match self {
            PartitionHandler::Pause(h) => h.call(client, coordinator).await,
            PartitionHandler::Resume(h) => Ok(h.call(coordinator)),
            PartitionHandler::Seek(h) => h.call(client, coordinator).await,
        }
    }
}
