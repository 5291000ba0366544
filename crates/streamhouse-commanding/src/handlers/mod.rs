//! Deferred handlers, executed on the fetch loop that owns their partitions.

pub mod partitions;
pub mod topics;

use crate::commands::CommandId;
use crate::error::{CommandingError, Result};
use crate::request::Request;

pub use partitions::{PartitionHandler, Pause, Resume, Seek, FOREVER_MS};
pub use topics::{TopicHandler, TopicOutcome, TopicPause, TopicResume};

/// A command that must run on an owning fetch loop.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Handler {
    Partition(PartitionHandler),
    Topic(TopicHandler),
}

impl Handler {
    /// Map a request onto its handler.
    ///
    /// Names outside the command table, and process-scoped commands that have
    /// no business on a fetch loop, are unknown-command errors.
    pub fn build(request: &Request) -> Result<Self> {
        let id = CommandId::of(request)?;

        match id {
            CommandId::PartitionsPause => Ok(Handler::Partition(PartitionHandler::Pause(
                Pause::from_request(request)?,
            ))),
            CommandId::PartitionsResume => Ok(Handler::Partition(PartitionHandler::Resume(
                Resume::from_request(request)?,
            ))),
            CommandId::PartitionsSeek => Ok(Handler::Partition(PartitionHandler::Seek(
                Seek::from_request(request)?,
            ))),
            CommandId::TopicsPause => Ok(Handler::Topic(TopicHandler::Pause(
                TopicPause::from_request(request)?,
            ))),
            CommandId::TopicsResume => Ok(Handler::Topic(TopicHandler::Resume(
                TopicResume::from_request(request)?,
            ))),
            CommandId::ConsumersQuiet
            | CommandId::ConsumersStop
            | CommandId::ConsumersTrace
            | CommandId::LegacySeek => Err(CommandingError::UnknownCommand(format!(
                "{} cannot run on a fetch loop",
                id
            ))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::request::Fields;
    use serde_json::json;

    #[test]
    fn test_build_partition_and_topic_handlers() {
        let fields = json!({
            "topic": "orders",
            "partition_id": 2,
            "reset_attempts": true
        })
        .as_object()
        .cloned()
        .unwrap();

        let handler = Handler::build(&Request::new("partitions.resume", fields.clone())).unwrap();
        assert!(matches!(
            handler,
            Handler::Partition(PartitionHandler::Resume(Resume { partition: 2, .. }))
        ));

        let handler = Handler::build(&Request::new("topics.resume", fields)).unwrap();
        assert!(matches!(handler, Handler::Topic(TopicHandler::Resume(_))));
    }

    #[test]
    fn test_build_rejects_unknown_and_process_commands() {
        assert!(matches!(
            Handler::build(&Request::new("partitions.explode", Fields::new())),
            Err(CommandingError::UnknownCommand(_))
        ));
        assert!(matches!(
            Handler::build(&Request::new("consumers.stop", Fields::new())),
            Err(CommandingError::UnknownCommand(_))
        ));
    }
}
