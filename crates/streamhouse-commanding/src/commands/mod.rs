//! Command table and process-scoped commands.
//!
//! Every command id the protocol recognizes maps to exactly one
//! [`CommandId`]. The table is closed: dispatch over it is an exhaustive
//! `match`, so adding a command without wiring its execution fails to compile.
//!
//! | Id                   | Scope     | Executed by                      |
//! |----------------------|-----------|----------------------------------|
//! | `consumers.quiet`    | process   | listener, inline                 |
//! | `consumers.stop`     | process   | listener, inline                 |
//! | `consumers.trace`    | process   | listener, inline                 |
//! | `partitions.pause`   | partition | owning fetch loop, via tracker   |
//! | `partitions.resume`  | partition | owning fetch loop, via tracker   |
//! | `partitions.seek`    | partition | owning fetch loop, via tracker   |
//! | `topics.pause`       | topic     | owning fetch loop, via tracker   |
//! | `topics.resume`      | topic     | owning fetch loop, via tracker   |
//!
//! The unscoped ids `quiet`, `stop` and `trace` are accepted as aliases of
//! their `consumers.*` counterparts. The unscoped `seek` only echoes an
//! acceptance and is kept for operators still sending it.

pub mod consumers;
pub mod trace;

use crate::dispatcher::Dispatcher;
use crate::error::{CommandingError, Result};
use crate::process::{ProcessInfo, SignalSender};
use crate::request::Request;
use async_trait::async_trait;
use std::fmt;
use std::str::FromStr;
use std::sync::Arc;

pub use consumers::{LegacySeek, Quiet, Stop, Trace};

/// Where a command is executed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandScope {
    Process,
    Partition,
    Topic,
}

/// Every command the protocol understands.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum CommandId {
    ConsumersQuiet,
    ConsumersStop,
    ConsumersTrace,
    LegacySeek,
    PartitionsPause,
    PartitionsResume,
    PartitionsSeek,
    TopicsPause,
    TopicsResume,
}

const COMMAND_TABLE: &[(&str, CommandId)] = &[
    ("consumers.quiet", CommandId::ConsumersQuiet),
    ("consumers.stop", CommandId::ConsumersStop),
    ("consumers.trace", CommandId::ConsumersTrace),
    ("partitions.pause", CommandId::PartitionsPause),
    ("partitions.resume", CommandId::PartitionsResume),
    ("partitions.seek", CommandId::PartitionsSeek),
    ("topics.pause", CommandId::TopicsPause),
    ("topics.resume", CommandId::TopicsResume),
    ("quiet", CommandId::ConsumersQuiet),
    ("stop", CommandId::ConsumersStop),
    ("trace", CommandId::ConsumersTrace),
    ("seek", CommandId::LegacySeek),
];

impl CommandId {
    /// Canonical wire id.
    pub fn as_str(&self) -> &'static str {
        match self {
            CommandId::ConsumersQuiet => "consumers.quiet",
            CommandId::ConsumersStop => "consumers.stop",
            CommandId::ConsumersTrace => "consumers.trace",
            CommandId::LegacySeek => "seek",
            CommandId::PartitionsPause => "partitions.pause",
            CommandId::PartitionsResume => "partitions.resume",
            CommandId::PartitionsSeek => "partitions.seek",
            CommandId::TopicsPause => "topics.pause",
            CommandId::TopicsResume => "topics.resume",
        }
    }

    pub fn scope(&self) -> CommandScope {
        match self {
            CommandId::ConsumersQuiet
            | CommandId::ConsumersStop
            | CommandId::ConsumersTrace
            | CommandId::LegacySeek => CommandScope::Process,
            CommandId::PartitionsPause
            | CommandId::PartitionsResume
            | CommandId::PartitionsSeek => CommandScope::Partition,
            CommandId::TopicsPause | CommandId::TopicsResume => CommandScope::Topic,
        }
    }

    /// Resolve the command id of a request.
    pub fn of(request: &Request) -> Result<Self> {
        request.name()?.parse()
    }
}

impl FromStr for CommandId {
    type Err = CommandingError;

    fn from_str(name: &str) -> Result<Self> {
        COMMAND_TABLE
            .iter()
            .find(|(id, _)| *id == name)
            .map(|(_, command)| *command)
            .ok_or_else(|| CommandingError::UnknownCommand(name.to_string()))
    }
}

impl fmt::Display for CommandId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What a process-scoped command needs to run.
#[derive(Clone)]
pub struct CommandContext {
    pub process: ProcessInfo,
    pub dispatcher: Dispatcher,
    pub signals: Arc<dyn SignalSender>,
}

/// A command executed inline by the listener.
#[async_trait]
pub trait Command: Send + Sync {
    async fn execute(&self, ctx: &CommandContext, request: &Request) -> Result<()>;
}

/// Execute a process-scoped command.
///
/// Partition- and topic-scoped ids are never executed here; they are routed
/// through the tracker to their fetch loop.
pub async fn execute(id: CommandId, ctx: &CommandContext, request: &Request) -> Result<()> {
    match id {
        CommandId::ConsumersQuiet => Quiet.execute(ctx, request).await,
        CommandId::ConsumersStop => Stop.execute(ctx, request).await,
        CommandId::ConsumersTrace => Trace.execute(ctx, request).await,
        CommandId::LegacySeek => LegacySeek.execute(ctx, request).await,
        CommandId::PartitionsPause
        | CommandId::PartitionsResume
        | CommandId::PartitionsSeek
        | CommandId::TopicsPause
        | CommandId::TopicsResume => Err(CommandingError::UnknownCommand(format!(
            "{} is not a process command",
            id
        ))),
    }
}
