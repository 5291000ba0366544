//! Error types for StreamHouse commanding.
//!
//! Only [`CommandingError::Configuration`] is fatal, and only at setup time.
//! Every other variant is scoped to a single command: the listener and the
//! executor log it, count it, and move on to the next message.

use thiserror::Error;

pub type Result<T> = std::result::Result<T, CommandingError>;

#[derive(Debug, Error)]
pub enum CommandingError {
    /// Invalid commanding configuration. Raised before the listener starts.
    #[error("Invalid commanding configuration: {0}")]
    Configuration(String),

    /// Request name is not in the command table. No result is published.
    #[error("Unknown command: {0}")]
    UnknownCommand(String),

    #[error("Missing field: {0}")]
    MissingField(String),

    #[error("Field '{field}' is not a valid {expected}")]
    InvalidField {
        field: String,
        expected: &'static str,
    },

    #[error("Malformed command payload: {0}")]
    Decode(#[from] serde_json::Error),

    /// Publishing to the commands topic failed. Logged, never retried.
    #[error("Dispatch failed: {0}")]
    Dispatch(String),

    /// The consumer client rejected an operation.
    #[error("Client error: {0}")]
    Client(String),

    /// The commands topic source failed to deliver a record.
    #[error("Command source error: {0}")]
    Source(String),

    #[error("Commanding already started")]
    AlreadyStarted,

    #[error("Commanding not started")]
    NotStarted,

    #[error("Join error: {0}")]
    Join(#[from] tokio::task::JoinError),
}

impl CommandingError {
    /// Short label used as the `error_type` metric dimension.
    pub fn kind(&self) -> &'static str {
        match self {
            CommandingError::Configuration(_) => "configuration",
            CommandingError::UnknownCommand(_) => "unknown_command",
            CommandingError::MissingField(_) => "missing_field",
            CommandingError::InvalidField { .. } => "invalid_field",
            CommandingError::Decode(_) => "decode",
            CommandingError::Dispatch(_) => "dispatch",
            CommandingError::Client(_) => "client",
            CommandingError::Source(_) => "source",
            CommandingError::AlreadyStarted => "already_started",
            CommandingError::NotStarted => "not_started",
            CommandingError::Join(_) => "join",
        }
    }
}
