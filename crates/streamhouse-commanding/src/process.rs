//! Process identity and lifecycle signals.

use crate::error::{CommandingError, Result};
use std::fmt;

/// How this process's lifecycle is owned.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessMode {
    /// The process owns its own OS signals.
    Standalone,
    /// A supervisor owns signals; process-scoped commands are no-ops.
    Swarm,
}

/// Identity of the running consumer process.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessInfo {
    pub id: String,
    pub mode: ProcessMode,
}

impl ProcessInfo {
    pub fn new(id: impl Into<String>, mode: ProcessMode) -> Self {
        Self {
            id: id.into(),
            mode,
        }
    }

    /// Build an id of the form `<hostname>:<pid>:<random>`.
    pub fn detect(mode: ProcessMode) -> Self {
        let host = hostname::get()
            .ok()
            .and_then(|h| h.to_str().map(str::to_string))
            .unwrap_or_else(|| "unknown".to_string());
        let nonce = uuid::Uuid::new_v4().simple().to_string();

        Self::new(
            format!("{}:{}:{}", host, std::process::id(), &nonce[..12]),
            mode,
        )
    }

    pub fn is_standalone(&self) -> bool {
        self.mode == ProcessMode::Standalone
    }
}

/// Lifecycle signal delivered to the current process.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessSignal {
    /// Stop accepting new work.
    Quiet,
    /// Terminate.
    Stop,
}

impl fmt::Display for ProcessSignal {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProcessSignal::Quiet => write!(f, "quiet"),
            ProcessSignal::Stop => write!(f, "stop"),
        }
    }
}

/// Delivers lifecycle signals to the current process.
pub trait SignalSender: Send + Sync {
    fn send(&self, signal: ProcessSignal) -> Result<()>;
}

/// Raises real OS signals on the current process: `SIGTSTP` for quiet,
/// `SIGTERM` for stop.
#[derive(Debug, Default, Clone, Copy)]
pub struct OsSignals;

#[cfg(unix)]
impl SignalSender for OsSignals {
    fn send(&self, signal: ProcessSignal) -> Result<()> {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        let os_signal = match signal {
            ProcessSignal::Quiet => Signal::SIGTSTP,
            ProcessSignal::Stop => Signal::SIGTERM,
        };

        kill(Pid::this(), os_signal).map_err(|e| {
            CommandingError::Client(format!("failed to send {}: {}", os_signal.as_str(), e))
        })
    }
}

#[cfg(not(unix))]
impl SignalSender for OsSignals {
    fn send(&self, signal: ProcessSignal) -> Result<()> {
        Err(CommandingError::Client(format!(
            "{} signal delivery is only supported on unix",
            signal
        )))
    }
}
