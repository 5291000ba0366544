//! Manager - Commanding Lifecycle
//!
//! The manager is the single entry point a consumer process embeds. It owns
//! the per-process pieces (tracker, dispatcher, listener task) and hands out
//! the [`FetchLoopHook`] that every subscription group's fetch loop calls.
//!
//! # Lifecycle
//!
//! 1. **Build**: validate configuration, spawn the dispatcher delivery task
//! 2. **Start**: spawn the listener task (no-op when commanding is inactive)
//! 3. **Stop**: cancel the listener, wait for the record in flight, flush
//!    everything dispatched so far
//!
//! # Examples
//!
//! ```ignore
//! use streamhouse_commanding::{Manager, CommandingConfig};
//!
//! let manager = Manager::builder()
//!     .config(CommandingConfig::from_env()?)
//!     .source(Box::new(source))
//!     .publisher(publisher)
//!     .assignment(assignment)
//!     .build()
//!     .await?;
//!
//! manager.start().await?;
//!
//! // In each fetch loop:
//! let hook = manager.hook();
//! hook.before_poll(&mut ctx).await;
//!
//! manager.stop().await?;
//! ```

use crate::client::AssignmentSource;
use crate::commands::CommandContext;
use crate::config::CommandingConfig;
use crate::dispatcher::{Dispatcher, Publisher};
use crate::error::{CommandingError, Result};
use crate::executor::Executor;
use crate::hook::FetchLoopHook;
use crate::listener::{CommandSource, Listener};
use crate::metrics;
use crate::process::{OsSignals, ProcessInfo, ProcessMode, SignalSender};
use crate::tracker::Tracker;
use std::sync::Arc;
use tokio::sync::{Mutex, RwLock};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum ManagerState {
    Created,
    Started,
    Stopped,
}

struct ListenerTask {
    handle: JoinHandle<Box<dyn CommandSource>>,
    cancel: CancellationToken,
}

/// Owns the commanding subsystem of one consumer process.
pub struct Manager {
    config: CommandingConfig,
    ctx: CommandContext,
    tracker: Arc<Tracker>,
    assignment: Arc<dyn AssignmentSource>,

    /// Present whenever the listener is not running
    source: Mutex<Option<Box<dyn CommandSource>>>,

    state: Arc<RwLock<ManagerState>>,
    listener: Arc<RwLock<Option<ListenerTask>>>,
}

impl Manager {
    pub fn builder() -> ManagerBuilder {
        ManagerBuilder::new()
    }

    /// Spawn the listener task.
    ///
    /// # Errors
    ///
    /// - `AlreadyStarted`: the listener is already running
    pub async fn start(&self) -> Result<()> {
        let mut state = self.state.write().await;

        if *state == ManagerState::Started {
            return Err(CommandingError::AlreadyStarted);
        }

        if !self.config.active {
            info!(
                process_id = %self.ctx.process.id,
                "Commanding inactive, listener not started"
            );
            return Ok(());
        }

        let source = self.source.lock().await.take().ok_or_else(|| {
            CommandingError::Source("command source was lost by a failed listener".to_string())
        })?;

        info!(
            process_id = %self.ctx.process.id,
            topic = %self.config.topic,
            max_wait_time_ms = self.config.max_wait_time_ms,
            pause_timeout_ms = self.config.pause_timeout_ms,
            "Starting commanding"
        );

        let listener = Listener::new(
            self.ctx.clone(),
            Arc::clone(&self.tracker),
            Arc::clone(&self.assignment),
            &self.config,
        );
        let cancel = CancellationToken::new();
        let handle = tokio::spawn(listener.run(source, cancel.clone()));

        *self.listener.write().await = Some(ListenerTask { handle, cancel });
        *state = ManagerState::Started;

        Ok(())
    }

    /// Stop the listener and flush pending dispatches.
    ///
    /// Queued commands stay in the tracker; fetch loops keep draining them
    /// until the host shuts those down too.
    ///
    /// When commanding is inactive there is no listener to stop and this is
    /// a no-op.
    ///
    /// # Errors
    ///
    /// - `NotStarted`: the manager was never started
    /// - `Join`: the listener task panicked
    pub async fn stop(&self) -> Result<()> {
        let mut state = self.state.write().await;

        match *state {
            ManagerState::Created if !self.config.active => {
                info!(
                    process_id = %self.ctx.process.id,
                    "Commanding inactive, nothing to stop"
                );
                return Ok(());
            }
            ManagerState::Created => return Err(CommandingError::NotStarted),
            ManagerState::Stopped => {
                warn!(
                    process_id = %self.ctx.process.id,
                    "Commanding already stopped, skipping stop"
                );
                return Ok(());
            }
            ManagerState::Started => {}
        }

        info!(process_id = %self.ctx.process.id, "Stopping commanding");

        *state = ManagerState::Stopped;

        if let Some(task) = self.listener.write().await.take() {
            task.cancel.cancel();
            let joined = task.handle.await;
            self.ctx.dispatcher.flush().await;

            *self.source.lock().await = Some(joined?);
        }

        info!(process_id = %self.ctx.process.id, "Commanding stopped");
        Ok(())
    }

    pub async fn is_running(&self) -> bool {
        *self.state.read().await == ManagerState::Started
    }

    /// Hook for one subscription group's fetch loop.
    pub fn hook(&self) -> FetchLoopHook {
        FetchLoopHook::new(Executor::new(
            self.ctx.process.id.clone(),
            Arc::clone(&self.tracker),
            self.ctx.dispatcher.clone(),
        ))
    }

    /// Dispatcher for publishing commands from this process.
    pub fn dispatcher(&self) -> &Dispatcher {
        &self.ctx.dispatcher
    }

    pub fn tracker(&self) -> Arc<Tracker> {
        Arc::clone(&self.tracker)
    }

    pub fn process(&self) -> &ProcessInfo {
        &self.ctx.process
    }

    pub fn config(&self) -> &CommandingConfig {
        &self.config
    }
}

/// Builder for [`Manager`].
pub struct ManagerBuilder {
    config: CommandingConfig,
    process: Option<ProcessInfo>,
    source: Option<Box<dyn CommandSource>>,
    publisher: Option<Arc<dyn Publisher>>,
    assignment: Option<Arc<dyn AssignmentSource>>,
    signals: Option<Arc<dyn SignalSender>>,
}

impl ManagerBuilder {
    pub fn new() -> Self {
        Self {
            config: CommandingConfig::default(),
            process: None,
            source: None,
            publisher: None,
            assignment: None,
            signals: None,
        }
    }

    pub fn config(mut self, config: CommandingConfig) -> Self {
        self.config = config;
        self
    }

    /// Process identity (default: detected, standalone)
    pub fn process(mut self, process: ProcessInfo) -> Self {
        self.process = Some(process);
        self
    }

    /// Consumer of the commands topic
    pub fn source(mut self, source: Box<dyn CommandSource>) -> Self {
        self.source = Some(source);
        self
    }

    /// Producer for the commands topic
    pub fn publisher(mut self, publisher: Arc<dyn Publisher>) -> Self {
        self.publisher = Some(publisher);
        self
    }

    /// Live assignment of every subscription group in this process
    pub fn assignment(mut self, assignment: Arc<dyn AssignmentSource>) -> Self {
        self.assignment = Some(assignment);
        self
    }

    /// Signal delivery (default: OS signals)
    pub fn signals(mut self, signals: Arc<dyn SignalSender>) -> Self {
        self.signals = Some(signals);
        self
    }

    /// Validate and build. Must be called inside a tokio runtime.
    pub async fn build(self) -> Result<Manager> {
        self.config.validate()?;

        let source = self
            .source
            .ok_or_else(|| CommandingError::Configuration("source is required".to_string()))?;
        let publisher = self
            .publisher
            .ok_or_else(|| CommandingError::Configuration("publisher is required".to_string()))?;
        let assignment = self
            .assignment
            .ok_or_else(|| CommandingError::Configuration("assignment is required".to_string()))?;

        metrics::init();

        let process = self
            .process
            .unwrap_or_else(|| ProcessInfo::detect(ProcessMode::Standalone));
        let signals = self
            .signals
            .unwrap_or_else(|| Arc::new(OsSignals) as Arc<dyn SignalSender>);
        let dispatcher = Dispatcher::spawn(publisher, self.config.topic.clone());

        Ok(Manager {
            config: self.config,
            ctx: CommandContext {
                process,
                dispatcher,
                signals,
            },
            tracker: Arc::new(Tracker::new()),
            assignment,
            source: Mutex::new(Some(source)),
            state: Arc::new(RwLock::new(ManagerState::Created)),
            listener: Arc::new(RwLock::new(None)),
        })
    }
}

impl Default for ManagerBuilder {
    fn default() -> Self {
        Self::new()
    }
}
