//! StreamHouse Commanding - Remote Control of Consumer Processes
//!
//! Operators pause, resume and seek partitions, pause and resume whole topics,
//! and quiet, stop or trace consumer processes by publishing commands onto a
//! single-partition commands topic. Every consumer process listens on that
//! topic and reports acceptances and results back onto it.
//!
//! ## Architecture
//!
//! ```text
//! operator ─ Dispatcher ─▶ commands topic ─▶ Listener (one per process)
//!                                              │ Matcher
//!                          ┌───────────────────┴─────────────────┐
//!                   process scope                   partition / topic scope
//!                   runs inline                     Tracker ─▶ FetchLoopHook
//!                                                               (owning fetch loop)
//! ```
//!
//! Partition and topic commands never touch partition state from the listener.
//! They are queued and later drained by the fetch loop that owns the partition,
//! right before it polls. Rebalances reject whatever is still queued for the
//! partitions they touch, so no command outlives the ownership it was routed by.
//!
//! ## Components
//!
//! - **Manager**: lifecycle of the listener task, entry point for hosts
//! - **Listener**: consume, match, route
//! - **Tracker**: per-scope FIFO of deferred commands
//! - **FetchLoopHook / Executor**: run or reject deferred commands
//! - **Dispatcher**: fire-and-forget publishing of commands and reports
//!
//! ## Example Usage
//!
//! ```rust,no_run
//! use std::sync::Arc;
//! use streamhouse_commanding::memory::{ChannelSource, MemoryAssignment, RecordingPublisher};
//! use streamhouse_commanding::{CommandingConfig, Manager};
//!
//! # async fn example() -> Result<(), Box<dyn std::error::Error>> {
//! let (source, _feed) = ChannelSource::new();
//!
//! let manager = Manager::builder()
//!     .config(CommandingConfig::from_env()?)
//!     .source(Box::new(source))
//!     .publisher(Arc::new(RecordingPublisher::new()))
//!     .assignment(Arc::new(MemoryAssignment::default()))
//!     .build()
//!     .await?;
//!
//! manager.start().await?;
//!
//! // ... fetch loops call manager.hook() ...
//!
//! manager.stop().await?;
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod commands;
pub mod config;
pub mod dispatcher;
pub mod error;
pub mod executor;
pub mod handlers;
pub mod hook;
pub mod listener;
pub mod manager;
pub mod matcher;
pub mod memory;
pub mod metrics;
pub mod process;
pub mod request;
pub mod tracker;

pub use client::{
    AssignmentSource, ConsumerClient, CoordinatorRegistry, PartitionCoordinator,
    SubscriptionAssignment, TopicAssignment,
};
pub use commands::{CommandId, CommandScope};
pub use config::{BrokerKey, CommandingConfig, DEFAULT_TOPIC};
pub use dispatcher::{Dispatcher, Publisher};
pub use error::{CommandingError, Result};
pub use executor::{Executor, FetchContext};
pub use handlers::FOREVER_MS;
pub use hook::FetchLoopHook;
pub use listener::{CommandSource, InboundRecord, Listener};
pub use manager::{Manager, ManagerBuilder};
pub use matcher::Matcher;
pub use process::{OsSignals, ProcessInfo, ProcessMode, ProcessSignal, SignalSender};
pub use request::{MessageKind, Request, Status, WireMessage, BROADCAST, SCHEMA_VERSION};
pub use tracker::{Scope, Tracker};
