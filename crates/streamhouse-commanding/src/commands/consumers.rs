//! Process-scoped commands.
//!
//! These run inline on the listener as soon as they match. They only act when
//! the process runs standalone: under a swarm supervisor the supervisor owns
//! lifecycle signals, so the commands are silent no-ops there.

use super::trace;
use super::{Command, CommandContext};
use crate::error::Result;
use crate::metrics;
use crate::process::ProcessSignal;
use crate::request::{Request, Status};
use async_trait::async_trait;
use serde_json::Value;
use tracing::{debug, info};

/// Stop accepting new work.
pub struct Quiet;

/// Terminate the process.
pub struct Stop;

/// Publish backtraces of every live thread.
pub struct Trace;

/// Unscoped seek: echo an acceptance for the parameters as given.
pub struct LegacySeek;

fn supervised(ctx: &CommandContext, name: &str) -> bool {
    if ctx.process.is_standalone() {
        return false;
    }

    debug!(
        process_id = %ctx.process.id,
        command = %name,
        "Process is supervised, ignoring process command"
    );
    true
}

async fn signal(ctx: &CommandContext, request: &Request, signal: ProcessSignal) -> Result<()> {
    let name = request.name()?;
    if supervised(ctx, name) {
        return Ok(());
    }

    ctx.signals.send(signal)?;

    info!(
        process_id = %ctx.process.id,
        command = %name,
        signal = %signal,
        "Delivered lifecycle signal"
    );

    ctx.dispatcher
        .result(name, &ctx.process.id, request.result_fields(Status::Applied));
    metrics::record_result(name, Status::Applied);
    Ok(())
}

#[async_trait]
impl Command for Quiet {
    async fn execute(&self, ctx: &CommandContext, request: &Request) -> Result<()> {
        signal(ctx, request, ProcessSignal::Quiet).await
    }
}

#[async_trait]
impl Command for Stop {
    async fn execute(&self, ctx: &CommandContext, request: &Request) -> Result<()> {
        signal(ctx, request, ProcessSignal::Stop).await
    }
}

#[async_trait]
impl Command for Trace {
    async fn execute(&self, ctx: &CommandContext, request: &Request) -> Result<()> {
        let name = request.name()?;
        if supervised(ctx, name) {
            return Ok(());
        }

        let threads = trace::capture(std::process::id());
        let count = threads.len();

        let mut fields = request.result_fields(Status::Applied);
        fields.insert("threads".to_string(), Value::Object(trace::to_fields(threads)));

        ctx.dispatcher.result(name, &ctx.process.id, fields);
        metrics::record_result(name, Status::Applied);

        info!(
            process_id = %ctx.process.id,
            threads = count,
            "Published thread trace"
        );
        Ok(())
    }
}

#[async_trait]
impl Command for LegacySeek {
    async fn execute(&self, ctx: &CommandContext, request: &Request) -> Result<()> {
        let name = request.name()?;
        if supervised(ctx, name) {
            return Ok(());
        }

        ctx.dispatcher
            .acceptance(name, &ctx.process.id, request.fields().clone());
        Ok(())
    }
}
