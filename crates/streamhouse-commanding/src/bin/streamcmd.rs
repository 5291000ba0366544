//! StreamHouse Commanding CLI (streamcmd)
//!
//! Builds command records for the commands topic and prints them, one per
//! line, as `<key>\t<json>`. The output can be piped into any producer that
//! writes keyed records to the commands topic.
//!
//! ## Quick Start
//!
//! ```bash
//! # Pause partition 3 of "orders" until resumed, on whichever process owns it
//! streamcmd partitions pause --topic orders --partition 3
//!
//! # Resume every owned partition of "orders" in consumer group cg1
//! streamcmd topics resume --consumer-group cg1 --topic orders --reset-attempts
//!
//! # Dump thread backtraces of one process
//! streamcmd consumers trace --process host-a:4242:1f0c9a2b7d3e
//! ```
//!
//! ## Configuration
//!
//! - `COMMANDING_TOPIC`: Commands topic printed in the header line
//!   (default: streamhouse_consumers_commands)
//! - `RUST_LOG`: Log level (default: info), logs go to stderr

use anyhow::{Context, Result};
use clap::{Args, Parser, Subcommand};
use serde_json::{json, Value};
use streamhouse_commanding::{MessageKind, WireMessage, BROADCAST, DEFAULT_TOPIC};
use tracing::{info, Level};
use tracing_subscriber::FmtSubscriber;

#[derive(Parser)]
#[command(name = "streamcmd")]
#[command(about = "StreamHouse consumer commanding tool", long_about = None)]
struct Cli {
    /// Commands topic
    #[arg(long, env = "COMMANDING_TOPIC", default_value = DEFAULT_TOPIC)]
    topic: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Process-scoped commands
    Consumers {
        #[command(subcommand)]
        command: ConsumerCommands,
    },
    /// Partition-scoped commands
    Partitions {
        #[command(subcommand)]
        command: PartitionCommands,
    },
    /// Topic-scoped commands, always broadcast
    Topics {
        #[command(subcommand)]
        command: TopicCommands,
    },
}

#[derive(Args)]
struct Target {
    /// Target process id, or `*` for every process
    #[arg(short, long, default_value = BROADCAST)]
    process: String,
}

#[derive(Subcommand)]
enum ConsumerCommands {
    /// Stop accepting new work
    Quiet(Target),
    /// Terminate
    Stop(Target),
    /// Publish backtraces of every thread
    Trace(Target),
}

#[derive(Args)]
struct PartitionTarget {
    #[command(flatten)]
    target: Target,
    /// Topic name
    #[arg(short, long)]
    topic: String,
    /// Partition number
    #[arg(long)]
    partition: u32,
    /// Only processes owning a partition of this consumer group
    #[arg(long)]
    consumer_group: Option<String>,
    /// Subscription group that owns the partition (resolved by the owner when absent)
    #[arg(long)]
    subscription_group: Option<String>,
}

#[derive(Subcommand)]
enum PartitionCommands {
    /// Pause fetching
    Pause {
        #[command(flatten)]
        partition: PartitionTarget,
        /// Pause length in milliseconds, 0 pauses until resumed
        #[arg(short, long, default_value = "0")]
        duration_ms: u64,
        /// Keep an existing pause instead of replacing it
        #[arg(long)]
        prevent_override: bool,
    },
    /// Expire the current pause
    Resume {
        #[command(flatten)]
        partition: PartitionTarget,
        /// Also reset the attempt counter
        #[arg(long)]
        reset_attempts: bool,
    },
    /// Move the fetch position
    Seek {
        #[command(flatten)]
        partition: PartitionTarget,
        /// Offset to seek to
        #[arg(short, long, allow_negative_numbers = true)]
        offset: i64,
        /// Refuse to move behind the last seek
        #[arg(long)]
        prevent_overtaking: bool,
        /// Also expire the current pause
        #[arg(long)]
        force_resume: bool,
    },
}

#[derive(Args)]
struct TopicTarget {
    /// Consumer group name
    #[arg(short, long)]
    consumer_group: String,
    /// Topic name
    #[arg(short, long)]
    topic: String,
}

#[derive(Subcommand)]
enum TopicCommands {
    /// Pause every owned partition
    Pause {
        #[command(flatten)]
        topic: TopicTarget,
        /// Pause length in milliseconds, 0 pauses until resumed
        #[arg(short, long, default_value = "0")]
        duration_ms: u64,
        /// Keep existing pauses instead of replacing them
        #[arg(long)]
        prevent_override: bool,
    },
    /// Expire the pause of every owned partition
    Resume {
        #[command(flatten)]
        topic: TopicTarget,
        /// Also reset attempt counters
        #[arg(long)]
        reset_attempts: bool,
    },
}

fn main() -> Result<()> {
    let log_level = std::env::var("RUST_LOG")
        .unwrap_or_else(|_| "info".to_string())
        .parse()
        .unwrap_or(Level::INFO);

    let subscriber = FmtSubscriber::builder()
        .with_max_level(log_level)
        .with_writer(std::io::stderr)
        .finish();
    tracing::subscriber::set_global_default(subscriber).context("Failed to install logger")?;

    let cli = Cli::parse();
    let message = build_message(cli.command);
    let payload = message.encode().context("Failed to encode command")?;
    let payload = String::from_utf8(payload).context("Encoded command is not UTF-8")?;

    info!(
        topic = %cli.topic,
        command = %message.name,
        routing_key = %message.routing_key,
        "Built command record"
    );

    println!("{}\t{}", message.record_key().unwrap_or("-"), payload);
    Ok(())
}

fn build_message(command: Commands) -> WireMessage {
    let (name, routing_key, fields) = match command {
        Commands::Consumers { command } => match command {
            ConsumerCommands::Quiet(t) => ("consumers.quiet", t.process, json!({})),
            ConsumerCommands::Stop(t) => ("consumers.stop", t.process, json!({})),
            ConsumerCommands::Trace(t) => ("consumers.trace", t.process, json!({})),
        },
        Commands::Partitions { command } => match command {
            PartitionCommands::Pause {
                partition,
                duration_ms,
                prevent_override,
            } => partition_command(
                "partitions.pause",
                partition,
                json!({"duration_ms": duration_ms, "prevent_override": prevent_override}),
            ),
            PartitionCommands::Resume {
                partition,
                reset_attempts,
            } => partition_command(
                "partitions.resume",
                partition,
                json!({"reset_attempts": reset_attempts}),
            ),
            PartitionCommands::Seek {
                partition,
                offset,
                prevent_overtaking,
                force_resume,
            } => partition_command(
                "partitions.seek",
                partition,
                json!({
                    "offset": offset,
                    "prevent_overtaking": prevent_overtaking,
                    "force_resume": force_resume
                }),
            ),
        },
        Commands::Topics { command } => match command {
            TopicCommands::Pause {
                topic,
                duration_ms,
                prevent_override,
            } => topic_command(
                "topics.pause",
                topic,
                json!({"duration_ms": duration_ms, "prevent_override": prevent_override}),
            ),
            TopicCommands::Resume {
                topic,
                reset_attempts,
            } => topic_command("topics.resume", topic, json!({"reset_attempts": reset_attempts})),
        },
    };

    let fields = match fields {
        Value::Object(map) => map,
        _ => Default::default(),
    };
    WireMessage::new(MessageKind::Command, name, routing_key, fields)
}

fn partition_command(
    name: &'static str,
    target: PartitionTarget,
    mut fields: Value,
) -> (&'static str, String, Value) {
    fields["topic"] = json!(target.topic);
    fields["partition_id"] = json!(target.partition);
    if let Some(group) = target.consumer_group {
        fields["consumer_group_id"] = json!(group);
    }
    if let Some(group) = target.subscription_group {
        fields["subscription_group_id"] = json!(group);
    }
    (name, target.target.process, fields)
}

fn topic_command(
    name: &'static str,
    target: TopicTarget,
    mut fields: Value,
) -> (&'static str, String, Value) {
    fields["consumer_group_id"] = json!(target.consumer_group);
    fields["topic"] = json!(target.topic);
    (name, BROADCAST.to_string(), fields)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn parse(args: &[&str]) -> WireMessage {
        let argv = std::iter::once("streamcmd").chain(args.iter().copied());
        let cli = Cli::try_parse_from(argv).unwrap();
        build_message(cli.command)
    }

    #[test]
    fn test_partition_pause_defaults_to_forever_broadcast() {
        let message = parse(&["partitions", "pause", "--topic", "orders", "--partition", "3"]);

        assert_eq!(message.name, "partitions.pause");
        assert_eq!(message.routing_key, "*");
        assert_eq!(message.fields["partition_id"], 3);
        assert_eq!(message.fields["duration_ms"], 0);
        assert_eq!(message.fields["prevent_override"], false);
        assert!(!message.fields.contains_key("subscription_group_id"));
    }

    #[test]
    fn test_topic_resume_is_always_broadcast() {
        let message = parse(&[
            "topics",
            "resume",
            "--consumer-group",
            "cg1",
            "--topic",
            "orders",
            "--reset-attempts",
        ]);

        assert_eq!(message.record_key(), Some("*"));
        assert_eq!(message.fields["consumer_group_id"], "cg1");
        assert_eq!(message.fields["reset_attempts"], true);
    }

    #[test]
    fn test_targeted_trace() {
        let message = parse(&["consumers", "trace", "--process", "host:1:abc"]);
        assert_eq!(message.routing_key, "host:1:abc");
        assert!(message.fields.is_empty());
    }
}
