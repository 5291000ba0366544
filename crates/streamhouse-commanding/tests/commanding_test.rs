//! End-to-end tests: commands travel through a running manager's listener,
//! the tracker, and a fetch loop hook, with in-memory collaborators.

use serde_json::json;
use std::sync::Arc;
use std::time::Duration;
use streamhouse_commanding::memory::{
    ChannelFeed, ChannelSource, ClientCall, MemoryAssignment, MemoryClient, MemoryCoordinators,
    RecordingPublisher, RecordingSignals,
};
use streamhouse_commanding::{
    CommandingConfig, FetchContext, Manager, MessageKind, PartitionCoordinator, ProcessInfo,
    ProcessMode, SubscriptionAssignment, TopicAssignment, WireMessage, BROADCAST, FOREVER_MS,
};

struct Process {
    manager: Manager,
    feed: ChannelFeed,
    publisher: Arc<RecordingPublisher>,
    assignment: Arc<MemoryAssignment>,
}

fn subscription(cg: &str, sg: &str, topic: &str, partitions: Vec<u32>) -> SubscriptionAssignment {
    let mut topics = TopicAssignment::new();
    topics.insert(topic.to_string(), partitions);
    SubscriptionAssignment {
        consumer_group_id: cg.to_string(),
        subscription_group_id: sg.to_string(),
        topics,
    }
}

async fn start_process(id: &str, subscriptions: Vec<SubscriptionAssignment>) -> Process {
    let (source, feed) = ChannelSource::new();
    let publisher = Arc::new(RecordingPublisher::new());
    let assignment = Arc::new(MemoryAssignment::new(subscriptions));

    let manager = Manager::builder()
        .config(CommandingConfig {
            max_wait_time_ms: 10,
            pause_timeout_ms: 10,
            ..CommandingConfig::default()
        })
        .process(ProcessInfo::new(id, ProcessMode::Standalone))
        .source(Box::new(source))
        .publisher(publisher.clone())
        .assignment(assignment.clone())
        .signals(Arc::new(RecordingSignals::new()))
        .build()
        .await
        .unwrap();
    manager.start().await.unwrap();

    Process {
        manager,
        feed,
        publisher,
        assignment,
    }
}

fn command(name: &str, routing_key: &str, fields: serde_json::Value) -> WireMessage {
    WireMessage::new(
        MessageKind::Command,
        name,
        routing_key,
        fields.as_object().cloned().unwrap(),
    )
}

/// Wait until `count` messages have been published by the process.
async fn wait_for_records(process: &Process, count: usize) -> Vec<WireMessage> {
    for _ in 0..200 {
        process.manager.dispatcher().flush().await;
        let records = process.publisher.records();
        if records.len() >= count {
            return records.into_iter().map(|r| r.message).collect();
        }
        tokio::time::sleep(Duration::from_millis(10)).await;
    }
    panic!("timed out waiting for {} records", count);
}

#[tokio::test]
async fn test_partition_pause_forever_end_to_end() {
    let process = start_process("p-1", vec![subscription("cg1", "sg1", "orders", vec![3])]).await;
    let client = MemoryClient::new();
    client.assign("orders", vec![3]);
    let mut coordinators = MemoryCoordinators::new();

    process
        .feed
        .send_message(&command(
            "partitions.pause",
            "p-1",
            json!({"topic": "orders", "partition_id": 3, "duration": 0, "prevent_override": false}),
        ))
        .unwrap();

    let accepted = wait_for_records(&process, 1).await;
    assert_eq!(accepted[0].kind, MessageKind::Acceptance);

    let hook = process.manager.hook();
    let mut ctx = FetchContext {
        consumer_group_id: "cg1",
        subscription_group_id: "sg1",
        client: &client,
        coordinators: &mut coordinators,
    };
    assert_eq!(hook.before_poll(&mut ctx).await, 1);

    let records = wait_for_records(&process, 2).await;
    assert_eq!(records[1].kind, MessageKind::Result);
    assert_eq!(records[1].routing_key, "p-1");
    assert_eq!(records[1].fields["status"], "applied");

    assert_eq!(
        client.calls(),
        vec![ClientCall::Pause {
            topic: "orders".to_string(),
            partition: 3,
            duration_ms: FOREVER_MS
        }]
    );
    assert!(coordinators.tracker_mut("orders", 3).is_paused());

    process.manager.stop().await.unwrap();
}

#[tokio::test]
async fn test_topic_resume_broadcast_across_processes() {
    let member = start_process("p-1", vec![subscription("cg1", "sg1", "orders", vec![0, 2])]).await;
    let outsider = start_process("p-2", vec![subscription("cg2", "sg7", "orders", vec![1])]).await;

    let client = MemoryClient::new();
    client.assign("orders", vec![0, 2]);
    let mut coordinators = MemoryCoordinators::new();
    for partition in [0, 2] {
        let tracker = coordinators.tracker_mut("orders", partition);
        tracker.pause(60_000);
        tracker.record_attempt();
    }

    let resume = command(
        "topics.resume",
        BROADCAST,
        json!({"consumer_group_id": "cg1", "topic": "orders", "reset_attempts": true}),
    );
    member.feed.send_message(&resume).unwrap();
    outsider.feed.send_message(&resume).unwrap();

    let skipped = wait_for_records(&outsider, 1).await;
    assert_eq!(skipped[0].kind, MessageKind::Result);
    assert_eq!(skipped[0].fields["status"], "skipped");

    wait_for_records(&member, 1).await;
    let hook = member.manager.hook();
    let mut ctx = FetchContext {
        consumer_group_id: "cg1",
        subscription_group_id: "sg1",
        client: &client,
        coordinators: &mut coordinators,
    };
    hook.before_poll(&mut ctx).await;

    let records = wait_for_records(&member, 2).await;
    assert_eq!(records[0].kind, MessageKind::Acceptance);
    assert_eq!(records[1].fields["status"], "applied");
    assert_eq!(records[1].fields["partitions_affected"], json!([0, 2]));
    assert_eq!(records[1].fields["partitions_prevented"], json!([]));

    for partition in [0, 2] {
        let tracker = coordinators.tracker_mut("orders", partition);
        assert!(!tracker.is_paused());
        assert_eq!(tracker.attempts(), 0);
    }

    member.manager.stop().await.unwrap();
    outsider.manager.stop().await.unwrap();
}

#[tokio::test]
async fn test_rebalance_rejects_queued_commands() {
    let process =
        start_process("p-1", vec![subscription("cg1", "sg1", "orders", vec![0, 1])]).await;
    let client = MemoryClient::new();
    client.assign("orders", vec![0, 1]);
    let mut coordinators = MemoryCoordinators::new();

    process
        .feed
        .send_message(&command(
            "partitions.seek",
            BROADCAST,
            json!({
                "topic": "orders",
                "partition_id": 1,
                "offset": 500,
                "prevent_overtaking": false,
                "force_resume": true
            }),
        ))
        .unwrap();
    wait_for_records(&process, 1).await;
    assert_eq!(process.manager.tracker().len().await, 1);

    // The partition moves to another process.
    client.revoke("orders", 1);
    process
        .assignment
        .set(vec![subscription("cg1", "sg1", "orders", vec![0])]);

    let mut revoked = TopicAssignment::new();
    revoked.insert("orders".to_string(), vec![1]);
    let hook = process.manager.hook();
    let ctx = FetchContext {
        consumer_group_id: "cg1",
        subscription_group_id: "sg1",
        client: &client,
        coordinators: &mut coordinators,
    };
    assert_eq!(hook.on_partitions_revoked(&ctx, &revoked).await, 1);

    let records = wait_for_records(&process, 2).await;
    assert_eq!(records[1].fields["status"], "rebalance_rejected");
    assert!(process.manager.tracker().is_empty().await);
    assert!(client.calls().is_empty());

    // No longer owned: a repeated seek is not matched at all.
    process
        .feed
        .send_message(&command(
            "partitions.seek",
            BROADCAST,
            json!({
                "topic": "orders",
                "partition_id": 1,
                "offset": 600,
                "prevent_overtaking": false,
                "force_resume": false
            }),
        ))
        .unwrap();
    tokio::time::sleep(Duration::from_millis(50)).await;
    process.manager.dispatcher().flush().await;
    assert_eq!(process.publisher.records().len(), 2);

    process.manager.stop().await.unwrap();
}

#[tokio::test]
async fn test_listener_survives_unknown_commands() {
    let process = start_process("p-1", vec![]).await;

    process
        .feed
        .send_message(&command("consumers.explode", "p-1", json!({})))
        .unwrap();
    process.feed.fail_next_polls(1);
    process
        .feed
        .send_message(&command("consumers.trace", "p-1", json!({})))
        .unwrap();

    let records = wait_for_records(&process, 1).await;
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].name, "consumers.trace");
    assert_eq!(records[0].fields["status"], "applied");
    assert!(records[0].fields["threads"].is_object());

    process.manager.stop().await.unwrap();
}
