//! Command envelopes and the wire codec.
//!
//! Every record on the commands topic is a JSON-encoded [`WireMessage`]. The
//! listener turns inbound `command` messages into [`Request`]s; acceptances
//! and results flow back out through the [`Dispatcher`].
//!
//! ```text
//! {
//!   "kind": "command",
//!   "schema_version": "1.2.0",
//!   "name": "partitions.pause",
//!   "routing_key": "host-1:4211:9f2c1a",
//!   "dispatched_at": 1718000000000,
//!   "fields": { "topic": "orders", "partition_id": 3, "duration_ms": 0 }
//! }
//! ```
//!
//! [`Dispatcher`]: crate::dispatcher::Dispatcher

use crate::error::{CommandingError, Result};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::fmt;

/// Version of the message layout this build reads and writes.
pub const SCHEMA_VERSION: &str = "1.2.0";

/// Routing key addressing every process.
pub const BROADCAST: &str = "*";

/// Arbitrary field map carried by every message.
pub type Fields = Map<String, Value>;

/// The three message kinds sharing the commands topic.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MessageKind {
    Command,
    Acceptance,
    Result,
}

impl fmt::Display for MessageKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageKind::Command => write!(f, "command"),
            MessageKind::Acceptance => write!(f, "acceptance"),
            MessageKind::Result => write!(f, "result"),
        }
    }
}

/// Terminal outcome of an executed command.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Status {
    Applied,
    Prevented,
    Skipped,
    LostPartition,
    RebalanceRejected,
}

impl Status {
    pub fn as_str(&self) -> &'static str {
        match self {
            Status::Applied => "applied",
            Status::Prevented => "prevented",
            Status::Skipped => "skipped",
            Status::LostPartition => "lost_partition",
            Status::RebalanceRejected => "rebalance_rejected",
        }
    }
}

impl fmt::Display for Status {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One record on the commands topic.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WireMessage {
    pub kind: MessageKind,
    pub schema_version: String,
    /// Command id, e.g. `partitions.pause`. Absent names fail at decode time.
    pub name: String,
    /// Target process id, [`BROADCAST`], or empty for un-targeted messages.
    #[serde(default)]
    pub routing_key: String,
    #[serde(default)]
    pub dispatched_at: i64,
    #[serde(default)]
    pub fields: Fields,
}

impl WireMessage {
    pub fn new(
        kind: MessageKind,
        name: impl Into<String>,
        routing_key: impl Into<String>,
        fields: Fields,
    ) -> Self {
        Self {
            kind,
            schema_version: SCHEMA_VERSION.to_string(),
            name: name.into(),
            routing_key: routing_key.into(),
            dispatched_at: current_timestamp_ms(),
            fields,
        }
    }

    pub fn decode(payload: &[u8]) -> Result<Self> {
        Ok(serde_json::from_slice(payload)?)
    }

    pub fn encode(&self) -> Result<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Record key used on the commands topic. Un-targeted messages have none.
    pub fn record_key(&self) -> Option<&str> {
        if self.routing_key.is_empty() {
            None
        } else {
            Some(&self.routing_key)
        }
    }

    pub fn is_broadcast(&self) -> bool {
        self.routing_key == BROADCAST
    }

    /// View this message as a command request.
    pub fn into_request(self) -> Request {
        Request {
            name: self.name,
            routing_key: self.routing_key,
            fields: self.fields,
        }
    }
}

/// A decoded command. Read-only; lives for one command lifecycle.
#[derive(Debug, Clone, PartialEq)]
pub struct Request {
    name: String,
    routing_key: String,
    fields: Fields,
}

impl Request {
    pub fn new(name: impl Into<String>, fields: Fields) -> Self {
        Self {
            name: name.into(),
            routing_key: String::new(),
            fields,
        }
    }

    pub fn with_routing_key(mut self, routing_key: impl Into<String>) -> Self {
        self.routing_key = routing_key.into();
        self
    }

    /// Decode a raw commands-topic payload into a request.
    pub fn decode(payload: &[u8]) -> Result<Self> {
        Ok(WireMessage::decode(payload)?.into_request())
    }

    /// Command name. An empty name is an error, never a default.
    pub fn name(&self) -> Result<&str> {
        if self.name.is_empty() {
            return Err(CommandingError::MissingField("name".to_string()));
        }
        Ok(&self.name)
    }

    pub fn routing_key(&self) -> &str {
        &self.routing_key
    }

    pub fn fields(&self) -> &Fields {
        &self.fields
    }

    pub fn contains(&self, key: &str) -> bool {
        self.fields.contains_key(key)
    }

    /// Raw field access. A missing key is an error, distinct from `false`/`0`.
    pub fn field(&self, key: &str) -> Result<&Value> {
        self.fields
            .get(key)
            .ok_or_else(|| CommandingError::MissingField(key.to_string()))
    }

    pub fn str_field(&self, key: &str) -> Result<&str> {
        self.field(key)?
            .as_str()
            .ok_or_else(|| invalid(key, "string"))
    }

    pub fn i64_field(&self, key: &str) -> Result<i64> {
        self.field(key)?.as_i64().ok_or_else(|| invalid(key, "integer"))
    }

    pub fn u64_field(&self, key: &str) -> Result<u64> {
        self.field(key)?
            .as_u64()
            .ok_or_else(|| invalid(key, "non-negative integer"))
    }

    pub fn partition_field(&self, key: &str) -> Result<u32> {
        let value = self.u64_field(key)?;
        u32::try_from(value).map_err(|_| invalid(key, "partition id"))
    }

    pub fn bool_field(&self, key: &str) -> Result<bool> {
        self.field(key)?.as_bool().ok_or_else(|| invalid(key, "boolean"))
    }

    /// String field that may legitimately be absent.
    pub fn optional_str(&self, key: &str) -> Result<Option<&str>> {
        match self.fields.get(key) {
            None | Some(Value::Null) => Ok(None),
            Some(value) => value.as_str().map(Some).ok_or_else(|| invalid(key, "string")),
        }
    }

    /// Request fields extended with a terminal status, as published in results.
    pub fn result_fields(&self, status: Status) -> Fields {
        let mut fields = self.fields.clone();
        fields.insert("status".to_string(), Value::String(status.to_string()));
        fields
    }
}

fn invalid(field: &str, expected: &'static str) -> CommandingError {
    CommandingError::InvalidField {
        field: field.to_string(),
        expected,
    }
}

/// Get current timestamp in milliseconds since epoch
pub(crate) fn current_timestamp_ms() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or(0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn fields(value: Value) -> Fields {
        match value {
            Value::Object(map) => map,
            _ => panic!("expected object"),
        }
    }

    #[test]
    fn test_decode_command() {
        let payload = br#"{
            "kind": "command",
            "schema_version": "1.2.0",
            "name": "partitions.pause",
            "routing_key": "*",
            "fields": {"topic": "orders", "partition_id": 3, "prevent_override": false}
        }"#;

        let message = WireMessage::decode(payload).unwrap();
        assert_eq!(message.kind, MessageKind::Command);
        assert!(message.is_broadcast());

        let request = message.into_request();
        assert_eq!(request.name().unwrap(), "partitions.pause");
        assert_eq!(request.str_field("topic").unwrap(), "orders");
        assert_eq!(request.partition_field("partition_id").unwrap(), 3);
        assert!(!request.bool_field("prevent_override").unwrap());
    }

    #[test]
    fn test_decode_rejects_missing_name() {
        let payload = br#"{"kind": "command", "schema_version": "1.2.0", "fields": {}}"#;
        assert!(matches!(
            WireMessage::decode(payload),
            Err(CommandingError::Decode(_))
        ));
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(Request::decode(b"\x00\x01not-json").is_err());
    }

    #[test]
    fn test_empty_name_fails_fast() {
        let request = Request::new("", Fields::new());
        assert!(matches!(
            request.name(),
            Err(CommandingError::MissingField(field)) if field == "name"
        ));
    }

    #[test]
    fn test_missing_field_is_distinct_from_falsy() {
        let request = Request::new(
            "partitions.resume",
            fields(json!({"reset_attempts": false, "offset": 0})),
        );

        assert!(!request.bool_field("reset_attempts").unwrap());
        assert_eq!(request.i64_field("offset").unwrap(), 0);
        assert!(matches!(
            request.bool_field("force_resume"),
            Err(CommandingError::MissingField(_))
        ));
    }

    #[test]
    fn test_wrong_type_is_invalid_field() {
        let request = Request::new("partitions.seek", fields(json!({"offset": "ten"})));
        assert!(matches!(
            request.i64_field("offset"),
            Err(CommandingError::InvalidField { expected: "integer", .. })
        ));

        let request = Request::new("partitions.seek", fields(json!({"partition_id": -1})));
        assert!(request.partition_field("partition_id").is_err());
    }

    #[test]
    fn test_optional_str() {
        let request = Request::new(
            "partitions.pause",
            fields(json!({"consumer_group_id": "cg1", "subscription_group_id": null})),
        );
        assert_eq!(request.optional_str("consumer_group_id").unwrap(), Some("cg1"));
        assert_eq!(request.optional_str("subscription_group_id").unwrap(), None);
        assert_eq!(request.optional_str("missing").unwrap(), None);
    }

    #[test]
    fn test_result_fields_carry_status() {
        let request = Request::new("topics.pause", fields(json!({"topic": "orders"})));
        let result = request.result_fields(Status::RebalanceRejected);

        assert_eq!(result["topic"], "orders");
        assert_eq!(result["status"], "rebalance_rejected");
    }

    #[test]
    fn test_record_key() {
        let targeted =
            WireMessage::new(MessageKind::Result, "consumers.trace", "p-1", Fields::new());
        assert_eq!(targeted.record_key(), Some("p-1"));
        assert_eq!(targeted.schema_version, SCHEMA_VERSION);

        let untargeted =
            WireMessage::new(MessageKind::Command, "consumers.trace", "", Fields::new());
        assert_eq!(untargeted.record_key(), None);
    }

    #[test]
    fn test_encode_uses_snake_case_kind() {
        let message =
            WireMessage::new(MessageKind::Acceptance, "partitions.seek", "p-1", Fields::new());
        let json: Value = serde_json::from_slice(&message.encode().unwrap()).unwrap();
        assert_eq!(json["kind"], "acceptance");
        assert_eq!(json["schema_version"], "1.2.0");
    }
}
