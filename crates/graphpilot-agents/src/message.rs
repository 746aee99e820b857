use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};
use uuid::Uuid;

/// Kind of an exchanged message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageType {
    Task,
    Result,
    Error,
    Start,
    Complete,
}

impl MessageType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Task => "task",
            Self::Result => "result",
            Self::Error => "error",
            Self::Start => "start",
            Self::Complete => "complete",
        }
    }
}

/// One message between the supervisor and an agent. Immutable once built.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentMessage {
    pub id: String,
    pub from: String,
    pub to: String,
    #[serde(rename = "type")]
    pub kind: MessageType,
    pub content: Map<String, Value>,
    #[serde(default)]
    pub reply_to: Option<String>,
    pub timestamp: DateTime<Utc>,
}

impl AgentMessage {
    pub fn new(
        from: impl Into<String>,
        to: impl Into<String>,
        kind: MessageType,
        content: Map<String, Value>,
    ) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            from: from.into(),
            to: to.into(),
            kind,
            content,
            reply_to: None,
            timestamp: Utc::now(),
        }
    }

    pub fn in_reply_to(mut self, id: impl Into<String>) -> Self {
        self.reply_to = Some(id.into());
        self
    }

    /// A work request for one step.
    pub fn task(from: &str, to: &str, step: &str, params: Map<String, Value>) -> Self {
        let mut content = params;
        content.insert("step".into(), json!(step));
        Self::new(from, to, MessageType::Task, content)
    }

    /// Canonical success reply: `{status: "success", step, data}`.
    pub fn result(from: &str, request: &AgentMessage, step: &str, data: Value) -> Self {
        let mut content = Map::new();
        content.insert("status".into(), json!("success"));
        content.insert("step".into(), json!(step));
        content.insert("data".into(), data);
        Self::new(from, request.from.clone(), MessageType::Result, content).in_reply_to(&request.id)
    }

    /// Canonical failure reply: `{status: "error", step, error}`.
    pub fn error(from: &str, request: &AgentMessage, step: &str, error: &str) -> Self {
        let mut content = Map::new();
        content.insert("status".into(), json!("error"));
        content.insert("step".into(), json!(step));
        content.insert("error".into(), json!(error));
        Self::new(from, request.from.clone(), MessageType::Error, content).in_reply_to(&request.id)
    }

    pub fn is_error(&self) -> bool {
        self.kind == MessageType::Error
    }

    pub fn step(&self) -> Option<&str> {
        self.content.get("step").and_then(Value::as_str)
    }

    pub fn error_text(&self) -> Option<&str> {
        self.content.get("error").and_then(Value::as_str)
    }
}
