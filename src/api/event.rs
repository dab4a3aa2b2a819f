//! Typed events of the streaming endpoints
//!
//! Servers are loose about payload shapes, a progress may come as `40` or as
//! `{"progress": 40}`. The conversions accept every shape seen in practice and
//! keep anything unknown as [`StreamEvent`].

use serde_json::Value;

use crate::sse::{Payload, StreamEvent};

/// event of `POST /api/query`
#[derive(Debug, Clone, PartialEq)]
pub enum QueryEvent {
    /// partial analysis text
    Chunk(String),
    /// final structured analysis
    Result(Value),
    /// server side error message
    Error(String),
    /// analysis finished
    End,
    /// anything else
    Other(StreamEvent),
}

impl From<StreamEvent> for QueryEvent {
    fn from(event: StreamEvent) -> Self {
        match event.event_type.as_str() {
            "chunk" => Self::Chunk(chunk_text(&event.data)),
            "result" => Self::Result(event.data.to_value()),
            "error" => Self::Error(error_text(&event.data)),
            _ if event.is_terminal() => Self::End,
            _ => Self::Other(event),
        }
    }
}

/// event of `POST /api/research`
#[derive(Debug, Clone, PartialEq)]
pub enum ResearchEvent {
    /// partial report text
    Chunk(String),
    /// overall progress, 0 to 100
    Progress(f64),
    /// human readable stage description
    Status(String),
    /// one workflow node finished
    NodeComplete {
        /// node name
        node: String,
        /// node output
        result: Value,
    },
    /// server side error message
    Error(String),
    /// research finished
    End,
    /// anything else
    Other(StreamEvent),
}

impl From<StreamEvent> for ResearchEvent {
    fn from(event: StreamEvent) -> Self {
        match event.event_type.as_str() {
            "chunk" => Self::Chunk(chunk_text(&event.data)),
            "progress" => Self::Progress(progress(&event.data)),
            "status" => Self::Status(status_text(&event.data)),
            "error" => Self::Error(error_text(&event.data)),
            "node_complete" => match node_complete(&event.data) {
                Some((node, result)) => Self::NodeComplete { node, result },
                None => {
                    log::warn!("Malformed node_complete event: {:?}", event.data);
                    Self::Other(event)
                }
            },
            _ if event.is_terminal() => Self::End,
            _ => Self::Other(event),
        }
    }
}

/// event of `POST /api/inspiration/chat`
#[derive(Debug, Clone, PartialEq)]
pub enum ChatEvent {
    /// whole answer so far, each event replaces the previous one
    Content(String),
    /// answer finished
    Done,
    /// anything else
    Other(StreamEvent),
}

impl From<StreamEvent> for ChatEvent {
    fn from(event: StreamEvent) -> Self {
        if event.is_terminal() {
            return Self::Done;
        }

        let content = event
            .data
            .as_json()
            .and_then(|data| data.get("content"))
            .and_then(Value::as_str);

        match content {
            Some(content) => Self::Content(content.to_string()),
            None => Self::Other(event),
        }
    }
}

fn chunk_text(data: &Payload) -> String {
    match data {
        Payload::Json(value) => match value.get("text").and_then(Value::as_str) {
            Some(text) => text.to_string(),
            None => value_text(value),
        },
        Payload::Text(text) => text.clone(),
    }
}

fn progress(data: &Payload) -> f64 {
    let value = match data {
        Payload::Json(Value::Number(n)) => n.as_f64(),
        Payload::Json(value) => value.get("progress").and_then(Value::as_f64),
        Payload::Text(text) => text.trim().parse().ok(),
    };

    value.unwrap_or(0.0).clamp(0.0, 100.0)
}

fn status_text(data: &Payload) -> String {
    match data {
        Payload::Text(text) => text.clone(),
        Payload::Json(Value::String(text)) => text.clone(),
        Payload::Json(value) => value
            .get("status")
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string(),
    }
}

fn error_text(data: &Payload) -> String {
    match data {
        Payload::Text(text) => text.clone(),
        Payload::Json(value) => value_text(value),
    }
}

fn value_text(value: &Value) -> String {
    match value {
        Value::String(text) => text.clone(),
        other => other.to_string(),
    }
}

fn node_complete(data: &Payload) -> Option<(String, Value)> {
    let data = data.as_json()?;
    let node = data.get("node")?.as_str()?.to_string();
    let result = data.get("result").cloned().unwrap_or(Value::Null);
    Some((node, result))
}
