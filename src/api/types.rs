//! Request bodies of the streaming endpoints

use serde::{Deserialize, Serialize};

/// body of `POST /api/query`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryRequest {
    /// design question in natural language
    pub query: String,
    /// optional design document content
    #[serde(skip_serializing_if = "Option::is_none")]
    pub design_doc: Option<String>,
}

impl QueryRequest {
    /// query without a design document
    pub fn new<S: Into<String>>(query: S) -> Self {
        Self {
            query: query.into(),
            design_doc: None,
        }
    }
}

/// body of `POST /api/research`
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ResearchRequest {
    /// design question
    pub query: String,
    /// `result` payload of a finished query analysis
    pub query_analysis_result: serde_json::Value,
    /// search papers
    pub with_paper: bool,
    /// search example products
    pub with_example: bool,
    /// generate sketches
    pub is_drawing: bool,
}

impl ResearchRequest {
    /// research for `query` with the analysis from the query stream
    pub fn new<S: Into<String>>(query: S, analysis: serde_json::Value) -> Self {
        Self {
            query: query.into(),
            query_analysis_result: analysis,
            ..Default::default()
        }
    }
}

/// speaker of a chat message
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// the human
    User,
    /// the model
    Assistant,
}

/// one entry of the chat history
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatMessage {
    /// speaker
    pub role: Role,
    /// message text
    pub content: String,
}

/// body of `POST /api/inspiration/chat`
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatRequest {
    /// inspiration the chat is about
    pub inspiration_id: String,
    /// new user message
    pub new_message: String,
    /// earlier messages, oldest first
    pub chat_history: Vec<ChatMessage>,
    /// ask for a streamed answer
    pub stream: bool,
}

impl ChatRequest {
    /// streamed chat request with an empty history
    pub fn new<I: Into<String>, M: Into<String>>(inspiration_id: I, new_message: M) -> Self {
        Self {
            inspiration_id: inspiration_id.into(),
            new_message: new_message.into(),
            chat_history: Vec::new(),
            stream: true,
        }
    }

    /// set the chat history
    pub fn history(mut self, history: Vec<ChatMessage>) -> Self {
        self.chat_history = history;
        self
    }
}
