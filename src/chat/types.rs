use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

/// One entry in the session's message log.
///
/// Assistant content grows token by token while its stream is live and is
/// never rewritten once the exchange reaches a terminal state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub id: String,
    pub role: ChatRole,
    pub content: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sources: Option<Vec<Source>>,
    pub created_at: DateTime<Utc>,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role: ChatRole::User,
            content: content.into(),
            sources: None,
            created_at: Utc::now(),
        }
    }

    /// Empty assistant message, ready to receive tokens.
    pub fn assistant() -> Self {
        Self {
            id: Uuid::new_v4().to_string(),
            role: ChatRole::Assistant,
            content: String::new(),
            sources: None,
            created_at: Utc::now(),
        }
    }
}

/// One retrieved citation attached to an assistant answer. `chunk_id` is the
/// uniqueness key within a message's source list.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    pub document_id: i64,
    pub chapter_id: i64,
    pub chunk_id: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_number: Option<i64>,
    pub text: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub score: Option<f64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ChatDebugInfo {
    #[serde(default)]
    pub retrieved_chunks: Vec<i64>,
    #[serde(default)]
    pub query_time_ms: Option<f64>,
    #[serde(default)]
    pub vector_search_time_ms: Option<f64>,
}

/// Answer from the non-streaming query endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct ChatResponse {
    pub answer: String,
    #[serde(default)]
    pub sources: Vec<Source>,
    #[serde(default)]
    pub num_citations: usize,
    #[serde(default)]
    pub debug: Option<ChatDebugInfo>,
}

/// User-flagged-content report tied to a message or citation.
#[derive(Debug, Clone)]
pub struct ReportRequest {
    pub reference_id: String,
    pub reason: String,
    pub source: Option<String>,
    pub message_id: Option<String>,
}

impl ReportRequest {
    pub fn new(reference_id: impl Into<String>, reason: impl Into<String>) -> Self {
        Self {
            reference_id: reference_id.into(),
            reason: reason.into(),
            source: None,
            message_id: None,
        }
    }

    pub fn with_source(mut self, source: impl Into<String>) -> Self {
        self.source = Some(source.into());
        self
    }

    pub fn with_message_id(mut self, message_id: impl Into<String>) -> Self {
        self.message_id = Some(message_id.into());
        self
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReportReceipt {
    pub status: String,
    #[serde(default)]
    pub message: Option<String>,
    pub report_id: i64,
}
