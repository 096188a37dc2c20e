//! Per-conversation state machine: the ordered message log and the single
//! in-flight exchange.

use std::collections::HashSet;
use std::sync::Arc;

use serde_json::Value;
use tokio::sync::mpsc;

use crate::core::errors::{ClientError, DecodeError};
use crate::docs::SourceAggregator;

use super::codec::StreamEvent;
use super::stream::{ChatTransport, StreamHandle, StreamNotice, StreamOptions};
use super::types::{ChatMessage, Source};

/// Where the session currently is. Terminal results of the last exchange
/// are reported separately via [`ChatSession::last_outcome`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    Idle,
    Sending,
    Streaming,
}

/// How the most recent exchange ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExchangeOutcome {
    Completed,
    Failed(String),
    Cancelled,
}

/// One observable state change, reported by [`ChatSession::next_update`] so
/// a UI knows what to re-render.
#[derive(Debug)]
pub enum SessionUpdate {
    Started(Value),
    Retrieval(Value),
    TokenAppended,
    SourcesUpdated,
    /// One frame was skipped as undecodable; the stream continues.
    DecodeSkipped(DecodeError),
    Completed,
    Failed(String),
}

struct ActiveStream {
    handle: StreamHandle,
    rx: mpsc::Receiver<StreamNotice>,
    generation: u64,
    /// Index of the assistant message receiving tokens.
    message_index: usize,
}

/// A single conversation against the chat backend.
///
/// Owns the message log and at most one live stream at a time. All state
/// transitions happen on discrete events (a user action, or one notice
/// pumped through [`next_update`](Self::next_update)), so there is nothing
/// to lock.
pub struct ChatSession {
    transport: Arc<dyn ChatTransport>,
    aggregator: Option<SourceAggregator>,
    options: StreamOptions,
    messages: Vec<ChatMessage>,
    phase: SessionPhase,
    active: Option<ActiveStream>,
    last_outcome: Option<ExchangeOutcome>,
    generation: u64,
}

impl ChatSession {
    pub fn new(transport: Arc<dyn ChatTransport>, options: StreamOptions) -> Self {
        Self {
            transport,
            aggregator: None,
            options,
            messages: Vec::new(),
            phase: SessionPhase::Idle,
            active: None,
            last_outcome: None,
            generation: 0,
        }
    }

    /// Convenience constructor taking stream options from the API client's
    /// own configuration.
    pub fn from_api(api: super::api::ChatApi) -> Self {
        let options = api.stream_options();
        Self::new(Arc::new(api), options)
    }

    /// Enrich incoming citations through this aggregator.
    pub fn with_aggregator(mut self, aggregator: SourceAggregator) -> Self {
        self.aggregator = Some(aggregator);
        self
    }

    pub fn messages(&self) -> &[ChatMessage] {
        &self.messages
    }

    pub fn phase(&self) -> SessionPhase {
        self.phase
    }

    pub fn last_outcome(&self) -> Option<&ExchangeOutcome> {
        self.last_outcome.as_ref()
    }

    pub fn is_streaming(&self) -> bool {
        self.active.is_some()
    }

    /// Start a new exchange.
    ///
    /// Returns `Ok(false)` without touching any state when the text trims
    /// to nothing or a stream is already in flight (concurrent submissions
    /// are dropped, not queued). On success the log has gained a user
    /// message and an empty assistant message, and the stream is live.
    pub async fn submit(&mut self, text: &str) -> Result<bool, ClientError> {
        let question = text.trim();
        if question.is_empty() {
            tracing::debug!("dropping empty submission");
            return Ok(false);
        }
        if self.active.is_some() {
            tracing::debug!("dropping submission while a stream is in flight");
            return Ok(false);
        }

        // Invariant: never two open streams. close() is idempotent, so this
        // is safe even when the previous exchange already shut itself down.
        self.close_active();

        self.phase = SessionPhase::Sending;
        self.last_outcome = None;
        self.messages.push(ChatMessage::user(question));
        self.messages.push(ChatMessage::assistant());
        let message_index = self.messages.len() - 1;

        self.generation += 1;
        match self.transport.open_stream(question, &self.options).await {
            Ok((handle, rx)) => {
                self.active = Some(ActiveStream {
                    handle,
                    rx,
                    generation: self.generation,
                    message_index,
                });
                self.phase = SessionPhase::Streaming;
                Ok(true)
            }
            Err(err) => {
                self.phase = SessionPhase::Idle;
                self.last_outcome = Some(ExchangeOutcome::Failed(err.to_string()));
                Err(err)
            }
        }
    }

    /// Apply the next pending stream notice, in strict receipt order.
    ///
    /// Returns `None` once no stream is live (after completion, failure, or
    /// cancellation), making this the natural pump for a render loop.
    pub async fn next_update(&mut self) -> Option<SessionUpdate> {
        let (generation, notice) = {
            let active = self.active.as_mut()?;
            let generation = active.generation;
            match active.rx.recv().await {
                Some(notice) => (generation, notice),
                // Reader gone without a terminal notice: treat as a drop.
                None => (
                    generation,
                    StreamNotice::Transport(ClientError::Transport(
                        "stream ended unexpectedly".into(),
                    )),
                ),
            }
        };
        self.apply(generation, notice)
    }

    /// Drop the live stream immediately. Partial assistant content stays in
    /// the log; nothing delivered after this call is applied.
    pub fn cancel(&mut self) {
        if self.active.is_some() {
            self.close_active();
            self.phase = SessionPhase::Idle;
            self.last_outcome = Some(ExchangeOutcome::Cancelled);
        }
    }

    /// Apply one notice to session state.
    ///
    /// Notices from anything but the live stream are discarded: a replaced
    /// or cancelled stream must not mutate the log, even if its events were
    /// already buffered when it was closed.
    pub(crate) fn apply(&mut self, generation: u64, notice: StreamNotice) -> Option<SessionUpdate> {
        let (live_generation, message_index) = match &self.active {
            Some(active) => (active.generation, active.message_index),
            None => {
                tracing::debug!(generation, "discarding notice with no live stream");
                return None;
            }
        };
        if generation != live_generation {
            tracing::debug!(generation, live_generation, "discarding stale notice");
            return None;
        }

        match notice {
            StreamNotice::Event(StreamEvent::Start(data)) => Some(SessionUpdate::Started(data)),
            StreamNotice::Event(StreamEvent::Retrieval(data)) => {
                Some(SessionUpdate::Retrieval(data))
            }
            StreamNotice::Event(StreamEvent::Token(token)) => {
                if let Some(message) = self.messages.get_mut(message_index) {
                    message.content.push_str(&token);
                }
                Some(SessionUpdate::TokenAppended)
            }
            StreamNotice::Event(StreamEvent::Sources(sources)) => {
                let sources = dedup_by_chunk(sources);
                if let Some(aggregator) = &self.aggregator {
                    aggregator.prefetch(&sources);
                }
                if let Some(message) = self.messages.get_mut(message_index) {
                    // Wholesale replacement; a later sources event never
                    // merges into an earlier list.
                    message.sources = Some(sources);
                }
                Some(SessionUpdate::SourcesUpdated)
            }
            StreamNotice::Event(StreamEvent::Done(_)) => {
                self.finish(ExchangeOutcome::Completed);
                Some(SessionUpdate::Completed)
            }
            StreamNotice::Event(StreamEvent::Error(data)) => {
                let message = error_message(&data);
                self.finish(ExchangeOutcome::Failed(message.clone()));
                Some(SessionUpdate::Failed(message))
            }
            StreamNotice::Decode(err) => {
                tracing::warn!(error = %err, "skipping undecodable stream frame");
                Some(SessionUpdate::DecodeSkipped(err))
            }
            StreamNotice::Transport(err) => {
                let message = err.to_string();
                self.finish(ExchangeOutcome::Failed(message.clone()));
                Some(SessionUpdate::Failed(message))
            }
        }
    }

    fn finish(&mut self, outcome: ExchangeOutcome) {
        self.close_active();
        self.phase = SessionPhase::Idle;
        self.last_outcome = Some(outcome);
    }

    fn close_active(&mut self) {
        if let Some(active) = self.active.take() {
            active.handle.close();
        }
    }
}

/// First occurrence of each `chunk_id` wins; order is preserved.
fn dedup_by_chunk(sources: Vec<Source>) -> Vec<Source> {
    let mut seen = HashSet::new();
    sources
        .into_iter()
        .filter(|source| seen.insert(source.chunk_id))
        .collect()
}

fn error_message(data: &Value) -> String {
    data.get("message")
        .or_else(|| data.get("error"))
        .and_then(Value::as_str)
        .unwrap_or("backend reported a stream error")
        .to_string()
}
