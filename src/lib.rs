//! Client-side session layer for a retrieval-augmented chat backend.
//!
//! This crate turns a one-shot question into a live, cancellable,
//! incrementally rendered answer with attached evidence sources. It is the
//! wire-facing half a UI embeds; retrieval, ranking and generation all live
//! behind the HTTP API it talks to.
//!
//! # Components
//!
//! - `chat::sse` / `chat::codec`: wire framing and typed event decoding
//! - `chat::stream`: ownership of one live stream and its cancel capability
//! - `chat::api`: HTTP facade (streaming chat, one-shot query, reports)
//! - `chat::session`: per-conversation state machine over the message log
//! - `docs`: best-effort citation metadata enrichment with a process cache
//! - `core`: client configuration and the error taxonomy

pub mod chat;
pub mod core;
pub mod docs;
pub mod logging;

pub use crate::chat::api::ChatApi;
pub use crate::chat::codec::StreamEvent;
pub use crate::chat::session::{ChatSession, ExchangeOutcome, SessionPhase, SessionUpdate};
pub use crate::chat::stream::{ChatTransport, StreamHandle, StreamNotice, StreamOptions};
pub use crate::chat::types::{
    ChatDebugInfo, ChatMessage, ChatResponse, ChatRole, ReportReceipt, ReportRequest, Source,
};
pub use crate::core::config::ClientConfig;
pub use crate::core::errors::{ClientError, DecodeError};
pub use crate::docs::{
    ChapterSummary, DocMeta, DocMetaCache, DocsClient, DocumentDetail, DocumentFetcher,
    SourceAggregator,
};
