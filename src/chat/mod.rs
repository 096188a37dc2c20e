//! Streaming chat client.
//!
//! - `sse`: wire framing for `text/event-stream`
//! - `codec`: typed decoding of the backend's event set
//! - `stream`: single-owner live-stream handle and notice channel
//! - `api`: HTTP facade (streaming chat, one-shot query, reports)
//! - `session`: per-conversation state machine
//! - `types`: messages, sources, and request/response records

pub mod api;
pub mod codec;
pub mod session;
pub mod sse;
pub mod stream;
pub mod types;


pub use api::ChatApi;
pub use session::ChatSession;
