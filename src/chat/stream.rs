//! Ownership of one live stream: the cancel capability and the notice
//! channel its events arrive on.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use tokio::sync::mpsc;
use tokio::task::AbortHandle;

use crate::core::errors::{ClientError, DecodeError};

use super::codec::StreamEvent;

/// Per-exchange options for the streaming endpoint.
#[derive(Debug, Clone, Default)]
pub struct StreamOptions {
    pub include_debug: bool,
    pub session_id: Option<String>,
}

/// Everything a live stream can deliver. Success and failure travel on the
/// same channel so one receive loop handles both.
#[derive(Debug)]
pub enum StreamNotice {
    /// A decoded wire event, in receipt order.
    Event(StreamEvent),
    /// One frame failed to decode; the stream keeps going.
    Decode(DecodeError),
    /// The connection failed or dropped. Terminal.
    Transport(ClientError),
}

/// Capability to open the backend's chat event stream. The session state
/// machine only sees this seam, which keeps it drivable by scripted
/// transports in tests.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn open_stream(
        &self,
        question: &str,
        opts: &StreamOptions,
    ) -> Result<(StreamHandle, mpsc::Receiver<StreamNotice>), ClientError>;
}

/// Cancellation capability for one live stream.
///
/// Closing is idempotent and safe after the stream already finished on its
/// own. Once `close` returns, the reader delivers nothing further; anything
/// still buffered is discarded by the session's generation guard.
#[derive(Debug)]
pub struct StreamHandle {
    closed: Arc<AtomicBool>,
    abort: AbortHandle,
}

impl StreamHandle {
    pub(crate) fn new(closed: Arc<AtomicBool>, abort: AbortHandle) -> Self {
        Self { closed, abort }
    }

    pub fn close(&self) {
        if !self.closed.swap(true, Ordering::SeqCst) {
            self.abort.abort();
        }
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

impl Drop for StreamHandle {
    fn drop(&mut self) {
        self.close();
    }
}
