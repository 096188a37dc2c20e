//! HTTP facade over the chat endpoints: streaming chat, one-shot query,
//! and feedback reports.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::Client;
use serde_json::json;
use tokio::sync::mpsc;

use crate::core::config::ClientConfig;
use crate::core::errors::{ok_or_api_error, ClientError};

use super::codec::{decode_frame, StreamEvent};
use super::sse::SseParser;
use super::stream::{ChatTransport, StreamHandle, StreamNotice, StreamOptions};
use super::types::{ChatResponse, ReportReceipt, ReportRequest};

const REPORT_SOURCE_DEFAULT: &str = "chat_message";
const NOTICE_BUFFER: usize = 32;

#[derive(Clone)]
pub struct ChatApi {
    http: Client,
    config: ClientConfig,
}

impl ChatApi {
    pub fn new(config: ClientConfig) -> Self {
        Self {
            http: Client::new(),
            config,
        }
    }

    pub fn config(&self) -> &ClientConfig {
        &self.config
    }

    /// Stream options derived from this client's configuration.
    pub fn stream_options(&self) -> StreamOptions {
        StreamOptions {
            include_debug: self.config.include_debug(),
            session_id: self.config.session_id().map(str::to_string),
        }
    }

    /// Non-streaming query: one request, the whole answer at once.
    pub async fn query(&self, question: &str) -> Result<ChatResponse, ClientError> {
        let url = self.config.endpoint("/chat/query");
        let mut req = self.http.post(&url).json(&json!({
            "question": question,
            "include_debug": self.config.include_debug(),
        }));
        if let Some(session_id) = self.config.session_id() {
            req = req.header("X-Session-Id", session_id);
        }

        let res = req.send().await.map_err(ClientError::transport)?;
        let res = ok_or_api_error(res).await?;
        res.json().await.map_err(ClientError::transport)
    }

    /// File a feedback report for a specific answer or citation. The reason
    /// is validated here; the backend failure, if any, comes back with
    /// status and body so the caller can show it. No retry.
    pub async fn report(&self, request: ReportRequest) -> Result<ReportReceipt, ClientError> {
        if request.reason.trim().is_empty() {
            return Err(ClientError::Validation(
                "report reason must not be empty".into(),
            ));
        }

        let mut payload = json!({
            "reference_id": request.reference_id,
            "reason": request.reason,
            "source": request.source.as_deref().unwrap_or(REPORT_SOURCE_DEFAULT),
        });
        if let Some(message_id) = &request.message_id {
            payload["message_id"] = json!(message_id);
        }

        let url = self.config.endpoint("/chat/report");
        let res = self
            .http
            .post(&url)
            .json(&payload)
            .send()
            .await
            .map_err(ClientError::transport)?;
        let res = ok_or_api_error(res).await?;
        res.json().await.map_err(ClientError::transport)
    }
}

#[async_trait]
impl ChatTransport for ChatApi {
    /// Open one persistent event-stream subscription for `question` and
    /// spawn the reader that forwards decoded notices in receipt order.
    async fn open_stream(
        &self,
        question: &str,
        opts: &StreamOptions,
    ) -> Result<(StreamHandle, mpsc::Receiver<StreamNotice>), ClientError> {
        let url = self.config.endpoint("/chat/stream");
        let include_debug = if opts.include_debug { "true" } else { "false" };
        let mut req = self
            .http
            .get(&url)
            .query(&[("q", question), ("include_debug", include_debug)])
            .header("Accept", "text/event-stream");
        if let Some(session_id) = &opts.session_id {
            req = req.header("X-Session-Id", session_id);
        }

        let res = req.send().await.map_err(ClientError::transport)?;
        let res = ok_or_api_error(res).await?;

        let (tx, rx) = mpsc::channel(NOTICE_BUFFER);
        let closed = Arc::new(AtomicBool::new(false));
        let reader_closed = Arc::clone(&closed);
        let task = tokio::spawn(async move {
            read_stream(res, tx, reader_closed).await;
        });

        Ok((StreamHandle::new(closed, task.abort_handle()), rx))
    }
}

async fn read_stream(
    res: reqwest::Response,
    tx: mpsc::Sender<StreamNotice>,
    closed: Arc<AtomicBool>,
) {
    let mut body = res.bytes_stream();
    let mut parser = SseParser::new();

    while let Some(chunk) = body.next().await {
        let chunk = match chunk {
            Ok(bytes) => bytes,
            Err(err) => {
                let notice = StreamNotice::Transport(ClientError::transport(err));
                deliver(&tx, &closed, notice).await;
                return;
            }
        };

        for frame in parser.feed(&chunk) {
            let notice = match decode_frame(&frame) {
                Ok(Some(event)) => StreamNotice::Event(event),
                Ok(None) => continue,
                Err(err) => StreamNotice::Decode(err),
            };
            let finished = matches!(notice, StreamNotice::Event(StreamEvent::Done(_)));
            if !deliver(&tx, &closed, notice).await {
                return;
            }
            if finished {
                return;
            }
        }
    }

    // The server went away without a `done` frame.
    let notice = StreamNotice::Transport(ClientError::Transport(
        "stream closed before completion".into(),
    ));
    deliver(&tx, &closed, notice).await;
}

/// Forward one notice unless the handle was closed or the receiver is gone.
async fn deliver(
    tx: &mpsc::Sender<StreamNotice>,
    closed: &AtomicBool,
    notice: StreamNotice,
) -> bool {
    if closed.load(Ordering::SeqCst) {
        return false;
    }
    tx.send(notice).await.is_ok()
}
