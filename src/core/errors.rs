use thiserror::Error;

/// Crate-wide error taxonomy.
///
/// Network and backend failures are funneled into the same notice channel as
/// success events (see `chat::stream`), so exactly one code path handles
/// both; these variants are what comes out of that funnel and out of the
/// plain request/response calls.
#[derive(Debug, Error)]
pub enum ClientError {
    /// Connection refused, mid-stream drop, or any other transport failure.
    #[error("transport error: {0}")]
    Transport(String),
    /// Non-2xx backend response; status and body are kept for display.
    #[error("api error ({status}): {body}")]
    Api { status: u16, body: String },
    /// Rejected client-side before any network call was made.
    #[error("validation error: {0}")]
    Validation(String),
    /// A wire frame that could not be decoded, surfaced across an API
    /// boundary. Inside the stream this stays non-fatal.
    #[error("decode error: {0}")]
    Decode(#[from] DecodeError),
}

impl ClientError {
    pub fn transport<E: std::fmt::Display>(err: E) -> Self {
        ClientError::Transport(err.to_string())
    }
}

/// One malformed wire frame. Carries the offending event name and the
/// original parse failure; never tears down the connection by itself.
#[derive(Debug, Error)]
#[error("failed to decode `{event}` stream frame")]
pub struct DecodeError {
    pub event: String,
    pub source: serde_json::Error,
}

impl DecodeError {
    pub fn new(event: impl Into<String>, source: serde_json::Error) -> Self {
        Self {
            event: event.into(),
            source,
        }
    }
}

/// Pass a successful response through; map anything else to
/// [`ClientError::Api`] with the body preserved.
pub(crate) async fn ok_or_api_error(
    res: reqwest::Response,
) -> Result<reqwest::Response, ClientError> {
    let status = res.status();
    if status.is_success() {
        return Ok(res);
    }
    let body = res.text().await.unwrap_or_default();
    Err(ClientError::Api {
        status: status.as_u16(),
        body,
    })
}
