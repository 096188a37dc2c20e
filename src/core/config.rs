use std::env;

const API_BASE_ENV: &str = "CHATDOCK_API_BASE";
const DEFAULT_API_BASE: &str = "http://127.0.0.1:8000";

/// Connection settings for the chat backend.
///
/// The base URL is normalized once at construction: trailing slashes are
/// trimmed and the versioned API prefix is appended unless the caller
/// already supplied one (`…/api/v2` stays untouched).
#[derive(Debug, Clone)]
pub struct ClientConfig {
    base_url: String,
    session_id: Option<String>,
    include_debug: bool,
}

impl ClientConfig {
    pub fn new(base_url: impl AsRef<str>) -> Self {
        Self {
            base_url: normalize_base(base_url.as_ref()),
            session_id: None,
            include_debug: false,
        }
    }

    /// Read the base URL from `CHATDOCK_API_BASE`, falling back to a local
    /// development backend.
    pub fn from_env() -> Self {
        let base = env::var(API_BASE_ENV).unwrap_or_else(|_| DEFAULT_API_BASE.to_string());
        Self::new(base)
    }

    /// Correlate requests under one backend session id (sent as
    /// `X-Session-Id`).
    pub fn with_session_id(mut self, session_id: impl Into<String>) -> Self {
        self.session_id = Some(session_id.into());
        self
    }

    /// Ask the backend to attach retrieval debug metadata to answers.
    pub fn with_include_debug(mut self, include_debug: bool) -> Self {
        self.include_debug = include_debug;
        self
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn session_id(&self) -> Option<&str> {
        self.session_id.as_deref()
    }

    pub fn include_debug(&self) -> bool {
        self.include_debug
    }

    /// Absolute URL for an API path (`path` starts with `/`).
    pub fn endpoint(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }
}

fn normalize_base(raw: &str) -> String {
    let stripped = raw.trim().trim_end_matches('/');
    if has_version_suffix(stripped) {
        stripped.to_string()
    } else {
        format!("{stripped}/api/v1")
    }
}

/// True when the base already ends in `/api/v<digits>` (any casing).
fn has_version_suffix(base: &str) -> bool {
    let mut parts = base.rsplitn(2, '/');
    let last = parts.next().unwrap_or("");
    let rest = parts.next().unwrap_or("");

    let digits = match last.strip_prefix('v').or_else(|| last.strip_prefix('V')) {
        Some(d) => d,
        None => return false,
    };
    if digits.is_empty() || !digits.chars().all(|c| c.is_ascii_digit()) {
        return false;
    }
    rest.to_ascii_lowercase().ends_with("/api")
}
