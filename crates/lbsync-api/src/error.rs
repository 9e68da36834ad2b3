use thiserror::Error;

/// Top-level error type for the `lbsync-api` crate.
///
/// Covers every failure mode of both wire flavours: transport, signing,
/// provider-reported API errors, and asynchronous task failures.
/// `lbsync-core` maps these into reconciliation-level errors.
#[derive(Debug, Error)]
pub enum Error {
    // ── Transport ───────────────────────────────────────────────────
    /// HTTP transport error (connection refused, DNS failure, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// TLS setup or certificate error.
    #[error("TLS error: {0}")]
    Tls(String),

    /// Non-success HTTP status without a parseable API envelope.
    #[error("HTTP {status}: {body}")]
    Http { status: u16, body: String },

    // ── Signing ─────────────────────────────────────────────────────
    /// Request signature could not be computed.
    #[error("Request signing failed: {0}")]
    Signing(String),

    // ── Provider API ────────────────────────────────────────────────
    /// Error reported inside the provider's response envelope.
    ///
    /// `code` is the provider's own code rendered as a string: numeric
    /// for the query API (`"4400"`), dotted for the SDK API
    /// (`"RequestLimitExceeded"`).
    #[error("Cloud API error {code}: {message}")]
    Api {
        code: String,
        message: String,
        request_id: Option<String>,
    },

    /// The response envelope was valid but lacked a field we depend on.
    #[error("Response to {action} is missing {field}")]
    MissingField {
        action: &'static str,
        field: &'static str,
    },

    // ── Async tasks ─────────────────────────────────────────────────
    /// An asynchronous cloud task finished unsuccessfully.
    #[error("Cloud task {task_id} failed (status {status})")]
    TaskFailed { task_id: String, status: i64 },

    /// A retried call or task poll exceeded its attempt ceiling.
    #[error("{operation} did not complete after {attempts} attempts")]
    RetriesExhausted { operation: String, attempts: u32 },

    // ── Data ────────────────────────────────────────────────────────
    /// JSON deserialization failed, with the raw body for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },
}

impl Error {
    /// The provider error code, if this error carries one.
    pub fn code(&self) -> Option<&str> {
        match self {
            Self::Api { code, .. } => Some(code),
            _ => None,
        }
    }

    /// Returns `true` if the provider reported exactly this error code.
    pub fn has_code(&self, expected: &str) -> bool {
        self.code() == Some(expected)
    }

    /// Returns `true` if this is a transport-level hiccup worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_timeout() || e.is_connect(),
            Self::Http { status, .. } => *status >= 500,
            _ => false,
        }
    }

    /// Build a [`Deserialization`](Self::Deserialization) error with a short body preview.
    pub(crate) fn deserialization(err: &serde_json::Error, body: &str) -> Self {
        let preview = &body[..floor_char_boundary(body, 200)];
        Self::Deserialization {
            message: format!("{err} (body preview: {preview:?})"),
            body: body.to_owned(),
        }
    }
}

/// Largest char boundary at or below `max`, so previews never split a code point.
pub(crate) fn floor_char_boundary(s: &str, max: usize) -> usize {
    if max >= s.len() {
        return s.len();
    }
    (0..=max).rev().find(|&i| s.is_char_boundary(i)).unwrap_or(0)
}
