use thiserror::Error;

/// Top-level error type for the `stockpulse-api` crate.
///
/// Covers every failure mode of the wire-level clients: HTTP polling,
/// the reader WebSocket stream, and alert webhook delivery.
/// `stockpulse-core` maps these into listener state transitions.
#[derive(Debug, Error)]
pub enum Error {
    // ── Transport ───────────────────────────────────────────────────
    /// HTTP transport error (connection refused, DNS failure, etc.)
    #[error("HTTP transport error: {0}")]
    Transport(#[from] reqwest::Error),

    /// URL parsing error.
    #[error("Invalid URL: {0}")]
    InvalidUrl(#[from] url::ParseError),

    /// The endpoint answered with a non-success HTTP status.
    #[error("Endpoint returned HTTP {status}")]
    Status { status: u16 },

    /// TLS setup or HTTP client construction failed.
    #[error("TLS error: {0}")]
    Tls(String),

    /// A credential could not be encoded as a header value.
    #[error("Invalid header value for {name}")]
    InvalidHeader { name: &'static str },

    // ── WebSocket ───────────────────────────────────────────────────
    /// WebSocket connection failed, or the stream errored mid-session.
    #[error("WebSocket connection failed: {0}")]
    WebSocketConnect(String),

    /// Sending a frame to the reader failed.
    #[error("WebSocket send failed: {0}")]
    WebSocketSend(String),

    // ── Data ────────────────────────────────────────────────────────
    /// JSON deserialization failed, with the raw body for debugging.
    #[error("Deserialization error: {message}")]
    Deserialization { message: String, body: String },
}

impl Error {
    /// Returns `true` if this is a transient error worth retrying.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Transport(e) => e.is_timeout() || e.is_connect(),
            Self::WebSocketConnect(_) => true,
            Self::Status { status } => *status >= 500,
            _ => false,
        }
    }

    /// The HTTP status carried by this error, if any.
    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Status { status } => Some(*status),
            Self::Transport(e) => e.status().map(|s| s.as_u16()),
            _ => None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn server_errors_are_transient() {
        assert!(Error::Status { status: 503 }.is_transient());
        assert!(!Error::Status { status: 404 }.is_transient());
        assert!(Error::WebSocketConnect("refused".into()).is_transient());
    }

    #[test]
    fn status_is_exposed() {
        assert_eq!(Error::Status { status: 401 }.status(), Some(401));
        assert_eq!(Error::Tls("bad".into()).status(), None);
    }
}
