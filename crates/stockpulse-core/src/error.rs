// ── Core error types ──
//
// Errors that cross a component boundary. Recoverable conditions (reader
// reconnects, poll backoff, PLC dial retries) are handled inside the
// component and never show up here. The `From<stockpulse_api::Error>` impl
// translates transport-layer errors into domain-appropriate variants.

use thiserror::Error;

/// Failures talking to the PLC.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum PlcError {
    /// The node address is not of the form `ns=<n>;s=<s>`. No I/O was attempted.
    #[error("Invalid node ID format: {address}")]
    InvalidAddress { address: String },

    /// Every dial attempt failed; the connection state was reset.
    #[error("Cannot connect to PLC at {url} after {attempts} attempts")]
    Unavailable { url: String, attempts: u32 },

    /// The PLC answered with a protocol status code.
    #[error("PLC rejected operation on {address}: {status}")]
    Status { address: String, status: String },

    /// Any other failure during an operation on an established connection.
    #[error("PLC operation on {address} failed: {message}")]
    Operation { address: String, message: String },

    /// A typed helper was handed a value outside its accepted set.
    #[error("Invalid {field}: {reason}")]
    InvalidValue { field: String, reason: String },
}

/// Failures reported by the inventory store collaborator.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum StoreError {
    #[error("Inventory store unavailable: {0}")]
    Unavailable(String),

    /// The batch was rejected as a whole; nothing was written.
    #[error("Tracking batch rejected: {0}")]
    Rejected(String),
}

/// Unified error type for the core crate.
#[derive(Debug, Error)]
pub enum CoreError {
    // ── Reader errors ────────────────────────────────────────────────
    #[error("Cannot connect to reader at {url}: {reason}")]
    ReaderConnect { url: String, reason: String },

    #[error("Reader returned HTTP {status}")]
    ReaderStatus { status: u16 },

    #[error("Malformed reader payload: {message}")]
    Decode { message: String },

    #[error("Unknown reader: {reader_id}")]
    UnknownReader { reader_id: String },

    // ── Collaborator errors ──────────────────────────────────────────
    #[error(transparent)]
    Plc(#[from] PlcError),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error("Alert delivery failed: {message}")]
    Alert { message: String },

    // ── Configuration errors ─────────────────────────────────────────
    #[error("Configuration error: {message}")]
    Config { message: String },

    // ── Internal errors ──────────────────────────────────────────────
    #[error("Internal error: {0}")]
    Internal(String),
}

// ── Conversion from transport-layer errors ───────────────────────────

impl From<stockpulse_api::Error> for CoreError {
    fn from(err: stockpulse_api::Error) -> Self {
        match err {
            stockpulse_api::Error::Transport(ref e) => CoreError::ReaderConnect {
                url: e.url().map_or_else(|| "<unknown>".into(), ToString::to_string),
                reason: e.to_string(),
            },
            stockpulse_api::Error::InvalidUrl(e) => CoreError::Config {
                message: format!("Invalid URL: {e}"),
            },
            stockpulse_api::Error::Status { status } => CoreError::ReaderStatus { status },
            stockpulse_api::Error::Tls(msg) => CoreError::ReaderConnect {
                url: String::new(),
                reason: format!("TLS error: {msg}"),
            },
            stockpulse_api::Error::InvalidHeader { name } => CoreError::Config {
                message: format!("credential cannot be sent as {name} header"),
            },
            stockpulse_api::Error::WebSocketConnect(reason)
            | stockpulse_api::Error::WebSocketSend(reason) => CoreError::ReaderConnect {
                url: String::new(),
                reason: format!("WebSocket: {reason}"),
            },
            stockpulse_api::Error::Deserialization { message, body: _ } => {
                CoreError::Decode { message }
            }
        }
    }
}
