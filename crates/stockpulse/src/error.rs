//! CLI error types with miette diagnostics.
//!
//! Maps core and config errors into user-facing errors with actionable help text.

use miette::Diagnostic;
use thiserror::Error;

use stockpulse_config::ConfigError;
use stockpulse_core::{CoreError, PlcError};

pub mod exit_code {
    pub const GENERAL: i32 = 1;
    pub const USAGE: i32 = 2;
    pub const CONFIG: i32 = 3;
    pub const CONNECTION: i32 = 7;
}

#[derive(Debug, Error, Diagnostic)]
pub enum CliError {
    // ── Connection ───────────────────────────────────────────────────

    #[error("Could not connect to {target} at {url}")]
    #[diagnostic(
        code(stockpulse::connection_failed),
        help("Check that the device is powered and reachable from this host.\nURL: {url}")
    )]
    ConnectionFailed {
        target: &'static str,
        url: String,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    // ── Configuration ────────────────────────────────────────────────

    #[error("Configuration is invalid")]
    #[diagnostic(
        code(stockpulse::config),
        help("Config file: {path}\nRun: stockpulse config validate")
    )]
    Config {
        path: String,
        #[source]
        source: ConfigError,
    },

    #[error("No readers configured")]
    #[diagnostic(
        code(stockpulse::no_readers),
        help(
            "Add a [readers.<id>] table with a url, or set reader_url.\n\
             Config file: {path}"
        )
    )]
    NoReaders { path: String },

    // ── Validation ───────────────────────────────────────────────────

    #[error("Invalid value for {field}: {reason}")]
    #[diagnostic(code(stockpulse::validation))]
    Validation { field: String, reason: String },

    // ── Runtime ──────────────────────────────────────────────────────

    #[error(transparent)]
    #[diagnostic(code(stockpulse::core))]
    Core(CoreError),

    #[error(transparent)]
    Io(#[from] std::io::Error),

    #[error("Failed to render output: {0}")]
    #[diagnostic(code(stockpulse::render))]
    Render(String),
}

impl CliError {
    /// Map this error to an exit code for process termination.
    pub fn exit_code(&self) -> i32 {
        match self {
            Self::ConnectionFailed { .. } => exit_code::CONNECTION,
            Self::Config { .. } | Self::NoReaders { .. } => exit_code::CONFIG,
            Self::Validation { .. } => exit_code::USAGE,
            _ => exit_code::GENERAL,
        }
    }

    pub fn config(path: &std::path::Path, source: ConfigError) -> Self {
        Self::Config {
            path: path.display().to_string(),
            source,
        }
    }
}

// ── CoreError → CliError mapping ─────────────────────────────────────

impl From<CoreError> for CliError {
    fn from(err: CoreError) -> Self {
        match err {
            CoreError::ReaderConnect { url, reason } => CliError::ConnectionFailed {
                target: "reader",
                url,
                source: reason.into(),
            },
            CoreError::Plc(PlcError::Unavailable { url, attempts }) => CliError::ConnectionFailed {
                target: "PLC",
                source: format!("gave up after {attempts} attempts").into(),
                url,
            },
            CoreError::Config { message } => CliError::Validation {
                field: "config".into(),
                reason: message,
            },
            other => CliError::Core(other),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exit_codes_follow_error_class() {
        let plc: CliError = CoreError::Plc(PlcError::Unavailable {
            url: "opc.tcp://plc:4840".into(),
            attempts: 3,
        })
        .into();
        assert_eq!(plc.exit_code(), exit_code::CONNECTION);

        let cfg = CliError::config(
            std::path::Path::new("/etc/stockpulse.toml"),
            ConfigError::Validation {
                field: "poll.default_interval_secs".into(),
                reason: "must be positive".into(),
            },
        );
        assert_eq!(cfg.exit_code(), exit_code::CONFIG);

        let store: CliError = CoreError::Internal("boom".into()).into();
        assert_eq!(store.exit_code(), exit_code::GENERAL);
    }
}
