// Shared transport configuration for building reqwest::Client instances.
//
// The poll client and the alert webhook share TLS, timeout, and bearer
// header settings through this module, avoiding duplicated builder logic.

use std::path::PathBuf;
use std::time::Duration;

use reqwest::header::{AUTHORIZATION, HeaderMap, HeaderValue};
use secrecy::{ExposeSecret, SecretString};

use crate::error::Error;

const USER_AGENT: &str = concat!("stockpulse/", env!("CARGO_PKG_VERSION"));

/// TLS verification mode for reader and webhook endpoints.
#[derive(Debug, Clone, Default)]
pub enum TlsMode {
    /// Use the system certificate store.
    #[default]
    System,
    /// Use a custom CA certificate from the given PEM file.
    CustomCa(PathBuf),
    /// Accept any certificate (readers on the plant LAN often self-sign).
    DangerAcceptInvalid,
}

/// Shared transport configuration for building HTTP clients.
#[derive(Debug, Clone)]
pub struct TransportConfig {
    pub tls: TlsMode,
    pub timeout: Duration,
    /// Sent as `Authorization: Bearer <token>` on every request.
    pub bearer: Option<SecretString>,
}

impl Default for TransportConfig {
    fn default() -> Self {
        Self {
            tls: TlsMode::System,
            timeout: Duration::from_secs(5),
            bearer: None,
        }
    }
}

impl TransportConfig {
    /// Config with the given request timeout and no credential.
    pub fn with_timeout(timeout: Duration) -> Self {
        Self {
            timeout,
            ..Self::default()
        }
    }

    /// Attach a bearer credential.
    pub fn bearer(mut self, token: Option<SecretString>) -> Self {
        self.bearer = token;
        self
    }

    /// Build a `reqwest::Client` from this config.
    pub fn build_client(&self) -> Result<reqwest::Client, Error> {
        let mut builder = reqwest::Client::builder()
            .timeout(self.timeout)
            .user_agent(USER_AGENT)
            .default_headers(self.default_headers()?);

        match &self.tls {
            TlsMode::System => {}
            TlsMode::CustomCa(path) => {
                let cert_pem = std::fs::read(path)
                    .map_err(|e| Error::Tls(format!("failed to read CA cert: {e}")))?;
                let cert = reqwest::Certificate::from_pem(&cert_pem)
                    .map_err(|e| Error::Tls(format!("invalid CA cert: {e}")))?;
                builder = builder.add_root_certificate(cert);
            }
            TlsMode::DangerAcceptInvalid => {
                builder = builder.danger_accept_invalid_certs(true);
            }
        }

        builder
            .build()
            .map_err(|e| Error::Tls(format!("failed to build HTTP client: {e}")))
    }

    fn default_headers(&self) -> Result<HeaderMap, Error> {
        let mut headers = HeaderMap::new();
        if let Some(value) = bearer_header(self.bearer.as_ref())? {
            headers.insert(AUTHORIZATION, value);
        }
        Ok(headers)
    }
}

/// Render an optional bearer token as a sensitive `Authorization` value.
pub(crate) fn bearer_header(token: Option<&SecretString>) -> Result<Option<HeaderValue>, Error> {
    let Some(token) = token else {
        return Ok(None);
    };
    let mut value = HeaderValue::from_str(&format!("Bearer {}", token.expose_secret()))
        .map_err(|_| Error::InvalidHeader {
            name: "Authorization",
        })?;
    value.set_sensitive(true);
    Ok(Some(value))
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;

    #[test]
    fn bearer_header_is_sensitive() {
        let token = SecretString::from("abc123".to_string());
        let value = bearer_header(Some(&token)).unwrap().unwrap();
        assert!(value.is_sensitive());
        assert_eq!(value.to_str().unwrap(), "Bearer abc123");
    }

    #[test]
    fn no_token_no_header() {
        assert!(bearer_header(None).unwrap().is_none());
    }

    #[test]
    fn control_characters_are_rejected() {
        let token = SecretString::from("bad\ntoken".to_string());
        assert!(matches!(
            bearer_header(Some(&token)),
            Err(Error::InvalidHeader { .. })
        ));
    }
}
