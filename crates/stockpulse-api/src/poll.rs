// HTTP polling client for readers without a streaming endpoint.
//
// One GET per call, optionally scoped with `since_id` so the reader only
// returns scans newer than the caller's cursor.

use tracing::debug;
use url::Url;

use crate::error::Error;
use crate::frames::PollResponse;
use crate::transport::TransportConfig;

/// Raw HTTP client for a single reader's polling endpoint.
#[derive(Debug, Clone)]
pub struct PollClient {
    http: reqwest::Client,
    url: Url,
}

impl PollClient {
    /// Build a client from a `TransportConfig` (timeout, TLS, bearer).
    pub fn new(url: Url, transport: &TransportConfig) -> Result<Self, Error> {
        let http = transport.build_client()?;
        Ok(Self { http, url })
    }

    /// Create a poll client with a pre-built `reqwest::Client`.
    pub fn with_client(http: reqwest::Client, url: Url) -> Self {
        Self { http, url }
    }

    /// The polling endpoint.
    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Fetch scans newer than `since`.
    ///
    /// Any non-2xx status is an [`Error::Status`]; bodies that don't match
    /// `{ "scans": [...] }` are an [`Error::Deserialization`].
    pub async fn fetch(&self, since: Option<u64>) -> Result<PollResponse, Error> {
        let mut request = self.http.get(self.url.clone());
        if let Some(since) = since {
            request = request.query(&[("since_id", since)]);
        }
        debug!(url = %self.url, ?since, "polling reader");

        let resp = request.send().await.map_err(Error::Transport)?;
        let status = resp.status();
        if !status.is_success() {
            return Err(Error::Status {
                status: status.as_u16(),
            });
        }

        let body = resp.text().await.map_err(Error::Transport)?;
        serde_json::from_str(&body).map_err(|e| Error::Deserialization {
            message: e.to_string(),
            body,
        })
    }
}
