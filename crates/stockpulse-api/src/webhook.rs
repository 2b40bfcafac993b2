// Alert webhook delivery.

use url::Url;

use crate::error::Error;
use crate::frames::AlertPayload;
use crate::transport::TransportConfig;

/// POSTs [`AlertPayload`]s to a single webhook URL.
#[derive(Debug, Clone)]
pub struct WebhookClient {
    http: reqwest::Client,
    url: Url,
}

impl WebhookClient {
    pub fn new(url: Url, transport: &TransportConfig) -> Result<Self, Error> {
        Ok(Self {
            http: transport.build_client()?,
            url,
        })
    }

    pub fn url(&self) -> &Url {
        &self.url
    }

    /// Deliver one alert. Non-2xx responses are errors.
    pub async fn post(&self, payload: &AlertPayload) -> Result<(), Error> {
        let resp = self
            .http
            .post(self.url.clone())
            .json(payload)
            .send()
            .await
            .map_err(Error::Transport)?;

        let status = resp.status();
        if status.is_success() {
            Ok(())
        } else {
            Err(Error::Status {
                status: status.as_u16(),
            })
        }
    }
}
