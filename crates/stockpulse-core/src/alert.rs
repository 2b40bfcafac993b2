// ── Alerting ──
//
// Every alert is logged at error level. If a sink is configured the alert is
// also delivered to it; delivery failures are logged and swallowed.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use strum::Display;
use tracing::{error, warn};

use stockpulse_api::{AlertPayload, TransportConfig, WebhookClient};

use crate::config::AlertConfig;
use crate::error::CoreError;

/// Why the supervisor raised an alert.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum AlertKind {
    /// The listener task died and was restarted.
    ConnectionLost,
    /// The listener crossed the error threshold and was restarted.
    ExcessiveErrors,
    /// Nothing heard from the reader for longer than the threshold.
    Inactive,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Alert {
    pub kind: AlertKind,
    pub reader_id: String,
    pub source: String,
    pub severity: String,
    pub message: String,
    pub timestamp: DateTime<Utc>,
}

impl Alert {
    pub fn payload(&self) -> AlertPayload {
        AlertPayload {
            source: self.source.clone(),
            severity: self.severity.clone(),
            message: self.message.clone(),
            timestamp: self.timestamp,
        }
    }
}

/// Destination for alerts beyond the log.
#[async_trait]
pub trait AlertSink: Send + Sync {
    async fn deliver(&self, alert: &Alert) -> Result<(), CoreError>;
}

/// POSTs the alert payload to a webhook.
#[derive(Debug, Clone)]
pub struct WebhookAlertSink {
    client: WebhookClient,
}

impl WebhookAlertSink {
    pub fn new(client: WebhookClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl AlertSink for WebhookAlertSink {
    async fn deliver(&self, alert: &Alert) -> Result<(), CoreError> {
        self.client
            .post(&alert.payload())
            .await
            .map_err(|e| CoreError::Alert {
                message: e.to_string(),
            })
    }
}

/// Logs alerts and forwards them to the configured sink.
#[derive(Clone)]
pub struct Alerter {
    source: String,
    sink: Option<Arc<dyn AlertSink>>,
}

impl std::fmt::Debug for Alerter {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Alerter")
            .field("source", &self.source)
            .field("sink", &self.sink.is_some())
            .finish()
    }
}

impl Alerter {
    pub fn new(source: impl Into<String>, sink: Option<Arc<dyn AlertSink>>) -> Self {
        Self {
            source: source.into(),
            sink,
        }
    }

    /// Build from config, wiring a webhook sink when a URL is set.
    pub fn from_config(config: &AlertConfig) -> Result<Self, CoreError> {
        let sink: Option<Arc<dyn AlertSink>> = match &config.webhook_url {
            Some(url) => {
                let client =
                    WebhookClient::new(url.clone(), &TransportConfig::with_timeout(config.timeout))?;
                Some(Arc::new(WebhookAlertSink::new(client)))
            }
            None => None,
        };
        Ok(Self::new(config.source.clone(), sink))
    }

    /// Raise an alert. Never fails.
    pub async fn raise(&self, kind: AlertKind, reader_id: &str, message: String) -> Alert {
        let alert = Alert {
            kind,
            reader_id: reader_id.to_owned(),
            source: self.source.clone(),
            severity: "critical".into(),
            message,
            timestamp: Utc::now(),
        };

        error!(alert = %alert.kind, reader_id, "RFID ALERT: {}", alert.message);

        if let Some(sink) = &self.sink {
            if let Err(e) = sink.deliver(&alert).await {
                warn!(error = %e, "failed to send alert");
            }
        }
        alert
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Mutex;

    use super::*;

    #[derive(Default)]
    struct Recording(Mutex<Vec<Alert>>);

    #[async_trait]
    impl AlertSink for Recording {
        async fn deliver(&self, alert: &Alert) -> Result<(), CoreError> {
            self.0.lock().unwrap().push(alert.clone());
            Ok(())
        }
    }

    struct Broken;

    #[async_trait]
    impl AlertSink for Broken {
        async fn deliver(&self, _: &Alert) -> Result<(), CoreError> {
            Err(CoreError::Alert {
                message: "connection refused".into(),
            })
        }
    }

    #[tokio::test]
    async fn raise_delivers_to_sink() {
        let sink = Arc::new(Recording::default());
        let alerter = Alerter::new("rfid_system", Some(sink.clone()));

        let alert = alerter
            .raise(AlertKind::Inactive, "dock", "RFID reader dock inactive".into())
            .await;

        let delivered = sink.0.lock().unwrap();
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0], alert);
        assert_eq!(alert.payload().source, "rfid_system");
        assert_eq!(alert.payload().severity, "critical");
    }

    #[tokio::test]
    async fn delivery_failure_is_swallowed() {
        let alerter = Alerter::new("rfid_system", Some(Arc::new(Broken)));
        let alert = alerter
            .raise(AlertKind::ConnectionLost, "dock", "lost".into())
            .await;
        assert_eq!(alert.kind, AlertKind::ConnectionLost);
    }
}
