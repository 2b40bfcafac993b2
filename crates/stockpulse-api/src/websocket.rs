//! Streaming connection to a push-style RFID reader.
//!
//! [`ReaderSocket`] wraps a single WebSocket session: the handshake (with an
//! optional bearer credential), JSON frame sends, and a receive call that
//! hides ping/pong and binary noise. Reconnection policy lives with the
//! caller; this type only models one connection's lifetime.
//!
//! # Example
//!
//! ```rust,ignore
//! use stockpulse_api::websocket::{Inbound, ReaderSocket};
//!
//! let url = Url::parse("ws://10.0.0.5/events")?;
//! let mut socket = ReaderSocket::connect(&url, None, Duration::from_secs(10)).await?;
//! while let Inbound::Text(text) = socket.recv().await? {
//!     println!("{text}");
//! }
//! ```

use std::time::Duration;

use futures_util::{SinkExt, StreamExt};
use secrecy::{ExposeSecret, SecretString};
use serde::Serialize;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::{self, ClientRequestBuilder};
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream};
use url::Url;

use crate::error::Error;

type Stream = WebSocketStream<MaybeTlsStream<TcpStream>>;

/// What the reader sent next.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Inbound {
    /// A text frame, undecoded.
    Text(String),
    /// The reader closed the session (close frame or end of stream).
    Closed { code: Option<u16>, reason: String },
}

/// One open WebSocket session with a reader.
pub struct ReaderSocket {
    stream: Stream,
}

impl std::fmt::Debug for ReaderSocket {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ReaderSocket").finish_non_exhaustive()
    }
}

impl ReaderSocket {
    /// Perform the WebSocket handshake.
    ///
    /// If `bearer` is provided, it's injected as an `Authorization: Bearer`
    /// header on the upgrade request. A handshake that hasn't completed
    /// within `timeout` fails with [`Error::WebSocketConnect`].
    pub async fn connect(
        url: &Url,
        bearer: Option<&SecretString>,
        timeout: Duration,
    ) -> Result<Self, Error> {
        tracing::debug!(url = %url, "Connecting to reader WebSocket");

        let uri: tungstenite::http::Uri = url.as_str().parse().map_err(
            |e: tungstenite::http::uri::InvalidUri| Error::WebSocketConnect(e.to_string()),
        )?;

        let mut request = ClientRequestBuilder::new(uri);
        if let Some(token) = bearer {
            request = request.with_header("Authorization", format!("Bearer {}", token.expose_secret()));
        }

        let handshake = tokio_tungstenite::connect_async(request);
        let (stream, _response) = tokio::time::timeout(timeout, handshake)
            .await
            .map_err(|_| {
                Error::WebSocketConnect(format!(
                    "handshake timed out after {}ms",
                    timeout.as_millis()
                ))
            })?
            .map_err(|e| Error::WebSocketConnect(e.to_string()))?;

        Ok(Self { stream })
    }

    /// Serialize `payload` as JSON and send it as a text frame.
    pub async fn send_json<T: Serialize + ?Sized>(&mut self, payload: &T) -> Result<(), Error> {
        let text = serde_json::to_string(payload).map_err(|e| Error::WebSocketSend(e.to_string()))?;
        self.stream
            .send(tungstenite::Message::text(text))
            .await
            .map_err(|e| Error::WebSocketSend(e.to_string()))
    }

    /// Wait for the next text frame or the end of the session.
    ///
    /// Returns `Err` on a transport-level failure.
    pub async fn recv(&mut self) -> Result<Inbound, Error> {
        loop {
            match self.stream.next().await {
                Some(Ok(tungstenite::Message::Text(text))) => {
                    return Ok(Inbound::Text(text.to_string()));
                }
                Some(Ok(tungstenite::Message::Ping(_))) => {
                    // tungstenite handles pong replies automatically
                    tracing::trace!("WebSocket ping");
                }
                Some(Ok(tungstenite::Message::Close(frame))) => {
                    return Ok(match frame {
                        Some(cf) => Inbound::Closed {
                            code: Some(u16::from(cf.code)),
                            reason: cf.reason.to_string(),
                        },
                        None => Inbound::Closed {
                            code: None,
                            reason: String::new(),
                        },
                    });
                }
                Some(Err(e)) => return Err(Error::WebSocketConnect(e.to_string())),
                None => {
                    return Ok(Inbound::Closed {
                        code: None,
                        reason: "stream ended".into(),
                    });
                }
                // Binary, Pong, Frame -- ignore
                Some(Ok(_)) => {}
            }
        }
    }

    /// Close the session. Errors are logged, never returned.
    pub async fn close(mut self) {
        if let Err(e) = self.stream.close(None).await {
            tracing::debug!(error = %e, "WebSocket close did not complete cleanly");
        }
    }
}
