// ── PLC client ──
//
// One lazily-dialled session to the PLC, shared by the whole process.
// Every connect/disconnect sequence runs under one async mutex; the
// session handle is `Some` exactly when the client is connected.

pub mod address;
pub mod panel;
pub mod simulated;
pub mod transport;

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tracing::{debug, error, info, warn};

pub use address::NodeAddress;
pub use panel::{InventorySync, PlcPanel, TrafficLight};
pub use simulated::SimulatedPlc;
pub use transport::{PlcEndpoint, PlcSession, PlcTransport, PlcValue, TransportFault};

use crate::config::PlcConfig;
use crate::error::{CoreError, PlcError};

/// URL scheme served by the built-in simulator.
pub const SIMULATOR_SCHEME: &str = "sim://";

/// Injectable handle to the process-wide PLC session.
///
/// Cheaply cloneable; clones share the connection.
#[derive(Clone)]
pub struct PlcClient {
    inner: Arc<PlcInner>,
}

struct PlcInner {
    endpoint: PlcEndpoint,
    transport: Arc<dyn PlcTransport>,
    connect_retries: u32,
    retry_delay: Duration,
    session: Mutex<Option<Arc<dyn PlcSession>>>,
}

impl std::fmt::Debug for PlcClient {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PlcClient")
            .field("url", &self.inner.endpoint.url)
            .field("connect_retries", &self.inner.connect_retries)
            .field("retry_delay", &self.inner.retry_delay)
            .finish_non_exhaustive()
    }
}

impl PlcClient {
    /// Create a client. Does NOT dial; the first operation does.
    pub fn new(
        endpoint: PlcEndpoint,
        transport: Arc<dyn PlcTransport>,
        connect_retries: u32,
        retry_delay: Duration,
    ) -> Self {
        Self {
            inner: Arc::new(PlcInner {
                endpoint,
                transport,
                connect_retries: connect_retries.max(1),
                retry_delay,
                session: Mutex::new(None),
            }),
        }
    }

    /// Build from config. `sim://` endpoints get a fresh [`SimulatedPlc`];
    /// anything else needs an embedder-supplied transport.
    pub fn from_config(
        config: &PlcConfig,
        transport: Option<Arc<dyn PlcTransport>>,
    ) -> Result<Self, CoreError> {
        let transport: Arc<dyn PlcTransport> = match transport {
            Some(t) => t,
            None if config.url.starts_with(SIMULATOR_SCHEME) => Arc::new(SimulatedPlc::new()),
            None => {
                return Err(CoreError::Config {
                    message: format!(
                        "no PLC transport available for {} (only {SIMULATOR_SCHEME} is built in)",
                        config.url
                    ),
                });
            }
        };

        let endpoint = PlcEndpoint {
            url: config.url.clone(),
            username: config.username.clone(),
            password: config.password.clone(),
        };
        Ok(Self::new(
            endpoint,
            transport,
            config.connect_retries,
            config.retry_delay,
        ))
    }

    pub fn url(&self) -> &str {
        &self.inner.endpoint.url
    }

    // ── Connection lifecycle ─────────────────────────────────────

    /// Return the live session, dialling if there is none.
    ///
    /// Dials up to `connect_retries` times, `retry_delay` apart. The lock
    /// is held for the whole sequence, so concurrent callers wait and then
    /// reuse whatever it produced.
    pub async fn acquire(&self) -> Result<Arc<dyn PlcSession>, PlcError> {
        let mut state = self.inner.session.lock().await;
        if let Some(session) = state.as_ref() {
            return Ok(Arc::clone(session));
        }

        let url = &self.inner.endpoint.url;
        let attempts = self.inner.connect_retries;
        for attempt in 1..=attempts {
            match self.inner.transport.connect(&self.inner.endpoint).await {
                Ok(session) => {
                    let session: Arc<dyn PlcSession> = Arc::from(session);
                    *state = Some(Arc::clone(&session));
                    info!(url = %url, attempt, "connected to PLC");
                    return Ok(session);
                }
                Err(e) => {
                    warn!(url = %url, attempt, attempts, error = %e, "PLC connection attempt failed");
                    if attempt < attempts {
                        tokio::time::sleep(self.inner.retry_delay).await;
                    }
                }
            }
        }

        *state = None;
        error!(url = %url, attempts, "cannot connect to PLC");
        Err(PlcError::Unavailable {
            url: url.clone(),
            attempts,
        })
    }

    /// Tear down the session, if any. Never fails; state ends up absent.
    pub async fn release(&self) {
        let mut state = self.inner.session.lock().await;
        if let Some(session) = state.take() {
            match session.disconnect().await {
                Ok(()) => info!(url = %self.inner.endpoint.url, "disconnected from PLC"),
                Err(e) => warn!(error = %e, "error disconnecting from PLC (non-fatal)"),
            }
        }
    }

    pub async fn is_connected(&self) -> bool {
        self.inner.session.lock().await.is_some()
    }

    /// Acquire (dialling if needed) and report whether the PLC is reachable.
    pub async fn probe(&self) -> bool {
        self.acquire().await.is_ok()
    }

    // ── Node operations ──────────────────────────────────────────

    pub async fn read_node(&self, address: &str) -> Result<PlcValue, PlcError> {
        let node = validated(address)?;
        let session = self.acquire().await?;

        match session.read_value(&node).await {
            Ok(value) => {
                debug!(node = %node, value = %value, "read PLC node");
                Ok(value)
            }
            Err(fault) => Err(self.operation_failed(&node, None, &session, fault).await),
        }
    }

    pub async fn write_node(&self, address: &str, value: PlcValue) -> Result<(), PlcError> {
        let node = validated(address)?;
        let session = self.acquire().await?;

        match session.write_value(&node, &value).await {
            Ok(()) => {
                info!(node = %node, value = %value, "wrote PLC node");
                Ok(())
            }
            Err(fault) => Err(self.operation_failed(&node, Some(&value), &session, fault).await),
        }
    }

    /// Log a failed operation and map it to a [`PlcError`].
    ///
    /// A non-status fault means the session itself is suspect: it is
    /// released so the next call re-dials. Status faults leave it alone.
    async fn operation_failed(
        &self,
        node: &NodeAddress,
        value: Option<&PlcValue>,
        session: &Arc<dyn PlcSession>,
        fault: TransportFault,
    ) -> PlcError {
        let value = value.map(ToString::to_string);
        match fault {
            TransportFault::Status { code, name } => {
                error!(node = %node, value = ?value, status = %name, code, "PLC status error");
                PlcError::Status {
                    address: node.to_string(),
                    status: name,
                }
            }
            TransportFault::Other(message) => {
                error!(node = %node, value = ?value, error = %message, "PLC operation failed");
                self.release_if_current(session).await;
                PlcError::Operation {
                    address: node.to_string(),
                    message,
                }
            }
        }
    }

    async fn release_if_current(&self, session: &Arc<dyn PlcSession>) {
        let mut state = self.inner.session.lock().await;
        let is_current = state.as_ref().is_some_and(|s| Arc::ptr_eq(s, session));
        if is_current {
            *state = None;
            if let Err(e) = session.disconnect().await {
                debug!(error = %e, "disconnect after failed operation");
            }
        }
    }
}

fn validated(address: &str) -> Result<NodeAddress, PlcError> {
    NodeAddress::parse(address).inspect_err(|_| {
        error!(address, "invalid node ID format");
    })
}
