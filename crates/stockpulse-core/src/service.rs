// ── Ingestion service ──
//
// The surface the outer layers (HTTP API, CLI) call into: submit scans,
// read listener health, start and stop everything.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::alert::Alerter;
use crate::config::ServiceConfig;
use crate::error::CoreError;
use crate::inventory::InventoryStore;
use crate::model::{ListenerStatus, ScanResult};
use crate::plc::{PlcClient, PlcPanel};
use crate::registry::ListenerRegistry;
use crate::scan::ScanProcessor;

/// Cheaply cloneable via `Arc<ServiceInner>`.
#[derive(Clone)]
pub struct IngestService {
    inner: Arc<ServiceInner>,
}

struct ServiceInner {
    processor: ScanProcessor,
    registry: ListenerRegistry,
    panel: Option<PlcPanel>,
    supervise: bool,
    plc_sync_interval: Option<Duration>,
    sync_task: Mutex<Option<(CancellationToken, JoinHandle<()>)>>,
}

impl std::fmt::Debug for IngestService {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("IngestService")
            .field("registry", &self.inner.registry)
            .field("panel", &self.inner.panel)
            .field("supervise", &self.inner.supervise)
            .finish_non_exhaustive()
    }
}

impl IngestService {
    /// Build from config. The PLC, if configured, must use the built-in
    /// simulator; use [`with_parts`](Self::with_parts) to plug in a real
    /// transport.
    pub fn new(config: &ServiceConfig, store: Arc<dyn InventoryStore>) -> Result<Self, CoreError> {
        let alerter = Alerter::from_config(&config.alerts)?;
        let panel = match &config.plc {
            Some(plc) => Some(PlcPanel::from_config(PlcClient::from_config(plc, None)?, plc)),
            None => None,
        };
        Ok(Self::with_parts(config, store, alerter, panel))
    }

    pub fn with_parts(
        config: &ServiceConfig,
        store: Arc<dyn InventoryStore>,
        alerter: Alerter,
        panel: Option<PlcPanel>,
    ) -> Self {
        let processor = ScanProcessor::new(store);
        let registry = ListenerRegistry::from_config(config, processor.clone(), alerter);
        let plc_sync_interval = config.plc.as_ref().and_then(|p| p.sync_interval);

        Self {
            inner: Arc::new(ServiceInner {
                processor,
                registry,
                panel,
                supervise: config.supervisor.enabled,
                plc_sync_interval,
                sync_task: Mutex::new(None),
            }),
        }
    }

    pub fn registry(&self) -> &ListenerRegistry {
        &self.inner.registry
    }

    pub fn processor(&self) -> &ScanProcessor {
        &self.inner.processor
    }

    pub fn plc(&self) -> Option<&PlcPanel> {
        self.inner.panel.as_ref()
    }

    // ── Lifecycle ────────────────────────────────────────────────

    /// Start every configured listener, the supervisor (if enabled) and
    /// the PLC inventory sync (if configured). Returns the number of
    /// listeners started.
    pub async fn start(&self) -> usize {
        let started = self.inner.registry.start_all().await;

        if self.inner.supervise {
            self.inner.registry.spawn_supervisor().await;
        } else {
            debug!("listener supervision disabled");
        }

        if let (Some(panel), Some(every)) = (&self.inner.panel, self.inner.plc_sync_interval) {
            let mut slot = self.inner.sync_task.lock().await;
            if slot.is_none() {
                let cancel = CancellationToken::new();
                let task = tokio::spawn(plc_sync_task(
                    panel.clone(),
                    Arc::clone(self.inner.processor.store()),
                    every,
                    cancel.clone(),
                ));
                *slot = Some((cancel, task));
            }
        }

        started
    }

    /// Stop every listener. The supervisor keeps running.
    pub async fn stop_all(&self) {
        self.inner.registry.stop_all().await;
    }

    /// Stop everything and hang up on the PLC. Safe to call repeatedly.
    pub async fn shutdown(&self) {
        let sync = self.inner.sync_task.lock().await.take();
        if let Some((cancel, task)) = sync {
            cancel.cancel();
            let _ = task.await;
        }

        self.inner.registry.shutdown().await;

        if let Some(panel) = &self.inner.panel {
            panel.client().release().await;
        }
        info!("ingestion service stopped");
    }

    // ── Scans ────────────────────────────────────────────────────

    /// Process a batch reported by hardware (or the HTTP push endpoint).
    pub async fn submit_scan(&self, reader_id: &str, tags: &[String]) -> Result<ScanResult, CoreError> {
        self.inner.processor.process(reader_id, tags).await
    }

    /// Identical contract to [`submit_scan`](Self::submit_scan), logged as simulated.
    pub async fn simulate_scan(&self, reader_id: &str, tags: &[String]) -> Result<ScanResult, CoreError> {
        self.inner.processor.simulate(reader_id, tags).await
    }

    // ── Health ───────────────────────────────────────────────────

    pub async fn listener_status(&self, reader_id: &str) -> Result<ListenerStatus, CoreError> {
        self.inner
            .registry
            .status(reader_id)
            .await
            .ok_or_else(|| CoreError::UnknownReader {
                reader_id: reader_id.to_owned(),
            })
    }

    pub async fn listener_statuses(&self) -> Vec<ListenerStatus> {
        self.inner.registry.statuses().await
    }
}

/// Periodically push inventory totals to the PLC panel.
async fn plc_sync_task(
    panel: PlcPanel,
    store: Arc<dyn InventoryStore>,
    every: Duration,
    cancel: CancellationToken,
) {
    let mut interval = tokio::time::interval(every);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            biased;
            () = cancel.cancelled() => break,
            _ = interval.tick() => {
                if let Err(e) = panel.sync_inventory(store.as_ref()).await {
                    warn!(error = %e, "PLC inventory sync failed");
                }
            }
        }
    }
}
