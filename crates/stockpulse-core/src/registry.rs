// ── Listener registry & supervisor ──
//
// Owns the active listener set. Every mutation of the set happens under
// one async mutex, and a dead listener is removed before its replacement
// is spawned, so a reader never has two live listeners. The mutex is never
// held across a listener shutdown or the restart pause.

use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use serde::Serialize;
use tokio::sync::Mutex;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::alert::{AlertKind, Alerter};
use crate::config::{ReaderConfig, ServiceConfig, SupervisorConfig};
use crate::listener::{ListenerHandle, ListenerSettings, spawn_listener};
use crate::model::{ListenerPhase, ListenerStatus};
use crate::scan::ScanProcessor;

/// Something a supervision pass did about one listener.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SupervisionAction {
    pub reader_id: String,
    pub kind: AlertKind,
    /// Whether the listener was replaced.
    pub restarted: bool,
    pub message: String,
}

/// Cheaply cloneable; clones share the listener set.
#[derive(Clone)]
pub struct ListenerRegistry {
    inner: Arc<RegistryInner>,
}

struct RegistryInner {
    settings: ListenerSettings,
    policy: SupervisorConfig,
    processor: ScanProcessor,
    alerter: Alerter,
    set: Mutex<ListenerSet>,
    supervisor: Mutex<Option<(CancellationToken, JoinHandle<()>)>>,
}

struct ListenerSet {
    readers: BTreeMap<String, ReaderConfig>,
    active: BTreeMap<String, ListenerHandle>,
    /// Last status of listeners stopped for a restart, until the
    /// replacement is running.
    restarting: BTreeMap<String, ListenerStatus>,
}

impl std::fmt::Debug for ListenerRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ListenerRegistry")
            .field("policy", &self.inner.policy)
            .finish_non_exhaustive()
    }
}

impl ListenerRegistry {
    pub fn new(
        readers: Vec<ReaderConfig>,
        settings: ListenerSettings,
        policy: SupervisorConfig,
        processor: ScanProcessor,
        alerter: Alerter,
    ) -> Self {
        let set = ListenerSet {
            readers: readers.into_iter().map(|r| (r.id.clone(), r)).collect(),
            active: BTreeMap::new(),
            restarting: BTreeMap::new(),
        };
        Self {
            inner: Arc::new(RegistryInner {
                settings,
                policy,
                processor,
                alerter,
                set: Mutex::new(set),
                supervisor: Mutex::new(None),
            }),
        }
    }

    pub fn from_config(config: &ServiceConfig, processor: ScanProcessor, alerter: Alerter) -> Self {
        Self::new(
            config.readers.clone(),
            ListenerSettings::from(config),
            config.supervisor.clone(),
            processor,
            alerter,
        )
    }

    pub fn policy(&self) -> &SupervisorConfig {
        &self.inner.policy
    }

    // ── Starting listeners ───────────────────────────────────────

    /// Start a listener for every configured reader that lacks a live one.
    /// Returns how many were started.
    pub async fn start_all(&self) -> usize {
        let mut set = self.inner.set.lock().await;
        let readers: Vec<ReaderConfig> = set.readers.values().cloned().collect();
        let total = readers.len();
        let mut started = 0;
        for reader in &readers {
            if self.start_locked(&mut set, reader) {
                started += 1;
            }
        }
        info!(started, total, "RFID listeners started");
        started
    }

    /// Register `reader` and start it unless it already has a live listener.
    pub async fn start_reader(&self, reader: ReaderConfig) -> bool {
        let mut set = self.inner.set.lock().await;
        set.readers.insert(reader.id.clone(), reader.clone());
        self.start_locked(&mut set, &reader)
    }

    fn start_locked(&self, set: &mut ListenerSet, reader: &ReaderConfig) -> bool {
        if let Some(existing) = set.active.get(&reader.id) {
            if existing.is_alive() {
                debug!(reader_id = %reader.id, "listener already running");
                return false;
            }
            set.active.remove(&reader.id);
        }

        info!(
            reader_id = %reader.id,
            kind = %reader.kind(),
            url = %reader.url,
            location = reader.location.as_deref().unwrap_or("-"),
            "starting RFID listener"
        );
        let handle = spawn_listener(
            reader.clone(),
            &self.inner.settings,
            self.inner.processor.clone(),
        );
        set.active.insert(reader.id.clone(), handle);
        set.restarting.remove(&reader.id);
        true
    }

    // ── Health ───────────────────────────────────────────────────

    /// A listener that is mid-restart reports its last status.
    pub async fn status(&self, reader_id: &str) -> Option<ListenerStatus> {
        let set = self.inner.set.lock().await;
        set.active
            .get(reader_id)
            .map(ListenerHandle::status)
            .or_else(|| set.restarting.get(reader_id).cloned())
    }

    /// Snapshots of every active or restarting listener, ordered by reader id.
    pub async fn statuses(&self) -> Vec<ListenerStatus> {
        let set = self.inner.set.lock().await;
        let mut merged: BTreeMap<&str, ListenerStatus> = set
            .restarting
            .iter()
            .map(|(id, status)| (id.as_str(), status.clone()))
            .collect();
        for (id, handle) in &set.active {
            merged.insert(id.as_str(), handle.status());
        }
        merged.into_values().collect()
    }

    pub async fn len(&self) -> usize {
        self.inner.set.lock().await.active.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }

    // ── Supervision ──────────────────────────────────────────────

    /// One health check over every active listener.
    ///
    /// Dead listeners are replaced; listeners over the error threshold are
    /// stopped and replaced after a short pause; quiet listeners only get
    /// an alert. Alerts go out after the set is unlocked.
    pub async fn supervise_once(&self) -> Vec<SupervisionAction> {
        let policy = &self.inner.policy;
        let mut actions = Vec::new();
        let mut stopping = Vec::new();
        let mut set = self.inner.set.lock().await;
        let ids: Vec<String> = set.active.keys().cloned().collect();
        let now = Utc::now();

        for id in ids {
            let Some(handle) = set.active.get(&id) else {
                continue;
            };

            if !handle.is_alive() {
                warn!(reader_id = %id, "listener task died, restarting");
                if let Some(dead) = set.active.remove(&id) {
                    dead.join().await;
                }
                if self.restart_locked(&mut set, &id) {
                    actions.push(SupervisionAction {
                        message: format!("RFID reader {id} connection lost and restarted"),
                        reader_id: id,
                        kind: AlertKind::ConnectionLost,
                        restarted: true,
                    });
                }
                continue;
            }

            let status = handle.status();
            if status.error_count > policy.error_threshold {
                warn!(reader_id = %id, errors = status.error_count, "too many errors, restarting listener");
                if let Some(old) = set.active.remove(&id) {
                    old.stop();
                    stopping.push(old);
                }
                set.restarting.insert(
                    id,
                    ListenerStatus {
                        running: false,
                        connected: false,
                        phase: ListenerPhase::Stopped,
                        ..status
                    },
                );
            } else {
                let quiet = status.inactivity_at(now);
                if quiet > policy.inactivity_threshold {
                    warn!(reader_id = %id, inactive_secs = quiet.as_secs(), "listener inactive");
                    actions.push(SupervisionAction {
                        message: format!("RFID reader {id} inactive for {} seconds", quiet.as_secs()),
                        reader_id: id,
                        kind: AlertKind::Inactive,
                        restarted: false,
                    });
                }
            }
        }
        drop(set);

        if !stopping.is_empty() {
            let ids: Vec<String> = stopping.iter().map(|h| h.reader_id().to_owned()).collect();
            for old in stopping {
                old.join().await;
            }
            tokio::time::sleep(policy.restart_pause).await;

            let mut set = self.inner.set.lock().await;
            for id in ids {
                // Gone if the registry was stopped or the reader restarted meanwhile.
                if set.restarting.remove(&id).is_none() {
                    continue;
                }
                if self.restart_locked(&mut set, &id) {
                    actions.push(SupervisionAction {
                        message: format!("RFID reader {id} restarted due to excessive errors"),
                        reader_id: id,
                        kind: AlertKind::ExcessiveErrors,
                        restarted: true,
                    });
                }
            }
        }

        for action in &actions {
            self.inner
                .alerter
                .raise(action.kind, &action.reader_id, action.message.clone())
                .await;
        }
        actions
    }

    fn restart_locked(&self, set: &mut ListenerSet, reader_id: &str) -> bool {
        let Some(reader) = set.readers.get(reader_id).cloned() else {
            warn!(reader_id, "no configuration for reader, not restarting");
            return false;
        };
        self.start_locked(set, &reader)
    }

    /// Start the background supervision loop. No-op if already running.
    pub async fn spawn_supervisor(&self) {
        let mut slot = self.inner.supervisor.lock().await;
        if slot.as_ref().is_some_and(|(_, task)| !task.is_finished()) {
            return;
        }
        let cancel = CancellationToken::new();
        let task = tokio::spawn(supervise(self.clone(), cancel.clone()));
        *slot = Some((cancel, task));
    }

    // ── Shutdown ─────────────────────────────────────────────────

    /// Stop and forget every listener. Safe to call repeatedly.
    pub async fn stop_all(&self) {
        let drained: Vec<ListenerHandle> = {
            let mut set = self.inner.set.lock().await;
            set.restarting.clear();
            std::mem::take(&mut set.active).into_values().collect()
        };
        if drained.is_empty() {
            return;
        }

        let count = drained.len();
        for handle in &drained {
            handle.stop();
        }
        for handle in drained {
            handle.join().await;
        }
        info!(count, "RFID listeners stopped");
    }

    /// Stop the supervisor, then every listener.
    pub async fn shutdown(&self) {
        let supervisor = self.inner.supervisor.lock().await.take();
        if let Some((cancel, task)) = supervisor {
            cancel.cancel();
            if let Err(e) = task.await {
                error!(error = %e, "supervisor task failed during shutdown");
            }
        }
        self.stop_all().await;
    }

    #[cfg(test)]
    async fn insert_handle(&self, handle: ListenerHandle) {
        let mut set = self.inner.set.lock().await;
        set.active.insert(handle.reader_id().to_owned(), handle);
    }
}

/// Background health-check loop.
///
/// Each pass runs on its own task so a panic inside it surfaces here as a
/// `JoinError` and is treated like any other supervision failure.
async fn supervise(registry: ListenerRegistry, cancel: CancellationToken) {
    let policy = registry.inner.policy.clone();
    debug!(
        grace_secs = policy.grace_period.as_secs(),
        cadence_secs = policy.cadence.as_secs(),
        "listener supervisor started"
    );

    if !sleep_or_cancel(&cancel, policy.grace_period).await {
        return;
    }

    loop {
        let pass = tokio::spawn({
            let registry = registry.clone();
            async move { registry.supervise_once().await }
        });

        let delay = match pass.await {
            Ok(actions) => {
                if !actions.is_empty() {
                    info!(actions = actions.len(), "supervision pass complete");
                }
                policy.cadence
            }
            Err(e) => {
                error!(error = %e, "error in listener supervisor");
                policy.failure_backoff
            }
        };

        if !sleep_or_cancel(&cancel, delay).await {
            break;
        }
    }
    debug!("listener supervisor stopped");
}

async fn sleep_or_cancel(cancel: &CancellationToken, delay: Duration) -> bool {
    tokio::select! {
        biased;
        () = cancel.cancelled() => false,
        () = tokio::time::sleep(delay) => true,
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use std::sync::Mutex as StdMutex;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use async_trait::async_trait;
    use tokio::sync::watch;
    use url::Url;

    use super::*;
    use crate::alert::{Alert, AlertSink};
    use crate::config::ListenerKind;
    use crate::error::CoreError;
    use crate::inventory::MemoryInventory;

    /// Points nowhere; restarted listeners just back off until stopped.
    fn reader(id: &str) -> ReaderConfig {
        ReaderConfig::new(id, Url::parse("http://127.0.0.1:9/scans").unwrap())
    }

    fn registry(ids: &[&str]) -> ListenerRegistry {
        let policy = SupervisorConfig {
            restart_pause: Duration::from_millis(10),
            ..SupervisorConfig::default()
        };
        registry_with(ids, policy, None)
    }

    fn registry_with(
        ids: &[&str],
        policy: SupervisorConfig,
        sink: Option<Arc<dyn AlertSink>>,
    ) -> ListenerRegistry {
        ListenerRegistry::new(
            ids.iter().map(|id| reader(id)).collect(),
            ListenerSettings::default(),
            policy,
            ScanProcessor::new(Arc::new(MemoryInventory::new())),
            Alerter::new("rfid_system", sink),
        )
    }

    /// Grace 10s, cadence 30s, failure back-off 60s.
    fn loop_policy() -> SupervisorConfig {
        SupervisorConfig {
            grace_period: Duration::from_secs(10),
            cadence: Duration::from_secs(30),
            failure_backoff: Duration::from_secs(60),
            restart_pause: Duration::from_millis(10),
            ..SupervisorConfig::default()
        }
    }

    #[derive(Default)]
    struct Recorder(StdMutex<Vec<Alert>>);

    impl Recorder {
        fn readers(&self) -> Vec<String> {
            self.0.lock().unwrap().iter().map(|a| a.reader_id.clone()).collect()
        }
    }

    #[async_trait]
    impl AlertSink for Recorder {
        async fn deliver(&self, alert: &Alert) -> Result<(), CoreError> {
            self.0.lock().unwrap().push(alert.clone());
            Ok(())
        }
    }

    /// Blows up on its first delivery, then behaves.
    #[derive(Default)]
    struct PanicsOnce(AtomicUsize);

    #[async_trait]
    impl AlertSink for PanicsOnce {
        async fn deliver(&self, _: &Alert) -> Result<(), CoreError> {
            assert!(self.0.fetch_add(1, Ordering::SeqCst) > 0, "alert sink exploded");
            Ok(())
        }
    }

    /// A handle whose task idles until stopped, with a scripted status.
    fn fake_handle(id: &str, tweak: impl FnOnce(&mut ListenerStatus)) -> ListenerHandle {
        let mut status = ListenerStatus::new(id, ListenerKind::Poll, "http://127.0.0.1:9/scans");
        status.running = true;
        status.phase = ListenerPhase::Polling;
        tweak(&mut status);
        let (tx, rx) = watch::channel(status);
        let cancel = CancellationToken::new();
        let token = cancel.clone();
        let task = tokio::spawn(async move {
            token.cancelled().await;
            drop(tx);
        });
        ListenerHandle::from_parts(id.to_owned(), ListenerKind::Poll, rx, cancel, task)
    }

    async fn dead_handle(id: &str) -> ListenerHandle {
        let (_tx, rx) = watch::channel(ListenerStatus::new(id, ListenerKind::Poll, "http://x"));
        let task = tokio::spawn(async {});
        while !task.is_finished() {
            tokio::task::yield_now().await;
        }
        ListenerHandle::from_parts(
            id.to_owned(),
            ListenerKind::Poll,
            rx,
            CancellationToken::new(),
            task,
        )
    }

    #[tokio::test]
    async fn excessive_errors_trigger_restart() {
        let registry = registry(&["dock"]);
        registry
            .insert_handle(fake_handle("dock", |s| s.error_count = 51))
            .await;

        let actions = registry.supervise_once().await;
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].kind, AlertKind::ExcessiveErrors);
        assert!(actions[0].restarted);
        assert_eq!(
            actions[0].message,
            "RFID reader dock restarted due to excessive errors"
        );

        // The replacement starts with a fresh error counter.
        let status = registry.status("dock").await.unwrap();
        assert!(status.error_count < 51);
        assert_eq!(registry.len().await, 1);
        registry.shutdown().await;
    }

    #[tokio::test]
    async fn inactivity_alerts_without_restart() {
        let registry = registry(&["dock"]);
        registry
            .insert_handle(fake_handle("dock", |s| {
                s.error_count = 49;
                s.last_activity = Utc::now() - chrono::Duration::seconds(1801);
            }))
            .await;

        let actions = registry.supervise_once().await;
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].kind, AlertKind::Inactive);
        assert!(!actions[0].restarted);

        // Same listener still in place.
        assert_eq!(registry.status("dock").await.unwrap().error_count, 49);
        registry.shutdown().await;
    }

    #[tokio::test]
    async fn dead_listener_is_replaced_with_connection_lost_alert() {
        let registry = registry(&["dock"]);
        registry.insert_handle(dead_handle("dock").await).await;

        let actions = registry.supervise_once().await;
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].kind, AlertKind::ConnectionLost);
        assert_eq!(
            actions[0].message,
            "RFID reader dock connection lost and restarted"
        );
        assert_eq!(registry.len().await, 1);
        registry.shutdown().await;
    }

    #[tokio::test]
    async fn healthy_listener_is_left_alone() {
        let registry = registry(&["dock"]);
        registry.insert_handle(fake_handle("dock", |_| {})).await;
        assert!(registry.supervise_once().await.is_empty());
        registry.shutdown().await;
    }

    #[tokio::test]
    async fn dead_unconfigured_listener_is_dropped() {
        let registry = registry(&[]);
        registry.insert_handle(dead_handle("ghost").await).await;
        assert!(registry.supervise_once().await.is_empty());
        assert!(registry.is_empty().await);
    }

    #[tokio::test]
    async fn start_all_skips_live_listeners_and_shutdown_is_idempotent() {
        let registry = registry(&["a", "b"]);
        assert_eq!(registry.start_all().await, 2);
        assert_eq!(registry.start_all().await, 0);

        let ids: Vec<String> = registry
            .statuses()
            .await
            .into_iter()
            .map(|s| s.reader_id)
            .collect();
        assert_eq!(ids, vec!["a".to_string(), "b".to_string()]);

        registry.shutdown().await;
        assert!(registry.is_empty().await);
        registry.shutdown().await;
        registry.stop_all().await;
    }

    #[tokio::test(start_paused = true)]
    async fn supervisor_waits_for_grace_then_runs_on_cadence_until_shutdown() {
        let alerts = Arc::new(Recorder::default());
        let registry = registry_with(&["dock", "gate"], loop_policy(), Some(alerts.clone()));
        registry.insert_handle(dead_handle("dock").await).await;
        registry.spawn_supervisor().await;

        // Nothing happens inside the grace period.
        tokio::time::sleep(Duration::from_secs(9)).await;
        assert!(alerts.readers().is_empty());
        assert!(!registry.status("dock").await.unwrap().running);

        // The first pass at 10s replaces the dead listener.
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(alerts.readers(), ["dock"]);
        assert!(registry.status("dock").await.unwrap().running);

        // A listener that dies now waits for the next pass at 40s.
        registry.insert_handle(dead_handle("gate").await).await;
        tokio::time::sleep(Duration::from_secs(28)).await;
        assert_eq!(alerts.readers(), ["dock"]);
        tokio::time::sleep(Duration::from_secs(2)).await;
        assert_eq!(alerts.readers(), ["dock", "gate"]);

        registry.shutdown().await;
        assert!(registry.is_empty().await);

        // No pass runs after shutdown.
        registry.insert_handle(dead_handle("gate").await).await;
        tokio::time::sleep(Duration::from_secs(100)).await;
        assert_eq!(alerts.readers(), ["dock", "gate"]);
        assert!(!registry.status("gate").await.unwrap().running);
    }

    #[tokio::test(start_paused = true)]
    async fn failed_pass_backs_off_before_the_next_one() {
        let sink = Arc::new(PanicsOnce::default());
        let registry = registry_with(&["dock", "gate"], loop_policy(), Some(sink.clone()));
        registry.insert_handle(dead_handle("dock").await).await;
        registry.spawn_supervisor().await;

        // The pass at 10s panics while alerting.
        tokio::time::sleep(Duration::from_secs(11)).await;
        assert_eq!(sink.0.load(Ordering::SeqCst), 1);
        registry.insert_handle(dead_handle("gate").await).await;

        // No pass at the 40s cadence mark.
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(sink.0.load(Ordering::SeqCst), 1);
        assert!(!registry.status("gate").await.unwrap().running);

        // The next one comes a full back-off later, at 70s.
        tokio::time::sleep(Duration::from_secs(30)).await;
        assert_eq!(sink.0.load(Ordering::SeqCst), 2);
        assert!(registry.status("gate").await.unwrap().running);

        registry.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn status_stays_readable_during_restart_pause() {
        let policy = SupervisorConfig {
            restart_pause: Duration::from_secs(5),
            ..SupervisorConfig::default()
        };
        let registry = registry_with(&["dock"], policy, None);
        registry
            .insert_handle(fake_handle("dock", |s| s.error_count = 51))
            .await;

        let pass = tokio::spawn({
            let registry = registry.clone();
            async move { registry.supervise_once().await }
        });
        tokio::time::sleep(Duration::from_secs(1)).await;

        // Mid-pause: the old listener's last status, answered without waiting.
        let during = tokio::time::timeout(Duration::from_millis(10), registry.status("dock"))
            .await
            .unwrap()
            .unwrap();
        assert_eq!(during.error_count, 51);
        assert!(!during.running);
        assert_eq!(during.phase, ListenerPhase::Stopped);
        let all = tokio::time::timeout(Duration::from_millis(10), registry.statuses())
            .await
            .unwrap();
        assert_eq!(all.len(), 1);
        assert!(registry.is_empty().await);

        let actions = pass.await.unwrap();
        assert_eq!(actions.len(), 1);
        assert_eq!(actions[0].kind, AlertKind::ExcessiveErrors);
        // The replacement starts with a fresh error counter.
        assert_eq!(registry.len().await, 1);
        assert!(registry.status("dock").await.unwrap().error_count < 51);
        registry.shutdown().await;
    }

    #[tokio::test(start_paused = true)]
    async fn stop_during_restart_pause_cancels_the_restart() {
        let policy = SupervisorConfig {
            restart_pause: Duration::from_secs(5),
            ..SupervisorConfig::default()
        };
        let registry = registry_with(&["dock"], policy, None);
        registry
            .insert_handle(fake_handle("dock", |s| s.error_count = 51))
            .await;

        let pass = tokio::spawn({
            let registry = registry.clone();
            async move { registry.supervise_once().await }
        });
        tokio::time::sleep(Duration::from_secs(1)).await;
        registry.stop_all().await;

        assert!(pass.await.unwrap().is_empty());
        assert!(registry.is_empty().await);
        assert!(registry.status("dock").await.is_none());
    }
}
