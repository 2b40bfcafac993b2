// ── Reader listeners ──
//
// One long-lived task per reader. Push readers hold a WebSocket open;
// poll readers hit an HTTP endpoint on an interval. Either way the task
// is the only writer of its `ListenerStatus`, published through a watch
// channel, and scan batches are handed to short-lived tasks so a slow
// store never stalls the read loop.

pub mod backoff;
mod poll;
mod push;

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::{mpsc, watch};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{error, warn};

pub use backoff::ReconnectBackoff;
pub use poll::ScanCursor;

use crate::config::{ListenerKind, PollConfig, ReaderConfig, ReconnectConfig, ServiceConfig};
use crate::error::CoreError;
use crate::model::{ListenerPhase, ListenerStatus};
use crate::scan::ScanProcessor;

/// Tuning shared by every listener the registry starts.
#[derive(Debug, Clone, Default)]
pub struct ListenerSettings {
    pub reconnect: ReconnectConfig,
    pub poll: PollConfig,
}

impl From<&ServiceConfig> for ListenerSettings {
    fn from(config: &ServiceConfig) -> Self {
        Self {
            reconnect: config.reconnect.clone(),
            poll: config.poll.clone(),
        }
    }
}

// ── Handle ───────────────────────────────────────────────────────────

/// Owner's side of a running listener.
#[derive(Debug)]
pub struct ListenerHandle {
    reader_id: String,
    kind: ListenerKind,
    status: watch::Receiver<ListenerStatus>,
    cancel: CancellationToken,
    task: JoinHandle<()>,
}

impl ListenerHandle {
    pub(crate) fn from_parts(
        reader_id: String,
        kind: ListenerKind,
        status: watch::Receiver<ListenerStatus>,
        cancel: CancellationToken,
        task: JoinHandle<()>,
    ) -> Self {
        Self {
            reader_id,
            kind,
            status,
            cancel,
            task,
        }
    }

    pub fn reader_id(&self) -> &str {
        &self.reader_id
    }

    pub fn kind(&self) -> ListenerKind {
        self.kind
    }

    /// Point-in-time copy of the listener's status.
    pub fn status(&self) -> ListenerStatus {
        self.status.borrow().clone()
    }

    /// Whether the underlying task is still running.
    pub fn is_alive(&self) -> bool {
        !self.task.is_finished()
    }

    /// Ask the listener to stop. Returns immediately; see [`join`](Self::join).
    pub fn stop(&self) {
        self.cancel.cancel();
    }

    /// Wait for the task to finish.
    pub async fn join(self) {
        if let Err(e) = self.task.await {
            if e.is_panic() {
                error!(reader_id = %self.reader_id, "listener task panicked");
            }
        }
    }
}

/// Start the right listener for `reader` on the current runtime.
pub fn spawn_listener(
    reader: ReaderConfig,
    settings: &ListenerSettings,
    processor: ScanProcessor,
) -> ListenerHandle {
    let kind = reader.kind();
    let mut initial = ListenerStatus::new(&reader.id, kind, reader.url.as_str());
    if kind == ListenerKind::Poll {
        initial.poll_interval = Some(
            reader
                .poll_interval
                .unwrap_or(settings.poll.default_interval),
        );
    }

    let (status_tx, status_rx) = watch::channel(initial);
    let cancel = CancellationToken::new();
    let reader_id = reader.id.clone();
    let ctx = ListenerContext::new(reader, status_tx, processor, cancel.clone());

    let task = match kind {
        ListenerKind::Push => tokio::spawn(push::run(ctx, settings.reconnect.clone())),
        ListenerKind::Poll => tokio::spawn(poll::run(ctx, settings.poll.clone())),
    };

    ListenerHandle::from_parts(reader_id, kind, status_rx, cancel, task)
}

// ── Dispatch ─────────────────────────────────────────────────────────

/// Hands scan batches to the processor on their own tasks.
///
/// Failures come back over a channel so the listener, not the batch
/// task, bumps its own error counter.
#[derive(Debug, Clone)]
struct ScanDispatcher {
    reader_id: Arc<str>,
    processor: ScanProcessor,
    failures: mpsc::UnboundedSender<CoreError>,
}

impl ScanDispatcher {
    fn new(reader_id: &str, processor: ScanProcessor) -> (Self, mpsc::UnboundedReceiver<CoreError>) {
        let (failures, rx) = mpsc::unbounded_channel();
        let dispatcher = Self {
            reader_id: Arc::from(reader_id),
            processor,
            failures,
        };
        (dispatcher, rx)
    }

    fn dispatch(&self, tags: Vec<String>) {
        let this = self.clone();
        tokio::spawn(async move {
            if let Err(e) = this.processor.process(&this.reader_id, &tags).await {
                error!(reader_id = %this.reader_id, error = %e, "scan batch failed");
                let _ = this.failures.send(e);
            }
        });
    }
}

// ── Shared listener state ────────────────────────────────────────────

/// Everything a listener task owns.
struct ListenerContext {
    reader: ReaderConfig,
    status: watch::Sender<ListenerStatus>,
    dispatcher: ScanDispatcher,
    failures: mpsc::UnboundedReceiver<CoreError>,
    cancel: CancellationToken,
}

impl ListenerContext {
    fn new(
        reader: ReaderConfig,
        status: watch::Sender<ListenerStatus>,
        processor: ScanProcessor,
        cancel: CancellationToken,
    ) -> Self {
        let (dispatcher, failures) = ScanDispatcher::new(&reader.id, processor);
        Self {
            reader,
            status,
            dispatcher,
            failures,
            cancel,
        }
    }

    fn reader_id(&self) -> &str {
        &self.reader.id
    }

    fn update(&self, f: impl FnOnce(&mut ListenerStatus)) {
        self.status.send_modify(f);
    }

    fn set_phase(&self, phase: ListenerPhase) {
        self.update(|s| s.phase = phase);
    }

    fn touch(&self) {
        self.update(|s| s.last_activity = Utc::now());
    }

    fn record_error(&self) {
        self.update(|s| s.error_count += 1);
    }

    fn record_dispatch_failure(&self) {
        warn!(reader_id = %self.reader.id, "scan dispatch failed");
        self.record_error();
    }

    /// Sleep for `delay`, counting dispatch failures as they arrive.
    /// Returns `false` if the listener was stopped meanwhile.
    async fn pause(&mut self, delay: Duration) -> bool {
        // `sleep` clamps deadlines past the end of time; `Instant + delay` would panic.
        let timer = tokio::time::sleep(delay);
        tokio::pin!(timer);
        loop {
            tokio::select! {
                biased;
                () = self.cancel.cancelled() => return false,
                Some(_) = self.failures.recv() => self.record_dispatch_failure(),
                () = &mut timer => return true,
            }
        }
    }

    fn start(&self) {
        self.update(|s| {
            s.running = true;
            s.phase = ListenerPhase::Idle;
        });
    }

    fn finish(&mut self) {
        while self.failures.try_recv().is_ok() {
            self.record_error();
        }
        self.update(|s| {
            s.running = false;
            s.connected = false;
            s.phase = ListenerPhase::Stopped;
        });
    }
}
