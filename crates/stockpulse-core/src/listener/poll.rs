// Poll listener: Polling → (Polling | Backoff) → … → Stopped.

use std::collections::HashSet;
use std::time::Duration;

use chrono::Utc;
use tracing::{debug, error, info, warn};

use stockpulse_api::{PollClient, ScanRecord, TransportConfig};

use super::ListenerContext;
use crate::config::PollConfig;
use crate::model::ListenerPhase;

/// Highest scan identifier seen so far. Never moves backwards.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ScanCursor {
    last: Option<u64>,
}

impl ScanCursor {
    /// The value sent as `since_id`.
    pub fn since(&self) -> Option<u64> {
        self.last
    }

    /// Whether a scan with this identifier is new.
    pub fn admits(&self, id: u64) -> bool {
        self.last.is_none_or(|last| id > last)
    }

    pub fn advance(&mut self, id: u64) {
        if self.admits(id) {
            self.last = Some(id);
        }
    }

    /// Filter one poll response down to the tag batches to dispatch, and
    /// move the cursor to the highest identifier in it.
    ///
    /// Scans at or below the cursor, and repeats within the response, are
    /// dropped. Scans without an identifier are always passed through.
    pub fn accept(&mut self, scans: Vec<ScanRecord>) -> Vec<Vec<String>> {
        let floor = *self;
        let mut seen = HashSet::new();
        let mut batches = Vec::new();

        for scan in scans {
            if let Some(id) = scan.scan_id {
                if !floor.admits(id) || !seen.insert(id) {
                    continue;
                }
                self.advance(id);
            }
            if !scan.rfid_tags.is_empty() {
                batches.push(scan.rfid_tags);
            }
        }
        batches
    }
}

/// Delay after a failed poll: twice the interval, capped.
fn error_backoff(interval: Duration, cap: Duration) -> Duration {
    interval.saturating_mul(2).min(cap)
}

pub(super) async fn run(mut ctx: ListenerContext, poll: PollConfig) {
    let interval = ctx.reader.poll_interval.unwrap_or(poll.default_interval);
    let backoff = error_backoff(interval, poll.backoff_cap);

    ctx.start();
    let transport =
        TransportConfig::with_timeout(poll.request_timeout).bearer(ctx.reader.api_key.clone());
    let client = match PollClient::new(ctx.reader.url.clone(), &transport) {
        Ok(client) => client,
        Err(e) => {
            error!(reader_id = %ctx.reader_id(), error = %e, "cannot build poll client");
            ctx.record_error();
            ctx.finish();
            return;
        }
    };

    info!(
        reader_id = %ctx.reader_id(),
        url = %ctx.reader.url,
        interval_ms = u64::try_from(interval.as_millis()).unwrap_or(u64::MAX),
        "starting poll listener"
    );

    let mut cursor = ScanCursor::default();
    loop {
        ctx.set_phase(ListenerPhase::Polling);
        let fetched = tokio::select! {
            biased;
            () = ctx.cancel.cancelled() => break,
            r = client.fetch(cursor.since()) => r,
        };

        let delay = match fetched {
            Ok(response) => {
                let batches = cursor.accept(response.scans);
                ctx.update(|s| {
                    s.connected = true;
                    s.last_activity = Utc::now();
                    s.last_scan_id = cursor.since();
                });
                if !batches.is_empty() {
                    debug!(reader_id = %ctx.reader_id(), batches = batches.len(), "new scans");
                }
                for tags in batches {
                    ctx.dispatcher.dispatch(tags);
                }
                interval
            }
            Err(e) => {
                warn!(reader_id = %ctx.reader_id(), error = %e, "poll request failed");
                ctx.update(|s| {
                    s.connected = false;
                    s.error_count += 1;
                    s.reconnect_attempts += 1;
                    s.phase = ListenerPhase::Backoff;
                });
                backoff
            }
        };

        if !ctx.pause(delay).await {
            break;
        }
    }

    ctx.finish();
    info!(reader_id = %ctx.reader_id(), "poll listener stopped");
}
