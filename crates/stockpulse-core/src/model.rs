// ── Domain model ──
//
// Inventory records the core reads or appends, the scan processor's
// result, and the listener health snapshot exposed to supervisors and
// the API layer.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

use crate::config::ListenerKind;

pub type ProductId = i64;
pub type CategoryId = i64;

/// A product as the inventory store knows it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Product {
    pub id: ProductId,
    pub name: String,
    #[serde(default)]
    pub category_id: Option<CategoryId>,
    #[serde(default)]
    pub quantity: i64,
    /// The tag encoded on this product's label, if one was assigned.
    #[serde(default)]
    pub rfid_tag: Option<String>,
}

/// What a tracking row records about a tag sighting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Display, EnumString)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum TrackingStatus {
    Scanned,
    Added,
    Removed,
}

/// One row appended to the RFID tracking log.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct TrackingRecord {
    pub rfid_tag: String,
    pub product_id: ProductId,
    pub status: TrackingStatus,
    pub reader_id: String,
    pub recorded_at: DateTime<Utc>,
}

/// A matched product in a [`ScanResult`].
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ScannedItem {
    pub product_id: ProductId,
    pub name: String,
    pub category_id: Option<CategoryId>,
}

impl From<&Product> for ScannedItem {
    fn from(p: &Product) -> Self {
        Self {
            product_id: p.id,
            name: p.name.clone(),
            category_id: p.category_id,
        }
    }
}

/// Outcome of processing one scan batch.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ScanResult {
    /// Tags matched to a product.
    pub processed: usize,
    /// Tags with no owning product, in scan order.
    pub unknown_tags: Vec<String>,
    /// Matched products, in scan order.
    pub items: Vec<ScannedItem>,
}

/// Aggregate figures pushed to the PLC display.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct InventorySummary {
    pub total_quantity: i64,
    /// `(category, product count)`, largest first.
    pub categories: Vec<(CategoryId, u64)>,
}

// ── Listener health ──────────────────────────────────────────────────

/// Where a listener is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ListenerPhase {
    Idle,
    Connecting,
    Open,
    Closing,
    Faulted,
    Reconnecting,
    Polling,
    Backoff,
    Stopped,
}

/// Point-in-time copy of a listener's state.
///
/// Written only by the owning listener task; everyone else gets clones.
/// Serializes with a derived `inactivity_seconds` field.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(into = "StatusReport")]
pub struct ListenerStatus {
    pub reader_id: String,
    pub kind: ListenerKind,
    pub connection_url: String,
    pub phase: ListenerPhase,
    pub connected: bool,
    pub running: bool,
    pub reconnect_attempts: u64,
    pub error_count: u64,
    pub last_activity: DateTime<Utc>,
    /// Poll listeners only: highest scan identifier seen.
    pub last_scan_id: Option<u64>,
    /// Poll listeners only.
    pub poll_interval: Option<Duration>,
}

impl ListenerStatus {
    pub fn new(reader_id: &str, kind: ListenerKind, url: &str) -> Self {
        Self {
            reader_id: reader_id.to_owned(),
            kind,
            connection_url: url.to_owned(),
            phase: ListenerPhase::Idle,
            connected: false,
            running: false,
            reconnect_attempts: 0,
            error_count: 0,
            last_activity: Utc::now(),
            last_scan_id: None,
            poll_interval: None,
        }
    }

    /// Seconds since the last frame or successful poll, relative to `now`.
    pub fn inactivity_at(&self, now: DateTime<Utc>) -> Duration {
        (now - self.last_activity).to_std().unwrap_or_default()
    }

    pub fn inactivity(&self) -> Duration {
        self.inactivity_at(Utc::now())
    }
}

/// Wire shape of [`ListenerStatus`].
#[derive(Serialize)]
struct StatusReport {
    reader_id: String,
    kind: ListenerKind,
    connection_url: String,
    phase: ListenerPhase,
    connected: bool,
    running: bool,
    reconnect_attempts: u64,
    error_count: u64,
    last_activity: DateTime<Utc>,
    inactivity_seconds: u64,
    last_scan_id: Option<u64>,
    poll_interval: Option<f64>,
}

impl From<ListenerStatus> for StatusReport {
    fn from(s: ListenerStatus) -> Self {
        let inactivity_seconds = s.inactivity().as_secs();
        Self {
            reader_id: s.reader_id,
            kind: s.kind,
            connection_url: s.connection_url,
            phase: s.phase,
            connected: s.connected,
            running: s.running,
            reconnect_attempts: s.reconnect_attempts,
            error_count: s.error_count,
            last_activity: s.last_activity,
            inactivity_seconds,
            last_scan_id: s.last_scan_id,
            poll_interval: s.poll_interval.map(|d| d.as_secs_f64()),
        }
    }
}
