// ── Scan processing ──
//
// Turns a batch of raw tag strings into tracking rows. Safe to call from
// any number of listeners at once: every call builds its own batch and
// commits it in a single append.

use std::sync::Arc;

use chrono::Utc;
use tracing::{debug, info};

use crate::error::CoreError;
use crate::inventory::InventoryStore;
use crate::model::{ScanResult, ScannedItem, TrackingRecord, TrackingStatus};

/// Resolves scanned tags against the inventory store.
#[derive(Clone)]
pub struct ScanProcessor {
    store: Arc<dyn InventoryStore>,
}

impl std::fmt::Debug for ScanProcessor {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ScanProcessor").finish_non_exhaustive()
    }
}

impl ScanProcessor {
    pub fn new(store: Arc<dyn InventoryStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn InventoryStore> {
        &self.store
    }

    /// Process one scan batch from `reader_id`.
    ///
    /// Unknown tags are reported in the result, not treated as errors. The
    /// matched tags' tracking rows are appended as one batch; if the store
    /// rejects it the whole call fails and nothing is recorded.
    pub async fn process(&self, reader_id: &str, tags: &[String]) -> Result<ScanResult, CoreError> {
        let mut result = ScanResult::default();
        let mut pending = Vec::new();
        let now = Utc::now();

        for tag in tags {
            let Some(product) = self.store.find_product_by_tag(tag).await? else {
                result.unknown_tags.push(tag.clone());
                continue;
            };

            pending.push(TrackingRecord {
                rfid_tag: tag.clone(),
                product_id: product.id,
                status: TrackingStatus::Scanned,
                reader_id: reader_id.to_owned(),
                recorded_at: now,
            });
            result.items.push(ScannedItem::from(&product));
            result.processed += 1;
        }

        if !pending.is_empty() {
            self.store.append_tracking_records(pending).await?;
        }

        info!(
            reader_id,
            tags = tags.len(),
            identified = result.processed,
            unknown = result.unknown_tags.len(),
            "processed RFID scan"
        );
        Ok(result)
    }

    /// Same contract as [`process`](Self::process), flagged as simulated in the log.
    pub async fn simulate(&self, reader_id: &str, tags: &[String]) -> Result<ScanResult, CoreError> {
        debug!(reader_id, tags = tags.len(), "simulating RFID scan");
        self.process(reader_id, tags).await
    }
}
