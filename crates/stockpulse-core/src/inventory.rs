// ── Inventory store seam ──
//
// The transactional store of products and tracking rows is an external
// collaborator. The core only needs tag lookup, atomic batch append, and
// an aggregate for the PLC display.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, PoisonError};

use async_trait::async_trait;
use dashmap::DashMap;

use crate::error::StoreError;
use crate::model::{CategoryId, InventorySummary, Product, TrackingRecord};

/// Contract the inventory store must satisfy toward the core.
#[async_trait]
pub trait InventoryStore: Send + Sync {
    /// The product carrying `tag`, if any.
    async fn find_product_by_tag(&self, tag: &str) -> Result<Option<Product>, StoreError>;

    /// Append every record or none of them.
    async fn append_tracking_records(&self, batch: Vec<TrackingRecord>) -> Result<(), StoreError>;

    /// Total quantity on hand and product counts per category.
    async fn inventory_summary(&self) -> Result<InventorySummary, StoreError>;
}

/// In-process store, seeded from a product catalog.
///
/// Tag lookups go through a `DashMap`; the tracking log sits behind a
/// single mutex so a batch lands in one critical section.
#[derive(Debug, Default)]
pub struct MemoryInventory {
    by_tag: DashMap<String, Arc<Product>>,
    products: DashMap<i64, Arc<Product>>,
    tracking: Mutex<Vec<TrackingRecord>>,
}

impl MemoryInventory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_products(products: impl IntoIterator<Item = Product>) -> Self {
        let store = Self::new();
        for product in products {
            store.upsert_product(product);
        }
        store
    }

    /// Insert or replace a product, re-indexing its tag.
    pub fn upsert_product(&self, product: Product) {
        let product = Arc::new(product);
        if let Some(old) = self.products.insert(product.id, Arc::clone(&product)) {
            if let Some(tag) = &old.rfid_tag {
                self.by_tag.remove(tag);
            }
        }
        if let Some(tag) = &product.rfid_tag {
            self.by_tag.insert(tag.clone(), Arc::clone(&product));
        }
    }

    pub fn product_count(&self) -> usize {
        self.products.len()
    }

    /// Copy of the tracking log.
    pub fn tracking_records(&self) -> Vec<TrackingRecord> {
        self.tracking
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[async_trait]
impl InventoryStore for MemoryInventory {
    async fn find_product_by_tag(&self, tag: &str) -> Result<Option<Product>, StoreError> {
        Ok(self.by_tag.get(tag).map(|p| Product::clone(&p)))
    }

    async fn append_tracking_records(&self, batch: Vec<TrackingRecord>) -> Result<(), StoreError> {
        if let Some(bad) = batch.iter().find(|r| !self.products.contains_key(&r.product_id)) {
            return Err(StoreError::Rejected(format!(
                "unknown product {} for tag {}",
                bad.product_id, bad.rfid_tag
            )));
        }
        self.tracking
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .extend(batch);
        Ok(())
    }

    async fn inventory_summary(&self) -> Result<InventorySummary, StoreError> {
        let mut total_quantity = 0;
        let mut per_category: HashMap<CategoryId, u64> = HashMap::new();
        for entry in &self.products {
            total_quantity += entry.quantity;
            if let Some(cat) = entry.category_id {
                *per_category.entry(cat).or_default() += 1;
            }
        }

        let mut categories: Vec<_> = per_category.into_iter().collect();
        // Largest first; ties broken by id so the PLC string is stable.
        categories.sort_by(|a, b| b.1.cmp(&a.1).then(a.0.cmp(&b.0)));

        Ok(InventorySummary {
            total_quantity,
            categories,
        })
    }
}
