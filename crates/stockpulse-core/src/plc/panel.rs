// ── Warehouse panel ──
//
// Typed helpers over `PlcClient` for the values the warehouse exchanges
// with the PLC: item counter, traffic light, HMI status and commands, and
// the category summary string.

use serde::Serialize;
use strum::{Display, EnumString};
use tracing::info;

use super::PlcClient;
use super::transport::PlcValue;
use crate::config::{NodeAddresses, PlcConfig};
use crate::error::{CoreError, PlcError};
use crate::inventory::InventoryStore;

/// Categories written to the category data node.
const TOP_CATEGORIES: usize = 3;

/// Traffic light states, written as upper-case strings.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Display, EnumString)]
#[serde(rename_all = "UPPERCASE")]
#[strum(serialize_all = "UPPERCASE")]
pub enum TrafficLight {
    Red,
    Yellow,
    Green,
    Off,
}

/// What `sync_inventory` wrote.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct InventorySync {
    pub total_quantity: i64,
    /// `"<category>:<count>,..."`, largest categories first.
    pub category_data: String,
}

#[derive(Debug, Clone)]
pub struct PlcPanel {
    client: PlcClient,
    nodes: NodeAddresses,
    hmi_commands: Vec<String>,
}

impl PlcPanel {
    pub fn new(client: PlcClient, nodes: NodeAddresses, hmi_commands: Vec<String>) -> Self {
        Self {
            client,
            nodes,
            hmi_commands,
        }
    }

    pub fn from_config(client: PlcClient, config: &PlcConfig) -> Self {
        Self::new(client, config.nodes.clone(), config.hmi_commands.clone())
    }

    pub fn client(&self) -> &PlcClient {
        &self.client
    }

    pub fn nodes(&self) -> &NodeAddresses {
        &self.nodes
    }

    pub async fn is_connected(&self) -> bool {
        self.client.is_connected().await
    }

    pub async fn probe(&self) -> bool {
        self.client.probe().await
    }

    // ── Item counter ─────────────────────────────────────────────

    pub async fn item_count(&self) -> Result<i64, PlcError> {
        let value = self.client.read_node(&self.nodes.item_count).await?;
        value.as_int().ok_or_else(|| unexpected("item_count", &value, "int"))
    }

    pub async fn set_item_count(&self, count: i64) -> Result<(), PlcError> {
        self.client
            .write_node(&self.nodes.item_count, PlcValue::Int(count))
            .await
    }

    // ── Traffic light ────────────────────────────────────────────

    pub async fn traffic_light(&self) -> Result<TrafficLight, PlcError> {
        let value = self.client.read_node(&self.nodes.traffic_light).await?;
        value
            .as_text()
            .and_then(|s| s.parse().ok())
            .ok_or_else(|| unexpected("traffic_light", &value, "RED, YELLOW, GREEN or OFF"))
    }

    /// Set the light from its string form. Anything other than the four
    /// upper-case states is rejected before I/O.
    pub async fn set_traffic_light(&self, status: &str) -> Result<TrafficLight, PlcError> {
        let light: TrafficLight = status.parse().map_err(|_| PlcError::InvalidValue {
            field: "traffic_light".into(),
            reason: format!("{status:?} is not one of RED, YELLOW, GREEN, OFF"),
        })?;
        self.client
            .write_node(&self.nodes.traffic_light, PlcValue::Text(light.to_string()))
            .await?;
        Ok(light)
    }

    // ── HMI ──────────────────────────────────────────────────────

    pub async fn hmi_status(&self) -> Result<String, PlcError> {
        let value = self.client.read_node(&self.nodes.hmi_status).await?;
        match value {
            PlcValue::Text(s) => Ok(s),
            other => Err(unexpected("hmi_status", &other, "text")),
        }
    }

    /// Send a command from the configured list; others are rejected before I/O.
    pub async fn send_hmi_command(&self, command: &str) -> Result<(), PlcError> {
        if !self.hmi_commands.iter().any(|c| c == command) {
            return Err(PlcError::InvalidValue {
                field: "hmi_command".into(),
                reason: format!("{command:?} is not one of {}", self.hmi_commands.join(", ")),
            });
        }
        self.client
            .write_node(&self.nodes.hmi_command, PlcValue::from(command))
            .await
    }

    // ── Inventory sync ───────────────────────────────────────────

    /// Push the store's totals to the panel.
    pub async fn sync_inventory(&self, store: &dyn InventoryStore) -> Result<InventorySync, CoreError> {
        let summary = store.inventory_summary().await?;
        let category_data = summary
            .categories
            .iter()
            .take(TOP_CATEGORIES)
            .map(|(cat, count)| format!("{cat}:{count}"))
            .collect::<Vec<_>>()
            .join(",");

        self.set_item_count(summary.total_quantity).await?;
        self.client
            .write_node(&self.nodes.category_data, PlcValue::Text(category_data.clone()))
            .await?;

        info!(
            items = summary.total_quantity,
            categories = %category_data,
            "inventory synced to PLC"
        );
        Ok(InventorySync {
            total_quantity: summary.total_quantity,
            category_data,
        })
    }
}

fn unexpected(field: &str, value: &PlcValue, expected: &str) -> PlcError {
    PlcError::InvalidValue {
        field: field.to_owned(),
        reason: format!("expected {expected}, PLC returned {} {value}", value.type_name()),
    }
}
