// stockpulse-core: RFID reader ingestion, listener supervision, scan
// processing, and PLC access.

pub mod alert;
pub mod config;
pub mod error;
pub mod inventory;
pub mod listener;
pub mod model;
pub mod plc;
pub mod registry;
pub mod scan;
pub mod service;

// ── Primary re-exports ──────────────────────────────────────────────
pub use alert::{Alert, AlertKind, AlertSink, Alerter, WebhookAlertSink};
pub use config::{
    AlertConfig, ListenerKind, NodeAddresses, PlcConfig, PollConfig, ReaderConfig,
    ReconnectConfig, ServiceConfig, SupervisorConfig,
};
pub use error::{CoreError, PlcError, StoreError};
pub use inventory::{InventoryStore, MemoryInventory};
pub use listener::{ListenerHandle, ListenerSettings, spawn_listener};
pub use model::{
    InventorySummary, ListenerPhase, ListenerStatus, Product, ScanResult, ScannedItem,
    TrackingRecord, TrackingStatus,
};
pub use plc::{
    InventorySync, NodeAddress, PlcClient, PlcPanel, PlcSession, PlcTransport, PlcValue,
    SimulatedPlc, TrafficLight,
};
pub use registry::{ListenerRegistry, SupervisionAction};
pub use scan::ScanProcessor;
pub use service::IngestService;
