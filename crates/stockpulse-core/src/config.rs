// ── Runtime configuration ──
//
// These types describe *which* readers to listen to and *how* to supervise
// them. They carry credential data and tuning values, but never touch disk.
// `stockpulse-config` builds a `ServiceConfig` and hands it in.

use std::time::Duration;

use secrecy::SecretString;
use serde::Serialize;
use strum::Display;
use url::Url;

/// Which listener implementation a reader gets.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Display)]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum ListenerKind {
    /// Persistent WebSocket stream (`ws://`, `wss://`).
    Push,
    /// Periodic HTTP GET (anything else).
    Poll,
}

/// One configured RFID reader. Immutable once loaded.
#[derive(Debug, Clone)]
pub struct ReaderConfig {
    /// Unique reader identifier.
    pub id: String,
    pub url: Url,
    /// Bearer credential sent to the reader.
    pub api_key: Option<SecretString>,
    /// Poll cadence; ignored for streaming readers.
    pub poll_interval: Option<Duration>,
    /// Human-readable location label, e.g. "Dock 1".
    pub location: Option<String>,
}

impl ReaderConfig {
    pub fn new(id: impl Into<String>, url: Url) -> Self {
        Self {
            id: id.into(),
            url,
            api_key: None,
            poll_interval: None,
            location: None,
        }
    }

    /// Streaming schemes get a push listener; everything else is polled.
    pub fn kind(&self) -> ListenerKind {
        match self.url.scheme() {
            "ws" | "wss" => ListenerKind::Push,
            _ => ListenerKind::Poll,
        }
    }
}

/// Reconnect backoff for push listeners: `d(n+1) = min(d(n) * multiplier, ceiling)`.
#[derive(Debug, Clone, PartialEq)]
pub struct ReconnectConfig {
    pub floor: Duration,
    pub ceiling: Duration,
    pub multiplier: f64,
    /// Upper bound on one WebSocket handshake.
    pub connect_timeout: Duration,
}

impl Default for ReconnectConfig {
    fn default() -> Self {
        Self {
            floor: Duration::from_secs(1),
            ceiling: Duration::from_secs(60),
            multiplier: 1.5,
            connect_timeout: Duration::from_secs(10),
        }
    }
}

/// Poll listener tuning.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollConfig {
    /// Used when a reader doesn't specify its own interval.
    pub default_interval: Duration,
    /// Error backoff is `min(interval * 2, backoff_cap)`.
    pub backoff_cap: Duration,
    pub request_timeout: Duration,
}

impl Default for PollConfig {
    fn default() -> Self {
        Self {
            default_interval: Duration::from_secs(2),
            backoff_cap: Duration::from_secs(10),
            request_timeout: Duration::from_secs(5),
        }
    }
}

/// Health-check policy for the listener supervisor.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SupervisorConfig {
    /// Run the supervision loop at all (production only).
    pub enabled: bool,
    /// Wait before the first pass so initial connections can settle.
    pub grace_period: Duration,
    pub cadence: Duration,
    /// Restart once a listener's error counter exceeds this.
    pub error_threshold: u64,
    /// Alert once a listener has been quiet for longer than this.
    pub inactivity_threshold: Duration,
    /// Pause between stopping an erroring listener and restarting it.
    pub restart_pause: Duration,
    /// Back-off after an unexpected failure inside a supervision pass.
    pub failure_backoff: Duration,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            grace_period: Duration::from_secs(10),
            cadence: Duration::from_secs(30),
            error_threshold: 50,
            inactivity_threshold: Duration::from_secs(1800),
            restart_pause: Duration::from_secs(1),
            failure_backoff: Duration::from_secs(60),
        }
    }
}

/// Where alerts go besides the log.
#[derive(Debug, Clone)]
pub struct AlertConfig {
    pub webhook_url: Option<Url>,
    pub timeout: Duration,
    /// `source` field of every alert payload.
    pub source: String,
}

impl Default for AlertConfig {
    fn default() -> Self {
        Self {
            webhook_url: None,
            timeout: Duration::from_secs(5),
            source: "rfid_system".into(),
        }
    }
}

/// Node addresses for the values the warehouse exchanges with the PLC.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeAddresses {
    pub item_count: String,
    pub traffic_light: String,
    pub hmi_status: String,
    pub hmi_command: String,
    pub category_data: String,
}

impl Default for NodeAddresses {
    fn default() -> Self {
        Self {
            item_count: "ns=2;s=ItemCount".into(),
            traffic_light: "ns=2;s=TrafficLightStatus".into(),
            hmi_status: "ns=2;s=HMIStatus".into(),
            hmi_command: "ns=2;s=HMICommand".into(),
            category_data: "ns=2;s=CategoryData".into(),
        }
    }
}

/// Connection settings for the PLC endpoint.
#[derive(Debug, Clone)]
pub struct PlcConfig {
    /// e.g. `opc.tcp://plc:4840`, or `sim://local` for the built-in simulator.
    pub url: String,
    pub username: Option<String>,
    pub password: Option<SecretString>,
    /// Dial attempts per acquire before giving up.
    pub connect_retries: u32,
    pub retry_delay: Duration,
    pub nodes: NodeAddresses,
    /// Commands accepted by `send_hmi_command`.
    pub hmi_commands: Vec<String>,
    /// Periodic inventory sync to the PLC. `None` disables it.
    pub sync_interval: Option<Duration>,
}

impl Default for PlcConfig {
    fn default() -> Self {
        Self {
            url: "opc.tcp://localhost:4840".into(),
            username: None,
            password: None,
            connect_retries: 3,
            retry_delay: Duration::from_secs(2),
            nodes: NodeAddresses::default(),
            hmi_commands: default_hmi_commands(),
            sync_interval: None,
        }
    }
}

pub fn default_hmi_commands() -> Vec<String> {
    [
        "START",
        "STOP",
        "RESET",
        "EMERGENCY_STOP",
        "LOAD",
        "UNLOAD",
        "MAINTENANCE_MODE",
    ]
    .into_iter()
    .map(String::from)
    .collect()
}

/// Everything the ingestion service needs.
#[derive(Debug, Clone, Default)]
pub struct ServiceConfig {
    pub readers: Vec<ReaderConfig>,
    pub reconnect: ReconnectConfig,
    pub poll: PollConfig,
    pub supervisor: SupervisorConfig,
    pub alerts: AlertConfig,
    pub plc: Option<PlcConfig>,
}

impl ServiceConfig {
    pub fn reader(&self, id: &str) -> Option<&ReaderConfig> {
        self.readers.iter().find(|r| r.id == id)
    }
}
