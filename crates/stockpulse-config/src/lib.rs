//! Configuration for the stockpulse daemon.
//!
//! TOML file + `STOCKPULSE_*` environment, credential resolution (env var,
//! keyring, plaintext), product catalog loading, and translation into
//! `stockpulse_core::ServiceConfig`.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use directories::ProjectDirs;
use figment::{
    Figment,
    providers::{Env, Format, Serialized, Toml},
};
use secrecy::SecretString;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::warn;
use url::Url;

use stockpulse_core::plc::NodeAddress;
use stockpulse_core::{
    AlertConfig, NodeAddresses, PlcConfig, PollConfig, Product, ReaderConfig, ReconnectConfig,
    ServiceConfig, SupervisorConfig,
};

/// Keyring service name for stored credentials.
pub const KEYRING_SERVICE: &str = "stockpulse";

/// Reader id given to the legacy `reader_url` shortcut.
pub const LEGACY_READER_ID: &str = "default";

const REDACTED: &str = "********";

// ── Error ───────────────────────────────────────────────────────────

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid {field}: {reason}")]
    Validation { field: String, reason: String },

    #[error("no credentials for {target}: environment variable {env} is not set")]
    NoCredentials { target: String, env: String },

    #[error("failed to serialize config: {0}")]
    Serialization(#[from] toml::ser::Error),

    #[error("config loading failed: {0}")]
    Figment(Box<figment::Error>),

    #[error("cannot read catalog {path}: {reason}")]
    Catalog { path: PathBuf, reason: String },

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<figment::Error> for ConfigError {
    fn from(err: figment::Error) -> Self {
        Self::Figment(Box::new(err))
    }
}

fn invalid(field: impl Into<String>, reason: impl Into<String>) -> ConfigError {
    ConfigError::Validation {
        field: field.into(),
        reason: reason.into(),
    }
}

// ── TOML config structs ─────────────────────────────────────────────

/// Top-level TOML configuration.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    /// Named readers.
    #[serde(default)]
    pub readers: BTreeMap<String, ReaderEntry>,

    /// Single-reader shortcut, used only when `readers` is empty.
    pub reader_url: Option<String>,
    pub reader_api_key: Option<String>,

    /// Product catalog seeding the in-memory inventory. Relative paths
    /// resolve against the config file's directory.
    pub catalog: Option<PathBuf>,

    #[serde(default)]
    pub reconnect: ReconnectSection,

    #[serde(default)]
    pub poll: PollSection,

    #[serde(default)]
    pub supervisor: SupervisorSection,

    #[serde(default)]
    pub alerts: AlertsSection,

    pub plc: Option<PlcSection>,
}

/// One `[readers.<id>]` table.
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct ReaderEntry {
    /// `ws://`/`wss://` for streaming readers, `http://`/`https://` for polled ones.
    #[serde(default)]
    pub url: String,

    /// Bearer token (plaintext, prefer keyring or env var).
    pub api_key: Option<String>,

    /// Environment variable holding the bearer token.
    pub api_key_env: Option<String>,

    pub poll_interval_secs: Option<f64>,

    pub location: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct ReconnectSection {
    #[serde(default = "default_floor")]
    pub floor_secs: f64,
    #[serde(default = "default_ceiling")]
    pub ceiling_secs: f64,
    #[serde(default = "default_multiplier")]
    pub multiplier: f64,
    /// Give up on a WebSocket handshake after this long.
    #[serde(default = "default_connect_timeout")]
    pub connect_timeout_secs: f64,
}

impl Default for ReconnectSection {
    fn default() -> Self {
        Self {
            floor_secs: default_floor(),
            ceiling_secs: default_ceiling(),
            multiplier: default_multiplier(),
            connect_timeout_secs: default_connect_timeout(),
        }
    }
}

fn default_floor() -> f64 {
    1.0
}
fn default_ceiling() -> f64 {
    60.0
}
fn default_multiplier() -> f64 {
    1.5
}
fn default_connect_timeout() -> f64 {
    10.0
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PollSection {
    #[serde(default = "default_poll_interval")]
    pub default_interval_secs: f64,
    #[serde(default = "default_backoff_cap")]
    pub backoff_cap_secs: f64,
    #[serde(default = "default_request_timeout")]
    pub request_timeout_secs: f64,
}

impl Default for PollSection {
    fn default() -> Self {
        Self {
            default_interval_secs: default_poll_interval(),
            backoff_cap_secs: default_backoff_cap(),
            request_timeout_secs: default_request_timeout(),
        }
    }
}

fn default_poll_interval() -> f64 {
    2.0
}
fn default_backoff_cap() -> f64 {
    10.0
}
fn default_request_timeout() -> f64 {
    5.0
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct SupervisorSection {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_grace")]
    pub grace_period_secs: u64,
    #[serde(default = "default_cadence")]
    pub cadence_secs: u64,
    #[serde(default = "default_error_threshold")]
    pub error_threshold: u64,
    #[serde(default = "default_inactivity")]
    pub inactivity_threshold_secs: u64,
    #[serde(default = "default_restart_pause")]
    pub restart_pause_secs: f64,
    #[serde(default = "default_failure_backoff")]
    pub failure_backoff_secs: u64,
}

impl Default for SupervisorSection {
    fn default() -> Self {
        Self {
            enabled: true,
            grace_period_secs: default_grace(),
            cadence_secs: default_cadence(),
            error_threshold: default_error_threshold(),
            inactivity_threshold_secs: default_inactivity(),
            restart_pause_secs: default_restart_pause(),
            failure_backoff_secs: default_failure_backoff(),
        }
    }
}

fn default_true() -> bool {
    true
}
fn default_grace() -> u64 {
    10
}
fn default_cadence() -> u64 {
    30
}
fn default_error_threshold() -> u64 {
    50
}
fn default_inactivity() -> u64 {
    1800
}
fn default_restart_pause() -> f64 {
    1.0
}
fn default_failure_backoff() -> u64 {
    60
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct AlertsSection {
    pub webhook_url: Option<String>,
    /// Environment variable holding the webhook URL.
    pub webhook_url_env: Option<String>,
    #[serde(default = "default_alert_timeout")]
    pub timeout_secs: f64,
    #[serde(default = "default_alert_source")]
    pub source: String,
}

impl Default for AlertsSection {
    fn default() -> Self {
        Self {
            webhook_url: None,
            webhook_url_env: None,
            timeout_secs: default_alert_timeout(),
            source: default_alert_source(),
        }
    }
}

fn default_alert_timeout() -> f64 {
    5.0
}
fn default_alert_source() -> String {
    "rfid_system".into()
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct PlcSection {
    #[serde(default = "default_plc_url")]
    pub url: String,
    pub username: Option<String>,
    /// Plaintext password (prefer keyring or env var).
    pub password: Option<String>,
    /// Environment variable holding the password.
    pub password_env: Option<String>,
    #[serde(default = "default_connect_retries")]
    pub connect_retries: u32,
    #[serde(default = "default_retry_delay")]
    pub retry_delay_secs: f64,
    /// Periodic inventory sync; 0 disables it.
    #[serde(default)]
    pub sync_interval_secs: u64,
    #[serde(default = "stockpulse_core::config::default_hmi_commands")]
    pub hmi_commands: Vec<String>,
    #[serde(default)]
    pub nodes: NodesSection,
}

impl Default for PlcSection {
    fn default() -> Self {
        Self {
            url: default_plc_url(),
            username: None,
            password: None,
            password_env: None,
            connect_retries: default_connect_retries(),
            retry_delay_secs: default_retry_delay(),
            sync_interval_secs: 0,
            hmi_commands: stockpulse_core::config::default_hmi_commands(),
            nodes: NodesSection::default(),
        }
    }
}

fn default_plc_url() -> String {
    "opc.tcp://localhost:4840".into()
}
fn default_connect_retries() -> u32 {
    3
}
fn default_retry_delay() -> f64 {
    2.0
}

/// `[plc.nodes]`: addresses of the panel values.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct NodesSection {
    pub item_count: String,
    pub traffic_light: String,
    pub hmi_status: String,
    pub hmi_command: String,
    pub category_data: String,
}

impl Default for NodesSection {
    fn default() -> Self {
        let n = NodeAddresses::default();
        Self {
            item_count: n.item_count,
            traffic_light: n.traffic_light,
            hmi_status: n.hmi_status,
            hmi_command: n.hmi_command,
            category_data: n.category_data,
        }
    }
}

impl Config {
    /// Copy with every plaintext secret masked, for display.
    pub fn redacted(&self) -> Self {
        let mask = |s: &Option<String>| s.as_ref().map(|_| REDACTED.to_owned());
        let mut out = self.clone();
        out.reader_api_key = mask(&self.reader_api_key);
        for entry in out.readers.values_mut() {
            entry.api_key = mask(&entry.api_key);
        }
        if let Some(plc) = out.plc.as_mut() {
            plc.password = mask(&plc.password);
        }
        out
    }
}

// ── Config file path ────────────────────────────────────────────────

/// Resolve the config file path via XDG / platform conventions.
pub fn config_path() -> PathBuf {
    ProjectDirs::from("com", "stockpulse", "stockpulse").map_or_else(
        || {
            let mut p = PathBuf::from(std::env::var("HOME").unwrap_or_else(|_| ".".into()));
            p.push(".config");
            p.push("stockpulse");
            p.push("config.toml");
            p
        },
        |dirs| dirs.config_dir().join("config.toml"),
    )
}

// ── Config loading ──────────────────────────────────────────────────

/// Load config from `path` (missing file is fine) plus the environment.
///
/// Environment keys are `STOCKPULSE_` followed by the TOML path with `__`
/// between levels, e.g. `STOCKPULSE_SUPERVISOR__ERROR_THRESHOLD=100`.
pub fn load_config(path: &Path) -> Result<Config, ConfigError> {
    let figment = Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Toml::file(path))
        .merge(Env::prefixed("STOCKPULSE_").split("__"));

    let config: Config = figment.extract()?;
    Ok(config)
}

/// Serialize config to TOML and write it to `path`.
pub fn save_config(cfg: &Config, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, toml::to_string_pretty(cfg)?)?;
    Ok(())
}

// ── Credential resolution ───────────────────────────────────────────

/// Resolve a secret: named env var, then keyring `account`, then plaintext.
pub fn resolve_secret(
    env_name: Option<&str>,
    keyring_account: &str,
    plaintext: Option<&str>,
) -> Option<SecretString> {
    // 1. Env var
    if let Some(name) = env_name {
        if let Ok(val) = std::env::var(name) {
            return Some(SecretString::from(val));
        }
    }

    // 2. System keyring
    if let Ok(entry) = keyring::Entry::new(KEYRING_SERVICE, keyring_account) {
        if let Ok(secret) = entry.get_password() {
            return Some(SecretString::from(secret));
        }
    }

    // 3. Plaintext in config
    plaintext.map(|s| SecretString::from(s.to_owned()))
}

// ── Translation to core config ──────────────────────────────────────

/// Validate and translate into the core's runtime config.
pub fn to_service_config(config: &Config) -> Result<ServiceConfig, ConfigError> {
    let poll = PollConfig {
        default_interval: positive_secs("poll.default_interval_secs", config.poll.default_interval_secs)?,
        backoff_cap: positive_secs("poll.backoff_cap_secs", config.poll.backoff_cap_secs)?,
        request_timeout: positive_secs("poll.request_timeout_secs", config.poll.request_timeout_secs)?,
    };

    Ok(ServiceConfig {
        readers: readers(config)?,
        reconnect: reconnect(&config.reconnect)?,
        poll,
        supervisor: supervisor(&config.supervisor)?,
        alerts: alerts(&config.alerts)?,
        plc: config.plc.as_ref().map(plc).transpose()?,
    })
}

fn readers(config: &Config) -> Result<Vec<ReaderConfig>, ConfigError> {
    let mut out = Vec::new();

    for (id, entry) in &config.readers {
        if entry.url.trim().is_empty() {
            warn!(reader_id = %id, "reader has no URL, skipping");
            continue;
        }
        let field = format!("readers.{id}");
        let mut reader = ReaderConfig::new(id.clone(), reader_url(&field, &entry.url)?);
        reader.api_key = resolve_secret(
            entry.api_key_env.as_deref(),
            &format!("reader/{id}"),
            entry.api_key.as_deref(),
        );
        if reader.api_key.is_none() {
            if let Some(env) = &entry.api_key_env {
                return Err(ConfigError::NoCredentials {
                    target: format!("reader '{id}'"),
                    env: env.clone(),
                });
            }
        }
        reader.poll_interval = entry
            .poll_interval_secs
            .map(|s| positive_secs(&format!("{field}.poll_interval_secs"), s))
            .transpose()?;
        reader.location.clone_from(&entry.location);
        out.push(reader);
    }

    if out.is_empty() && config.readers.is_empty() {
        if let Some(url) = config.reader_url.as_deref().filter(|u| !u.trim().is_empty()) {
            let mut reader = ReaderConfig::new(LEGACY_READER_ID, reader_url("reader_url", url)?);
            reader.api_key = resolve_secret(
                None,
                &format!("reader/{LEGACY_READER_ID}"),
                config.reader_api_key.as_deref(),
            );
            out.push(reader);
        }
    }

    Ok(out)
}

fn reader_url(field: &str, raw: &str) -> Result<Url, ConfigError> {
    let url = Url::parse(raw).map_err(|e| invalid(field, format!("invalid URL {raw:?}: {e}")))?;
    match url.scheme() {
        "ws" | "wss" | "http" | "https" => Ok(url),
        other => Err(invalid(
            field,
            format!("unsupported scheme '{other}' (expected ws, wss, http or https)"),
        )),
    }
}

fn reconnect(section: &ReconnectSection) -> Result<ReconnectConfig, ConfigError> {
    let floor = positive_secs("reconnect.floor_secs", section.floor_secs)?;
    let ceiling = positive_secs("reconnect.ceiling_secs", section.ceiling_secs)?;
    if ceiling < floor {
        return Err(invalid("reconnect.ceiling_secs", "must not be below floor_secs"));
    }
    if !section.multiplier.is_finite() || section.multiplier < 1.0 {
        return Err(invalid("reconnect.multiplier", "must be at least 1.0"));
    }
    Ok(ReconnectConfig {
        floor,
        ceiling,
        multiplier: section.multiplier,
        connect_timeout: positive_secs("reconnect.connect_timeout_secs", section.connect_timeout_secs)?,
    })
}

fn supervisor(section: &SupervisorSection) -> Result<SupervisorConfig, ConfigError> {
    let nonzero = |field: &str, v: u64| {
        if v == 0 {
            Err(invalid(format!("supervisor.{field}"), "must be greater than zero"))
        } else {
            Ok(v)
        }
    };

    Ok(SupervisorConfig {
        enabled: section.enabled,
        grace_period: Duration::from_secs(section.grace_period_secs),
        cadence: Duration::from_secs(nonzero("cadence_secs", section.cadence_secs)?),
        error_threshold: nonzero("error_threshold", section.error_threshold)?,
        inactivity_threshold: Duration::from_secs(nonzero(
            "inactivity_threshold_secs",
            section.inactivity_threshold_secs,
        )?),
        restart_pause: non_negative_secs("supervisor.restart_pause_secs", section.restart_pause_secs)?,
        failure_backoff: Duration::from_secs(nonzero(
            "failure_backoff_secs",
            section.failure_backoff_secs,
        )?),
    })
}

fn alerts(section: &AlertsSection) -> Result<AlertConfig, ConfigError> {
    let raw = section
        .webhook_url_env
        .as_deref()
        .and_then(|name| std::env::var(name).ok())
        .or_else(|| section.webhook_url.clone())
        .filter(|u| !u.trim().is_empty());

    let webhook_url = raw
        .map(|u| {
            Url::parse(&u).map_err(|e| invalid("alerts.webhook_url", format!("invalid URL: {e}")))
        })
        .transpose()?;

    Ok(AlertConfig {
        webhook_url,
        timeout: positive_secs("alerts.timeout_secs", section.timeout_secs)?,
        source: section.source.clone(),
    })
}

fn plc(section: &PlcSection) -> Result<PlcConfig, ConfigError> {
    let n = &section.nodes;
    for (field, address) in [
        ("item_count", &n.item_count),
        ("traffic_light", &n.traffic_light),
        ("hmi_status", &n.hmi_status),
        ("hmi_command", &n.hmi_command),
        ("category_data", &n.category_data),
    ] {
        NodeAddress::parse(address).map_err(|e| invalid(format!("plc.nodes.{field}"), e.to_string()))?;
    }
    if section.connect_retries == 0 {
        return Err(invalid("plc.connect_retries", "must be at least 1"));
    }

    let password = resolve_secret(
        section.password_env.as_deref(),
        "plc/password",
        section.password.as_deref(),
    );
    if password.is_none() {
        if let Some(env) = &section.password_env {
            return Err(ConfigError::NoCredentials {
                target: "plc".into(),
                env: env.clone(),
            });
        }
    }

    Ok(PlcConfig {
        url: section.url.clone(),
        username: section.username.clone(),
        password,
        connect_retries: section.connect_retries,
        retry_delay: non_negative_secs("plc.retry_delay_secs", section.retry_delay_secs)?,
        nodes: NodeAddresses {
            item_count: n.item_count.clone(),
            traffic_light: n.traffic_light.clone(),
            hmi_status: n.hmi_status.clone(),
            hmi_command: n.hmi_command.clone(),
            category_data: n.category_data.clone(),
        },
        hmi_commands: section.hmi_commands.clone(),
        sync_interval: (section.sync_interval_secs > 0)
            .then(|| Duration::from_secs(section.sync_interval_secs)),
    })
}

fn positive_secs(field: &str, secs: f64) -> Result<Duration, ConfigError> {
    match Duration::try_from_secs_f64(secs) {
        Ok(d) if !d.is_zero() => Ok(d),
        _ => Err(invalid(field, format!("must be a positive number of seconds, got {secs}"))),
    }
}

fn non_negative_secs(field: &str, secs: f64) -> Result<Duration, ConfigError> {
    Duration::try_from_secs_f64(secs)
        .map_err(|_| invalid(field, format!("must be a non-negative number of seconds, got {secs}")))
}

// ── Catalog ─────────────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct CatalogFile {
    #[serde(default)]
    products: Vec<Product>,
}

/// Where the catalog lives, if configured: relative paths resolve against
/// the directory holding the config file.
pub fn catalog_path(config: &Config, config_file: &Path) -> Option<PathBuf> {
    let catalog = config.catalog.as_ref()?;
    if catalog.is_absolute() {
        return Some(catalog.clone());
    }
    let base = config_file.parent().unwrap_or_else(|| Path::new("."));
    Some(base.join(catalog))
}

/// Load `[[products]]` from a TOML catalog file.
pub fn load_catalog(path: &Path) -> Result<Vec<Product>, ConfigError> {
    let raw = std::fs::read_to_string(path).map_err(|e| ConfigError::Catalog {
        path: path.to_owned(),
        reason: e.to_string(),
    })?;
    let file: CatalogFile = toml::from_str(&raw).map_err(|e| ConfigError::Catalog {
        path: path.to_owned(),
        reason: e.to_string(),
    })?;

    let mut seen_tags = std::collections::HashSet::new();
    for product in &file.products {
        if let Some(tag) = &product.rfid_tag {
            if !seen_tags.insert(tag.as_str()) {
                return Err(ConfigError::Catalog {
                    path: path.to_owned(),
                    reason: format!("tag {tag:?} is assigned to more than one product"),
                });
            }
        }
    }
    Ok(file.products)
}
