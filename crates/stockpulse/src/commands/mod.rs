//! Command handlers and the config/catalog loading they share.

pub mod config_cmd;
pub mod run;
pub mod simulate;

use std::path::{Path, PathBuf};

use tracing::{debug, warn};

use stockpulse_config::Config;
use stockpulse_core::{MemoryInventory, ServiceConfig};

use crate::cli::GlobalOpts;
use crate::error::CliError;

/// Config file + its validated runtime form.
pub struct Loaded {
    pub path: PathBuf,
    pub config: Config,
    pub service: ServiceConfig,
}

pub fn config_file(global: &GlobalOpts) -> PathBuf {
    global
        .config
        .clone()
        .unwrap_or_else(stockpulse_config::config_path)
}

pub fn load(global: &GlobalOpts) -> Result<Loaded, CliError> {
    let path = config_file(global);
    if !path.exists() {
        debug!(path = %path.display(), "config file not found, using defaults");
    }
    let config = stockpulse_config::load_config(&path).map_err(|e| CliError::config(&path, e))?;
    let service =
        stockpulse_config::to_service_config(&config).map_err(|e| CliError::config(&path, e))?;
    Ok(Loaded {
        path,
        config,
        service,
    })
}

/// Seed the in-memory inventory from the configured catalog, if any.
pub fn load_inventory(config: &Config, config_path: &Path) -> Result<MemoryInventory, CliError> {
    let Some(catalog) = stockpulse_config::catalog_path(config, config_path) else {
        warn!("no catalog configured, every tag will be unknown");
        return Ok(MemoryInventory::new());
    };
    let products =
        stockpulse_config::load_catalog(&catalog).map_err(|e| CliError::config(config_path, e))?;
    debug!(path = %catalog.display(), products = products.len(), "catalog loaded");
    Ok(MemoryInventory::with_products(products))
}
