//! `stockpulse run`: the ingestion daemon.

use std::sync::Arc;

use tracing::{info, warn};

use stockpulse_core::{CoreError, IngestService, PlcError};

use crate::cli::{GlobalOpts, RunArgs};
use crate::error::CliError;
use crate::output;

pub async fn handle(args: RunArgs, global: &GlobalOpts) -> Result<(), CliError> {
    let super::Loaded {
        path,
        config,
        mut service,
    } = super::load(global)?;

    if service.readers.is_empty() {
        return Err(CliError::NoReaders {
            path: path.display().to_string(),
        });
    }
    if args.no_supervise {
        service.supervisor.enabled = false;
    }

    let store = Arc::new(super::load_inventory(&config, &path)?);
    let ingest = IngestService::new(&service, store)?;

    if let Some(panel) = ingest.plc() {
        let url = panel.client().url().to_owned();
        if panel.probe().await {
            info!(url = %url, "PLC reachable");
        } else if args.require_plc {
            let attempts = service.plc.as_ref().map_or(1, |p| p.connect_retries);
            return Err(CoreError::from(PlcError::Unavailable { url, attempts }).into());
        } else {
            warn!(url = %url, "PLC unreachable, will retry on next use");
        }
    }

    let started = ingest.start().await;
    info!(listeners = started, "stockpulse running, press Ctrl-C to stop");

    tokio::signal::ctrl_c().await?;
    info!("interrupt received, shutting down");

    let statuses = ingest.listener_statuses().await;
    ingest.shutdown().await;

    if !statuses.is_empty() {
        output::print_output(&output::render_statuses(&statuses));
    }
    Ok(())
}
