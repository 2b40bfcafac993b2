//! `stockpulse simulate`: push a scan batch through the processor offline.

use std::sync::Arc;

use stockpulse_core::ScanProcessor;

use crate::cli::{GlobalOpts, SimulateArgs};
use crate::error::CliError;
use crate::output;

pub async fn handle(args: SimulateArgs, global: &GlobalOpts) -> Result<(), CliError> {
    if args.reader_id.trim().is_empty() {
        return Err(CliError::Validation {
            field: "reader_id".into(),
            reason: "must not be empty".into(),
        });
    }

    let loaded = super::load(global)?;
    let store = Arc::new(super::load_inventory(&loaded.config, &loaded.path)?);
    let processor = ScanProcessor::new(store);

    let result = processor.simulate(&args.reader_id, &args.tags).await?;
    let rendered = output::render_scan(args.output, &result, output::should_color())?;
    output::print_output(&rendered);
    Ok(())
}
