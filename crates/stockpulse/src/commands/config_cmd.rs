//! Config subcommand handlers.

use owo_colors::OwoColorize;

use crate::cli::{ConfigArgs, ConfigCommand, GlobalOpts};
use crate::error::CliError;
use crate::output;

pub fn handle(args: &ConfigArgs, global: &GlobalOpts) -> Result<(), CliError> {
    match args.command {
        ConfigCommand::Path => {
            output::print_output(&super::config_file(global).display().to_string());
            Ok(())
        }

        ConfigCommand::Show => {
            let path = super::config_file(global);
            let config =
                stockpulse_config::load_config(&path).map_err(|e| CliError::config(&path, e))?;
            let rendered = toml::to_string_pretty(&config.redacted())
                .map_err(|e| CliError::config(&path, e.into()))?;
            output::print_output(&rendered);
            Ok(())
        }

        ConfigCommand::Validate => {
            let loaded = super::load(global)?;
            let inventory = super::load_inventory(&loaded.config, &loaded.path)?;

            let plc = loaded
                .service
                .plc
                .as_ref()
                .map_or_else(|| "none".to_owned(), |p| p.url.clone());
            let summary = format!(
                "config OK: {} reader(s), {} product(s), PLC: {plc}",
                loaded.service.readers.len(),
                inventory.product_count(),
            );
            if output::should_color() {
                output::print_output(&summary.green().to_string());
            } else {
                output::print_output(&summary);
            }
            Ok(())
        }
    }
}
