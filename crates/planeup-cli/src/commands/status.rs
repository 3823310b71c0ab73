//! `planeup status` - live installation snapshot

use planeup_core::{ClusterContext, SetupConfig};
use planeup_kube::StatusAggregator;

use crate::OutputFormat;
use crate::display;
use crate::error::{CliError, Result};

pub async fn run(
    config: SetupConfig,
    context: ClusterContext,
    output: OutputFormat,
) -> Result<()> {
    let clients = super::clients(&config, &context);
    let aggregator = StatusAggregator::new(config, clients.packages, clients.resources);

    // Always a fresh read; there is nothing to cache.
    let status = aggregator.status().await;

    match output {
        OutputFormat::Text => display::print_status(&status),
        OutputFormat::Json => {
            let json = serde_json::to_string_pretty(&status).map_err(|e| {
                CliError::Command {
                    message: format!("could not encode status: {e}"),
                    help: None,
                }
            })?;
            println!("{json}");
        }
    }
    Ok(())
}
