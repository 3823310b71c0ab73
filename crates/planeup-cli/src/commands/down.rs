//! `planeup down` - tear down the in-cluster footprint

use std::sync::Arc;

use planeup_core::{ClusterContext, SetupConfig};
use planeup_kube::{ConsoleProgress, ProgressSink, SilentProgress, Uninstaller};

use crate::display;
use crate::error::{CliError, Result};

pub async fn run(config: SetupConfig, context: ClusterContext, quiet: bool) -> Result<()> {
    let clients = super::clients(&config, &context);

    let progress: Arc<dyn ProgressSink> = if quiet {
        Arc::new(SilentProgress)
    } else {
        Arc::new(ConsoleProgress::new())
    };

    let uninstaller = Uninstaller::new(config, clients.packages, clients.resources)
        .with_progress(progress);

    let report = uninstaller.uninstall().await;
    display::print_report(&report);

    if report.is_clean() {
        Ok(())
    } else {
        Err(CliError::TeardownIncomplete {
            failed: report.failures().len(),
        })
    }
}
