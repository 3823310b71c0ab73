//! Subcommand implementations

pub mod down;
pub mod status;
pub mod up;

use std::sync::Arc;
use std::time::Duration;

use planeup_core::{ClusterContext, SetupConfig};
use planeup_kube::{
    CommandExecutor, HelmCli, KubectlClient, PackageManager, ProcessExecutor, ResourceClient,
};

/// The live collaborators every subcommand talks through
pub struct Clients {
    pub packages: Arc<dyn PackageManager>,
    pub resources: Arc<dyn ResourceClient>,
    pub exec: Arc<dyn CommandExecutor>,
}

/// Wire up the real executor and the kubectl/helm clients
pub fn clients(config: &SetupConfig, context: &ClusterContext) -> Clients {
    let command_timeout: Duration = config.timeouts.command;
    let exec: Arc<dyn CommandExecutor> = Arc::new(ProcessExecutor::new(command_timeout));
    let resources: Arc<dyn ResourceClient> = Arc::new(KubectlClient::new(
        Arc::clone(&exec),
        context.clone(),
        command_timeout,
    ));
    let packages: Arc<dyn PackageManager> = Arc::new(HelmCli::new(
        Arc::clone(&exec),
        context.clone(),
        command_timeout,
    ));
    Clients {
        packages,
        resources,
        exec,
    }
}
