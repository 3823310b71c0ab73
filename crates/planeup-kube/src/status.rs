//! Live status aggregation
//!
//! Every call performs a fresh, bounded sequence of independent read-only
//! queries; nothing is cached between calls or between fields. Each query
//! failure is recorded as an issue instead of aborting the aggregation, so
//! a missing provider never hides a healthy release.

use std::sync::Arc;

use planeup_core::{InstallationStatus, SetupConfig};

use crate::helm::{PackageManager, ReleaseStatus};
use crate::resource::{
    PROVIDER_CONFIG_KIND, PROVIDER_KIND, ResourceClient, condition_message, condition_status,
};

/// Assembles point-in-time installation snapshots
pub struct StatusAggregator {
    config: SetupConfig,
    packages: Arc<dyn PackageManager>,
    resources: Arc<dyn ResourceClient>,
}

impl StatusAggregator {
    pub fn new(
        config: SetupConfig,
        packages: Arc<dyn PackageManager>,
        resources: Arc<dyn ResourceClient>,
    ) -> Self {
        Self {
            config,
            packages,
            resources,
        }
    }

    /// Query everything live and assemble the snapshot
    pub async fn status(&self) -> InstallationStatus {
        let mut status =
            InstallationStatus::absent(&self.config.namespace, &self.config.release_name);

        self.check_release(&mut status).await;
        self.check_pods(&mut status).await;
        self.check_provider(&mut status).await;
        self.check_provider_config(&mut status).await;

        status
    }

    async fn check_release(&self, status: &mut InstallationStatus) {
        match self
            .packages
            .release(&self.config.release_name, &self.config.namespace)
            .await
        {
            Ok(Some(record)) => {
                status.installed = true;
                status.version = record
                    .chart_version
                    .as_ref()
                    .map(ToString::to_string)
                    .or_else(|| record.app_version.clone());
                if record.status != ReleaseStatus::Deployed {
                    status.issues.push(format!(
                        "release '{}' is in state {}",
                        record.name, record.status
                    ));
                }
            }
            Ok(None) => {}
            Err(e) => status.issues.push(format!("release query failed: {e}")),
        }
    }

    async fn check_pods(&self, status: &mut InstallationStatus) {
        match self
            .resources
            .list_pods(&self.config.pod_selector, &self.config.namespace)
            .await
        {
            Ok(pods) => {
                status.pod_count = pods.len();
                status.ready_pod_count = pods.iter().filter(|p| p.ready).count();
                status.ready =
                    status.pod_count > 0 && status.pod_count == status.ready_pod_count;

                if status.installed && !status.ready {
                    if pods.is_empty() {
                        status.issues.push("no core pods found".to_string());
                    } else {
                        status.issues.push(format!(
                            "{}/{} core pods ready",
                            status.ready_pod_count, status.pod_count
                        ));
                    }
                }
            }
            Err(e) => status.issues.push(format!("pod query failed: {e}")),
        }
    }

    async fn check_provider(&self, status: &mut InstallationStatus) {
        match self
            .resources
            .get(PROVIDER_KIND, &self.config.provider_name, None)
            .await
        {
            Ok(Some(provider)) => {
                status.provider_installed = true;
                let installed = condition_status(&provider, "Installed").unwrap_or(false);
                let healthy = condition_status(&provider, "Healthy").unwrap_or(false);
                status.provider_ready = installed && healthy;

                if !status.provider_ready {
                    let detail = condition_message(&provider, "Healthy")
                        .unwrap_or_else(|| format!("installed={installed}, healthy={healthy}"));
                    status.issues.push(format!(
                        "provider '{}' is not healthy: {detail}",
                        self.config.provider_name
                    ));
                }
            }
            Ok(None) => {
                if status.installed {
                    status.issues.push(format!(
                        "provider '{}' is not installed",
                        self.config.provider_name
                    ));
                }
            }
            Err(e) => status.issues.push(format!("provider query failed: {e}")),
        }
    }

    async fn check_provider_config(&self, status: &mut InstallationStatus) {
        match self
            .resources
            .get(PROVIDER_CONFIG_KIND, &self.config.provider_config_name, None)
            .await
        {
            Ok(Some(_)) => status.provider_config_exists = true,
            Ok(None) => {
                if status.installed {
                    status.issues.push(format!(
                        "provider config '{}' does not exist",
                        self.config.provider_config_name
                    ));
                }
            }
            Err(e) => status
                .issues
                .push(format!("provider config query failed: {e}")),
        }
    }
}
