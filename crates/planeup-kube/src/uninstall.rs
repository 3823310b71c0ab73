//! The uninstallation orchestrator
//!
//! Teardown runs in strict reverse dependency order and continues past
//! individual failures: a cluster being torn down is often already partially
//! broken, and aborting on the first error would leave orphaned resources
//! behind. Every step's outcome lands in the report; the call itself never
//! fails. Credentials held outside the cluster are never touched.

use std::sync::Arc;

use planeup_core::SetupConfig;

use crate::helm::{PackageManager, UninstallOutcome};
use crate::progress::{ProgressSink, SilentProgress};
use crate::resource::{
    DeleteOutcome, NAMESPACE_KIND, PROVIDER_CONFIG_KIND, PROVIDER_KIND, ResourceClient,
};

/// The ordered steps of the teardown workflow
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CleanupStep {
    ProviderConfig,
    Provider,
    Release,
    Namespace,
}

impl CleanupStep {
    pub const ALL: [CleanupStep; 4] = [
        CleanupStep::ProviderConfig,
        CleanupStep::Provider,
        CleanupStep::Release,
        CleanupStep::Namespace,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CleanupStep::ProviderConfig => "provider config",
            CleanupStep::Provider => "provider",
            CleanupStep::Release => "core release",
            CleanupStep::Namespace => "namespace",
        }
    }
}

impl std::fmt::Display for CleanupStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// What happened to one teardown step
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CleanupOutcome {
    /// The resource existed and was removed
    Removed,

    /// The resource was already gone; still a success
    AlreadyAbsent,

    /// The step failed; later steps still ran
    Failed(String),
}

impl CleanupOutcome {
    pub fn is_success(&self) -> bool {
        !matches!(self, CleanupOutcome::Failed(_))
    }
}

/// One step's entry in the teardown report
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CleanupEntry {
    pub step: CleanupStep,
    pub outcome: CleanupOutcome,
}

/// Ordered record of everything the teardown attempted
#[derive(Debug, Clone, Default)]
pub struct CleanupReport {
    entries: Vec<CleanupEntry>,
}

impl CleanupReport {
    pub fn new() -> Self {
        Self::default()
    }

    fn push(&mut self, step: CleanupStep, outcome: CleanupOutcome) {
        self.entries.push(CleanupEntry { step, outcome });
    }

    pub fn entries(&self) -> &[CleanupEntry] {
        &self.entries
    }

    /// True when no step failed (absent resources count as clean)
    pub fn is_clean(&self) -> bool {
        self.entries.iter().all(|e| e.outcome.is_success())
    }

    pub fn failures(&self) -> Vec<&CleanupEntry> {
        self.entries
            .iter()
            .filter(|e| !e.outcome.is_success())
            .collect()
    }

    /// One-line summary for logs and plain output
    pub fn summary(&self) -> String {
        let removed = self
            .entries
            .iter()
            .filter(|e| e.outcome == CleanupOutcome::Removed)
            .count();
        let absent = self
            .entries
            .iter()
            .filter(|e| e.outcome == CleanupOutcome::AlreadyAbsent)
            .count();
        let failed = self.failures().len();

        let mut parts = Vec::new();
        if removed > 0 {
            parts.push(format!("{removed} removed"));
        }
        if absent > 0 {
            parts.push(format!("{absent} already absent"));
        }
        if failed > 0 {
            parts.push(format!("{failed} failed"));
        }
        if parts.is_empty() {
            "nothing to do".to_string()
        } else {
            parts.join(", ")
        }
    }
}

/// Drives best-effort teardown of the in-cluster footprint
pub struct Uninstaller {
    config: SetupConfig,
    packages: Arc<dyn PackageManager>,
    resources: Arc<dyn ResourceClient>,
    progress: Arc<dyn ProgressSink>,
}

impl Uninstaller {
    pub fn new(
        config: SetupConfig,
        packages: Arc<dyn PackageManager>,
        resources: Arc<dyn ResourceClient>,
    ) -> Self {
        Self {
            config,
            packages,
            resources,
            progress: Arc::new(SilentProgress),
        }
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressSink>) -> Self {
        self.progress = progress;
        self
    }

    /// Attempt every teardown step once and report what happened
    pub async fn uninstall(&self) -> CleanupReport {
        let mut report = CleanupReport::new();

        let outcome = self
            .delete_resource(PROVIDER_CONFIG_KIND, &self.config.provider_config_name, None)
            .await;
        self.record(&mut report, CleanupStep::ProviderConfig, outcome);

        let outcome = self
            .delete_resource(PROVIDER_KIND, &self.config.provider_name, None)
            .await;
        self.record(&mut report, CleanupStep::Provider, outcome);

        let outcome = self.remove_release().await;
        self.record(&mut report, CleanupStep::Release, outcome);

        let outcome = self
            .delete_resource(NAMESPACE_KIND, &self.config.namespace, None)
            .await;
        self.record(&mut report, CleanupStep::Namespace, outcome);

        report
    }

    fn record(&self, report: &mut CleanupReport, step: CleanupStep, outcome: CleanupOutcome) {
        match &outcome {
            CleanupOutcome::Removed => self.progress.step_completed(step.as_str()),
            CleanupOutcome::AlreadyAbsent => {
                self.progress.step_skipped(step.as_str(), "already absent")
            }
            CleanupOutcome::Failed(detail) => self.progress.step_failed(step.as_str(), detail),
        }
        report.push(step, outcome);
    }

    async fn delete_resource(
        &self,
        kind: &str,
        name: &str,
        namespace: Option<&str>,
    ) -> CleanupOutcome {
        match self.resources.delete(kind, name, namespace).await {
            Ok(DeleteOutcome::Deleted) => CleanupOutcome::Removed,
            Ok(DeleteOutcome::NotFound) => CleanupOutcome::AlreadyAbsent,
            Err(e) => {
                tracing::warn!(kind, name, error = %e, "teardown step failed, continuing");
                CleanupOutcome::Failed(e.to_string())
            }
        }
    }

    async fn remove_release(&self) -> CleanupOutcome {
        match self
            .packages
            .uninstall(&self.config.release_name, &self.config.namespace)
            .await
        {
            Ok(UninstallOutcome::Removed) => CleanupOutcome::Removed,
            Ok(UninstallOutcome::NotFound) => CleanupOutcome::AlreadyAbsent,
            Err(e) => {
                tracing::warn!(error = %e, "release uninstall failed, continuing");
                CleanupOutcome::Failed(e.to_string())
            }
        }
    }
}
