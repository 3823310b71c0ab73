//! helm-backed package management
//!
//! Release decisions in the installer are always made from a live
//! `release()` query, never local memory, so this module keeps no state
//! beyond the executor and context.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use semver::Version;
use serde::Deserialize;

use planeup_core::{ClusterContext, CommandFailure, Result, SetupError};

use crate::exec::{CommandExecutor, CommandSpec};

/// A registered chart repository
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct HelmRepository {
    pub name: String,
    pub url: String,
}

/// Lifecycle status of a release
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ReleaseStatus {
    Deployed,
    Failed,
    PendingInstall,
    PendingUpgrade,
    PendingRollback,
    Uninstalling,
    Superseded,
    Other(String),
}

impl ReleaseStatus {
    pub fn parse(status: &str) -> Self {
        match status {
            "deployed" => Self::Deployed,
            "failed" => Self::Failed,
            "pending-install" => Self::PendingInstall,
            "pending-upgrade" => Self::PendingUpgrade,
            "pending-rollback" => Self::PendingRollback,
            "uninstalling" => Self::Uninstalling,
            "superseded" => Self::Superseded,
            other => Self::Other(other.to_string()),
        }
    }
}

impl std::fmt::Display for ReleaseStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Deployed => write!(f, "deployed"),
            Self::Failed => write!(f, "failed"),
            Self::PendingInstall => write!(f, "pending-install"),
            Self::PendingUpgrade => write!(f, "pending-upgrade"),
            Self::PendingRollback => write!(f, "pending-rollback"),
            Self::Uninstalling => write!(f, "uninstalling"),
            Self::Superseded => write!(f, "superseded"),
            Self::Other(s) => write!(f, "{s}"),
        }
    }
}

/// Live view of a release as reported by the package manager
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ReleaseRecord {
    pub name: String,
    pub namespace: String,
    pub chart: String,
    /// Version parsed off the chart field, when it parses
    pub chart_version: Option<Version>,
    pub app_version: Option<String>,
    pub status: ReleaseStatus,
}

/// Parameters for an install or upgrade
#[derive(Debug, Clone, Default)]
pub struct ReleaseRequest {
    pub release: String,
    pub namespace: String,
    pub chart: String,
    pub version: Option<Version>,
    pub create_namespace: bool,
}

/// What happened to an uninstall request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UninstallOutcome {
    Removed,
    /// The release was already gone; callers treat this as success
    NotFound,
}

/// Manages named releases of versioned packages
#[async_trait]
pub trait PackageManager: Send + Sync {
    /// All registered chart repositories
    async fn repositories(&self) -> Result<Vec<HelmRepository>>;

    /// Register a repository; `force` replaces an existing URL
    async fn add_repository(&self, name: &str, url: &str, force: bool) -> Result<()>;

    /// Refresh repository indexes
    async fn update_repositories(&self) -> Result<()>;

    /// Install a new release
    async fn install(&self, request: &ReleaseRequest) -> Result<()>;

    /// Upgrade an existing release
    async fn upgrade(&self, request: &ReleaseRequest) -> Result<()>;

    /// Remove a release, distinguishing "removed" from "was not there"
    async fn uninstall(&self, release: &str, namespace: &str) -> Result<UninstallOutcome>;

    /// Live record for a release; `Ok(None)` when it does not exist
    async fn release(&self, release: &str, namespace: &str) -> Result<Option<ReleaseRecord>>;

    /// Convenience existence check on top of `release`
    async fn release_exists(&self, release: &str, namespace: &str) -> Result<bool> {
        Ok(self.release(release, namespace).await?.is_some())
    }
}

/// The real package manager, shelling out to helm
pub struct HelmCli {
    exec: Arc<dyn CommandExecutor>,
    context: ClusterContext,
    command_timeout: Duration,
}

impl HelmCli {
    pub fn new(
        exec: Arc<dyn CommandExecutor>,
        context: ClusterContext,
        command_timeout: Duration,
    ) -> Self {
        Self {
            exec,
            context,
            command_timeout,
        }
    }

    fn base(&self) -> CommandSpec {
        CommandSpec::new("helm")
            .args(self.context.helm_args())
            .timeout(self.command_timeout)
    }

    fn classify_failure(&self, output: crate::exec::CommandOutput) -> SetupError {
        let stderr = output.stderr_line().to_string();
        let lowered = stderr.to_lowercase();
        if lowered.contains("connection refused")
            || lowered.contains("unable to connect")
            || lowered.contains("kubernetes cluster unreachable")
        {
            SetupError::ClusterUnreachable {
                context: self.context.display_name(),
                detail: stderr,
            }
        } else {
            SetupError::CommandFailed {
                program: "helm".to_string(),
                exit_code: output.exit_code,
                stderr,
                failure: CommandFailure::classify(&output.stderr),
            }
        }
    }
}

#[async_trait]
impl PackageManager for HelmCli {
    async fn repositories(&self) -> Result<Vec<HelmRepository>> {
        let spec = self.base().args(["repo", "list", "-o", "json"]);
        let output = self.exec.run(&spec).await?;
        if !output.success() {
            // helm exits non-zero when no repositories are configured yet.
            if output.stderr.to_lowercase().contains("no repositories") {
                return Ok(Vec::new());
            }
            return Err(self.classify_failure(output));
        }
        parse_repo_list(&output.stdout)
    }

    async fn add_repository(&self, name: &str, url: &str, force: bool) -> Result<()> {
        let mut spec = self.base().args(["repo", "add", name, url]);
        if force {
            spec = spec.arg("--force-update");
        }
        self.exec.run(&spec).await?.require_success("helm")?;
        Ok(())
    }

    async fn update_repositories(&self) -> Result<()> {
        let spec = self.base().args(["repo", "update"]);
        self.exec.run(&spec).await?.require_success("helm")?;
        Ok(())
    }

    async fn install(&self, request: &ReleaseRequest) -> Result<()> {
        let mut spec = self.base().args([
            "install",
            request.release.as_str(),
            request.chart.as_str(),
            "-n",
            request.namespace.as_str(),
        ]);
        if request.create_namespace {
            spec = spec.arg("--create-namespace");
        }
        if let Some(version) = &request.version {
            spec = spec.arg("--version").arg(version.to_string());
        }
        let output = self.exec.run(&spec).await?;
        if output.success() {
            Ok(())
        } else {
            Err(self.classify_failure(output))
        }
    }

    async fn upgrade(&self, request: &ReleaseRequest) -> Result<()> {
        let mut spec = self.base().args([
            "upgrade",
            request.release.as_str(),
            request.chart.as_str(),
            "-n",
            request.namespace.as_str(),
        ]);
        if let Some(version) = &request.version {
            spec = spec.arg("--version").arg(version.to_string());
        }
        let output = self.exec.run(&spec).await?;
        if output.success() {
            Ok(())
        } else {
            Err(self.classify_failure(output))
        }
    }

    async fn uninstall(&self, release: &str, namespace: &str) -> Result<UninstallOutcome> {
        let spec = self.base().args(["uninstall", release, "-n", namespace]);
        let output = self.exec.run(&spec).await?;
        if output.success() {
            return Ok(UninstallOutcome::Removed);
        }
        if output.stderr.to_lowercase().contains("not found") {
            return Ok(UninstallOutcome::NotFound);
        }
        Err(self.classify_failure(output))
    }

    async fn release(&self, release: &str, namespace: &str) -> Result<Option<ReleaseRecord>> {
        let filter = format!("^{release}$");
        let spec = self.base().args([
            "list",
            "-n",
            namespace,
            "-o",
            "json",
            "--all",
            "--filter",
            filter.as_str(),
        ]);
        let output = self.exec.run(&spec).await?;
        if !output.success() {
            return Err(self.classify_failure(output));
        }
        parse_release_list(&output.stdout, release)
    }
}

#[derive(Debug, Deserialize)]
struct HelmListItem {
    name: String,
    namespace: String,
    chart: String,
    #[serde(default)]
    app_version: Option<String>,
    status: String,
}

/// Parse `helm repo list -o json`
pub fn parse_repo_list(stdout: &str) -> Result<Vec<HelmRepository>> {
    serde_json::from_str(stdout).map_err(|e| SetupError::MalformedOutput {
        program: "helm".to_string(),
        detail: e.to_string(),
    })
}

/// Parse `helm list -o json`, selecting the named release
pub fn parse_release_list(stdout: &str, release: &str) -> Result<Option<ReleaseRecord>> {
    let items: Vec<HelmListItem> =
        serde_json::from_str(stdout).map_err(|e| SetupError::MalformedOutput {
            program: "helm".to_string(),
            detail: e.to_string(),
        })?;

    Ok(items.into_iter().find(|i| i.name == release).map(|item| {
        let chart_version = parse_chart_version(&item.chart);
        ReleaseRecord {
            name: item.name,
            namespace: item.namespace,
            chart_version,
            app_version: item.app_version,
            status: ReleaseStatus::parse(&item.status),
            chart: item.chart,
        }
    }))
}

/// Pull the version off a `name-1.2.3` chart field
pub fn parse_chart_version(chart: &str) -> Option<Version> {
    let (_, tail) = chart.rsplit_once('-')?;
    Version::parse(tail.trim_start_matches('v')).ok()
}
