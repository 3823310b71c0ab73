//! Workflow configuration
//!
//! Names, packages, and per-step timeouts for the bootstrap workflow. The
//! cluster context is an explicit value handed to both clients; nothing in
//! planeup reads the ambient kubeconfig selection, so tests can substitute
//! an isolated context deterministically.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::Result;

/// Which cluster to talk to, passed explicitly into every client
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ClusterContext {
    /// Path to a kubeconfig file; `None` uses the client's default
    pub kubeconfig: Option<PathBuf>,

    /// Named context within the kubeconfig; `None` uses the current one
    pub context: Option<String>,
}

impl ClusterContext {
    pub fn new(kubeconfig: Option<PathBuf>, context: Option<String>) -> Self {
        Self { kubeconfig, context }
    }

    /// Display name for error messages
    pub fn display_name(&self) -> String {
        self.context
            .clone()
            .unwrap_or_else(|| "current-context".to_string())
    }

    /// Flags for kubectl invocations
    pub fn kubectl_args(&self) -> Vec<String> {
        let mut args = Vec::new();
        if let Some(path) = &self.kubeconfig {
            args.push("--kubeconfig".to_string());
            args.push(path.display().to_string());
        }
        if let Some(ctx) = &self.context {
            args.push("--context".to_string());
            args.push(ctx.clone());
        }
        args
    }

    /// Flags for helm invocations (helm names the context flag differently)
    pub fn helm_args(&self) -> Vec<String> {
        let mut args = Vec::new();
        if let Some(path) = &self.kubeconfig {
            args.push("--kubeconfig".to_string());
            args.push(path.display().to_string());
        }
        if let Some(ctx) = &self.context {
            args.push("--kube-context".to_string());
            args.push(ctx.clone());
        }
        args
    }
}

/// Per-step timeouts and the poll interval
///
/// Timeouts are per step, not global: pod scheduling takes minutes while a
/// condition flip takes seconds, and a slow cluster should only stretch the
/// step that is actually slow.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct StepTimeouts {
    /// Core pods reaching readiness (pod scheduling + image pulls)
    #[serde(with = "humantime_serde")]
    pub core_ready: Duration,

    /// Provider reporting installed and healthy
    #[serde(with = "humantime_serde")]
    pub provider_ready: Duration,

    /// Provider accepting its configuration
    #[serde(with = "humantime_serde")]
    pub provider_config_ready: Duration,

    /// Any single external command
    #[serde(with = "humantime_serde")]
    pub command: Duration,

    /// Sleep between readiness polls
    #[serde(with = "humantime_serde")]
    pub poll_interval: Duration,
}

impl Default for StepTimeouts {
    fn default() -> Self {
        Self {
            core_ready: Duration::from_secs(300),
            provider_ready: Duration::from_secs(180),
            provider_config_ready: Duration::from_secs(60),
            command: Duration::from_secs(60),
            poll_interval: Duration::from_secs(2),
        }
    }
}

/// Everything the orchestrators need to know about names and packages
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default)]
pub struct SetupConfig {
    /// Namespace the whole footprint lives in
    pub namespace: String,

    /// Name of the core release
    pub release_name: String,

    /// Chart repository name as registered with the package manager
    pub repository_name: String,

    /// Chart repository URL
    pub repository_url: String,

    /// Chart reference (repo/name)
    pub chart: String,

    /// Label selector matching the core pods
    pub pod_selector: String,

    /// Name of the Provider resource
    pub provider_name: String,

    /// Provider package reference, without version tag
    pub provider_package: String,

    /// Provider package version tag
    pub provider_version: String,

    /// Name of the credentials Secret
    pub secret_name: String,

    /// Key inside the Secret holding the credentials block
    pub secret_key: String,

    /// Name of the ProviderConfig resource
    pub provider_config_name: String,

    /// Per-step timeouts
    pub timeouts: StepTimeouts,
}

impl Default for SetupConfig {
    fn default() -> Self {
        Self {
            namespace: "crossplane-system".to_string(),
            release_name: "crossplane".to_string(),
            repository_name: "crossplane-stable".to_string(),
            repository_url: "https://charts.crossplane.io/stable".to_string(),
            chart: "crossplane-stable/crossplane".to_string(),
            pod_selector: "app=crossplane".to_string(),
            provider_name: "provider-aws-s3".to_string(),
            provider_package: "xpkg.upbound.io/upbound/provider-aws-s3".to_string(),
            provider_version: "v1.1.0".to_string(),
            secret_name: "aws-credentials".to_string(),
            secret_key: "creds".to_string(),
            provider_config_name: "default".to_string(),
            timeouts: StepTimeouts::default(),
        }
    }
}

impl SetupConfig {
    /// Load configuration from a YAML file, filling gaps with defaults
    pub fn load_from(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = serde_yaml::from_str(&content)?;
        Ok(config)
    }

    /// Full provider package reference including the version tag
    pub fn provider_package_ref(&self) -> String {
        format!("{}:{}", self.provider_package, self.provider_version)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SetupConfig::default();
        assert_eq!(config.namespace, "crossplane-system");
        assert_eq!(config.chart, "crossplane-stable/crossplane");
        assert_eq!(
            config.provider_package_ref(),
            "xpkg.upbound.io/upbound/provider-aws-s3:v1.1.0"
        );
        assert_eq!(config.timeouts.core_ready, Duration::from_secs(300));
        assert_eq!(config.timeouts.poll_interval, Duration::from_secs(2));
    }

    #[test]
    fn test_partial_yaml_fills_defaults() {
        let yaml = "namespace: sandbox\ntimeouts:\n  coreReady: 10m\n";
        let config: SetupConfig = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(config.namespace, "sandbox");
        assert_eq!(config.timeouts.core_ready, Duration::from_secs(600));
        // Untouched fields keep their defaults.
        assert_eq!(config.release_name, "crossplane");
        assert_eq!(config.timeouts.poll_interval, Duration::from_secs(2));
    }

    #[test]
    fn test_yaml_round_trip() {
        let config = SetupConfig::default();
        let yaml = serde_yaml::to_string(&config).unwrap();
        let parsed: SetupConfig = serde_yaml::from_str(&yaml).unwrap();
        assert_eq!(parsed, config);
    }

    #[test]
    fn test_cluster_context_args() {
        let ctx = ClusterContext::new(
            Some(PathBuf::from("/tmp/kubeconfig")),
            Some("kind-planeup".to_string()),
        );
        assert_eq!(
            ctx.kubectl_args(),
            vec!["--kubeconfig", "/tmp/kubeconfig", "--context", "kind-planeup"]
        );
        assert_eq!(
            ctx.helm_args(),
            vec![
                "--kubeconfig",
                "/tmp/kubeconfig",
                "--kube-context",
                "kind-planeup"
            ]
        );
    }

    #[test]
    fn test_empty_cluster_context_adds_no_flags() {
        let ctx = ClusterContext::default();
        assert!(ctx.kubectl_args().is_empty());
        assert!(ctx.helm_args().is_empty());
        assert_eq!(ctx.display_name(), "current-context");
    }
}
