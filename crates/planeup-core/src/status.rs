//! The live installation snapshot
//!
//! `InstallationStatus` is recomputed from cluster queries on every call and
//! never persisted or cached; the cluster can change underneath this tool at
//! any time (manual kubectl operations, crashes), so a stale snapshot is
//! worse than none.

use serde::{Deserialize, Serialize};

/// Point-in-time view of the installation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InstallationStatus {
    /// Whether the core release exists at all
    pub installed: bool,

    /// Chart version of the release, when known
    pub version: Option<String>,

    /// Namespace the installation lives in
    pub namespace: String,

    /// Name of the core release
    pub release_name: String,

    /// All pods of the release are ready (implies `pod_count > 0`)
    pub ready: bool,

    /// Pods belonging to the release
    pub pod_count: usize,

    /// Pods of the release currently passing their readiness checks
    pub ready_pod_count: usize,

    /// The provider package resource exists
    pub provider_installed: bool,

    /// The provider reports both installed and healthy conditions
    pub provider_ready: bool,

    /// The provider configuration resource exists
    pub provider_config_exists: bool,

    /// Human-readable diagnostics, empty when healthy
    #[serde(default)]
    pub issues: Vec<String>,
}

impl InstallationStatus {
    /// Snapshot for a cluster with no installation at all
    pub fn absent(namespace: impl Into<String>, release_name: impl Into<String>) -> Self {
        Self {
            installed: false,
            version: None,
            namespace: namespace.into(),
            release_name: release_name.into(),
            ready: false,
            pod_count: 0,
            ready_pod_count: 0,
            provider_installed: false,
            provider_ready: false,
            provider_config_exists: false,
            issues: Vec::new(),
        }
    }

    /// Everything installed, ready, and configured with no open issues
    pub fn healthy(&self) -> bool {
        self.installed
            && self.ready
            && self.provider_ready
            && self.provider_config_exists
            && self.issues.is_empty()
    }

    /// `ready` may only be set when every pod is ready and at least one
    /// exists. The aggregator computes `ready` from the counts, so this
    /// holds by construction; tests assert it stays that way.
    pub fn is_consistent(&self) -> bool {
        !self.ready || (self.pod_count == self.ready_pod_count && self.pod_count > 0)
    }

    /// One-line summary for logs and plain output
    pub fn summary(&self) -> String {
        if !self.installed {
            return format!("'{}' is not installed", self.release_name);
        }
        if self.healthy() {
            format!(
                "'{}' {} healthy: {}/{} pods ready, provider ready, provider config present",
                self.release_name,
                self.version.as_deref().unwrap_or("(unknown version)"),
                self.ready_pod_count,
                self.pod_count
            )
        } else {
            format!(
                "'{}' installed but not healthy: {} issue(s)",
                self.release_name,
                self.issues.len().max(1)
            )
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ready_status() -> InstallationStatus {
        InstallationStatus {
            installed: true,
            version: Some("1.15.0".to_string()),
            namespace: "crossplane-system".to_string(),
            release_name: "crossplane".to_string(),
            ready: true,
            pod_count: 3,
            ready_pod_count: 3,
            provider_installed: true,
            provider_ready: true,
            provider_config_exists: true,
            issues: Vec::new(),
        }
    }

    #[test]
    fn test_absent_snapshot() {
        let status = InstallationStatus::absent("crossplane-system", "crossplane");
        assert!(!status.installed);
        assert!(!status.ready);
        assert!(status.is_consistent());
        assert!(status.summary().contains("not installed"));
    }

    #[test]
    fn test_healthy_requires_everything() {
        let status = ready_status();
        assert!(status.healthy());

        let mut degraded = ready_status();
        degraded.provider_config_exists = false;
        assert!(!degraded.healthy());

        let mut with_issue = ready_status();
        with_issue.issues.push("provider unhealthy: package pull failed".to_string());
        assert!(!with_issue.healthy());
    }

    #[test]
    fn test_ready_invariant() {
        let status = ready_status();
        assert!(status.is_consistent());

        let mut broken = ready_status();
        broken.ready_pod_count = 2;
        assert!(!broken.is_consistent());

        let mut empty = ready_status();
        empty.pod_count = 0;
        empty.ready_pod_count = 0;
        assert!(!empty.is_consistent());
    }

    #[test]
    fn test_provider_config_does_not_imply_provider_ready() {
        let mut status = ready_status();
        status.provider_ready = false;
        status.provider_config_exists = true;
        // Both states are representable at once; the config can outlive a
        // provider that went unhealthy.
        assert!(!status.healthy());
        assert!(status.is_consistent());
    }

    #[test]
    fn test_serialization_round_trip() {
        let status = ready_status();
        let json = serde_json::to_string(&status).unwrap();
        assert!(json.contains("releaseName"));
        let parsed: InstallationStatus = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.pod_count, 3);
        assert!(parsed.healthy());
    }
}
