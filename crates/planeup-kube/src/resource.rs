//! kubectl-backed resource operations
//!
//! The cluster is the only source of truth: nothing here caches a resource
//! past a single call. Dynamic JSON (`kubectl ... -o json`) instead of typed
//! resources, since the interesting kinds (Provider, ProviderConfig) are
//! CRDs anyway.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use planeup_core::{ClusterContext, CommandFailure, Result, SetupError};

use crate::exec::{CommandExecutor, CommandSpec};

/// Resource kind string for the Crossplane Provider CRD
pub const PROVIDER_KIND: &str = "providers.pkg.crossplane.io";

/// Resource kind string for the AWS ProviderConfig CRD
pub const PROVIDER_CONFIG_KIND: &str = "providerconfigs.aws.upbound.io";

/// Resource kind string for Secrets
pub const SECRET_KIND: &str = "secret";

/// Resource kind string for Namespaces
pub const NAMESPACE_KIND: &str = "namespace";

/// Kubernetes pod phase, as reported in `status.phase`
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PodPhase {
    Pending,
    Running,
    Succeeded,
    Failed,
    Unknown,
}

impl PodPhase {
    pub fn parse(phase: &str) -> Self {
        match phase {
            "Pending" => Self::Pending,
            "Running" => Self::Running,
            "Succeeded" => Self::Succeeded,
            "Failed" => Self::Failed,
            _ => Self::Unknown,
        }
    }
}

/// Readiness-relevant view of one pod
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PodStatus {
    pub name: String,
    pub phase: PodPhase,
    /// All containers passing their readiness probes
    pub ready: bool,
    /// Highest container restart count in the pod
    pub restart_count: i32,
}

/// What happened to a deletion request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DeleteOutcome {
    Deleted,
    /// The resource was already gone; callers treat this as success
    NotFound,
}

/// Read/create/delete operations against named resource kinds
#[async_trait]
pub trait ResourceClient: Send + Sync {
    /// Apply a manifest (create or update in place)
    async fn apply(&self, manifest: &str) -> Result<()>;

    /// Fetch a resource as dynamic JSON; `Ok(None)` when it does not exist
    async fn get(&self, kind: &str, name: &str, namespace: Option<&str>)
    -> Result<Option<Value>>;

    /// Delete a resource, distinguishing "deleted" from "was not there"
    async fn delete(
        &self,
        kind: &str,
        name: &str,
        namespace: Option<&str>,
    ) -> Result<DeleteOutcome>;

    /// List pods matching a label selector
    async fn list_pods(&self, selector: &str, namespace: &str) -> Result<Vec<PodStatus>>;
}

/// The real client, shelling out to kubectl
pub struct KubectlClient {
    exec: Arc<dyn CommandExecutor>,
    context: ClusterContext,
    command_timeout: Duration,
}

impl KubectlClient {
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
        CommandSpec::new("kubectl")
            .args(self.context.kubectl_args())
            .timeout(self.command_timeout)
    }

    /// Map a failed kubectl invocation to the taxonomy
    fn classify_failure(&self, output: crate::exec::CommandOutput) -> SetupError {
        let stderr = output.stderr_line().to_string();
        let lowered = stderr.to_lowercase();
        if lowered.contains("connection refused")
            || lowered.contains("unable to connect")
            || lowered.contains("no such host")
            || lowered.contains("context was not found")
        {
            SetupError::ClusterUnreachable {
                context: self.context.display_name(),
                detail: stderr,
            }
        } else {
            SetupError::CommandFailed {
                program: "kubectl".to_string(),
                exit_code: output.exit_code,
                stderr,
                failure: CommandFailure::classify(&output.stderr),
            }
        }
    }
}

#[async_trait]
impl ResourceClient for KubectlClient {
    async fn apply(&self, manifest: &str) -> Result<()> {
        let spec = self.base().args(["apply", "-f", "-"]).stdin(manifest);
        let output = self.exec.run(&spec).await?;
        if output.success() {
            tracing::debug!(result = %output.stdout.trim(), "kubectl apply");
            return Ok(());
        }

        let stderr = output.stderr_line().to_string();
        let lowered = stderr.to_lowercase();
        if lowered.contains("error validating")
            || lowered.contains("admission webhook")
            || lowered.contains("is invalid")
        {
            let (kind, name) = manifest_identity(manifest);
            return Err(SetupError::ResourceRejected {
                kind,
                name,
                detail: stderr,
            });
        }
        Err(self.classify_failure(output))
    }

    async fn get(&self, kind: &str, name: &str, namespace: Option<&str>) -> Result<Option<Value>> {
        let mut spec = self.base().args(["get", kind, name, "-o", "json"]);
        if let Some(ns) = namespace {
            spec = spec.args(["-n", ns]);
        }
        let output = self.exec.run(&spec).await?;
        if output.success() {
            let value = serde_json::from_str(&output.stdout).map_err(|e| {
                SetupError::MalformedOutput {
                    program: "kubectl".to_string(),
                    detail: e.to_string(),
                }
            })?;
            return Ok(Some(value));
        }
        if is_not_found(&output.stderr) {
            return Ok(None);
        }
        Err(self.classify_failure(output))
    }

    async fn delete(
        &self,
        kind: &str,
        name: &str,
        namespace: Option<&str>,
    ) -> Result<DeleteOutcome> {
        let mut spec = self.base().args(["delete", kind, name, "--wait=false"]);
        if let Some(ns) = namespace {
            spec = spec.args(["-n", ns]);
        }
        let output = self.exec.run(&spec).await?;
        if output.success() {
            return Ok(DeleteOutcome::Deleted);
        }
        if is_not_found(&output.stderr) {
            return Ok(DeleteOutcome::NotFound);
        }
        Err(self.classify_failure(output))
    }

    async fn list_pods(&self, selector: &str, namespace: &str) -> Result<Vec<PodStatus>> {
        let spec = self
            .base()
            .args(["get", "pods", "-n", namespace, "-l", selector, "-o", "json"]);
        let output = self.exec.run(&spec).await?;
        if !output.success() {
            return Err(self.classify_failure(output));
        }
        let value: Value = serde_json::from_str(&output.stdout).map_err(|e| {
            SetupError::MalformedOutput {
                program: "kubectl".to_string(),
                detail: e.to_string(),
            }
        })?;
        Ok(parse_pod_list(&value))
    }
}

fn is_not_found(stderr: &str) -> bool {
    let lowered = stderr.to_lowercase();
    lowered.contains("notfound") || lowered.contains("not found")
}

/// Kind and name of the first document in a manifest, for error messages
fn manifest_identity(manifest: &str) -> (String, String) {
    let parsed: Option<Value> = serde_yaml::from_str(manifest).ok();
    let kind = parsed
        .as_ref()
        .and_then(|v| v.get("kind"))
        .and_then(Value::as_str)
        .unwrap_or("resource")
        .to_string();
    let name = parsed
        .as_ref()
        .and_then(|v| v.get("metadata"))
        .and_then(|m| m.get("name"))
        .and_then(Value::as_str)
        .unwrap_or("unnamed")
        .to_string();
    (kind, name)
}

/// Extract pod statuses from a `kubectl get pods -o json` list
pub fn parse_pod_list(list: &Value) -> Vec<PodStatus> {
    let items = list
        .get("items")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    items
        .iter()
        .map(|pod| {
            let name = pod
                .pointer("/metadata/name")
                .and_then(Value::as_str)
                .unwrap_or("unnamed")
                .to_string();
            let phase = pod
                .pointer("/status/phase")
                .and_then(Value::as_str)
                .map(PodPhase::parse)
                .unwrap_or(PodPhase::Unknown);

            let containers = pod
                .pointer("/status/containerStatuses")
                .and_then(Value::as_array)
                .cloned()
                .unwrap_or_default();
            let ready = !containers.is_empty()
                && containers
                    .iter()
                    .all(|c| c.get("ready").and_then(Value::as_bool).unwrap_or(false));
            let restart_count = containers
                .iter()
                .filter_map(|c| c.get("restartCount").and_then(Value::as_i64))
                .max()
                .unwrap_or(0) as i32;

            PodStatus {
                name,
                phase,
                ready,
                restart_count,
            }
        })
        .collect()
}

/// Status of a named condition in `status.conditions`, when present
pub fn condition_status(resource: &Value, condition_type: &str) -> Option<bool> {
    conditions(resource)
        .iter()
        .find(|c| c.get("type").and_then(Value::as_str) == Some(condition_type))
        .and_then(|c| c.get("status").and_then(Value::as_str))
        .map(|s| s == "True")
}

/// Message attached to a named condition, when present
pub fn condition_message(resource: &Value, condition_type: &str) -> Option<String> {
    conditions(resource)
        .iter()
        .find(|c| c.get("type").and_then(Value::as_str) == Some(condition_type))
        .and_then(|c| c.get("message").and_then(Value::as_str))
        .map(str::to_string)
}

/// First condition reporting `status: "False"`, as (type, message)
pub fn any_false_condition(resource: &Value) -> Option<(String, String)> {
    conditions(resource).iter().find_map(|c| {
        let status = c.get("status").and_then(Value::as_str)?;
        if status != "False" {
            return None;
        }
        let ctype = c.get("type").and_then(Value::as_str)?.to_string();
        let message = c
            .get("message")
            .and_then(Value::as_str)
            .or_else(|| c.get("reason").and_then(Value::as_str))
            .unwrap_or("no message")
            .to_string();
        Some((ctype, message))
    })
}

fn conditions(resource: &Value) -> Vec<Value> {
    resource
        .pointer("/status/conditions")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn pod_list() -> Value {
        json!({
            "items": [
                {
                    "metadata": { "name": "crossplane-7d4f" },
                    "status": {
                        "phase": "Running",
                        "containerStatuses": [
                            { "ready": true, "restartCount": 0 }
                        ]
                    }
                },
                {
                    "metadata": { "name": "crossplane-rbac-9k2x" },
                    "status": {
                        "phase": "Pending",
                        "containerStatuses": [
                            { "ready": false, "restartCount": 5 },
                            { "ready": true, "restartCount": 1 }
                        ]
                    }
                }
            ]
        })
    }

    #[test]
    fn test_parse_pod_list() {
        let pods = parse_pod_list(&pod_list());
        assert_eq!(pods.len(), 2);

        assert_eq!(pods[0].name, "crossplane-7d4f");
        assert_eq!(pods[0].phase, PodPhase::Running);
        assert!(pods[0].ready);
        assert_eq!(pods[0].restart_count, 0);

        assert_eq!(pods[1].phase, PodPhase::Pending);
        assert!(!pods[1].ready);
        // Highest container restart count wins.
        assert_eq!(pods[1].restart_count, 5);
    }

    #[test]
    fn test_parse_pod_list_without_container_statuses() {
        let list = json!({
            "items": [
                { "metadata": { "name": "p" }, "status": { "phase": "Pending" } }
            ]
        });
        let pods = parse_pod_list(&list);
        assert_eq!(pods.len(), 1);
        // No containers reported yet means not ready, not "vacuously ready".
        assert!(!pods[0].ready);
    }

    #[test]
    fn test_parse_empty_pod_list() {
        assert!(parse_pod_list(&json!({ "items": [] })).is_empty());
    }

    #[test]
    fn test_condition_helpers() {
        let provider = json!({
            "status": {
                "conditions": [
                    { "type": "Installed", "status": "True" },
                    { "type": "Healthy", "status": "False",
                      "reason": "UnhealthyPackageRevision",
                      "message": "cannot resolve package dependencies" }
                ]
            }
        });

        assert_eq!(condition_status(&provider, "Installed"), Some(true));
        assert_eq!(condition_status(&provider, "Healthy"), Some(false));
        assert_eq!(condition_status(&provider, "Missing"), None);
        assert_eq!(
            condition_message(&provider, "Healthy").unwrap(),
            "cannot resolve package dependencies"
        );

        let (ctype, message) = any_false_condition(&provider).unwrap();
        assert_eq!(ctype, "Healthy");
        assert!(message.contains("dependencies"));
    }

    #[test]
    fn test_no_false_condition_on_healthy_resource() {
        let resource = json!({
            "status": {
                "conditions": [
                    { "type": "Installed", "status": "True" },
                    { "type": "Healthy", "status": "True" }
                ]
            }
        });
        assert!(any_false_condition(&resource).is_none());
    }

    #[test]
    fn test_no_conditions_at_all() {
        let resource = json!({ "spec": {} });
        assert!(any_false_condition(&resource).is_none());
        assert_eq!(condition_status(&resource, "Healthy"), None);
    }

    #[test]
    fn test_manifest_identity() {
        let manifest = "apiVersion: v1\nkind: Secret\nmetadata:\n  name: aws-credentials\n";
        let (kind, name) = manifest_identity(manifest);
        assert_eq!(kind, "Secret");
        assert_eq!(name, "aws-credentials");
    }

    #[test]
    fn test_not_found_detection() {
        assert!(is_not_found("Error from server (NotFound): secrets \"x\" not found"));
        assert!(!is_not_found("Error from server (Forbidden): access denied"));
    }

    #[test]
    fn test_pod_phase_parse() {
        assert_eq!(PodPhase::parse("Running"), PodPhase::Running);
        assert_eq!(PodPhase::parse("Failed"), PodPhase::Failed);
        assert_eq!(PodPhase::parse("SomethingNew"), PodPhase::Unknown);
    }
}
