//! In-memory mock collaborators for testing
//!
//! These store cluster state in memory and count every operation, so
//! orchestrator tests can assert which calls happened (and which did not)
//! without a Kubernetes cluster. State is shared behind `Arc`, so a clone
//! handed to an orchestrator and the clone kept by the test see the same
//! cluster.

use std::collections::{HashMap, HashSet};
use std::sync::{Arc, RwLock};
use std::time::Duration;

use async_trait::async_trait;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use chrono::{DateTime, Utc};
use semver::Version;
use serde_json::Value;

use planeup_core::{CommandFailure, Credentials, Result, SetupError};

use crate::helm::{
    HelmRepository, PackageManager, ReleaseRecord, ReleaseRequest, ReleaseStatus, UninstallOutcome,
};
use crate::probe::Clock;
use crate::resource::{DeleteOutcome, PodPhase, PodStatus, ResourceClient};
use crate::validate::ConnectivityValidator;

// ========== Package manager ==========

/// Operation counts for package-manager assertions
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PackageManagerCounts {
    pub repo_lists: usize,
    pub repo_adds: usize,
    pub repo_updates: usize,
    pub release_queries: usize,
    pub installs: usize,
    pub upgrades: usize,
    pub uninstalls: usize,
}

#[derive(Debug, Default)]
struct PackageState {
    repositories: Vec<HelmRepository>,
    release: Option<ReleaseRecord>,
    fail_uninstall: bool,
    fail_queries: bool,
}

/// In-memory package manager
#[derive(Clone, Default)]
pub struct MockPackageManager {
    state: Arc<RwLock<PackageState>>,
    counts: Arc<RwLock<PackageManagerCounts>>,
}

impl MockPackageManager {
    pub fn new() -> Self {
        Self::default()
    }

    /// A deployed release record, for pre-populating state
    pub fn deployed_record(name: &str, namespace: &str, version: &str) -> ReleaseRecord {
        ReleaseRecord {
            name: name.to_string(),
            namespace: namespace.to_string(),
            chart: format!("{name}-{version}"),
            chart_version: Version::parse(version).ok(),
            app_version: Some(version.to_string()),
            status: ReleaseStatus::Deployed,
        }
    }

    pub fn set_release(&self, release: Option<ReleaseRecord>) {
        self.state.write().unwrap().release = release;
    }

    pub fn release_record(&self) -> Option<ReleaseRecord> {
        self.state.read().unwrap().release.clone()
    }

    pub fn set_repositories(&self, repositories: Vec<HelmRepository>) {
        self.state.write().unwrap().repositories = repositories;
    }

    /// Make every `uninstall` call fail until cleared
    pub fn fail_uninstall(&self) {
        self.state.write().unwrap().fail_uninstall = true;
    }

    /// Make repository and release queries fail until cleared
    pub fn fail_queries(&self) {
        self.state.write().unwrap().fail_queries = true;
    }

    pub fn counts(&self) -> PackageManagerCounts {
        self.counts.read().unwrap().clone()
    }

    fn injected_failure() -> SetupError {
        SetupError::CommandFailed {
            program: "helm".to_string(),
            exit_code: 1,
            stderr: "injected failure".to_string(),
            failure: CommandFailure::Other,
        }
    }
}

#[async_trait]
impl PackageManager for MockPackageManager {
    async fn repositories(&self) -> Result<Vec<HelmRepository>> {
        self.counts.write().unwrap().repo_lists += 1;
        let state = self.state.read().unwrap();
        if state.fail_queries {
            return Err(Self::injected_failure());
        }
        Ok(state.repositories.clone())
    }

    async fn add_repository(&self, name: &str, url: &str, _force: bool) -> Result<()> {
        self.counts.write().unwrap().repo_adds += 1;
        let mut state = self.state.write().unwrap();
        if let Some(existing) = state.repositories.iter_mut().find(|r| r.name == name) {
            existing.url = url.to_string();
        } else {
            state.repositories.push(HelmRepository {
                name: name.to_string(),
                url: url.to_string(),
            });
        }
        Ok(())
    }

    async fn update_repositories(&self) -> Result<()> {
        self.counts.write().unwrap().repo_updates += 1;
        Ok(())
    }

    async fn install(&self, request: &ReleaseRequest) -> Result<()> {
        self.counts.write().unwrap().installs += 1;
        let version = request
            .version
            .clone()
            .unwrap_or_else(|| Version::new(1, 15, 0));
        let mut state = self.state.write().unwrap();
        state.release = Some(ReleaseRecord {
            name: request.release.clone(),
            namespace: request.namespace.clone(),
            chart: format!("{}-{}", request.release, version),
            chart_version: Some(version.clone()),
            app_version: Some(version.to_string()),
            status: ReleaseStatus::Deployed,
        });
        Ok(())
    }

    async fn upgrade(&self, request: &ReleaseRequest) -> Result<()> {
        self.counts.write().unwrap().upgrades += 1;
        let version = request
            .version
            .clone()
            .unwrap_or_else(|| Version::new(1, 15, 0));
        let mut state = self.state.write().unwrap();
        state.release = Some(ReleaseRecord {
            name: request.release.clone(),
            namespace: request.namespace.clone(),
            chart: format!("{}-{}", request.release, version),
            chart_version: Some(version.clone()),
            app_version: Some(version.to_string()),
            status: ReleaseStatus::Deployed,
        });
        Ok(())
    }

    async fn uninstall(&self, _release: &str, _namespace: &str) -> Result<UninstallOutcome> {
        self.counts.write().unwrap().uninstalls += 1;
        let mut state = self.state.write().unwrap();
        if state.fail_uninstall {
            return Err(Self::injected_failure());
        }
        Ok(if state.release.take().is_some() {
            UninstallOutcome::Removed
        } else {
            UninstallOutcome::NotFound
        })
    }

    async fn release(&self, _release: &str, _namespace: &str) -> Result<Option<ReleaseRecord>> {
        self.counts.write().unwrap().release_queries += 1;
        let state = self.state.read().unwrap();
        if state.fail_queries {
            return Err(Self::injected_failure());
        }
        Ok(state.release.clone())
    }
}

// ========== Resource client ==========

/// Operation counts for resource-client assertions
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct ResourceClientCounts {
    pub applies: usize,
    pub gets: usize,
    pub deletes: usize,
    pub pod_lists: usize,
}

#[derive(Default)]
struct ResourceState {
    /// (normalized kind, name) -> resource
    objects: HashMap<(String, String), Value>,
    pods: Vec<PodStatus>,
    reject_apply: HashSet<String>,
    fail_delete: HashSet<String>,
    fail_pod_lists: bool,
    fail_gets: bool,
    auto_ready: bool,
}

/// In-memory resource store standing in for the API server
#[derive(Clone)]
pub struct MockResourceClient {
    state: Arc<RwLock<ResourceState>>,
    counts: Arc<RwLock<ResourceClientCounts>>,
}

impl Default for MockResourceClient {
    fn default() -> Self {
        Self::new()
    }
}

impl MockResourceClient {
    /// By default, applied Provider/ProviderConfig resources immediately
    /// report ready conditions so happy paths complete in one poll. Call
    /// `manual_readiness` to script conditions from the test instead.
    pub fn new() -> Self {
        let state = ResourceState {
            auto_ready: true,
            ..Default::default()
        };
        Self {
            state: Arc::new(RwLock::new(state)),
            counts: Arc::new(RwLock::new(ResourceClientCounts::default())),
        }
    }

    pub fn manual_readiness(&self) {
        self.state.write().unwrap().auto_ready = false;
    }

    pub fn set_pods(&self, pods: Vec<PodStatus>) {
        self.state.write().unwrap().pods = pods;
    }

    pub fn set_object(&self, kind: &str, name: &str, value: Value) {
        self.state
            .write()
            .unwrap()
            .objects
            .insert((normalize_kind(kind), name.to_string()), value);
    }

    pub fn object(&self, kind: &str, name: &str) -> Option<Value> {
        self.state
            .read()
            .unwrap()
            .objects
            .get(&(normalize_kind(kind), name.to_string()))
            .cloned()
    }

    pub fn has_object(&self, kind: &str, name: &str) -> bool {
        self.object(kind, name).is_some()
    }

    /// Reject applies of the given manifest kind (admission failure)
    pub fn reject_apply(&self, kind: &str) {
        self.state
            .write()
            .unwrap()
            .reject_apply
            .insert(normalize_kind(kind));
    }

    pub fn clear_apply_rejection(&self, kind: &str) {
        self.state
            .write()
            .unwrap()
            .reject_apply
            .remove(&normalize_kind(kind));
    }

    /// Fail deletes of the given kind
    pub fn fail_delete(&self, kind: &str) {
        self.state
            .write()
            .unwrap()
            .fail_delete
            .insert(normalize_kind(kind));
    }

    pub fn fail_pod_lists(&self) {
        self.state.write().unwrap().fail_pod_lists = true;
    }

    pub fn counts(&self) -> ResourceClientCounts {
        self.counts.read().unwrap().clone()
    }

    pub fn ready_pod(name: &str) -> PodStatus {
        PodStatus {
            name: name.to_string(),
            phase: PodPhase::Running,
            ready: true,
            restart_count: 0,
        }
    }

    pub fn pending_pod(name: &str) -> PodStatus {
        PodStatus {
            name: name.to_string(),
            phase: PodPhase::Pending,
            ready: false,
            restart_count: 0,
        }
    }

    pub fn crash_looping_pod(name: &str, restarts: i32) -> PodStatus {
        PodStatus {
            name: name.to_string(),
            phase: PodPhase::Running,
            ready: false,
            restart_count: restarts,
        }
    }

    fn injected_failure() -> SetupError {
        SetupError::CommandFailed {
            program: "kubectl".to_string(),
            exit_code: 1,
            stderr: "injected failure".to_string(),
            failure: CommandFailure::Other,
        }
    }
}

/// Collapse `providers.pkg.crossplane.io` / `Provider` / `provider` into one
/// lookup key the way the API server collapses kind spellings.
fn normalize_kind(kind: &str) -> String {
    let lowered = kind.to_lowercase();
    let first = lowered.split('.').next().unwrap_or(&lowered);
    let trimmed = first.strip_suffix('s').unwrap_or(first);
    trimmed.to_string()
}

#[async_trait]
impl ResourceClient for MockResourceClient {
    async fn apply(&self, manifest: &str) -> Result<()> {
        self.counts.write().unwrap().applies += 1;

        let mut value: Value =
            serde_yaml::from_str(manifest).map_err(|e| SetupError::MalformedOutput {
                program: "mock".to_string(),
                detail: e.to_string(),
            })?;
        let kind = value
            .get("kind")
            .and_then(Value::as_str)
            .unwrap_or("resource")
            .to_string();
        let name = value
            .pointer("/metadata/name")
            .and_then(Value::as_str)
            .unwrap_or("unnamed")
            .to_string();
        let key = normalize_kind(&kind);

        let mut state = self.state.write().unwrap();
        if state.reject_apply.contains(&key) {
            return Err(SetupError::ResourceRejected {
                kind,
                name,
                detail: "injected admission rejection".to_string(),
            });
        }

        // Behave like the API server: stringData becomes base64 data.
        if key == "secret"
            && let Some(string_data) = value.get("stringData").cloned()
            && let Some(map) = string_data.as_object()
        {
            let mut data = serde_json::Map::new();
            for (k, v) in map {
                let encoded = BASE64.encode(v.as_str().unwrap_or_default());
                data.insert(k.clone(), Value::String(encoded));
            }
            value["data"] = Value::Object(data);
            if let Some(object) = value.as_object_mut() {
                object.remove("stringData");
            }
        }

        if state.auto_ready && (key == "provider" || key == "providerconfig") {
            value["status"] = serde_json::json!({
                "conditions": [
                    { "type": "Installed", "status": "True" },
                    { "type": "Healthy", "status": "True" }
                ]
            });
        }

        state.objects.insert((key, name), value);
        Ok(())
    }

    async fn get(
        &self,
        kind: &str,
        name: &str,
        _namespace: Option<&str>,
    ) -> Result<Option<Value>> {
        self.counts.write().unwrap().gets += 1;
        let state = self.state.read().unwrap();
        if state.fail_gets {
            return Err(Self::injected_failure());
        }
        Ok(state
            .objects
            .get(&(normalize_kind(kind), name.to_string()))
            .cloned())
    }

    async fn delete(
        &self,
        kind: &str,
        name: &str,
        _namespace: Option<&str>,
    ) -> Result<DeleteOutcome> {
        self.counts.write().unwrap().deletes += 1;
        let key = normalize_kind(kind);
        let mut state = self.state.write().unwrap();
        if state.fail_delete.contains(&key) {
            return Err(Self::injected_failure());
        }
        Ok(if state.objects.remove(&(key, name.to_string())).is_some() {
            DeleteOutcome::Deleted
        } else {
            DeleteOutcome::NotFound
        })
    }

    async fn list_pods(&self, _selector: &str, _namespace: &str) -> Result<Vec<PodStatus>> {
        self.counts.write().unwrap().pod_lists += 1;
        let state = self.state.read().unwrap();
        if state.fail_pod_lists {
            return Err(Self::injected_failure());
        }
        Ok(state.pods.clone())
    }
}

// ========== Connectivity validator ==========

/// Connectivity validator with injectable failure
#[derive(Clone, Default)]
pub struct MockValidator {
    calls: Arc<RwLock<usize>>,
    fail: Arc<RwLock<bool>>,
}

impl MockValidator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_validation(&self) {
        *self.fail.write().unwrap() = true;
    }

    pub fn validations(&self) -> usize {
        *self.calls.read().unwrap()
    }
}

#[async_trait]
impl ConnectivityValidator for MockValidator {
    async fn validate(&self, _credentials: &Credentials) -> Result<()> {
        *self.calls.write().unwrap() += 1;
        if *self.fail.read().unwrap() {
            return Err(SetupError::InvalidCredentials {
                detail: "injected authentication failure".to_string(),
            });
        }
        Ok(())
    }
}

// ========== Clock ==========

/// Clock whose sleeps advance time instead of waiting it out
pub struct FakeClock {
    start: DateTime<Utc>,
    now: RwLock<DateTime<Utc>>,
}

impl FakeClock {
    pub fn new() -> Self {
        let start = Utc::now();
        Self {
            start,
            now: RwLock::new(start),
        }
    }

    /// Simulated time since construction
    pub fn elapsed(&self) -> Duration {
        (*self.now.read().unwrap() - self.start)
            .to_std()
            .unwrap_or_default()
    }
}

impl Default for FakeClock {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Clock for FakeClock {
    fn now(&self) -> DateTime<Utc> {
        *self.now.read().unwrap()
    }

    async fn sleep(&self, duration: Duration) {
        let mut now = self.now.write().unwrap();
        *now += chrono::Duration::from_std(duration).unwrap_or_else(|_| chrono::Duration::zero());
    }
}
