//! The installation orchestrator
//!
//! Nine ordered steps, each with the same shape: a precondition check (is
//! this already done?), an action, and a postcondition wait. Preconditions
//! always query live state, never local memory, which is what makes a
//! re-run after any failure resume correctly. The orchestrator halts on the
//! first failing step and performs no rollback; completed steps stay in
//! place for the next attempt.

use std::sync::Arc;

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde_json::Value;
use thiserror::Error;

use planeup_core::{
    Credentials, ErrorKind, InstallationStatus, Result, SetupConfig, SetupError,
};

use crate::helm::{PackageManager, ReleaseRequest};
use crate::probe::{Poll, Prober};
use crate::progress::{ProgressSink, SilentProgress};
use crate::resource::{
    PROVIDER_CONFIG_KIND, PROVIDER_KIND, PodPhase, PodStatus, ResourceClient, SECRET_KIND,
    any_false_condition, condition_message, condition_status,
};
use crate::status::StatusAggregator;
use crate::validate::ConnectivityValidator;

/// A pod restarting more than this many times is treated as unrecoverable
const RESTART_THRESHOLD: i32 = 3;

/// The ordered steps of the installation workflow
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InstallStep {
    Repository,
    CorePackage,
    CoreReady,
    Provider,
    ProviderReady,
    Credentials,
    ProviderConfig,
    ProviderConfigReady,
    Connectivity,
}

impl InstallStep {
    pub const ALL: [InstallStep; 9] = [
        InstallStep::Repository,
        InstallStep::CorePackage,
        InstallStep::CoreReady,
        InstallStep::Provider,
        InstallStep::ProviderReady,
        InstallStep::Credentials,
        InstallStep::ProviderConfig,
        InstallStep::ProviderConfigReady,
        InstallStep::Connectivity,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            InstallStep::Repository => "repository registration",
            InstallStep::CorePackage => "core package install",
            InstallStep::CoreReady => "core readiness",
            InstallStep::Provider => "provider install",
            InstallStep::ProviderReady => "provider readiness",
            InstallStep::Credentials => "credential materialization",
            InstallStep::ProviderConfig => "provider config creation",
            InstallStep::ProviderConfigReady => "provider config acceptance",
            InstallStep::Connectivity => "connectivity validation",
        }
    }
}

impl std::fmt::Display for InstallStep {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// An install failure, tagged with the step it happened in
#[derive(Debug, Error)]
#[error("install failed during {step}: {source}")]
pub struct InstallError {
    pub step: InstallStep,
    #[source]
    pub source: SetupError,
}

impl InstallError {
    pub fn kind(&self) -> ErrorKind {
        self.source.kind()
    }

    pub fn suggestions(&self) -> Vec<String> {
        self.source.suggestions()
    }
}

/// Caller intent for an install run
#[derive(Debug, Clone, Default)]
pub struct InstallOptions {
    /// Requested chart version; `None` takes the repository default
    pub version: Option<semver::Version>,

    /// Allow moving an existing release or provider to another version.
    /// Without this, a version mismatch is an error, never a silent
    /// upgrade.
    pub upgrade: bool,

    /// Allow replacing the URL of an already-registered repository
    pub force_repo_update: bool,
}

/// Drives the ordered install workflow
pub struct Installer {
    config: SetupConfig,
    packages: Arc<dyn PackageManager>,
    resources: Arc<dyn ResourceClient>,
    validator: Arc<dyn ConnectivityValidator>,
    prober: Prober,
    progress: Arc<dyn ProgressSink>,
}

impl Installer {
    pub fn new(
        config: SetupConfig,
        packages: Arc<dyn PackageManager>,
        resources: Arc<dyn ResourceClient>,
        validator: Arc<dyn ConnectivityValidator>,
    ) -> Self {
        Self {
            config,
            packages,
            resources,
            validator,
            prober: Prober::new(),
            progress: Arc::new(SilentProgress),
        }
    }

    pub fn with_progress(mut self, progress: Arc<dyn ProgressSink>) -> Self {
        self.progress = progress;
        self
    }

    pub fn with_prober(mut self, prober: Prober) -> Self {
        self.prober = prober;
        self
    }

    /// Run the workflow and return a fresh status snapshot.
    ///
    /// Credentials are borrowed only to render the Secret manifest and to
    /// hand to the connectivity validator; nothing retains them.
    pub async fn install(
        &self,
        credentials: &Credentials,
        opts: &InstallOptions,
    ) -> std::result::Result<InstallationStatus, InstallError> {
        self.step(InstallStep::Repository, self.ensure_repository(opts))
            .await?;
        self.step(InstallStep::CorePackage, self.ensure_release(opts))
            .await?;
        self.step(InstallStep::CoreReady, self.wait_core_ready())
            .await?;
        self.step(InstallStep::Provider, self.ensure_provider(opts))
            .await?;
        self.step(InstallStep::ProviderReady, self.wait_provider_ready())
            .await?;
        self.step(
            InstallStep::Credentials,
            self.ensure_credentials_secret(credentials),
        )
        .await?;
        self.step(InstallStep::ProviderConfig, self.ensure_provider_config())
            .await?;
        self.step(
            InstallStep::ProviderConfigReady,
            self.wait_provider_config_ready(),
        )
        .await?;
        self.step(
            InstallStep::Connectivity,
            self.validate_connectivity(credentials),
        )
        .await?;

        Ok(self.aggregator().status().await)
    }

    async fn step<F>(&self, step: InstallStep, action: F) -> std::result::Result<(), InstallError>
    where
        F: Future<Output = Result<()>>,
    {
        match action.await {
            Ok(()) => Ok(()),
            Err(source) => {
                self.progress.step_failed(step.as_str(), &source.to_string());
                tracing::debug!(step = step.as_str(), error = %source, "install halted");
                Err(InstallError { step, source })
            }
        }
    }

    fn aggregator(&self) -> StatusAggregator {
        StatusAggregator::new(
            self.config.clone(),
            Arc::clone(&self.packages),
            Arc::clone(&self.resources),
        )
    }

    // ========== Step 1: repository registration ==========

    async fn ensure_repository(&self, opts: &InstallOptions) -> Result<()> {
        let step = InstallStep::Repository.as_str();
        let repos = self.packages.repositories().await?;

        match repos.iter().find(|r| r.name == self.config.repository_name) {
            Some(existing) if existing.url == self.config.repository_url => {
                self.progress.step_skipped(step, "already registered");
                return Ok(());
            }
            Some(existing) => {
                if !opts.force_repo_update {
                    return Err(SetupError::RepositoryConflict {
                        name: self.config.repository_name.clone(),
                        existing: existing.url.clone(),
                        requested: self.config.repository_url.clone(),
                    });
                }
                self.progress.step_started(step);
                self.packages
                    .add_repository(
                        &self.config.repository_name,
                        &self.config.repository_url,
                        true,
                    )
                    .await?;
            }
            None => {
                self.progress.step_started(step);
                self.packages
                    .add_repository(
                        &self.config.repository_name,
                        &self.config.repository_url,
                        false,
                    )
                    .await?;
            }
        }

        self.packages.update_repositories().await?;
        self.progress.step_completed(step);
        Ok(())
    }

    // ========== Step 2: package install-or-upgrade ==========

    async fn ensure_release(&self, opts: &InstallOptions) -> Result<()> {
        let step = InstallStep::CorePackage.as_str();
        let existing = self
            .packages
            .release(&self.config.release_name, &self.config.namespace)
            .await?;

        let request = ReleaseRequest {
            release: self.config.release_name.clone(),
            namespace: self.config.namespace.clone(),
            chart: self.config.chart.clone(),
            version: opts.version.clone(),
            create_namespace: true,
        };

        let Some(record) = existing else {
            self.progress.step_started(step);
            self.packages.install(&request).await?;
            self.progress.step_completed(step);
            return Ok(());
        };

        match (&opts.version, &record.chart_version) {
            // No explicit version requested: any existing release satisfies
            // the step.
            (None, _) => {
                self.progress.step_skipped(step, "release already installed");
                Ok(())
            }
            (Some(requested), Some(current)) if requested == current => {
                self.progress
                    .step_skipped(step, &format!("already at {current}"));
                Ok(())
            }
            (Some(requested), current) => {
                if !opts.upgrade {
                    return Err(SetupError::VersionDrift {
                        name: self.config.release_name.clone(),
                        current: current
                            .as_ref()
                            .map(ToString::to_string)
                            .unwrap_or_else(|| "unknown".to_string()),
                        requested: requested.to_string(),
                    });
                }
                self.progress.step_started(step);
                self.packages.upgrade(&request).await?;
                self.progress.step_completed(step);
                Ok(())
            }
        }
    }

    // ========== Step 3: core readiness ==========

    async fn wait_core_ready(&self) -> Result<()> {
        let what = format!("{} pods", self.config.release_name);
        let selector = self.config.pod_selector.clone();
        let namespace = self.config.namespace.clone();
        let resources = Arc::clone(&self.resources);

        self.prober
            .wait_until(
                &what,
                self.config.timeouts.core_ready,
                self.config.timeouts.poll_interval,
                self.progress.as_ref(),
                move || {
                    let resources = Arc::clone(&resources);
                    let selector = selector.clone();
                    let namespace = namespace.clone();
                    async move {
                        let pods = resources.list_pods(&selector, &namespace).await?;
                        Ok(core_readiness(&pods))
                    }
                },
            )
            .await
            .map_err(|e| e.into_setup(&what))?;

        self.progress
            .step_completed(InstallStep::CoreReady.as_str());
        Ok(())
    }

    // ========== Step 4: provider install ==========

    async fn ensure_provider(&self, opts: &InstallOptions) -> Result<()> {
        let step = InstallStep::Provider.as_str();
        let package_ref = self.config.provider_package_ref();
        let existing = self
            .resources
            .get(PROVIDER_KIND, &self.config.provider_name, None)
            .await?;

        if let Some(provider) = &existing {
            match provider_package_of(provider) {
                Some(current) if current == package_ref => {
                    self.progress.step_skipped(step, "provider already installed");
                    return Ok(());
                }
                Some(current) if !opts.upgrade => {
                    return Err(SetupError::VersionDrift {
                        name: self.config.provider_name.clone(),
                        current: current.to_string(),
                        requested: package_ref,
                    });
                }
                // Version change with explicit upgrade intent, or an
                // existing resource without a readable package: apply over
                // it in place.
                _ => {}
            }
        }

        self.progress.step_started(step);
        let manifest = provider_manifest(&self.config)?;
        self.resources.apply(&manifest).await?;
        self.progress.step_completed(step);
        Ok(())
    }

    // ========== Step 5: provider readiness ==========

    async fn wait_provider_ready(&self) -> Result<()> {
        let what = format!("provider '{}'", self.config.provider_name);
        let name = self.config.provider_name.clone();
        let resources = Arc::clone(&self.resources);

        self.prober
            .wait_until(
                &what,
                self.config.timeouts.provider_ready,
                self.config.timeouts.poll_interval,
                self.progress.as_ref(),
                move || {
                    let resources = Arc::clone(&resources);
                    let name = name.clone();
                    async move {
                        let provider = resources.get(PROVIDER_KIND, &name, None).await?;
                        Ok(provider_readiness(provider.as_ref()))
                    }
                },
            )
            .await
            .map_err(|e| e.into_setup(&what))?;

        self.progress
            .step_completed(InstallStep::ProviderReady.as_str());
        Ok(())
    }

    // ========== Step 6: credential materialization ==========

    async fn ensure_credentials_secret(&self, credentials: &Credentials) -> Result<()> {
        let step = InstallStep::Credentials.as_str();
        let desired = credentials.as_ini();

        let existing = self
            .resources
            .get(
                SECRET_KIND,
                &self.config.secret_name,
                Some(&self.config.namespace),
            )
            .await?;
        if let Some(secret) = existing
            && secret_data_matches(&secret, &self.config.secret_key, &desired)
        {
            self.progress.step_skipped(step, "secret up to date");
            return Ok(());
        }

        // Overwrite in place: credentials rotate, and a second secret under
        // another name would be worse than replacing this one.
        self.progress.step_started(step);
        let manifest = secret_manifest(&self.config, credentials)?;
        self.resources.apply(&manifest).await?;
        self.progress.step_completed(step);
        Ok(())
    }

    // ========== Step 7: provider config creation ==========

    async fn ensure_provider_config(&self) -> Result<()> {
        let step = InstallStep::ProviderConfig.as_str();
        let existing = self
            .resources
            .get(PROVIDER_CONFIG_KIND, &self.config.provider_config_name, None)
            .await?;

        if let Some(config) = existing
            && provider_config_matches(
                &config,
                &self.config.namespace,
                &self.config.secret_name,
                &self.config.secret_key,
            )
        {
            self.progress.step_skipped(step, "provider config up to date");
            return Ok(());
        }

        self.progress.step_started(step);
        let manifest = provider_config_manifest(&self.config)?;
        self.resources.apply(&manifest).await?;
        self.progress.step_completed(step);
        Ok(())
    }

    // ========== Step 8: provider config acceptance ==========

    async fn wait_provider_config_ready(&self) -> Result<()> {
        let what = format!("provider config '{}'", self.config.provider_config_name);
        let name = self.config.provider_config_name.clone();
        let resources = Arc::clone(&self.resources);

        self.prober
            .wait_until(
                &what,
                self.config.timeouts.provider_config_ready,
                self.config.timeouts.poll_interval,
                self.progress.as_ref(),
                move || {
                    let resources = Arc::clone(&resources);
                    let name = name.clone();
                    async move {
                        let config = resources.get(PROVIDER_CONFIG_KIND, &name, None).await?;
                        Ok(provider_config_acceptance(config.as_ref()))
                    }
                },
            )
            .await
            .map_err(|e| e.into_setup(&what))?;

        self.progress
            .step_completed(InstallStep::ProviderConfigReady.as_str());
        Ok(())
    }

    // ========== Step 9: connectivity validation ==========

    async fn validate_connectivity(&self, credentials: &Credentials) -> Result<()> {
        let step = InstallStep::Connectivity.as_str();
        self.progress.step_started(step);
        self.validator.validate(credentials).await?;
        self.progress.step_completed(step);
        Ok(())
    }
}

// ========== Readiness predicates ==========

/// Readiness of the core pods as one poll observation
fn core_readiness(pods: &[PodStatus]) -> Poll {
    if pods.is_empty() {
        return Poll::Pending("no pods scheduled yet".to_string());
    }

    for pod in pods {
        if pod.restart_count > RESTART_THRESHOLD {
            return Poll::Failed(format!(
                "pod '{}' is crash-looping ({} restarts)",
                pod.name, pod.restart_count
            ));
        }
        if pod.phase == PodPhase::Failed {
            return Poll::Failed(format!("pod '{}' is in Failed phase", pod.name));
        }
    }

    let ready = pods.iter().filter(|p| p.ready).count();
    if ready == pods.len() {
        Poll::Satisfied
    } else {
        Poll::Pending(format!("{ready}/{} pods ready", pods.len()))
    }
}

/// Readiness of the Provider resource as one poll observation
fn provider_readiness(provider: Option<&Value>) -> Poll {
    let Some(provider) = provider else {
        return Poll::Pending("provider resource not visible yet".to_string());
    };

    let installed = condition_status(provider, "Installed").unwrap_or(false);
    let healthy = condition_status(provider, "Healthy").unwrap_or(false);
    if installed && healthy {
        return Poll::Satisfied;
    }

    let detail = condition_message(provider, "Healthy")
        .or_else(|| condition_message(provider, "Installed"))
        .unwrap_or_else(|| format!("installed={installed}, healthy={healthy}"));
    Poll::Pending(detail)
}

/// Acceptance of the ProviderConfig as one poll observation
fn provider_config_acceptance(config: Option<&Value>) -> Poll {
    let Some(config) = config else {
        return Poll::Pending("provider config not visible yet".to_string());
    };

    match any_false_condition(config) {
        Some((ctype, message)) => Poll::Pending(format!("{ctype}: {message}")),
        None => Poll::Satisfied,
    }
}

// ========== Precondition helpers ==========

/// The package a Provider resource currently points at
fn provider_package_of(provider: &Value) -> Option<&str> {
    provider.pointer("/spec/package").and_then(Value::as_str)
}

/// Whether the stored secret already holds the desired credentials block
fn secret_data_matches(secret: &Value, key: &str, desired: &str) -> bool {
    // The API server stores base64 under `data`; an unapplied manifest
    // would still carry `stringData`.
    if let Some(encoded) = secret.pointer(&format!("/data/{key}")).and_then(Value::as_str)
        && let Ok(decoded) = BASE64.decode(encoded)
    {
        return decoded == desired.as_bytes();
    }
    secret
        .pointer(&format!("/stringData/{key}"))
        .and_then(Value::as_str)
        .is_some_and(|s| s == desired)
}

/// Whether an existing ProviderConfig already references our secret
fn provider_config_matches(config: &Value, namespace: &str, name: &str, key: &str) -> bool {
    let secret_ref = config.pointer("/spec/credentials/secretRef");
    let field = |f: &str| {
        secret_ref
            .and_then(|r| r.get(f))
            .and_then(Value::as_str)
            .unwrap_or_default()
    };
    config
        .pointer("/spec/credentials/source")
        .and_then(Value::as_str)
        == Some("Secret")
        && field("namespace") == namespace
        && field("name") == name
        && field("key") == key
}

// ========== Manifests ==========

fn provider_manifest(config: &SetupConfig) -> Result<String> {
    let value = serde_json::json!({
        "apiVersion": "pkg.crossplane.io/v1",
        "kind": "Provider",
        "metadata": { "name": config.provider_name },
        "spec": { "package": config.provider_package_ref() }
    });
    Ok(serde_yaml::to_string(&value)?)
}

fn secret_manifest(config: &SetupConfig, credentials: &Credentials) -> Result<String> {
    let mut string_data = serde_json::Map::new();
    string_data.insert(
        config.secret_key.clone(),
        Value::String(credentials.as_ini()),
    );
    let value = serde_json::json!({
        "apiVersion": "v1",
        "kind": "Secret",
        "metadata": {
            "name": config.secret_name,
            "namespace": config.namespace
        },
        "type": "Opaque",
        "stringData": string_data
    });
    Ok(serde_yaml::to_string(&value)?)
}

fn provider_config_manifest(config: &SetupConfig) -> Result<String> {
    let value = serde_json::json!({
        "apiVersion": "aws.upbound.io/v1beta1",
        "kind": "ProviderConfig",
        "metadata": { "name": config.provider_config_name },
        "spec": {
            "credentials": {
                "source": "Secret",
                "secretRef": {
                    "namespace": config.namespace,
                    "name": config.secret_name,
                    "key": config.secret_key
                }
            }
        }
    });
    Ok(serde_yaml::to_string(&value)?)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::helm::HelmRepository;
    use crate::mock::{FakeClock, MockPackageManager, MockResourceClient, MockValidator};
    use semver::Version;

    struct Harness {
        installer: Installer,
        packages: MockPackageManager,
        resources: MockResourceClient,
        validator: MockValidator,
    }

    fn harness() -> Harness {
        let packages = MockPackageManager::new();
        let resources = MockResourceClient::new();
        let validator = MockValidator::new();
        let prober = Prober::with_clock(Arc::new(FakeClock::new()));
        let installer = Installer::new(
            SetupConfig::default(),
            Arc::new(packages.clone()),
            Arc::new(resources.clone()),
            Arc::new(validator.clone()),
        )
        .with_prober(prober);

        Harness {
            installer,
            packages,
            resources,
            validator,
        }
    }

    /// A harness whose cluster schedules ready pods as soon as asked
    fn healthy_harness() -> Harness {
        let h = harness();
        h.resources.set_pods(vec![
            MockResourceClient::ready_pod("crossplane-7d4f"),
            MockResourceClient::ready_pod("crossplane-rbac-9k2x"),
        ]);
        h
    }

    fn credentials() -> Credentials {
        Credentials::new("AKIAEXAMPLE", "secret123", "us-east-1")
    }

    #[tokio::test]
    async fn test_fresh_install_runs_all_steps() {
        let h = healthy_harness();
        let status = h
            .installer
            .install(&credentials(), &InstallOptions::default())
            .await
            .unwrap();

        let pm = h.packages.counts();
        assert_eq!(pm.repo_adds, 1);
        assert_eq!(pm.installs, 1);
        assert_eq!(pm.upgrades, 0);

        // Provider, secret, and provider config were each applied once.
        assert_eq!(h.resources.counts().applies, 3);
        assert_eq!(h.validator.validations(), 1);

        assert!(status.installed);
        assert!(status.ready);
        assert!(status.provider_ready);
        assert!(status.provider_config_exists);
        assert!(status.healthy(), "issues: {:?}", status.issues);
        assert!(status.is_consistent());
    }

    #[tokio::test]
    async fn test_second_install_performs_no_mutations() {
        let h = healthy_harness();
        let opts = InstallOptions::default();

        let first = h.installer.install(&credentials(), &opts).await.unwrap();
        let pm_after_first = h.packages.counts();
        let rc_after_first = h.resources.counts();

        let second = h.installer.install(&credentials(), &opts).await.unwrap();
        let pm = h.packages.counts();
        let rc = h.resources.counts();

        // Identical status, zero mutating calls the second time around.
        assert_eq!(first, second);
        assert_eq!(pm.repo_adds, pm_after_first.repo_adds);
        assert_eq!(pm.installs, pm_after_first.installs);
        assert_eq!(pm.upgrades, 0);
        assert_eq!(rc.applies, rc_after_first.applies);
    }

    #[tokio::test]
    async fn test_fail_fast_skips_later_steps() {
        let h = healthy_harness();
        h.resources.reject_apply("Provider");

        let err = h
            .installer
            .install(&credentials(), &InstallOptions::default())
            .await
            .unwrap_err();

        assert_eq!(err.step, InstallStep::Provider);
        assert!(matches!(err.source, SetupError::ResourceRejected { .. }));

        // Steps after the failing one were never attempted.
        assert!(!h.resources.has_object("secret", "aws-credentials"));
        assert!(!h.resources.has_object("providerconfigs.aws.upbound.io", "default"));
        assert_eq!(h.validator.validations(), 0);
    }

    #[tokio::test]
    async fn test_resume_after_partial_failure_matches_clean_install() {
        let broken = healthy_harness();
        broken.resources.reject_apply("Secret");

        let err = broken
            .installer
            .install(&credentials(), &InstallOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.step, InstallStep::Credentials);

        // The operator fixes the cluster and retries.
        broken.resources.clear_apply_rejection("Secret");
        let resumed = broken
            .installer
            .install(&credentials(), &InstallOptions::default())
            .await
            .unwrap();

        // Earlier steps were not re-executed as mutating calls.
        let pm = broken.packages.counts();
        assert_eq!(pm.repo_adds, 1);
        assert_eq!(pm.installs, 1);

        // The end state is the same as a run with no injected failure.
        let clean = healthy_harness();
        let reference = clean
            .installer
            .install(&credentials(), &InstallOptions::default())
            .await
            .unwrap();
        assert_eq!(resumed, reference);
    }

    #[tokio::test]
    async fn test_existing_release_at_requested_version_is_skipped() {
        let h = healthy_harness();
        h.packages.set_release(Some(MockPackageManager::deployed_record(
            "crossplane",
            "crossplane-system",
            "1.15.0",
        )));

        let opts = InstallOptions {
            version: Some(Version::new(1, 15, 0)),
            ..Default::default()
        };
        let status = h.installer.install(&credentials(), &opts).await.unwrap();

        // Step 2 was a no-op...
        let pm = h.packages.counts();
        assert_eq!(pm.installs, 0);
        assert_eq!(pm.upgrades, 0);

        // ...but steps 3-9 still executed and readiness was evaluated.
        assert!(h.resources.counts().pod_lists > 0);
        assert_eq!(h.validator.validations(), 1);
        assert!(status.ready);
    }

    #[tokio::test]
    async fn test_version_drift_requires_explicit_upgrade() {
        let h = healthy_harness();
        h.packages.set_release(Some(MockPackageManager::deployed_record(
            "crossplane",
            "crossplane-system",
            "1.14.0",
        )));

        let opts = InstallOptions {
            version: Some(Version::new(1, 15, 0)),
            ..Default::default()
        };
        let err = h.installer.install(&credentials(), &opts).await.unwrap_err();
        assert_eq!(err.step, InstallStep::CorePackage);
        match &err.source {
            SetupError::VersionDrift { current, requested, .. } => {
                assert_eq!(current, "1.14.0");
                assert_eq!(requested, "1.15.0");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(h.packages.counts().upgrades, 0);

        // With the explicit flag the same drift becomes an upgrade.
        let opts = InstallOptions {
            version: Some(Version::new(1, 15, 0)),
            upgrade: true,
            ..Default::default()
        };
        h.installer.install(&credentials(), &opts).await.unwrap();
        let pm = h.packages.counts();
        assert_eq!(pm.upgrades, 1);
        assert_eq!(pm.installs, 0);
    }

    #[tokio::test]
    async fn test_repository_url_change_requires_force() {
        let h = healthy_harness();
        h.packages.set_repositories(vec![HelmRepository {
            name: "crossplane-stable".to_string(),
            url: "https://charts.example.com/old".to_string(),
        }]);

        let err = h
            .installer
            .install(&credentials(), &InstallOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.step, InstallStep::Repository);
        assert!(matches!(err.source, SetupError::RepositoryConflict { .. }));
        assert_eq!(h.packages.counts().repo_adds, 0);

        let opts = InstallOptions {
            force_repo_update: true,
            ..Default::default()
        };
        h.installer.install(&credentials(), &opts).await.unwrap();
        assert_eq!(h.packages.counts().repo_adds, 1);
    }

    #[tokio::test]
    async fn test_crash_looping_pod_fails_fast() {
        let h = harness();
        h.resources.set_pods(vec![
            MockResourceClient::ready_pod("crossplane-ok"),
            MockResourceClient::crash_looping_pod("crossplane-bad", 7),
        ]);

        let err = h
            .installer
            .install(&credentials(), &InstallOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.step, InstallStep::CoreReady);
        match &err.source {
            SetupError::NotReady { detail, .. } => {
                assert!(detail.contains("crash-looping"));
                assert!(detail.contains("crossplane-bad"));
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_core_ready_timeout_reports_last_observation() {
        let h = harness();
        h.resources.set_pods(vec![
            MockResourceClient::ready_pod("crossplane-ok"),
            MockResourceClient::pending_pod("crossplane-slow"),
        ]);

        let err = h
            .installer
            .install(&credentials(), &InstallOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.step, InstallStep::CoreReady);
        match &err.source {
            SetupError::NotReady { detail, waited_secs, .. } => {
                assert_eq!(detail, "1/2 pods ready");
                assert!(*waited_secs >= 300);
            }
            other => panic!("unexpected error: {other}"),
        }
    }

    #[tokio::test]
    async fn test_rotated_credentials_overwrite_in_place() {
        let h = healthy_harness();
        h.installer
            .install(&credentials(), &InstallOptions::default())
            .await
            .unwrap();
        let applies_before = h.resources.counts().applies;

        let rotated = Credentials::new("AKIAROTATED", "newsecret", "us-east-1");
        h.installer
            .install(&rotated, &InstallOptions::default())
            .await
            .unwrap();

        // Exactly one more apply: the secret, updated in place.
        assert_eq!(h.resources.counts().applies, applies_before + 1);
        let secret = h.resources.object("secret", "aws-credentials").unwrap();
        let encoded = secret.pointer("/data/creds").and_then(Value::as_str).unwrap();
        let decoded = BASE64.decode(encoded).unwrap();
        assert!(String::from_utf8_lossy(&decoded).contains("AKIAROTATED"));
    }

    #[tokio::test]
    async fn test_provider_package_change_requires_upgrade_flag() {
        let h = healthy_harness();
        h.resources.set_object(
            PROVIDER_KIND,
            "provider-aws-s3",
            serde_json::json!({
                "spec": { "package": "xpkg.upbound.io/upbound/provider-aws-s3:v1.0.0" },
                "status": { "conditions": [
                    { "type": "Installed", "status": "True" },
                    { "type": "Healthy", "status": "True" }
                ]}
            }),
        );

        let err = h
            .installer
            .install(&credentials(), &InstallOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.step, InstallStep::Provider);
        assert!(matches!(err.source, SetupError::VersionDrift { .. }));

        let opts = InstallOptions {
            upgrade: true,
            ..Default::default()
        };
        h.installer.install(&credentials(), &opts).await.unwrap();
        let provider = h.resources.object(PROVIDER_KIND, "provider-aws-s3").unwrap();
        assert_eq!(
            provider_package_of(&provider),
            Some("xpkg.upbound.io/upbound/provider-aws-s3:v1.1.0")
        );
    }

    #[tokio::test]
    async fn test_connectivity_failure_is_a_credentials_problem() {
        let h = healthy_harness();
        h.validator.fail_validation();

        let err = h
            .installer
            .install(&credentials(), &InstallOptions::default())
            .await
            .unwrap_err();
        assert_eq!(err.step, InstallStep::Connectivity);
        // Distinguished from installation problems by its kind.
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }

    #[test]
    fn test_core_readiness_predicate() {
        assert_eq!(
            core_readiness(&[]),
            Poll::Pending("no pods scheduled yet".to_string())
        );

        let pods = vec![
            MockResourceClient::ready_pod("a"),
            MockResourceClient::pending_pod("b"),
        ];
        assert_eq!(core_readiness(&pods), Poll::Pending("1/2 pods ready".to_string()));

        let pods = vec![MockResourceClient::ready_pod("a"), MockResourceClient::ready_pod("b")];
        assert_eq!(core_readiness(&pods), Poll::Satisfied);

        let pods = vec![MockResourceClient::crash_looping_pod("c", 9)];
        assert!(matches!(core_readiness(&pods), Poll::Failed(_)));

        // Restarts at the threshold are still tolerated.
        let pods = vec![MockResourceClient::crash_looping_pod("c", RESTART_THRESHOLD)];
        assert!(matches!(core_readiness(&pods), Poll::Pending(_)));
    }

    #[test]
    fn test_provider_readiness_predicate() {
        assert!(matches!(provider_readiness(None), Poll::Pending(_)));

        let unhealthy = serde_json::json!({
            "status": { "conditions": [
                { "type": "Installed", "status": "True" },
                { "type": "Healthy", "status": "False", "message": "pulling package" }
            ]}
        });
        assert_eq!(
            provider_readiness(Some(&unhealthy)),
            Poll::Pending("pulling package".to_string())
        );

        let healthy = serde_json::json!({
            "status": { "conditions": [
                { "type": "Installed", "status": "True" },
                { "type": "Healthy", "status": "True" }
            ]}
        });
        assert_eq!(provider_readiness(Some(&healthy)), Poll::Satisfied);
    }

    #[test]
    fn test_manifests_render() {
        let config = SetupConfig::default();

        let provider = provider_manifest(&config).unwrap();
        assert!(provider.contains("kind: Provider"));
        assert!(provider.contains("xpkg.upbound.io/upbound/provider-aws-s3:v1.1.0"));

        let secret = secret_manifest(&config, &credentials()).unwrap();
        let parsed: Value = serde_yaml::from_str(&secret).unwrap();
        assert_eq!(parsed["kind"], "Secret");
        assert_eq!(parsed["metadata"]["namespace"], "crossplane-system");
        assert!(
            parsed["stringData"]["creds"]
                .as_str()
                .unwrap()
                .contains("aws_access_key_id = AKIAEXAMPLE")
        );

        let pc = provider_config_manifest(&config).unwrap();
        let parsed: Value = serde_yaml::from_str(&pc).unwrap();
        assert_eq!(parsed["kind"], "ProviderConfig");
        assert_eq!(
            parsed["spec"]["credentials"]["secretRef"]["name"],
            "aws-credentials"
        );
    }

    #[test]
    fn test_secret_data_matches_handles_both_shapes() {
        let desired = "[default]\naws_access_key_id = A\n";

        let api_server_shape = serde_json::json!({
            "data": { "creds": BASE64.encode(desired) }
        });
        assert!(secret_data_matches(&api_server_shape, "creds", desired));
        assert!(!secret_data_matches(&api_server_shape, "creds", "other"));

        let manifest_shape = serde_json::json!({
            "stringData": { "creds": desired }
        });
        assert!(secret_data_matches(&manifest_shape, "creds", desired));
    }

    #[test]
    fn test_provider_config_matches() {
        let config = serde_json::json!({
            "spec": { "credentials": {
                "source": "Secret",
                "secretRef": {
                    "namespace": "crossplane-system",
                    "name": "aws-credentials",
                    "key": "creds"
                }
            }}
        });
        assert!(provider_config_matches(
            &config,
            "crossplane-system",
            "aws-credentials",
            "creds"
        ));
        assert!(!provider_config_matches(
            &config,
            "crossplane-system",
            "other-secret",
            "creds"
        ));
    }

    #[test]
    fn test_install_error_carries_step_and_suggestions() {
        let err = InstallError {
            step: InstallStep::CorePackage,
            source: SetupError::VersionDrift {
                name: "crossplane".to_string(),
                current: "1.14.0".to_string(),
                requested: "1.15.0".to_string(),
            },
        };
        assert!(err.to_string().contains("core package install"));
        assert!(!err.suggestions().is_empty());
        assert_eq!(err.kind(), ErrorKind::Configuration);
    }

    #[test]
    fn test_step_order_is_stable() {
        assert_eq!(InstallStep::ALL.len(), 9);
        assert_eq!(InstallStep::ALL[0], InstallStep::Repository);
        assert_eq!(InstallStep::ALL[8], InstallStep::Connectivity);
    }
}
