//! Planeup Kube - cluster integration for the Crossplane bootstrapper
//!
//! This crate provides:
//! - **Command Execution**: a single subprocess seam behind `CommandExecutor`
//! - **Resource Client**: kubectl-backed reads, applies, and deletes
//! - **Package Manager**: helm-backed repository and release management
//! - **Readiness Prober**: poll-until-satisfied with fast failure and
//!   last-observation retention
//! - **Install Orchestrator**: the nine-step idempotent bootstrap workflow
//! - **Uninstall Orchestrator**: best-effort reverse-order teardown
//! - **Status Aggregator**: live, never-cached installation snapshots
//! - **Mocks**: in-memory collaborators with operation counts for tests

pub mod exec;
pub mod helm;
pub mod install;
pub mod mock;
pub mod probe;
pub mod progress;
pub mod resource;
pub mod status;
pub mod uninstall;
pub mod validate;

pub use exec::{CommandExecutor, CommandOutput, CommandSpec, ProcessExecutor};
pub use helm::{
    HelmCli, HelmRepository, PackageManager, ReleaseRecord, ReleaseRequest, ReleaseStatus,
    UninstallOutcome,
};
pub use install::{InstallError, InstallOptions, InstallStep, Installer};
pub use mock::{
    FakeClock, MockPackageManager, MockResourceClient, MockValidator, PackageManagerCounts,
    ResourceClientCounts,
};
pub use probe::{CancelFlag, Clock, Poll, Prober, SystemClock, WaitError};
pub use progress::{ConsoleProgress, ProgressSink, SilentProgress};
pub use resource::{
    DeleteOutcome, KubectlClient, PodPhase, PodStatus, ResourceClient, condition_message,
    condition_status,
};
pub use status::StatusAggregator;
pub use uninstall::{CleanupEntry, CleanupOutcome, CleanupReport, CleanupStep, Uninstaller};
pub use validate::{ConnectivityValidator, StsValidator};
