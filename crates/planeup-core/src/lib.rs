//! Planeup Core - Core types for the Crossplane local-environment bootstrapper
//!
//! This crate provides the foundational types used throughout planeup:
//! - `SetupError`: The error taxonomy with kinds and remediation suggestions
//! - `Credentials`: Cloud credentials and their file/environment sources
//! - `InstallationStatus`: The live, never-cached installation snapshot
//! - `SetupConfig`: Names, packages, and per-step timeouts for the workflow

pub mod config;
pub mod credentials;
pub mod error;
pub mod status;

pub use config::{ClusterContext, SetupConfig, StepTimeouts};
pub use credentials::{CredentialSource, Credentials, CredentialsFile, EnvCredentials};
pub use error::{CommandFailure, ErrorKind, Result, SetupError};
pub use status::InstallationStatus;
