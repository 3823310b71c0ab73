//! CLI error types with exit code handling
//!
//! Core errors carry their kind and suggestions; this module maps them onto
//! miette diagnostics (suggestions become help text) and exit codes. The
//! CLI boundary is the only place errors are rendered to a human.

use miette::Diagnostic;
use thiserror::Error;

use planeup_core::{ErrorKind, SetupError};
use planeup_kube::InstallError;

use crate::exit_codes;

/// Result type for CLI operations
pub type Result<T> = std::result::Result<T, CliError>;

/// CLI-specific error type that includes exit code information
#[derive(Error, Debug, Diagnostic)]
pub enum CliError {
    /// A required command or the cluster is missing
    #[error("{message}")]
    #[diagnostic(code(planeup::prerequisite))]
    Prerequisite {
        message: String,
        #[help]
        help: Option<String>,
    },

    /// Credentials or configuration missing or invalid
    #[error("{message}")]
    #[diagnostic(code(planeup::configuration))]
    Configuration {
        message: String,
        #[help]
        help: Option<String>,
    },

    /// An external command executed but failed
    #[error("{message}")]
    #[diagnostic(code(planeup::command))]
    Command {
        message: String,
        #[help]
        help: Option<String>,
    },

    /// The cluster rejected a resource or never reached the declared state
    #[error("{message}")]
    #[diagnostic(code(planeup::validation))]
    Validation {
        message: String,
        #[help]
        help: Option<String>,
    },

    /// Teardown finished but some steps failed
    #[error("teardown left {failed} step(s) incomplete")]
    #[diagnostic(
        code(planeup::teardown),
        help("Re-run 'planeup down' once the cluster settles, or remove the reported resources by hand")
    )]
    TeardownIncomplete { failed: usize },

    /// The operation was cancelled by the user
    #[error("operation interrupted")]
    #[diagnostic(code(planeup::interrupted))]
    Interrupted,
}

impl CliError {
    /// Get the exit code for this error
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::Prerequisite { .. } => exit_codes::PREREQUISITE_ERROR,
            CliError::Configuration { .. } => exit_codes::CONFIGURATION_ERROR,
            CliError::Command { .. } => exit_codes::COMMAND_ERROR,
            CliError::Validation { .. } => exit_codes::VALIDATION_ERROR,
            CliError::TeardownIncomplete { .. } => exit_codes::ERROR,
            CliError::Interrupted => exit_codes::INTERRUPTED,
        }
    }

    fn from_kind(kind: ErrorKind, message: String, help: Option<String>) -> Self {
        match kind {
            ErrorKind::Prerequisite => CliError::Prerequisite { message, help },
            ErrorKind::Configuration => CliError::Configuration { message, help },
            ErrorKind::Command => CliError::Command { message, help },
            ErrorKind::Validation => CliError::Validation { message, help },
        }
    }

    fn help_from(suggestions: Vec<String>) -> Option<String> {
        if suggestions.is_empty() {
            None
        } else {
            Some(suggestions.join("\n"))
        }
    }
}

impl From<SetupError> for CliError {
    fn from(err: SetupError) -> Self {
        if err.is_interrupted() {
            return CliError::Interrupted;
        }
        Self::from_kind(
            err.kind(),
            err.to_string(),
            Self::help_from(err.suggestions()),
        )
    }
}

impl From<InstallError> for CliError {
    fn from(err: InstallError) -> Self {
        if err.source.is_interrupted() {
            return CliError::Interrupted;
        }
        // The failing step name travels in the message; the kind keeps its
        // exit code.
        Self::from_kind(
            err.kind(),
            err.to_string(),
            Self::help_from(err.suggestions()),
        )
    }
}
