//! Error taxonomy for planeup operations
//!
//! Every error carries a message, a kind, and zero or more remediation
//! suggestions. Prerequisite and configuration errors always carry at least
//! one suggestion; the CLI boundary renders them, nothing in this crate
//! prints anything.

use thiserror::Error;

/// Result type for planeup operations
pub type Result<T> = std::result::Result<T, SetupError>;

/// Broad classification of a failure, used for exit codes and rendering
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// An external dependency (command, cluster) is missing or unreachable
    Prerequisite,

    /// Required input (credentials, configuration) is missing or invalid
    Configuration,

    /// An external command executed but failed
    Command,

    /// The cluster rejected a resource or never reached the declared state
    Validation,
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Prerequisite => write!(f, "prerequisite"),
            Self::Configuration => write!(f, "configuration"),
            Self::Command => write!(f, "command"),
            Self::Validation => write!(f, "validation"),
        }
    }
}

/// Narrower classification of a failed external command
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CommandFailure {
    /// The program itself could not be found
    NotFound,

    /// The command ran past its timeout
    Timeout,

    /// The command lost a conflict (resource already exists, lock held)
    Conflict,

    /// Anything else
    Other,
}

impl CommandFailure {
    /// Classify a non-zero exit from captured stderr.
    ///
    /// kubectl and helm both put the API reason ("AlreadyExists",
    /// "Conflict") into stderr, so a substring check is enough here.
    pub fn classify(stderr: &str) -> Self {
        let lowered = stderr.to_lowercase();
        if lowered.contains("alreadyexists") || lowered.contains("conflict") {
            Self::Conflict
        } else if lowered.contains("timed out") || lowered.contains("timeout") {
            Self::Timeout
        } else if lowered.contains("not found") && lowered.contains("command") {
            Self::NotFound
        } else {
            Self::Other
        }
    }
}

/// Errors that can occur while bootstrapping or tearing down the environment
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum SetupError {
    /// A required external program is not installed
    #[error("required command '{program}' was not found on PATH")]
    MissingCommand { program: String },

    /// The target cluster did not answer
    #[error("cluster '{context}' is unreachable: {detail}")]
    ClusterUnreachable { context: String, detail: String },

    /// No credentials could be located
    #[error("credentials file not found at {path}")]
    MissingCredentials { path: String },

    /// Credentials were located but unusable
    #[error("invalid credentials: {detail}")]
    InvalidCredentials { detail: String },

    /// Invalid configuration input
    #[error("invalid configuration: {message}")]
    InvalidConfig { message: String },

    /// The release (or provider package) exists at another version and no
    /// explicit upgrade was requested
    #[error("'{name}' is at version {current} but {requested} was requested")]
    VersionDrift {
        name: String,
        current: String,
        requested: String,
    },

    /// The chart repository is registered under the same name with a
    /// different URL
    #[error("repository '{name}' already points at {existing}, not {requested}")]
    RepositoryConflict {
        name: String,
        existing: String,
        requested: String,
    },

    /// An external command exited non-zero
    #[error("'{program}' exited with code {exit_code}: {stderr}")]
    CommandFailed {
        program: String,
        exit_code: i32,
        stderr: String,
        failure: CommandFailure,
    },

    /// An external command ran past its deadline
    #[error("'{program}' timed out after {timeout_secs}s")]
    CommandTimeout { program: String, timeout_secs: u64 },

    /// The cluster rejected a resource (schema or admission failure)
    #[error("{kind} '{name}' was rejected by the cluster: {detail}")]
    ResourceRejected {
        kind: String,
        name: String,
        detail: String,
    },

    /// A readiness wait ran out of time; `detail` is the last observation
    #[error("{what} not ready after {waited_secs}s: {detail}")]
    NotReady {
        what: String,
        waited_secs: i64,
        detail: String,
    },

    /// Output of an external command could not be parsed
    #[error("could not parse output of '{program}': {detail}")]
    MalformedOutput { program: String, detail: String },

    /// The operation was cancelled by the user
    #[error("operation interrupted")]
    Interrupted,

    /// IO error
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<serde_yaml::Error> for SetupError {
    fn from(e: serde_yaml::Error) -> Self {
        SetupError::InvalidConfig {
            message: e.to_string(),
        }
    }
}

impl SetupError {
    /// Shorthand for an `InvalidConfig` error
    pub fn invalid_config(message: impl Into<String>) -> Self {
        SetupError::InvalidConfig {
            message: message.into(),
        }
    }

    /// The taxonomy kind of this error
    pub fn kind(&self) -> ErrorKind {
        match self {
            SetupError::MissingCommand { .. } | SetupError::ClusterUnreachable { .. } => {
                ErrorKind::Prerequisite
            }
            SetupError::MissingCredentials { .. }
            | SetupError::InvalidCredentials { .. }
            | SetupError::InvalidConfig { .. }
            | SetupError::VersionDrift { .. }
            | SetupError::RepositoryConflict { .. }
            | SetupError::Io(_) => ErrorKind::Configuration,
            SetupError::CommandFailed { .. }
            | SetupError::CommandTimeout { .. }
            | SetupError::Interrupted => ErrorKind::Command,
            SetupError::ResourceRejected { .. }
            | SetupError::NotReady { .. }
            | SetupError::MalformedOutput { .. } => ErrorKind::Validation,
        }
    }

    /// Actionable remediation suggestions for this error.
    ///
    /// Prerequisite and configuration errors always return at least one
    /// entry; the others return whatever is genuinely actionable.
    pub fn suggestions(&self) -> Vec<String> {
        match self {
            SetupError::MissingCommand { program } => {
                let mut out = vec![match program.as_str() {
                    "helm" => "Install helm: https://helm.sh/docs/intro/install/".to_string(),
                    "kubectl" => {
                        "Install kubectl: https://kubernetes.io/docs/tasks/tools/".to_string()
                    }
                    "aws" => {
                        "Install the AWS CLI: https://docs.aws.amazon.com/cli/latest/userguide/getting-started-install.html"
                            .to_string()
                    }
                    other => format!("Install '{other}' and ensure it is on your PATH"),
                }];
                out.push("Re-run once the command is available".to_string());
                out
            }
            SetupError::ClusterUnreachable { context, .. } => vec![
                format!("Check that the cluster behind context '{context}' is running"),
                "Run 'kubectl cluster-info' to verify connectivity".to_string(),
            ],
            SetupError::MissingCredentials { path } => vec![
                format!("Create {path} with a [default] profile"),
                "Or export AWS_ACCESS_KEY_ID, AWS_SECRET_ACCESS_KEY and AWS_DEFAULT_REGION"
                    .to_string(),
                "Or pass --credentials-file to use a different location".to_string(),
            ],
            SetupError::InvalidCredentials { .. } => vec![
                "Check the selected profile for aws_access_key_id and aws_secret_access_key"
                    .to_string(),
            ],
            SetupError::InvalidConfig { .. } => {
                vec!["Check the configuration file passed via --config".to_string()]
            }
            SetupError::VersionDrift { .. } => {
                vec!["Re-run with --upgrade to move to the requested version".to_string()]
            }
            SetupError::RepositoryConflict { .. } => {
                vec!["Re-run with --force-repo-update to replace the repository URL".to_string()]
            }
            SetupError::CommandFailed { failure, .. } => match failure {
                CommandFailure::Conflict => vec![
                    "Another process may be operating on the release; retry once it finishes"
                        .to_string(),
                ],
                _ => vec!["Re-run with --debug to see the full command output".to_string()],
            },
            SetupError::CommandTimeout { .. } => vec![
                "The cluster may be slow; retry, or raise the command timeout in the configuration"
                    .to_string(),
            ],
            SetupError::ResourceRejected { kind, name, .. } => {
                vec![format!("Inspect the resource with 'kubectl describe {kind} {name}'")]
            }
            SetupError::NotReady { .. } => vec![
                "Inspect pod state with 'kubectl get pods' and 'kubectl describe'".to_string(),
                "A re-run resumes from this step once the cluster settles".to_string(),
            ],
            SetupError::MalformedOutput { program, .. } => vec![format!(
                "Check that the installed '{program}' supports JSON output (-o json)"
            )],
            SetupError::Io(_) => {
                vec!["Check that the file exists and is readable".to_string()]
            }
            SetupError::Interrupted => Vec::new(),
        }
    }

    /// True when this error came from a cancelled wait or command
    pub fn is_interrupted(&self) -> bool {
        matches!(self, SetupError::Interrupted)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_command_failure_classification() {
        assert_eq!(
            CommandFailure::classify("Error: secrets \"aws-credentials\" AlreadyExists"),
            CommandFailure::Conflict
        );
        assert_eq!(
            CommandFailure::classify("Operation cannot be fulfilled: Conflict"),
            CommandFailure::Conflict
        );
        assert_eq!(
            CommandFailure::classify("Error: request timed out waiting for condition"),
            CommandFailure::Timeout
        );
        assert_eq!(CommandFailure::classify("no such host"), CommandFailure::Other);
    }

    #[test]
    fn test_kinds() {
        let err = SetupError::MissingCommand {
            program: "helm".to_string(),
        };
        assert_eq!(err.kind(), ErrorKind::Prerequisite);

        let err = SetupError::MissingCredentials {
            path: "/home/u/.aws/credentials".to_string(),
        };
        assert_eq!(err.kind(), ErrorKind::Configuration);

        let err = SetupError::CommandFailed {
            program: "helm".to_string(),
            exit_code: 1,
            stderr: "boom".to_string(),
            failure: CommandFailure::Other,
        };
        assert_eq!(err.kind(), ErrorKind::Command);

        let err = SetupError::ResourceRejected {
            kind: "ProviderConfig".to_string(),
            name: "default".to_string(),
            detail: "unknown field".to_string(),
        };
        assert_eq!(err.kind(), ErrorKind::Validation);
    }

    #[test]
    fn test_prerequisite_and_configuration_always_carry_suggestions() {
        let errors = vec![
            SetupError::MissingCommand {
                program: "helm".to_string(),
            },
            SetupError::ClusterUnreachable {
                context: "kind-planeup".to_string(),
                detail: "connection refused".to_string(),
            },
            SetupError::MissingCredentials {
                path: "~/.aws/credentials".to_string(),
            },
            SetupError::InvalidCredentials {
                detail: "missing key".to_string(),
            },
            SetupError::invalid_config("bad namespace"),
            SetupError::VersionDrift {
                name: "crossplane".to_string(),
                current: "1.14.0".to_string(),
                requested: "1.15.0".to_string(),
            },
            SetupError::RepositoryConflict {
                name: "crossplane-stable".to_string(),
                existing: "https://a".to_string(),
                requested: "https://b".to_string(),
            },
        ];

        for err in errors {
            assert!(
                matches!(err.kind(), ErrorKind::Prerequisite | ErrorKind::Configuration),
                "unexpected kind for {err}"
            );
            assert!(!err.suggestions().is_empty(), "no suggestion for {err}");
        }
    }

    #[test]
    fn test_known_command_suggestions_name_an_installer() {
        let err = SetupError::MissingCommand {
            program: "kubectl".to_string(),
        };
        assert!(err.suggestions()[0].contains("kubernetes.io"));

        let err = SetupError::MissingCommand {
            program: "helm".to_string(),
        };
        assert!(err.suggestions()[0].contains("helm.sh"));
    }

    #[test]
    fn test_not_ready_keeps_last_detail_in_message() {
        let err = SetupError::NotReady {
            what: "crossplane pods".to_string(),
            waited_secs: 300,
            detail: "2/3 pods ready".to_string(),
        };
        assert!(err.to_string().contains("2/3 pods ready"));
    }
}
