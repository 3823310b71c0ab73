//! External command execution
//!
//! Everything planeup does to a cluster goes through an external program
//! (kubectl, helm, aws). `CommandExecutor` is the single seam: the real
//! implementation spawns processes, the mocks replay canned output.

use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::io::AsyncWriteExt;

use planeup_core::{CommandFailure, Result, SetupError};

/// A single external command invocation
#[derive(Debug, Clone)]
pub struct CommandSpec {
    pub program: String,
    pub args: Vec<String>,
    pub envs: Vec<(String, String)>,
    pub stdin: Option<String>,
    pub timeout: Option<Duration>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            envs: Vec::new(),
            stdin: None,
            timeout: None,
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    /// Feed this string to the child's stdin (`kubectl apply -f -`)
    pub fn stdin(mut self, input: impl Into<String>) -> Self {
        self.stdin = Some(input.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }

    /// The command line for logs; env values never appear here
    pub fn display_line(&self) -> String {
        let mut line = self.program.clone();
        for arg in &self.args {
            line.push(' ');
            line.push_str(arg);
        }
        line
    }
}

/// Captured result of a finished command
#[derive(Debug, Clone)]
pub struct CommandOutput {
    pub stdout: String,
    pub stderr: String,
    pub exit_code: i32,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// First non-empty stderr line, for compact error messages
    pub fn stderr_line(&self) -> &str {
        self.stderr
            .lines()
            .find(|l| !l.trim().is_empty())
            .unwrap_or("")
            .trim()
    }

    /// Turn a non-zero exit into a classified `CommandFailed`
    pub fn require_success(self, program: &str) -> Result<CommandOutput> {
        if self.success() {
            Ok(self)
        } else {
            let failure = CommandFailure::classify(&self.stderr);
            Err(SetupError::CommandFailed {
                program: program.to_string(),
                exit_code: self.exit_code,
                stderr: self.stderr_line().to_string(),
                failure,
            })
        }
    }
}

/// Runs an external program and captures its output
#[async_trait]
pub trait CommandExecutor: Send + Sync {
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput>;
}

/// The real executor, backed by `tokio::process`
#[derive(Debug, Clone)]
pub struct ProcessExecutor {
    default_timeout: Duration,
}

impl ProcessExecutor {
    pub fn new(default_timeout: Duration) -> Self {
        Self { default_timeout }
    }
}

impl Default for ProcessExecutor {
    fn default() -> Self {
        Self::new(Duration::from_secs(60))
    }
}

#[async_trait]
impl CommandExecutor for ProcessExecutor {
    async fn run(&self, spec: &CommandSpec) -> Result<CommandOutput> {
        tracing::debug!(command = %spec.display_line(), "running external command");

        let mut command = tokio::process::Command::new(&spec.program);
        command
            .args(&spec.args)
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true);
        for (key, value) in &spec.envs {
            command.env(key, value);
        }
        command.stdin(if spec.stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        });

        let timeout = spec.timeout.unwrap_or(self.default_timeout);
        let child = match command.spawn() {
            Ok(child) => child,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(SetupError::MissingCommand {
                    program: spec.program.clone(),
                });
            }
            Err(e) => return Err(e.into()),
        };

        let run = async {
            let mut child = child;
            if let Some(input) = &spec.stdin
                && let Some(mut handle) = child.stdin.take()
            {
                handle.write_all(input.as_bytes()).await?;
                // Close stdin so the child sees EOF.
                drop(handle);
            }
            child.wait_with_output().await
        };

        let output = match tokio::time::timeout(timeout, run).await {
            Ok(Ok(output)) => output,
            Ok(Err(e)) => return Err(e.into()),
            Err(_) => {
                return Err(SetupError::CommandTimeout {
                    program: spec.program.clone(),
                    timeout_secs: timeout.as_secs(),
                });
            }
        };

        Ok(CommandOutput {
            stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
            stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
            exit_code: output.status.code().unwrap_or(-1),
        })
    }
}
