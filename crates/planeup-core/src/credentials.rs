//! Cloud credentials and where they come from
//!
//! Credentials are owned by a `CredentialSource`; the installer borrows them
//! only long enough to render the in-cluster Secret and never stores them.

use std::collections::HashMap;
use std::path::{Path, PathBuf};

use crate::error::{Result, SetupError};

/// AWS credentials for the provider
#[derive(Clone, PartialEq, Eq)]
pub struct Credentials {
    pub access_key_id: String,
    pub secret_access_key: String,
    pub region: String,
}

impl Credentials {
    pub fn new(
        access_key_id: impl Into<String>,
        secret_access_key: impl Into<String>,
        region: impl Into<String>,
    ) -> Self {
        Self {
            access_key_id: access_key_id.into(),
            secret_access_key: secret_access_key.into(),
            region: region.into(),
        }
    }

    /// Render the shared-credentials block the AWS provider consumes from
    /// the in-cluster Secret.
    pub fn as_ini(&self) -> String {
        format!(
            "[default]\naws_access_key_id = {}\naws_secret_access_key = {}\n",
            self.access_key_id, self.secret_access_key
        )
    }
}

// The secret key must never reach logs, debug dumps, or error messages.
impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("access_key_id", &self.access_key_id)
            .field("secret_access_key", &"***")
            .field("region", &self.region)
            .finish()
    }
}

/// Something that can supply validated cloud credentials
pub trait CredentialSource: Send + Sync {
    fn credentials(&self) -> Result<Credentials>;
}

/// Credentials read from an AWS shared-credentials file
#[derive(Debug, Clone)]
pub struct CredentialsFile {
    path: PathBuf,
    profile: String,
    region_override: Option<String>,
}

/// Region used when neither the file nor the caller names one
pub const DEFAULT_REGION: &str = "us-east-1";

/// Profile used when the caller does not name one
pub const DEFAULT_PROFILE: &str = "default";

impl CredentialsFile {
    pub fn new(path: impl Into<PathBuf>, profile: impl Into<String>) -> Self {
        Self {
            path: path.into(),
            profile: profile.into(),
            region_override: None,
        }
    }

    /// Override the region instead of reading it from the file
    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region_override = Some(region.into());
        self
    }

    /// The conventional location, `~/.aws/credentials`
    pub fn default_path() -> Result<PathBuf> {
        let home = dirs::home_dir().ok_or_else(|| {
            SetupError::invalid_config("could not determine the home directory")
        })?;
        Ok(home.join(".aws").join("credentials"))
    }

    /// Parse the selected profile out of the file
    pub fn load(&self) -> Result<Credentials> {
        if !self.path.exists() {
            return Err(SetupError::MissingCredentials {
                path: self.path.display().to_string(),
            });
        }
        let content = std::fs::read_to_string(&self.path)?;
        let profile = parse_profile(&content, &self.profile).ok_or_else(|| {
            SetupError::InvalidCredentials {
                detail: format!(
                    "profile '{}' not found in {}",
                    self.profile,
                    self.path.display()
                ),
            }
        })?;

        let access_key_id = require_key(&profile, "aws_access_key_id", &self.profile)?;
        let secret_access_key = require_key(&profile, "aws_secret_access_key", &self.profile)?;
        let region = self
            .region_override
            .clone()
            .or_else(|| profile.get("region").cloned())
            .unwrap_or_else(|| DEFAULT_REGION.to_string());

        Ok(Credentials {
            access_key_id,
            secret_access_key,
            region,
        })
    }
}

impl CredentialSource for CredentialsFile {
    fn credentials(&self) -> Result<Credentials> {
        self.load()
    }
}

fn require_key(profile: &HashMap<String, String>, key: &str, profile_name: &str) -> Result<String> {
    profile.get(key).cloned().ok_or_else(|| SetupError::InvalidCredentials {
        detail: format!("profile '{profile_name}' has no {key}"),
    })
}

/// Extract one `[profile]` section as a key/value map.
///
/// The shared-credentials format is a flat ini dialect: section headers in
/// brackets, `key = value` lines, `#` or `;` comments. Quoting and line
/// continuations are not part of the format.
fn parse_profile(content: &str, profile: &str) -> Option<HashMap<String, String>> {
    let mut current: Option<&str> = None;
    let mut values = HashMap::new();
    let mut found = false;

    for line in content.lines() {
        let line = line.trim();
        if line.is_empty() || line.starts_with('#') || line.starts_with(';') {
            continue;
        }
        if let Some(header) = line.strip_prefix('[').and_then(|l| l.strip_suffix(']')) {
            current = Some(header.trim());
            if header.trim() == profile {
                found = true;
            }
            continue;
        }
        if current == Some(profile)
            && let Some((key, value)) = line.split_once('=')
        {
            values.insert(
                key.trim().to_lowercase(),
                value.trim().to_string(),
            );
        }
    }

    found.then_some(values)
}

/// Credentials read from `AWS_*` environment variables
#[derive(Debug, Clone, Default)]
pub struct EnvCredentials {
    region_override: Option<String>,
}

impl EnvCredentials {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_region(mut self, region: impl Into<String>) -> Self {
        self.region_override = Some(region.into());
        self
    }

    /// True when both key variables are present
    pub fn available() -> bool {
        std::env::var("AWS_ACCESS_KEY_ID").is_ok()
            && std::env::var("AWS_SECRET_ACCESS_KEY").is_ok()
    }
}

impl CredentialSource for EnvCredentials {
    fn credentials(&self) -> Result<Credentials> {
        let access_key_id = std::env::var("AWS_ACCESS_KEY_ID").map_err(|_| {
            SetupError::InvalidCredentials {
                detail: "AWS_ACCESS_KEY_ID is not set".to_string(),
            }
        })?;
        let secret_access_key = std::env::var("AWS_SECRET_ACCESS_KEY").map_err(|_| {
            SetupError::InvalidCredentials {
                detail: "AWS_SECRET_ACCESS_KEY is not set".to_string(),
            }
        })?;
        let region = self
            .region_override
            .clone()
            .or_else(|| std::env::var("AWS_DEFAULT_REGION").ok())
            .unwrap_or_else(|| DEFAULT_REGION.to_string());

        Ok(Credentials {
            access_key_id,
            secret_access_key,
            region,
        })
    }
}
