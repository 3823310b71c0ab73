//! End-to-end connectivity validation
//!
//! The last install step issues one benign read-only cloud call to prove the
//! configured credentials actually authenticate. A failure here is a
//! credentials problem, not an installation problem, and is classified
//! accordingly.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use planeup_core::{Credentials, Result, SetupError};

use crate::exec::{CommandExecutor, CommandSpec};

/// Issues one read-only call through the configured cloud path
#[async_trait]
pub trait ConnectivityValidator: Send + Sync {
    async fn validate(&self, credentials: &Credentials) -> Result<()>;
}

/// Validates by asking STS who the credentials belong to
pub struct StsValidator {
    exec: Arc<dyn CommandExecutor>,
    command_timeout: Duration,
}

impl StsValidator {
    pub fn new(exec: Arc<dyn CommandExecutor>, command_timeout: Duration) -> Self {
        Self {
            exec,
            command_timeout,
        }
    }
}

#[async_trait]
impl ConnectivityValidator for StsValidator {
    async fn validate(&self, credentials: &Credentials) -> Result<()> {
        let spec = CommandSpec::new("aws")
            .args(["sts", "get-caller-identity", "--output", "json"])
            .env("AWS_ACCESS_KEY_ID", &credentials.access_key_id)
            .env("AWS_SECRET_ACCESS_KEY", &credentials.secret_access_key)
            .env("AWS_DEFAULT_REGION", &credentials.region)
            .timeout(self.command_timeout);

        let output = self.exec.run(&spec).await?;
        if output.success() {
            tracing::debug!("credentials validated against STS");
            return Ok(());
        }

        // The command ran but the cloud rejected the credentials.
        Err(SetupError::InvalidCredentials {
            detail: output.stderr_line().to_string(),
        })
    }
}
