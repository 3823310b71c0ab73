//! `planeup up` - install the whole stack

use std::path::PathBuf;
use std::sync::Arc;

use planeup_core::{
    ClusterContext, CredentialSource, Credentials, CredentialsFile, EnvCredentials, SetupConfig,
};
use planeup_kube::{
    CancelFlag, ConsoleProgress, InstallOptions, Installer, Prober, ProgressSink, SilentProgress,
    StsValidator,
};

use crate::display;
use crate::error::{CliError, Result};

pub async fn run(
    config: SetupConfig,
    context: ClusterContext,
    version: Option<String>,
    upgrade: bool,
    force_repo_update: bool,
    credentials_file: Option<PathBuf>,
    profile: &str,
    region: Option<&str>,
    quiet: bool,
) -> Result<()> {
    let version = version
        .map(|v| semver::Version::parse(v.trim_start_matches('v')))
        .transpose()
        .map_err(|e| CliError::Configuration {
            message: format!("invalid --version: {e}"),
            help: Some("Pass a full semantic version, e.g. --version 1.15.0".to_string()),
        })?;

    let credentials = resolve_credentials(credentials_file, profile, region)?;

    let clients = super::clients(&config, &context);
    let validator = Arc::new(StsValidator::new(
        Arc::clone(&clients.exec),
        config.timeouts.command,
    ));

    // An interrupt during a long wait aborts cleanly; the cluster keeps
    // whatever completed, and a later `up` resumes from live state.
    let cancel = CancelFlag::new();
    {
        let cancel = cancel.clone();
        tokio::spawn(async move {
            if tokio::signal::ctrl_c().await.is_ok() {
                cancel.cancel();
            }
        });
    }

    let progress: Arc<dyn ProgressSink> = if quiet {
        Arc::new(SilentProgress)
    } else {
        Arc::new(ConsoleProgress::new())
    };

    let installer = Installer::new(config, clients.packages, clients.resources, validator)
        .with_progress(progress)
        .with_prober(Prober::new().cancelled_by(cancel));

    let opts = InstallOptions {
        version,
        upgrade,
        force_repo_update,
    };
    let status = installer.install(&credentials, &opts).await?;

    display::print_status(&status);
    Ok(())
}

/// Explicit file, then environment, then the conventional file location
fn resolve_credentials(
    file: Option<PathBuf>,
    profile: &str,
    region: Option<&str>,
) -> Result<Credentials> {
    let credentials = if let Some(path) = file {
        let mut source = CredentialsFile::new(path, profile);
        if let Some(region) = region {
            source = source.with_region(region);
        }
        source.credentials()
    } else if EnvCredentials::available() {
        let mut source = EnvCredentials::new();
        if let Some(region) = region {
            source = source.with_region(region);
        }
        source.credentials()
    } else {
        let path = CredentialsFile::default_path().map_err(CliError::from)?;
        let mut source = CredentialsFile::new(path, profile);
        if let Some(region) = region {
            source = source.with_region(region);
        }
        source.credentials()
    };
    credentials.map_err(CliError::from)
}
