//! Planeup CLI - bootstrap a local Crossplane environment

use std::path::PathBuf;

use clap::{Parser, Subcommand, ValueEnum};

mod commands;
mod display;
mod error;
mod exit_codes;

use error::CliError;
use planeup_core::{ClusterContext, SetupConfig};

#[derive(Parser)]
#[command(name = "planeup")]
#[command(author = "Planeup Contributors")]
#[command(version)]
#[command(
    about = "Install Crossplane, an AWS provider, and credentials into a local cluster",
    long_about = None
)]
#[command(propagate_version = true)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug output
    #[arg(long, global = true)]
    debug: bool,

    /// Path to a kubeconfig file
    #[arg(long, global = true)]
    kubeconfig: Option<PathBuf>,

    /// Kubeconfig context to use
    #[arg(long, global = true)]
    context: Option<String>,

    /// Path to a planeup configuration file
    #[arg(long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Install Crossplane, the AWS provider, and cloud credentials
    Up {
        /// Chart version to install (defaults to the repository's latest)
        #[arg(long)]
        version: Option<String>,

        /// Move an existing installation to the requested version
        #[arg(long)]
        upgrade: bool,

        /// Replace the chart repository URL if it changed
        #[arg(long)]
        force_repo_update: bool,

        /// Credentials file (defaults to ~/.aws/credentials)
        #[arg(long)]
        credentials_file: Option<PathBuf>,

        /// Profile within the credentials file
        #[arg(long, default_value = "default")]
        profile: String,

        /// Region handed to the provider
        #[arg(long)]
        region: Option<String>,

        /// Suppress progress output
        #[arg(short, long)]
        quiet: bool,
    },

    /// Tear down the in-cluster footprint (never touches local credentials)
    Down {
        /// Suppress progress output
        #[arg(short, long)]
        quiet: bool,
    },

    /// Show live installation status
    Status {
        /// Output format
        #[arg(long, value_enum, default_value_t = OutputFormat::Text)]
        output: OutputFormat,
    },
}

/// Output format for status
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    Text,
    Json,
}

#[tokio::main]
async fn main() {
    // Setup miette for nice error display
    miette::set_panic_hook();

    let cli = Cli::parse();

    if cli.debug {
        // SAFETY: We're the only thread at this point (start of main)
        unsafe { std::env::set_var("RUST_BACKTRACE", "1") };
    }

    if let Err(err) = run(cli).await {
        let code = err.exit_code();
        eprintln!("{:?}", miette::Report::new(err));
        std::process::exit(code);
    }
}

async fn run(cli: Cli) -> error::Result<()> {
    let config = match &cli.config {
        Some(path) => SetupConfig::load_from(path).map_err(CliError::from)?,
        None => SetupConfig::default(),
    };
    let context = ClusterContext::new(cli.kubeconfig.clone(), cli.context.clone());

    match cli.command {
        Commands::Up {
            version,
            upgrade,
            force_repo_update,
            credentials_file,
            profile,
            region,
            quiet,
        } => {
            commands::up::run(
                config,
                context,
                version,
                upgrade,
                force_repo_update,
                credentials_file,
                &profile,
                region.as_deref(),
                quiet,
            )
            .await
        }

        Commands::Down { quiet } => commands::down::run(config, context, quiet).await,

        Commands::Status { output } => commands::status::run(config, context, output).await,
    }
}
