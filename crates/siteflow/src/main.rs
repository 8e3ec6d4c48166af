mod commands;
mod context;
mod reporter;

use clap::{Parser, Subcommand};
use colored::Colorize;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "siteflow")]
#[command(version, about = "Deploy static websites to S3 and CloudFront", long_about = None)]
struct Cli {
    /// Enable debug logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Credentials profile (overrides `profile` in siteflow.yaml)
    #[arg(long, global = true)]
    profile: Option<String>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Upload the site and provision bucket, CDN, certificate and DNS
    Deploy {
        /// Environment name (falls back to SITEFLOW_ENV)
        #[arg(env = "SITEFLOW_ENV")]
        environment: Option<String>,
        /// Invalidate the CDN cache even when nothing changed
        #[arg(long)]
        force_invalidate: bool,
        /// Keep a freshly created bucket when a later step fails
        #[arg(long)]
        no_rollback: bool,
        /// Keep remote objects whose local file was deleted
        #[arg(long)]
        no_cleanup: bool,
        /// Block until the invalidation completes
        #[arg(long)]
        wait_invalidation: bool,
    },
    /// Tear down every resource recorded for an environment
    Remove {
        /// Environment name (falls back to SITEFLOW_ENV)
        #[arg(env = "SITEFLOW_ENV")]
        environment: Option<String>,
        /// Run without confirmation
        #[arg(short, long)]
        yes: bool,
        /// Keep the bucket and its contents
        #[arg(long)]
        keep_bucket: bool,
    },
    /// Show the recorded state and whether each resource still exists
    Status {
        /// Environment name (falls back to SITEFLOW_ENV)
        #[arg(env = "SITEFLOW_ENV")]
        environment: Option<String>,
    },
    /// Rebuild the state record from resource tags
    Recover {
        /// Environment name (falls back to SITEFLOW_ENV)
        #[arg(env = "SITEFLOW_ENV")]
        environment: Option<String>,
        /// Overwrite an existing state record
        #[arg(short, long)]
        force: bool,
    },
    /// List resources managed by siteflow
    Discover {
        /// Environment name (falls back to SITEFLOW_ENV)
        #[arg(env = "SITEFLOW_ENV")]
        environment: Option<String>,
        /// Every managed resource, not just this environment's
        #[arg(short, long)]
        all: bool,
    },
    /// List environments with a state record
    Envs,
}

fn init_tracing(verbose: bool) {
    let filter = if verbose {
        EnvFilter::new("siteflow=debug,siteflow_cloud=debug,siteflow_cloud_aws=debug,siteflow_config=debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let profile = cli.profile;
    match cli.command {
        Commands::Deploy {
            environment,
            force_invalidate,
            no_rollback,
            no_cleanup,
            wait_invalidation,
        } => {
            let flags = context::DeployFlags {
                force_invalidate,
                no_rollback,
                no_cleanup,
                wait_invalidation,
            };
            commands::deploy::handle(environment.as_deref(), profile.as_deref(), &flags).await
        }
        Commands::Remove {
            environment,
            yes,
            keep_bucket,
        } => {
            commands::remove::handle(environment.as_deref(), profile.as_deref(), yes, keep_bucket)
                .await
        }
        Commands::Status { environment } => {
            commands::status::handle(environment.as_deref(), profile.as_deref()).await
        }
        Commands::Recover { environment, force } => {
            commands::recover::handle(environment.as_deref(), profile.as_deref(), force).await
        }
        Commands::Discover { environment, all } => {
            commands::discover::handle(environment.as_deref(), profile.as_deref(), all).await
        }
        Commands::Envs => commands::envs::handle().await,
    }
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    if let Err(e) = run(cli).await {
        eprintln!("{} {:#}", "Error:".red().bold(), e);
        std::process::exit(1);
    }
}
