use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Result;
use clap::{Args, Parser, Subcommand};

mod commands;

#[derive(Parser)]
#[command(name = "gwr")]
#[command(about = "Gateway configuration reconciler", long_about = None)]
struct Cli {
    #[command(subcommand)]
    cmd: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Load, merge and build the desired configuration; print its hash and counts
    Validate {
        /// Paths in merge order (base -> env -> overrides...)
        #[arg(required = true)]
        paths: Vec<PathBuf>,
    },

    /// Print the live gateway configuration as YAML
    Dump {
        #[command(flatten)]
        admin: AdminArgs,
    },

    /// Print the events that would move the current configuration to the desired one
    Diff {
        /// Desired configuration paths in merge order
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        #[command(flatten)]
        current: CurrentArgs,
    },

    /// Diff against the live gateway and apply the result
    Sync {
        /// Desired configuration paths in merge order
        #[arg(required = true)]
        paths: Vec<PathBuf>,

        #[command(flatten)]
        admin: AdminArgs,

        /// Run independent kinds concurrently
        #[arg(long, default_value_t = false)]
        parallel: bool,

        /// Print and count events without applying them
        #[arg(long, default_value_t = false)]
        dry_run: bool,
    },

    /// Audit the gateway database for orphaned records
    Audit {
        /// Name of the env var holding the database URL
        #[arg(long, default_value = gwr_config::ENV_DATABASE_URL)]
        database_url_env: String,

        #[arg(long, default_value = gwr_config::DEFAULT_SCHEMA)]
        schema: String,

        /// Delete orphaned records. Do not use unless strictly necessary.
        #[arg(long, default_value_t = false)]
        fix: bool,

        #[arg(long, default_value_t = gwr_config::DEFAULT_AUDIT_PAGE_SIZE)]
        page_size: u32,

        #[arg(long, default_value_t = 10)]
        timeout_secs: u64,
    },
}

#[derive(Args)]
pub struct AdminArgs {
    /// Admin API base URL, e.g. http://localhost:8001
    #[arg(long)]
    pub admin_url: String,

    #[arg(long, default_value_t = 20)]
    pub timeout_secs: u64,
}

#[derive(Args)]
#[group(required = true, multiple = false)]
pub struct CurrentArgs {
    /// Read the current configuration from the live gateway
    #[arg(long)]
    pub admin_url: Option<String>,

    /// Read the current configuration from a YAML file
    #[arg(long)]
    pub current: Option<PathBuf>,
}

#[tokio::main]
async fn main() -> ExitCode {
    let _ = dotenvy::from_filename(".env.local");
    init_tracing();

    match run(Cli::parse()).await {
        Ok(code) => code,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::from(commands::EXIT_ERROR)
        }
    }
}

async fn run(cli: Cli) -> Result<ExitCode> {
    match cli.cmd {
        Commands::Validate { paths } => commands::reconcile::validate(&paths),
        Commands::Dump { admin } => commands::reconcile::dump(&admin).await,
        Commands::Diff { paths, current } => commands::reconcile::diff(&paths, &current).await,
        Commands::Sync {
            paths,
            admin,
            parallel,
            dry_run,
        } => commands::reconcile::sync(&paths, &admin, parallel, dry_run).await,
        Commands::Audit {
            database_url_env,
            schema,
            fix,
            page_size,
            timeout_secs,
        } => {
            let cfg = gwr_config::AuditConfig::from_env(&database_url_env)?
                .with_schema(schema)
                .with_fix(fix)
                .with_page_size(page_size)
                .with_timeout(std::time::Duration::from_secs(timeout_secs));
            commands::audit::audit(&cfg).await
        }
    }
}

fn init_tracing() {
    // Logs go to stderr; stdout carries command output.
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env().unwrap_or_else(|_| "info".into()),
        )
        .init();
}
