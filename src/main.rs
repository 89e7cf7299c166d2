use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use autoclaim::config::Config;

mod commands;

use commands::ClaimArgs;

#[derive(Parser)]
#[command(
    name = "autoclaim",
    version,
    about = "Automatically claim tasks from the edushop task pool",
    long_about = None
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (TOML); environment variables override it
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Log format (text, json); defaults to the configured one
    #[arg(long, global = true)]
    log_format: Option<String>,
}

#[derive(Subcommand)]
enum Commands {
    /// Poll the task pool and claim matching tasks until the limit is reached
    Claim(ClaimArgs),

    /// Show the label filters (steps, subjects, clue types) for a task type
    Labels {
        /// Task type (audittask, producetask)
        #[arg(short, long, default_value = "audittask")]
        task_type: String,
    },

    /// Show the user owning the configured cookie
    User,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    let config = load_config(cli.config.as_deref())?;

    // Initialize tracing/logging
    let verbose = cli.verbose || config.logging.level.eq_ignore_ascii_case("debug");
    let log_format = cli.log_format.as_deref().unwrap_or(&config.logging.format);
    setup_tracing(log_format, verbose)?;

    tracing::info!("autoclaim starting");

    match cli.command {
        Commands::Claim(args) => {
            tracing::info!(
                task_type = ?args.task_type,
                limit = ?args.limit,
                interval = ?args.interval,
                "Starting claim command"
            );
            let mut config = config;
            args.apply(&mut config);
            config.validate()?;
            commands::claim(config).await?;
        }

        Commands::Labels { task_type } => {
            tracing::info!(task_type = %task_type, "Starting labels command");
            commands::labels(config, &task_type).await?;
        }

        Commands::User => {
            tracing::info!("Starting user command");
            commands::user(config).await?;
        }
    }

    Ok(())
}

fn load_config(path: Option<&std::path::Path>) -> Result<Config> {
    let config = match path {
        Some(path) => {
            let mut config = Config::from_file(path)
                .with_context(|| format!("Failed to load config from {}", path.display()))?;
            config.apply_env()?;
            config
        }
        None => Config::from_env()?,
    };
    Ok(config)
}

fn setup_tracing(format: &str, verbose: bool) -> Result<()> {
    let env_filter = if verbose {
        tracing_subscriber::EnvFilter::new("autoclaim=debug,info")
    } else {
        tracing_subscriber::EnvFilter::new("autoclaim=info,warn")
    };

    match format {
        "json" => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().json())
                .init();
        }
        _ => {
            tracing_subscriber::registry()
                .with(env_filter)
                .with(tracing_subscriber::fmt::layer().pretty())
                .init();
        }
    }

    Ok(())
}
