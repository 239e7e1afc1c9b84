// GradeGuard - Main Entry Point
//
// CLI for the grading service:
// - serve: run the HTTP API
// - grade: grade one submission file and print the result
// - check-config: validate and print the effective configuration

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use gradeguard::execution::ExecutionTimeout;
use gradeguard::grading::{CacheHitPolicy, GradeRequest, GradingOrchestrator};
use gradeguard::{server, Caller, Config, HttpExecutionClient, ResultCache, UsageTracker};
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{info, Level};
use tracing_subscriber::EnvFilter;

/// GradeGuard: admission-controlled grading against a metered execution service
#[derive(Parser, Debug)]
#[command(name = "gradeguard")]
#[command(version)]
#[command(about = "Rate-limited, cached grading of code submissions", long_about = None)]
struct Args {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    verbose: bool,

    /// Path to a config file (defaults to the platform config directory)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand, Debug)]
enum Commands {
    /// Start the HTTP API
    Serve {
        /// Override the listen port
        #[arg(long)]
        port: Option<u16>,
    },
    /// Grade one submission and print the result as JSON
    Grade {
        /// User id the request is charged to
        #[arg(long)]
        user: String,

        /// Path to a JSON file with code, language, versionIndex and testCases
        #[arg(long)]
        submission: PathBuf,
    },
    /// Validate the configuration and print it with secrets masked
    CheckConfig,
}

#[tokio::main]
async fn main() -> Result<()> {
    let args = Args::parse();

    let mut config = match &args.config {
        Some(path) => Config::load_from_path(path)?,
        None => Config::load()?,
    };
    if args.verbose {
        config.logging.level = "debug".to_string();
    }

    init_tracing(&config)?;

    match args.command {
        Commands::Serve { port } => {
            if let Some(port) = port {
                config.server.port = port;
            }
            info!("GradeGuard v{} starting...", env!("CARGO_PKG_VERSION"));
            server::start_server(&config).await?;
        }
        Commands::Grade { user, submission } => {
            grade_file(&config, user, submission).await?;
        }
        Commands::CheckConfig => {
            let rendered = toml::to_string_pretty(&config.redacted())
                .context("Failed to render configuration")?;
            println!("{}", rendered);
            println!("# Configuration OK");
        }
    }

    Ok(())
}

/// Logs go to stderr so command output on stdout stays machine-readable
fn init_tracing(config: &Config) -> Result<()> {
    let level: Level = config.log_level()?;
    let filter = EnvFilter::builder()
        .with_default_directive(level.into())
        .from_env_lossy();

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr);

    match config.logging.format.to_lowercase().as_str() {
        "json" => builder.json().init(),
        "pretty" => builder.pretty().init(),
        _ => builder.compact().init(),
    }

    Ok(())
}

async fn grade_file(config: &Config, user: String, submission: PathBuf) -> Result<()> {
    let content = fs::read_to_string(&submission)
        .with_context(|| format!("Failed to read submission from {:?}", submission))?;
    let request: GradeRequest =
        serde_json::from_str(&content).context("Failed to parse submission JSON")?;

    let client = HttpExecutionClient::new(&config.execution)?;
    let orchestrator = GradingOrchestrator::new(
        UsageTracker::new(config.rate_limit.clone()),
        ResultCache::new(&config.cache),
        Arc::new(client),
    )
    .with_timeout(ExecutionTimeout::new(config.execution.timeout()))
    .with_cache_hit_policy(CacheHitPolicy::from_count_flag(config.grading.count_cache_hits));

    let caller = Caller::user(user);
    let result = orchestrator.grade(Some(&caller), &request).await?;

    println!("{}", serde_json::to_string_pretty(&result)?);
    Ok(())
}
