//! mirrorberg — scheduled GitHub → Codeberg repository mirroring job.
//!
//! Runs unattended inside an external scheduler (CI cron or manual
//! dispatch): enumerates the origin account's repositories, filters them by
//! the exclusion list, ensures each survivor exists on Codeberg, pushes all
//! branches and tags, and exits non-zero if any repository failed so the
//! scheduler can flag the run.

use std::time::Duration;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use tracing::info;
use tracing_subscriber::EnvFilter;

use mirrorberg::engine::{GitHubSource, MirrorEngine, MirrorPlan};
use mirrorberg_core::codeberg::CodebergClient;
use mirrorberg_core::config::AppConfig;
use mirrorberg_core::exclusions::ExclusionSet;
use mirrorberg_core::github::GitHubClient;
use mirrorberg_core::pusher::MirrorPusher;
use mirrorberg_core::retry::RetryPolicy;

type Engine = MirrorEngine<GitHubSource, CodebergClient, MirrorPusher>;

/// mirrorberg — mirror GitHub repositories to Codeberg.
#[derive(Parser)]
#[command(name = "mirrorberg", version, about)]
struct Cli {
    /// Path to the config file. Missing file means defaults + environment.
    #[arg(short, long, default_value = "~/.config/mirrorberg/config.toml")]
    config: String,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full mirroring job.
    Run {
        /// Enumerate and filter only; mutate nothing, push nothing.
        #[arg(long)]
        dry_run: bool,
    },

    /// Show what a run would mirror, without doing it.
    Plan,
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();
    let config_path = expand_tilde(&cli.config);

    let config = AppConfig::load_and_resolve(&config_path)
        .context("failed to load mirrorberg configuration")?;

    // Initialize tracing. RUST_LOG wins over the configured level.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(config.mirror.log_level.clone())),
        )
        .init();

    info!(
        origin = %config.github.username,
        destination = %config.codeberg.username,
        "configuration loaded"
    );

    let engine = build_engine(&config);

    match cli.command {
        Commands::Run { dry_run: true } | Commands::Plan => cmd_plan(&engine).await,
        Commands::Run { dry_run: false } => cmd_run(&engine).await,
    }
}

/// Construct the immutable clients and the engine from resolved config.
fn build_engine(config: &AppConfig) -> Engine {
    let retry = RetryPolicy::new(config.mirror.max_retries);

    // Tokens are guaranteed present by config validation.
    let github_token = config.github.token.as_deref().unwrap_or("");
    let codeberg_token = config.codeberg.token.as_deref().unwrap_or("");

    let source = GitHubSource {
        client: GitHubClient::new(&config.github.api_url, github_token, retry),
        username: config.github.username.clone(),
    };
    let dest = CodebergClient::new(
        &config.codeberg.api_url,
        &config.codeberg.base_url,
        &config.codeberg.username,
        codeberg_token,
        retry,
    );
    let pusher = MirrorPusher::new(
        github_token,
        &config.codeberg.username,
        codeberg_token,
        config.mirror.prune,
        retry,
    );
    let exclusions = ExclusionSet::load(&config.mirror.exclude_file);

    MirrorEngine::new(
        source,
        dest,
        pusher,
        exclusions,
        Duration::from_secs(config.mirror.repo_delay_secs),
    )
}

/// Run the full job; exit non-zero if any repository failed.
async fn cmd_run(engine: &Engine) -> Result<()> {
    let summary = engine.run().await.context("mirroring run aborted")?;

    println!("Mirroring complete: {summary}");
    for failure in summary.failures() {
        println!("  ✗ {}: {}", failure.repository_name, failure.outcome);
    }

    if !summary.is_success() {
        std::process::exit(1);
    }
    Ok(())
}

/// Print what a run would do, touching nothing.
async fn cmd_plan(engine: &Engine) -> Result<()> {
    let MirrorPlan {
        to_mirror,
        excluded,
    } = engine.plan().await.context("planning failed")?;

    println!("Would mirror {} repositories:", to_mirror.len());
    for repo in &to_mirror {
        println!("  {} ({})", repo.name, repo.visibility);
    }
    if !excluded.is_empty() {
        println!("Excluded {}:", excluded.len());
        for name in &excluded {
            println!("  {name}");
        }
    }
    Ok(())
}

/// Expand `~` to the user's home directory.
fn expand_tilde(path: &str) -> String {
    if let Some(rest) = path.strip_prefix("~/") {
        if let Some(home) = dirs::home_dir() {
            return format!("{}/{}", home.display(), rest);
        }
    }
    path.to_string()
}
