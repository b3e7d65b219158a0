//! strand - replay episodes through the per-key queue

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, bail};
use clap::{Parser, Subcommand};
use serde::Serialize;
use strand_core::impls::{AppliedEpisode, ConcurrencyLimited, SimulatedGraph};
use strand_core::ports::{Clock, SystemClock};
use strand_core::{
    CompletionHandle, Dispatcher, EpisodeRequest, QueueConfig, ShutdownMode, ShutdownReport,
    TaskError,
};
use tracing::{info, warn};
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "strand")]
#[command(author, version, about = "Per-key sequential episode queue", long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Config file (TOML). Environment variables override it.
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Submit every episode in a JSON-lines file, then shut down
    Replay {
        /// One episode request per line
        file: PathBuf,

        /// Simulated apply latency per episode
        #[arg(long, default_value_t = 50)]
        latency_ms: u64,

        /// Wait for each episode before submitting the next
        #[arg(long)]
        wait: bool,

        /// drain or discard (defaults to the config value)
        #[arg(long)]
        shutdown_mode: Option<ShutdownMode>,

        /// Shutdown deadline (defaults to the config value)
        #[arg(long)]
        deadline_secs: Option<u64>,
    },

    /// Print the effective configuration
    Config,
}

#[derive(Debug, Default, Serialize)]
struct ReplaySummary {
    submitted: usize,
    rejected: usize,
    applied: usize,
    failed: usize,
    cancelled: usize,
    timed_out: usize,
    /// Applied episodes per group.
    groups: BTreeMap<String, usize>,
    shutdown: Option<ShutdownReport>,
}

impl ReplaySummary {
    fn record(&mut self, result: Result<AppliedEpisode, TaskError>) {
        match result {
            Ok(applied) => {
                self.applied += 1;
                *self.groups.entry(applied.group_id).or_default() += 1;
            }
            Err(TaskError::Cancelled) => self.cancelled += 1,
            Err(TaskError::TimedOut) => self.timed_out += 1,
            Err(err) => {
                warn!(error = %err, "episode failed");
                self.failed += 1;
            }
        }
    }
}

fn load_config(path: Option<&Path>) -> anyhow::Result<QueueConfig> {
    let config = match path {
        Some(path) => QueueConfig::load(path)?,
        None => QueueConfig::default(),
    };
    let config = config.apply_env()?;
    config.validate()?;
    Ok(config)
}

async fn read_requests(file: &Path) -> anyhow::Result<Vec<EpisodeRequest>> {
    let contents = tokio::fs::read_to_string(file)
        .await
        .with_context(|| format!("failed to read {}", file.display()))?;

    let mut requests = Vec::new();
    for (index, line) in contents.lines().enumerate() {
        if line.trim().is_empty() {
            continue;
        }
        let request: EpisodeRequest = serde_json::from_str(line).with_context(|| {
            format!("{}:{}: invalid episode request", file.display(), index + 1)
        })?;
        requests.push(request);
    }
    Ok(requests)
}

async fn replay(
    config: QueueConfig,
    file: &Path,
    latency: Duration,
    wait: bool,
    mode: ShutdownMode,
    deadline: Duration,
) -> anyhow::Result<ReplaySummary> {
    let requests = read_requests(file).await?;
    if requests.is_empty() {
        bail!("{} contains no episodes", file.display());
    }

    let graph = SimulatedGraph::new(latency).with_custom_entities(config.use_custom_entities);
    let dispatcher = Dispatcher::builder(ConcurrencyLimited::new(graph, config.semaphore_limit))
        .config(config.clone())
        .build()?;
    let clock = SystemClock;

    let mut summary = ReplaySummary::default();
    let mut handles: Vec<CompletionHandle<AppliedEpisode>> = Vec::new();

    for request in requests {
        let (group_id, episode) = request.into_episode(clock.now());
        let key = match config.key_for(group_id.as_deref()) {
            Ok(key) => key,
            Err(err) => {
                warn!(name = %episode.name, error = %err, "invalid group id");
                summary.rejected += 1;
                continue;
            }
        };
        let name = episode.name.clone();

        match dispatcher.submit_to(key, episode) {
            Ok(submission) => {
                summary.submitted += 1;
                info!("{}", submission.accepted_message(&name));
                if wait {
                    summary.record(submission.handle.await);
                } else {
                    handles.push(submission.into_handle());
                }
            }
            Err(err) => {
                warn!(name = %name, error = %err, "episode rejected");
                summary.rejected += 1;
            }
        }
    }

    let report = dispatcher.shutdown(mode, deadline).await;
    for handle in handles {
        summary.record(handle.await);
    }
    summary.shutdown = Some(report);
    Ok(summary)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let config = load_config(cli.config.as_deref())?;

    match cli.command {
        Commands::Replay {
            file,
            latency_ms,
            wait,
            shutdown_mode,
            deadline_secs,
        } => {
            let mode = shutdown_mode.unwrap_or(config.shutdown_mode);
            let deadline = deadline_secs
                .map(Duration::from_secs)
                .unwrap_or_else(|| config.shutdown_deadline());
            let summary = replay(
                config,
                &file,
                Duration::from_millis(latency_ms),
                wait,
                mode,
                deadline,
            )
            .await?;
            println!("{}", serde_json::to_string_pretty(&summary)?);
        }
        Commands::Config => {
            print!("{}", toml::to_string_pretty(&config)?);
        }
    }

    Ok(())
}
