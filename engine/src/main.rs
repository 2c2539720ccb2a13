use std::collections::{HashMap, HashSet};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::Context;
use chrono::Utc;
use clap::{Parser, Subcommand};
use runforge_cascade::{Cascade, CascadeConfig};
use runforge_graph::Graph;
use runforge_scheduler::{CascadeExecutor, Scheduler, SchedulerConfig};
use runforge_state::{default_state_dir, Blacklist, Graylist, ProviderLimiter, StateTracker};
use runforge_types::RunReport;
use tokio_util::sync::CancellationToken;
use tracing::info;

#[derive(Parser, Debug)]
#[command(name = "runforge-engine")]
#[command(about = "Dependency-graph task orchestration engine for AI coding CLIs")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Run a task file to completion.
    Run {
        task_file: PathBuf,
        #[arg(long, default_value_t = 4)]
        workers: usize,
        #[arg(long)]
        retry: bool,
        #[arg(long, default_value_t = false)]
        fail_fast: bool,
        #[arg(long)]
        repos_root: Option<PathBuf>,
        #[arg(long)]
        output_root: Option<PathBuf>,
        #[arg(long)]
        state_dir: Option<PathBuf>,
        #[arg(long, default_value_t = 3600)]
        task_timeout_secs: u64,
    },
    /// Run the directory-watching sentinel daemon.
    Sentinel {
        #[arg(long)]
        root: PathBuf,
        #[arg(long)]
        repos_root: PathBuf,
        #[arg(long)]
        runners: Option<PathBuf>,
    },
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            std::env::var("RUNFORGE_LOG").unwrap_or_else(|_| "info".to_string()),
        )
        .with_target(false)
        .init();

    let cli = Cli::parse();

    let exit_code = match cli.command {
        Command::Run {
            task_file,
            workers,
            retry,
            fail_fast,
            repos_root,
            output_root,
            state_dir,
            task_timeout_secs,
        } => {
            run_command(
                task_file,
                workers,
                retry,
                fail_fast,
                repos_root,
                output_root,
                state_dir,
                task_timeout_secs,
            )
            .await?
        }
        Command::Sentinel {
            root,
            repos_root,
            runners,
        } => sentinel_command(root, repos_root, runners).await?,
    };

    std::process::exit(exit_code);
}

#[allow(clippy::too_many_arguments)]
async fn run_command(
    task_file: PathBuf,
    workers: usize,
    retry: bool,
    fail_fast: bool,
    repos_root: Option<PathBuf>,
    output_root: Option<PathBuf>,
    state_dir: Option<PathBuf>,
    task_timeout_secs: u64,
) -> anyhow::Result<i32> {
    let state_dir = state_dir.unwrap_or_else(default_state_dir);
    std::fs::create_dir_all(&state_dir).context("creating state dir")?;

    let parsed = match runforge_taskfile::parse_file(&task_file) {
        Ok(p) => p,
        Err(e) => {
            eprintln!("invalid task file: {e}");
            return Ok(2);
        }
    };

    let repos_root = repos_root.unwrap_or_else(|| PathBuf::from("."));
    let output_root = output_root.unwrap_or_else(|| state_dir.join("runs"));

    for task in &parsed.tasks {
        if !repos_root.join(&task.repo).exists() {
            eprintln!("repo unavailable for task {}: {}", task.id, task.repo);
            return Ok(2);
        }
    }

    let state_path = runforge_state::tracker::default_path(&state_dir);
    let tracker = StateTracker::load(&state_path);
    tracker.recover_interrupted(&HashSet::new())?;

    let filtered_tasks = tracker.filter(parsed.tasks, retry);

    let graph = match Graph::build(filtered_tasks) {
        Ok(g) => g,
        Err(e) => {
            eprintln!("task graph is invalid: {e}");
            return Ok(2);
        }
    };

    let run_id = uuid::Uuid::new_v4().to_string();
    for id in graph.order() {
        tracker.mark_started(id, &run_id)?;
    }

    let blacklist = Arc::new(Blacklist::load(state_dir.join("blacklist.json")));
    let graylist = Arc::new(Graylist::load(state_dir.join("graylist.json")));
    let limits: HashMap<String, usize> = parsed
        .registry
        .profiles
        .iter()
        .filter_map(|(name, p)| p.max_concurrency.map(|m| (name.clone(), m)))
        .collect();
    let limiter = Arc::new(ProviderLimiter::new(limits));
    let cascade = Arc::new(Cascade::new(
        parsed.registry,
        blacklist,
        graylist,
        limiter,
        CascadeConfig::default(),
    ));

    let scheduler = Scheduler::new(
        graph,
        Arc::new(CascadeExecutor(cascade)),
        SchedulerConfig {
            workers,
            task_timeout: Duration::from_secs(task_timeout_secs),
            fail_fast,
            repos_root: repos_root.clone(),
            output_root,
        },
        None,
    );

    let started_at = Utc::now();
    info!(run_id = %run_id, workers, "starting run");
    let results = scheduler.run(CancellationToken::new()).await;

    for (id, result) in &results {
        match result.state {
            runforge_types::TaskState::Completed => {
                tracker.mark_completed(
                    id,
                    result.runner_used.as_deref().unwrap_or(""),
                    result.commit.as_deref(),
                )?;
            }
            _ => {
                tracker.mark_failed(id, result.error.as_deref().unwrap_or("task did not complete"))?;
            }
        }
    }

    let mut report = RunReport::new(
        run_id,
        started_at,
        task_file.display().to_string(),
        workers,
        repos_root.display().to_string(),
    );
    report.finish(results, Utc::now());

    println!("{}", serde_json::to_string_pretty(&report)?);
    Ok(report.exit_code())
}

async fn sentinel_command(
    root: PathBuf,
    repos_root: PathBuf,
    runners: Option<PathBuf>,
) -> anyhow::Result<i32> {
    std::fs::create_dir_all(&root).context("creating sentinel root")?;

    let registry = match runners {
        Some(path) => {
            let contents = std::fs::read_to_string(&path).context("reading runner registry file")?;
            serde_json::from_str(&contents).context("parsing runner registry file")?
        }
        None => runforge_types::RunnerRegistry::default(),
    };

    let sentinel = runforge_sentinel::Sentinel::start(runforge_sentinel::SentinelConfig {
        root,
        repos_root,
        registry,
        cascade_config: CascadeConfig::default(),
        limits: HashMap::new(),
    })?;

    info!("sentinel starting, watching inbox directory");
    let cancel = CancellationToken::new();
    let watch_cancel = cancel.clone();
    tokio::spawn(async move {
        let _ = tokio::signal::ctrl_c().await;
        watch_cancel.cancel();
    });

    sentinel.run(&cancel).await?;
    Ok(0)
}
