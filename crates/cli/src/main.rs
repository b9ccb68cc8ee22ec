//! Conveyor CLI
//!
//! Runs prompts through the agent pipeline and inspects the task history.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use conveyor_core::agent::{AgentInvoker, ClaudeCliBackend};
use conveyor_core::models::AgentModel;
use conveyor_core::state::{io, TaskReport, TaskStore};
use conveyor_core::swarm::{
    Coordinator, PipelineEvent, PipelineEventKind, PipelineMode, TaskRequest, TaskScheduler,
};
use conveyor_core::PipelineConfig;
use tokio::sync::mpsc;
use tracing_subscriber::EnvFilter;

#[derive(Parser, Clone)]
#[command(author, version, about = "Conveyor - staged pipeline runner for a code agent")]
struct Args {
    #[command(subcommand)]
    command: CliCommand,
}

#[derive(Subcommand, Clone)]
enum CliCommand {
    /// Run a prompt through the pipeline
    Run {
        /// What the agent should do
        prompt: String,
        /// Pipeline mode (full, fast, simple); classified from the prompt when omitted
        #[arg(short, long)]
        mode: Option<PipelineMode>,
        /// Agent model (opus, sonnet, haiku)
        #[arg(long)]
        model: Option<AgentModel>,
        /// Directory the agent works in
        #[arg(short, long)]
        workspace: Option<PathBuf>,
        /// Continue from a finished task
        #[arg(long = "continue-from", value_name = "TASK_ID")]
        continue_from: Option<String>,
        /// File with extra domain hints for every stage
        #[arg(long, value_name = "FILE")]
        skills: Option<PathBuf>,
    },
    /// List recent tasks
    History {
        #[arg(short, long, default_value = "20")]
        limit: usize,
    },
    /// Print the stored report of a task as JSON
    Show { task_id: String },
    /// Print the resolved configuration
    Config,
}

fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .compact()
        .init();
}

fn print_event(event: &PipelineEvent) {
    let stage = event.stage.map(|s| s.to_string()).unwrap_or_default();
    match event.kind {
        PipelineEventKind::TaskQueued => println!("⏳ [{}] queued", event.task_id),
        PipelineEventKind::TaskStarted => println!(
            "🚀 [{}] started ({} mode)",
            event.task_id,
            event.mode.map(|m| m.as_str()).unwrap_or("?")
        ),
        PipelineEventKind::StageStarted => println!("   ▶ {}", stage),
        PipelineEventKind::StageCompleted => println!("   ✓ {}", stage),
        PipelineEventKind::StageFailed => println!("   ✗ {}", stage),
        PipelineEventKind::FixIterationStarted => {
            let iteration = event
                .data
                .as_ref()
                .and_then(|d| d.get("iteration"))
                .and_then(|v| v.as_u64())
                .unwrap_or(0);
            println!("   ↻ tests failing, fix attempt {}", iteration);
        }
        PipelineEventKind::TaskSucceeded | PipelineEventKind::TaskFailed => {}
    }
}

fn print_report(report: &TaskReport) {
    if report.succeeded() {
        println!("✅ Task {} succeeded", report.task_id);
    } else {
        println!("❌ Task {} failed", report.task_id);
    }
    for record in &report.stages {
        let mark = if record.success { "ok" } else { "failed" };
        println!("   {:<13} {:>7}ms  {}", record.stage.as_str(), record.duration_ms, mark);
    }
    if !report.changes.is_empty() {
        println!("   Changes:");
        for change in &report.changes {
            println!("     {}", change.render_line());
        }
    }
    if let Some(commit) = &report.commit {
        if commit.committed {
            println!(
                "   Commit: {} {}",
                commit.sha.as_deref().unwrap_or("(unknown)"),
                commit.message
            );
        }
    }
    if let Some(failure) = &report.failure {
        println!("   Error ({}): {}", failure.kind, failure.error);
        for test in &failure.failing_tests {
            println!("     - {}", test.summary_line());
        }
    }
}

async fn run_task(
    config: PipelineConfig,
    prompt: String,
    mode: Option<PipelineMode>,
    model: Option<AgentModel>,
    workspace: Option<PathBuf>,
    continue_from: Option<String>,
    skills: Option<PathBuf>,
) -> Result<bool> {
    let config = Arc::new(config);
    let store = Arc::new(TaskStore::open_at(&config.db_path)?);
    let backend = Arc::new(
        ClaudeCliBackend::new(config.agent_bin.clone()).with_args(config.agent_args.clone()),
    );
    let invoker = AgentInvoker::new(backend, config.agent_timeout());

    let (tx, mut rx) = mpsc::channel::<PipelineEvent>(100);
    let printer = tokio::spawn(async move {
        while let Some(event) = rx.recv().await {
            print_event(&event);
        }
    });

    let coordinator = Arc::new(
        Coordinator::new(invoker, config.clone())
            .with_event_channel(tx)
            .with_store(store),
    );
    let scheduler = TaskScheduler::new(coordinator, config.max_concurrent_tasks);

    let mut request = TaskRequest::new(prompt);
    if let Some(mode) = mode {
        request = request.with_mode(mode);
    }
    if let Some(model) = model {
        request = request.with_model(model);
    }
    if let Some(workspace) = workspace {
        request = request.with_workspace(workspace);
    }
    if let Some(path) = skills {
        let context = tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("Failed to read skills file {:?}", path))?;
        request = request.with_skills_context(context);
    }

    let handle = match continue_from {
        Some(previous) => scheduler.submit_continuation(request, &previous)?,
        None => scheduler.submit(request),
    };
    let report = handle.wait().await?;

    // Closing the event channel ends the printer.
    drop(scheduler);
    let _ = printer.await;

    print_report(&report);
    Ok(report.succeeded())
}

#[tokio::main]
async fn main() -> Result<()> {
    let env_path = io::runtime_file(".env");
    if env_path.exists() {
        let _ = dotenvy::from_path(&env_path);
    }
    init_logging();

    let args = Args::parse();
    let config = PipelineConfig::load().await?;

    match args.command {
        CliCommand::Run {
            prompt,
            mode,
            model,
            workspace,
            continue_from,
            skills,
        } => {
            let succeeded =
                run_task(config, prompt, mode, model, workspace, continue_from, skills).await?;
            if !succeeded {
                std::process::exit(1);
            }
        }
        CliCommand::History { limit } => {
            let store = TaskStore::open_at(&config.db_path)?;
            let tasks = store.list_recent(limit)?;
            if tasks.is_empty() {
                println!("No tasks yet.");
            }
            for task in tasks {
                let status = serde_json::to_value(task.status)?;
                println!(
                    "{}  {}  {:<6}  {:<9}  {}",
                    task.finished_at.format("%Y-%m-%d %H:%M"),
                    task.task_id,
                    task.mode.as_str(),
                    status["status"].as_str().unwrap_or("?"),
                    task.prompt.lines().next().unwrap_or("")
                );
            }
        }
        CliCommand::Show { task_id } => {
            let store = TaskStore::open_at(&config.db_path)?;
            let report = store
                .load_report(&task_id)?
                .ok_or_else(|| anyhow::anyhow!("Unknown task '{}'", task_id))?;
            println!("{}", serde_json::to_string_pretty(&report)?);
        }
        CliCommand::Config => {
            println!("{}", serde_json::to_string_pretty(&config)?);
        }
    }

    Ok(())
}
