//! CLI smoke check: run one process definition on the in-memory backend.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use arbor::observability::{self, ObservabilityOptions};
use arbor::{EngineContext, Subscription, Task, TaskAction, TreeNode, Worker, WorkerConfig, Workitem};
use arbor_backend_memory::MemoryBackend;
use clap::Parser;
use serde_json::Value;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;

#[derive(Parser, Debug)]
#[command(name = "arbor-smoke", about = "Run a process definition to completion.")]
struct SmokeArgs {
    /// JSON tree (`["name", {attributes}, [children]]`); a built-in sample
    /// runs when omitted.
    #[arg(long)]
    definition: Option<PathBuf>,
    /// JSON object used as the initial workitem fields.
    #[arg(long)]
    fields: Option<String>,
    /// Give up after this many seconds.
    #[arg(long, default_value_t = 10)]
    timeout_secs: u64,
}

fn sample_definition() -> TreeNode {
    TreeNode::new("sequence")
        .with_child(TreeNode::new("echo").with_attribute("message", "smoke started"))
        .with_child(
            TreeNode::new("concurrence")
                .with_child(TreeNode::new("noop").with_attribute("tag", "fast"))
                .with_child(
                    TreeNode::new("wait")
                        .with_attribute("for", "1s")
                        .with_attribute("timeout", "5s"),
                ),
        )
        .with_child(TreeNode::new("echo").with_attribute("message", "smoke finished"))
}

fn load_definition(path: Option<&PathBuf>) -> Result<TreeNode> {
    let Some(path) = path else {
        return Ok(sample_definition());
    };
    let raw = std::fs::read_to_string(path)
        .with_context(|| format!("failed to read {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("invalid tree in {}", path.display()))
}

fn load_workitem(fields: Option<&str>) -> Result<Workitem> {
    let Some(raw) = fields else {
        return Ok(Workitem::default());
    };
    match serde_json::from_str::<Value>(raw).context("invalid --fields JSON")? {
        Value::Object(fields) => Ok(Workitem::new(fields)),
        other => Err(anyhow!("--fields must be a JSON object, got {other}")),
    }
}

fn is_outcome(action: TaskAction) -> bool {
    action.is_terminal() || action == TaskAction::Error
}

async fn run_smoke(args: SmokeArgs) -> Result<i32> {
    let tree = load_definition(args.definition.as_ref())?;
    let workitem = load_workitem(args.fields.as_deref())?;
    let config = WorkerConfig::from_env()?;

    let backend = MemoryBackend::new();
    let ctx = EngineContext::with_builtins(Arc::new(backend.clone()));
    let mut worker = Worker::new(ctx, config);

    let (tx, mut rx) = mpsc::unbounded_channel::<Task>();
    worker.subscribe(
        Subscription::All,
        Arc::new(move |task: &Task| {
            if is_outcome(task.action) {
                let _ = tx.send(task.clone());
            }
        }),
    );

    println!("Definition: {}", serde_json::to_string(&tree)?);
    let wfid = worker.launch(tree, workitem, None).await?;
    println!("Launched process {wfid}");

    let shutdown = CancellationToken::new();
    let stopper = shutdown.clone();
    let deadline = Duration::from_secs(args.timeout_secs);
    let watcher = async move {
        let outcome = tokio::time::timeout(deadline, rx.recv()).await;
        stopper.cancel();
        outcome
    };
    let ((), outcome) = tokio::join!(worker.run(shutdown), watcher);

    let code = match outcome {
        Ok(Some(task)) => {
            let workitem = task
                .workitem
                .as_ref()
                .map(serde_json::to_string_pretty)
                .transpose()?
                .unwrap_or_else(|| "null".to_string());
            println!("Process {wfid} finished: {}", task.action);
            println!("Workitem: {workitem}");
            if let Some(error) = &task.error {
                println!("Error: {}", error.message);
            }
            if task.action == TaskAction::Terminated { 0 } else { 1 }
        }
        Ok(None) => {
            println!("Worker stopped before the process finished");
            1
        }
        Err(_) => {
            println!(
                "Process {wfid} still running after {}s ({} expressions left)",
                args.timeout_secs,
                backend.expressions().len()
            );
            1
        }
    };
    Ok(code)
}

pub fn main() {
    let args = SmokeArgs::parse();
    observability::init(ObservabilityOptions::default());
    let runtime = tokio::runtime::Runtime::new().expect("tokio runtime");
    let code = match runtime.block_on(run_smoke(args)) {
        Ok(code) => code,
        Err(err) => {
            println!("Smoke run failed: {err:#}");
            1
        }
    };
    std::process::exit(code);
}
