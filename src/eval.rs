//! Offline evaluation: replay a task file through the chat service and score
//! each reply by substring match.

use crate::agent::TurnEvent;
use crate::service::ChatService;
use anyhow::Context;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Instant;
use tracing::info;

#[derive(Deserialize, Clone, Debug)]
pub struct EvalTask {
    pub id: String,
    pub conversation_id: String,
    pub prompt: String,
    #[serde(default)]
    pub expect: String,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
pub struct EvalSummary {
    pub task_success_pct: f64,
    pub avg_latency_ms: u64,
    pub num_tasks: usize,
    pub passed: usize,
    pub mode: String,
}

pub fn score_contains(output: &str, expect: &str) -> bool {
    expect.is_empty() || output.to_lowercase().contains(&expect.to_lowercase())
}

pub fn load_tasks(path: &Path) -> anyhow::Result<Vec<EvalTask>> {
    let raw = fs::read_to_string(path).with_context(|| format!("reading {}", path.display()))?;
    serde_json::from_str(&raw).with_context(|| format!("parsing {}", path.display()))
}

/// Run one task and return the full reply text the way a client would see it.
async fn run_task(service: &ChatService, task: &EvalTask) -> String {
    let mut output = String::new();
    let mut turn = match service.chat(&task.conversation_id, &task.prompt).await {
        Ok(turn) => turn,
        Err(e) => return format!("ERROR: {}", e),
    };
    while let Some(event) = turn.next().await {
        match event {
            Ok(TurnEvent::Text(fragment)) => output.push_str(&fragment),
            Ok(TurnEvent::Done(result)) => {
                output.push_str(&format!("\n\n[latency_ms={}]\n", result.elapsed.as_millis()));
            }
            Err(e) => {
                output.push_str(&format!("\nERROR: {}", e));
                break;
            }
        }
    }
    output
}

/// Run `tasks` in order, writing one transcript per task and a JSON summary
/// under `out_dir`.
pub async fn run_tasks(service: &ChatService, tasks: &[EvalTask], out_dir: &Path) -> anyhow::Result<EvalSummary> {
    let transcripts = out_dir.join("transcripts");
    fs::create_dir_all(&transcripts).with_context(|| format!("creating {}", transcripts.display()))?;

    let mut passed = 0;
    let mut latencies = Vec::with_capacity(tasks.len());

    for task in tasks {
        let start = Instant::now();
        let output = run_task(service, task).await;
        let dur_ms = start.elapsed().as_millis() as u64;
        latencies.push(dur_ms);

        let ok = score_contains(&output, &task.expect);
        if ok {
            passed += 1;
        }

        fs::write(
            transcripts.join(format!("{}.txt", task.id)),
            format!("PROMPT: {}\n\nRESPONSE:\n{}\n", task.prompt, output),
        )?;
        println!("{}: {} | {}ms", task.id, if ok { "PASS" } else { "FAIL" }, dur_ms);
    }

    let total = tasks.len();
    let pct = 100.0 * passed as f64 / total.max(1) as f64;
    let summary = EvalSummary {
        task_success_pct: (pct * 100.0).round() / 100.0,
        avg_latency_ms: latencies.iter().sum::<u64>() / latencies.len().max(1) as u64,
        num_tasks: total,
        passed,
        mode: service.agent().provider_label().to_string(),
    };

    fs::write(out_dir.join("metrics.json"), serde_json::to_string_pretty(&summary)?)?;
    info!(passed, total, "evaluation finished");
    Ok(summary)
}

pub async fn run(service: &ChatService, tasks_path: &Path, out_dir: &Path) -> anyhow::Result<EvalSummary> {
    let tasks = load_tasks(tasks_path)?;
    println!("[eval] loaded {} tasks", tasks.len());
    let summary = run_tasks(service, &tasks, out_dir).await?;
    println!("\nSummary: {}", serde_json::to_string(&summary)?);
    println!("[eval] wrote {}/metrics.json and {}/transcripts/*.txt", out_dir.display(), out_dir.display());
    Ok(summary)
}
