//! `bench`: run a prompt set through one session, summarize latency, and
//! browse the runs saved in the benchmark database.

use std::path::Path;
use std::time::Instant;

use chat_core::{InferenceEngine, ModelVariant, Session, SessionOptions, generate};
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};
use uuid::Uuid;

use crate::cli::{BenchAction, BenchArgs, BenchRunArgs, GlobalArgs};
use crate::config::AppConfig;
use crate::db::{Database, ModelComparison, StoredRun};

/// Prompts of increasing difficulty: recall, explanation, open generation,
/// arithmetic and a small reasoning step.
pub const BUILTIN_PROMPTS: [&str; 5] = [
    "What is artificial intelligence?",
    "Explain quantum computing in simple terms.",
    "Write a short story about a robot learning emotions.",
    "If a pen costs ₹15, how many pens can you buy with ₹120?",
    "A is taller than B, B is taller than C; who is the shortest among A, B, and C?",
];

#[derive(Debug, Clone, Serialize)]
pub struct PromptRun {
    pub index: usize,
    pub prompt: String,
    pub response: String,
    pub latency_ms: f64,
    pub prompt_tokens: usize,
    pub completion_tokens: usize,
    pub stopped_by: String,
    pub success: bool,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct LatencyStats {
    pub total_prompts: usize,
    pub completed_prompts: usize,
    pub average_ms: f64,
    pub min_ms: f64,
    pub max_ms: f64,
    pub p50_ms: f64,
    pub p90_ms: f64,
    pub p95_ms: f64,
    pub p99_ms: f64,
    pub tokens_per_sec: f64,
    /// Percentage of prompts that finished normally.
    pub success_rate: f64,
}

impl LatencyStats {
    /// Statistics over the successful runs; failures only count toward
    /// `total_prompts` and `success_rate`.
    pub fn from_runs(runs: &[PromptRun]) -> Self {
        let ok: Vec<&PromptRun> = runs.iter().filter(|r| r.success).collect();
        let mut latencies: Vec<f64> = ok.iter().map(|r| r.latency_ms).collect();
        if latencies.is_empty() {
            return Self {
                total_prompts: runs.len(),
                ..Self::default()
            };
        }
        latencies.sort_by(f64::total_cmp);

        let total_ms: f64 = latencies.iter().sum();
        let total_tokens: usize = ok.iter().map(|r| r.completion_tokens).sum();
        Self {
            total_prompts: runs.len(),
            completed_prompts: ok.len(),
            average_ms: total_ms / latencies.len() as f64,
            min_ms: latencies[0],
            max_ms: latencies[latencies.len() - 1],
            p50_ms: percentile(&latencies, 0.50),
            p90_ms: percentile(&latencies, 0.90),
            p95_ms: percentile(&latencies, 0.95),
            p99_ms: percentile(&latencies, 0.99),
            tokens_per_sec: if total_ms > 0.0 {
                total_tokens as f64 / (total_ms / 1000.0)
            } else {
                0.0
            },
            success_rate: ok.len() as f64 / runs.len() as f64 * 100.0,
        }
    }
}

/// Element `floor(p * (n - 1))` of an ascending slice.
fn percentile(sorted: &[f64], p: f64) -> f64 {
    if sorted.is_empty() {
        return 0.0;
    }
    let index = (p * (sorted.len() - 1) as f64) as usize;
    sorted[index.min(sorted.len() - 1)]
}

#[derive(Debug, Serialize)]
pub struct BenchReport {
    pub run_id: Uuid,
    pub started_at: DateTime<Utc>,
    pub model: String,
    pub variant: ModelVariant,
    pub display_name: &'static str,
    pub runs: Vec<PromptRun>,
    pub stats: LatencyStats,
}

/// One prompt per line. Surrounding quotes, trailing commas and `+`
/// continuation marks are dropped, so pasted string lists work as-is.
pub fn parse_prompts(text: &str) -> Vec<String> {
    text.lines()
        .map(|line| {
            line.trim()
                .trim_end_matches(|c: char| c == ',' || c == '+' || c.is_whitespace())
                .trim_matches('"')
                .trim()
        })
        .filter(|line| !line.is_empty())
        .map(str::to_owned)
        .collect()
}

/// `count` prompts taken from `prompts`, cycling when it is shorter.
pub fn select_prompts(prompts: &[String], count: Option<usize>) -> Vec<String> {
    let count = count.unwrap_or(prompts.len());
    prompts.iter().cycle().take(count).cloned().collect()
}

pub async fn execute(global: GlobalArgs, args: BenchArgs) -> anyhow::Result<()> {
    match args.action {
        BenchAction::Run(run_args) => run_bench(global, run_args).await,
        BenchAction::History { limit, json } => {
            let runs = open_db()?.list_runs(limit)?;
            if json {
                println!("{}", serde_json::to_string_pretty(&runs)?);
            } else {
                print_history(&runs);
            }
            Ok(())
        }
        BenchAction::Show { run_id, json } => {
            let db = open_db()?;
            let Some(run) = db.find_run(&run_id)? else {
                anyhow::bail!("No saved benchmark run {run_id}");
            };
            let results = db.results_for_run(&run_id)?;
            if json {
                let value = serde_json::json!({ "run": run, "results": results });
                println!("{}", serde_json::to_string_pretty(&value)?);
            } else {
                print_run_header(&run.run_id, &run.started_at, &run.model, &run.model_name);
                print_results(&results, &run.stats);
            }
            Ok(())
        }
        BenchAction::Compare { json } => {
            let rows = open_db()?.model_comparisons()?;
            if json {
                println!("{}", serde_json::to_string_pretty(&rows)?);
            } else {
                print_comparison(&rows);
            }
            Ok(())
        }
        BenchAction::Delete { run_id } => {
            if !open_db()?.delete_run(&run_id)? {
                anyhow::bail!("No saved benchmark run {run_id}");
            }
            println!("Deleted run {run_id}");
            Ok(())
        }
    }
}

fn open_db() -> anyhow::Result<Database> {
    Database::open(&AppConfig::db_path())
}

async fn run_bench(global: GlobalArgs, args: BenchRunArgs) -> anyhow::Result<()> {
    let cfg = AppConfig::load_or_default()?;
    let options = global.session_options(&cfg);

    let source = match &args.prompts {
        Some(path) => parse_prompts(&std::fs::read_to_string(path)?),
        None => BUILTIN_PROMPTS.iter().map(|p| (*p).to_owned()).collect(),
    };
    if source.is_empty() {
        anyhow::bail!("No prompts to run");
    }
    let prompts = select_prompts(&source, args.count);

    let engine = crate::engine::create()?;
    let model = args.model.clone();
    let report =
        tokio::task::spawn_blocking(move || run(engine, options, &model, &prompts)).await??;

    if !args.no_save {
        open_db()?.insert_run(&report)?;
        info!(run_id = %report.run_id, "Benchmark saved");
    }

    if args.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_report(&report);
    }
    Ok(())
}

fn run<E: InferenceEngine>(
    engine: std::sync::Arc<E>,
    options: SessionOptions,
    model: &Path,
    prompts: &[String],
) -> anyhow::Result<BenchReport> {
    let run_id = Uuid::new_v4();
    let started_at = Utc::now();

    let mut session = Session::with_options(engine, options);
    session.initialize(model)?;
    info!(%run_id, model = %model.display(), prompts = prompts.len(), "Benchmark started");

    let mut runs = Vec::with_capacity(prompts.len());
    for (index, prompt) in prompts.iter().enumerate() {
        let start = Instant::now();
        let result = generate(&mut session, prompt);
        let latency_ms = start.elapsed().as_secs_f64() * 1000.0;
        let success = result.stopped_by.is_success();
        if !success {
            warn!(index, reason = %result.stopped_by, "Prompt failed");
        }
        runs.push(PromptRun {
            index,
            prompt: prompt.clone(),
            response: result.text,
            latency_ms,
            prompt_tokens: result.prompt_tokens,
            completion_tokens: result.completion_tokens,
            stopped_by: result.stopped_by.to_string(),
            success,
        });
    }

    let stats = LatencyStats::from_runs(&runs);
    info!(
        %run_id,
        avg_ms = stats.average_ms,
        p99_ms = stats.p99_ms,
        success_rate = stats.success_rate,
        "Benchmark completed"
    );

    Ok(BenchReport {
        run_id,
        started_at,
        model: session.model_path().unwrap_or(model).display().to_string(),
        variant: session.variant(),
        display_name: session.profile().display_name,
        runs,
        stats,
    })
}

fn print_report(report: &BenchReport) {
    print_run_header(
        &report.run_id.to_string(),
        &report.started_at.to_rfc3339(),
        &report.model,
        report.display_name,
    );
    print_results(&report.runs, &report.stats);
}

fn print_run_header(run_id: &str, started_at: &str, model: &str, model_name: &str) {
    println!("Run {run_id} at {started_at}");
    println!("Model: {model} ({model_name})\n");
}

fn print_results(runs: &[PromptRun], s: &LatencyStats) {
    println!("{:>3}  {:>10}  {:>6}  {:<16}  PROMPT", "#", "LATENCY", "TOKENS", "REASON");
    for r in runs {
        let prompt: String = r.prompt.chars().take(48).collect();
        println!(
            "{:>3}  {:>8.0}ms  {:>6}  {:<16}  {}",
            r.index + 1,
            r.latency_ms,
            r.completion_tokens,
            r.stopped_by,
            prompt
        );
    }

    println!();
    println!("Completed: {}/{} ({:.1}%)", s.completed_prompts, s.total_prompts, s.success_rate);
    println!(
        "Latency ms: avg {:.0}  min {:.0}  max {:.0}",
        s.average_ms, s.min_ms, s.max_ms
    );
    println!(
        "            p50 {:.0}  p90 {:.0}  p95 {:.0}  p99 {:.0}",
        s.p50_ms, s.p90_ms, s.p95_ms, s.p99_ms
    );
    println!("Throughput: {:.1} tok/s", s.tokens_per_sec);
}

fn print_history(runs: &[StoredRun]) {
    if runs.is_empty() {
        println!("No saved runs.");
        return;
    }
    println!(
        "{:<36}  {:<24}  {:<16}  {:>7}  {:>9}  {:>9}",
        "RUN", "STARTED", "MODEL", "DONE", "AVG", "P99"
    );
    for r in runs {
        println!(
            "{:<36}  {:<24}  {:<16}  {:>3}/{:<3}  {:>7.0}ms  {:>7.0}ms",
            r.run_id,
            r.started_at,
            r.model_name,
            r.stats.completed_prompts,
            r.stats.total_prompts,
            r.stats.average_ms,
            r.stats.p99_ms
        );
    }
}

fn print_comparison(rows: &[ModelComparison]) {
    if rows.is_empty() {
        println!("No completed runs to compare.");
        return;
    }
    println!(
        "{:<16}  {:>4}  {:>9}  {:>9}  {:>8}  {:>7}  MODEL",
        "NAME", "RUNS", "AVG", "P99", "TOK/S", "OK"
    );
    for c in rows {
        println!(
            "{:<16}  {:>4}  {:>7.0}ms  {:>7.0}ms  {:>8.1}  {:>6.1}%  {}",
            c.model_name,
            c.run_count,
            c.avg_latency_ms,
            c.avg_p99_ms,
            c.avg_tokens_per_sec,
            c.avg_success_rate,
            c.model
        );
    }
}
