//! SQLite store for benchmark runs and their per-prompt results.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};

use rusqlite::{Connection, OptionalExtension, Row, params};
use serde::Serialize;
use tracing::{debug, info};

use crate::cli::bench::{BenchReport, LatencyStats, PromptRun};

pub struct Database {
    conn: Mutex<Connection>,
}

/// A saved run, without its per-prompt results.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoredRun {
    pub run_id: String,
    pub started_at: String,
    pub model: String,
    pub model_name: String,
    pub variant: String,
    pub stats: LatencyStats,
}

/// Averages over every saved run of one model that completed a prompt.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ModelComparison {
    pub model: String,
    pub model_name: String,
    pub run_count: usize,
    pub last_run: String,
    pub avg_latency_ms: f64,
    pub avg_p99_ms: f64,
    pub avg_tokens_per_sec: f64,
    pub avg_success_rate: f64,
}

const RUN_COLUMNS: &str = "id, started_at, model, model_name, variant,
    total_prompts, completed_prompts, average_ms, min_ms, max_ms,
    p50_ms, p90_ms, p95_ms, p99_ms, tokens_per_sec, success_rate";

impl Database {
    /// Open (or create) the database at `path` and run migrations.
    pub fn open(path: &Path) -> anyhow::Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let db = Self::from_connection(Connection::open(path)?)?;
        info!(path = %path.display(), "Database ready");
        Ok(db)
    }

    #[cfg(test)]
    pub fn open_in_memory() -> anyhow::Result<Self> {
        Self::from_connection(Connection::open_in_memory()?)
    }

    fn from_connection(conn: Connection) -> anyhow::Result<Self> {
        conn.execute_batch("PRAGMA foreign_keys = ON;")?;
        let db = Self {
            conn: Mutex::new(conn),
        };
        db.migrate()?;
        Ok(db)
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|p| p.into_inner())
    }

    fn migrate(&self) -> anyhow::Result<()> {
        let conn = self.conn();
        let version: i32 = conn.pragma_query_value(None, "user_version", |r| r.get(0))?;

        if version < 1 {
            conn.execute_batch(
                "CREATE TABLE IF NOT EXISTS benchmark_runs (
                    id                 TEXT PRIMARY KEY,
                    started_at         TEXT NOT NULL,
                    model              TEXT NOT NULL,
                    model_name         TEXT NOT NULL,
                    variant            TEXT NOT NULL,
                    total_prompts      INTEGER NOT NULL,
                    completed_prompts  INTEGER NOT NULL,
                    average_ms         REAL NOT NULL,
                    min_ms             REAL NOT NULL,
                    max_ms             REAL NOT NULL,
                    p50_ms             REAL NOT NULL,
                    p90_ms             REAL NOT NULL,
                    p95_ms             REAL NOT NULL,
                    p99_ms             REAL NOT NULL,
                    tokens_per_sec     REAL NOT NULL,
                    success_rate       REAL NOT NULL
                );
                CREATE TABLE IF NOT EXISTS benchmark_results (
                    id                 INTEGER PRIMARY KEY AUTOINCREMENT,
                    run_id             TEXT NOT NULL
                                       REFERENCES benchmark_runs(id) ON DELETE CASCADE,
                    prompt_index       INTEGER NOT NULL,
                    prompt             TEXT NOT NULL,
                    response           TEXT NOT NULL,
                    latency_ms         REAL NOT NULL,
                    prompt_tokens      INTEGER NOT NULL,
                    completion_tokens  INTEGER NOT NULL,
                    stopped_by         TEXT NOT NULL,
                    success            INTEGER NOT NULL
                );
                CREATE INDEX IF NOT EXISTS idx_results_run
                    ON benchmark_results(run_id, prompt_index);
                PRAGMA user_version = 1;",
            )?;
        }
        Ok(())
    }

    /// Save a finished run and all of its results in one transaction.
    pub fn insert_run(&self, report: &BenchReport) -> anyhow::Result<()> {
        let mut conn = self.conn();
        let tx = conn.transaction()?;
        let run_id = report.run_id.to_string();
        let s = &report.stats;

        tx.execute(
            &format!(
                "INSERT INTO benchmark_runs ({RUN_COLUMNS})
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14, ?15, ?16)"
            ),
            params![
                run_id,
                report
                    .started_at
                    .to_rfc3339_opts(chrono::SecondsFormat::Millis, true),
                report.model,
                report.display_name,
                report.variant.to_string(),
                s.total_prompts as i64,
                s.completed_prompts as i64,
                s.average_ms,
                s.min_ms,
                s.max_ms,
                s.p50_ms,
                s.p90_ms,
                s.p95_ms,
                s.p99_ms,
                s.tokens_per_sec,
                s.success_rate,
            ],
        )?;

        {
            let mut stmt = tx.prepare(
                "INSERT INTO benchmark_results (run_id, prompt_index, prompt, response,
                    latency_ms, prompt_tokens, completion_tokens, stopped_by, success)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9)",
            )?;
            for r in &report.runs {
                stmt.execute(params![
                    run_id,
                    r.index as i64,
                    r.prompt,
                    r.response,
                    r.latency_ms,
                    r.prompt_tokens as i64,
                    r.completion_tokens as i64,
                    r.stopped_by,
                    r.success,
                ])?;
            }
        }

        tx.commit()?;
        debug!(%run_id, results = report.runs.len(), "Benchmark run saved");
        Ok(())
    }

    /// Saved runs, newest first.
    pub fn list_runs(&self, limit: usize) -> anyhow::Result<Vec<StoredRun>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(&format!(
            "SELECT {RUN_COLUMNS} FROM benchmark_runs ORDER BY started_at DESC LIMIT ?1"
        ))?;
        let runs = stmt
            .query_map([limit as i64], run_from_row)?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(runs)
    }

    pub fn find_run(&self, run_id: &str) -> anyhow::Result<Option<StoredRun>> {
        let conn = self.conn();
        let run = conn
            .query_row(
                &format!("SELECT {RUN_COLUMNS} FROM benchmark_runs WHERE id = ?1"),
                [run_id],
                run_from_row,
            )
            .optional()?;
        Ok(run)
    }

    /// Per-prompt results of `run_id`, in prompt order.
    pub fn results_for_run(&self, run_id: &str) -> anyhow::Result<Vec<PromptRun>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT prompt_index, prompt, response, latency_ms, prompt_tokens,
                    completion_tokens, stopped_by, success
             FROM benchmark_results WHERE run_id = ?1 ORDER BY prompt_index",
        )?;
        let results = stmt
            .query_map([run_id], |row| {
                Ok(PromptRun {
                    index: row.get::<_, i64>(0)? as usize,
                    prompt: row.get(1)?,
                    response: row.get(2)?,
                    latency_ms: row.get(3)?,
                    prompt_tokens: row.get::<_, i64>(4)? as usize,
                    completion_tokens: row.get::<_, i64>(5)? as usize,
                    stopped_by: row.get(6)?,
                    success: row.get(7)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(results)
    }

    /// Delete a run and its results. Returns `false` if no such run exists.
    pub fn delete_run(&self, run_id: &str) -> anyhow::Result<bool> {
        let deleted = self
            .conn()
            .execute("DELETE FROM benchmark_runs WHERE id = ?1", [run_id])?;
        if deleted > 0 {
            debug!(run_id, "Benchmark run deleted");
        }
        Ok(deleted > 0)
    }

    /// One row per model, fastest average latency first.
    pub fn model_comparisons(&self) -> anyhow::Result<Vec<ModelComparison>> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT model, model_name, COUNT(*), MAX(started_at),
                    AVG(average_ms), AVG(p99_ms), AVG(tokens_per_sec), AVG(success_rate)
             FROM benchmark_runs
             WHERE completed_prompts > 0
             GROUP BY model, model_name
             ORDER BY AVG(average_ms) ASC",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok(ModelComparison {
                    model: row.get(0)?,
                    model_name: row.get(1)?,
                    run_count: row.get::<_, i64>(2)? as usize,
                    last_run: row.get(3)?,
                    avg_latency_ms: row.get(4)?,
                    avg_p99_ms: row.get(5)?,
                    avg_tokens_per_sec: row.get(6)?,
                    avg_success_rate: row.get(7)?,
                })
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;
        Ok(rows)
    }
}

fn run_from_row(row: &Row<'_>) -> rusqlite::Result<StoredRun> {
    Ok(StoredRun {
        run_id: row.get(0)?,
        started_at: row.get(1)?,
        model: row.get(2)?,
        model_name: row.get(3)?,
        variant: row.get(4)?,
        stats: LatencyStats {
            total_prompts: row.get::<_, i64>(5)? as usize,
            completed_prompts: row.get::<_, i64>(6)? as usize,
            average_ms: row.get(7)?,
            min_ms: row.get(8)?,
            max_ms: row.get(9)?,
            p50_ms: row.get(10)?,
            p90_ms: row.get(11)?,
            p95_ms: row.get(12)?,
            p99_ms: row.get(13)?,
            tokens_per_sec: row.get(14)?,
            success_rate: row.get(15)?,
        },
    })
}
