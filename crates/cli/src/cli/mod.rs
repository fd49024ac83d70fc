pub mod bench;
pub mod config_cmd;
pub mod detect;
pub mod run;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::AppConfig;
use chat_core::SessionOptions;

#[derive(Parser)]
#[command(
    name = "ondevice-chat",
    version,
    about = "Single-turn chat with on-device GGUF models"
)]
pub struct Cli {
    #[command(flatten)]
    pub global: GlobalArgs,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Debug, clap::Args, Clone)]
pub struct GlobalArgs {
    /// Decode threads (default: available cores, at most 4).
    #[arg(long, global = true, env = "ONDEVICE_THREADS")]
    pub threads: Option<i32>,

    /// Sampler seed.
    #[arg(long, global = true, env = "ONDEVICE_SEED")]
    pub seed: Option<u32>,

    /// Lower cap on new tokens per reply.
    #[arg(long, global = true, env = "ONDEVICE_MAX_NEW_TOKENS")]
    pub max_new_tokens: Option<u32>,

    /// Emit logs as JSON lines.
    #[arg(long, global = true)]
    pub log_json: bool,
}

impl GlobalArgs {
    /// Session options from the config file, overridden by flags.
    pub fn session_options(&self, cfg: &AppConfig) -> SessionOptions {
        SessionOptions {
            threads: self.threads.or(cfg.session.threads),
            seed: self.seed.or(cfg.session.seed),
            max_new_tokens: self.max_new_tokens.or(cfg.session.max_new_tokens),
        }
    }
}

#[derive(Subcommand)]
pub enum Commands {
    /// Load a model and answer prompts, one turn at a time.
    Run(RunArgs),

    /// Benchmark a model and browse saved runs.
    Bench(BenchArgs),

    /// Show which template and defaults a model path selects.
    Detect(DetectArgs),

    /// View / edit configuration.
    Config(ConfigArgs),
}

//  Subcommand argument structs

#[derive(Debug, clap::Args, Clone)]
pub struct RunArgs {
    /// Path to a GGUF model file (default: `default_model` from config).
    pub model: Option<PathBuf>,

    /// Answer this prompt and exit instead of reading stdin.
    #[arg(short, long)]
    pub prompt: Option<String>,

    /// Print reason and timing after each reply.
    #[arg(long)]
    pub stats: bool,
}

#[derive(Debug, clap::Args)]
pub struct BenchArgs {
    #[command(subcommand)]
    pub action: BenchAction,
}

#[derive(Debug, Subcommand)]
pub enum BenchAction {
    /// Time a set of prompts against one model.
    Run(BenchRunArgs),
    /// List saved runs, newest first.
    History {
        #[arg(long, default_value_t = 20)]
        limit: usize,
        #[arg(long)]
        json: bool,
    },
    /// Show the per-prompt results of a saved run.
    Show {
        run_id: String,
        #[arg(long)]
        json: bool,
    },
    /// Average saved runs per model.
    Compare {
        #[arg(long)]
        json: bool,
    },
    /// Delete a saved run and its results.
    Delete { run_id: String },
}

#[derive(Debug, clap::Args, Clone)]
pub struct BenchRunArgs {
    /// Path to a GGUF model file.
    pub model: PathBuf,

    /// File with one prompt per line (default: built-in prompts).
    #[arg(long)]
    pub prompts: Option<PathBuf>,

    /// Number of prompts to run; the list is cycled as needed.
    #[arg(long)]
    pub count: Option<usize>,

    /// Print the report as JSON.
    #[arg(long)]
    pub json: bool,

    /// Do not save the run to the benchmark database.
    #[arg(long)]
    pub no_save: bool,
}

#[derive(Debug, clap::Args, Clone)]
pub struct DetectArgs {
    /// Model path (the file need not exist).
    pub path: PathBuf,
}

#[derive(Debug, clap::Args)]
pub struct ConfigArgs {
    #[command(subcommand)]
    pub action: ConfigAction,
}

#[derive(Debug, Subcommand)]
pub enum ConfigAction {
    /// Display the current configuration.
    Show,
    /// Set a configuration value (`none` clears it).
    Set { key: String, value: String },
}
