mod cli;
mod config;
mod db;
mod engine;

use clap::Parser;
use tracing_subscriber::EnvFilter;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let args = cli::Cli::parse();

    //  Logging
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("info,ondevice_chat=debug,chat_core=debug"));
    if args.global.log_json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    } else {
        tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .init();
    }

    match args.command {
        cli::Commands::Run(run_args) => cli::run::execute(args.global, run_args).await,
        cli::Commands::Bench(bench_args) => cli::bench::execute(args.global, bench_args).await,
        cli::Commands::Detect(detect_args) => cli::detect::execute(detect_args),
        cli::Commands::Config(c) => cli::config_cmd::execute(c),
    }
}
