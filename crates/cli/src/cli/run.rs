use std::io::{self, BufRead, Write};
use std::sync::{Arc, Mutex};

use chat_core::{GenerateEvent, GenerationResult, InferenceEngine, Session, generate_blocking};
use tokio::sync::mpsc;
use tracing::info;

use crate::cli::{GlobalArgs, RunArgs};
use crate::config::AppConfig;

pub async fn execute(global: GlobalArgs, args: RunArgs) -> anyhow::Result<()> {
    let cfg = AppConfig::load_or_default()?;
    let Some(model) = args.model.clone().or(cfg.default_model.clone()) else {
        anyhow::bail!("No model given and no default_model configured");
    };

    let engine = crate::engine::create()?;
    let mut session = Session::with_options(engine, global.session_options(&cfg));

    info!(model = %model.display(), "Loading model…");
    let session = tokio::task::spawn_blocking(move || {
        session.initialize(&model).map(|()| session)
    })
    .await??;
    info!(
        path = ?session.model_path(),
        variant = %session.variant(),
        model = session.profile().display_name,
        "Model loaded"
    );
    let session = Arc::new(Mutex::new(session));

    if let Some(prompt) = args.prompt {
        let result = reply(&session, prompt).await?;
        report(&result, args.stats);
        return Ok(());
    }

    println!("Model loaded. Each line is answered on its own (Ctrl-D to quit).\n");

    let stdin = io::stdin();
    let mut stdout = io::stdout();

    loop {
        print!("> ");
        stdout.flush()?;

        let mut line = String::new();
        if stdin.lock().read_line(&mut line)? == 0 {
            println!();
            break; // EOF
        }
        let line = line.trim();
        if line.is_empty() {
            continue;
        }

        let result = reply(&session, line.to_owned()).await?;
        report(&result, args.stats);
        println!();
    }

    Ok(())
}

/// Stream one reply to stdout and return its result.
async fn reply<E: InferenceEngine>(
    session: &Arc<Mutex<Session<E>>>,
    prompt: String,
) -> anyhow::Result<GenerationResult> {
    let (tx, mut rx) = mpsc::channel(64);

    let session = session.clone();
    let worker = tokio::task::spawn_blocking(move || {
        let mut guard = session.lock().unwrap_or_else(|p| p.into_inner());
        generate_blocking(&mut *guard, &prompt, tx)
    });

    let mut stdout = io::stdout();
    let mut streamed = String::new();
    while let Some(event) = rx.recv().await {
        match event {
            GenerateEvent::Token(piece) => {
                print!("{piece}");
                stdout.flush()?;
                streamed.push_str(&piece);
            }
            GenerateEvent::Done(_) => break,
        }
    }

    let result = worker.await?;
    // Streamed text is raw; the cleaned reply replaces it when they differ.
    if streamed.trim() != result.text {
        if !streamed.is_empty() {
            println!();
        }
        print!("{}", result.text);
    }
    println!();
    Ok(result)
}

fn report(result: &GenerationResult, stats: bool) {
    if stats {
        eprintln!(
            "  [{} | prompt: {} tok, {:.0} ms | gen: {} tok, {:.1} tok/s]",
            result.stopped_by,
            result.prompt_tokens,
            result.prompt_ms,
            result.completion_tokens,
            result.tokens_per_sec()
        );
    }
}
