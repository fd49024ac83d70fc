//! Single-turn text generation over a [`Session`].

use std::fmt;
use std::time::Instant;

use tokio::sync::mpsc;
use tracing::{debug, warn};

use crate::batch::TokenBatch;
use crate::engine::{InferenceEngine, TokenId};
use crate::error::{APOLOGY, ChatError, Result};
use crate::registry::VariantProfile;
use crate::session::Session;

/// A prompt ready for decoding.
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    /// The user message with the variant template applied.
    pub raw_prompt: String,
    pub tokens: Vec<TokenId>,
    pub max_new_tokens: u32,
}

/// Why a generation call ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StopReason {
    /// The model emitted its end-of-sequence token.
    Eos,
    /// A stop sequence matched; output was truncated before it.
    StopSequence(String),
    /// `max_new_tokens` reached.
    TokenBudget,
    /// A decode call failed; output holds what was produced before it.
    DecodeFailure,
    /// The streaming receiver went away.
    Cancelled,
    NotInitialized,
    TokenizeFailed,
    ContextResetFailed,
    /// The prompt leaves no room for a reply.
    BudgetExhausted,
}

impl StopReason {
    /// Whether the reply was produced by a normal run of the loop.
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Eos | Self::StopSequence(_) | Self::TokenBudget)
    }

    fn from_error(e: &ChatError) -> Self {
        match e {
            ChatError::NotInitialized => Self::NotInitialized,
            ChatError::TokenizationFailed(_) => Self::TokenizeFailed,
            ChatError::ContextCreationFailed(_) => Self::ContextResetFailed,
            ChatError::BudgetExhausted { .. } => Self::BudgetExhausted,
            _ => Self::DecodeFailure,
        }
    }
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Eos => write!(f, "eos"),
            Self::StopSequence(s) => write!(f, "stop_sequence:{s}"),
            Self::TokenBudget => write!(f, "token_budget"),
            Self::DecodeFailure => write!(f, "decode_failure"),
            Self::Cancelled => write!(f, "cancelled"),
            Self::NotInitialized => write!(f, "not_initialized"),
            Self::TokenizeFailed => write!(f, "tokenize_failed"),
            Self::ContextResetFailed => write!(f, "context_reset_failed"),
            Self::BudgetExhausted => write!(f, "budget_exhausted"),
        }
    }
}

/// Output of one generation call. `text` is always caller-presentable.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerationResult {
    pub text: String,
    pub stopped_by: StopReason,
    pub prompt_tokens: usize,
    pub completion_tokens: usize,
    /// Wall time spent decoding the prompt.
    pub prompt_ms: f64,
    /// Wall time spent in the sampling loop.
    pub generation_ms: f64,
}

impl GenerationResult {
    fn failed(error: &ChatError) -> Self {
        Self {
            text: error.user_message().to_owned(),
            stopped_by: StopReason::from_error(error),
            prompt_tokens: 0,
            completion_tokens: 0,
            prompt_ms: 0.0,
            generation_ms: 0.0,
        }
    }

    /// Prompt processing speed (tokens/s).
    pub fn prompt_tokens_per_sec(&self) -> f64 {
        if self.prompt_ms > 0.0 {
            self.prompt_tokens as f64 / (self.prompt_ms / 1000.0)
        } else {
            0.0
        }
    }

    /// Generation speed (tokens/s).
    pub fn tokens_per_sec(&self) -> f64 {
        if self.generation_ms > 0.0 {
            self.completion_tokens as f64 / (self.generation_ms / 1000.0)
        } else {
            0.0
        }
    }
}

/// Events emitted by [`generate_blocking`].
#[derive(Debug, Clone)]
pub enum GenerateEvent {
    /// Text that can no longer be part of a stop sequence.
    Token(String),
    Done(GenerationResult),
}

/// New-token budget for a prompt of `prompt_tokens` tokens:
/// `min(cap, context_length - prompt_tokens - safety_margin)`.
pub fn token_budget(
    profile: &VariantProfile,
    cap_override: Option<u32>,
    context_length: u32,
    prompt_tokens: usize,
) -> Result<u32> {
    let cap = cap_override
        .filter(|&c| c > 0)
        .map_or(profile.max_new_tokens, |c| c.min(profile.max_new_tokens));
    let room =
        i64::from(context_length) - prompt_tokens as i64 - i64::from(profile.safety_margin);
    let budget = room.min(i64::from(cap));
    if budget <= 0 {
        return Err(ChatError::BudgetExhausted {
            prompt_tokens,
            context_length,
        });
    }
    Ok(budget as u32)
}

/// Generate a reply to `prompt`. Never fails; see [`GenerationResult::stopped_by`].
pub fn generate<E: InferenceEngine>(session: &mut Session<E>, prompt: &str) -> GenerationResult {
    run(session, prompt, &mut Silent)
}

/// Like [`generate`], streaming text over `tx` as it becomes final.
///
/// Blocks the calling thread; run it under `spawn_blocking`. Dropping the
/// receiver cancels generation before the next token.
pub fn generate_blocking<E: InferenceEngine>(
    session: &mut Session<E>,
    prompt: &str,
    tx: mpsc::Sender<GenerateEvent>,
) -> GenerationResult {
    let mut sink = Channel { tx: &tx };
    let result = run(session, prompt, &mut sink);
    let _ = tx.blocking_send(GenerateEvent::Done(result.clone()));
    result
}

trait Sink {
    fn cancelled(&self) -> bool;
    fn emit(&mut self, text: &str);
}

struct Silent;

impl Sink for Silent {
    fn cancelled(&self) -> bool {
        false
    }
    fn emit(&mut self, _text: &str) {}
}

struct Channel<'a> {
    tx: &'a mpsc::Sender<GenerateEvent>,
}

impl Sink for Channel<'_> {
    fn cancelled(&self) -> bool {
        self.tx.is_closed()
    }

    fn emit(&mut self, text: &str) {
        if self
            .tx
            .blocking_send(GenerateEvent::Token(text.to_owned()))
            .is_err()
        {
            debug!("Generation cancelled (receiver dropped)");
        }
    }
}

fn run<E: InferenceEngine, S: Sink>(
    session: &mut Session<E>,
    prompt: &str,
    sink: &mut S,
) -> GenerationResult {
    if !session.is_initialized() {
        return GenerationResult::failed(&ChatError::NotInitialized);
    }

    // Every call starts from a clean decoding state.
    if let Err(e) = session.reset_context() {
        warn!(error = %e, "Failed to reset context");
        return GenerationResult::failed(&e);
    }

    let profile = session.profile();
    let stops = session.stop_sequences();
    let cap_override = session.options().max_new_tokens;
    let Some(config) = session.config() else {
        return GenerationResult::failed(&ChatError::NotInitialized);
    };
    let Some(live) = session.live() else {
        return GenerationResult::failed(&ChatError::ContextCreationFailed(
            "context unavailable after reset".into(),
        ));
    };

    let raw_prompt = profile.template.apply(prompt);
    let tokens = match live
        .engine
        .tokenize(live.model.raw(), &raw_prompt, profile.add_bos)
    {
        Ok(t) if !t.is_empty() => t,
        Ok(_) => {
            return GenerationResult::failed(&ChatError::TokenizationFailed(
                "prompt produced no tokens".into(),
            ));
        }
        Err(e) => {
            warn!(error = %e, "Could not tokenize prompt");
            return GenerationResult::failed(&e);
        }
    };

    let max_new_tokens =
        match token_budget(profile, cap_override, config.context_length, tokens.len()) {
            Ok(n) => n,
            Err(e) => {
                warn!(error = %e, "No token budget left");
                let mut result = GenerationResult::failed(&e);
                result.prompt_tokens = tokens.len();
                return result;
            }
        };

    let request = GenerationRequest {
        raw_prompt,
        tokens,
        max_new_tokens,
    };
    debug!(
        variant = %profile.variant,
        prompt_tokens = request.tokens.len(),
        max_new_tokens = request.max_new_tokens,
        "Generating"
    );

    let engine = live.engine;
    let model = live.model.raw();
    let context = live.context.raw_mut();
    let sampler = live.sampler.raw_mut();
    let prompt_tokens = request.tokens.len();

    //  Prompt processing
    let t_prompt = Instant::now();
    let mut batch = TokenBatch::for_prompt(&request.tokens);
    if let Err(e) = engine.decode(context, &batch) {
        warn!(error = %e, "Prompt decode failed");
        return GenerationResult {
            text: APOLOGY.to_owned(),
            stopped_by: StopReason::DecodeFailure,
            prompt_tokens,
            completion_tokens: 0,
            prompt_ms: elapsed_ms(t_prompt),
            generation_ms: 0.0,
        };
    }
    let prompt_ms = elapsed_ms(t_prompt);

    //  Token generation loop
    let t_gen = Instant::now();
    let budget = request.max_new_tokens as usize;
    let mut n_cur = prompt_tokens as i32;
    let mut output = String::new();
    // Bytes of a multibyte character still split across tokens.
    let mut pending: Vec<u8> = Vec::new();
    let mut emitted = 0usize;
    let mut completion_tokens = 0usize;
    let mut stopped_by = StopReason::TokenBudget;

    while completion_tokens < budget {
        if sink.cancelled() {
            stopped_by = StopReason::Cancelled;
            break;
        }

        let token = engine.sample(context, sampler, batch.n_tokens() - 1);
        completion_tokens += 1;

        if engine.is_end_of_sequence(model, token) {
            stopped_by = StopReason::Eos;
            break;
        }

        pending.extend_from_slice(&engine.token_to_piece(model, token));
        append_utf8(&mut pending, &mut output);

        // Checked before the next decode, so a matched stop costs no extra
        // forward pass. No stop can start before `emitted`: any partial
        // match there would have been held back.
        if let Some((pos, stop)) = stops.find_earliest_from(&output, emitted) {
            stopped_by = StopReason::StopSequence(stop.to_owned());
            output.truncate(pos);
            pending.clear();
            break;
        }

        let safe = output.len() - stops.holdback(&output);
        if safe > emitted {
            sink.emit(&output[emitted..safe]);
            emitted = safe;
        }

        if completion_tokens == budget {
            break;
        }

        batch.clear();
        batch.add(token, n_cur, 0, true);
        n_cur += 1;

        if let Err(e) = engine.decode(context, &batch) {
            warn!(error = %e, completion_tokens, "Decode failed; returning partial output");
            stopped_by = StopReason::DecodeFailure;
            break;
        }
    }

    if !pending.is_empty() {
        output.push_str(&String::from_utf8_lossy(&pending));
    }
    if stopped_by != StopReason::Cancelled && output.len() > emitted {
        sink.emit(&output[emitted..]);
    }

    let result = GenerationResult {
        text: finish_text(profile, &output),
        stopped_by,
        prompt_tokens,
        completion_tokens,
        prompt_ms,
        generation_ms: elapsed_ms(t_gen),
    };
    debug!(
        reason = %result.stopped_by,
        prompt_tokens,
        completion_tokens,
        tok_per_sec = result.tokens_per_sec(),
        "Generation finished"
    );
    result
}

/// Move the longest valid UTF-8 prefix of `pending` onto `out`.
///
/// Bytes that can never begin a valid sequence become U+FFFD. An incomplete
/// trailing sequence stays in `pending` until more bytes arrive.
fn append_utf8(pending: &mut Vec<u8>, out: &mut String) {
    loop {
        match std::str::from_utf8(pending) {
            Ok(text) => {
                out.push_str(text);
                pending.clear();
                return;
            }
            Err(e) => {
                let valid = e.valid_up_to();
                out.push_str(&String::from_utf8_lossy(&pending[..valid]));
                match e.error_len() {
                    Some(bad) => {
                        out.push(char::REPLACEMENT_CHARACTER);
                        pending.drain(..valid + bad);
                    }
                    None => {
                        pending.drain(..valid);
                        return;
                    }
                }
            }
        }
    }
}

/// Strip residual markup and whitespace; never returns empty text.
fn finish_text(profile: &VariantProfile, raw: &str) -> String {
    let stripped = profile.residual.strip(raw);
    let trimmed = stripped.trim();
    if trimmed.is_empty() {
        APOLOGY.to_owned()
    } else {
        trimmed.to_owned()
    }
}

fn elapsed_ms(since: Instant) -> f64 {
    since.elapsed().as_secs_f64() * 1000.0
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;

    use super::*;
    use crate::mock::MockEngine;
    use crate::registry;
    use crate::session::SessionOptions;
    use crate::variant::ModelVariant;

    fn ready(engine: &Arc<MockEngine>, path: &str) -> Session<MockEngine> {
        let mut session = Session::new(engine.clone());
        session.initialize(path).unwrap();
        session
    }

    #[test]
    fn uninitialized_session_makes_no_engine_calls() {
        let engine = Arc::new(MockEngine::new(["hello"]));
        let mut session = Session::new(engine.clone());
        let result = generate(&mut session, "hi");
        assert_eq!(result.stopped_by, StopReason::NotInitialized);
        assert_eq!(result.text, "Error: Model not initialized");
        assert_eq!(engine.counters().total_calls, 0);
    }

    #[test]
    fn stop_sequence_truncates_output() {
        let engine = Arc::new(MockEngine::new(["hello", "<|im_end|>", "world"]));
        let mut session = ready(&engine, "qwen.gguf");
        let result = generate(&mut session, "hi");
        assert_eq!(result.text, "hello");
        assert_eq!(
            result.stopped_by,
            StopReason::StopSequence("<|im_end|>".into())
        );
    }

    #[test]
    fn stop_sequence_spanning_tokens_is_found() {
        let engine = Arc::new(MockEngine::new(["hel", "lo<|im", "_end|>wor", "ld"]));
        let mut session = ready(&engine, "qwen.gguf");
        let result = generate(&mut session, "hi");
        assert_eq!(result.text, "hello");
        assert!(matches!(result.stopped_by, StopReason::StopSequence(_)));
        assert_eq!(result.completion_tokens, 3);
        // Prompt decode plus one decode per token before the match.
        assert_eq!(engine.counters().decode_calls, 3);
    }

    #[test]
    fn eos_ends_generation() {
        let engine = Arc::new(MockEngine::new([" Sure", ", here", " it is. "]));
        let mut session = ready(&engine, "phi4.gguf");
        let result = generate(&mut session, "hi");
        assert_eq!(result.stopped_by, StopReason::Eos);
        assert_eq!(result.text, "Sure, here it is.");
        assert_eq!(result.completion_tokens, 4);
    }

    #[test]
    fn token_budget_bounds_generation() {
        let engine = Arc::new(MockEngine::new(["a"]).cycling());
        let options = SessionOptions {
            max_new_tokens: Some(5),
            ..Default::default()
        };
        let mut session = Session::with_options(engine.clone(), options);
        session.initialize("qwen.gguf").unwrap();
        let result = generate(&mut session, "hi");
        assert_eq!(result.stopped_by, StopReason::TokenBudget);
        assert_eq!(result.text, "aaaaa");
        assert_eq!(result.completion_tokens, 5);
        // The last sampled token is never decoded.
        assert_eq!(engine.counters().decode_calls, 5);
    }

    #[test]
    fn budget_never_exceeds_context() {
        let engine = Arc::new(MockEngine::new(["x"]).cycling());
        let mut session = ready(&engine, "model.gguf");
        let ctx = session.config().unwrap().context_length as usize;
        let prompt = "p".repeat(1500);
        let result = generate(&mut session, &prompt);
        assert_eq!(result.stopped_by, StopReason::TokenBudget);
        assert!(result.prompt_tokens + result.completion_tokens <= ctx);
        assert!(engine.max_position().unwrap() < ctx as i32);
    }

    #[test]
    fn oversized_prompt_skips_decode() {
        let engine = Arc::new(MockEngine::new(["x"]));
        let mut session = ready(&engine, "model.gguf");
        let prompt = "p".repeat(5000);
        let result = generate(&mut session, &prompt);
        assert_eq!(result.stopped_by, StopReason::BudgetExhausted);
        assert!(result.text.starts_with("Error:"));
        assert_eq!(engine.counters().decode_calls, 0);
    }

    #[test]
    fn budget_formula() {
        let p = registry::profile(ModelVariant::Unknown);
        assert_eq!(token_budget(p, None, 2048, 100).unwrap(), 1024);
        assert_eq!(token_budget(p, None, 2048, 1500).unwrap(), 498);
        assert_eq!(token_budget(p, Some(16), 2048, 100).unwrap(), 16);
        assert_eq!(token_budget(p, Some(0), 2048, 100).unwrap(), 1024);
        assert_eq!(token_budget(p, Some(9999), 2048, 100).unwrap(), 1024);
        assert!(token_budget(p, None, 2048, 1998).is_err());
        assert_eq!(token_budget(p, None, 2048, 1997).unwrap(), 1);
    }

    #[test]
    fn decode_failure_returns_partial_output() {
        // Decode #0 is the prompt, #1 follows "one", #2 follows " two".
        let engine = Arc::new(MockEngine::new(["one", " two", " three"]).fail_decode_at(2));
        let mut session = ready(&engine, "qwen.gguf");
        let result = generate(&mut session, "count");
        assert_eq!(result.stopped_by, StopReason::DecodeFailure);
        assert_eq!(result.text, "one two");
    }

    #[test]
    fn prompt_decode_failure_apologizes() {
        let engine = Arc::new(MockEngine::new(["one"]).fail_decode_at(0));
        let mut session = ready(&engine, "qwen.gguf");
        let result = generate(&mut session, "count");
        assert_eq!(result.stopped_by, StopReason::DecodeFailure);
        assert_eq!(result.text, APOLOGY);
    }

    #[test]
    fn empty_output_becomes_apology() {
        let engine = Arc::new(MockEngine::new(["  ", "\n"]));
        let mut session = ready(&engine, "qwen.gguf");
        let result = generate(&mut session, "hi");
        assert_eq!(result.stopped_by, StopReason::Eos);
        assert_eq!(result.text, APOLOGY);
    }

    #[test]
    fn reasoning_block_is_stripped() {
        let engine = Arc::new(MockEngine::new([
            "<think>",
            "\nLet me see.\n",
            "</think>",
            "\n\nFour.",
            "<｜end▁of▁sentence｜>",
        ]));
        let mut session = ready(&engine, "DeepSeek-R1-Distill-Qwen-1.5B.gguf");
        let result = generate(&mut session, "2+2?");
        assert_eq!(result.text, "Four.");
    }

    #[test]
    fn every_call_resets_the_context() {
        let engine = Arc::new(MockEngine::new(["ok"]));
        let mut session = ready(&engine, "qwen.gguf");
        assert_eq!(generate(&mut session, "one").text, "ok");
        assert_eq!(generate(&mut session, "two").text, "ok");
        let c = engine.counters();
        assert_eq!(c.contexts_created, 3);
        assert_eq!(c.contexts_freed, 2);
        assert_eq!(c.overlapping_contexts, 0);
        assert_eq!(c.models_loaded, 1);
    }

    #[test]
    fn failed_reset_reports_and_recovers() {
        let engine = Arc::new(MockEngine::new(["ok"]).context_limit(1));
        let mut session = ready(&engine, "qwen.gguf");
        let result = generate(&mut session, "hi");
        assert_eq!(result.stopped_by, StopReason::ContextResetFailed);
        assert_eq!(result.text, "Error: Failed to reset context");
        assert!(session.is_initialized());
    }

    #[test]
    fn qwen_path_selects_qwen_template() {
        let engine = Arc::new(MockEngine::new(["ok"]));
        let mut session = ready(&engine, "/sdcard/Qwen1.5-1.8B-Chat-Q4_0.gguf");
        generate(&mut session, "Hello there");
        let sent = engine.tokenized().pop().unwrap();
        assert!(sent.contains("You are Qwen"));
        assert!(sent.contains("<|im_start|>user\nHello there<|im_end|>"));
        assert!(session.stop_sequences().contains("<|im_end|>"));
    }

    #[test]
    fn unknown_path_uses_generic_template() {
        let engine = Arc::new(MockEngine::new(["ok"]));
        let mut session = ready(&engine, "/models/mystery.gguf");
        assert_eq!(session.variant(), ModelVariant::Unknown);
        generate(&mut session, "Hello");
        let sent = engine.tokenized().pop().unwrap();
        assert_eq!(sent, registry::template_for(ModelVariant::Unknown).apply("Hello"));
        assert!(!sent.contains("Qwen"));
        assert_eq!(
            session.stop_sequences(),
            registry::stop_sequences_for(ModelVariant::Unknown)
        );
    }

    #[test]
    fn bos_follows_variant() {
        let engine = Arc::new(MockEngine::new(["ok"]));
        let mut lfm = ready(&engine, "LFM2-1.2B-Q4_0.gguf");
        generate(&mut lfm, "hi");
        let mut qwen = ready(&engine, "qwen.gguf");
        generate(&mut qwen, "hi");
        assert_eq!(engine.add_bos_flags(), vec![false, true]);
    }

    fn stream(engine: &Arc<MockEngine>, path: &str) -> (Vec<String>, GenerationResult) {
        let (tx, mut rx) = mpsc::channel(64);
        let engine = engine.clone();
        let path = path.to_owned();
        let worker = std::thread::spawn(move || {
            let mut session = Session::new(engine);
            session.initialize(&path).unwrap();
            generate_blocking(&mut session, "hi", tx)
        });
        let mut pieces = Vec::new();
        let mut done = None;
        while let Some(event) = rx.blocking_recv() {
            match event {
                GenerateEvent::Token(t) => pieces.push(t),
                GenerateEvent::Done(r) => done = Some(r),
            }
        }
        let result = worker.join().unwrap();
        assert_eq!(done.as_ref(), Some(&result));
        (pieces, result)
    }

    #[test]
    fn streaming_never_leaks_stop_fragments() {
        let engine = Arc::new(MockEngine::new(["Hi", " there<", "|im_", "end|>", "junk"]));
        let (pieces, result) = stream(&engine, "qwen.gguf");
        assert_eq!(pieces.concat(), "Hi there");
        assert!(pieces.iter().all(|p| !p.contains('<')));
        assert_eq!(result.text, "Hi there");
    }

    #[test]
    fn streaming_releases_held_text_that_was_not_a_stop() {
        let engine = Arc::new(MockEngine::new(["a <", "b"]));
        let (pieces, result) = stream(&engine, "qwen.gguf");
        assert_eq!(pieces, vec!["a ".to_owned(), "<b".to_owned()]);
        assert_eq!(result.text, "a <b");
        assert_eq!(result.stopped_by, StopReason::Eos);
    }

    #[test]
    fn dropped_receiver_cancels() {
        let engine = Arc::new(MockEngine::new(["x"]).cycling());
        let mut session = ready(&engine, "qwen.gguf");
        let (tx, rx) = mpsc::channel(4);
        drop(rx);
        let result = generate_blocking(&mut session, "hi", tx);
        assert_eq!(result.stopped_by, StopReason::Cancelled);
        assert_eq!(result.completion_tokens, 0);
        assert_eq!(engine.counters().sample_calls, 0);
    }

    #[test]
    fn multibyte_character_split_across_tokens() {
        // "₹" is E2 82 B9; a byte-level vocabulary may emit it byte by byte.
        let engine = Arc::new(MockEngine::from_bytes([
            b"Cost: ".to_vec(),
            vec![0xE2],
            vec![0x82],
            vec![0xB9],
            b"120".to_vec(),
        ]));
        let mut session = ready(&engine, "qwen.gguf");
        let result = generate(&mut session, "price?");
        assert_eq!(result.text, "Cost: ₹120");
        assert_eq!(result.completion_tokens, 6);
    }

    #[test]
    fn streamed_pieces_are_whole_characters() {
        let engine = Arc::new(MockEngine::from_bytes([
            vec![0xE0, 0xA4],
            vec![0xA8, 0xE0],
            vec![0xA4, 0xAE],
            "स्ते".as_bytes().to_vec(),
        ]));
        let (pieces, result) = stream(&engine, "qwen.gguf");
        assert_eq!(result.text, "नमस्ते");
        assert_eq!(pieces.concat(), "नमस्ते");
        assert!(pieces.iter().all(|p| !p.contains(char::REPLACEMENT_CHARACTER)));
    }

    #[test]
    fn invalid_bytes_become_replacement_characters() {
        let engine = Arc::new(MockEngine::from_bytes([vec![0xFF], b"ok".to_vec()]));
        let mut session = ready(&engine, "qwen.gguf");
        assert_eq!(generate(&mut session, "hi").text, "\u{FFFD}ok");

        // A sequence still incomplete at EOS is flushed lossily.
        let engine = Arc::new(MockEngine::from_bytes([b"ok".to_vec(), vec![0xE2, 0x82]]));
        let mut session = ready(&engine, "qwen.gguf");
        assert_eq!(generate(&mut session, "hi").text, "ok\u{FFFD}");
    }

    #[test]
    fn stop_sequence_split_inside_a_character() {
        let stop = "<｜end▁of▁sentence｜>".as_bytes();
        let engine = Arc::new(MockEngine::from_bytes([
            b"Four.".to_vec(),
            stop[..3].to_vec(),
            stop[3..].to_vec(),
            b"junk".to_vec(),
        ]));
        let mut session = ready(&engine, "deepseek-r1.gguf");
        let result = generate(&mut session, "2+2?");
        assert_eq!(result.text, "Four.");
        assert_eq!(
            result.stopped_by,
            StopReason::StopSequence("<｜end▁of▁sentence｜>".into())
        );
    }

    #[test]
    fn tokens_per_sec_handles_zero_time() {
        let r = GenerationResult::failed(&ChatError::NotInitialized);
        assert_eq!(r.tokens_per_sec(), 0.0);
        assert_eq!(r.prompt_tokens_per_sec(), 0.0);
    }
}
