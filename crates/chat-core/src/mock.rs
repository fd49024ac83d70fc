//! Scripted in-memory engine used by the unit tests.
//!
//! Prompt text tokenizes to one token per `char`. Sampling replays a fixed
//! list of text pieces per context and then returns EOS. Every call is
//! counted so tests can check pairing of create/free calls.

use std::path::{Path, PathBuf};
use std::sync::Mutex;

use crate::batch::TokenBatch;
use crate::context::ContextConfig;
use crate::engine::{InferenceEngine, ModelParams, TokenId};
use crate::error::{ChatError, Result};
use crate::sampler::SamplerStage;

pub(crate) const BOS: TokenId = 1;
pub(crate) const EOS: TokenId = 2;
const CHAR_BASE: TokenId = 1000;
const PIECE_BASE: TokenId = 10_000_000;

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub(crate) struct Counters {
    pub models_loaded: usize,
    pub models_freed: usize,
    pub contexts_created: usize,
    pub contexts_freed: usize,
    pub samplers_created: usize,
    pub samplers_freed: usize,
    pub tokenize_calls: usize,
    pub decode_calls: usize,
    pub sample_calls: usize,
    pub total_calls: usize,
    /// Context creations that happened while another context was alive.
    pub overlapping_contexts: usize,
}

/// One entry of the release log.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) enum Freed {
    Sampler,
    Context,
    Model,
}

#[derive(Debug, Default)]
struct State {
    counters: Counters,
    live_contexts: usize,
    load_params: Vec<ModelParams>,
    loaded_paths: Vec<PathBuf>,
    context_configs: Vec<ContextConfig>,
    sampler_stages: Vec<Vec<SamplerStage>>,
    add_bos: Vec<bool>,
    tokenized: Vec<String>,
    max_position: Option<i32>,
    freed: Vec<Freed>,
}

pub(crate) struct MockModel;

pub(crate) struct MockContext {
    cursor: usize,
    n_ctx: u32,
}

pub(crate) struct MockSampler;

pub(crate) struct MockEngine {
    pieces: Vec<Vec<u8>>,
    cycle: bool,
    fail_load: bool,
    fail_sampler: bool,
    /// Context creations allowed before every further one fails.
    context_limit: Option<usize>,
    fail_decode_at: Option<usize>,
    state: Mutex<State>,
}

impl MockEngine {
    pub fn new<I, S>(pieces: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::from_bytes(pieces.into_iter().map(|p| p.into().into_bytes()))
    }

    /// Replay raw byte pieces, which need not be valid UTF-8 one by one.
    pub fn from_bytes<I>(pieces: I) -> Self
    where
        I: IntoIterator<Item = Vec<u8>>,
    {
        Self {
            pieces: pieces.into_iter().collect(),
            cycle: false,
            fail_load: false,
            fail_sampler: false,
            context_limit: None,
            fail_decode_at: None,
            state: Mutex::new(State::default()),
        }
    }

    /// Replay the pieces endlessly instead of ending with EOS.
    pub fn cycling(mut self) -> Self {
        self.cycle = true;
        self
    }

    pub fn fail_load(mut self) -> Self {
        self.fail_load = true;
        self
    }

    pub fn fail_sampler(mut self) -> Self {
        self.fail_sampler = true;
        self
    }

    pub fn context_limit(mut self, n: usize) -> Self {
        self.context_limit = Some(n);
        self
    }

    /// Fail the `n`-th decode call (0-based; 0 is the prompt decode).
    pub fn fail_decode_at(mut self, n: usize) -> Self {
        self.fail_decode_at = Some(n);
        self
    }

    pub fn counters(&self) -> Counters {
        self.state.lock().unwrap().counters.clone()
    }

    pub fn add_bos_flags(&self) -> Vec<bool> {
        self.state.lock().unwrap().add_bos.clone()
    }

    pub fn tokenized(&self) -> Vec<String> {
        self.state.lock().unwrap().tokenized.clone()
    }

    pub fn sampler_stages(&self) -> Vec<Vec<SamplerStage>> {
        self.state.lock().unwrap().sampler_stages.clone()
    }

    pub fn context_configs(&self) -> Vec<ContextConfig> {
        self.state.lock().unwrap().context_configs.clone()
    }

    pub fn load_params(&self) -> Vec<ModelParams> {
        self.state.lock().unwrap().load_params.clone()
    }

    pub fn loaded_paths(&self) -> Vec<PathBuf> {
        self.state.lock().unwrap().loaded_paths.clone()
    }

    pub fn max_position(&self) -> Option<i32> {
        self.state.lock().unwrap().max_position
    }

    /// Every `free_*` call so far, in call order.
    pub fn release_log(&self) -> Vec<Freed> {
        self.state.lock().unwrap().freed.clone()
    }

    fn with_state<T>(&self, f: impl FnOnce(&mut State) -> T) -> T {
        let mut state = self.state.lock().unwrap();
        state.counters.total_calls += 1;
        f(&mut state)
    }
}

impl InferenceEngine for MockEngine {
    type Model = MockModel;
    type Context = MockContext;
    type Sampler = MockSampler;

    fn load_model(&self, path: &Path, params: &ModelParams) -> Result<MockModel> {
        self.with_state(|s| {
            s.load_params.push(params.clone());
            if self.fail_load {
                return Err(ChatError::ModelLoadFailed {
                    path: path.display().to_string(),
                    reason: "mock load failure".into(),
                });
            }
            s.loaded_paths.push(path.to_path_buf());
            s.counters.models_loaded += 1;
            Ok(MockModel)
        })
    }

    fn create_context(&self, _model: &MockModel, config: &ContextConfig) -> Result<MockContext> {
        self.with_state(|s| {
            if self
                .context_limit
                .is_some_and(|n| s.counters.contexts_created >= n)
            {
                return Err(ChatError::ContextCreationFailed("mock context failure".into()));
            }
            if s.live_contexts > 0 {
                s.counters.overlapping_contexts += 1;
            }
            s.live_contexts += 1;
            s.counters.contexts_created += 1;
            s.context_configs.push(*config);
            Ok(MockContext {
                cursor: 0,
                n_ctx: config.context_length,
            })
        })
    }

    fn create_sampler(&self, stages: &[SamplerStage]) -> Result<MockSampler> {
        self.with_state(|s| {
            if self.fail_sampler {
                return Err(ChatError::ContextCreationFailed("mock sampler failure".into()));
            }
            s.counters.samplers_created += 1;
            s.sampler_stages.push(stages.to_vec());
            Ok(MockSampler)
        })
    }

    fn tokenize(&self, _model: &MockModel, text: &str, add_bos: bool) -> Result<Vec<TokenId>> {
        self.with_state(|s| {
            s.counters.tokenize_calls += 1;
            s.add_bos.push(add_bos);
            s.tokenized.push(text.to_owned());
            let mut tokens = Vec::with_capacity(text.chars().count() + 1);
            if add_bos {
                tokens.push(BOS);
            }
            tokens.extend(text.chars().map(|c| c as TokenId + CHAR_BASE));
            Ok(tokens)
        })
    }

    fn token_to_piece(&self, _model: &MockModel, token: TokenId) -> Vec<u8> {
        self.with_state(|_| ());
        if token >= PIECE_BASE {
            return self.pieces[(token - PIECE_BASE) as usize].clone();
        }
        match token {
            BOS => b"<s>".to_vec(),
            EOS => b"</s>".to_vec(),
            t => char::from_u32((t - CHAR_BASE) as u32)
                .map(|c| c.to_string().into_bytes())
                .unwrap_or_default(),
        }
    }

    fn is_end_of_sequence(&self, _model: &MockModel, token: TokenId) -> bool {
        self.with_state(|_| ());
        token == EOS
    }

    fn decode(&self, context: &mut MockContext, batch: &TokenBatch) -> Result<()> {
        self.with_state(|s| {
            let index = s.counters.decode_calls;
            s.counters.decode_calls += 1;
            if self.fail_decode_at == Some(index) {
                return Err(ChatError::DecodeFailed(-1));
            }
            for e in batch.entries() {
                assert!(
                    e.pos < context.n_ctx as i32,
                    "position {} beyond context {}",
                    e.pos,
                    context.n_ctx
                );
                s.max_position = Some(s.max_position.map_or(e.pos, |m| m.max(e.pos)));
            }
            Ok(())
        })
    }

    fn sample(&self, context: &mut MockContext, _sampler: &mut MockSampler, _idx: i32) -> TokenId {
        self.with_state(|s| s.counters.sample_calls += 1);
        let i = context.cursor;
        context.cursor += 1;
        if i < self.pieces.len() {
            PIECE_BASE + i as TokenId
        } else if self.cycle && !self.pieces.is_empty() {
            PIECE_BASE + (i % self.pieces.len()) as TokenId
        } else {
            EOS
        }
    }

    fn free_sampler(&self, _sampler: MockSampler) {
        self.with_state(|s| {
            s.counters.samplers_freed += 1;
            s.freed.push(Freed::Sampler);
        });
    }

    fn free_context(&self, _context: MockContext) {
        self.with_state(|s| {
            s.live_contexts -= 1;
            s.counters.contexts_freed += 1;
            s.freed.push(Freed::Context);
        });
    }

    fn free_model(&self, _model: MockModel) {
        self.with_state(|s| {
            s.counters.models_freed += 1;
            s.freed.push(Freed::Model);
        });
    }
}
