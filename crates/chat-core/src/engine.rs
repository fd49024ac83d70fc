//! The narrow interface this crate needs from a token-level inference engine.
//!
//! Implementors own nothing beyond what they hand out: every `create_*` /
//! `load_model` result is released by exactly one matching `free_*` call,
//! issued by the handle wrappers in [`crate::handle`].

use std::path::Path;

use crate::batch::TokenBatch;
use crate::context::ContextConfig;
use crate::error::Result;
use crate::sampler::SamplerStage;

pub type TokenId = i32;

/// Parameters for [`InferenceEngine::load_model`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ModelParams {
    /// Layers to offload to GPU. Always 0 here; this crate is CPU-only.
    pub n_gpu_layers: i32,
    /// Use memory-mapped I/O.
    pub use_mmap: bool,
}

impl Default for ModelParams {
    fn default() -> Self {
        Self {
            n_gpu_layers: 0,
            use_mmap: true,
        }
    }
}

pub trait InferenceEngine: Send + Sync + 'static {
    type Model: Send;
    type Context: Send;
    type Sampler: Send;

    fn load_model(&self, path: &Path, params: &ModelParams) -> Result<Self::Model>;

    fn create_context(&self, model: &Self::Model, config: &ContextConfig)
    -> Result<Self::Context>;

    /// Build a sampler chain applying `stages` in the given order.
    fn create_sampler(&self, stages: &[SamplerStage]) -> Result<Self::Sampler>;

    fn tokenize(&self, model: &Self::Model, text: &str, add_bos: bool) -> Result<Vec<TokenId>>;

    /// Raw bytes for one token. Special tokens are rendered literally.
    ///
    /// A piece need not be valid UTF-8 on its own: byte-level vocabularies
    /// split one multibyte character across several tokens.
    fn token_to_piece(&self, model: &Self::Model, token: TokenId) -> Vec<u8>;

    fn detokenize(&self, model: &Self::Model, tokens: &[TokenId]) -> String {
        let bytes: Vec<u8> = tokens
            .iter()
            .flat_map(|&t| self.token_to_piece(model, t))
            .collect();
        String::from_utf8_lossy(&bytes).into_owned()
    }

    /// Whether `token` ends generation (EOS and any end-of-turn equivalent).
    fn is_end_of_sequence(&self, model: &Self::Model, token: TokenId) -> bool;

    fn decode(&self, context: &mut Self::Context, batch: &TokenBatch) -> Result<()>;

    /// Sample from the logits produced for batch index `idx` of the last decode.
    fn sample(&self, context: &mut Self::Context, sampler: &mut Self::Sampler, idx: i32)
    -> TokenId;

    fn free_sampler(&self, sampler: Self::Sampler);
    fn free_context(&self, context: Self::Context);
    fn free_model(&self, model: Self::Model);
}
