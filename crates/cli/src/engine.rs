//! The inference engine compiled into this binary.

use std::sync::Arc;

#[cfg(feature = "llama-cpp")]
pub type Engine = chat_core::LlamaCppEngine;

#[cfg(not(feature = "llama-cpp"))]
pub type Engine = unavailable::Unavailable;

#[cfg(feature = "llama-cpp")]
pub fn create() -> anyhow::Result<Arc<Engine>> {
    tracing::debug!(system = %chat_core::llama::system_info().trim(), "llama.cpp backend");
    Ok(Arc::new(Engine::new()))
}

#[cfg(not(feature = "llama-cpp"))]
pub fn create() -> anyhow::Result<Arc<Engine>> {
    anyhow::bail!("no inference engine in this build; rebuild with `--features llama-cpp`")
}

#[cfg(not(feature = "llama-cpp"))]
mod unavailable {
    use std::convert::Infallible;
    use std::path::Path;

    use chat_core::{
        ContextConfig, InferenceEngine, ModelParams, Result, SamplerStage, TokenBatch, TokenId,
    };

    /// Uninhabited: builds without a backend can never hold an engine.
    pub enum Unavailable {}

    impl InferenceEngine for Unavailable {
        type Model = Infallible;
        type Context = Infallible;
        type Sampler = Infallible;

        fn load_model(&self, _: &Path, _: &ModelParams) -> Result<Infallible> {
            match *self {}
        }
        fn create_context(&self, _: &Infallible, _: &ContextConfig) -> Result<Infallible> {
            match *self {}
        }
        fn create_sampler(&self, _: &[SamplerStage]) -> Result<Infallible> {
            match *self {}
        }
        fn tokenize(&self, _: &Infallible, _: &str, _: bool) -> Result<Vec<TokenId>> {
            match *self {}
        }
        fn token_to_piece(&self, _: &Infallible, _: TokenId) -> Vec<u8> {
            match *self {}
        }
        fn is_end_of_sequence(&self, _: &Infallible, _: TokenId) -> bool {
            match *self {}
        }
        fn decode(&self, _: &mut Infallible, _: &TokenBatch) -> Result<()> {
            match *self {}
        }
        fn sample(&self, _: &mut Infallible, _: &mut Infallible, _: i32) -> TokenId {
            match *self {}
        }
        fn free_sampler(&self, _: Infallible) {
            match *self {}
        }
        fn free_context(&self, _: Infallible) {
            match *self {}
        }
        fn free_model(&self, _: Infallible) {
            match *self {}
        }
    }
}
