//! Scoped ownership of engine resources.
//!
//! Each wrapper holds one raw engine resource and returns it to the engine
//! exactly once, on drop. The raw value is moved into `free_*`, so a second
//! release cannot be expressed.

use std::path::Path;
use std::sync::Arc;

use tracing::debug;

use crate::context::ContextConfig;
use crate::engine::{InferenceEngine, ModelParams};
use crate::error::Result;
use crate::sampler::SamplerStage;

// `raw` is `Some` from construction until `drop` takes it.
const RELEASED: &str = "engine handle used after release";

/// Owns a loaded model and frees it on drop.
pub struct ModelHandle<E: InferenceEngine> {
    engine: Arc<E>,
    raw: Option<E::Model>,
}

impl<E: InferenceEngine> ModelHandle<E> {
    pub fn load(engine: &Arc<E>, path: &Path, params: &ModelParams) -> Result<Self> {
        let raw = engine.load_model(path, params)?;
        Ok(Self {
            engine: Arc::clone(engine),
            raw: Some(raw),
        })
    }

    pub fn raw(&self) -> &E::Model {
        self.raw.as_ref().expect(RELEASED)
    }
}

impl<E: InferenceEngine> Drop for ModelHandle<E> {
    fn drop(&mut self) {
        if let Some(raw) = self.raw.take() {
            debug!("Freeing model");
            self.engine.free_model(raw);
        }
    }
}

/// Owns a decoding context and frees it on drop.
///
/// Must be dropped before the [`ModelHandle`] it was created from.
pub struct ContextHandle<E: InferenceEngine> {
    engine: Arc<E>,
    raw: Option<E::Context>,
}

impl<E: InferenceEngine> ContextHandle<E> {
    pub fn new(engine: &Arc<E>, model: &ModelHandle<E>, config: &ContextConfig) -> Result<Self> {
        let raw = engine.create_context(model.raw(), config)?;
        debug!(
            n_ctx = config.context_length,
            n_batch = config.batch_size,
            n_threads = config.thread_count,
            "Context created"
        );
        Ok(Self {
            engine: Arc::clone(engine),
            raw: Some(raw),
        })
    }

    pub fn raw_mut(&mut self) -> &mut E::Context {
        self.raw.as_mut().expect(RELEASED)
    }
}

impl<E: InferenceEngine> Drop for ContextHandle<E> {
    fn drop(&mut self) {
        if let Some(raw) = self.raw.take() {
            debug!("Freeing context");
            self.engine.free_context(raw);
        }
    }
}

/// Owns a sampler chain and frees it on drop.
pub struct SamplerHandle<E: InferenceEngine> {
    engine: Arc<E>,
    raw: Option<E::Sampler>,
}

impl<E: InferenceEngine> SamplerHandle<E> {
    pub fn new(engine: &Arc<E>, stages: &[SamplerStage]) -> Result<Self> {
        let raw = engine.create_sampler(stages)?;
        Ok(Self {
            engine: Arc::clone(engine),
            raw: Some(raw),
        })
    }

    pub fn raw_mut(&mut self) -> &mut E::Sampler {
        self.raw.as_mut().expect(RELEASED)
    }
}

impl<E: InferenceEngine> Drop for SamplerHandle<E> {
    fn drop(&mut self) {
        if let Some(raw) = self.raw.take() {
            self.engine.free_sampler(raw);
        }
    }
}
