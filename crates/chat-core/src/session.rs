//! Session lifecycle: model, decoding context and sampler chain.
//!
//! ```text
//! Uninitialized --initialize--> Ready --reset_context--> Ready
//!       ^                         |
//!       +--------cleanup----------+
//! ```
//!
//! A failed `initialize` leaves the session `Uninitialized` with every
//! partially acquired resource released.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::context::ContextConfig;
use crate::engine::{InferenceEngine, ModelParams};
use crate::error::{ChatError, Result};
use crate::handle::{ContextHandle, ModelHandle, SamplerHandle};
use crate::registry::{self, VariantProfile};
use crate::sampler::SamplingParams;
use crate::template::StopSet;
use crate::variant::ModelVariant;

/// Caller overrides applied on top of the variant defaults.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionOptions {
    /// Decode threads (default: available cores, at most 4).
    #[serde(default)]
    pub threads: Option<i32>,
    /// Seed for the sampler's final draw.
    #[serde(default)]
    pub seed: Option<u32>,
    /// Lower cap on new tokens per reply; never raises the variant cap.
    #[serde(default)]
    pub max_new_tokens: Option<u32>,
}

/// One loaded model plus its current decoding state.
///
/// Not safe for concurrent use; callers serialize `initialize`, generation
/// and `cleanup` on a session.
pub struct Session<E: InferenceEngine> {
    engine: Arc<E>,
    options: SessionOptions,
    variant: ModelVariant,
    model_path: Option<PathBuf>,
    config: Option<ContextConfig>,
    sampling: SamplingParams,
    // Declaration order is drop order: sampler, context, model.
    sampler: Option<SamplerHandle<E>>,
    context: Option<ContextHandle<E>>,
    model: Option<ModelHandle<E>>,
}

/// Borrowed view of a ready session, used by the generation loop.
pub(crate) struct Live<'a, E: InferenceEngine> {
    pub engine: &'a E,
    pub model: &'a ModelHandle<E>,
    pub context: &'a mut ContextHandle<E>,
    pub sampler: &'a mut SamplerHandle<E>,
}

impl<E: InferenceEngine> Session<E> {
    pub fn new(engine: Arc<E>) -> Self {
        Self::with_options(engine, SessionOptions::default())
    }

    pub fn with_options(engine: Arc<E>, options: SessionOptions) -> Self {
        Self {
            engine,
            options,
            variant: ModelVariant::Unknown,
            model_path: None,
            config: None,
            sampling: SamplingParams::default(),
            sampler: None,
            context: None,
            model: None,
        }
    }

    /// Load `path` and build a context and sampler for its variant.
    ///
    /// An already-initialized session is cleaned up first.
    pub fn initialize(&mut self, path: impl AsRef<Path>) -> Result<()> {
        if self.is_initialized() {
            self.cleanup();
        }

        let path = path.as_ref();
        let variant = ModelVariant::detect(&path.to_string_lossy());
        let profile = registry::profile(variant);
        info!(path = %path.display(), %variant, model = profile.display_name, "Initializing session");

        let model = ModelHandle::load(&self.engine, path, &ModelParams::default())?;

        let config = registry::context_defaults_for(variant).with_threads(self.options.threads);
        let sampling = registry::sampling_defaults_for(variant).with_seed(self.options.seed);

        // On failure `model` drops here and is freed.
        let (context, sampler) = create_pair(&self.engine, &model, &config, &sampling)
            .inspect_err(|e| warn!(error = %e, "Context setup failed; model released"))?;

        self.variant = variant;
        self.model_path = Some(path.to_path_buf());
        self.config = Some(config);
        self.sampling = sampling;
        self.model = Some(model);
        self.context = Some(context);
        self.sampler = Some(sampler);

        info!(
            %variant,
            n_ctx = config.context_length,
            n_threads = config.thread_count,
            "Session ready"
        );
        Ok(())
    }

    /// Replace the context and sampler with fresh ones built from the
    /// configuration bound at load time. The model stays loaded.
    ///
    /// On failure the session keeps its model but has no context until a
    /// later reset succeeds.
    pub fn reset_context(&mut self) -> Result<()> {
        let (Some(model), Some(config)) = (self.model.as_ref(), self.config) else {
            return Err(ChatError::NotInitialized);
        };

        // Release before acquiring so two contexts never coexist.
        self.sampler = None;
        self.context = None;

        let (context, sampler) = create_pair(&self.engine, model, &config, &self.sampling)?;
        self.context = Some(context);
        self.sampler = Some(sampler);
        debug!("Context reset");
        Ok(())
    }

    /// Release sampler, context and model, in that order. Safe to repeat.
    pub fn cleanup(&mut self) {
        let was_loaded = self.model.is_some();

        self.sampler = None;
        self.context = None;
        self.model = None;
        self.config = None;
        self.model_path = None;
        self.variant = ModelVariant::Unknown;

        if was_loaded {
            info!("Session cleaned up");
        }
    }

    /// True while a model is loaded.
    pub fn is_initialized(&self) -> bool {
        self.model.is_some()
    }

    /// True when model, context and sampler are all live.
    pub fn is_ready(&self) -> bool {
        self.model.is_some() && self.context.is_some() && self.sampler.is_some()
    }

    pub fn variant(&self) -> ModelVariant {
        self.variant
    }

    pub fn profile(&self) -> &'static VariantProfile {
        registry::profile(self.variant)
    }

    pub fn stop_sequences(&self) -> StopSet {
        registry::stop_sequences_for(self.variant)
    }

    pub fn config(&self) -> Option<ContextConfig> {
        self.config
    }

    pub fn sampling(&self) -> SamplingParams {
        self.sampling
    }

    pub fn options(&self) -> &SessionOptions {
        &self.options
    }

    pub fn model_path(&self) -> Option<&Path> {
        self.model_path.as_deref()
    }

    pub(crate) fn live(&mut self) -> Option<Live<'_, E>> {
        match (&self.model, &mut self.context, &mut self.sampler) {
            (Some(model), Some(context), Some(sampler)) => Some(Live {
                engine: &self.engine,
                model,
                context,
                sampler,
            }),
            _ => None,
        }
    }
}

impl<E: InferenceEngine> Drop for Session<E> {
    fn drop(&mut self) {
        self.cleanup();
    }
}

fn create_pair<E: InferenceEngine>(
    engine: &Arc<E>,
    model: &ModelHandle<E>,
    config: &ContextConfig,
    sampling: &SamplingParams,
) -> Result<(ContextHandle<E>, SamplerHandle<E>)> {
    let context = ContextHandle::new(engine, model, config)?;
    // On failure `context` drops here, before the caller's model.
    let sampler = SamplerHandle::new(engine, &sampling.stages()).map_err(|e| match e {
        ChatError::ContextCreationFailed(_) => e,
        other => ChatError::ContextCreationFailed(format!("sampler: {other}")),
    })?;
    Ok((context, sampler))
}
