//! Session and generation core for on-device chat models.
//!
//! Detects the model family from its file path, applies the matching
//! prompt template and decoding defaults, and runs a bounded single-turn
//! generation loop over any [`InferenceEngine`]. The llama.cpp engine is
//! available behind the `llama-cpp` feature.

pub mod api;
pub mod batch;
pub mod context;
pub mod engine;
pub mod error;
pub mod generate;
pub mod handle;
pub mod registry;
pub mod sampler;
pub mod session;
pub mod template;
pub mod variant;

#[cfg(feature = "llama-cpp")]
pub mod llama;

#[cfg(test)]
mod mock;

pub use api::LocalAssistant;
pub use batch::TokenBatch;
pub use context::ContextConfig;
pub use engine::{InferenceEngine, ModelParams, TokenId};
pub use error::{APOLOGY, ChatError, Result};
pub use generate::{
    GenerateEvent, GenerationRequest, GenerationResult, StopReason, generate, generate_blocking,
    token_budget,
};
pub use registry::{VariantProfile, profile};
pub use sampler::{CpuSampler, SamplerStage, SamplingParams};
pub use session::{Session, SessionOptions};
pub use template::{PromptTemplate, StopSet};
pub use variant::ModelVariant;

#[cfg(feature = "llama-cpp")]
pub use llama::LlamaCppEngine;
