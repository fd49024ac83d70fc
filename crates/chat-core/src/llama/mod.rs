//! [`InferenceEngine`] backed by llama.cpp through `llama-sys`.
//!
//! Raw types here carry no `Drop`; they are released by the matching
//! `free_*` call, which the handles in [`crate::handle`] issue exactly once.

mod backend;
mod batch;
mod token;

use std::ffi::CString;
use std::path::Path;

use tracing::{debug, info};

use crate::batch::TokenBatch;
use crate::context::ContextConfig;
use crate::engine::{InferenceEngine, ModelParams, TokenId};
use crate::error::{ChatError, Result};
use crate::sampler::SamplerStage;

pub use backend::system_info;

use self::batch::NativeBatch;

/// Largest physical batch handed to the backend in one step.
const MAX_UBATCH: u32 = 512;

pub struct LlamaModel {
    ptr: *mut llama_sys::llama_model,
}

// Safety: a loaded model is read-only; the session serializes all use.
unsafe impl Send for LlamaModel {}

impl LlamaModel {
    fn vocab(&self) -> *const llama_sys::llama_vocab {
        unsafe { llama_sys::llama_model_get_vocab(self.ptr) }
    }

    pub fn desc(&self) -> String {
        let mut buf = vec![0u8; 256];
        let len = unsafe {
            llama_sys::llama_model_desc(
                self.ptr,
                buf.as_mut_ptr() as *mut std::ffi::c_char,
                buf.len(),
            )
        };
        if len > 0 {
            buf.truncate(len as usize);
            String::from_utf8_lossy(&buf).into_owned()
        } else {
            String::new()
        }
    }
}

pub struct LlamaContext {
    ptr: *mut llama_sys::llama_context,
}

// Safety: every use goes through `&mut` on the owning session.
unsafe impl Send for LlamaContext {}

pub struct LlamaSampler {
    ptr: *mut llama_sys::llama_sampler,
}

unsafe impl Send for LlamaSampler {}

/// CPU-only llama.cpp engine.
#[derive(Debug)]
pub struct LlamaCppEngine {
    _private: (),
}

impl LlamaCppEngine {
    /// Initialize the backend (once per process) and return an engine.
    pub fn new() -> Self {
        backend::init();
        Self { _private: () }
    }
}

impl Default for LlamaCppEngine {
    fn default() -> Self {
        Self::new()
    }
}

impl InferenceEngine for LlamaCppEngine {
    type Model = LlamaModel;
    type Context = LlamaContext;
    type Sampler = LlamaSampler;

    fn load_model(&self, path: &Path, params: &ModelParams) -> Result<LlamaModel> {
        let path_str = path.to_str().ok_or_else(|| ChatError::ModelLoadFailed {
            path: path.display().to_string(),
            reason: "Invalid UTF-8 in path".into(),
        })?;
        let c_path = CString::new(path_str).map_err(|_| ChatError::ModelLoadFailed {
            path: path_str.into(),
            reason: "Path contains null byte".into(),
        })?;

        let mut raw = unsafe { llama_sys::llama_model_default_params() };
        raw.n_gpu_layers = params.n_gpu_layers;
        raw.use_mmap = params.use_mmap;

        info!(path = %path.display(), "Loading model…");
        let ptr = unsafe { llama_sys::llama_model_load_from_file(c_path.as_ptr(), raw) };
        if ptr.is_null() {
            return Err(ChatError::ModelLoadFailed {
                path: path_str.into(),
                reason: "llama_model_load_from_file returned null".into(),
            });
        }

        let model = LlamaModel { ptr };
        info!(path = %path.display(), desc = %model.desc(), "Model loaded");
        Ok(model)
    }

    fn create_context(&self, model: &LlamaModel, config: &ContextConfig) -> Result<LlamaContext> {
        let mut raw = unsafe { llama_sys::llama_context_default_params() };
        raw.n_ctx = config.context_length;
        raw.n_batch = config.batch_size;
        raw.n_ubatch = config.batch_size.min(MAX_UBATCH);
        raw.n_threads = config.thread_count;
        raw.n_threads_batch = config.thread_count;

        let ptr = unsafe { llama_sys::llama_init_from_model(model.ptr, raw) };
        if ptr.is_null() {
            return Err(ChatError::ContextCreationFailed(
                "llama_init_from_model returned null".into(),
            ));
        }
        Ok(LlamaContext { ptr })
    }

    fn create_sampler(&self, stages: &[SamplerStage]) -> Result<LlamaSampler> {
        let params = llama_sys::llama_sampler_chain_params { no_perf: true };
        let ptr = unsafe { llama_sys::llama_sampler_chain_init(params) };
        if ptr.is_null() {
            return Err(ChatError::ContextCreationFailed(
                "llama_sampler_chain_init returned null".into(),
            ));
        }
        for stage in stages {
            let s = unsafe {
                match *stage {
                    SamplerStage::TopK(k) => llama_sys::llama_sampler_init_top_k(k),
                    SamplerStage::TopP(p) => llama_sys::llama_sampler_init_top_p(p, 1),
                    SamplerStage::Temperature(t) => llama_sys::llama_sampler_init_temp(t),
                    SamplerStage::Dist(seed) => llama_sys::llama_sampler_init_dist(seed),
                    SamplerStage::Greedy => llama_sys::llama_sampler_init_greedy(),
                }
            };
            unsafe { llama_sys::llama_sampler_chain_add(ptr, s) };
        }
        debug!(?stages, "Sampler chain built");
        Ok(LlamaSampler { ptr })
    }

    fn tokenize(&self, model: &LlamaModel, text: &str, add_bos: bool) -> Result<Vec<TokenId>> {
        token::tokenize(model.vocab(), text, add_bos)
    }

    fn token_to_piece(&self, model: &LlamaModel, token: TokenId) -> Vec<u8> {
        token::token_to_piece(model.vocab(), token)
    }

    fn is_end_of_sequence(&self, model: &LlamaModel, token: TokenId) -> bool {
        unsafe { llama_sys::llama_vocab_is_eog(model.vocab(), token) }
    }

    fn decode(&self, context: &mut LlamaContext, batch: &TokenBatch) -> Result<()> {
        let native = NativeBatch::from_tokens(batch);
        let rc = unsafe { llama_sys::llama_decode(context.ptr, native.raw()) };
        if rc != 0 {
            return Err(ChatError::DecodeFailed(rc));
        }
        Ok(())
    }

    fn sample(&self, context: &mut LlamaContext, sampler: &mut LlamaSampler, idx: i32) -> TokenId {
        unsafe { llama_sys::llama_sampler_sample(sampler.ptr, context.ptr, idx) }
    }

    fn free_sampler(&self, sampler: LlamaSampler) {
        unsafe { llama_sys::llama_sampler_free(sampler.ptr) }
    }

    fn free_context(&self, context: LlamaContext) {
        unsafe { llama_sys::llama_free(context.ptr) }
    }

    fn free_model(&self, model: LlamaModel) {
        unsafe { llama_sys::llama_model_free(model.ptr) }
    }
}
