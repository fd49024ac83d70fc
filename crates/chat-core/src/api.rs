//! String-in, string-out facade for host applications.
//!
//! Mirrors the three calls a mobile host makes: initialize with a model
//! path, generate a reply, release everything. Errors never cross this
//! boundary; they come back as `false` or as a presentable message.

use std::sync::Arc;

use tracing::{error, info};

use crate::engine::InferenceEngine;
use crate::generate::{self, GenerationResult};
use crate::session::{Session, SessionOptions};

pub struct LocalAssistant<E: InferenceEngine> {
    session: Session<E>,
    last: Option<GenerationResult>,
}

impl<E: InferenceEngine> LocalAssistant<E> {
    pub fn new(engine: Arc<E>) -> Self {
        Self::with_options(engine, SessionOptions::default())
    }

    pub fn with_options(engine: Arc<E>, options: SessionOptions) -> Self {
        Self {
            session: Session::with_options(engine, options),
            last: None,
        }
    }

    /// Load the model at `model_path`. Returns `false` on any failure.
    pub fn initialize(&mut self, model_path: &str) -> bool {
        self.last = None;
        match self.session.initialize(model_path) {
            Ok(()) => {
                info!(model = self.session.profile().display_name, "Assistant ready");
                true
            }
            Err(e) => {
                error!(path = model_path, error = %e, "Assistant initialization failed");
                false
            }
        }
    }

    /// Reply to `prompt`. Always returns displayable text.
    pub fn generate(&mut self, prompt: &str) -> String {
        let result = generate::generate(&mut self.session, prompt);
        let text = result.text.clone();
        self.last = Some(result);
        text
    }

    pub fn is_initialized(&self) -> bool {
        self.session.is_initialized()
    }

    pub fn cleanup(&mut self) {
        self.session.cleanup();
    }

    /// Details of the most recent [`generate`](Self::generate) call.
    pub fn last_result(&self) -> Option<&GenerationResult> {
        self.last.as_ref()
    }
}
