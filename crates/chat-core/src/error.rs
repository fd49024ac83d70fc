use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum ChatError {
    #[error("Failed to load model from '{path}': {reason}")]
    ModelLoadFailed { path: String, reason: String },

    #[error("Failed to create context: {0}")]
    ContextCreationFailed(String),

    #[error("Tokenization failed: {0}")]
    TokenizationFailed(String),

    #[error("Decode failed with code {0}")]
    DecodeFailed(i32),

    #[error("Model not initialized")]
    NotInitialized,

    #[error("Prompt of {prompt_tokens} tokens leaves no room in a {context_length}-token context")]
    BudgetExhausted {
        prompt_tokens: usize,
        context_length: u32,
    },
}

pub type Result<T> = std::result::Result<T, ChatError>;

/// Fallback text returned when generation produced nothing usable.
pub const APOLOGY: &str = "I apologize, but I couldn't generate a response. Please try again.";

impl ChatError {
    /// Text shown to the caller when a generation call fails before producing output.
    pub fn user_message(&self) -> &'static str {
        match self {
            Self::NotInitialized => "Error: Model not initialized",
            Self::TokenizationFailed(_) => "Error: Could not tokenize prompt",
            Self::ContextCreationFailed(_) => "Error: Failed to reset context",
            Self::BudgetExhausted { .. } => {
                "Error: The prompt is too long for this model's context window"
            }
            Self::ModelLoadFailed { .. } => "Error: Failed to load model",
            Self::DecodeFailed(_) => APOLOGY,
        }
    }
}
