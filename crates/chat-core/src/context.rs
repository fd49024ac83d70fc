//! Decoding-context sizing.

use serde::{Deserialize, Serialize};

/// Sizes a decoding context is created with. Bound once per loaded model and
/// reused unchanged by every context reset.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextConfig {
    /// Total token capacity of the context (prompt + generated).
    pub context_length: u32,
    /// Largest batch one decode call accepts. The prompt is decoded as a
    /// single batch, so this is kept equal to `context_length`.
    pub batch_size: u32,
    pub thread_count: i32,
}

impl ContextConfig {
    pub const fn new(context_length: u32, batch_size: u32, thread_count: i32) -> Self {
        Self {
            context_length,
            batch_size,
            thread_count,
        }
    }

    /// A context of `context_length` tokens, batch of the same size, and the
    /// default thread count.
    pub fn with_length(context_length: u32) -> Self {
        Self::new(context_length, context_length, default_threads())
    }

    pub fn with_threads(mut self, threads: Option<i32>) -> Self {
        if let Some(n) = threads.filter(|&n| n > 0) {
            self.thread_count = n;
        }
        self
    }
}

/// Available cores, capped at 4 to leave headroom on phones.
pub fn default_threads() -> i32 {
    std::thread::available_parallelism()
        .map(|n| n.get().min(4) as i32)
        .unwrap_or(4)
}
