//! Token batches fed to [`InferenceEngine::decode`](crate::InferenceEngine::decode).

use crate::engine::TokenId;

/// One token slot in a batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BatchEntry {
    pub token: TokenId,
    /// Absolute position in the context.
    pub pos: i32,
    pub seq_id: i32,
    /// Whether logits are requested for this position.
    pub logits: bool,
}

/// Bounded batch of tokens with positions.
#[derive(Debug, Clone)]
pub struct TokenBatch {
    entries: Vec<BatchEntry>,
    capacity: usize,
}

impl TokenBatch {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
            capacity,
        }
    }

    /// Batch holding a whole prompt at positions `0..tokens.len()`, with
    /// logits requested only for the last token.
    pub fn for_prompt(tokens: &[TokenId]) -> Self {
        let mut batch = Self::new(tokens.len().max(1));
        let last = tokens.len().saturating_sub(1);
        for (i, &tok) in tokens.iter().enumerate() {
            batch.add(tok, i as i32, 0, i == last);
        }
        batch
    }

    pub fn n_tokens(&self) -> i32 {
        self.entries.len() as i32
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn entries(&self) -> &[BatchEntry] {
        &self.entries
    }

    /// Remove all tokens.
    pub fn clear(&mut self) {
        self.entries.clear();
    }

    /// Push a token into the batch.
    pub fn add(&mut self, token: TokenId, pos: i32, seq_id: i32, logits: bool) {
        assert!(
            self.entries.len() < self.capacity,
            "TokenBatch capacity ({}) exceeded",
            self.capacity
        );
        self.entries.push(BatchEntry {
            token,
            pos,
            seq_id,
            logits,
        });
    }
}
