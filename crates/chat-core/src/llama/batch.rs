//! Native `llama_batch` built from a [`TokenBatch`].

use crate::batch::TokenBatch;

/// Owns a `llama_batch` allocation for the duration of one decode.
pub(crate) struct NativeBatch {
    inner: llama_sys::llama_batch,
}

impl NativeBatch {
    pub fn from_tokens(batch: &TokenBatch) -> Self {
        let n = batch.n_tokens().max(1);
        let mut inner = unsafe { llama_sys::llama_batch_init(n, 0, 1) };
        for (i, e) in batch.entries().iter().enumerate() {
            unsafe {
                *inner.token.add(i) = e.token;
                *inner.pos.add(i) = e.pos;
                *inner.n_seq_id.add(i) = 1;
                *(*inner.seq_id.add(i)) = e.seq_id;
                *inner.logits.add(i) = i8::from(e.logits);
            }
        }
        inner.n_tokens = batch.n_tokens();
        Self { inner }
    }

    /// The raw batch struct (passed by value; `Copy` in C).
    pub fn raw(&self) -> llama_sys::llama_batch {
        self.inner
    }
}

impl Drop for NativeBatch {
    fn drop(&mut self) {
        unsafe { llama_sys::llama_batch_free(self.inner) }
    }
}
