//! Safe wrapper around `llama_batch`.

/// RAII batch of tokens for a single sequence.
pub struct LlamaBatch {
    inner: llama_sys::llama_batch,
    capacity: i32,
}

impl LlamaBatch {
    /// Allocate a batch with room for `capacity` tokens of sequence 0.
    pub fn new(capacity: i32) -> Self {
        let capacity = capacity.max(1);
        let inner = unsafe { llama_sys::llama_batch_init(capacity, 0, 1) };
        Self { inner, capacity }
    }

    /// Build a batch holding `tokens` at positions `start..`, requesting
    /// logits only for the last one.
    pub fn from_tokens(tokens: &[i32], start: i32) -> Self {
        let mut batch = Self::new(tokens.len() as i32);
        let last = tokens.len().saturating_sub(1);
        for (i, &tok) in tokens.iter().enumerate() {
            batch.add(tok, start + i as i32, i == last);
        }
        batch
    }

    /// The raw batch struct (passed by value to C).
    pub fn raw(&self) -> llama_sys::llama_batch {
        self.inner
    }

    /// Append `token` at absolute position `pos` on sequence 0.
    pub fn add(&mut self, token: i32, pos: i32, logits: bool) {
        let i = self.inner.n_tokens as usize;
        assert!(
            (i as i32) < self.capacity,
            "LlamaBatch capacity ({}) exceeded",
            self.capacity
        );

        unsafe {
            *self.inner.token.add(i) = token;
            *self.inner.pos.add(i) = pos;
            *self.inner.n_seq_id.add(i) = 1;
            *(*self.inner.seq_id.add(i)) = 0;
            *self.inner.logits.add(i) = i8::from(logits);
        }
        self.inner.n_tokens += 1;
    }
}

impl Drop for LlamaBatch {
    fn drop(&mut self) {
        unsafe { llama_sys::llama_batch_free(self.inner) }
    }
}
