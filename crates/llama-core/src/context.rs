//! Safe RAII wrapper around `llama_context`.

use std::sync::Arc;

use tracing::debug;

use crate::batch::LlamaBatch;
use crate::error::{LlamaError, Result};
use crate::model::LlamaModel;

/// Owns a `llama_context` pointer and its parent model reference, and
/// tracks the next free position of sequence 0.
pub struct LlamaContext {
    ptr: *mut llama_sys::llama_context,
    n_past: i32,
    /// Keep the model alive for the lifetime of the context.
    _model: Arc<LlamaModel>,
}

// Safety: all use of the context is &mut self; callers serialize access.
unsafe impl Send for LlamaContext {}

impl LlamaContext {
    /// Create a new inference context.
    pub fn new(model: Arc<LlamaModel>, params: &ContextParams) -> Result<Self> {
        let mut raw = unsafe { llama_sys::llama_context_default_params() };
        raw.n_ctx = params.n_ctx;
        // One batch must hold a whole prompt.
        if params.n_ctx > 0 {
            raw.n_batch = params.n_ctx;
        }
        raw.n_threads = params.n_threads;
        raw.n_threads_batch = params.n_threads_batch;

        let ctx = unsafe { llama_sys::llama_init_from_model(model.as_ptr(), raw) };
        if ctx.is_null() {
            return Err(LlamaError::ContextCreationFailed(
                "llama_init_from_model returned null".into(),
            ));
        }

        debug!(
            n_ctx = params.n_ctx,
            n_threads = params.n_threads,
            "Context created"
        );
        Ok(Self {
            ptr: ctx,
            n_past: 0,
            _model: model,
        })
    }

    pub(crate) fn as_ptr(&self) -> *mut llama_sys::llama_context {
        self.ptr
    }

    pub fn n_ctx(&self) -> u32 {
        unsafe { llama_sys::llama_n_ctx(self.ptr) }
    }

    /// Evaluate `tokens` as one batch appended after what was already
    /// decoded. Logits are produced for the last token only.
    pub fn decode_tokens(&mut self, tokens: &[i32]) -> Result<()> {
        if tokens.is_empty() {
            return Ok(());
        }
        let batch = LlamaBatch::from_tokens(tokens, self.n_past);
        self.decode(&batch)?;
        self.n_past += tokens.len() as i32;
        Ok(())
    }

    /// Decode (process) a prepared batch.
    pub fn decode(&mut self, batch: &LlamaBatch) -> Result<()> {
        let rc = unsafe { llama_sys::llama_decode(self.ptr, batch.raw()) };
        if rc != 0 {
            return Err(LlamaError::DecodeFailed(rc));
        }
        Ok(())
    }

    /// Drop every cached position so the next decode starts at 0.
    pub fn clear_memory(&mut self) {
        unsafe {
            let mem = llama_sys::llama_get_memory(self.ptr);
            if !mem.is_null() {
                llama_sys::llama_memory_clear(mem, false);
            }
        }
        self.n_past = 0;
    }
}

impl Drop for LlamaContext {
    fn drop(&mut self) {
        if !self.ptr.is_null() {
            debug!("Freeing llama context");
            unsafe { llama_sys::llama_free(self.ptr) }
        }
    }
}

#[derive(Debug, Clone)]
pub struct ContextParams {
    /// Context window; 0 uses the model's training size.
    pub n_ctx: u32,
    pub n_threads: i32,
    pub n_threads_batch: i32,
}
