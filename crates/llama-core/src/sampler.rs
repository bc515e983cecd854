//! Sampler chain construction and token sampling.

use crate::context::LlamaContext;
use crate::error::{LlamaError, Result};

/// RAII wrapper around a `llama_sampler` chain. Stages added to the chain
/// are owned by it and freed together on drop.
pub struct SamplerChain {
    ptr: *mut llama_sys::llama_sampler,
}

unsafe impl Send for SamplerChain {}

impl SamplerChain {
    /// Create an empty chain.
    pub fn new(no_perf: bool) -> Result<Self> {
        let params = llama_sys::llama_sampler_chain_params { no_perf };
        let ptr = unsafe { llama_sys::llama_sampler_chain_init(params) };
        if ptr.is_null() {
            return Err(LlamaError::SamplerInitFailed);
        }
        Ok(Self { ptr })
    }

    /// Number of stages in the chain.
    pub fn len(&self) -> i32 {
        unsafe { llama_sys::llama_sampler_chain_n(self.ptr) }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    //  Stages

    pub fn add_greedy(&mut self) {
        unsafe {
            llama_sys::llama_sampler_chain_add(self.ptr, llama_sys::llama_sampler_init_greedy())
        }
    }

    pub fn add_dist(&mut self, seed: u32) {
        unsafe {
            llama_sys::llama_sampler_chain_add(self.ptr, llama_sys::llama_sampler_init_dist(seed))
        }
    }

    pub fn add_top_k(&mut self, k: i32) {
        unsafe {
            llama_sys::llama_sampler_chain_add(self.ptr, llama_sys::llama_sampler_init_top_k(k))
        }
    }

    pub fn add_top_p(&mut self, p: f32, min_keep: usize) {
        unsafe {
            llama_sys::llama_sampler_chain_add(
                self.ptr,
                llama_sys::llama_sampler_init_top_p(p, min_keep),
            )
        }
    }

    pub fn add_temp(&mut self, t: f32) {
        unsafe {
            llama_sys::llama_sampler_chain_add(self.ptr, llama_sys::llama_sampler_init_temp(t))
        }
    }

    //  Sampling

    /// Sample from the logits of output `idx` of the last decode; `-1`
    /// selects the last output. The chain accepts the token itself.
    pub fn sample(&mut self, ctx: &LlamaContext, idx: i32) -> i32 {
        unsafe { llama_sys::llama_sampler_sample(self.ptr, ctx.as_ptr(), idx) }
    }
}

impl Drop for SamplerChain {
    fn drop(&mut self) {
        if !self.ptr.is_null() {
            unsafe { llama_sys::llama_sampler_free(self.ptr) }
        }
    }
}
