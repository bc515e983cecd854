//! [`InferenceBackend`] over llama.cpp.

use std::path::Path;
use std::sync::Arc;

use llama_core::{ContextParams, LlamaContext, LlamaModel, ModelParams, SamplerChain};
use tracing::debug;

use crate::backend::{InferenceBackend, LoadParams, Token};
use crate::error::Result;
use crate::sampling::SamplerStage;

/// Drives the statically linked llama.cpp engine.
#[derive(Debug, Default)]
pub struct LlamaCppBackend {
    _private: (),
}

impl LlamaCppBackend {
    pub fn new() -> Self {
        Self::default()
    }
}

impl InferenceBackend for LlamaCppBackend {
    type Model = Arc<LlamaModel>;
    type Context = LlamaContext;
    type Sampler = SamplerChain;

    fn init(&mut self) -> Result<()> {
        llama_core::backend::init();
        Ok(())
    }

    fn shutdown(&mut self) {
        llama_core::backend::free();
    }

    fn load_model(&mut self, path: &Path, params: &LoadParams) -> Result<Self::Model> {
        let model_params = ModelParams {
            n_gpu_layers: params.gpu_layers,
            ..Default::default()
        };
        Ok(Arc::new(LlamaModel::load_from_file(path, &model_params)?))
    }

    fn create_context(&mut self, model: &Self::Model, params: &LoadParams) -> Result<Self::Context> {
        let ctx_params = ContextParams {
            n_ctx: params.context_size,
            n_threads: params.threads,
            n_threads_batch: params.threads,
        };
        let ctx = LlamaContext::new(model.clone(), &ctx_params)?;
        debug!(
            n_ctx = ctx.n_ctx(),
            n_ctx_train = model.n_ctx_train(),
            "Context ready"
        );
        Ok(ctx)
    }

    fn build_sampler(&self, stages: &[SamplerStage]) -> Result<Self::Sampler> {
        let mut chain = SamplerChain::new(true)?;
        for stage in stages {
            match *stage {
                SamplerStage::TopK(k) => chain.add_top_k(k),
                SamplerStage::TopP { p, min_keep } => chain.add_top_p(p, min_keep),
                SamplerStage::Temperature(t) => chain.add_temp(t),
                SamplerStage::Greedy => chain.add_greedy(),
                SamplerStage::Distribution { seed } => chain.add_dist(seed),
            }
        }
        debug!(stages = chain.len(), "Sampler chain built");
        Ok(chain)
    }

    fn tokenize(&self, model: &Self::Model, text: &str) -> Result<Vec<Token>> {
        Ok(llama_core::tokenize(model.vocab(), text, true, true)?)
    }

    fn reset(&self, ctx: &mut Self::Context) {
        ctx.clear_memory();
    }

    fn decode(&self, ctx: &mut Self::Context, tokens: &[Token]) -> Result<()> {
        Ok(ctx.decode_tokens(tokens)?)
    }

    fn sample(&self, sampler: &mut Self::Sampler, ctx: &mut Self::Context) -> Token {
        sampler.sample(ctx, -1)
    }

    fn is_end_of_generation(&self, model: &Self::Model, token: Token) -> bool {
        model.is_eog(token)
    }

    fn piece(&self, model: &Self::Model, token: Token) -> Vec<u8> {
        llama_core::token_to_bytes(model.vocab(), token)
    }

    fn seed(&self) -> u32 {
        llama_core::backend::time_us() as u32
    }
}
