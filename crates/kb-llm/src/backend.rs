//! The seam between the session manager and an inference engine.

use std::convert::Infallible;
use std::path::Path;

use crate::error::{BridgeError, Result};
use crate::sampling::{SamplerStage, timestamp_seed};

/// Vocabulary token id.
pub type Token = i32;

/// Layers requested for offload; engines clamp it to the layer count.
pub const OFFLOAD_ALL_LAYERS: i32 = 999;

/// Model and context parameters supplied by `initialize`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadParams {
    /// Context window in tokens; 0 uses the model's training size.
    pub context_size: u32,
    /// Compute threads for both single-token and batch evaluation.
    pub threads: i32,
    pub gpu_layers: i32,
}

impl LoadParams {
    /// Build parameters from caller-supplied values. Negative context
    /// sizes become 0 and thread counts below 1 fall back to
    /// [`default_threads`].
    pub fn new(context_size: i32, threads: i32) -> Self {
        Self {
            context_size: context_size.max(0) as u32,
            threads: if threads >= 1 {
                threads
            } else {
                default_threads()
            },
            gpu_layers: OFFLOAD_ALL_LAYERS,
        }
    }
}

/// Leave two cores to the host app, but never use fewer than two.
pub fn default_threads() -> i32 {
    let cpus = std::thread::available_parallelism()
        .map(|n| n.get() as i32)
        .unwrap_or(4);
    (cpus - 2).max(2)
}

/// Operations the session sequences. Handles are RAII: dropping a model,
/// context or sampler releases it in the engine.
///
/// The session guarantees that a context is dropped before the model it
/// was created from, and that `shutdown` is only called once both are
/// gone.
pub trait InferenceBackend {
    type Model;
    type Context;
    type Sampler;

    /// Bring up engine runtime state (accelerator backends and the like).
    fn init(&mut self) -> Result<()>;

    /// Tear down what `init` established.
    fn shutdown(&mut self);

    fn load_model(&mut self, path: &Path, params: &LoadParams) -> Result<Self::Model>;

    fn create_context(&mut self, model: &Self::Model, params: &LoadParams)
    -> Result<Self::Context>;

    /// Instantiate `stages` as one chain, in order.
    fn build_sampler(&self, stages: &[SamplerStage]) -> Result<Self::Sampler>;

    /// Tokenize with BOS and special-token parsing enabled.
    fn tokenize(&self, model: &Self::Model, text: &str) -> Result<Vec<Token>>;

    /// Forget every evaluated position so the next decode starts fresh.
    fn reset(&self, ctx: &mut Self::Context);

    /// Evaluate `tokens` after the positions already in `ctx`.
    fn decode(&self, ctx: &mut Self::Context, tokens: &[Token]) -> Result<()>;

    /// Pick the next token from the last decode's logits.
    fn sample(&self, sampler: &mut Self::Sampler, ctx: &mut Self::Context) -> Token;

    fn is_end_of_generation(&self, model: &Self::Model, token: Token) -> bool;

    /// Raw text bytes of `token`; may be part of a multi-byte character.
    fn piece(&self, model: &Self::Model, token: Token) -> Vec<u8>;

    /// Seed for the distribution selector.
    fn seed(&self) -> u32 {
        timestamp_seed()
    }
}

/// Backend for builds without an engine: initialization succeeds, every
/// model load fails, so a session can never become ready.
#[derive(Debug, Default, Clone, Copy)]
pub struct StubBackend;

const STUB_REASON: &str = "built without llama.cpp (enable the `llama-cpp` feature)";

impl InferenceBackend for StubBackend {
    type Model = Infallible;
    type Context = Infallible;
    type Sampler = Infallible;

    fn init(&mut self) -> Result<()> {
        Ok(())
    }

    fn shutdown(&mut self) {}

    fn load_model(&mut self, _path: &Path, _params: &LoadParams) -> Result<Infallible> {
        Err(BridgeError::BackendUnavailable(STUB_REASON.into()))
    }

    fn create_context(&mut self, model: &Infallible, _params: &LoadParams) -> Result<Infallible> {
        match *model {}
    }

    fn build_sampler(&self, _stages: &[SamplerStage]) -> Result<Infallible> {
        Err(BridgeError::BackendUnavailable(STUB_REASON.into()))
    }

    fn tokenize(&self, model: &Infallible, _text: &str) -> Result<Vec<Token>> {
        match *model {}
    }

    fn reset(&self, ctx: &mut Infallible) {
        match *ctx {}
    }

    fn decode(&self, ctx: &mut Infallible, _tokens: &[Token]) -> Result<()> {
        match *ctx {}
    }

    fn sample(&self, sampler: &mut Infallible, _ctx: &mut Infallible) -> Token {
        match *sampler {}
    }

    fn is_end_of_generation(&self, model: &Infallible, _token: Token) -> bool {
        match *model {}
    }

    fn piece(&self, model: &Infallible, _token: Token) -> Vec<u8> {
        match *model {}
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_params_normalizes_inputs() {
        let params = LoadParams::new(-5, 0);
        assert_eq!(params.context_size, 0);
        assert!(params.threads >= 2);
        assert_eq!(params.gpu_layers, OFFLOAD_ALL_LAYERS);

        let params = LoadParams::new(2048, 4);
        assert_eq!(params.context_size, 2048);
        assert_eq!(params.threads, 4);
    }

    #[test]
    fn stub_never_loads() {
        let mut backend = StubBackend;
        assert!(backend.init().is_ok());
        let err = backend
            .load_model(Path::new("model.gguf"), &LoadParams::new(512, 2))
            .unwrap_err();
        assert!(matches!(err, BridgeError::BackendUnavailable(_)));
    }
}
