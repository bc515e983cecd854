//! Safe Rust wrappers around the llama.cpp C API.
//!
//! Covers what a single-session text generator needs: backend lifetime,
//! model loading, a context that tracks its own decode position, sampler
//! chains, and tokenization.

pub mod backend;
pub mod batch;
pub mod context;
pub mod error;
pub mod model;
pub mod sampler;
pub mod token;

pub use batch::LlamaBatch;
pub use context::{ContextParams, LlamaContext};
pub use error::{LlamaError, Result};
pub use model::{LlamaModel, ModelParams};
pub use sampler::SamplerChain;
pub use token::{token_to_bytes, tokenize};
