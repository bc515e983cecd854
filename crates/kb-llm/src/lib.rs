//! On-device text generation for a keyboard extension.
//!
//! The crate sequences llama.cpp calls for a single model: load it, run one
//! prompt at a time through a freshly built sampler chain, hand the text
//! back, unload. Rust callers use [`Session`] directly with any
//! [`InferenceBackend`]; the keyboard links the static library and calls
//! the C functions in [`ffi`].

pub mod backend;
pub mod error;
pub mod ffi;
#[cfg(feature = "llama-cpp")]
pub mod llama;
pub mod logging;
pub mod output;
pub mod prompt;
pub mod sampling;
pub mod session;
#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use backend::{InferenceBackend, LoadParams, StubBackend, Token, default_threads};
pub use error::{BridgeError, Result};
pub use ffi::DefaultBackend;
#[cfg(feature = "llama-cpp")]
pub use llama::LlamaCppBackend;
pub use output::GeneratedText;
pub use prompt::{Mode, Style, build_prompt};
pub use sampling::{SamplerStage, SamplingParams};
pub use session::{
    FinishReason, GenerateRequest, Generation, InitOutcome, MAX_PIECE_BYTES, Session,
    SessionState,
};
