use thiserror::Error;

/// Everything that can go wrong inside the bridge. At the C boundary every
/// variant collapses to a `0` return; the message only reaches the log.
#[derive(Error, Debug)]
pub enum BridgeError {
    #[error("Failed to load model from '{path}': {reason}")]
    ModelLoad { path: String, reason: String },

    #[error("Failed to create context: {0}")]
    ContextCreate(String),

    #[error("No model loaded")]
    NotReady,

    #[error("Tokenization failed: {0}")]
    Tokenize(String),

    #[error("Decode failed with code {0}")]
    Decode(i32),

    #[error("Prompt evaluation failed: {0}")]
    PromptEval(String),

    #[error("Decode failed after {generated} generated tokens: {reason}")]
    StepDecode { generated: u32, reason: String },

    #[error("Could not allocate output buffer")]
    Allocation,

    #[error("Inference backend unavailable: {0}")]
    BackendUnavailable(String),

    #[error("Invalid argument: {0}")]
    InvalidArgument(String),
}

pub type Result<T> = std::result::Result<T, BridgeError>;

#[cfg(feature = "llama-cpp")]
impl From<llama_core::LlamaError> for BridgeError {
    fn from(err: llama_core::LlamaError) -> Self {
        use llama_core::LlamaError;
        match err {
            LlamaError::ModelLoadFailed { path, reason } => Self::ModelLoad { path, reason },
            LlamaError::ContextCreationFailed(reason) => Self::ContextCreate(reason),
            LlamaError::DecodeFailed(code) => Self::Decode(code),
            LlamaError::TokenizationFailed(reason) => Self::Tokenize(reason),
            LlamaError::SamplerInitFailed => Self::Allocation,
        }
    }
}
