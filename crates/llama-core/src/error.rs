use thiserror::Error;

#[derive(Error, Debug)]
pub enum LlamaError {
    #[error("Failed to load model from '{path}': {reason}")]
    ModelLoadFailed { path: String, reason: String },

    #[error("Failed to create context: {0}")]
    ContextCreationFailed(String),

    #[error("Decode failed with code {0}")]
    DecodeFailed(i32),

    #[error("Tokenization failed: {0}")]
    TokenizationFailed(String),

    #[error("Failed to allocate sampler chain")]
    SamplerInitFailed,
}

pub type Result<T> = std::result::Result<T, LlamaError>;
