//! Safe RAII wrapper around `llama_model`.

use std::ffi::CString;
use std::path::Path;

use tracing::{debug, info};

use crate::error::{LlamaError, Result};

/// Owns a `llama_model` pointer and frees it on drop.
pub struct LlamaModel {
    ptr: *mut llama_sys::llama_model,
}

// Safety: llama_model is internally read-only after creation.
unsafe impl Send for LlamaModel {}
unsafe impl Sync for LlamaModel {}

impl LlamaModel {
    /// Load a GGUF model from `path`.
    pub fn load_from_file(path: &Path, params: &ModelParams) -> Result<Self> {
        let path_str = path.to_str().ok_or_else(|| LlamaError::ModelLoadFailed {
            path: path.display().to_string(),
            reason: "Invalid UTF-8 in path".into(),
        })?;
        let c_path = CString::new(path_str).map_err(|_| LlamaError::ModelLoadFailed {
            path: path_str.into(),
            reason: "Path contains null byte".into(),
        })?;

        let mut raw = unsafe { llama_sys::llama_model_default_params() };
        raw.n_gpu_layers = params.n_gpu_layers;
        raw.use_mmap = params.use_mmap;

        info!(path = %path.display(), n_gpu_layers = params.n_gpu_layers, "Loading model…");
        let model = unsafe { llama_sys::llama_model_load_from_file(c_path.as_ptr(), raw) };

        if model.is_null() {
            return Err(LlamaError::ModelLoadFailed {
                path: path_str.into(),
                reason: "llama_model_load_from_file returned null".into(),
            });
        }

        info!(path = %path.display(), "Model loaded");
        Ok(Self { ptr: model })
    }

    pub(crate) fn as_ptr(&self) -> *mut llama_sys::llama_model {
        self.ptr
    }

    /// Vocabulary handle (valid for the lifetime of the model).
    pub fn vocab(&self) -> *const llama_sys::llama_vocab {
        unsafe { llama_sys::llama_model_get_vocab(self.ptr) }
    }

    pub fn n_ctx_train(&self) -> i32 {
        unsafe { llama_sys::llama_model_n_ctx_train(self.ptr) }
    }

    /// `true` for EOS, EOT and any other end-of-generation token.
    pub fn is_eog(&self, token: i32) -> bool {
        unsafe { llama_sys::llama_vocab_is_eog(self.vocab(), token) }
    }
}

impl Drop for LlamaModel {
    fn drop(&mut self) {
        if !self.ptr.is_null() {
            debug!("Freeing llama model");
            unsafe { llama_sys::llama_model_free(self.ptr) }
        }
    }
}

/// Parameters for [`LlamaModel::load_from_file`].
#[derive(Debug, Clone)]
pub struct ModelParams {
    /// Layers to offload to the accelerator. Anything above the layer
    /// count offloads everything.
    pub n_gpu_layers: i32,
    /// Use memory-mapped I/O.
    pub use_mmap: bool,
}

impl Default for ModelParams {
    fn default() -> Self {
        Self {
            n_gpu_layers: 999,
            use_mmap: true,
        }
    }
}
