//! Single-model inference session.
//!
//! A [`Session`] owns at most one model and one context, created together by
//! [`Session::initialize`] and released together by [`Session::unload`].
//! Lifecycle: `Unloaded --initialize--> Ready --unload--> Unloaded`.

use std::fmt;
use std::path::{Path, PathBuf};

use tracing::{debug, error, info, warn};

use crate::backend::{InferenceBackend, LoadParams};
use crate::error::{BridgeError, Result};
use crate::output::GeneratedText;
use crate::sampling::SamplingParams;

/// Longest text fragment kept from a single token; longer pieces are cut.
pub const MAX_PIECE_BYTES: usize = 128;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Unloaded,
    Ready,
}

/// Successful result of [`Session::initialize`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum InitOutcome {
    Loaded,
    /// A model was already loaded; nothing changed.
    AlreadyLoaded,
}

/// Parameters for one generate call.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerateRequest {
    pub prompt: String,
    /// Upper bound on sampled tokens, end-of-generation included.
    pub max_tokens: u32,
    pub sampling: SamplingParams,
}

impl GenerateRequest {
    pub fn new(prompt: impl Into<String>, max_tokens: u32, sampling: SamplingParams) -> Self {
        Self {
            prompt: prompt.into(),
            max_tokens,
            sampling,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FinishReason {
    /// End-of-generation token.
    Stop,
    /// Reached `max_tokens`.
    Length,
    /// Feeding a sampled token back failed; the text is partial.
    DecodeFailed,
}

impl fmt::Display for FinishReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stop => write!(f, "stop"),
            Self::Length => write!(f, "length"),
            Self::DecodeFailed => write!(f, "decode_failed"),
        }
    }
}

/// Output of a successful generate call.
#[derive(Debug)]
pub struct Generation {
    pub text: GeneratedText,
    pub prompt_tokens: u32,
    /// Tokens appended to `text` (end-of-generation excluded).
    pub completion_tokens: u32,
    pub finish_reason: FinishReason,
}

/// Model and context, present together or not at all. Fields drop in
/// declaration order, so the context goes before its model.
struct Loaded<B: InferenceBackend> {
    context: B::Context,
    model: B::Model,
    path: PathBuf,
}

pub struct Session<B: InferenceBackend> {
    backend: B,
    loaded: Option<Loaded<B>>,
}

impl<B: InferenceBackend> Session<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            loaded: None,
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn state(&self) -> SessionState {
        if self.loaded.is_some() {
            SessionState::Ready
        } else {
            SessionState::Unloaded
        }
    }

    pub fn is_ready(&self) -> bool {
        self.loaded.is_some()
    }

    /// Path of the loaded model, if any.
    pub fn model_path(&self) -> Option<&Path> {
        self.loaded.as_ref().map(|l| l.path.as_path())
    }

    /// Bring up the backend, load `path` and create a context.
    ///
    /// While a model is loaded this is a no-op returning
    /// [`InitOutcome::AlreadyLoaded`], even for a different path. On any
    /// failure everything acquired so far is released and the session stays
    /// unloaded.
    pub fn initialize(&mut self, path: &Path, params: &LoadParams) -> Result<InitOutcome> {
        if let Some(loaded) = &self.loaded {
            info!(
                loaded = %loaded.path.display(),
                requested = %path.display(),
                "Model already loaded"
            );
            return Ok(InitOutcome::AlreadyLoaded);
        }

        info!(
            path = %path.display(),
            n_ctx = params.context_size,
            n_threads = params.threads,
            "Initializing session"
        );
        self.backend.init()?;

        let model = match self.backend.load_model(path, params) {
            Ok(model) => model,
            Err(e) => {
                error!(path = %path.display(), "Model load failed: {e}");
                self.backend.shutdown();
                return Err(e);
            }
        };

        let context = match self.backend.create_context(&model, params) {
            Ok(context) => context,
            Err(e) => {
                error!(path = %path.display(), "Context creation failed: {e}");
                drop(model);
                self.backend.shutdown();
                return Err(e);
            }
        };

        self.loaded = Some(Loaded {
            context,
            model,
            path: path.to_path_buf(),
        });
        info!(path = %path.display(), "Session ready");
        Ok(InitOutcome::Loaded)
    }

    /// Release context, model and backend state. Safe to call repeatedly.
    pub fn unload(&mut self) {
        match self.loaded.take() {
            Some(loaded) => {
                let path = loaded.path.clone();
                drop(loaded);
                self.backend.shutdown();
                info!(path = %path.display(), "Session unloaded");
            }
            None => debug!("Unload with no model loaded"),
        }
    }

    /// Run one prompt to completion.
    ///
    /// Fails without side effects when no model is loaded, when the prompt
    /// yields no tokens, or when the prompt cannot be evaluated. A decode
    /// failure after generation started ends the loop early and returns the
    /// text so far with [`FinishReason::DecodeFailed`].
    pub fn generate(&mut self, request: &GenerateRequest) -> Result<Generation> {
        let Some(loaded) = self.loaded.as_mut() else {
            error!("generate called without a loaded model");
            return Err(BridgeError::NotReady);
        };
        let backend = &self.backend;

        // The sampler is an RAII handle: every return below releases it.
        let stages = request.sampling.plan(backend.seed());
        let mut sampler = backend.build_sampler(&stages)?;
        debug!(?stages, max_tokens = request.max_tokens, "Sampler built");

        let tokens = if request.prompt.is_empty() {
            Vec::new()
        } else {
            backend.tokenize(&loaded.model, &request.prompt)?
        };
        if tokens.is_empty() {
            error!("Prompt produced no tokens");
            return Err(BridgeError::Tokenize("prompt produced no tokens".into()));
        }
        let prompt_tokens = tokens.len() as u32;

        backend.reset(&mut loaded.context);
        if let Err(e) = backend.decode(&mut loaded.context, &tokens) {
            error!(prompt_tokens, "Prompt decode failed: {e}");
            return Err(BridgeError::PromptEval(e.to_string()));
        }

        let mut out: Vec<u8> = Vec::new();
        let mut completion_tokens = 0u32;
        let mut finish_reason = FinishReason::Length;

        for _ in 0..request.max_tokens {
            let token = backend.sample(&mut sampler, &mut loaded.context);
            if backend.is_end_of_generation(&loaded.model, token) {
                finish_reason = FinishReason::Stop;
                break;
            }

            let mut piece = backend.piece(&loaded.model, token);
            if piece.len() > MAX_PIECE_BYTES {
                warn!(token, len = piece.len(), "Token piece truncated");
                piece.truncate(MAX_PIECE_BYTES);
            }
            out.try_reserve(piece.len())
                .map_err(|_| BridgeError::Allocation)?;
            out.extend_from_slice(&piece);
            completion_tokens += 1;

            if let Err(e) = backend.decode(&mut loaded.context, &[token]) {
                let err = BridgeError::StepDecode {
                    generated: completion_tokens,
                    reason: e.to_string(),
                };
                warn!("{err}; returning partial output");
                finish_reason = FinishReason::DecodeFailed;
                break;
            }
        }
        drop(sampler);

        debug!(
            prompt_tokens,
            completion_tokens,
            %finish_reason,
            "Generation finished"
        );
        Ok(Generation {
            text: GeneratedText::from_bytes(out),
            prompt_tokens,
            completion_tokens,
            finish_reason,
        })
    }
}

impl<B: InferenceBackend> Drop for Session<B> {
    fn drop(&mut self) {
        if self.loaded.is_some() {
            self.unload();
        }
    }
}

impl<B: InferenceBackend> fmt::Debug for Session<B> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Session")
            .field("state", &self.state())
            .field("model_path", &self.model_path())
            .finish()
    }
}
