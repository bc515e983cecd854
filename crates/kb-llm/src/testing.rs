//! Scripted in-memory backend for exercising sessions without an engine.
//!
//! Tokens `0..=255` are single bytes, [`EOG_TOKEN`] ends generation and
//! [`BOS_TOKEN`] is prepended by `tokenize`. Whatever the sampler stages,
//! sampling replays the configured reply and then returns [`EOG_TOKEN`].
//! Every handle is counted, so tests can assert that nothing leaks.

use std::path::Path;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use crate::backend::{InferenceBackend, LoadParams, Token};
use crate::error::{BridgeError, Result};
use crate::sampling::SamplerStage;

pub const EOG_TOKEN: Token = 256;
pub const BOS_TOKEN: Token = 257;
const FIRST_EXTRA_TOKEN: Token = 300;
const SCRIPTED_SEED: u32 = 0x5eed;

#[derive(Default)]
struct Counters {
    backend_inits: AtomicUsize,
    backend_shutdowns: AtomicUsize,
    models_loaded: AtomicUsize,
    live_models: AtomicUsize,
    live_contexts: AtomicUsize,
    live_samplers: AtomicUsize,
    samplers_built: AtomicUsize,
    last_stages: Mutex<Vec<SamplerStage>>,
}

fn live_models(c: &Counters) -> &AtomicUsize {
    &c.live_models
}
fn live_contexts(c: &Counters) -> &AtomicUsize {
    &c.live_contexts
}
fn live_samplers(c: &Counters) -> &AtomicUsize {
    &c.live_samplers
}

/// Increments a live counter on creation and decrements it on drop.
struct LiveGuard {
    counters: Arc<Counters>,
    field: fn(&Counters) -> &AtomicUsize,
}

impl LiveGuard {
    fn new(counters: &Arc<Counters>, field: fn(&Counters) -> &AtomicUsize) -> Self {
        field(counters).fetch_add(1, Ordering::SeqCst);
        Self {
            counters: Arc::clone(counters),
            field,
        }
    }
}

impl Drop for LiveGuard {
    fn drop(&mut self) {
        (self.field)(&self.counters).fetch_sub(1, Ordering::SeqCst);
    }
}

pub struct ScriptedModel {
    _live: LiveGuard,
}

pub struct ScriptedContext {
    /// Next reply index to sample.
    cursor: usize,
    /// Positions evaluated since the last reset.
    n_past: usize,
    /// Single-token decodes since the last reset.
    step_decodes: u32,
    _live: LiveGuard,
}

pub struct ScriptedSampler {
    _live: LiveGuard,
}

/// Read-only view of a [`ScriptedBackend`]'s counters that stays valid
/// after the backend moves into a session.
#[derive(Clone)]
pub struct Tally {
    counters: Arc<Counters>,
}

impl Tally {
    pub fn backend_inits(&self) -> usize {
        self.counters.backend_inits.load(Ordering::SeqCst)
    }
    pub fn backend_shutdowns(&self) -> usize {
        self.counters.backend_shutdowns.load(Ordering::SeqCst)
    }
    /// Successful model loads over the backend's lifetime.
    pub fn models_loaded(&self) -> usize {
        self.counters.models_loaded.load(Ordering::SeqCst)
    }
    pub fn live_models(&self) -> usize {
        self.counters.live_models.load(Ordering::SeqCst)
    }
    pub fn live_contexts(&self) -> usize {
        self.counters.live_contexts.load(Ordering::SeqCst)
    }
    pub fn live_samplers(&self) -> usize {
        self.counters.live_samplers.load(Ordering::SeqCst)
    }
    pub fn samplers_built(&self) -> usize {
        self.counters.samplers_built.load(Ordering::SeqCst)
    }
    /// Stages of the most recently built sampler.
    pub fn last_stages(&self) -> Vec<SamplerStage> {
        self.counters
            .last_stages
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

#[derive(Default)]
pub struct ScriptedBackend {
    reply: Vec<Token>,
    extra_pieces: Vec<Vec<u8>>,
    fail_model_load: bool,
    fail_context: bool,
    fail_prompt_decode: bool,
    fail_step_decode_at: Option<u32>,
    counters: Arc<Counters>,
}

impl ScriptedBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn tally(&self) -> Tally {
        Tally {
            counters: Arc::clone(&self.counters),
        }
    }

    /// Append the bytes of `text` to the reply, one token per byte.
    pub fn reply_text(mut self, text: &str) -> Self {
        self.reply.extend(text.bytes().map(Token::from));
        self
    }

    /// Append one token whose piece is `len` bytes of `x`.
    pub fn oversized_piece(mut self, len: usize) -> Self {
        let token = FIRST_EXTRA_TOKEN + self.extra_pieces.len() as Token;
        self.extra_pieces.push(vec![b'x'; len]);
        self.reply.push(token);
        self
    }

    pub fn failing_model_load(mut self) -> Self {
        self.fail_model_load = true;
        self
    }

    pub fn failing_context(mut self) -> Self {
        self.fail_context = true;
        self
    }

    pub fn failing_prompt_decode(mut self) -> Self {
        self.fail_prompt_decode = true;
        self
    }

    /// Fail the `n`th single-token decode of each request (1-based).
    pub fn failing_decode_after(mut self, n: u32) -> Self {
        self.fail_step_decode_at = Some(n);
        self
    }
}

impl InferenceBackend for ScriptedBackend {
    type Model = ScriptedModel;
    type Context = ScriptedContext;
    type Sampler = ScriptedSampler;

    fn init(&mut self) -> Result<()> {
        self.counters.backend_inits.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }

    fn shutdown(&mut self) {
        self.counters.backend_shutdowns.fetch_add(1, Ordering::SeqCst);
    }

    fn load_model(&mut self, path: &Path, _params: &LoadParams) -> Result<ScriptedModel> {
        if self.fail_model_load {
            return Err(BridgeError::ModelLoad {
                path: path.display().to_string(),
                reason: "scripted failure".into(),
            });
        }
        self.counters.models_loaded.fetch_add(1, Ordering::SeqCst);
        Ok(ScriptedModel {
            _live: LiveGuard::new(&self.counters, live_models),
        })
    }

    fn create_context(
        &mut self,
        _model: &ScriptedModel,
        _params: &LoadParams,
    ) -> Result<ScriptedContext> {
        if self.fail_context {
            return Err(BridgeError::ContextCreate("scripted failure".into()));
        }
        Ok(ScriptedContext {
            cursor: 0,
            n_past: 0,
            step_decodes: 0,
            _live: LiveGuard::new(&self.counters, live_contexts),
        })
    }

    fn build_sampler(&self, stages: &[SamplerStage]) -> Result<ScriptedSampler> {
        self.counters.samplers_built.fetch_add(1, Ordering::SeqCst);
        *self
            .counters
            .last_stages
            .lock()
            .unwrap_or_else(PoisonError::into_inner) = stages.to_vec();
        Ok(ScriptedSampler {
            _live: LiveGuard::new(&self.counters, live_samplers),
        })
    }

    fn tokenize(&self, _model: &ScriptedModel, text: &str) -> Result<Vec<Token>> {
        if text.is_empty() {
            return Ok(Vec::new());
        }
        let mut tokens = Vec::with_capacity(text.len() + 1);
        tokens.push(BOS_TOKEN);
        tokens.extend(text.bytes().map(Token::from));
        Ok(tokens)
    }

    fn reset(&self, ctx: &mut ScriptedContext) {
        ctx.cursor = 0;
        ctx.n_past = 0;
        ctx.step_decodes = 0;
    }

    fn decode(&self, ctx: &mut ScriptedContext, tokens: &[Token]) -> Result<()> {
        if ctx.n_past == 0 {
            if self.fail_prompt_decode {
                return Err(BridgeError::Decode(-1));
            }
        } else {
            ctx.step_decodes += 1;
            if self.fail_step_decode_at.is_some_and(|n| ctx.step_decodes >= n) {
                return Err(BridgeError::Decode(1));
            }
        }
        ctx.n_past += tokens.len();
        Ok(())
    }

    fn sample(&self, _sampler: &mut ScriptedSampler, ctx: &mut ScriptedContext) -> Token {
        let token = self.reply.get(ctx.cursor).copied().unwrap_or(EOG_TOKEN);
        ctx.cursor += 1;
        token
    }

    fn is_end_of_generation(&self, _model: &ScriptedModel, token: Token) -> bool {
        token == EOG_TOKEN
    }

    fn piece(&self, _model: &ScriptedModel, token: Token) -> Vec<u8> {
        match token {
            0..=255 => vec![token as u8],
            t if t >= FIRST_EXTRA_TOKEN => self
                .extra_pieces
                .get((t - FIRST_EXTRA_TOKEN) as usize)
                .cloned()
                .unwrap_or_default(),
            _ => Vec::new(),
        }
    }

    fn seed(&self) -> u32 {
        SCRIPTED_SEED
    }
}
