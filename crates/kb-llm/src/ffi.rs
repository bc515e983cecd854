//! C ABI consumed by the keyboard extension (see `include/kb_llm.h`).
//!
//! The C side sees one process-wide session. Calls are expected to be
//! serialized by the caller; the mutex only makes the static sound. No
//! panic crosses this boundary: each entry point catches unwinds and
//! reports failure instead.

use std::ffi::{CStr, c_char, c_int};
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::sync::{LazyLock, Mutex, MutexGuard, PoisonError};

use tracing::error;

use crate::backend::{InferenceBackend, LoadParams};
use crate::error::{BridgeError, Result};
use crate::logging::init_logging;
use crate::output::GeneratedText;
use crate::sampling::SamplingParams;
use crate::session::{GenerateRequest, Session};

/// Engine behind the exported functions.
#[cfg(feature = "llama-cpp")]
pub type DefaultBackend = crate::llama::LlamaCppBackend;
#[cfg(not(feature = "llama-cpp"))]
pub type DefaultBackend = crate::backend::StubBackend;

static SESSION: LazyLock<Mutex<Session<DefaultBackend>>> =
    LazyLock::new(|| Mutex::new(Session::new(DefaultBackend::default())));

const OK: c_int = 1;
const FAILED: c_int = 0;

fn session() -> MutexGuard<'static, Session<DefaultBackend>> {
    // A panic mid-call leaves the session structurally intact.
    SESSION.lock().unwrap_or_else(PoisonError::into_inner)
}

/// Run `f`, logging errors and panics, and map the outcome to 1/0.
fn guarded(op: &str, f: impl FnOnce() -> Result<()>) -> c_int {
    init_logging();
    match panic::catch_unwind(AssertUnwindSafe(f)) {
        Ok(Ok(())) => OK,
        Ok(Err(e)) => {
            error!(op, "{e}");
            FAILED
        }
        Err(_) => {
            error!(op, "panic caught at FFI boundary");
            FAILED
        }
    }
}

/// Borrow a NUL-terminated UTF-8 argument.
///
/// # Safety
///
/// `ptr` must be null or point to a NUL-terminated string that outlives
/// the returned slice.
unsafe fn c_str<'a>(ptr: *const c_char, what: &str) -> Result<&'a str> {
    if ptr.is_null() {
        return Err(BridgeError::InvalidArgument(format!("{what} is null")));
    }
    unsafe { CStr::from_ptr(ptr) }
        .to_str()
        .map_err(|_| BridgeError::InvalidArgument(format!("{what} is not valid UTF-8")))
}

/// Load the model at `model_path` and create its context.
///
/// Returns 1 on success or when a model is already loaded, 0 otherwise.
/// `n_ctx <= 0` uses the model's training context; `n_threads <= 0` picks
/// a default.
///
/// # Safety
///
/// `model_path` must be null or a valid NUL-terminated string.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn kb_llm_init(
    model_path: *const c_char,
    n_ctx: c_int,
    n_threads: c_int,
) -> c_int {
    unsafe { init_with(&mut *session(), model_path, n_ctx, n_threads) }
}

/// Release the context, the model and backend state. Always returns 1.
#[unsafe(no_mangle)]
pub extern "C" fn kb_llm_unload() -> c_int {
    unload_with(&mut *session())
}

/// Generate a completion for `prompt`.
///
/// On success returns 1 and stores a new string in `*out_text`; release it
/// with [`kb_llm_free_string`]. On failure returns 0 and stores null.
///
/// # Safety
///
/// `prompt` must be null or a valid NUL-terminated string; `out_text` must
/// be null or valid for a pointer write.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn kb_llm_generate(
    prompt: *const c_char,
    max_tokens: c_int,
    temp: f32,
    top_k: c_int,
    top_p: f32,
    out_text: *mut *mut c_char,
) -> c_int {
    let sampling = SamplingParams {
        temperature: temp,
        top_k,
        top_p,
    };
    unsafe { generate_into(&mut *session(), prompt, max_tokens, sampling, out_text) }
}

/// Body of [`kb_llm_init`] for any backend.
///
/// # Safety
///
/// Same contract as [`kb_llm_init`].
pub(crate) unsafe fn init_with<B: InferenceBackend>(
    session: &mut Session<B>,
    model_path: *const c_char,
    n_ctx: c_int,
    n_threads: c_int,
) -> c_int {
    guarded("kb_llm_init", || {
        if session.is_ready() {
            return Ok(());
        }
        let path = unsafe { c_str(model_path, "model_path") }?;
        let params = LoadParams::new(n_ctx, n_threads);
        session.initialize(Path::new(path), &params).map(|_| ())
    })
}

/// Body of [`kb_llm_unload`] for any backend.
pub(crate) fn unload_with<B: InferenceBackend>(session: &mut Session<B>) -> c_int {
    guarded("kb_llm_unload", || {
        session.unload();
        Ok(())
    });
    OK
}

/// Body of [`kb_llm_generate`] for any backend.
///
/// # Safety
///
/// Same contract as [`kb_llm_generate`].
pub(crate) unsafe fn generate_into<B: InferenceBackend>(
    session: &mut Session<B>,
    prompt: *const c_char,
    max_tokens: c_int,
    sampling: SamplingParams,
    out_text: *mut *mut c_char,
) -> c_int {
    if out_text.is_null() {
        init_logging();
        error!("kb_llm_generate: out_text is null");
        return FAILED;
    }
    unsafe { out_text.write(std::ptr::null_mut()) };

    guarded("kb_llm_generate", || {
        let prompt = unsafe { c_str(prompt, "prompt") }?;
        let request = GenerateRequest::new(prompt, max_tokens.max(0) as u32, sampling);
        let generation = session.generate(&request)?;
        unsafe { out_text.write(generation.text.into_raw()) };
        Ok(())
    })
}

/// Release a string returned by [`kb_llm_generate`]. Null is ignored.
///
/// # Safety
///
/// `text` must be null or a pointer from `kb_llm_generate` that has not
/// been freed yet.
#[unsafe(no_mangle)]
pub unsafe extern "C" fn kb_llm_free_string(text: *mut c_char) {
    unsafe { GeneratedText::free_raw(text) }
}

#[cfg(test)]
mod tests {
    use std::ffi::{CStr, CString};
    use std::ptr;

    use super::*;
    use crate::testing::ScriptedBackend;

    fn ready(backend: ScriptedBackend) -> Session<ScriptedBackend> {
        let mut session = Session::new(backend);
        let path = CString::new("model.gguf").unwrap();
        assert_eq!(unsafe { init_with(&mut session, path.as_ptr(), 512, 2) }, OK);
        session
    }

    /// Run a greedy generate; the out slot starts non-null so a failure
    /// must visibly clear it.
    fn generate(session: &mut Session<ScriptedBackend>, prompt: &str) -> (c_int, *mut c_char) {
        let prompt = CString::new(prompt).unwrap();
        let mut out: *mut c_char = ptr::NonNull::dangling().as_ptr();
        let ok = unsafe {
            generate_into(session, prompt.as_ptr(), 16, SamplingParams::greedy(), &mut out)
        };
        (ok, out)
    }

    fn take_text(out: *mut c_char) -> String {
        assert!(!out.is_null());
        let text = unsafe { CStr::from_ptr(out) }.to_str().unwrap().to_owned();
        unsafe { kb_llm_free_string(out) };
        text
    }

    #[test]
    fn generate_hands_text_to_caller() {
        let mut session = ready(ScriptedBackend::new().reply_text("Hi there"));

        let (ok, out) = generate(&mut session, "Hello");
        assert_eq!(ok, OK);
        assert_eq!(take_text(out), "Hi there");
    }

    #[test]
    fn step_decode_failure_returns_partial_text() {
        let mut session = ready(ScriptedBackend::new().reply_text("abc").failing_decode_after(2));

        let (ok, out) = generate(&mut session, "Hello");
        assert_eq!(ok, OK);
        assert_eq!(take_text(out), "ab");
    }

    #[test]
    fn prompt_decode_failure_leaves_out_null() {
        let mut session = ready(ScriptedBackend::new().reply_text("abc").failing_prompt_decode());

        let (ok, out) = generate(&mut session, "Hello");
        assert_eq!(ok, FAILED);
        assert!(out.is_null());
    }

    #[test]
    fn generate_after_unload_fails() {
        let mut session = ready(ScriptedBackend::new().reply_text("abc"));
        let (ok, out) = generate(&mut session, "Hello");
        assert_eq!(ok, OK);
        take_text(out);

        assert_eq!(unload_with(&mut session), OK);
        let (ok, out) = generate(&mut session, "Hello");
        assert_eq!(ok, FAILED);
        assert!(out.is_null());
    }

    #[test]
    fn init_while_loaded_ignores_arguments() {
        let backend = ScriptedBackend::new();
        let tally = backend.tally();
        let mut session = ready(backend);

        assert_eq!(unsafe { init_with(&mut session, ptr::null(), 0, 0) }, OK);
        assert_eq!(tally.models_loaded(), 1);
        assert!(session.is_ready());
    }

    #[test]
    fn init_with_null_path_fails_when_unloaded() {
        let mut session = Session::new(ScriptedBackend::new());
        assert_eq!(unsafe { init_with(&mut session, ptr::null(), 512, 2) }, FAILED);
        assert!(!session.is_ready());
    }
}
