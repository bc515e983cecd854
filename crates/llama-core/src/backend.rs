//! Process-wide llama.cpp backend state.
//!
//! Unlike a server, the keyboard tears the backend down whenever it
//! unloads its model to give memory back to the host app, so init and free
//! are explicit and may be repeated.

use std::ffi::CStr;
use std::sync::Once;

use tracing::{debug, info};

static LOG_CALLBACK: Once = Once::new();

/// Initialize the backend (accelerator discovery, ggml time tables).
pub fn init() {
    unsafe {
        llama_sys::llama_backend_init();
    }
    install_log_callback();
    info!("llama.cpp backend initialized");
}

/// Release backend state. Call only after every model and context is gone.
pub fn free() {
    unsafe {
        llama_sys::llama_backend_free();
    }
    info!("llama.cpp backend freed");
}

/// Microsecond clock maintained by ggml.
pub fn time_us() -> i64 {
    unsafe { llama_sys::llama_time_us() }
}

/// Route llama.cpp's own log lines into `tracing` under the `llama.cpp`
/// target. Installed once per process.
fn install_log_callback() {
    unsafe extern "C" fn cb(
        level: llama_sys::ggml_log_level,
        text: *const std::ffi::c_char,
        _user_data: *mut std::ffi::c_void,
    ) {
        if text.is_null() {
            return;
        }
        let msg = unsafe { CStr::from_ptr(text) }.to_string_lossy();
        let msg = msg.trim();
        if msg.is_empty() {
            return;
        }
        // ggml_log_level: DEBUG=1, INFO=2, WARN=3, ERROR=4, CONT=5
        match level {
            4 => tracing::error!(target: "llama.cpp", "{msg}"),
            3 => tracing::warn!(target: "llama.cpp", "{msg}"),
            2 => tracing::info!(target: "llama.cpp", "{msg}"),
            _ => tracing::debug!(target: "llama.cpp", "{msg}"),
        }
    }

    LOG_CALLBACK.call_once(|| {
        unsafe {
            llama_sys::llama_log_set(Some(cb), std::ptr::null_mut());
        }
        debug!("llama.cpp log callback installed");
    });
}
