//! Generated text and its hand-off across the C boundary.
//!
//! Inside Rust the text is an ordinary owned value. Handing it to C goes
//! through [`GeneratedText::into_raw`], after which the only valid way to
//! release the buffer is [`GeneratedText::free_raw`] (exported as
//! `kb_llm_free_string`). Passing the pointer to C `free()` is undefined
//! behaviour.

use std::ffi::{CString, c_char};
use std::fmt;

use tracing::warn;

/// Text produced by one generate call.
#[must_use = "generated text owns its buffer; consume it or convert it with `into_raw`"]
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct GeneratedText(String);

impl GeneratedText {
    /// Accumulated token bytes to text. Invalid UTF-8 (for example a
    /// character cut by fragment truncation) is replaced with U+FFFD.
    pub fn from_bytes(bytes: Vec<u8>) -> Self {
        match String::from_utf8(bytes) {
            Ok(text) => Self(text),
            Err(err) => Self(String::from_utf8_lossy(err.as_bytes()).into_owned()),
        }
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn into_string(self) -> String {
        self.0
    }

    /// Transfer ownership to a C caller as a NUL-terminated buffer.
    ///
    /// Text after an embedded NUL is dropped, which is also where a C
    /// reader would stop.
    pub fn into_raw(self) -> *mut c_char {
        let c_text = match CString::new(self.0) {
            Ok(c_text) => c_text,
            Err(err) => {
                let nul = err.nul_position();
                warn!(nul, "Generated text contains NUL; truncating");
                let mut bytes = err.into_vec();
                bytes.truncate(nul);
                // No NUL remains before `nul`.
                CString::new(bytes).unwrap_or_default()
            }
        };
        c_text.into_raw()
    }

    /// Reclaim and drop a buffer produced by [`into_raw`](Self::into_raw).
    /// Null is ignored.
    ///
    /// # Safety
    ///
    /// `ptr` must be null or a pointer returned by `into_raw` that has not
    /// been freed yet.
    pub unsafe fn free_raw(ptr: *mut c_char) {
        if !ptr.is_null() {
            drop(unsafe { CString::from_raw(ptr) });
        }
    }
}

impl fmt::Display for GeneratedText {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl AsRef<str> for GeneratedText {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl From<GeneratedText> for String {
    fn from(text: GeneratedText) -> Self {
        text.0
    }
}
