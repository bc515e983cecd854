//! Tokenization / detokenization helpers.

use std::ffi::CString;

use crate::error::{LlamaError, Result};

/// Tokenize `text` using the model's vocabulary.
pub fn tokenize(
    vocab: *const llama_sys::llama_vocab,
    text: &str,
    add_special: bool,
    parse_special: bool,
) -> Result<Vec<i32>> {
    let c_text = CString::new(text)
        .map_err(|_| LlamaError::TokenizationFailed("text contains null byte".into()))?;
    let text_len = i32::try_from(text.len())
        .map_err(|_| LlamaError::TokenizationFailed("text too long".into()))?;

    // First call: query required buffer size (returns negative count).
    let n = unsafe {
        llama_sys::llama_tokenize(
            vocab,
            c_text.as_ptr(),
            text_len,
            std::ptr::null_mut(),
            0,
            add_special,
            parse_special,
        )
    };
    if n == 0 {
        return Ok(Vec::new());
    }
    if n == i32::MIN {
        return Err(LlamaError::TokenizationFailed("token count overflow".into()));
    }

    let mut tokens = vec![0i32; n.unsigned_abs() as usize];
    let actual = unsafe {
        llama_sys::llama_tokenize(
            vocab,
            c_text.as_ptr(),
            text_len,
            tokens.as_mut_ptr(),
            tokens.len() as i32,
            add_special,
            parse_special,
        )
    };

    if actual < 0 {
        return Err(LlamaError::TokenizationFailed(format!(
            "llama_tokenize returned {actual}"
        )));
    }

    tokens.truncate(actual as usize);
    Ok(tokens)
}

/// Raw bytes of a single token's text piece. Special tokens are rendered.
///
/// Pieces are returned as bytes: a multi-byte character may be split
/// across consecutive tokens.
pub fn token_to_bytes(vocab: *const llama_sys::llama_vocab, token: i32) -> Vec<u8> {
    let mut buf = vec![0u8; 128];
    let len = piece_into(vocab, token, &mut buf);

    if len < 0 {
        // Buffer too small: -len is the required size.
        buf.resize(len.unsigned_abs() as usize, 0);
        let len = piece_into(vocab, token, &mut buf);
        if len <= 0 {
            return Vec::new();
        }
        buf.truncate(len as usize);
    } else {
        buf.truncate(len as usize);
    }
    buf
}

fn piece_into(vocab: *const llama_sys::llama_vocab, token: i32, buf: &mut [u8]) -> i32 {
    unsafe {
        llama_sys::llama_token_to_piece(
            vocab,
            token,
            buf.as_mut_ptr() as *mut std::ffi::c_char,
            buf.len() as i32,
            0,    // lstrip
            true, // special
        )
    }
}
