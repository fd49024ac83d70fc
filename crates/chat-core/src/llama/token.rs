//! Tokenization against a model vocabulary.

use std::ffi::CString;

use crate::engine::TokenId;
use crate::error::{ChatError, Result};

/// Tokenize `text`. Special-token markup in templates is parsed as tokens.
pub(crate) fn tokenize(
    vocab: *const llama_sys::llama_vocab,
    text: &str,
    add_bos: bool,
) -> Result<Vec<TokenId>> {
    let c_text = CString::new(text)
        .map_err(|_| ChatError::TokenizationFailed("text contains null byte".into()))?;
    let len = i32::try_from(text.len())
        .map_err(|_| ChatError::TokenizationFailed("text too long".into()))?;

    // A null buffer reports the required size as a negative count.
    let n = unsafe {
        llama_sys::llama_tokenize(
            vocab,
            c_text.as_ptr(),
            len,
            std::ptr::null_mut(),
            0,
            add_bos,
            true,
        )
    };
    let mut tokens = vec![0 as TokenId; n.unsigned_abs() as usize];

    let actual = unsafe {
        llama_sys::llama_tokenize(
            vocab,
            c_text.as_ptr(),
            len,
            tokens.as_mut_ptr(),
            tokens.len() as i32,
            add_bos,
            true,
        )
    };
    if actual < 0 {
        return Err(ChatError::TokenizationFailed(format!(
            "llama_tokenize returned {actual}"
        )));
    }

    tokens.truncate(actual as usize);
    Ok(tokens)
}

/// Bytes for one token, with special tokens rendered so stop sequences
/// such as `<|im_end|>` can be matched in the output. UTF-8 assembly is
/// left to the caller.
pub(crate) fn token_to_piece(vocab: *const llama_sys::llama_vocab, token: TokenId) -> Vec<u8> {
    let mut buf = vec![0u8; 128];
    let mut len = piece_into(vocab, token, &mut buf);
    if len < 0 {
        buf.resize(len.unsigned_abs() as usize, 0);
        len = piece_into(vocab, token, &mut buf);
    }
    if len <= 0 {
        return Vec::new();
    }
    buf.truncate(len as usize);
    buf
}

fn piece_into(vocab: *const llama_sys::llama_vocab, token: TokenId, buf: &mut [u8]) -> i32 {
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
