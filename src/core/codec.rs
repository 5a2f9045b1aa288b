//! Bit packing between bytes and alphabet symbols.
//!
//! Bytes are read least significant bit first: bit 0 of byte 0 is the first bit
//! of the stream and bit 7 of byte 0 the eighth. The stream is cut into 6-bit
//! groups, the last one zero-filled on its high end, and each group becomes one
//! symbol of [`ALPHABET`](super::alphabet::ALPHABET).

use serde::{Deserialize, Serialize};

use super::alphabet;

/// How [`decode`] treats bits that cannot form a whole output byte.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PaddingPolicy {
    /// Trailing bits must be zero, and the symbol count must be one that
    /// [`encode`] can produce.
    #[default]
    Strict,
    /// Trailing bits and dangling symbols are discarded.
    Lenient,
}

/// Codec core decoding error.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum DecodeError {
    #[error("invalid character {character:?} at position {position}")]
    InvalidCharacter { position: usize, character: char },

    #[error("{0} symbols cannot be produced by the encoder")]
    InvalidLength(usize),

    #[error("non-zero padding bits after the last byte")]
    NonZeroPadding,
}

/// Number of symbols [`encode`] produces for `byte_len` bytes.
pub fn encoded_len(byte_len: usize) -> usize {
    (byte_len * 8).div_ceil(6)
}

/// Number of whole bytes carried by `symbol_len` symbols.
pub fn decoded_len(symbol_len: usize) -> usize {
    symbol_len * 6 / 8
}

/// Encodes `bytes` into a freshly allocated string of alphabet symbols.
pub fn encode(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(encoded_len(bytes.len()));
    encode_into(bytes, &mut out);
    out
}

/// Encodes `bytes`, appending the symbols to `out`.
pub fn encode_into(bytes: &[u8], out: &mut String) {
    let mut acc: u32 = 0;
    let mut bits = 0;

    for &byte in bytes {
        acc |= (byte as u32) << bits;
        bits += 8;
        while bits >= 6 {
            out.push(alphabet::symbol(acc as u8));
            acc >>= 6;
            bits -= 6;
        }
    }

    if bits > 0 {
        out.push(alphabet::symbol(acc as u8));
    }
}

/// Decodes a string of alphabet symbols back into bytes.
///
/// `position` in [`DecodeError::InvalidCharacter`] counts characters from the
/// start of `input`.
pub fn decode(input: &str, policy: PaddingPolicy) -> Result<Vec<u8>, DecodeError> {
    let symbol_len = input.chars().count();
    let mut out = Vec::with_capacity(decoded_len(symbol_len));
    let mut acc: u32 = 0;
    let mut bits = 0;

    for (position, character) in input.chars().enumerate() {
        let value = alphabet::value_of(character).ok_or(DecodeError::InvalidCharacter {
            position,
            character,
        })?;
        acc |= (value as u32) << bits;
        bits += 6;
        if bits >= 8 {
            out.push(acc as u8);
            acc >>= 8;
            bits -= 8;
        }
    }

    if policy == PaddingPolicy::Strict {
        if encoded_len(out.len()) != symbol_len {
            return Err(DecodeError::InvalidLength(symbol_len));
        }
        if acc != 0 {
            return Err(DecodeError::NonZeroPadding);
        }
    }

    Ok(out)
}
