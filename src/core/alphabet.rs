/// The 64 symbols used by marshaled credential tokens, indexed by 6-bit value.
///
/// Upper case letters, lower case letters, digits, then `#` and `-`. Unlike the
/// RFC 4648 alphabets, none of these symbols needs escaping in a file name or a
/// URL path segment.
pub const ALPHABET: &[u8; 64] =
    b"ABCDEFGHIJKLMNOPQRSTUVWXYZabcdefghijklmnopqrstuvwxyz0123456789#-";

/// Sentinel stored in [`REVERSE`] for bytes outside the alphabet.
const INVALID: u8 = 0xff;

/// Reverse lookup table from ASCII byte to 6-bit value.
const REVERSE: [u8; 128] = build_reverse();

const fn build_reverse() -> [u8; 128] {
    let mut table = [INVALID; 128];
    let mut i = 0;
    while i < ALPHABET.len() {
        table[ALPHABET[i] as usize] = i as u8;
        i += 1;
    }
    table
}

/// Returns the symbol for a 6-bit value.
///
/// Only the low six bits of `value` are used.
pub fn symbol(value: u8) -> char {
    ALPHABET[(value & 0x3f) as usize] as char
}

/// Returns the 6-bit value of a symbol, or `None` if it is not part of the
/// alphabet.
pub fn value_of(symbol: char) -> Option<u8> {
    let index = symbol as u32;
    if index >= REVERSE.len() as u32 {
        return None;
    }
    match REVERSE[index as usize] {
        INVALID => None,
        value => Some(value),
    }
}
