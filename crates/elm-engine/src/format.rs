//! Reply text helpers

use std::fmt::Write;

/// Uppercase hex byte pairs, optionally space separated
pub fn hex_bytes(bytes: &[u8], spaced: bool) -> String {
    let mut out = String::with_capacity(bytes.len() * 3);
    for (i, b) in bytes.iter().enumerate() {
        if spaced && i > 0 {
            out.push(' ');
        }
        let _ = write!(out, "{:02X}", b);
    }
    out
}

/// Prompt appended to every ASCII reply
pub fn prompt(linefeeds: bool) -> &'static str {
    if linefeeds {
        "\r>"
    } else {
        ">"
    }
}

/// Two hex digits starting at `at`
pub fn hex_byte_at(text: &str, at: usize) -> Option<u8> {
    let digits = text.get(at..at + 2)?;
    if !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
        return None;
    }
    u8::from_str_radix(digits, 16).ok()
}

/// XOR of all bytes
pub fn xor_checksum(bytes: &[u8]) -> u8 {
    bytes.iter().fold(0, |acc, b| acc ^ b)
}

/// Whether the last byte of `frame` is the XOR of the bytes before it
pub fn verify_xor_frame(frame: &[u8]) -> bool {
    match frame.split_last() {
        Some((check, body)) if !body.is_empty() => xor_checksum(body) == *check,
        _ => false,
    }
}
