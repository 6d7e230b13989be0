//! Canonical hex encoding for deterministic serialization.
//!
//! Every field is written as lowercase hex with a width fixed by its declared
//! bound, so the same logical content always produces identical bytes (and
//! thus identical hashes) on every platform:
//!
//! - Numbers: fixed width, `ceil(log16(max + 1))` hex digits.
//! - Strings: a number (width derived from the string's bound) holding the
//!   hex-digit length of the UTF-8 bytes, followed by those digits.
//! - String arrays: a 4-digit total length of the concatenated
//!   length-prefixed elements, at most 255 elements.
//!
//! All widths in this crate are even, so an encoding is always a whole
//! number of bytes.

use crate::error::{CodecError, Result};

/// Bound on the total hex length of an encoded string array.
pub const MAX_ARRAY_HEX_LEN: u64 = 0xFFFF;

/// Maximum number of elements in a string array.
pub const MAX_ARRAY_ITEMS: usize = 255;

/// Number of hex digits needed to write any value up to `max`.
pub const fn hex_width(max: u64) -> usize {
    let mut width = 1;
    let mut rest = max >> 4;
    while rest > 0 {
        width += 1;
        rest >>= 4;
    }
    width
}

/// Appends fields to a hex buffer.
#[derive(Debug, Default)]
pub struct Encoder {
    buf: String,
}

impl Encoder {
    pub fn new() -> Self {
        Self::default()
    }

    /// Write a fixed-width number.
    pub fn number(&mut self, field: &str, value: u64, max: u64) -> Result<()> {
        if value > max {
            return Err(CodecError::Encoding(format!(
                "{field}: value {value} exceeds maximum {max}"
            )));
        }
        let width = hex_width(max);
        self.buf.push_str(&format!("{value:0width$x}"));
        Ok(())
    }

    /// Write a length-prefixed UTF-8 string.
    pub fn string(&mut self, field: &str, value: &str, max_len: u64) -> Result<()> {
        self.bytes(field, value.as_bytes(), max_len)
    }

    /// Write length-prefixed raw bytes.
    pub fn bytes(&mut self, field: &str, value: &[u8], max_len: u64) -> Result<()> {
        let digits = hex::encode(value);
        let len = digits.len() as u64;
        if len > max_len {
            return Err(CodecError::Encoding(format!(
                "{field}: {len} hex digits exceeds maximum {max_len}"
            )));
        }
        self.number(field, len, max_len)?;
        self.buf.push_str(&digits);
        Ok(())
    }

    /// Write an optional string; `None` encodes as the empty string.
    pub fn optional(&mut self, field: &str, value: Option<&str>, max_len: u64) -> Result<()> {
        self.string(field, value.unwrap_or(""), max_len)
    }

    /// Write a total-length-prefixed array of length-prefixed strings.
    pub fn string_array(&mut self, field: &str, items: &[String], element_max: u64) -> Result<()> {
        if items.len() > MAX_ARRAY_ITEMS {
            return Err(CodecError::Encoding(format!(
                "{field}: {} elements exceeds maximum {MAX_ARRAY_ITEMS}",
                items.len()
            )));
        }
        let mut inner = Encoder::new();
        for item in items {
            inner.string(field, item, element_max)?;
        }
        let body = inner.finish();
        self.number(field, body.len() as u64, MAX_ARRAY_HEX_LEN)?;
        self.buf.push_str(&body);
        Ok(())
    }

    /// Append pre-encoded hex verbatim.
    pub fn raw(&mut self, hex: &str) {
        self.buf.push_str(hex);
    }

    pub fn finish(self) -> String {
        self.buf
    }
}

/// Consumes fields from a hex string in the order they were written.
#[derive(Debug, Clone)]
pub struct Decoder<'a> {
    input: &'a str,
    pos: usize,
}

impl<'a> Decoder<'a> {
    pub fn new(input: &'a str) -> Self {
        Self { input, pos: 0 }
    }

    fn take(&mut self, field: &str, n: usize) -> Result<&'a str> {
        let end = self.pos.checked_add(n).ok_or_else(|| {
            CodecError::Decoding(format!("{field}: length overflow"))
        })?;
        let digits = self.input.get(self.pos..end).ok_or_else(|| {
            CodecError::Decoding(format!(
                "{field}: truncated input, need {n} hex digits, {} left",
                self.input.len().saturating_sub(self.pos)
            ))
        })?;
        self.pos = end;
        Ok(digits)
    }

    /// Read a fixed-width number.
    pub fn number(&mut self, field: &str, max: u64) -> Result<u64> {
        let digits = self.take(field, hex_width(max))?;
        if !digits.bytes().all(|b| b.is_ascii_hexdigit()) {
            return Err(CodecError::Decoding(format!("{field}: invalid hex {digits:?}")));
        }
        let value = u64::from_str_radix(digits, 16)
            .map_err(|e| CodecError::Decoding(format!("{field}: {e}")))?;
        if value > max {
            return Err(CodecError::Decoding(format!(
                "{field}: value {value} exceeds maximum {max}"
            )));
        }
        Ok(value)
    }

    /// Read a length-prefixed UTF-8 string.
    pub fn string(&mut self, field: &str, max_len: u64) -> Result<String> {
        let bytes = self.bytes(field, max_len)?;
        String::from_utf8(bytes).map_err(|e| CodecError::Decoding(format!("{field}: {e}")))
    }

    /// Read length-prefixed raw bytes.
    pub fn bytes(&mut self, field: &str, max_len: u64) -> Result<Vec<u8>> {
        let len = self.number(field, max_len)? as usize;
        if len % 2 != 0 {
            return Err(CodecError::Decoding(format!("{field}: odd hex length {len}")));
        }
        let digits = self.take(field, len)?;
        hex::decode(digits).map_err(|e| CodecError::Decoding(format!("{field}: {e}")))
    }

    /// Read an optional string; the empty string decodes as `None`.
    pub fn optional(&mut self, field: &str, max_len: u64) -> Result<Option<String>> {
        let value = self.string(field, max_len)?;
        Ok(if value.is_empty() { None } else { Some(value) })
    }

    /// Read a total-length-prefixed array of length-prefixed strings.
    pub fn string_array(&mut self, field: &str, element_max: u64) -> Result<Vec<String>> {
        let total = self.number(field, MAX_ARRAY_HEX_LEN)? as usize;
        let body = self.take(field, total)?;
        let mut inner = Decoder::new(body);
        let mut items = Vec::new();
        while !inner.is_empty() {
            if items.len() == MAX_ARRAY_ITEMS {
                return Err(CodecError::Decoding(format!(
                    "{field}: more than {MAX_ARRAY_ITEMS} elements"
                )));
            }
            items.push(inner.string(field, element_max)?);
        }
        Ok(items)
    }

    pub fn is_empty(&self) -> bool {
        self.pos >= self.input.len()
    }

    /// Hex digits not yet consumed.
    pub fn remaining(&self) -> &'a str {
        self.input.get(self.pos..).unwrap_or("")
    }

    /// Fail if any input is left over.
    pub fn finish(self) -> Result<()> {
        let rest = self.remaining();
        if rest.is_empty() {
            Ok(())
        } else {
            Err(CodecError::Decoding(format!(
                "{} trailing hex digits",
                rest.len()
            )))
        }
    }
}
