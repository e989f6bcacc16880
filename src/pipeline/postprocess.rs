//! Text normalisation for recognised page text.
//!
//! OpenAI-compatible servers occasionally emit lone UTF-16 surrogates as
//! `\uD8xx` escapes (a model splitting an emoji or CJK supplementary
//! character across tokens). A lone surrogate is not a valid Unicode scalar
//! value, so `serde_json` refuses the whole body. [`strip_surrogate_escapes`]
//! removes those escapes from the raw JSON text before decoding; once text is
//! a Rust `str` it can no longer contain surrogates, and [`normalize_text`]
//! only has to trim.

use std::borrow::Cow;

/// Normalise recognised text: absent → `""`, surrounding whitespace trimmed.
pub fn normalize_text(text: Option<&str>) -> String {
    match text {
        Some(t) => t.trim().to_string(),
        None => String::new(),
    }
}

/// Remove `\uXXXX` escapes that encode a lone UTF-16 surrogate from a raw
/// JSON document. Valid high+low pairs and escaped backslashes are kept.
pub fn strip_surrogate_escapes(raw: &str) -> Cow<'_, str> {
    if !raw.contains("\\u") {
        return Cow::Borrowed(raw);
    }

    let bytes = raw.as_bytes();
    let mut out = String::with_capacity(raw.len());
    let mut copied_to = 0;
    let mut i = 0;
    let mut changed = false;

    while i < bytes.len() {
        if bytes[i] != b'\\' {
            i += 1;
            continue;
        }
        // Any escape is two bytes at least; `\\` must be skipped as a unit so
        // the second backslash is not read as an escape introducer.
        if bytes.get(i + 1) != Some(&b'u') {
            i += 2;
            continue;
        }
        let Some(unit) = hex_unit(bytes, i + 2) else {
            i += 2;
            continue;
        };
        match unit {
            0xD800..=0xDBFF => {
                let paired = bytes.get(i + 6) == Some(&b'\\')
                    && bytes.get(i + 7) == Some(&b'u')
                    && matches!(hex_unit(bytes, i + 8), Some(0xDC00..=0xDFFF));
                if paired {
                    i += 12;
                } else {
                    out.push_str(&raw[copied_to..i]);
                    i += 6;
                    copied_to = i;
                    changed = true;
                }
            }
            0xDC00..=0xDFFF => {
                out.push_str(&raw[copied_to..i]);
                i += 6;
                copied_to = i;
                changed = true;
            }
            _ => i += 6,
        }
    }

    if !changed {
        return Cow::Borrowed(raw);
    }
    out.push_str(&raw[copied_to..]);
    Cow::Owned(out)
}

/// Parse four hex digits starting at `at`.
fn hex_unit(bytes: &[u8], at: usize) -> Option<u16> {
    let digits = bytes.get(at..at + 4)?;
    let s = std::str::from_utf8(digits).ok()?;
    u16::from_str_radix(s, 16).ok()
}
