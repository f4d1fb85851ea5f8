//! Backslash escapes for string literals.
//!
//! [`unescape`] decodes literal text as written in source. [`escape`] is its
//! inverse over ASCII output and is what the bytecode wire format stores, so
//! control characters and non-ASCII text survive a round trip.

use thiserror::Error;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EscapeError {
    #[error("truncated \\{kind} escape at byte {at}")]
    Truncated { kind: char, at: usize },

    #[error("invalid code point U+{0:X}")]
    InvalidCodePoint(u32),
}

/// Escape `text` so the result is printable ASCII.
pub fn escape(text: &str) -> String {
    let mut out = String::with_capacity(text.len());
    for c in text.chars() {
        match c {
            '\\' => out.push_str("\\\\"),
            '\t' => out.push_str("\\t"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            ' '..='~' => out.push(c),
            c if (c as u32) < 0x100 => out.push_str(&format!("\\x{:02x}", c as u32)),
            c if (c as u32) < 0x10000 => out.push_str(&format!("\\u{:04x}", c as u32)),
            c => out.push_str(&format!("\\U{:08x}", c as u32)),
        }
    }
    out
}

/// Decode backslash escapes. Unknown escapes are kept verbatim.
pub fn unescape(text: &str) -> Result<String, EscapeError> {
    let mut out = String::with_capacity(text.len());
    let mut chars = text.char_indices().peekable();
    while let Some((at, c)) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        let Some((_, kind)) = chars.next() else {
            out.push('\\');
            break;
        };
        match kind {
            '\\' => out.push('\\'),
            '\'' => out.push('\''),
            '"' => out.push('"'),
            'a' => out.push('\x07'),
            'b' => out.push('\x08'),
            'f' => out.push('\x0c'),
            'n' => out.push('\n'),
            'r' => out.push('\r'),
            't' => out.push('\t'),
            'v' => out.push('\x0b'),
            '\n' => {}
            '0'..='7' => {
                let mut code = kind.to_digit(8).unwrap_or(0);
                for _ in 0..2 {
                    match chars.peek().and_then(|(_, d)| d.to_digit(8)) {
                        Some(d) => {
                            code = code * 8 + d;
                            chars.next();
                        }
                        None => break,
                    }
                }
                out.push(char::from_u32(code).ok_or(EscapeError::InvalidCodePoint(code))?);
            }
            'x' | 'u' | 'U' => {
                let width = match kind {
                    'x' => 2,
                    'u' => 4,
                    _ => 8,
                };
                let mut code = 0u32;
                for _ in 0..width {
                    let digit = chars
                        .next()
                        .and_then(|(_, d)| d.to_digit(16))
                        .ok_or(EscapeError::Truncated { kind, at })?;
                    code = code * 16 + digit;
                }
                out.push(char::from_u32(code).ok_or(EscapeError::InvalidCodePoint(code))?);
            }
            other => {
                out.push('\\');
                out.push(other);
            }
        }
    }
    Ok(out)
}

/// Text of a quoted string token: quotes stripped, escapes decoded.
pub fn string_token(token: &str) -> Result<String, EscapeError> {
    let inner = token
        .strip_prefix('"')
        .and_then(|t| t.strip_suffix('"'))
        .or_else(|| token.strip_prefix('\'').and_then(|t| t.strip_suffix('\'')))
        .unwrap_or(token);
    unescape(inner)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_control_characters_survive() {
        let text = "tab\there\nnew \\ slash \u{1}";
        assert_eq!(escape(text), "tab\\there\\nnew \\\\ slash \\x01");
        assert_eq!(unescape(&escape(text)).unwrap(), text);
    }

    #[test]
    fn test_non_ascii_is_escaped() {
        let text = "café ☕ 🦀";
        let escaped = escape(text);
        assert!(escaped.is_ascii());
        assert_eq!(unescape(&escaped).unwrap(), text);
    }

    #[test]
    fn test_unknown_escape_kept() {
        assert_eq!(unescape(r"a\qb").unwrap(), r"a\qb");
        assert_eq!(unescape(r"\101").unwrap(), "A");
    }

    #[test]
    fn test_truncated_hex_escape() {
        assert!(matches!(
            unescape(r"\x4"),
            Err(EscapeError::Truncated { kind: 'x', .. })
        ));
    }

    #[test]
    fn test_string_token_strips_quotes() {
        assert_eq!(string_token(r#""hi\n""#).unwrap(), "hi\n");
        assert_eq!(string_token("'x'").unwrap(), "x");
    }
}
