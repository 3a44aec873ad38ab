//! Output escaping.
//!
//! Escaping is applied only where an expression result is written. Literal
//! template text is author-controlled markup and always passes through.

use std::borrow::Cow;
use std::convert::Infallible;
use std::fmt;

/// How expression output is escaped.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum EscapeMode {
    /// HTML entity escaping of `& < > " '`
    #[default]
    Html,
    /// No escaping at all
    None,
}

/// Escape `value` for `mode`. Borrows when nothing needs replacing.
pub fn escape(value: &str, mode: EscapeMode) -> Cow<'_, str> {
    match mode {
        EscapeMode::None => Cow::Borrowed(value),
        EscapeMode::Html => match first_special(value.as_bytes()) {
            None => Cow::Borrowed(value),
            Some(_) => {
                let mut out = String::with_capacity(value.len() + value.len() / 8 + 8);
                let result = write_html::<Infallible>(value, |chunk| {
                    out.push_str(chunk);
                    Ok(())
                });
                match result {
                    Ok(()) => Cow::Owned(out),
                    Err(never) => match never {},
                }
            }
        },
    }
}

/// Escape `value` for `mode` straight into a sink.
pub fn escape_into<W: fmt::Write + ?Sized>(out: &mut W, value: &str, mode: EscapeMode) -> fmt::Result {
    match mode {
        EscapeMode::None => out.write_str(value),
        EscapeMode::Html => write_html(value, |chunk| out.write_str(chunk)),
    }
}

#[inline]
fn entity(b: u8) -> Option<&'static str> {
    match b {
        b'&' => Some("&amp;"),
        b'<' => Some("&lt;"),
        b'>' => Some("&gt;"),
        b'"' => Some("&quot;"),
        b'\'' => Some("&#x27;"),
        _ => None,
    }
}

/// Position of the first byte that needs escaping.
#[inline]
fn first_special(bytes: &[u8]) -> Option<usize> {
    let a = memchr::memchr3(b'&', b'<', b'>', bytes);
    let b = memchr::memchr2(b'"', b'\'', bytes);
    match (a, b) {
        (Some(a), Some(b)) => Some(a.min(b)),
        (a, b) => a.or(b),
    }
}

fn write_html<E>(value: &str, mut emit: impl FnMut(&str) -> Result<(), E>) -> Result<(), E> {
    let bytes = value.as_bytes();
    let mut last = 0;
    let mut pos = match first_special(bytes) {
        Some(pos) => pos,
        None => return emit(value),
    };

    // Special bytes are ASCII, so every cut lands on a char boundary
    while pos < bytes.len() {
        if let Some(rep) = entity(bytes[pos]) {
            if last < pos {
                emit(&value[last..pos])?;
            }
            emit(rep)?;
            last = pos + 1;
        }
        pos += 1;
    }

    if last < bytes.len() {
        emit(&value[last..])?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_escape_html() {
        assert_eq!(escape("<b>", EscapeMode::Html), "&lt;b&gt;");
        assert_eq!(
            escape(r#"Tom & "Jerry's""#, EscapeMode::Html),
            "Tom &amp; &quot;Jerry&#x27;s&quot;"
        );
    }

    #[test]
    fn test_escape_borrows_clean_input() {
        assert!(matches!(escape("plain text", EscapeMode::Html), Cow::Borrowed(_)));
        assert!(matches!(escape("<b>", EscapeMode::None), Cow::Borrowed("<b>")));
    }

    #[test]
    fn test_escape_multibyte() {
        assert_eq!(escape("héllo <wörld>", EscapeMode::Html), "héllo &lt;wörld&gt;");
    }

    #[test]
    fn test_escape_into() {
        let mut out = String::from("x=");
        escape_into(&mut out, "a<b", EscapeMode::Html).unwrap();
        escape_into(&mut out, "<raw>", EscapeMode::None).unwrap();
        assert_eq!(out, "x=a&lt;b<raw>");
    }

    #[test]
    fn test_escape_edges() {
        assert_eq!(escape("", EscapeMode::Html), "");
        assert_eq!(escape("&", EscapeMode::Html), "&amp;");
        assert_eq!(escape("a'", EscapeMode::Html), "a&#x27;");
        assert_eq!(escape("&&", EscapeMode::Html), "&amp;&amp;");
    }
}
