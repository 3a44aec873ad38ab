//! Template lexer.
//!
//! Scans the source in two modes. In text mode everything up to the next
//! `{{`, `{%` or `{#` becomes one `Text` token, whitespace untouched. Inside
//! an expression or tag whitespace is skipped and identifiers, literals and
//! operators are produced until the matching closing delimiter.
//!
//! The lexer is a lazy, finite iterator. Problems are yielded in-line as
//! `Err(Diagnostic)`:
//!
//! - an unterminated tag, expression, comment or string ends the stream with
//!   `UnexpectedEof`;
//! - an unknown character inside a tag yields `UnexpectedCharacter`, drops
//!   the rest of that tag and resumes in text mode after its closing
//!   delimiter.
//!
//! Whitespace control markers (`{{-`, `-}}`, `{%-`, `-%}`, `{#-`, `-#}`)
//! trim whitespace from the neighbouring text token.

use crate::config::Syntax;
use crate::diagnostic::{Diagnostic, DiagnosticKind};
use crate::span::Span;
use crate::token::{Keyword, LiteralKind, Operator, Token, TokenKind};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Mode {
    Text,
    Expr,
    Tag,
}

/// Lazy token stream over a template source.
#[derive(Debug, Clone)]
pub struct Lexer<'a> {
    source: &'a str,
    pos: usize,
    mode: Mode,
    /// Start of the currently open tag/expression, for EOF diagnostics
    open_at: usize,
    /// Set by a `-}}`-style close: trim leading whitespace of the next text
    trim_next: bool,
    finished: bool,
}

/// Start lexing `source`.
pub fn tokenize(source: &str) -> Lexer<'_> {
    Lexer::new(source)
}

impl<'a> Lexer<'a> {
    pub fn new(source: &'a str) -> Self {
        Self {
            source,
            pos: 0,
            mode: Mode::Text,
            open_at: 0,
            trim_next: false,
            finished: false,
        }
    }

    pub fn source(&self) -> &'a str {
        self.source
    }

    #[inline]
    fn bytes(&self) -> &'a [u8] {
        self.source.as_bytes()
    }

    #[inline]
    fn peek_byte(&self, offset: usize) -> Option<u8> {
        self.bytes().get(self.pos + offset).copied()
    }

    /// Find the next opening delimiter at or after `from`.
    /// Returns its offset and the mode it opens (`None` for comments).
    fn find_open(&self, from: usize) -> Option<(usize, Option<Mode>)> {
        let bytes = self.bytes();
        let mut at = from;
        while let Some(i) = memchr::memchr(b'{', &bytes[at..]) {
            let i = at + i;
            match bytes.get(i + 1) {
                Some(b'{') => return Some((i, Some(Mode::Expr))),
                Some(b'%') => return Some((i, Some(Mode::Tag))),
                Some(b'#') => return Some((i, None)),
                _ => at = i + 1,
            }
        }
        None
    }

    fn eof_error(&mut self, what: &str, close: &str) -> Diagnostic {
        self.finished = true;
        Diagnostic::new(
            DiagnosticKind::UnexpectedEof,
            format!("unclosed {}, expected `{}`", what, close),
            Span::new(self.open_at, self.source.len()),
        )
    }

    /// Text mode: emit literal text, skip comments, or enter a tag.
    fn lex_text(&mut self) -> Option<Result<Token<'a>, Diagnostic>> {
        loop {
            if self.pos >= self.source.len() {
                self.finished = true;
                return None;
            }

            let start = self.pos;
            let next = self.find_open(start);
            let text_end = next.map(|(i, _)| i).unwrap_or(self.source.len());

            if text_end > start {
                let trim_right = next.is_some_and(|(i, _)| self.bytes().get(i + 2) == Some(&Syntax::TRIM));
                let mut text = &self.source[start..text_end];
                let mut text_start = start;
                if std::mem::take(&mut self.trim_next) {
                    let trimmed = text.trim_start();
                    text_start += text.len() - trimmed.len();
                    text = trimmed;
                }
                if trim_right {
                    text = text.trim_end();
                }
                self.pos = text_end;
                if !text.is_empty() {
                    return Some(Ok(Token::new(
                        TokenKind::Text,
                        text,
                        Span::new(text_start, text_start + text.len()),
                    )));
                }
                continue;
            }

            // Positioned on an opening delimiter
            self.trim_next = false;
            self.open_at = start;
            let trim = self.bytes().get(start + 2) == Some(&Syntax::TRIM);
            let width = if trim { 3 } else { 2 };

            match next.and_then(|(_, mode)| mode) {
                Some(mode) => {
                    self.pos = start + width;
                    self.mode = mode;
                    let kind = if mode == Mode::Expr { TokenKind::ExprOpen } else { TokenKind::TagOpen };
                    return Some(Ok(Token::new(
                        kind,
                        &self.source[start..self.pos],
                        Span::new(start, self.pos),
                    )));
                }
                None => {
                    if let Err(diag) = self.skip_comment(start + width) {
                        return Some(Err(diag));
                    }
                }
            }
        }
    }

    /// Skip a `{# ... #}` comment whose body starts at `body`.
    fn skip_comment(&mut self, body: usize) -> Result<(), Diagnostic> {
        let close = Syntax::COMMENT_CLOSE.as_bytes();
        match memchr::memmem::find(&self.bytes()[body..], close) {
            Some(i) => {
                let close_at = body + i;
                self.trim_next = close_at > body && self.bytes()[close_at - 1] == Syntax::TRIM;
                self.pos = close_at + close.len();
                Ok(())
            }
            None => {
                self.pos = self.source.len();
                Err(self.eof_error("comment", Syntax::COMMENT_CLOSE))
            }
        }
    }

    fn close_delim(&self) -> &'static str {
        match self.mode {
            Mode::Expr => Syntax::EXPR_CLOSE,
            _ => Syntax::TAG_CLOSE,
        }
    }

    /// Length of the closing delimiter at the current position, if any.
    fn at_close(&self) -> Option<usize> {
        let rest = &self.bytes()[self.pos..];
        let close = self.close_delim().as_bytes();
        if rest.starts_with(close) {
            Some(close.len())
        } else if rest.first() == Some(&Syntax::TRIM) && rest[1..].starts_with(close) {
            Some(close.len() + 1)
        } else {
            None
        }
    }

    /// Tag/expression mode: one token per call.
    fn lex_inside(&mut self) -> Option<Result<Token<'a>, Diagnostic>> {
        while let Some(b) = self.peek_byte(0) {
            if b.is_ascii_whitespace() {
                self.pos += 1;
            } else {
                break;
            }
        }

        let start = self.pos;
        if start >= self.source.len() {
            let what = if self.mode == Mode::Expr { "expression" } else { "tag" };
            let close = self.close_delim();
            return Some(Err(self.eof_error(what, close)));
        }

        if let Some(width) = self.at_close() {
            let kind = if self.mode == Mode::Expr { TokenKind::ExprClose } else { TokenKind::TagClose };
            self.trim_next = width == 3;
            self.pos += width;
            self.mode = Mode::Text;
            return Some(Ok(Token::new(kind, &self.source[start..self.pos], Span::new(start, self.pos))));
        }

        let b = self.bytes()[start];
        let token = match b {
            b'A'..=b'Z' | b'a'..=b'z' | b'_' => self.lex_word(),
            b'0'..=b'9' => self.lex_number(),
            b'"' | b'\'' => return Some(self.lex_string(b)),
            _ => match self.lex_operator() {
                Some(op) => op,
                None => return Some(Err(self.recover_unexpected())),
            },
        };
        Some(Ok(token))
    }

    fn lex_word(&mut self) -> Token<'a> {
        let start = self.pos;
        self.pos += 1;
        while let Some(b) = self.peek_byte(0) {
            if b.is_ascii_alphanumeric() || b == b'_' || b == b'.' {
                self.pos += 1;
            } else {
                break;
            }
        }
        let word = &self.source[start..self.pos];
        let kind = match Keyword::lookup(word) {
            Some(kw) => TokenKind::Keyword(kw),
            None => TokenKind::Identifier,
        };
        Token::new(kind, word, Span::new(start, self.pos))
    }

    fn eat_digits(&mut self) -> usize {
        let start = self.pos;
        while self.peek_byte(0).is_some_and(|b| b.is_ascii_digit()) {
            self.pos += 1;
        }
        self.pos - start
    }

    fn lex_number(&mut self) -> Token<'a> {
        let start = self.pos;
        self.eat_digits();

        if self.peek_byte(0) == Some(b'.') && self.peek_byte(1).is_some_and(|b| b.is_ascii_digit()) {
            self.pos += 1;
            self.eat_digits();
        }

        if matches!(self.peek_byte(0), Some(b'e' | b'E')) {
            let sign = matches!(self.peek_byte(1), Some(b'+' | b'-')) as usize;
            if self.peek_byte(1 + sign).is_some_and(|b| b.is_ascii_digit()) {
                self.pos += 1 + sign;
                self.eat_digits();
            }
        }

        Token::new(
            TokenKind::Literal(LiteralKind::Number),
            &self.source[start..self.pos],
            Span::new(start, self.pos),
        )
    }

    fn lex_string(&mut self, quote: u8) -> Result<Token<'a>, Diagnostic> {
        let start = self.pos;
        self.pos += 1;
        while let Some(b) = self.peek_byte(0) {
            match b {
                b'\\' => self.pos += 2,
                b if b == quote => {
                    self.pos += 1;
                    return Ok(Token::new(
                        TokenKind::Literal(LiteralKind::String),
                        &self.source[start..self.pos],
                        Span::new(start, self.pos),
                    ));
                }
                _ => self.pos += 1,
            }
        }
        self.pos = self.source.len();
        self.open_at = start;
        Err(self.eof_error("string literal", if quote == b'"' { "\"" } else { "'" }))
    }

    fn lex_operator(&mut self) -> Option<Token<'a>> {
        let start = self.pos;
        let next = self.peek_byte(1);
        let (op, width) = match (self.bytes()[start], next) {
            (b'=', Some(b'=')) => (Operator::Eq, 2),
            (b'!', Some(b'=')) => (Operator::Ne, 2),
            (b'<', Some(b'=')) => (Operator::Le, 2),
            (b'>', Some(b'=')) => (Operator::Ge, 2),
            (b'<', _) => (Operator::Lt, 1),
            (b'>', _) => (Operator::Gt, 1),
            (b'+', _) => (Operator::Plus, 1),
            (b'-', _) => (Operator::Minus, 1),
            (b'*', _) => (Operator::Star, 1),
            (b'/', _) => (Operator::Slash, 1),
            (b'%', _) => (Operator::Percent, 1),
            (b'|', _) => (Operator::Pipe, 1),
            (b',', _) => (Operator::Comma, 1),
            (b'(', _) => (Operator::LParen, 1),
            (b')', _) => (Operator::RParen, 1),
            _ => return None,
        };
        self.pos += width;
        Some(Token::new(
            TokenKind::Operator(op),
            &self.source[start..self.pos],
            Span::new(start, self.pos),
        ))
    }

    /// Report the character at `pos`, then skip past the end of the tag.
    fn recover_unexpected(&mut self) -> Diagnostic {
        let start = self.pos;
        let ch = self.source[start..].chars().next().unwrap_or('\u{FFFD}');
        let span = Span::new(start, start + ch.len_utf8());

        let close = self.close_delim().as_bytes();
        match memchr::memmem::find(&self.bytes()[span.end as usize..], close) {
            Some(i) => {
                let close_at = span.end as usize + i;
                self.trim_next = close_at > 0 && self.bytes()[close_at - 1] == Syntax::TRIM;
                self.pos = close_at + close.len();
            }
            None => self.pos = self.source.len(),
        }
        self.mode = Mode::Text;
        tracing::trace!(offset = start, resume = self.pos, "skipping malformed tag");

        Diagnostic::new(
            DiagnosticKind::UnexpectedCharacter,
            format!("unexpected character {:?}", ch),
            span,
        )
    }
}

impl<'a> Iterator for Lexer<'a> {
    type Item = Result<Token<'a>, Diagnostic>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        match self.mode {
            Mode::Text => self.lex_text(),
            Mode::Expr | Mode::Tag => self.lex_inside(),
        }
    }
}

impl std::iter::FusedIterator for Lexer<'_> {}

/// Decode a quoted string lexeme (quotes included).
///
/// Supports `\\ \" \' \/ \n \r \t \0` and `\uXXXX`. On failure returns the
/// byte offset of the bad escape relative to the lexeme.
pub fn unescape(lexeme: &str) -> Result<String, (usize, String)> {
    let inner = &lexeme[1..lexeme.len().saturating_sub(1).max(1)];
    if memchr::memchr(b'\\', inner.as_bytes()).is_none() {
        return Ok(inner.to_string());
    }

    let mut out = String::with_capacity(inner.len());
    let mut chars = inner.char_indices();
    while let Some((i, c)) = chars.next() {
        if c != '\\' {
            out.push(c);
            continue;
        }
        let offset = i + 1;
        match chars.next() {
            Some((_, '\\')) => out.push('\\'),
            Some((_, '"')) => out.push('"'),
            Some((_, '\'')) => out.push('\''),
            Some((_, '/')) => out.push('/'),
            Some((_, 'n')) => out.push('\n'),
            Some((_, 'r')) => out.push('\r'),
            Some((_, 't')) => out.push('\t'),
            Some((_, '0')) => out.push('\0'),
            Some((_, 'u')) => {
                let hex: String = chars.by_ref().take(4).map(|(_, c)| c).collect();
                let decoded = (hex.len() == 4)
                    .then(|| u32::from_str_radix(&hex, 16).ok())
                    .flatten()
                    .and_then(char::from_u32);
                match decoded {
                    Some(ch) => out.push(ch),
                    None => return Err((offset, format!("invalid unicode escape `\\u{}`", hex))),
                }
            }
            Some((_, other)) => return Err((offset, format!("invalid escape `\\{}`", other))),
            None => return Err((offset, "dangling `\\`".to_string())),
        }
    }
    Ok(out)
}
