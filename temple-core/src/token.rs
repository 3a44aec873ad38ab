//! Lexer tokens.
//!
//! Tokens borrow their lexeme from the template source; they only live for
//! the duration of a lex/parse pass.

use crate::span::Span;

/// A lexed token.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Token<'a> {
    pub kind: TokenKind,
    /// Source text of the token. For `Text` this is the (possibly trimmed)
    /// literal span; for string literals it includes the quotes.
    pub lexeme: &'a str,
    pub span: Span,
}

impl<'a> Token<'a> {
    pub fn new(kind: TokenKind, lexeme: &'a str, span: Span) -> Self {
        Self { kind, lexeme, span }
    }

    /// Human-readable description for error messages.
    pub fn describe(&self) -> String {
        match self.kind {
            TokenKind::Text => "text".to_string(),
            TokenKind::ExprOpen => "`{{`".to_string(),
            TokenKind::ExprClose => "`}}`".to_string(),
            TokenKind::TagOpen => "`{%`".to_string(),
            TokenKind::TagClose => "`%}`".to_string(),
            TokenKind::Identifier => format!("identifier `{}`", self.lexeme),
            TokenKind::Keyword(kw) => format!("keyword `{}`", kw.as_str()),
            TokenKind::Operator(op) => format!("`{}`", op.as_str()),
            TokenKind::Literal(LiteralKind::String) => format!("string {}", self.lexeme),
            TokenKind::Literal(LiteralKind::Number) => format!("number `{}`", self.lexeme),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TokenKind {
    /// Raw template text between tags
    Text,
    /// `{{` (or `{{-`)
    ExprOpen,
    /// `}}` (or `-}}`)
    ExprClose,
    /// `{%` (or `{%-`)
    TagOpen,
    /// `%}` (or `-%}`)
    TagClose,
    /// `name` or dotted `user.address.city`
    Identifier,
    Keyword(Keyword),
    Operator(Operator),
    Literal(LiteralKind),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LiteralKind {
    /// Quoted string; lexeme still contains quotes and escapes
    String,
    /// Decimal integer or float
    Number,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Keyword {
    If,
    Elif,
    Else,
    Endif,
    For,
    In,
    Endfor,
    Include,
    And,
    Or,
    Not,
    True,
    False,
    Null,
}

/// Keyword lookup. `none` is accepted as an alias for `null`.
static KEYWORDS: phf::Map<&'static str, Keyword> = phf::phf_map! {
    "if" => Keyword::If,
    "elif" => Keyword::Elif,
    "else" => Keyword::Else,
    "endif" => Keyword::Endif,
    "for" => Keyword::For,
    "in" => Keyword::In,
    "endfor" => Keyword::Endfor,
    "include" => Keyword::Include,
    "and" => Keyword::And,
    "or" => Keyword::Or,
    "not" => Keyword::Not,
    "true" => Keyword::True,
    "false" => Keyword::False,
    "null" => Keyword::Null,
    "none" => Keyword::Null,
};

impl Keyword {
    #[inline]
    pub fn lookup(word: &str) -> Option<Keyword> {
        KEYWORDS.get(word).copied()
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Keyword::If => "if",
            Keyword::Elif => "elif",
            Keyword::Else => "else",
            Keyword::Endif => "endif",
            Keyword::For => "for",
            Keyword::In => "in",
            Keyword::Endfor => "endfor",
            Keyword::Include => "include",
            Keyword::And => "and",
            Keyword::Or => "or",
            Keyword::Not => "not",
            Keyword::True => "true",
            Keyword::False => "false",
            Keyword::Null => "null",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Operator {
    Plus,
    Minus,
    Star,
    Slash,
    Percent,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Pipe,
    Comma,
    LParen,
    RParen,
}

impl Operator {
    pub fn as_str(self) -> &'static str {
        match self {
            Operator::Plus => "+",
            Operator::Minus => "-",
            Operator::Star => "*",
            Operator::Slash => "/",
            Operator::Percent => "%",
            Operator::Eq => "==",
            Operator::Ne => "!=",
            Operator::Lt => "<",
            Operator::Le => "<=",
            Operator::Gt => ">",
            Operator::Ge => ">=",
            Operator::Pipe => "|",
            Operator::Comma => ",",
            Operator::LParen => "(",
            Operator::RParen => ")",
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_keyword_lookup() {
        assert_eq!(Keyword::lookup("endfor"), Some(Keyword::Endfor));
        assert_eq!(Keyword::lookup("none"), Some(Keyword::Null));
        assert_eq!(Keyword::lookup("If"), None);
        assert_eq!(Keyword::lookup("item"), None);
    }

    #[test]
    fn test_keyword_round_trip() {
        for kw in [Keyword::If, Keyword::Elif, Keyword::Endfor, Keyword::Not, Keyword::Null] {
            assert_eq!(Keyword::lookup(kw.as_str()), Some(kw));
        }
    }

    #[test]
    fn test_describe() {
        let tok = Token::new(TokenKind::Identifier, "user.name", Span::new(3, 12));
        assert_eq!(tok.describe(), "identifier `user.name`");
        let tok = Token::new(TokenKind::Operator(Operator::Le), "<=", Span::new(0, 2));
        assert_eq!(tok.describe(), "`<=`");
    }
}
