//! Template parser.
//!
//! Recursive descent over the token stream for statements, precedence
//! climbing for expressions. The parser fails fast: the first lexer
//! diagnostic or structural error aborts the parse and no partial tree is
//! returned.
//!
//! ```text
//! block      := (Text | "{{" expr "}}" | if | for | include)*
//! if         := "{%" "if" expr "%}" block
//!               ("{%" "elif" expr "%}" block)*
//!               ("{%" "else" "%}" block)? "{%" "endif" "%}"
//! for        := "{%" "for" ident "in" expr "%}" block
//!               ("{%" "else" "%}" block)? "{%" "endfor" "%}"
//! include    := "{%" "include" string "%}"
//! expr       := unary (binop unary)*          precedence climbing
//! unary      := ("not" | "-") unary | postfix
//! postfix    := primary ("|" ident ("(" expr ("," expr)* ")")?)*
//! primary    := path | string | number | true | false | null | "(" expr ")"
//! ```

use crate::ast::{BinaryOp, Block, Expr, Node, Path, Segment, UnaryOp};
use crate::diagnostic::{Diagnostic, DiagnosticKind};
use crate::filters::Filter;
use crate::lexer::{tokenize, unescape};
use crate::span::Span;
use crate::token::{Keyword, LiteralKind, Operator, Token, TokenKind};
use crate::value::{Number, Value};

/// Deepest nesting of blocks, parentheses, unary operators, operator and
/// filter chains in one template. Rendering and evaluation recurse along the
/// same tree, so this also bounds their stack use.
pub const MAX_NESTING: usize = 128;

/// Parse a whole template source.
pub fn parse(source: &str) -> Result<Node, Diagnostic> {
    Parser::new(tokenize(source)).parse()
}

/// The block a statement list is nested in. Decides which closing tags may
/// end it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Context {
    Root,
    If,
    IfElse,
    For,
    ForElse,
}

impl Context {
    fn accepts(self, kw: Keyword) -> bool {
        match self {
            Context::Root => false,
            Context::If => matches!(kw, Keyword::Elif | Keyword::Else | Keyword::Endif),
            Context::IfElse => kw == Keyword::Endif,
            Context::For => matches!(kw, Keyword::Else | Keyword::Endfor),
            Context::ForElse => kw == Keyword::Endfor,
        }
    }

    fn closing(self) -> &'static str {
        match self {
            Context::If | Context::IfElse => "endif",
            Context::For | Context::ForElse => "endfor",
            Context::Root => "",
        }
    }

    fn opening(self) -> &'static str {
        match self {
            Context::If | Context::IfElse => "if",
            Context::For | Context::ForElse => "for",
            Context::Root => "",
        }
    }
}

/// How a nested block ended.
enum End {
    Eof,
    Elif(Expr),
    Else,
    EndIf,
    EndFor,
}

pub struct Parser<'a, I> {
    tokens: I,
    peeked: Option<Option<Token<'a>>>,
    /// End offset of the last consumed token
    last_end: usize,
    /// Current nesting, checked against `MAX_NESTING`
    depth: usize,
}

impl<'a, I> Parser<'a, I>
where
    I: Iterator<Item = Result<Token<'a>, Diagnostic>>,
{
    pub fn new(tokens: I) -> Self {
        Self {
            tokens,
            peeked: None,
            last_end: 0,
            depth: 0,
        }
    }

    /// Parse the full token stream into a root `Block` node.
    pub fn parse(mut self) -> Result<Node, Diagnostic> {
        let (block, _) = self.parse_block(Context::Root, Span::default())?;
        tracing::trace!(nodes = block.nodes.len(), "parsed template");
        Ok(Node::Block(block))
    }

    // ---- token plumbing ----

    fn peek(&mut self) -> Result<Option<Token<'a>>, Diagnostic> {
        if self.peeked.is_none() {
            let next = self.tokens.next().transpose()?;
            self.peeked = Some(next);
        }
        Ok(self.peeked.flatten())
    }

    fn advance(&mut self) -> Result<Option<Token<'a>>, Diagnostic> {
        let token = match self.peeked.take() {
            Some(token) => token,
            None => self.tokens.next().transpose()?,
        };
        if let Some(tok) = &token {
            self.last_end = tok.span.end as usize;
        }
        Ok(token)
    }

    fn peek_kind(&mut self) -> Result<Option<TokenKind>, Diagnostic> {
        Ok(self.peek()?.map(|t| t.kind))
    }

    fn eof(&self, expected: &str) -> Diagnostic {
        Diagnostic::new(
            DiagnosticKind::UnexpectedEof,
            format!("unexpected end of input, expected {}", expected),
            Span::point(self.last_end),
        )
    }

    fn unexpected(token: &Token<'_>, expected: &str) -> Diagnostic {
        Diagnostic::new(
            DiagnosticKind::SyntaxError,
            format!("expected {}, found {}", expected, token.describe()),
            token.span,
        )
    }

    /// Consume a token of `kind` or fail naming `expected`.
    fn expect(&mut self, kind: TokenKind, expected: &str) -> Result<Token<'a>, Diagnostic> {
        match self.advance()? {
            Some(tok) if tok.kind == kind => Ok(tok),
            Some(tok) => Err(Self::unexpected(&tok, expected)),
            None => Err(self.eof(expected)),
        }
    }

    fn expect_tag_close(&mut self) -> Result<Token<'a>, Diagnostic> {
        self.expect(TokenKind::TagClose, "`%}`")
    }

    /// Descend one level. Every `enter` that succeeds is paired with a
    /// `leave`; after an error the parse is abandoned.
    fn enter(&mut self, at: Span) -> Result<(), Diagnostic> {
        if self.depth >= MAX_NESTING {
            return Err(Diagnostic::new(
                DiagnosticKind::SyntaxError,
                "template nesting too deep",
                at,
            ));
        }
        self.depth += 1;
        Ok(())
    }

    fn leave(&mut self, levels: usize) {
        self.depth -= levels;
    }

    // ---- statements ----

    fn parse_block(&mut self, context: Context, opened: Span) -> Result<(Block, End), Diagnostic> {
        self.enter(opened)?;
        let result = self.parse_block_nodes(context, opened);
        self.leave(1);
        result
    }

    fn parse_block_nodes(&mut self, context: Context, opened: Span) -> Result<(Block, End), Diagnostic> {
        let mut nodes = Vec::new();

        loop {
            let Some(tok) = self.advance()? else {
                if context == Context::Root {
                    return Ok((Block::new(nodes), End::Eof));
                }
                return Err(Diagnostic::new(
                    DiagnosticKind::SyntaxError,
                    format!(
                        "unclosed `{}` block, expected `{{% {} %}}`",
                        context.opening(),
                        context.closing()
                    ),
                    opened,
                ));
            };

            match tok.kind {
                TokenKind::Text => nodes.push(Node::Literal {
                    text: tok.lexeme.to_string(),
                    span: tok.span,
                }),
                TokenKind::ExprOpen => nodes.push(self.parse_output(tok.span)?),
                TokenKind::TagOpen => {
                    let name = match self.advance()? {
                        Some(name) => name,
                        None => return Err(self.eof("a tag name")),
                    };
                    match name.kind {
                        TokenKind::Keyword(Keyword::If) => nodes.push(self.parse_if(tok.span)?),
                        TokenKind::Keyword(Keyword::For) => nodes.push(self.parse_for(tok.span)?),
                        TokenKind::Keyword(Keyword::Include) => {
                            nodes.push(self.parse_include(tok.span)?)
                        }
                        TokenKind::Keyword(
                            kw @ (Keyword::Elif | Keyword::Else | Keyword::Endif | Keyword::Endfor),
                        ) => {
                            let tag = tok.span.to(name.span);
                            if !context.accepts(kw) {
                                return Err(Self::misplaced(context, kw, tag));
                            }
                            let end = match kw {
                                Keyword::Elif => {
                                    let cond = self.parse_expr()?;
                                    End::Elif(cond)
                                }
                                Keyword::Else => End::Else,
                                Keyword::Endif => End::EndIf,
                                _ => End::EndFor,
                            };
                            self.expect_tag_close()?;
                            return Ok((Block::new(nodes), end));
                        }
                        TokenKind::Identifier | TokenKind::Keyword(_) => {
                            return Err(Diagnostic::new(
                                DiagnosticKind::UnknownTag,
                                format!("unknown tag `{}`", name.lexeme),
                                name.span,
                            ));
                        }
                        _ => return Err(Self::unexpected(&name, "a tag name")),
                    }
                }
                _ => return Err(Self::unexpected(&tok, "text, `{{` or `{%`")),
            }
        }
    }

    /// A closing or continuation tag where the enclosing block does not
    /// accept it.
    fn misplaced(context: Context, kw: Keyword, span: Span) -> Diagnostic {
        let message = match (context, kw) {
            (Context::Root, Keyword::Endif | Keyword::Elif) => {
                format!("unexpected `{}` with no open `if`", kw.as_str())
            }
            (Context::Root, Keyword::Endfor) => "unexpected `endfor` with no open `for`".to_string(),
            (Context::Root, _) => format!("unexpected `{}` outside of `if` or `for`", kw.as_str()),
            (Context::IfElse | Context::ForElse, Keyword::Else | Keyword::Elif) => format!(
                "unexpected `{}` after `else`, expected `{}`",
                kw.as_str(),
                context.closing()
            ),
            _ => format!("unexpected `{}`, expected `{}`", kw.as_str(), context.closing()),
        };
        Diagnostic::new(DiagnosticKind::SyntaxError, message, span)
    }

    fn parse_output(&mut self, open: Span) -> Result<Node, Diagnostic> {
        let expr = self.parse_expr()?;
        let close = self.expect(TokenKind::ExprClose, "`}}`")?;

        let mut raw = false;
        let mut outer = &expr;
        while let Expr::Filter { expr: inner, filter, .. } = outer {
            raw |= filter.marks_safe();
            outer = inner;
        }

        Ok(Node::Expression {
            expr,
            raw,
            span: open.to(close.span),
        })
    }

    fn parse_if(&mut self, open: Span) -> Result<Node, Diagnostic> {
        let mut cond = self.parse_expr()?;
        self.expect_tag_close()?;

        let mut branches = Vec::new();
        let mut otherwise = None;
        loop {
            let (body, end) = self.parse_block(Context::If, open)?;
            branches.push((cond, body));
            match end {
                End::Elif(next) => cond = next,
                End::Else => {
                    let (body, _) = self.parse_block(Context::IfElse, open)?;
                    otherwise = Some(body);
                    break;
                }
                _ => break,
            }
        }

        Ok(Node::If {
            branches,
            otherwise,
            span: open.to(Span::point(self.last_end)),
        })
    }

    fn parse_for(&mut self, open: Span) -> Result<Node, Diagnostic> {
        let var = self.expect(TokenKind::Identifier, "a loop variable name")?;
        if var.lexeme.contains('.') || var.lexeme == "loop" {
            return Err(Diagnostic::new(
                DiagnosticKind::SyntaxError,
                format!("invalid loop variable `{}`", var.lexeme),
                var.span,
            ));
        }
        self.expect(TokenKind::Keyword(Keyword::In), "`in`")?;
        let iterable = self.parse_expr()?;
        self.expect_tag_close()?;

        let (body, end) = self.parse_block(Context::For, open)?;
        let otherwise = match end {
            End::Else => Some(self.parse_block(Context::ForElse, open)?.0),
            _ => None,
        };

        Ok(Node::For {
            var: var.lexeme.to_string(),
            iterable,
            body,
            otherwise,
            span: open.to(Span::point(self.last_end)),
        })
    }

    fn parse_include(&mut self, open: Span) -> Result<Node, Diagnostic> {
        let name = self.expect(TokenKind::Literal(LiteralKind::String), "a template name string")?;
        let decoded = Self::string_literal(&name)?;
        let close = self.expect_tag_close()?;
        Ok(Node::Include {
            name: decoded,
            span: open.to(close.span),
        })
    }

    // ---- expressions ----

    fn parse_expr(&mut self) -> Result<Expr, Diagnostic> {
        self.parse_binary(1)
    }

    fn binary_op(kind: TokenKind) -> Option<BinaryOp> {
        Some(match kind {
            TokenKind::Keyword(Keyword::Or) => BinaryOp::Or,
            TokenKind::Keyword(Keyword::And) => BinaryOp::And,
            TokenKind::Operator(op) => match op {
                Operator::Eq => BinaryOp::Eq,
                Operator::Ne => BinaryOp::Ne,
                Operator::Lt => BinaryOp::Lt,
                Operator::Le => BinaryOp::Le,
                Operator::Gt => BinaryOp::Gt,
                Operator::Ge => BinaryOp::Ge,
                Operator::Plus => BinaryOp::Add,
                Operator::Minus => BinaryOp::Sub,
                Operator::Star => BinaryOp::Mul,
                Operator::Slash => BinaryOp::Div,
                Operator::Percent => BinaryOp::Rem,
                _ => return None,
            },
            _ => return None,
        })
    }

    fn parse_binary(&mut self, min_prec: u8) -> Result<Expr, Diagnostic> {
        let mut lhs = self.parse_unary()?;
        // each operator wraps `lhs` one level deeper
        let mut levels = 0;

        while let Some(op) = self.peek_kind()?.and_then(Self::binary_op) {
            let prec = op.precedence();
            if prec < min_prec {
                break;
            }
            let op_span = self.advance()?.map(|t| t.span).unwrap_or_default();
            self.enter(op_span)?;
            levels += 1;
            let rhs = self.parse_binary(prec + 1)?;
            let span = lhs.span().to(rhs.span());
            lhs = Expr::Binary {
                op,
                lhs: Box::new(lhs),
                rhs: Box::new(rhs),
                span,
            };
        }

        self.leave(levels);
        Ok(lhs)
    }

    fn parse_unary(&mut self) -> Result<Expr, Diagnostic> {
        let op = match self.peek_kind()? {
            Some(TokenKind::Keyword(Keyword::Not)) => UnaryOp::Not,
            Some(TokenKind::Operator(Operator::Minus)) => UnaryOp::Neg,
            _ => return self.parse_postfix(),
        };
        let start = self.advance()?.map(|t| t.span).unwrap_or_default();
        self.enter(start)?;
        let expr = self.parse_unary()?;
        self.leave(1);
        let span = start.to(expr.span());
        Ok(Expr::Unary {
            op,
            expr: Box::new(expr),
            span,
        })
    }

    fn parse_postfix(&mut self) -> Result<Expr, Diagnostic> {
        let mut expr = self.parse_primary()?;
        let mut levels = 0;

        while self.peek_kind()? == Some(TokenKind::Operator(Operator::Pipe)) {
            let pipe = self.advance()?.map(|t| t.span).unwrap_or_default();
            self.enter(pipe)?;
            levels += 1;
            let name = self.expect(TokenKind::Identifier, "a filter name")?;
            let filter = Filter::lookup(name.lexeme).ok_or_else(|| {
                Diagnostic::new(
                    DiagnosticKind::UnknownFilter,
                    format!("unknown filter `{}`", name.lexeme),
                    name.span,
                )
            })?;

            let mut args = Vec::new();
            if self.peek_kind()? == Some(TokenKind::Operator(Operator::LParen)) {
                self.advance()?;
                if self.peek_kind()? != Some(TokenKind::Operator(Operator::RParen)) {
                    loop {
                        args.push(self.parse_expr()?);
                        if self.peek_kind()? == Some(TokenKind::Operator(Operator::Comma)) {
                            self.advance()?;
                        } else {
                            break;
                        }
                    }
                }
                self.expect(TokenKind::Operator(Operator::RParen), "`)`")?;
            }

            let (min, max) = filter.arity();
            if args.len() < min || args.len() > max {
                let expected = if min == max {
                    format!("{}", min)
                } else {
                    format!("{} to {}", min, max)
                };
                return Err(Diagnostic::new(
                    DiagnosticKind::SyntaxError,
                    format!(
                        "filter `{}` takes {} argument(s), found {}",
                        name.lexeme,
                        expected,
                        args.len()
                    ),
                    name.span.to(Span::point(self.last_end)),
                ));
            }

            let span = expr.span().to(Span::point(self.last_end));
            expr = Expr::Filter {
                expr: Box::new(expr),
                filter,
                args,
                span,
            };
        }

        self.leave(levels);
        Ok(expr)
    }

    fn parse_primary(&mut self) -> Result<Expr, Diagnostic> {
        let tok = match self.advance()? {
            Some(tok) => tok,
            None => return Err(self.eof("an expression")),
        };

        let literal = |value: Value| Ok(Expr::Literal { value, span: tok.span });
        match tok.kind {
            TokenKind::Identifier => Self::path(&tok).map(Expr::Path),
            TokenKind::Keyword(Keyword::True) => literal(Value::Bool(true)),
            TokenKind::Keyword(Keyword::False) => literal(Value::Bool(false)),
            TokenKind::Keyword(Keyword::Null) => literal(Value::Null),
            TokenKind::Literal(LiteralKind::String) => literal(Value::String(Self::string_literal(&tok)?)),
            TokenKind::Literal(LiteralKind::Number) => literal(Value::Number(Self::number(&tok)?)),
            TokenKind::Operator(Operator::LParen) => {
                self.enter(tok.span)?;
                let inner = self.parse_expr()?;
                self.expect(TokenKind::Operator(Operator::RParen), "`)`")?;
                self.leave(1);
                Ok(inner)
            }
            _ => Err(Self::unexpected(&tok, "an expression")),
        }
    }

    /// Split a dotted identifier. All-digit segments become indices.
    fn path(tok: &Token<'_>) -> Result<Path, Diagnostic> {
        let mut segments = Vec::new();
        for part in tok.lexeme.split('.') {
            if part.is_empty() {
                return Err(Diagnostic::new(
                    DiagnosticKind::SyntaxError,
                    format!("invalid path `{}`", tok.lexeme),
                    tok.span,
                ));
            }
            let segment = match part.parse::<usize>() {
                Ok(index) if part.bytes().all(|b| b.is_ascii_digit()) => Segment::Index(index),
                _ => Segment::Key(part.to_string()),
            };
            segments.push(segment);
        }
        Ok(Path {
            segments,
            span: tok.span,
        })
    }

    fn string_literal(tok: &Token<'_>) -> Result<String, Diagnostic> {
        unescape(tok.lexeme).map_err(|(offset, message)| {
            let at = tok.span.start as usize + offset;
            Diagnostic::new(DiagnosticKind::SyntaxError, message, Span::new(at, at + 1))
        })
    }

    fn number(tok: &Token<'_>) -> Result<Number, Diagnostic> {
        let text = tok.lexeme;
        let is_float = text.bytes().any(|b| matches!(b, b'.' | b'e' | b'E'));
        if !is_float {
            if let Ok(i) = text.parse::<i64>() {
                return Ok(Number::Int(i));
            }
        }
        text.parse::<f64>().map(Number::Float).map_err(|_| {
            Diagnostic::new(
                DiagnosticKind::SyntaxError,
                format!("invalid number `{}`", text),
                tok.span,
            )
        })
    }
}
