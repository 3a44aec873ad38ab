//! Template syntax tree.
//!
//! The tree owns its children by value; there are no parent links and no
//! cycles. A compiled template holds the root and never mutates it.

use crate::filters::Filter;
use crate::span::Span;
use crate::value::Value;

/// A template node.
#[derive(Debug, Clone, PartialEq)]
pub enum Node {
    /// Literal template text, written verbatim
    Literal { text: String, span: Span },

    /// `{{ expr }}`
    Expression {
        expr: Expr,
        /// Bypass output escaping (`| raw`, `| safe`, or already `| escape`d)
        raw: bool,
        span: Span,
    },

    /// `{% if %}…{% elif %}…{% else %}…{% endif %}`
    If {
        /// Condition/body pairs, tested in order
        branches: Vec<(Expr, Block)>,
        otherwise: Option<Block>,
        span: Span,
    },

    /// `{% for var in iterable %}…{% else %}…{% endfor %}`
    For {
        var: String,
        iterable: Expr,
        body: Block,
        /// Rendered when the loop runs zero times
        otherwise: Option<Block>,
        span: Span,
    },

    /// `{% include "name" %}`
    Include { name: String, span: Span },

    Block(Block),
}

impl Node {
    pub fn span(&self) -> Span {
        match self {
            Node::Literal { span, .. }
            | Node::Expression { span, .. }
            | Node::If { span, .. }
            | Node::For { span, .. }
            | Node::Include { span, .. } => *span,
            Node::Block(block) => block.span(),
        }
    }

    /// Total number of nodes in this subtree, blocks included.
    pub fn count(&self) -> usize {
        1 + match self {
            Node::Literal { .. } | Node::Expression { .. } | Node::Include { .. } => 0,
            Node::If { branches, otherwise, .. } => {
                branches.iter().map(|(_, b)| b.count()).sum::<usize>()
                    + otherwise.as_ref().map_or(0, Block::count)
            }
            Node::For { body, otherwise, .. } => {
                body.count() + otherwise.as_ref().map_or(0, Block::count)
            }
            Node::Block(block) => block.count(),
        }
    }
}

/// Ordered sequence of nodes.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Block {
    pub nodes: Vec<Node>,
}

impl Block {
    pub fn new(nodes: Vec<Node>) -> Self {
        Self { nodes }
    }

    pub fn span(&self) -> Span {
        match (self.nodes.first(), self.nodes.last()) {
            (Some(first), Some(last)) => first.span().to(last.span()),
            _ => Span::default(),
        }
    }

    fn count(&self) -> usize {
        self.nodes.iter().map(Node::count).sum()
    }
}

/// An expression inside `{{ }}` or a tag.
#[derive(Debug, Clone, PartialEq)]
pub enum Expr {
    /// `user.name`, `items.0`
    Path(Path),

    /// `"text"`, `42`, `true`, `null`
    Literal { value: Value, span: Span },

    Binary {
        op: BinaryOp,
        lhs: Box<Expr>,
        rhs: Box<Expr>,
        span: Span,
    },

    Unary {
        op: UnaryOp,
        expr: Box<Expr>,
        span: Span,
    },

    /// `expr | name(args)`
    Filter {
        expr: Box<Expr>,
        filter: Filter,
        args: Vec<Expr>,
        span: Span,
    },
}

impl Expr {
    pub fn span(&self) -> Span {
        match self {
            Expr::Path(path) => path.span,
            Expr::Literal { span, .. }
            | Expr::Binary { span, .. }
            | Expr::Unary { span, .. }
            | Expr::Filter { span, .. } => *span,
        }
    }
}

/// A dotted lookup path. The first segment is always a key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Path {
    pub segments: Vec<Segment>,
    pub span: Span,
}

impl Path {
    pub fn head(&self) -> &str {
        match self.segments.first() {
            Some(Segment::Key(key)) => key,
            _ => "",
        }
    }
}

impl std::fmt::Display for Path {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        for (i, segment) in self.segments.iter().enumerate() {
            if i > 0 {
                f.write_str(".")?;
            }
            match segment {
                Segment::Key(key) => f.write_str(key)?,
                Segment::Index(index) => write!(f, "{}", index)?,
            }
        }
        Ok(())
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Segment {
    Key(String),
    /// All-digit segment: sequence index (or mapping key of the same text)
    Index(usize),
}

impl Segment {
    /// Look this segment up in `container`.
    pub fn step<'v>(&self, container: &'v Value) -> Option<&'v Value> {
        match (self, container) {
            (Segment::Key(key), Value::Mapping(map)) => map.get(key.as_str()),
            (Segment::Index(index), Value::Sequence(items)) => items.get(*index),
            (Segment::Index(index), Value::Mapping(map)) => map.get(index.to_string().as_str()),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BinaryOp {
    Or,
    And,
    Eq,
    Ne,
    Lt,
    Le,
    Gt,
    Ge,
    Add,
    Sub,
    Mul,
    Div,
    Rem,
}

impl BinaryOp {
    /// Binding power; higher binds tighter. All levels are left-associative.
    pub fn precedence(self) -> u8 {
        match self {
            BinaryOp::Or => 1,
            BinaryOp::And => 2,
            BinaryOp::Eq | BinaryOp::Ne | BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => 3,
            BinaryOp::Add | BinaryOp::Sub => 4,
            BinaryOp::Mul | BinaryOp::Div | BinaryOp::Rem => 5,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            BinaryOp::Or => "or",
            BinaryOp::And => "and",
            BinaryOp::Eq => "==",
            BinaryOp::Ne => "!=",
            BinaryOp::Lt => "<",
            BinaryOp::Le => "<=",
            BinaryOp::Gt => ">",
            BinaryOp::Ge => ">=",
            BinaryOp::Add => "+",
            BinaryOp::Sub => "-",
            BinaryOp::Mul => "*",
            BinaryOp::Div => "/",
            BinaryOp::Rem => "%",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum UnaryOp {
    Not,
    Neg,
}
