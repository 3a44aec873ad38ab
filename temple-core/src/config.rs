//! Render configuration and the fixed template syntax.

use crate::escape::EscapeMode;

/// Template delimiters. These are the wire format of template documents and
/// do not change between releases.
pub struct Syntax;

impl Syntax {
    pub const EXPR_OPEN: &'static str = "{{";
    pub const EXPR_CLOSE: &'static str = "}}";
    pub const TAG_OPEN: &'static str = "{%";
    pub const TAG_CLOSE: &'static str = "%}";
    pub const COMMENT_OPEN: &'static str = "{#";
    pub const COMMENT_CLOSE: &'static str = "#}";
    /// Placed inside a delimiter (`{%-`, `-%}`) to trim adjacent whitespace
    pub const TRIM: u8 = b'-';
}

/// Options for a render pass.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RenderOptions {
    /// Escaping applied to expression output. `raw` opts out per expression.
    pub escape: EscapeMode,
    /// Treat render warnings as a failure.
    pub strict: bool,
    /// Deepest allowed `include` nesting.
    pub max_include_depth: usize,
}

impl RenderOptions {
    pub const DEFAULT_MAX_INCLUDE_DEPTH: usize = 16;

    pub fn new() -> Self {
        Self {
            escape: EscapeMode::Html,
            strict: false,
            max_include_depth: Self::DEFAULT_MAX_INCLUDE_DEPTH,
        }
    }

    pub fn with_escape(mut self, escape: EscapeMode) -> Self {
        self.escape = escape;
        self
    }

    /// Shorthand for `with_escape(EscapeMode::None)` when `false`.
    pub fn with_autoescape(self, enabled: bool) -> Self {
        self.with_escape(if enabled { EscapeMode::Html } else { EscapeMode::None })
    }

    pub fn with_strict(mut self, strict: bool) -> Self {
        self.strict = strict;
        self
    }

    pub fn with_max_include_depth(mut self, depth: usize) -> Self {
        self.max_include_depth = depth;
        self
    }
}

impl Default for RenderOptions {
    fn default() -> Self {
        Self::new()
    }
}
