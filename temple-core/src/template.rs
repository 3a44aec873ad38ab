//! Compiled templates.

use std::fmt;
use std::sync::Arc;

use crate::ast::Node;
use crate::config::RenderOptions;
use crate::diagnostic::{Diagnostic, Error, Result};
use crate::environment::Environment;
use crate::parser;
use crate::render;
use crate::span::LineIndex;
use crate::value::Value;

/// A parsed template, ready to render any number of times.
///
/// Immutable after compilation and `Send + Sync`; clones share the source
/// text.
#[derive(Debug, Clone)]
pub struct Template {
    name: String,
    source: Arc<str>,
    lines: Arc<LineIndex>,
    root: Node,
}

/// Name given to templates compiled without one.
pub const ANONYMOUS: &str = "<string>";

impl Template {
    /// Compile an anonymous template.
    pub fn compile(source: &str) -> Result<Template> {
        Self::compile_named(ANONYMOUS, source)
    }

    /// Compile a template. Any lex or parse problem is fatal.
    pub fn compile_named(name: impl Into<String>, source: &str) -> Result<Template> {
        let name = name.into();
        let _span = tracing::debug_span!("compile", template = %name, bytes = source.len()).entered();

        let lines = LineIndex::new(source);
        let root = parser::parse(source).map_err(|diag| Error::Syntax(diag.locate(source, &lines)))?;
        tracing::debug!(nodes = root.count(), "compiled");

        Ok(Template {
            name,
            source: Arc::from(source),
            lines: Arc::new(lines),
            root,
        })
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn source(&self) -> &str {
        &self.source
    }

    /// Root of the syntax tree, always a `Node::Block`.
    pub fn root(&self) -> &Node {
        &self.root
    }

    /// Attach a line/column location in this template to `diag`.
    pub(crate) fn locate(&self, diag: Diagnostic) -> Diagnostic {
        diag.locate(&self.source, &self.lines)
    }

    /// Render with default options.
    pub fn render(&self, context: &Value) -> Rendered {
        self.render_with(context, RenderOptions::default())
    }

    /// Render into a `String`. `options.strict` is not applied here; see
    /// [`Rendered::into_result`].
    pub fn render_with(&self, context: &Value, options: RenderOptions) -> Rendered {
        let mut output = String::with_capacity(self.source.len());
        let diagnostics = self
            .render_inner(None, context, options, &mut output)
            .expect("writing to a String cannot fail");
        Rendered { output, diagnostics }
    }

    /// Render into any `fmt::Write` sink with default options, returning the
    /// warnings.
    pub fn render_to<W: fmt::Write + ?Sized>(&self, context: &Value, out: &mut W) -> Result<Vec<Diagnostic>> {
        self.render_to_with(context, RenderOptions::default(), out)
    }

    /// Render into a sink. With `options.strict`, warnings become
    /// `Error::Warnings` (output already written stays written).
    pub fn render_to_with<W: fmt::Write + ?Sized>(
        &self,
        context: &Value,
        options: RenderOptions,
        out: &mut W,
    ) -> Result<Vec<Diagnostic>> {
        let diagnostics = self.render_inner(None, context, options, out)?;
        if options.strict && !diagnostics.is_empty() {
            return Err(Error::Warnings(diagnostics));
        }
        Ok(diagnostics)
    }

    pub(crate) fn render_inner<W: fmt::Write + ?Sized>(
        &self,
        env: Option<&Environment>,
        context: &Value,
        options: RenderOptions,
        out: &mut W,
    ) -> std::result::Result<Vec<Diagnostic>, fmt::Error> {
        let _span = tracing::debug_span!("render", template = %self.name).entered();
        let diagnostics = render::render(self, env, context, options, out)?;
        tracing::debug!(warnings = diagnostics.len(), "rendered");
        Ok(diagnostics)
    }
}

/// Output of a render pass together with its warnings.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct Rendered {
    pub output: String,
    pub diagnostics: Vec<Diagnostic>,
}

impl Rendered {
    /// Rendered without any warning.
    pub fn is_clean(&self) -> bool {
        self.diagnostics.is_empty()
    }

    /// The output, or `Error::Warnings` when `strict` and any warning was
    /// recorded.
    pub fn into_result(self, strict: bool) -> Result<String> {
        if strict && !self.diagnostics.is_empty() {
            Err(Error::Warnings(self.diagnostics))
        } else {
            Ok(self.output)
        }
    }
}

impl fmt::Display for Rendered {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.output)
    }
}

/// Compile an anonymous template.
pub fn compile(source: &str) -> Result<Template> {
    Template::compile(source)
}
