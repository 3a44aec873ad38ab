//! Named template registry.
//!
//! `include` tags resolve against the environment a render was started
//! from. Templates rendered on their own have no environment, so their
//! includes always miss.

use std::collections::HashMap;
use std::fmt;

use crate::config::RenderOptions;
use crate::diagnostic::{Diagnostic, Error, Result};
use crate::template::{Rendered, Template};
use crate::value::Value;

#[derive(Debug, Clone, Default)]
pub struct Environment {
    templates: HashMap<String, Template>,
    options: RenderOptions,
}

impl Environment {
    pub fn new() -> Self {
        Self::default()
    }

    /// Use `options` for every render started from this environment.
    pub fn with_options(mut self, options: RenderOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> RenderOptions {
        self.options
    }

    /// Compile `source` and register it as `name`, replacing any template
    /// already registered under that name.
    pub fn add_template(&mut self, name: impl Into<String>, source: &str) -> Result<()> {
        let name = name.into();
        let template = Template::compile_named(name.clone(), source)?;
        tracing::debug!(template = %name, "registered");
        self.templates.insert(name, template);
        Ok(())
    }

    pub fn remove_template(&mut self, name: &str) -> Option<Template> {
        self.templates.remove(name)
    }

    pub fn get_template(&self, name: &str) -> Result<&Template> {
        self.lookup(name).ok_or_else(|| Error::TemplateNotFound(name.to_string()))
    }

    pub(crate) fn lookup(&self, name: &str) -> Option<&Template> {
        self.templates.get(name)
    }

    /// Registered template names, sorted.
    pub fn template_names(&self) -> Vec<&str> {
        let mut names: Vec<&str> = self.templates.keys().map(String::as_str).collect();
        names.sort_unstable();
        names
    }

    /// Render a registered template. In strict mode any warning is an error.
    pub fn render(&self, name: &str, context: &Value) -> Result<Rendered> {
        let template = self.get_template(name)?;
        let mut output = String::with_capacity(template.source().len());
        let diagnostics = template.render_inner(Some(self), context, self.options, &mut output)?;
        if self.options.strict && !diagnostics.is_empty() {
            return Err(Error::Warnings(diagnostics));
        }
        Ok(Rendered { output, diagnostics })
    }

    /// Render a registered template into a sink, returning the warnings.
    pub fn render_to<W: fmt::Write + ?Sized>(
        &self,
        name: &str,
        context: &Value,
        out: &mut W,
    ) -> Result<Vec<Diagnostic>> {
        let template = self.get_template(name)?;
        let diagnostics = template.render_inner(Some(self), context, self.options, out)?;
        if self.options.strict && !diagnostics.is_empty() {
            return Err(Error::Warnings(diagnostics));
        }
        Ok(diagnostics)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::diagnostic::DiagnosticKind;

    fn context(json: &str) -> Value {
        Value::from_json(json.as_bytes()).unwrap()
    }

    #[test]
    fn test_include_shares_scope() {
        let mut env = Environment::new();
        env.add_template("item.html", "<li>{{ item }}</li>").unwrap();
        env.add_template("list.html", "<ul>{% for item in items %}{% include \"item.html\" %}{% endfor %}</ul>")
            .unwrap();

        let rendered = env.render("list.html", &context(r#"{"items": ["a", "<b>"]}"#)).unwrap();
        assert_eq!(rendered.output, "<ul><li>a</li><li>&lt;b&gt;</li></ul>");
        assert!(rendered.is_clean());
    }

    #[test]
    fn test_missing_include() {
        let mut env = Environment::new();
        env.add_template("page", "a{% include \"nope\" %}b").unwrap();
        let rendered = env.render("page", &Value::Null).unwrap();
        assert_eq!(rendered.output, "ab");
        assert_eq!(rendered.diagnostics[0].kind, DiagnosticKind::UndefinedTemplate);
    }

    #[test]
    fn test_recursive_include_is_bounded() {
        let mut env = Environment::new().with_options(RenderOptions::new().with_max_include_depth(3));
        env.add_template("loop", "x{% include \"loop\" %}").unwrap();
        let rendered = env.render("loop", &Value::Null).unwrap();
        assert_eq!(rendered.output, "xxxx");
        assert_eq!(rendered.diagnostics.len(), 1);
        assert_eq!(rendered.diagnostics[0].kind, DiagnosticKind::IncludeDepth);
    }

    #[test]
    fn test_template_not_found() {
        let env = Environment::new();
        assert!(matches!(env.render("missing", &Value::Null), Err(Error::TemplateNotFound(name)) if name == "missing"));
    }

    #[test]
    fn test_add_template_syntax_error() {
        let mut env = Environment::new();
        let err = env.add_template("bad", "{% if x %}").unwrap_err();
        assert!(matches!(err, Error::Syntax(_)));
        assert!(env.template_names().is_empty());
    }

    #[test]
    fn test_strict_environment() {
        let mut env = Environment::new().with_options(RenderOptions::new().with_strict(true));
        env.add_template("t", "{{ missing }}").unwrap();
        assert!(matches!(env.render("t", &Value::Null), Err(Error::Warnings(_))));
        env.add_template("ok", "fine").unwrap();
        assert_eq!(env.render("ok", &Value::Null).unwrap().output, "fine");
        assert_eq!(env.template_names(), vec!["ok", "t"]);
    }
}
