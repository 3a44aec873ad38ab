//! Tree-walking renderer.
//!
//! One pass, depth first, left to right. Output is appended to the sink in
//! document order; warnings are collected alongside. The only way a render
//! stops early is a sink write failure.

use std::borrow::Cow;
use std::fmt;

use crate::ast::{Block, Expr, Node};
use crate::config::RenderOptions;
use crate::diagnostic::{Diagnostic, DiagnosticKind};
use crate::environment::Environment;
use crate::escape::{escape_into, EscapeMode};
use crate::eval::Evaluator;
use crate::parser::MAX_NESTING;
use crate::scope::Scope;
use crate::span::Span;
use crate::template::Template;
use crate::value::{Map, Value};

/// Deepest block nesting across `include`s. A single template is already
/// bounded by `MAX_NESTING`; this caps the sum over an include chain.
const MAX_RENDER_NESTING: usize = 2 * MAX_NESTING;

/// Render `template` against `context` into `out`, returning the warnings.
pub(crate) fn render<W: fmt::Write + ?Sized>(
    template: &Template,
    env: Option<&Environment>,
    context: &Value,
    options: RenderOptions,
    out: &mut W,
) -> Result<Vec<Diagnostic>, fmt::Error> {
    let mut renderer = Renderer::new(env, context, options, out);
    renderer.render_node(template, template.root())?;
    Ok(renderer.diagnostics)
}

struct Renderer<'a, 'w, W: ?Sized> {
    env: Option<&'a Environment>,
    options: RenderOptions,
    out: &'w mut W,
    scope: Scope<'a>,
    diagnostics: Vec<Diagnostic>,
    /// Current `include` nesting
    depth: usize,
    /// Current block nesting, across includes
    nesting: usize,
}

impl<'a, 'w, W: fmt::Write + ?Sized> Renderer<'a, 'w, W> {
    fn new(env: Option<&'a Environment>, context: &'a Value, options: RenderOptions, out: &'w mut W) -> Self {
        Self {
            env,
            options,
            out,
            scope: Scope::new(context),
            diagnostics: Vec::new(),
            depth: 0,
            nesting: 0,
        }
    }

    fn warn(&mut self, template: &Template, kind: DiagnosticKind, message: String, span: Span) {
        let diag = template.locate(Diagnostic::new(kind, message, span));
        tracing::trace!(%diag, "render warning");
        self.diagnostics.push(diag);
    }

    fn render_block(&mut self, template: &'a Template, block: &'a Block) -> fmt::Result {
        self.nesting += 1;
        let mut result = Ok(());
        for node in &block.nodes {
            result = self.render_node(template, node);
            if result.is_err() {
                break;
            }
        }
        self.nesting -= 1;
        result
    }

    /// Evaluate a loop's iterable. Context data is borrowed for the whole
    /// loop; only computed values are owned.
    fn iterable(&mut self, template: &'a Template, expr: &'a Expr) -> Cow<'a, Value> {
        if let Expr::Path(path) = expr {
            if let Some(value) = self.scope.resolve_borrowed(path) {
                return Cow::Borrowed(value);
            }
        }
        let value = Evaluator::new(template, &self.scope, &mut self.diagnostics).eval(expr);
        Cow::Owned(value.into_owned())
    }

    fn render_node(&mut self, template: &'a Template, node: &'a Node) -> fmt::Result {
        match node {
            Node::Literal { text, .. } => self.out.write_str(text),

            Node::Expression { expr, raw, span } => {
                let value = Evaluator::new(template, &self.scope, &mut self.diagnostics).eval(expr);
                if !value.is_scalar() {
                    let diag = Diagnostic::new(
                        DiagnosticKind::NonScalarInterpolation,
                        format!("{} written to output as JSON", value.type_name()),
                        *span,
                    );
                    self.diagnostics.push(template.locate(diag));
                }
                let mode = if *raw { EscapeMode::None } else { self.options.escape };
                write_value(self.out, &value, mode)
            }

            Node::If { branches, otherwise, .. } => {
                for (cond, body) in branches {
                    let truthy = Evaluator::new(template, &self.scope, &mut self.diagnostics)
                        .eval(cond)
                        .is_truthy();
                    if truthy {
                        return self.render_block(template, body);
                    }
                }
                match otherwise {
                    Some(body) => self.render_block(template, body),
                    None => Ok(()),
                }
            }

            Node::For { var, iterable, body, otherwise, span } => {
                let entries: Vec<(Option<String>, Cow<'a, Value>)> = match self.iterable(template, iterable) {
                    Cow::Borrowed(Value::Sequence(items)) => {
                        items.iter().map(|item| (None, Cow::Borrowed(item))).collect()
                    }
                    Cow::Borrowed(Value::Mapping(map)) => {
                        map.iter().map(|(k, v)| (Some(k.clone()), Cow::Borrowed(v))).collect()
                    }
                    Cow::Owned(Value::Sequence(items)) => {
                        items.into_iter().map(|item| (None, Cow::Owned(item))).collect()
                    }
                    Cow::Owned(Value::Mapping(map)) => {
                        map.into_iter().map(|(k, v)| (Some(k), Cow::Owned(v))).collect()
                    }
                    other => {
                        let message = format!("cannot iterate over {}", other.type_name());
                        self.warn(template, DiagnosticKind::NotIterable, message, *span);
                        Vec::new()
                    }
                };

                if entries.is_empty() {
                    return match otherwise {
                        Some(body) => self.render_block(template, body),
                        None => Ok(()),
                    };
                }

                self.scope.push_frame();
                let result = self.render_iterations(template, var, body, entries);
                self.scope.pop_frame();
                result
            }

            Node::Include { name, span } => self.render_include(template, name, *span),

            Node::Block(block) => self.render_block(template, block),
        }
    }

    fn render_iterations(
        &mut self,
        template: &'a Template,
        var: &str,
        body: &'a Block,
        entries: Vec<(Option<String>, Cow<'a, Value>)>,
    ) -> fmt::Result {
        let length = entries.len();
        for (index, (key, item)) in entries.into_iter().enumerate() {
            let mut meta = Map::with_capacity(6);
            meta.insert("index".into(), Value::from(index + 1));
            meta.insert("index0".into(), Value::from(index));
            meta.insert("first".into(), Value::Bool(index == 0));
            meta.insert("last".into(), Value::Bool(index + 1 == length));
            meta.insert("length".into(), Value::from(length));
            if let Some(key) = key {
                meta.insert("key".into(), Value::String(key));
            }

            self.scope.bind(var, item);
            self.scope.bind("loop", Cow::Owned(Value::Mapping(meta)));
            self.render_block(template, body)?;
        }
        Ok(())
    }

    fn render_include(&mut self, template: &'a Template, name: &str, span: Span) -> fmt::Result {
        let Some(included) = self.env.and_then(|env| env.lookup(name)) else {
            let message = format!("template `{}` is not registered", name);
            self.warn(template, DiagnosticKind::UndefinedTemplate, message, span);
            return Ok(());
        };

        if self.depth >= self.options.max_include_depth {
            let message = format!(
                "including `{}` exceeds the maximum depth of {}",
                name, self.options.max_include_depth
            );
            self.warn(template, DiagnosticKind::IncludeDepth, message, span);
            return Ok(());
        }
        if self.nesting >= MAX_RENDER_NESTING {
            let message = format!(
                "including `{}` exceeds the maximum block nesting of {}",
                name, MAX_RENDER_NESTING
            );
            self.warn(template, DiagnosticKind::IncludeDepth, message, span);
            return Ok(());
        }

        tracing::trace!(name, depth = self.depth + 1, "include");
        self.depth += 1;
        let result = self.render_node(included, included.root());
        self.depth -= 1;
        result
    }
}

/// Write a value's text form. Only strings and container JSON can contain
/// characters that need escaping.
fn write_value<W: fmt::Write + ?Sized>(out: &mut W, value: &Value, mode: EscapeMode) -> fmt::Result {
    match value {
        Value::Null => Ok(()),
        Value::String(s) => escape_into(out, s, mode),
        Value::Bool(_) | Value::Number(_) => write!(out, "{}", value),
        Value::Sequence(_) | Value::Mapping(_) => escape_into(out, &value.to_string(), mode),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn render_json(source: &str, context: &str) -> (String, Vec<DiagnosticKind>) {
        let template = Template::compile(source).unwrap();
        let context = Value::from_json(context.as_bytes()).unwrap();
        let mut out = String::new();
        let diagnostics = render(&template, None, &context, RenderOptions::default(), &mut out).unwrap();
        (out, diagnostics.into_iter().map(|d| d.kind).collect())
    }

    #[test]
    fn test_hello() {
        assert_eq!(
            render_json("Hello {{ name }}!", r#"{"name": "World"}"#),
            ("Hello World!".to_string(), vec![])
        );
    }

    #[test]
    fn test_for_loop() {
        assert_eq!(
            render_json("{% for item in items %}{{ item }},{% endfor %}", r#"{"items": [1,2,3]}"#),
            ("1,2,3,".to_string(), vec![])
        );
    }

    #[test]
    fn test_loop_meta() {
        let source = "{% for x in xs %}{{ loop.index }}/{{ loop.length }}{% if loop.first %}F{% endif %}{% if loop.last %}L{% endif %} {% endfor %}";
        assert_eq!(
            render_json(source, r#"{"xs": ["a", "b", "c"]}"#).0,
            "1/3F 2/3 3/3L "
        );
    }

    #[test]
    fn test_mapping_iteration() {
        let source = "{% for v in m %}{{ loop.key }}={{ v }};{% endfor %}";
        assert_eq!(render_json(source, r#"{"m": {"b": 1, "a": 2}}"#).0, "b=1;a=2;");
    }

    #[test]
    fn test_nested_loops_shadow() {
        let source = "{% for x in outer %}{% for x in inner %}{{ x }}{% endfor %}{{ x }}|{% endfor %}";
        assert_eq!(
            render_json(source, r#"{"outer": ["A", "B"], "inner": [1, 2]}"#).0,
            "12A|12B|"
        );
    }

    #[test]
    fn test_empty_and_non_iterable() {
        let source = "{% for x in xs %}{{ x }}{% else %}none{% endfor %}";
        assert_eq!(render_json(source, r#"{"xs": []}"#), ("none".to_string(), vec![]));
        assert_eq!(render_json(source, r#"{"xs": {}}"#), ("none".to_string(), vec![]));
        assert_eq!(
            render_json(source, r#"{"xs": 5}"#),
            ("none".to_string(), vec![DiagnosticKind::NotIterable])
        );
    }

    #[test]
    fn test_escaping() {
        let (out, _) = render_json("{{ v }}|{{ v | raw }}|{{ v | e }}", r#"{"v": "<b>"}"#);
        assert_eq!(out, "&lt;b&gt;|<b>|&lt;b&gt;");
        let (out, _) = render_json("<p>{{ n }}</p>", r#"{"n": 3}"#);
        assert_eq!(out, "<p>3</p>");
    }

    #[test]
    fn test_escape_mode_none() {
        let template = Template::compile("{{ v }}").unwrap();
        let context = Value::from_json(br#"{"v": "<b>"}"#).unwrap();
        let mut out = String::new();
        let options = RenderOptions::new().with_autoescape(false);
        render(&template, None, &context, options, &mut out).unwrap();
        assert_eq!(out, "<b>");
    }

    #[test]
    fn test_non_scalar_interpolation() {
        let (out, kinds) = render_json("{{ m }}", r#"{"m": {"a": [1, "x"]}}"#);
        assert_eq!(out, "{&quot;a&quot;:[1,&quot;x&quot;]}");
        assert_eq!(kinds, vec![DiagnosticKind::NonScalarInterpolation]);
    }

    #[test]
    fn test_if_chain() {
        let source = "{% if a %}A{% elif b %}B{% else %}C{% endif %}";
        assert_eq!(render_json(source, r#"{"a": 1, "b": 1}"#).0, "A");
        assert_eq!(render_json(source, r#"{"a": 0, "b": 1}"#).0, "B");
        assert_eq!(render_json(source, r#"{"a": 0, "b": ""}"#).0, "C");
    }

    #[test]
    fn test_missing_reference_continues() {
        let (out, kinds) = render_json("a{{ nope }}b{{ x.y }}c", r#"{"x": {}}"#);
        assert_eq!(out, "abc");
        assert_eq!(kinds, vec![DiagnosticKind::UndefinedReference, DiagnosticKind::UndefinedReference]);
    }

    #[test]
    fn test_include_without_environment() {
        let (out, kinds) = render_json("[{% include \"x\" %}]", "{}");
        assert_eq!(out, "[]");
        assert_eq!(kinds, vec![DiagnosticKind::UndefinedTemplate]);
    }

    #[test]
    fn test_loop_sources() {
        let context = r#"{"rows": [[1, 2], [3]], "xs": [7]}"#;
        // context data, and items of an outer loop over context data
        let source = "{% for row in rows %}{% for c in row %}{{ c }}{% endfor %};{% endfor %}";
        assert_eq!(render_json(source, context), ("12;3;".to_string(), vec![]));
        // computed iterable
        let source = "{% for c in rows | first %}{{ c }}{% endfor %}";
        assert_eq!(render_json(source, context), ("12".to_string(), vec![]));
        // owned binding
        let source = "{% for x in xs %}{% for v in loop %}{{ v }},{% endfor %}{% endfor %}";
        assert_eq!(render_json(source, context), ("1,0,true,true,1,".to_string(), vec![]));
    }

    #[test]
    fn test_include_chain_nesting_is_bounded() {
        let depth = 100;
        let source = format!(
            "{}x{{% include \"deep\" %}}{}",
            "{% if true %}".repeat(depth),
            "{% endif %}".repeat(depth)
        );
        let mut env = Environment::new();
        env.add_template("deep", &source).unwrap();
        let template = env.get_template("deep").unwrap();

        let options = RenderOptions::new().with_max_include_depth(1000);
        let mut out = String::new();
        let diagnostics = render(template, Some(&env), &Value::Null, options, &mut out).unwrap();
        // each level adds 101 blocks; the third include would pass the bound
        assert_eq!(out, "xxx");
        let kinds: Vec<_> = diagnostics.iter().map(|d| d.kind).collect();
        assert_eq!(kinds, vec![DiagnosticKind::IncludeDepth]);
        assert!(diagnostics[0].message.contains("block nesting"), "{}", diagnostics[0].message);
    }

    #[test]
    fn test_sink_failure() {
        struct Full;
        impl fmt::Write for Full {
            fn write_str(&mut self, _: &str) -> fmt::Result {
                Err(fmt::Error)
            }
        }
        let template = Template::compile("text").unwrap();
        let result = render(&template, None, &Value::Null, RenderOptions::default(), &mut Full);
        assert!(result.is_err());
    }
}
