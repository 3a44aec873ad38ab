//! Expression evaluation.
//!
//! Evaluation never fails. Anything that cannot produce a value (a missing
//! key, an operator applied to the wrong types, a filter type error) records
//! a warning and evaluates to `null`, so rendering always runs to the end.
//!
//! Results are `Cow`s: a path that resolves into the context or a loop
//! binding is borrowed, computed values are owned.

use std::borrow::Cow;
use std::cmp::Ordering;

use crate::ast::{BinaryOp, Expr, Path, Segment, UnaryOp};
use crate::diagnostic::{Diagnostic, DiagnosticKind};
use crate::filters::Filter;
use crate::scope::Scope;
use crate::span::Span;
use crate::template::Template;
use crate::value::{Number, Value};

pub struct Evaluator<'a, 'd> {
    template: &'a Template,
    scope: &'a Scope<'a>,
    diagnostics: &'d mut Vec<Diagnostic>,
}

const NULL: Cow<'static, Value> = Cow::Owned(Value::Null);

impl<'a, 'd> Evaluator<'a, 'd> {
    pub fn new(template: &'a Template, scope: &'a Scope<'a>, diagnostics: &'d mut Vec<Diagnostic>) -> Self {
        Self {
            template,
            scope,
            diagnostics,
        }
    }

    fn warn(&mut self, kind: DiagnosticKind, message: String, span: Span) {
        let diag = self.template.locate(Diagnostic::new(kind, message, span));
        tracing::trace!(%diag, "render warning");
        self.diagnostics.push(diag);
    }

    pub fn eval(&mut self, expr: &'a Expr) -> Cow<'a, Value> {
        match expr {
            Expr::Path(path) => self.resolve(path, true),
            Expr::Literal { value, .. } => Cow::Borrowed(value),
            Expr::Binary { op, lhs, rhs, span } => self.binary(*op, lhs, rhs, *span),
            Expr::Unary { op, expr, span } => self.unary(*op, expr, *span),
            Expr::Filter { expr, filter, args, span } => self.filter(*filter, expr, args, *span),
        }
    }

    /// Walk a dotted path through the scope. With `report` unset a miss is
    /// silent (used under `default`).
    fn resolve(&mut self, path: &Path, report: bool) -> Cow<'a, Value> {
        let head = path.head();
        let mut current = match self.scope.lookup(head) {
            Some(value) => value,
            None => {
                if report {
                    self.warn(
                        DiagnosticKind::UndefinedReference,
                        format!("`{}` is undefined", head),
                        path.span,
                    );
                }
                return NULL;
            }
        };

        for segment in &path.segments[1..] {
            match segment.step(current) {
                Some(value) => current = value,
                None => {
                    if report {
                        let reason = Self::miss_reason(segment, current);
                        self.warn(
                            DiagnosticKind::UndefinedReference,
                            format!("`{}` is undefined: {}", path, reason),
                            path.span,
                        );
                    }
                    return NULL;
                }
            }
        }

        Cow::Borrowed(current)
    }

    fn miss_reason(segment: &Segment, container: &Value) -> String {
        match (segment, container) {
            (Segment::Key(key), Value::Mapping(_)) => format!("no key `{}`", key),
            (Segment::Index(index), Value::Mapping(_)) => format!("no key `{}`", index),
            (Segment::Index(index), Value::Sequence(items)) => {
                format!("index {} out of range for length {}", index, items.len())
            }
            (Segment::Key(key), Value::Sequence(_)) => format!("`{}` is not an index", key),
            (Segment::Key(key), other) => format!("cannot look up `{}` in {}", key, other.type_name()),
            (Segment::Index(index), other) => format!("cannot index {} with {}", other.type_name(), index),
        }
    }

    fn binary(&mut self, op: BinaryOp, lhs: &'a Expr, rhs: &'a Expr, span: Span) -> Cow<'a, Value> {
        // Logical operators short-circuit and always yield a bool
        match op {
            BinaryOp::And => {
                let result = self.eval(lhs).is_truthy() && self.eval(rhs).is_truthy();
                return Cow::Owned(Value::Bool(result));
            }
            BinaryOp::Or => {
                let result = self.eval(lhs).is_truthy() || self.eval(rhs).is_truthy();
                return Cow::Owned(Value::Bool(result));
            }
            _ => {}
        }

        let l = self.eval(lhs);
        let r = self.eval(rhs);
        let result = match op {
            BinaryOp::Eq => Ok(Value::Bool(l == r)),
            BinaryOp::Ne => Ok(Value::Bool(l != r)),
            BinaryOp::Lt | BinaryOp::Le | BinaryOp::Gt | BinaryOp::Ge => {
                compare(op, &l, &r).map(Value::Bool)
            }
            _ => arithmetic(op, &l, &r),
        };

        match result {
            Ok(value) => Cow::Owned(value),
            Err(message) => {
                self.warn(DiagnosticKind::TypeMismatch, message, span);
                NULL
            }
        }
    }

    fn unary(&mut self, op: UnaryOp, expr: &'a Expr, span: Span) -> Cow<'a, Value> {
        let value = self.eval(expr);
        match op {
            UnaryOp::Not => Cow::Owned(Value::Bool(!value.is_truthy())),
            UnaryOp::Neg => match value.as_ref() {
                Value::Number(Number::Int(i)) => Cow::Owned(match i.checked_neg() {
                    Some(n) => Value::from(n),
                    None => Value::from(-(*i as f64)),
                }),
                Value::Number(Number::Float(f)) => Cow::Owned(Value::from(-f)),
                other => {
                    let message = format!("cannot negate {}", other.type_name());
                    self.warn(DiagnosticKind::TypeMismatch, message, span);
                    NULL
                }
            },
        }
    }

    fn filter(&mut self, filter: Filter, expr: &'a Expr, args: &'a [Expr], span: Span) -> Cow<'a, Value> {
        // `default` covers for undefined paths, so a miss there is expected
        let value = match (filter, expr) {
            (Filter::Default, Expr::Path(path)) => self.resolve(path, false),
            _ => self.eval(expr),
        };
        let args: Vec<Value> = args.iter().map(|arg| self.eval(arg).into_owned()).collect();

        match filter.apply(value, &args) {
            Ok(value) => value,
            Err(message) => {
                self.warn(DiagnosticKind::TypeMismatch, message, span);
                NULL
            }
        }
    }
}

fn mismatch(op: BinaryOp, l: &Value, r: &Value) -> String {
    format!(
        "unsupported operand types for `{}`: {} and {}",
        op.as_str(),
        l.type_name(),
        r.type_name()
    )
}

/// Ordering comparison: number/number or string/string only.
fn compare(op: BinaryOp, l: &Value, r: &Value) -> Result<bool, String> {
    let ordering = match (l, r) {
        (Value::Number(a), Value::Number(b)) => a.partial_cmp(b),
        (Value::String(a), Value::String(b)) => Some(a.cmp(b)),
        _ => return Err(mismatch(op, l, r)),
    };
    // NaN compares false every way
    let Some(ordering) = ordering else {
        return Ok(false);
    };
    Ok(match op {
        BinaryOp::Lt => ordering == Ordering::Less,
        BinaryOp::Le => ordering != Ordering::Greater,
        BinaryOp::Gt => ordering == Ordering::Greater,
        _ => ordering != Ordering::Less,
    })
}

/// `+ - * / %`. Integer operands stay integers (falling back to float on
/// overflow) except for `/`, which always yields a float.
fn arithmetic(op: BinaryOp, l: &Value, r: &Value) -> Result<Value, String> {
    let (a, b) = match (l, r) {
        (Value::String(a), Value::String(b)) if op == BinaryOp::Add => {
            let mut joined = String::with_capacity(a.len() + b.len());
            joined.push_str(a);
            joined.push_str(b);
            return Ok(Value::String(joined));
        }
        (Value::Number(a), Value::Number(b)) => (*a, *b),
        _ => return Err(mismatch(op, l, r)),
    };

    if matches!(op, BinaryOp::Div | BinaryOp::Rem) && b.is_zero() {
        return Err(format!("{} by zero", if op == BinaryOp::Div { "division" } else { "modulo" }));
    }

    if let (Number::Int(x), Number::Int(y)) = (a, b) {
        let exact = match op {
            BinaryOp::Add => x.checked_add(y),
            BinaryOp::Sub => x.checked_sub(y),
            BinaryOp::Mul => x.checked_mul(y),
            BinaryOp::Rem => x.checked_rem(y),
            _ => None,
        };
        if let Some(n) = exact {
            return Ok(Value::from(n));
        }
    }

    let (x, y) = (a.as_f64(), b.as_f64());
    let n = match op {
        BinaryOp::Add => x + y,
        BinaryOp::Sub => x - y,
        BinaryOp::Mul => x * y,
        BinaryOp::Div => x / y,
        _ => x % y,
    };
    Ok(Value::from(n))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ast::Node;

    /// Evaluate the single `{{ expr }}` of `source` against `context`.
    fn eval_with(source: &str, context: &Value) -> (Value, Vec<Diagnostic>) {
        let template = Template::compile(source).unwrap();
        let expr = match template.root() {
            Node::Block(block) => match &block.nodes[0] {
                Node::Expression { expr, .. } => expr,
                other => panic!("expected expression, got {:?}", other),
            },
            other => panic!("expected block, got {:?}", other),
        };
        let scope = Scope::new(context);
        let mut diagnostics = Vec::new();
        let value = Evaluator::new(&template, &scope, &mut diagnostics).eval(expr).into_owned();
        (value, diagnostics)
    }

    fn eval(expr: &str) -> Value {
        let context = Value::from_json(
            br#"{"a": 7, "b": 2, "s": "hi", "f": 1.5, "xs": [1, 2, 3],
                "user": {"name": "Ada", "tags": ["x"]}, "empty": ""}"#,
        )
        .unwrap();
        let (value, diagnostics) = eval_with(&format!("{{{{ {} }}}}", expr), &context);
        assert!(diagnostics.is_empty(), "unexpected diagnostics for `{}`: {:?}", expr, diagnostics);
        value
    }

    fn warns(expr: &str) -> (Value, DiagnosticKind) {
        let context: Value = vec![("n", Value::from(1)), ("s", Value::from("x"))].into_iter().collect();
        let (value, diagnostics) = eval_with(&format!("{{{{ {} }}}}", expr), &context);
        assert_eq!(diagnostics.len(), 1, "expected one diagnostic for `{}`", expr);
        (value, diagnostics[0].kind)
    }

    #[test]
    fn test_paths() {
        assert_eq!(eval("user.name"), Value::from("Ada"));
        assert_eq!(eval("user.tags.0"), Value::from("x"));
        assert_eq!(eval("xs.2"), Value::from(3));
    }

    #[test]
    fn test_missing_paths_warn() {
        assert_eq!(warns("missing"), (Value::Null, DiagnosticKind::UndefinedReference));
        assert_eq!(warns("s.length"), (Value::Null, DiagnosticKind::UndefinedReference));
        assert_eq!(warns("n.0"), (Value::Null, DiagnosticKind::UndefinedReference));
    }

    #[test]
    fn test_missing_path_message() {
        let context = Value::from_json(br#"{"items": [1, 2]}"#).unwrap();
        let (_, diagnostics) = eval_with("\n  {{ items.5 }}", &context);
        assert_eq!(
            diagnostics[0].to_string(),
            "2:6: undefined reference: `items.5` is undefined: index 5 out of range for length 2"
        );
    }

    #[test]
    fn test_arithmetic() {
        assert_eq!(eval("a + b * 2"), Value::from(11));
        assert_eq!(eval("a - 10"), Value::from(-3));
        assert_eq!(eval("a / b"), Value::from(3.5));
        assert_eq!(eval("a % b"), Value::from(1));
        assert_eq!(eval("f * 2"), Value::from(3.0));
        assert_eq!(eval("-a"), Value::from(-7));
        assert_eq!(eval("s + \"!\""), Value::from("hi!"));
    }

    #[test]
    fn test_division_by_zero() {
        assert_eq!(warns("n / 0"), (Value::Null, DiagnosticKind::TypeMismatch));
        assert_eq!(warns("n % 0"), (Value::Null, DiagnosticKind::TypeMismatch));
    }

    #[test]
    fn test_type_mismatch() {
        assert_eq!(warns("n + s"), (Value::Null, DiagnosticKind::TypeMismatch));
        assert_eq!(warns("s < 1"), (Value::Null, DiagnosticKind::TypeMismatch));
        assert_eq!(warns("-s"), (Value::Null, DiagnosticKind::TypeMismatch));
        assert_eq!(warns("n | upper"), (Value::Null, DiagnosticKind::TypeMismatch));
    }

    #[test]
    fn test_comparison_and_logic() {
        assert_eq!(eval("a > b"), Value::Bool(true));
        assert_eq!(eval("b >= 2 and s == \"hi\""), Value::Bool(true));
        assert_eq!(eval("a == 7.0"), Value::Bool(true));
        assert_eq!(eval("\"abc\" < \"abd\""), Value::Bool(true));
        assert_eq!(eval("xs == xs"), Value::Bool(true));
        assert_eq!(eval("empty or a"), Value::Bool(true));
        assert_eq!(eval("not empty"), Value::Bool(true));
    }

    #[test]
    fn test_short_circuit_skips_rhs() {
        // The undefined rhs is never evaluated, so no warning is recorded
        assert_eq!(eval("false and nope"), Value::Bool(false));
        assert_eq!(eval("true or nope"), Value::Bool(true));
    }

    #[test]
    fn test_filters() {
        assert_eq!(eval("user.name | upper"), Value::from("ADA"));
        assert_eq!(eval("xs | length"), Value::from(3));
        assert_eq!(eval("xs | join(\"-\")"), Value::from("1-2-3"));
        assert_eq!(eval("xs | last"), Value::from(3));
        assert_eq!(eval("nope | default(\"fallback\")"), Value::from("fallback"));
        assert_eq!(eval("user | json"), Value::from(r#"{"name":"Ada","tags":["x"]}"#));
    }

    #[test]
    fn test_borrowed_paths() {
        let context = Value::from_json(br#"{"big": [1, 2, 3]}"#).unwrap();
        let template = Template::compile("{{ big }}").unwrap();
        let Node::Block(block) = template.root() else { panic!("expected block") };
        let Node::Expression { expr, .. } = &block.nodes[0] else { panic!("expected expression") };
        let scope = Scope::new(&context);
        let mut diagnostics = Vec::new();
        let value = Evaluator::new(&template, &scope, &mut diagnostics).eval(expr);
        assert!(matches!(value, Cow::Borrowed(_)));
    }

    #[test]
    fn test_integer_overflow_falls_back_to_float() {
        let (value, diagnostics) = eval_with("{{ 9223372036854775807 + 1 }}", &Value::Null);
        assert!(diagnostics.is_empty());
        assert!(matches!(value, Value::Number(Number::Float(_))));
    }
}
