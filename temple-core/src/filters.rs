//! Built-in filters.
//!
//! The filter set is closed: names are resolved at compile time through a
//! static table, so an unknown filter never reaches the renderer.

use std::borrow::Cow;

use crate::escape::{escape, EscapeMode};
use crate::value::Value;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Filter {
    /// Mark output as trusted markup (`raw`, `safe`)
    Raw,
    /// HTML-escape now, whatever the render escape mode (`escape`, `e`)
    Escape,
    Upper,
    Lower,
    Trim,
    Length,
    First,
    Last,
    /// `join(sep)`; `sep` defaults to the empty string
    Join,
    /// `default(value)`: replace `null`
    Default,
    /// Compact JSON text of any value
    Json,
}

static FILTERS: phf::Map<&'static str, Filter> = phf::phf_map! {
    "raw" => Filter::Raw,
    "safe" => Filter::Raw,
    "escape" => Filter::Escape,
    "e" => Filter::Escape,
    "upper" => Filter::Upper,
    "lower" => Filter::Lower,
    "trim" => Filter::Trim,
    "length" => Filter::Length,
    "first" => Filter::First,
    "last" => Filter::Last,
    "join" => Filter::Join,
    "default" => Filter::Default,
    "json" => Filter::Json,
};

impl Filter {
    #[inline]
    pub fn lookup(name: &str) -> Option<Filter> {
        FILTERS.get(name).copied()
    }

    pub fn name(self) -> &'static str {
        match self {
            Filter::Raw => "raw",
            Filter::Escape => "escape",
            Filter::Upper => "upper",
            Filter::Lower => "lower",
            Filter::Trim => "trim",
            Filter::Length => "length",
            Filter::First => "first",
            Filter::Last => "last",
            Filter::Join => "join",
            Filter::Default => "default",
            Filter::Json => "json",
        }
    }

    /// Accepted argument count, inclusive.
    pub fn arity(self) -> (usize, usize) {
        match self {
            Filter::Join => (0, 1),
            Filter::Default => (1, 1),
            _ => (0, 0),
        }
    }

    /// Output of this filter must not be escaped again.
    pub fn marks_safe(self) -> bool {
        matches!(self, Filter::Raw | Filter::Escape)
    }

    /// Apply to `value`. On a type error returns the message for a
    /// `TypeMismatch` diagnostic.
    pub fn apply<'v>(self, value: Cow<'v, Value>, args: &[Value]) -> Result<Cow<'v, Value>, String> {
        match self {
            Filter::Raw => Ok(value),
            Filter::Escape => match value.as_ref() {
                v if v.is_scalar() => owned(Value::String(escape(&v.to_string(), EscapeMode::Html).into_owned())),
                v => Err(self.expected("a scalar", v)),
            },
            Filter::Upper => self.map_str(&value, str::to_uppercase),
            Filter::Lower => self.map_str(&value, str::to_lowercase),
            Filter::Trim => self.map_str(&value, |s| s.trim().to_string()),
            Filter::Length => match value.len() {
                Some(len) => owned(Value::from(len)),
                None => Err(self.expected("a string, sequence or mapping", &value)),
            },
            Filter::First | Filter::Last => self.pick_end(value),
            Filter::Join => {
                let sep = match args.first() {
                    None => "",
                    Some(Value::String(s)) => s.as_str(),
                    Some(other) => {
                        return Err(format!(
                            "`join` separator must be a string, found {}",
                            other.type_name()
                        ))
                    }
                };
                match value.as_sequence() {
                    Some(items) => {
                        let joined = items.iter().map(Value::to_string).collect::<Vec<_>>().join(sep);
                        owned(Value::String(joined))
                    }
                    None => Err(self.expected("a sequence", &value)),
                }
            }
            Filter::Default => match (value.is_null(), args.first()) {
                (true, Some(fallback)) => owned(fallback.clone()),
                _ => Ok(value),
            },
            Filter::Json => owned(Value::String(serde_json::Value::from(value.as_ref()).to_string())),
        }
    }

    fn map_str<'v>(self, value: &Value, f: impl FnOnce(&str) -> String) -> Result<Cow<'v, Value>, String> {
        match value {
            Value::String(s) => Ok(Cow::Owned(Value::String(f(s)))),
            other => Err(self.expected("a string", other)),
        }
    }

    /// `first`/`last`: a sequence element or a string's first/last char.
    /// Borrowed input yields a borrowed element.
    fn pick_end<'v>(self, value: Cow<'v, Value>) -> Result<Cow<'v, Value>, String> {
        let last = self == Filter::Last;
        match value {
            Cow::Borrowed(Value::Sequence(items)) => {
                let item = if last { items.last() } else { items.first() };
                Ok(item.map_or(Cow::Owned(Value::Null), Cow::Borrowed))
            }
            Cow::Owned(Value::Sequence(mut items)) => {
                let item = if last { items.pop() } else { items.into_iter().next() };
                owned(item.unwrap_or_default())
            }
            other => match other.as_str() {
                Some(s) => {
                    let ch = if last { s.chars().next_back() } else { s.chars().next() };
                    owned(ch.map_or(Value::Null, |c| Value::String(c.to_string())))
                }
                None => Err(self.expected("a sequence or string", &other)),
            },
        }
    }

    fn expected(self, what: &str, found: &Value) -> String {
        format!("`{}` expects {}, found {}", self.name(), what, found.type_name())
    }
}

#[inline]
fn owned<'v>(value: Value) -> Result<Cow<'v, Value>, String> {
    Ok(Cow::Owned(value))
}
