//! Context values.
//!
//! Context data is dynamically typed (it usually comes from JSON), so it is
//! modeled as an explicit tagged union. Every consumer matches on all
//! variants; nothing sniffs types at runtime.

use indexmap::IndexMap;
use std::cmp::Ordering;
use std::fmt;

use crate::diagnostic::{Error, Result};

/// Mapping storage. Lookup by key, iteration in insertion order.
pub type Map = IndexMap<String, Value>;

/// A context value.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Value {
    /// `null`; renders as the empty string
    #[default]
    Null,

    Bool(bool),

    /// Integer or floating point number
    Number(Number),

    String(String),

    /// Ordered list: `[1, 2, 3]`
    Sequence(Vec<Value>),

    /// String-keyed map: `{"a": 1}`
    Mapping(Map),
}

/// Numeric value.
///
/// Integers are kept apart from floats so that `42` from JSON renders as
/// `42` rather than `42.0`.
#[derive(Debug, Clone, Copy)]
pub enum Number {
    Int(i64),
    Float(f64),
}

impl Number {
    #[inline]
    pub fn as_f64(self) -> f64 {
        match self {
            Number::Int(i) => i as f64,
            Number::Float(f) => f,
        }
    }

    #[inline]
    pub fn is_zero(self) -> bool {
        match self {
            Number::Int(i) => i == 0,
            Number::Float(f) => f == 0.0,
        }
    }
}

/// Exact ordering of an integer against a float. Going through `as f64`
/// would round integers above 2^53.
fn cmp_int_float(i: i64, f: f64) -> Option<Ordering> {
    // 2^63, the first float above every i64
    const LIMIT: f64 = 9_223_372_036_854_775_808.0;
    if f.is_nan() {
        return None;
    }
    if f >= LIMIT {
        return Some(Ordering::Less);
    }
    if f < -LIMIT {
        return Some(Ordering::Greater);
    }
    // in range, so the truncated float converts exactly
    let whole = f.trunc() as i64;
    Some(i.cmp(&whole).then_with(|| 0.0_f64.partial_cmp(&f.fract()).unwrap_or(Ordering::Equal)))
}

impl PartialEq for Number {
    fn eq(&self, other: &Self) -> bool {
        self.partial_cmp(other) == Some(Ordering::Equal)
    }
}

impl PartialOrd for Number {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        match (*self, *other) {
            (Number::Int(a), Number::Int(b)) => Some(a.cmp(&b)),
            (Number::Int(a), Number::Float(b)) => cmp_int_float(a, b),
            (Number::Float(a), Number::Int(b)) => cmp_int_float(b, a).map(Ordering::reverse),
            (Number::Float(a), Number::Float(b)) => a.partial_cmp(&b),
        }
    }
}

impl fmt::Display for Number {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            Number::Int(i) => write!(f, "{}", i),
            // Keep a visible fraction on whole floats: 2.0 stays "2.0"
            Number::Float(v) if v.is_finite() && v.fract() == 0.0 && v.abs() < 1e16 => {
                write!(f, "{:.1}", v)
            }
            Number::Float(v) => write!(f, "{}", v),
        }
    }
}

impl Value {
    /// Check if this is a null value.
    #[inline]
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Try to get as boolean.
    #[inline]
    pub fn as_bool(&self) -> Option<bool> {
        match self {
            Value::Bool(b) => Some(*b),
            _ => None,
        }
    }

    /// Try to get as number.
    #[inline]
    pub fn as_number(&self) -> Option<Number> {
        match self {
            Value::Number(n) => Some(*n),
            _ => None,
        }
    }

    /// Try to get as string slice.
    #[inline]
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Value::String(s) => Some(s),
            _ => None,
        }
    }

    #[inline]
    pub fn as_sequence(&self) -> Option<&[Value]> {
        match self {
            Value::Sequence(items) => Some(items),
            _ => None,
        }
    }

    #[inline]
    pub fn as_mapping(&self) -> Option<&Map> {
        match self {
            Value::Mapping(map) => Some(map),
            _ => None,
        }
    }

    /// Scalars are everything except sequences and mappings.
    pub fn is_scalar(&self) -> bool {
        !matches!(self, Value::Sequence(_) | Value::Mapping(_))
    }

    /// Truthiness used by `if`, `and`, `or` and `not`.
    ///
    /// Falsy: `null`, `false`, numeric zero, `""`, `[]`, `{}`.
    pub fn is_truthy(&self) -> bool {
        match self {
            Value::Null => false,
            Value::Bool(b) => *b,
            Value::Number(n) => !n.is_zero(),
            Value::String(s) => !s.is_empty(),
            Value::Sequence(items) => !items.is_empty(),
            Value::Mapping(map) => !map.is_empty(),
        }
    }

    /// Short type name for diagnostics.
    pub fn type_name(&self) -> &'static str {
        match self {
            Value::Null => "null",
            Value::Bool(_) => "bool",
            Value::Number(Number::Int(_)) => "integer",
            Value::Number(Number::Float(_)) => "float",
            Value::String(_) => "string",
            Value::Sequence(_) => "sequence",
            Value::Mapping(_) => "mapping",
        }
    }

    /// Look up a mapping key.
    pub fn get(&self, key: &str) -> Option<&Value> {
        match self {
            Value::Mapping(map) => map.get(key),
            _ => None,
        }
    }

    /// Look up a sequence index.
    pub fn get_index(&self, index: usize) -> Option<&Value> {
        match self {
            Value::Sequence(items) => items.get(index),
            _ => None,
        }
    }

    /// Number of items in a sequence, entries in a mapping or chars in a string.
    pub fn len(&self) -> Option<usize> {
        match self {
            Value::String(s) => Some(s.chars().count()),
            Value::Sequence(items) => Some(items.len()),
            Value::Mapping(map) => Some(map.len()),
            Value::Null | Value::Bool(_) | Value::Number(_) => None,
        }
    }

    /// Decode a single JSON document.
    pub fn from_json(bytes: &[u8]) -> Result<Value> {
        serde_json::from_slice::<serde_json::Value>(bytes)
            .map(Value::from)
            .map_err(|e| Error::InvalidContext {
                format: "json",
                message: e.to_string(),
            })
    }

    /// Decode a single YAML document.
    ///
    /// Scalar mapping keys are stringified; sequence or mapping keys are
    /// rejected.
    pub fn from_yaml(bytes: &[u8]) -> Result<Value> {
        let doc: serde_yaml::Value =
            serde_yaml::from_slice(bytes).map_err(|e| Error::InvalidContext {
                format: "yaml",
                message: e.to_string(),
            })?;
        from_yaml_value(doc)
    }

    /// Parse `key=value` lines into a mapping of strings.
    ///
    /// Keys and values are trimmed; lines without `=` are ignored. Later
    /// duplicates win.
    pub fn from_kv(text: &str) -> Value {
        let mut map = Map::new();
        for line in text.lines() {
            if let Some((k, v)) = line.split_once('=') {
                map.insert(k.trim().to_string(), Value::String(v.trim().to_string()));
            }
        }
        Value::Mapping(map)
    }

    /// The process environment as a mapping of strings, sorted by name.
    pub fn from_env() -> Value {
        Self::from_vars(std::env::vars())
    }

    fn from_vars(vars: impl IntoIterator<Item = (String, String)>) -> Value {
        let mut map: Map = vars.into_iter().map(|(k, v)| (k, Value::String(v))).collect();
        map.sort_keys();
        Value::Mapping(map)
    }

    /// Decode context data in the given format.
    pub fn parse(format: ContextFormat, bytes: &[u8]) -> Result<Value> {
        match format {
            ContextFormat::Json => Value::from_json(bytes),
            ContextFormat::Yaml => Value::from_yaml(bytes),
            ContextFormat::Kv => std::str::from_utf8(bytes)
                .map(Value::from_kv)
                .map_err(|e| Error::InvalidContext {
                    format: "kv",
                    message: e.to_string(),
                }),
        }
    }
}

/// Context input formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ContextFormat {
    Json,
    Yaml,
    Kv,
}

impl ContextFormat {
    /// Format by name (`json`, `yaml`/`yml`, `kv`), case-insensitive.
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_ascii_lowercase().as_str() {
            "json" => Some(Self::Json),
            "yaml" | "yml" => Some(Self::Yaml),
            "kv" => Some(Self::Kv),
            _ => None,
        }
    }

    /// Guess from a file extension. Only structured formats are guessed.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match Self::from_name(ext)? {
            Self::Kv => None,
            format => Some(format),
        }
    }

    pub fn name(self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Yaml => "yaml",
            Self::Kv => "kv",
        }
    }
}

fn from_yaml_value(value: serde_yaml::Value) -> Result<Value> {
    use serde_yaml::Value as Yaml;

    Ok(match value {
        Yaml::Null => Value::Null,
        Yaml::Bool(b) => Value::Bool(b),
        Yaml::Number(n) => match n.as_i64() {
            Some(i) => Value::Number(Number::Int(i)),
            None => Value::Number(Number::Float(n.as_f64().unwrap_or(f64::NAN))),
        },
        Yaml::String(s) => Value::String(s),
        Yaml::Sequence(items) => Value::Sequence(
            items
                .into_iter()
                .map(from_yaml_value)
                .collect::<Result<Vec<_>>>()?,
        ),
        Yaml::Mapping(mapping) => {
            let mut map = Map::with_capacity(mapping.len());
            for (k, v) in mapping {
                let key = match k {
                    Yaml::String(s) => s,
                    Yaml::Bool(b) => b.to_string(),
                    Yaml::Number(n) => n.to_string(),
                    Yaml::Null => "null".to_string(),
                    other => {
                        return Err(Error::InvalidContext {
                            format: "yaml",
                            message: format!("unsupported mapping key: {:?}", other),
                        })
                    }
                };
                map.insert(key, from_yaml_value(v)?);
            }
            Value::Mapping(map)
        }
        Yaml::Tagged(tagged) => from_yaml_value(tagged.value)?,
    })
}

impl From<serde_json::Value> for Value {
    fn from(value: serde_json::Value) -> Self {
        use serde_json::Value as Json;

        match value {
            Json::Null => Value::Null,
            Json::Bool(b) => Value::Bool(b),
            Json::Number(n) => match n.as_i64() {
                Some(i) => Value::Number(Number::Int(i)),
                None => Value::Number(Number::Float(n.as_f64().unwrap_or(f64::NAN))),
            },
            Json::String(s) => Value::String(s),
            Json::Array(items) => Value::Sequence(items.into_iter().map(Value::from).collect()),
            Json::Object(obj) => {
                Value::Mapping(obj.into_iter().map(|(k, v)| (k, Value::from(v))).collect())
            }
        }
    }
}

impl From<&Value> for serde_json::Value {
    fn from(value: &Value) -> Self {
        use serde_json::Value as Json;

        match value {
            Value::Null => Json::Null,
            Value::Bool(b) => Json::Bool(*b),
            Value::Number(Number::Int(i)) => Json::from(*i),
            Value::Number(Number::Float(f)) => {
                serde_json::Number::from_f64(*f).map(Json::Number).unwrap_or(Json::Null)
            }
            Value::String(s) => Json::String(s.clone()),
            Value::Sequence(items) => Json::Array(items.iter().map(Json::from).collect()),
            Value::Mapping(map) => {
                Json::Object(map.iter().map(|(k, v)| (k.clone(), Json::from(v))).collect())
            }
        }
    }
}

/// Canonical text form.
///
/// Scalars render bare (`null` as nothing); sequences and mappings render as
/// compact JSON in insertion order.
impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Value::Null => Ok(()),
            Value::Bool(b) => write!(f, "{}", b),
            Value::Number(n) => write!(f, "{}", n),
            Value::String(s) => f.write_str(s),
            Value::Sequence(_) | Value::Mapping(_) => {
                write!(f, "{}", serde_json::Value::from(self))
            }
        }
    }
}

impl From<bool> for Value {
    fn from(b: bool) -> Self {
        Value::Bool(b)
    }
}

impl From<i64> for Value {
    fn from(i: i64) -> Self {
        Value::Number(Number::Int(i))
    }
}

impl From<i32> for Value {
    fn from(i: i32) -> Self {
        Value::Number(Number::Int(i as i64))
    }
}

impl From<usize> for Value {
    fn from(i: usize) -> Self {
        match i64::try_from(i) {
            Ok(i) => Value::Number(Number::Int(i)),
            Err(_) => Value::Number(Number::Float(i as f64)),
        }
    }
}

impl From<f64> for Value {
    fn from(f: f64) -> Self {
        Value::Number(Number::Float(f))
    }
}

impl From<&str> for Value {
    fn from(s: &str) -> Self {
        Value::String(s.to_string())
    }
}

impl From<String> for Value {
    fn from(s: String) -> Self {
        Value::String(s)
    }
}

impl<T: Into<Value>> From<Vec<T>> for Value {
    fn from(items: Vec<T>) -> Self {
        Value::Sequence(items.into_iter().map(Into::into).collect())
    }
}

impl<T: Into<Value>> From<Option<T>> for Value {
    fn from(opt: Option<T>) -> Self {
        opt.map(Into::into).unwrap_or(Value::Null)
    }
}

impl From<Map> for Value {
    fn from(map: Map) -> Self {
        Value::Mapping(map)
    }
}

impl<K: Into<String>, V: Into<Value>> FromIterator<(K, V)> for Value {
    fn from_iter<I: IntoIterator<Item = (K, V)>>(iter: I) -> Self {
        Value::Mapping(iter.into_iter().map(|(k, v)| (k.into(), v.into())).collect())
    }
}
