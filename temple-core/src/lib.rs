//! Temple Core
//!
//! Template engine: compiles template text into an immutable syntax tree and
//! renders it against structured context data (JSON, YAML, `key=value`).
//!
//! # Architecture
//!
//! - **lexer.rs** - Lazy token stream, whitespace control, comments
//! - **parser.rs** - Recursive descent into the AST, fail-fast
//! - **eval.rs** / **render.rs** - Expression evaluation and tree walk
//! - **escape.rs** - Output escaping policy
//! - **diagnostic.rs** - Positioned errors/warnings, crate `Error`
//! - **value.rs** - Context value model
//!
//! # Example
//!
//! ```
//! let template = temple_core::compile("Hello {{ name }}!").unwrap();
//! let context = temple_core::Value::from_json(br#"{"name": "World"}"#).unwrap();
//! let rendered = template.render(&context);
//! assert_eq!(rendered.output, "Hello World!");
//! assert!(rendered.is_clean());
//! ```

pub mod ast;
pub mod config;
pub mod diagnostic;
pub mod environment;
pub mod escape;
pub mod eval;
pub mod filters;
pub mod lexer;
pub mod parser;
mod render;
pub mod scope;
pub mod span;
pub mod template;
pub mod token;
pub mod value;

pub use config::{RenderOptions, Syntax};
pub use diagnostic::{Diagnostic, DiagnosticKind, Error, Result, Severity};
pub use environment::Environment;
pub use escape::{escape, escape_into, EscapeMode};
pub use lexer::{tokenize, Lexer};
pub use span::{LineIndex, Location, Span};
pub use template::{compile, Rendered, Template};
pub use value::{ContextFormat, Map, Number, Value};
