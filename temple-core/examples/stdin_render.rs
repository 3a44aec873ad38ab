//! Render a template file against context read from stdin.
//!
//!     echo '{"name": "world"}' | cargo run --example stdin_render -- hello.tmpl json
//!
//! The format argument is `json`, `yaml` or `kv` (default `json`). Set
//! `RUST_LOG=temple_core=debug` to see compile and render spans.

use std::io::Read;
use std::process::ExitCode;
use temple_core::{ContextFormat, Environment, RenderOptions, Value};
use tracing_subscriber::EnvFilter;

fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env())
        .with_writer(std::io::stderr)
        .init();

    let mut args = std::env::args().skip(1);
    let Some(path) = args.next() else {
        eprintln!("usage: stdin_render <template> [json|yaml|kv]");
        return ExitCode::from(2);
    };
    let format = args
        .next()
        .and_then(|name| ContextFormat::from_name(&name))
        .unwrap_or(ContextFormat::Json);

    let source = std::fs::read_to_string(&path).unwrap();
    let mut input = Vec::new();
    std::io::stdin().read_to_end(&mut input).unwrap();

    let context = match Value::parse(format, &input) {
        Ok(context) => context,
        Err(err) => {
            eprintln!("{}", err);
            return ExitCode::FAILURE;
        }
    };

    let mut env = Environment::new().with_options(RenderOptions::new());
    if let Err(err) = env.add_template(path.as_str(), &source) {
        eprintln!("{}: {}", path, err);
        return ExitCode::FAILURE;
    }

    match env.render(&path, &context) {
        Ok(rendered) => {
            print!("{}", rendered.output);
            for diagnostic in &rendered.diagnostics {
                eprintln!("{}:{}", path, diagnostic);
            }
            ExitCode::SUCCESS
        }
        Err(err) => {
            eprintln!("{}", err);
            ExitCode::FAILURE
        }
    }
}
