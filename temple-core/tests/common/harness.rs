//! Test harness for running fixtures with stochastic variations

use crate::common::{Expected, Gen, TestCase};
use temple_core::{Environment, Error, RenderOptions, Value};

/// Name the case's own template is registered under
const MAIN: &str = "__main__";

/// Result of running a test
#[derive(Debug)]
pub struct TestResult {
    pub passed: bool,
    pub template: String,
    pub expected: String,
    pub actual: String,
    pub seed: u64,
    pub errors: Vec<String>,
}

/// What a render produced, flattened for comparison
#[derive(Debug, PartialEq)]
enum Outcome {
    Output { output: String, diagnostics: Vec<String> },
    Error(String),
}

impl std::fmt::Display for Outcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Outcome::Output { output, diagnostics } => write!(f, "{:?} {:?}", output, diagnostics),
            Outcome::Error(kind) => write!(f, "error {}", kind),
        }
    }
}

fn options(case: &TestCase) -> RenderOptions {
    let mut options = RenderOptions::new().with_autoescape(case.options.autoescape);
    if let Some(depth) = case.options.max_include_depth {
        options = options.with_max_include_depth(depth);
    }
    options
}

fn run(case: &TestCase, template: &str) -> Outcome {
    let context = Value::from_yaml(case.context_yaml().as_bytes())
        .unwrap_or_else(|e| panic!("{}: context: {}", case.id, e));

    let mut env = Environment::new().with_options(options(case));
    for (name, source) in &case.partials {
        env.add_template(name.as_str(), source)
            .unwrap_or_else(|e| panic!("{}: partial {}: {}", case.id, name, e));
    }

    if let Err(err) = env.add_template(MAIN, template) {
        return match err {
            Error::Syntax(diag) => Outcome::Error(format!("{:?}", diag.kind)),
            other => panic!("{}: unexpected error {}", case.id, other),
        };
    }

    match env.render(MAIN, &context) {
        Ok(rendered) => Outcome::Output {
            output: rendered.output,
            diagnostics: rendered.diagnostics.iter().map(|d| format!("{:?}", d.kind)).collect(),
        },
        Err(err) => panic!("{}: render failed: {}", case.id, err),
    }
}

fn expected(case: &TestCase, prefix: &str, suffix: &str) -> Outcome {
    match &case.expect {
        Expected::Output { output, diagnostics } => Outcome::Output {
            output: format!("{}{}{}", prefix, output, suffix),
            diagnostics: diagnostics.clone(),
        },
        Expected::Error { error } => Outcome::Error(error.clone()),
    }
}

fn check(case: &TestCase, template: String, expected: Outcome, seed: u64) -> TestResult {
    let actual = run(case, &template);
    let mut errors = Vec::new();
    if actual != expected {
        errors.push(format!("expected {}, got {}", expected, actual));
    }
    TestResult {
        passed: errors.is_empty(),
        template,
        expected: expected.to_string(),
        actual: actual.to_string(),
        seed,
        errors,
    }
}

/// Run a single test case (canonical, no variations)
pub fn run_test(case: &TestCase) -> TestResult {
    check(case, case.template.clone(), expected(case, "", ""), 0)
}

/// Run test with stochastic variations
///
/// Wraps the template in random literal text on either side (50% each).
/// Literal text passes through untouched, so the output must be wrapped the
/// same way and the warnings must not change. Cases that start or end with a
/// whitespace-trimming tag are not wrapped on that side, and compile-error
/// cases get no suffix since their template may end inside a tag.
pub fn run_with_variations(case: &TestCase, gen: &mut Gen) -> TestResult {
    let is_error = matches!(case.expect, Expected::Error { .. });
    let trims_left = case.template.starts_with("{{-") || case.template.starts_with("{%-");
    let trims_right = is_error || case.template.ends_with("-}}") || case.template.ends_with("-%}");

    let prefix = if !trims_left && gen.chance(0.5) { gen.literal_text() } else { String::new() };
    let suffix = if !trims_right && gen.chance(0.5) { gen.literal_text() } else { String::new() };

    let template = format!("{}{}{}", prefix, case.template, suffix);
    check(case, template, expected(case, &prefix, &suffix), gen.seed)
}

impl TestResult {
    /// Print detailed failure info
    pub fn print_failure(&self, case_id: &str) {
        eprintln!("\n=== FAILED: {} ===", case_id);
        eprintln!("Seed: {} (set TEMPLE_TEST_SEED={} to reproduce)", self.seed, self.seed);
        eprintln!("\nTemplate:\n{}", self.template);
        eprintln!("\nExpected: {}", self.expected);
        eprintln!("Actual:   {}", self.actual);
        eprintln!("\nErrors:");
        for e in &self.errors {
            eprintln!("  - {}", e);
        }
    }
}
