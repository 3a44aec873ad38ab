//! Fixture loading from YAML files

use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

/// A single test case from a fixture file
#[derive(Debug, Clone, Deserialize)]
pub struct TestCase {
    pub id: String,
    pub desc: String,
    pub template: String,
    /// Context document; absent means `null`
    #[serde(default)]
    pub context: Option<serde_yaml::Value>,
    /// Other templates registered alongside, for `include`
    #[serde(default)]
    pub partials: BTreeMap<String, String>,
    #[serde(default)]
    pub options: CaseOptions,
    #[serde(flatten)]
    pub expect: Expected,
}

#[derive(Debug, Clone, Deserialize)]
pub struct CaseOptions {
    #[serde(default = "default_true")]
    pub autoescape: bool,
    #[serde(default)]
    pub max_include_depth: Option<usize>,
}

fn default_true() -> bool {
    true
}

impl Default for CaseOptions {
    fn default() -> Self {
        Self {
            autoescape: true,
            max_include_depth: None,
        }
    }
}

/// Either rendered output with its warnings, or a compile error
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum Expected {
    Output {
        output: String,
        /// Warning kinds in order, by `DiagnosticKind` name
        #[serde(default)]
        diagnostics: Vec<String>,
    },
    Error {
        error: String,
    },
}

impl TestCase {
    /// Context rendered back to YAML text, so it goes through
    /// `Value::from_yaml` like any caller's input.
    pub fn context_yaml(&self) -> String {
        match &self.context {
            Some(value) => serde_yaml::to_string(value)
                .unwrap_or_else(|e| panic!("{}: bad context: {}", self.id, e)),
            None => "null".to_string(),
        }
    }
}

/// Load all test cases from a YAML fixture file
pub fn load_fixtures(path: &Path) -> Vec<TestCase> {
    let content = std::fs::read_to_string(path)
        .unwrap_or_else(|e| panic!("Failed to read fixture file {:?}: {}", path, e));
    serde_yaml::from_str(&content)
        .unwrap_or_else(|e| panic!("Failed to parse fixture file {:?}: {}", path, e))
}

/// Load fixtures from the standard fixtures directory
pub fn load_fixtures_by_name(name: &str) -> Vec<TestCase> {
    let path = Path::new(env!("CARGO_MANIFEST_DIR"))
        .join("tests")
        .join("fixtures")
        .join(format!("{}.yaml", name));
    load_fixtures(&path)
}
