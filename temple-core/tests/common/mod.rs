//! Test infrastructure for the template engine
//!
//! Provides fixture loading, stochastic test variations, and assertion helpers.

#![allow(dead_code)]

mod generators;
mod harness;
mod loader;

pub use generators::Gen;
pub use harness::{run_test, run_with_variations};
pub use loader::{load_fixtures_by_name, Expected, TestCase};
