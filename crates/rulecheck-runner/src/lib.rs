//! Unit tests for alerting and recording rules.
//!
//! A unit-test file names rule files, declares synthetic input series and
//! lists the alerts and expression results expected at given instants.
//! [`runner::Runner`] replays rule evaluation over a virtual timeline for
//! each test group and compares what fired and what the expressions returned
//! with what was expected.

pub mod collector;
pub mod compare;
pub mod config;
pub mod diff;
pub mod error;
pub mod expectations;
pub mod failure;
pub mod junit;
pub mod probe;
pub mod runner;
pub mod scheduler;
pub mod timeline;

#[cfg(test)]
mod tests;

pub use config::{RunOptions, UnitTestFile};
pub use error::{Result, UnitTestError};
pub use failure::{CaseReport, FileReport};
pub use runner::Runner;
