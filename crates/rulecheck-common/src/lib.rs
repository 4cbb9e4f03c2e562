//! Shared model for the rulecheck workspace.
//!
//! Label sets, label matchers, Prometheus-style durations, native float
//! histograms and the compact series notation used to declare input data in
//! rule unit tests all live here so that the storage, query, alerting and
//! runner crates agree on one representation.

pub mod duration;
pub mod error;
pub mod format;
pub mod histogram;
pub mod labels;
pub mod matcher;
pub mod series;
pub mod types;

#[cfg(test)]
mod tests;
