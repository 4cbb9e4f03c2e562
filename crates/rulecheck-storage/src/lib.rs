//! Time-series storage for rule unit tests.
//!
//! [`SeriesStore`] is the seam the query engine and rule evaluator read from
//! and write to. [`memory::MemoryStore`] keeps everything in memory for the
//! lifetime of one test group, and [`loader::LazyLoader`] reveals declared
//! input series to it step by step so evaluation never sees future data.

pub mod error;
pub mod loader;
pub mod memory;

#[cfg(test)]
mod tests;

use rulecheck_common::labels::Labels;
use rulecheck_common::matcher::LabelMatcher;
use rulecheck_common::types::{Point, Series, Timestamp};

pub use error::{Result, StorageError};

/// Append and select access to a set of labelled series.
///
/// Implementations must be safe to share across threads (`Send + Sync`)
/// because the query engine and the rule groups hold the same store.
pub trait SeriesStore: Send + Sync {
    /// Appends one point to the series identified by `labels`, creating the
    /// series on first use. Points must arrive in timestamp order per series.
    fn append(&self, labels: &Labels, point: Point) -> Result<()>;

    /// Returns every series matching all `matchers` that has at least one
    /// point in the closed range `[mint, maxt]`, with only those points.
    fn select(&self, matchers: &[LabelMatcher], mint: Timestamp, maxt: Timestamp) -> Vec<Series>;

    /// Number of series currently held.
    fn series_count(&self) -> usize;

    /// Drops all data.
    fn clear(&self);
}
