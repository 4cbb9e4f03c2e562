//! Expression engine for rule unit tests.
//!
//! [`QueryEngine`] is the seam the rule evaluator and the expression probes
//! call through. [`engine::Engine`] implements it over any
//! [`SeriesStore`](rulecheck_storage::SeriesStore) for a practical subset of
//! the PromQL language: selectors, operators with vector matching,
//! aggregations and the common functions.

pub mod ast;
pub mod engine;
pub mod error;
mod functions;
pub mod parser;
pub mod value;


use rulecheck_common::types::Timestamp;

pub use ast::Expr;
pub use engine::Engine;
pub use error::{QueryError, Result};
pub use parser::parse;
pub use value::Value;

/// Evaluates expressions at a single instant.
pub trait QueryEngine: Send + Sync {
    /// Evaluates an already parsed expression at `ts`.
    fn eval(&self, expr: &Expr, ts: Timestamp) -> Result<Value>;

    /// Parses `expr` and evaluates it at `ts`.
    fn instant_query(&self, expr: &str, ts: Timestamp) -> Result<Value> {
        let parsed = parse(expr)?;
        self.eval(&parsed, ts)
    }
}
