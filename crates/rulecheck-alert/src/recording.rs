use crate::error::{AlertError, Result};
use crate::rule::query_vector;
use rulecheck_common::labels::{Labels, METRIC_NAME};
use rulecheck_common::types::{Sample, Timestamp};
use rulecheck_query::{Expr, QueryEngine};
use std::collections::HashSet;

/// A rule that stores the result of its expression under a new metric name.
#[derive(Debug)]
pub struct RecordingRule {
    name: String,
    expr: Expr,
    expr_text: String,
    labels: Labels,
    limit: usize,
    last_error: Option<AlertError>,
}

impl RecordingRule {
    pub fn new(name: impl Into<String>, expr: Expr, expr_text: impl Into<String>, labels: Labels) -> Self {
        Self {
            name: name.into(),
            expr,
            expr_text: expr_text.into(),
            labels,
            limit: 0,
            last_error: None,
        }
    }

    /// Caps the number of produced series; 0 disables the cap.
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn expr_text(&self) -> &str {
        &self.expr_text
    }

    pub fn last_error(&self) -> Option<&AlertError> {
        self.last_error.as_ref()
    }

    pub(crate) fn set_last_error(&mut self, err: Option<AlertError>) {
        self.last_error = err;
    }

    pub fn eval(&self, ts: Timestamp, engine: &dyn QueryEngine) -> Result<Vec<Sample>> {
        let mut samples = query_vector(engine, &self.expr, ts)?;
        let mut seen = HashSet::with_capacity(samples.len());
        for sample in &mut samples {
            sample.labels.set(METRIC_NAME, self.name.clone());
            for label in self.labels.iter() {
                sample.labels.set(label.name.clone(), label.value.clone());
            }
            if !seen.insert(sample.labels.clone()) {
                return Err(AlertError::DuplicateLabelset("rule"));
            }
            sample.t = ts;
        }
        if self.limit > 0 && samples.len() > self.limit {
            return Err(AlertError::LimitExceeded {
                limit: self.limit,
                count: samples.len(),
                kind: "series",
            });
        }
        Ok(samples)
    }
}
