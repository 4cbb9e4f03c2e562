use crate::alerting::AlertingRule;
use crate::error::{AlertError, Result};
use crate::recording::RecordingRule;
use rulecheck_common::labels::Labels;
use rulecheck_common::types::{Sample, Timestamp};
use rulecheck_query::{Expr, QueryEngine, Value};

/// A rule of either kind. Alerting-only operations go through
/// [`Rule::as_alerting`].
#[derive(Debug)]
pub enum Rule {
    Alerting(AlertingRule),
    Recording(RecordingRule),
}

impl Rule {
    pub fn name(&self) -> &str {
        match self {
            Self::Alerting(r) => r.name(),
            Self::Recording(r) => r.name(),
        }
    }

    pub fn expr_text(&self) -> &str {
        match self {
            Self::Alerting(r) => r.expr_text(),
            Self::Recording(r) => r.expr_text(),
        }
    }

    /// Error from the most recent evaluation, if it failed.
    pub fn last_error(&self) -> Option<&AlertError> {
        match self {
            Self::Alerting(r) => r.last_error(),
            Self::Recording(r) => r.last_error(),
        }
    }

    pub(crate) fn set_last_error(&mut self, err: Option<AlertError>) {
        match self {
            Self::Alerting(r) => r.set_last_error(err),
            Self::Recording(r) => r.set_last_error(err),
        }
    }

    pub fn as_alerting(&self) -> Option<&AlertingRule> {
        match self {
            Self::Alerting(r) => Some(r),
            Self::Recording(_) => None,
        }
    }

    pub fn as_alerting_mut(&mut self) -> Option<&mut AlertingRule> {
        match self {
            Self::Alerting(r) => Some(r),
            Self::Recording(_) => None,
        }
    }

    pub fn eval(&mut self, ts: Timestamp, engine: &dyn QueryEngine) -> Result<Vec<Sample>> {
        match self {
            Self::Alerting(r) => r.eval(ts, engine),
            Self::Recording(r) => r.eval(ts, engine),
        }
    }
}

/// Runs `expr` and coerces a scalar result into a single unlabelled sample.
pub(crate) fn query_vector(engine: &dyn QueryEngine, expr: &Expr, ts: Timestamp) -> Result<Vec<Sample>> {
    match engine.eval(expr, ts)? {
        Value::Vector(samples) => Ok(samples),
        Value::Scalar { v, .. } => Ok(vec![Sample::float(Labels::new(), ts, v)]),
        Value::Matrix(_) | Value::String { .. } => Err(AlertError::ResultType),
    }
}
