use crate::compare::ParsedSample;
use crate::config::ExpectedSample;
use crate::error::{Result, UnitTestError};
use rulecheck_common::duration::ModelDuration;
use rulecheck_common::labels::Labels;
use rulecheck_common::series::{parse_metric, parse_series_desc};
use rulecheck_common::types::Timestamp;
use rulecheck_query::{QueryEngine, Value};

/// Runs `expr` as an instant query at `start + eval_time`.
///
/// A scalar result becomes one sample with no labels. Any other non-vector
/// result is an error.
pub fn probe(
    engine: &dyn QueryEngine,
    expr: &str,
    start: Timestamp,
    eval_time: ModelDuration,
) -> Result<Vec<ParsedSample>> {
    let ts = start.saturating_add(eval_time.as_millis());
    let value = engine
        .instant_query(expr, ts)
        .map_err(|e| UnitTestError::Query {
            expr: expr.to_string(),
            time: eval_time,
            message: e.to_string(),
        })?;

    match value {
        Value::Vector(samples) => Ok(samples
            .into_iter()
            .map(|s| ParsedSample {
                histogram: s.h.as_ref().map(|h| h.test_expression()).unwrap_or_default(),
                labels: s.labels,
                value: s.f,
            })
            .collect()),
        Value::Scalar { v, .. } => Ok(vec![ParsedSample {
            labels: Labels::new(),
            value: v,
            histogram: String::new(),
        }]),
        Value::Matrix(_) | Value::String { .. } => Err(UnitTestError::QueryShape {
            expr: expr.to_string(),
            time: eval_time,
        }),
    }
}

/// Parses the expected samples of one expression test case.
///
/// The first unparseable entry fails the whole case.
pub fn parse_expected(expr: &str, eval_time: ModelDuration, samples: &[ExpectedSample]) -> Result<Vec<ParsedSample>> {
    samples
        .iter()
        .map(|s| {
            parse_sample(s).map_err(|message| {
                UnitTestError::Validation(format!(
                    "    expr: {expr:?}, time: {eval_time}, err: labels {:?}: {message}",
                    s.labels
                ))
            })
        })
        .collect()
}

fn parse_sample(sample: &ExpectedSample) -> std::result::Result<ParsedSample, String> {
    let labels = parse_metric(&sample.labels).map_err(|e| e.to_string())?;
    let histogram = if sample.histogram.is_empty() {
        String::new()
    } else {
        let (_, values) = parse_series_desc(&format!("{{}} {}", sample.histogram)).map_err(|e| e.to_string())?;
        match values.as_slice() {
            [value] => match &value.histogram {
                Some(h) => h.test_expression(),
                None => return Err(format!("expected histogram, got {}", value.value)),
            },
            _ => return Err(format!("expected 1 value, got {}", values.len())),
        }
    };
    Ok(ParsedSample {
        labels,
        value: sample.value,
        histogram,
    })
}
