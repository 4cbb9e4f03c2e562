use crate::diff::json_diff;
use crate::error::{Result, UnitTestError};
use rulecheck_common::format::format_float_exp;
use rulecheck_common::labels::Labels;
use serde::Serialize;
use std::fmt;

/// The comparable part of one alert.
#[derive(Debug, Clone, Default, PartialEq, Eq, PartialOrd, Ord, Serialize)]
pub struct LabelAndAnnotation {
    #[serde(rename = "Labels")]
    pub labels: Labels,
    #[serde(rename = "Annotations")]
    pub annotations: Labels,
}

impl fmt::Display for LabelAndAnnotation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Labels:{}\nAnnotations:{}", self.labels, self.annotations)
    }
}

/// A list of alerts, sorted by labels then annotations before comparing.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(transparent)]
pub struct LabelsAndAnnotations(Vec<LabelAndAnnotation>);

impl LabelsAndAnnotations {
    pub fn push(&mut self, item: LabelAndAnnotation) {
        self.0.push(item);
    }

    pub fn len(&self) -> usize {
        self.0.len()
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }

    pub fn sort(&mut self) {
        self.0.sort();
    }

    /// `self`, or a single empty entry when `self` is empty, so a structured
    /// diff always has two documents of the same shape.
    fn or_placeholder(&self) -> Self {
        if self.is_empty() {
            Self(vec![LabelAndAnnotation::default()])
        } else {
            self.clone()
        }
    }
}

impl FromIterator<LabelAndAnnotation> for LabelsAndAnnotations {
    fn from_iter<T: IntoIterator<Item = LabelAndAnnotation>>(iter: T) -> Self {
        Self(iter.into_iter().collect())
    }
}

impl fmt::Display for LabelsAndAnnotations {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.0.is_empty() {
            return f.write_str("[]");
        }
        f.write_str("[\n")?;
        for (i, item) in self.0.iter().enumerate() {
            if i > 0 {
                f.write_str(",\n")?;
            }
            write!(f, "{i}:{}", indent_lines(&format!("\n{item}"), "  "))?;
        }
        f.write_str("\n]")
    }
}

/// Prefixes every line but the first with `indent`.
pub fn indent_lines(text: &str, indent: &str) -> String {
    text.split('\n').collect::<Vec<_>>().join(&format!("\n{indent}"))
}

/// How sample values are compared.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum FloatCompare {
    #[default]
    Exact,
    /// Also accept the adjacent representable value in either direction.
    Fuzzy,
}

impl FloatCompare {
    pub fn equal(self, x: f64, y: f64) -> bool {
        if x == y {
            return true;
        }
        match self {
            Self::Exact => false,
            Self::Fuzzy => next_toward(x, false) == y || next_toward(x, true) == y,
        }
    }
}

/// The next representable value after `x`, upwards or downwards.
pub fn next_toward(x: f64, up: bool) -> f64 {
    if x.is_nan() {
        return x;
    }
    if x == 0.0 {
        let tiny = f64::from_bits(1);
        return if up { tiny } else { -tiny };
    }
    let away_from_zero = (x > 0.0) == up;
    if x.is_infinite() && away_from_zero {
        return x;
    }
    let bits = x.to_bits();
    f64::from_bits(if away_from_zero { bits + 1 } else { bits - 1 })
}

/// A query result or expected sample reduced to what is compared.
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedSample {
    pub labels: Labels,
    pub value: f64,
    /// Canonical histogram description; empty for float samples.
    pub histogram: String,
}

impl ParsedSample {
    /// Histogram samples compare by description only; float samples by value.
    pub fn matches(&self, other: &ParsedSample, floats: FloatCompare) -> bool {
        if self.labels != other.labels {
            return false;
        }
        if !self.histogram.is_empty() || !other.histogram.is_empty() {
            return self.histogram == other.histogram;
        }
        floats.equal(self.value, other.value)
    }
}

impl fmt::Display for ParsedSample {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        if self.histogram.is_empty() {
            write!(f, "{} {}", self.labels, format_float_exp(self.value))
        } else {
            write!(f, "{} {}", self.labels, self.histogram)
        }
    }
}

/// Renders a list of samples on one line, or `nil` when empty.
pub fn samples_string(samples: &[ParsedSample]) -> String {
    if samples.is_empty() {
        return "nil".to_string();
    }
    samples
        .iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

/// Sorts both sides by labels and compares them element-wise.
pub fn samples_equal(expected: &mut [ParsedSample], got: &mut [ParsedSample], floats: FloatCompare) -> bool {
    expected.sort_by(|a, b| a.labels.cmp(&b.labels));
    got.sort_by(|a, b| a.labels.cmp(&b.labels));
    expected.len() == got.len()
        && expected
            .iter()
            .zip(got.iter())
            .all(|(e, g)| e.matches(g, floats))
}

/// The body of a mismatch report.
#[derive(Debug, Clone, PartialEq)]
pub enum MismatchDetail {
    /// Both sides rendered in full.
    Text { expected: String, got: String },
    /// A structured diff from expected to got.
    Diff(String),
}

/// Turns an alert mismatch into a report body.
pub trait AlertRenderer {
    /// Returns `None` when the renderer finds nothing to report.
    fn render(&self, expected: &LabelsAndAnnotations, got: &LabelsAndAnnotations) -> Result<Option<MismatchDetail>>;
}

/// Renders each side as an indented list.
#[derive(Debug, Default)]
pub struct TextRenderer;

impl AlertRenderer for TextRenderer {
    fn render(&self, expected: &LabelsAndAnnotations, got: &LabelsAndAnnotations) -> Result<Option<MismatchDetail>> {
        Ok(Some(MismatchDetail::Text {
            expected: expected.to_string(),
            got: got.to_string(),
        }))
    }
}

/// Renders a JSON diff between the two sides.
#[derive(Debug, Default)]
pub struct JsonDiffRenderer {
    /// Test group name used in serialization errors.
    pub group: String,
}

impl AlertRenderer for JsonDiffRenderer {
    fn render(&self, expected: &LabelsAndAnnotations, got: &LabelsAndAnnotations) -> Result<Option<MismatchDetail>> {
        let exp_json = serde_json::to_value(expected.or_placeholder()).map_err(|source| UnitTestError::Json {
            side: "expected",
            group: self.group.clone(),
            source,
        })?;
        let got_json = serde_json::to_value(got.or_placeholder()).map_err(|source| UnitTestError::Json {
            side: "received",
            group: self.group.clone(),
            source,
        })?;
        Ok(json_diff(&exp_json, &got_json).map(MismatchDetail::Diff))
    }
}

/// Sorts both sides and reports a mismatch through `renderer`.
pub fn compare_alerts(
    expected: &mut LabelsAndAnnotations,
    got: &mut LabelsAndAnnotations,
    renderer: &dyn AlertRenderer,
) -> Result<Option<MismatchDetail>> {
    expected.sort();
    got.sort();
    if expected == got {
        return Ok(None);
    }
    renderer.render(expected, got)
}
