use rulecheck_common::format::format_float;
use rulecheck_common::types::{Sample, Series, Timestamp};
use std::fmt;

/// Result of evaluating an expression.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Vector(Vec<Sample>),
    Scalar { t: Timestamp, v: f64 },
    Matrix(Vec<Series>),
    String { t: Timestamp, s: String },
}

impl Value {
    /// Name of the value type as used in type errors.
    pub fn type_name(&self) -> &'static str {
        match self {
            Self::Vector(_) => "instant vector",
            Self::Scalar { .. } => "scalar",
            Self::Matrix(_) => "range vector",
            Self::String { .. } => "string",
        }
    }
}

impl fmt::Display for Value {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Vector(samples) => {
                for (i, s) in samples.iter().enumerate() {
                    if i > 0 {
                        f.write_str("\n")?;
                    }
                    write!(f, "{s}")?;
                }
                Ok(())
            }
            Self::Scalar { t, v } => write!(f, "scalar: {} @[{t}]", format_float(*v)),
            Self::Matrix(series) => {
                for (i, s) in series.iter().enumerate() {
                    if i > 0 {
                        f.write_str("\n")?;
                    }
                    write!(f, "{s}")?;
                }
                Ok(())
            }
            Self::String { t, s } => write!(f, "{s:?} @[{t}]"),
        }
    }
}
