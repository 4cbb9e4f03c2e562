/// Errors raised while parsing label sets, durations, histograms and series
/// notation.
///
/// # Examples
///
/// ```rust
/// use rulecheck_common::error::ParseError;
///
/// let err = ParseError::InvalidDuration("5x".to_string());
/// assert!(err.to_string().contains("5x"));
/// ```
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum ParseError {
    /// The duration string does not follow the `1y2w3d4h5m6s7ms` grammar.
    #[error("not a valid duration string: {0:?}")]
    InvalidDuration(String),

    /// A metric descriptor such as `up{job="a"}` could not be parsed.
    #[error("invalid metric {input:?}: {message}")]
    InvalidMetric { input: String, message: String },

    /// A series value sequence contained an unparseable item.
    #[error("invalid series value {item:?}: {message}")]
    InvalidSeriesValue { item: String, message: String },

    /// A native histogram descriptor (`{{schema:0 ...}}`) was malformed.
    #[error("invalid histogram descriptor {input:?}: {message}")]
    InvalidHistogram { input: String, message: String },

    /// A regular expression in a label matcher failed to compile.
    #[error("invalid regular expression {pattern:?}: {message}")]
    InvalidRegex { pattern: String, message: String },

    /// A label name does not match `[a-zA-Z_][a-zA-Z0-9_]*`.
    #[error("invalid label name {0:?}")]
    InvalidLabelName(String),
}

/// Convenience `Result` alias for parsing operations.
pub type Result<T> = std::result::Result<T, ParseError>;
