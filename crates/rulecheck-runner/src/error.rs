use rulecheck_alert::AlertError;
use rulecheck_common::duration::ModelDuration;
use rulecheck_storage::StorageError;

/// Errors raised while running rule unit tests.
///
/// Variants that end up in a test group's failure list render in the
/// indented form printed under `FAILED:`, so they carry no prefix.
///
/// # Examples
///
/// ```rust
/// use rulecheck_common::duration::ModelDuration;
/// use rulecheck_runner::error::UnitTestError;
///
/// let err = UnitTestError::Evaluation {
///     rule: "JobDown".into(),
///     time: ModelDuration::from_mins(2),
///     message: "boom".into(),
/// };
/// assert_eq!(err.to_string(), "    rule: JobDown, time: 2m, err: boom");
/// ```
#[derive(Debug, thiserror::Error)]
pub enum UnitTestError {
    /// Timeline parameters are unusable.
    #[error("{0}")]
    Configuration(String),

    /// Expectation data is malformed.
    #[error("{0}")]
    Validation(String),

    /// A rule reported an error during evaluation; the timeline stops.
    #[error("    rule: {rule}, time: {time}, err: {message}")]
    Evaluation {
        rule: String,
        time: ModelDuration,
        message: String,
    },

    /// An expression probe returned neither a vector nor a scalar.
    #[error("    expr: {expr:?}, time: {time}, err: rule result is not a vector or scalar")]
    QueryShape { expr: String, time: ModelDuration },

    /// The expression engine rejected or failed an expression probe.
    #[error("    expr: {expr:?}, time: {time}, err: {message}")]
    Query {
        expr: String,
        time: ModelDuration,
        message: String,
    },

    /// Input series could not be parsed or revealed to the store.
    #[error("{0}")]
    Load(#[from] StorageError),

    #[error("reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    #[error("{path}: {message}")]
    Yaml { path: String, message: String },

    #[error("invalid rule file pattern {pattern:?}: {message}")]
    Glob { pattern: String, message: String },

    /// A rule file failed to load or validate.
    #[error("{0}")]
    RuleFiles(#[from] AlertError),

    /// Alerts could not be serialized for the structured diff.
    #[error("error marshaling {side} {group} alert: [{source}]")]
    Json {
        side: &'static str,
        group: String,
        #[source]
        source: serde_json::Error,
    },

    /// The JUnit report could not be written.
    #[error("writing report {path}: {source}")]
    Report {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Convenience `Result` alias for runner operations.
pub type Result<T> = std::result::Result<T, UnitTestError>;
