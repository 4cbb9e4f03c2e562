use rulecheck_query::QueryError;
use rulecheck_storage::StorageError;

/// Errors produced while loading rule files or evaluating rules.
///
/// # Examples
///
/// ```rust
/// use rulecheck_alert::AlertError;
///
/// let err = AlertError::Validation {
///     file: "rules.yml".into(),
///     message: "group \"a\": one of 'record' or 'alert' must be set".into(),
/// };
/// assert!(err.to_string().starts_with("Alert: rules.yml:"));
/// ```
#[derive(Debug, thiserror::Error)]
pub enum AlertError {
    /// A rule file could not be read.
    #[error("Alert: reading {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// A rule file is not valid YAML or does not match the rule-group format.
    #[error("Alert: {path}: {message}")]
    Yaml { path: String, message: String },

    /// A rule file parsed but failed semantic validation.
    #[error("Alert: {file}: {message}")]
    Validation { file: String, message: String },

    /// The rule expression could not be evaluated.
    #[error("Alert: {0}")]
    Query(#[from] QueryError),

    /// A produced sample could not be appended.
    #[error("Alert: {0}")]
    Storage(#[from] StorageError),

    /// The rule expression evaluated to a matrix or string.
    #[error("Alert: rule result is not a vector or scalar")]
    ResultType,

    /// A rule produced more series or alerts than its group allows.
    #[error("Alert: exceeded limit of {limit} with {count} {kind}")]
    LimitExceeded {
        limit: usize,
        count: usize,
        kind: &'static str,
    },

    /// Two output series ended up with identical labels.
    #[error("Alert: vector contains metrics with the same labelset after applying {0} labels")]
    DuplicateLabelset(&'static str),
}

/// Convenience `Result` alias for rule operations.
pub type Result<T> = std::result::Result<T, AlertError>;
