use rulecheck_common::error::ParseError;

/// Errors that can occur within the storage layer.
///
/// # Examples
///
/// ```rust
/// use rulecheck_storage::StorageError;
///
/// let err = StorageError::OutOfOrderSample {
///     series: "up".to_string(),
///     t: 1000,
///     last: 2000,
/// };
/// assert!(err.to_string().contains("out of order"));
/// ```
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum StorageError {
    /// A point older than the newest point of its series was appended.
    #[error("Storage: out of order sample for {series} at {t} (newest is {last})")]
    OutOfOrderSample { series: String, t: i64, last: i64 },

    /// A point with the same timestamp but a different value was appended.
    #[error("Storage: duplicate sample for timestamp {t} of {series}")]
    DuplicateSample { series: String, t: i64 },

    /// The `load` command text could not be parsed.
    #[error("Storage: invalid load command: {0}")]
    InvalidLoadCommand(String),

    /// A series declaration inside a load command was malformed.
    #[error("Storage: {0}")]
    Parse(#[from] ParseError),
}

/// Convenience `Result` alias for storage operations.
pub type Result<T> = std::result::Result<T, StorageError>;
