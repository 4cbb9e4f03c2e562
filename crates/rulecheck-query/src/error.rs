/// Errors raised while parsing or evaluating an expression.
///
/// # Examples
///
/// ```rust
/// use rulecheck_query::QueryError;
///
/// let err = QueryError::Parse { pos: 4, message: "unexpected end of input".into() };
/// assert_eq!(err.to_string(), "Query: parse error at char 4: unexpected end of input");
/// ```
#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum QueryError {
    /// The expression text is not valid.
    #[error("Query: parse error at char {pos}: {message}")]
    Parse { pos: usize, message: String },

    /// An operand had the wrong value type, e.g. a range vector where an
    /// instant vector was expected.
    #[error("Query: {0}")]
    Type(String),

    /// Evaluation failed on otherwise valid input.
    #[error("Query: {0}")]
    Execution(String),
}

/// Convenience `Result` alias for query operations.
pub type Result<T> = std::result::Result<T, QueryError>;
