use crate::compare::{indent_lines, MismatchDetail};
use crate::error::UnitTestError;
use rulecheck_common::duration::ModelDuration;
use std::fmt;

const DETAIL_INDENT: &str = "            ";

/// What a mismatch was checking.
#[derive(Debug, Clone, PartialEq)]
pub enum Subject {
    Alert { alertname: String },
    Expression { expr: String },
}

/// Expected and actual results differ at one instant.
#[derive(Debug, Clone, PartialEq)]
pub struct Mismatch {
    pub subject: Subject,
    /// Name of the owning test group, possibly empty.
    pub test_name: String,
    pub eval_time: ModelDuration,
    pub detail: MismatchDetail,
}

impl fmt::Display for Mismatch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.subject {
            Subject::Alert { alertname } => {
                if !self.test_name.is_empty() {
                    writeln!(f, "    name: {},", self.test_name)?;
                }
                write!(f, "    alertname: {alertname}, time: {}, ", self.eval_time)?;
                match &self.detail {
                    MismatchDetail::Text { expected, got } => write!(
                        f,
                        "\n        exp:{}, \n        got:{}",
                        indent_lines(expected, DETAIL_INDENT),
                        indent_lines(got, DETAIL_INDENT)
                    ),
                    MismatchDetail::Diff(diff) => {
                        write!(f, "\n        diff: {}", indent_lines(diff, DETAIL_INDENT))
                    }
                }
            }
            Subject::Expression { expr } => {
                write!(f, "    expr: {expr:?}, time: {},", self.eval_time)?;
                match &self.detail {
                    MismatchDetail::Text { expected, got } => {
                        write!(f, "\n        exp: {expected}\n        got: {got}")
                    }
                    MismatchDetail::Diff(diff) => write!(f, "\n        diff: {diff}"),
                }
            }
        }
    }
}

/// One entry of a test group's failure list.
#[derive(Debug)]
pub enum TestFailure {
    Mismatch(Mismatch),
    Error(UnitTestError),
}

impl From<UnitTestError> for TestFailure {
    fn from(err: UnitTestError) -> Self {
        Self::Error(err)
    }
}

impl fmt::Display for TestFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Mismatch(m) => fmt::Display::fmt(m, f),
            Self::Error(e) => fmt::Display::fmt(e, f),
        }
    }
}

/// Outcome of one test group.
#[derive(Debug, Default)]
pub struct CaseReport {
    pub name: String,
    /// Mismatches and per-case errors, in the order they were found.
    pub failures: Vec<TestFailure>,
    /// Errors that stopped the test group early.
    pub errors: Vec<UnitTestError>,
}

impl CaseReport {
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            ..Self::default()
        }
    }

    pub fn aborted(&self) -> bool {
        !self.errors.is_empty()
    }

    pub fn passed(&self) -> bool {
        self.failures.is_empty() && self.errors.is_empty()
    }

    /// Every message, failures first.
    pub fn messages(&self) -> Vec<String> {
        self.failures
            .iter()
            .map(ToString::to_string)
            .chain(self.errors.iter().map(ToString::to_string))
            .collect()
    }
}

/// Outcome of one unit-test file.
#[derive(Debug)]
pub struct FileReport {
    pub file: String,
    /// Start of the run, RFC 3339.
    pub timestamp: String,
    pub cases: Vec<CaseReport>,
    /// Test groups left out by the `--run` filter.
    pub skipped: usize,
    /// Errors that prevented the file from running at all.
    pub errors: Vec<UnitTestError>,
}

impl FileReport {
    pub fn new(file: impl Into<String>) -> Self {
        Self {
            file: file.into(),
            timestamp: chrono::Utc::now().to_rfc3339(),
            cases: Vec::new(),
            skipped: 0,
            errors: Vec::new(),
        }
    }

    pub fn passed(&self) -> bool {
        self.errors.is_empty() && self.cases.iter().all(CaseReport::passed)
    }

    /// Every message of the file, in report order.
    pub fn messages(&self) -> Vec<String> {
        self.errors
            .iter()
            .map(ToString::to_string)
            .chain(self.cases.iter().flat_map(CaseReport::messages))
            .collect()
    }
}
