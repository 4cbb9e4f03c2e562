use crate::error::{Result, UnitTestError};
use rulecheck_common::duration::ModelDuration;
use rulecheck_common::labels::Labels;
use rulecheck_query::engine::DEFAULT_LOOKBACK;
use serde::Deserialize;
use std::path::{Path, PathBuf};

/// Step used when a test file leaves `evaluation_interval` unset or zero.
pub const DEFAULT_EVALUATION_INTERVAL: ModelDuration = ModelDuration::from_mins(1);

/// A unit-test file as written by the user.
///
/// ```yaml
/// rule_files:
///   - rules/*.yml
/// evaluation_interval: 1m
/// group_eval_order: [first, second]
/// tests:
///   - interval: 1m
///     input_series:
///       - series: 'up{job="a"}'
///         values: '1 1 0 0'
///     alert_rule_test:
///       - eval_time: 2m
///         alertname: JobDown
///         exp_alerts:
///           - exp_labels: {job: a}
/// ```
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct UnitTestFile {
    pub rule_files: Vec<String>,
    pub evaluation_interval: ModelDuration,
    pub group_eval_order: Vec<String>,
    pub fuzzy_compare: bool,
    pub tests: Vec<TestGroup>,
}

impl UnitTestFile {
    pub fn load(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).map_err(|source| UnitTestError::Io {
            path: path.display().to_string(),
            source,
        })?;
        Self::parse(path, &content)
    }

    pub fn parse(path: &Path, content: &str) -> Result<Self> {
        serde_yaml::from_str(content).map_err(|e| UnitTestError::Yaml {
            path: path.display().to_string(),
            message: e.to_string(),
        })
    }

    /// The step of the virtual timeline.
    pub fn effective_interval(&self) -> ModelDuration {
        if self.evaluation_interval.is_zero() {
            DEFAULT_EVALUATION_INTERVAL
        } else {
            self.evaluation_interval
        }
    }

    /// Resolves `rule_files` against `base_dir` and expands globs.
    ///
    /// Relative patterns are taken relative to the directory of the test
    /// file. A pattern matching nothing is logged and skipped.
    pub fn resolve_rule_files(&self, base_dir: &Path) -> Result<Vec<PathBuf>> {
        let mut files = Vec::new();
        for pattern in &self.rule_files {
            let full = if !pattern.is_empty() && Path::new(pattern).is_relative() {
                base_dir.join(pattern)
            } else {
                PathBuf::from(pattern)
            };
            let full = full.to_string_lossy().into_owned();

            let paths = glob::glob(&full).map_err(|e| UnitTestError::Glob {
                pattern: full.clone(),
                message: e.to_string(),
            })?;
            let mut matched = 0usize;
            for entry in paths {
                let path = entry.map_err(|e| UnitTestError::Glob {
                    pattern: full.clone(),
                    message: e.to_string(),
                })?;
                files.push(path);
                matched += 1;
            }
            if matched == 0 {
                tracing::warn!(pattern = %full, "no file match pattern");
            }
        }
        Ok(files)
    }
}

/// One `tests` entry: input data plus the expectations checked against it.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct TestGroup {
    /// Spacing of input series values; defaults to the file's step.
    pub interval: ModelDuration,
    pub input_series: Vec<InputSeries>,
    pub alert_rule_test: Vec<AlertTestCase>,
    pub promql_expr_test: Vec<PromqlTestCase>,
    pub external_labels: Labels,
    pub external_url: String,
    pub name: String,
}

impl TestGroup {
    /// The largest `eval_time` across every alert and expression test.
    pub fn max_eval_time(&self) -> ModelDuration {
        let alerts = self.alert_rule_test.iter().map(|t| t.eval_time);
        let exprs = self.promql_expr_test.iter().map(|t| t.eval_time);
        alerts.chain(exprs).max().unwrap_or(ModelDuration::ZERO)
    }

    /// The `load` command feeding the input series to the store.
    pub fn load_command(&self) -> String {
        let mut command = format!("load {}\n", self.interval);
        for input in &self.input_series {
            command.push_str(&format!("  {} {}\n", input.series, input.values));
        }
        command
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct InputSeries {
    pub series: String,
    pub values: String,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct AlertTestCase {
    pub eval_time: ModelDuration,
    pub alertname: String,
    pub exp_alerts: Vec<ExpectedAlert>,
}

/// An alert expected to be firing. `alertname` is implied by the test case.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct ExpectedAlert {
    pub exp_labels: Labels,
    pub exp_annotations: Labels,
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct PromqlTestCase {
    pub expr: String,
    pub eval_time: ModelDuration,
    pub exp_samples: Vec<ExpectedSample>,
}

/// An expected query result. A non-empty `histogram` means `value` is
/// ignored.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct ExpectedSample {
    pub labels: String,
    pub value: f64,
    pub histogram: String,
}

/// Command-line switches that shape a run.
#[derive(Debug, Clone)]
pub struct RunOptions {
    /// Patterns selecting test groups by name; empty runs everything.
    pub run: Vec<String>,
    /// Render alert mismatches as a structured diff.
    pub diff: bool,
    pub debug: bool,
    pub ignore_unknown_fields: bool,
    pub lookback_delta: ModelDuration,
    pub junit: Option<PathBuf>,
}

impl Default for RunOptions {
    fn default() -> Self {
        Self {
            run: Vec::new(),
            diff: false,
            debug: false,
            ignore_unknown_fields: false,
            lookback_delta: DEFAULT_LOOKBACK,
            junit: None,
        }
    }
}
