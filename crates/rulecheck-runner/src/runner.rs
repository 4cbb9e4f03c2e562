use crate::collector::collect_firing;
use crate::compare::{
    compare_alerts, samples_equal, samples_string, AlertRenderer, FloatCompare, JsonDiffRenderer, LabelAndAnnotation,
    LabelsAndAnnotations, MismatchDetail, TextRenderer,
};
use crate::config::{AlertTestCase, RunOptions, TestGroup, UnitTestFile};
use crate::error::{Result, UnitTestError};
use crate::expectations::ExpectationIndex;
use crate::failure::{CaseReport, FileReport, Mismatch, Subject, TestFailure};
use crate::junit;
use crate::probe::{parse_expected, probe};
use crate::scheduler::{GroupOrder, Scheduler, StepError};
use crate::timeline::Timeline;
use regex::Regex;
use rulecheck_alert::{load_groups, LoadOptions};
use rulecheck_common::duration::ModelDuration;
use rulecheck_common::labels::ALERT_NAME;
use rulecheck_common::types::Timestamp;
use rulecheck_query::{Engine, QueryEngine, Value};
use rulecheck_storage::loader::LazyLoader;
use rulecheck_storage::SeriesStore;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Instant;

/// Virtual start of every test group.
const EPOCH: Timestamp = 0;

/// File-wide settings shared by the test groups of one unit-test file.
struct FileContext<'a> {
    eval_interval: ModelDuration,
    order: &'a GroupOrder,
    rule_files: &'a [PathBuf],
    floats: FloatCompare,
}

/// Runs unit-test files and reports their outcome.
///
/// Test files are independent: each test group gets its own store, engine
/// and rule groups, built from scratch and torn down when it finishes.
pub struct Runner {
    options: RunOptions,
    filter: Option<Regex>,
}

impl Runner {
    pub fn new(options: RunOptions) -> Result<Self> {
        let filter = if options.run.is_empty() {
            None
        } else {
            let pattern = options.run.join("|");
            let re = Regex::new(&pattern)
                .map_err(|e| UnitTestError::Configuration(format!("invalid --run pattern {pattern:?}: {e}")))?;
            Some(re)
        };
        Ok(Self { options, filter })
    }

    /// Runs every file, prints the console report, writes the JUnit report
    /// when requested and returns whether everything passed.
    pub fn run(&self, files: &[PathBuf]) -> Result<bool> {
        let reports = self.run_files(files);
        if let Some(path) = &self.options.junit {
            junit::write(path, &reports)?;
        }
        Ok(reports.iter().all(FileReport::passed))
    }

    /// Runs every file in order, printing each outcome as it completes.
    pub fn run_files(&self, files: &[PathBuf]) -> Vec<FileReport> {
        files
            .iter()
            .map(|file| {
                println!("Unit Testing: {}", file.display());
                let report = self.run_file(file);
                print_report(&report);
                report
            })
            .collect()
    }

    /// Runs the test groups of one file.
    pub fn run_file(&self, path: &Path) -> FileReport {
        let mut report = FileReport::new(path.display().to_string());
        if let Err(e) = self.run_suite(path, &mut report) {
            tracing::warn!(file = %path.display(), error = %e, "Unit-test file aborted");
            report.errors.push(e);
        }
        report
    }

    fn run_suite(&self, path: &Path, report: &mut FileReport) -> Result<()> {
        let file = UnitTestFile::load(path)?;
        let base_dir = path.parent().unwrap_or_else(|| Path::new("."));
        let rule_files = file.resolve_rule_files(base_dir)?;
        let order = GroupOrder::new(&file.group_eval_order)?;
        let ctx = FileContext {
            eval_interval: file.effective_interval(),
            order: &order,
            rule_files: &rule_files,
            floats: if file.fuzzy_compare {
                FloatCompare::Fuzzy
            } else {
                FloatCompare::Exact
            },
        };
        tracing::debug!(
            file = %path.display(),
            rule_files = rule_files.len(),
            tests = file.tests.len(),
            interval = %ctx.eval_interval,
            "Running unit-test file"
        );

        for (i, group) in file.tests.iter().enumerate() {
            if !self.matches_run(&group.name) {
                report.skipped += 1;
                continue;
            }
            let name = if group.name.is_empty() {
                format!("unnamed#{i}")
            } else {
                group.name.clone()
            };
            let mut group = group.clone();
            if group.interval.is_zero() {
                group.interval = ctx.eval_interval;
            }
            report.cases.push(self.run_test_group(&group, &name, &ctx));
        }
        Ok(())
    }

    fn matches_run(&self, name: &str) -> bool {
        self.filter.as_ref().map_or(true, |re| re.is_match(name))
    }

    fn run_test_group(&self, group: &TestGroup, name: &str, ctx: &FileContext<'_>) -> CaseReport {
        let started = Instant::now();
        if self.options.debug {
            println!("DEBUG: Starting test {name}");
        }

        let mut case = CaseReport::new(name);
        self.test(group, ctx, &mut case);

        if self.options.debug {
            println!("DEBUG: Test {name} finished, took {:?}", started.elapsed());
        }
        tracing::debug!(
            test = %name,
            failures = case.failures.len(),
            aborted = case.aborted(),
            elapsed_ms = started.elapsed().as_millis() as u64,
            "Finished test group"
        );
        case
    }

    fn test(&self, group: &TestGroup, ctx: &FileContext<'_>, case: &mut CaseReport) {
        let loader = match LazyLoader::new(&group.load_command()) {
            Ok(loader) => loader,
            Err(e) => {
                case.errors.push(e.into());
                return;
            }
        };
        let store: Arc<dyn SeriesStore> = loader.storage();
        let engine: Arc<dyn QueryEngine> =
            Arc::new(Engine::new(Arc::clone(&store)).with_lookback(self.options.lookback_delta));

        let load_options = LoadOptions {
            interval: group.interval,
            external_labels: group.external_labels.clone(),
            external_url: group.external_url.clone(),
            ignore_unknown_fields: self.options.ignore_unknown_fields,
        };
        let groups = match load_groups(&load_options, ctx.rule_files, Arc::clone(&engine), store) {
            Ok(groups) => groups,
            Err(errors) => {
                case.errors.extend(errors.into_iter().map(UnitTestError::RuleFiles));
                return;
            }
        };

        let mut index = match ExpectationIndex::build(&group.alert_rule_test, &group.name) {
            Ok(index) => index,
            Err(e) => {
                case.errors.push(e);
                return;
            }
        };
        let timeline = match Timeline::new(EPOCH, ctx.eval_interval, group.max_eval_time()) {
            Ok(timeline) => timeline,
            Err(e) => {
                case.errors.push(e);
                return;
            }
        };

        let renderer: Box<dyn AlertRenderer> = if self.options.diff {
            Box::new(JsonDiffRenderer {
                group: group.name.clone(),
            })
        } else {
            Box::new(TextRenderer)
        };

        let mut scheduler = Scheduler::new(loader, groups, ctx.order);
        if replay(&mut scheduler, timeline, &mut index, group, renderer.as_ref(), case) {
            check_expressions(engine.as_ref(), group, ctx.floats, case);
            if self.options.debug {
                dump(engine.as_ref(), group);
            }
        }
        if let Err(e) = scheduler.close() {
            case.failures.push(e.into());
        }
    }
}

/// Steps the timeline, checking alert expectations at each step they fall
/// into. Returns `false` if a rule error stopped the replay.
fn replay(
    scheduler: &mut Scheduler,
    timeline: Timeline,
    index: &mut ExpectationIndex<'_>,
    group: &TestGroup,
    renderer: &dyn AlertRenderer,
    case: &mut CaseReport,
) -> bool {
    let step = timeline.step();
    for ts in timeline {
        match scheduler.step(ts) {
            Ok(()) => {}
            Err(StepError::Load(e)) => case.failures.push(e.into()),
            Err(StepError::Evaluation(errors)) => {
                tracing::debug!(ts, errors = errors.len(), "Rule evaluation failed, stopping timeline");
                case.errors.extend(errors);
                return false;
            }
        }

        for instant in index.due(ModelDuration::from_millis(ts - EPOCH), step) {
            let Some(names) = index.names_at(instant) else {
                continue;
            };
            let got = collect_firing(scheduler.groups(), names);
            for test in index.cases_at(instant) {
                let mut expected = expected_alerts(test);
                let mut actual = got.get(&test.alertname).cloned().unwrap_or_default();
                match compare_alerts(&mut expected, &mut actual, renderer) {
                    Ok(None) => {}
                    Ok(Some(detail)) => case.failures.push(TestFailure::Mismatch(Mismatch {
                        subject: Subject::Alert {
                            alertname: test.alertname.clone(),
                        },
                        test_name: group.name.clone(),
                        eval_time: test.eval_time,
                        detail,
                    })),
                    Err(e) => case.failures.push(e.into()),
                }
            }
        }
    }
    true
}

/// The declared alerts of `test`, each carrying the implied `alertname`.
fn expected_alerts(test: &AlertTestCase) -> LabelsAndAnnotations {
    test.exp_alerts
        .iter()
        .map(|alert| LabelAndAnnotation {
            labels: alert.exp_labels.clone().with(ALERT_NAME, test.alertname.as_str()),
            annotations: alert.exp_annotations.clone(),
        })
        .collect()
}

fn check_expressions(engine: &dyn QueryEngine, group: &TestGroup, floats: FloatCompare, case: &mut CaseReport) {
    for test in &group.promql_expr_test {
        let mut got = match probe(engine, &test.expr, EPOCH, test.eval_time) {
            Ok(samples) => samples,
            Err(e) => {
                case.failures.push(e.into());
                continue;
            }
        };
        let mut expected = match parse_expected(&test.expr, test.eval_time, &test.exp_samples) {
            Ok(samples) => samples,
            Err(e) => {
                case.failures.push(e.into());
                continue;
            }
        };
        if !samples_equal(&mut expected, &mut got, floats) {
            case.failures.push(TestFailure::Mismatch(Mismatch {
                subject: Subject::Expression {
                    expr: test.expr.clone(),
                },
                test_name: group.name.clone(),
                eval_time: test.eval_time,
                detail: MismatchDetail::Text {
                    expected: samples_string(&expected),
                    got: samples_string(&got),
                },
            }));
        }
    }
}

/// Prints every stored series, input and recorded alike.
fn dump(engine: &dyn QueryEngine, group: &TestGroup) {
    // Eval times may carry fractional seconds; cover them with a whole-second window.
    let window = group.max_eval_time().next_whole_second();
    let expr = format!("{{__name__=~\".+\"}}[{window}]");
    match engine.instant_query(&expr, EPOCH + window.as_millis()) {
        Ok(value @ Value::Matrix(_)) => {
            println!("DEBUG: Dump of all data (input_series and rules) at {window}:");
            println!("{value}");
        }
        Ok(other) => println!("DEBUG: Got unexpected type {}", other.type_name()),
        Err(e) => println!("DEBUG: Failed querying, expr: {expr:?}, err: {e}"),
    }
}

fn print_report(report: &FileReport) {
    let messages = report.messages();
    if messages.is_empty() {
        println!("  SUCCESS");
    } else {
        eprintln!("  FAILED:");
        for message in messages {
            eprintln!("{message}");
            println!();
        }
    }
    println!();
}
