use crate::compare::{
    compare_alerts, next_toward, samples_equal, AlertRenderer, FloatCompare, JsonDiffRenderer, LabelAndAnnotation,
    LabelsAndAnnotations, MismatchDetail, ParsedSample, TextRenderer,
};
use crate::config::{AlertTestCase, ExpectedSample, UnitTestFile};
use crate::diff::json_diff;
use crate::error::UnitTestError;
use crate::expectations::ExpectationIndex;
use crate::failure::{CaseReport, FileReport, Mismatch, Subject, TestFailure};
use crate::junit;
use crate::probe::parse_expected;
use crate::scheduler::GroupOrder;
use crate::timeline::Timeline;
use rulecheck_alert::Group;
use rulecheck_common::duration::ModelDuration;
use rulecheck_common::labels::Labels;
use rulecheck_query::{Engine, QueryEngine};
use rulecheck_storage::memory::MemoryStore;
use rulecheck_storage::SeriesStore;
use serde_json::json;
use std::path::Path;
use std::sync::Arc;

fn mins(n: i64) -> ModelDuration {
    ModelDuration::from_mins(n)
}

fn alert_case(eval_time: ModelDuration, alertname: &str) -> AlertTestCase {
    AlertTestCase {
        eval_time,
        alertname: alertname.to_string(),
        exp_alerts: Vec::new(),
    }
}

fn alert(labels: &[(&str, &str)], annotations: &[(&str, &str)]) -> LabelAndAnnotation {
    LabelAndAnnotation {
        labels: Labels::from_pairs(labels.iter().copied()),
        annotations: Labels::from_pairs(annotations.iter().copied()),
    }
}

fn sample(labels: &[(&str, &str)], value: f64) -> ParsedSample {
    ParsedSample {
        labels: Labels::from_pairs(labels.iter().copied()),
        value,
        histogram: String::new(),
    }
}

#[test]
fn timeline_includes_max_on_boundary() {
    let steps: Vec<i64> = Timeline::new(0, mins(1), mins(3)).unwrap().collect();
    assert_eq!(steps, vec![0, 60_000, 120_000, 180_000]);
}

#[test]
fn timeline_stops_at_last_step_before_max() {
    let steps: Vec<i64> = Timeline::new(0, mins(2), mins(5)).unwrap().collect();
    assert_eq!(steps, vec![0, 120_000, 240_000]);
    let only_start: Vec<i64> = Timeline::new(0, mins(1), ModelDuration::ZERO).unwrap().collect();
    assert_eq!(only_start, vec![0]);
}

#[test]
fn timeline_rejects_zero_step() {
    let err = Timeline::new(0, ModelDuration::ZERO, mins(1)).unwrap_err();
    assert!(matches!(err, UnitTestError::Configuration(_)));
}

#[test]
fn expectation_index_merges_instants() {
    let tests = vec![
        alert_case(mins(2), "B"),
        alert_case(mins(1), "A"),
        alert_case(mins(2), "A"),
        alert_case(mins(2), "B"),
    ];
    let index = ExpectationIndex::build(&tests, "").unwrap();
    assert_eq!(index.instants(), &[mins(1), mins(2)]);
    let names: Vec<&String> = index.names_at(mins(2)).unwrap().iter().collect();
    assert_eq!(names, vec!["A", "B"]);
    assert_eq!(index.cases_at(mins(2)).len(), 3);
    assert!(index.cases_at(mins(7)).is_empty());
}

#[test]
fn expectation_index_due_is_half_open() {
    let tests = vec![
        alert_case(mins(1), "A"),
        alert_case(ModelDuration::from_secs(90), "A"),
        alert_case(mins(2), "A"),
    ];
    let mut index = ExpectationIndex::build(&tests, "").unwrap();
    assert!(index.due(ModelDuration::ZERO, mins(1)).is_empty());
    assert_eq!(index.due(mins(1), mins(1)), vec![mins(1), ModelDuration::from_secs(90)]);
    assert_eq!(index.due(mins(2), mins(1)), vec![mins(2)]);
    assert!(index.due(mins(3), mins(1)).is_empty());
}

#[test]
fn expectation_index_requires_alertname() {
    let tests = vec![alert_case(mins(5), "")];
    let err = ExpectationIndex::build(&tests, "disk tests").unwrap_err();
    assert_eq!(
        err.to_string(),
        "an item under alert_rule_test misses required attribute alertname at eval_time 5m (in TestGroup disk tests)"
    );
    let unnamed = ExpectationIndex::build(&tests, "").unwrap_err();
    assert!(unnamed.to_string().ends_with("at eval_time 5m"));
}

#[test]
fn group_order_rejects_duplicates() {
    let err = GroupOrder::new(&["a".into(), "b".into(), "a".into()]).unwrap_err();
    assert_eq!(err.to_string(), "group name repeated in evaluation order: a");
}

#[test]
fn group_order_sort_is_stable() {
    let store = Arc::new(MemoryStore::new());
    let store_dyn: Arc<dyn SeriesStore> = store;
    let engine: Arc<dyn QueryEngine> = Arc::new(Engine::new(Arc::clone(&store_dyn)));
    let mut groups: Vec<Group> = ["x", "second", "y", "third", "first"]
        .into_iter()
        .map(|name| Group::new(name, "rules.yml", mins(1), Vec::new(), Arc::clone(&engine), Arc::clone(&store_dyn)))
        .collect();

    let order = GroupOrder::new(&["first".into(), "second".into(), "third".into()]).unwrap();
    order.sort(&mut groups);
    let names: Vec<&str> = groups.iter().map(Group::name).collect();
    // Unlisted groups share priority 0 with the first listed one.
    assert_eq!(names, vec!["x", "y", "first", "second", "third"]);
}

#[test]
fn fuzzy_compare_accepts_one_step_only() {
    let x = 0.1 + 0.2;
    let up = next_toward(x, true);
    let down = next_toward(x, false);
    assert!(!FloatCompare::Exact.equal(x, up));
    assert!(FloatCompare::Fuzzy.equal(x, up));
    assert!(FloatCompare::Fuzzy.equal(x, down));
    assert!(!FloatCompare::Fuzzy.equal(x, next_toward(up, true)));
    assert!(!FloatCompare::Fuzzy.equal(x, next_toward(down, false)));
}

#[test]
fn next_toward_edges() {
    assert_eq!(next_toward(0.0, true), f64::from_bits(1));
    assert_eq!(next_toward(0.0, false), -f64::from_bits(1));
    assert_eq!(next_toward(f64::INFINITY, true), f64::INFINITY);
    assert_eq!(next_toward(f64::INFINITY, false), f64::MAX);
    assert_eq!(next_toward(-1.0, true), -1.0 + f64::EPSILON / 2.0);
    assert!(next_toward(f64::NAN, true).is_nan());
}

#[test]
fn alerts_display_matches_console_layout() {
    let alerts: LabelsAndAnnotations = vec![
        alert(&[("alertname", "A"), ("job", "a")], &[]),
        alert(&[("alertname", "A"), ("job", "b")], &[("summary", "down")]),
    ]
    .into_iter()
    .collect();
    assert_eq!(
        alerts.to_string(),
        "[\n0:\n  Labels:{alertname=\"A\", job=\"a\"}\n  Annotations:{},\n1:\n  Labels:{alertname=\"A\", job=\"b\"}\n  Annotations:{summary=\"down\"}\n]"
    );
    assert_eq!(LabelsAndAnnotations::default().to_string(), "[]");
}

#[test]
fn alert_comparison_ignores_declaration_order() {
    let a = alert(&[("alertname", "A"), ("job", "a")], &[("s", "1")]);
    let b = alert(&[("alertname", "A"), ("job", "a")], &[("s", "0")]);
    let c = alert(&[("alertname", "A"), ("job", "b")], &[]);
    let mut expected: LabelsAndAnnotations = vec![c.clone(), a.clone(), b.clone()].into_iter().collect();
    let mut got: LabelsAndAnnotations = vec![b, c, a].into_iter().collect();
    assert_eq!(compare_alerts(&mut expected, &mut got, &TextRenderer).unwrap(), None);
}

#[test]
fn text_renderer_reports_both_sides() {
    let mut expected: LabelsAndAnnotations = vec![alert(&[("alertname", "A")], &[])].into_iter().collect();
    let mut got = LabelsAndAnnotations::default();
    let detail = compare_alerts(&mut expected, &mut got, &TextRenderer).unwrap().unwrap();
    assert_eq!(
        detail,
        MismatchDetail::Text {
            expected: "[\n0:\n  Labels:{alertname=\"A\"}\n  Annotations:{}\n]".into(),
            got: "[]".into(),
        }
    );
}

#[test]
fn json_renderer_uses_placeholder_for_empty_side() {
    let expected: LabelsAndAnnotations = vec![alert(&[("alertname", "A")], &[])].into_iter().collect();
    let got = LabelsAndAnnotations::default();
    let renderer = JsonDiffRenderer::default();
    let Some(MismatchDetail::Diff(diff)) = renderer.render(&expected, &got).unwrap() else {
        panic!("expected a diff");
    };
    assert!(diff.contains("-           \"alertname\": \"A\""), "{diff}");
    assert!(diff.starts_with('['));
}

#[test]
fn json_diff_marks_changes() {
    let exp = json!([{"Labels": {"job": "a", "zone": "1"}}]);
    let got = json!([{"Labels": {"job": "b", "env": "p"}}, {"Labels": {}}]);
    let diff = json_diff(&exp, &got).unwrap();
    let expected = "[\n    {\n        \"Labels\": {\n+           \"env\": \"p\",\n            \"job\": \"a\" => \"b\",\n-           \"zone\": \"1\"\n        }\n    },\n+   {\"Labels\":{}}\n]";
    assert_eq!(diff, expected);
    assert!(json_diff(&exp, &exp).is_none());
}

#[test]
fn samples_compare_by_labels_value_and_histogram() {
    let mut expected = vec![sample(&[("job", "b")], 2.0), sample(&[("job", "a")], 1.0)];
    let mut got = vec![sample(&[("job", "a")], 1.0), sample(&[("job", "b")], 2.0)];
    assert!(samples_equal(&mut expected, &mut got, FloatCompare::Exact));

    let mut short = vec![sample(&[("job", "a")], 1.0)];
    assert!(!samples_equal(&mut short, &mut got, FloatCompare::Exact));

    let mut hist_exp = vec![ParsedSample {
        histogram: "{{count:1}}".into(),
        value: 7.0,
        ..sample(&[], 0.0)
    }];
    let mut hist_got = vec![ParsedSample {
        histogram: "{{count:1}}".into(),
        ..sample(&[], 0.0)
    }];
    assert!(samples_equal(&mut hist_exp, &mut hist_got, FloatCompare::Exact));
}

#[test]
fn expected_samples_parse_labels_and_histograms() {
    let samples = vec![
        ExpectedSample {
            labels: "up{job=\"a\"}".into(),
            value: 1.0,
            histogram: String::new(),
        },
        ExpectedSample {
            labels: String::new(),
            value: 0.0,
            histogram: "{{schema:0 count:2 sum:3 buckets:[2]}}".into(),
        },
    ];
    let parsed = parse_expected("x", mins(1), &samples).unwrap();
    assert_eq!(parsed[0].labels.get("job"), Some("a"));
    assert!(parsed[1].labels.is_empty());
    assert_eq!(parsed[1].histogram, "{{count:2 sum:3 buckets:[2]}}");
}

#[test]
fn expected_sample_errors_name_the_case() {
    let bad_labels = vec![ExpectedSample {
        labels: "up{job=}".into(),
        ..ExpectedSample::default()
    }];
    let err = parse_expected("sum(up)", mins(1), &bad_labels).unwrap_err();
    assert!(matches!(err, UnitTestError::Validation(_)));
    assert!(err.to_string().starts_with("    expr: \"sum(up)\", time: 1m, err: labels \"up{job=}\": "));

    let not_histogram = vec![ExpectedSample {
        histogram: "5".into(),
        ..ExpectedSample::default()
    }];
    let err = parse_expected("h", mins(1), &not_histogram).unwrap_err();
    assert!(err.to_string().ends_with("expected histogram, got 5"), "{err}");

    let two = vec![ExpectedSample {
        histogram: "{{count:1}}x1".into(),
        ..ExpectedSample::default()
    }];
    let err = parse_expected("h", mins(1), &two).unwrap_err();
    assert!(err.to_string().ends_with("expected 1 value, got 2"), "{err}");
}

#[test]
fn mismatch_messages() {
    let alert_mismatch = Mismatch {
        subject: Subject::Alert {
            alertname: "JobDown".into(),
        },
        test_name: "api".into(),
        eval_time: mins(1),
        detail: MismatchDetail::Text {
            expected: "[\n0:\n  x\n]".into(),
            got: "[]".into(),
        },
    };
    assert_eq!(
        alert_mismatch.to_string(),
        "    name: api,\n    alertname: JobDown, time: 1m, \n        exp:[\n            0:\n              x\n            ], \n        got:[]"
    );

    let expr_mismatch = Mismatch {
        subject: Subject::Expression { expr: "sum(up)".into() },
        test_name: String::new(),
        eval_time: ModelDuration::ZERO,
        detail: MismatchDetail::Text {
            expected: "{} 2E+00".into(),
            got: "nil".into(),
        },
    };
    assert_eq!(
        expr_mismatch.to_string(),
        "    expr: \"sum(up)\", time: 0s,\n        exp: {} 2E+00\n        got: nil"
    );
}

#[test]
fn unit_test_file_is_strict() {
    let path = Path::new("t.yml");
    let ok = UnitTestFile::parse(
        path,
        "rule_files: [r.yml]\ntests:\n  - input_series:\n      - series: up\n        values: 1 2\n    promql_expr_test:\n      - expr: up\n        eval_time: 1m\n        exp_samples:\n          - labels: up\n            value: 2\n",
    )
    .unwrap();
    assert_eq!(ok.effective_interval(), mins(1));
    assert_eq!(ok.tests[0].max_eval_time(), mins(1));
    assert_eq!(ok.tests[0].promql_expr_test[0].exp_samples[0].value, 2.0);

    let err = UnitTestFile::parse(path, "tests:\n  - bogus: 1\n").unwrap_err();
    assert!(matches!(err, UnitTestError::Yaml { .. }));
}

#[test]
fn load_command_lists_input_series() {
    let file = UnitTestFile::parse(
        Path::new("t.yml"),
        "tests:\n  - interval: 30s\n    input_series:\n      - series: 'up{job=\"a\"}'\n        values: '1 0'\n",
    )
    .unwrap();
    assert_eq!(file.tests[0].load_command(), "load 30s\n  up{job=\"a\"} 1 0\n");
}

#[test]
fn rule_files_resolve_relative_to_test_file() {
    let dir = tempfile::tempdir().unwrap();
    std::fs::create_dir(dir.path().join("rules")).unwrap();
    std::fs::write(dir.path().join("rules/b.yml"), "groups: []\n").unwrap();
    std::fs::write(dir.path().join("rules/a.yml"), "groups: []\n").unwrap();

    let file = UnitTestFile {
        rule_files: vec!["rules/*.yml".into(), "missing/*.yml".into()],
        ..UnitTestFile::default()
    };
    let files = file.resolve_rule_files(dir.path()).unwrap();
    assert_eq!(files, vec![dir.path().join("rules/a.yml"), dir.path().join("rules/b.yml")]);
}

#[test]
fn junit_counts_failures_errors_and_skips() {
    let mut failed = CaseReport::new("failing <case>");
    failed
        .failures
        .push(TestFailure::Error(UnitTestError::Validation("bad & worse".into())));
    let mut aborted = CaseReport::new("aborting");
    aborted.errors.push(UnitTestError::Configuration("stop".into()));

    let mut report = FileReport::new("tests.yml");
    report.cases = vec![CaseReport::new("ok"), failed, aborted];
    report.skipped = 2;
    let mut broken = FileReport::new("broken.yml");
    broken.errors.push(UnitTestError::Validation("no tests".into()));

    let xml = junit::render(&[report, broken]);
    assert!(xml.contains("<testsuite name=\"tests.yml\" tests=\"3\" failures=\"1\" errors=\"1\" skipped=\"2\""));
    assert!(xml.contains("<testcase name=\"failing &lt;case&gt;\">"));
    assert!(xml.contains("<failure>bad &amp; worse</failure>"));
    assert!(xml.contains("<error>stop</error>"));
    assert!(xml.contains("<testsuite name=\"broken.yml\" tests=\"0\" failures=\"0\" errors=\"1\""));
    assert!(xml.contains("<system-err>no tests</system-err>"));
}

#[test]
fn junit_drops_control_characters() {
    let mut case = CaseReport::new("bell\u{7}\u{0}name");
    case.failures.push(TestFailure::Error(UnitTestError::Validation(
        "line one\r\nline\ttwo\u{1b}[31m".into(),
    )));
    let mut report = FileReport::new("tests.yml");
    report.cases = vec![case];

    let xml = junit::render(&[report]);
    assert!(xml.contains("<testcase name=\"bellname\">"));
    assert!(xml.contains("<failure>line one&#xD;&#xA;line\ttwo[31m</failure>"));
    assert!(!xml.chars().any(|c| c < '\u{20}' && c != '\n' && c != '\t'));
}
