use rulecheck_runner::failure::TestFailure;
use rulecheck_runner::{FileReport, RunOptions, Runner};
use std::path::{Path, PathBuf};
use tempfile::TempDir;

const JOB_DOWN_RULES: &str = r#"
groups:
  - name: availability
    rules:
      - alert: JobDown
        expr: up == 0
        for: 0m
        annotations:
          summary: "{{ $labels.job }} is down"
"#;

fn write(dir: &TempDir, name: &str, content: &str) -> PathBuf {
    let path = dir.path().join(name);
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent).unwrap();
    }
    std::fs::write(&path, content).unwrap();
    path
}

fn run(path: &Path, options: RunOptions) -> FileReport {
    Runner::new(options).unwrap().run_file(path)
}

fn job_down_test(eval_time: &str) -> String {
    format!(
        r#"
rule_files:
  - rules.yml
evaluation_interval: 1m
tests:
  - interval: 1m
    input_series:
      - series: 'up{{job="a"}}'
        values: '1 1 0 0'
    alert_rule_test:
      - eval_time: {eval_time}
        alertname: JobDown
        exp_alerts:
          - exp_labels:
              job: a
            exp_annotations:
              summary: a is down
"#
    )
}

#[test]
fn firing_alert_matches_expectation() {
    let dir = TempDir::new().unwrap();
    write(&dir, "rules.yml", JOB_DOWN_RULES);
    let test = write(&dir, "test.yml", &job_down_test("2m"));

    let report = run(&test, RunOptions::default());
    assert!(report.passed(), "{:?}", report.messages());
    assert_eq!(report.cases.len(), 1);
    assert_eq!(report.cases[0].name, "unnamed#0");
}

#[test]
fn missing_alert_is_reported_with_both_sides() {
    let dir = TempDir::new().unwrap();
    write(&dir, "rules.yml", JOB_DOWN_RULES);
    let test = write(&dir, "test.yml", &job_down_test("1m"));

    let report = run(&test, RunOptions::default());
    assert!(!report.passed());
    let case = &report.cases[0];
    assert!(!case.aborted());
    assert_eq!(case.failures.len(), 1);
    assert!(matches!(case.failures[0], TestFailure::Mismatch(_)));
    assert_eq!(
        case.failures[0].to_string(),
        "    alertname: JobDown, time: 1m, \n        exp:[\n            0:\n              \
         Labels:{alertname=\"JobDown\", job=\"a\"}\n              Annotations:{summary=\"a is down\"}\n            ], \n        got:[]"
    );
}

#[test]
fn diff_mode_renders_structured_diff() {
    let dir = TempDir::new().unwrap();
    write(&dir, "rules.yml", JOB_DOWN_RULES);
    let test = write(&dir, "test.yml", &job_down_test("1m"));

    let report = run(
        &test,
        RunOptions {
            diff: true,
            ..RunOptions::default()
        },
    );
    let message = report.cases[0].failures[0].to_string();
    assert!(message.contains("alertname: JobDown, time: 1m, \n        diff: ["), "{message}");
    assert!(message.contains("\"job\": \"a\""), "{message}");
    assert!(!message.contains("exp:"));
}

#[test]
fn expression_probe_sums_input_series() {
    let dir = TempDir::new().unwrap();
    let test = write(
        &dir,
        "test.yml",
        r#"
tests:
  - name: sum of up
    interval: 1m
    input_series:
      - series: 'up{job="a"}'
        values: '1'
      - series: 'up{job="b"}'
        values: '1'
    promql_expr_test:
      - expr: sum(up)
        eval_time: 0m
        exp_samples:
          - value: 2
      - expr: up
        eval_time: 0m
        exp_samples:
          - labels: 'up{job="b"}'
            value: 1
          - labels: 'up{job="a"}'
            value: 1
"#,
    );

    let report = run(&test, RunOptions::default());
    assert!(report.passed(), "{:?}", report.messages());
    assert_eq!(report.cases[0].name, "sum of up");
}

#[test]
fn expression_mismatch_lists_expected_and_got() {
    let dir = TempDir::new().unwrap();
    let test = write(
        &dir,
        "test.yml",
        r#"
tests:
  - input_series:
      - series: 'up{job="a"}'
        values: '3'
    promql_expr_test:
      - expr: up
        eval_time: 0m
        exp_samples:
          - labels: 'up{job="a"}'
            value: 4
      - expr: missing_metric
        eval_time: 0m
        exp_samples:
          - labels: 'missing_metric'
            value: 1
"#,
    );

    let report = run(&test, RunOptions::default());
    let messages = report.messages();
    assert_eq!(messages.len(), 2);
    assert_eq!(
        messages[0],
        "    expr: \"up\", time: 0s,\n        exp: {__name__=\"up\", job=\"a\"} 4E+00\n        got: {__name__=\"up\", job=\"a\"} 3E+00"
    );
    assert!(messages[1].ends_with("got: nil"), "{}", messages[1]);
}

#[test]
fn bad_expected_labels_fail_only_their_case() {
    let dir = TempDir::new().unwrap();
    let test = write(
        &dir,
        "test.yml",
        r#"
tests:
  - input_series:
      - series: 'up'
        values: '1'
    promql_expr_test:
      - expr: up
        eval_time: 0m
        exp_samples:
          - labels: 'up{job='
      - expr: sum(
        eval_time: 0m
      - expr: up
        eval_time: 0m
        exp_samples:
          - labels: up
            value: 2
"#,
    );

    let report = run(&test, RunOptions::default());
    let case = &report.cases[0];
    assert!(!case.aborted());
    assert_eq!(case.failures.len(), 3);
    let messages = case.messages();
    assert!(messages[0].contains("err: labels \"up{job=\""), "{}", messages[0]);
    assert!(messages[1].starts_with("    expr: \"sum(\", time: 0s, err: "), "{}", messages[1]);
    assert!(messages[2].contains("exp: {__name__=\"up\"} 2E+00"), "{}", messages[2]);
}

#[test]
fn rule_error_aborts_remaining_timeline() {
    let dir = TempDir::new().unwrap();
    write(
        &dir,
        "rules.yml",
        r#"
groups:
  - name: broken
    rules:
      - alert: Dup
        expr: '{job="x"}'
"#,
    );
    let test = write(
        &dir,
        "test.yml",
        r#"
rule_files: [rules.yml]
tests:
  - input_series:
      - series: 'a{job="x"}'
        values: '1 1 1'
      - series: 'b{job="x"}'
        values: '1 1 1'
    alert_rule_test:
      - eval_time: 2m
        alertname: Other
        exp_alerts:
          - exp_labels: {job: x}
    promql_expr_test:
      - expr: a
        eval_time: 2m
"#,
    );

    let report = run(&test, RunOptions::default());
    let case = &report.cases[0];
    assert!(case.aborted());
    assert!(case.failures.is_empty(), "{:?}", case.messages());
    assert_eq!(case.errors.len(), 1);
    let message = case.errors[0].to_string();
    assert!(message.starts_with("    rule: Dup, time: 0s, err: "), "{message}");
    assert!(message.contains("same labelset"), "{message}");
}

#[test]
fn same_alert_name_in_two_groups_is_merged() {
    let dir = TempDir::new().unwrap();
    write(
        &dir,
        "rules/a.yml",
        r#"
groups:
  - name: team-a
    rules:
      - alert: InstanceDown
        expr: up{job="a"} == 0
"#,
    );
    write(
        &dir,
        "rules/b.yml",
        r#"
groups:
  - name: team-b
    rules:
      - alert: InstanceDown
        expr: up{job="b"} == 0
        labels:
          team: b
"#,
    );
    let test = write(
        &dir,
        "test.yml",
        r#"
rule_files: ['rules/*.yml']
tests:
  - input_series:
      - series: 'up{job="a"}'
        values: '0 0'
      - series: 'up{job="b"}'
        values: '0 0'
    alert_rule_test:
      - eval_time: 1m
        alertname: InstanceDown
        exp_alerts:
          - exp_labels: {job: b, team: b}
          - exp_labels: {job: a}
"#,
    );

    let report = run(&test, RunOptions::default());
    assert!(report.passed(), "{:?}", report.messages());
}

#[test]
fn group_eval_order_feeds_recorded_series_forward() {
    let dir = TempDir::new().unwrap();
    write(
        &dir,
        "rules.yml",
        r#"
groups:
  - name: second
    rules:
      - record: job:up:doubled
        expr: job:up * 2
  - name: first
    rules:
      - record: job:up
        expr: up
"#,
    );
    let test_body = |order: &str| {
        format!(
            r#"
rule_files: [rules.yml]
group_eval_order: {order}
tests:
  - input_series:
      - series: 'up{{job="a"}}'
        values: '1'
    promql_expr_test:
      - expr: job:up:doubled
        eval_time: 0m
        exp_samples:
          - labels: 'job:up:doubled{{job="a"}}'
            value: 2
"#
        )
    };

    let ordered = write(&dir, "ordered.yml", &test_body("[first, second]"));
    let report = run(&ordered, RunOptions::default());
    assert!(report.passed(), "{:?}", report.messages());

    let unordered = write(&dir, "unordered.yml", &test_body("[]"));
    let report = run(&unordered, RunOptions::default());
    assert!(!report.passed());

    let repeated = write(&dir, "repeated.yml", &test_body("[first, first]"));
    let report = run(&repeated, RunOptions::default());
    assert!(report.cases.is_empty());
    assert_eq!(
        report.errors[0].to_string(),
        "group name repeated in evaluation order: first"
    );
}

#[test]
fn fuzzy_compare_tolerates_last_bit_drift() {
    let dir = TempDir::new().unwrap();
    let body = |fuzzy: bool| {
        format!(
            r#"
fuzzy_compare: {fuzzy}
tests:
  - promql_expr_test:
      - expr: 0.1 + 0.2
        eval_time: 0m
        exp_samples:
          - value: 0.3
"#
        )
    };

    let fuzzy = write(&dir, "fuzzy.yml", &body(true));
    assert!(run(&fuzzy, RunOptions::default()).passed());

    let exact = write(&dir, "exact.yml", &body(false));
    assert!(!run(&exact, RunOptions::default()).passed());
}

#[test]
fn histogram_samples_compare_by_description() {
    let dir = TempDir::new().unwrap();
    let test = write(
        &dir,
        "test.yml",
        r#"
tests:
  - input_series:
      - series: 'latency'
        values: '{{schema:0 count:1 sum:2 buckets:[1]}}+{{count:1 sum:2 buckets:[1]}}x2'
    promql_expr_test:
      - expr: latency
        eval_time: 2m
        exp_samples:
          - labels: latency
            histogram: '{{schema:0 sum:6 count:3 offset:0 buckets:[3]}}'
      - expr: histogram_count(latency)
        eval_time: 2m
        exp_samples:
          - value: 3
"#,
    );

    let report = run(&test, RunOptions::default());
    assert!(report.passed(), "{:?}", report.messages());
}

#[test]
fn range_windows_exclude_samples_on_their_left_edge() {
    let dir = TempDir::new().unwrap();
    let test = write(
        &dir,
        "test.yml",
        r#"
tests:
  - interval: 1m
    input_series:
      - series: 'x'
        values: '1 1 1 1'
      - series: 'old'
        values: '1'
    promql_expr_test:
      - expr: count_over_time(x[1m])
        eval_time: 2m
        exp_samples:
          - value: 1
      - expr: old
        eval_time: 5m
        exp_samples: []
"#,
    );

    let report = run(&test, RunOptions::default());
    assert!(report.passed(), "{:?}", report.messages());
}

#[test]
fn missing_alertname_aborts_the_test_group() {
    let dir = TempDir::new().unwrap();
    let test = write(
        &dir,
        "test.yml",
        r#"
tests:
  - name: needs names
    alert_rule_test:
      - eval_time: 5m
"#,
    );

    let report = run(&test, RunOptions::default());
    let case = &report.cases[0];
    assert!(case.aborted());
    assert_eq!(
        case.errors[0].to_string(),
        "an item under alert_rule_test misses required attribute alertname at eval_time 5m (in TestGroup needs names)"
    );
}

#[test]
fn unknown_rule_fields_need_opt_in() {
    let dir = TempDir::new().unwrap();
    write(
        &dir,
        "rules.yml",
        r#"
groups:
  - name: g
    rules:
      - alert: JobDown
        expr: up == 0
        owner: sre
"#,
    );
    let test = write(&dir, "test.yml", "rule_files: [rules.yml]\ntests:\n  - name: t\n");

    let strict = run(&test, RunOptions::default());
    assert!(strict.cases[0].aborted());

    let lenient = run(
        &test,
        RunOptions {
            ignore_unknown_fields: true,
            ..RunOptions::default()
        },
    );
    assert!(lenient.passed(), "{:?}", lenient.messages());
}

#[test]
fn run_filter_selects_test_groups() {
    let dir = TempDir::new().unwrap();
    let test = write(
        &dir,
        "test.yml",
        r#"
tests:
  - name: alpha
  - name: beta
    promql_expr_test:
      - expr: vector(1)
        exp_samples:
          - value: 2
  - name: gamma
"#,
    );

    let report = run(
        &test,
        RunOptions {
            run: vec!["^alp".into(), "mma$".into()],
            ..RunOptions::default()
        },
    );
    assert!(report.passed());
    let names: Vec<&str> = report.cases.iter().map(|c| c.name.as_str()).collect();
    assert_eq!(names, vec!["alpha", "gamma"]);
    assert_eq!(report.skipped, 1);
}

#[test]
fn junit_report_is_written_even_on_failure() {
    let dir = TempDir::new().unwrap();
    write(&dir, "rules.yml", JOB_DOWN_RULES);
    let passing = write(&dir, "passing.yml", &job_down_test("2m"));
    let failing = write(&dir, "failing.yml", &job_down_test("1m"));
    let broken = write(&dir, "broken.yml", "tests: [\n");
    let junit = dir.path().join("report.xml");

    let runner = Runner::new(RunOptions {
        junit: Some(junit.clone()),
        ..RunOptions::default()
    })
    .unwrap();
    let passed = runner.run(&[passing, failing, broken]).unwrap();
    assert!(!passed);

    let xml = std::fs::read_to_string(&junit).unwrap();
    assert_eq!(xml.matches("<testsuite ").count(), 3);
    assert!(xml.contains("passing.yml\" tests=\"1\" failures=\"0\" errors=\"0\""));
    assert!(xml.contains("failing.yml\" tests=\"1\" failures=\"1\" errors=\"0\""));
    assert!(xml.contains("broken.yml\" tests=\"0\" failures=\"0\" errors=\"1\""));
    assert!(xml.contains("<failure>    alertname: JobDown, time: 1m, "));
}
