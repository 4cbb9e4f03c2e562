use crate::duration::ModelDuration;
use crate::format::{format_float, format_float_exp};
use crate::histogram::FloatHistogram;
use crate::labels::{Labels, ALERT_NAME};
use crate::matcher::{LabelMatcher, MatchOp};
use crate::series::{parse_metric, parse_series_desc};
use crate::types::is_stale_nan;
use std::collections::BTreeMap;

#[test]
fn labels_are_sorted_and_deduplicated() {
    let labels = Labels::from_pairs([("b", "2"), ("a", "1"), ("b", "3")]);
    let names: Vec<&str> = labels.iter().map(|l| l.name.as_str()).collect();
    assert_eq!(names, vec!["a", "b"]);
    assert_eq!(labels.get("b"), Some("3"));
}

#[test]
fn labels_set_empty_value_removes() {
    let mut labels = Labels::from_pairs([("job", "api"), ("instance", "x")]);
    labels.set("instance", "");
    assert!(!labels.has("instance"));
    assert_eq!(labels.len(), 1);
}

#[test]
fn labels_ordering_compares_pairs_then_length() {
    let a = Labels::from_pairs([("job", "a")]);
    let b = Labels::from_pairs([("job", "b")]);
    let a_more = Labels::from_pairs([("job", "a"), ("zone", "1")]);
    let other_name = Labels::from_pairs([("instance", "z")]);
    assert!(a < b);
    assert!(a < a_more);
    assert!(a_more < b);
    assert!(other_name < a);
}

#[test]
fn labels_serialize_as_json_object() {
    let labels = Labels::from_pairs([(ALERT_NAME, "JobDown"), ("job", "a")]);
    let json = serde_json::to_string(&labels).unwrap();
    assert_eq!(json, r#"{"alertname":"JobDown","job":"a"}"#);
}

#[test]
fn labels_deserialize_from_yaml_map() {
    let labels: Labels = serde_yaml::from_str("region: eu\nenv: prod\n").unwrap();
    assert_eq!(labels.to_string(), r#"{env="prod", region="eu"}"#);
    let map: BTreeMap<String, String> = labels.to_map();
    assert_eq!(Labels::from_map(&map), labels);
}

#[test]
fn keep_and_drop_names() {
    let labels = Labels::from_pairs([("__name__", "up"), ("job", "a"), ("instance", "i")]);
    assert_eq!(labels.keep(&["job".into()]).to_string(), r#"{job="a"}"#);
    assert_eq!(
        labels.drop_names(&["job".into()]).without_metric_name().to_string(),
        r#"{instance="i"}"#
    );
}

#[test]
fn matchers_treat_missing_label_as_empty() {
    let eq_empty = LabelMatcher::new(MatchOp::Equal, "zone", "").unwrap();
    assert!(eq_empty.matches_labels(&Labels::from_pairs([("job", "a")])));
    let ne = LabelMatcher::new(MatchOp::NotEqual, "job", "a").unwrap();
    assert!(!ne.matches_labels(&Labels::from_pairs([("job", "a")])));
    let nre = LabelMatcher::new(MatchOp::NotRegex, "job", "a.*").unwrap();
    assert!(nre.matches_labels(&Labels::from_pairs([("job", "b")])));
    assert!(LabelMatcher::new(MatchOp::Regex, "job", "(").is_err());
}

#[test]
fn regex_matchers_are_anchored_and_dot_matches_newline() {
    let re = LabelMatcher::new(MatchOp::Regex, "msg", "a.b").unwrap();
    assert!(re.matches("a\nb"));
    assert!(!re.matches("xa\nb"));
    assert!(!re.matches("a\nbx"));
}

#[test]
fn duration_parse_and_format() {
    let cases = [
        ("0s", 0),
        ("0", 0),
        ("90s", 90_000),
        ("1m30s", 90_000),
        ("2h", 7_200_000),
        ("1d", 86_400_000),
        ("1w", 604_800_000),
        ("500ms", 500),
        ("1m500ms", 60_500),
    ];
    for (input, ms) in cases {
        let d: ModelDuration = input.parse().unwrap();
        assert_eq!(d.as_millis(), ms, "parsing {input}");
    }
    assert_eq!(ModelDuration::from_millis(90_000).to_string(), "1m30s");
    assert_eq!(ModelDuration::from_millis(8 * 86_400_000).to_string(), "8d");
    assert_eq!(ModelDuration::from_millis(14 * 86_400_000).to_string(), "2w");
    assert!("".parse::<ModelDuration>().is_err());
    assert!("5x".parse::<ModelDuration>().is_err());
    assert!("1s1m".parse::<ModelDuration>().is_err());
}

#[test]
fn duration_deserializes_from_yaml_string_and_zero() {
    let d: ModelDuration = serde_yaml::from_str("5m").unwrap();
    assert_eq!(d, ModelDuration::from_mins(5));
    let zero: ModelDuration = serde_yaml::from_str("0").unwrap();
    assert!(zero.is_zero());
    assert!(serde_yaml::from_str::<ModelDuration>("5").is_err());
}

#[test]
fn next_whole_second_rounds_up() {
    assert_eq!(ModelDuration::from_millis(1500).next_whole_second().as_millis(), 2000);
    assert_eq!(ModelDuration::from_millis(2000).next_whole_second().as_millis(), 3000);
}

#[test]
fn float_formatting() {
    assert_eq!(format_float(123456.0), "123456");
    assert_eq!(format_float(1234567.0), "1.234567e+06");
    assert_eq!(format_float(0.0001), "0.0001");
    assert_eq!(format_float(0.00001), "1e-05");
    assert_eq!(format_float(f64::NAN), "NaN");
    assert_eq!(format_float_exp(0.5), "5E-01");
    assert_eq!(format_float_exp(1e21), "1E+21");
}

#[test]
fn parse_metric_variants() {
    let labels = parse_metric(r#"{__name__="up", job="a",}"#).unwrap();
    assert_eq!(labels.get("__name__"), Some("up"));
    assert_eq!(labels.get("job"), Some("a"));

    let escaped = parse_metric(r#"x{msg="say \"hi\""}"#).unwrap();
    assert_eq!(escaped.get("msg"), Some(r#"say "hi""#));

    assert!(parse_metric(r#"up{__name__="x"}"#).is_err());
    assert!(parse_metric(r#"up{job="a" job="b"}"#).is_err());
    assert!(parse_metric("up trailing").is_err());
}

#[test]
fn series_expanding_notation() {
    let (_, values) = parse_series_desc("m 0+10x3 5-1x2 3x2").unwrap();
    let floats: Vec<f64> = values.iter().map(|v| v.value).collect();
    assert_eq!(floats, vec![0.0, 10.0, 20.0, 30.0, 5.0, 4.0, 3.0, 3.0, 3.0, 3.0]);
}

#[test]
fn series_blanks_and_stale() {
    let (_, values) = parse_series_desc("m 1 _x3 stale -Inf 1e3").unwrap();
    assert_eq!(values.len(), 7);
    assert!(values[1..4].iter().all(|v| v.omitted));
    assert!(is_stale_nan(values[4].value));
    assert_eq!(values[5].value, f64::NEG_INFINITY);
    assert_eq!(values[6].value, 1000.0);
}

#[test]
fn series_exponent_sign_is_not_an_increment() {
    let (_, values) = parse_series_desc("m 1e-1+1e+0x1").unwrap();
    assert_eq!(values.len(), 2);
    assert!((values[0].value - 0.1).abs() < 1e-12);
    assert!((values[1].value - 1.1).abs() < 1e-12);
}

#[test]
fn series_rejects_garbage() {
    assert!(parse_series_desc("m 1 two").is_err());
    assert!(parse_series_desc("m 1xq").is_err());
    assert!(parse_series_desc("m {{schema:0").is_err());
}

#[test]
fn series_repetition_count_is_bounded() {
    let err = parse_series_desc("m 1x18446744073709551615").unwrap_err();
    assert!(err.to_string().contains("repetition count"), "{err}");
    assert!(parse_series_desc("m _x18446744073709551615").is_err());
    assert!(parse_series_desc("m {{count:1}}x18446744073709551615").is_err());
    assert!(parse_series_desc("m 1+1x99999999999").is_err());

    let (_, values) = parse_series_desc("m 0+1x1000").unwrap();
    assert_eq!(values.len(), 1001);
}

#[test]
fn series_histograms() {
    let (labels, values) =
        parse_series_desc("{} {{schema:0 count:1 sum:2 buckets:[1]}}+{{count:1 sum:2 buckets:[1]}}x2")
            .unwrap();
    assert!(labels.is_empty());
    assert_eq!(values.len(), 3);
    let last = values[2].histogram.as_ref().unwrap();
    assert_eq!(last.test_expression(), "{{count:3 sum:6 buckets:[3]}}");

    let (_, repeated) = parse_series_desc("h {{count:1}}x1 {{count:5}}").unwrap();
    assert_eq!(repeated.len(), 3);

    let (labels, values) = parse_series_desc("latency {{schema:0 count:1 sum:2 buckets:[1]}}").unwrap();
    assert_eq!(labels.get("__name__"), Some("latency"));
    assert_eq!(labels.len(), 1);
    assert_eq!(values.len(), 1);
    assert!(values[0].histogram.is_some());

    let (labels, _) = parse_series_desc(r#"latency{le="1"} {{count:1}}"#).unwrap();
    assert_eq!(labels.get("le"), Some("1"));
}

#[test]
fn histogram_expression_is_canonical() {
    let h = FloatHistogram::parse(
        "{{schema:1 count:10 sum:20 z_bucket:2 z_bucket_w:0.001 buckets:[1 0 3] offset:-1 n_buckets:[4]}}",
    )
    .unwrap();
    assert_eq!(
        h.test_expression(),
        "{{schema:1 count:10 sum:20 z_bucket:2 z_bucket_w:0.001 offset:-1 buckets:[1 0 3] n_buckets:[4]}}"
    );
    assert!(FloatHistogram::parse("{{bogus:1}}").is_err());
    assert!(FloatHistogram::parse("schema:0").is_err());
}

#[test]
fn histogram_add_requires_same_schema() {
    let a = FloatHistogram::parse("{{schema:0 count:1}}").unwrap();
    let b = FloatHistogram::parse("{{schema:1 count:1}}").unwrap();
    assert!(a.add(&b).is_err());
    let sum = a.add(&a).unwrap();
    assert_eq!(sum.count, 2.0);
}
