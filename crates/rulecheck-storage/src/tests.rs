use crate::loader::LazyLoader;
use crate::memory::MemoryStore;
use crate::{SeriesStore, StorageError};
use rulecheck_common::labels::Labels;
use rulecheck_common::matcher::{LabelMatcher, MatchOp};
use rulecheck_common::types::Point;

fn up(job: &str) -> Labels {
    Labels::from_pairs([("__name__", "up"), ("job", job)])
}

#[test]
fn append_rejects_out_of_order_and_conflicting_duplicates() {
    let store = MemoryStore::new();
    store.append(&up("a"), Point::float(1000, 1.0)).unwrap();
    store.append(&up("a"), Point::float(1000, 1.0)).unwrap();

    let err = store.append(&up("a"), Point::float(1000, 2.0)).unwrap_err();
    assert!(matches!(err, StorageError::DuplicateSample { t: 1000, .. }));

    let err = store.append(&up("a"), Point::float(500, 1.0)).unwrap_err();
    assert!(matches!(err, StorageError::OutOfOrderSample { t: 500, last: 1000, .. }));

    // Other series are independent.
    store.append(&up("b"), Point::float(500, 1.0)).unwrap();
    assert_eq!(store.series_count(), 2);
}

#[test]
fn select_filters_by_matchers_and_range() {
    let store = MemoryStore::new();
    for t in [0, 60_000, 120_000] {
        store.append(&up("a"), Point::float(t, 1.0)).unwrap();
        store.append(&up("b"), Point::float(t, 0.0)).unwrap();
    }
    let job_a = LabelMatcher::new(MatchOp::Equal, "job", "a").unwrap();
    let series = store.select(&[job_a], 30_000, 120_000);
    assert_eq!(series.len(), 1);
    assert_eq!(series[0].labels, up("a"));
    let ts: Vec<i64> = series[0].points.iter().map(|p| p.t).collect();
    assert_eq!(ts, vec![60_000, 120_000]);

    assert!(store.select(&[], 200_000, 300_000).is_empty());
    store.clear();
    assert_eq!(store.series_count(), 0);
}

#[test]
fn loader_reveals_points_incrementally() {
    let mut loader = LazyLoader::new(
        "load 1m\n    up{job=\"a\"} 1 _ 0 0\n    up{job=\"b\"} 1x3\n",
    )
    .unwrap();
    let store = loader.storage();
    assert_eq!(store.series_count(), 0);

    loader.with_samples_till(0, |res| res.unwrap());
    let series = store.select(&[], 0, i64::MAX);
    assert_eq!(series.len(), 2);
    assert!(series.iter().all(|s| s.points.len() == 1));

    // The omitted step at 1m leaves job="a" unchanged.
    loader.with_samples_till(60_000, |res| res.unwrap());
    let a = store.select(&[LabelMatcher::new(MatchOp::Equal, "job", "a").unwrap()], 0, i64::MAX);
    assert_eq!(a[0].points.len(), 1);

    loader.with_samples_till(179_999, |res| res.unwrap());
    let a = store.select(&[LabelMatcher::new(MatchOp::Equal, "job", "a").unwrap()], 0, i64::MAX);
    assert_eq!(a[0].points.last().map(|p| p.t), Some(120_000));
}

#[test]
fn loader_callback_receives_result() {
    let mut loader = LazyLoader::new("load 30s\n  x 1 2 3").unwrap();
    let visible = loader.with_samples_till(30_000, |res| {
        res.is_ok()
    });
    assert!(visible);
    assert_eq!(loader.interval().as_millis(), 30_000);
}

#[test]
fn loader_rejects_malformed_commands() {
    assert!(matches!(
        LazyLoader::new(""),
        Err(StorageError::InvalidLoadCommand(_))
    ));
    assert!(LazyLoader::new("eval instant at 1m up").is_err());
    assert!(LazyLoader::new("load 0s\n up 1").is_err());
    assert!(matches!(
        LazyLoader::new("load 1m\n up{ 1"),
        Err(StorageError::Parse(_))
    ));
    assert!(LazyLoader::new("load 1m\n up 1\n up 2").is_err());
}

#[test]
fn close_and_drop_tear_down_the_store() {
    let mut loader = LazyLoader::new("load 1m\n up 1 1").unwrap();
    let store = loader.storage();
    loader.with_samples_till(60_000, |res| res.unwrap());
    assert_eq!(store.series_count(), 1);
    loader.close().unwrap();
    assert_eq!(store.series_count(), 0);
    loader.close().unwrap();

    let mut loader = LazyLoader::new("load 1m\n up 1 1").unwrap();
    let store = loader.storage();
    loader.with_samples_till(0, |res| res.unwrap());
    drop(loader);
    assert_eq!(store.series_count(), 0);
}
