use crate::error::{Result, StorageError};
use crate::SeriesStore;
use rulecheck_common::labels::Labels;
use rulecheck_common::matcher::LabelMatcher;
use rulecheck_common::types::{Point, Series, Timestamp};
use std::collections::BTreeMap;
use std::sync::{PoisonError, RwLock, RwLockReadGuard, RwLockWriteGuard};

/// Series kept in a sorted map, each an append-only vector of points.
#[derive(Default)]
pub struct MemoryStore {
    series: RwLock<BTreeMap<Labels, Vec<Point>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn read(&self) -> RwLockReadGuard<'_, BTreeMap<Labels, Vec<Point>>> {
        self.series.read().unwrap_or_else(PoisonError::into_inner)
    }

    fn write(&self) -> RwLockWriteGuard<'_, BTreeMap<Labels, Vec<Point>>> {
        self.series.write().unwrap_or_else(PoisonError::into_inner)
    }
}

impl SeriesStore for MemoryStore {
    fn append(&self, labels: &Labels, point: Point) -> Result<()> {
        let mut series = self.write();
        let points = series.entry(labels.clone()).or_default();
        if let Some(last) = points.last() {
            if point.t < last.t {
                return Err(StorageError::OutOfOrderSample {
                    series: labels.to_string(),
                    t: point.t,
                    last: last.t,
                });
            }
            if point.t == last.t {
                let same = last.f.to_bits() == point.f.to_bits() && last.h == point.h;
                if same {
                    return Ok(());
                }
                return Err(StorageError::DuplicateSample {
                    series: labels.to_string(),
                    t: point.t,
                });
            }
        }
        points.push(point);
        Ok(())
    }

    fn select(&self, matchers: &[LabelMatcher], mint: Timestamp, maxt: Timestamp) -> Vec<Series> {
        let series = self.read();
        series
            .iter()
            .filter(|(labels, _)| matchers.iter().all(|m| m.matches_labels(labels)))
            .filter_map(|(labels, points)| {
                let start = points.partition_point(|p| p.t < mint);
                let end = points.partition_point(|p| p.t <= maxt);
                if start >= end {
                    return None;
                }
                Some(Series {
                    labels: labels.clone(),
                    points: points[start..end].to_vec(),
                })
            })
            .collect()
    }

    fn series_count(&self) -> usize {
        self.read().len()
    }

    fn clear(&self) {
        self.write().clear();
    }
}
