use crate::error::{Result, StorageError};
use crate::memory::MemoryStore;
use crate::SeriesStore;
use rulecheck_common::duration::ModelDuration;
use rulecheck_common::labels::Labels;
use rulecheck_common::series::parse_series_desc;
use rulecheck_common::types::{Point, Timestamp};
use std::sync::Arc;

/// One declared input series with its not-yet-revealed points.
struct PendingSeries {
    labels: Labels,
    points: Vec<Point>,
    next: usize,
}

/// Holds every point declared by a `load` command and reveals them to the
/// store incrementally.
///
/// A load command is a header line `load <interval>` followed by one series
/// declaration per line; the n-th value of a series sits at `n * interval`.
///
/// # Examples
///
/// ```
/// use rulecheck_storage::loader::LazyLoader;
/// use rulecheck_storage::SeriesStore;
///
/// let mut loader = LazyLoader::new("load 1m\n  up{job=\"a\"} 1 1 0\n").unwrap();
/// loader.with_samples_till(60_000, |res| res.unwrap());
/// let series = loader.storage().select(&[], 0, i64::MAX);
/// assert_eq!(series[0].points.len(), 2);
/// ```
pub struct LazyLoader {
    store: Arc<MemoryStore>,
    interval: ModelDuration,
    series: Vec<PendingSeries>,
    closed: bool,
}

impl LazyLoader {
    pub fn new(command: &str) -> Result<Self> {
        let mut lines = command
            .lines()
            .map(str::trim)
            .filter(|l| !l.is_empty() && !l.starts_with('#'));

        let header = lines
            .next()
            .ok_or_else(|| StorageError::InvalidLoadCommand("empty command".into()))?;
        let interval_str = header
            .strip_prefix("load")
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .ok_or_else(|| StorageError::InvalidLoadCommand(format!("expected 'load <interval>', got {header:?}")))?;
        let interval: ModelDuration = interval_str.parse()?;
        if interval.is_zero() {
            return Err(StorageError::InvalidLoadCommand("load interval must be positive".into()));
        }

        let mut series: Vec<PendingSeries> = Vec::new();
        for line in lines {
            let (labels, values) = parse_series_desc(line)?;
            if series.iter().any(|s| s.labels == labels) {
                return Err(StorageError::InvalidLoadCommand(format!(
                    "series {labels} declared more than once"
                )));
            }
            let step = interval.as_millis();
            let points = values
                .into_iter()
                .enumerate()
                .filter(|(_, v)| !v.omitted)
                .map(|(i, v)| {
                    let t = i as i64 * step;
                    match v.histogram {
                        Some(h) => Point::histogram(t, h),
                        None => Point::float(t, v.value),
                    }
                })
                .collect();
            series.push(PendingSeries {
                labels,
                points,
                next: 0,
            });
        }

        tracing::debug!(
            interval = %interval,
            series = series.len(),
            "Parsed load command"
        );

        Ok(Self {
            store: Arc::new(MemoryStore::new()),
            interval,
            series,
            closed: false,
        })
    }

    pub fn storage(&self) -> Arc<MemoryStore> {
        Arc::clone(&self.store)
    }

    pub fn interval(&self) -> ModelDuration {
        self.interval
    }

    /// Appends every declared point with a timestamp at or before `ts` that
    /// has not been revealed yet, then hands the outcome to `f`.
    pub fn with_samples_till<R>(&mut self, ts: Timestamp, f: impl FnOnce(Result<()>) -> R) -> R {
        f(self.append_till(ts))
    }

    fn append_till(&mut self, ts: Timestamp) -> Result<()> {
        for pending in &mut self.series {
            while let Some(point) = pending.points.get(pending.next) {
                if point.t > ts {
                    break;
                }
                self.store.append(&pending.labels, point.clone())?;
                pending.next += 1;
            }
        }
        Ok(())
    }

    /// Tears the store down. Safe to call more than once.
    pub fn close(&mut self) -> Result<()> {
        if !self.closed {
            self.store.clear();
            self.series.clear();
            self.closed = true;
        }
        Ok(())
    }
}

impl Drop for LazyLoader {
    fn drop(&mut self) {
        if !self.closed {
            tracing::debug!("Closing lazy loader on drop");
            let _ = self.close();
        }
    }
}
