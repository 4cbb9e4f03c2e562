use crate::error::AlertError;
use crate::rule::Rule;
use rulecheck_common::duration::ModelDuration;
use rulecheck_common::labels::Labels;
use rulecheck_common::types::{stale_nan, Point, Timestamp};
use rulecheck_query::QueryEngine;
use rulecheck_storage::SeriesStore;
use std::collections::HashSet;
use std::sync::Arc;

/// A named, ordered set of rules evaluated together.
///
/// Rules run in declaration order and each rule's output is appended before
/// the next rule runs, so a rule may consume the series recorded by an
/// earlier one at the same instant.
pub struct Group {
    name: String,
    file: String,
    interval: ModelDuration,
    rules: Vec<Rule>,
    engine: Arc<dyn QueryEngine>,
    store: Arc<dyn SeriesStore>,
    /// Series each rule produced at the previous evaluation.
    previous_series: Vec<HashSet<Labels>>,
}

impl std::fmt::Debug for Group {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Group")
            .field("name", &self.name)
            .field("file", &self.file)
            .field("interval", &self.interval)
            .field("rules", &self.rules)
            .finish_non_exhaustive()
    }
}

impl Group {
    pub fn new(
        name: impl Into<String>,
        file: impl Into<String>,
        interval: ModelDuration,
        rules: Vec<Rule>,
        engine: Arc<dyn QueryEngine>,
        store: Arc<dyn SeriesStore>,
    ) -> Self {
        let previous_series = vec![HashSet::new(); rules.len()];
        Self {
            name: name.into(),
            file: file.into(),
            interval,
            rules,
            engine,
            store,
            previous_series,
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn file(&self) -> &str {
        &self.file
    }

    pub fn interval(&self) -> ModelDuration {
        self.interval
    }

    pub fn rules(&self) -> &[Rule] {
        &self.rules
    }

    pub fn rules_mut(&mut self) -> &mut [Rule] {
        &mut self.rules
    }

    /// Evaluates every rule at `ts`. Failures are recorded as the failing
    /// rule's last error and do not stop later rules.
    pub fn eval(&mut self, ts: Timestamp) {
        for (i, rule) in self.rules.iter_mut().enumerate() {
            let samples = match rule.eval(ts, self.engine.as_ref()) {
                Ok(samples) => {
                    rule.set_last_error(None);
                    samples
                }
                Err(e) => {
                    tracing::warn!(
                        group = %self.name,
                        rule = %rule.name(),
                        ts,
                        error = %e,
                        "Rule evaluation failed"
                    );
                    rule.set_last_error(Some(e));
                    continue;
                }
            };

            let mut returned = HashSet::with_capacity(samples.len());
            for sample in samples {
                match self.store.append(&sample.labels, sample.point()) {
                    Ok(()) => {
                        returned.insert(sample.labels);
                    }
                    Err(e) => {
                        tracing::warn!(
                            group = %self.name,
                            rule = %rule.name(),
                            series = %sample.labels,
                            error = %e,
                            "Rule sample append failed"
                        );
                        rule.set_last_error(Some(AlertError::Storage(e)));
                    }
                }
            }

            for gone in self.previous_series[i].difference(&returned) {
                // A series may already hold a newer point; staleness is best effort.
                if let Err(e) = self.store.append(gone, Point::float(ts, stale_nan())) {
                    tracing::debug!(series = %gone, error = %e, "Stale marker not written");
                }
            }
            self.previous_series[i] = returned;
        }
        tracing::debug!(group = %self.name, ts, rules = self.rules.len(), "Evaluated group");
    }
}
