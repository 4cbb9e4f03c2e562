use crate::config::AlertTestCase;
use crate::error::{Result, UnitTestError};
use rulecheck_common::duration::ModelDuration;
use std::collections::{BTreeMap, BTreeSet};

/// Alert expectations grouped by the instant they are checked at.
///
/// Built once per test group. The timeline asks [`ExpectationIndex::due`]
/// for the instants falling inside each step, so the expectations are never
/// rescanned.
#[derive(Debug)]
pub struct ExpectationIndex<'a> {
    instants: Vec<ModelDuration>,
    names: BTreeMap<ModelDuration, BTreeSet<String>>,
    cases: BTreeMap<ModelDuration, Vec<&'a AlertTestCase>>,
    cursor: usize,
}

impl<'a> ExpectationIndex<'a> {
    /// Indexes `tests`. Every test case must name the alert it checks.
    pub fn build(tests: &'a [AlertTestCase], group_name: &str) -> Result<Self> {
        let mut names: BTreeMap<ModelDuration, BTreeSet<String>> = BTreeMap::new();
        let mut cases: BTreeMap<ModelDuration, Vec<&'a AlertTestCase>> = BTreeMap::new();

        for test in tests {
            if test.alertname.is_empty() {
                let in_group = if group_name.is_empty() {
                    String::new()
                } else {
                    format!(" (in TestGroup {group_name})")
                };
                return Err(UnitTestError::Validation(format!(
                    "an item under alert_rule_test misses required attribute alertname at eval_time {}{in_group}",
                    test.eval_time
                )));
            }
            names
                .entry(test.eval_time)
                .or_default()
                .insert(test.alertname.clone());
            cases.entry(test.eval_time).or_default().push(test);
        }

        Ok(Self {
            instants: cases.keys().copied().collect(),
            names,
            cases,
            cursor: 0,
        })
    }

    /// Distinct instants with at least one alert expectation, ascending.
    pub fn instants(&self) -> &[ModelDuration] {
        &self.instants
    }

    /// Consumes and returns the instants `t` with `step_start <= t < step_start + step`.
    ///
    /// An instant on a step boundary belongs to the step starting there.
    pub fn due(&mut self, step_start: ModelDuration, step: ModelDuration) -> Vec<ModelDuration> {
        let step_end = step_start.as_millis().saturating_add(step.as_millis());
        let mut due = Vec::new();
        while let Some(&t) = self.instants.get(self.cursor) {
            if t < step_start || t.as_millis() >= step_end {
                break;
            }
            due.push(t);
            self.cursor += 1;
        }
        due
    }

    /// Alert names expected at `instant`.
    pub fn names_at(&self, instant: ModelDuration) -> Option<&BTreeSet<String>> {
        self.names.get(&instant)
    }

    /// Test cases due at `instant`, in declaration order.
    pub fn cases_at(&self, instant: ModelDuration) -> &[&'a AlertTestCase] {
        self.cases.get(&instant).map(Vec::as_slice).unwrap_or(&[])
    }
}
