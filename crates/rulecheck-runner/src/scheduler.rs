use crate::error::{Result, UnitTestError};
use rulecheck_alert::Group;
use rulecheck_common::duration::ModelDuration;
use rulecheck_common::types::Timestamp;
use rulecheck_storage::loader::LazyLoader;
use std::collections::HashMap;

/// Evaluation priority of rule groups, from `group_eval_order`.
///
/// A listed group gets its position as priority; unlisted groups get 0.
/// Groups are sorted stably, so equal priorities keep their load order.
#[derive(Debug, Clone, Default)]
pub struct GroupOrder {
    priorities: HashMap<String, usize>,
}

impl GroupOrder {
    pub fn new(names: &[String]) -> Result<Self> {
        let mut priorities = HashMap::with_capacity(names.len());
        for (i, name) in names.iter().enumerate() {
            if priorities.insert(name.clone(), i).is_some() {
                return Err(UnitTestError::Validation(format!(
                    "group name repeated in evaluation order: {name}"
                )));
            }
        }
        Ok(Self { priorities })
    }

    pub fn priority(&self, group: &str) -> usize {
        self.priorities.get(group).copied().unwrap_or(0)
    }

    pub fn sort(&self, groups: &mut [Group]) {
        groups.sort_by_key(|g| self.priority(g.name()));
    }
}

/// Why a step did not complete cleanly.
#[derive(Debug)]
pub enum StepError {
    /// Input data could not be revealed; the groups were not evaluated.
    Load(UnitTestError),
    /// One or more rules failed. Nothing after this step can be trusted.
    Evaluation(Vec<UnitTestError>),
}

/// Drives the rule groups of one test group along the timeline.
pub struct Scheduler {
    loader: LazyLoader,
    groups: Vec<Group>,
}

impl Scheduler {
    /// Orders `groups` and marks every alerting rule restored, so `ALERTS`
    /// series are written from the first evaluation on.
    pub fn new(loader: LazyLoader, mut groups: Vec<Group>, order: &GroupOrder) -> Self {
        order.sort(&mut groups);
        for group in &mut groups {
            for rule in group.rules_mut() {
                if let Some(alerting) = rule.as_alerting_mut() {
                    alerting.set_restored(true);
                }
            }
        }
        tracing::debug!(
            groups = ?groups.iter().map(Group::name).collect::<Vec<_>>(),
            "Scheduled rule groups"
        );
        Self { loader, groups }
    }

    pub fn groups(&self) -> &[Group] {
        &self.groups
    }

    /// Reveals input data up to `ts`, then evaluates every group in order.
    pub fn step(&mut self, ts: Timestamp) -> std::result::Result<(), StepError> {
        let groups = &mut self.groups;
        self.loader.with_samples_till(ts, |loaded| {
            loaded.map_err(|e| StepError::Load(UnitTestError::Load(e)))?;

            let mut errors = Vec::new();
            for group in groups.iter_mut() {
                group.eval(ts);
                for rule in group.rules() {
                    if let Some(err) = rule.last_error() {
                        errors.push(UnitTestError::Evaluation {
                            rule: rule.name().to_string(),
                            time: ModelDuration::from_millis(ts),
                            message: err.to_string(),
                        });
                    }
                }
            }
            if errors.is_empty() {
                Ok(())
            } else {
                Err(StepError::Evaluation(errors))
            }
        })
    }

    /// Tears down the store backing this test group.
    pub fn close(mut self) -> Result<()> {
        self.groups.clear();
        self.loader.close().map_err(UnitTestError::Load)
    }
}
