use crate::error::{Result, UnitTestError};
use rulecheck_common::duration::ModelDuration;
use rulecheck_common::types::Timestamp;

/// The evaluation instants of one test group: `start`, `start + step`, ...
/// up to and including the last instant not past `start + max`.
///
/// # Examples
///
/// ```
/// use rulecheck_common::duration::ModelDuration;
/// use rulecheck_runner::timeline::Timeline;
///
/// let steps: Vec<i64> = Timeline::new(0, ModelDuration::from_mins(1), ModelDuration::from_secs(150))
///     .unwrap()
///     .collect();
/// assert_eq!(steps, vec![0, 60_000, 120_000]);
/// ```
#[derive(Debug, Clone)]
pub struct Timeline {
    next: Option<Timestamp>,
    step: i64,
    end: Timestamp,
}

impl Timeline {
    pub fn new(start: Timestamp, step: ModelDuration, max: ModelDuration) -> Result<Self> {
        if step.as_millis() <= 0 {
            return Err(UnitTestError::Configuration(format!(
                "evaluation interval must be positive, got {step}"
            )));
        }
        Ok(Self {
            next: Some(start),
            step: step.as_millis(),
            end: start.saturating_add(max.as_millis()),
        })
    }

    pub fn step(&self) -> ModelDuration {
        ModelDuration::from_millis(self.step)
    }
}

impl Iterator for Timeline {
    type Item = Timestamp;

    fn next(&mut self) -> Option<Timestamp> {
        let current = self.next.filter(|ts| *ts <= self.end)?;
        self.next = current.checked_add(self.step);
        Some(current)
    }
}
