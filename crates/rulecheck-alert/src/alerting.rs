use crate::error::{AlertError, Result};
use crate::rule::query_vector;
use crate::template::{expand, TemplateData};
use rulecheck_common::duration::ModelDuration;
use rulecheck_common::labels::{Labels, ALERT_NAME, ALERT_STATE, METRIC_NAME};
use rulecheck_common::types::{Sample, Timestamp};
use rulecheck_query::{Expr, QueryEngine};
use std::collections::BTreeMap;
use std::fmt;

/// Series recording the state of every active alert.
pub const ALERTS_METRIC: &str = "ALERTS";

/// Series recording when each active alert became active, in seconds.
pub const ALERTS_FOR_STATE_METRIC: &str = "ALERTS_FOR_STATE";

/// How long a resolved alert is kept before being forgotten.
pub const RESOLVED_RETENTION: ModelDuration = ModelDuration::from_mins(15);

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum AlertState {
    Inactive,
    Pending,
    Firing,
}

impl fmt::Display for AlertState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Inactive => write!(f, "inactive"),
            Self::Pending => write!(f, "pending"),
            Self::Firing => write!(f, "firing"),
        }
    }
}

/// One alert instance produced by an alerting rule.
#[derive(Debug, Clone, PartialEq)]
pub struct Alert {
    pub state: AlertState,
    pub labels: Labels,
    pub annotations: Labels,
    pub value: f64,
    pub active_at: Timestamp,
    pub fired_at: Option<Timestamp>,
    pub resolved_at: Option<Timestamp>,
    pub keep_firing_since: Option<Timestamp>,
}

/// A rule that turns the samples of its expression into alerts.
///
/// A newly seen label set starts `Pending` and turns `Firing` once it has
/// been returned for at least `for`. When it stops being returned a firing
/// alert resolves (after `keep_firing_for`, if set) and a pending one is
/// dropped.
#[derive(Debug)]
pub struct AlertingRule {
    name: String,
    expr: Expr,
    expr_text: String,
    hold_duration: ModelDuration,
    keep_firing_for: ModelDuration,
    labels: Labels,
    annotations: Labels,
    external_labels: Labels,
    external_url: String,
    limit: usize,
    restored: bool,
    active: BTreeMap<Labels, Alert>,
    last_error: Option<AlertError>,
}

impl AlertingRule {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        name: impl Into<String>,
        expr: Expr,
        expr_text: impl Into<String>,
        hold_duration: ModelDuration,
        keep_firing_for: ModelDuration,
        labels: Labels,
        annotations: Labels,
        external_labels: Labels,
        external_url: impl Into<String>,
    ) -> Self {
        Self {
            name: name.into(),
            expr,
            expr_text: expr_text.into(),
            hold_duration,
            keep_firing_for,
            labels,
            annotations,
            external_labels,
            external_url: external_url.into(),
            limit: 0,
            restored: false,
            active: BTreeMap::new(),
            last_error: None,
        }
    }

    /// Caps the number of pending and firing alerts; 0 disables the cap.
    pub fn with_limit(mut self, limit: usize) -> Self {
        self.limit = limit;
        self
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn expr_text(&self) -> &str {
        &self.expr_text
    }

    pub fn hold_duration(&self) -> ModelDuration {
        self.hold_duration
    }

    /// A restored rule writes `ALERTS` and `ALERTS_FOR_STATE` series.
    pub fn set_restored(&mut self, restored: bool) {
        self.restored = restored;
    }

    pub fn restored(&self) -> bool {
        self.restored
    }

    pub fn last_error(&self) -> Option<&AlertError> {
        self.last_error.as_ref()
    }

    pub(crate) fn set_last_error(&mut self, err: Option<AlertError>) {
        self.last_error = err;
    }

    /// Alerts that are pending or firing, ordered by labels.
    pub fn active_alerts(&self) -> Vec<&Alert> {
        self.active.values().filter(|a| a.resolved_at.is_none()).collect()
    }

    /// Active alerts in the firing state.
    pub fn firing_alerts(&self) -> Vec<&Alert> {
        self.active
            .values()
            .filter(|a| a.resolved_at.is_none() && a.state == AlertState::Firing)
            .collect()
    }

    /// Evaluates the rule at `ts`, advancing alert states, and returns the
    /// series to append when restored.
    pub fn eval(&mut self, ts: Timestamp, engine: &dyn QueryEngine) -> Result<Vec<Sample>> {
        let samples = query_vector(engine, &self.expr, ts)?;

        let template_name = format!("__alert_{}", self.name);
        let mut current: BTreeMap<Labels, Alert> = BTreeMap::new();
        for sample in &samples {
            let data = TemplateData {
                labels: &sample.labels,
                external_labels: &self.external_labels,
                external_url: &self.external_url,
                value: sample.f,
            };
            let mut labels = sample.labels.without_metric_name();
            for label in self.labels.iter() {
                labels.set(label.name.clone(), expand(&template_name, &label.value, &data));
            }
            labels.set(ALERT_NAME, self.name.clone());

            let annotations: Labels = self
                .annotations
                .iter()
                .map(|a| (a.name.clone(), expand(&template_name, &a.value, &data)))
                .collect();

            if current.contains_key(&labels) {
                return Err(AlertError::DuplicateLabelset("alert"));
            }
            current.insert(
                labels.clone(),
                Alert {
                    state: AlertState::Pending,
                    labels,
                    annotations,
                    value: sample.f,
                    active_at: ts,
                    fired_at: None,
                    resolved_at: None,
                    keep_firing_since: None,
                },
            );
        }

        for (labels, alert) in current.iter() {
            match self.active.get_mut(labels) {
                Some(existing) if existing.state != AlertState::Inactive => {
                    existing.value = alert.value;
                    existing.annotations = alert.annotations.clone();
                }
                _ => {
                    self.active.insert(labels.clone(), alert.clone());
                }
            }
        }

        let mut out = Vec::new();
        let mut expired = Vec::new();
        for (labels, alert) in self.active.iter_mut() {
            if !current.contains_key(labels) {
                let mut keep_firing = false;
                if alert.state == AlertState::Firing && !self.keep_firing_for.is_zero() {
                    let since = *alert.keep_firing_since.get_or_insert(ts);
                    keep_firing = ts - since < self.keep_firing_for.as_millis();
                }
                let retention_over = alert
                    .resolved_at
                    .is_some_and(|r| ts - r > RESOLVED_RETENTION.as_millis());
                if alert.state == AlertState::Pending || retention_over {
                    expired.push(labels.clone());
                }
                if alert.state != AlertState::Inactive && !keep_firing {
                    alert.state = AlertState::Inactive;
                    alert.resolved_at = Some(ts);
                }
                if !keep_firing {
                    continue;
                }
            } else {
                alert.keep_firing_since = None;
            }

            if alert.state == AlertState::Pending && ts - alert.active_at >= self.hold_duration.as_millis() {
                alert.state = AlertState::Firing;
                alert.fired_at = Some(ts);
            }

            if self.restored {
                out.push(Sample::float(
                    alert
                        .labels
                        .clone()
                        .with(METRIC_NAME, ALERTS_METRIC)
                        .with(ALERT_STATE, alert.state.to_string()),
                    ts,
                    1.0,
                ));
                out.push(Sample::float(
                    alert.labels.clone().with(METRIC_NAME, ALERTS_FOR_STATE_METRIC),
                    ts,
                    (alert.active_at / 1000) as f64,
                ));
            }
        }
        for labels in expired {
            self.active.remove(&labels);
        }

        let pending_or_firing = self.active_alerts().len();
        if self.limit > 0 && pending_or_firing > self.limit {
            self.active.clear();
            return Err(AlertError::LimitExceeded {
                limit: self.limit,
                count: pending_or_firing,
                kind: "alerts",
            });
        }

        tracing::trace!(
            rule = %self.name,
            ts,
            active = self.active.len(),
            "Evaluated alerting rule"
        );
        Ok(out)
    }
}
