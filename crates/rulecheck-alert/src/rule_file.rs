//! The rule-group YAML format.
//!
//! ```yaml
//! groups:
//!   - name: example
//!     interval: 1m
//!     rules:
//!       - record: job:up:sum
//!         expr: sum by (job) (up)
//!       - alert: JobDown
//!         expr: up == 0
//!         for: 5m
//!         labels:
//!           severity: page
//!         annotations:
//!           summary: "{{ $labels.job }} is down"
//! ```

use crate::alerting::AlertingRule;
use crate::error::AlertError;
use crate::recording::RecordingRule;
use crate::rule::Rule;
use crate::template::Template;
use rulecheck_common::duration::ModelDuration;
use rulecheck_common::labels::{is_valid_label_name, is_valid_metric_name, Labels};
use rulecheck_query::parse;
use serde::Deserialize;
use std::collections::HashSet;

const GROUP_FIELDS: &[&str] = &["name", "interval", "limit", "rules"];
const RULE_FIELDS: &[&str] = &[
    "record",
    "alert",
    "expr",
    "for",
    "keep_firing_for",
    "labels",
    "annotations",
];

/// Top level of a rule file.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RuleGroups {
    #[serde(default)]
    pub groups: Vec<RuleGroup>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct RuleGroup {
    #[serde(default)]
    pub name: String,
    #[serde(default)]
    pub interval: Option<ModelDuration>,
    /// Maximum number of series or alerts a rule may produce; 0 is unlimited.
    #[serde(default)]
    pub limit: usize,
    #[serde(default)]
    pub rules: Vec<RuleNode>,
}

/// One rule as written in the file, before validation.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RuleNode {
    #[serde(default)]
    pub record: Option<String>,
    #[serde(default)]
    pub alert: Option<String>,
    #[serde(default)]
    pub expr: String,
    #[serde(default, rename = "for")]
    pub hold: Option<ModelDuration>,
    #[serde(default)]
    pub keep_firing_for: Option<ModelDuration>,
    #[serde(default)]
    pub labels: Labels,
    #[serde(default)]
    pub annotations: Labels,
}

impl RuleGroups {
    /// Parses a rule file. Unknown fields are rejected unless
    /// `ignore_unknown_fields` is set. Every validation problem is returned.
    pub fn parse(path: &str, content: &str, ignore_unknown_fields: bool) -> Result<Self, Vec<AlertError>> {
        let yaml_error = |message: String| {
            vec![AlertError::Yaml {
                path: path.to_string(),
                message,
            }]
        };
        let doc: serde_yaml::Value = serde_yaml::from_str(content).map_err(|e| yaml_error(e.to_string()))?;
        if doc.is_null() {
            return Ok(Self::default());
        }
        if !ignore_unknown_fields {
            if let Some(message) = unknown_field(&doc) {
                return Err(yaml_error(message));
            }
        }
        let groups: Self = serde_yaml::from_value(doc).map_err(|e| yaml_error(e.to_string()))?;
        let errors = groups.validate(path);
        if errors.is_empty() {
            Ok(groups)
        } else {
            Err(errors)
        }
    }

    pub fn validate(&self, path: &str) -> Vec<AlertError> {
        let mut errors = Vec::new();
        let mut err = |message: String| {
            errors.push(AlertError::Validation {
                file: path.to_string(),
                message,
            })
        };
        let mut names = HashSet::new();
        for group in &self.groups {
            if group.name.is_empty() {
                err("Groupname must not be empty".into());
            } else if !names.insert(group.name.as_str()) {
                err(format!("groupname: {:?} is repeated in the same file", group.name));
            }
            for (i, rule) in group.rules.iter().enumerate() {
                for message in rule.validate() {
                    err(format!("group {:?}, rule {}, {message}", group.name, i + 1));
                }
            }
        }
        errors
    }
}

impl RuleNode {
    pub fn validate(&self) -> Vec<String> {
        let mut problems = Vec::new();
        let record = self.record.as_deref().filter(|s| !s.is_empty());
        let alert = self.alert.as_deref().filter(|s| !s.is_empty());
        match (record, alert) {
            (Some(_), Some(_)) => problems.push("only one of 'record' and 'alert' must be set".to_string()),
            (None, None) => problems.push("one of 'record' or 'alert' must be set".to_string()),
            _ => {}
        }

        if self.expr.trim().is_empty() {
            problems.push("field 'expr' must be set in rule".to_string());
        } else if let Err(e) = parse(&self.expr) {
            problems.push(format!("could not parse expression: {e}"));
        }

        if let Some(name) = record {
            if !self.annotations.is_empty() {
                problems.push("invalid field 'annotations' in recording rule".to_string());
            }
            if self.hold.is_some() {
                problems.push("invalid field 'for' in recording rule".to_string());
            }
            if self.keep_firing_for.is_some() {
                problems.push("invalid field 'keep_firing_for' in recording rule".to_string());
            }
            if !is_valid_metric_name(name) {
                problems.push(format!("invalid recording rule name: {name}"));
            }
        }

        for label in self.labels.iter() {
            if !is_valid_label_name(&label.name) {
                problems.push(format!("invalid label name: {}", label.name));
            }
        }
        if alert.is_some() {
            for annotation in self.annotations.iter() {
                if !is_valid_label_name(&annotation.name) {
                    problems.push(format!("invalid annotation name: {}", annotation.name));
                }
            }
            for text in self.labels.iter().chain(self.annotations.iter()).map(|l| &l.value) {
                if let Err(e) = Template::parse("__alert_validation", text) {
                    problems.push(e);
                }
            }
        }
        problems
    }

    /// Builds the runtime rule. Only valid nodes should be built.
    pub fn build(&self, limit: usize, external_labels: &Labels, external_url: &str) -> Result<Rule, AlertError> {
        let expr = parse(&self.expr)?;
        if let Some(name) = self.alert.as_deref().filter(|s| !s.is_empty()) {
            let rule = AlertingRule::new(
                name,
                expr,
                self.expr.clone(),
                self.hold.unwrap_or_default(),
                self.keep_firing_for.unwrap_or_default(),
                self.labels.clone(),
                self.annotations.clone(),
                external_labels.clone(),
                external_url,
            )
            .with_limit(limit);
            return Ok(Rule::Alerting(rule));
        }
        let name = self.record.clone().unwrap_or_default();
        Ok(Rule::Recording(
            RecordingRule::new(name, expr, self.expr.clone(), self.labels.clone()).with_limit(limit),
        ))
    }
}

/// First key not belonging to the rule-group format, if any.
fn unknown_field(doc: &serde_yaml::Value) -> Option<String> {
    let mapping = doc.as_mapping()?;
    for (key, value) in mapping {
        let key = key.as_str().unwrap_or_default();
        if key != "groups" {
            return Some(format!("field {key} not found in rule groups"));
        }
        for group in value.as_sequence().into_iter().flatten() {
            let Some(group) = group.as_mapping() else {
                continue;
            };
            for (gkey, gvalue) in group {
                let gkey = gkey.as_str().unwrap_or_default();
                if !GROUP_FIELDS.contains(&gkey) {
                    return Some(format!("field {gkey} not found in rule group"));
                }
                if gkey != "rules" {
                    continue;
                }
                for rule in gvalue.as_sequence().into_iter().flatten() {
                    for rkey in rule.as_mapping().into_iter().flat_map(|m| m.keys()) {
                        let rkey = rkey.as_str().unwrap_or_default();
                        if !RULE_FIELDS.contains(&rkey) {
                            return Some(format!("field {rkey} not found in rule"));
                        }
                    }
                }
            }
        }
    }
    None
}
