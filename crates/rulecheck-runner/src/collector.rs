use crate::compare::{LabelAndAnnotation, LabelsAndAnnotations};
use rulecheck_alert::Group;
use std::collections::{BTreeSet, HashMap};

/// Firing alerts of every alerting rule named in `names`, across all groups.
///
/// Rules sharing a name in different groups contribute to the same entry.
/// Pending and resolved alerts are left out.
pub fn collect_firing(groups: &[Group], names: &BTreeSet<String>) -> HashMap<String, LabelsAndAnnotations> {
    let mut got: HashMap<String, LabelsAndAnnotations> = HashMap::new();
    for group in groups {
        for rule in group.rules() {
            let Some(alerting) = rule.as_alerting() else {
                continue;
            };
            if !names.contains(alerting.name()) {
                continue;
            }
            let entry = got.entry(alerting.name().to_string()).or_default();
            for alert in alerting.firing_alerts() {
                entry.push(LabelAndAnnotation {
                    labels: alert.labels.clone(),
                    annotations: alert.annotations.clone(),
                });
            }
        }
    }
    got
}
