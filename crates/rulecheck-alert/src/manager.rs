use crate::error::AlertError;
use crate::group::Group;
use crate::rule_file::RuleGroups;
use rulecheck_common::duration::ModelDuration;
use rulecheck_common::labels::Labels;
use rulecheck_query::QueryEngine;
use rulecheck_storage::SeriesStore;
use std::path::PathBuf;
use std::sync::Arc;

/// Settings applied to every group loaded by [`load_groups`].
#[derive(Debug, Clone, Default)]
pub struct LoadOptions {
    /// Interval for groups that do not declare their own.
    pub interval: ModelDuration,
    pub external_labels: Labels,
    pub external_url: String,
    pub ignore_unknown_fields: bool,
}

/// Reads, validates and builds the groups of every file in `files`.
///
/// Groups come back in load order: file order first, then declaration order
/// within a file. If any file fails to read or validate, all errors found
/// across all files are returned instead.
pub fn load_groups(
    options: &LoadOptions,
    files: &[PathBuf],
    engine: Arc<dyn QueryEngine>,
    store: Arc<dyn SeriesStore>,
) -> Result<Vec<Group>, Vec<AlertError>> {
    let mut groups = Vec::new();
    let mut errors = Vec::new();

    for file in files {
        let path = file.display().to_string();
        let content = match std::fs::read_to_string(file) {
            Ok(content) => content,
            Err(source) => {
                errors.push(AlertError::Io { path, source });
                continue;
            }
        };
        let parsed = match RuleGroups::parse(&path, &content, options.ignore_unknown_fields) {
            Ok(parsed) => parsed,
            Err(mut errs) => {
                errors.append(&mut errs);
                continue;
            }
        };

        for rule_group in parsed.groups {
            let interval = rule_group
                .interval
                .filter(|i| !i.is_zero())
                .unwrap_or(options.interval);
            let mut rules = Vec::with_capacity(rule_group.rules.len());
            for node in &rule_group.rules {
                match node.build(rule_group.limit, &options.external_labels, &options.external_url) {
                    Ok(rule) => rules.push(rule),
                    Err(e) => errors.push(e),
                }
            }
            tracing::debug!(
                file = %path,
                group = %rule_group.name,
                rules = rules.len(),
                interval = %interval,
                "Loaded rule group"
            );
            groups.push(Group::new(
                rule_group.name,
                path.clone(),
                interval,
                rules,
                Arc::clone(&engine),
                Arc::clone(&store),
            ));
        }
    }

    if errors.is_empty() {
        Ok(groups)
    } else {
        Err(errors)
    }
}
