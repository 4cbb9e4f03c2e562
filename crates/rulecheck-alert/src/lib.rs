//! Rule evaluation for rulecheck.
//!
//! Rule files are loaded into [`group::Group`]s, each holding an ordered
//! list of [`rule::Rule`]s. Evaluating a group at an instant runs every rule
//! through a [`QueryEngine`](rulecheck_query::QueryEngine) and appends the
//! produced series back into the shared
//! [`SeriesStore`](rulecheck_storage::SeriesStore), so later rules and later
//! instants observe earlier results.

pub mod alerting;
pub mod error;
pub mod group;
pub mod manager;
pub mod recording;
pub mod rule;
pub mod rule_file;
pub mod template;


pub use alerting::{Alert, AlertState, AlertingRule};
pub use error::{AlertError, Result};
pub use group::Group;
pub use manager::{load_groups, LoadOptions};
pub use recording::RecordingRule;
pub use rule::Rule;
