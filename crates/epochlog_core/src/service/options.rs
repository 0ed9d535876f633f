//! Persistor configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

/// What `end_experiment` does when epoch groups are still open.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OpenGroupPolicy {
    /// Fail with `InvalidState`.
    #[default]
    Reject,
    /// End the open groups innermost-first at the experiment end time.
    CloseOpenGroups,
    /// End the experiment and leave the groups open (logged as a warning).
    Allow,
}

/// Tunables for one persistor instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PersistorOptions {
    pub open_group_policy: OpenGroupPolicy,
    /// Rebuild the open experiment and open-group stack when attaching to a
    /// container that holds unterminated entities.
    pub recover_open_state: bool,
    /// SQLite busy timeout for file-backed containers.
    pub busy_timeout_ms: u64,
}

impl Default for PersistorOptions {
    fn default() -> Self {
        Self {
            open_group_policy: OpenGroupPolicy::Reject,
            recover_open_state: true,
            busy_timeout_ms: 5_000,
        }
    }
}

impl PersistorOptions {
    pub fn busy_timeout(&self) -> Duration {
        Duration::from_millis(self.busy_timeout_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::{OpenGroupPolicy, PersistorOptions};

    #[test]
    fn missing_fields_fall_back_to_defaults() {
        let options: PersistorOptions =
            serde_json::from_str(r#"{ "open_group_policy": "close_open_groups" }"#).unwrap();
        assert_eq!(options.open_group_policy, OpenGroupPolicy::CloseOpenGroups);
        assert!(options.recover_open_state);
        assert_eq!(options.busy_timeout_ms, 5_000);
    }
}
