use serde::{Deserialize, Serialize};

/// Runtime tunables. Deserializable so hosts can keep them in their own
/// config files; missing fields take the defaults.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Commits allowed in one `work`/`flush` call before the runtime treats
    /// effect-driven updates as a loop.
    pub max_commits_per_flush: usize,
    /// Node visits per transition slice for `Runtime::work_slice`.
    pub default_work_budget: usize,
    /// Build output trees for every commit report.
    pub deliver_output: bool,
}

impl RuntimeConfig {
    pub const DEFAULT_MAX_COMMITS: usize = 50;
    pub const DEFAULT_WORK_BUDGET: usize = 256;

    pub fn with_max_commits_per_flush(mut self, max: usize) -> Self {
        self.max_commits_per_flush = max.max(1);
        self
    }

    pub fn with_default_work_budget(mut self, budget: usize) -> Self {
        self.default_work_budget = budget.max(1);
        self
    }

    pub fn with_deliver_output(mut self, deliver: bool) -> Self {
        self.deliver_output = deliver;
        self
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            max_commits_per_flush: Self::DEFAULT_MAX_COMMITS,
            default_work_budget: Self::DEFAULT_WORK_BUDGET,
            deliver_output: true,
        }
    }
}
