//! Advisory per-tree progress counters.

use serde::{Deserialize, Serialize};

/// Snapshot of a batch tree's progress gauges.
///
/// `done` counts nodes that reached any terminal state, so it includes `dead`.
/// The gauges are maintained best-effort alongside the record writes; treat
/// them as monitoring data, not as a completion signal.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchProgress {
    /// Nodes created in the tree so far.
    pub total: u64,
    /// Nodes that reached a terminal state.
    pub done: u64,
    /// Nodes that finalized as dead.
    pub dead: u64,
}

impl BatchProgress {
    /// Nodes that finalized successfully.
    pub fn succeeded(&self) -> u64 {
        self.done.saturating_sub(self.dead)
    }

    /// Nodes still open.
    pub fn pending(&self) -> u64 {
        self.total.saturating_sub(self.done)
    }

    /// Fraction of the tree finished, in percent. Empty trees read as 0.
    pub fn percent_done(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        (self.done as f64 / self.total as f64) * 100.0
    }
}

impl std::fmt::Display for BatchProgress {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(
            f,
            "{}/{} done ({} dead, {:.1}%)",
            self.done,
            self.total,
            self.dead,
            self.percent_done()
        )
    }
}
