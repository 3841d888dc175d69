//! Local vs. server item count comparison.

use tracing::{info, warn};

/// Outcome of comparing local and server item counts after a sync.
///
/// Divergence is a finding, not an error: it is reported and left for the
/// next run to reconcile.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Consistency {
    InSync { count: u64 },
    Diverged { local: u64, server: u64 },
}

impl Consistency {
    pub fn is_in_sync(&self) -> bool {
        matches!(self, Consistency::InSync { .. })
    }
}

/// Compares the counts and logs the result.
pub fn check(resource: &str, local: u64, server: u64) -> Consistency {
    if local == server {
        info!(resource, count = local, "local store in sync with server");
        Consistency::InSync { count: local }
    } else {
        warn!(resource, local, server, "local store diverged from server");
        Consistency::Diverged { local, server }
    }
}
