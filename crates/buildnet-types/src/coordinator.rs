//! Coordinator lifecycle phases

use serde::{Deserialize, Serialize};

/// Phase reached by the coordinator during a provisioning run
///
/// `Absent -> Deploying -> Running -> Configuring -> Configured`
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CoordinatorPhase {
    /// No coordinator container
    Absent,
    /// Run request issued, control plane not answering yet
    Deploying,
    /// Control plane answers, first-run setup not applied
    Running,
    /// Setup script delivered or extensions being installed
    Configuring,
    /// Admin script and all required extensions applied
    Configured,
}

impl CoordinatorPhase {
    /// Whether a transition to `next` follows the lifecycle order
    pub fn can_advance_to(self, next: CoordinatorPhase) -> bool {
        next >= self
    }
}

impl std::fmt::Display for CoordinatorPhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            CoordinatorPhase::Absent => "absent",
            CoordinatorPhase::Deploying => "deploying",
            CoordinatorPhase::Running => "running",
            CoordinatorPhase::Configuring => "configuring",
            CoordinatorPhase::Configured => "configured",
        };
        f.write_str(name)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_phase_order() {
        assert!(CoordinatorPhase::Absent.can_advance_to(CoordinatorPhase::Deploying));
        assert!(CoordinatorPhase::Running.can_advance_to(CoordinatorPhase::Configured));
        assert!(!CoordinatorPhase::Configured.can_advance_to(CoordinatorPhase::Deploying));
    }
}
