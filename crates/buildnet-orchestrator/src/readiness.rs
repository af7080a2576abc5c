//! Deadline-bounded readiness polling

use buildnet_control::ControlPlane;
use std::time::Duration;
use tokio::time::{sleep, timeout, Instant};
use tracing::debug;

/// Poll settings for [`wait_for_ready`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ReadinessPolicy {
    /// Overall deadline
    pub deadline: Duration,
    /// Sleep between probes
    pub interval: Duration,
    /// Upper bound of one probe
    pub probe_timeout: Duration,
}

impl ReadinessPolicy {
    pub fn from_timings(timings: &buildnet_types::Timings) -> Self {
        Self {
            deadline: timings.readiness_timeout(),
            interval: timings.readiness_poll_interval(),
            probe_timeout: timings.probe_timeout(),
        }
    }

    pub fn with_deadline(mut self, deadline: Duration) -> Self {
        self.deadline = deadline;
        self
    }
}

/// Probe until the control plane answers or the deadline passes
///
/// A probe that errors or exceeds its own timeout counts as "not yet ready".
pub async fn wait_for_ready(plane: &dyn ControlPlane, policy: ReadinessPolicy) -> bool {
    let started = Instant::now();
    let deadline = started + policy.deadline;
    let mut attempts = 0u32;

    loop {
        attempts += 1;
        let remaining = deadline.saturating_duration_since(Instant::now());
        let probe_budget = policy.probe_timeout.min(remaining.max(Duration::from_millis(1)));

        if let Ok(true) = timeout(probe_budget, plane.is_ready()).await {
            debug!(attempts, elapsed = ?started.elapsed(), "Coordinator ready");
            return true;
        }

        let now = Instant::now();
        if now >= deadline {
            debug!(attempts, "Readiness deadline reached");
            return false;
        }
        sleep(policy.interval.min(deadline - now)).await;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use buildnet_control::testing::FakeControlPlane;

    fn policy(deadline_ms: u64) -> ReadinessPolicy {
        ReadinessPolicy {
            deadline: Duration::from_millis(deadline_ms),
            interval: Duration::from_millis(50),
            probe_timeout: Duration::from_millis(20),
        }
    }

    #[tokio::test]
    async fn test_ready_on_first_probe() {
        let plane = FakeControlPlane::new();
        assert!(wait_for_ready(&plane, policy(1_000)).await);
        assert_eq!(plane.probes(), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn test_unreachable_returns_false_at_deadline() {
        let plane = FakeControlPlane::new().unreachable();
        let started = Instant::now();

        assert!(!wait_for_ready(&plane, policy(300)).await);

        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(300));
        assert!(elapsed < Duration::from_millis(400));
        assert!(plane.probes() >= 6);
    }
}
