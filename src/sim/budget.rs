//! Cooperative wall-clock budget for one trigger firing.

use std::time::{Duration, Instant};

/// Deadline checked between per-device operations.
///
/// Cancellation is cooperative: an operation already issued runs to
/// completion and commits, but no new device is started once the budget is
/// exhausted. Engines report the devices they never reached.
#[derive(Debug, Clone, Copy)]
pub struct RunBudget {
    deadline: Option<Instant>,
}

impl RunBudget {
    /// A budget that never expires.
    pub fn unlimited() -> Self {
        Self { deadline: None }
    }

    /// A budget expiring `limit` from now.
    pub fn expiring_in(limit: Duration) -> Self {
        Self {
            deadline: Some(Instant::now() + limit),
        }
    }

    /// Returns `true` once the deadline has passed.
    pub fn expired(&self) -> bool {
        self.deadline.is_some_and(|d| Instant::now() >= d)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unlimited_budget_never_expires() {
        assert!(!RunBudget::unlimited().expired());
    }

    #[test]
    fn zero_budget_expires_immediately() {
        assert!(RunBudget::expiring_in(Duration::ZERO).expired());
    }

    #[test]
    fn generous_budget_is_not_expired_yet() {
        assert!(!RunBudget::expiring_in(Duration::from_secs(3600)).expired());
    }
}
