//! Bound on consecutive transient failures.
//!
//! A polling loop records every failed fetch here. Any success resets the
//! count, so only an unbroken run of failures makes the loop give up.

/// Consecutive-failure limit for one status source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Failures in a row tolerated before giving up.
    pub max_consecutive_failures: u32,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_consecutive_failures: 3,
        }
    }
}

/// Outcome of consulting the policy after a failure.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RetryDecision {
    Continue,
    GiveUp,
}

impl RetryPolicy {
    pub fn new(max_consecutive_failures: u32) -> Self {
        Self {
            max_consecutive_failures: max_consecutive_failures.max(1),
        }
    }

    /// Decide given the current run of consecutive failures.
    pub fn decide(&self, consecutive_failures: u32) -> RetryDecision {
        if consecutive_failures >= self.max_consecutive_failures {
            RetryDecision::GiveUp
        } else {
            RetryDecision::Continue
        }
    }
}

/// Running count of consecutive failures for one loop.
#[derive(Debug, Clone)]
pub struct FailureCounter {
    policy: RetryPolicy,
    consecutive: u32,
}

impl FailureCounter {
    pub fn new(policy: RetryPolicy) -> Self {
        Self {
            policy,
            consecutive: 0,
        }
    }

    pub fn record_failure(&mut self) -> RetryDecision {
        self.consecutive = self.consecutive.saturating_add(1);
        self.policy.decide(self.consecutive)
    }

    pub fn record_success(&mut self) {
        self.consecutive = 0;
    }

    pub fn consecutive(&self) -> u32 {
        self.consecutive
    }
}
