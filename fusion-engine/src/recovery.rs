//! Autorecovery: bounded retries for low-integrity attempts.

use std::time::Duration;

use chrono::{DateTime, Utc};
use fusion_types::RecoveryPolicy;

/// Retry bookkeeping for a single cycle.
///
/// Created fresh at the start of every cycle.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct RetryState {
    /// Integrity score of the most recent attempt.
    pub last_score: Option<f64>,
    /// Retries scheduled so far this cycle.
    pub retry_count: u32,
    /// When the pending retry is due.
    pub next_retry_at: Option<DateTime<Utc>>,
}

impl RetryState {
    pub fn new() -> Self {
        Self::default()
    }
}

/// What to do with an assessed attempt.
#[derive(Debug, Clone, PartialEq)]
pub enum Decision {
    /// Integrity is acceptable.
    Publish,
    /// Wait `backoff` and run retry number `attempt`.
    Retry { attempt: u32, backoff: Duration },
    /// Integrity is low and no retries remain.
    Exhausted,
}

/// Decides between publishing and retrying.
#[derive(Debug, Clone, PartialEq)]
pub struct AutorecoveryController {
    policy: RecoveryPolicy,
}

impl AutorecoveryController {
    pub fn new(policy: RecoveryPolicy) -> Self {
        Self { policy }
    }

    pub fn policy(&self) -> &RecoveryPolicy {
        &self.policy
    }

    /// Backoff before retry `attempt` (1-based): `backoff × multiplier^(attempt-1)`,
    /// capped at `max_backoff`.
    pub fn backoff_for(&self, attempt: u32) -> Duration {
        let base = self.policy.backoff.to_duration();
        let cap = self.policy.max_backoff.to_duration();
        let exponent = i32::try_from(attempt.saturating_sub(1)).unwrap_or(i32::MAX);
        let secs = base.as_secs_f64() * self.policy.backoff_multiplier.powi(exponent);

        if secs.is_finite() && secs < cap.as_secs_f64() {
            Duration::from_secs_f64(secs)
        } else {
            cap
        }
    }

    /// Assess an attempt's integrity score and update the cycle's retry state.
    pub fn assess(&self, state: &mut RetryState, score: f64, now: DateTime<Utc>) -> Decision {
        state.last_score = Some(score);
        state.next_retry_at = None;

        if score >= self.policy.threshold {
            return Decision::Publish;
        }
        if state.retry_count >= self.policy.max_retries {
            return Decision::Exhausted;
        }

        state.retry_count += 1;
        let backoff = self.backoff_for(state.retry_count);
        state.next_retry_at = chrono::Duration::from_std(backoff)
            .ok()
            .and_then(|d| now.checked_add_signed(d));

        Decision::Retry {
            attempt: state.retry_count,
            backoff,
        }
    }
}
