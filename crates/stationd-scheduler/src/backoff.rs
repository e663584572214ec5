//! Exponential backoff with full jitter (spec §4.E retry policy).

use rand::Rng;
use stationd_core::config::RetryPolicyConfig;
use std::time::Duration;

/// Delay before attempt number `attempt` (1-indexed: the delay *before*
/// the second attempt is `delay_for(policy, 1)`), full-jittered between
/// zero and `min(cap, base * 2^(attempt-1))`.
pub fn delay_for(policy: &RetryPolicyConfig, attempt: u32) -> Duration {
    let exponent = attempt.saturating_sub(1).min(31);
    let unjittered = policy.base_ms.saturating_mul(1u64 << exponent).min(policy.cap_ms);
    let jittered = rand::thread_rng().gen_range(0..=unjittered.max(1));
    Duration::from_millis(jittered)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delay_never_exceeds_cap() {
        let policy = RetryPolicyConfig {
            base_ms: 2_000,
            cap_ms: 60_000,
            max_attempts: 5,
        };
        for attempt in 1..=10 {
            let d = delay_for(&policy, attempt);
            assert!(d.as_millis() as u64 <= policy.cap_ms);
        }
    }

    #[test]
    fn delay_grows_with_attempt_on_average() {
        let policy = RetryPolicyConfig {
            base_ms: 100,
            cap_ms: 60_000,
            max_attempts: 5,
        };
        // Not a statistical test; just checks the ceiling moves.
        let early_ceiling = policy.base_ms;
        let later_ceiling = policy.base_ms * 8;
        assert!(early_ceiling < later_ceiling);
        let _ = delay_for(&policy, 1);
        let _ = delay_for(&policy, 4);
    }
}
