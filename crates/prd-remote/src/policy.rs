//! Two-tier retry policy for remote calls.
//!
//! * 429 is never terminal. With a `Retry-After` header the wait is
//!   `retry_after * U(0.5, 5.0)`; without one it is capped exponential
//!   jitter with a hard 60 s ceiling. Attempts are unbounded.
//! * 408/500/502/503/504 and network errors back off exponentially with
//!   jitter and are re-raised after `n_retries` retries.
//! * Anything else is raised immediately.

use rand::Rng;
use std::time::Duration;

use prd_core::defaults;
use prd_core::Error;

/// What to do after a failed attempt.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum RetryDecision {
    /// Wait this long, then try again.
    Retry(Duration),
    /// Surface the error to the caller.
    GiveUp,
}

/// Failure counters for one logical call.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct AttemptState {
    /// Consecutive 429 responses seen so far.
    pub rate_limited: u32,
    /// Transient failures (408/5xx/network) seen so far.
    pub transient: u32,
}

/// Configuration for retry behavior.
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    /// Retries allowed for transient failures before the error is raised.
    pub n_retries: u32,
    /// Base delay for exponential backoff.
    pub base_delay: Duration,
    /// Ceiling for a single transient-failure wait.
    pub transient_ceiling: Duration,
    /// Ceiling for a single 429 wait when no `Retry-After` was sent.
    pub rate_limit_ceiling: Duration,
    /// Bounds of the multiplier applied to `Retry-After`.
    pub retry_after_jitter: (f64, f64),
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            n_retries: defaults::N_RETRIES,
            base_delay: Duration::from_millis(defaults::BACKOFF_BASE_MS),
            transient_ceiling: Duration::from_secs(defaults::TRANSIENT_CEILING_SECS),
            rate_limit_ceiling: Duration::from_secs(defaults::RATE_LIMIT_CEILING_SECS),
            retry_after_jitter: (
                defaults::RETRY_AFTER_JITTER_MIN,
                defaults::RETRY_AFTER_JITTER_MAX,
            ),
        }
    }
}

impl RetryPolicy {
    /// Create a policy with a custom transient retry budget.
    pub fn new(n_retries: u32) -> Self {
        Self {
            n_retries,
            ..Self::default()
        }
    }

    /// Set the base delay.
    pub fn with_base_delay(mut self, delay: Duration) -> Self {
        self.base_delay = delay;
        self
    }

    /// Record a failure in `state` and decide whether to retry.
    pub fn decide<R: Rng>(&self, error: &Error, state: &mut AttemptState, rng: &mut R) -> RetryDecision {
        if error.is_rate_limited() {
            state.rate_limited += 1;
            let retry_after = match error {
                Error::Remote { retry_after, .. } => *retry_after,
                _ => None,
            };
            let delay = match retry_after {
                Some(seconds) if seconds.is_finite() && seconds >= 0.0 => {
                    let (low, high) = self.retry_after_jitter;
                    Duration::from_secs_f64(seconds * rng.gen_range(low..=high))
                }
                _ => self.backoff(state.rate_limited, self.rate_limit_ceiling, rng),
            };
            return RetryDecision::Retry(delay);
        }

        if error.is_transient() {
            state.transient += 1;
            if state.transient > self.n_retries {
                return RetryDecision::GiveUp;
            }
            return RetryDecision::Retry(self.backoff(
                state.transient,
                self.transient_ceiling,
                rng,
            ));
        }

        RetryDecision::GiveUp
    }

    /// Full-jitter exponential backoff: uniform in `[0, min(ceiling, base * 2^(n-1))]`.
    fn backoff<R: Rng>(&self, failures: u32, ceiling: Duration, rng: &mut R) -> Duration {
        let exponent = failures.saturating_sub(1).min(30) as i32;
        let cap = (self.base_delay.as_secs_f64() * 2f64.powi(exponent)).min(ceiling.as_secs_f64());
        if cap <= 0.0 {
            return Duration::ZERO;
        }
        Duration::from_secs_f64(rng.gen_range(0.0..=cap))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn rate_limited(retry_after: Option<f64>) -> Error {
        Error::Remote {
            status: 429,
            retry_after,
            message: "Too Many Requests".into(),
        }
    }

    #[test]
    fn test_rate_limit_without_header_never_exceeds_ceiling() {
        let policy = RetryPolicy::default();
        let mut state = AttemptState::default();
        let mut rng = StdRng::seed_from_u64(7);
        for _ in 0..200 {
            match policy.decide(&rate_limited(None), &mut state, &mut rng) {
                RetryDecision::Retry(delay) => assert!(delay <= Duration::from_secs(60)),
                RetryDecision::GiveUp => panic!("429 must never be terminal"),
            }
        }
        assert_eq!(state.rate_limited, 200);
        assert_eq!(state.transient, 0);
    }

    #[test]
    fn test_retry_after_is_jittered_within_bounds() {
        let policy = RetryPolicy::default();
        let mut rng = StdRng::seed_from_u64(1);
        for _ in 0..100 {
            let mut state = AttemptState::default();
            match policy.decide(&rate_limited(Some(2.0)), &mut state, &mut rng) {
                RetryDecision::Retry(delay) => {
                    assert!(delay >= Duration::from_secs(1), "{:?}", delay);
                    assert!(delay <= Duration::from_secs(10), "{:?}", delay);
                }
                RetryDecision::GiveUp => panic!("429 must never be terminal"),
            }
        }
    }

    #[test]
    fn test_transient_budget_is_n_retries() {
        let policy = RetryPolicy::new(3);
        let mut state = AttemptState::default();
        let mut rng = StdRng::seed_from_u64(3);
        let err = Error::remote(500, "boom");
        for _ in 0..3 {
            assert!(matches!(
                policy.decide(&err, &mut state, &mut rng),
                RetryDecision::Retry(_)
            ));
        }
        assert_eq!(policy.decide(&err, &mut state, &mut rng), RetryDecision::GiveUp);
    }

    #[test]
    fn test_rate_limits_do_not_consume_transient_budget() {
        let policy = RetryPolicy::new(1);
        let mut state = AttemptState::default();
        let mut rng = StdRng::seed_from_u64(3);
        for _ in 0..10 {
            policy.decide(&rate_limited(None), &mut state, &mut rng);
        }
        assert!(matches!(
            policy.decide(&Error::Network("reset".into()), &mut state, &mut rng),
            RetryDecision::Retry(_)
        ));
    }

    #[test]
    fn test_other_statuses_are_terminal() {
        let policy = RetryPolicy::default();
        let mut rng = StdRng::seed_from_u64(0);
        for status in [400, 401, 403, 404, 409] {
            let mut state = AttemptState::default();
            assert_eq!(
                policy.decide(&Error::remote(status, ""), &mut state, &mut rng),
                RetryDecision::GiveUp
            );
        }
    }

    #[test]
    fn test_transient_backoff_respects_ceiling() {
        let policy = RetryPolicy::new(50);
        let mut state = AttemptState::default();
        let mut rng = StdRng::seed_from_u64(11);
        for _ in 0..50 {
            if let RetryDecision::Retry(delay) =
                policy.decide(&Error::remote(503, ""), &mut state, &mut rng)
            {
                assert!(delay <= policy.transient_ceiling);
            }
        }
    }
}
