//! Retry stage with exponential backoff.
//!
//! [`RetryPolicy`] plugs into tower's [`RetryLayer`](tower::retry::RetryLayer).
//! The attempt counter lives in the request [`Metadata`](crate::Metadata), so the
//! state belongs to the logical call and every retry carries the same record.
//!
//! Delays, with `n` the retry about to be issued: `0` for `n = 1`, then
//! `base_delay * 2^(n - 2)`: 0, 1s, 2s, 4s... for the default one second base.
//! The exponent lags the attempt by two, not one: the first delayed retry waits
//! exactly `base_delay`, where a `base_delay * 2^(n - 1)` schedule would wait
//! twice that (0, 2s, 4s...).

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::time::Sleep;
use tower::retry::Policy;
use tracing::{debug, info, warn};

use crate::config::{DEFAULT_RETRYABLE_METHODS, DEFAULT_RETRYABLE_STATUS_RANGES, StatusRange};
use crate::{Error, Method, Request, Response};

/// Decides whether a failure may be retried.
pub type ShouldRetry = Arc<dyn Fn(&Error) -> bool + Send + Sync>;

/// Which failures are retried.
#[derive(Clone)]
pub enum RetryEligibility {
    /// Connectivity failures always; HTTP failures when both the method and the
    /// status are listed.
    Filter {
        /// Retryable methods.
        methods: Vec<Method>,
        /// Retryable status ranges.
        statuses: Vec<StatusRange>,
    },
    /// Whatever the predicate accepts.
    Custom(ShouldRetry),
}

impl Default for RetryEligibility {
    fn default() -> Self {
        Self::Filter {
            methods: DEFAULT_RETRYABLE_METHODS.to_vec(),
            statuses: DEFAULT_RETRYABLE_STATUS_RANGES.to_vec(),
        }
    }
}

impl RetryEligibility {
    /// Returns `true` if `err`, raised for a `method` request, may be retried.
    #[must_use]
    pub fn is_eligible(&self, method: Method, err: &Error) -> bool {
        match self {
            Self::Custom(predicate) => predicate(err),
            Self::Filter { methods, statuses } => {
                if err.is_connectivity() {
                    return true;
                }
                match err.status() {
                    Some(status) => {
                        methods.contains(&method) && StatusRange::any_contains(statuses, status)
                    }
                    None => {
                        warn!(error = %err, "not retrying an error that is not a transport failure");
                        false
                    }
                }
            }
        }
    }
}

impl fmt::Debug for RetryEligibility {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Filter { methods, statuses } => f
                .debug_struct("Filter")
                .field("methods", methods)
                .field("statuses", statuses)
                .finish(),
            Self::Custom(_) => f.write_str("Custom(..)"),
        }
    }
}

/// Retry policy with bounded attempts and exponential backoff.
///
/// # Example
///
/// ```ignore
/// use gantry::middleware::{RetryLayer, RetryPolicy};
/// use std::time::Duration;
///
/// let layer = RetryLayer::new(RetryPolicy::new(5, Duration::from_secs(1)));
/// ```
#[derive(Debug, Clone)]
pub struct RetryPolicy {
    max_attempts: u32,
    base_delay: Duration,
    eligibility: RetryEligibility,
}

impl RetryPolicy {
    /// Create a policy allowing `max_attempts` retries per call.
    #[must_use]
    pub fn new(max_attempts: u32, base_delay: Duration) -> Self {
        Self {
            max_attempts,
            base_delay,
            eligibility: RetryEligibility::default(),
        }
    }

    /// Replace the eligibility rule.
    #[must_use]
    pub fn with_eligibility(mut self, eligibility: RetryEligibility) -> Self {
        self.eligibility = eligibility;
        self
    }

    /// Retries allowed per call.
    #[must_use]
    pub const fn max_attempts(&self) -> u32 {
        self.max_attempts
    }

    /// Delay before retry number `attempt` (starting at 1).
    #[must_use]
    pub fn delay_for(&self, attempt: u32) -> Duration {
        match attempt {
            0 | 1 => Duration::ZERO,
            n => self
                .base_delay
                .saturating_mul(2_u32.saturating_pow(n - 2)),
        }
    }
}

impl Policy<Request, Response, Error> for RetryPolicy {
    type Future = Sleep;

    fn retry(
        &mut self,
        request: &mut Request,
        result: &mut Result<Response, Error>,
    ) -> Option<Self::Future> {
        let Err(err) = result else {
            return None;
        };
        let metadata = request.metadata();

        if metadata.retry_attempt() >= self.max_attempts {
            warn!(
                error = %err,
                attempts = metadata.retry_attempt(),
                "giving up after exhausting retries"
            );
            return None;
        }

        if !self.eligibility.is_eligible(request.method(), err) {
            debug!(error = %err, "failure is not eligible for retry");
            return None;
        }

        let attempt = metadata.next_retry_attempt();
        let delay = self.delay_for(attempt);
        info!(
            attempt,
            max_attempts = self.max_attempts,
            delay_ms = u64::try_from(delay.as_millis()).unwrap_or(u64::MAX),
            error = %err,
            "retrying request"
        );
        Some(tokio::time::sleep(delay))
    }

    fn clone_request(&mut self, request: &Request) -> Option<Request> {
        Some(request.clone())
    }
}

#[cfg(test)]
mod tests {
    use assert2::{check, let_assert};
    use tower::retry::RetryLayer;
    use tower::{Layer, ServiceExt};

    use super::*;
    use crate::middleware::mock::{MockService, Reply, get};

    fn policy(max_attempts: u32) -> RetryPolicy {
        RetryPolicy::new(max_attempts, Duration::from_millis(1000))
    }

    #[test]
    fn backoff_starts_with_an_immediate_retry() {
        let policy = policy(5);
        check!(policy.delay_for(1) == Duration::ZERO);
        check!(policy.delay_for(2) == Duration::from_millis(1000));
        check!(policy.delay_for(3) == Duration::from_millis(2000));
        check!(policy.delay_for(4) == Duration::from_millis(4000));
    }

    #[test]
    fn default_eligibility() {
        let eligibility = RetryEligibility::default();
        let http = |status| {
            Error::from_response(Response::new(status, Default::default(), Default::default()))
        };

        check!(eligibility.is_eligible(Method::Post, &Error::connection("refused")));
        check!(eligibility.is_eligible(Method::Get, &Error::Timeout));
        check!(eligibility.is_eligible(Method::Get, &http(503)));
        check!(eligibility.is_eligible(Method::Delete, &http(429)));
        check!(!eligibility.is_eligible(Method::Post, &http(503)));
        check!(!eligibility.is_eligible(Method::Get, &http(404)));
        check!(!eligibility.is_eligible(Method::Get, &Error::invalid_request("bad")));
    }

    #[tokio::test(start_paused = true)]
    async fn retries_with_backoff_until_success() {
        let mock = MockService::statuses([500, 500, 200]);
        let service = RetryLayer::new(policy(5)).layer(mock.clone());

        let request = get("users");
        let metadata = request.metadata().clone();
        let response = service.oneshot(request).await.expect("third attempt");

        check!(response.status() == 200);
        check!(mock.call_count() == 3);
        check!(metadata.retry_attempt() == 2);

        let times = mock.call_times();
        let_assert!([first, second, third] = times.as_slice());
        check!(*second - *first == Duration::ZERO);
        check!(*third - *second == Duration::from_millis(1000));
    }

    #[tokio::test(start_paused = true)]
    async fn exhaustion_returns_the_last_failure() {
        let mock = MockService::status(503);
        let service = RetryLayer::new(policy(2)).layer(mock.clone());

        let result = service.oneshot(get("users")).await;

        let_assert!(Err(Error::Http { status: 503, .. }) = result);
        check!(mock.call_count() == 3);
    }

    #[tokio::test]
    async fn ineligible_failures_are_not_retried() {
        let mock = MockService::status(400);
        let service = RetryLayer::new(policy(5)).layer(mock.clone());

        let_assert!(Err(_) = service.oneshot(get("users")).await);
        check!(mock.call_count() == 1);
    }

    #[tokio::test(start_paused = true)]
    async fn connectivity_failures_are_retried_for_any_method() {
        let mock = MockService::new([Reply::Refused, Reply::Status(201)]);
        let service = RetryLayer::new(policy(5)).layer(mock.clone());
        let request = Request::builder(Method::Post, "users").build();

        let response = service.oneshot(request).await.expect("second attempt");
        check!(response.status() == 201);
        check!(mock.call_count() == 2);
    }

    #[tokio::test(start_paused = true)]
    async fn custom_predicate_replaces_filters() {
        let mock = MockService::status(404);
        let only_404: ShouldRetry = Arc::new(Error::is_not_found);
        let service = RetryLayer::new(
            policy(1).with_eligibility(RetryEligibility::Custom(only_404)),
        )
        .layer(mock.clone());

        let_assert!(Err(_) = service.oneshot(get("users")).await);
        check!(mock.call_count() == 2);
    }

    #[tokio::test(start_paused = true)]
    async fn retries_share_the_call_metadata() {
        let mock = MockService::statuses([502, 200]);
        let service = RetryLayer::new(policy(5)).layer(mock.clone());

        let request = get("users");
        let metadata = request.metadata().clone();
        service.oneshot(request).await.expect("second attempt");

        for sent in mock.requests() {
            check!(sent.metadata().same_record(&metadata));
        }
    }
}
