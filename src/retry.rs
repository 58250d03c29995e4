use std::time::Duration;

use http::{Method, StatusCode};

const DEFAULT_MAX_ATTEMPTS: usize = 3;
const DEFAULT_RATE_LIMIT_BACKOFF: Duration = Duration::from_secs(1);

/// Bounded per-target retry with a fixed pause after a rate-limited response.
///
/// Any status outside [`is_terminal_success_status`] and any transport error consumes an
/// attempt. Only `429 Too Many Requests` triggers the pause, and the pause never grows.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    max_attempts: usize,
    rate_limit_backoff: Duration,
}

impl RetryPolicy {
    pub fn disabled() -> Self {
        Self {
            max_attempts: 1,
            rate_limit_backoff: DEFAULT_RATE_LIMIT_BACKOFF,
        }
    }

    pub fn standard() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            rate_limit_backoff: DEFAULT_RATE_LIMIT_BACKOFF,
        }
    }

    /// Total attempts per target, first one included. `0` behaves like `1`.
    pub fn max_attempts(mut self, max_attempts: usize) -> Self {
        self.max_attempts = max_attempts.max(1);
        self
    }

    pub fn rate_limit_backoff(mut self, rate_limit_backoff: Duration) -> Self {
        self.rate_limit_backoff = rate_limit_backoff;
        self
    }

    pub fn max_attempts_value(&self) -> usize {
        self.max_attempts
    }

    pub fn rate_limit_backoff_value(&self) -> Duration {
        self.rate_limit_backoff
    }

    pub(crate) fn backoff_after_status(&self, status: StatusCode) -> Option<Duration> {
        (status == StatusCode::TOO_MANY_REQUESTS).then_some(self.rate_limit_backoff)
    }
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::standard()
    }
}

pub fn is_terminal_success_status(status: StatusCode) -> bool {
    matches!(status.as_u16(), 200 | 201 | 202 | 204)
}

/// Only state-changing methods resend their body on a retry.
pub(crate) fn replays_body(method: &Method) -> bool {
    *method == Method::POST || *method == Method::PUT
}

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use http::{Method, StatusCode};

    use super::{RetryPolicy, is_terminal_success_status, replays_body};

    #[test]
    fn zero_attempts_still_sends_once() {
        let policy = RetryPolicy::standard().max_attempts(0);
        assert_eq!(policy.max_attempts_value(), 1);
    }

    #[test]
    fn only_too_many_requests_schedules_backoff() {
        let policy = RetryPolicy::standard().rate_limit_backoff(Duration::from_millis(250));
        assert_eq!(
            policy.backoff_after_status(StatusCode::TOO_MANY_REQUESTS),
            Some(Duration::from_millis(250))
        );
        assert_eq!(
            policy.backoff_after_status(StatusCode::SERVICE_UNAVAILABLE),
            None
        );
        assert_eq!(
            policy.backoff_after_status(StatusCode::INTERNAL_SERVER_ERROR),
            None
        );
    }

    #[test]
    fn terminal_success_set_excludes_other_2xx() {
        for status in [200_u16, 201, 202, 204] {
            let status = StatusCode::from_u16(status).expect("valid status");
            assert!(is_terminal_success_status(status));
        }
        for status in [203_u16, 206, 301, 404, 429, 500] {
            let status = StatusCode::from_u16(status).expect("valid status");
            assert!(!is_terminal_success_status(status));
        }
    }

    #[test]
    fn body_replay_is_limited_to_post_and_put() {
        assert!(replays_body(&Method::POST));
        assert!(replays_body(&Method::PUT));
        assert!(!replays_body(&Method::GET));
        assert!(!replays_body(&Method::DELETE));
        assert!(!replays_body(&Method::PATCH));
    }
}
