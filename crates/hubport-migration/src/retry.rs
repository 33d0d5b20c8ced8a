// Copyright (C) 2025  Hubport Contributors
//
// This program is free software: you can redistribute it and/or modify
// it under the terms of the GNU Affero General Public License as published by
// the Free Software Foundation, either version 3 of the License, or
// (at your option) any later version.
//
// This program is distributed in the hope that it will be useful,
// but WITHOUT ANY WARRANTY; without even the implied warranty of
// MERCHANTABILITY or FITNESS FOR A PARTICULAR PURPOSE.  See the
// GNU Affero General Public License for more details.
//
// You should have received a copy of the GNU Affero General Public License
// along with this program.  If not, see <https://www.gnu.org/licenses/>.

//! Bounded retry with exponential backoff
//!
//! Each failure is classified before the attempt budget is consulted: a
//! failure the classifier calls terminal is returned at once.

use hubport_config::RetrySettings;
use std::fmt::Display;
use std::future::Future;
use std::time::Duration;
use tracing::warn;

/// How often and how patiently to retry
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Attempts including the first
    pub max_attempts: u32,

    /// Delay before the second attempt
    pub base_delay: Duration,

    /// Factor applied to the delay after each failed attempt
    pub multiplier: u32,

    /// Upper bound of any single delay
    pub max_delay: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_settings(&RetrySettings::default())
    }
}

impl RetryPolicy {
    /// Policy from the `[retry]` settings
    pub fn from_settings(settings: &RetrySettings) -> Self {
        Self {
            max_attempts: settings.max_attempts.max(1),
            base_delay: settings.base_delay(),
            multiplier: settings.multiplier.max(1),
            max_delay: settings.max_delay(),
        }
    }

    /// `max_attempts` tries with no waiting in between
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay: Duration::ZERO,
            multiplier: 1,
            max_delay: Duration::ZERO,
        }
    }

    /// Wait after failed attempt `attempt` (1-based)
    ///
    /// ```rust
    /// use hubport_migration::RetryPolicy;
    /// use std::time::Duration;
    ///
    /// let policy = RetryPolicy::default();
    /// assert_eq!(policy.delay_after(1), Duration::from_secs(5));
    /// assert_eq!(policy.delay_after(2), Duration::from_secs(15));
    /// ```
    pub fn delay_after(&self, attempt: u32) -> Duration {
        let factor = self.multiplier.saturating_pow(attempt.saturating_sub(1));
        self.base_delay.saturating_mul(factor).min(self.max_delay)
    }
}

/// The error that ended a retry loop
#[derive(Debug)]
pub struct RetryFailure<E> {
    /// Last error seen
    pub error: E,

    /// Attempts made, the failing one included
    pub attempts: u32,

    /// Whether the last error was classified as retryable
    pub transient: bool,
}

/// Runs `operation` until it succeeds, fails terminally or exhausts the
/// policy.
///
/// `operation` receives the 1-based attempt number. On success the value is
/// returned with the number of attempts it took.
pub async fn retry<T, E, F, Fut, C>(
    policy: &RetryPolicy,
    is_transient: C,
    mut operation: F,
) -> Result<(T, u32), RetryFailure<E>>
where
    F: FnMut(u32) -> Fut,
    Fut: Future<Output = Result<T, E>>,
    C: Fn(&E) -> bool,
    E: Display,
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        match operation(attempt).await {
            Ok(value) => return Ok((value, attempt)),
            Err(error) => {
                let transient = is_transient(&error);
                if !transient || attempt >= policy.max_attempts {
                    return Err(RetryFailure {
                        error,
                        attempts: attempt,
                        transient,
                    });
                }

                let delay = policy.delay_after(attempt);
                warn!(
                    attempt,
                    max_attempts = policy.max_attempts,
                    delay_secs = delay.as_secs(),
                    error = %error,
                    "Transient failure, retrying"
                );
                tokio::time::sleep(delay).await;
            }
        }
    }
}

#[cfg(test)]
#[allow(clippy::unwrap_used)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicU32, Ordering};

    #[test]
    fn test_backoff_schedule() {
        let policy = RetryPolicy {
            max_attempts: 5,
            base_delay: Duration::from_secs(5),
            multiplier: 3,
            max_delay: Duration::from_secs(60),
        };
        assert_eq!(policy.delay_after(1), Duration::from_secs(5));
        assert_eq!(policy.delay_after(2), Duration::from_secs(15));
        assert_eq!(policy.delay_after(3), Duration::from_secs(45));
        assert_eq!(policy.delay_after(4), Duration::from_secs(60));
    }

    #[tokio::test]
    async fn test_transient_then_success() {
        let calls = AtomicU32::new(0);
        let (value, attempts) = retry(&RetryPolicy::immediate(3), |_: &String| true, |attempt| {
            calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if attempt < 3 {
                    Err("timeout".to_string())
                } else {
                    Ok(attempt * 10)
                }
            }
        })
        .await
        .unwrap();

        assert_eq!(value, 30);
        assert_eq!(attempts, 3);
        assert_eq!(calls.load(Ordering::SeqCst), 3);
    }

    #[tokio::test]
    async fn test_terminal_fails_immediately() {
        let calls = AtomicU32::new(0);
        let failure = retry(&RetryPolicy::immediate(3), |_: &String| false, |_| {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err::<(), _>("401 unauthorized".to_string()) }
        })
        .await
        .unwrap_err();

        assert_eq!(failure.attempts, 1);
        assert!(!failure.transient);
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_exhaustion_returns_last_error() {
        let failure = retry(&RetryPolicy::immediate(3), |_: &String| true, |attempt| async move {
            Err::<(), _>(format!("reset #{attempt}"))
        })
        .await
        .unwrap_err();

        assert_eq!(failure.attempts, 3);
        assert!(failure.transient);
        assert_eq!(failure.error, "reset #3");
    }
}
