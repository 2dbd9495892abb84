//! Retry utility with exponential backoff

use std::thread;
use std::time::Duration;
use tracing::warn;

const MAX_DELAY: Duration = Duration::from_secs(30);

/// Retry a blocking operation with exponential backoff.
///
/// Returns `Ok` on first success, or the last `Err` after all attempts are exhausted.
/// Delays: `initial_delay`, `2 * initial_delay`, `4 * initial_delay`, ... capped at 30s.
/// At least one attempt is always made.
pub fn retry_with_backoff<F, T, E>(
    operation_name: &str,
    max_attempts: u32,
    initial_delay: Duration,
    mut f: F,
) -> Result<T, E>
where
    F: FnMut() -> Result<T, E>,
    E: std::fmt::Display,
{
    let max_attempts = max_attempts.max(1);
    let mut delay = initial_delay;
    let mut attempt = 1;

    loop {
        match f() {
            Ok(val) => return Ok(val),
            Err(e) if attempt >= max_attempts => {
                warn!(
                    "{} failed (attempt {}/{}), giving up: {}",
                    operation_name, attempt, max_attempts, e
                );
                return Err(e);
            }
            Err(e) => {
                warn!(
                    "{} failed (attempt {}/{}): {}",
                    operation_name, attempt, max_attempts, e
                );
                thread::sleep(delay);
                delay = (delay * 2).min(MAX_DELAY);
                attempt += 1;
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_succeeds_first_try() {
        let result: Result<&str, String> =
            retry_with_backoff("test", 3, Duration::from_millis(1), || Ok("done"));
        assert_eq!(result.unwrap(), "done");
    }

    #[test]
    fn test_succeeds_after_retries() {
        let mut calls = 0;
        let result: Result<&str, String> =
            retry_with_backoff("test", 3, Duration::from_millis(1), || {
                calls += 1;
                if calls < 3 {
                    Err(format!("fail #{}", calls))
                } else {
                    Ok("done")
                }
            });
        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls, 3);
    }

    #[test]
    fn test_all_attempts_fail() {
        let mut calls = 0;
        let result: Result<(), String> =
            retry_with_backoff("test", 2, Duration::from_millis(1), || {
                calls += 1;
                Err("always fails".to_string())
            });
        assert_eq!(result.unwrap_err(), "always fails");
        assert_eq!(calls, 2);
    }

    #[test]
    fn test_zero_attempts_still_tries_once() {
        let mut calls = 0;
        let result: Result<(), String> =
            retry_with_backoff("test", 0, Duration::from_millis(1), || {
                calls += 1;
                Err("nope".to_string())
            });
        assert!(result.is_err());
        assert_eq!(calls, 1);
    }
}
