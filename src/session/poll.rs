use anyhow::Result;
use std::time::{Duration, Instant};

/// Poll `check` until it returns true or `timeout` elapses.
///
/// The wait between polls starts at `initial` and doubles up to one second.
/// This is the single readiness primitive used by every lifecycle
/// transition; there are no ad hoc sleeps elsewhere.
pub fn poll_until(
    timeout: Duration,
    initial: Duration,
    mut check: impl FnMut() -> Result<bool>,
) -> Result<bool> {
    const MAX_INTERVAL: Duration = Duration::from_secs(1);

    let deadline = Instant::now() + timeout;
    let mut interval = initial;

    loop {
        if check()? {
            return Ok(true);
        }
        let now = Instant::now();
        if now >= deadline {
            return Ok(false);
        }
        std::thread::sleep(interval.min(deadline - now));
        interval = (interval * 2).min(MAX_INTERVAL);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_immediate_success() {
        let ok = poll_until(Duration::from_millis(50), Duration::from_millis(1), || {
            Ok(true)
        })
        .unwrap();
        assert!(ok);
    }

    #[test]
    fn test_eventual_success() {
        let mut calls = 0;
        let ok = poll_until(Duration::from_secs(1), Duration::from_millis(1), || {
            calls += 1;
            Ok(calls >= 3)
        })
        .unwrap();
        assert!(ok);
        assert_eq!(calls, 3);
    }

    #[test]
    fn test_timeout() {
        let ok = poll_until(Duration::from_millis(20), Duration::from_millis(5), || {
            Ok(false)
        })
        .unwrap();
        assert!(!ok);
    }

    #[test]
    fn test_check_error_propagates() {
        let result = poll_until(Duration::from_millis(20), Duration::from_millis(5), || {
            anyhow::bail!("probe broke")
        });
        assert!(result.is_err());
    }
}
