use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;

use crate::error::PollError;

/// How often to probe and how long to keep trying.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    pub interval: Duration,
    pub deadline: Duration,
}

impl PollPolicy {
    pub fn new(interval: Duration, deadline: Duration) -> Self {
        Self { interval, deadline }
    }
}

/// Run `check` every `policy.interval` until it yields a value.
///
/// A single attempt that is still pending when the deadline passes is dropped,
/// so the call never blocks much beyond `policy.deadline`.
pub async fn poll_until<T, F, Fut>(
    policy: &PollPolicy,
    what: &str,
    mut check: F,
) -> Result<T, PollError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Option<T>>,
{
    let start = Instant::now();
    let deadline = start + policy.deadline;
    let mut attempts = 0u32;

    loop {
        attempts += 1;
        match tokio::time::timeout_at(deadline, check()).await {
            Ok(Some(value)) => {
                log::debug!(
                    "{what} ready after {attempts} attempts ({:?})",
                    start.elapsed()
                );
                return Ok(value);
            }
            Ok(None) => {
                log::debug!("{what} not ready (attempt {attempts})");
            }
            Err(_) => {
                log::debug!("{what} attempt {attempts} still pending at deadline");
            }
        }

        let now = Instant::now();
        if now >= deadline {
            return Err(PollError::DeadlineExceeded {
                what: what.to_string(),
                attempts,
                elapsed: now - start,
            });
        }

        tokio::time::sleep_until((now + policy.interval).min(deadline)).await;
    }
}
