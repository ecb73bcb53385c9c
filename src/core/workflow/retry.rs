use crate::core::config::RetryConfig;
use crate::core::workflow::error::WorkflowError;
use std::thread;
use tracing::warn;

/// Run `operation`, retrying transient permission faults with exponential backoff.
///
/// Only [`WorkflowError::is_permission_denied`] faults are retried; anything else,
/// or the last failed attempt, is returned as is.
pub fn with_retry<T, F>(policy: &RetryConfig, what: &str, mut operation: F) -> Result<T, WorkflowError>
where
    F: FnMut() -> Result<T, WorkflowError>,
{
    let tries = policy.tries.max(1);
    let mut delay = policy.delay;
    let mut attempt = 1;
    loop {
        match operation() {
            Ok(value) => return Ok(value),
            Err(err) if err.is_permission_denied() && attempt < tries => {
                warn!(
                    operation = what,
                    attempt,
                    tries,
                    delay_ms = delay.as_millis() as u64,
                    "transient storage fault, retrying: {}",
                    err
                );
                thread::sleep(delay);
                delay = delay.mul_f64(policy.backoff);
                attempt += 1;
            }
            Err(err) => return Err(err),
        }
    }
}
