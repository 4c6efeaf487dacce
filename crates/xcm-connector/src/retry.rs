//! Fixed-interval polling for remote state that has not converged yet
//!
//! Every remote read or write that can legitimately observe "not there yet"
//! goes through [`poll_immediate`] or [`poll`]. The probe decides what
//! "not yet" means by returning `Ok(None)`; any `Err` it returns is treated
//! as terminal and handed back without waiting for the next tick.

use std::future::Future;
use std::time::Duration;

use tokio::time::{sleep_until, Instant};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use crate::{Error, Result};

/// Cap on any single wait; larger budgets are treated as unbounded
const MAX_WAIT: Duration = Duration::from_secs(86_400 * 365 * 30);

/// Result type for polling probes.
///
/// - `Ok(Some(value))` - Condition met, return the value
/// - `Ok(None)` - Condition not met yet, keep polling
/// - `Err(e)` - Terminal error, stop polling immediately
pub type PollResult<T> = Result<Option<T>>;

/// Poll `probe` right away, then every `interval`, until it yields a value,
/// fails, `timeout` elapses, or `cancel` fires.
///
/// The probe always runs at least once, even when `timeout < interval`.
pub async fn poll_immediate<T, F, Fut>(
    interval: Duration,
    timeout: Duration,
    cancel: &CancellationToken,
    operation: &str,
    probe: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = PollResult<T>>,
{
    run(true, interval, timeout, cancel, operation, probe).await
}

/// Like [`poll_immediate`] but waits one `interval` before the first probe.
///
/// When `timeout < interval` the budget runs out before the first tick and
/// the probe never runs.
pub async fn poll<T, F, Fut>(
    interval: Duration,
    timeout: Duration,
    cancel: &CancellationToken,
    operation: &str,
    probe: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = PollResult<T>>,
{
    run(false, interval, timeout, cancel, operation, probe).await
}

/// Run a single remote call, aborting it if `cancel` fires first
pub async fn cancellable<T, Fut>(cancel: &CancellationToken, operation: &str, fut: Fut) -> Result<T>
where
    Fut: Future<Output = Result<T>>,
{
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Error::cancelled(operation)),
        result = fut => result,
    }
}

async fn run<T, F, Fut>(
    immediate: bool,
    interval: Duration,
    timeout: Duration,
    cancel: &CancellationToken,
    operation: &str,
    mut probe: F,
) -> Result<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = PollResult<T>>,
{
    let deadline = instant_after(timeout);
    let mut probe_now = immediate;

    loop {
        if !probe_now {
            let next = instant_after(interval);
            if next > deadline {
                wait_until(deadline, cancel, operation).await?;
                return Err(Error::timeout(operation, timeout));
            }
            wait_until(next, cancel, operation).await?;
        }
        probe_now = false;

        if let Some(value) = cancellable(cancel, operation, probe()).await? {
            return Ok(value);
        }
        debug!(operation, "not ready yet, polling again");
    }
}

fn instant_after(wait: Duration) -> Instant {
    let now = Instant::now();
    now.checked_add(wait.min(MAX_WAIT)).unwrap_or(now)
}

async fn wait_until(at: Instant, cancel: &CancellationToken, operation: &str) -> Result<()> {
    tokio::select! {
        biased;
        _ = cancel.cancelled() => Err(Error::cancelled(operation)),
        _ = sleep_until(at) => Ok(()),
    }
}
