//! Bounded polling for an element to appear.
//!
//! Waiting is an explicit operation with a deadline. It reports
//! [`WaitOutcome::NotFound`] instead of failing, so callers decide how a
//! missing element should surface.

use std::time::Duration;

use tokio::time::Instant;
use tracing::{debug, trace};

use crate::driver::{AutomationDriver, DriverError};
use crate::element::{ElementQuery, UIElement};

/// Result of [`wait_for_element`].
#[derive(Debug, Clone)]
pub enum WaitOutcome {
    Found { element: UIElement, elapsed: Duration },
    NotFound { elapsed: Duration },
}

/// Polls `driver` for `query` until it matches or `timeout` passes.
///
/// The first lookup happens immediately, so a zero timeout checks exactly
/// once. Each lookup is cut off at the time left before the deadline, but is
/// always given at least one `poll_interval`; a lookup that is cut off counts
/// as "not there yet". Other lookup errors count the same way, except
/// [`DriverError::NotConnected`], which waiting cannot heal and is returned.
pub async fn wait_for_element(
    driver: &dyn AutomationDriver,
    query: &ElementQuery,
    timeout: Duration,
    poll_interval: Duration,
) -> Result<WaitOutcome, DriverError> {
    let start = Instant::now();
    let identifier = query.identifier.as_str();
    let mut polls: u32 = 0;

    loop {
        polls += 1;
        let budget = timeout.saturating_sub(start.elapsed()).max(poll_interval);
        match tokio::time::timeout(budget, driver.find_element(query, budget)).await {
            Ok(Ok(Some(element))) => {
                let elapsed = start.elapsed();
                debug!(identifier, polls, elapsed_ms = elapsed.as_millis() as u64, "element found");
                return Ok(WaitOutcome::Found { element, elapsed });
            }
            Ok(Ok(None)) => trace!(identifier, polls, "element not present"),
            Ok(Err(DriverError::NotConnected)) => return Err(DriverError::NotConnected),
            Ok(Err(e)) => trace!(identifier, polls, error = %e, "lookup failed, retrying"),
            Err(_) => debug!(identifier, polls, ?budget, "lookup did not answer in time"),
        }

        let elapsed = start.elapsed();
        if elapsed >= timeout {
            debug!(identifier, polls, elapsed_ms = elapsed.as_millis() as u64, "gave up waiting");
            return Ok(WaitOutcome::NotFound { elapsed });
        }
        tokio::time::sleep(poll_interval.min(timeout - elapsed)).await;
    }
}
