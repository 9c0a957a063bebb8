//! Bounded retry-with-backoff for transport calls.
//!
//! Single policy shared by every webhook operation: three retries after the
//! initial attempt, delays of 1s, 2s, 4s, transient failures only. Warnings
//! are emitted per retried attempt; the caller logs the final error once the
//! policy is exhausted.

use std::future::Future;
use std::time::Duration;

use backon::{ExponentialBuilder, Retryable};
use tracing::warn;

use crate::common::error::{RelayError, RelayResult};

/// Backoff schedule for transport retries: 1s, 2s, 4s.
fn transport_backoff() -> ExponentialBuilder {
    ExponentialBuilder::default()
        .with_min_delay(Duration::from_secs(1))
        .with_factor(2.0)
        .with_max_times(3)
}

/// Run a fallible transport call under the shared retry policy.
///
/// Only `RelayError::TransientTransport` triggers a retry; permanent
/// failures abort on the first attempt.
pub async fn retry_transport<T, F, Fut>(operation: &'static str, action: F) -> RelayResult<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = RelayResult<T>>,
{
    action
        .retry(transport_backoff())
        .when(|err: &RelayError| err.is_transient())
        .notify(|err: &RelayError, delay: Duration| {
            warn!(
                operation,
                delay_ms = delay.as_millis() as u64,
                "transient transport failure, retrying: {}",
                err
            );
        })
        .await
}
