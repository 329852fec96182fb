//! Caller-side retry for write conflicts

use crate::services::error::TreeError;
use std::future::Future;
use std::time::Duration;

const BASE_BACKOFF_MS: u64 = 20;

/// Run `operation` until it succeeds, fails with a non-retryable error, or
/// `attempts` runs have failed with `ConcurrentModification`.
///
/// Backoff doubles after each conflict, starting at 20 ms.
///
/// # Examples
///
/// ```no_run
/// # use treeperm_core::models::NodeRef;
/// # use treeperm_core::services::{retry_on_conflict, TreeService};
/// # async fn example(service: &TreeService) -> Result<(), treeperm_core::services::TreeError> {
/// let target = NodeRef::path("team.alpha");
/// let new_parent = NodeRef::path("org");
/// let rows = retry_on_conflict(3, || service.move_node(&target, &new_parent))
/// .await?;
/// # let _ = rows;
/// # Ok(())
/// # }
/// ```
pub async fn retry_on_conflict<T, F, Fut>(attempts: usize, mut operation: F) -> Result<T, TreeError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, TreeError>>,
{
    let attempts = attempts.max(1);
    let mut attempt = 1;
    loop {
        match operation().await {
            Err(err) if err.is_retryable() && attempt < attempts => {
                let backoff = Duration::from_millis(BASE_BACKOFF_MS << (attempt - 1).min(6));
                tracing::warn!(
                    "Attempt {}/{} hit a write conflict, retrying in {:?}: {}",
                    attempt,
                    attempts,
                    backoff,
                    err
                );
                tokio::time::sleep(backoff).await;
                attempt += 1;
            }
            other => return other,
        }
    }
}
