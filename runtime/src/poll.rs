//! Cooperative polling, the single wait primitive behind every suspension
//! point in the pipeline.
//!
//! The page's JavaScript runtime, the browser's network layer, and the
//! controller have no call/return relationship, so all coordination is
//! "probe shared state, sleep, probe again" with a hard ceiling. Callers
//! name their interval and budget as constants next to the call site.

use std::future::Future;
use std::time::Duration;
use tokio::time::Instant;

/// Run `probe` until it yields a value or `budget` elapses.
///
/// The probe always runs at least once, so a zero budget still takes one
/// sample. Returns `None` when the budget is exhausted first.
pub async fn poll_until<F, Fut, T>(interval: Duration, budget: Duration, mut probe: F) -> Option<T>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Option<T>>,
{
    let start = Instant::now();
    loop {
        if let Some(value) = probe().await {
            return Some(value);
        }
        if start.elapsed() >= budget {
            return None;
        }
        tokio::time::sleep(interval).await;
    }
}
