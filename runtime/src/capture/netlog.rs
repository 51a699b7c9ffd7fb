//! Network-log fallback.
//!
//! When a page-side queue never fills (the document swapped before the
//! observers re-attached, or the page's own code replaced the wrappers),
//! the response usually still exists in the browser's network-event log.
//! This module scans newly arrived events for a matching URL and pulls the
//! body over the devtools protocol instead.

use crate::browser::PageDriver;
use crate::poll;
use serde_json::Value;
use std::time::Duration;
use tracing::{debug, warn};

/// Scan cadence over the network-event log.
pub const NETLOG_SCAN_INTERVAL: Duration = Duration::from_secs(1);

/// Fallback budget when a search response went missing.
pub const SEARCH_NETLOG_BUDGET: Duration = Duration::from_secs(10);

/// Fallback budget when an unlock response went missing.
pub const UNLOCK_NETLOG_BUDGET: Duration = Duration::from_secs(5);

/// Repeatedly drain the network-event log looking for a response whose URL
/// contains `url_marker`; fetch and parse the first body that matches.
///
/// Bodies that can no longer be fetched (evicted from the browser's cache)
/// are skipped, not fatal. Returns `None` when `budget` elapses without a
/// usable match.
pub async fn recover_response(
    driver: &dyn PageDriver,
    url_marker: &str,
    budget: Duration,
) -> Option<Value> {
    debug!("scanning network log for '{url_marker}'");
    poll::poll_until(NETLOG_SCAN_INTERVAL, budget, || async {
        let events = match driver.drain_network_events().await {
            Ok(events) => events,
            Err(e) => {
                warn!("network log read failed: {e:#}");
                return None;
            }
        };
        for event in events {
            if !event.url.contains(url_marker) {
                continue;
            }
            match driver.response_body(&event.request_id).await {
                Ok(body) => {
                    debug!("recovered response {} from network log", event.request_id);
                    return Some(body);
                }
                Err(e) => {
                    warn!("body fetch failed for {}: {e:#}", event.request_id);
                }
            }
        }
        None
    })
    .await
}
