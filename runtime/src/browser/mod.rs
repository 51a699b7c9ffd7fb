//! Browser drivers.
//!
//! [`PageDriver`] is the seam between the harvest pipeline and the
//! automation engine. Production runs use [`chromium::ChromiumDriver`];
//! tests substitute scripted fakes.

pub mod chromium;

use anyhow::Result;
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// One response-received entry from the browser's network-event log.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NetworkEvent {
    /// Engine-level request identifier, valid for [`PageDriver::response_body`].
    pub request_id: String,
    /// Response URL.
    pub url: String,
}

/// Driver for a single authenticated page session.
///
/// All methods take `&self`; implementations carry their own interior
/// state. Selector strings are CSS unless a method says otherwise.
#[async_trait]
pub trait PageDriver: Send + Sync {
    /// Navigate to `url` and wait for the navigation to commit.
    async fn open(&self, url: &str) -> Result<()>;

    /// Click the first element matching `selector`.
    async fn click(&self, selector: &str) -> Result<()>;

    /// Click into the first element matching `selector` and type `text`.
    async fn type_text(&self, selector: &str, text: &str) -> Result<()>;

    /// Wait until `selector` matches a visible element. Selectors starting
    /// with `/` or `(` are treated as XPath. Errors when `timeout` elapses
    /// first.
    async fn wait_visible(&self, selector: &str, timeout: Duration) -> Result<()>;

    /// Read an attribute from the first element matching `selector`.
    /// `Ok(None)` means the element exists without that attribute; a missing
    /// element is an error.
    async fn element_attribute(&self, selector: &str, name: &str) -> Result<Option<String>>;

    /// Current page URL.
    async fn current_url(&self) -> Result<String>;

    /// Evaluate JavaScript in the page and return its result as JSON.
    /// An `undefined` result comes back as `null`.
    async fn eval(&self, script: &str) -> Result<serde_json::Value>;

    /// Start collecting network events. Must run before the responses of
    /// interest arrive; events from before this call are lost.
    async fn enable_network_capture(&self) -> Result<()>;

    /// Take every network event collected since the previous drain.
    async fn drain_network_events(&self) -> Result<Vec<NetworkEvent>>;

    /// Fetch a response body by request id and parse it as JSON.
    async fn response_body(&self, request_id: &str) -> Result<serde_json::Value>;

    /// Close the page.
    async fn close(&self) -> Result<()>;
}
