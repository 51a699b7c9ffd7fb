//! The two-call unlock protocol.
//!
//! Contact details are disclosed by replaying the host app's own "add to
//! my prospects" flow from inside the page: a consent probe first, then
//! the disclosure call. The response comes back through the unlock capture
//! queue; correlation is by queue length, since concurrent page activity
//! can append unrelated entries at any time.

use crate::browser::PageDriver;
use crate::capture::channel::ResponseChannel;
use crate::capture::{netlog, Queue, UNLOCK_URL_MARKER};
use crate::poll;
use anyhow::Result;
use serde::Serialize;
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info, warn};

/// Consent probe the host app fires before disclosure.
pub const SAFETY_CHECK_URL: &str = "https://app.apollo.io/api/v1/mixed_people/safety_check";

/// Disclosure call whose response carries the contact details.
pub const ADD_PROSPECTS_URL: &str =
    "https://app.apollo.io/api/v1/mixed_people/add_to_my_prospects";

/// Gap between the two protocol calls.
pub const INTER_CALL_DELAY: Duration = Duration::from_secs(1);

/// Poll cadence while waiting for the disclosure response.
pub const UNLOCK_POLL_INTERVAL: Duration = Duration::from_millis(500);

/// Queue-wait budget before falling back to the network log.
pub const UNLOCK_RESPONSE_BUDGET: Duration = Duration::from_secs(10);

/// Request body for both unlock calls, mirroring the host app's own.
#[derive(Debug, Clone, Serialize)]
pub struct UnlockRequest {
    pub entity_ids: Vec<String>,
    pub analytics_context: String,
    pub skip_fetching_people: bool,
    pub cta_name: String,
    #[serde(rename = "cacheKey")]
    pub cache_key: i64,
}

impl UnlockRequest {
    /// Payload for one record id, stamped with the current time.
    pub fn for_entity(id: &str) -> Self {
        Self {
            entity_ids: vec![id.to_string()],
            analytics_context: "Searcher: Individual Add Button".to_string(),
            skip_fetching_people: true,
            cta_name: "Access email".to_string(),
            cache_key: chrono::Utc::now().timestamp_millis(),
        }
    }

    /// Re-stamp the cache key; each call gets a fresh one.
    pub fn refreshed(mut self) -> Self {
        self.cache_key = chrono::Utc::now().timestamp_millis();
        self
    }
}

/// Contact fields recovered by an unlock attempt.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct UnlockedContact {
    pub email: Option<String>,
    pub phone: Option<String>,
}

impl UnlockedContact {
    pub fn is_empty(&self) -> bool {
        self.email.is_none() && self.phone.is_none()
    }
}

/// Drives the unlock protocol over a live page.
pub struct UnlockDriver {
    driver: Arc<dyn PageDriver>,
    channel: ResponseChannel,
}

impl UnlockDriver {
    pub fn new(driver: Arc<dyn PageDriver>, channel: ResponseChannel) -> Self {
        Self { driver, channel }
    }

    /// Attempt to unlock contact details for one record id.
    ///
    /// Never errors: any failure along the way degrades to an empty
    /// [`UnlockedContact`], leaving the caller's already-projected record
    /// intact.
    pub async fn unlock(&self, entity_id: &str) -> UnlockedContact {
        if entity_id.is_empty() {
            warn!("unlock requested without an entity id");
            return UnlockedContact::default();
        }
        match self.request_disclosure(entity_id).await {
            Some(response) => {
                let contact = extract_contact(&response);
                if contact.is_empty() {
                    info!("unlock for {entity_id} returned no contact fields");
                }
                contact
            }
            None => {
                warn!("no unlock response for {entity_id}");
                UnlockedContact::default()
            }
        }
    }

    /// Run the two-call sequence and wait for a correlated response.
    async fn request_disclosure(&self, entity_id: &str) -> Option<Value> {
        let request = UnlockRequest::for_entity(entity_id);

        if let Err(e) = self.fire(SAFETY_CHECK_URL, &request).await {
            warn!("safety check failed for {entity_id}: {e:#}");
        }
        tokio::time::sleep(INTER_CALL_DELAY).await;

        // Length marker taken before the disclosure call fires. Entries at
        // or below it belong to earlier activity and are never trusted.
        let marker = match self.channel.queue_len(Queue::Unlock).await {
            Ok(len) => len,
            Err(e) => {
                warn!("unlock queue length unavailable: {e:#}");
                0
            }
        };

        if let Err(e) = self.fire(ADD_PROSPECTS_URL, &request.refreshed()).await {
            warn!("disclosure call failed for {entity_id}: {e:#}");
        }

        let fresh = poll::poll_until(UNLOCK_POLL_INTERVAL, UNLOCK_RESPONSE_BUDGET, || async {
            let entries = self.channel.snapshot(Queue::Unlock).await.ok()?;
            if entries.len() <= marker {
                return None;
            }
            let latest = entries.last()?.clone();
            has_contacts(&latest).then_some(latest)
        })
        .await;
        if fresh.is_some() {
            debug!("unlock response correlated for {entity_id}");
            return fresh;
        }

        info!("unlock queue empty for {entity_id}, replaying network log");
        netlog::recover_response(
            self.driver.as_ref(),
            UNLOCK_URL_MARKER,
            netlog::UNLOCK_NETLOG_BUDGET,
        )
        .await
    }

    /// POST `request` to `url` from inside the page. The promise is not
    /// awaited; the observers own response delivery.
    async fn fire(&self, url: &str, request: &UnlockRequest) -> Result<()> {
        let body = serde_json::to_string(request)?;
        self.driver.eval(&build_fire_script(url, &body)).await?;
        Ok(())
    }
}

fn build_fire_script(url: &str, body_json: &str) -> String {
    format!(
        r#"fetch('{url}', {{
    method: 'POST',
    headers: {{ 'Content-Type': 'application/json' }},
    body: JSON.stringify({body_json})
}}).catch(() => {{}});"#
    )
}

/// Pull email and phone out of `contacts[0]`.
///
/// Email falls back to `contact_emails[0].email`; phone prefers the raw
/// number over the sanitized one. Empty strings count as absent.
pub fn extract_contact(response: &Value) -> UnlockedContact {
    let Some(contact) = response
        .get("contacts")
        .and_then(Value::as_array)
        .and_then(|contacts| contacts.first())
    else {
        return UnlockedContact::default();
    };

    let email = non_empty(contact.get("email")).or_else(|| {
        contact
            .get("contact_emails")
            .and_then(Value::as_array)
            .and_then(|emails| emails.first())
            .and_then(|entry| non_empty(entry.get("email")))
    });

    let first_phone = contact
        .get("phone_numbers")
        .and_then(Value::as_array)
        .and_then(|phones| phones.first());
    let phone = first_phone
        .and_then(|p| non_empty(p.get("raw_number")))
        .or_else(|| first_phone.and_then(|p| non_empty(p.get("sanitized_number"))));

    UnlockedContact { email, phone }
}

/// True when the response holds at least one contact entry.
fn has_contacts(response: &Value) -> bool {
    response
        .get("contacts")
        .and_then(Value::as_array)
        .map_or(false, |contacts| !contacts.is_empty())
}

fn non_empty(value: Option<&Value>) -> Option<String> {
    value
        .and_then(Value::as_str)
        .filter(|s| !s.is_empty())
        .map(String::from)
}
