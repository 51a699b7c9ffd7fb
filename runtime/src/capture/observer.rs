//! Page-side network observers.
//!
//! The install script wraps `window.fetch` and `XMLHttpRequest` so that
//! JSON bodies of matching responses are appended to the capture queues,
//! while the page sees its traffic completely unchanged. Installation is
//! idempotent behind a guard flag and is re-applied at the top of every
//! page cycle, so a document swap that wipes the page's JS world only
//! costs one uninstrumented beat.

use crate::browser::PageDriver;
use crate::capture::{SEARCH_URL_MARKER, UNLOCK_URL_MARKER};
use anyhow::{Context, Result};
use tracing::debug;

/// Guard flag the install script sets on the page.
const INSTALL_GUARD: &str = "window.__prospector_observer_installed";

/// Build the observer install script.
///
/// Queues survive reinstallation; only [`reset_script`] empties them.
/// Response parse failures are swallowed so instrumentation can never
/// break the page.
pub fn install_script() -> String {
    format!(
        r#"(() => {{
    if ({guard}) {{ return true; }}
    {guard} = true;
    {search_queue} = {search_queue} || [];
    {unlock_queue} = {unlock_queue} || [];

    const route = (url, data) => {{
        if (typeof url !== 'string') return;
        if (url.includes('{search_marker}')) {search_queue}.push(data);
        if (url.includes('{unlock_marker}')) {unlock_queue}.push(data);
    }};
    const interesting = (url) => typeof url === 'string' &&
        (url.includes('{search_marker}') || url.includes('{unlock_marker}'));

    const originalFetch = window.fetch;
    window.fetch = function(...args) {{
        const url = typeof args[0] === 'string' ? args[0] : (args[0] && args[0].url);
        if (!interesting(url)) {{
            return originalFetch.apply(this, args);
        }}
        return originalFetch.apply(this, args).then((response) => {{
            response.clone().json()
                .then((data) => route(url, data))
                .catch(() => {{}});
            return response;
        }});
    }};

    const originalOpen = XMLHttpRequest.prototype.open;
    const originalSend = XMLHttpRequest.prototype.send;
    XMLHttpRequest.prototype.open = function(method, url) {{
        this.__prospector_url = url;
        return originalOpen.apply(this, arguments);
    }};
    XMLHttpRequest.prototype.send = function() {{
        const url = this.__prospector_url;
        if (interesting(url)) {{
            this.addEventListener('load', function() {{
                try {{ route(url, JSON.parse(this.responseText)); }} catch (e) {{}}
            }});
        }}
        return originalSend.apply(this, arguments);
    }};
    return true;
}})()"#,
        guard = INSTALL_GUARD,
        search_queue = crate::capture::Queue::Search.js_array(),
        unlock_queue = crate::capture::Queue::Unlock.js_array(),
        search_marker = SEARCH_URL_MARKER,
        unlock_marker = UNLOCK_URL_MARKER,
    )
}

/// Script that empties both capture queues.
pub fn reset_script() -> String {
    format!(
        "{} = []; {} = [];",
        crate::capture::Queue::Search.js_array(),
        crate::capture::Queue::Unlock.js_array()
    )
}

/// Install the observers, a no-op when they are already in place.
pub async fn ensure_installed(driver: &dyn PageDriver) -> Result<()> {
    driver
        .eval(&install_script())
        .await
        .context("observer install failed")?;
    debug!("capture observers installed");
    Ok(())
}

/// Empty both capture queues. Must never run while a wait on either queue
/// is pending.
pub async fn reset_queues(driver: &dyn PageDriver) -> Result<()> {
    driver
        .eval(&reset_script())
        .await
        .context("queue reset failed")?;
    Ok(())
}
