//! Chromium-backed [`PageDriver`] built on chromiumoxide.

use super::{NetworkEvent, PageDriver};
use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use base64::Engine;
use chromiumoxide::browser::{Browser, BrowserConfig};
use chromiumoxide::cdp::browser_protocol::network::{
    EnableParams, EventResponseReceived, GetResponseBodyParams,
};
use chromiumoxide::page::Page;
use futures::StreamExt;
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tracing::{debug, info, warn};

/// Floor for a single CDP command round-trip.
const REQUEST_TIMEOUT_FLOOR: Duration = Duration::from_secs(120);

/// Headroom the command timeout keeps above the longest in-page wait.
const REQUEST_TIMEOUT_MARGIN: Duration = Duration::from_secs(30);

/// Poll cadence used by injected visibility waits, in milliseconds.
const VISIBILITY_TICK_MS: u64 = 100;

/// Locate a Chromium binary.
///
/// Checks `PROSPECTOR_CHROMIUM_PATH`, then `~/.prospector/chromium/`, then
/// the system `PATH`, then the default macOS install location.
pub fn find_chromium() -> Option<PathBuf> {
    if let Ok(path) = std::env::var("PROSPECTOR_CHROMIUM_PATH") {
        let path = PathBuf::from(path);
        if path.exists() {
            return Some(path);
        }
    }

    if let Some(home) = dirs::home_dir() {
        let managed = home.join(".prospector").join("chromium");
        for candidate in [
            managed.join("chrome-linux64").join("chrome"),
            managed.join("chrome-mac-arm64").join("chrome"),
            managed.join("chrome"),
        ] {
            if candidate.exists() {
                return Some(candidate);
            }
        }
    }

    for name in ["google-chrome", "chromium", "chromium-browser"] {
        if let Ok(path) = which::which(name) {
            return Some(path);
        }
    }

    let macos = PathBuf::from("/Applications/Google Chrome.app/Contents/MacOS/Google Chrome");
    if macos.exists() {
        return Some(macos);
    }

    None
}

/// Ceiling for a single CDP command round-trip. Stays above the longest
/// wait an injected script may hold, so the wait expires before the
/// transport does.
fn request_timeout_for(longest_page_wait: Duration) -> Duration {
    REQUEST_TIMEOUT_FLOOR.max(longest_page_wait + REQUEST_TIMEOUT_MARGIN)
}

/// Launch options for [`ChromiumDriver`].
#[derive(Debug, Clone)]
pub struct LaunchOptions {
    /// Run without a visible window. Challenge interstitials need a human
    /// at the screen, so runs default to headed.
    pub headless: bool,
    /// Longest wait an injected script may be asked to hold, normally
    /// the configured page-load timeout.
    pub longest_page_wait: Duration,
}

impl Default for LaunchOptions {
    fn default() -> Self {
        Self {
            headless: false,
            longest_page_wait: Duration::ZERO,
        }
    }
}

/// A real Chromium session: one browser process, one page.
pub struct ChromiumDriver {
    browser: Browser,
    page: Page,
    events: Arc<Mutex<Vec<NetworkEvent>>>,
}

impl ChromiumDriver {
    /// Launch Chromium and open a blank page.
    pub async fn launch(options: LaunchOptions) -> Result<Self> {
        let chrome_path = find_chromium().context(
            "Chromium not found. Set PROSPECTOR_CHROMIUM_PATH or install google-chrome.",
        )?;
        info!("launching chromium from {}", chrome_path.display());

        let mut builder = BrowserConfig::builder()
            .chrome_executable(&chrome_path)
            .request_timeout(request_timeout_for(options.longest_page_wait))
            .arg("--disable-gpu")
            .arg("--no-sandbox")
            .arg("--disable-dev-shm-usage")
            .arg("--disable-blink-features=AutomationControlled")
            .arg("--window-size=1440,900");
        if options.headless {
            builder = builder.arg("--headless=new");
        } else {
            builder = builder.with_head();
        }
        let config = builder
            .build()
            .map_err(|e| anyhow::anyhow!("failed to build browser config: {e}"))?;

        let (browser, mut handler) = Browser::launch(config)
            .await
            .context("failed to launch Chromium")?;

        // The handler future must be driven for the lifetime of the browser.
        tokio::spawn(async move {
            while let Some(event) = handler.next().await {
                if let Err(e) = event {
                    debug!("cdp handler: {e}");
                }
            }
        });

        let page = browser
            .new_page("about:blank")
            .await
            .context("failed to open a page")?;

        Ok(Self {
            browser,
            page,
            events: Arc::new(Mutex::new(Vec::new())),
        })
    }
}

#[async_trait]
impl PageDriver for ChromiumDriver {
    async fn open(&self, url: &str) -> Result<()> {
        self.page
            .goto(url)
            .await
            .with_context(|| format!("failed to open {url}"))?;
        // Navigation may already be settled when this resolves.
        let _ = self.page.wait_for_navigation().await;
        Ok(())
    }

    async fn click(&self, selector: &str) -> Result<()> {
        let element = self
            .page
            .find_element(selector)
            .await
            .with_context(|| format!("element not found: {selector}"))?;
        element
            .click()
            .await
            .with_context(|| format!("click failed: {selector}"))?;
        Ok(())
    }

    async fn type_text(&self, selector: &str, text: &str) -> Result<()> {
        let element = self
            .page
            .find_element(selector)
            .await
            .with_context(|| format!("element not found: {selector}"))?;
        element
            .click()
            .await
            .with_context(|| format!("focus failed: {selector}"))?;
        element
            .type_str(text)
            .await
            .with_context(|| format!("typing failed: {selector}"))?;
        Ok(())
    }

    async fn wait_visible(&self, selector: &str, timeout: Duration) -> Result<()> {
        let script = build_visibility_script(selector, timeout.as_millis() as u64);
        let visible: bool = self
            .page
            .evaluate(script)
            .await
            .with_context(|| format!("visibility wait failed: {selector}"))?
            .into_value()
            .map_err(|e| anyhow::anyhow!("unreadable visibility result: {e}"))?;
        if !visible {
            bail!(
                "element not visible within {}s: {selector}",
                timeout.as_secs()
            );
        }
        Ok(())
    }

    async fn element_attribute(&self, selector: &str, name: &str) -> Result<Option<String>> {
        let script = build_attribute_script(selector, name);
        let result: serde_json::Value = self
            .page
            .evaluate(script)
            .await
            .with_context(|| format!("attribute lookup failed: {selector}"))?
            .into_value()
            .map_err(|e| anyhow::anyhow!("unreadable attribute result: {e}"))?;
        let found = result
            .get("found")
            .and_then(serde_json::Value::as_bool)
            .unwrap_or(false);
        if !found {
            bail!("element not found: {selector}");
        }
        Ok(result
            .get("value")
            .and_then(serde_json::Value::as_str)
            .map(String::from))
    }

    async fn current_url(&self) -> Result<String> {
        Ok(self
            .page
            .url()
            .await
            .context("failed to read page url")?
            .map(|u| u.to_string())
            .unwrap_or_default())
    }

    async fn eval(&self, script: &str) -> Result<serde_json::Value> {
        let result = self
            .page
            .evaluate(script)
            .await
            .context("script evaluation failed")?;
        // `undefined` carries no value; map it to null.
        Ok(result.into_value().unwrap_or(serde_json::Value::Null))
    }

    async fn enable_network_capture(&self) -> Result<()> {
        let mut stream = self
            .page
            .event_listener::<EventResponseReceived>()
            .await
            .context("failed to attach network listener")?;
        self.page
            .execute(EnableParams::default())
            .await
            .context("failed to enable the network domain")?;

        let events = Arc::clone(&self.events);
        tokio::spawn(async move {
            while let Some(event) = stream.next().await {
                let Ok(mut log) = events.lock() else { break };
                log.push(NetworkEvent {
                    request_id: event.request_id.inner().to_string(),
                    url: event.response.url.clone(),
                });
            }
        });
        debug!("network capture enabled");
        Ok(())
    }

    async fn drain_network_events(&self) -> Result<Vec<NetworkEvent>> {
        let mut log = self
            .events
            .lock()
            .map_err(|_| anyhow::anyhow!("network event log poisoned"))?;
        Ok(std::mem::take(&mut *log))
    }

    async fn response_body(&self, request_id: &str) -> Result<serde_json::Value> {
        let params = GetResponseBodyParams::new(request_id.to_string());
        let response = self
            .page
            .execute(params)
            .await
            .with_context(|| format!("no response body for request {request_id}"))?;
        let body = if response.result.base64_encoded {
            let bytes = base64::engine::general_purpose::STANDARD
                .decode(&response.result.body)
                .context("response body is not valid base64")?;
            String::from_utf8(bytes).context("response body is not valid UTF-8")?
        } else {
            response.result.body.clone()
        };
        serde_json::from_str(&body).context("response body is not valid JSON")
    }

    async fn close(&self) -> Result<()> {
        if let Err(e) = self.page.clone().close().await {
            warn!("page close failed: {e}");
        }
        Ok(())
    }
}

/// Escape a string for embedding in single-quoted JavaScript.
pub(crate) fn sanitize_js_string(input: &str) -> String {
    input
        .chars()
        .filter_map(|c| match c {
            '\\' => Some("\\\\".to_string()),
            '\'' => Some("\\'".to_string()),
            '"' => Some("\\\"".to_string()),
            '`' => Some("\\`".to_string()),
            '\n' => Some("\\n".to_string()),
            '\r' => Some("\\r".to_string()),
            '\t' => Some("\\t".to_string()),
            '\0' => None,
            '<' => Some("\\x3c".to_string()),
            '>' => Some("\\x3e".to_string()),
            c => Some(c.to_string()),
        })
        .collect()
}

fn build_visibility_script(selector: &str, timeout_ms: u64) -> String {
    let escaped = sanitize_js_string(selector);
    let lookup = if selector.starts_with('/') || selector.starts_with('(') {
        format!(
            "document.evaluate('{escaped}', document, null, \
             XPathResult.FIRST_ORDERED_NODE_TYPE, null).singleNodeValue"
        )
    } else {
        format!("document.querySelector('{escaped}')")
    };
    format!(
        r#"new Promise((resolve) => {{
    const started = Date.now();
    const visible = (el) => !!el && (el.offsetWidth > 0 || el.offsetHeight > 0 || el.getClientRects().length > 0);
    const tick = () => {{
        if (visible({lookup})) {{ resolve(true); return; }}
        if (Date.now() - started >= {timeout_ms}) {{ resolve(false); return; }}
        setTimeout(tick, {VISIBILITY_TICK_MS});
    }};
    tick();
}})"#
    )
}

fn build_attribute_script(selector: &str, name: &str) -> String {
    format!(
        r#"(() => {{
    const el = document.querySelector('{}');
    if (!el) return {{ found: false, value: null }};
    return {{ found: true, value: el.getAttribute('{}') }};
}})()"#,
        sanitize_js_string(selector),
        sanitize_js_string(name)
    )
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sanitize_basic() {
        assert_eq!(sanitize_js_string("hello"), "hello");
        assert_eq!(sanitize_js_string("it's"), "it\\'s");
        assert_eq!(sanitize_js_string("a\"b"), "a\\\"b");
    }

    #[test]
    fn test_sanitize_injection() {
        let hostile = "'); alert('pwned'); ('";
        let escaped = sanitize_js_string(hostile);
        assert!(!escaped.contains("');"));
        assert!(escaped.contains("\\'"));
    }

    #[test]
    fn test_sanitize_strips_null_bytes() {
        assert_eq!(sanitize_js_string("a\0b"), "ab");
    }

    #[test]
    fn test_sanitize_angle_brackets() {
        assert_eq!(sanitize_js_string("<script>"), "\\x3cscript\\x3e");
    }

    #[test]
    fn test_request_timeout_covers_long_page_waits() {
        assert_eq!(
            request_timeout_for(Duration::from_secs(30)),
            Duration::from_secs(120)
        );
        assert_eq!(
            request_timeout_for(Duration::from_secs(300)),
            Duration::from_secs(330)
        );
    }

    #[test]
    fn test_visibility_script_css() {
        let script = build_visibility_script("div.zp_xVJ20", 5000);
        assert!(script.contains("document.querySelector('div.zp_xVJ20')"));
        assert!(script.contains("5000"));
    }

    #[test]
    fn test_visibility_script_xpath() {
        let script = build_visibility_script("//table/tbody", 5000);
        assert!(script.contains("document.evaluate"));
        assert!(script.contains("FIRST_ORDERED_NODE_TYPE"));
    }

    #[test]
    fn test_attribute_script_escapes_selector() {
        let script = build_attribute_script("button[aria-label=\"Next\"]", "disabled");
        assert!(script.contains("getAttribute('disabled')"));
        assert!(script.contains("aria-label=\\\"Next\\\""));
    }

    // Requires a local Chromium install; exercised manually.
    #[tokio::test]
    #[ignore]
    async fn test_drive_data_url_page() {
        let driver = ChromiumDriver::launch(LaunchOptions {
            headless: true,
            ..LaunchOptions::default()
        })
        .await
        .expect("launch failed");
        driver
            .open("data:text/html,<html><body><h1 id=\"t\" data-k=\"v\">hi</h1></body></html>")
            .await
            .expect("open failed");
        driver
            .wait_visible("#t", Duration::from_secs(5))
            .await
            .expect("h1 should be visible");
        let attr = driver
            .element_attribute("#t", "data-k")
            .await
            .expect("attribute lookup failed");
        assert_eq!(attr.as_deref(), Some("v"));
        let text = driver
            .eval("document.querySelector('#t').textContent")
            .await
            .expect("eval failed");
        assert_eq!(text, serde_json::json!("hi"));
        driver.close().await.expect("close failed");
    }
}
