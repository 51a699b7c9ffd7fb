//! Run configuration, loaded from `config.json`.

use anyhow::{Context, Result};
use serde::Deserialize;
use std::path::Path;
use std::time::Duration;
use tracing::warn;
use url::Url;

/// Page ceiling when `scraping.max_pages` is absent.
const DEFAULT_MAX_PAGES: u32 = 10;

#[derive(Debug, Clone, Deserialize)]
pub struct ScraperConfig {
    pub credentials: Credentials,
    pub urls: Urls,
    pub selectors: Selectors,
    pub timeouts: Timeouts,
    #[serde(default)]
    pub scraping: Scraping,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Credentials {
    pub email: String,
    pub password: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Urls {
    pub login_url: String,
    /// Saved people-list URL the run walks.
    pub saved_link_list: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Selectors {
    /// Bare class name that marks the signed-in homepage.
    pub homepage_class: String,
    /// Cell that must render before a fresh page counts as loaded.
    pub contact_name_cell: SelectorSpec,
    /// Content marker for the results table (CSS or XPath).
    pub table_xpath: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct SelectorSpec {
    pub value: String,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Timeouts {
    /// Ceiling for content waits, in seconds.
    pub page_load: u64,
}

#[derive(Debug, Clone, Deserialize)]
pub struct Scraping {
    #[serde(default = "default_max_pages")]
    pub max_pages: u32,
    #[serde(default = "default_output_format")]
    pub output_format: String,
}

impl Default for Scraping {
    fn default() -> Self {
        Self {
            max_pages: DEFAULT_MAX_PAGES,
            output_format: default_output_format(),
        }
    }
}

fn default_max_pages() -> u32 {
    DEFAULT_MAX_PAGES
}

fn default_output_format() -> String {
    "both".to_string()
}

/// Output formats for the persisted dataset.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Json,
    Csv,
    Both,
}

impl ScraperConfig {
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config {}", path.display()))?;
        serde_json::from_str(&raw)
            .with_context(|| format!("invalid config {}", path.display()))
    }

    /// Reject configs whose URLs cannot be parsed, before any browser
    /// starts.
    pub fn validate(&self) -> Result<()> {
        Url::parse(&self.urls.login_url)
            .with_context(|| format!("invalid login_url: {}", self.urls.login_url))?;
        Url::parse(&self.urls.saved_link_list)
            .with_context(|| format!("invalid saved_link_list: {}", self.urls.saved_link_list))?;
        if self.credentials.email.is_empty() || self.credentials.password.is_empty() {
            anyhow::bail!("credentials.email and credentials.password must be set");
        }
        Ok(())
    }

    /// Validated output format. Unknown values fall back to `both`.
    pub fn output_format(&self) -> OutputFormat {
        match self.scraping.output_format.to_lowercase().as_str() {
            "json" => OutputFormat::Json,
            "csv" => OutputFormat::Csv,
            "both" => OutputFormat::Both,
            other => {
                warn!("unknown output_format '{other}', using 'both'");
                OutputFormat::Both
            }
        }
    }

    /// The homepage marker as a CSS selector.
    pub fn homepage_selector(&self) -> String {
        format!(".{}", self.selectors.homepage_class)
    }

    pub fn page_load_timeout(&self) -> Duration {
        Duration::from_secs(self.timeouts.page_load)
    }
}

/// Starter config written by `prospector init`.
pub const SAMPLE_CONFIG: &str = r#"{
    "credentials": {
        "email": "you@example.com",
        "password": "your-password"
    },
    "urls": {
        "login_url": "https://app.apollo.io/#/login",
        "saved_link_list": "https://app.apollo.io/#/people?contactLabelIds[]=..."
    },
    "selectors": {
        "homepage_class": "zp_GGHzP",
        "contact_name_cell": {
            "value": "a.zp_p2Xqs"
        },
        "table_xpath": "//table/tbody/tr[1]"
    },
    "timeouts": {
        "page_load": 30
    },
    "scraping": {
        "max_pages": 10,
        "output_format": "both"
    }
}
"#;
