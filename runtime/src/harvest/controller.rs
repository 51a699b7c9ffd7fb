//! Pagination controller.
//!
//! One run walks the saved list page by page: wait for content, wait for
//! the captured search response, extract and unlock, persist, advance.
//! Every fallible step between session start and session end degrades to
//! "stop paginating" rather than erroring; the records already persisted
//! stay on disk either way.

use crate::audit::logger::AuditLogger;
use crate::browser::PageDriver;
use crate::capture::channel::{ResponseChannel, SEARCH_RESPONSE_BUDGET};
use crate::capture::{netlog, observer, Queue, SEARCH_URL_MARKER};
use crate::events::{self, EventSender, RunEvent};
use crate::harvest::project::{self, LOCKED_EMAIL_PLACEHOLDER};
use crate::harvest::unlock::UnlockDriver;
use crate::store::Store;
use anyhow::{Context, Result};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

/// Settle delay after opening the list page.
const LIST_SETTLE_DELAY: Duration = Duration::from_secs(3);

/// Extra grace when the content marker never became visible.
const CONTENT_GRACE_DELAY: Duration = Duration::from_secs(5);

/// Settle delay after clicking the next-page control.
const NEXT_SETTLE_DELAY: Duration = Duration::from_secs(2);

/// Courtesy delay after each unlock attempt.
const UNLOCK_THROTTLE: Duration = Duration::from_secs(1);

/// The pagination control.
const NEXT_BUTTON_SELECTOR: &str = r#"button[aria-label="Next"]"#;

/// Parameters for one harvest run.
#[derive(Debug, Clone)]
pub struct HarvestRequest {
    /// Saved list URL to walk.
    pub list_url: String,
    /// Content marker for a loaded results table (CSS or XPath).
    pub table_selector: String,
    /// Cell that must render before moving past a fresh page.
    pub contact_cell_selector: String,
    /// Ceiling for content waits.
    pub page_load_timeout: Duration,
    /// Hard page ceiling for the run; zero scrapes nothing.
    pub max_pages: u32,
}

/// How a run ended.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EndState {
    /// Page ceiling reached or pagination control exhausted.
    Done,
    /// Pagination ended while the current page had no usable response.
    DoneDegraded,
}

/// Aggregate result of a harvest run.
#[derive(Debug, Clone)]
pub struct HarvestOutcome {
    pub end_state: EndState,
    /// Pages whose extraction cycle completed.
    pub pages_processed: u32,
    pub records_captured: usize,
}

enum CycleState {
    AwaitingContent,
    AwaitingResponse,
    Extracting { payload: Value },
    Persisting { batch: Vec<Value> },
    Advancing,
}

enum Step {
    Continue(CycleState),
    Finish(EndState),
}

pub struct HarvestController {
    driver: Arc<dyn PageDriver>,
    channel: ResponseChannel,
    unlocker: UnlockDriver,
    store: Store,
    request: HarvestRequest,
    events: Option<EventSender>,
    audit: Option<AuditLogger>,
    current_page: u32,
    pages_processed: u32,
    records_captured: usize,
}

impl HarvestController {
    pub fn new(driver: Arc<dyn PageDriver>, store: Store, request: HarvestRequest) -> Self {
        let channel = ResponseChannel::new(Arc::clone(&driver));
        let unlocker = UnlockDriver::new(Arc::clone(&driver), channel.clone());
        Self {
            driver,
            channel,
            unlocker,
            store,
            request,
            events: None,
            audit: None,
            current_page: 1,
            pages_processed: 0,
            records_captured: 0,
        }
    }

    pub fn with_events(mut self, sender: EventSender) -> Self {
        self.events = Some(sender);
        self
    }

    pub fn with_audit(mut self, logger: AuditLogger) -> Self {
        self.audit = Some(logger);
        self
    }

    /// Recover the store once the run is over, for end-of-run conversion.
    pub fn into_store(self) -> Store {
        self.store
    }

    /// Walk the list until the page ceiling, the pagination control, or
    /// response starvation ends the run.
    ///
    /// Errors only on session-level failures: an unreachable list page or
    /// a store that stopped accepting writes.
    pub async fn run(&mut self) -> Result<HarvestOutcome> {
        info!(
            "harvesting {} (max {} pages)",
            self.request.list_url, self.request.max_pages
        );
        self.audit("run_started", None, None, "ok");
        self.driver
            .open(&self.request.list_url)
            .await
            .context("failed to open the saved list")?;
        tokio::time::sleep(LIST_SETTLE_DELAY).await;

        let mut state = CycleState::AwaitingContent;
        let end = loop {
            match self.step(state).await? {
                Step::Continue(next) => state = next,
                Step::Finish(end) => break end,
            }
        };

        match end {
            EndState::Done => info!(
                "harvest complete: {} records across {} pages",
                self.records_captured, self.pages_processed
            ),
            EndState::DoneDegraded => warn!(
                "harvest ended degraded: {} records across {} pages",
                self.records_captured, self.pages_processed
            ),
        }
        self.audit("run_finished", Some(self.pages_processed), None, match end {
            EndState::Done => "ok",
            EndState::DoneDegraded => "degraded",
        });

        Ok(HarvestOutcome {
            end_state: end,
            pages_processed: self.pages_processed,
            records_captured: self.records_captured,
        })
    }

    async fn step(&mut self, state: CycleState) -> Result<Step> {
        match state {
            CycleState::AwaitingContent => self.await_content().await,
            CycleState::AwaitingResponse => self.await_search_response().await,
            CycleState::Extracting { payload } => self.extract(payload).await,
            CycleState::Persisting { batch } => self.persist(batch).await,
            CycleState::Advancing => self.advance().await,
        }
    }

    /// Cycle entry: finish when the ceiling leaves nothing to scrape,
    /// else wait for the results table and re-arm the observers. A page
    /// that never shows the marker still gets a grace period and a
    /// chance at the response wait.
    async fn await_content(&mut self) -> Result<Step> {
        if self.current_page > self.request.max_pages {
            info!("page ceiling reached ({} pages)", self.request.max_pages);
            return Ok(Step::Finish(EndState::Done));
        }
        info!("page {}: waiting for content", self.current_page);
        if let Err(e) = observer::ensure_installed(self.driver.as_ref()).await {
            warn!("observer install failed: {e:#}");
        }
        if let Err(e) = self
            .driver
            .wait_visible(&self.request.table_selector, self.request.page_load_timeout)
            .await
        {
            warn!("page {}: content marker missing: {e:#}", self.current_page);
            tokio::time::sleep(CONTENT_GRACE_DELAY).await;
        }
        Ok(Step::Continue(CycleState::AwaitingResponse))
    }

    /// Wait on the search queue, then the network log. A double miss
    /// degrades the page: skip extraction and move on (or stop).
    async fn await_search_response(&mut self) -> Result<Step> {
        if let Some(payload) = self
            .channel
            .await_response(Queue::Search, SEARCH_RESPONSE_BUDGET)
            .await
        {
            return Ok(Step::Continue(CycleState::Extracting { payload }));
        }

        info!(
            "page {}: no captured search response, replaying network log",
            self.current_page
        );
        if let Some(payload) = netlog::recover_response(
            self.driver.as_ref(),
            SEARCH_URL_MARKER,
            netlog::SEARCH_NETLOG_BUDGET,
        )
        .await
        {
            return Ok(Step::Continue(CycleState::Extracting { payload }));
        }

        warn!("page {}: no usable search response", self.current_page);
        self.emit(RunEvent::PageDegraded {
            page: self.current_page,
            reason: "no search response".to_string(),
        });
        self.audit("page_degraded", Some(self.current_page), None, "no response");

        // The page still counts against the ceiling even though nothing
        // was extracted from it.
        if self.current_page >= self.request.max_pages {
            return Ok(Step::Finish(EndState::DoneDegraded));
        }
        if self.advance_control(false).await {
            self.current_page += 1;
            return Ok(Step::Continue(CycleState::AwaitingContent));
        }
        Ok(Step::Finish(EndState::DoneDegraded))
    }

    /// Turn the payload's people into flat records, unlocking along the
    /// way. Unrecognized payloads pass through raw so nothing captured is
    /// dropped.
    async fn extract(&mut self, payload: Value) -> Result<Step> {
        let batch = match payload.get("people").and_then(Value::as_array) {
            Some(people) => {
                info!(
                    "page {}: extracting {} people",
                    self.current_page,
                    people.len()
                );
                let mut batch = Vec::with_capacity(people.len());
                for raw in people {
                    batch.push(self.build_record(raw).await);
                }
                batch
            }
            None => {
                warn!(
                    "page {}: payload has no people list, persisting raw",
                    self.current_page
                );
                vec![payload]
            }
        };
        Ok(Step::Continue(CycleState::Persisting { batch }))
    }

    async fn build_record(&mut self, raw: &Value) -> Value {
        let person = match project::parse_person(raw) {
            Ok(person) => person,
            Err(e) => {
                warn!(
                    "page {}: unparseable person entry, keeping raw: {e}",
                    self.current_page
                );
                return raw.clone();
            }
        };
        let mut record = project::project(&person, self.current_page);

        let id = person.id.as_deref().unwrap_or_default();
        if !id.is_empty() && project::needs_unlock(&person) {
            let unlocked = self.unlocker.unlock(id).await;
            if let Some(email) = unlocked
                .email
                .as_deref()
                .filter(|email| *email != LOCKED_EMAIL_PLACEHOLDER)
            {
                record.email = email.to_string();
            }
            if let Some(phone) = &unlocked.phone {
                record.phone_number = phone.clone();
            }
            if unlocked.is_empty() {
                self.emit(RunEvent::UnlockFailed {
                    person_id: id.to_string(),
                });
                self.audit("unlock", Some(self.current_page), Some(id), "empty");
            } else {
                self.emit(RunEvent::UnlockSucceeded {
                    person_id: id.to_string(),
                    email_found: unlocked.email.is_some(),
                    phone_found: unlocked.phone.is_some(),
                });
                self.audit("unlock", Some(self.current_page), Some(id), "ok");
            }
            tokio::time::sleep(UNLOCK_THROTTLE).await;
        }

        match serde_json::to_value(&record) {
            Ok(value) => value,
            Err(_) => raw.clone(),
        }
    }

    /// Append the batch to the store. A write failure here is fatal; the
    /// already-written file stays as it was.
    async fn persist(&mut self, batch: Vec<Value>) -> Result<Step> {
        if batch.is_empty() {
            info!("page {}: nothing to persist", self.current_page);
        } else {
            self.store
                .append(&batch)
                .with_context(|| format!("failed to persist page {}", self.current_page))?;
        }
        self.records_captured += batch.len();
        self.pages_processed += 1;
        self.emit(RunEvent::PageCaptured {
            page: self.current_page,
            records: batch.len(),
            total: self.records_captured,
        });
        self.audit("page_captured", Some(self.current_page), None, "ok");
        Ok(Step::Continue(CycleState::Advancing))
    }

    /// Clear the queues, then turn the page unless the ceiling or the
    /// control says otherwise.
    async fn advance(&mut self) -> Result<Step> {
        if let Err(e) = self.channel.clear_all().await {
            warn!("queue clear failed: {e:#}");
        }
        if self.current_page >= self.request.max_pages {
            info!("page ceiling reached ({} pages)", self.request.max_pages);
            return Ok(Step::Finish(EndState::Done));
        }
        if self.advance_control(true).await {
            self.current_page += 1;
            return Ok(Step::Continue(CycleState::AwaitingContent));
        }
        Ok(Step::Finish(EndState::Done))
    }

    /// Inspect and click the next-page control. `false` means no further
    /// pages; lookup failures and disabled controls fold into it rather
    /// than propagating.
    async fn advance_control(&mut self, await_contact_cell: bool) -> bool {
        match self
            .driver
            .element_attribute(NEXT_BUTTON_SELECTOR, "disabled")
            .await
        {
            Ok(Some(_)) => {
                info!("next control disabled, no more pages");
                return false;
            }
            Ok(None) => {}
            Err(e) => {
                info!("next control unavailable: {e:#}");
                return false;
            }
        }
        if let Err(e) = self.driver.click(NEXT_BUTTON_SELECTOR).await {
            warn!("next click failed: {e:#}");
            return false;
        }
        tokio::time::sleep(NEXT_SETTLE_DELAY).await;
        if await_contact_cell {
            if let Err(e) = self
                .driver
                .wait_visible(
                    &self.request.contact_cell_selector,
                    self.request.page_load_timeout,
                )
                .await
            {
                warn!("contact cell missing after page turn: {e:#}");
                return false;
            }
        }
        true
    }

    fn emit(&self, event: RunEvent) {
        if let Some(sender) = &self.events {
            events::emit(sender, event);
        }
    }

    fn audit(&mut self, action: &str, page: Option<u32>, person_id: Option<&str>, status: &str) {
        if let Some(logger) = self.audit.as_mut() {
            if let Err(e) = logger.log_action(action, page, person_id, status) {
                warn!("audit write failed: {e:#}");
            }
        }
    }
}
