//! `prospector run`: execute a full harvest.

use crate::audit::logger::AuditLogger;
use crate::auth;
use crate::browser::chromium::{ChromiumDriver, LaunchOptions};
use crate::browser::PageDriver;
use crate::capture::observer;
use crate::cli::output;
use crate::config::{OutputFormat, ScraperConfig};
use crate::events::{self, EventReceiver, RunEvent};
use crate::harvest::controller::{EndState, HarvestController, HarvestRequest};
use crate::store::Store;
use anyhow::{Context, Result};
use std::path::Path;
use std::sync::Arc;
use tracing::{info, warn};

pub async fn run(
    config_path: &str,
    output_path: &str,
    headless: bool,
    max_pages_override: Option<u32>,
) -> Result<()> {
    init_tracing();
    info!("prospector v{}", env!("CARGO_PKG_VERSION"));

    let config = ScraperConfig::load(Path::new(config_path))?;
    config.validate()?;
    let format = config.output_format();
    let max_pages = max_pages_override.unwrap_or(config.scraping.max_pages);

    let run_id = uuid::Uuid::new_v4().to_string();
    info!("starting run {run_id}");

    let (events_tx, events_rx) = events::channel();
    spawn_event_printer(events_rx);
    events::emit(
        &events_tx,
        RunEvent::RunStarted {
            run_id: run_id.clone(),
            list_url: config.urls.saved_link_list.clone(),
            max_pages,
        },
    );

    let store = Store::new(output_path, format);
    store.reset().context("failed to clear previous outputs")?;

    let audit = match AuditLogger::for_run(&run_id) {
        Ok(logger) => Some(logger),
        Err(e) => {
            warn!("audit log unavailable: {e:#}");
            None
        }
    };

    let driver = ChromiumDriver::launch(LaunchOptions {
        headless,
        longest_page_wait: config.page_load_timeout(),
    })
    .await?;
    let driver: Arc<dyn PageDriver> = Arc::new(driver);

    auth::login(driver.as_ref(), &config, Some(&events_tx)).await?;

    driver
        .enable_network_capture()
        .await
        .context("network capture unavailable")?;
    observer::ensure_installed(driver.as_ref()).await?;
    observer::reset_queues(driver.as_ref()).await?;

    let request = HarvestRequest {
        list_url: config.urls.saved_link_list.clone(),
        table_selector: config.selectors.table_xpath.clone(),
        contact_cell_selector: config.selectors.contact_name_cell.value.clone(),
        page_load_timeout: config.page_load_timeout(),
        max_pages,
    };
    let mut controller =
        HarvestController::new(Arc::clone(&driver), store, request).with_events(events_tx.clone());
    if let Some(logger) = audit {
        controller = controller.with_audit(logger);
    }

    let outcome = controller.run().await?;
    let store = controller.into_store();
    store.finish()?;

    let degraded = outcome.end_state == EndState::DoneDegraded;
    events::emit(
        &events_tx,
        RunEvent::RunComplete {
            run_id,
            pages: outcome.pages_processed,
            records: outcome.records_captured,
            degraded,
        },
    );

    if let Err(e) = driver.close().await {
        warn!("browser teardown failed: {e:#}");
    }

    if output::is_json() {
        let mut summary = serde_json::json!({
            "pages": outcome.pages_processed,
            "records": outcome.records_captured,
            "degraded": degraded,
        });
        match format {
            OutputFormat::Json => {
                summary["json"] = store.json_path().display().to_string().into();
            }
            OutputFormat::Csv => {
                summary["csv"] = store.csv_path().display().to_string().into();
            }
            OutputFormat::Both => {
                summary["json"] = store.json_path().display().to_string().into();
                summary["csv"] = store.csv_path().display().to_string().into();
            }
        }
        output::print_json(&summary);
    } else if !output::is_quiet() {
        println!();
        println!(
            "Done: {} contacts across {} pages{}",
            outcome.records_captured,
            outcome.pages_processed,
            if degraded { " (degraded)" } else { "" }
        );
        match format {
            OutputFormat::Json => println!("  JSON: {}", store.json_path().display()),
            OutputFormat::Csv => println!("  CSV:  {}", store.csv_path().display()),
            OutputFormat::Both => {
                println!("  JSON: {}", store.json_path().display());
                println!("  CSV:  {}", store.csv_path().display());
            }
        }
    }
    Ok(())
}

/// Wire the log subscriber for interactive runs. JSON mode keeps stdout
/// clean for the final summary; RUST_LOG still overrides everything.
fn init_tracing() {
    if output::is_json() {
        return;
    }
    let default_directive = if output::is_verbose() {
        "prospector=debug"
    } else if output::is_quiet() {
        "prospector=warn"
    } else {
        "prospector=info"
    };
    tracing_subscriber::fmt()
        .with_ansi(!output::is_no_color())
        .with_env_filter(
            tracing_subscriber::EnvFilter::from_default_env()
                .add_directive(default_directive.parse().unwrap()),
        )
        .init();
}

/// Mirror run events to stdout for interactive runs.
fn spawn_event_printer(mut receiver: EventReceiver) {
    if output::is_quiet() || output::is_json() {
        return;
    }
    tokio::spawn(async move {
        while let Ok(event) = receiver.recv().await {
            match event {
                RunEvent::RunStarted { max_pages, .. } => {
                    println!("Harvesting up to {max_pages} pages");
                }
                RunEvent::ChallengeDetected { .. } => {
                    println!("  challenge detected, solve it in the browser window");
                }
                RunEvent::ChallengeResolved => println!("  challenge cleared"),
                RunEvent::PageCaptured {
                    page,
                    records,
                    total,
                } => println!("  page {page}: {records} contacts ({total} total)"),
                RunEvent::PageDegraded { page, reason } => {
                    println!("  page {page}: skipped ({reason})");
                }
                RunEvent::UnlockSucceeded { person_id, .. } if output::is_verbose() => {
                    println!("    unlocked {person_id}");
                }
                RunEvent::UnlockFailed { person_id } if output::is_verbose() => {
                    println!("    unlock failed for {person_id}");
                }
                _ => {}
            }
        }
    });
}
