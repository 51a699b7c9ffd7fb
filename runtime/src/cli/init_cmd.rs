//! `prospector init`: write a starter config.

use crate::cli::output;
use crate::config::SAMPLE_CONFIG;
use anyhow::{bail, Context, Result};
use std::path::Path;

pub async fn run(path: &str, force: bool) -> Result<()> {
    let path = Path::new(path);
    if path.exists() && !force {
        bail!(
            "{} already exists (pass --force to overwrite)",
            path.display()
        );
    }
    std::fs::write(path, SAMPLE_CONFIG)
        .with_context(|| format!("failed to write {}", path.display()))?;

    if output::is_json() {
        output::print_json(&serde_json::json!({
            "config": path.display().to_string(),
        }));
    } else if !output::is_quiet() {
        println!("Wrote {}", path.display());
        println!("Fill in credentials, urls, and selectors before running.");
    }
    Ok(())
}
