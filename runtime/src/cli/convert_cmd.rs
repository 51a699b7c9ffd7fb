//! `prospector convert`: turn a JSON store into CSV after the fact.

use crate::cli::output;
use crate::store;
use anyhow::Result;
use std::path::PathBuf;

pub async fn run(json_path: &str, csv_path: Option<&str>) -> Result<()> {
    let json = PathBuf::from(json_path);
    let csv = csv_path
        .map(PathBuf::from)
        .unwrap_or_else(|| json.with_extension("csv"));
    store::convert_json_to_csv(&json, &csv)?;

    if output::is_json() {
        output::print_json(&serde_json::json!({
            "json": json.display().to_string(),
            "csv": csv.display().to_string(),
            "written": csv.exists(),
        }));
    } else if !output::is_quiet() {
        if csv.exists() {
            println!("CSV written to {}", csv.display());
        } else {
            println!("Nothing to convert at {}", json.display());
        }
    }
    Ok(())
}
