//! Persistence.
//!
//! The JSON file is the working store for every run regardless of the
//! configured format: each page's batch is merged into it immediately, so
//! a crash mid-run loses at most the page in flight. CSV output is an
//! end-of-run conversion of that file.

use crate::config::OutputFormat;
use crate::harvest::project::NA;
use anyhow::{Context, Result};
use serde_json::Value;
use std::path::{Path, PathBuf};
use thiserror::Error;
use tracing::{info, warn};

/// Why an existing store file could not be reused.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("store is not valid JSON: {0}")]
    Corrupt(#[from] serde_json::Error),
    #[error("store root is not an array")]
    NotAnArray,
}

/// One run's output files: a JSON store and its CSV twin.
pub struct Store {
    json_path: PathBuf,
    csv_path: PathBuf,
    format: OutputFormat,
}

impl Store {
    /// Root a store at `json_path`; the CSV twin sits alongside with a
    /// `.csv` extension.
    pub fn new(json_path: impl Into<PathBuf>, format: OutputFormat) -> Self {
        let json_path = json_path.into();
        let csv_path = json_path.with_extension("csv");
        Self {
            json_path,
            csv_path,
            format,
        }
    }

    pub fn json_path(&self) -> &Path {
        &self.json_path
    }

    pub fn csv_path(&self) -> &Path {
        &self.csv_path
    }

    /// Remove output files left over from a previous run: the JSON
    /// working store always, the CSV twin only when the selected format
    /// rewrites it.
    pub fn reset(&self) -> Result<()> {
        let mut targets = vec![&self.json_path];
        if self.format != OutputFormat::Json {
            targets.push(&self.csv_path);
        }
        for path in targets {
            if path.exists() {
                std::fs::remove_file(path)
                    .with_context(|| format!("failed to remove {}", path.display()))?;
                info!("removed previous output {}", path.display());
            }
        }
        Ok(())
    }

    /// Append a batch to the JSON store and rewrite it whole.
    ///
    /// Prior contents that are missing, corrupt, or not an array are
    /// treated as empty. Entries are appended as-is, never deduplicated.
    pub fn append(&self, batch: &[Value]) -> Result<usize> {
        let mut all = match self.read_existing() {
            Ok(existing) => existing,
            Err(e) => {
                warn!("existing store unusable ({e}), starting fresh");
                Vec::new()
            }
        };
        all.extend(batch.iter().cloned());
        let rendered = serde_json::to_string_pretty(&all).context("failed to render store")?;
        std::fs::write(&self.json_path, rendered)
            .with_context(|| format!("failed to write {}", self.json_path.display()))?;
        info!(
            "persisted {} records ({} total) to {}",
            batch.len(),
            all.len(),
            self.json_path.display()
        );
        Ok(all.len())
    }

    /// End-of-run conversion for the configured format. In CSV-only mode
    /// the working JSON file is removed after converting.
    pub fn finish(&self) -> Result<()> {
        match self.format {
            OutputFormat::Json => Ok(()),
            OutputFormat::Csv => {
                convert_json_to_csv(&self.json_path, &self.csv_path)?;
                if self.json_path.exists() {
                    std::fs::remove_file(&self.json_path).with_context(|| {
                        format!("failed to remove working store {}", self.json_path.display())
                    })?;
                }
                Ok(())
            }
            OutputFormat::Both => convert_json_to_csv(&self.json_path, &self.csv_path),
        }
    }

    fn read_existing(&self) -> std::result::Result<Vec<Value>, StoreError> {
        let raw = match std::fs::read_to_string(&self.json_path) {
            Ok(raw) => raw,
            Err(_) => return Ok(Vec::new()),
        };
        let value: Value = serde_json::from_str(&raw)?;
        match value {
            Value::Array(entries) => Ok(entries),
            _ => Err(StoreError::NotAnArray),
        }
    }
}

/// Convert a JSON record array into a CSV file. A missing or empty store
/// is a no-op, not an error.
pub fn convert_json_to_csv(json_path: &Path, csv_path: &Path) -> Result<()> {
    if !json_path.exists() {
        warn!("nothing to convert: {} does not exist", json_path.display());
        return Ok(());
    }
    let raw = std::fs::read_to_string(json_path)
        .with_context(|| format!("failed to read {}", json_path.display()))?;
    let records: Vec<Value> =
        serde_json::from_str(&raw).with_context(|| format!("invalid store: {}", json_path.display()))?;
    if records.is_empty() {
        warn!("nothing to convert: {} is empty", json_path.display());
        return Ok(());
    }
    std::fs::write(csv_path, render_csv(&records))
        .with_context(|| format!("failed to write {}", csv_path.display()))?;
    info!(
        "csv written: {} ({} records)",
        csv_path.display(),
        records.len()
    );
    Ok(())
}

/// Render records as CSV text.
///
/// The header is the sorted union of keys across all records; rows missing
/// a key get the NA sentinel, so ragged inputs (raw payloads persisted
/// alongside flat records) still line up.
pub fn render_csv(records: &[Value]) -> String {
    use std::collections::BTreeSet;

    let mut keys = BTreeSet::new();
    for record in records {
        if let Some(map) = record.as_object() {
            for key in map.keys() {
                keys.insert(key.clone());
            }
        }
    }

    let mut out = String::new();
    let header: Vec<String> = keys.iter().map(|key| csv_escape(key)).collect();
    out.push_str(&header.join(","));
    out.push('\n');

    for record in records {
        let map = record.as_object();
        let row: Vec<String> = keys
            .iter()
            .map(|key| {
                let cell = map
                    .and_then(|m| m.get(key))
                    .map(render_cell)
                    .unwrap_or_else(|| NA.to_string());
                csv_escape(&cell)
            })
            .collect();
        out.push_str(&row.join(","));
        out.push('\n');
    }
    out
}

/// Flatten one JSON value to CSV cell text. Arrays join their items with
/// ", "; objects join "key: value" pairs; empty collections and nulls
/// become the NA sentinel.
fn render_cell(value: &Value) -> String {
    match value {
        Value::Null => NA.to_string(),
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        Value::Array(items) => {
            if items.is_empty() {
                return NA.to_string();
            }
            items
                .iter()
                .map(render_item)
                .collect::<Vec<_>>()
                .join(", ")
        }
        Value::Object(map) => {
            if map.is_empty() {
                return NA.to_string();
            }
            map.iter()
                .map(|(key, item)| format!("{key}: {}", render_item(item)))
                .collect::<Vec<_>>()
                .join(", ")
        }
    }
}

fn render_item(value: &Value) -> String {
    match value {
        Value::Null => NA.to_string(),
        Value::String(s) => s.clone(),
        Value::Number(n) => n.to_string(),
        Value::Bool(b) => b.to_string(),
        nested => serde_json::to_string(nested).unwrap_or_default(),
    }
}

/// RFC 4180 quoting: wrap when the cell contains a comma, quote, or line
/// break, doubling embedded quotes.
fn csv_escape(cell: &str) -> String {
    if cell.contains(',') || cell.contains('"') || cell.contains('\n') || cell.contains('\r') {
        format!("\"{}\"", cell.replace('"', "\"\""))
    } else {
        cell.to_string()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use tempfile::tempdir;

    fn store_in(dir: &Path, format: OutputFormat) -> Store {
        Store::new(dir.join("out.json"), format)
    }

    #[test]
    fn test_append_merges_batches() {
        let dir = tempdir().unwrap();
        let store = store_in(dir.path(), OutputFormat::Json);
        assert_eq!(store.append(&[json!({"n": 1})]).unwrap(), 1);
        assert_eq!(store.append(&[json!({"n": 2}), json!({"n": 3})]).unwrap(), 3);

        let raw = std::fs::read_to_string(store.json_path()).unwrap();
        let all: Vec<Value> = serde_json::from_str(&raw).unwrap();
        assert_eq!(all, vec![json!({"n": 1}), json!({"n": 2}), json!({"n": 3})]);
    }

    #[test]
    fn test_append_never_deduplicates() {
        let dir = tempdir().unwrap();
        let store = store_in(dir.path(), OutputFormat::Json);
        let batch = vec![json!({"name": "Ann"})];
        store.append(&batch).unwrap();
        assert_eq!(store.append(&batch).unwrap(), 2);
    }

    #[test]
    fn test_append_survives_corrupt_store() {
        let dir = tempdir().unwrap();
        let store = store_in(dir.path(), OutputFormat::Json);
        std::fs::write(store.json_path(), "{ not json").unwrap();
        assert_eq!(store.append(&[json!({"n": 1})]).unwrap(), 1);
    }

    #[test]
    fn test_append_survives_non_array_store() {
        let dir = tempdir().unwrap();
        let store = store_in(dir.path(), OutputFormat::Json);
        std::fs::write(store.json_path(), "{\"a\": 1}").unwrap();
        assert_eq!(store.append(&[json!({"n": 1})]).unwrap(), 1);
    }

    #[test]
    fn test_reset_removes_previous_outputs() {
        let dir = tempdir().unwrap();
        let store = store_in(dir.path(), OutputFormat::Both);
        std::fs::write(store.json_path(), "[]").unwrap();
        std::fs::write(store.csv_path(), "a,b\n").unwrap();
        store.reset().unwrap();
        assert!(!store.json_path().exists());
        assert!(!store.csv_path().exists());
    }

    #[test]
    fn test_reset_keeps_csv_in_json_mode() {
        let dir = tempdir().unwrap();
        let store = store_in(dir.path(), OutputFormat::Json);
        std::fs::write(store.json_path(), "[]").unwrap();
        std::fs::write(store.csv_path(), "a,b\n").unwrap();
        store.reset().unwrap();
        assert!(!store.json_path().exists());
        // A CSV export from an earlier run is not this run's output.
        assert!(store.csv_path().exists());
    }

    #[test]
    fn test_finish_csv_mode_removes_working_store() {
        let dir = tempdir().unwrap();
        let store = store_in(dir.path(), OutputFormat::Csv);
        store.append(&[json!({"name": "Ann"})]).unwrap();
        store.finish().unwrap();
        assert!(!store.json_path().exists());
        assert!(store.csv_path().exists());
    }

    #[test]
    fn test_finish_both_mode_keeps_both_files() {
        let dir = tempdir().unwrap();
        let store = store_in(dir.path(), OutputFormat::Both);
        store.append(&[json!({"name": "Ann"})]).unwrap();
        store.finish().unwrap();
        assert!(store.json_path().exists());
        assert!(store.csv_path().exists());
    }

    #[test]
    fn test_convert_missing_store_is_a_noop() {
        let dir = tempdir().unwrap();
        let json = dir.path().join("none.json");
        let csv = dir.path().join("none.csv");
        convert_json_to_csv(&json, &csv).unwrap();
        assert!(!csv.exists());
    }

    #[test]
    fn test_csv_header_is_sorted_key_union() {
        let csv = render_csv(&[json!({"b": 1, "a": 2}), json!({"c": 3})]);
        let mut lines = csv.lines();
        assert_eq!(lines.next(), Some("a,b,c"));
        assert_eq!(lines.next(), Some("2,1,NA"));
        assert_eq!(lines.next(), Some("NA,NA,3"));
    }

    #[test]
    fn test_csv_flattens_collections() {
        let csv = render_csv(&[json!({
            "tags": ["x", "y"],
            "org": {"name": "Acme", "size": 5},
            "empty_list": [],
            "gone": null
        })]);
        let row = csv.lines().nth(1).unwrap();
        assert_eq!(row, "NA,NA,\"name: Acme, size: 5\",\"x, y\"");
    }

    #[test]
    fn test_csv_quotes_embedded_commas_and_quotes() {
        let csv = render_csv(&[json!({"job_title": "VP, \"Growth\""})]);
        assert_eq!(csv.lines().nth(1), Some("\"VP, \"\"Growth\"\"\""));
    }
}
