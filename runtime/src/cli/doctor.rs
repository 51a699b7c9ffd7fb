//! Environment readiness check.

use crate::browser::chromium::find_chromium;
use crate::config::ScraperConfig;
use anyhow::Result;
use std::path::Path;
use std::process::Command;

/// Check Chromium availability, config validity, and available memory.
pub async fn run(config_path: &str) -> Result<()> {
    println!("Prospector Doctor");
    println!("=================");
    println!();

    let os = std::env::consts::OS;
    let arch = std::env::consts::ARCH;
    println!("OS:   {os}");
    println!("Arch: {arch}");
    println!();

    let chromium_path = find_chromium();
    match &chromium_path {
        Some(path) => println!("[OK] Chromium found: {}", path.display()),
        None => println!(
            "[!!] Chromium NOT found. Install google-chrome or set PROSPECTOR_CHROMIUM_PATH."
        ),
    }

    let config_ok = match ScraperConfig::load(Path::new(config_path)) {
        Ok(config) => match config.validate() {
            Ok(()) => {
                println!("[OK] Config {config_path} is valid");
                true
            }
            Err(e) => {
                println!("[!!] Config {config_path} failed validation: {e:#}");
                false
            }
        },
        Err(e) => {
            println!("[!!] Config unusable: {e:#}");
            println!("     Run `prospector init` to write a starter config.");
            false
        }
    };

    let output_writable = probe_output_dir();
    if output_writable {
        println!("[OK] Output directory is writable");
    } else {
        println!("[!!] Output directory is NOT writable");
    }

    match get_available_memory_mb() {
        Some(mb) => {
            if mb >= 512 {
                println!("[OK] Available memory: {mb}MB (>= 512MB required)");
            } else {
                println!("[!!] Available memory: {mb}MB (< 512MB, Chromium may struggle)");
            }
        }
        None => println!("[??] Could not determine available memory"),
    }

    println!();
    if chromium_path.is_some() && config_ok && output_writable {
        println!("Status: READY");
    } else {
        println!("Status: NOT READY");
        if chromium_path.is_none() {
            println!("  Install Chromium or set PROSPECTOR_CHROMIUM_PATH.");
        }
        if !config_ok {
            println!("  Fix the config (see `prospector init`).");
        }
        if !output_writable {
            println!("  Run from a directory you can write to, or pass --output.");
        }
    }

    Ok(())
}

/// Check that the working directory accepts the output files a run writes.
fn probe_output_dir() -> bool {
    let probe = Path::new(".prospector-doctor-probe");
    if std::fs::write(probe, b"ok").is_err() {
        return false;
    }
    let _ = std::fs::remove_file(probe);
    true
}

/// Get available memory in MB (platform-specific).
fn get_available_memory_mb() -> Option<u64> {
    #[cfg(target_os = "macos")]
    {
        let output = Command::new("sysctl")
            .args(["-n", "hw.memsize"])
            .output()
            .ok()?;
        let s = String::from_utf8_lossy(&output.stdout);
        let bytes: u64 = s.trim().parse().ok()?;
        Some(bytes / 1_048_576)
    }
    #[cfg(target_os = "linux")]
    {
        let output = Command::new("free").args(["-m"]).output().ok()?;
        let s = String::from_utf8_lossy(&output.stdout);
        for line in s.lines() {
            if line.starts_with("Mem:") {
                let parts: Vec<&str> = line.split_whitespace().collect();
                if parts.len() >= 7 {
                    return parts[6].parse().ok();
                }
            }
        }
        None
    }
    #[cfg(not(any(target_os = "macos", target_os = "linux")))]
    {
        None
    }
}
