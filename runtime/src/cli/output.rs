//! Shared output helpers for the CLI.
//!
//! The global flags are mirrored into `PROSPECTOR_*` env vars by `main`
//! so every subcommand (and the tracing setup) can see them without
//! threading a context struct around.

/// True when `--json` was passed.
pub fn is_json() -> bool {
    std::env::var("PROSPECTOR_JSON").is_ok()
}

/// True when `--quiet` was passed.
pub fn is_quiet() -> bool {
    std::env::var("PROSPECTOR_QUIET").is_ok()
}

/// True when `--verbose` was passed.
pub fn is_verbose() -> bool {
    std::env::var("PROSPECTOR_VERBOSE").is_ok()
}

/// True when `--no-color` was passed or `NO_COLOR` is set.
pub fn is_no_color() -> bool {
    std::env::var("PROSPECTOR_NO_COLOR").is_ok() || std::env::var("NO_COLOR").is_ok()
}

/// Print a machine-readable JSON value to stdout.
pub fn print_json(value: &serde_json::Value) {
    println!(
        "{}",
        serde_json::to_string_pretty(value).unwrap_or_else(|_| "{}".to_string())
    );
}
