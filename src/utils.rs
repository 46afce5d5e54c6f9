//! Utility functions for snapshot naming, log formatting, and file system checks.

use std::error::Error;
use std::path::Path;
use tokio::fs;
use tracing::{info, instrument, warn};

/// Derive the snapshot filename for a source.
///
/// Every character outside `[A-Za-z0-9]` is dropped and `.json` appended, so
/// `https://my-site.com/news` becomes `httpsmysitecomnews.json`.
pub fn snapshot_filename(base_url: &str) -> String {
    let mut name: String = base_url
        .chars()
        .filter(|c| c.is_ascii_alphanumeric())
        .collect();
    name.push_str(".json");
    name
}

/// Truncate a string for logging purposes.
///
/// Long strings are cut to at most `max` bytes (on a char boundary) with
/// `"…(+N bytes)"` appended.
///
/// # Examples
///
/// ```ignore
/// assert_eq!(truncate_for_log("short", 100), "short");
/// assert_eq!(truncate_for_log(&"a".repeat(500), 10), "aaaaaaaaaa…(+490 bytes)");
/// ```
pub fn truncate_for_log(s: &str, max: usize) -> String {
    if s.len() <= max {
        return s.to_string();
    }
    let mut cut = max;
    while !s.is_char_boundary(cut) {
        cut -= 1;
    }
    format!("{}…(+{} bytes)", &s[..cut], s.len() - cut)
}

/// Ensure a directory exists and is writable.
///
/// Creates the directory if it doesn't exist, then creates and removes a
/// probe file.
#[instrument(level = "info", skip_all, fields(path = %path.display()))]
pub async fn ensure_writable_dir(path: &Path) -> Result<(), Box<dyn Error>> {
    fs::create_dir_all(path).await?;
    let probe_path = path.join("..__probe_write__");
    fs::write(&probe_path, b"").await?;
    if let Err(e) = fs::remove_file(&probe_path).await {
        warn!(path = %probe_path.display(), error = %e, "Could not remove write probe");
    }
    info!("Snapshot directory is writable");
    Ok(())
}
