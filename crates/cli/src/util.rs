//! Shared formatting helpers for CLI output

use anyhow::{Context, Result};
use settle_core::SettleConfig;
use settle_store::SledStore;
use std::time::Duration;

/// Open the configured sled store for operator commands
///
/// Returns `None` when the store directory does not exist yet.
pub fn open_store(config: &SettleConfig) -> Result<Option<SledStore>> {
    let path = &config.store.path;
    if !path.exists() {
        return Ok(None);
    }
    let store = SledStore::open(path).with_context(|| {
        format!(
            "Failed to open store at {} (sled allows one process at a time; is `settle serve` running?)",
            path.display()
        )
    })?;
    Ok(Some(store))
}

/// Format a duration as a compact age ("42s", "3m", "5h", "2d")
pub fn format_age(age: Duration) -> String {
    let seconds = age.as_secs();

    if seconds < 60 {
        format!("{}s", seconds)
    } else if seconds < 3600 {
        format!("{}m", seconds / 60)
    } else if seconds < 86400 {
        format!("{}h", seconds / 3600)
    } else {
        format!("{}d", seconds / 86400)
    }
}

/// Format byte counts in human-readable form
pub fn format_size(bytes: u64) -> String {
    const KB: u64 = 1024;
    const MB: u64 = KB * 1024;

    if bytes >= MB {
        format!("{:.2} MB", bytes as f64 / MB as f64)
    } else if bytes >= KB {
        format!("{:.2} KB", bytes as f64 / KB as f64)
    } else {
        format!("{} B", bytes)
    }
}

/// First `max_chars` characters of a payload on one line
pub fn preview(text: &str, max_chars: usize) -> String {
    let flat: String = text
        .chars()
        .map(|c| if c.is_control() { ' ' } else { c })
        .collect();
    if flat.chars().count() <= max_chars {
        flat
    } else {
        let cut: String = flat.chars().take(max_chars.saturating_sub(1)).collect();
        format!("{}…", cut)
    }
}
