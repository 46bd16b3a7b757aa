//! Configuration inspection and editing command

use anyhow::{Context, Result};
use owo_colors::OwoColorize;
use settle_core::config::{example_config, DEFAULT_CONFIG_FILE};
use settle_core::SettleConfig;
use std::path::{Path, PathBuf};

/// Every readable key with its current value; secrets are masked
pub fn entries(config: &SettleConfig) -> Vec<(&'static str, String)> {
    vec![
        ("engine.quiet_period_ms", config.engine.quiet_period_ms.to_string()),
        ("engine.wait_for_evaluation", config.engine.wait_for_evaluation.to_string()),
        ("downstream.base_url", optional(config.downstream.base_url.as_deref())),
        ("downstream.path", config.downstream.path.clone()),
        ("downstream.credential", masked(config.downstream.credential().is_ok())),
        ("downstream.timeout_ms", config.downstream.timeout_ms.to_string()),
        ("server.listen", config.server.listen.clone()),
        ("server.credential", masked(config.server.credential().is_some())),
        ("store.path", config.store.path.display().to_string()),
        ("reconcile.enabled", config.reconcile.enabled.to_string()),
        ("reconcile.interval_secs", config.reconcile.interval_secs.to_string()),
        ("reconcile.stale_after_secs", config.reconcile.stale_after_secs.to_string()),
    ]
}

/// List all configuration values
pub fn run_list(config: &SettleConfig, path: &Path) -> Result<()> {
    println!("{}", "Settle Configuration".bold());
    let location = if path.exists() {
        path.display().to_string()
    } else {
        format!("{} (not found, using defaults)", path.display())
    };
    println!("{}: {}\n", "Location".dimmed(), location.dimmed());

    let mut section = "";
    for (key, value) in entries(config) {
        let (head, name) = key.split_once('.').unwrap_or(("", key));
        if head != section {
            if !section.is_empty() {
                println!();
            }
            println!("{}", format!("[{}]", head).yellow());
            section = head;
        }
        println!("  {} = {}", name.cyan(), value);
    }

    println!("\n{}", "Valid Ranges:".bold());
    println!("  engine.quiet_period_ms: 1-3600000");
    println!("  downstream.timeout_ms: 100-300000");
    println!("  reconcile.interval_secs: 1-86400");
    println!("  reconcile.stale_after_secs: 1-604800, above quiet_period + timeout");

    Ok(())
}

/// Print a single configuration value
pub fn run_get(config: &SettleConfig, key: &str) -> Result<()> {
    let value = entries(config)
        .into_iter()
        .find(|(name, _)| *name == key)
        .map(|(_, value)| value);

    match value {
        Some(value) => {
            println!("{}", value);
            Ok(())
        }
        None => anyhow::bail!(
            "Unknown config key: {}. Use 'settle config --list' to see available keys.",
            key
        ),
    }
}

/// Set a configuration value in the config file
///
/// Edits the file only: environment overrides are not written back. The
/// result is validated before it is saved.
pub fn run_set(path: &Path, key: &str, value: &str) -> Result<()> {
    let mut config = if path.exists() {
        SettleConfig::read_file(path)?
    } else {
        SettleConfig::default()
    };

    apply(&mut config, key, value)?;

    config.validate().context("Invalid configuration value")?;
    config
        .save(path)
        .with_context(|| format!("Failed to save {}", path.display()))?;

    let shown = if key.ends_with(".credential") { "<set>" } else { value };
    println!("{} {} = {}", "✓".green(), key.cyan(), shown);
    println!("{}", "Note: restart 'settle serve' for changes to take effect".yellow());

    Ok(())
}

/// Parse `value` into the field named by `key`
pub fn apply(config: &mut SettleConfig, key: &str, value: &str) -> Result<()> {
    match key {
        "engine.quiet_period_ms" => config.engine.quiet_period_ms = number(value)?,
        "engine.wait_for_evaluation" => config.engine.wait_for_evaluation = flag(value)?,
        "downstream.base_url" => config.downstream.base_url = unset_if_empty(value),
        "downstream.path" => config.downstream.path = value.to_string(),
        "downstream.credential" => config.downstream.credential = unset_if_empty(value),
        "downstream.timeout_ms" => config.downstream.timeout_ms = number(value)?,
        "server.listen" => config.server.listen = value.to_string(),
        "server.credential" => config.server.credential = unset_if_empty(value),
        "store.path" => config.store.path = PathBuf::from(value),
        "reconcile.enabled" => config.reconcile.enabled = flag(value)?,
        "reconcile.interval_secs" => config.reconcile.interval_secs = number(value)?,
        "reconcile.stale_after_secs" => config.reconcile.stale_after_secs = number(value)?,
        _ => anyhow::bail!(
            "Unknown config key: {}. Use 'settle config --list' to see available keys.",
            key
        ),
    }
    Ok(())
}

/// Show which config file is in effect
pub fn run_path(explicit: Option<&Path>) -> Result<()> {
    let path = resolve_path(explicit);
    println!("{}", path.display());
    if !path.exists() {
        println!(
            "{}",
            "File does not exist. Use 'settle config --example' for a starting point.".yellow()
        );
    }
    Ok(())
}

/// Show annotated example configuration
pub fn run_example() -> Result<()> {
    print!("{}", example_config());
    Ok(())
}

pub fn resolve_path(explicit: Option<&Path>) -> PathBuf {
    explicit
        .map(Path::to_path_buf)
        .unwrap_or_else(|| PathBuf::from(DEFAULT_CONFIG_FILE))
}

fn number(value: &str) -> Result<u64> {
    value
        .trim()
        .parse()
        .context("Invalid value: must be a non-negative integer")
}

fn flag(value: &str) -> Result<bool> {
    value
        .trim()
        .parse()
        .context("Invalid value: must be 'true' or 'false'")
}

fn unset_if_empty(value: &str) -> Option<String> {
    let value = value.trim();
    (!value.is_empty()).then(|| value.to_string())
}

fn optional(value: Option<&str>) -> String {
    value.unwrap_or("(unset)").to_string()
}

fn masked(set: bool) -> String {
    let shown = if set { "<set>" } else { "(unset)" };
    shown.to_string()
}
