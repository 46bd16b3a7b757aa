//! Delete a record so its key can start a fresh cycle
//!
//! This is the only way a locked record leaves the store after a failed
//! dispatch. Its payload is printed first so it can be replayed by hand.

use crate::util;
use anyhow::{Context, Result};
use owo_colors::OwoColorize;
use settle_core::{CoordinationKey, KeyStateStore, RecordState, SettleConfig};

pub async fn run(config: &SettleConfig, key: &str, force: bool) -> Result<()> {
    let key = CoordinationKey::new(key)?;

    let Some(store) = util::open_store(config)? else {
        anyhow::bail!("No record for key '{}' (store {} does not exist)", key, config.store.path.display());
    };

    let record = store
        .get(&key)
        .await
        .context("Failed to read record")?
        .with_context(|| format!("No record for key '{}'", key))?;

    if record.state() == RecordState::Accumulating && !force {
        anyhow::bail!(
            "Record for '{}' is still accumulating ({} arrivals) and will dispatch on its own. Use --force to drop it anyway.",
            key,
            record.arrivals
        );
    }

    println!("{}", "Released payload:".bold());
    println!("{}", record.combined_payload);
    println!();

    store.delete(&key).await.context("Failed to delete record")?;

    println!(
        "{} Released {} ({} arrivals, was {})",
        "✓".green(),
        key.as_str().cyan(),
        record.arrivals,
        record.state()
    );
    Ok(())
}
