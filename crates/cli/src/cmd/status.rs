//! Show accumulation records and their states

use crate::util;
use anyhow::{Context, Result};
use owo_colors::OwoColorize;
use settle_core::{unix_now_ms, KeyStateStore, RecordState, SettleConfig};
use std::time::Duration;

const PREVIEW_CHARS: usize = 40;

pub async fn run(config: &SettleConfig) -> Result<()> {
    let Some(store) = util::open_store(config)? else {
        println!("No store at {}", config.store.path.display().to_string().cyan());
        println!("  {}", "Nothing has been enqueued yet".dimmed());
        return Ok(());
    };

    let records = store.list().await.context("Failed to list records")?;
    let now_ms = unix_now_ms();
    let stale_after = Duration::from_secs(config.reconcile.stale_after_secs);

    println!("{}", "Settle Status".bold());
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("Store:         {}", config.store.path.display().to_string().cyan());
    println!("Quiet period:  {} ms", config.engine.quiet_period_ms);
    println!();

    if records.is_empty() {
        println!("  {}", "No pending batches".dimmed());
        return Ok(());
    }

    let header = format!(
        "{:<24} {:<13} {:>8} {:>6} {:>10}  {}",
        "KEY", "STATE", "ARRIVALS", "IDLE", "SIZE", "PAYLOAD"
    );
    println!("{}", header.bold());

    let mut stuck = 0;
    for record in &records {
        let idle = record.idle_for(now_ms);
        let stuck_lock = record.is_processing && idle >= stale_after;
        if stuck_lock {
            stuck += 1;
        }

        // Pad before colouring so ANSI codes don't break alignment
        let label = if stuck_lock {
            format!("{:<13}", "locked/stuck")
        } else {
            format!("{:<13}", record.state())
        };
        let state = match record.state() {
            _ if stuck_lock => label.red().to_string(),
            RecordState::Locked => label.yellow().to_string(),
            RecordState::Accumulating => label.green().to_string(),
        };

        println!(
            "{:<24} {} {:>8} {:>6} {:>10}  {}",
            record.key.as_str(),
            state,
            record.arrivals,
            util::format_age(idle),
            util::format_size(record.combined_payload.len() as u64),
            util::preview(&record.combined_payload, PREVIEW_CHARS).dimmed()
        );
    }

    println!();
    println!("{} record(s)", records.len());
    if stuck > 0 {
        println!(
            "{}",
            format!(
                "{} batch(es) locked for over {}; dispatch failed. Replay the payload downstream, then `settle release <key>`.",
                stuck,
                util::format_age(stale_after)
            )
            .red()
        );
    }

    Ok(())
}
