//! Store credential commands.

use std::path::Path;

use console::style;

use crate::cli::helpers::{mask, open_database};
use crate::config::Settings;
use crate::import::import_stores;
use crate::repository::processing_log::origin;
use crate::repository::{DieselCredentialRepository, LogLevel, ProcessingLog};

pub async fn cmd_stores_import(settings: &Settings, file: &Path) -> anyhow::Result<()> {
    if !file.is_file() {
        anyhow::bail!("File not found: {}", file.display());
    }

    let pool = open_database(settings).await?;
    let repo = DieselCredentialRepository::new(pool.clone());
    let counters = import_stores(file, &repo).await?;

    ProcessingLog::new(pool)
        .note(
            LogLevel::Info,
            origin::STORES,
            &format!("Stores imported from {}: {}", file.display(), counters),
            None,
        )
        .await;

    println!(
        "{} {} stores inserted, {} updated",
        style("✓").green(),
        counters.inserted,
        counters.updated
    );
    if counters.skipped > 0 {
        println!(
            "  {} {} rows skipped (run with -v for details)",
            style("!").yellow(),
            counters.skipped
        );
    }

    Ok(())
}

pub async fn cmd_stores_list(settings: &Settings) -> anyhow::Result<()> {
    let pool = open_database(settings).await?;
    let records = DieselCredentialRepository::new(pool).get_all().await?;

    if records.is_empty() {
        println!("{} No stores configured", style("!").yellow());
        return Ok(());
    }

    println!(
        "{:>8}  {:<24} {:<10} {:<9} {}",
        "Store", "Login", "Password", "Status", "Updated"
    );
    for record in &records {
        println!(
            "{:>8}  {:<24} {:<10} {:<9} {}",
            record.store_id,
            record.login,
            mask(&record.password),
            record.status,
            record.updated_at
        );
    }
    println!("{} stores", records.len());

    Ok(())
}
