//! Document import command.

use std::path::PathBuf;

use console::style;

use crate::cli::helpers::open_database;
use crate::config::Settings;
use crate::import::import_directory;
use crate::repository::{DieselDocumentStore, ProcessingLog};

/// Insert downloaded XML/PDF pairs from a directory into the database.
pub async fn cmd_import(settings: &Settings, dir: Option<PathBuf>) -> anyhow::Result<()> {
    let dir = dir.unwrap_or_else(|| settings.download_dir.clone());
    if !dir.is_dir() {
        anyhow::bail!("Directory not found: {}", dir.display());
    }

    let pool = open_database(settings).await?;
    let log = ProcessingLog::new(pool.clone());
    let store = DieselDocumentStore::new(pool).with_log(log.clone());

    println!("{} Importing from {}", style("→").cyan(), dir.display());
    let counters = import_directory(&dir, &store, Some(&log)).await?;

    let marker = if counters.errors > 0 {
        style("!").yellow()
    } else {
        style("✓").green()
    };
    println!(
        "{} {} files: {} inserted, {} already in the database, {} errors",
        marker, counters.files, counters.inserted, counters.existing, counters.errors
    );
    println!("  {} documents stored", store.count().await?);

    Ok(())
}
