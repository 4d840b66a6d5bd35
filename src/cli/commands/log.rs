//! Processing log command.

use console::style;

use crate::cli::helpers::open_database;
use crate::config::Settings;
use crate::repository::ProcessingLog;

pub async fn cmd_log(settings: &Settings, limit: i64) -> anyhow::Result<()> {
    let pool = open_database(settings).await?;
    let entries = ProcessingLog::new(pool).recent(limit).await?;

    if entries.is_empty() {
        println!("{} Processing log is empty", style("!").yellow());
        return Ok(());
    }

    for entry in entries.iter().rev() {
        let level = match entry.level.as_str() {
            "ERROR" => style(entry.level.as_str()).red(),
            "WARNING" => style(entry.level.as_str()).yellow(),
            _ => style(entry.level.as_str()).dim(),
        };
        println!(
            "{} {:<7} {:<12} {}{}  [{}]",
            entry.created_at,
            level,
            entry.origin,
            entry.message,
            entry
                .document_key
                .as_deref()
                .map(|k| format!(" ({})", k))
                .unwrap_or_default(),
            entry.actor
        );
    }
    Ok(())
}
