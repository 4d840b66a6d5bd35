//! Portal harvest command.

use console::style;
use tracing::info;

use crate::cli::helpers::open_database;
use crate::browser::{BrowserSessionFactory, BrowserSettings};
use crate::capabilities::Capabilities;
use crate::config::Settings;
use crate::harvest::{BatchRunner, CredentialOutcome, HarvestOptions, Harvester};
use crate::portal::HttpTransport;
use crate::repository::processing_log::origin;
use crate::repository::{
    CredentialSource, DieselCredentialRepository, DieselDocumentStore, LogLevel, ProcessingLog,
};
use crate::storage::LocalArchive;

/// Download received documents for every active store (or one).
pub async fn cmd_harvest(
    settings: &Settings,
    store_id: Option<i64>,
    days: Option<u32>,
    limit: Option<usize>,
    headless: bool,
) -> anyhow::Result<()> {
    let pool = open_database(settings).await?;
    let log = ProcessingLog::new(pool.clone());

    let mut credentials = DieselCredentialRepository::new(pool.clone())
        .list_active()
        .await?;
    if let Some(id) = store_id {
        credentials.retain(|c| c.store_id == id);
        if credentials.is_empty() {
            anyhow::bail!("Store {} not found or not active", id);
        }
    }
    if credentials.is_empty() {
        println!(
            "{} No active stores. Import some with: nfse stores import <file.csv>",
            style("!").yellow()
        );
        return Ok(());
    }

    let mut settings = settings.clone();
    if headless {
        settings.headless = true;
    }

    let capabilities = Capabilities::detect(&settings, true);
    if !capabilities.browser {
        println!(
            "{} Browser automation is unavailable; install Chrome or set CHROME_PATH",
            style("✗").red()
        );
        anyhow::bail!("no browser available");
    }

    let archive = LocalArchive::new(settings.download_dir.clone());
    archive.ensure().await?;
    let transport = HttpTransport::new(settings.download_timeout);
    let store = DieselDocumentStore::new(pool).with_log(log.clone());
    let options = HarvestOptions {
        lookback_days: days.unwrap_or(settings.lookback_days),
        date_range: None,
        row_budget: settings.row_budget,
        row_delay: settings.row_delay,
        limit,
    };
    let harvester =
        Harvester::new(&transport, &archive, capabilities, options).with_store(&store);
    let factory = BrowserSessionFactory::new(BrowserSettings::from(&settings));

    println!(
        "{} Harvesting {} store(s), last {} days, into {}",
        style("→").cyan(),
        credentials.len(),
        harvester.options().lookback_days,
        archive.root().display()
    );
    log.note(
        LogLevel::Info,
        origin::PORTAL,
        &format!("Harvest started for {} stores", credentials.len()),
        None,
    )
    .await;

    let report = BatchRunner::new(&factory, &harvester)
        .with_credential_delay(settings.credential_delay)
        .with_log(&log)
        .run(&credentials)
        .await;

    for entry in &report.credentials {
        match &entry.outcome {
            CredentialOutcome::Completed(counters) => println!(
                "  {} Store {}: {}",
                style("✓").green(),
                entry.store_id,
                counters
            ),
            CredentialOutcome::Aborted { counters, reason } => println!(
                "  {} Store {}: {} ({})",
                style("!").yellow(),
                entry.store_id,
                counters,
                reason
            ),
            CredentialOutcome::Failed(reason) => println!(
                "  {} Store {}: {}",
                style("✗").red(),
                entry.store_id,
                reason
            ),
        }
    }

    let totals = report.totals();
    info!("Harvest totals: {}", totals);
    println!("{} Total: {}", style("✓").green(), totals);

    if let Some(reason) = report.halted {
        anyhow::bail!("harvest halted: {}", reason);
    }
    Ok(())
}
