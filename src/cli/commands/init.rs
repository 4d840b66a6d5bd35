//! Initialize command.

use console::style;

use crate::cli::helpers::open_database;
use crate::capabilities::Capabilities;
use crate::config::Settings;
use crate::repository::DieselDocumentStore;

/// Create the data directories and schema, then report what this host can do.
pub async fn cmd_init(settings: &Settings) -> anyhow::Result<()> {
    let pool = open_database(settings).await?;
    let documents = DieselDocumentStore::new(pool).count().await?;

    let capabilities = Capabilities::detect(settings, true);
    let flag = |on: bool| {
        if on {
            style("✓").green()
        } else {
            style("✗").red()
        }
    };

    println!(
        "{} Initialized nfse in {}",
        style("✓").green(),
        settings.data_dir.display()
    );
    println!("  Database:  {} ({} documents)", settings.database_url(), documents);
    println!("  Downloads: {}", settings.download_dir.display());
    println!();
    println!("  {} Browser automation", flag(capabilities.browser));
    println!("  {} UI download fallback", flag(capabilities.ui_download_fallback));
    println!("  {} Document store", flag(capabilities.document_store));
    println!("  {} Certificate store", flag(capabilities.certificate_store));

    if !capabilities.browser {
        println!();
        println!(
            "{} No usable browser: portal harvesting is unavailable",
            style("!").yellow()
        );
        println!("  Install Chrome/Chromium or set CHROME_PATH");
    }

    Ok(())
}
