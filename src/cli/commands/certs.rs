//! Certificate commands.

use std::path::{Path, PathBuf};

use console::style;

use crate::cli::helpers::{certificate_password, open_database};
use crate::certificates::{
    native_store_available, CertificateFile, CertificateInspector, CertificateStore,
    NativeCertificates,
};
use crate::config::Settings;
use crate::import::import_certificates;
use crate::repository::{DieselCertificateRepository, ProcessingLog};

pub async fn cmd_certs_import(
    settings: &Settings,
    dir: Option<PathBuf>,
    password: Option<String>,
) -> anyhow::Result<()> {
    let dir = dir.unwrap_or_else(|| settings.certificate_dir.clone());
    if !dir.is_dir() {
        anyhow::bail!("Certificate directory not found: {}", dir.display());
    }
    let password = certificate_password(settings, password);

    let pool = open_database(settings).await?;
    let repo = DieselCertificateRepository::new(pool.clone());
    let log = ProcessingLog::new(pool);

    let native = NativeCertificates;
    let inspector: Option<&dyn CertificateInspector> = if native_store_available() {
        Some(&native)
    } else {
        println!(
            "{} Certificate details unavailable on this platform; storing file names only",
            style("!").yellow()
        );
        None
    };

    let counters = import_certificates(&dir, &password, &repo, inspector, Some(&log)).await?;
    let marker = if counters.errors > 0 {
        style("!").yellow()
    } else {
        style("✓").green()
    };
    println!("{} Certificates: {}", marker, counters);

    Ok(())
}

pub async fn cmd_certs_install(
    settings: &Settings,
    file: &Path,
    password: Option<String>,
) -> anyhow::Result<()> {
    let password = certificate_password(settings, password);
    let file = CertificateFile::read(file, &password).await?;

    let native = NativeCertificates;
    let details = native.inspect(&file)?;
    let thumbprint = native.install(&file)?;

    println!("{} Installed {}", style("✓").green(), file.file_name());
    println!("  {}", details.summary());
    println!("  Thumbprint: {}", thumbprint);

    Ok(())
}

pub async fn cmd_certs_uninstall(thumbprint: &str) -> anyhow::Result<()> {
    if NativeCertificates.uninstall(thumbprint)? {
        println!("{} Removed certificate {}", style("✓").green(), thumbprint);
    } else {
        println!(
            "{} No certificate with thumbprint {}",
            style("!").yellow(),
            thumbprint
        );
    }
    Ok(())
}

pub async fn cmd_certs_list(settings: &Settings) -> anyhow::Result<()> {
    let pool = open_database(settings).await?;
    let records = DieselCertificateRepository::new(pool).get_all().await?;

    if records.is_empty() {
        println!("{} No certificates imported", style("!").yellow());
        return Ok(());
    }

    for record in &records {
        println!(
            "{:>4}  {:<32} {:<8} {}",
            record.id, record.file_name, record.status, record.info
        );
    }
    println!("{} certificates", records.len());

    Ok(())
}
