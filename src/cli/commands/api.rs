//! Vendor API commands.

use std::path::Path;

use chrono::Local;
use console::style;

use crate::cli::helpers::{certificate_password, open_database};
use crate::api::{
    collect, find_city, validate_query, ApiClient, Period, QueryRequest, QueryStatus,
};
use crate::config::Settings;
use crate::repository::processing_log::origin;
use crate::repository::{DieselDocumentStore, DocumentStore, LogLevel, ProcessingLog};

/// Options for `api query`.
pub struct QueryArgs {
    pub city: String,
    pub days: Option<u32>,
    pub issuer: Option<String>,
    pub issuer_registration: Option<String>,
    pub registration: Option<String>,
    pub login: Option<String>,
    pub password: Option<String>,
}

fn client(settings: &Settings) -> anyhow::Result<ApiClient> {
    Ok(ApiClient::from_settings(&settings.api)?)
}

fn print_status(protocol: &str, status: &QueryStatus) {
    let marker = if status.is_completed() {
        style("✓").green()
    } else if status.is_failed() {
        style("✗").red()
    } else {
        style("→").cyan()
    };
    println!(
        "{} Protocol {}: {} ({} notes)",
        marker, protocol, status.situation, status.total
    );
}

pub async fn cmd_api_cities(settings: &Settings, filter: Option<&str>) -> anyhow::Result<()> {
    let cities = client(settings)?.list_cities(filter).await?;
    if cities.is_empty() {
        println!("{} No cities matched", style("!").yellow());
        return Ok(());
    }

    for city in &cities {
        let mut needs = Vec::new();
        if city.requires_certificate {
            needs.push("certificate");
        }
        if city.requires_login || city.requires_password {
            needs.push("login");
        }
        if city.requires_issuer {
            needs.push("issuer");
        }
        println!(
            "{:>8}  {:<32} {:<16} {}",
            city.ibge_code,
            city.name,
            city.standard.as_deref().unwrap_or("-"),
            needs.join(", ")
        );
    }
    println!("{} cities", cities.len());
    Ok(())
}

pub async fn cmd_api_certs(settings: &Settings) -> anyhow::Result<()> {
    let certificates = client(settings)?.list_certificates().await?;
    if certificates.is_empty() {
        println!("{} No certificates registered", style("!").yellow());
        return Ok(());
    }
    for cert in &certificates {
        println!(
            "  {}  {}  expires {}",
            cert.id,
            cert.name.as_deref().unwrap_or("-"),
            cert.expiry.as_deref().unwrap_or("N/A")
        );
    }
    Ok(())
}

pub async fn cmd_api_register_cert(
    settings: &Settings,
    file: &Path,
    password: Option<String>,
) -> anyhow::Result<()> {
    if !file.is_file() {
        anyhow::bail!("File not found: {}", file.display());
    }
    let password = certificate_password(settings, password);
    let id = client(settings)?
        .register_certificate(file, &password)
        .await?;
    println!("{} Certificate registered with id {}", style("✓").green(), id);
    Ok(())
}

pub async fn cmd_api_query(settings: &Settings, args: QueryArgs, wait: bool) -> anyhow::Result<()> {
    let api = client(settings)?;

    let cities = api.list_cities(None).await?;
    let city = find_city(&cities, &args.city)
        .ok_or_else(|| anyhow::anyhow!("City {} is not supported by the API", args.city))?;

    let days = args.days.unwrap_or(settings.api.default_period_days);
    let period = Period::last_days(days, Local::now().date_naive());
    let request = QueryRequest::new(&city.ibge_code, api.recipient_cnpj(), period)
        .with_recipient_registration(args.registration)
        .with_authentication(args.login, args.password)
        .with_issuer(args.issuer, args.issuer_registration);

    let certificates = if city.requires_certificate {
        api.list_certificates().await?
    } else {
        Vec::new()
    };
    validate_query(city, &request, &certificates)?;

    let protocol = api.create_query(&request).await?;
    println!(
        "{} Query created for {} ({} to {}): protocol {}",
        style("✓").green(),
        city.name,
        request.period.start,
        request.period.end,
        protocol
    );

    if wait {
        collect_protocol(settings, &api, &protocol, true, true).await?;
    } else {
        println!("  Check it with: nfse api status {}", protocol);
    }
    Ok(())
}

pub async fn cmd_api_status(settings: &Settings, protocol: &str) -> anyhow::Result<()> {
    let status = client(settings)?.query_status(protocol).await?;
    print_status(protocol, &status);
    Ok(())
}

pub async fn cmd_api_collect(
    settings: &Settings,
    protocol: &str,
    wait: bool,
    store: bool,
) -> anyhow::Result<()> {
    let api = client(settings)?;
    collect_protocol(settings, &api, protocol, wait, store).await
}

async fn collect_protocol(
    settings: &Settings,
    api: &ApiClient,
    protocol: &str,
    wait: bool,
    store: bool,
) -> anyhow::Result<()> {
    let status = if wait {
        println!(
            "{} Waiting for protocol {} (every {:?}, up to {} checks)",
            style("→").cyan(),
            protocol,
            settings.api.poll_interval,
            settings.api.poll_max_attempts
        );
        api.wait_for_completion(
            protocol,
            settings.api.poll_interval,
            settings.api.poll_max_attempts,
        )
        .await?
    } else {
        api.query_status(protocol).await?
    };
    print_status(protocol, &status);
    if !status.is_completed() {
        anyhow::bail!("protocol {} is not finished yet", protocol);
    }

    let dir = settings.download_dir.join("api").join(protocol);
    let (documents, log) = if store {
        let pool = open_database(settings).await?;
        let log = ProcessingLog::new(pool.clone());
        (
            Some(DieselDocumentStore::new(pool).with_log(log.clone())),
            Some(log),
        )
    } else {
        (None, None)
    };

    let counters = collect(
        api,
        protocol,
        &dir,
        documents.as_ref().map(|d| d as &dyn DocumentStore),
    )
    .await?;

    if let Some(log) = &log {
        log.note(
            LogLevel::Info,
            origin::API,
            &format!("Protocol {} collected: {}", protocol, counters),
            None,
        )
        .await;
    }

    let marker = if counters.failed > 0 {
        style("!").yellow()
    } else {
        style("✓").green()
    };
    println!("{} {}", marker, counters);
    println!("  Saved under {}", dir.display());
    Ok(())
}
