//! Command line interface.

mod commands;
mod helpers;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::{load_settings, LoadOptions};

#[derive(Parser)]
#[command(name = "nfse")]
#[command(about = "Received NFSe retrieval from the national portal, the vendor API and local files")]
#[command(version)]
pub struct Cli {
    /// Config file (default: discover nfse.toml/.yaml/.json)
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Data directory
    #[arg(long, global = true)]
    data_dir: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

/// Check if verbose mode is enabled (for early logging setup).
pub fn is_verbose() -> bool {
    std::env::args().any(|arg| arg == "-v" || arg == "--verbose")
}

#[derive(Subcommand)]
enum Commands {
    /// Create the data directories and database schema
    Init,

    /// Download received documents from the portal for every active store
    Harvest {
        /// Only this store
        #[arg(long)]
        store: Option<i64>,
        /// Days back from today to filter on
        #[arg(long)]
        days: Option<u32>,
        /// Stop after this many documents per store
        #[arg(long)]
        limit: Option<usize>,
        /// Run the browser without a window
        #[arg(long)]
        headless: bool,
    },

    /// Import downloaded XML/PDF files into the database
    Import {
        /// Directory to scan (default: the download directory)
        dir: Option<PathBuf>,
    },

    /// Manage store credentials
    Stores {
        #[command(subcommand)]
        command: StoreCommands,
    },

    /// Manage digital certificates
    Certs {
        #[command(subcommand)]
        command: CertCommands,
    },

    /// Vendor API queries
    Api {
        #[command(subcommand)]
        command: ApiCommands,
    },

    /// Show recent processing log entries
    Log {
        #[arg(short, long, default_value = "20")]
        limit: i64,
    },
}

#[derive(Subcommand)]
enum StoreCommands {
    /// Import stores from a CSV file (store_id, login, password)
    Import { file: PathBuf },
    /// List active stores
    List,
}

#[derive(Subcommand)]
enum CertCommands {
    /// Import .pfx/.p12 files into the database
    Import {
        /// Directory to scan (default: certificate_dir)
        dir: Option<PathBuf>,
        /// Certificate password (default: NFSE_CERT_PASSWORD)
        #[arg(long)]
        password: Option<String>,
    },
    /// Install a certificate into the user's personal store
    Install {
        file: PathBuf,
        #[arg(long)]
        password: Option<String>,
    },
    /// Remove a certificate from the user's personal store
    Uninstall { thumbprint: String },
    /// List imported certificates
    List,
}

#[derive(Subcommand)]
enum ApiCommands {
    /// List supported cities
    Cities {
        /// Case-insensitive name filter
        #[arg(long)]
        filter: Option<String>,
    },
    /// List certificates registered with the vendor
    Certs,
    /// Register a certificate with the vendor
    RegisterCert {
        file: PathBuf,
        #[arg(long)]
        password: Option<String>,
    },
    /// Create a received-documents query
    Query {
        /// IBGE city code
        city: String,
        /// Days back from today
        #[arg(long)]
        days: Option<u32>,
        /// Issuer CNPJ (required by some cities)
        #[arg(long)]
        issuer: Option<String>,
        /// Issuer municipal registration
        #[arg(long)]
        issuer_registration: Option<String>,
        /// Recipient municipal registration
        #[arg(long)]
        registration: Option<String>,
        /// City portal login
        #[arg(long)]
        login: Option<String>,
        /// City portal password
        #[arg(long)]
        password: Option<String>,
        /// Wait for completion and download the notes
        #[arg(long)]
        wait: bool,
    },
    /// Show a query's status
    Status { protocol: String },
    /// Download every note of a finished query
    Collect {
        protocol: String,
        /// Wait for completion first
        #[arg(long)]
        wait: bool,
        /// Also insert notes into the database
        #[arg(long)]
        store: bool,
    },
}

pub async fn run() -> anyhow::Result<()> {
    let cli = Cli::parse();

    let (settings, _config) = load_settings(LoadOptions {
        config_path: cli.config,
        data_dir: cli.data_dir,
    })
    .await?;

    match cli.command {
        Commands::Init => commands::cmd_init(&settings).await,
        Commands::Harvest {
            store,
            days,
            limit,
            headless,
        } => commands::cmd_harvest(&settings, store, days, limit, headless).await,
        Commands::Import { dir } => commands::cmd_import(&settings, dir).await,
        Commands::Stores { command } => match command {
            StoreCommands::Import { file } => commands::cmd_stores_import(&settings, &file).await,
            StoreCommands::List => commands::cmd_stores_list(&settings).await,
        },
        Commands::Certs { command } => match command {
            CertCommands::Import { dir, password } => {
                commands::cmd_certs_import(&settings, dir, password).await
            }
            CertCommands::Install { file, password } => {
                commands::cmd_certs_install(&settings, &file, password).await
            }
            CertCommands::Uninstall { thumbprint } => {
                commands::cmd_certs_uninstall(&thumbprint).await
            }
            CertCommands::List => commands::cmd_certs_list(&settings).await,
        },
        Commands::Api { command } => match command {
            ApiCommands::Cities { filter } => {
                commands::cmd_api_cities(&settings, filter.as_deref()).await
            }
            ApiCommands::Certs => commands::cmd_api_certs(&settings).await,
            ApiCommands::RegisterCert { file, password } => {
                commands::cmd_api_register_cert(&settings, &file, password).await
            }
            ApiCommands::Query {
                city,
                days,
                issuer,
                issuer_registration,
                registration,
                login,
                password,
                wait,
            } => {
                let query = commands::QueryArgs {
                    city,
                    days,
                    issuer,
                    issuer_registration,
                    registration,
                    login,
                    password,
                };
                commands::cmd_api_query(&settings, query, wait).await
            }
            ApiCommands::Status { protocol } => commands::cmd_api_status(&settings, &protocol).await,
            ApiCommands::Collect {
                protocol,
                wait,
                store,
            } => commands::cmd_api_collect(&settings, &protocol, wait, store).await,
        },
        Commands::Log { limit } => commands::cmd_log(&settings, limit).await,
    }
}
