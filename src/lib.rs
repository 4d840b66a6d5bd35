//! nfse-harvester - received NFSe acquisition.
//!
//! Downloads service invoices (XML and PDF) from the national NFSe portal for
//! a list of store credentials, collects them through a vendor REST API, and
//! keeps them deduplicated in a local SQLite database.

pub mod api;
pub mod browser;
pub mod capabilities;
pub mod certificates;
pub mod cli;
pub mod config;
pub mod harvest;
pub mod import;
pub mod models;
pub mod portal;
pub mod repository;
pub mod schema;
pub mod storage;
