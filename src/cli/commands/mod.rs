//! CLI command implementations.

mod api;
mod certs;
mod harvest;
mod import;
mod init;
mod log;
mod stores;

pub use api::{
    cmd_api_certs, cmd_api_cities, cmd_api_collect, cmd_api_query, cmd_api_register_cert,
    cmd_api_status, QueryArgs,
};
pub use certs::{cmd_certs_import, cmd_certs_install, cmd_certs_list, cmd_certs_uninstall};
pub use harvest::cmd_harvest;
pub use import::cmd_import;
pub use init::cmd_init;
pub use log::cmd_log;
pub use stores::{cmd_stores_import, cmd_stores_list};
