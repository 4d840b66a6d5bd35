//! Shared helpers for CLI commands.

use anyhow::Context;

use crate::config::Settings;
use crate::repository::{init_schema, AsyncSqlitePool};

/// Create directories, open the database and make sure the schema exists.
pub async fn open_database(settings: &Settings) -> anyhow::Result<AsyncSqlitePool> {
    settings.ensure_directories()?;
    let pool = AsyncSqlitePool::new(&settings.database_url());
    init_schema(&pool)
        .await
        .with_context(|| format!("Failed to open database {}", settings.database_url()))?;
    Ok(pool)
}

/// `abc***` style masking for listings.
pub fn mask(secret: &str) -> String {
    let visible: String = secret.chars().take(2).collect();
    format!("{}{}", visible, "*".repeat(secret.chars().count().saturating_sub(2).min(6)))
}

/// Password from the flag, else from the settings, else empty.
pub fn certificate_password(settings: &Settings, flag: Option<String>) -> String {
    flag.or_else(|| settings.certificate_password.clone())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mask() {
        assert_eq!(mask("segredo"), "se*****");
        assert_eq!(mask("a"), "a");
        assert_eq!(mask("averyveryverylongpassword"), "av******");
    }
}
