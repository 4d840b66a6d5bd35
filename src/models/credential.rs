//! Portal login credentials, one per store.

use std::fmt;

/// Status value marking a store as eligible for batch runs.
pub const STATUS_ACTIVE: &str = "ACTIVE";

/// Login material for one store. Loaded once per batch, never mutated.
#[derive(Clone, PartialEq, Eq)]
pub struct Credential {
    pub store_id: i64,
    pub login: String,
    pub password: String,
}

impl Credential {
    pub fn new(store_id: i64, login: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            store_id,
            login: login.into(),
            password: password.into(),
        }
    }

    /// Both login and password carry a value.
    pub fn is_complete(&self) -> bool {
        !self.login.trim().is_empty() && !self.password.trim().is_empty()
    }
}

// Keep passwords out of logs.
impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Credential")
            .field("store_id", &self.store_id)
            .field("login", &self.login)
            .field("password", &"***")
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_debug_masks_password() {
        let cred = Credential::new(7, "12345678000199", "segredo");
        let printed = format!("{:?}", cred);
        assert!(printed.contains("12345678000199"));
        assert!(!printed.contains("segredo"));
    }

    #[test]
    fn test_is_complete() {
        assert!(Credential::new(1, "a", "b").is_complete());
        assert!(!Credential::new(1, " ", "b").is_complete());
        assert!(!Credential::new(1, "a", "").is_complete());
    }
}
