//! The interactive portal session seam.

use async_trait::async_trait;
use chrono::{Days, NaiveDate};
use serde::{Deserialize, Serialize};

use super::error::SessionError;
use super::listing::NextControl;
use super::login::LoginAssessment;
use crate::models::{Credential, DocumentKey, FileType};

/// Cookie captured from the live browser session.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionCookie {
    pub name: String,
    pub value: String,
    pub domain: String,
    pub path: String,
    pub secure: bool,
    pub http_only: bool,
}

/// Inclusive issue-date range applied to the listing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct DateRange {
    pub start: NaiveDate,
    pub end: NaiveDate,
}

impl DateRange {
    /// The last `days` days through `today`.
    pub fn last_days(days: u32, today: NaiveDate) -> Self {
        let start = today
            .checked_sub_days(Days::new(u64::from(days)))
            .unwrap_or(NaiveDate::MIN);
        Self { start, end: today }
    }

    /// Dates as the portal's filter fields expect them (dd/mm/YYYY).
    pub fn portal_format(&self) -> (String, String) {
        (
            self.start.format("%d/%m/%Y").to_string(),
            self.end.format("%d/%m/%Y").to_string(),
        )
    }
}

/// An authenticated, stateful portal session.
///
/// Implementations own a single browser context. Every method operates on
/// the page the session is currently positioned on.
#[async_trait]
pub trait PortalSession: Send {
    /// Submit credentials and report whether the portal accepted them.
    async fn login(&mut self, credential: &Credential) -> Result<LoginAssessment, SessionError>;

    /// Navigate to the received-documents listing.
    async fn open_listing(&mut self) -> Result<(), SessionError>;

    /// Fill and submit the date filter. Returns `false` when the fields were not found.
    async fn apply_date_filter(&mut self, range: &DateRange) -> Result<bool, SessionError>;

    /// Current page DOM.
    async fn listing_html(&mut self) -> Result<String, SessionError>;

    async fn current_url(&mut self) -> Result<String, SessionError>;

    /// Cookies as they are right now.
    async fn cookies(&mut self) -> Result<Vec<SessionCookie>, SessionError>;

    /// Click a next-page control and wait for the listing to reload.
    ///
    /// Returns `false` if the control is no longer present and visible.
    async fn follow_next(&mut self, control: &NextControl) -> Result<bool, SessionError>;

    /// Trigger the in-page download control and capture the transferred file.
    ///
    /// Returns `None` when no control exists for the key or nothing arrived in time.
    async fn capture_download(
        &mut self,
        key: &DocumentKey,
        file_type: FileType,
    ) -> Result<Option<Vec<u8>>, SessionError>;

    /// Release the browser. Safe to call on any path.
    async fn close(&mut self);
}

/// Opens fresh portal sessions, one per credential.
#[async_trait]
pub trait SessionFactory: Send + Sync {
    async fn open(&self) -> Result<Box<dyn PortalSession>, SessionError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_last_days_range() {
        let today = NaiveDate::from_ymd_opt(2024, 3, 5).unwrap();
        let range = DateRange::last_days(10, today);
        assert_eq!(range.start, NaiveDate::from_ymd_opt(2024, 2, 24).unwrap());
        assert_eq!(range.end, today);
        assert_eq!(
            range.portal_format(),
            ("24/02/2024".to_string(), "05/03/2024".to_string())
        );
    }
}
