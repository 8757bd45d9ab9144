// Mailbox types

use serde::{Deserialize, Serialize};

/// One email of the mailbox
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Email {
    pub subject: String,
    pub body: String,
    pub sender: String,
    /// Received date, "YYYY/MM/DD"
    pub received_date: String,
}

impl Email {
    /// Text the ranking runs over
    pub fn document(&self) -> String {
        format!("Subject: {}\nBody: {}", self.subject, self.body)
    }
}

/// Search request
///
/// Absolute bounds use "YYYY/MM/DD"; relative bounds use `<integer><unit>`
/// with unit `d` (days), `m` (30 days) or `y` (365 days), counted back from
/// the reference date. All bounds are exclusive.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SearchQuery {
    /// Query to rank emails with
    #[serde(default)]
    pub query: String,
    /// Only emails received strictly after this date
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub after: Option<String>,
    /// Only emails received strictly before this date
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub before: Option<String>,
    /// Only emails received within this duration of the reference date
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub newer_than: Option<String>,
    /// Only emails received longer than this duration before the reference date
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub older_than: Option<String>,
}

impl SearchQuery {
    pub fn new(query: impl Into<String>) -> Self {
        Self {
            query: query.into(),
            ..Default::default()
        }
    }

    pub fn with_after(mut self, date: impl Into<String>) -> Self {
        self.after = Some(date.into());
        self
    }

    pub fn with_before(mut self, date: impl Into<String>) -> Self {
        self.before = Some(date.into());
        self
    }

    pub fn with_newer_than(mut self, relative: impl Into<String>) -> Self {
        self.newer_than = Some(relative.into());
        self
    }

    pub fn with_older_than(mut self, relative: impl Into<String>) -> Self {
        self.older_than = Some(relative.into());
        self
    }
}
