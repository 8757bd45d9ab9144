// Mailbox: the fixed email set and the filter-then-rank search over it

use std::io::BufRead;
use std::path::Path;

use chrono::{Local, NaiveDate};
use tracing::{debug, warn};

use crate::dates::{parse_date, parse_relative_time};
use crate::error::{Result, SearchError};
use crate::ranking::Bm25;
use crate::types::{Email, SearchQuery};

/// Maximum number of emails a search returns
pub const MAX_RESULTS: usize = 10;

/// Mailbox file used when `MAIL_SEARCH_DATA` is not set
pub const DEFAULT_DATA_PATH: &str = "data/real_word_problem/emails.jsonl";

/// Resolved exclusive date window
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
struct DateWindow {
    after: Option<NaiveDate>,
    before: Option<NaiveDate>,
}

impl DateWindow {
    /// Combine absolute and relative bounds, keeping the tighter one on each side
    fn resolve(query: &SearchQuery, today: NaiveDate) -> Self {
        let relative = |value: &Option<String>| {
            non_empty(value)
                .and_then(parse_relative_time)
                .and_then(|offset| today.checked_sub_signed(offset))
        };

        let after = [non_empty(&query.after).and_then(parse_date), relative(&query.newer_than)]
            .into_iter()
            .flatten()
            .max();
        let before = [non_empty(&query.before).and_then(parse_date), relative(&query.older_than)]
            .into_iter()
            .flatten()
            .min();

        Self { after, before }
    }

    fn contains(&self, date: NaiveDate) -> bool {
        self.after.map_or(true, |after| date > after)
            && self.before.map_or(true, |before| date < before)
    }
}

fn non_empty(value: &Option<String>) -> Option<&str> {
    value.as_deref().filter(|v| !v.trim().is_empty())
}

/// Fixed set of emails
#[derive(Debug, Clone, Default)]
pub struct Mailbox {
    emails: Vec<Email>,
}

impl Mailbox {
    pub fn from_emails(emails: Vec<Email>) -> Self {
        Self { emails }
    }

    /// Read one JSON email per line; blank lines are skipped
    pub fn from_reader(reader: impl BufRead) -> Result<Self> {
        let mut emails = Vec::new();
        for (number, line) in reader.lines().enumerate() {
            let line = line.map_err(|source| SearchError::Io {
                path: "<reader>".to_string(),
                source,
            })?;
            if line.trim().is_empty() {
                continue;
            }
            let email = serde_json::from_str(&line).map_err(|source| SearchError::Record {
                line: number + 1,
                source,
            })?;
            emails.push(email);
        }
        Ok(Self { emails })
    }

    /// Load a JSONL mailbox file
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let file = std::fs::File::open(path).map_err(|source| SearchError::Io {
            path: path.display().to_string(),
            source,
        })?;
        let mailbox = Self::from_reader(std::io::BufReader::new(file))?;
        debug!(path = %path.display(), emails = mailbox.len(), "Loaded mailbox");
        Ok(mailbox)
    }

    /// Load the mailbox named by `MAIL_SEARCH_DATA` (default: [`DEFAULT_DATA_PATH`])
    pub fn from_env() -> Result<Self> {
        let path =
            std::env::var("MAIL_SEARCH_DATA").unwrap_or_else(|_| DEFAULT_DATA_PATH.to_string());
        Self::load(path)
    }

    pub fn len(&self) -> usize {
        self.emails.len()
    }

    pub fn is_empty(&self) -> bool {
        self.emails.is_empty()
    }

    pub fn emails(&self) -> &[Email] {
        &self.emails
    }

    /// Search with relative bounds counted back from today
    pub fn search(&self, query: &SearchQuery) -> Vec<Email> {
        self.search_at(query, Local::now().date_naive())
    }

    /// Search with relative bounds counted back from `today`
    ///
    /// Emails whose own date does not parse are skipped. Returns at most
    /// [`MAX_RESULTS`] emails, most relevant first.
    pub fn search_at(&self, query: &SearchQuery, today: NaiveDate) -> Vec<Email> {
        let window = DateWindow::resolve(query, today);

        let candidates: Vec<&Email> = self
            .emails
            .iter()
            .filter(|email| match parse_date(&email.received_date) {
                Some(date) => window.contains(date),
                None => {
                    warn!(subject = %email.subject, "Skipping email with invalid date");
                    false
                }
            })
            .collect();

        if candidates.is_empty() {
            return Vec::new();
        }

        let documents: Vec<String> = candidates.iter().map(|email| email.document()).collect();
        let index = Bm25::new(&documents);

        index
            .top_k(&query.query, MAX_RESULTS)
            .into_iter()
            .map(|i| candidates[i].clone())
            .collect()
    }
}
