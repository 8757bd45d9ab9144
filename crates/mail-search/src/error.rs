// Error types for mailbox loading and tool calls

use thiserror::Error;

/// Result type alias for mailbox operations
pub type Result<T> = std::result::Result<T, SearchError>;

/// Errors that can occur while loading a mailbox or decoding tool arguments
#[derive(Debug, Error)]
pub enum SearchError {
    /// Mailbox file could not be read
    #[error("failed to read mailbox {path}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },

    /// A mailbox line is not a valid email record
    #[error("invalid email record on line {line}")]
    Record {
        line: usize,
        #[source]
        source: serde_json::Error,
    },

    /// Tool arguments do not match the tool's parameters
    #[error("invalid tool arguments")]
    Arguments(#[source] serde_json::Error),
}
