// Mailbox search
//
// Filters a fixed set of emails by received date (absolute YYYY/MM/DD bounds
// and/or relative durations such as "3d") and ranks the survivors with BM25.
// At most 10 emails are returned.

mod dates;
mod error;
mod mailbox;
mod ranking;
mod tool;
mod types;

pub use dates::{parse_date, parse_relative_time, DATE_FORMAT};
pub use error::{Result, SearchError};
pub use mailbox::{Mailbox, DEFAULT_DATA_PATH, MAX_RESULTS};
pub use ranking::{tokenize, Bm25};
pub use tool::{EmailSearchTool, ToolSpec};
pub use types::{Email, SearchQuery};
