// Email search exposed as a model-callable tool

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use tracing::{error, info};

use crate::error::{Result, SearchError};
use crate::mailbox::Mailbox;
use crate::types::{Email, SearchQuery};

/// Tool definition handed to a model: name, description and JSON-schema parameters
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
pub struct ToolSpec {
    pub name: String,
    pub description: String,
    pub parameters: Value,
}

/// Lexical email search over a shared mailbox
#[derive(Debug, Clone)]
pub struct EmailSearchTool {
    mailbox: Arc<Mailbox>,
}

impl EmailSearchTool {
    pub const NAME: &'static str = "email_search";

    pub fn new(mailbox: impl Into<Arc<Mailbox>>) -> Self {
        Self {
            mailbox: mailbox.into(),
        }
    }

    pub fn mailbox(&self) -> &Mailbox {
        &self.mailbox
    }

    pub fn tool_spec() -> ToolSpec {
        ToolSpec {
            name: Self::NAME.to_string(),
            description: "Performs a lexical search over the user's emails, returning the 10 most relevant email results.".to_string(),
            parameters: json!({
                "type": "object",
                "properties": {
                    "query": {
                        "type": "string",
                        "description": "Query to search the emails with"
                    },
                    "after": {
                        "type": "string",
                        "description": "Only emails received after this date (YYYY/MM/DD)"
                    },
                    "before": {
                        "type": "string",
                        "description": "Only emails received before this date (YYYY/MM/DD)"
                    },
                    "newer_than": {
                        "type": "string",
                        "description": "Only emails newer than this relative duration, e.g. 3d, 2m, 1y"
                    },
                    "older_than": {
                        "type": "string",
                        "description": "Only emails older than this relative duration, e.g. 3d, 2m, 1y"
                    }
                },
                "required": ["query"]
            }),
        }
    }

    pub fn search(&self, query: &SearchQuery) -> Vec<Email> {
        self.mailbox.search(query)
    }

    /// Decode tool-call arguments and run the search
    pub fn try_call(&self, arguments: &Value) -> Result<Vec<Email>> {
        let query: SearchQuery =
            serde_json::from_value(arguments.clone()).map_err(SearchError::Arguments)?;
        let results = self.search(&query);
        info!(query = %query.query, results = results.len(), "Email search completed");
        Ok(results)
    }

    /// Run a tool call, logging failures instead of returning them
    pub fn call_tool(&self, arguments: &Value) -> Option<Vec<Email>> {
        match self.try_call(arguments) {
            Ok(results) => Some(results),
            Err(e) => {
                error!(
                    tool = Self::NAME,
                    error = %error_chain(&e),
                    "Error calling tool"
                );
                None
            }
        }
    }
}

fn error_chain(err: &SearchError) -> String {
    let mut message = err.to_string();
    let mut source = std::error::Error::source(err);
    while let Some(cause) = source {
        message.push_str(": ");
        message.push_str(&cause.to_string());
        source = cause.source();
    }
    message
}
