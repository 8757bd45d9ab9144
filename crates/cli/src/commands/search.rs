// Search command - date-filtered lexical search over a mailbox file

use anyhow::{Context, Result};
use clap::Args;
use mail_search::{Email, EmailSearchTool, Mailbox, SearchQuery};

use crate::output::{print_field, OutputFormat};

#[derive(Args)]
pub struct SearchArgs {
    /// Query to rank emails with
    #[arg(long, default_value = "")]
    pub query: String,

    /// Only emails received after this date (YYYY/MM/DD)
    #[arg(long)]
    pub after: Option<String>,

    /// Only emails received before this date (YYYY/MM/DD)
    #[arg(long)]
    pub before: Option<String>,

    /// Only emails newer than this duration (e.g. 3d, 2m, 1y)
    #[arg(long)]
    pub newer_than: Option<String>,

    /// Only emails older than this duration (e.g. 3d, 2m, 1y)
    #[arg(long)]
    pub older_than: Option<String>,

    /// Mailbox file, one JSON email per line
    /// [default: $MAIL_SEARCH_DATA, else data/real_word_problem/emails.jsonl]
    #[arg(long)]
    pub data: Option<String>,
}

impl From<SearchArgs> for SearchQuery {
    fn from(args: SearchArgs) -> Self {
        SearchQuery {
            query: args.query,
            after: args.after,
            before: args.before,
            newer_than: args.newer_than,
            older_than: args.older_than,
        }
    }
}

pub fn run(args: SearchArgs, output: OutputFormat, quiet: bool) -> Result<()> {
    let mailbox = match &args.data {
        Some(path) => Mailbox::load(path)
            .with_context(|| format!("Failed to load mailbox from {path}"))?,
        None => Mailbox::from_env().context("Failed to load mailbox")?,
    };
    let tool = EmailSearchTool::new(mailbox);
    tracing::debug!(emails = tool.mailbox().len(), "Mailbox ready");
    let results = tool.search(&args.into());

    if !output.is_text() {
        return output.print_value(&results);
    }

    if results.is_empty() {
        println!("No emails found");
        return Ok(());
    }

    for (rank, email) in results.iter().enumerate() {
        print_email(rank + 1, email, quiet);
    }

    Ok(())
}

/// Print the `email_search` tool definition
pub fn run_tool_spec(output: OutputFormat) -> Result<()> {
    let spec = EmailSearchTool::tool_spec();

    if !output.is_text() {
        return output.print_value(&spec);
    }

    print_field("Name", &spec.name);
    print_field("Description", &spec.description);
    println!("{}", serde_json::to_string_pretty(&spec.parameters)?);
    Ok(())
}

fn print_email(rank: usize, email: &Email, quiet: bool) {
    println!("{}. {}", rank, email.subject);
    if quiet {
        return;
    }
    print_field("  From", &email.sender);
    print_field("  Date", &email.received_date);
    println!("  {}", email.body);
    println!();
}
