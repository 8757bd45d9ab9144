// Fanout CLI
//
// Design Decision: Use clap derive for ergonomic argument parsing.
// Design Decision: Support text/json/yaml output formats for scripting.
// Design Decision: Logs go to stderr; stdout carries only command output.

mod commands;
mod output;
mod telemetry;

use clap::{Parser, Subcommand};

#[derive(Parser)]
#[command(name = "fanout")]
#[command(about = "Fanout CLI - Parallel chat calls with retries, plus mailbox search")]
#[command(version)]
pub struct Cli {
    /// Output format
    #[arg(long, short, global = true, default_value = "text", value_parser = ["text", "json", "yaml"])]
    pub output: String,

    /// Suppress non-essential output
    #[arg(long, short, global = true)]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Issue the same chat call N times across a worker pool
    Chat(commands::chat::ChatArgs),

    /// Search a mailbox by date range and relevance
    Search(commands::search::SearchArgs),

    /// Print the email_search tool definition
    ToolSpec,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();

    let cli = Cli::parse();
    telemetry::init(if cli.quiet { "warn" } else { "info" });
    let output_format = output::OutputFormat::from_str(&cli.output);

    match cli.command {
        Commands::Chat(args) => commands::chat::run(args, output_format, cli.quiet).await,
        Commands::Search(args) => commands::search::run(args, output_format, cli.quiet),
        Commands::ToolSpec => commands::search::run_tool_spec(output_format),
    }
}
