// Output formatting for CLI

use anyhow::Result;
use serde::Serialize;
use serde_json::Value;

#[derive(Clone, Copy)]
pub enum OutputFormat {
    Text,
    Json,
    Yaml,
}

impl OutputFormat {
    pub fn from_str(s: &str) -> Self {
        match s {
            "json" => OutputFormat::Json,
            "yaml" => OutputFormat::Yaml,
            _ => OutputFormat::Text,
        }
    }

    pub fn print_value<T: Serialize>(&self, value: &T) -> Result<()> {
        match self {
            OutputFormat::Json => {
                println!("{}", serde_json::to_string_pretty(value)?);
            }
            OutputFormat::Yaml => {
                print!("{}", serde_yaml::to_string(value)?);
            }
            OutputFormat::Text => {
                // Text format is handled by each command
            }
        }
        Ok(())
    }

    pub fn is_text(&self) -> bool {
        matches!(self, OutputFormat::Text)
    }
}

/// Print a simple key-value pair for text output
pub fn print_field(label: &str, value: &str) {
    println!("{:<14} {}", format!("{}:", label), value);
}

/// Extract the reply text from a chat response body
///
/// Understands the Cohere v2 shape (`message.content[].text`, last text part
/// wins) and the OpenAI shape (`choices[0].message.content`). Anything else
/// is printed as compact JSON.
pub fn response_text(response: &Value) -> String {
    let cohere = response
        .pointer("/message/content")
        .and_then(Value::as_array)
        .and_then(|parts| {
            parts
                .iter()
                .rev()
                .find_map(|part| part.get("text").and_then(Value::as_str))
        });

    let openai = || {
        response
            .pointer("/choices/0/message/content")
            .and_then(Value::as_str)
    };

    match cohere.or_else(openai) {
        Some(text) => text.to_string(),
        None => response.to_string(),
    }
}
