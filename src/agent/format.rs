//! Output formats an agent can be asked to produce.

use std::fmt;
use std::str::FromStr;
use std::sync::OnceLock;

use regex::Regex;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputFormat {
    #[default]
    Text,
    Markdown,
    Json,
    Html,
    Csv,
}

impl OutputFormat {
    pub const ALL: [OutputFormat; 5] = [
        OutputFormat::Text,
        OutputFormat::Markdown,
        OutputFormat::Json,
        OutputFormat::Html,
        OutputFormat::Csv,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Text => "text",
            Self::Markdown => "markdown",
            Self::Json => "json",
            Self::Html => "html",
            Self::Csv => "csv",
        }
    }

    /// Instruction appended to an agent's role description.
    pub fn instructions(&self) -> &'static str {
        match self {
            Self::Text => "",
            Self::Markdown => "\n\nIMPORTANT: Format your output as clean, well-structured Markdown. Use headings, lists and emphasis where appropriate.",
            Self::Json => "\n\nIMPORTANT: Your output MUST be valid JSON only. Do not include any text before or after the JSON value. Make sure the syntax is correct.",
            Self::Html => "\n\nIMPORTANT: Format your output as clean, semantic HTML. Use appropriate tags and structure.",
            Self::Csv => "\n\nIMPORTANT: Format your output as CSV data. Use correct delimiters and escape special characters.",
        }
    }

    /// Normalize a model answer for this format.
    ///
    /// Every format trims surrounding whitespace. `Json` additionally pulls
    /// the outermost object or array out of any surrounding prose or code
    /// fences and pretty-prints it; unparseable output is left as trimmed.
    pub fn format_response(&self, response: &str) -> String {
        let trimmed = response.trim();
        match self {
            Self::Json => reformat_json(trimmed).unwrap_or_else(|| trimmed.to_string()),
            Self::Text | Self::Markdown | Self::Html | Self::Csv => trimmed.to_string(),
        }
    }
}

/// Outermost `{...}` or `[...]` span.
fn json_span() -> Option<&'static Regex> {
    static RE: OnceLock<Option<Regex>> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?s)\{.*\}|\[.*\]").ok()).as_ref()
}

fn reformat_json(text: &str) -> Option<String> {
    let span = json_span()?.find(text)?;
    let value: serde_json::Value = serde_json::from_str(span.as_str()).ok()?;
    serde_json::to_string_pretty(&value).ok()
}

impl fmt::Display for OutputFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for OutputFormat {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|f| f.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| format!("unknown output format: {}", s))
    }
}
