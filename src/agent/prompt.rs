//! Turn prompt templates for pipeline agents.

use serde::{Deserialize, Serialize};

use super::registry::Agent;
use crate::tools::INTERNET_SEARCH;

/// A text file supplied as extra context for the first agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ContextFile {
    pub name: String,
    pub content: String,
}

/// Fold several context files into one context text.
pub fn fold_context_files(files: &[ContextFile]) -> Option<String> {
    if files.is_empty() {
        return None;
    }
    Some(
        files
            .iter()
            .map(|f| format!("File: {}\n{}", f.name, f.content.trim_end()))
            .collect::<Vec<_>>()
            .join("\n\n"),
    )
}

/// The first agent's input: the user prompt plus a delimited context block.
pub fn build_initial_input(prompt: &str, context: Option<&str>) -> String {
    let prompt = prompt.trim();
    match context.map(str::trim).filter(|c| !c.is_empty()) {
        Some(context) => format!(
            "{prompt}\n\n--- CONTEXT FROM FILE ---\n{context}\n--- END CONTEXT FROM FILE ---"
        ),
        None => prompt.to_string(),
    }
}

fn search_hint(search_available: bool, purpose: &str) -> String {
    if search_available {
        format!(", optionally using the '{INTERNET_SEARCH}' tool {purpose},")
    } else {
        String::new()
    }
}

/// Prompt for the first agent in a pipeline.
pub fn build_first_turn(agent: &Agent, initial_input: &str, search_available: bool) -> String {
    format!(
        r#"Your role is: {role}

The initial user request (which may include an article or text to analyze) is the following:
"{initial_input}"

Based on this request{hint} carry out your task."#,
        role = agent.instructions(),
        hint = search_hint(search_available, "for additional information or verification"),
    )
}

/// Prompt for every agent after the first.
pub fn build_next_turn(agent: &Agent, previous_output: &str, search_available: bool) -> String {
    format!(
        r#"Your role is: {role}

Your input is the following text produced by the previous agent:
"{previous_output}"

Based specifically on THIS TEXT{hint} carry out your task. If it helps with the overall context, you may refer to the full conversation history provided before this message."#,
        role = agent.instructions(),
        hint = search_hint(search_available, "to enrich it"),
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::format::OutputFormat;

    #[test]
    fn initial_input_wraps_context() {
        assert_eq!(build_initial_input(" hi ", None), "hi");
        assert_eq!(build_initial_input("hi", Some("   ")), "hi");
        assert_eq!(
            build_initial_input("hi", Some("data")),
            "hi\n\n--- CONTEXT FROM FILE ---\ndata\n--- END CONTEXT FROM FILE ---"
        );
        assert!(build_initial_input("", Some("data")).starts_with("\n\n--- CONTEXT"));
    }

    #[test]
    fn folds_files_in_order() {
        assert_eq!(fold_context_files(&[]), None);
        let folded = fold_context_files(&[
            ContextFile { name: "a.txt".into(), content: "alpha\n".into() },
            ContextFile { name: "b.csv".into(), content: "x,y".into() },
        ])
        .unwrap();
        assert_eq!(folded, "File: a.txt\nalpha\n\nFile: b.csv\nx,y");
    }

    #[test]
    fn turn_prompts_frame_input() {
        let agent = Agent::new("A", "role: summarize", OutputFormat::Json);

        let first = build_first_turn(&agent, "Hello world", true);
        assert!(first.starts_with("Your role is: role: summarize\n\nIMPORTANT"));
        assert!(first.contains("initial user request"));
        assert!(first.contains("\"Hello world\""));
        assert!(first.contains(INTERNET_SEARCH));

        let next = build_next_turn(&agent, "Test summary.", false);
        assert!(next.contains("previous agent"));
        assert!(next.contains("\"Test summary.\""));
        assert!(next.contains("conversation history"));
        assert!(!next.contains(INTERNET_SEARCH));
        assert!(next.contains("THIS TEXT carry out"));
    }
}
