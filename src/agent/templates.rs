//! Built-in agent templates.

use serde::Serialize;

use super::format::OutputFormat;
use super::registry::AgentDraft;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct AgentTemplate {
    pub key: &'static str,
    pub name: &'static str,
    pub role: &'static str,
    pub format: OutputFormat,
    pub category: &'static str,
}

impl AgentTemplate {
    pub fn to_draft(&self) -> AgentDraft {
        AgentDraft {
            name: self.name.to_string(),
            role: self.role.to_string(),
            format: self.format,
        }
    }
}

const TEMPLATES: [AgentTemplate; 12] = [
    AgentTemplate {
        key: "analyst",
        name: "Data Analyst",
        role: "You are an expert data analyst. Analyze the provided data thoroughly, identify patterns, trends and insights. Provide clear statistical analysis and actionable recommendations based on the data.",
        format: OutputFormat::Markdown,
        category: "Analysis",
    },
    AgentTemplate {
        key: "writer",
        name: "Content Writer",
        role: "You are a professional content writer. Create engaging, well-structured and informative content. Focus on clarity, flow and audience engagement, using a tone and style appropriate to the context.",
        format: OutputFormat::Markdown,
        category: "Content",
    },
    AgentTemplate {
        key: "researcher",
        name: "Research Assistant",
        role: "You are a meticulous research assistant. Gather comprehensive information on the given topic, verify facts, cite sources when possible and present findings in an organized way. Focus on accuracy and depth.",
        format: OutputFormat::Markdown,
        category: "Research",
    },
    AgentTemplate {
        key: "coder",
        name: "Coding Assistant",
        role: "You are an expert programmer. Write clean, efficient and well-documented code. Follow best practices, include error handling and explain the implementation clearly.",
        format: OutputFormat::Text,
        category: "Development",
    },
    AgentTemplate {
        key: "summarizer",
        name: "Summarizer",
        role: "You are an expert at summarizing. Extract the key points and main ideas from the provided content and write concise, accurate summaries that capture the essence without losing important details.",
        format: OutputFormat::Markdown,
        category: "Content",
    },
    AgentTemplate {
        key: "translator",
        name: "Translator",
        role: "You are a professional translator. Translate the content accurately while preserving meaning, context and cultural nuance. Keep the original tone and style in the target language.",
        format: OutputFormat::Text,
        category: "Content",
    },
    AgentTemplate {
        key: "critic",
        name: "Critical Reviewer",
        role: "You are a critical reviewer. Analyze the provided content objectively, identify strengths and weaknesses, give constructive feedback and suggest improvements. Be thorough but fair.",
        format: OutputFormat::Markdown,
        category: "Analysis",
    },
    AgentTemplate {
        key: "educator",
        name: "Educator",
        role: "You are an expert educator. Explain complex concepts in simple terms, give examples, use analogies where helpful and check for understanding. Adapt the explanation to the audience's level.",
        format: OutputFormat::Markdown,
        category: "Education",
    },
    AgentTemplate {
        key: "strategist",
        name: "Business Strategist",
        role: "You are a business strategist. Analyze business scenarios, identify opportunities and threats, develop strategic recommendations and provide actionable implementation plans.",
        format: OutputFormat::Markdown,
        category: "Business",
    },
    AgentTemplate {
        key: "debugger",
        name: "Code Debugger",
        role: "You are an expert debugger. Analyze code for bugs, performance problems and possible improvements. Explain every problem found in detail and suggest fixes with code examples.",
        format: OutputFormat::Text,
        category: "Development",
    },
    AgentTemplate {
        key: "dataFormatter",
        name: "Data Formatter",
        role: "You are a data formatting specialist. Transform and structure data into the requested format. Preserve data integrity, handle edge cases and produce clean, correctly formatted output.",
        format: OutputFormat::Json,
        category: "Analysis",
    },
    AgentTemplate {
        key: "factChecker",
        name: "Fact Checker",
        role: "You are a fact-checking specialist. Verify claims, statements and information for accuracy. Give evidence-based assessments, cite reliable sources and state your confidence level clearly.",
        format: OutputFormat::Markdown,
        category: "Research",
    },
];

pub fn all() -> &'static [AgentTemplate] {
    &TEMPLATES
}

pub fn get(key: &str) -> Option<&'static AgentTemplate> {
    TEMPLATES.iter().find(|t| t.key == key)
}

/// Template keys grouped by category, in first-seen order.
pub fn categories() -> Vec<(&'static str, Vec<&'static str>)> {
    let mut grouped: Vec<(&'static str, Vec<&'static str>)> = Vec::new();
    for template in &TEMPLATES {
        match grouped.iter_mut().find(|(c, _)| *c == template.category) {
            Some((_, keys)) => keys.push(template.key),
            None => grouped.push((template.category, vec![template.key])),
        }
    }
    grouped
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::agent::registry::MIN_ROLE_CHARS;

    #[test]
    fn keys_are_unique_and_roles_valid() {
        for (i, t) in TEMPLATES.iter().enumerate() {
            assert!(TEMPLATES[i + 1..].iter().all(|o| o.key != t.key), "{}", t.key);
            assert!(t.role.len() >= MIN_ROLE_CHARS);
        }
    }

    #[test]
    fn lookup_and_grouping() {
        assert_eq!(get("dataFormatter").map(|t| t.format), Some(OutputFormat::Json));
        assert!(get("nope").is_none());

        let cats = categories();
        let content = cats.iter().find(|(c, _)| *c == "Content").unwrap();
        assert_eq!(content.1, vec!["writer", "summarizer", "translator"]);
        assert_eq!(cats.iter().map(|(_, k)| k.len()).sum::<usize>(), TEMPLATES.len());
    }
}
