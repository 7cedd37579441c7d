//! Sequential execution of an agent pipeline.

use std::sync::Arc;

use anyhow::Context;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use super::events::{OutputEvent, PipelineObserver, ProgressEvent};
use crate::agent::{
    build_first_turn, build_initial_input, build_next_turn, Agent, ToolResolutionLoop, TurnError,
};
use crate::config::Config;
use crate::llm::{CompletionError, ConversationMessage, GeminiClient, LlmClient};
use crate::tools::{TavilyClient, ToolInfo, ToolRegistry};

const EMPTY_OUTPUT: &str = "No textual output produced by the agent.";

/// One agent step of a run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ExecutionRecord {
    pub agent_id: Uuid,
    pub agent_name: String,
    /// What the agent was given: the initial request, or the previous agent's output
    pub input: String,
    pub output: String,
    pub timestamp: DateTime<Utc>,
    pub completion_calls: usize,
    /// True when `output` is the turn-cap fallback text
    pub fell_back: bool,
}

#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("{0}")]
    Validation(String),

    #[error("agent '{agent}' failed: {source}")]
    AgentFailed {
        agent: String,
        #[source]
        source: CompletionError,
        records: Vec<ExecutionRecord>,
    },

    #[error("run cancelled after {} of {total} agents", .records.len())]
    Cancelled {
        records: Vec<ExecutionRecord>,
        total: usize,
    },
}

impl PipelineError {
    /// Records produced before the run stopped.
    pub fn partial_records(&self) -> &[ExecutionRecord] {
        match self {
            Self::Validation(_) => &[],
            Self::AgentFailed { records, .. } | Self::Cancelled { records, .. } => records,
        }
    }
}

/// Everything a finished run produced.
#[derive(Debug, Clone)]
pub struct RunReport {
    pub records: Vec<ExecutionRecord>,
    /// Shared conversation history: turn prompt and answer for each agent
    pub history: Vec<ConversationMessage>,
}

impl RunReport {
    pub fn final_output(&self) -> Option<&str> {
        self.records.last().map(|r| r.output.as_str())
    }
}

/// Runs agents one after another, feeding each agent's output to the next.
pub struct PipelineExecutor {
    tool_loop: ToolResolutionLoop,
}

impl PipelineExecutor {
    pub fn new(tool_loop: ToolResolutionLoop) -> Self {
        Self { tool_loop }
    }

    /// Gemini completions, plus Tavily search when search is enabled.
    pub fn from_config(config: &Config) -> anyhow::Result<Self> {
        let llm: Arc<dyn LlmClient> =
            Arc::new(GeminiClient::from_config(config).context("Failed to build Gemini client")?);

        let tools = if config.search.enabled {
            let tavily = TavilyClient::from_config(&config.search, config.request_timeout)
                .context("Failed to build Tavily client")?;
            if !config.search.has_credential() {
                tracing::warn!("TAVILY_API_KEY not set, internet_search will report itself unavailable");
            }
            ToolRegistry::with_search(Arc::new(tavily))
        } else {
            ToolRegistry::new()
        };

        Ok(Self::new(ToolResolutionLoop::new(llm, tools, config.max_tool_turns)))
    }

    pub fn search_available(&self) -> bool {
        self.tool_loop.has_tools()
    }

    pub fn list_tools(&self) -> Vec<ToolInfo> {
        self.tool_loop.list_tools()
    }

    /// Caller-side checks `run` performs before any completion call.
    pub fn validate(agents: &[Agent], prompt: &str, context: Option<&str>) -> Result<(), PipelineError> {
        if agents.is_empty() {
            return Err(PipelineError::Validation(
                "the pipeline has no agents".to_string(),
            ));
        }
        if prompt.trim().is_empty() && context.map_or(true, |c| c.trim().is_empty()) {
            return Err(PipelineError::Validation(
                "a prompt or context text is required".to_string(),
            ));
        }
        Ok(())
    }

    /// Execute `agents` in order.
    ///
    /// # Errors
    ///
    /// `Validation` before any completion call when there are no agents or
    /// nothing to work on. `AgentFailed` as soon as a completion call fails
    /// and `Cancelled` when `cancel` fires; both carry the records made so far.
    pub async fn run(
        &self,
        agents: &[Agent],
        prompt: &str,
        context: Option<&str>,
        observer: &dyn PipelineObserver,
        cancel: &CancellationToken,
    ) -> Result<RunReport, PipelineError> {
        Self::validate(agents, prompt, context)?;

        let total = agents.len();
        let search = self.search_available();
        let initial_input = build_initial_input(prompt, context);
        let mut history: Vec<ConversationMessage> = Vec::with_capacity(total * 2);
        let mut records: Vec<ExecutionRecord> = Vec::with_capacity(total);

        tracing::info!(agents = total, search, "Starting pipeline");
        observer.on_output(OutputEvent::system(format!(
            "Starting pipeline with {} agents.",
            total
        )));

        for (index, agent) in agents.iter().enumerate() {
            if cancel.is_cancelled() {
                tracing::info!(completed = records.len(), total, "Pipeline cancelled");
                observer.on_output(OutputEvent::error(None, "Run cancelled."));
                return Err(PipelineError::Cancelled { records, total });
            }

            let current = index + 1;
            observer.on_progress(ProgressEvent::Executing {
                current,
                total,
                agent: agent.name.clone(),
            });
            observer.on_output(OutputEvent::system(format!(
                "Executing agent {} ({}/{})...",
                agent.name, current, total
            )));
            tracing::info!(agent = %agent.name, current, total, "Executing agent");

            let (input, turn_prompt) = match records.last() {
                None => {
                    let prompt = build_first_turn(agent, &initial_input, search);
                    (initial_input.clone(), prompt)
                }
                Some(previous) => {
                    let prompt = build_next_turn(agent, &previous.output, search);
                    (previous.output.clone(), prompt)
                }
            };

            let mut messages = history.clone();
            messages.push(ConversationMessage::user(turn_prompt.clone()));

            let turn = match self.tool_loop.run(&agent.name, messages, observer, cancel).await {
                Ok(turn) => turn,
                Err(TurnError::Cancelled) => {
                    tracing::info!(agent = %agent.name, "Pipeline cancelled mid-turn");
                    observer.on_output(OutputEvent::error(Some(&agent.name), "Run cancelled."));
                    return Err(PipelineError::Cancelled { records, total });
                }
                Err(TurnError::Completion(source)) => {
                    tracing::error!(agent = %agent.name, error = %source, "Agent failed, aborting pipeline");
                    observer.on_output(OutputEvent::error(
                        Some(&agent.name),
                        format!("Error executing agent {}: {}", agent.name, source),
                    ));
                    return Err(PipelineError::AgentFailed {
                        agent: agent.name.clone(),
                        source,
                        records,
                    });
                }
            };

            let fell_back = turn.is_fallback();
            let output = if fell_back {
                turn.output
            } else {
                agent.format.format_response(&turn.output)
            };

            history.push(ConversationMessage::user(turn_prompt));
            history.push(ConversationMessage::model(if output.trim().is_empty() {
                EMPTY_OUTPUT.to_string()
            } else {
                output.clone()
            }));

            observer.on_output(OutputEvent::agent(&agent.name, output.clone()));
            records.push(ExecutionRecord {
                agent_id: agent.id,
                agent_name: agent.name.clone(),
                input,
                output,
                timestamp: Utc::now(),
                completion_calls: turn.completion_calls,
                fell_back,
            });
        }

        observer.on_progress(ProgressEvent::Completed { total });
        observer.on_output(OutputEvent::success(format!(
            "Pipeline completed: {} agents executed.",
            total
        )));
        tracing::info!(agents = total, "Pipeline completed");

        Ok(RunReport { records, history })
    }
}
