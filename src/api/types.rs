//! API request and response types.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::agent::{AgentTemplate, ContextFile};
use crate::pipeline::{ExecutionRecord, OutputEvent, PipelineEvent, ProgressEvent};
use crate::tools::ToolInfo;

/// Request to start a pipeline run.
#[derive(Debug, Clone, Deserialize)]
pub struct CreateRunRequest {
    /// The user prompt
    #[serde(default)]
    pub prompt: String,

    /// Files whose text is passed to the first agent as context
    #[serde(default)]
    pub context_files: Vec<ContextFile>,

    /// Agents to run, in order (uses the saved pipeline if not specified)
    pub agent_ids: Option<Vec<Uuid>>,
}

/// Response after creating a run.
#[derive(Debug, Clone, Serialize)]
pub struct CreateRunResponse {
    /// Unique run identifier
    pub id: Uuid,

    /// Current run status
    pub status: RunStatus,
}

/// Run status enumeration.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    /// Agents are executing
    Running,
    /// Every agent finished
    Completed,
    /// An agent failed and the run was aborted
    Failed,
    /// The run was cancelled
    Cancelled,
}

impl RunStatus {
    pub fn is_finished(self) -> bool {
        self != Self::Running
    }
}

/// Full run state including results.
#[derive(Debug, Clone, Serialize)]
pub struct RunState {
    pub id: Uuid,

    pub status: RunStatus,

    /// Original prompt
    pub prompt: String,

    /// Names of the agents in execution order
    pub agents: Vec<String>,

    /// Latest progress signal
    pub progress: Option<ProgressEvent>,

    /// One record per finished agent
    pub records: Vec<ExecutionRecord>,

    /// Output stream so far
    pub output: Vec<OutputEvent>,

    /// Error message if the run failed
    pub error: Option<String>,

    pub started_at: DateTime<Utc>,

    pub finished_at: Option<DateTime<Utc>>,
}

impl RunState {
    pub fn new(id: Uuid, prompt: String, agents: Vec<String>) -> Self {
        Self {
            id,
            status: RunStatus::Running,
            prompt,
            agents,
            progress: None,
            records: Vec::new(),
            output: Vec::new(),
            error: None,
            started_at: Utc::now(),
            finished_at: None,
        }
    }

    /// Fold one pipeline event into the snapshot.
    pub fn apply(&mut self, event: &PipelineEvent) {
        match event {
            PipelineEvent::Progress(p) => self.progress = Some(p.clone()),
            PipelineEvent::Output(o) => self.output.push(o.clone()),
        }
    }

    pub fn finish(&mut self, status: RunStatus, records: Vec<ExecutionRecord>, error: Option<String>) {
        self.status = status;
        self.records = records;
        self.error = error;
        self.finished_at = Some(Utc::now());
    }
}

/// Short listing entry for runs.
#[derive(Debug, Clone, Serialize)]
pub struct RunSummary {
    pub id: Uuid,
    pub status: RunStatus,
    pub prompt: String,
    pub started_at: DateTime<Utc>,
}

impl From<&RunState> for RunSummary {
    fn from(state: &RunState) -> Self {
        Self {
            id: state.id,
            status: state.status,
            prompt: state.prompt.clone(),
            started_at: state.started_at,
        }
    }
}

/// Health check response.
#[derive(Debug, Clone, Serialize)]
pub struct HealthResponse {
    pub status: String,

    pub version: String,

    pub model: String,

    /// Whether `internet_search` is advertised to agents
    pub search_enabled: bool,

    /// Whether a search credential is configured
    pub search_configured: bool,

    /// Tools advertised to agents
    pub tools: Vec<ToolInfo>,
}

/// Move one pipeline entry.
#[derive(Debug, Clone, Deserialize)]
pub struct ReorderRequest {
    pub from: usize,
    pub to: usize,
}

/// Replace the saved pipeline.
#[derive(Debug, Clone, Deserialize)]
pub struct SetPipelineRequest {
    pub agent_ids: Vec<Uuid>,
}

/// Templates plus their category grouping.
#[derive(Debug, Clone, Serialize)]
pub struct TemplatesResponse {
    pub templates: Vec<AgentTemplate>,
    pub categories: Vec<TemplateCategory>,
}

#[derive(Debug, Clone, Serialize)]
pub struct TemplateCategory {
    pub name: String,
    pub templates: Vec<String>,
}
