//! Progress and output events emitted while a pipeline runs.

use chrono::{DateTime, Utc};
use serde::Serialize;
use tokio::sync::{broadcast, mpsc};

/// Where the run is in the agent sequence.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum ProgressEvent {
    /// Agent `current` (1-based) of `total` is about to run.
    Executing {
        current: usize,
        total: usize,
        agent: String,
    },
    /// Every agent has finished.
    Completed { total: usize },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum OutputKind {
    /// Step announcements
    System,
    /// An agent's produced text
    Agent,
    /// Tool usage and degraded tool results
    Tool,
    /// Failures, including soft fallbacks
    Error,
    /// End-of-run marker
    Success,
}

/// One line of user-visible output.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct OutputEvent {
    pub kind: OutputKind,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent: Option<String>,
    pub content: String,
    pub timestamp: DateTime<Utc>,
}

impl OutputEvent {
    fn new(kind: OutputKind, agent: Option<&str>, content: impl Into<String>) -> Self {
        Self {
            kind,
            agent: agent.map(str::to_string),
            content: content.into(),
            timestamp: Utc::now(),
        }
    }

    pub fn system(content: impl Into<String>) -> Self {
        Self::new(OutputKind::System, None, content)
    }

    pub fn agent(agent: &str, content: impl Into<String>) -> Self {
        Self::new(OutputKind::Agent, Some(agent), content)
    }

    pub fn tool(agent: &str, content: impl Into<String>) -> Self {
        Self::new(OutputKind::Tool, Some(agent), content)
    }

    pub fn error(agent: Option<&str>, content: impl Into<String>) -> Self {
        Self::new(OutputKind::Error, agent, content)
    }

    pub fn success(content: impl Into<String>) -> Self {
        Self::new(OutputKind::Success, None, content)
    }
}

/// Either kind of event, for transports that carry both on one channel.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "event", content = "data", rename_all = "snake_case")]
pub enum PipelineEvent {
    Progress(ProgressEvent),
    Output(OutputEvent),
}

impl PipelineEvent {
    pub fn event_name(&self) -> &'static str {
        match self {
            Self::Progress(_) => "progress",
            Self::Output(_) => "output",
        }
    }
}

/// Receives read-only snapshots of a run as it progresses.
pub trait PipelineObserver: Send + Sync {
    fn on_progress(&self, event: ProgressEvent);

    fn on_output(&self, event: OutputEvent);
}

/// Discards every event.
pub struct NoopObserver;

impl PipelineObserver for NoopObserver {
    fn on_progress(&self, _event: ProgressEvent) {}

    fn on_output(&self, _event: OutputEvent) {}
}

impl PipelineObserver for mpsc::UnboundedSender<PipelineEvent> {
    fn on_progress(&self, event: ProgressEvent) {
        let _ = self.send(PipelineEvent::Progress(event));
    }

    fn on_output(&self, event: OutputEvent) {
        let _ = self.send(PipelineEvent::Output(event));
    }
}

impl PipelineObserver for broadcast::Sender<PipelineEvent> {
    fn on_progress(&self, event: ProgressEvent) {
        let _ = self.send(PipelineEvent::Progress(event));
    }

    fn on_output(&self, event: OutputEvent) {
        let _ = self.send(PipelineEvent::Output(event));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn events_serialize_for_the_wire() {
        let progress = PipelineEvent::Progress(ProgressEvent::Executing {
            current: 1,
            total: 2,
            agent: "A".to_string(),
        });
        let value = serde_json::to_value(&progress).unwrap();
        assert_eq!(value["event"], "progress");
        assert_eq!(value["data"]["status"], "executing");
        assert_eq!(value["data"]["agent"], "A");

        let output = serde_json::to_value(OutputEvent::success("done")).unwrap();
        assert_eq!(output["kind"], "success");
        assert!(output.get("agent").is_none());
    }

    #[test]
    fn channel_observer_forwards_events() {
        let (tx, mut rx) = mpsc::unbounded_channel();
        tx.on_progress(ProgressEvent::Completed { total: 3 });
        tx.on_output(OutputEvent::agent("B", "text"));

        assert_eq!(
            rx.try_recv().unwrap(),
            PipelineEvent::Progress(ProgressEvent::Completed { total: 3 })
        );
        match rx.try_recv().unwrap() {
            PipelineEvent::Output(ev) => {
                assert_eq!(ev.kind, OutputKind::Agent);
                assert_eq!(ev.agent.as_deref(), Some("B"));
            }
            other => panic!("unexpected {:?}", other),
        }
    }
}
