//! Agent definitions and their persisted registry.
//!
//! Definitions live at `{data_dir}/agents.json` together with the saved
//! pipeline sequence. The file is rewritten on every change.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tokio::sync::RwLock;
use uuid::Uuid;

use super::format::OutputFormat;
use crate::pipeline::PipelineSpec;

/// Minimum length of a role description, in characters.
pub const MIN_ROLE_CHARS: usize = 10;

/// A named persona: one step in a pipeline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Agent {
    pub id: Uuid,
    pub name: String,
    /// Free-text role description written by the user
    pub role: String,
    #[serde(default)]
    pub format: OutputFormat,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
}

impl Agent {
    pub fn new(name: impl Into<String>, role: impl Into<String>, format: OutputFormat) -> Self {
        let now = Utc::now();
        Self {
            id: Uuid::new_v4(),
            name: name.into(),
            role: role.into(),
            format,
            created_at: now,
            updated_at: now,
        }
    }

    /// Role description plus the output-format instruction.
    pub fn instructions(&self) -> String {
        format!("{}{}", self.role, self.format.instructions())
    }
}

/// User-supplied fields of an agent, used for create and update.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentDraft {
    pub name: String,
    pub role: String,
    #[serde(default)]
    pub format: OutputFormat,
}

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("agent not found: {0}")]
    NotFound(Uuid),

    #[error("invalid agent: {}", .0.join("; "))]
    Invalid(Vec<String>),

    #[error("failed to persist agents: {0}")]
    Io(#[from] std::io::Error),

    #[error("failed to encode agents: {0}")]
    Serde(#[from] serde_json::Error),
}

/// Read access to agent definitions.
#[async_trait]
pub trait AgentRegistry: Send + Sync {
    async fn list(&self) -> Vec<Agent>;

    async fn get(&self, id: Uuid) -> Option<Agent>;
}

#[async_trait]
impl AgentRegistry for Vec<Agent> {
    async fn list(&self) -> Vec<Agent> {
        self.clone()
    }

    async fn get(&self, id: Uuid) -> Option<Agent> {
        self.iter().find(|a| a.id == id).cloned()
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
struct StoreData {
    #[serde(default)]
    agents: Vec<Agent>,
    #[serde(default)]
    sequence: PipelineSpec,
}

/// File-backed agent registry.
#[derive(Debug)]
pub struct AgentStore {
    data: RwLock<StoreData>,
    storage_path: PathBuf,
}

impl AgentStore {
    /// Open the store at `path`, starting empty when the file is missing or unreadable.
    pub async fn open(path: impl Into<PathBuf>) -> Self {
        let storage_path = path.into();

        let data = if storage_path.exists() {
            match Self::load_from_path(&storage_path) {
                Ok(d) => {
                    tracing::info!(
                        "Loaded {} agents from {}",
                        d.agents.len(),
                        storage_path.display()
                    );
                    d
                }
                Err(e) => {
                    tracing::warn!(
                        "Failed to load agents from {}: {}, starting empty",
                        storage_path.display(),
                        e
                    );
                    StoreData::default()
                }
            }
        } else {
            tracing::info!(
                "No agents file found at {}, starting empty",
                storage_path.display()
            );
            StoreData::default()
        };

        Self {
            data: RwLock::new(data),
            storage_path,
        }
    }

    fn load_from_path(path: &Path) -> Result<StoreData, RegistryError> {
        let contents = std::fs::read_to_string(path)?;
        Ok(serde_json::from_str(&contents)?)
    }

    fn save_to_disk(&self, data: &StoreData) -> Result<(), RegistryError> {
        if let Some(parent) = self.storage_path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let contents = serde_json::to_string_pretty(data)?;
        std::fs::write(&self.storage_path, contents)?;
        tracing::debug!("Saved agents to {}", self.storage_path.display());
        Ok(())
    }

    /// Check a draft, returning every problem found.
    ///
    /// `editing` is the id of the agent being updated, so it does not clash
    /// with its own name.
    pub async fn validate(&self, draft: &AgentDraft, editing: Option<Uuid>) -> Vec<String> {
        let data = self.data.read().await;
        validate_draft(&data.agents, draft, editing)
    }

    pub async fn create(&self, draft: AgentDraft) -> Result<Agent, RegistryError> {
        let mut data = self.data.write().await;
        let errors = validate_draft(&data.agents, &draft, None);
        if !errors.is_empty() {
            return Err(RegistryError::Invalid(errors));
        }

        let agent = Agent::new(draft.name.trim(), draft.role.trim(), draft.format);
        let mut next = data.clone();
        next.agents.push(agent.clone());
        self.save_to_disk(&next)?;
        *data = next;
        tracing::info!(agent = %agent.name, id = %agent.id, "Created agent");
        Ok(agent)
    }

    pub async fn update(&self, id: Uuid, draft: AgentDraft) -> Result<Agent, RegistryError> {
        let mut data = self.data.write().await;
        if !data.agents.iter().any(|a| a.id == id) {
            return Err(RegistryError::NotFound(id));
        }
        let errors = validate_draft(&data.agents, &draft, Some(id));
        if !errors.is_empty() {
            return Err(RegistryError::Invalid(errors));
        }

        let mut next = data.clone();
        let agent = next
            .agents
            .iter_mut()
            .find(|a| a.id == id)
            .ok_or(RegistryError::NotFound(id))?;
        agent.name = draft.name.trim().to_string();
        agent.role = draft.role.trim().to_string();
        agent.format = draft.format;
        agent.updated_at = Utc::now();
        let updated = agent.clone();

        self.save_to_disk(&next)?;
        *data = next;
        tracing::info!(agent = %updated.name, id = %id, "Updated agent");
        Ok(updated)
    }

    /// Remove an agent, dropping it from the saved sequence as well.
    pub async fn delete(&self, id: Uuid) -> Result<Agent, RegistryError> {
        let mut data = self.data.write().await;
        let index = data
            .agents
            .iter()
            .position(|a| a.id == id)
            .ok_or(RegistryError::NotFound(id))?;
        let mut next = data.clone();
        let removed = next.agents.remove(index);
        next.sequence.remove(id);

        self.save_to_disk(&next)?;
        *data = next;
        tracing::info!(agent = %removed.name, id = %id, "Deleted agent");
        Ok(removed)
    }

    /// The saved pipeline sequence.
    pub async fn sequence(&self) -> PipelineSpec {
        self.data.read().await.sequence.clone()
    }

    /// Replace the saved sequence. Ids that do not name a known agent are dropped.
    pub async fn set_sequence(&self, spec: PipelineSpec) -> Result<PipelineSpec, RegistryError> {
        let mut data = self.data.write().await;
        let known: Vec<Uuid> = data.agents.iter().map(|a| a.id).collect();
        let mut filtered = PipelineSpec::default();
        for id in spec.ids().iter().filter(|id| known.contains(id)) {
            filtered.add(*id);
        }
        let next = StoreData {
            agents: data.agents.clone(),
            sequence: filtered.clone(),
        };
        self.save_to_disk(&next)?;
        *data = next;
        Ok(filtered)
    }
}

#[async_trait]
impl AgentRegistry for AgentStore {
    async fn list(&self) -> Vec<Agent> {
        self.data.read().await.agents.clone()
    }

    async fn get(&self, id: Uuid) -> Option<Agent> {
        self.data
            .read()
            .await
            .agents
            .iter()
            .find(|a| a.id == id)
            .cloned()
    }
}

fn validate_draft(existing: &[Agent], draft: &AgentDraft, editing: Option<Uuid>) -> Vec<String> {
    let mut errors = Vec::new();
    let name = draft.name.trim();

    if name.is_empty() {
        errors.push("Agent name is required".to_string());
    }

    if draft.role.trim().chars().count() < MIN_ROLE_CHARS {
        errors.push(format!(
            "Role description must be at least {} characters",
            MIN_ROLE_CHARS
        ));
    }

    if !name.is_empty()
        && existing
            .iter()
            .any(|a| a.name == name && Some(a.id) != editing)
    {
        errors.push("An agent with this name already exists".to_string());
    }

    errors
}

#[cfg(test)]
mod tests {
    use super::*;

    fn draft(name: &str, role: &str) -> AgentDraft {
        AgentDraft {
            name: name.to_string(),
            role: role.to_string(),
            format: OutputFormat::Markdown,
        }
    }

    #[tokio::test]
    async fn create_persists_and_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested/agents.json");

        let store = AgentStore::open(&path).await;
        let agent = store
            .create(draft("Summarizer", "Summarize the input text briefly."))
            .await
            .unwrap();
        let mut spec = store.sequence().await;
        spec.add(agent.id);
        store.set_sequence(spec).await.unwrap();

        let reopened = AgentStore::open(&path).await;
        assert_eq!(reopened.get(agent.id).await, Some(agent.clone()));
        assert_eq!(reopened.sequence().await.ids(), &[agent.id]);
    }

    #[tokio::test]
    async fn validation_collects_every_problem() {
        let dir = tempfile::tempdir().unwrap();
        let store = AgentStore::open(dir.path().join("agents.json")).await;
        store
            .create(draft("Writer", "Write engaging prose."))
            .await
            .unwrap();

        let errors = store.validate(&draft("  ", "short"), None).await;
        assert_eq!(errors.len(), 2);

        let err = store
            .create(draft("Writer", "Another long enough role."))
            .await
            .unwrap_err();
        assert!(err.to_string().contains("already exists"), "{}", err);
    }

    #[tokio::test]
    async fn update_keeps_own_name_and_bumps_timestamp() {
        let dir = tempfile::tempdir().unwrap();
        let store = AgentStore::open(dir.path().join("agents.json")).await;
        let agent = store
            .create(draft("Critic", "Review content objectively."))
            .await
            .unwrap();

        let updated = store
            .update(
                agent.id,
                AgentDraft {
                    format: OutputFormat::Json,
                    ..draft("Critic", "Review content objectively and score it.")
                },
            )
            .await
            .unwrap();
        assert_eq!(updated.format, OutputFormat::Json);
        assert!(updated.updated_at >= agent.updated_at);
        assert!(updated.instructions().ends_with(OutputFormat::Json.instructions()));

        let missing = store.update(Uuid::new_v4(), draft("X", "long enough role")).await;
        assert!(matches!(missing, Err(RegistryError::NotFound(_))));
    }

    #[tokio::test]
    async fn delete_removes_from_sequence() {
        let dir = tempfile::tempdir().unwrap();
        let store = AgentStore::open(dir.path().join("agents.json")).await;
        let a = store.create(draft("A", "First agent role text.")).await.unwrap();
        let b = store.create(draft("B", "Second agent role text.")).await.unwrap();

        let mut spec = PipelineSpec::default();
        spec.add(a.id);
        spec.add(b.id);
        spec.add(Uuid::new_v4());
        let saved = store.set_sequence(spec).await.unwrap();
        assert_eq!(saved.ids(), &[a.id, b.id]);

        store.delete(a.id).await.unwrap();
        assert_eq!(store.sequence().await.ids(), &[b.id]);
        assert_eq!(store.list().await.len(), 1);
    }

    #[tokio::test]
    async fn failed_save_leaves_memory_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let store = AgentStore::open(dir.path().join("agents.json")).await;
        let kept = store.create(draft("Kept", "An agent that stays put.")).await.unwrap();

        // A plain file where the data directory should be makes every save fail.
        let blocker = dir.path().join("blocker");
        std::fs::write(&blocker, "not a directory").unwrap();
        let broken = AgentStore {
            data: RwLock::new(store.data.read().await.clone()),
            storage_path: blocker.join("agents.json"),
        };

        let err = broken.create(draft("Ghost", "Should never be stored.")).await;
        assert!(matches!(err, Err(RegistryError::Io(_))));
        assert_eq!(broken.list().await, vec![kept.clone()]);

        let err = broken.update(kept.id, draft("Renamed", "A different role text.")).await;
        assert!(matches!(err, Err(RegistryError::Io(_))));
        assert_eq!(broken.get(kept.id).await.map(|a| a.name), Some("Kept".to_string()));

        assert!(broken.delete(kept.id).await.is_err());
        assert!(broken.set_sequence(PipelineSpec::new([kept.id])).await.is_err());
        assert_eq!(broken.list().await.len(), 1);
        assert!(broken.sequence().await.is_empty());
    }

    #[tokio::test]
    async fn corrupt_file_starts_empty() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("agents.json");
        std::fs::write(&path, "{ not json").unwrap();

        let store = AgentStore::open(&path).await;
        assert!(store.list().await.is_empty());
    }
}
