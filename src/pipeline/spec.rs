//! The ordered agent sequence a run executes.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::PipelineError;
use crate::agent::{Agent, AgentRegistry};

/// Ordered agent ids without duplicates.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PipelineSpec {
    #[serde(default)]
    agent_ids: Vec<Uuid>,
}

impl PipelineSpec {
    pub fn new(ids: impl IntoIterator<Item = Uuid>) -> Self {
        let mut spec = Self::default();
        for id in ids {
            spec.add(id);
        }
        spec
    }

    /// Append `id`. Returns false, leaving the sequence untouched, if it is already present.
    pub fn add(&mut self, id: Uuid) -> bool {
        if self.agent_ids.contains(&id) {
            return false;
        }
        self.agent_ids.push(id);
        true
    }

    pub fn remove(&mut self, id: Uuid) -> bool {
        let before = self.agent_ids.len();
        self.agent_ids.retain(|a| *a != id);
        self.agent_ids.len() != before
    }

    pub fn clear(&mut self) {
        self.agent_ids.clear();
    }

    /// Move the entry at `from` so it ends up at index `to`.
    pub fn reorder(&mut self, from: usize, to: usize) -> Result<(), PipelineError> {
        let len = self.agent_ids.len();
        if from >= len || to >= len {
            return Err(PipelineError::Validation(format!(
                "reorder index out of range: {} -> {} (sequence has {} agents)",
                from, to, len
            )));
        }
        let id = self.agent_ids.remove(from);
        self.agent_ids.insert(to, id);
        Ok(())
    }

    pub fn ids(&self) -> &[Uuid] {
        &self.agent_ids
    }

    pub fn len(&self) -> usize {
        self.agent_ids.len()
    }

    pub fn is_empty(&self) -> bool {
        self.agent_ids.is_empty()
    }

    /// Look up every id in `registry`, keeping sequence order.
    ///
    /// # Errors
    ///
    /// A `Validation` error naming the first id the registry does not know.
    pub async fn resolve(&self, registry: &dyn AgentRegistry) -> Result<Vec<Agent>, PipelineError> {
        let mut agents = Vec::with_capacity(self.agent_ids.len());
        for id in &self.agent_ids {
            let agent = registry
                .get(*id)
                .await
                .ok_or_else(|| PipelineError::Validation(format!("unknown agent id: {}", id)))?;
            agents.push(agent);
        }
        Ok(agents)
    }
}
