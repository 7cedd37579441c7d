//! The `internet_search` tool.

use std::sync::Arc;

use async_trait::async_trait;
use serde_json::{json, Map, Value};

use super::{SearchClient, Tool};

pub const INTERNET_SEARCH: &str = "internet_search";

/// Search the web through the configured [`SearchClient`].
pub struct InternetSearch {
    client: Arc<dyn SearchClient>,
}

impl InternetSearch {
    pub fn new(client: Arc<dyn SearchClient>) -> Self {
        Self { client }
    }
}

#[async_trait]
impl Tool for InternetSearch {
    fn name(&self) -> &str {
        INTERNET_SEARCH
    }

    fn description(&self) -> &str {
        "Returns internet search results for a query. Use it to find up-to-date information, news, data, or anything else you do not know."
    }

    fn parameters_schema(&self) -> Value {
        json!({
            "type": "OBJECT",
            "properties": {
                "query": {
                    "type": "STRING",
                    "description": "The text to search the internet for."
                }
            },
            "required": ["query"]
        })
    }

    async fn execute(&self, args: &Map<String, Value>) -> anyhow::Result<String> {
        let query = args
            .get("query")
            .and_then(Value::as_str)
            .map(str::trim)
            .filter(|q| !q.is_empty())
            .ok_or_else(|| anyhow::anyhow!("Missing 'query' argument"))?;

        let summary = self.client.search(query).await?;
        Ok(summary.to_payload())
    }
}
