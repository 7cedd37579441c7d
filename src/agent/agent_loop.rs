//! Bounded tool-resolution loop for a single agent turn.

use std::sync::Arc;

use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::llm::{
    CompletionError, CompletionResult, ConversationMessage, LlmClient, ToolCallRequest,
    ToolCallResult,
};
use crate::pipeline::{OutputEvent, PipelineObserver};
use crate::tools::{SearchError, ToolError, ToolInfo, ToolRegistry};

/// Where a turn stands.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LoopState {
    /// Waiting on a completion call
    Requesting,
    /// Running requested tools
    ToolPending,
    /// The model produced its answer
    Done,
    /// The turn cap was reached without an answer
    Aborted,
}

/// How a turn ended without a hard failure.
#[derive(Debug, Clone, PartialEq)]
pub struct TurnResult {
    /// The answer, or the deterministic fallback when `state` is `Aborted`
    pub output: String,
    /// Either `Done` or `Aborted`
    pub state: LoopState,
    /// Completion calls made during the turn
    pub completion_calls: usize,
}

impl TurnResult {
    pub fn is_fallback(&self) -> bool {
        self.state == LoopState::Aborted
    }
}

#[derive(Debug, Clone, Error, PartialEq)]
pub enum TurnError {
    #[error(transparent)]
    Completion(#[from] CompletionError),

    #[error("cancelled")]
    Cancelled,
}

/// Text used as an agent's output when it never stops calling tools.
pub fn fallback_text(agent: &str, attempts: usize) -> String {
    format!(
        "Agent {} produced no final textual response after {} tool attempts.",
        agent, attempts
    )
}

/// Drives one agent turn: completion, tool calls, completion, ... until the
/// model answers or `max_turns` completion calls have been spent.
pub struct ToolResolutionLoop {
    llm: Arc<dyn LlmClient>,
    tools: ToolRegistry,
    max_turns: usize,
}

impl ToolResolutionLoop {
    pub fn new(llm: Arc<dyn LlmClient>, tools: ToolRegistry, max_turns: usize) -> Self {
        Self {
            llm,
            tools,
            max_turns: max_turns.max(1),
        }
    }

    /// Whether any tool is advertised to the model.
    pub fn has_tools(&self) -> bool {
        !self.tools.is_empty()
    }

    /// Tools advertised to the model.
    pub fn list_tools(&self) -> Vec<ToolInfo> {
        self.tools.list_tools()
    }

    pub fn max_turns(&self) -> usize {
        self.max_turns
    }

    /// Run a turn starting from `messages`, which must end with the turn's
    /// user prompt. Tool traffic is appended to this local copy only.
    ///
    /// # Errors
    ///
    /// Any completion failure is returned as-is; `Cancelled` when `cancel`
    /// fires before a completion call.
    pub async fn run(
        &self,
        agent: &str,
        mut messages: Vec<ConversationMessage>,
        observer: &dyn PipelineObserver,
        cancel: &CancellationToken,
    ) -> Result<TurnResult, TurnError> {
        let schemas = self.tools.get_tool_schemas();
        let mut state = LoopState::Requesting;

        for attempt in 1..=self.max_turns {
            if cancel.is_cancelled() {
                return Err(TurnError::Cancelled);
            }

            tracing::debug!(agent = %agent, attempt, ?state, "Requesting completion");
            let response = self.llm.complete(&messages, &schemas).await.map_err(|e| {
                tracing::error!(agent = %agent, attempt, error = %e, "Completion failed");
                e
            })?;

            match response {
                CompletionResult::FinalText(text) => {
                    state = LoopState::Done;
                    tracing::debug!(agent = %agent, attempt, ?state, "Agent answered");
                    return Ok(TurnResult {
                        output: text,
                        state,
                        completion_calls: attempt,
                    });
                }
                CompletionResult::ToolCalls(calls) => {
                    state = LoopState::ToolPending;
                    observer.on_output(OutputEvent::tool(
                        agent,
                        format!("Agent {} decided to use a tool.", agent),
                    ));

                    // The last allowed call's tool requests would never be read.
                    if attempt == self.max_turns {
                        break;
                    }

                    let mut results = Vec::with_capacity(calls.len());
                    for call in &calls {
                        results.push(self.resolve(agent, call, observer).await);
                    }
                    messages.push(ConversationMessage::tool_calls(calls));
                    messages.push(ConversationMessage::tool_results(results));
                    state = LoopState::Requesting;
                }
            }
        }

        state = LoopState::Aborted;
        let output = fallback_text(agent, self.max_turns);
        tracing::warn!(agent = %agent, ?state, max_turns = self.max_turns, "Tool turn cap reached");
        observer.on_output(OutputEvent::error(Some(agent), output.clone()));

        Ok(TurnResult {
            output,
            state,
            completion_calls: self.max_turns,
        })
    }

    /// Run one requested tool; failures become an error payload the model can read.
    async fn resolve(
        &self,
        agent: &str,
        call: &ToolCallRequest,
        observer: &dyn PipelineObserver,
    ) -> ToolCallResult {
        let args = serde_json::Value::Object(call.arguments.clone());
        tracing::info!(agent = %agent, tool = %call.name, args = %args, "Calling tool");
        observer.on_output(OutputEvent::tool(
            agent,
            format!("Calling {} with {}", call.name, args),
        ));

        let payload = match self.tools.execute(&call.name, &call.arguments).await {
            Ok(output) => output,
            Err(e) => {
                let payload = failure_payload(&e);
                tracing::warn!(agent = %agent, tool = %call.name, error = %e, "Tool failed");
                observer.on_output(OutputEvent::tool(agent, payload.clone()));
                payload
            }
        };

        ToolCallResult {
            name: call.name.clone(),
            payload,
        }
    }
}

/// Text handed back to the model when a tool call fails.
fn failure_payload(err: &anyhow::Error) -> String {
    if let Some(ToolError::UnknownTool(name)) = err.downcast_ref::<ToolError>() {
        return format!("ERROR: unknown tool '{}'.", name);
    }
    match err.downcast_ref::<SearchError>() {
        Some(SearchError::MissingCredential) => {
            "Search unavailable: no Tavily API key is configured.".to_string()
        }
        Some(search) => format!("Search failed: {}", search),
        None => format!("ERROR: {}", err),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::llm::{MessageContent, Role, ToolSchema};
    use crate::pipeline::{OutputKind, ProgressEvent};
    use crate::tools::{SearchClient, SearchHit, SearchSummary, TavilyClient};
    use async_trait::async_trait;
    use serde_json::{json, Map};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;
    use std::time::Duration;

    /// Replays scripted responses; repeats the last one when the script runs out.
    struct ScriptedLlm {
        script: Vec<Result<CompletionResult, CompletionError>>,
        calls: AtomicUsize,
        seen: Mutex<Vec<Vec<ConversationMessage>>>,
    }

    impl ScriptedLlm {
        fn new(script: Vec<Result<CompletionResult, CompletionError>>) -> Arc<Self> {
            Arc::new(Self {
                script,
                calls: AtomicUsize::new(0),
                seen: Mutex::new(Vec::new()),
            })
        }

        fn calls(&self) -> usize {
            self.calls.load(Ordering::SeqCst)
        }
    }

    #[async_trait]
    impl LlmClient for ScriptedLlm {
        async fn complete(
            &self,
            history: &[ConversationMessage],
            _tools: &[ToolSchema],
        ) -> Result<CompletionResult, CompletionError> {
            let n = self.calls.fetch_add(1, Ordering::SeqCst);
            self.seen.lock().unwrap().push(history.to_vec());
            self.script[n.min(self.script.len() - 1)].clone()
        }
    }

    struct CountingSearch {
        calls: AtomicUsize,
    }

    #[async_trait]
    impl SearchClient for CountingSearch {
        async fn search(&self, query: &str) -> Result<SearchSummary, SearchError> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            Ok(SearchSummary {
                hits: vec![SearchHit {
                    title: format!("About {}", query),
                    url: "https://example.com".to_string(),
                    content: "snippet".to_string(),
                }],
            })
        }
    }

    #[derive(Default)]
    struct Recorder {
        outputs: Mutex<Vec<OutputEvent>>,
    }

    impl PipelineObserver for Recorder {
        fn on_progress(&self, _event: ProgressEvent) {}

        fn on_output(&self, event: OutputEvent) {
            self.outputs.lock().unwrap().push(event);
        }
    }

    fn search_call(query: &str) -> CompletionResult {
        CompletionResult::ToolCalls(vec![ToolCallRequest::new(
            "internet_search",
            json!({ "query": query }).as_object().cloned().unwrap(),
        )])
    }

    fn text(t: &str) -> Result<CompletionResult, CompletionError> {
        Ok(CompletionResult::FinalText(t.to_string()))
    }

    fn search_registry() -> (ToolRegistry, Arc<CountingSearch>) {
        let search = Arc::new(CountingSearch {
            calls: AtomicUsize::new(0),
        });
        (ToolRegistry::with_search(search.clone()), search)
    }

    #[tokio::test]
    async fn final_text_ends_the_turn() {
        let llm = ScriptedLlm::new(vec![text("Test summary.")]);
        let (tools, search) = search_registry();
        let tool_loop = ToolResolutionLoop::new(llm.clone(), tools, 5);

        let result = tool_loop
            .run("A", vec![ConversationMessage::user("go")], &Recorder::default(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(result.output, "Test summary.");
        assert_eq!(result.state, LoopState::Done);
        assert_eq!(result.completion_calls, 1);
        assert_eq!(llm.calls(), 1);
        assert_eq!(search.calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn search_result_is_threaded_into_next_call() {
        let llm = ScriptedLlm::new(vec![Ok(search_call("rust")), text("Answer.")]);
        let (tools, search) = search_registry();
        let tool_loop = ToolResolutionLoop::new(llm.clone(), tools, 5);

        let result = tool_loop
            .run("A", vec![ConversationMessage::user("go")], &Recorder::default(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(result.output, "Answer.");
        assert_eq!(result.completion_calls, 2);
        assert_eq!(search.calls.load(Ordering::SeqCst), 1);

        let seen = llm.seen.lock().unwrap();
        let second = &seen[1];
        assert_eq!(second.len(), 3);
        assert!(matches!(second[1].content, MessageContent::ToolCalls { .. }));
        assert_eq!(second[2].role, Role::Tool);
        match &second[2].content {
            MessageContent::ToolResults { results } => {
                assert_eq!(results[0].name, "internet_search");
                assert!(results[0].payload.contains("About rust"));
            }
            other => panic!("expected tool results, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn endless_tool_calls_stop_at_the_cap() {
        let llm = ScriptedLlm::new(vec![Ok(search_call("x"))]);
        let (tools, search) = search_registry();
        let tool_loop = ToolResolutionLoop::new(llm.clone(), tools, 5);
        let recorder = Recorder::default();

        let result = tool_loop
            .run("Looper", vec![ConversationMessage::user("go")], &recorder, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(llm.calls(), 5);
        assert_eq!(search.calls.load(Ordering::SeqCst), 4);
        assert!(result.is_fallback());
        assert_eq!(result.output, fallback_text("Looper", 5));
        assert_eq!(
            result.output,
            "Agent Looper produced no final textual response after 5 tool attempts."
        );

        let outputs = recorder.outputs.lock().unwrap();
        assert_eq!(outputs.last().map(|e| e.kind), Some(OutputKind::Error));
    }

    #[tokio::test]
    async fn unknown_tool_does_not_abort() {
        let llm = ScriptedLlm::new(vec![
            Ok(CompletionResult::ToolCalls(vec![ToolCallRequest::new(
                "stock_ticker",
                Map::new(),
            )])),
            text("Recovered."),
        ]);
        let (tools, _) = search_registry();
        let tool_loop = ToolResolutionLoop::new(llm.clone(), tools, 5);
        let recorder = Recorder::default();

        let result = tool_loop
            .run("A", vec![ConversationMessage::user("go")], &recorder, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(result.output, "Recovered.");
        assert_eq!(llm.calls(), 2);
        let seen = llm.seen.lock().unwrap();
        match &seen[1][2].content {
            MessageContent::ToolResults { results } => {
                assert_eq!(results[0].payload, "ERROR: unknown tool 'stock_ticker'.");
            }
            other => panic!("expected tool results, got {:?}", other),
        }
        assert!(recorder
            .outputs
            .lock()
            .unwrap()
            .iter()
            .any(|e| e.kind == OutputKind::Tool && e.content.contains("unknown tool")));
    }

    #[tokio::test]
    async fn missing_search_credential_is_visible_to_the_model() {
        let llm = ScriptedLlm::new(vec![Ok(search_call("news")), text("No search, answering anyway.")]);
        let tavily = TavilyClient::new(None, "http://127.0.0.1:1/search".to_string(), Duration::from_secs(1)).unwrap();
        let tool_loop = ToolResolutionLoop::new(llm.clone(), ToolRegistry::with_search(Arc::new(tavily)), 5);

        let result = tool_loop
            .run("A", vec![ConversationMessage::user("go")], &Recorder::default(), &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(result.output, "No search, answering anyway.");
        assert_eq!(llm.calls(), 2);
        let seen = llm.seen.lock().unwrap();
        match &seen[1][2].content {
            MessageContent::ToolResults { results } => {
                assert_eq!(
                    results[0].payload,
                    "Search unavailable: no Tavily API key is configured."
                );
            }
            other => panic!("expected tool results, got {:?}", other),
        }
    }

    #[tokio::test]
    async fn search_timeout_is_visible_to_the_model() {
        use axum::{routing::post, Json, Router};

        let router = Router::new().route(
            "/search",
            post(|| async {
                tokio::time::sleep(Duration::from_secs(3)).await;
                Json(json!({"results": []}))
            }),
        );
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });

        let llm = ScriptedLlm::new(vec![Ok(search_call("news")), text("Answering without results.")]);
        let tavily = TavilyClient::new(
            Some("k".to_string()),
            format!("http://{}/search", addr),
            Duration::from_millis(200),
        )
        .unwrap();
        let tool_loop = ToolResolutionLoop::new(llm.clone(), ToolRegistry::with_search(Arc::new(tavily)), 5);
        let recorder = Recorder::default();

        let result = tool_loop
            .run("A", vec![ConversationMessage::user("go")], &recorder, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(result.output, "Answering without results.");
        let seen = llm.seen.lock().unwrap();
        match &seen[1][2].content {
            MessageContent::ToolResults { results } => {
                assert_eq!(
                    results[0].payload,
                    "Search failed: network error while calling Tavily: request timed out after 200ms"
                );
            }
            other => panic!("expected tool results, got {:?}", other),
        }
        assert!(recorder
            .outputs
            .lock()
            .unwrap()
            .iter()
            .any(|e| e.kind == OutputKind::Tool && e.content.starts_with("Search failed:")));
    }

    #[tokio::test]
    async fn completion_failure_is_hard() {
        let llm = ScriptedLlm::new(vec![
            Ok(search_call("x")),
            Err(CompletionError::Failed("401 unauthorized".to_string())),
        ]);
        let (tools, _) = search_registry();
        let tool_loop = ToolResolutionLoop::new(llm.clone(), tools, 5);

        let err = tool_loop
            .run("A", vec![ConversationMessage::user("go")], &Recorder::default(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(
            err,
            TurnError::Completion(CompletionError::Failed("401 unauthorized".to_string()))
        );
        assert_eq!(llm.calls(), 2);
    }

    #[tokio::test]
    async fn empty_completion_is_hard() {
        let llm = ScriptedLlm::new(vec![Err(CompletionError::EmptyCompletion)]);
        let tool_loop = ToolResolutionLoop::new(llm.clone(), ToolRegistry::new(), 5);

        let err = tool_loop
            .run("A", vec![ConversationMessage::user("go")], &Recorder::default(), &CancellationToken::new())
            .await
            .unwrap_err();
        assert_eq!(err, TurnError::Completion(CompletionError::EmptyCompletion));
    }

    #[tokio::test]
    async fn cancellation_is_checked_before_each_call() {
        let llm = ScriptedLlm::new(vec![text("never")]);
        let tool_loop = ToolResolutionLoop::new(llm.clone(), ToolRegistry::new(), 5);
        let cancel = CancellationToken::new();
        cancel.cancel();

        let err = tool_loop
            .run("A", vec![ConversationMessage::user("go")], &Recorder::default(), &cancel)
            .await
            .unwrap_err();
        assert_eq!(err, TurnError::Cancelled);
        assert_eq!(llm.calls(), 0);
    }

    #[test]
    fn search_failures_become_readable_payloads() {
        let http = anyhow::Error::new(SearchError::Http {
            status: 500,
            message: "boom".to_string(),
        });
        assert_eq!(
            failure_payload(&http),
            "Search failed: Tavily API error (500): boom"
        );
        assert_eq!(
            failure_payload(&anyhow::anyhow!("Missing 'query' argument")),
            "ERROR: Missing 'query' argument"
        );
    }

    #[test]
    fn zero_cap_is_clamped() {
        let llm = ScriptedLlm::new(vec![text("x")]);
        let tool_loop = ToolResolutionLoop::new(llm, ToolRegistry::new(), 0);
        assert_eq!(tool_loop.max_turns(), 1);
        assert!(!tool_loop.has_tools());
    }
}
