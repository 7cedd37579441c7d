//! HTTP routes for agents, templates, the saved pipeline and runs.

use std::collections::HashMap;
use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::sse::{Event, KeepAlive, Sse},
    routing::{get, post},
    Json, Router,
};
use futures::Stream;
use tokio::sync::{broadcast, mpsc, RwLock};
use tokio_util::sync::CancellationToken;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use uuid::Uuid;

use super::types::*;
use crate::agent::{
    fold_context_files, templates, Agent, AgentDraft, AgentRegistry, AgentStore, RegistryError,
};
use crate::config::Config;
use crate::pipeline::{PipelineError, PipelineEvent, PipelineExecutor, PipelineSpec};

/// Capacity of each run's event broadcast channel.
const EVENT_CHANNEL_CAPACITY: usize = 256;

/// A run in flight or finished.
struct RunHandle {
    state: Arc<RwLock<RunState>>,
    events_tx: broadcast::Sender<PipelineEvent>,
    cancel: CancellationToken,
    /// Cancelled once the final state has been written
    finished: CancellationToken,
}

/// Shared application state.
pub struct AppState {
    pub config: Config,
    pub store: Arc<AgentStore>,
    pub executor: Arc<PipelineExecutor>,
    runs: RwLock<HashMap<Uuid, RunHandle>>,
}

impl AppState {
    pub fn new(config: Config, store: Arc<AgentStore>, executor: Arc<PipelineExecutor>) -> Self {
        Self {
            config,
            store,
            executor,
            runs: RwLock::new(HashMap::new()),
        }
    }

    /// Drop the oldest finished runs beyond `config.max_finished_runs`.
    async fn evict_finished_runs(&self) {
        let keep = self.config.max_finished_runs;
        let mut runs = self.runs.write().await;

        let mut finished = Vec::new();
        for (id, handle) in runs.iter() {
            if let Some(at) = handle.state.read().await.finished_at {
                finished.push((at, *id));
            }
        }
        if finished.len() <= keep {
            return;
        }

        finished.sort_by(|a, b| b.0.cmp(&a.0));
        for (_, id) in finished.into_iter().skip(keep) {
            runs.remove(&id);
            tracing::debug!(run_id = %id, "Evicted finished run");
        }
    }
}

/// Start the HTTP server.
pub async fn serve(config: Config) -> anyhow::Result<()> {
    let store = Arc::new(AgentStore::open(config.agents_file()).await);
    let executor = Arc::new(PipelineExecutor::from_config(&config)?);
    let addr = format!("{}:{}", config.host, config.port);

    let state = Arc::new(AppState::new(config, store, executor));
    let app = router(state);

    let listener = tokio::net::TcpListener::bind(&addr).await?;
    tracing::info!("Server listening on {}", addr);
    axum::serve(listener, app).await?;

    Ok(())
}

/// All routes, with tracing and CORS layers.
pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/health", get(health))
        .route("/api/agents", get(list_agents).post(create_agent))
        .route(
            "/api/agents/:id",
            get(get_agent).put(update_agent).delete(delete_agent),
        )
        .route("/api/templates", get(list_templates))
        .route("/api/templates/:key/agent", post(create_from_template))
        .route("/api/pipeline", get(get_pipeline).put(set_pipeline))
        .route(
            "/api/pipeline/agents/:id",
            post(add_to_pipeline).delete(remove_from_pipeline),
        )
        .route("/api/pipeline/reorder", post(reorder_pipeline))
        .route("/api/runs", get(list_runs).post(create_run))
        .route("/api/runs/:id", get(get_run))
        .route("/api/runs/:id/stream", get(stream_run))
        .route("/api/runs/:id/cancel", post(cancel_run))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}

type ApiError = (StatusCode, String);

fn registry_error(err: RegistryError) -> ApiError {
    match err {
        RegistryError::NotFound(_) => (StatusCode::NOT_FOUND, err.to_string()),
        RegistryError::Invalid(_) => (StatusCode::BAD_REQUEST, err.to_string()),
        RegistryError::Io(_) | RegistryError::Serde(_) => {
            tracing::error!("Agent store failure: {}", err);
            (StatusCode::INTERNAL_SERVER_ERROR, err.to_string())
        }
    }
}

fn validation_error(err: PipelineError) -> ApiError {
    (StatusCode::BAD_REQUEST, err.to_string())
}

fn run_not_found(id: Uuid) -> ApiError {
    (StatusCode::NOT_FOUND, format!("Run {} not found", id))
}

async fn health(State(state): State<Arc<AppState>>) -> Json<HealthResponse> {
    Json(HealthResponse {
        status: "ok".to_string(),
        version: env!("CARGO_PKG_VERSION").to_string(),
        model: state.config.model.clone(),
        search_enabled: state.executor.search_available(),
        search_configured: state.config.search.has_credential(),
        tools: state.executor.list_tools(),
    })
}

// ─────────────────────────────────────────────────────────────────────────────
// Agents and templates
// ─────────────────────────────────────────────────────────────────────────────

async fn list_agents(State(state): State<Arc<AppState>>) -> Json<Vec<Agent>> {
    Json(state.store.list().await)
}

async fn create_agent(
    State(state): State<Arc<AppState>>,
    Json(draft): Json<AgentDraft>,
) -> Result<(StatusCode, Json<Agent>), ApiError> {
    let agent = state.store.create(draft).await.map_err(registry_error)?;
    Ok((StatusCode::CREATED, Json(agent)))
}

async fn get_agent(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<Agent>, ApiError> {
    state
        .store
        .get(id)
        .await
        .map(Json)
        .ok_or_else(|| registry_error(RegistryError::NotFound(id)))
}

async fn update_agent(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
    Json(draft): Json<AgentDraft>,
) -> Result<Json<Agent>, ApiError> {
    state
        .store
        .update(id, draft)
        .await
        .map(Json)
        .map_err(registry_error)
}

async fn delete_agent(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    state.store.delete(id).await.map_err(registry_error)?;
    Ok(StatusCode::NO_CONTENT)
}

async fn list_templates() -> Json<TemplatesResponse> {
    Json(TemplatesResponse {
        templates: templates::all().to_vec(),
        categories: templates::categories()
            .into_iter()
            .map(|(name, keys)| TemplateCategory {
                name: name.to_string(),
                templates: keys.into_iter().map(str::to_string).collect(),
            })
            .collect(),
    })
}

async fn create_from_template(
    State(state): State<Arc<AppState>>,
    Path(key): Path<String>,
) -> Result<(StatusCode, Json<Agent>), ApiError> {
    let template = templates::get(&key)
        .ok_or_else(|| (StatusCode::NOT_FOUND, format!("Template '{}' not found", key)))?;
    let agent = state
        .store
        .create(template.to_draft())
        .await
        .map_err(registry_error)?;
    Ok((StatusCode::CREATED, Json(agent)))
}

// ─────────────────────────────────────────────────────────────────────────────
// Saved pipeline
// ─────────────────────────────────────────────────────────────────────────────

async fn get_pipeline(State(state): State<Arc<AppState>>) -> Json<PipelineSpec> {
    Json(state.store.sequence().await)
}

async fn set_pipeline(
    State(state): State<Arc<AppState>>,
    Json(req): Json<SetPipelineRequest>,
) -> Result<Json<PipelineSpec>, ApiError> {
    state
        .store
        .set_sequence(PipelineSpec::new(req.agent_ids))
        .await
        .map(Json)
        .map_err(registry_error)
}

async fn add_to_pipeline(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<PipelineSpec>, ApiError> {
    if state.store.get(id).await.is_none() {
        return Err(registry_error(RegistryError::NotFound(id)));
    }
    let mut spec = state.store.sequence().await;
    spec.add(id);
    state
        .store
        .set_sequence(spec)
        .await
        .map(Json)
        .map_err(registry_error)
}

async fn remove_from_pipeline(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<PipelineSpec>, ApiError> {
    let mut spec = state.store.sequence().await;
    spec.remove(id);
    state
        .store
        .set_sequence(spec)
        .await
        .map(Json)
        .map_err(registry_error)
}

async fn reorder_pipeline(
    State(state): State<Arc<AppState>>,
    Json(req): Json<ReorderRequest>,
) -> Result<Json<PipelineSpec>, ApiError> {
    let mut spec = state.store.sequence().await;
    spec.reorder(req.from, req.to).map_err(validation_error)?;
    state
        .store
        .set_sequence(spec)
        .await
        .map(Json)
        .map_err(registry_error)
}

// ─────────────────────────────────────────────────────────────────────────────
// Runs
// ─────────────────────────────────────────────────────────────────────────────

async fn create_run(
    State(state): State<Arc<AppState>>,
    Json(req): Json<CreateRunRequest>,
) -> Result<(StatusCode, Json<CreateRunResponse>), ApiError> {
    let CreateRunRequest {
        prompt,
        context_files,
        agent_ids,
    } = req;
    let spec = match agent_ids {
        Some(ids) => PipelineSpec::new(ids),
        None => state.store.sequence().await,
    };
    let agents = spec
        .resolve(state.store.as_ref())
        .await
        .map_err(validation_error)?;
    let context = fold_context_files(&context_files);
    PipelineExecutor::validate(&agents, &prompt, context.as_deref())
        .map_err(validation_error)?;

    state.evict_finished_runs().await;

    let id = Uuid::new_v4();
    let run_state = Arc::new(RwLock::new(RunState::new(
        id,
        prompt.clone(),
        agents.iter().map(|a| a.name.clone()).collect(),
    )));
    let (events_tx, _) = broadcast::channel(EVENT_CHANNEL_CAPACITY);
    let cancel = CancellationToken::new();
    let finished = CancellationToken::new();

    state.runs.write().await.insert(
        id,
        RunHandle {
            state: Arc::clone(&run_state),
            events_tx: events_tx.clone(),
            cancel: cancel.clone(),
            finished: finished.clone(),
        },
    );

    tracing::info!(run_id = %id, agents = agents.len(), "Run created");

    let executor = Arc::clone(&state.executor);
    tokio::spawn(async move {
        let (tx, mut rx) = mpsc::unbounded_channel::<PipelineEvent>();

        // Apply events to the snapshot before fanning them out, so a
        // subscriber that reads the snapshot never misses what it holds.
        let forward_state = Arc::clone(&run_state);
        let forward_tx = events_tx.clone();
        let forwarder = tokio::spawn(async move {
            while let Some(event) = rx.recv().await {
                forward_state.write().await.apply(&event);
                let _ = forward_tx.send(event);
            }
        });

        let result = executor
            .run(&agents, &prompt, context.as_deref(), &tx, &cancel)
            .await;
        drop(tx);
        if let Err(e) = forwarder.await {
            tracing::error!(run_id = %id, "Event forwarder panicked: {}", e);
        }

        let mut snapshot = run_state.write().await;
        match result {
            Ok(report) => {
                tracing::info!(run_id = %id, "Run completed");
                snapshot.finish(RunStatus::Completed, report.records, None);
            }
            Err(PipelineError::Cancelled { records, .. }) => {
                tracing::info!(run_id = %id, "Run cancelled");
                snapshot.finish(RunStatus::Cancelled, records, None);
            }
            Err(e) => {
                tracing::warn!(run_id = %id, error = %e, "Run failed");
                let message = e.to_string();
                let records = e.partial_records().to_vec();
                snapshot.finish(RunStatus::Failed, records, Some(message));
            }
        }
        drop(snapshot);
        finished.cancel();
    });

    Ok((
        StatusCode::ACCEPTED,
        Json(CreateRunResponse {
            id,
            status: RunStatus::Running,
        }),
    ))
}

async fn list_runs(State(state): State<Arc<AppState>>) -> Json<Vec<RunSummary>> {
    let runs = state.runs.read().await;
    let mut summaries = Vec::with_capacity(runs.len());
    for handle in runs.values() {
        summaries.push(RunSummary::from(&*handle.state.read().await));
    }
    summaries.sort_by(|a, b| b.started_at.cmp(&a.started_at));
    Json(summaries)
}

async fn get_run(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<RunState>, ApiError> {
    let runs = state.runs.read().await;
    let handle = runs.get(&id).ok_or_else(|| run_not_found(id))?;
    let snapshot = handle.state.read().await.clone();
    Ok(Json(snapshot))
}

async fn cancel_run(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<CreateRunResponse>, ApiError> {
    let runs = state.runs.read().await;
    let handle = runs.get(&id).ok_or_else(|| run_not_found(id))?;
    let status = handle.state.read().await.status;
    if status.is_finished() {
        return Err((
            StatusCode::CONFLICT,
            format!("Run {} already finished", id),
        ));
    }
    handle.cancel.cancel();
    tracing::info!(run_id = %id, "Run cancellation requested");
    Ok(Json(CreateRunResponse { id, status }))
}

/// Stream a run as SSE: a `state` snapshot, then `progress` and `output`
/// events, then a final `done` snapshot.
async fn stream_run(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Sse<impl Stream<Item = Result<Event, Infallible>>>, ApiError> {
    let (run_state, mut rx, finished) = {
        let runs = state.runs.read().await;
        let handle = runs.get(&id).ok_or_else(|| run_not_found(id))?;
        // Subscribe before snapshotting; events in both are at worst repeated, never lost.
        let rx = handle.events_tx.subscribe();
        (Arc::clone(&handle.state), rx, handle.finished.clone())
    };
    let initial = run_state.read().await.clone();
    tracing::debug!(run_id = %id, "Run SSE stream opened");

    let stream = async_stream::stream! {
        match Event::default().event("state").json_data(&initial) {
            Ok(ev) => yield Ok(ev),
            Err(e) => tracing::error!(run_id = %id, "Failed to serialize run snapshot: {}", e),
        }

        loop {
            tokio::select! {
                biased;
                result = rx.recv() => {
                    match result {
                        Ok(ev) => {
                            match Event::default().event(ev.event_name()).json_data(&ev) {
                                Ok(sse) => yield Ok(sse),
                                Err(e) => {
                                    tracing::error!(run_id = %id, error = %e, "Failed to serialize SSE event; dropping");
                                }
                            }
                        }
                        Err(broadcast::error::RecvError::Lagged(n)) => {
                            tracing::warn!(run_id = %id, dropped = n, "Run SSE stream lagged");
                        }
                        Err(broadcast::error::RecvError::Closed) => break,
                    }
                }
                _ = finished.cancelled() => break,
            }
        }

        let last = run_state.read().await.clone();
        match Event::default().event("done").json_data(&last) {
            Ok(ev) => yield Ok(ev),
            Err(e) => tracing::error!(run_id = %id, "Failed to serialize final run state: {}", e),
        }
        tracing::debug!(run_id = %id, "Run SSE stream closed");
    };

    Ok(Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(std::time::Duration::from_secs(15))
            .text("keepalive"),
    ))
}
