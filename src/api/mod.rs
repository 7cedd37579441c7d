//! HTTP API for managing agents and running pipelines.
//!
//! ## Endpoints
//!
//! - `GET /api/health` - Health check
//! - `GET|POST /api/agents`, `GET|PUT|DELETE /api/agents/:id` - Agent definitions
//! - `GET /api/templates`, `POST /api/templates/:key/agent` - Built-in templates
//! - `GET|PUT /api/pipeline` - The saved agent sequence
//! - `POST|DELETE /api/pipeline/agents/:id`, `POST /api/pipeline/reorder` - Sequence edits
//! - `GET|POST /api/runs` - List runs, start a run
//! - `GET /api/runs/:id` - Run state
//! - `GET /api/runs/:id/stream` - Stream run events (SSE)
//! - `POST /api/runs/:id/cancel` - Cancel a run

mod routes;
pub mod types;

pub use routes::{router, serve, AppState};
