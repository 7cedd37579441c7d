//! Agent definitions and the per-agent turn logic.
//!
//! Each agent turn follows a bounded "tools in a loop" pattern:
//! 1. Frame the turn prompt from the agent's role and its input
//! 2. Call the LLM with the advertised tools
//! 3. If the LLM requests a tool call, execute it and feed the result back
//! 4. Repeat until the LLM answers or the turn cap is reached

mod agent_loop;
pub mod format;
pub mod prompt;
pub mod registry;
pub mod templates;

pub use agent_loop::{fallback_text, LoopState, ToolResolutionLoop, TurnError, TurnResult};
pub use format::OutputFormat;
pub use prompt::{build_first_turn, build_initial_input, build_next_turn, fold_context_files, ContextFile};
pub use registry::{Agent, AgentDraft, AgentRegistry, AgentStore, RegistryError};
pub use templates::AgentTemplate;
