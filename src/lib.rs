//! # Agent Chain
//!
//! Sequential multi-agent pipelines over a hosted LLM.
//!
//! This library provides:
//! - Agent definitions (name, role, output format) persisted to a JSON file
//! - A pipeline executor that feeds each agent's output to the next agent
//! - A bounded tool-call loop that lets agents search the web mid-turn
//! - An HTTP API for editing agents and streaming runs
//!
//! ## Architecture
//!
//! Each agent turn follows the "tools in a loop" pattern:
//! 1. Frame the agent's role and input as a turn prompt
//! 2. Call the LLM with the shared conversation history and available tools
//! 3. If the LLM requests `internet_search`, run it and feed the results back
//! 4. Repeat until the LLM answers or the turn cap is reached
//!
//! ## Example
//!
//! ```rust,ignore
//! use agent_chain::{config::Config, pipeline::{NoopObserver, PipelineExecutor}};
//!
//! let config = Config::from_env()?;
//! let executor = PipelineExecutor::from_config(&config)?;
//! let report = executor
//!     .run(&agents, "Summarize this article", None, &NoopObserver, &CancellationToken::new())
//!     .await?;
//! ```

pub mod agent;
pub mod api;
pub mod config;
pub mod llm;
pub mod pipeline;
pub mod tools;

pub use config::Config;
