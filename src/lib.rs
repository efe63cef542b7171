//! ratel - a headless multi-tenant LLM-agent runtime.
//!
//! Messaging frontends POST user turns to the gateway; the agent loop
//! drives an OpenAI-compatible chat-completions proxy through a bounded
//! tool-calling iteration; tools execute under a per-session permission
//! regime; a durable scheduler re-enters the agent on timers.
//!
//! Subsystems:
//! - [`agent`] - the ReAct loop, prompt composition, argument repair
//! - [`tools`] - built-in executors, registry, dispatcher
//! - [`mcp`] - JSON-RPC bridge to external tool servers
//! - [`sessions`] - per-(user, chat) state and transcript snapshots
//! - [`permissions`] - allowlist/denylist filtering by session type
//! - [`scheduler`] - crash-safe one-shot and recurring tasks
//! - [`gateway`] - the axum HTTP surface
//! - [`adapters`] - callbacks into the chat frontends

pub mod adapters;
pub mod agent;
pub mod ai;
pub mod config;
pub mod gateway;
pub mod mcp;
pub mod permissions;
pub mod scheduler;
pub mod sessions;
pub mod skills;
pub mod storage;
pub mod tools;
