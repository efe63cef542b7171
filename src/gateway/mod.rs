//! The HTTP surface: core chat endpoints, admin, tools API, MCP
//! management, and the scheduler API, colocated on one axum server.

pub mod routes;
pub mod server;
pub mod tasks_api;
pub mod tools_api;

pub use server::{AppState, SharedState, build_router, serve};
