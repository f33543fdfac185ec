//! Todoist MCP server.
//!
//! [`client::TodoistClient`] talks to the Todoist REST and Sync APIs behind
//! two rate limiters. [`batch`] and [`bulk`] build multi-command operations
//! on top of it, and [`mcp`] exposes everything as MCP tools.

pub mod batch;
pub mod bulk;
pub mod client;
pub mod config;
pub mod error;
pub mod mcp;
pub mod models;
pub mod sync;

pub use client::TodoistClient;
pub use error::{Result, TodoistError};
