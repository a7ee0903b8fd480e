//! MCP (Model Context Protocol) Server Implementation
//!
//! JSON-RPC 2.0 over stdio, the tools/resources/prompts this server
//! exposes, and a small client used to relay tool calls to a spawned server.

#[cfg(test)]
mod tests;

pub mod client;
pub mod errors;
pub mod prompts;
pub mod protocol;
pub mod relay;
pub mod resources;
pub mod server;
pub mod tools;

pub use client::McpClient;
pub use errors::{ErrorHandler, McpError, McpResult};
pub use relay::{ToolRelay, ToolResultBlock, ToolUse};
pub use server::{ConnectionState, McpServer, MessageHandler};
pub use tools::ToolContext;
