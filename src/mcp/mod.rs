//! Model Context Protocol (MCP) server implementation.
//!
//! This module exposes FreeCAD operations as tools to AI assistants. The
//! session handler is shared by two transports: stdio and HTTP+SSE.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────────────────────────────────────────────┐
//! │                          MCP Server                          │
//! │                                                              │
//! │   ┌─────────────┐    ┌─────────────┐    ┌─────────────┐     │
//! │   │  Transport  │───▶│   Server    │───▶│   Tools     │     │
//! │   │ (stdio/SSE) │    │ (lifecycle) │    │  (handlers) │     │
//! │   └─────────────┘    └─────────────┘    └──────┬──────┘     │
//! │                                                │            │
//! │                                                ▼            │
//! │                                         ┌─────────────┐     │
//! │                                         │   FreeCAD   │     │
//! │                                         │  (XML-RPC)  │     │
//! │                                         └─────────────┘     │
//! └──────────────────────────────────────────────────────────────┘
//! ```
//!
//! # Protocol Version
//!
//! This implementation targets MCP protocol version 2024-11-05.

pub mod prompts;
pub mod protocol;
pub mod server;
pub mod sse;
pub mod tools;
pub mod transport;

pub use protocol::{
    JsonRpcError, JsonRpcRequest, JsonRpcResponse, OutgoingMessage, MCP_PROTOCOL_VERSION,
};
pub use server::{McpServer, ServerState, ToolCallResult, ToolContent};
pub use sse::SseServer;
pub use transport::StdioTransport;
