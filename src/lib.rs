//! freecad-mcp: MCP server that lets AI assistants drive FreeCAD
//!
//! The server talks to the FreeCAD MCP addon, which runs an XML-RPC server
//! inside FreeCAD, and exposes its operations as MCP tools over stdio or
//! HTTP+SSE.
//!
//! # Architecture
//!
//! - **Tools**: documents, objects, Python execution, the parts library
//! - **Feedback**: mutating tools return a screenshot of the active view
//!   unless text-only feedback is configured
//! - **Launcher**: `freecad-mcp-launch` frees the HTTP port held by a stale
//!   server before starting the SSE transport
//!
//! # Modules
//!
//! - [`config`]: Configuration loading and validation
//! - [`error`]: Error types
//! - [`freecad`]: XML-RPC client for the FreeCAD addon
//! - [`launcher`]: Port reclaiming launcher
//! - [`mcp`]: MCP protocol implementation

pub mod config;
pub mod error;
pub mod freecad;
pub mod launcher;
pub mod mcp;
