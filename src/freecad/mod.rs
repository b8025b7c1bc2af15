//! Client for the FreeCAD addon's remote procedure interface.
//!
//! The addon runs an XML-RPC server inside FreeCAD (port 9875 by default).
//! Every tool call the MCP server handles becomes one or two calls here.
//!
//! - [`xmlrpc`]: `methodCall` / `methodResponse` codec
//! - [`FreeCadRpc`]: the procedures, as a trait
//! - [`FreeCadConnection`]: the HTTP implementation

mod client;
mod error;
mod types;
pub mod xmlrpc;

pub use client::{FreeCadConnection, FreeCadRpc};
pub use error::{FreeCadError, FreeCadResult, XmlRpcError};
pub use types::{ObjectSpec, OperationReply, ViewName};
