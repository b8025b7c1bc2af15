//! MCP session handler for FreeCAD.
//!
//! This module implements the MCP server lifecycle:
//!
//! 1. **Initialisation**: Capability negotiation and version agreement
//! 2. **Operation**: Handling tool calls and other requests
//! 3. **Shutdown**: Graceful connection termination
//!
//! The handler is transport-agnostic: [`McpServer::handle_line`] turns one
//! incoming JSON-RPC line into at most one reply. [`McpServer::run`] drives
//! it over stdio; the SSE transport drives one handler per session.

use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Map, Value};

use crate::freecad::{FreeCadError, FreeCadRpc, ObjectSpec, OperationReply, ViewName};
use crate::mcp::prompts;
use crate::mcp::protocol::{
    parse_message, ErrorCode, IncomingMessage, JsonRpcError, JsonRpcErrorData,
    JsonRpcNotification, JsonRpcRequest, JsonRpcResponse, OutgoingMessage, RequestId,
    MCP_PROTOCOL_VERSION, SERVER_NAME,
};
use crate::mcp::tools::tool_definitions;
use crate::mcp::transport::StdioTransport;

/// Notice used when the active view has no 3D camera to capture.
pub const SCREENSHOT_UNAVAILABLE: &str =
    "Cannot get screenshot in the current view type (such as TechDraw or Spreadsheet)";

/// Notice returned by `get_view` when text-only feedback is enabled.
pub const SCREENSHOTS_DISABLED: &str = "Screenshots are disabled (text-only feedback mode)";

/// Server state in the MCP lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ServerState {
    /// Waiting for initialize request.
    AwaitingInit,
    /// Initialize received, waiting for initialized notification.
    Initialising,
    /// Ready for normal operation.
    Running,
    /// Shutdown in progress.
    ShuttingDown,
}

/// Server capabilities advertised during initialisation.
#[derive(Debug, Clone, Serialize)]
pub struct ServerCapabilities {
    /// Tool-related capabilities.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<ListCapabilities>,
    /// Prompt-related capabilities.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompts: Option<ListCapabilities>,
}

impl Default for ServerCapabilities {
    fn default() -> Self {
        Self {
            tools: Some(ListCapabilities::default()),
            prompts: Some(ListCapabilities::default()),
        }
    }
}

/// Capabilities shared by the tool and prompt lists.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ListCapabilities {
    /// Whether the list can change during the session.
    #[serde(rename = "listChanged", skip_serializing_if = "is_false")]
    pub list_changed: bool,
}

#[allow(clippy::trivially_copy_pass_by_ref)] // skip_serializing_if needs fn(&T) -> bool
const fn is_false(b: &bool) -> bool {
    !*b
}

/// Server information for initialisation response.
#[derive(Debug, Clone, Serialize)]
pub struct ServerInfo {
    /// Server name.
    pub name: String,
    /// Server version.
    pub version: String,
}

impl Default for ServerInfo {
    fn default() -> Self {
        Self {
            name: SERVER_NAME.to_string(),
            version: env!("CARGO_PKG_VERSION").to_string(),
        }
    }
}

/// Client information received during initialisation.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ClientInfo {
    /// Client name.
    pub name: String,
    /// Client version.
    #[serde(default)]
    pub version: Option<String>,
}

/// Parameters for the initialize request.
#[derive(Debug, Clone, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct InitializeParams {
    /// Protocol version requested by client.
    pub protocol_version: String,
    /// Client capabilities.
    #[serde(default)]
    pub capabilities: Value,
    /// Client information.
    #[serde(default)]
    pub client_info: Option<ClientInfo>,
}

/// Parameters for tools/call request.
#[derive(Debug, Clone, Deserialize)]
pub struct ToolCallParams {
    /// Name of the tool to call.
    pub name: String,
    /// Arguments for the tool.
    #[serde(default)]
    pub arguments: Value,
}

/// Parameters for prompts/get request.
#[derive(Debug, Clone, Deserialize)]
pub struct PromptGetParams {
    /// Name of the prompt.
    pub name: String,
}

/// Content item in a tool call response.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum ToolContent {
    /// Text content.
    Text {
        /// The text content.
        text: String,
    },
    /// Base64-encoded image.
    Image {
        /// The image bytes, base64 encoded.
        data: String,
        /// MIME type of the image.
        #[serde(rename = "mimeType")]
        mime_type: String,
    },
}

/// Result of a tool call.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolCallResult {
    /// Content returned by the tool.
    pub content: Vec<ToolContent>,
    /// Whether the tool call resulted in an error.
    #[serde(skip_serializing_if = "is_false")]
    pub is_error: bool,
}

impl ToolCallResult {
    /// Creates a successful text result.
    #[must_use]
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            content: vec![ToolContent::Text { text: text.into() }],
            is_error: false,
        }
    }

    /// Creates an error text result.
    #[must_use]
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            content: vec![ToolContent::Text {
                text: message.into(),
            }],
            is_error: true,
        }
    }

    /// Appends a text item.
    pub fn push_text(&mut self, text: impl Into<String>) {
        self.content.push(ToolContent::Text { text: text.into() });
    }

    /// Appends a PNG image item.
    pub fn push_png(&mut self, data: String) {
        self.content.push(ToolContent::Image {
            data,
            mime_type: "image/png".to_string(),
        });
    }
}

/// The MCP session handler.
pub struct McpServer {
    /// Current server state.
    state: ServerState,
    /// Negotiated protocol version (set after initialisation).
    protocol_version: Option<String>,
    /// The FreeCAD addon.
    freecad: Arc<dyn FreeCadRpc>,
    /// Suppress screenshots in tool results.
    only_text_feedback: bool,
}

impl McpServer {
    /// Creates a session handler talking to `freecad`.
    #[must_use]
    pub fn new(freecad: Arc<dyn FreeCadRpc>, only_text_feedback: bool) -> Self {
        Self {
            state: ServerState::AwaitingInit,
            protocol_version: None,
            freecad,
            only_text_feedback,
        }
    }

    /// Returns the current server state.
    #[must_use]
    pub const fn state(&self) -> ServerState {
        self.state
    }

    /// Returns the negotiated protocol version, once initialised.
    #[must_use]
    pub fn protocol_version(&self) -> Option<&str> {
        self.protocol_version.as_deref()
    }

    /// Marks the session as shutting down.
    pub fn shut_down(&mut self) {
        self.state = ServerState::ShuttingDown;
    }

    /// Runs the MCP server over stdio with graceful shutdown handling.
    ///
    /// # Errors
    ///
    /// Returns an error if transport I/O fails.
    pub async fn run(&mut self) -> std::io::Result<()> {
        let mut transport = StdioTransport::new();
        self.run_with_shutdown(&mut transport).await
    }

    /// Runs the main loop and handles shutdown.
    #[cfg(unix)]
    async fn run_with_shutdown(&mut self, transport: &mut StdioTransport) -> std::io::Result<()> {
        use tokio::signal::unix::{signal, SignalKind};

        let mut sigint = signal(SignalKind::interrupt()).map_err(std::io::Error::other)?;
        let mut sigterm = signal(SignalKind::terminate()).map_err(std::io::Error::other)?;

        loop {
            tokio::select! {
                _ = sigint.recv() => {
                    tracing::info!("Received SIGINT, initiating graceful shutdown");
                    self.shut_down();
                    return Ok(());
                }

                _ = sigterm.recv() => {
                    tracing::info!("Received SIGTERM, initiating graceful shutdown");
                    self.shut_down();
                    return Ok(());
                }

                line_result = transport.read_line() => {
                    if self.handle_transport_result(transport, line_result).await? {
                        return Ok(());
                    }
                }
            }
        }
    }

    /// Runs the main loop and handles shutdown.
    #[cfg(windows)]
    async fn run_with_shutdown(&mut self, transport: &mut StdioTransport) -> std::io::Result<()> {
        let ctrl_c = tokio::signal::ctrl_c();
        tokio::pin!(ctrl_c);

        loop {
            tokio::select! {
                _ = &mut ctrl_c => {
                    tracing::info!("Received Ctrl+C, initiating graceful shutdown");
                    self.shut_down();
                    return Ok(());
                }

                line_result = transport.read_line() => {
                    if self.handle_transport_result(transport, line_result).await? {
                        return Ok(());
                    }
                }
            }
        }
    }

    /// Handles the result from transport read.
    ///
    /// Returns `true` if the server should shut down.
    async fn handle_transport_result(
        &mut self,
        transport: &mut StdioTransport,
        line_result: std::io::Result<Option<String>>,
    ) -> std::io::Result<bool> {
        let Some(line) = line_result? else {
            tracing::debug!("stdin closed");
            self.shut_down();
            return Ok(true);
        };

        if let Some(reply) = self.handle_line(&line).await {
            transport.write_message(&reply).await?;
        }

        Ok(self.state == ServerState::ShuttingDown)
    }

    /// Handles a single line of input.
    ///
    /// Returns the reply to send, if any. Blank lines and notifications
    /// produce none.
    pub async fn handle_line(&mut self, line: &str) -> Option<OutgoingMessage> {
        if line.trim().is_empty() {
            return None;
        }

        match parse_message(line) {
            Ok(msg) => self.handle_message(msg).await,
            Err(error) => Some(error.into()),
        }
    }

    /// Handles a parsed incoming message.
    pub async fn handle_message(&mut self, msg: IncomingMessage) -> Option<OutgoingMessage> {
        match msg {
            IncomingMessage::Request(req) => Some(self.handle_request(req).await),
            IncomingMessage::Notification(ref notif) => {
                self.handle_notification(notif);
                None
            }
        }
    }

    /// Handles an incoming request.
    async fn handle_request(&mut self, req: JsonRpcRequest) -> OutgoingMessage {
        tracing::debug!(id = %req.id, method = %req.method, "Request");

        let response = match req.method.as_str() {
            "initialize" => self.handle_initialize(&req),
            "tools/list" => self.handle_tools_list(&req),
            "tools/call" => self.handle_tools_call(&req).await,
            "prompts/list" => self.handle_prompts_list(&req),
            "prompts/get" => self.handle_prompts_get(&req),
            "ping" => Ok(Self::handle_ping(&req)),
            _ => Err(JsonRpcError::method_not_found(req.id.clone(), &req.method)),
        };

        match response {
            Ok(resp) => resp.into(),
            Err(error) => error.into(),
        }
    }

    /// Handles an incoming notification.
    fn handle_notification(&mut self, notif: &JsonRpcNotification) {
        if notif.method == "notifications/initialized" && self.state == ServerState::Initialising {
            self.state = ServerState::Running;
            tracing::info!("Session initialised");
        }
    }

    /// Handles the initialize request.
    fn handle_initialize(&mut self, req: &JsonRpcRequest) -> Result<JsonRpcResponse, JsonRpcError> {
        if self.state != ServerState::AwaitingInit {
            return Err(JsonRpcError::new(
                Some(req.id.clone()),
                JsonRpcErrorData::with_message(
                    ErrorCode::InvalidRequest,
                    "Server already initialised",
                ),
            ));
        }

        let params: InitializeParams = parse_params(req, "initialize")?;

        if let Some(client) = &params.client_info {
            tracing::info!(
                client = %client.name,
                version = client.version.as_deref().unwrap_or("unknown"),
                requested = %params.protocol_version,
                "Client connected"
            );
        }

        let negotiated_version = MCP_PROTOCOL_VERSION.to_string();

        self.protocol_version = Some(negotiated_version.clone());
        self.state = ServerState::Initialising;

        let result = json!({
            "protocolVersion": negotiated_version,
            "capabilities": ServerCapabilities::default(),
            "serverInfo": ServerInfo::default(),
        });

        Ok(JsonRpcResponse::success(req.id.clone(), result))
    }

    /// Handles the tools/list request.
    fn handle_tools_list(&self, req: &JsonRpcRequest) -> Result<JsonRpcResponse, JsonRpcError> {
        self.require_running(&req.id)?;

        let result = json!({
            "tools": tool_definitions(),
        });

        Ok(JsonRpcResponse::success(req.id.clone(), result))
    }

    /// Handles the tools/call request.
    async fn handle_tools_call(&self, req: &JsonRpcRequest) -> Result<JsonRpcResponse, JsonRpcError> {
        self.require_running(&req.id)?;

        let params: ToolCallParams = parse_params(req, "tool call")?;

        tracing::debug!(tool = %params.name, "Tool call");
        let result = self.call_tool(&params.name, &params.arguments).await;
        if result.is_error {
            tracing::warn!(tool = %params.name, "Tool call failed");
        }

        let result_value = serde_json::to_value(&result).map_err(|e| {
            tracing::error!(error = %e, "Failed to serialise tool call result");
            JsonRpcError::internal_error(
                req.id.clone(),
                "Internal error: failed to serialise result",
            )
        })?;

        Ok(JsonRpcResponse::success(req.id.clone(), result_value))
    }

    /// Handles the prompts/list request.
    fn handle_prompts_list(&self, req: &JsonRpcRequest) -> Result<JsonRpcResponse, JsonRpcError> {
        self.require_running(&req.id)?;

        let result = json!({
            "prompts": prompts::prompt_definitions(),
        });

        Ok(JsonRpcResponse::success(req.id.clone(), result))
    }

    /// Handles the prompts/get request.
    fn handle_prompts_get(&self, req: &JsonRpcRequest) -> Result<JsonRpcResponse, JsonRpcError> {
        self.require_running(&req.id)?;

        let params: PromptGetParams = parse_params(req, "prompt")?;

        let prompt = prompts::get_prompt(&params.name).ok_or_else(|| {
            JsonRpcError::invalid_params(
                req.id.clone(),
                format!("Unknown prompt: {}", params.name),
            )
        })?;

        Ok(JsonRpcResponse::success(req.id.clone(), prompt))
    }

    /// Handles the ping request.
    fn handle_ping(req: &JsonRpcRequest) -> JsonRpcResponse {
        JsonRpcResponse::success(req.id.clone(), json!({}))
    }

    /// Ensures the server is in the Running state.
    fn require_running(&self, id: &RequestId) -> Result<(), JsonRpcError> {
        if self.state != ServerState::Running {
            return Err(JsonRpcError::new(
                Some(id.clone()),
                JsonRpcErrorData::with_message(ErrorCode::InvalidRequest, "Server not initialised"),
            ));
        }
        Ok(())
    }

    // ==================== Tools ====================

    /// Dispatches one tool call.
    async fn call_tool(&self, name: &str, arguments: &Value) -> ToolCallResult {
        match name {
            "create_document" => self.call_create_document(arguments).await,
            "create_object" => self.call_create_object(arguments).await,
            "edit_object" => self.call_edit_object(arguments).await,
            "delete_object" => self.call_delete_object(arguments).await,
            "execute_code" => self.call_execute_code(arguments).await,
            "insert_part_from_library" => self.call_insert_part_from_library(arguments).await,
            "get_view" => self.call_get_view(arguments).await,
            "get_objects" => self.call_get_objects(arguments).await,
            "get_object" => self.call_get_object(arguments).await,
            "get_parts_list" => self.call_get_parts_list().await,
            "list_documents" => self.call_list_documents().await,
            _ => ToolCallResult::error(format!("Unknown tool: {name}")),
        }
    }

    async fn call_create_document(&self, arguments: &Value) -> ToolCallResult {
        let Some(name) = str_arg(arguments, "name") else {
            return missing("name");
        };

        match self.freecad.create_document(name).await {
            Ok(reply) if reply.success => {
                ToolCallResult::text(format!("Document '{name}' created successfully"))
            }
            Ok(reply) => {
                ToolCallResult::error(format!("Failed to create document: {}", reply.error_text()))
            }
            Err(e) => rpc_failure("create document", &e),
        }
    }

    async fn call_create_object(&self, arguments: &Value) -> ToolCallResult {
        let Some(doc_name) = str_arg(arguments, "doc_name") else {
            return missing("doc_name");
        };
        let Some(obj_type) = str_arg(arguments, "obj_type") else {
            return missing("obj_type");
        };
        let Some(obj_name) = str_arg(arguments, "obj_name") else {
            return missing("obj_name");
        };
        let properties = match object_arg(arguments, "obj_properties") {
            Ok(properties) => properties.unwrap_or_default(),
            Err(result) => return result,
        };

        let spec = ObjectSpec {
            name: obj_name.to_string(),
            object_type: obj_type.to_string(),
            analysis: str_arg(arguments, "analysis_name").map(str::to_string),
            properties,
        };

        let outcome = self.freecad.create_object(doc_name, &spec).await;
        self.mutation_result(outcome, "create object", |reply| {
            let created = reply.object_name.as_deref().unwrap_or(obj_name);
            format!("Object '{created}' created successfully")
        })
        .await
    }

    async fn call_edit_object(&self, arguments: &Value) -> ToolCallResult {
        let Some(doc_name) = str_arg(arguments, "doc_name") else {
            return missing("doc_name");
        };
        let Some(obj_name) = str_arg(arguments, "obj_name") else {
            return missing("obj_name");
        };
        let properties = match object_arg(arguments, "obj_properties") {
            Ok(Some(properties)) => properties,
            Ok(None) => return missing("obj_properties"),
            Err(result) => return result,
        };

        let outcome = self
            .freecad
            .edit_object(doc_name, obj_name, &properties)
            .await;
        self.mutation_result(outcome, "edit object", |reply| {
            let edited = reply.object_name.as_deref().unwrap_or(obj_name);
            format!("Object '{edited}' edited successfully")
        })
        .await
    }

    async fn call_delete_object(&self, arguments: &Value) -> ToolCallResult {
        let Some(doc_name) = str_arg(arguments, "doc_name") else {
            return missing("doc_name");
        };
        let Some(obj_name) = str_arg(arguments, "obj_name") else {
            return missing("obj_name");
        };

        let outcome = self.freecad.delete_object(doc_name, obj_name).await;
        self.mutation_result(outcome, "delete object", |_| {
            format!("Object '{obj_name}' deleted successfully")
        })
        .await
    }

    async fn call_execute_code(&self, arguments: &Value) -> ToolCallResult {
        let Some(code) = str_arg(arguments, "code") else {
            return missing("code");
        };

        let outcome = self.freecad.execute_code(code).await;
        self.mutation_result(outcome, "execute code", |reply| {
            format!(
                "Python code executed successfully.\nOutput: {}",
                reply.message.as_deref().unwrap_or_default()
            )
        })
        .await
    }

    async fn call_insert_part_from_library(&self, arguments: &Value) -> ToolCallResult {
        let Some(relative_path) = str_arg(arguments, "relative_path") else {
            return missing("relative_path");
        };

        let outcome = self.freecad.insert_part_from_library(relative_path).await;
        self.mutation_result(outcome, "insert part from library", |_| {
            format!("Part inserted from library: {relative_path}")
        })
        .await
    }

    async fn call_get_view(&self, arguments: &Value) -> ToolCallResult {
        let Some(view_name) = str_arg(arguments, "view_name") else {
            return missing("view_name");
        };
        let view = match view_name.parse::<ViewName>() {
            Ok(view) => view,
            Err(e) => return ToolCallResult::error(e),
        };

        if self.only_text_feedback {
            return ToolCallResult::text(SCREENSHOTS_DISABLED);
        }

        match self.freecad.get_active_screenshot(view).await {
            Ok(Some(data)) => {
                let mut result = ToolCallResult {
                    content: Vec::new(),
                    is_error: false,
                };
                result.push_png(data);
                result
            }
            Ok(None) => ToolCallResult::text(SCREENSHOT_UNAVAILABLE),
            Err(e) => rpc_failure("get view", &e),
        }
    }

    async fn call_get_objects(&self, arguments: &Value) -> ToolCallResult {
        let Some(doc_name) = str_arg(arguments, "doc_name") else {
            return missing("doc_name");
        };

        match self.freecad.get_objects(doc_name).await {
            Ok(objects) => self.with_screenshot(pretty(&objects)).await,
            Err(e) => rpc_failure("get objects", &e),
        }
    }

    async fn call_get_object(&self, arguments: &Value) -> ToolCallResult {
        let Some(doc_name) = str_arg(arguments, "doc_name") else {
            return missing("doc_name");
        };
        let Some(obj_name) = str_arg(arguments, "obj_name") else {
            return missing("obj_name");
        };

        match self.freecad.get_object(doc_name, obj_name).await {
            Ok(object) => self.with_screenshot(pretty(&object)).await,
            Err(e) => rpc_failure("get object", &e),
        }
    }

    async fn call_get_parts_list(&self) -> ToolCallResult {
        match self.freecad.get_parts_list().await {
            Ok(parts) if parts.is_empty() => ToolCallResult::text(
                "No parts found in the parts library. You must add the parts_library addon.",
            ),
            Ok(parts) => ToolCallResult::text(pretty(&json!(parts))),
            Err(e) => rpc_failure("get parts list", &e),
        }
    }

    async fn call_list_documents(&self) -> ToolCallResult {
        match self.freecad.list_documents().await {
            Ok(documents) => ToolCallResult::text(pretty(&json!(documents))),
            Err(e) => rpc_failure("list documents", &e),
        }
    }

    /// Builds the result of a mutating call, screenshot included.
    async fn mutation_result(
        &self,
        outcome: Result<OperationReply, FreeCadError>,
        operation: &str,
        success_text: impl FnOnce(&OperationReply) -> String,
    ) -> ToolCallResult {
        match outcome {
            Ok(reply) if reply.success => self.with_screenshot(success_text(&reply)).await,
            Ok(reply) => {
                let mut result =
                    ToolCallResult::error(format!("Failed to {operation}: {}", reply.error_text()));
                self.append_screenshot(&mut result).await;
                result
            }
            Err(e) => rpc_failure(operation, &e),
        }
    }

    async fn with_screenshot(&self, text: String) -> ToolCallResult {
        let mut result = ToolCallResult::text(text);
        self.append_screenshot(&mut result).await;
        result
    }

    /// Appends the isometric view, unless text-only feedback is on.
    ///
    /// A failed capture is logged and leaves the result unchanged.
    async fn append_screenshot(&self, result: &mut ToolCallResult) {
        if self.only_text_feedback {
            return;
        }

        match self.freecad.get_active_screenshot(ViewName::Isometric).await {
            Ok(Some(data)) => result.push_png(data),
            Ok(None) => result.push_text(SCREENSHOT_UNAVAILABLE),
            Err(e) => tracing::warn!(error = %e, "Failed to capture screenshot"),
        }
    }
}

/// Deserialises the request's params, which must be present.
fn parse_params<T: serde::de::DeserializeOwned>(
    req: &JsonRpcRequest,
    what: &str,
) -> Result<T, JsonRpcError> {
    req.params
        .as_ref()
        .map(|p| serde_json::from_value(p.clone()))
        .transpose()
        .map_err(|e| {
            JsonRpcError::invalid_params(req.id.clone(), format!("Invalid {what} params: {e}"))
        })?
        .ok_or_else(|| {
            JsonRpcError::invalid_params(req.id.clone(), format!("Missing {what} params"))
        })
}

fn str_arg<'a>(arguments: &'a Value, key: &str) -> Option<&'a str> {
    arguments.get(key).and_then(Value::as_str)
}

/// Reads an optional object argument; any other JSON type is an error result.
fn object_arg(arguments: &Value, key: &str) -> Result<Option<Map<String, Value>>, ToolCallResult> {
    match arguments.get(key) {
        None | Some(Value::Null) => Ok(None),
        Some(Value::Object(map)) => Ok(Some(map.clone())),
        Some(_) => Err(ToolCallResult::error(format!(
            "Invalid parameter: {key} must be an object"
        ))),
    }
}

fn missing(key: &str) -> ToolCallResult {
    ToolCallResult::error(format!("Missing required parameter: {key}"))
}

fn rpc_failure(operation: &str, error: &FreeCadError) -> ToolCallResult {
    tracing::warn!(operation, error = %error, "FreeCAD call failed");
    ToolCallResult::error(format!("Failed to {operation}: {error}"))
}

fn pretty(value: &Value) -> String {
    serde_json::to_string_pretty(value).unwrap_or_else(|_| value.to_string())
}
