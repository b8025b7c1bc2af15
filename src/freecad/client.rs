//! HTTP client for the FreeCAD addon's XML-RPC server.

use std::time::Duration;

use async_trait::async_trait;
use base64::{engine::general_purpose::STANDARD as BASE64_STANDARD, Engine as _};
use serde::de::DeserializeOwned;
use serde_json::{json, Map, Value};

use crate::config::FreeCadConfig;
use crate::freecad::xmlrpc;
use crate::freecad::{FreeCadError, FreeCadResult, ObjectSpec, OperationReply, ViewName};

/// The procedures the FreeCAD addon exposes.
///
/// The MCP server only talks to FreeCAD through this trait.
#[async_trait]
pub trait FreeCadRpc: Send + Sync {
    /// Checks that the addon answers.
    async fn ping(&self) -> FreeCadResult<bool>;

    /// Creates a new document.
    async fn create_document(&self, name: &str) -> FreeCadResult<OperationReply>;

    /// Creates an object in a document.
    async fn create_object(&self, doc_name: &str, object: &ObjectSpec)
        -> FreeCadResult<OperationReply>;

    /// Sets properties on an existing object.
    async fn edit_object(
        &self,
        doc_name: &str,
        obj_name: &str,
        properties: &Map<String, Value>,
    ) -> FreeCadResult<OperationReply>;

    /// Removes an object from a document.
    async fn delete_object(&self, doc_name: &str, obj_name: &str) -> FreeCadResult<OperationReply>;

    /// Runs Python code inside FreeCAD.
    async fn execute_code(&self, code: &str) -> FreeCadResult<OperationReply>;

    /// Inserts a part from the parts library addon.
    async fn insert_part_from_library(&self, relative_path: &str) -> FreeCadResult<OperationReply>;

    /// Describes every object in a document.
    async fn get_objects(&self, doc_name: &str) -> FreeCadResult<Value>;

    /// Describes one object.
    async fn get_object(&self, doc_name: &str, obj_name: &str) -> FreeCadResult<Value>;

    /// Lists the parts library, as paths relative to its root.
    async fn get_parts_list(&self) -> FreeCadResult<Vec<String>>;

    /// Lists open documents.
    async fn list_documents(&self) -> FreeCadResult<Vec<String>>;

    /// Captures the active view as base64 PNG.
    ///
    /// Returns `None` when the active view cannot be captured (TechDraw
    /// pages, spreadsheets).
    async fn get_active_screenshot(&self, view: ViewName) -> FreeCadResult<Option<String>>;
}

/// Connection to a running FreeCAD instance.
#[derive(Debug, Clone)]
pub struct FreeCadConnection {
    url: String,
    http: reqwest::Client,
}

impl FreeCadConnection {
    /// Creates a connection to `http://{host}:{port}`.
    ///
    /// No request is made until the first call.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn new(host: &str, port: u16, timeout: Duration) -> FreeCadResult<Self> {
        let url = format!("http://{host}:{port}");
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|source| FreeCadError::Transport {
                url: url.clone(),
                source,
            })?;
        Ok(Self { url, http })
    }

    /// Creates a connection from the `freecad` config section.
    ///
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be built.
    pub fn from_config(config: &FreeCadConfig) -> FreeCadResult<Self> {
        Self::new(
            &config.host,
            config.port,
            Duration::from_secs(config.timeout_secs),
        )
    }

    /// The endpoint URL.
    #[must_use]
    pub fn url(&self) -> &str {
        &self.url
    }

    /// Performs one XML-RPC call.
    ///
    /// # Errors
    ///
    /// Returns an error on transport failure, HTTP error status, fault
    /// response or unreadable response.
    pub async fn call(&self, method: &str, params: &[Value]) -> FreeCadResult<Value> {
        tracing::debug!(method, "FreeCAD RPC call");

        let transport = |source: reqwest::Error| FreeCadError::Transport {
            url: self.url.clone(),
            source,
        };

        let body = self
            .http
            .post(&self.url)
            .header(reqwest::header::CONTENT_TYPE, "text/xml")
            .body(xmlrpc::encode_call(method, params))
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(transport)?
            .text()
            .await
            .map_err(transport)?;

        xmlrpc::decode_response(&body).map_err(|source| {
            tracing::debug!(method, error = %source, "FreeCAD RPC call failed");
            FreeCadError::Rpc {
                method: method.to_string(),
                source,
            }
        })
    }

    async fn operation(&self, method: &str, params: &[Value]) -> FreeCadResult<OperationReply> {
        let value = self.call(method, params).await?;
        OperationReply::from_value(method, value)
    }

    async fn typed<T: DeserializeOwned>(&self, method: &str, params: &[Value]) -> FreeCadResult<T> {
        let value = self.call(method, params).await?;
        serde_json::from_value(value).map_err(|e| FreeCadError::UnexpectedResult {
            method: method.to_string(),
            message: e.to_string(),
        })
    }
}

#[async_trait]
impl FreeCadRpc for FreeCadConnection {
    async fn ping(&self) -> FreeCadResult<bool> {
        self.typed("ping", &[]).await
    }

    async fn create_document(&self, name: &str) -> FreeCadResult<OperationReply> {
        self.operation("create_document", &[json!(name)]).await
    }

    async fn create_object(
        &self,
        doc_name: &str,
        object: &ObjectSpec,
    ) -> FreeCadResult<OperationReply> {
        self.operation("create_object", &[json!(doc_name), object.to_rpc_value()])
            .await
    }

    async fn edit_object(
        &self,
        doc_name: &str,
        obj_name: &str,
        properties: &Map<String, Value>,
    ) -> FreeCadResult<OperationReply> {
        self.operation(
            "edit_object",
            &[
                json!(doc_name),
                json!(obj_name),
                json!({ "Properties": properties }),
            ],
        )
        .await
    }

    async fn delete_object(&self, doc_name: &str, obj_name: &str) -> FreeCadResult<OperationReply> {
        self.operation("delete_object", &[json!(doc_name), json!(obj_name)])
            .await
    }

    async fn execute_code(&self, code: &str) -> FreeCadResult<OperationReply> {
        self.operation("execute_code", &[json!(code)]).await
    }

    async fn insert_part_from_library(&self, relative_path: &str) -> FreeCadResult<OperationReply> {
        self.operation("insert_part_from_library", &[json!(relative_path)])
            .await
    }

    async fn get_objects(&self, doc_name: &str) -> FreeCadResult<Value> {
        self.call("get_objects", &[json!(doc_name)]).await
    }

    async fn get_object(&self, doc_name: &str, obj_name: &str) -> FreeCadResult<Value> {
        self.call("get_object", &[json!(doc_name), json!(obj_name)])
            .await
    }

    async fn get_parts_list(&self) -> FreeCadResult<Vec<String>> {
        self.typed("get_parts_list", &[]).await
    }

    async fn list_documents(&self) -> FreeCadResult<Vec<String>> {
        self.typed("list_documents", &[]).await
    }

    async fn get_active_screenshot(&self, view: ViewName) -> FreeCadResult<Option<String>> {
        const METHOD: &str = "get_active_screenshot";

        match self.call(METHOD, &[json!(view.as_str())]).await? {
            Value::Null => Ok(None),
            Value::String(data) => {
                BASE64_STANDARD
                    .decode(data.as_bytes())
                    .map_err(|e| FreeCadError::UnexpectedResult {
                        method: METHOD.to_string(),
                        message: format!("screenshot is not valid base64: {e}"),
                    })?;
                Ok(Some(data))
            }
            other => Err(FreeCadError::UnexpectedResult {
                method: METHOD.to_string(),
                message: format!("expected base64 string or nil, got {other}"),
            }),
        }
    }
}
