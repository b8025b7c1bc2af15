//! Shared fixtures for integration tests.

#![allow(dead_code)]

use std::sync::Mutex;

use async_trait::async_trait;
use freecad_mcp::freecad::{
    FreeCadError, FreeCadResult, FreeCadRpc, ObjectSpec, OperationReply, ViewName,
};
use serde_json::{json, Map, Value};

/// A one-pixel PNG, base64 encoded.
pub const PIXEL_PNG: &str =
    "iVBORw0KGgoAAAANSUhEUgAAAAEAAAABCAYAAAAfFcSJAAAADUlEQVR42mNkYPhfDwAChwGA60e6kgAAAABJRU5ErkJggg==";

/// In-memory FreeCAD that records every call.
pub struct FakeFreeCad {
    calls: Mutex<Vec<String>>,
    /// What `get_active_screenshot` returns.
    pub screenshot: Option<String>,
    /// Every call fails with an unexpected-result error.
    pub unreachable: bool,
    /// Documents reported by `list_documents`.
    pub documents: Vec<String>,
}

impl FakeFreeCad {
    pub fn new() -> Self {
        Self {
            calls: Mutex::new(Vec::new()),
            screenshot: Some(PIXEL_PNG.to_string()),
            unreachable: false,
            documents: vec!["Unnamed".to_string()],
        }
    }

    pub fn unreachable() -> Self {
        Self {
            unreachable: true,
            ..Self::new()
        }
    }

    pub fn without_screenshot() -> Self {
        Self {
            screenshot: None,
            ..Self::new()
        }
    }

    /// Names of the RPC methods called so far, in order.
    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    fn record(&self, method: &str) -> FreeCadResult<()> {
        self.calls.lock().unwrap().push(method.to_string());
        if self.unreachable {
            return Err(FreeCadError::UnexpectedResult {
                method: method.to_string(),
                message: "FreeCAD is not running".to_string(),
            });
        }
        Ok(())
    }

    fn ok(object_name: Option<&str>) -> OperationReply {
        OperationReply {
            success: true,
            object_name: object_name.map(str::to_string),
            ..OperationReply::default()
        }
    }
}

#[async_trait]
impl FreeCadRpc for FakeFreeCad {
    async fn ping(&self) -> FreeCadResult<bool> {
        self.record("ping")?;
        Ok(true)
    }

    async fn create_document(&self, _name: &str) -> FreeCadResult<OperationReply> {
        self.record("create_document")?;
        Ok(Self::ok(None))
    }

    async fn create_object(
        &self,
        doc_name: &str,
        object: &ObjectSpec,
    ) -> FreeCadResult<OperationReply> {
        self.record("create_object")?;
        if self.documents.iter().all(|d| d != doc_name) {
            return Ok(OperationReply {
                success: false,
                error: Some(format!("Document '{doc_name}' not found")),
                ..OperationReply::default()
            });
        }
        Ok(Self::ok(Some(&object.name)))
    }

    async fn edit_object(
        &self,
        _doc_name: &str,
        obj_name: &str,
        _properties: &Map<String, Value>,
    ) -> FreeCadResult<OperationReply> {
        self.record("edit_object")?;
        Ok(Self::ok(Some(obj_name)))
    }

    async fn delete_object(&self, _doc_name: &str, obj_name: &str) -> FreeCadResult<OperationReply> {
        self.record("delete_object")?;
        Ok(Self::ok(Some(obj_name)))
    }

    async fn execute_code(&self, _code: &str) -> FreeCadResult<OperationReply> {
        self.record("execute_code")?;
        Ok(OperationReply {
            success: true,
            message: Some("hello".to_string()),
            ..OperationReply::default()
        })
    }

    async fn insert_part_from_library(&self, _relative_path: &str) -> FreeCadResult<OperationReply> {
        self.record("insert_part_from_library")?;
        Ok(Self::ok(None))
    }

    async fn get_objects(&self, _doc_name: &str) -> FreeCadResult<Value> {
        self.record("get_objects")?;
        Ok(json!([{ "Name": "Box", "TypeId": "Part::Box" }]))
    }

    async fn get_object(&self, _doc_name: &str, obj_name: &str) -> FreeCadResult<Value> {
        self.record("get_object")?;
        Ok(json!({ "Name": obj_name, "TypeId": "Part::Box" }))
    }

    async fn get_parts_list(&self) -> FreeCadResult<Vec<String>> {
        self.record("get_parts_list")?;
        Ok(vec!["Mechanical Parts/Fasteners/Screw.FCStd".to_string()])
    }

    async fn list_documents(&self) -> FreeCadResult<Vec<String>> {
        self.record("list_documents")?;
        Ok(self.documents.clone())
    }

    async fn get_active_screenshot(&self, _view: ViewName) -> FreeCadResult<Option<String>> {
        self.record("get_active_screenshot")?;
        Ok(self.screenshot.clone())
    }
}
