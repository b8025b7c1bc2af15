//! Tool catalogue advertised through `tools/list`.

use serde::Serialize;
use serde_json::{json, Value};

use crate::freecad::ViewName;

/// A tool definition for tools/list response.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ToolDefinition {
    /// Unique tool name.
    pub name: String,
    /// Human-readable description.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// JSON Schema for the tool's input parameters.
    pub input_schema: Value,
}

impl ToolDefinition {
    fn new(name: &str, description: &str, input_schema: Value) -> Self {
        Self {
            name: name.to_string(),
            description: Some(description.to_string()),
            input_schema,
        }
    }
}

/// Returns the list of available tools.
#[must_use]
#[allow(clippy::too_many_lines)]
pub fn tool_definitions() -> Vec<ToolDefinition> {
    let views: Vec<&str> = ViewName::ALL.iter().map(|v| v.as_str()).collect();

    vec![
        // === Documents ===
        ToolDefinition::new(
            "create_document",
            "Create a new document in FreeCAD.",
            json!({
                "type": "object",
                "properties": {
                    "name": {
                        "type": "string",
                        "description": "Name of the document to create"
                    }
                },
                "required": ["name"]
            }),
        ),
        ToolDefinition::new(
            "list_documents",
            "List the names of all documents open in FreeCAD.",
            json!({ "type": "object", "properties": {} }),
        ),
        // === Objects ===
        ToolDefinition::new(
            "create_object",
            "Create a new object in a FreeCAD document. obj_type is a FreeCAD type id such as \
             Part::Box, Part::Cylinder, Part::Sphere, Sketcher::SketchObject, Draft::Wire or \
             Fem::AnalysisPython. obj_properties sets initial property values, e.g. \
             {\"Length\": 10, \"Width\": 5, \"Height\": 2, \"Placement\": {\"Base\": \
             {\"x\": 0, \"y\": 0, \"z\": 0}, \"Rotation\": {\"Axis\": {\"x\": 0, \"y\": 0, \
             \"z\": 1}, \"Angle\": 0}}, \"ViewObject\": {\"ShapeColor\": [0.5, 0.5, 0.5, 1.0]}}. \
             FEM constraints and meshes take analysis_name to be added to an analysis, and \
             reference other objects by name (\"References\": [{\"object_name\": \"Box\", \
             \"face\": \"Face1\"}]). Returns a screenshot of the result unless text-only \
             feedback is enabled.",
            json!({
                "type": "object",
                "properties": {
                    "doc_name": {
                        "type": "string",
                        "description": "Name of the document to create the object in"
                    },
                    "obj_type": {
                        "type": "string",
                        "description": "FreeCAD type id, e.g. Part::Box"
                    },
                    "obj_name": {
                        "type": "string",
                        "description": "Name of the object to create"
                    },
                    "analysis_name": {
                        "type": "string",
                        "description": "Optional: FEM analysis to add the object to"
                    },
                    "obj_properties": {
                        "type": "object",
                        "description": "Optional: initial property values"
                    }
                },
                "required": ["doc_name", "obj_type", "obj_name"]
            }),
        ),
        ToolDefinition::new(
            "edit_object",
            "Edit properties of an existing object in a FreeCAD document. Property values \
             follow the same format as create_object. Returns a screenshot of the result \
             unless text-only feedback is enabled.",
            json!({
                "type": "object",
                "properties": {
                    "doc_name": {
                        "type": "string",
                        "description": "Name of the document containing the object"
                    },
                    "obj_name": {
                        "type": "string",
                        "description": "Name of the object to edit"
                    },
                    "obj_properties": {
                        "type": "object",
                        "description": "Property values to set"
                    }
                },
                "required": ["doc_name", "obj_name", "obj_properties"]
            }),
        ),
        ToolDefinition::new(
            "delete_object",
            "Delete an object from a FreeCAD document.",
            json!({
                "type": "object",
                "properties": {
                    "doc_name": {
                        "type": "string",
                        "description": "Name of the document containing the object"
                    },
                    "obj_name": {
                        "type": "string",
                        "description": "Name of the object to delete"
                    }
                },
                "required": ["doc_name", "obj_name"]
            }),
        ),
        ToolDefinition::new(
            "get_objects",
            "Get every object in a FreeCAD document with its type and properties.",
            json!({
                "type": "object",
                "properties": {
                    "doc_name": {
                        "type": "string",
                        "description": "Name of the document"
                    }
                },
                "required": ["doc_name"]
            }),
        ),
        ToolDefinition::new(
            "get_object",
            "Get one object in a FreeCAD document with its type and properties.",
            json!({
                "type": "object",
                "properties": {
                    "doc_name": {
                        "type": "string",
                        "description": "Name of the document"
                    },
                    "obj_name": {
                        "type": "string",
                        "description": "Name of the object"
                    }
                },
                "required": ["doc_name", "obj_name"]
            }),
        ),
        // === Code ===
        ToolDefinition::new(
            "execute_code",
            "Execute arbitrary Python code inside FreeCAD. Use this for anything the other \
             tools cannot express. Output printed by the code is returned.",
            json!({
                "type": "object",
                "properties": {
                    "code": {
                        "type": "string",
                        "description": "Python source to execute"
                    }
                },
                "required": ["code"]
            }),
        ),
        // === View ===
        ToolDefinition::new(
            "get_view",
            "Get a screenshot of the active FreeCAD view from the given camera preset.",
            json!({
                "type": "object",
                "properties": {
                    "view_name": {
                        "type": "string",
                        "enum": views,
                        "description": "Camera preset"
                    }
                },
                "required": ["view_name"]
            }),
        ),
        // === Parts library ===
        ToolDefinition::new(
            "insert_part_from_library",
            "Insert a part from the FreeCAD parts library addon into the active document.",
            json!({
                "type": "object",
                "properties": {
                    "relative_path": {
                        "type": "string",
                        "description": "Path of the part relative to the library root, as listed by get_parts_list"
                    }
                },
                "required": ["relative_path"]
            }),
        ),
        ToolDefinition::new(
            "get_parts_list",
            "List the parts available in the FreeCAD parts library addon.",
            json!({ "type": "object", "properties": {} }),
        ),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tool_definitions_valid() {
        let tools = tool_definitions();
        assert_eq!(tools.len(), 11);

        for tool in &tools {
            assert!(!tool.name.is_empty());
            assert!(tool.description.is_some());
            assert!(tool.input_schema.is_object());
            assert_eq!(tool.input_schema["type"], "object");
        }
    }

    #[test]
    fn tool_names_unique() {
        let tools = tool_definitions();
        let mut names: Vec<_> = tools.iter().map(|t| t.name.as_str()).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), tools.len());
    }

    #[test]
    fn get_view_lists_every_preset() {
        let tools = tool_definitions();
        let get_view = tools.iter().find(|t| t.name == "get_view").unwrap();
        let presets = get_view.input_schema["properties"]["view_name"]["enum"]
            .as_array()
            .unwrap();
        assert_eq!(presets.len(), ViewName::ALL.len());
    }

    #[test]
    fn serialises_camel_case_schema() {
        let json = serde_json::to_value(&tool_definitions()[0]).unwrap();
        assert!(json.get("inputSchema").is_some());
    }
}
