//! Prompt catalogue advertised through `prompts/list`.

use serde::Serialize;
use serde_json::{json, Value};

/// A prompt definition for prompts/list response.
#[derive(Debug, Clone, Serialize)]
pub struct PromptDefinition {
    /// Unique prompt name.
    pub name: &'static str,
    /// Human-readable description.
    pub description: &'static str,
}

const ASSET_CREATION_STRATEGY: &str = "\
Asset creation strategy for FreeCAD via MCP

Before building anything:
- Call list_documents to see what is open, and get_objects to inspect a document \
before changing it.
- Call get_parts_list and prefer insert_part_from_library when a suitable standard \
part (fasteners, bearings, profiles) already exists.

Building:
- Prefer create_object with native FreeCAD types (Part::Box, Part::Cylinder, \
Part::Cone, Part::Sphere, Part::Torus) and boolean types (Part::Cut, Part::Fuse, \
Part::Common) over raw Python.
- Use execute_code only for operations the object tools cannot express, such as \
sketches with constraints, lofts or loops over many objects.
- Give every object a descriptive name; later edits and booleans refer to objects \
by name.
- Position objects through the Placement property rather than moving geometry.

Checking:
- Use get_view after significant changes and compare the screenshot against the \
intended design; switch presets (Front, Top, Right) to check alignment.
- Use get_object to confirm property values that are hard to see.
";

/// Returns the list of available prompts.
#[must_use]
pub fn prompt_definitions() -> Vec<PromptDefinition> {
    vec![PromptDefinition {
        name: "asset_creation_strategy",
        description: "Guidance for creating CAD assets in FreeCAD with these tools",
    }]
}

/// Renders the `prompts/get` result for `name`.
#[must_use]
pub fn get_prompt(name: &str) -> Option<Value> {
    let definition = prompt_definitions().into_iter().find(|p| p.name == name)?;
    let text = match definition.name {
        "asset_creation_strategy" => ASSET_CREATION_STRATEGY,
        _ => return None,
    };

    Some(json!({
        "description": definition.description,
        "messages": [{
            "role": "user",
            "content": { "type": "text", "text": text }
        }]
    }))
}
