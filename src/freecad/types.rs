//! Values exchanged with the FreeCAD addon.

use std::fmt;
use std::str::FromStr;

use serde::Deserialize;
use serde_json::{json, Map, Value};

use crate::freecad::FreeCadError;

/// Camera presets accepted by `get_active_screenshot`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ViewName {
    /// Isometric view (the addon's default).
    #[default]
    Isometric,
    /// Front view.
    Front,
    /// Top view.
    Top,
    /// Right view.
    Right,
    /// Back view.
    Back,
    /// Left view.
    Left,
    /// Bottom view.
    Bottom,
    /// Dimetric view.
    Dimetric,
    /// Trimetric view.
    Trimetric,
}

impl ViewName {
    /// Every preset, in the order they are advertised.
    pub const ALL: [Self; 9] = [
        Self::Isometric,
        Self::Front,
        Self::Top,
        Self::Right,
        Self::Back,
        Self::Left,
        Self::Bottom,
        Self::Dimetric,
        Self::Trimetric,
    ];

    /// Name as the addon expects it.
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Isometric => "Isometric",
            Self::Front => "Front",
            Self::Top => "Top",
            Self::Right => "Right",
            Self::Back => "Back",
            Self::Left => "Left",
            Self::Bottom => "Bottom",
            Self::Dimetric => "Dimetric",
            Self::Trimetric => "Trimetric",
        }
    }
}

impl fmt::Display for ViewName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ViewName {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|view| view.as_str().eq_ignore_ascii_case(s.trim()))
            .ok_or_else(|| {
                let names: Vec<_> = Self::ALL.iter().map(|v| v.as_str()).collect();
                format!("Invalid view '{s}'. Must be one of: {}", names.join(", "))
            })
    }
}

/// A document object to create.
#[derive(Debug, Clone, PartialEq)]
pub struct ObjectSpec {
    /// Object name, unique within the document.
    pub name: String,
    /// FreeCAD type id, e.g. `Part::Box` or `Fem::ConstraintFixed`.
    pub object_type: String,
    /// FEM analysis to add the object to.
    pub analysis: Option<String>,
    /// Initial property values.
    pub properties: Map<String, Value>,
}

impl ObjectSpec {
    /// The struct the addon's `create_object` expects.
    #[must_use]
    pub fn to_rpc_value(&self) -> Value {
        let mut value = json!({
            "Name": self.name,
            "Type": self.object_type,
            "Properties": self.properties,
        });
        if let Some(analysis) = &self.analysis {
            value["Analysis"] = Value::String(analysis.clone());
        }
        value
    }
}

/// Reply to a mutating call: a success flag plus optional details.
#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize)]
pub struct OperationReply {
    /// Whether the operation succeeded inside FreeCAD.
    #[serde(default)]
    pub success: bool,
    /// Error text when `success` is false.
    #[serde(default)]
    pub error: Option<String>,
    /// Free-form output, e.g. captured stdout of executed code.
    #[serde(default)]
    pub message: Option<String>,
    /// Name of the document that was created.
    #[serde(default)]
    pub document_name: Option<String>,
    /// Name of the object that was created.
    #[serde(default)]
    pub object_name: Option<String>,
}

impl OperationReply {
    /// Interprets the value returned by `method`.
    ///
    /// # Errors
    ///
    /// Returns [`FreeCadError::UnexpectedResult`] if the value is not a
    /// reply struct.
    pub fn from_value(method: &str, value: Value) -> Result<Self, FreeCadError> {
        serde_json::from_value(value).map_err(|e| FreeCadError::UnexpectedResult {
            method: method.to_string(),
            message: e.to_string(),
        })
    }

    /// The error text, or a placeholder when FreeCAD gave none.
    #[must_use]
    pub fn error_text(&self) -> &str {
        self.error.as_deref().unwrap_or("unknown error")
    }
}
