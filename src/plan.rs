//! Plan model: an ordered list of capability-tagged steps plus the declared
//! response shape. Plans are produced by the [`Planner`](crate::planner) and
//! are immutable once execution begins — the response shape never changes
//! based on intermediate results.

use std::fmt;

use serde::Serialize;
use serde_json::Value;

use crate::workspace::ArtifactKind;

/// The five things a step can do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Capability {
    Acquire,
    Transform,
    Compute,
    Visualize,
    Format,
}

impl Capability {
    pub fn as_str(&self) -> &'static str {
        match self {
            Capability::Acquire => "acquire",
            Capability::Transform => "transform",
            Capability::Compute => "compute",
            Capability::Visualize => "visualize",
            Capability::Format => "format",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "acquire" => Some(Capability::Acquire),
            "transform" => Some(Capability::Transform),
            "compute" => Some(Capability::Compute),
            "visualize" => Some(Capability::Visualize),
            "format" => Some(Capability::Format),
            _ => None,
        }
    }

    pub fn all() -> [Capability; 5] {
        [
            Capability::Acquire,
            Capability::Transform,
            Capability::Compute,
            Capability::Visualize,
            Capability::Format,
        ]
    }
}

impl fmt::Display for Capability {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The artifact a step promises to produce.
#[derive(Debug, Clone, Serialize)]
pub struct OutputDecl {
    pub name: String,
    pub kind: ArtifactKind,
}

/// One unit of work. `inputs` name artifacts that must already exist when the
/// step runs; `params` are capability-specific.
#[derive(Debug, Clone, Serialize)]
pub struct Step {
    pub id: String,
    pub capability: Capability,
    pub inputs: Vec<String>,
    pub params: Value,
    pub output: OutputDecl,
}

/// One position in a list- or object-shaped response. `source` names the
/// artifact that fills it.
#[derive(Debug, Clone, Serialize)]
pub struct Slot {
    pub source: String,
    pub kind: ArtifactKind,
}

/// A named field of an object-shaped response.
#[derive(Debug, Clone, Serialize)]
pub struct Field {
    pub name: String,
    pub source: String,
    pub kind: ArtifactKind,
}

/// The declared shape of the final response. Decided once by the planner,
/// never re-derived during execution.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "lowercase", tag = "shape")]
pub enum ResponseSpec {
    List { slots: Vec<Slot> },
    Object { fields: Vec<Field> },
    Text { source: String },
}

impl ResponseSpec {
    /// Every artifact name the response will pull from, in declaration order.
    pub fn sources(&self) -> Vec<&str> {
        match self {
            ResponseSpec::List { slots } => slots.iter().map(|s| s.source.as_str()).collect(),
            ResponseSpec::Object { fields } => fields.iter().map(|f| f.source.as_str()).collect(),
            ResponseSpec::Text { source } => vec![source.as_str()],
        }
    }

    pub fn slot_count(&self) -> usize {
        self.sources().len()
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct Plan {
    pub steps: Vec<Step>,
    pub response: ResponseSpec,
}

impl Plan {
    pub fn step(&self, id: &str) -> Option<&Step> {
        self.steps.iter().find(|s| s.id == id)
    }

    /// The step that produces a given artifact, if any.
    pub fn producer(&self, artifact: &str) -> Option<&Step> {
        self.steps.iter().find(|s| s.output.name == artifact)
    }
}
