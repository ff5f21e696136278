//! The Workspace: named, typed artifacts for one request. Written by the
//! input normalizer and the executor, read by everyone. Append-only so
//! provenance stays traceable; dropped with the request.

use std::collections::HashMap;
use std::fmt;

use serde::Serialize;
use serde_json::Value;
use sha2::{Digest, Sha256};

use crate::image::ImageData;
use crate::table::Table;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    Table,
    Json,
    Image,
    Scalar,
    Text,
}

impl ArtifactKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            ArtifactKind::Table => "table",
            ArtifactKind::Json => "json",
            ArtifactKind::Image => "image",
            ArtifactKind::Scalar => "scalar",
            ArtifactKind::Text => "text",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "table" => Some(ArtifactKind::Table),
            "json" => Some(ArtifactKind::Json),
            "image" => Some(ArtifactKind::Image),
            "scalar" => Some(ArtifactKind::Scalar),
            "text" => Some(ArtifactKind::Text),
            _ => None,
        }
    }
}

impl fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What an artifact actually holds. The kind is implied by the variant.
#[derive(Debug, Clone, PartialEq)]
pub enum Payload {
    Table(Table),
    Json(Value),
    Image(ImageData),
    Scalar(serde_json::Number),
    Text(String),
}

impl Payload {
    pub fn kind(&self) -> ArtifactKind {
        match self {
            Payload::Table(_) => ArtifactKind::Table,
            Payload::Json(_) => ArtifactKind::Json,
            Payload::Image(_) => ArtifactKind::Image,
            Payload::Scalar(_) => ArtifactKind::Scalar,
            Payload::Text(_) => ArtifactKind::Text,
        }
    }

    pub fn as_table(&self) -> Option<&Table> {
        match self {
            Payload::Table(t) => Some(t),
            _ => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Payload::Text(t) => Some(t),
            _ => None,
        }
    }
}

/// Where an artifact came from: the request itself, or one of the plan's
/// steps.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Provenance {
    Input,
    Step(String),
}

#[derive(Debug, Clone)]
pub struct Artifact {
    pub payload: Payload,
    pub provenance: Provenance,
    digest: String,
}

impl Artifact {
    pub fn new(payload: Payload, provenance: Provenance) -> Self {
        let digest = digest_payload(&payload);
        Self {
            payload,
            provenance,
            digest,
        }
    }

    pub fn input(payload: Payload) -> Self {
        Self::new(payload, Provenance::Input)
    }

    pub fn from_step(payload: Payload, step_id: impl Into<String>) -> Self {
        Self::new(payload, Provenance::Step(step_id.into()))
    }

    pub fn kind(&self) -> ArtifactKind {
        self.payload.kind()
    }

    /// Content fingerprint. Equal payloads hash equal, so re-running a
    /// deterministic step is detectable as a no-op.
    pub fn digest(&self) -> &str {
        &self.digest
    }
}

/// Hash the payload through a canonical byte form: kind tag, then content.
fn digest_payload(payload: &Payload) -> String {
    let mut hasher = Sha256::new();
    hasher.update(payload.kind().as_str().as_bytes());
    hasher.update([0u8]);
    match payload {
        Payload::Table(t) => {
            // serialization is stable: column order is part of the table
            hasher.update(serde_json::to_vec(t).unwrap_or_default());
        }
        Payload::Json(v) => hasher.update(v.to_string().as_bytes()),
        Payload::Image(i) => hasher.update(&i.bytes),
        Payload::Scalar(n) => hasher.update(n.to_string().as_bytes()),
        Payload::Text(t) => hasher.update(t.as_bytes()),
    }
    let out = hasher.finalize();
    out.iter().map(|b| format!("{b:02x}")).collect()
}

/// One line of the manifest handed to the planner's oracle.
#[derive(Debug, Clone, Serialize)]
pub struct ManifestEntry {
    pub name: String,
    pub kind: ArtifactKind,
    pub summary: String,
}

#[derive(Debug, Default)]
pub struct Workspace {
    entries: HashMap<String, Artifact>,
    order: Vec<String>,
}

impl Workspace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a new artifact. Overwriting is not a thing — a name collision
    /// is a bug in the plan and is reported as such.
    pub fn insert(&mut self, name: impl Into<String>, artifact: Artifact) -> Result<(), String> {
        let name = name.into();
        if self.entries.contains_key(&name) {
            return Err(format!("artifact '{name}' already exists"));
        }
        self.order.push(name.clone());
        self.entries.insert(name, artifact);
        Ok(())
    }

    pub fn get(&self, name: &str) -> Option<&Artifact> {
        self.entries.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Artifact names in insertion order.
    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.order.iter().map(String::as_str)
    }

    /// The manifest the planner shows the oracle: name, kind, short preview.
    pub fn manifest(&self) -> Vec<ManifestEntry> {
        self.order
            .iter()
            .filter_map(|name| {
                let artifact = self.entries.get(name)?;
                Some(ManifestEntry {
                    name: name.clone(),
                    kind: artifact.kind(),
                    summary: summarize(&artifact.payload),
                })
            })
            .collect()
    }
}

fn summarize(payload: &Payload) -> String {
    match payload {
        Payload::Table(t) => format!(
            "{} rows, columns: {}",
            t.len(),
            t.columns.join(", ")
        ),
        Payload::Json(v) => preview(&v.to_string()),
        Payload::Image(i) => format!("{} {}x{}", i.format, i.width, i.height),
        Payload::Scalar(n) => n.to_string(),
        Payload::Text(t) => preview(t),
    }
}

fn preview(text: &str) -> String {
    let max = crate::consts::MANIFEST_PREVIEW_CHARS;
    if text.chars().count() <= max {
        return text.to_string();
    }
    let truncated: String = text.chars().take(max).collect();
    format!("{truncated}…")
}
