//! Input normalizer: turns the uploaded parts of one request into a
//! [`Workspace`] of named, typed artifacts. Best-effort by contract —
//! anything unrecognized or corrupt lands as a raw text artifact instead of
//! failing the request. No network, no oracle.

use serde_json::Value;

use crate::image;
use crate::table::Table;
use crate::workspace::{Artifact, Payload, Workspace};

/// One named part of the inbound submission (everything except the task
/// description itself).
#[derive(Debug, Clone)]
pub struct UploadedPart {
    pub name: String,
    pub bytes: Vec<u8>,
}

impl UploadedPart {
    pub fn new(name: impl Into<String>, bytes: Vec<u8>) -> Self {
        Self {
            name: name.into(),
            bytes,
        }
    }
}

/// Build the request workspace. One artifact per part, kinds inferred from
/// content. Duplicate part names get a numeric suffix rather than clobbering
/// the earlier part.
pub fn normalize(parts: Vec<UploadedPart>) -> Workspace {
    let mut workspace = Workspace::new();
    for part in parts {
        let payload = sniff_payload(&part.bytes);
        let kind = payload.kind();

        let mut name = part.name.clone();
        let mut suffix = 2;
        while workspace.contains(&name) {
            name = format!("{}_{suffix}", part.name);
            suffix += 1;
        }

        tracing::debug!(artifact = %name, kind = %kind, bytes = part.bytes.len(), "normalized input part");
        // insert cannot fail: the name was just disambiguated
        let _ = workspace.insert(name, Artifact::input(payload));
    }
    workspace
}

/// Infer the payload kind from raw bytes: image magic, then JSON, then
/// delimited text, then raw text fallback.
pub fn sniff_payload(bytes: &[u8]) -> Payload {
    if let Some(image) = image::sniff(bytes) {
        return Payload::Image(image);
    }

    let Ok(text) = std::str::from_utf8(bytes) else {
        // binary junk, keep it inspectable
        return Payload::Text(String::from_utf8_lossy(bytes).into_owned());
    };

    if let Ok(value) = serde_json::from_str::<Value>(text) {
        if let Value::Array(items) = &value
            && let Some(table) = Table::from_json_rows(items)
        {
            return Payload::Table(table);
        }
        // scalars parsed out of bare text are still text; only real JSON
        // structure counts
        if value.is_object() || value.is_array() {
            return Payload::Json(value);
        }
    }

    if let Some(table) = Table::parse_delimited(text) {
        return Payload::Table(table);
    }

    Payload::Text(text.to_string())
}
