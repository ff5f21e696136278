//! Result assembler. Maps the execution record log onto the declared
//! response shape. Slots whose step never delivered get a documented
//! sentinel instead of disappearing — the shape survives partial runs.

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD as BASE64;
use serde::Serialize;
use serde_json::{Value, json};

use crate::executor::{ExecutionRecord, StepStatus};
use crate::plan::{Plan, ResponseSpec};
use crate::workspace::{Artifact, ArtifactKind, Payload, Workspace};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum RunStatus {
    Complete,
    Partial,
    Error,
}

/// The response envelope. `value` has exactly the shape the plan declared;
/// `truncated` marks a supervisor-forced stop.
#[derive(Debug, Clone, Serialize)]
pub struct Response {
    pub status: RunStatus,
    pub truncated: bool,
    pub value: Value,
}

impl Response {
    /// The fixed shape for catastrophic pre-plan failures.
    pub fn error(message: impl Into<String>) -> Self {
        Self {
            status: RunStatus::Error,
            truncated: false,
            value: json!({ "error": message.into() }),
        }
    }
}

/// Build the response. Ordering of list slots follows the plan declaration,
/// not execution order.
pub fn assemble(
    plan: &Plan,
    workspace: &Workspace,
    records: &[ExecutionRecord],
    truncated: bool,
) -> Response {
    let mut any_missing = false;

    let mut fill = |source: &str, kind: ArtifactKind| -> Value {
        match lookup(plan, workspace, records, source) {
            Ok(artifact) => wire_value(artifact),
            Err(reason) => {
                any_missing = true;
                sentinel(kind, &reason)
            }
        }
    };

    let value = match &plan.response {
        ResponseSpec::List { slots } => {
            let mut values: Vec<Value> = slots
                .iter()
                .map(|slot| fill(&slot.source, slot.kind))
                .collect();
            // a single-slot list answers with the bare value
            if values.len() == 1 {
                values.pop().unwrap()
            } else {
                Value::Array(values)
            }
        }
        ResponseSpec::Object { fields } => Value::Object(
            fields
                .iter()
                .map(|field| (field.name.clone(), fill(&field.source, field.kind)))
                .collect(),
        ),
        ResponseSpec::Text { source } => fill(source, ArtifactKind::Text),
    };

    let status = if any_missing {
        RunStatus::Partial
    } else {
        RunStatus::Complete
    };

    Response {
        status,
        truncated,
        value,
    }
}

/// The artifact for a slot, or the reason it is unavailable.
fn lookup<'a>(
    plan: &Plan,
    workspace: &'a Workspace,
    records: &[ExecutionRecord],
    source: &str,
) -> Result<&'a Artifact, String> {
    if let Some(artifact) = workspace.get(source) {
        return Ok(artifact);
    }

    // the slot's producing step must have failed, timed out, or been skipped
    let producer = plan.producer(source);
    let record = producer.and_then(|step| records.iter().find(|r| r.step_id == step.id));
    Err(match record {
        Some(r) => match r.status {
            StepStatus::TimedOut => "timed out".to_string(),
            StepStatus::Skipped => r.error.clone().unwrap_or_else(|| "skipped".to_string()),
            _ => r.error.clone().unwrap_or_else(|| "failed".to_string()),
        },
        None => "never produced".to_string(),
    })
}

/// Convert an artifact to its wire representation.
fn wire_value(artifact: &Artifact) -> Value {
    match &artifact.payload {
        Payload::Scalar(n) => Value::Number(n.clone()),
        Payload::Text(t) => Value::String(t.clone()),
        Payload::Json(v) => v.clone(),
        Payload::Table(t) => json!({ "columns": t.columns, "rows": t.rows }),
        Payload::Image(i) => Value::String(format!(
            "data:{};base64,{}",
            i.format.mime(),
            BASE64.encode(&i.bytes)
        )),
    }
}

/// What a dead slot looks like: `null` for structured kinds, an explanatory
/// string for text.
fn sentinel(kind: ArtifactKind, reason: &str) -> Value {
    match kind {
        ArtifactKind::Text => Value::String(format!("<unavailable: {reason}>")),
        _ => Value::Null,
    }
}
