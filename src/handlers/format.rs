//! FORMAT: the last-mile coercions. Emits fixed text (the fallback plan
//! rides on this) or converts an input artifact to the step's declared kind.

use async_trait::async_trait;
use serde_json::Number;

use super::Handler;
use crate::error::StepError;
use crate::plan::{Capability, Step};
use crate::workspace::{ArtifactKind, Payload, Workspace};

pub struct FormatHandler;

#[async_trait]
impl Handler for FormatHandler {
    fn capability(&self) -> Capability {
        Capability::Format
    }

    async fn run(&self, step: &Step, workspace: &Workspace) -> Result<Payload, StepError> {
        if let Some(text) = step.params.get("text").and_then(|v| v.as_str()) {
            return Ok(Payload::Text(text.to_string()));
        }

        let name = step
            .inputs
            .first()
            .ok_or(StepError::MissingParam("text or inputs"))?;
        let artifact = workspace
            .get(name)
            .ok_or_else(|| StepError::Invalid(format!("input '{name}' not in workspace")))?;

        coerce(&artifact.payload, step.output.kind)
            .ok_or_else(|| StepError::WrongOutputKind {
                expected: step.output.kind.as_str(),
                got: artifact.kind().as_str(),
            })
    }
}

/// Lossless-ish conversions between kinds. `None` when there is no sensible
/// path (images never coerce).
fn coerce(payload: &Payload, target: ArtifactKind) -> Option<Payload> {
    if payload.kind() == target {
        return Some(payload.clone());
    }
    match (payload, target) {
        (Payload::Scalar(n), ArtifactKind::Text) => Some(Payload::Text(n.to_string())),
        (Payload::Text(t), ArtifactKind::Scalar) => {
            let t = t.trim();
            if let Ok(i) = t.parse::<i64>() {
                return Some(Payload::Scalar(Number::from(i)));
            }
            t.parse::<f64>()
                .ok()
                .and_then(Number::from_f64)
                .map(Payload::Scalar)
        }
        (Payload::Table(t), ArtifactKind::Json) => {
            serde_json::to_value(t).ok().map(Payload::Json)
        }
        (Payload::Json(v), ArtifactKind::Text) => {
            serde_json::to_string_pretty(v).ok().map(Payload::Text)
        }
        (Payload::Scalar(n), ArtifactKind::Json) => {
            Some(Payload::Json(serde_json::Value::Number(n.clone())))
        }
        _ => None,
    }
}
