pub mod acquire;
pub mod compute;
pub mod format;
pub mod transform;
pub mod visualize;

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;

use crate::error::StepError;
use crate::plan::{Capability, Step};
use crate::workspace::{Payload, Workspace};

/// Something the executor can run a step with. One handler per capability;
/// concrete implementations are swappable without touching the executor.
#[async_trait]
pub trait Handler: Send + Sync {
    fn capability(&self) -> Capability;
    async fn run(&self, step: &Step, workspace: &Workspace) -> Result<Payload, StepError>;
}

/// Holds the handler for each capability. Built once at startup, read-only
/// during execution.
pub struct HandlerRegistry {
    handlers: HashMap<Capability, Arc<dyn Handler>>,
}

impl HandlerRegistry {
    pub fn new() -> Self {
        Self {
            handlers: HashMap::new(),
        }
    }

    pub fn register(&mut self, handler: Arc<dyn Handler>) {
        self.handlers.insert(handler.capability(), handler);
    }

    pub fn get(&self, capability: Capability) -> Option<Arc<dyn Handler>> {
        self.handlers.get(&capability).cloned()
    }

    pub fn capabilities(&self) -> Vec<Capability> {
        self.handlers.keys().copied().collect()
    }
}

impl Default for HandlerRegistry {
    fn default() -> Self {
        Self::new()
    }
}

/// The first input artifact of a step, viewed as a table. JSON arrays of
/// uniform objects coerce; anything else is a kind error.
pub(crate) fn table_input<'a>(
    step: &Step,
    workspace: &'a Workspace,
) -> Result<std::borrow::Cow<'a, crate::table::Table>, StepError> {
    use std::borrow::Cow;

    let name = step
        .inputs
        .first()
        .ok_or(StepError::MissingParam("inputs"))?;
    let artifact = workspace
        .get(name)
        .ok_or_else(|| StepError::Invalid(format!("input '{name}' not in workspace")))?;

    match &artifact.payload {
        Payload::Table(t) => Ok(Cow::Borrowed(t)),
        Payload::Json(serde_json::Value::Array(items)) => crate::table::Table::from_json_rows(items)
            .map(Cow::Owned)
            .ok_or_else(|| {
                StepError::WrongInputKind(name.clone(), "table", "json")
            }),
        other => Err(StepError::WrongInputKind(
            name.clone(),
            "table",
            other.kind().as_str(),
        )),
    }
}
