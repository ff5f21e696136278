//! Error taxonomy. Step-level errors are information, not request failures —
//! they degrade the affected response slots and nothing else.

use thiserror::Error;

/// The plan the oracle returned could not be turned into a runnable plan.
#[derive(Debug, Error)]
pub enum PlanError {
    #[error("unknown capability: {0}")]
    UnknownCapability(String),

    #[error("step '{step}' references unknown artifact '{name}'")]
    UnknownArtifact { step: String, name: String },

    #[error("step '{step}' references artifact '{name}' before it is produced")]
    OutOfOrderInput { step: String, name: String },

    #[error("duplicate step id: {0}")]
    DuplicateStepId(String),

    #[error("duplicate output artifact: {0}")]
    DuplicateOutput(String),

    #[error("response slot references '{0}', which no step produces")]
    UnboundSlot(String),

    #[error("plan has no steps")]
    EmptyPlan,

    #[error("oracle error: {0}")]
    Oracle(String),

    #[error("malformed plan: {0}")]
    Malformed(String),
}

/// Acquisition failed.
#[derive(Debug, Error)]
pub enum FetchError {
    #[error("http error: {0}")]
    Http(String),

    #[error("http status {0}")]
    Status(u16),

    #[error("unsupported source: {0}")]
    UnsupportedSource(String),
}

/// A statistical operation could not be carried out.
#[derive(Debug, Error)]
pub enum ComputeError {
    #[error("unknown column: {0}")]
    UnknownColumn(String),

    #[error("column '{0}' is not numeric")]
    NonNumericColumn(String),

    #[error("column '{0}' is empty")]
    EmptyColumn(String),

    #[error("unknown operation: {0}")]
    UnknownOperation(String),

    #[error("missing parameter: {0}")]
    MissingParam(&'static str),

    #[error("no oracle configured for extraction")]
    OracleUnavailable,

    #[error("oracle error: {0}")]
    Oracle(String),
}

/// Plot construction failed.
#[derive(Debug, Error)]
pub enum RenderError {
    #[error("table has no rows to plot")]
    EmptyTable,

    #[error("unknown column: {0}")]
    UnknownColumn(String),

    #[error("unsupported chart kind: {0}")]
    UnsupportedChart(String),

    #[error("renderer backend error: {0}")]
    Backend(String),
}

/// Anything a capability handler can fail with. The executor records these
/// verbatim in the step's execution record.
#[derive(Debug, Error)]
pub enum StepError {
    #[error(transparent)]
    Fetch(#[from] FetchError),

    #[error(transparent)]
    Compute(#[from] ComputeError),

    #[error(transparent)]
    Render(#[from] RenderError),

    #[error("input '{0}' has wrong kind: expected {1}, got {2}")]
    WrongInputKind(String, &'static str, &'static str),

    #[error("step declared output kind {expected}, handler produced {got}")]
    WrongOutputKind { expected: &'static str, got: &'static str },

    #[error("missing parameter: {0}")]
    MissingParam(&'static str),

    #[error("no handler registered for capability: {0}")]
    NoHandler(String),

    #[error("{0}")]
    Invalid(String),
}
