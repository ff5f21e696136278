//! Step executor. Runs the plan in order against the capability handlers,
//! checking the budget before every step and racing every handler against
//! the supervisor. Appends exactly one execution record per planned step;
//! records are never rewritten.

use std::time::Duration;

use serde::Serialize;
use tokio::time::Instant;

use crate::consts::{DEFAULT_ASSEMBLER_RESERVE, DEFAULT_STEP_CAP};
use crate::deadline::{Phase, Supervisor};
use crate::error::StepError;
use crate::handlers::HandlerRegistry;
use crate::plan::{Plan, Step};
use crate::workspace::{Artifact, Workspace};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StepStatus {
    Ok,
    Failed,
    Skipped,
    TimedOut,
}

/// What happened to one step. Immutable once appended.
#[derive(Debug, Clone, Serialize)]
pub struct ExecutionRecord {
    pub step_id: String,
    pub status: StepStatus,
    /// Name of the artifact the step produced, when status is `Ok`.
    pub output: Option<String>,
    pub error: Option<String>,
    pub elapsed: Duration,
}

impl ExecutionRecord {
    fn ok(step: &Step, elapsed: Duration) -> Self {
        Self {
            step_id: step.id.clone(),
            status: StepStatus::Ok,
            output: Some(step.output.name.clone()),
            error: None,
            elapsed,
        }
    }

    fn failed(step: &Step, error: String, elapsed: Duration) -> Self {
        Self {
            step_id: step.id.clone(),
            status: StepStatus::Failed,
            output: None,
            error: Some(error),
            elapsed,
        }
    }

    fn skipped(step: &Step, reason: String) -> Self {
        Self {
            step_id: step.id.clone(),
            status: StepStatus::Skipped,
            output: None,
            error: Some(reason),
            elapsed: Duration::ZERO,
        }
    }

    fn timed_out(step: &Step, elapsed: Duration) -> Self {
        Self {
            step_id: step.id.clone(),
            status: StepStatus::TimedOut,
            output: None,
            error: Some("step timed out".to_string()),
            elapsed,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ExecutorConfig {
    /// Soft cap on one step, before budget apportioning.
    pub step_cap: Duration,
    /// Budget held back for the assembler.
    pub reserve: Duration,
}

impl Default for ExecutorConfig {
    fn default() -> Self {
        Self {
            step_cap: DEFAULT_STEP_CAP,
            reserve: DEFAULT_ASSEMBLER_RESERVE,
        }
    }
}

pub struct Executor {
    registry: HandlerRegistry,
    config: ExecutorConfig,
}

impl Executor {
    pub fn new(registry: HandlerRegistry, config: ExecutorConfig) -> Self {
        Self { registry, config }
    }

    /// Run every step of the plan, in order. Always returns one record per
    /// step, whatever happened.
    pub async fn execute(
        &self,
        plan: &Plan,
        workspace: &mut Workspace,
        supervisor: &Supervisor,
    ) -> Vec<ExecutionRecord> {
        let mut records = Vec::with_capacity(plan.steps.len());
        let mut out_of_budget = false;

        for step in &plan.steps {
            if out_of_budget || supervisor.expired() || supervisor.remaining() <= self.config.reserve
            {
                // stopping early IS the deadline biting, even when the timer
                // itself has not fired yet
                supervisor.expire();
                out_of_budget = true;
                records.push(ExecutionRecord::skipped(step, "deadline exhausted".to_string()));
                continue;
            }

            // cascading skip: an input that was never produced
            if let Some(missing) = step.inputs.iter().find(|i| !workspace.contains(i)) {
                records.push(ExecutionRecord::skipped(
                    step,
                    format!("input '{missing}' unavailable"),
                ));
                continue;
            }

            let record = self.run_step(step, workspace, supervisor).await;
            tracing::info!(
                step = %step.id,
                capability = %step.capability,
                status = ?record.status,
                elapsed_ms = record.elapsed.as_millis() as u64,
                "step finished"
            );
            records.push(record);
        }

        records
    }

    async fn run_step(
        &self,
        step: &Step,
        workspace: &mut Workspace,
        supervisor: &Supervisor,
    ) -> ExecutionRecord {
        let started = Instant::now();

        let Some(handler) = self.registry.get(step.capability) else {
            return ExecutionRecord::failed(
                step,
                StepError::NoHandler(step.capability.to_string()).to_string(),
                started.elapsed(),
            );
        };

        let allowance = self
            .config
            .step_cap
            .min(supervisor.remaining().saturating_sub(self.config.reserve));

        enum Outcome {
            Finished(Result<crate::workspace::Payload, StepError>),
            OutOfTime,
        }

        let mut phases = supervisor.subscribe();
        let outcome = tokio::select! {
            result = tokio::time::timeout(allowance, handler.run(step, workspace)) => match result {
                Ok(finished) => Outcome::Finished(finished),
                Err(_) => Outcome::OutOfTime,
            },
            // the supervisor expiring cancels the step at this await point
            _ = phases.wait_for(|p| *p != Phase::Running) => Outcome::OutOfTime,
        };

        let elapsed = started.elapsed();
        match outcome {
            Outcome::OutOfTime => ExecutionRecord::timed_out(step, elapsed),
            Outcome::Finished(Err(e)) => ExecutionRecord::failed(step, e.to_string(), elapsed),
            Outcome::Finished(Ok(payload)) => {
                if payload.kind() != step.output.kind {
                    return ExecutionRecord::failed(
                        step,
                        StepError::WrongOutputKind {
                            expected: step.output.kind.as_str(),
                            got: payload.kind().as_str(),
                        }
                        .to_string(),
                        elapsed,
                    );
                }
                let artifact = Artifact::from_step(payload, step.id.clone());
                match workspace.insert(step.output.name.clone(), artifact) {
                    Ok(()) => ExecutionRecord::ok(step, elapsed),
                    Err(e) => ExecutionRecord::failed(step, e, elapsed),
                }
            }
        }
    }
}
