//! Task planner. Hands language understanding to the [`Oracle`], then
//! enforces the plan contract locally: known capabilities only, linear
//! forward-referencing step order, a response shape fixed before execution.
//! A malformed oracle plan gets one corrective retry, then the fallback echo
//! plan — planning never produces "no response at all".

use std::sync::Arc;
use std::time::Duration;

use serde::Deserialize;
use serde_json::{Value, json};

use crate::consts::UNINTERPRETABLE_TASK;
use crate::deadline::Supervisor;
use crate::error::PlanError;
use crate::oracle::{Oracle, OracleRequest, extract_json};
use crate::plan::{Capability, Field, OutputDecl, Plan, ResponseSpec, Slot, Step};
use crate::workspace::{ArtifactKind, ManifestEntry, Workspace};

pub struct Planner {
    oracle: Arc<dyn Oracle>,
    /// Budget held back from every oracle allowance so execution and
    /// assembly always get a turn.
    reserve: Duration,
}

impl Planner {
    pub fn new(oracle: Arc<dyn Oracle>, reserve: Duration) -> Self {
        Self { oracle, reserve }
    }

    /// Produce a plan for the task. Infallible by design: oracle trouble
    /// degrades to the echo plan, and every oracle call is clamped to half
    /// the remaining budget so a retry still fits before the deadline.
    pub async fn plan(&self, task: &str, workspace: &Workspace, supervisor: &Supervisor) -> Plan {
        let task = task.trim();
        if task.is_empty() {
            tracing::info!("empty task description, using fallback plan");
            return echo_plan(UNINTERPRETABLE_TASK);
        }

        let manifest = workspace.manifest();
        match self
            .attempt(task, &manifest, workspace, None, supervisor)
            .await
        {
            Ok(plan) => plan,
            Err(first_err) => {
                tracing::warn!(error = %first_err, "plan rejected, retrying with correction");
                match self
                    .attempt(task, &manifest, workspace, Some(&first_err), supervisor)
                    .await
                {
                    Ok(plan) => plan,
                    Err(second_err) => {
                        tracing::warn!(error = %second_err, "retry rejected, falling back to echo plan");
                        echo_plan(task)
                    }
                }
            }
        }
    }

    async fn attempt(
        &self,
        task: &str,
        manifest: &[ManifestEntry],
        workspace: &Workspace,
        correction: Option<&PlanError>,
        supervisor: &Supervisor,
    ) -> Result<Plan, PlanError> {
        let request = OracleRequest {
            system: system_prompt(),
            user: user_prompt(task, manifest, correction),
        };

        // half of what's left, so the corrective retry has room too
        let allowance = supervisor.remaining().saturating_sub(self.reserve) / 2;
        if allowance.is_zero() {
            return Err(PlanError::Oracle("no budget left for planning".to_string()));
        }

        let raw = tokio::time::timeout(allowance, self.oracle.complete(&request))
            .await
            .map_err(|_| PlanError::Oracle("oracle call timed out".to_string()))?
            .map_err(|e| PlanError::Oracle(e.to_string()))?;

        let parsed: RawPlan = serde_json::from_str(extract_json(&raw))
            .map_err(|e| PlanError::Malformed(e.to_string()))?;

        validate(parsed, workspace)
    }
}

/// The minimal single-step plan: one format step that echoes fixed text.
pub fn echo_plan(text: &str) -> Plan {
    Plan {
        steps: vec![Step {
            id: "echo".to_string(),
            capability: Capability::Format,
            inputs: vec![],
            params: json!({ "text": text }),
            output: OutputDecl {
                name: "answer".to_string(),
                kind: ArtifactKind::Text,
            },
        }],
        response: ResponseSpec::Text {
            source: "answer".to_string(),
        },
    }
}

// --- wire format, as loose as the oracle is ---

#[derive(Debug, Deserialize)]
struct RawPlan {
    steps: Vec<RawStep>,
    response: RawResponse,
}

#[derive(Debug, Deserialize)]
struct RawStep {
    id: String,
    capability: String,
    #[serde(default)]
    inputs: Vec<String>,
    #[serde(default)]
    params: Value,
    output: RawOutput,
}

#[derive(Debug, Deserialize)]
struct RawOutput {
    name: String,
    kind: String,
}

#[derive(Debug, Deserialize)]
struct RawResponse {
    shape: String,
    #[serde(default)]
    slots: Vec<RawSlot>,
    #[serde(default)]
    fields: Vec<RawField>,
    #[serde(default)]
    source: Option<String>,
}

#[derive(Debug, Deserialize)]
struct RawSlot {
    source: String,
    kind: String,
}

#[derive(Debug, Deserialize)]
struct RawField {
    name: String,
    source: String,
    kind: String,
}

/// Enforce the plan contract. This is the typed boundary between the
/// untrusted oracle and the executor.
fn validate(raw: RawPlan, workspace: &Workspace) -> Result<Plan, PlanError> {
    if raw.steps.is_empty() {
        return Err(PlanError::EmptyPlan);
    }

    let mut steps = Vec::with_capacity(raw.steps.len());
    let mut produced: Vec<String> = Vec::new();
    let all_outputs: Vec<&str> = raw.steps.iter().map(|s| s.output.name.as_str()).collect();

    for raw_step in &raw.steps {
        if steps.iter().any(|s: &Step| s.id == raw_step.id) {
            return Err(PlanError::DuplicateStepId(raw_step.id.clone()));
        }

        let capability = Capability::parse(&raw_step.capability)
            .ok_or_else(|| PlanError::UnknownCapability(raw_step.capability.clone()))?;

        let output_kind = ArtifactKind::parse(&raw_step.output.kind).ok_or_else(|| {
            PlanError::Malformed(format!(
                "step '{}' declares unknown output kind '{}'",
                raw_step.id, raw_step.output.kind
            ))
        })?;

        if workspace.contains(&raw_step.output.name) || produced.contains(&raw_step.output.name) {
            return Err(PlanError::DuplicateOutput(raw_step.output.name.clone()));
        }

        for input in &raw_step.inputs {
            if workspace.contains(input) || produced.iter().any(|p| p == input) {
                continue;
            }
            if all_outputs.contains(&input.as_str()) {
                return Err(PlanError::OutOfOrderInput {
                    step: raw_step.id.clone(),
                    name: input.clone(),
                });
            }
            return Err(PlanError::UnknownArtifact {
                step: raw_step.id.clone(),
                name: input.clone(),
            });
        }

        produced.push(raw_step.output.name.clone());
        steps.push(Step {
            id: raw_step.id.clone(),
            capability,
            inputs: raw_step.inputs.clone(),
            params: raw_step.params.clone(),
            output: OutputDecl {
                name: raw_step.output.name.clone(),
                kind: output_kind,
            },
        });
    }

    let response = validate_response(&raw.response, &produced)?;

    Ok(Plan { steps, response })
}

fn validate_response(raw: &RawResponse, produced: &[String]) -> Result<ResponseSpec, PlanError> {
    let check = |source: &str| -> Result<(), PlanError> {
        if produced.iter().any(|p| p == source) {
            Ok(())
        } else {
            Err(PlanError::UnboundSlot(source.to_string()))
        }
    };

    let kind_of = |s: &str| -> Result<ArtifactKind, PlanError> {
        ArtifactKind::parse(s)
            .ok_or_else(|| PlanError::Malformed(format!("unknown slot kind '{s}'")))
    };

    match raw.shape.as_str() {
        "list" => {
            if raw.slots.is_empty() {
                return Err(PlanError::Malformed("list response with no slots".to_string()));
            }
            let slots = raw
                .slots
                .iter()
                .map(|s| {
                    check(&s.source)?;
                    Ok(Slot {
                        source: s.source.clone(),
                        kind: kind_of(&s.kind)?,
                    })
                })
                .collect::<Result<Vec<_>, PlanError>>()?;
            Ok(ResponseSpec::List { slots })
        }
        "object" => {
            if raw.fields.is_empty() {
                return Err(PlanError::Malformed("object response with no fields".to_string()));
            }
            let fields = raw
                .fields
                .iter()
                .map(|f| {
                    check(&f.source)?;
                    Ok(Field {
                        name: f.name.clone(),
                        source: f.source.clone(),
                        kind: kind_of(&f.kind)?,
                    })
                })
                .collect::<Result<Vec<_>, PlanError>>()?;
            Ok(ResponseSpec::Object { fields })
        }
        "text" => {
            let source = raw
                .source
                .as_deref()
                .ok_or_else(|| PlanError::Malformed("text response without source".to_string()))?;
            check(source)?;
            Ok(ResponseSpec::Text {
                source: source.to_string(),
            })
        }
        other => Err(PlanError::Malformed(format!("unknown response shape '{other}'"))),
    }
}

// --- prompts ---

fn system_prompt() -> String {
    r#"You are a planner for a data-analysis engine. You turn one task
description plus a manifest of available data artifacts into a linear plan of
steps.

Capabilities and their params:
- acquire: fetch external data. params: {"source": "<url>"}
- transform: reshape a table. params: {"op": "filter", "column": c, "cmp": "lt|le|gt|ge|eq|ne", "value": v} or {"op": "select", "columns": [..]} or {"op": "limit", "count": n} or {"op": "sort", "column": c, "descending": bool}
- compute: derive a value. params: {"op": "count"} or {"op": "sum|mean|min|max", "column": c} or {"op": "correlation", "columns": [a, b]} or {"op": "extract", "prompt": "<what to pull out of a text artifact>"}
- visualize: draw a chart from a table. params: {"chart": "scatter|line|bar", "x": col, "y": col, "width": px, "height": px}
- format: emit fixed text ({"text": "..."}) or coerce an input artifact ({"op": "coerce"})

## How to respond

Respond with ONLY valid JSON of this shape:
{
  "steps": [
    {"id": "s1", "capability": "transform", "inputs": ["films"], "params": {"op": "filter", "column": "Year", "cmp": "lt", "value": 2000}, "output": {"name": "old_films", "kind": "table"}},
    {"id": "s2", "capability": "compute", "inputs": ["old_films"], "params": {"op": "count"}, "output": {"name": "n", "kind": "scalar"}}
  ],
  "response": {"shape": "list", "slots": [{"source": "n", "kind": "scalar"}]}
}

Response shapes: {"shape": "list", "slots": [{"source": .., "kind": ..}]},
{"shape": "object", "fields": [{"name": .., "source": .., "kind": ..}]}, or
{"shape": "text", "source": ..}.

## Rules
- Output JSON only. No markdown, no extra text.
- Steps run in the given order; a step may only read input artifacts or outputs of EARLIER steps.
- capability must be one of: acquire, transform, compute, visualize, format.
- output kinds: table, json, image, scalar, text.
- Every response slot must name some step's output.
- Keep plans short; do not add steps the task does not need."#
        .to_string()
}

fn user_prompt(task: &str, manifest: &[ManifestEntry], correction: Option<&PlanError>) -> String {
    let mut user = format!("Task: {task}\n\nAvailable artifacts:\n");
    if manifest.is_empty() {
        user.push_str("(none)\n");
    }
    for entry in manifest {
        user.push_str(&format!("- {} ({}): {}\n", entry.name, entry.kind, entry.summary));
    }
    if let Some(error) = correction {
        user.push_str(&format!(
            "\nYour previous plan was rejected: {error}\nReturn a corrected plan as JSON only.\n"
        ));
    }
    user
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::mock::{MockOracle, NullOracle};
    use crate::workspace::{Artifact, Payload};

    fn supervisor() -> Supervisor {
        Supervisor::start(Duration::from_secs(60), Duration::from_secs(1))
    }

    fn planner_with(oracle: Arc<dyn Oracle>) -> Planner {
        Planner::new(oracle, Duration::from_secs(1))
    }

    fn films_workspace() -> Workspace {
        let mut ws = Workspace::new();
        let table =
            crate::table::Table::parse_delimited("Year,Title\n1995,Heat\n2001,Amelie").unwrap();
        ws.insert("films", Artifact::input(Payload::Table(table)))
            .unwrap();
        ws
    }

    fn count_plan_json() -> String {
        r#"{
            "steps": [
                {"id": "s1", "capability": "compute", "inputs": ["films"], "params": {"op": "count"}, "output": {"name": "n", "kind": "scalar"}}
            ],
            "response": {"shape": "list", "slots": [{"source": "n", "kind": "scalar"}]}
        }"#
        .to_string()
    }

    async fn plan_with(oracle: MockOracle, task: &str) -> Plan {
        let ws = films_workspace();
        let planner = planner_with(Arc::new(oracle));
        planner.plan(task, &ws, &supervisor()).await
    }

    #[tokio::test]
    async fn valid_plan_passes_through() {
        let plan = plan_with(MockOracle::single(count_plan_json()), "count films").await;
        assert_eq!(plan.steps.len(), 1);
        assert_eq!(plan.steps[0].capability, Capability::Compute);
        assert_eq!(plan.response.slot_count(), 1);
    }

    #[tokio::test]
    async fn fenced_plan_is_accepted() {
        let fenced = format!("```json\n{}\n```", count_plan_json());
        let plan = plan_with(MockOracle::single(fenced), "count films").await;
        assert_eq!(plan.steps.len(), 1);
    }

    #[tokio::test]
    async fn empty_task_skips_oracle_and_echoes() {
        let oracle = Arc::new(MockOracle::single(count_plan_json()));
        let planner = planner_with(oracle.clone());
        let plan = planner.plan("   ", &films_workspace(), &supervisor()).await;
        assert_eq!(oracle.calls(), 0);
        assert_eq!(plan.steps.len(), 1);
        assert_eq!(plan.steps[0].capability, Capability::Format);
        assert_eq!(
            plan.steps[0].params.get("text").and_then(|v| v.as_str()),
            Some(UNINTERPRETABLE_TASK)
        );
    }

    #[tokio::test]
    async fn malformed_plan_retries_once_then_succeeds() {
        let oracle = Arc::new(MockOracle::new(vec![
            "this is not json".to_string(),
            count_plan_json(),
        ]));
        let planner = planner_with(oracle.clone());
        let plan = planner
            .plan("count films", &films_workspace(), &supervisor())
            .await;
        assert_eq!(oracle.calls(), 2);
        assert_eq!(plan.steps[0].capability, Capability::Compute);
    }

    #[tokio::test]
    async fn two_bad_plans_fall_back_to_echo() {
        let oracle = Arc::new(MockOracle::new(vec![
            "garbage".to_string(),
            "more garbage".to_string(),
        ]));
        let planner = planner_with(oracle.clone());
        let plan = planner
            .plan("count films", &films_workspace(), &supervisor())
            .await;
        assert_eq!(oracle.calls(), 2);
        assert_eq!(plan.steps[0].capability, Capability::Format);
        assert_eq!(
            plan.steps[0].params.get("text").and_then(|v| v.as_str()),
            Some("count films")
        );
    }

    #[tokio::test]
    async fn dead_oracle_falls_back_to_echo() {
        let planner = planner_with(Arc::new(NullOracle));
        let plan = planner
            .plan("whatever", &films_workspace(), &supervisor())
            .await;
        assert!(matches!(plan.response, ResponseSpec::Text { .. }));
    }

    #[tokio::test]
    async fn exhausted_budget_skips_the_oracle_entirely() {
        let oracle = Arc::new(MockOracle::single(count_plan_json()));
        let planner = planner_with(oracle.clone());
        let sup = supervisor();
        sup.expire();
        let plan = planner.plan("count films", &films_workspace(), &sup).await;
        // no budget → no oracle calls → echo fallback
        assert_eq!(oracle.calls(), 0);
        assert_eq!(plan.steps[0].capability, Capability::Format);
    }

    fn validate_str(json: &str, ws: &Workspace) -> Result<Plan, PlanError> {
        let raw: RawPlan = serde_json::from_str(json).unwrap();
        validate(raw, ws)
    }

    #[test]
    fn unknown_capability_is_rejected() {
        let json = r#"{
            "steps": [{"id": "s1", "capability": "summon", "inputs": [], "params": {}, "output": {"name": "x", "kind": "text"}}],
            "response": {"shape": "text", "source": "x"}
        }"#;
        assert!(matches!(
            validate_str(json, &films_workspace()),
            Err(PlanError::UnknownCapability(_))
        ));
    }

    #[test]
    fn out_of_order_input_is_rejected() {
        let json = r#"{
            "steps": [
                {"id": "s1", "capability": "compute", "inputs": ["later"], "params": {"op": "count"}, "output": {"name": "n", "kind": "scalar"}},
                {"id": "s2", "capability": "format", "inputs": ["films"], "params": {"op": "coerce"}, "output": {"name": "later", "kind": "text"}}
            ],
            "response": {"shape": "text", "source": "later"}
        }"#;
        assert!(matches!(
            validate_str(json, &films_workspace()),
            Err(PlanError::OutOfOrderInput { .. })
        ));
    }

    #[test]
    fn unknown_artifact_is_rejected() {
        let json = r#"{
            "steps": [{"id": "s1", "capability": "compute", "inputs": ["nope"], "params": {"op": "count"}, "output": {"name": "n", "kind": "scalar"}}],
            "response": {"shape": "list", "slots": [{"source": "n", "kind": "scalar"}]}
        }"#;
        assert!(matches!(
            validate_str(json, &films_workspace()),
            Err(PlanError::UnknownArtifact { .. })
        ));
    }

    #[test]
    fn duplicate_step_id_is_rejected() {
        let json = r#"{
            "steps": [
                {"id": "s1", "capability": "compute", "inputs": ["films"], "params": {"op": "count"}, "output": {"name": "a", "kind": "scalar"}},
                {"id": "s1", "capability": "compute", "inputs": ["films"], "params": {"op": "count"}, "output": {"name": "b", "kind": "scalar"}}
            ],
            "response": {"shape": "list", "slots": [{"source": "a", "kind": "scalar"}]}
        }"#;
        assert!(matches!(
            validate_str(json, &films_workspace()),
            Err(PlanError::DuplicateStepId(_))
        ));
    }

    #[test]
    fn output_colliding_with_input_artifact_is_rejected() {
        let json = r#"{
            "steps": [{"id": "s1", "capability": "compute", "inputs": ["films"], "params": {"op": "count"}, "output": {"name": "films", "kind": "scalar"}}],
            "response": {"shape": "list", "slots": [{"source": "films", "kind": "scalar"}]}
        }"#;
        assert!(matches!(
            validate_str(json, &films_workspace()),
            Err(PlanError::DuplicateOutput(_))
        ));
    }

    #[test]
    fn unbound_slot_is_rejected() {
        let json = r#"{
            "steps": [{"id": "s1", "capability": "compute", "inputs": ["films"], "params": {"op": "count"}, "output": {"name": "n", "kind": "scalar"}}],
            "response": {"shape": "list", "slots": [{"source": "elsewhere", "kind": "scalar"}]}
        }"#;
        assert!(matches!(
            validate_str(json, &films_workspace()),
            Err(PlanError::UnboundSlot(_))
        ));
    }

    #[test]
    fn slot_bound_to_raw_input_is_rejected() {
        // slots must be produced by a step, not lifted straight from inputs
        let json = r#"{
            "steps": [{"id": "s1", "capability": "compute", "inputs": ["films"], "params": {"op": "count"}, "output": {"name": "n", "kind": "scalar"}}],
            "response": {"shape": "list", "slots": [{"source": "films", "kind": "table"}]}
        }"#;
        assert!(matches!(
            validate_str(json, &films_workspace()),
            Err(PlanError::UnboundSlot(_))
        ));
    }

    #[test]
    fn empty_plan_is_rejected() {
        let json = r#"{"steps": [], "response": {"shape": "text", "source": "x"}}"#;
        assert!(matches!(
            validate_str(json, &films_workspace()),
            Err(PlanError::EmptyPlan)
        ));
    }

    #[test]
    fn user_prompt_lists_manifest() {
        let ws = films_workspace();
        let prompt = user_prompt("count films", &ws.manifest(), None);
        assert!(prompt.contains("Task: count films"));
        assert!(prompt.contains("films (table)"));
    }

    #[test]
    fn correction_is_appended_to_retry_prompt() {
        let error = PlanError::UnknownCapability("summon".to_string());
        let prompt = user_prompt("t", &[], Some(&error));
        assert!(prompt.contains("rejected"));
        assert!(prompt.contains("summon"));
    }
}
