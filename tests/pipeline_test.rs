//! Properties of the executor + supervisor + assembler combination, driven
//! with purpose-built handlers instead of the stock five.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use serde_json::json;

use abacus::assemble::{RunStatus, assemble};
use abacus::deadline::Supervisor;
use abacus::error::StepError;
use abacus::executor::{Executor, ExecutorConfig, StepStatus};
use abacus::handlers::{Handler, HandlerRegistry};
use abacus::plan::{Capability, Field, OutputDecl, Plan, ResponseSpec, Step};
use abacus::workspace::{ArtifactKind, Payload, Workspace};

/// Compute handler that sleeps, then answers 1.
struct Slow(Duration);

#[async_trait]
impl Handler for Slow {
    fn capability(&self) -> Capability {
        Capability::Compute
    }

    async fn run(&self, _step: &Step, _workspace: &Workspace) -> Result<Payload, StepError> {
        tokio::time::sleep(self.0).await;
        Ok(Payload::Scalar(serde_json::Number::from(1)))
    }
}

/// Format handler that fails for outputs named "doomed*", echoes otherwise.
struct Flaky;

#[async_trait]
impl Handler for Flaky {
    fn capability(&self) -> Capability {
        Capability::Format
    }

    async fn run(&self, step: &Step, _workspace: &Workspace) -> Result<Payload, StepError> {
        if step.output.name.starts_with("doomed") {
            return Err(StepError::Invalid("scripted failure".to_string()));
        }
        Ok(Payload::Text(step.id.clone()))
    }
}

fn step(id: &str, capability: Capability, inputs: Vec<&str>, output: &str, kind: ArtifactKind) -> Step {
    Step {
        id: id.to_string(),
        capability,
        inputs: inputs.into_iter().map(String::from).collect(),
        params: json!({}),
        output: OutputDecl {
            name: output.to_string(),
            kind,
        },
    }
}

fn field(name: &str, source: &str, kind: ArtifactKind) -> Field {
    Field {
        name: name.to_string(),
        source: source.to_string(),
        kind,
    }
}

#[tokio::test]
async fn response_keeps_every_field_when_most_steps_die() {
    let plan = Plan {
        steps: vec![
            step("s1", Capability::Format, vec![], "doomed_a", ArtifactKind::Text),
            step("s2", Capability::Format, vec![], "ok_b", ArtifactKind::Text),
            step("s3", Capability::Format, vec![], "doomed_c", ArtifactKind::Text),
        ],
        response: ResponseSpec::Object {
            fields: vec![
                field("a", "doomed_a", ArtifactKind::Text),
                field("b", "ok_b", ArtifactKind::Text),
                field("c", "doomed_c", ArtifactKind::Text),
            ],
        },
    };

    let mut registry = HandlerRegistry::new();
    registry.register(Arc::new(Flaky));
    let supervisor = Supervisor::start(Duration::from_secs(10), Duration::from_millis(100));

    let mut workspace = Workspace::new();
    let records = Executor::new(registry, ExecutorConfig::default())
        .execute(&plan, &mut workspace, &supervisor)
        .await;
    let response = assemble(&plan, &workspace, &records, supervisor.expired());

    let object = response.value.as_object().unwrap();
    assert_eq!(object.len(), 3);
    assert_eq!(object["b"], json!("s2"));
    assert!(object["a"].as_str().unwrap().contains("unavailable"));
    assert!(object["c"].as_str().unwrap().contains("unavailable"));
    assert_eq!(response.status, RunStatus::Partial);
}

#[tokio::test]
async fn skip_cascades_down_a_dependency_chain() {
    let plan = Plan {
        steps: vec![
            step("s1", Capability::Format, vec![], "doomed_root", ArtifactKind::Text),
            step("s2", Capability::Format, vec!["doomed_root"], "mid", ArtifactKind::Text),
            step("s3", Capability::Format, vec!["mid"], "leaf", ArtifactKind::Text),
            step("s4", Capability::Format, vec![], "side", ArtifactKind::Text),
        ],
        response: ResponseSpec::Text {
            source: "leaf".to_string(),
        },
    };

    let mut registry = HandlerRegistry::new();
    registry.register(Arc::new(Flaky));
    let supervisor = Supervisor::start(Duration::from_secs(10), Duration::from_millis(100));

    let mut workspace = Workspace::new();
    let records = Executor::new(registry, ExecutorConfig::default())
        .execute(&plan, &mut workspace, &supervisor)
        .await;

    let statuses: Vec<StepStatus> = records.iter().map(|r| r.status).collect();
    assert_eq!(
        statuses,
        vec![
            StepStatus::Failed,
            StepStatus::Skipped,
            StepStatus::Skipped,
            StepStatus::Ok,
        ]
    );
    // every step whose inputs include a dead artifact is skipped, full stop
    for record in &records {
        let inputs = &plan.step(&record.step_id).unwrap().inputs;
        if inputs.iter().any(|i| !workspace.contains(i)) {
            assert_eq!(record.status, StepStatus::Skipped);
        }
    }
}

#[tokio::test]
async fn deadline_truncates_and_stays_inside_grace() {
    let plan = Plan {
        steps: vec![
            step("s1", Capability::Compute, vec![], "a", ArtifactKind::Scalar),
            step("s2", Capability::Compute, vec![], "b", ArtifactKind::Scalar),
            step("s3", Capability::Compute, vec![], "c", ArtifactKind::Scalar),
        ],
        response: ResponseSpec::Object {
            fields: vec![
                field("a", "a", ArtifactKind::Scalar),
                field("b", "b", ArtifactKind::Scalar),
                field("c", "c", ArtifactKind::Scalar),
            ],
        },
    };

    let deadline = Duration::from_millis(150);
    let grace = Duration::from_millis(100);

    let mut registry = HandlerRegistry::new();
    // each step wants 10x the whole budget
    registry.register(Arc::new(Slow(Duration::from_millis(1500))));
    let supervisor = Supervisor::start(deadline, grace);
    let config = ExecutorConfig {
        step_cap: Duration::from_secs(60),
        reserve: Duration::from_millis(10),
    };

    let started = Instant::now();
    let mut workspace = Workspace::new();
    let records = Executor::new(registry, config)
        .execute(&plan, &mut workspace, &supervisor)
        .await;
    let response = assemble(&plan, &workspace, &records, supervisor.expired());
    let elapsed = started.elapsed();

    // response emitted within deadline + one grace period (plus scheduling slack)
    assert!(
        elapsed < deadline + grace + Duration::from_millis(500),
        "took {elapsed:?}"
    );
    assert!(response.truncated);
    assert_eq!(response.status, RunStatus::Partial);
    // structurally complete all the same
    assert_eq!(response.value.as_object().unwrap().len(), 3);

    // the first step was cut off by the supervisor, the rest never started
    assert_eq!(records[0].status, StepStatus::TimedOut);
    assert_eq!(records[1].status, StepStatus::Skipped);
    assert_eq!(records[2].status, StepStatus::Skipped);
}

#[tokio::test]
async fn rerunning_deterministic_steps_reproduces_digests() {
    let plan = Plan {
        steps: vec![step("s1", Capability::Format, vec![], "out", ArtifactKind::Text)],
        response: ResponseSpec::Text {
            source: "out".to_string(),
        },
    };

    let mut digests = Vec::new();
    for _ in 0..2 {
        let mut registry = HandlerRegistry::new();
        registry.register(Arc::new(Flaky));
        let supervisor = Supervisor::start(Duration::from_secs(10), Duration::from_millis(100));
        let mut workspace = Workspace::new();
        Executor::new(registry, ExecutorConfig::default())
            .execute(&plan, &mut workspace, &supervisor)
            .await;
        digests.push(workspace.get("out").unwrap().digest().to_string());
    }
    assert_eq!(digests[0], digests[1]);
}
