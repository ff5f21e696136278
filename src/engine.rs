//! The outermost boundary: one request in, one response out, always by the
//! deadline. Wires the normalizer, planner, executor, supervisor, and
//! assembler together.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;

use crate::assemble::{Response, assemble};
use crate::consts::{DEFAULT_DEADLINE, DEFAULT_GRACE};
use crate::deadline::Supervisor;
use crate::executor::{Executor, ExecutorConfig};
use crate::handlers::HandlerRegistry;
use crate::handlers::acquire::{AcquireHandler, Fetcher};
use crate::handlers::compute::ComputeHandler;
use crate::handlers::format::FormatHandler;
use crate::handlers::transform::TransformHandler;
use crate::handlers::visualize::{Renderer, VisualizeHandler};
use crate::normalize::{UploadedPart, normalize};
use crate::oracle::Oracle;
use crate::planner::Planner;

/// One inbound submission: the task description plus its data parts.
#[derive(Debug, Clone, Default)]
pub struct Request {
    pub task: String,
    pub parts: Vec<UploadedPart>,
}

#[derive(Debug, Clone)]
pub struct EngineConfig {
    pub deadline: Duration,
    pub grace: Duration,
    pub executor: ExecutorConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            deadline: DEFAULT_DEADLINE,
            grace: DEFAULT_GRACE,
            executor: ExecutorConfig::default(),
        }
    }
}

/// The outermost trait. Callers (CLI, HTTP glue) only know this.
#[async_trait]
pub trait Engine: Send + Sync {
    async fn run(&self, request: Request) -> Response;
}

/// The production pipeline: normalize → plan → execute → assemble, all under
/// one supervisor.
pub struct AnalysisEngine {
    planner: Planner,
    executor: Executor,
    config: EngineConfig,
}

impl AnalysisEngine {
    pub fn new(
        oracle: Arc<dyn Oracle>,
        fetcher: Arc<dyn Fetcher>,
        renderer: Arc<dyn Renderer>,
        config: EngineConfig,
    ) -> Self {
        let mut registry = HandlerRegistry::new();
        registry.register(Arc::new(AcquireHandler::new(fetcher)));
        registry.register(Arc::new(TransformHandler));
        registry.register(Arc::new(ComputeHandler::new(Some(oracle.clone()))));
        registry.register(Arc::new(VisualizeHandler::new(renderer)));
        registry.register(Arc::new(FormatHandler));

        Self {
            planner: Planner::new(oracle, config.executor.reserve),
            executor: Executor::new(registry, config.executor.clone()),
            config,
        }
    }
}

#[async_trait]
impl Engine for AnalysisEngine {
    async fn run(&self, request: Request) -> Response {
        let supervisor = Supervisor::start(self.config.deadline, self.config.grace);
        tracing::info!(
            task_chars = request.task.len(),
            parts = request.parts.len(),
            budget_ms = self.config.deadline.as_millis() as u64,
            "request started"
        );

        let mut workspace = normalize(request.parts);

        let plan = self
            .planner
            .plan(&request.task, &workspace, &supervisor)
            .await;
        tracing::info!(steps = plan.steps.len(), slots = plan.response.slot_count(), "plan ready");

        let records = self
            .executor
            .execute(&plan, &mut workspace, &supervisor)
            .await;

        let truncated = supervisor.expired();
        let response = assemble(&plan, &workspace, &records, truncated);
        supervisor.finish();

        tracing::info!(
            status = ?response.status,
            truncated = response.truncated,
            elapsed_ms = supervisor.elapsed().as_millis() as u64,
            "request finished"
        );
        response
    }
}
