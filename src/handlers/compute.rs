//! COMPUTE: derive a value from an artifact. Counting and basic statistics
//! run locally; `extract` borrows the oracle for unstructured text.

use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Number;

use super::{Handler, table_input};
use crate::error::{ComputeError, StepError};
use crate::oracle::{Oracle, OracleRequest};
use crate::plan::{Capability, Step};
use crate::workspace::{Payload, Workspace};

/// Soft cap on one extraction call; the executor's step timeout still
/// applies on top.
const EXTRACT_TIMEOUT: Duration = Duration::from_secs(30);

pub struct ComputeHandler {
    oracle: Option<Arc<dyn Oracle>>,
}

impl ComputeHandler {
    pub fn new(oracle: Option<Arc<dyn Oracle>>) -> Self {
        Self { oracle }
    }
}

#[async_trait]
impl Handler for ComputeHandler {
    fn capability(&self) -> Capability {
        Capability::Compute
    }

    async fn run(&self, step: &Step, workspace: &Workspace) -> Result<Payload, StepError> {
        let op = step
            .params
            .get("op")
            .and_then(|v| v.as_str())
            .ok_or(StepError::MissingParam("op"))?;

        match op {
            "count" => {
                let table = table_input(step, workspace)?;
                Ok(Payload::Scalar(Number::from(table.len() as u64)))
            }
            "sum" | "mean" | "min" | "max" => {
                let table = table_input(step, workspace)?;
                let column = str_param(step, "column")?;
                let values = table.numeric_column(column)?;
                let result = match op {
                    "sum" => values.iter().sum(),
                    "mean" => values.iter().sum::<f64>() / values.len() as f64,
                    "min" => values.iter().cloned().fold(f64::INFINITY, f64::min),
                    _ => values.iter().cloned().fold(f64::NEG_INFINITY, f64::max),
                };
                Ok(Payload::Scalar(number_from(result)?))
            }
            "correlation" => {
                let table = table_input(step, workspace)?;
                let columns = step
                    .params
                    .get("columns")
                    .and_then(|v| v.as_array())
                    .ok_or(StepError::MissingParam("columns"))?;
                let [a, b] = columns.as_slice() else {
                    return Err(StepError::Invalid(
                        "correlation needs exactly two columns".to_string(),
                    ));
                };
                let a = a.as_str().ok_or(StepError::MissingParam("columns"))?;
                let b = b.as_str().ok_or(StepError::MissingParam("columns"))?;
                let xs = table.numeric_column(a)?;
                let ys = table.numeric_column(b)?;
                Ok(Payload::Scalar(number_from(pearson(&xs, &ys)?)?))
            }
            "extract" => self.extract(step, workspace).await,
            other => Err(ComputeError::UnknownOperation(other.to_string()).into()),
        }
    }
}

impl ComputeHandler {
    /// Oracle-backed text-to-value extraction. The oracle's reply is taken
    /// as a scalar when it parses as one, text otherwise.
    async fn extract(&self, step: &Step, workspace: &Workspace) -> Result<Payload, StepError> {
        let oracle = self
            .oracle
            .as_ref()
            .ok_or(ComputeError::OracleUnavailable)?;

        let prompt = str_param(step, "prompt")?;
        let name = step
            .inputs
            .first()
            .ok_or(StepError::MissingParam("inputs"))?;
        let artifact = workspace
            .get(name)
            .ok_or_else(|| StepError::Invalid(format!("input '{name}' not in workspace")))?;

        let source_text = match &artifact.payload {
            Payload::Text(t) => t.clone(),
            Payload::Json(v) => v.to_string(),
            other => {
                return Err(StepError::WrongInputKind(
                    name.clone(),
                    "text",
                    other.kind().as_str(),
                ));
            }
        };

        let request = OracleRequest {
            system: "Extract exactly the value asked for from the given text. \
                     Reply with the bare value only — no explanation, no quotes."
                .to_string(),
            user: format!("{prompt}\n\nText:\n{source_text}"),
        };

        let reply = tokio::time::timeout(EXTRACT_TIMEOUT, oracle.complete(&request))
            .await
            .map_err(|_| ComputeError::Oracle("extraction timed out".to_string()))?
            .map_err(|e| ComputeError::Oracle(e.to_string()))?;

        let reply = reply.trim();
        if let Ok(n) = reply.parse::<i64>() {
            return Ok(Payload::Scalar(Number::from(n)));
        }
        if let Ok(f) = reply.parse::<f64>()
            && let Some(n) = Number::from_f64(f)
        {
            return Ok(Payload::Scalar(n));
        }
        Ok(Payload::Text(reply.to_string()))
    }
}

fn str_param<'a>(step: &'a Step, key: &'static str) -> Result<&'a str, StepError> {
    step.params
        .get(key)
        .and_then(|v| v.as_str())
        .ok_or(StepError::MissingParam(key))
}

/// Integral results become JSON integers so `2` serializes as `2`, not `2.0`.
fn number_from(value: f64) -> Result<Number, StepError> {
    if value.fract() == 0.0 && value.abs() < i64::MAX as f64 {
        return Ok(Number::from(value as i64));
    }
    Number::from_f64(value)
        .ok_or_else(|| StepError::Invalid(format!("result {value} is not representable")))
}

fn pearson(xs: &[f64], ys: &[f64]) -> Result<f64, StepError> {
    if xs.len() != ys.len() {
        return Err(StepError::Invalid(
            "correlation columns have different lengths".to_string(),
        ));
    }
    let n = xs.len() as f64;
    let mean_x = xs.iter().sum::<f64>() / n;
    let mean_y = ys.iter().sum::<f64>() / n;
    let mut cov = 0.0;
    let mut var_x = 0.0;
    let mut var_y = 0.0;
    for (x, y) in xs.iter().zip(ys) {
        let dx = x - mean_x;
        let dy = y - mean_y;
        cov += dx * dy;
        var_x += dx * dx;
        var_y += dy * dy;
    }
    if var_x == 0.0 || var_y == 0.0 {
        return Err(StepError::Invalid(
            "correlation undefined for a constant column".to_string(),
        ));
    }
    Ok(cov / (var_x.sqrt() * var_y.sqrt()))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::oracle::mock::MockOracle;
    use crate::plan::OutputDecl;
    use crate::table::Table;
    use crate::workspace::{Artifact, ArtifactKind};
    use serde_json::json;

    fn ws_with_table(text: &str) -> Workspace {
        let mut ws = Workspace::new();
        let table = Table::parse_delimited(text).unwrap();
        ws.insert("data", Artifact::input(Payload::Table(table)))
            .unwrap();
        ws
    }

    fn step(params: serde_json::Value) -> Step {
        Step {
            id: "s1".to_string(),
            capability: Capability::Compute,
            inputs: vec!["data".to_string()],
            params,
            output: OutputDecl {
                name: "out".to_string(),
                kind: ArtifactKind::Scalar,
            },
        }
    }

    async fn run(ws: &Workspace, params: serde_json::Value) -> Result<Payload, StepError> {
        ComputeHandler::new(None).run(&step(params), ws).await
    }

    #[tokio::test]
    async fn count_rows() {
        let ws = ws_with_table("Year,Title\n1995,Heat\n2001,Amelie\n1999,Matrix");
        let payload = run(&ws, json!({"op": "count"})).await.unwrap();
        assert_eq!(payload, Payload::Scalar(Number::from(3)));
    }

    #[tokio::test]
    async fn sum_is_integral_when_possible() {
        let ws = ws_with_table("v,w\n1,a\n2,b");
        let payload = run(&ws, json!({"op": "sum", "column": "v"})).await.unwrap();
        assert_eq!(payload, Payload::Scalar(Number::from(3)));
    }

    #[tokio::test]
    async fn mean_keeps_fraction() {
        let ws = ws_with_table("v,w\n1,a\n2,b");
        let payload = run(&ws, json!({"op": "mean", "column": "v"})).await.unwrap();
        assert_eq!(payload, Payload::Scalar(Number::from_f64(1.5).unwrap()));
    }

    #[tokio::test]
    async fn min_and_max() {
        let ws = ws_with_table("v,w\n5,a\n2,b\n9,c");
        assert_eq!(
            run(&ws, json!({"op": "min", "column": "v"})).await.unwrap(),
            Payload::Scalar(Number::from(2))
        );
        assert_eq!(
            run(&ws, json!({"op": "max", "column": "v"})).await.unwrap(),
            Payload::Scalar(Number::from(9))
        );
    }

    #[tokio::test]
    async fn correlation_of_linear_data_is_one() {
        let ws = ws_with_table("x,y\n1,2\n2,4\n3,6");
        let Payload::Scalar(n) = run(&ws, json!({"op": "correlation", "columns": ["x", "y"]}))
            .await
            .unwrap()
        else {
            panic!("expected scalar")
        };
        assert!((n.as_f64().unwrap() - 1.0).abs() < 1e-9);
    }

    #[tokio::test]
    async fn correlation_on_text_column_fails() {
        let ws = ws_with_table("x,y\n1,a\n2,b");
        let err = run(&ws, json!({"op": "correlation", "columns": ["x", "y"]}))
            .await
            .unwrap_err();
        assert!(matches!(
            err,
            StepError::Compute(ComputeError::NonNumericColumn(_))
        ));
    }

    #[tokio::test]
    async fn unknown_op_fails() {
        let ws = ws_with_table("v,w\n1,a");
        assert!(matches!(
            run(&ws, json!({"op": "median"})).await.unwrap_err(),
            StepError::Compute(ComputeError::UnknownOperation(_))
        ));
    }

    #[tokio::test]
    async fn extract_without_oracle_fails() {
        let mut ws = Workspace::new();
        ws.insert("data", Artifact::input(Payload::Text("Total: 42".to_string())))
            .unwrap();
        assert!(matches!(
            run(&ws, json!({"op": "extract", "prompt": "the total"}))
                .await
                .unwrap_err(),
            StepError::Compute(ComputeError::OracleUnavailable)
        ));
    }

    #[tokio::test]
    async fn extract_parses_numeric_reply() {
        let mut ws = Workspace::new();
        ws.insert("data", Artifact::input(Payload::Text("Total: 42".to_string())))
            .unwrap();
        let handler = ComputeHandler::new(Some(Arc::new(MockOracle::single("42"))));
        let payload = handler
            .run(&step(json!({"op": "extract", "prompt": "the total"})), &ws)
            .await
            .unwrap();
        assert_eq!(payload, Payload::Scalar(Number::from(42)));
    }

    #[tokio::test]
    async fn extract_falls_back_to_text_reply() {
        let mut ws = Workspace::new();
        ws.insert("data", Artifact::input(Payload::Text("by Ada".to_string())))
            .unwrap();
        let handler = ComputeHandler::new(Some(Arc::new(MockOracle::single("Ada"))));
        let payload = handler
            .run(&step(json!({"op": "extract", "prompt": "the author"})), &ws)
            .await
            .unwrap();
        assert_eq!(payload, Payload::Text("Ada".to_string()));
    }
}
