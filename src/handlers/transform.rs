//! TRANSFORM: reshape a table. Filter, select, limit, sort — driven entirely
//! by step params.

use async_trait::async_trait;
use serde_json::Value;

use super::{Handler, table_input};
use crate::error::{ComputeError, StepError};
use crate::plan::{Capability, Step};
use crate::table::{Table, cell_as_f64};
use crate::workspace::{Payload, Workspace};

pub struct TransformHandler;

#[async_trait]
impl Handler for TransformHandler {
    fn capability(&self) -> Capability {
        Capability::Transform
    }

    async fn run(&self, step: &Step, workspace: &Workspace) -> Result<Payload, StepError> {
        let table = table_input(step, workspace)?;
        let op = step
            .params
            .get("op")
            .and_then(|v| v.as_str())
            .ok_or(StepError::MissingParam("op"))?;

        let out = match op {
            "filter" => filter(&table, &step.params)?,
            "select" => select(&table, &step.params)?,
            "limit" => limit(&table, &step.params)?,
            "sort" => sort(&table, &step.params)?,
            other => return Err(ComputeError::UnknownOperation(other.to_string()).into()),
        };
        Ok(Payload::Table(out))
    }
}

fn filter(table: &Table, params: &Value) -> Result<Table, StepError> {
    let column = str_param(params, "column")?;
    let cmp = str_param(params, "cmp")?;
    let value = params
        .get("value")
        .ok_or(StepError::MissingParam("value"))?;

    let idx = table
        .column_index(column)
        .ok_or_else(|| ComputeError::UnknownColumn(column.to_string()))?;

    let mut out = Table::new(table.columns.clone());
    for row in &table.rows {
        let cell = row.get(idx).unwrap_or(&Value::Null);
        if matches_cmp(cell, cmp, value)? {
            out.rows.push(row.clone());
        }
    }
    Ok(out)
}

/// Numeric comparison when both sides are numeric, string equality otherwise.
fn matches_cmp(cell: &Value, cmp: &str, value: &Value) -> Result<bool, StepError> {
    if let (Some(a), Some(b)) = (cell_as_f64(cell), cell_as_f64(value)) {
        return Ok(match cmp {
            "lt" => a < b,
            "le" => a <= b,
            "gt" => a > b,
            "ge" => a >= b,
            "eq" => a == b,
            "ne" => a != b,
            other => return Err(ComputeError::UnknownOperation(other.to_string()).into()),
        });
    }

    let a = value_as_string(cell);
    let b = value_as_string(value);
    match cmp {
        "eq" => Ok(a == b),
        "ne" => Ok(a != b),
        "lt" | "le" | "gt" | "ge" => Err(StepError::Invalid(format!(
            "ordering comparison '{cmp}' needs numeric operands"
        ))),
        other => Err(ComputeError::UnknownOperation(other.to_string()).into()),
    }
}

fn select(table: &Table, params: &Value) -> Result<Table, StepError> {
    let wanted: Vec<&str> = params
        .get("columns")
        .and_then(|v| v.as_array())
        .map(|a| a.iter().filter_map(|v| v.as_str()).collect())
        .ok_or(StepError::MissingParam("columns"))?;
    if wanted.is_empty() {
        return Err(StepError::MissingParam("columns"));
    }

    let mut indices = Vec::with_capacity(wanted.len());
    for name in &wanted {
        let idx = table
            .column_index(name)
            .ok_or_else(|| ComputeError::UnknownColumn(name.to_string()))?;
        indices.push(idx);
    }

    let mut out = Table::new(wanted.iter().map(|s| s.to_string()).collect());
    for row in &table.rows {
        out.rows
            .push(indices.iter().map(|&i| row[i].clone()).collect());
    }
    Ok(out)
}

fn limit(table: &Table, params: &Value) -> Result<Table, StepError> {
    let count = params
        .get("count")
        .and_then(|v| v.as_u64())
        .ok_or(StepError::MissingParam("count"))? as usize;
    let mut out = Table::new(table.columns.clone());
    out.rows = table.rows.iter().take(count).cloned().collect();
    Ok(out)
}

fn sort(table: &Table, params: &Value) -> Result<Table, StepError> {
    let column = str_param(params, "column")?;
    let descending = params
        .get("descending")
        .and_then(|v| v.as_bool())
        .unwrap_or(false);
    let idx = table
        .column_index(column)
        .ok_or_else(|| ComputeError::UnknownColumn(column.to_string()))?;

    let mut out = Table::new(table.columns.clone());
    out.rows = table.rows.clone();
    out.rows.sort_by(|a, b| {
        let av = a.get(idx).unwrap_or(&Value::Null);
        let bv = b.get(idx).unwrap_or(&Value::Null);
        let ord = match (cell_as_f64(av), cell_as_f64(bv)) {
            (Some(x), Some(y)) => x.partial_cmp(&y).unwrap_or(std::cmp::Ordering::Equal),
            _ => value_as_string(av).cmp(&value_as_string(bv)),
        };
        if descending { ord.reverse() } else { ord }
    });
    Ok(out)
}

fn str_param<'a>(params: &'a Value, key: &'static str) -> Result<&'a str, StepError> {
    params
        .get(key)
        .and_then(|v| v.as_str())
        .ok_or(StepError::MissingParam(key))
}

fn value_as_string(value: &Value) -> String {
    match value {
        Value::String(s) => s.clone(),
        other => other.to_string(),
    }
}
