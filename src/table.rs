//! Tabular data. Cells are loosely typed (`serde_json::Value`) the way they
//! arrive; numeric access coerces on demand and fails loudly when it can't.

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::error::ComputeError;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Table {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl Table {
    pub fn new(columns: Vec<String>) -> Self {
        Self {
            columns,
            rows: Vec::new(),
        }
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// All values of one column coerced to f64. Strings that parse as numbers
    /// count as numeric; anything else is a [`ComputeError::NonNumericColumn`].
    pub fn numeric_column(&self, name: &str) -> Result<Vec<f64>, ComputeError> {
        let idx = self
            .column_index(name)
            .ok_or_else(|| ComputeError::UnknownColumn(name.to_string()))?;
        let mut out = Vec::with_capacity(self.rows.len());
        for row in &self.rows {
            let cell = row.get(idx).unwrap_or(&Value::Null);
            match cell_as_f64(cell) {
                Some(n) => out.push(n),
                None => return Err(ComputeError::NonNumericColumn(name.to_string())),
            }
        }
        if out.is_empty() {
            return Err(ComputeError::EmptyColumn(name.to_string()));
        }
        Ok(out)
    }

    /// Parse comma- or tab-separated text. The first line is the header.
    /// Returns `None` when the text doesn't look tabular (fewer than two
    /// columns, or inconsistent widths).
    pub fn parse_delimited(text: &str) -> Option<Table> {
        let mut lines = text.lines().filter(|l| !l.trim().is_empty());
        let header = lines.next()?;
        let delim = if header.matches('\t').count() > header.matches(',').count() {
            '\t'
        } else {
            ','
        };

        let columns: Vec<String> = split_row(header, delim);
        if columns.len() < 2 {
            return None;
        }

        let mut rows = Vec::new();
        for line in lines {
            let cells = split_row(line, delim);
            if cells.len() != columns.len() {
                return None;
            }
            rows.push(cells.into_iter().map(|c| coerce_cell(&c)).collect());
        }
        if rows.is_empty() {
            return None;
        }
        Some(Table { columns, rows })
    }

    /// Build a table from a JSON array of objects with identical keys.
    /// Column order follows the first object.
    pub fn from_json_rows(values: &[Value]) -> Option<Table> {
        let first = values.first()?.as_object()?;
        let columns: Vec<String> = first.keys().cloned().collect();
        if columns.is_empty() {
            return None;
        }

        let mut rows = Vec::with_capacity(values.len());
        for value in values {
            let obj = value.as_object()?;
            if obj.len() != columns.len() {
                return None;
            }
            let mut row = Vec::with_capacity(columns.len());
            for col in &columns {
                row.push(obj.get(col)?.clone());
            }
            rows.push(row);
        }
        Some(Table { columns, rows })
    }
}

/// Numeric view of one cell. Quoted numbers coerce.
pub fn cell_as_f64(cell: &Value) -> Option<f64> {
    match cell {
        Value::Number(n) => n.as_f64(),
        Value::String(s) => s.trim().parse().ok(),
        _ => None,
    }
}

fn split_row(line: &str, delim: char) -> Vec<String> {
    line.split(delim).map(|c| c.trim().to_string()).collect()
}

/// Bare numbers become JSON numbers, everything else stays a string.
fn coerce_cell(cell: &str) -> Value {
    if let Ok(i) = cell.parse::<i64>() {
        return Value::from(i);
    }
    if let Ok(f) = cell.parse::<f64>() {
        return Value::from(f);
    }
    Value::String(cell.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn parse_csv_with_numbers() {
        let table = Table::parse_delimited("Year,Title\n1995,Heat\n2001,Amelie").unwrap();
        assert_eq!(table.columns, vec!["Year", "Title"]);
        assert_eq!(table.len(), 2);
        assert_eq!(table.rows[0][0], json!(1995));
        assert_eq!(table.rows[1][1], json!("Amelie"));
    }

    #[test]
    fn parse_tsv() {
        let table = Table::parse_delimited("a\tb\n1\t2").unwrap();
        assert_eq!(table.columns, vec!["a", "b"]);
        assert_eq!(table.rows[0], vec![json!(1), json!(2)]);
    }

    #[test]
    fn parse_rejects_single_column() {
        assert!(Table::parse_delimited("just\nsome\nlines").is_none());
    }

    #[test]
    fn parse_rejects_ragged_rows() {
        assert!(Table::parse_delimited("a,b\n1,2,3").is_none());
    }

    #[test]
    fn parse_rejects_header_only() {
        assert!(Table::parse_delimited("a,b").is_none());
    }

    #[test]
    fn from_json_rows_uniform_objects() {
        let rows = vec![json!({"x": 1, "y": 2.5}), json!({"x": 3, "y": 4.5})];
        let table = Table::from_json_rows(&rows).unwrap();
        assert_eq!(table.columns.len(), 2);
        assert_eq!(table.len(), 2);
    }

    #[test]
    fn from_json_rows_rejects_mixed_shapes() {
        let rows = vec![json!({"x": 1}), json!({"y": 2})];
        assert!(Table::from_json_rows(&rows).is_none());
    }

    #[test]
    fn numeric_column_coerces_strings() {
        let table = Table::parse_delimited("v,w\n1,a\n2.5,b").unwrap();
        assert_eq!(table.numeric_column("v").unwrap(), vec![1.0, 2.5]);
    }

    #[test]
    fn numeric_column_rejects_text() {
        let table = Table::parse_delimited("v,w\n1,a\n2,b").unwrap();
        assert!(matches!(
            table.numeric_column("w"),
            Err(ComputeError::NonNumericColumn(_))
        ));
    }

    #[test]
    fn numeric_column_unknown_name() {
        let table = Table::parse_delimited("v,w\n1,a").unwrap();
        assert!(matches!(
            table.numeric_column("nope"),
            Err(ComputeError::UnknownColumn(_))
        ));
    }
}
