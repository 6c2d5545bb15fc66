// 📋 In-Memory Table - column-ordered rows of loan records
// Everything downstream (normalization, bucketing, estimation) works on this

use crate::error::{PipelineError, PipelineResult};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::collections::HashMap;

// ============================================================================
// CELL VALUE
// ============================================================================

/// A single cell. CSV ingestion produces `Str`/`Null` only; the dtype pass
/// upgrades columns to `Int`/`Float`/`Bool` per configuration. The sqlite
/// source yields typed values directly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum Value {
    Null,
    Int(i64),
    Float(f64),
    Bool(bool),
    Str(String),
}

impl Value {
    pub fn is_null(&self) -> bool {
        matches!(self, Value::Null)
    }

    /// Numeric view (Int and Float only).
    pub fn as_f64(&self) -> Option<f64> {
        match self {
            Value::Int(i) => Some(*i as f64),
            Value::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Integer code view, tolerant of the three spellings a status code
    /// can arrive in ("4", 4, 4.0).
    pub fn as_code(&self) -> Option<i64> {
        match self {
            Value::Int(i) => Some(*i),
            Value::Float(f) if f.fract() == 0.0 => Some(*f as i64),
            Value::Str(s) => s.trim().parse::<i64>().ok(),
            _ => None,
        }
    }

    /// Render the cell the way it would appear in a delimited file.
    /// Null renders empty. Used for group keys and date re-parsing.
    pub fn render(&self) -> String {
        match self {
            Value::Null => String::new(),
            Value::Int(i) => i.to_string(),
            Value::Float(f) => f.to_string(),
            Value::Bool(b) => b.to_string(),
            Value::Str(s) => s.clone(),
        }
    }

    /// Convert a JSON scalar (from configuration documents) to a cell value.
    pub fn from_json(v: &serde_json::Value) -> Value {
        match v {
            serde_json::Value::Null => Value::Null,
            serde_json::Value::Bool(b) => Value::Bool(*b),
            serde_json::Value::Number(n) => {
                if let Some(i) = n.as_i64() {
                    Value::Int(i)
                } else {
                    Value::Float(n.as_f64().unwrap_or(f64::NAN))
                }
            }
            serde_json::Value::String(s) => Value::Str(s.clone()),
            other => Value::Str(other.to_string()),
        }
    }

    /// Total ordering for sorting rows. Numbers compare numerically,
    /// everything else compares on its rendered form (canonical
    /// `YYYY-MM-DD` dates sort correctly as strings). Nulls sort first.
    pub fn compare(&self, other: &Value) -> Ordering {
        match (self.is_null(), other.is_null()) {
            (true, true) => return Ordering::Equal,
            (true, false) => return Ordering::Less,
            (false, true) => return Ordering::Greater,
            _ => {}
        }
        match (self.as_f64(), other.as_f64()) {
            (Some(a), Some(b)) => a.partial_cmp(&b).unwrap_or(Ordering::Equal),
            _ => self.render().cmp(&other.render()),
        }
    }
}

impl std::fmt::Display for Value {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.render())
    }
}

// ============================================================================
// DATA TABLE
// ============================================================================

/// Column-ordered table. Held fully in memory for the duration of a run;
/// there is no streaming mode.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DataTable {
    pub columns: Vec<String>,
    pub rows: Vec<Vec<Value>>,
}

impl DataTable {
    pub fn new(columns: Vec<String>) -> Self {
        DataTable {
            columns,
            rows: Vec::new(),
        }
    }

    pub fn row_count(&self) -> usize {
        self.rows.len()
    }

    pub fn column_index(&self, name: &str) -> Option<usize> {
        self.columns.iter().position(|c| c == name)
    }

    /// Column index, or a configuration error naming the missing column.
    pub fn require_column(&self, name: &str) -> PipelineResult<usize> {
        self.column_index(name).ok_or_else(|| {
            PipelineError::Configuration(format!("required column '{}' not present in data", name))
        })
    }

    pub fn push_row(&mut self, row: Vec<Value>) -> PipelineResult<()> {
        if row.len() != self.columns.len() {
            return Err(PipelineError::computation(
                "table",
                format!(
                    "row width {} does not match {} columns",
                    row.len(),
                    self.columns.len()
                ),
            ));
        }
        self.rows.push(row);
        Ok(())
    }

    pub fn value(&self, row: usize, col: usize) -> &Value {
        &self.rows[row][col]
    }

    /// Project down to the given columns, preserving the requested order.
    /// A missing column is a configuration error (required_cols contract).
    pub fn select_columns(&self, names: &[String]) -> PipelineResult<DataTable> {
        let mut indices = Vec::with_capacity(names.len());
        for name in names {
            indices.push(self.require_column(name)?);
        }
        let rows = self
            .rows
            .iter()
            .map(|row| indices.iter().map(|&i| row[i].clone()).collect())
            .collect();
        Ok(DataTable {
            columns: names.to_vec(),
            rows,
        })
    }

    /// Append a column; `values` must cover every row.
    pub fn add_column(&mut self, name: &str, values: Vec<Value>) -> PipelineResult<()> {
        if values.len() != self.rows.len() {
            return Err(PipelineError::computation(
                "table",
                format!(
                    "column '{}' has {} values for {} rows",
                    name,
                    values.len(),
                    self.rows.len()
                ),
            ));
        }
        self.columns.push(name.to_string());
        for (row, value) in self.rows.iter_mut().zip(values) {
            row.push(value);
        }
        Ok(())
    }

    /// Group row indices by the rendered key of a column, preserving
    /// first-appearance order of keys and row order within each group.
    pub fn group_rows(&self, key_col: usize) -> Vec<(String, Vec<usize>)> {
        let mut order: Vec<(String, Vec<usize>)> = Vec::new();
        let mut seen: HashMap<String, usize> = HashMap::new();
        for (i, row) in self.rows.iter().enumerate() {
            let key = row[key_col].render();
            match seen.get(&key) {
                Some(&pos) => order[pos].1.push(i),
                None => {
                    seen.insert(key.clone(), order.len());
                    order.push((key, vec![i]));
                }
            }
        }
        order
    }

    /// Stable sort of a set of row indices by a key column, ascending.
    pub fn sort_indices_by(&self, indices: &mut [usize], key_col: usize) {
        indices.sort_by(|&a, &b| self.rows[a][key_col].compare(&self.rows[b][key_col]));
    }
}

// ============================================================================
// TESTS
// ============================================================================
