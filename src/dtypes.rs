// 🔢 Type Coercer - cast columns to their declared semantic types
// Whole-table cast first; per-column fallback so one bad column
// does not block the rest

use crate::config::RunConfig;
use crate::dates;
use crate::error::PipelineResult;
use crate::table::{DataTable, Value};

// ============================================================================
// DECLARED TYPES
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dtype {
    Int,
    Float,
    Str,
    Category,
    Bool,
}

impl Dtype {
    /// Resolve a configured dtype name. Accepts the spellings the source
    /// configurations use ("int64", "object", ...).
    pub fn from_name(name: &str) -> Option<Dtype> {
        match name.trim().to_lowercase().as_str() {
            "int" | "int64" | "int32" | "integer" => Some(Dtype::Int),
            "float" | "float64" | "float32" | "double" => Some(Dtype::Float),
            "str" | "string" | "object" => Some(Dtype::Str),
            "category" => Some(Dtype::Category),
            "bool" | "boolean" => Some(Dtype::Bool),
            _ => None,
        }
    }
}

/// Cast one cell. Nulls always pass through. Returns a message describing
/// the failure otherwise, so column reports can name the offending value.
fn cast_value(value: &Value, dtype: Dtype) -> Result<Value, String> {
    if value.is_null() {
        return Ok(Value::Null);
    }
    match dtype {
        Dtype::Int => match value {
            Value::Int(i) => Ok(Value::Int(*i)),
            Value::Float(f) if f.fract() == 0.0 => Ok(Value::Int(*f as i64)),
            Value::Float(f) => Err(format!("{} has a fractional part", f)),
            Value::Bool(b) => Ok(Value::Int(*b as i64)),
            Value::Str(s) => s
                .trim()
                .parse::<i64>()
                .map(Value::Int)
                .map_err(|_| format!("'{}' is not an integer", s)),
            Value::Null => unreachable!(),
        },
        Dtype::Float => match value {
            Value::Int(i) => Ok(Value::Float(*i as f64)),
            Value::Float(f) => Ok(Value::Float(*f)),
            Value::Str(s) => s
                .trim()
                .parse::<f64>()
                .map(Value::Float)
                .map_err(|_| format!("'{}' is not a number", s)),
            other => Err(format!("cannot cast {:?} to float", other)),
        },
        // Categories are string tags; both directions render.
        Dtype::Str | Dtype::Category => Ok(Value::Str(value.render())),
        Dtype::Bool => match value {
            Value::Bool(b) => Ok(Value::Bool(*b)),
            Value::Int(0) => Ok(Value::Bool(false)),
            Value::Int(1) => Ok(Value::Bool(true)),
            Value::Str(s) => match s.trim().to_lowercase().as_str() {
                "true" | "1" => Ok(Value::Bool(true)),
                "false" | "0" => Ok(Value::Bool(false)),
                other => Err(format!("'{}' is not a boolean", other)),
            },
            other => Err(format!("cannot cast {:?} to bool", other)),
        },
    }
}

/// Cast a whole column. Column-level atomicity: any failing value fails
/// the column and the prior values are kept.
fn cast_column(table: &DataTable, col: usize, dtype: Dtype) -> Result<Vec<Value>, String> {
    let mut out = Vec::with_capacity(table.rows.len());
    for (i, row) in table.rows.iter().enumerate() {
        match cast_value(&row[col], dtype) {
            Ok(v) => out.push(v),
            Err(msg) => return Err(format!("row {}: {}", i, msg)),
        }
    }
    Ok(out)
}

// ============================================================================
// CONVERSION PASS
// ============================================================================

/// Convert configured columns to their declared dtypes. Dates are
/// normalized to canonical strings first, then typed like any other
/// column. Failures are reported per column and leave that column in its
/// prior state; the pass itself never aborts the run.
pub fn convert_columns(table: &mut DataTable, config: &RunConfig) -> PipelineResult<()> {
    dates::convert_date_columns(table, config)?;

    let dtype_map = &config.attributes.dtype;
    if dtype_map.is_empty() {
        return Ok(());
    }

    // Resolve the plan up front so unknown dtype names and absent columns
    // are reported once, not per cast attempt.
    let mut plan: Vec<(usize, Dtype, &str)> = Vec::new();
    for (column, dtype_name) in dtype_map {
        let Some(col) = table.column_index(column) else {
            log::warn!("dtype map names column '{}' which is not present", column);
            continue;
        };
        let Some(dtype) = Dtype::from_name(dtype_name) else {
            log::warn!(
                "unknown dtype '{}' for column '{}'; column left as-is",
                dtype_name,
                column
            );
            continue;
        };
        plan.push((col, dtype, column.as_str()));
    }

    // Attempt the whole-table cast first.
    let mut casted: Vec<(usize, Vec<Value>)> = Vec::new();
    let mut whole_table_ok = true;
    for (col, dtype, column) in &plan {
        match cast_column(table, *col, *dtype) {
            Ok(values) => casted.push((*col, values)),
            Err(msg) => {
                log::warn!(
                    "whole-table cast failed at column '{}' ({}); falling back to per-column casting",
                    column,
                    msg
                );
                whole_table_ok = false;
                break;
            }
        }
    }

    if whole_table_ok {
        apply_casts(table, casted);
        return Ok(());
    }

    // Per-column fallback: each failure is reported independently and the
    // column keeps its prior (possibly already transformed) state.
    let mut fallback: Vec<(usize, Vec<Value>)> = Vec::new();
    for (col, dtype, column) in &plan {
        match cast_column(table, *col, *dtype) {
            Ok(values) => fallback.push((*col, values)),
            Err(msg) => log::warn!("column '{}' could not be cast: {}", column, msg),
        }
    }
    apply_casts(table, fallback);
    Ok(())
}

fn apply_casts(table: &mut DataTable, casts: Vec<(usize, Vec<Value>)>) {
    for (col, values) in casts {
        for (row, value) in table.rows.iter_mut().zip(values) {
            row[col] = value;
        }
    }
}

// ============================================================================
// TESTS
// ============================================================================
