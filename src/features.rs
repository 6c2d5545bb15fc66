// 🧬 Feature Deriver - per-entity state labels and charge-off attribution
// Explicit pass over entity-ordered, period-sorted groups

use crate::config::{BucketSet, RunConfig};
use crate::error::{PipelineError, PipelineResult};
use crate::table::{DataTable, Value};

/// Columns appended by `derive`.
pub const DERIVED_STATUS_COLUMN: &str = "DERIVED_LOAN_STATUS";
pub const DAYS_PAST_DUE_COLUMN: &str = "DAYS_PAST_DUE";
pub const NEXT_DERIVED_STATUS_COLUMN: &str = "NEXT_DERIVED_LOAN_STATUS";
pub const NEXT_DAYS_PAST_DUE_COLUMN: &str = "NEXT_DAYS_PAST_DUE";
pub const CHARGE_OFF_AMOUNT_COLUMN: &str = "CHARGE_OFF_AMT";

/// Augment the prepared table with the transition-model features:
///
/// - `DERIVED_LOAN_STATUS` / `DAYS_PAST_DUE`: the status code mapped
///   through the bucket map (the DPD label comes from the same map).
/// - `NEXT_DERIVED_LOAN_STATUS` / `NEXT_DAYS_PAST_DUE`: the entity's
///   label at the following period. The final period has no successor
///   and inherits its own value (self-transition).
/// - Absorbing override: once an entity reaches the charged-off bucket,
///   every subsequent next label is forced to charged-off regardless of
///   the shifted value.
/// - `CHARGE_OFF_AMT`: the entity's balance when it first reaches the
///   charged-off bucket, recorded once; from that point forward the
///   entity's balance is zeroed so it is not counted as both
///   outstanding and charged off.
///
/// The input must be entity-grouped and period-sorted (bucket
/// preparation guarantees this); group and sort keys come from the
/// configuration, not from implicit ordering.
pub fn derive(
    table: &DataTable,
    buckets: &BucketSet,
    config: &RunConfig,
) -> PipelineResult<DataTable> {
    let entity_col = table.require_column(&config.entity_column)?;
    let status_col = table.require_column(&config.status_column)?;
    let balance_col = table.require_column(&config.balance_column)?;

    let charged_off = buckets.charged_off().to_string();
    let n = table.row_count();

    let mut status_labels: Vec<Value> = vec![Value::Null; n];
    let mut dpd_labels: Vec<Value> = vec![Value::Null; n];
    let mut next_status: Vec<Value> = vec![Value::Null; n];
    let mut next_dpd: Vec<Value> = vec![Value::Null; n];
    let mut charge_off_amounts: Vec<Value> = vec![Value::Float(0.0); n];
    let mut out = table.clone();

    for (entity, indices) in table.group_rows(entity_col) {
        // Resolve every row's bucket name first; the forward shift needs
        // the successor's label.
        let mut names: Vec<String> = Vec::with_capacity(indices.len());
        for &i in &indices {
            let code = table.rows[i][status_col].as_code().ok_or_else(|| {
                PipelineError::computation(
                    "feature derivation",
                    format!("entity '{}': status is not a code", entity),
                )
            })?;
            let name = buckets.name_for(code).ok_or_else(|| {
                PipelineError::computation(
                    "feature derivation",
                    format!("entity '{}': status code {} has no bucket", entity, code),
                )
            })?;
            names.push(name.to_string());
        }

        let mut charged_off_seen = false;
        for (pos, &i) in indices.iter().enumerate() {
            let name = &names[pos];
            status_labels[i] = Value::Str(name.clone());
            dpd_labels[i] = Value::Str(name.clone());

            // Absorbing is an entity-level condition: it covers the row
            // that reaches charged-off and everything after it, even if
            // later rows claim a recovery.
            let absorbed = charged_off_seen || name == &charged_off;

            // Forward shift with self-fill on the final period, then the
            // absorbing override.
            let shifted = names.get(pos + 1).unwrap_or(name);
            let next = if absorbed { &charged_off } else { shifted };
            next_status[i] = Value::Str(next.clone());
            next_dpd[i] = Value::Str(next.clone());

            if absorbed {
                let balance = table.rows[i][balance_col].as_f64().ok_or_else(|| {
                    PipelineError::computation(
                        "feature derivation",
                        format!("entity '{}': balance is not numeric", entity),
                    )
                })?;
                if !charged_off_seen {
                    charge_off_amounts[i] = Value::Float(balance);
                    charged_off_seen = true;
                }
                out.rows[i][balance_col] = Value::Float(0.0);
            }
        }
    }

    out.add_column(DERIVED_STATUS_COLUMN, status_labels)?;
    out.add_column(DAYS_PAST_DUE_COLUMN, dpd_labels)?;
    out.add_column(NEXT_DERIVED_STATUS_COLUMN, next_status)?;
    out.add_column(NEXT_DAYS_PAST_DUE_COLUMN, next_dpd)?;
    out.add_column(CHARGE_OFF_AMOUNT_COLUMN, charge_off_amounts)?;

    log::info!("feature derivation complete: {} row(s)", out.row_count());
    Ok(out)
}

// ============================================================================
// TESTS
// ============================================================================
