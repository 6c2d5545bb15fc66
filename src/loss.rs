// 💰 Loss Calculator - allowance / CECL scalars from the projection curve

use crate::config::RunConfig;
use crate::error::{PipelineError, PipelineResult};
use crate::features::CHARGE_OFF_AMOUNT_COLUMN;
use crate::matrix::{Distribution, TransitionMatrix};
use crate::projection::ProjectionCurve;
use crate::table::DataTable;
use serde::{Deserialize, Serialize};

/// Scalar loss outputs plus the model artifacts they were derived from.
/// This is the report payload handed to persistence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LossMetrics {
    /// Allowance for loan and lease losses: incremental charged-off mass
    /// over the projection horizon.
    pub allowance: f64,
    /// Allowance scaled by the weighted-average remaining life.
    pub cecl_factor: f64,
    pub warl: f64,
    /// CECL factor applied to the ending balance.
    pub cecl_amount: f64,
    pub opening_balance: f64,
    pub ending_balance: f64,

    pub matrix: TransitionMatrix,
    pub distribution: Distribution,
    pub curve: ProjectionCurve,
}

impl LossMetrics {
    pub fn summary(&self) -> String {
        format!(
            "ALLL: {:.6}, CECL factor: {:.6}, CECL amount: {:.2}, opening: {:.2}, ending: {:.2}",
            self.allowance,
            self.cecl_factor,
            self.cecl_amount,
            self.opening_balance,
            self.ending_balance
        )
    }
}

/// Derive the loss scalars per the model definition:
///
/// - allowance    = charged-off mass at the horizon − at period 0
/// - CECL factor  = allowance × WARL
/// - opening      = Σ balance over all feature rows (charged-off rows are
///                  already zeroed, so this is outstanding principal)
/// - ending       = Σ per entity (final-period balance + recorded
///                  charge-off amount)
/// - CECL amount  = CECL factor × ending balance
pub fn compute(
    curve: ProjectionCurve,
    matrix: TransitionMatrix,
    distribution: Distribution,
    table: &DataTable,
    config: &RunConfig,
) -> PipelineResult<LossMetrics> {
    let entity_col = table.require_column(&config.entity_column)?;
    let balance_col = table.require_column(&config.balance_column)?;
    let charge_off_col = table.require_column(CHARGE_OFF_AMOUNT_COLUMN)?;

    let allowance = curve.last().charged_off - curve.first().charged_off;
    let cecl_factor = allowance * config.warl;

    let mut opening_balance = 0.0;
    for (i, row) in table.rows.iter().enumerate() {
        opening_balance += row[balance_col].as_f64().ok_or_else(|| {
            PipelineError::computation(
                "loss calculation",
                format!("row {}: balance is not numeric", i),
            )
        })?;
    }

    let mut ending_balance = 0.0;
    for (entity, indices) in table.group_rows(entity_col) {
        let &last = indices.last().expect("groups are non-empty");
        let final_balance = table.rows[last][balance_col]
            .as_f64()
            .expect("balances validated above");
        // The charge-off amount is recorded once per entity; summing the
        // column picks it up wherever in the lifetime it landed.
        let mut charged_off = 0.0;
        for &i in &indices {
            charged_off += table.rows[i][charge_off_col].as_f64().ok_or_else(|| {
                PipelineError::computation(
                    "loss calculation",
                    format!("entity '{}': charge-off amount is not numeric", entity),
                )
            })?;
        }
        ending_balance += final_balance + charged_off;
    }

    let cecl_amount = cecl_factor * ending_balance;

    let metrics = LossMetrics {
        allowance,
        cecl_factor,
        warl: config.warl,
        cecl_amount,
        opening_balance,
        ending_balance,
        matrix,
        distribution,
        curve,
    };
    log::info!("{}", metrics.summary());
    Ok(metrics)
}

// ============================================================================
// TESTS
// ============================================================================
