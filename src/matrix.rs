// 🎲 Transition Estimator - empirical one-period state-change probabilities
// Rows and columns follow bucket declaration order, not observed order

use crate::config::{BucketSet, RunConfig};
use crate::error::{PipelineError, PipelineResult};
use crate::features::{CHARGE_OFF_AMOUNT_COLUMN, DERIVED_STATUS_COLUMN, NEXT_DERIVED_STATUS_COLUMN};
use crate::table::DataTable;
use serde::{Deserialize, Serialize};

// ============================================================================
// TRANSITION MATRIX
// ============================================================================

/// Row-stochastic matrix indexed by bucket name on both axes. A source
/// bucket with no observed outgoing transitions keeps an all-zero row
/// (not re-normalized); `row_sums` exposes the anomaly.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransitionMatrix {
    pub states: Vec<String>,
    pub probs: Vec<Vec<f64>>,
}

impl TransitionMatrix {
    pub fn identity(states: Vec<String>) -> Self {
        let n = states.len();
        let probs = (0..n)
            .map(|i| (0..n).map(|j| if i == j { 1.0 } else { 0.0 }).collect())
            .collect();
        TransitionMatrix { states, probs }
    }

    pub fn index_of(&self, state: &str) -> Option<usize> {
        self.states.iter().position(|s| s == state)
    }

    /// Probability of moving from `from` to `to` in one period.
    pub fn get(&self, from: &str, to: &str) -> Option<f64> {
        let i = self.index_of(from)?;
        let j = self.index_of(to)?;
        Some(self.probs[i][j])
    }

    pub fn row_sums(&self) -> Vec<f64> {
        self.probs.iter().map(|row| row.iter().sum()).collect()
    }

    /// Matrix product; both operands share the same state ordering.
    pub fn matmul(&self, other: &TransitionMatrix) -> TransitionMatrix {
        debug_assert_eq!(self.states, other.states);
        let n = self.states.len();
        let mut probs = vec![vec![0.0; n]; n];
        for i in 0..n {
            for k in 0..n {
                let a = self.probs[i][k];
                if a == 0.0 {
                    continue;
                }
                for j in 0..n {
                    probs[i][j] += a * other.probs[k][j];
                }
            }
        }
        TransitionMatrix {
            states: self.states.clone(),
            probs,
        }
    }

    /// Matrix power by repeated multiplication; power 0 is the identity.
    pub fn power(&self, exponent: usize) -> TransitionMatrix {
        let mut result = TransitionMatrix::identity(self.states.clone());
        for _ in 0..exponent {
            result = result.matmul(self);
        }
        result
    }

    /// JSON object keyed by source bucket, each holding the destination
    /// probabilities — the report-document rendering.
    pub fn to_json(&self) -> serde_json::Value {
        let mut outer = serde_json::Map::new();
        for (i, from) in self.states.iter().enumerate() {
            let mut inner = serde_json::Map::new();
            for (j, to) in self.states.iter().enumerate() {
                inner.insert(to.clone(), serde_json::json!(self.probs[i][j]));
            }
            outer.insert(from.clone(), serde_json::Value::Object(inner));
        }
        serde_json::Value::Object(outer)
    }
}

/// Estimate the transition matrix from the feature-augmented table: one
/// observed transition per row, counted by (current bucket, next bucket)
/// and row-normalized.
pub fn estimate(table: &DataTable, buckets: &BucketSet) -> PipelineResult<TransitionMatrix> {
    let current_col = table.require_column(DERIVED_STATUS_COLUMN)?;
    let next_col = table.require_column(NEXT_DERIVED_STATUS_COLUMN)?;

    let states = buckets.names();
    let n = states.len();
    let mut counts = vec![vec![0u64; n]; n];

    for (row_idx, row) in table.rows.iter().enumerate() {
        let from = row[current_col].render();
        let to = row[next_col].render();
        let i = buckets.index_of(&from).ok_or_else(|| {
            PipelineError::computation(
                "transition estimation",
                format!("row {}: state '{}' is not a declared bucket", row_idx, from),
            )
        })?;
        let j = buckets.index_of(&to).ok_or_else(|| {
            PipelineError::computation(
                "transition estimation",
                format!("row {}: state '{}' is not a declared bucket", row_idx, to),
            )
        })?;
        counts[i][j] += 1;
    }

    let mut probs = vec![vec![0.0; n]; n];
    for i in 0..n {
        let total: u64 = counts[i].iter().sum();
        if total == 0 {
            // Unobserved source bucket: the row stays all-zero and is
            // flagged so sparse runs are diagnosable.
            log::warn!(
                "bucket '{}' has no observed outgoing transitions; matrix row is all zero",
                states[i]
            );
            continue;
        }
        for j in 0..n {
            probs[i][j] = counts[i][j] as f64 / total as f64;
        }
    }

    log::info!("transition matrix estimated over {} row(s)", table.row_count());
    Ok(TransitionMatrix { states, probs })
}

// ============================================================================
// DISTRIBUTION
// ============================================================================

/// Balance-weighted share of each bucket, taken from every entity's
/// final-period row and normalized to sum to 1.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Distribution {
    pub states: Vec<String>,
    pub shares: Vec<f64>,
}

impl Distribution {
    pub fn sum(&self) -> f64 {
        self.shares.iter().sum()
    }

    /// One projection step: row vector × matrix.
    pub fn step(shares: &[f64], matrix: &TransitionMatrix) -> Vec<f64> {
        let n = matrix.states.len();
        let mut out = vec![0.0; n];
        for (i, &share) in shares.iter().enumerate() {
            if share == 0.0 {
                continue;
            }
            for j in 0..n {
                out[j] += share * matrix.probs[i][j];
            }
        }
        out
    }

    pub fn to_json(&self) -> serde_json::Value {
        let mut map = serde_json::Map::new();
        for (state, share) in self.states.iter().zip(&self.shares) {
            map.insert(state.clone(), serde_json::json!(share));
        }
        serde_json::Value::Object(map)
    }
}

/// Current distribution over buckets. Charged-off rows have zero balance
/// by the time this runs, so fully charged-off entities contribute no
/// weight — matching the source system.
pub fn current_distribution(
    table: &DataTable,
    buckets: &BucketSet,
    config: &RunConfig,
) -> PipelineResult<Distribution> {
    let entity_col = table.require_column(&config.entity_column)?;
    let status_col = table.require_column(DERIVED_STATUS_COLUMN)?;
    let balance_col = table.require_column(&config.balance_column)?;
    // Charge-off column is required here only to guarantee derivation ran.
    table.require_column(CHARGE_OFF_AMOUNT_COLUMN)?;

    let states = buckets.names();
    let mut weights = vec![0.0; states.len()];

    for (entity, indices) in table.group_rows(entity_col) {
        let &last = indices.last().expect("groups are non-empty");
        let state = table.rows[last][status_col].render();
        let i = buckets.index_of(&state).ok_or_else(|| {
            PipelineError::computation(
                "distribution",
                format!("entity '{}': state '{}' is not a declared bucket", entity, state),
            )
        })?;
        let balance = table.rows[last][balance_col].as_f64().ok_or_else(|| {
            PipelineError::computation(
                "distribution",
                format!("entity '{}': final-period balance is not numeric", entity),
            )
        })?;
        weights[i] += balance;
    }

    let total: f64 = weights.iter().sum();
    if total <= 0.0 {
        return Err(PipelineError::computation(
            "distribution",
            "total final-period balance is zero; no distribution can be formed",
        ));
    }

    let shares = weights.iter().map(|w| w / total).collect();
    Ok(Distribution { states, shares })
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::buckets::prepare;
    use crate::features::derive;
    use crate::table::{DataTable, Value};

    fn feature_table(rows: &[(&str, i64, i64, f64)]) -> (DataTable, BucketSet, RunConfig) {
        let config = RunConfig::default_test();
        let buckets = config.loan_buckets.validate().unwrap();
        let mut t = DataTable::new(vec![
            "LOAN_ID".to_string(),
            "ACT_PERIOD".to_string(),
            "DLQ_STATUS".to_string(),
            "CURRENT_UPB".to_string(),
            "ORIG_TERM".to_string(),
        ]);
        for (id, period, status, upb) in rows {
            t.push_row(vec![
                Value::Str(id.to_string()),
                Value::Int(*period),
                Value::Int(*status),
                Value::Float(*upb),
                Value::Int(360),
            ])
            .unwrap();
        }
        let prepared = prepare(&t, &buckets, &config).unwrap();
        let features = derive(&prepared, &buckets, &config).unwrap();
        (features, buckets, config)
    }

    const SCENARIO: &[(&str, i64, i64, f64)] = &[
        ("L1", 1, 0, 100.0),
        ("L1", 2, 1, 100.0),
        ("L1", 3, 4, 100.0),
        ("L2", 1, 0, 100.0),
        ("L2", 2, 0, 100.0),
        ("L2", 3, 0, 100.0),
    ];

    #[test]
    fn test_estimate_counts_and_normalizes() {
        let (t, buckets, _) = feature_table(SCENARIO);
        let m = estimate(&t, &buckets).unwrap();
        assert_eq!(m.states, vec!["Current", "30 DPD", "Charged Off"]);
        assert_eq!(m.probs[0], vec![0.75, 0.25, 0.0]);
        assert_eq!(m.probs[1], vec![0.0, 0.0, 1.0]);
        assert_eq!(m.probs[2], vec![0.0, 0.0, 1.0]);
    }

    #[test]
    fn test_observed_rows_sum_to_one() {
        let (t, buckets, _) = feature_table(SCENARIO);
        let m = estimate(&t, &buckets).unwrap();
        for sum in m.row_sums() {
            assert!((sum - 1.0).abs() < 1e-9);
        }
    }

    #[test]
    fn test_unobserved_bucket_yields_zero_row() {
        // No loan ever visits 30 DPD.
        let (t, buckets, _) = feature_table(&[("L1", 1, 0, 100.0), ("L1", 2, 0, 100.0)]);
        let m = estimate(&t, &buckets).unwrap();
        assert_eq!(m.probs[1], vec![0.0, 0.0, 0.0]);
        assert_eq!(m.row_sums()[1], 0.0);
    }

    #[test]
    fn test_power_zero_is_identity() {
        let (t, buckets, _) = feature_table(SCENARIO);
        let m = estimate(&t, &buckets).unwrap();
        let p0 = m.power(0);
        assert_eq!(p0.probs[0], vec![1.0, 0.0, 0.0]);
        let p1 = m.power(1);
        assert_eq!(p1.probs[0], m.probs[0]);
    }

    #[test]
    fn test_power_two_matches_hand_computation() {
        let (t, buckets, _) = feature_table(SCENARIO);
        let m = estimate(&t, &buckets).unwrap();
        let p2 = m.power(2);
        // Current → Current two periods: 0.75²
        assert!((p2.get("Current", "Current").unwrap() - 0.5625).abs() < 1e-12);
        // Current → Charged Off two periods: 0.25 (through 30 DPD)
        assert!((p2.get("Current", "Charged Off").unwrap() - 0.25).abs() < 1e-12);
    }

    #[test]
    fn test_distribution_sums_to_one_and_ignores_charged_off_balance() {
        let (t, buckets, config) = feature_table(SCENARIO);
        let d = current_distribution(&t, &buckets, &config).unwrap();
        assert!((d.sum() - 1.0).abs() < 1e-12);
        // L1 ended charged-off with a zeroed balance; all mass sits on
        // L2's Current bucket.
        assert_eq!(d.shares, vec![1.0, 0.0, 0.0]);
    }

    #[test]
    fn test_distribution_zero_total_balance_is_computation_error() {
        let (t, buckets, config) = feature_table(&[("L1", 1, 4, 100.0)]);
        let err = current_distribution(&t, &buckets, &config).unwrap_err();
        assert!(matches!(err, PipelineError::Computation { .. }));
    }

    #[test]
    fn test_matrix_json_keyed_by_bucket_names() {
        let (t, buckets, _) = feature_table(SCENARIO);
        let m = estimate(&t, &buckets).unwrap();
        let json = m.to_json();
        assert_eq!(json["Current"]["30 DPD"], serde_json::json!(0.25));
        assert_eq!(json["Charged Off"]["Charged Off"], serde_json::json!(1.0));
    }
}
