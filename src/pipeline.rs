// 🏭 Pipeline - ingested table → loss metrics, stage by stage
// Config is threaded explicitly; no stage reads ambient state

use crate::buckets;
use crate::config::RunConfig;
use crate::error::PipelineResult;
use crate::features;
use crate::loss::{self, LossMetrics};
use crate::matrix;
use crate::preprocess;
use crate::projection;
use crate::table::DataTable;

/// Run the full model over a freshly ingested table:
///
/// raw table → normalized table → bucket-filtered table →
/// feature-augmented table → {transition matrix, distribution} →
/// projection curve → scalar loss metrics.
///
/// The bucket invariant is checked before any bucket-dependent stage;
/// a mismatch aborts here and nothing further executes. Each run is
/// independent: everything is built fresh from the input table, and the
/// only artifact that survives is the returned metrics payload.
pub fn run(config: &RunConfig, table: DataTable) -> PipelineResult<LossMetrics> {
    let bucket_set = config.loan_buckets.validate()?;
    log::info!(
        "bucket configuration loaded: {} bucket(s), charged-off state '{}'",
        bucket_set.len(),
        bucket_set.charged_off()
    );

    let cleaned = preprocess::preprocess(table, config)?;
    let prepared = buckets::prepare(&cleaned, &bucket_set, config)?;
    let augmented = features::derive(&prepared, &bucket_set, config)?;

    // Computation failures are logged with their stage context before
    // being re-raised; silent continuation would corrupt the metrics.
    let transition_matrix = matrix::estimate(&augmented, &bucket_set).map_err(|e| {
        log::error!("{}", e);
        e
    })?;
    let distribution =
        matrix::current_distribution(&augmented, &bucket_set, config).map_err(|e| {
            log::error!("{}", e);
            e
        })?;
    let curve = projection::project(
        &distribution,
        &transition_matrix,
        config.prediction_months,
        bucket_set.charged_off(),
    )?;

    loss::compute(curve, transition_matrix, distribution, &augmented, config)
}

// ============================================================================
// TESTS
// ============================================================================
