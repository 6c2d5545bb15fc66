// 🪣 Bucket Preparer - restrict, order, and filter the normalized table
// Output is the authoritative input to feature derivation

use crate::config::{BucketSet, RunConfig};
use crate::error::PipelineResult;
use crate::table::DataTable;

/// Prepare the normalized table for the transition model:
///   1. project down to the configured required columns,
///   2. group by entity and sort each group by period ascending,
///   3. drop rows whose status code is not a declared bucket code
///      (out-of-scope sentinels like "closed"/"repurchased" are noise,
///      not errors).
///
/// The bucket invariant (`bucket_count == bucket_map.len()`) must have
/// been validated before this runs; the `BucketSet` argument is the proof.
pub fn prepare(
    table: &DataTable,
    buckets: &BucketSet,
    config: &RunConfig,
) -> PipelineResult<DataTable> {
    log::info!(
        "preparing table for bucketing: {} required column(s)",
        config.required_cols.len()
    );
    let projected = table.select_columns(&config.required_cols)?;

    let entity_col = projected.require_column(&config.entity_column)?;
    let period_col = projected.require_column(&config.period_column)?;
    let status_col = projected.require_column(&config.status_column)?;

    let mut out = DataTable::new(projected.columns.clone());
    let mut dropped = 0usize;

    for (_, mut indices) in projected.group_rows(entity_col) {
        projected.sort_indices_by(&mut indices, period_col);
        for i in indices {
            let in_scope = projected.rows[i][status_col]
                .as_code()
                .map(|code| buckets.contains_code(code))
                .unwrap_or(false);
            if in_scope {
                out.push_row(projected.rows[i].clone())?;
            } else {
                dropped += 1;
            }
        }
    }

    if dropped > 0 {
        log::info!("dropped {} row(s) with out-of-scope status codes", dropped);
    }
    log::info!("bucket preparation complete: {} row(s)", out.row_count());
    Ok(out)
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::table::Value;

    fn raw_table(rows: &[(&str, i64, i64, f64)]) -> DataTable {
        let mut t = DataTable::new(vec![
            "LOAN_ID".to_string(),
            "ACT_PERIOD".to_string(),
            "DLQ_STATUS".to_string(),
            "CURRENT_UPB".to_string(),
            "ORIG_TERM".to_string(), // extra column dropped by projection
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
        t
    }

    fn prepared(rows: &[(&str, i64, i64, f64)]) -> DataTable {
        let config = RunConfig::default_test();
        let buckets = config.loan_buckets.validate().unwrap();
        prepare(&raw_table(rows), &buckets, &config).unwrap()
    }

    #[test]
    fn test_projects_to_required_columns() {
        let out = prepared(&[("L1", 1, 0, 100.0)]);
        assert_eq!(
            out.columns,
            vec!["LOAN_ID", "ACT_PERIOD", "DLQ_STATUS", "CURRENT_UPB"]
        );
    }

    #[test]
    fn test_sorts_within_entity_by_period() {
        let out = prepared(&[
            ("L1", 3, 4, 100.0),
            ("L1", 1, 0, 100.0),
            ("L1", 2, 1, 100.0),
        ]);
        let period = out.column_index("ACT_PERIOD").unwrap();
        let periods: Vec<i64> = out
            .rows
            .iter()
            .map(|r| r[period].as_code().unwrap())
            .collect();
        assert_eq!(periods, vec![1, 2, 3]);
    }

    #[test]
    fn test_drops_out_of_scope_status_codes() {
        // Code 9 (say, "repurchased") is not in the bucket map.
        let out = prepared(&[("L1", 1, 0, 100.0), ("L1", 2, 9, 100.0), ("L1", 3, 1, 100.0)]);
        assert_eq!(out.row_count(), 2);
        let status = out.column_index("DLQ_STATUS").unwrap();
        assert!(out.rows.iter().all(|r| r[status].as_code() != Some(9)));
    }

    #[test]
    fn test_null_status_rows_are_dropped() {
        let config = RunConfig::default_test();
        let buckets = config.loan_buckets.validate().unwrap();
        let mut t = raw_table(&[("L1", 1, 0, 100.0)]);
        let status = t.column_index("DLQ_STATUS").unwrap();
        t.rows[0][status] = Value::Null;
        let out = prepare(&t, &buckets, &config).unwrap();
        assert_eq!(out.row_count(), 0);
    }

    #[test]
    fn test_missing_required_column_is_configuration_error() {
        let config = RunConfig::default_test();
        let buckets = config.loan_buckets.validate().unwrap();
        let t = DataTable::new(vec!["LOAN_ID".to_string()]);
        assert!(prepare(&t, &buckets, &config).is_err());
    }

    #[test]
    fn test_entities_keep_first_appearance_order() {
        let out = prepared(&[("L2", 1, 0, 50.0), ("L1", 1, 0, 100.0), ("L2", 2, 1, 50.0)]);
        let id = out.column_index("LOAN_ID").unwrap();
        let ids: Vec<String> = out.rows.iter().map(|r| r[id].render()).collect();
        assert_eq!(ids, vec!["L2", "L2", "L1"]);
    }
}
