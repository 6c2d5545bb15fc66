// 🔍 Duplicate Resolver - detect and handle repeated loan records
// Group identity is a SHA-256 over the key columns' rendered values

use crate::error::PipelineResult;
use crate::table::{DataTable, Value};
use sha2::{Digest, Sha256};

// ============================================================================
// MODES
// ============================================================================

/// How to handle duplicate groups.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DuplicateMode {
    /// Drop all but one row per duplicate group.
    Remove,
    /// Leave every row, add a boolean `is_duplicate` column.
    Mark,
    /// Drop all but the last occurrence, regardless of keep policy.
    KeepLast,
}

impl DuplicateMode {
    pub fn from_name(name: &str) -> Option<DuplicateMode> {
        match name.trim().to_lowercase().as_str() {
            "remove" => Some(DuplicateMode::Remove),
            "mark" => Some(DuplicateMode::Mark),
            "keep_last" => Some(DuplicateMode::KeepLast),
            _ => None,
        }
    }
}

/// Which row of a duplicate group survives under `Remove`, and which is
/// left unmarked under `Mark`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum KeepPolicy {
    First,
    Last,
}

/// Column added by `Mark` mode.
pub const IS_DUPLICATE_COLUMN: &str = "is_duplicate";

// ============================================================================
// RESOLUTION
// ============================================================================

/// Identity hash of one row under the duplicate key, in the same spirit as
/// an idempotency hash: same key values → same digest.
fn group_hash(row: &[Value], key_indices: &[usize]) -> String {
    let mut hasher = Sha256::new();
    for &i in key_indices {
        hasher.update(row[i].render());
        // Field delimiter so ("ab","c") and ("a","bc") differ.
        hasher.update([0x1f]);
    }
    format!("{:x}", hasher.finalize())
}

/// Resolve duplicates under the given key. `key_columns = None` means the
/// whole row is the key. If no duplicates exist, the table is returned
/// unchanged. Row order of survivors is preserved.
pub fn resolve(
    table: &DataTable,
    mode: DuplicateMode,
    key_columns: Option<&[String]>,
    keep: KeepPolicy,
) -> PipelineResult<DataTable> {
    let key_indices: Vec<usize> = match key_columns {
        Some(names) => {
            let mut indices = Vec::with_capacity(names.len());
            for name in names {
                indices.push(table.require_column(name)?);
            }
            indices
        }
        None => (0..table.columns.len()).collect(),
    };

    // hash → row indices, in first-appearance order.
    let mut groups: Vec<Vec<usize>> = Vec::new();
    let mut seen: std::collections::HashMap<String, usize> = std::collections::HashMap::new();
    for (i, row) in table.rows.iter().enumerate() {
        let hash = group_hash(row, &key_indices);
        match seen.get(&hash) {
            Some(&pos) => groups[pos].push(i),
            None => {
                seen.insert(hash, groups.len());
                groups.push(vec![i]);
            }
        }
    }

    let duplicate_rows: usize = groups
        .iter()
        .filter(|g| g.len() > 1)
        .map(|g| g.len() - 1)
        .sum();
    if duplicate_rows == 0 {
        log::info!("no duplicates found under the configured key");
        return Ok(table.clone());
    }
    log::info!("{} duplicate row(s) found", duplicate_rows);

    match mode {
        DuplicateMode::Remove => Ok(keep_one_per_group(table, &groups, keep)),
        DuplicateMode::KeepLast => Ok(keep_one_per_group(table, &groups, KeepPolicy::Last)),
        DuplicateMode::Mark => {
            let mut marked = table.clone();
            let mut flags = vec![Value::Bool(false); table.rows.len()];
            for group in &groups {
                if group.len() < 2 {
                    continue;
                }
                let kept = match keep {
                    KeepPolicy::First => group[0],
                    KeepPolicy::Last => *group.last().expect("non-empty group"),
                };
                for &i in group {
                    if i != kept {
                        flags[i] = Value::Bool(true);
                    }
                }
            }
            marked.add_column(IS_DUPLICATE_COLUMN, flags)?;
            Ok(marked)
        }
    }
}

/// Resolve with a mode name taken straight from configuration. An unknown
/// name is reported as an invalid choice and the table passes through
/// unchanged (non-fatal).
pub fn resolve_named(
    table: &DataTable,
    mode_name: &str,
    key_columns: Option<&[String]>,
    keep: KeepPolicy,
) -> PipelineResult<DataTable> {
    match DuplicateMode::from_name(mode_name) {
        Some(mode) => resolve(table, mode, key_columns, keep),
        None => {
            log::error!(
                "invalid duplicate handling mode '{}'; choose remove, mark, or keep_last — data left unchanged",
                mode_name
            );
            Ok(table.clone())
        }
    }
}

fn keep_one_per_group(table: &DataTable, groups: &[Vec<usize>], keep: KeepPolicy) -> DataTable {
    let mut survivors: Vec<usize> = groups
        .iter()
        .map(|group| match keep {
            KeepPolicy::First => group[0],
            KeepPolicy::Last => *group.last().expect("non-empty group"),
        })
        .collect();
    survivors.sort_unstable();

    DataTable {
        columns: table.columns.clone(),
        rows: survivors
            .into_iter()
            .map(|i| table.rows[i].clone())
            .collect(),
    }
}

// ============================================================================
// TESTS
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn loan_table(rows: &[(&str, i64, f64)]) -> DataTable {
        let mut t = DataTable::new(vec![
            "LOAN_ID".to_string(),
            "ACT_PERIOD".to_string(),
            "CURRENT_UPB".to_string(),
        ]);
        for (id, period, upb) in rows {
            t.push_row(vec![
                Value::Str(id.to_string()),
                Value::Int(*period),
                Value::Float(*upb),
            ])
            .unwrap();
        }
        t
    }

    #[test]
    fn test_remove_keeps_first_occurrence() {
        let t = loan_table(&[("L1", 1, 100.0), ("L1", 1, 100.0), ("L2", 1, 50.0)]);
        let out = resolve(&t, DuplicateMode::Remove, None, KeepPolicy::First).unwrap();
        assert_eq!(out.row_count(), 2);
        assert_eq!(out.rows[0][0], Value::Str("L1".into()));
        assert_eq!(out.rows[1][0], Value::Str("L2".into()));
    }

    #[test]
    fn test_remove_with_keep_last_policy() {
        let t = loan_table(&[("L1", 1, 100.0), ("L2", 1, 50.0), ("L1", 1, 100.0)]);
        let out = resolve(&t, DuplicateMode::Remove, None, KeepPolicy::Last).unwrap();
        assert_eq!(out.row_count(), 2);
        // Survivor of the L1 group is the later row; original order kept.
        assert_eq!(out.rows[0][0], Value::Str("L2".into()));
        assert_eq!(out.rows[1][0], Value::Str("L1".into()));
    }

    #[test]
    fn test_mark_adds_boolean_column() {
        let t = loan_table(&[("L1", 1, 100.0), ("L1", 1, 100.0), ("L2", 1, 50.0)]);
        let out = resolve(&t, DuplicateMode::Mark, None, KeepPolicy::First).unwrap();
        assert_eq!(out.row_count(), 3);
        let col = out.column_index(IS_DUPLICATE_COLUMN).unwrap();
        assert_eq!(out.rows[0][col], Value::Bool(false));
        assert_eq!(out.rows[1][col], Value::Bool(true));
        assert_eq!(out.rows[2][col], Value::Bool(false));
    }

    #[test]
    fn test_keep_last_mode() {
        let t = loan_table(&[("L1", 1, 100.0), ("L1", 1, 100.0)]);
        let out = resolve(&t, DuplicateMode::KeepLast, None, KeepPolicy::First).unwrap();
        assert_eq!(out.row_count(), 1);
    }

    #[test]
    fn test_subset_key_columns() {
        // Same (LOAN_ID, ACT_PERIOD), different balances: duplicates under
        // the subset key, not under the full row.
        let t = loan_table(&[("L1", 1, 100.0), ("L1", 1, 90.0)]);
        let full = resolve(&t, DuplicateMode::Remove, None, KeepPolicy::First).unwrap();
        assert_eq!(full.row_count(), 2);

        let key = vec!["LOAN_ID".to_string(), "ACT_PERIOD".to_string()];
        let subset = resolve(&t, DuplicateMode::Remove, Some(&key), KeepPolicy::First).unwrap();
        assert_eq!(subset.row_count(), 1);
        assert_eq!(subset.rows[0][2], Value::Float(100.0));
    }

    #[test]
    fn test_no_duplicates_returns_table_unchanged() {
        let t = loan_table(&[("L1", 1, 100.0), ("L1", 2, 90.0)]);
        let out = resolve(&t, DuplicateMode::Remove, None, KeepPolicy::First).unwrap();
        assert_eq!(out.row_count(), 2);
    }

    #[test]
    fn test_unknown_mode_is_nonfatal_passthrough() {
        let t = loan_table(&[("L1", 1, 100.0), ("L1", 1, 100.0)]);
        let out = resolve_named(&t, "count", None, KeepPolicy::First).unwrap();
        assert_eq!(out.row_count(), 2);
    }

    #[test]
    fn test_missing_key_column_is_configuration_error() {
        let t = loan_table(&[("L1", 1, 100.0)]);
        let key = vec!["NOPE".to_string()];
        assert!(resolve(&t, DuplicateMode::Remove, Some(&key), KeepPolicy::First).is_err());
    }
}
