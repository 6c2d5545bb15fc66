// 🧹 Preprocessor - normalization front half of the pipeline
// Duplicates → sentinel-value replacement → dtype conversion

use crate::config::{ReplaceRule, RunConfig};
use crate::dedupe::{self, DuplicateMode, KeepPolicy};
use crate::dtypes;
use crate::error::{PipelineError, PipelineResult};
use crate::table::{DataTable, Value};

// ============================================================================
// VALUE REMAPPER
// ============================================================================

/// Apply one replacement rule: every exact match of an old value in the
/// named column becomes the paired new value. Replacement happens before
/// typing, so matching is on the value as written (a sentinel written as
/// the number 999 in configuration matches the cell "999" on the tape).
fn apply_rule(table: &mut DataTable, rule: &ReplaceRule) -> PipelineResult<usize> {
    let col = table.column_index(&rule.column_name).ok_or_else(|| {
        PipelineError::Configuration(format!(
            "replace_values rule targets column '{}' which is not present",
            rule.column_name
        ))
    })?;

    if rule.values_to_replace.len() != rule.values_to_replace_with.len() {
        return Err(PipelineError::Configuration(format!(
            "replace_values rule for '{}' pairs {} old values with {} replacements",
            rule.column_name,
            rule.values_to_replace.len(),
            rule.values_to_replace_with.len()
        )));
    }

    let mut replaced = 0usize;
    for (old, new) in rule
        .values_to_replace
        .iter()
        .zip(&rule.values_to_replace_with)
    {
        let old_value = Value::from_json(old);
        let new_value = Value::from_json(new);
        let old_rendered = old_value.render();
        for row in table.rows.iter_mut() {
            let cell = &row[col];
            let matches = if old_value.is_null() {
                cell.is_null()
            } else {
                !cell.is_null() && cell.render() == old_rendered
            };
            if matches {
                row[col] = new_value.clone();
                replaced += 1;
            }
        }
    }
    Ok(replaced)
}

/// Apply every configured replacement rule, in declaration order.
/// A rule naming an absent column is fatal for the run.
pub fn replace_values(table: &mut DataTable, config: &RunConfig) -> PipelineResult<()> {
    for rule in &config.data_specific_functions.replace_values {
        let replaced = apply_rule(table, rule)?;
        log::info!(
            "replaced {} value(s) in column '{}'",
            replaced,
            rule.column_name
        );
    }
    Ok(())
}

// ============================================================================
// ORCHESTRATION
// ============================================================================

/// Full normalization pass over a freshly ingested table:
///   1. duplicate removal (full-row key, first occurrence kept)
///   2. sentinel-value replacement
///   3. date normalization + dtype conversion
pub fn preprocess(table: DataTable, config: &RunConfig) -> PipelineResult<DataTable> {
    log::info!("preprocessing {} row(s)", table.row_count());

    let mut cleaned = dedupe::resolve(&table, DuplicateMode::Remove, None, KeepPolicy::First)?;
    log::info!("duplicate handling complete: {} row(s)", cleaned.row_count());

    replace_values(&mut cleaned, config)?;

    dtypes::convert_columns(&mut cleaned, config)?;
    log::info!("dtype conversion complete");

    Ok(cleaned)
}

// ============================================================================
// TESTS
// ============================================================================
