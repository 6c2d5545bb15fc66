// 🗄️ Report Store - model-run reports persisted to SQLite
// Save assigns an identifier; point lookup + paginated listing

use crate::error::PipelineResult;
use crate::loss::LossMetrics;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection, OptionalExtension};
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Maximum rows a listing page may request.
pub const MAX_PAGE_SIZE: usize = 100;

// ============================================================================
// REPORT DOCUMENT
// ============================================================================

/// The report document handed to persistence after a successful run.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    #[serde(rename = "type")]
    pub report_type: String,
    pub report_name: String,
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_file: Option<String>,
    pub result: serde_json::Value,
}

/// Assemble the report payload from the run's loss metrics.
pub fn build_report(
    metrics: &LossMetrics,
    report_name: &str,
    source_file: Option<&str>,
) -> Report {
    let mut result = serde_json::Map::new();
    result.insert("Transition_Matrix".to_string(), metrics.matrix.to_json());
    result.insert("Distribution".to_string(), metrics.distribution.to_json());
    result.insert("CGL_Curve".to_string(), metrics.curve.to_json());
    result.insert("ALLL".to_string(), serde_json::json!(metrics.allowance));
    result.insert("CECL_Factor".to_string(), serde_json::json!(metrics.cecl_factor));
    result.insert("WARL".to_string(), serde_json::json!(metrics.warl));
    result.insert("CECL_Amount".to_string(), serde_json::json!(metrics.cecl_amount));
    result.insert(
        "Opening_Balance".to_string(),
        serde_json::json!(metrics.opening_balance),
    );
    result.insert(
        "Ending_Balance".to_string(),
        serde_json::json!(metrics.ending_balance),
    );

    Report {
        report_type: "tmm".to_string(),
        report_name: report_name.to_string(),
        created_at: Utc::now(),
        source_file: source_file.map(|s| s.to_string()),
        result: serde_json::Value::Object(result),
    }
}

// ============================================================================
// STORE
// ============================================================================

/// A stored report as returned by point lookup.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredReport {
    pub id: String,
    pub report_name: String,
    pub report_type: String,
    pub processed_at: String,
    pub document: serde_json::Value,
}

/// One row of a listing page.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportSummary {
    pub id: String,
    pub report_name: String,
    pub report_type: String,
    pub processed_at: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Pagination {
    pub total_reports: i64,
    pub total_pages: i64,
    pub current_page: usize,
    pub page_size: usize,
    pub has_next: bool,
    pub has_prev: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ReportPage {
    pub reports: Vec<ReportSummary>,
    pub pagination: Pagination,
}

/// SQLite-backed report persistence. The collaborator the pipeline hands
/// its final artifact to; nothing else in a run outlives the run.
pub struct ReportStore {
    conn: Connection,
}

impl ReportStore {
    pub fn open(path: &Path) -> PipelineResult<ReportStore> {
        let conn = Connection::open(path)?;
        Self::setup(&conn)?;
        Ok(ReportStore { conn })
    }

    pub fn open_in_memory() -> PipelineResult<ReportStore> {
        let conn = Connection::open_in_memory()?;
        Self::setup(&conn)?;
        Ok(ReportStore { conn })
    }

    fn setup(conn: &Connection) -> PipelineResult<()> {
        // WAL mode for crash recovery
        conn.pragma_update(None, "journal_mode", "WAL")?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS reports (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                report_id TEXT UNIQUE NOT NULL,
                report_name TEXT NOT NULL,
                report_type TEXT NOT NULL,
                created_at TEXT NOT NULL,
                processed_at TEXT NOT NULL,
                source_file TEXT,
                document TEXT NOT NULL
            )",
            [],
        )?;

        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_reports_processed_at
             ON reports(processed_at)",
            [],
        )?;

        Ok(())
    }

    /// Persist a report. Assigns and returns its identifier; stamps the
    /// processing time.
    pub fn save(&self, report: &Report) -> PipelineResult<String> {
        let report_id = uuid::Uuid::new_v4().to_string();
        let processed_at = Utc::now().to_rfc3339();
        let document = serde_json::to_string(report)?;

        self.conn.execute(
            "INSERT INTO reports (
                report_id, report_name, report_type, created_at,
                processed_at, source_file, document
            ) VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
            params![
                report_id,
                report.report_name,
                report.report_type,
                report.created_at.to_rfc3339(),
                processed_at,
                report.source_file,
                document,
            ],
        )?;

        log::info!("report saved with id {}", report_id);
        Ok(report_id)
    }

    /// Point lookup by identifier.
    pub fn get(&self, report_id: &str) -> PipelineResult<Option<StoredReport>> {
        let row = self
            .conn
            .query_row(
                "SELECT report_id, report_name, report_type, processed_at, document
                 FROM reports WHERE report_id = ?1",
                params![report_id],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, String>(3)?,
                        row.get::<_, String>(4)?,
                    ))
                },
            )
            .optional()?;

        match row {
            Some((id, report_name, report_type, processed_at, document)) => {
                let document = serde_json::from_str(&document)?;
                Ok(Some(StoredReport {
                    id,
                    report_name,
                    report_type,
                    processed_at,
                    document,
                }))
            }
            None => Ok(None),
        }
    }

    /// Paginated listing, newest processing time first. `page` is
    /// 1-based; `page_size` is clamped to 1..=100.
    pub fn list(&self, page: usize, page_size: usize) -> PipelineResult<ReportPage> {
        let page = page.max(1);
        let page_size = page_size.clamp(1, MAX_PAGE_SIZE);
        let offset = (page - 1) * page_size;

        let total_reports: i64 =
            self.conn
                .query_row("SELECT COUNT(*) FROM reports", [], |row| row.get(0))?;

        let mut stmt = self.conn.prepare(
            "SELECT report_id, report_name, report_type, processed_at
             FROM reports
             ORDER BY processed_at DESC, id DESC
             LIMIT ?1 OFFSET ?2",
        )?;
        let reports = stmt
            .query_map(params![page_size as i64, offset as i64], |row| {
                Ok(ReportSummary {
                    id: row.get(0)?,
                    report_name: row.get(1)?,
                    report_type: row.get(2)?,
                    processed_at: row.get(3)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        let total_pages = (total_reports + page_size as i64 - 1) / page_size as i64;
        Ok(ReportPage {
            reports,
            pagination: Pagination {
                total_reports,
                total_pages,
                current_page: page,
                page_size,
                has_next: (page as i64) < total_pages,
                has_prev: page > 1,
            },
        })
    }
}

// ============================================================================
// TESTS
// ============================================================================
