// ⚙️ Run Configuration - one immutable document per pipeline run
// Connection parameters, column roles, bucket map, horizon, WARL

use crate::error::{PipelineError, PipelineResult};
use serde::Deserialize;
use std::collections::BTreeMap;
use std::path::Path;

// ============================================================================
// DOCUMENT SHAPE
// ============================================================================

/// Outer wrapper of the configuration document:
/// `{ "configuration": { ... } }`
#[derive(Debug, Clone, Deserialize)]
pub struct ConfigDocument {
    pub configuration: RunConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct RunConfig {
    /// "csv" or "db".
    pub source: String,

    pub attributes: SourceAttributes,

    #[serde(default)]
    pub data_specific_functions: DataFunctions,

    pub loan_buckets: LoanBuckets,

    /// Columns the model keeps; everything else is dropped at preparation.
    pub required_cols: Vec<String>,

    // Column roles. Defaults match the classic loan-tape layout.
    #[serde(default = "default_entity_column")]
    pub entity_column: String,
    #[serde(default = "default_period_column")]
    pub period_column: String,
    #[serde(default = "default_status_column")]
    pub status_column: String,
    #[serde(default = "default_balance_column")]
    pub balance_column: String,

    /// Projection horizon in periods.
    pub prediction_months: usize,

    /// Weighted-average remaining life scalar.
    #[serde(rename = "WARL")]
    pub warl: f64,
}

fn default_entity_column() -> String {
    "LOAN_ID".to_string()
}
fn default_period_column() -> String {
    "ACT_PERIOD".to_string()
}
fn default_status_column() -> String {
    "DLQ_STATUS".to_string()
}
fn default_balance_column() -> String {
    "CURRENT_UPB".to_string()
}

#[derive(Debug, Clone, Deserialize)]
pub struct SourceAttributes {
    #[serde(default)]
    pub delimiter: Option<String>,

    /// Explicit column names (headerless file), or the keyword "None"
    /// to infer the header from the file itself.
    #[serde(default)]
    pub names: ColumnNames,

    /// Declared semantic type per column.
    #[serde(default)]
    pub dtype: BTreeMap<String, String>,

    #[serde(default)]
    pub connection_details: Option<ConnectionDetails>,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum ColumnNames {
    List(Vec<String>),
    Keyword(String),
}

impl ColumnNames {
    /// The explicit name list, if one was declared.
    pub fn explicit(&self) -> Option<&[String]> {
        match self {
            ColumnNames::List(names) => Some(names),
            ColumnNames::Keyword(_) => None,
        }
    }
}

impl Default for ColumnNames {
    fn default() -> Self {
        ColumnNames::Keyword("None".to_string())
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct ConnectionDetails {
    pub engine: String,
    #[serde(default)]
    pub host: String,
    #[serde(default)]
    pub port: Option<u16>,
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub password: String,
    #[serde(default)]
    pub database_name: String,
    #[serde(default)]
    pub table: Option<String>,
    #[serde(default)]
    pub query: Option<String>,
}

#[derive(Debug, Clone, Deserialize, Default)]
pub struct DataFunctions {
    #[serde(default)]
    pub date_columns: BTreeMap<String, DateColumnSpec>,

    #[serde(default)]
    pub replace_values: Vec<ReplaceRule>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct DateColumnSpec {
    pub date_format: String,

    /// Separator characters stripped from raw values before compact
    /// positional parsing.
    #[serde(default)]
    pub separator: Vec<String>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ReplaceRule {
    pub column_name: String,
    pub values_to_replace: Vec<serde_json::Value>,
    pub values_to_replace_with: Vec<serde_json::Value>,
}

// ============================================================================
// BUCKETS
// ============================================================================

#[derive(Debug, Clone, Deserialize)]
pub struct LoanBuckets {
    pub bucket_count: usize,

    /// Status code → bucket name. serde_json's preserve_order feature keeps
    /// the declared order, which drives matrix row/column order downstream.
    pub bucket_map: serde_json::Map<String, serde_json::Value>,

    /// Explicit absorbing-state flag. The substring match on
    /// "charge"/"default" and the last-declared fallback remain as
    /// compatibility behavior when this is absent.
    #[serde(default)]
    pub absorbing_bucket: Option<String>,
}

/// A declared delinquency bucket: the Markov state for one status code.
#[derive(Debug, Clone, PartialEq)]
pub struct Bucket {
    pub code: i64,
    pub name: String,
}

/// The validated, declaration-ordered set of buckets for a run.
#[derive(Debug, Clone)]
pub struct BucketSet {
    buckets: Vec<Bucket>,
    absorbing: usize,
}

impl LoanBuckets {
    /// Check the bucket invariant and resolve the absorbing state.
    /// Must pass before any bucket-dependent stage runs.
    pub fn validate(&self) -> PipelineResult<BucketSet> {
        if self.bucket_count != self.bucket_map.len() {
            return Err(PipelineError::Configuration(format!(
                "bucket_count {} does not match the {} entries in bucket_map",
                self.bucket_count,
                self.bucket_map.len()
            )));
        }

        let mut buckets = Vec::with_capacity(self.bucket_map.len());
        for (key, value) in &self.bucket_map {
            let code = key.trim().parse::<i64>().map_err(|_| {
                PipelineError::Configuration(format!(
                    "bucket_map key '{}' is not a status code",
                    key
                ))
            })?;
            let name = value
                .as_str()
                .ok_or_else(|| {
                    PipelineError::Configuration(format!(
                        "bucket_map entry '{}' must name a bucket",
                        key
                    ))
                })?
                .to_string();
            buckets.push(Bucket { code, name });
        }

        let absorbing = match &self.absorbing_bucket {
            Some(flagged) => buckets
                .iter()
                .position(|b| &b.name == flagged)
                .ok_or_else(|| {
                    PipelineError::Configuration(format!(
                        "absorbing_bucket '{}' is not a declared bucket",
                        flagged
                    ))
                })?,
            None => buckets
                .iter()
                .position(|b| {
                    let lower = b.name.to_lowercase();
                    lower.contains("charge") || lower.contains("default")
                })
                .unwrap_or(buckets.len().saturating_sub(1)),
        };

        if buckets.is_empty() {
            return Err(PipelineError::Configuration(
                "bucket_map declares no buckets".to_string(),
            ));
        }

        Ok(BucketSet { buckets, absorbing })
    }
}

impl BucketSet {
    pub fn len(&self) -> usize {
        self.buckets.len()
    }

    pub fn is_empty(&self) -> bool {
        self.buckets.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &Bucket> {
        self.buckets.iter()
    }

    /// Bucket names in declaration order.
    pub fn names(&self) -> Vec<String> {
        self.buckets.iter().map(|b| b.name.clone()).collect()
    }

    pub fn name_for(&self, code: i64) -> Option<&str> {
        self.buckets
            .iter()
            .find(|b| b.code == code)
            .map(|b| b.name.as_str())
    }

    pub fn contains_code(&self, code: i64) -> bool {
        self.buckets.iter().any(|b| b.code == code)
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.buckets.iter().position(|b| b.name == name)
    }

    /// Name of the terminal charged-off state.
    pub fn charged_off(&self) -> &str {
        &self.buckets[self.absorbing].name
    }
}

// ============================================================================
// LOADING
// ============================================================================

impl RunConfig {
    /// Load the configuration document from a JSON file. File and parse
    /// problems are source errors: the run has no usable input.
    pub fn from_file(path: &Path) -> PipelineResult<RunConfig> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            PipelineError::Source(format!(
                "cannot read configuration file {}: {}",
                path.display(),
                e
            ))
        })?;
        Self::from_json(&content)
    }

    pub fn from_json(content: &str) -> PipelineResult<RunConfig> {
        let doc: ConfigDocument = serde_json::from_str(content).map_err(|e| {
            PipelineError::Source(format!("malformed configuration document: {}", e))
        })?;
        Ok(doc.configuration)
    }

    /// Config with hardcoded defaults for use in unit tests.
    pub fn default_test() -> RunConfig {
        let json = r#"{
            "configuration": {
                "source": "csv",
                "attributes": {
                    "delimiter": ",",
                    "names": "None",
                    "dtype": {
                        "LOAN_ID": "str",
                        "ACT_PERIOD": "int",
                        "DLQ_STATUS": "int",
                        "CURRENT_UPB": "float"
                    }
                },
                "data_specific_functions": {
                    "date_columns": {},
                    "replace_values": []
                },
                "loan_buckets": {
                    "bucket_count": 3,
                    "bucket_map": {
                        "0": "Current",
                        "1": "30 DPD",
                        "4": "Charged Off"
                    }
                },
                "required_cols": ["LOAN_ID", "ACT_PERIOD", "DLQ_STATUS", "CURRENT_UPB"],
                "prediction_months": 2,
                "WARL": 1.5
            }
        }"#;
        RunConfig::from_json(json).expect("test configuration parses")
    }
}

// ============================================================================
// TESTS
// ============================================================================
