use thiserror::Error;

/// Error taxonomy for a pipeline run.
///
/// Configuration and Source errors are fatal and surface before / at the
/// ingestion boundary. Computation errors abort the run after the failing
/// stage has logged its context. Parse-level problems (bad date values,
/// untypeable columns) are NOT represented here: they degrade to nulls or
/// skipped columns with a recorded warning, and the run continues.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("configuration error: {0}")]
    Configuration(String),

    #[error("source error: {0}")]
    Source(String),

    #[error("computation error in {stage}: {message}")]
    Computation { stage: String, message: String },

    #[error("database error: {0}")]
    Database(#[from] rusqlite::Error),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error(transparent)]
    Other(#[from] anyhow::Error),
}

impl PipelineError {
    /// Shorthand for a computation failure tagged with its stage.
    pub fn computation(stage: &str, message: impl Into<String>) -> Self {
        PipelineError::Computation {
            stage: stage.to_string(),
            message: message.into(),
        }
    }
}

pub type PipelineResult<T> = Result<T, PipelineError>;
