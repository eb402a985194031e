use storemix_clustering::{ConstraintSpecError, KMeansError};
use storemix_preprocessing::FeatureSpecError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, RunError>;

/// Every way a clustering run can fail
///
/// A run whose constraints could only be partially met is not an error, see
/// [`ClusteringResult::violations`](crate::ClusteringResult::violations).
#[derive(Error, Debug)]
pub enum RunError {
    #[error("invalid run configuration: {0}")]
    Config(String),
    #[error(transparent)]
    ConstraintSpec(#[from] ConstraintSpecError),
    #[error(transparent)]
    FeatureSpec(#[from] FeatureSpecError),
    #[error(transparent)]
    KMeans(#[from] KMeansError),
    #[error(transparent)]
    Storemix(#[from] storemix::Error),
    #[error("invalid value `{value}` for store `{store}`, column `{column}`")]
    InvalidValue {
        store: String,
        column: String,
        value: String,
    },
    #[error("missing `{0}` column in the store table header")]
    MissingColumn(String),
    #[error(transparent)]
    Csv(#[from] csv::Error),
    #[error(transparent)]
    Json(#[from] serde_json::Error),
    #[error(transparent)]
    Io(#[from] std::io::Error),
}
