//! Error definitions for feature block construction
use storemix_reduction::ReductionError;
use thiserror::Error;

pub type Result<T> = std::result::Result<T, FeatureSpecError>;

#[derive(Error, Debug)]
pub enum FeatureSpecError {
    #[error("feature block name cannot be empty")]
    EmptyName,
    #[error("feature block `{0}` has no source columns")]
    NoColumns(String),
    #[error("feature block `{0}` is declared more than once")]
    DuplicateBlock(String),
    #[error("output column `{0}` is produced by more than one block")]
    DuplicateColumn(String),
    #[error("feature block `{block}` has a malformed pipeline: {reason}")]
    MalformedPipeline { block: String, reason: String },
    #[error("feature block `{block}` has invalid weight {weight}")]
    InvalidWeight { block: String, weight: f64 },
    #[error("every feature block is disabled")]
    NoActiveBlock,
    #[error("column `{column}` of feature block `{block}` is absent from every store")]
    UnknownColumn { block: String, column: String },
    #[error("log1p of negative value {value} for store `{store}`, column `{column}`")]
    NegativeValue {
        store: String,
        column: String,
        value: f64,
    },
    #[error(transparent)]
    Reduction(#[from] ReductionError),
}
