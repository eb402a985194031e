//! `storemix` groups retail stores into clusters of similar product-mix behavior under hard
//! operational constraints: every cluster must stay within a mandated size range and must not mix
//! stores of incompatible temperature bands.
//!
//! ## The big picture
//!
//! This crate holds the pieces every stage of a clustering run shares: the store records fed in
//! by the data acquisition stage, the numeric [`Float`] bound, hyperparameter checking through
//! [`ParamGuard`] and the quality metrics of a partition. The stages themselves live in the
//! workspace crates under `algorithms/`:
//!
//! * `storemix-preprocessing` builds weighted feature blocks from the store table
//! * `storemix-reduction` compresses high-dimensional blocks with PCA
//! * `storemix-clustering` computes the initial k-means partition and repairs it until every
//!   cluster satisfies its constraints
//! * `storemix-run` wires the stages together and produces the final report
//!

pub mod dataset;
pub mod error;
pub mod metrics_clustering;
pub mod param_guard;
pub mod prelude;
pub mod traits;

pub use dataset::{Float, StoreId, StoreRecord, StoreTable, TemperatureBand};
pub use error::{Error, Result};
pub use param_guard::ParamGuard;

/// Common metrics functions for clustering
pub mod metrics {
    pub use crate::metrics_clustering::{ClusterQuality, LabeledRecords};
}
