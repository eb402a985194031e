use thiserror::Error;

/// An error raised by contradictory or unsatisfiable cluster constraints
///
/// These are checked before any search takes place and are never corrected automatically.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConstraintSpecError {
    #[error("min_cluster_size {min} is greater than max_cluster_size {max}")]
    ContradictorySizes { min: usize, max: usize },
    #[error("max_cluster_size cannot be 0")]
    ZeroMaxSize,
    #[error("temperature_tolerance must be in [0, 1], got {0}")]
    InvalidTolerance(f64),
    #[error("max_n_iterations cannot be 0")]
    ZeroIterations,
    #[error("{n_clusters} clusters of at least {min_cluster_size} stores need more than the {n_stores} stores available")]
    Infeasible {
        min_cluster_size: usize,
        n_clusters: usize,
        n_stores: usize,
    },
    #[error("max_clusters {max_clusters} is lower than the {n_clusters} clusters requested")]
    MaxClustersBelowK {
        max_clusters: usize,
        n_clusters: usize,
    },
}
