#[cfg(feature = "serde")]
use serde_crate::{Deserialize, Serialize};
use storemix::ParamGuard;

use crate::balance::errors::ConstraintSpecError;

/// Checked constraints of the [balancer](BalanceValidParams::balance)
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate")
)]
#[derive(Clone, Debug, PartialEq)]
pub struct BalanceValidParams {
    min_cluster_size: usize,
    max_cluster_size: usize,
    temperature_tolerance: f64,
    max_clusters: Option<usize>,
    max_n_iterations: Option<usize>,
}

/// Builder for the cluster constraints
///
/// ```
/// use storemix::ParamGuard;
/// use storemix_clustering::BalanceParams;
///
/// let params = BalanceParams::new(3, 5).temperature_tolerance(0.1).check().unwrap();
/// assert_eq!(params.max_clusters(4), 4);
/// ```
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate")
)]
#[derive(Clone, Debug, PartialEq)]
pub struct BalanceParams(BalanceValidParams);

impl BalanceParams {
    /// Cluster sizes must end up in `[min_cluster_size, max_cluster_size]`.
    ///
    /// Defaults:
    /// * `temperature_tolerance = 0.0`, every cluster must be pure
    /// * `max_clusters`: the initial number of clusters, no cluster is ever opened
    /// * `max_n_iterations`: ten moves per store
    pub fn new(min_cluster_size: usize, max_cluster_size: usize) -> Self {
        BalanceParams(BalanceValidParams {
            min_cluster_size,
            max_cluster_size,
            temperature_tolerance: 0.0,
            max_clusters: None,
            max_n_iterations: None,
        })
    }

    /// Maximum fraction of the members of a cluster outside its dominant band
    pub fn temperature_tolerance(mut self, tolerance: f64) -> Self {
        self.0.temperature_tolerance = tolerance;
        self
    }

    /// Number of clusters the balancer may grow the partition to
    pub fn max_clusters(mut self, max_clusters: usize) -> Self {
        self.0.max_clusters = Some(max_clusters);
        self
    }

    /// Maximum number of moves
    pub fn max_n_iterations(mut self, max_n_iterations: usize) -> Self {
        self.0.max_n_iterations = Some(max_n_iterations);
        self
    }
}

impl ParamGuard for BalanceParams {
    type Checked = BalanceValidParams;
    type Error = ConstraintSpecError;

    fn check_ref(&self) -> Result<&Self::Checked, Self::Error> {
        let params = &self.0;
        if params.max_cluster_size == 0 {
            Err(ConstraintSpecError::ZeroMaxSize)
        } else if params.min_cluster_size > params.max_cluster_size {
            Err(ConstraintSpecError::ContradictorySizes {
                min: params.min_cluster_size,
                max: params.max_cluster_size,
            })
        } else if !(0.0..=1.0).contains(&params.temperature_tolerance) {
            Err(ConstraintSpecError::InvalidTolerance(
                params.temperature_tolerance,
            ))
        } else if params.max_n_iterations == Some(0) {
            Err(ConstraintSpecError::ZeroIterations)
        } else {
            Ok(params)
        }
    }

    fn check(self) -> Result<Self::Checked, Self::Error> {
        self.check_ref()?;
        Ok(self.0)
    }
}

impl BalanceValidParams {
    pub fn min_cluster_size(&self) -> usize {
        self.min_cluster_size
    }

    pub fn max_cluster_size(&self) -> usize {
        self.max_cluster_size
    }

    pub fn temperature_tolerance(&self) -> f64 {
        self.temperature_tolerance
    }

    /// Upper bound on the cluster count for a partition starting with `n_clusters` clusters
    pub fn max_clusters(&self, n_clusters: usize) -> usize {
        self.max_clusters.unwrap_or(n_clusters)
    }

    /// Move budget for a population of `n_stores`
    pub fn max_n_iterations(&self, n_stores: usize) -> usize {
        self.max_n_iterations.unwrap_or(10 * n_stores)
    }

    /// Fails when `n_clusters` clusters cannot all reach the minimum size with `n_stores` stores,
    /// or when growth is bounded below the starting cluster count
    pub fn check_feasibility(
        &self,
        n_stores: usize,
        n_clusters: usize,
    ) -> Result<(), ConstraintSpecError> {
        if self.min_cluster_size.saturating_mul(n_clusters) > n_stores {
            return Err(ConstraintSpecError::Infeasible {
                min_cluster_size: self.min_cluster_size,
                n_clusters,
                n_stores,
            });
        }
        let max_clusters = self.max_clusters(n_clusters);
        if max_clusters < n_clusters {
            return Err(ConstraintSpecError::MaxClustersBelowK {
                max_clusters,
                n_clusters,
            });
        }
        Ok(())
    }
}
