use log::warn;
#[cfg(feature = "serde")]
use serde_crate::{Deserialize, Serialize};

use crate::k_means::errors::{KMeansError, KMeansParamsError};

/// How the number of clusters of a run is chosen
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate", rename_all = "snake_case")
)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ClusterCount {
    /// Exactly this many clusters
    Fixed(usize),
    /// `ceil(n_stores / target_avg_size)` clusters
    TargetAvgSize(usize),
}

/// Client-mandated bounds `[min_k, max_k]` on the number of clusters
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate")
)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ClusterBounds {
    pub min_k: usize,
    pub max_k: usize,
}

/// Outcome of [`ClusterCount::resolve`]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct ResolvedCount {
    /// Number of clusters to fit
    pub k: usize,
    /// Number of clusters before clamping
    pub requested: usize,
    /// Whether `requested` fell outside the bounds
    pub clamped: bool,
}

impl ResolvedCount {
    /// Human readable description of the clamp, if any
    pub fn warning(&self) -> Option<String> {
        if self.clamped {
            Some(format!(
                "cluster count {} clamped to {}",
                self.requested, self.k
            ))
        } else {
            None
        }
    }
}

impl ClusterCount {
    /// Resolve the number of clusters for a population of `n_stores`.
    ///
    /// The requested value is clamped into `bounds` when they are given. Clamping is never an
    /// error, it is logged and reported through [`ResolvedCount::clamped`]. The resolved value
    /// must still be between 1 and `n_stores`.
    pub fn resolve(
        &self,
        n_stores: usize,
        bounds: Option<ClusterBounds>,
    ) -> Result<ResolvedCount, KMeansError> {
        let requested = match *self {
            ClusterCount::Fixed(0) => {
                return Err(KMeansError::InsufficientData {
                    n_samples: n_stores,
                    n_clusters: 0,
                })
            }
            ClusterCount::Fixed(k) => k,
            ClusterCount::TargetAvgSize(0) => {
                return Err(KMeansParamsError::TargetAvgSize.into())
            }
            ClusterCount::TargetAvgSize(size) => {
                n_stores / size + usize::from(n_stores % size != 0)
            }
        };

        let k = match bounds {
            Some(ClusterBounds { min_k, max_k }) => {
                if min_k == 0 || min_k > max_k {
                    return Err(KMeansParamsError::ClusterBounds(min_k, max_k).into());
                }
                requested.clamp(min_k, max_k)
            }
            None => requested,
        };

        let resolved = ResolvedCount {
            k,
            requested,
            clamped: k != requested,
        };
        if let Some(msg) = resolved.warning() {
            warn!("{}", msg);
        }

        if k == 0 || k > n_stores {
            return Err(KMeansError::InsufficientData {
                n_samples: n_stores,
                n_clusters: k,
            });
        }
        Ok(resolved)
    }
}
