use std::path::Path;

use rand::SeedableRng;
use rand_xoshiro::Xoshiro256Plus;
use serde_crate::{Deserialize, Serialize};
use storemix_clustering::{
    BalanceParams, ClusterBounds, ClusterCount, KMeans, KMeansInit, KMeansParams,
};
use storemix_preprocessing::{FeatureBlockBuilder, FeatureBlockBuilderParams, FeatureBlockSpec};

use crate::error::{Result, RunError};

/// Everything a clustering run is parameterised by
///
/// Exactly one of `k` and `target_avg_size` must be set. Options left out of a JSON document
/// take their default value:
///
/// ```
/// use storemix_run::RunConfig;
///
/// let config = RunConfig::from_json(r#"{
///     "target_avg_size": 25,
///     "min_k": 20,
///     "max_k": 40,
///     "min_cluster_size": 10,
///     "max_cluster_size": 60,
///     "temperature_tolerance": 0.1,
///     "blocks": [
///         { "name": "mix", "source_columns": ["sku-1", "sku-2"], "transforms": ["row_normalize"] },
///         { "name": "profile", "source_columns": ["area"], "weight": 0.5, "missing": "median" }
///     ]
/// }"#).unwrap();
///
/// assert_eq!(config.seed, 42);
/// assert_eq!(config.blocks[1].weight, 0.5);
/// ```
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(crate = "serde_crate", default, deny_unknown_fields)]
pub struct RunConfig {
    /// Fixed number of clusters
    pub k: Option<usize>,
    /// Number of clusters derived from the store count
    pub target_avg_size: Option<usize>,
    pub min_k: Option<usize>,
    pub max_k: Option<usize>,
    pub min_cluster_size: usize,
    pub max_cluster_size: usize,
    /// Maximum fraction of a cluster outside its dominant band, 0 for pure clusters
    pub temperature_tolerance: f64,
    /// Number of clusters the balancer may grow to, no growth when unset
    pub max_clusters: Option<usize>,
    /// Balancer move budget, ten moves per store when unset
    pub balance_max_n_iterations: Option<usize>,
    pub blocks: Vec<FeatureBlockSpec>,
    /// Scale every feature vector to unit norm
    pub normalize_rows: bool,
    pub seed: u64,
    pub n_runs: usize,
    pub init: KMeansInit,
    pub kmeans_max_n_iterations: u64,
    pub kmeans_tolerance: f64,
}

impl Default for RunConfig {
    fn default() -> Self {
        RunConfig {
            k: None,
            target_avg_size: None,
            min_k: None,
            max_k: None,
            min_cluster_size: 1,
            max_cluster_size: usize::MAX,
            temperature_tolerance: 0.0,
            max_clusters: None,
            balance_max_n_iterations: None,
            blocks: Vec::new(),
            normalize_rows: false,
            seed: 42,
            n_runs: 10,
            init: KMeansInit::KMeansPlusPlus,
            kmeans_max_n_iterations: 300,
            kmeans_tolerance: 1e-4,
        }
    }
}

impl RunConfig {
    /// A run with `k` clusters of `min_cluster_size..=max_cluster_size` stores
    pub fn with_k(k: usize, min_cluster_size: usize, max_cluster_size: usize) -> Self {
        RunConfig {
            k: Some(k),
            min_cluster_size,
            max_cluster_size,
            ..Default::default()
        }
    }

    /// A run with clusters of `target_avg_size` stores on average
    pub fn with_target_avg_size(
        target_avg_size: usize,
        min_cluster_size: usize,
        max_cluster_size: usize,
    ) -> Self {
        RunConfig {
            target_avg_size: Some(target_avg_size),
            min_cluster_size,
            max_cluster_size,
            ..Default::default()
        }
    }

    pub fn block(mut self, block: FeatureBlockSpec) -> Self {
        self.blocks.push(block);
        self
    }

    pub fn cluster_bounds(mut self, min_k: usize, max_k: usize) -> Self {
        self.min_k = Some(min_k);
        self.max_k = Some(max_k);
        self
    }

    pub fn temperature_tolerance(mut self, tolerance: f64) -> Self {
        self.temperature_tolerance = tolerance;
        self
    }

    pub fn max_clusters(mut self, max_clusters: usize) -> Self {
        self.max_clusters = Some(max_clusters);
        self
    }

    pub fn seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn normalize_rows(mut self, normalize_rows: bool) -> Self {
        self.normalize_rows = normalize_rows;
        self
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    pub fn from_json_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = std::fs::File::open(path)?;
        Ok(serde_json::from_reader(std::io::BufReader::new(file))?)
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub(crate) fn cluster_count(&self) -> Result<ClusterCount> {
        match (self.k, self.target_avg_size) {
            (Some(k), None) => Ok(ClusterCount::Fixed(k)),
            (None, Some(size)) => Ok(ClusterCount::TargetAvgSize(size)),
            (Some(_), Some(_)) => Err(RunError::Config(
                "`k` and `target_avg_size` are mutually exclusive".to_string(),
            )),
            (None, None) => Err(RunError::Config(
                "one of `k` and `target_avg_size` is required".to_string(),
            )),
        }
    }

    pub(crate) fn bounds(&self) -> Option<ClusterBounds> {
        match (self.min_k, self.max_k) {
            (None, None) => None,
            (min_k, max_k) => Some(ClusterBounds {
                min_k: min_k.unwrap_or(1),
                max_k: max_k.unwrap_or(usize::MAX),
            }),
        }
    }

    pub(crate) fn balance_params(&self) -> BalanceParams {
        let mut params = BalanceParams::new(self.min_cluster_size, self.max_cluster_size)
            .temperature_tolerance(self.temperature_tolerance);
        if let Some(max_clusters) = self.max_clusters {
            params = params.max_clusters(max_clusters);
        }
        if let Some(budget) = self.balance_max_n_iterations {
            params = params.max_n_iterations(budget);
        }
        params
    }

    pub(crate) fn feature_params(&self) -> FeatureBlockBuilderParams {
        FeatureBlockBuilder::params()
            .blocks(self.blocks.iter().cloned())
            .normalize_rows(self.normalize_rows)
    }

    pub(crate) fn kmeans_params(&self, k: usize) -> KMeansParams<f64, Xoshiro256Plus> {
        KMeans::params_with_rng(k, Xoshiro256Plus::seed_from_u64(self.seed))
            .n_runs(self.n_runs)
            .init_method(self.init)
            .max_n_iterations(self.kmeans_max_n_iterations)
            .tolerance(self.kmeans_tolerance)
    }
}
