use log::info;
use ndarray::Array2;
use storemix::metrics::{ClusterQuality, LabeledRecords};
use storemix::traits::Fit;
use storemix::{ParamGuard, StoreTable};
use storemix_clustering::{KMeans, KMeansError, Partition};
use storemix_preprocessing::{FeatureMatrix, FeatureSpecError};

use crate::config::RunConfig;
use crate::error::Result;
use crate::report::{Assignment, ClusterSummary, ClusteringResult};

/// A single clustering run
///
/// Runs are stateless: the same table and configuration always produce the same result.
#[derive(Clone, Debug, PartialEq)]
pub struct ClusteringRun {
    config: RunConfig,
}

impl ClusteringRun {
    pub fn new(config: RunConfig) -> Self {
        ClusteringRun { config }
    }

    pub fn config(&self) -> &RunConfig {
        &self.config
    }

    /// Cluster the stores of `table`.
    ///
    /// Every configuration error is raised before any clustering work: first contradictory size
    /// constraints, then the cluster count, then a minimum size the population cannot fill, then
    /// the k-means settings and finally the feature blocks. A run whose constraints could not all be met still succeeds, with a
    /// `Partial` state and the open violations.
    pub fn run(&self, table: &StoreTable) -> Result<ClusteringResult> {
        let config = &self.config;
        let n_stores = table.nstores();

        let balance = config.balance_params().check()?;
        let resolved = config.cluster_count()?.resolve(n_stores, config.bounds())?;
        balance.check_feasibility(n_stores, resolved.k)?;
        let kmeans = config
            .kmeans_params(resolved.k)
            .check()
            .map_err(KMeansError::from)?;
        let features = config.feature_params().check()?;

        let mut warnings = Vec::new();
        warnings.extend(resolved.warning());

        info!(
            "clustering {} stores into {} clusters",
            n_stores, resolved.k
        );
        let fitted: std::result::Result<FeatureMatrix, FeatureSpecError> = features.fit(table);
        let features = fitted?;
        warnings.extend(features.warnings.iter().cloned());

        let fitted: std::result::Result<KMeans<f64>, KMeansError> =
            kmeans.fit(&features.records);
        let model = fitted?;
        info!(
            "k-means converged: {}, inertia {:.4}",
            model.converged(),
            model.inertia()
        );
        let memberships = model.memberships().to_vec();
        let quality_pre = quality(&features.records, &memberships, resolved.k)?;

        let mut partition = Partition::new(
            features.records.view(),
            &features.store_ids,
            &features.bands,
            &memberships,
            model.centroids(),
        )?;
        let report = balance.balance(&mut partition)?;
        let quality_post = quality(
            &features.records,
            partition.memberships(),
            partition.n_clusters(),
        )?;

        let assignments = partition
            .memberships()
            .iter()
            .enumerate()
            .map(|(row, &cluster_id)| Assignment {
                store_id: partition.store_id(row).clone(),
                cluster_id,
                temperature_band: partition.band(row).clone(),
            })
            .collect();
        let clusters = partition
            .clusters()
            .iter()
            .map(|cluster| ClusterSummary {
                cluster_id: cluster.id(),
                size: cluster.size(),
                dominant_temperature_band: cluster.dominant_band().cloned(),
                centroid: cluster.centroid().to_vec(),
            })
            .collect();

        info!(
            "run finished {} with {} clusters, silhouette {:.4} -> {:.4}",
            report.state,
            partition.n_clusters(),
            quality_pre.silhouette,
            quality_post.silhouette
        );

        Ok(ClusteringResult {
            assignments,
            clusters,
            k: resolved.k,
            column_names: features.column_names.clone(),
            quality_pre,
            quality_post,
            state: report.state,
            moves: report.moves,
            violations: report.violations,
            warnings,
            block_reports: features.block_reports.clone(),
        })
    }
}

fn quality(
    records: &Array2<f64>,
    memberships: &[usize],
    n_clusters: usize,
) -> Result<ClusterQuality<f64>> {
    Ok(LabeledRecords::new(records, memberships, n_clusters)?.quality())
}
