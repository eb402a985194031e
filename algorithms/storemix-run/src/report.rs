use std::io::Write;

use serde_crate::{Deserialize, Serialize};
use storemix::metrics::ClusterQuality;
use storemix::{StoreId, TemperatureBand};
use storemix_clustering::{BalanceState, Move, Violation};
use storemix_preprocessing::BlockReport;

use crate::error::Result;

/// Final cluster of a store
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq, Eq)]
#[serde(crate = "serde_crate")]
pub struct Assignment {
    pub store_id: StoreId,
    pub cluster_id: usize,
    pub temperature_band: TemperatureBand,
}

#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(crate = "serde_crate")]
pub struct ClusterSummary {
    pub cluster_id: usize,
    pub size: usize,
    /// `None` for a cluster left without members
    pub dominant_temperature_band: Option<TemperatureBand>,
    pub centroid: Vec<f64>,
}

/// Flat record of the headline numbers of a run
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(crate = "serde_crate")]
pub struct MetricsRecord {
    pub silhouette_pre: f64,
    pub silhouette_post: f64,
    pub calinski_harabasz: f64,
    pub davies_bouldin: f64,
    pub cluster_size_min: usize,
    pub cluster_size_max: usize,
    /// Open violations with the cluster and stores involved
    pub violations: Vec<Violation>,
}

/// Everything a clustering run produces
#[derive(Serialize, Deserialize, Clone, Debug, PartialEq)]
#[serde(crate = "serde_crate")]
pub struct ClusteringResult {
    /// One entry per store, in table order
    pub assignments: Vec<Assignment>,
    pub clusters: Vec<ClusterSummary>,
    /// Number of clusters fitted by k-means
    pub k: usize,
    pub column_names: Vec<String>,
    pub quality_pre: ClusterQuality<f64>,
    pub quality_post: ClusterQuality<f64>,
    pub state: BalanceState,
    pub moves: Vec<Move>,
    /// Constraints left unresolved, empty unless `state` is `Partial`
    pub violations: Vec<Violation>,
    /// Clamped cluster counts, skipped reductions
    pub warnings: Vec<String>,
    pub block_reports: Vec<BlockReport>,
}

impl ClusteringResult {
    pub fn is_satisfied(&self) -> bool {
        self.state == BalanceState::Satisfied
    }

    /// Number of clusters after balancing
    pub fn n_clusters(&self) -> usize {
        self.clusters.len()
    }

    pub fn metrics(&self) -> MetricsRecord {
        MetricsRecord {
            silhouette_pre: self.quality_pre.silhouette,
            silhouette_post: self.quality_post.silhouette,
            calinski_harabasz: self.quality_post.calinski_harabasz,
            davies_bouldin: self.quality_post.davies_bouldin,
            cluster_size_min: self.quality_post.size_min,
            cluster_size_max: self.quality_post.size_max,
            violations: self.violations.clone(),
        }
    }

    pub fn to_json(&self) -> Result<String> {
        Ok(serde_json::to_string_pretty(self)?)
    }

    pub fn from_json(json: &str) -> Result<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Write the assignment table as `store_id,cluster_id,temperature_band`
    pub fn write_assignments<W: Write>(&self, writer: W) -> Result<()> {
        let mut writer = csv::Writer::from_writer(writer);
        for assignment in &self.assignments {
            writer.serialize(assignment)?;
        }
        writer.flush()?;
        Ok(())
    }
}
