//! Common metrics for clustering
//!
//! All metrics are computed in the euclidean feature space the partition was built in. They are
//! evaluated twice per run, on the initial partition and on the balanced one, so callers can
//! weigh the quality cost of constraint satisfaction themselves.
use crate::error::{Error, Result};
use crate::Float;
use ndarray::{Array1, Array2, ArrayBase, ArrayView1, ArrayView2, Axis, Data, Ix2, Zip};
#[cfg(feature = "serde")]
use serde_crate::{Deserialize, Serialize};

/// Records paired with the cluster index of every row
///
/// Cluster indices must be smaller than `n_clusters`; clusters without members are allowed and
/// are skipped by every separation metric.
pub struct LabeledRecords<'a, F> {
    records: ArrayView2<'a, F>,
    memberships: &'a [usize],
    n_clusters: usize,
}

impl<'a, F: Float> LabeledRecords<'a, F> {
    pub fn new<D: Data<Elem = F>>(
        records: &'a ArrayBase<D, Ix2>,
        memberships: &'a [usize],
        n_clusters: usize,
    ) -> Result<Self> {
        if records.nrows() != memberships.len() {
            return Err(Error::MembershipMismatch(
                memberships.len(),
                records.nrows(),
            ));
        }
        if records.nrows() == 0 {
            return Err(Error::NotEnoughSamples);
        }
        if let Some(&c) = memberships.iter().find(|&&c| c >= n_clusters) {
            return Err(Error::Parameters(format!(
                "cluster index {} out of range for {} clusters",
                c, n_clusters
            )));
        }

        Ok(LabeledRecords {
            records: records.view(),
            memberships,
            n_clusters,
        })
    }

    /// Number of members per cluster index
    pub fn cluster_sizes(&self) -> Vec<usize> {
        let mut sizes = vec![0; self.n_clusters];
        self.memberships.iter().for_each(|&c| sizes[c] += 1);
        sizes
    }

    fn n_non_empty(&self) -> usize {
        self.cluster_sizes().iter().filter(|&&s| s > 0).count()
    }

    /// Mean of the members of each cluster, rows of empty clusters are zero
    pub fn centroids(&self) -> Array2<F> {
        let sizes = self.cluster_sizes();
        let mut centroids = Array2::zeros((self.n_clusters, self.records.ncols()));
        Zip::from(self.records.rows())
            .and(self.memberships)
            .for_each(|row, &c| {
                let mut centroid = centroids.row_mut(c);
                centroid += &row;
            });
        Zip::from(centroids.rows_mut())
            .and(&Array1::from(sizes))
            .for_each(|mut centroid, &size| {
                if size > 0 {
                    centroid /= F::cast(size);
                }
            });
        centroids
    }

    /// Silhouette coefficient of every sample
    ///
    /// For a sample `x` with mean distance `a(x)` to the other members of its cluster and
    /// minimum mean distance `b(x)` to the members of any other cluster, the coefficient is
    /// `(b(x) - a(x)) / max{a(x), b(x)}`. Members of singleton clusters score 0, as does every
    /// sample when fewer than two clusters have members.
    pub fn silhouette_samples(&self) -> Array1<F> {
        let sizes = self.cluster_sizes();
        let n_samples = self.records.nrows();
        if self.n_non_empty() < 2 {
            return Array1::zeros(n_samples);
        }

        let mut totals = vec![F::zero(); self.n_clusters];
        (0..n_samples)
            .map(|i| {
                let own = self.memberships[i];
                if sizes[own] == 1 {
                    return F::zero();
                }

                totals.iter_mut().for_each(|t| *t = F::zero());
                let sample = self.records.row(i);
                for (j, other) in self.records.rows().into_iter().enumerate() {
                    if i != j {
                        totals[self.memberships[j]] += euclidean(sample, other);
                    }
                }

                // average distance from `sample` to the rest of its own cluster
                let a_x = totals[own] / F::cast(sizes[own] - 1);
                // minimum average distance from `sample` to another cluster
                let b_x = totals
                    .iter()
                    .zip(sizes.iter())
                    .enumerate()
                    .filter(|(c, (_, &size))| *c != own && size > 0)
                    .map(|(_, (&total, &size))| total / F::cast(size))
                    .fold(F::infinity(), F::min);

                let scale = a_x.max(b_x);
                if scale > F::zero() {
                    (b_x - a_x) / scale
                } else {
                    F::zero()
                }
            })
            .collect()
    }

    /// Mean silhouette coefficient over all samples, in `[-1, 1]`
    pub fn silhouette_score(&self) -> F {
        let samples = self.silhouette_samples();
        samples.sum() / F::cast(samples.len())
    }

    /// Ratio of between-cluster to within-cluster dispersion, scaled by the degrees of freedom
    ///
    /// Returns 0 with fewer than two non-empty clusters or when every sample is its own cluster
    /// and 1 when the within-cluster dispersion vanishes.
    pub fn calinski_harabasz_score(&self) -> F {
        let n_samples = self.records.nrows();
        let k = self.n_non_empty();
        if k < 2 || k == n_samples {
            return F::zero();
        }

        let sizes = self.cluster_sizes();
        let centroids = self.centroids();
        let mean = self.records.mean_axis(Axis(0)).unwrap();

        let between = centroids
            .rows()
            .into_iter()
            .zip(sizes.iter())
            .filter(|(_, &size)| size > 0)
            .map(|(centroid, &size)| F::cast(size) * sq_euclidean(centroid, mean.view()))
            .sum::<F>();
        let within = self
            .records
            .rows()
            .into_iter()
            .zip(self.memberships.iter())
            .map(|(row, &c)| sq_euclidean(row, centroids.row(c)))
            .sum::<F>();

        if within == F::zero() {
            return F::one();
        }
        between * F::cast(n_samples - k) / (within * F::cast(k - 1))
    }

    /// Mean distance of the members of each cluster to its centroid, `None` for empty clusters
    pub fn intra_cluster_distances(&self) -> Vec<Option<F>> {
        let sizes = self.cluster_sizes();
        let centroids = self.centroids();
        let mut totals = vec![F::zero(); self.n_clusters];
        Zip::from(self.records.rows())
            .and(self.memberships)
            .for_each(|row, &c| totals[c] += euclidean(row, centroids.row(c)));

        totals
            .into_iter()
            .zip(sizes)
            .map(|(total, size)| {
                if size > 0 {
                    Some(total / F::cast(size))
                } else {
                    None
                }
            })
            .collect()
    }

    /// Average over clusters of the worst similarity ratio with any other cluster
    ///
    /// Lower is better. Pairs of coinciding centroids contribute 0 and the score is 0 with
    /// fewer than two non-empty clusters.
    pub fn davies_bouldin_score(&self) -> F {
        if self.n_non_empty() < 2 {
            return F::zero();
        }

        let centroids = self.centroids();
        let scatter = self.intra_cluster_distances();
        let active = scatter
            .iter()
            .enumerate()
            .filter_map(|(c, s)| s.map(|s| (c, s)))
            .collect::<Vec<_>>();

        let total = active
            .iter()
            .map(|&(i, s_i)| {
                active
                    .iter()
                    .filter(|&&(j, _)| j != i)
                    .map(|&(j, s_j)| {
                        let d = euclidean(centroids.row(i), centroids.row(j));
                        if d > F::zero() {
                            (s_i + s_j) / d
                        } else {
                            F::zero()
                        }
                    })
                    .fold(F::zero(), F::max)
            })
            .sum::<F>();
        total / F::cast(active.len())
    }

    /// Evaluates every metric of the partition at once
    pub fn quality(&self) -> ClusterQuality<F> {
        let sizes = self.cluster_sizes();
        let singleton_clusters = sizes
            .iter()
            .enumerate()
            .filter(|(_, &s)| s == 1)
            .map(|(c, _)| c)
            .collect();
        let non_empty = sizes.iter().copied().filter(|&s| s > 0).collect::<Vec<_>>();

        ClusterQuality {
            silhouette: self.silhouette_score(),
            calinski_harabasz: self.calinski_harabasz_score(),
            davies_bouldin: self.davies_bouldin_score(),
            size_min: non_empty.iter().copied().min().unwrap_or(0),
            size_max: non_empty.iter().copied().max().unwrap_or(0),
            size_mean: F::cast(self.records.nrows()) / F::cast(non_empty.len().max(1)),
            intra_cluster_distances: self.intra_cluster_distances(),
            singleton_clusters,
        }
    }
}

/// Separation and cohesion summary of one partition
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate")
)]
#[derive(Clone, Debug, PartialEq)]
pub struct ClusterQuality<F> {
    /// Mean silhouette coefficient
    pub silhouette: F,
    /// Calinski-Harabasz score, higher is better
    pub calinski_harabasz: F,
    /// Davies-Bouldin score, lower is better
    pub davies_bouldin: F,
    pub size_min: usize,
    pub size_max: usize,
    pub size_mean: F,
    /// Mean member-to-centroid distance, indexed by cluster
    pub intra_cluster_distances: Vec<Option<F>>,
    /// Clusters with a single member, whose silhouette contribution was defined as 0
    pub singleton_clusters: Vec<usize>,
}

fn sq_euclidean<F: Float>(a: ArrayView1<F>, b: ArrayView1<F>) -> F {
    Zip::from(&a)
        .and(&b)
        .fold(F::zero(), |acc, &x, &y| acc + (x - y) * (x - y))
}

fn euclidean<F: Float>(a: ArrayView1<F>, b: ArrayView1<F>) -> F {
    sq_euclidean(a, b).sqrt()
}

#[cfg(test)]
mod tests {
    use super::LabeledRecords;
    use approx::assert_abs_diff_eq;
    use ndarray::{array, concatenate, Array, Array1, Axis};

    #[test]
    fn test_silhouette_score() {
        // Two very far apart clusters, each with its own label.
        // This is a very good clustering for silhouette and should return a score very close to +1
        let records = concatenate![
            Axis(0),
            Array::linspace(0f64, 1f64, 10),
            Array::linspace(10000f64, 10001f64, 10)
        ]
        .insert_axis(Axis(1));
        let records = concatenate![Axis(1), records, records];
        let memberships = concatenate![Axis(0), Array1::from_elem(10, 0), Array1::from_elem(10, 1)];
        let memberships = memberships.to_vec();
        let labeled = LabeledRecords::new(&records, &memberships, 2).unwrap();
        assert_abs_diff_eq!(labeled.silhouette_score(), 1f64, epsilon = 1e-3);

        // Two clusters separated into halves very far from each other and each very near an half
        // of the other cluster. Bad but not terrible, should return a score slightly negative
        let records = concatenate![
            Axis(0),
            Array::linspace(0f64, 1f64, 5),
            Array::linspace(1f64, 2f64, 5),
            Array::linspace(10000f64, 10001f64, 5),
            Array::linspace(10001f64, 10002f64, 5)
        ]
        .insert_axis(Axis(1));
        let records = concatenate![Axis(1), records, records];
        let memberships = concatenate![
            Axis(0),
            Array1::from_elem(5, 0),
            Array1::from_elem(5, 1),
            Array1::from_elem(5, 0),
            Array1::from_elem(5, 1)
        ]
        .to_vec();
        let labeled = LabeledRecords::new(&records, &memberships, 2).unwrap();
        assert!(labeled.silhouette_score() < 0f64);

        // Very bad clustering with a high number of clusters, I expect a very negative value
        let records = Array::linspace(0f64, 10f64, 100).insert_axis(Axis(1));
        let records = concatenate![Axis(1), records, records];
        let memberships = (0..100).map(|i| (i + 3) % 48).collect::<Vec<_>>();
        let labeled = LabeledRecords::new(&records, &memberships, 48).unwrap();
        assert!(labeled.silhouette_score() < -0.5f64)
    }

    #[test]
    fn single_cluster_scores_zero() {
        let records = Array::linspace(0f64, 1f64, 10).insert_axis(Axis(1));
        let memberships = vec![0; 10];
        let labeled = LabeledRecords::new(&records, &memberships, 1).unwrap();
        assert_abs_diff_eq!(labeled.silhouette_score(), 0f64);
        assert_abs_diff_eq!(labeled.calinski_harabasz_score(), 0f64);
        assert_abs_diff_eq!(labeled.davies_bouldin_score(), 0f64);
    }

    #[test]
    fn singleton_members_contribute_zero() {
        let records = array![[0., 0.], [0., 1.], [10., 10.]];
        let memberships = vec![0, 0, 1];
        let labeled = LabeledRecords::new(&records, &memberships, 2).unwrap();
        let samples = labeled.silhouette_samples();
        assert_abs_diff_eq!(samples[2], 0.);
        assert!(samples[0] > 0.9);

        let quality = labeled.quality();
        assert_eq!(quality.singleton_clusters, vec![1]);
        assert!(quality.silhouette >= -1. && quality.silhouette <= 1.);
    }

    #[test]
    fn calinski_harabasz_oracle() {
        // centroids (0, 1) and (10, 1), overall mean (5, 1)
        // between = 2 * 25 + 2 * 25 = 100, within = 4 * 1 = 4
        let records = array![[0., 0.], [0., 2.], [10., 0.], [10., 2.]];
        let memberships = vec![0, 0, 1, 1];
        let labeled = LabeledRecords::new(&records, &memberships, 2).unwrap();
        assert_abs_diff_eq!(labeled.calinski_harabasz_score(), 100. * 2. / 4.);
    }

    #[test]
    fn davies_bouldin_oracle() {
        // scatter is 1 for both clusters and the centroids are 10 apart
        let records = array![[0., 0.], [0., 2.], [10., 0.], [10., 2.]];
        let memberships = vec![0, 0, 1, 1];
        let labeled = LabeledRecords::new(&records, &memberships, 2).unwrap();
        assert_abs_diff_eq!(labeled.davies_bouldin_score(), 0.2);
        assert_eq!(
            labeled.intra_cluster_distances(),
            vec![Some(1.0), Some(1.0)]
        );
    }

    #[test]
    fn empty_clusters_are_skipped() {
        let records = array![[0., 0.], [0., 2.], [10., 0.], [10., 2.]];
        let memberships = vec![0, 0, 2, 2];
        let labeled = LabeledRecords::new(&records, &memberships, 3).unwrap();
        let quality = labeled.quality();
        assert_eq!(quality.size_min, 2);
        assert_eq!(quality.size_max, 2);
        assert_abs_diff_eq!(quality.size_mean, 2.0);
        assert_eq!(quality.intra_cluster_distances[1], None);
        assert_abs_diff_eq!(quality.davies_bouldin, 0.2);
    }

    #[test]
    fn mismatched_memberships_are_rejected() {
        let records = array![[0., 0.], [0., 2.]];
        let memberships = vec![0];
        assert!(LabeledRecords::new(&records, &memberships, 1).is_err());
        let memberships = vec![0, 3];
        assert!(LabeledRecords::new(&records, &memberships, 2).is_err());
    }
}
