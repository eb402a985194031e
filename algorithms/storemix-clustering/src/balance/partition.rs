use std::collections::{BTreeMap, BTreeSet};

use ndarray::{Array1, Array2, ArrayBase, ArrayView1, ArrayView2, Data, Ix1, Ix2, Zip};
use storemix::error::{Error, Result};
use storemix::{Float, StoreId, TemperatureBand};

/// A group of stores with its running centroid and band census
///
/// Clusters are only changed through their [`Partition`], which keeps every store in exactly one
/// cluster.
#[derive(Clone, Debug, PartialEq)]
pub struct Cluster<F> {
    id: usize,
    members: BTreeSet<usize>,
    sum: Array1<F>,
    centroid: Array1<F>,
    bands: BTreeMap<TemperatureBand, usize>,
}

impl<F: Float> Cluster<F> {
    fn empty(id: usize, centroid: Array1<F>) -> Self {
        Cluster {
            id,
            members: BTreeSet::new(),
            sum: Array1::zeros(centroid.len()),
            centroid,
            bands: BTreeMap::new(),
        }
    }

    pub fn id(&self) -> usize {
        self.id
    }

    pub fn size(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    /// Row indices of the member stores, in ascending order
    pub fn members(&self) -> &BTreeSet<usize> {
        &self.members
    }

    /// Mean of the members, or the last known centroid once the cluster is empty
    pub fn centroid(&self) -> &Array1<F> {
        &self.centroid
    }

    /// The most represented band, ties going to the smallest band
    pub fn dominant_band(&self) -> Option<&TemperatureBand> {
        let mut dominant: Option<(&TemperatureBand, usize)> = None;
        for (band, &count) in &self.bands {
            match dominant {
                Some((_, best)) if best >= count => {}
                _ => dominant = Some((band, count)),
            }
        }
        dominant.map(|(band, _)| band)
    }

    pub fn band_count(&self, band: &TemperatureBand) -> usize {
        self.bands.get(band).copied().unwrap_or(0)
    }

    /// Fraction of the members outside the dominant band, 0 for an empty cluster
    pub fn impurity(&self) -> f64 {
        let size = self.size();
        let dominant = self.bands.values().copied().max().unwrap_or(0);
        impurity(size, dominant)
    }

    /// Impurity once a store of `band` joined
    pub fn impurity_with(&self, band: &TemperatureBand) -> f64 {
        let joined = self.band_count(band) + 1;
        let dominant = self.bands.values().copied().max().unwrap_or(0).max(joined);
        impurity(self.size() + 1, dominant)
    }

    /// Impurity once a store of `band` left
    pub fn impurity_without(&self, band: &TemperatureBand) -> f64 {
        let dominant = self
            .bands
            .iter()
            .map(|(b, &c)| if b == band { c.saturating_sub(1) } else { c })
            .max()
            .unwrap_or(0);
        impurity(self.size().saturating_sub(1), dominant)
    }

    /// Whether a store of `band` may join without breaking purity
    ///
    /// Stores of the dominant band are always accepted, since they can only lower the impurity.
    pub fn accepts(&self, band: &TemperatureBand, tolerance: f64) -> bool {
        self.is_empty()
            || self.dominant_band() == Some(band)
            || self.impurity_with(band) <= tolerance
    }

    /// Whether a store of `band` may leave without worsening the purity of the cluster
    pub fn releases(&self, band: &TemperatureBand, tolerance: f64) -> bool {
        self.impurity_without(band) <= tolerance.max(self.impurity())
    }

    fn insert(&mut self, row: usize, x: ArrayView1<F>, band: &TemperatureBand) {
        if self.members.insert(row) {
            self.sum += &x;
            *self.bands.entry(band.clone()).or_insert(0) += 1;
            self.update_centroid();
        }
    }

    fn remove(&mut self, row: usize, x: ArrayView1<F>, band: &TemperatureBand) {
        if self.members.remove(&row) {
            self.sum -= &x;
            if let Some(count) = self.bands.get_mut(band) {
                *count -= 1;
                if *count == 0 {
                    self.bands.remove(band);
                }
            }
            self.update_centroid();
        }
    }

    fn update_centroid(&mut self) {
        if !self.is_empty() {
            let size = F::cast(self.size());
            Zip::from(&mut self.centroid)
                .and(&self.sum)
                .for_each(|c, &s| *c = s / size);
        }
    }
}

fn impurity(size: usize, dominant: usize) -> f64 {
    if size == 0 {
        0.0
    } else {
        (size - dominant) as f64 / size as f64
    }
}

/// Squared euclidean distance between two points
pub fn sq_dist<F: Float>(
    a: &ArrayBase<impl Data<Elem = F>, Ix1>,
    b: &ArrayBase<impl Data<Elem = F>, Ix1>,
) -> F {
    Zip::from(a)
        .and(b)
        .fold(F::zero(), |acc, &x, &y| acc + (x - y) * (x - y))
}

/// Assignment of every store of a run to exactly one [`Cluster`]
///
/// Cluster ids are the indices into [`Partition::clusters`]. The partition never loses or
/// duplicates a store: the only mutation is moving a store from its current cluster to another.
#[derive(Clone, Debug)]
pub struct Partition<'a, F> {
    records: ArrayView2<'a, F>,
    store_ids: &'a [StoreId],
    bands: &'a [TemperatureBand],
    memberships: Vec<usize>,
    clusters: Vec<Cluster<F>>,
}

impl<'a, F: Float> Partition<'a, F> {
    /// Build a partition from per-row cluster indices and the centroids they were fitted with
    ///
    /// Non-empty clusters take the mean of their members as centroid, empty clusters keep the
    /// given one.
    pub fn new<D: Data<Elem = F>>(
        records: ArrayView2<'a, F>,
        store_ids: &'a [StoreId],
        bands: &'a [TemperatureBand],
        memberships: &[usize],
        centroids: &ArrayBase<D, Ix2>,
    ) -> Result<Self> {
        let n = records.nrows();
        for len in [store_ids.len(), bands.len(), memberships.len()].iter() {
            if *len != n {
                return Err(Error::MembershipMismatch(*len, n));
            }
        }
        if n == 0 {
            return Err(Error::NotEnoughSamples);
        }
        if centroids.ncols() != records.ncols() {
            return Err(Error::Parameters(format!(
                "centroids have {} features, records have {}",
                centroids.ncols(),
                records.ncols()
            )));
        }
        let n_clusters = centroids.nrows();
        if let Some(&c) = memberships.iter().find(|&&c| c >= n_clusters) {
            return Err(Error::Parameters(format!(
                "cluster index {} out of range for {} clusters",
                c, n_clusters
            )));
        }

        let clusters = centroids
            .rows()
            .into_iter()
            .enumerate()
            .map(|(id, centroid)| Cluster::empty(id, centroid.to_owned()))
            .collect();
        let mut partition = Partition {
            records,
            store_ids,
            bands,
            memberships: memberships.to_vec(),
            clusters,
        };
        for (row, &c) in memberships.iter().enumerate() {
            let x = partition.records.row(row);
            partition.clusters[c].insert(row, x, &bands[row]);
        }

        Ok(partition)
    }

    /// Build a partition from per-row cluster indices alone, empty clusters are centred at the
    /// origin
    pub fn from_memberships(
        records: ArrayView2<'a, F>,
        store_ids: &'a [StoreId],
        bands: &'a [TemperatureBand],
        memberships: &[usize],
        n_clusters: usize,
    ) -> Result<Self> {
        let centroids = Array2::zeros((n_clusters, records.ncols()));
        Self::new(records, store_ids, bands, memberships, &centroids)
    }

    pub fn n_stores(&self) -> usize {
        self.memberships.len()
    }

    pub fn n_clusters(&self) -> usize {
        self.clusters.len()
    }

    pub fn clusters(&self) -> &[Cluster<F>] {
        &self.clusters
    }

    pub fn cluster(&self, id: usize) -> &Cluster<F> {
        &self.clusters[id]
    }

    /// Cluster index of every row
    pub fn memberships(&self) -> &[usize] {
        &self.memberships
    }

    pub fn store_id(&self, row: usize) -> &StoreId {
        &self.store_ids[row]
    }

    pub fn band(&self, row: usize) -> &TemperatureBand {
        &self.bands[row]
    }

    pub fn record(&self, row: usize) -> ArrayView1<'_, F> {
        self.records.row(row)
    }

    pub fn records(&self) -> ArrayView2<'_, F> {
        self.records.view()
    }

    /// Centroids of all clusters as a `(n_clusters, n_features)` matrix
    pub fn centroids(&self) -> Array2<F> {
        let mut centroids = Array2::zeros((self.n_clusters(), self.records.ncols()));
        for (mut row, cluster) in centroids.rows_mut().into_iter().zip(&self.clusters) {
            row.assign(cluster.centroid());
        }
        centroids
    }

    /// Squared distance between a store and the centroid of a cluster
    pub fn distance_to(&self, row: usize, cluster: usize) -> F {
        sq_dist(&self.records.row(row), self.clusters[cluster].centroid())
    }

    /// `(store_id, cluster_id)` pairs in row order
    pub fn assignments(&self) -> Vec<(StoreId, usize)> {
        self.store_ids
            .iter()
            .cloned()
            .zip(self.memberships.iter().copied())
            .collect()
    }

    /// Move a store to cluster `to`, updating both centroids from their running sums
    pub(crate) fn move_store(&mut self, row: usize, to: usize) {
        let from = self.memberships[row];
        if from == to {
            return;
        }
        let x = self.records.row(row);
        self.clusters[from].remove(row, x, &self.bands[row]);
        self.clusters[to].insert(row, x, &self.bands[row]);
        self.memberships[row] = to;
    }

    /// Open a new cluster seeded by a single store and return its id
    pub(crate) fn open_cluster(&mut self, seed: usize) -> usize {
        let id = self.clusters.len();
        let centroid = self.records.row(seed).to_owned();
        self.clusters.push(Cluster::empty(id, centroid));
        self.move_store(seed, id);
        id
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    fn ids(n: usize) -> Vec<StoreId> {
        (0..n).map(|i| format!("s{}", i)).collect()
    }

    fn bands(labels: &[&str]) -> Vec<TemperatureBand> {
        labels.iter().map(|&b| TemperatureBand::from(b)).collect()
    }

    #[test]
    fn clusters_follow_memberships() {
        let records = array![[0., 0.], [2., 0.], [10., 10.], [12., 10.]];
        let ids = ids(4);
        let bands = bands(&["Hot", "Hot", "Cold", "Hot"]);
        let partition =
            Partition::from_memberships(records.view(), &ids, &bands, &[0, 0, 1, 1], 2).unwrap();

        assert_eq!(partition.cluster(0).size(), 2);
        assert_abs_diff_eq!(partition.cluster(0).centroid(), &array![1., 0.]);
        assert_abs_diff_eq!(partition.cluster(1).centroid(), &array![11., 10.]);
        assert_eq!(partition.cluster(0).impurity(), 0.0);
        assert_eq!(partition.cluster(1).impurity(), 0.5);
        // tie between Cold and Hot goes to the smallest band
        assert_eq!(
            partition.cluster(1).dominant_band(),
            Some(&TemperatureBand::from("Cold"))
        );
    }

    #[test]
    fn moves_update_centroids_incrementally() {
        let records = array![[0., 0.], [2., 0.], [10., 10.], [12., 10.]];
        let ids = ids(4);
        let bands = bands(&["Hot", "Hot", "Hot", "Hot"]);
        let mut partition =
            Partition::from_memberships(records.view(), &ids, &bands, &[0, 0, 1, 1], 2).unwrap();

        partition.move_store(1, 1);
        assert_eq!(partition.memberships(), &[0, 1, 1, 1]);
        assert_abs_diff_eq!(partition.cluster(0).centroid(), &array![0., 0.]);
        assert_abs_diff_eq!(partition.cluster(1).centroid(), &array![8., 20. / 3.], epsilon = 1e-12);

        partition.move_store(0, 1);
        assert!(partition.cluster(0).is_empty());
        // an empty cluster keeps its last centroid
        assert_abs_diff_eq!(partition.cluster(0).centroid(), &array![0., 0.]);
        let total: usize = partition.clusters().iter().map(|c| c.size()).sum();
        assert_eq!(total, 4);
    }

    #[test]
    fn open_cluster_moves_the_seed() {
        let records = array![[0., 0.], [2., 0.], [10., 10.]];
        let ids = ids(3);
        let bands = bands(&["Hot", "Hot", "Cold"]);
        let mut partition =
            Partition::from_memberships(records.view(), &ids, &bands, &[0, 0, 0], 1).unwrap();

        let id = partition.open_cluster(2);
        assert_eq!(id, 1);
        assert_eq!(partition.n_clusters(), 2);
        assert_eq!(partition.cluster(1).members().iter().copied().collect::<Vec<_>>(), vec![2]);
        assert_abs_diff_eq!(partition.cluster(1).centroid(), &array![10., 10.]);
        assert_eq!(partition.cluster(0).impurity(), 0.0);
        assert_eq!(
            partition.assignments()[2],
            ("s2".to_string(), 1)
        );
    }

    #[test]
    fn purity_checks() {
        let records = array![[0.], [1.], [2.], [3.]];
        let ids = ids(4);
        let bands = bands(&["Hot", "Hot", "Hot", "Cold"]);
        let partition =
            Partition::from_memberships(records.view(), &ids, &bands, &[0, 0, 0, 0], 1).unwrap();
        let cluster = partition.cluster(0);
        let hot = TemperatureBand::from("Hot");
        let cold = TemperatureBand::from("Cold");

        assert_abs_diff_eq!(cluster.impurity(), 0.25);
        assert_abs_diff_eq!(cluster.impurity_with(&cold), 0.4);
        assert_abs_diff_eq!(cluster.impurity_without(&cold), 0.0);
        assert_abs_diff_eq!(cluster.impurity_without(&hot), 1. / 3.);
        assert!(cluster.accepts(&hot, 0.0));
        assert!(!cluster.accepts(&cold, 0.3));
        assert!(cluster.accepts(&cold, 0.4));
        assert!(cluster.releases(&cold, 0.0));
        assert!(!cluster.releases(&hot, 0.0));
    }

    #[test]
    fn invalid_partitions() {
        let records = array![[0., 0.], [2., 0.]];
        let ids = ids(2);
        let bands = bands(&["Hot", "Hot"]);
        assert!(matches!(
            Partition::from_memberships(records.view(), &ids, &bands, &[0], 1),
            Err(Error::MembershipMismatch(1, 2))
        ));
        assert!(matches!(
            Partition::from_memberships(records.view(), &ids, &bands, &[0, 2], 2),
            Err(Error::Parameters(_))
        ));
    }
}
