use log::debug;
use ndarray::{Array1, Array2, ArrayBase, Axis, Data, DataMut, Ix1, Ix2, Zip};
use rand::{Rng, SeedableRng};
use rand_xoshiro::Xoshiro256Plus;
use rayon::prelude::*;
#[cfg(feature = "serde")]
use serde_crate::{Deserialize, Serialize};

use crate::k_means::errors::KMeansError;
use crate::k_means::{KMeansParams, KMeansValidParams};
use storemix::traits::{Fit, Transformer};
use storemix::Float;

#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate")
)]
#[derive(Clone, Debug, PartialEq)]
/// K-means clustering aims to partition a set of unlabeled observations into clusters,
/// where each observation belongs to the cluster with the nearest mean.
///
/// The mean of the points within a cluster is called *centroid*.
///
/// Given the set of centroids, you can assign an observation to a cluster
/// choosing the nearest centroid.
///
/// ## Standard algorithm
///
/// K-means is an iterative algorithm: it progressively refines the choice of centroids.
///
/// It's guaranteed to converge, even though it might not find the optimal set of centroids
/// (unfortunately it can get stuck in a local minimum, finding the optimal minimum if NP-hard!).
///
/// There are three steps in the standard algorithm:
/// - initialisation step: select initial centroids using one of our provided algorithms.
/// - assignment step: assign each observation to the nearest cluster
///                    (minimum distance between the observation and the cluster's centroid);
/// - update step: recompute the centroid of each cluster. A cluster left without members
///                keeps its previous centroid.
///
/// The initialisation step is a one-off, done at the very beginning.
/// Assignment and update are repeated in a loop until convergence is reached (either the
/// squared euclidean distance between the old and the new clusters is below `tolerance` or
/// we exceed the `max_n_iterations`).
///
/// ## Restarts and parallelisation
///
/// The whole procedure is repeated `n_runs` times and the run with the lowest inertia is
/// kept. Runs share nothing: every run seeds its own generator from a seed drawn, in order,
/// from the generator of the hyperparameters, so the runs are executed on the `rayon` thread
/// pool and the outcome does not depend on scheduling. Ties in inertia go to the earliest run.
///
/// The assignment step does not require any coordination either and is parallelised through
/// the `rayon` feature of `ndarray`.
///
/// ## Tutorial
///
/// ```
/// use storemix::traits::{Fit, Transformer};
/// use storemix_clustering::KMeans;
/// use ndarray::array;
///
/// let observations = array![[0., 1.], [0.1, 1.1], [-10., 20.], [-10.2, 20.1], [-1., 10.]];
///
/// // `n_clusters` is the only mandatory parameter, the generator is seeded with 42
/// let model = KMeans::params(3)
///     .tolerance(1e-2)
///     .fit(&observations)
///     .expect("KMeans fitted");
///
/// // the memberships of the fitted observations are kept with the model
/// assert_eq!(model.memberships()[0], model.memberships()[1]);
///
/// // new observations are assigned to their nearest centroid
/// let memberships = model.transform(&array![[-9., 20.5]]);
/// assert_eq!(memberships[0], model.memberships()[2]);
/// ```
pub struct KMeans<F: Float> {
    centroids: Array2<F>,
    memberships: Array1<usize>,
    inertia: F,
    n_iterations: u64,
    converged: bool,
}

impl<F: Float> KMeans<F> {
    pub fn params(nclusters: usize) -> KMeansParams<F, Xoshiro256Plus> {
        KMeansParams::new(nclusters, Xoshiro256Plus::seed_from_u64(42))
    }

    pub fn params_with_rng<R: Rng>(nclusters: usize, rng: R) -> KMeansParams<F, R> {
        KMeansParams::new(nclusters, rng)
    }

    /// Return the set of centroids as a 2-dimensional matrix with shape
    /// `(n_centroids, n_features)`.
    pub fn centroids(&self) -> &Array2<F> {
        &self.centroids
    }

    /// Return the cluster index of every training observation
    pub fn memberships(&self) -> &Array1<usize> {
        &self.memberships
    }

    /// Return the number of training points belonging to each cluster
    pub fn cluster_count(&self) -> Array1<usize> {
        let mut counts = Array1::zeros(self.centroids.nrows());
        self.memberships.iter().for_each(|&c| counts[c] += 1);
        counts
    }

    /// Return the sum of squared distances between each training point and its centroid
    pub fn inertia(&self) -> F {
        self.inertia
    }

    /// Number of update steps performed by the winning run
    pub fn n_iterations(&self) -> u64 {
        self.n_iterations
    }

    /// Whether the winning run met the `tolerance` criterion before `max_n_iterations`
    pub fn converged(&self) -> bool {
        self.converged
    }
}

struct RunOutcome<F> {
    centroids: Array2<F>,
    memberships: Array1<usize>,
    inertia: F,
    n_iterations: u64,
    converged: bool,
}

impl<F: Float, R: Rng + SeedableRng + Clone + Send + Sync, DA: Data<Elem = F> + Sync>
    Fit<ArrayBase<DA, Ix2>, KMeansError> for KMeansValidParams<F, R>
{
    type Object = KMeans<F>;

    /// Given an input matrix `observations`, with shape `(n_observations, n_features)`,
    /// `fit` identifies `n_clusters` centroids based on the training data distribution.
    ///
    /// An instance of `KMeans` is returned.
    ///
    fn fit(&self, observations: &ArrayBase<DA, Ix2>) -> Result<Self::Object, KMeansError> {
        let n_samples = observations.nrows();
        if n_samples < self.n_clusters() {
            return Err(KMeansError::InsufficientData {
                n_samples,
                n_clusters: self.n_clusters(),
            });
        }

        let mut rng = self.rng().clone();
        let seeds = (0..self.n_runs()).map(|_| rng.gen()).collect::<Vec<u64>>();

        let outcomes = seeds
            .into_par_iter()
            .map(|seed| self.single_run(observations, &mut R::seed_from_u64(seed)))
            .collect::<Vec<_>>();

        // We keep the centroids which minimize the inertia (defined as the sum of
        // the squared distances of the closest centroid for all observations)
        // over the n runs of the KMeans algorithm.
        let mut best: Option<RunOutcome<F>> = None;
        for (run, outcome) in outcomes.into_iter().enumerate() {
            debug!(
                "k-means run {} finished after {} iterations with inertia {}",
                run, outcome.n_iterations, outcome.inertia
            );
            let improves = match &best {
                Some(current) => outcome.inertia < current.inertia,
                None => outcome.inertia.is_finite(),
            };
            if improves {
                best = Some(outcome);
            }
        }

        match best {
            Some(outcome) => Ok(KMeans {
                centroids: outcome.centroids,
                memberships: outcome.memberships,
                inertia: outcome.inertia,
                n_iterations: outcome.n_iterations,
                converged: outcome.converged,
            }),
            None => Err(KMeansError::InertiaError),
        }
    }
}

impl<F: Float, R: Rng> KMeansValidParams<F, R> {
    fn single_run<DA: Data<Elem = F> + Sync>(
        &self,
        observations: &ArrayBase<DA, Ix2>,
        rng: &mut impl Rng,
    ) -> RunOutcome<F> {
        let n_samples = observations.nrows();
        let mut memberships = Array1::zeros(n_samples);
        let mut dists = Array1::zeros(n_samples);
        let mut centroids = self
            .init_method()
            .run(self.n_clusters(), observations.view(), rng);

        let mut n_iterations = 0;
        let mut converged = false;
        while n_iterations < self.max_n_iterations() {
            n_iterations += 1;
            update_memberships_and_dists(&centroids, observations, &mut memberships, &mut dists);
            let new_centroids = compute_centroids(&centroids, observations, &memberships);
            let shift = sq_distance(&centroids, &new_centroids);
            centroids = new_centroids;
            if shift <= self.tolerance() {
                converged = true;
                break;
            }
        }

        // final assignment against the final centroids, then centroids as the means of their
        // members
        update_memberships_and_dists(&centroids, observations, &mut memberships, &mut dists);
        let centroids = compute_centroids(&centroids, observations, &memberships);
        update_min_dists(&centroids, observations, &mut dists);

        RunOutcome {
            centroids,
            inertia: dists.sum(),
            memberships,
            n_iterations,
            converged,
        }
    }
}

impl<F: Float, DA: Data<Elem = F> + Sync> Transformer<&ArrayBase<DA, Ix2>, Array1<usize>>
    for KMeans<F>
{
    /// Given an input matrix `observations`, with shape `(n_observations, n_features)`,
    /// `transform` returns, for each observation, the index of the closest cluster/centroid.
    fn transform(&self, observations: &ArrayBase<DA, Ix2>) -> Array1<usize> {
        let mut memberships = Array1::zeros(observations.nrows());
        update_cluster_memberships(&self.centroids, observations, &mut memberships);
        memberships
    }
}

/// K-means is an iterative algorithm.
/// We will perform the assignment and update steps until we are satisfied
/// (according to our convergence criteria).
///
/// `compute_centroids` returns a 2-dimensional array,
/// where the i-th row corresponds to the i-th cluster. Clusters without members keep their
/// old centroid.
pub(crate) fn compute_centroids<F: Float>(
    old_centroids: &Array2<F>,
    // (n_observations, n_features)
    observations: &ArrayBase<impl Data<Elem = F>, Ix2>,
    // (n_observations,)
    cluster_memberships: &ArrayBase<impl Data<Elem = usize>, Ix1>,
) -> Array2<F> {
    let n_clusters = old_centroids.nrows();
    let mut counts: Array1<usize> = Array1::zeros(n_clusters);
    let mut centroids = Array2::zeros((n_clusters, observations.ncols()));

    Zip::from(observations.rows())
        .and(cluster_memberships)
        .for_each(|observation, &cluster_membership| {
            let mut centroid = centroids.row_mut(cluster_membership);
            centroid += &observation;
            counts[cluster_membership] += 1;
        });

    Zip::from(centroids.rows_mut())
        .and(old_centroids.rows())
        .and(&counts)
        .for_each(|mut centroid, old_centroid, &cnt| {
            if cnt == 0 {
                centroid.assign(&old_centroid);
            } else {
                centroid /= F::cast(cnt);
            }
        });
    centroids
}

fn sq_distance<F: Float>(a: &Array2<F>, b: &Array2<F>) -> F {
    Zip::from(a)
        .and(b)
        .fold(F::zero(), |acc, &x, &y| acc + (x - y) * (x - y))
}

// Update `cluster_memberships` with the index of the cluster each observation belongs to.
pub(crate) fn update_cluster_memberships<F: Float>(
    centroids: &ArrayBase<impl Data<Elem = F> + Sync, Ix2>,
    observations: &ArrayBase<impl Data<Elem = F> + Sync, Ix2>,
    cluster_memberships: &mut ArrayBase<impl DataMut<Elem = usize>, Ix1>,
) {
    Zip::from(observations.axis_iter(Axis(0)))
        .and(cluster_memberships)
        .par_for_each(|observation, cluster_membership| {
            *cluster_membership = closest_centroid(centroids, &observation).0
        });
}

// Updates `dists` with the squared distance of each observation from its closest centroid.
pub(crate) fn update_min_dists<F: Float>(
    centroids: &ArrayBase<impl Data<Elem = F> + Sync, Ix2>,
    observations: &ArrayBase<impl Data<Elem = F> + Sync, Ix2>,
    dists: &mut ArrayBase<impl DataMut<Elem = F>, Ix1>,
) {
    Zip::from(observations.axis_iter(Axis(0)))
        .and(dists)
        .par_for_each(|observation, dist| *dist = closest_centroid(centroids, &observation).1);
}

// Efficient combination of `update_cluster_memberships` and `update_min_dists`.
pub(crate) fn update_memberships_and_dists<F: Float>(
    centroids: &ArrayBase<impl Data<Elem = F> + Sync, Ix2>,
    observations: &ArrayBase<impl Data<Elem = F> + Sync, Ix2>,
    cluster_memberships: &mut ArrayBase<impl DataMut<Elem = usize>, Ix1>,
    dists: &mut ArrayBase<impl DataMut<Elem = F>, Ix1>,
) {
    Zip::from(observations.axis_iter(Axis(0)))
        .and(cluster_memberships)
        .and(dists)
        .par_for_each(|observation, cluster_membership, dist| {
            let (m, d) = closest_centroid(centroids, &observation);
            *cluster_membership = m;
            *dist = d;
        });
}

/// Given a matrix of centroids with shape (n_centroids, n_features) and an observation,
/// return the index of the closest centroid (the index of the corresponding row in `centroids`)
/// and the squared euclidean distance to it. Ties go to the lowest index.
pub(crate) fn closest_centroid<F: Float>(
    // (n_centroids, n_features)
    centroids: &ArrayBase<impl Data<Elem = F>, Ix2>,
    // (n_features)
    observation: &ArrayBase<impl Data<Elem = F>, Ix1>,
) -> (usize, F) {
    let mut closest_index = 0;
    let mut minimum_distance = F::infinity();

    for (centroid_index, centroid) in centroids.rows().into_iter().enumerate() {
        let distance = Zip::from(&centroid)
            .and(observation)
            .fold(F::zero(), |acc, &c, &o| acc + (c - o) * (c - o));
        if distance < minimum_distance {
            closest_index = centroid_index;
            minimum_distance = distance;
        }
    }
    (closest_index, minimum_distance)
}
