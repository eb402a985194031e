use crate::KMeansParamsError;

use super::init::KMeansInit;
use rand::Rng;
#[cfg(feature = "serde")]
use serde_crate::{Deserialize, Serialize};
use storemix::{Float, ParamGuard};

/// Checked settings of the [store partitioner](crate::KMeans).
///
/// A fit performs `n_restarts` independent Lloyd searches. Restart `i` is seeded with the
/// `i`-th value drawn from `rng`, so a given generator state always yields the same restarts
/// whatever the size of the thread pool running them.
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate")
)]
#[derive(Clone, Debug, PartialEq)]
pub struct KMeansValidParams<F: Float, R: Rng> {
    n_runs: usize,
    /// Upper bound on the squared centroid shift of a converged iteration
    tolerance: F,
    max_n_iterations: u64,
    n_clusters: usize,
    init: KMeansInit,
    /// Source of the per-restart seeds
    rng: R,
}

/// Unchecked partitioner settings, built with [`KMeans::params`](crate::KMeans::params) or
/// [`KMeans::params_with_rng`](crate::KMeans::params_with_rng).
#[derive(Clone, Debug, PartialEq)]
pub struct KMeansParams<F: Float, R: Rng>(KMeansValidParams<F, R>);

impl<F: Float, R: Rng> KMeansParams<F, R> {
    /// Partition stores into `n_clusters` groups, restart seeds drawn from `rng`.
    ///
    /// Unless overridden a fit runs 10 k-means++ seeded restarts of at most 300 iterations
    /// each, a restart stopping early once no centroid moves by more than `1e-4` (squared).
    pub fn new(n_clusters: usize, rng: R) -> Self {
        Self(KMeansValidParams {
            n_runs: 10,
            tolerance: F::cast(1e-4),
            max_n_iterations: 300,
            n_clusters,
            init: KMeansInit::KMeansPlusPlus,
            rng,
        })
    }

    /// Number of restarts, the lowest inertia wins and ties go to the earliest restart
    pub fn n_runs(mut self, n_runs: usize) -> Self {
        self.0.n_runs = n_runs;
        self
    }

    pub fn tolerance(mut self, tolerance: F) -> Self {
        self.0.tolerance = tolerance;
        self
    }

    /// Iteration cap of a single restart
    pub fn max_n_iterations(mut self, max_n_iterations: u64) -> Self {
        self.0.max_n_iterations = max_n_iterations;
        self
    }

    pub fn init_method(mut self, init: KMeansInit) -> Self {
        self.0.init = init;
        self
    }
}

impl<F: Float, R: Rng> ParamGuard for KMeansParams<F, R> {
    type Checked = KMeansValidParams<F, R>;
    type Error = KMeansParamsError;

    fn check_ref(&self) -> Result<&Self::Checked, Self::Error> {
        let params = &self.0;
        if params.n_clusters == 0 {
            Err(KMeansParamsError::NClusters)
        } else if params.n_runs == 0 {
            Err(KMeansParamsError::NRuns)
        } else if params.tolerance <= F::zero() {
            Err(KMeansParamsError::Tolerance)
        } else if params.max_n_iterations == 0 {
            Err(KMeansParamsError::MaxIterations)
        } else {
            Ok(params)
        }
    }

    fn check(self) -> Result<Self::Checked, Self::Error> {
        self.check_ref()?;
        Ok(self.0)
    }
}

impl<F: Float, R: Rng> KMeansValidParams<F, R> {
    pub fn n_runs(&self) -> usize {
        self.n_runs
    }

    pub fn tolerance(&self) -> F {
        self.tolerance
    }

    pub fn max_n_iterations(&self) -> u64 {
        self.max_n_iterations
    }

    pub fn n_clusters(&self) -> usize {
        self.n_clusters
    }

    pub fn init_method(&self) -> KMeansInit {
        self.init
    }

    /// Generator the restart seeds are drawn from
    pub fn rng(&self) -> &R {
        &self.rng
    }
}

#[cfg(test)]
mod tests {
    use crate::{KMeans, KMeansInit, KMeansParams, KMeansParamsError, KMeansValidParams};
    use rand::SeedableRng;
    use rand_xoshiro::Xoshiro256Plus;
    use storemix::ParamGuard;

    #[test]
    fn autotraits() {
        fn has_autotraits<T: Send + Sync + Sized + Unpin>() {}
        has_autotraits::<KMeansParams<f64, Xoshiro256Plus>>();
        has_autotraits::<KMeansValidParams<f64, Xoshiro256Plus>>();
    }

    #[test]
    fn defaults() {
        let params = KMeans::<f64>::params(4).check().unwrap();
        assert_eq!(params.n_clusters(), 4);
        assert_eq!(params.n_runs(), 10);
        assert_eq!(params.max_n_iterations(), 300);
        assert_eq!(params.tolerance(), 1e-4);
        assert_eq!(params.init_method(), KMeansInit::KMeansPlusPlus);
        assert_eq!(params.rng(), &Xoshiro256Plus::seed_from_u64(42));
    }

    #[test]
    fn invalid_settings_are_rejected() {
        assert!(matches!(
            KMeans::<f32>::params(0).check(),
            Err(KMeansParamsError::NClusters)
        ));
        assert!(matches!(
            KMeans::<f64>::params(1).n_runs(0).check(),
            Err(KMeansParamsError::NRuns)
        ));
        for &tolerance in &[-1., 0.] {
            assert!(matches!(
                KMeans::params(1).tolerance(tolerance).check(),
                Err(KMeansParamsError::Tolerance)
            ));
        }
        assert!(matches!(
            KMeans::params(1).tolerance(1.).max_n_iterations(0).check(),
            Err(KMeansParamsError::MaxIterations)
        ));
    }
}
