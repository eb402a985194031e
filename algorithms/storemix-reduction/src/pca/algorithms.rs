//! Principal Component Analysis
//!
//! Principal Component Analysis is a common technique for data and dimensionality reduction. It
//! reduces the dimensionality of the data while retaining most of the variance. This
//! implementation diagonalizes the covariance matrix with the symmetric eigensolver of
//! `linfa-linalg`. When a block has more columns than there are stores, the smaller Gram matrix
//! is diagonalized instead and the components are recovered from its eigenvectors.
//!
//! # Example
//!
//! ```
//! use storemix::traits::{Fit, Transformer};
//! use storemix_reduction::{Pca, PcaParams};
//! use ndarray::array;
//!
//! let records = array![[1., 2., 0.], [2., 4., 0.], [3., 6., 1.], [4., 8., 1.]];
//!
//! // project onto the direction which maximizes the spread of the data
//! let pca: Pca<f64> = PcaParams::new(1).fit(&records).unwrap();
//! let embedding = pca.transform(&records);
//! assert_eq!(embedding.dim(), (4, 1));
//! ```
use log::debug;
use ndarray::{Array1, Array2, ArrayBase, Axis, Data, Ix2};
#[cfg(feature = "serde")]
use serde_crate::{Deserialize, Serialize};

use linfa_linalg::eigh::Eigh;
use storemix::{
    traits::{Fit, Transformer},
    Float,
};

use super::hyperparams::{PcaTarget, PcaValidParams};
use crate::error::{ReductionError, Result};

/// Fitted Principal Component Analysis model
///
/// The model contains the mean and hyperplane for the projection of data.
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate")
)]
#[derive(Debug, Clone, PartialEq)]
pub struct Pca<F> {
    // (n_components, n_features)
    components: Array2<F>,
    explained_variance: Array1<F>,
    total_variance: F,
    mean: Array1<F>,
}

impl<F: Float, D: Data<Elem = F>> Fit<ArrayBase<D, Ix2>, ReductionError> for PcaValidParams {
    type Object = Pca<F>;

    /// Fit a PCA model on the full population of records
    fn fit(&self, records: &ArrayBase<D, Ix2>) -> Result<Pca<F>> {
        let (n_samples, n_features) = records.dim();
        if n_samples == 0 {
            return Err(ReductionError::NotEnoughSamples);
        }
        if let PcaTarget::Components(n) = self.target() {
            if n > n_features {
                return Err(ReductionError::DimensionIncrease(n, n_features));
            }
        }

        // calculate mean of data and subtract it
        let mean = records
            .mean_axis(Axis(0))
            .ok_or(ReductionError::NotEnoughSamples)?;
        let centered = records - &mean;
        let dof = F::cast(n_samples.saturating_sub(1).max(1));

        let (eigvals, components) = if n_features <= n_samples {
            let cov = centered.t().dot(&centered) / dof;
            let (vals, vecs) = cov.eigh()?;
            let order = descending(&vals);
            let vals = order.iter().map(|&i| vals[i].max(F::zero())).collect::<Array1<F>>();
            let components = vecs.select(Axis(1), &order).reversed_axes();
            (vals, components)
        } else {
            // the non-zero spectrum of X^T X equals the spectrum of X X^T
            let gram = centered.dot(&centered.t()) / dof;
            let (vals, vecs) = gram.eigh()?;
            let order = descending(&vals);
            let vals = order.iter().map(|&i| vals[i].max(F::zero())).collect::<Array1<F>>();
            let mut components = Array2::zeros((order.len(), n_features));
            for (mut component, (&i, &val)) in components
                .rows_mut()
                .into_iter()
                .zip(order.iter().zip(vals.iter()))
            {
                if val > F::epsilon() {
                    let direction = centered.t().dot(&vecs.column(i));
                    let norm = direction.dot(&direction).sqrt();
                    if norm > F::zero() {
                        component.assign(&(direction / norm));
                    }
                }
            }
            (vals, components)
        };

        let total_variance = eigvals.sum();
        let ratios = explained_ratios(&eigvals, total_variance);
        let n_components = match self.target() {
            PcaTarget::Components(n) => n,
            PcaTarget::Variance(fraction) => {
                let fraction = F::cast(fraction);
                let mut cumulative = F::zero();
                let mut n = ratios.len();
                for (i, ratio) in ratios.iter().enumerate() {
                    cumulative += *ratio;
                    if cumulative + F::cast(1e-12) >= fraction {
                        n = i + 1;
                        break;
                    }
                }
                n.max(1)
            }
        }
        .min(components.nrows());

        let mut components = components.slice_move(ndarray::s![..n_components, ..]);
        fix_signs(&mut components);
        let explained_variance = eigvals.slice_move(ndarray::s![..n_components]);

        debug!(
            "pca kept {} of {} components explaining {:.4} of the variance",
            n_components,
            n_features,
            explained_ratios(&explained_variance, total_variance).sum()
        );

        Ok(Pca {
            components,
            explained_variance,
            total_variance,
            mean,
        })
    }
}

impl<F: Float> Pca<F> {
    /// Number of kept components
    pub fn n_components(&self) -> usize {
        self.components.nrows()
    }

    /// Principal axes with shape `(n_components, n_features)`
    pub fn components(&self) -> &Array2<F> {
        &self.components
    }

    /// Variance along each kept component
    pub fn explained_variance(&self) -> &Array1<F> {
        &self.explained_variance
    }

    /// Fraction of the total variance explained by each kept component
    pub fn explained_variance_ratio(&self) -> Array1<F> {
        explained_ratios(&self.explained_variance, self.total_variance)
    }

    /// Fraction of the total variance kept by the projection
    ///
    /// A population without any variance is fully explained by any projection.
    pub fn variance_explained(&self) -> F {
        if self.total_variance > F::zero() {
            self.explained_variance_ratio().sum()
        } else {
            F::one()
        }
    }

    /// Mean subtracted before projecting
    pub fn mean(&self) -> &Array1<F> {
        &self.mean
    }
}

impl<F: Float, D: Data<Elem = F>> Transformer<&ArrayBase<D, Ix2>, Array2<F>> for Pca<F> {
    /// Project records with shape `(n_samples, n_features)` onto the principal axes
    fn transform(&self, records: &ArrayBase<D, Ix2>) -> Array2<F> {
        (records - &self.mean).dot(&self.components.t())
    }
}

fn descending<F: Float>(vals: &Array1<F>) -> Vec<usize> {
    let mut order = (0..vals.len()).collect::<Vec<_>>();
    order.sort_by(|&a, &b| vals[b].partial_cmp(&vals[a]).unwrap_or(std::cmp::Ordering::Equal));
    order
}

fn explained_ratios<F: Float>(vals: &Array1<F>, total: F) -> Array1<F> {
    if total > F::zero() {
        vals.mapv(|v| v / total)
    } else {
        Array1::zeros(vals.len())
    }
}

// eigenvectors are only defined up to sign, make the largest loading positive
fn fix_signs<F: Float>(components: &mut Array2<F>) {
    for mut component in components.rows_mut() {
        let pivot = component
            .iter()
            .fold(F::zero(), |acc, &x| if x.abs() > acc.abs() { x } else { acc });
        if pivot < F::zero() {
            component.mapv_inplace(|x| -x);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::PcaParams;
    use approx::assert_abs_diff_eq;
    use ndarray::{array, Array};
    use ndarray_rand::rand::SeedableRng;
    use ndarray_rand::rand_distr::Uniform;
    use ndarray_rand::RandomExt;
    use rand_xoshiro::Xoshiro256Plus;

    #[test]
    fn line_is_explained_by_one_component() {
        let records = array![[1., 2.], [2., 4.], [3., 6.], [4., 8.]];
        let pca: Pca<f64> = PcaParams::new(1).fit(&records).unwrap();

        assert_abs_diff_eq!(pca.variance_explained(), 1.0, epsilon = 1e-8);
        let norm = 5f64.sqrt();
        assert_abs_diff_eq!(
            pca.components().row(0),
            array![1. / norm, 2. / norm],
            epsilon = 1e-8
        );

        let embedding = pca.transform(&records);
        assert_abs_diff_eq!(embedding.column(0).sum(), 0.0, epsilon = 1e-8);
        assert!(embedding[[0, 0]] < embedding[[3, 0]]);
    }

    #[test]
    fn variance_target_picks_smallest_sufficient_rank() {
        let mut rng = Xoshiro256Plus::seed_from_u64(42);
        let signal = Array::random_using((50, 1), Uniform::new(-10., 10.), &mut rng);
        let noise = Array::random_using((50, 3), Uniform::new(-0.01, 0.01), &mut rng);
        let records = ndarray::concatenate![Axis(1), signal, noise];

        let pca: Pca<f64> = PcaParams::explained_variance(0.95).fit(&records).unwrap();
        assert_eq!(pca.n_components(), 1);
        assert!(pca.variance_explained() >= 0.95);

        let full: Pca<f64> = PcaParams::explained_variance(1.0).fit(&records).unwrap();
        assert_eq!(full.n_components(), 4);
    }

    #[test]
    fn wide_blocks_use_the_gram_matrix() {
        let mut rng = Xoshiro256Plus::seed_from_u64(7);
        let records = Array::random_using((6, 40), Uniform::new(0., 1.), &mut rng);

        let pca: Pca<f64> = PcaParams::new(3).fit(&records).unwrap();
        let components = pca.components();
        // principal axes are orthonormal
        let gram = components.dot(&components.t());
        assert_abs_diff_eq!(gram, Array2::eye(3), epsilon = 1e-6);

        // ratios are consistent with the eigenvalues of the covariance matrix
        let ratios = pca.explained_variance_ratio();
        assert!(ratios[0] >= ratios[1] && ratios[1] >= ratios[2]);
        assert!(pca.variance_explained() <= 1.0 + 1e-9);
    }

    #[test]
    fn projection_is_deterministic() {
        let mut rng = Xoshiro256Plus::seed_from_u64(3);
        let records = Array::random_using((30, 5), Uniform::new(0., 1.), &mut rng);

        let first: Pca<f64> = PcaParams::new(2).fit(&records).unwrap();
        let second: Pca<f64> = PcaParams::new(2).fit(&records).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn constant_records_are_fully_explained() {
        let records = Array2::from_elem((5, 3), 2.0);
        let pca: Pca<f64> = PcaParams::new(2).fit(&records).unwrap();
        assert_abs_diff_eq!(pca.variance_explained(), 1.0);
        assert_abs_diff_eq!(pca.transform(&records), Array2::zeros((5, 2)));
    }

    #[test]
    fn more_components_than_features_fail() {
        let records = array![[1., 2.], [2., 4.]];
        let res: Result<Pca<f64>> = PcaParams::new(3).fit(&records);
        assert!(matches!(res, Err(ReductionError::DimensionIncrease(3, 2))));
    }
}
