//! Column and row scaling used by the block pipelines
use approx::abs_diff_eq;
use linfa_linalg::norm::Norm;
use ndarray::{Array1, Array2, ArrayBase, Axis, Data, Ix2, Zip};
use storemix::Float;

/// Standard scaler fitted on a population: `(x - mean) / std` per column
///
/// Columns with zero variance are only centered, so a constant column maps to 0 for every row.
#[derive(Clone, Debug, PartialEq)]
pub struct StandardScaler<F> {
    offsets: Array1<F>,
    scales: Array1<F>,
}

impl<F: Float> StandardScaler<F> {
    /// Returns `None` for a matrix without rows
    pub fn fit<D: Data<Elem = F>>(records: &ArrayBase<D, Ix2>) -> Option<Self> {
        let offsets = records.mean_axis(Axis(0))?;
        let scales = records.std_axis(Axis(0), F::zero()).mapv(|s| {
            if abs_diff_eq!(s, F::zero()) {
                // constant column, don't scale
                F::one()
            } else {
                F::one() / s
            }
        });
        Some(StandardScaler { offsets, scales })
    }

    pub fn offsets(&self) -> &Array1<F> {
        &self.offsets
    }

    pub fn scales(&self) -> &Array1<F> {
        &self.scales
    }

    pub fn transform(&self, mut records: Array2<F>) -> Array2<F> {
        Zip::from(records.columns_mut())
            .and(&self.offsets)
            .and(&self.scales)
            .for_each(|mut col, &offset, &scale| {
                col.mapv_inplace(|el| (el - offset) * scale);
            });
        records
    }
}

/// Divide every row by its sum, rows summing to zero are left as they are
pub fn row_normalize<F: Float>(mut records: Array2<F>) -> Array2<F> {
    for mut row in records.rows_mut() {
        let sum = row.sum();
        if sum != F::zero() {
            row.mapv_inplace(|el| el / sum);
        }
    }
    records
}

/// Scale every row to unit euclidean norm, all-zero rows are left as they are
pub fn l2_normalize<F: Float>(mut records: Array2<F>) -> Array2<F> {
    let norms = records.map_axis(Axis(1), |row| row.norm_l2());
    Zip::from(records.rows_mut())
        .and(&norms)
        .for_each(|mut row, &norm| {
            if norm > F::zero() {
                row.mapv_inplace(|el| el / norm);
            }
        });
    records
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    #[test]
    fn standard_scaler() {
        let records = array![[1., 5.], [3., 5.], [5., 5.]];
        let scaler = StandardScaler::fit(&records).unwrap();
        assert_abs_diff_eq!(scaler.offsets(), &array![3., 5.]);
        let scaled = scaler.transform(records);
        let sd = (8.0f64 / 3.).sqrt();
        assert_abs_diff_eq!(
            scaled,
            array![[-2. / sd, 0.], [0., 0.], [2. / sd, 0.]],
            epsilon = 1e-12
        );
    }

    #[test]
    fn empty_records_cannot_be_scaled() {
        let records = Array2::<f64>::zeros((0, 2));
        assert!(StandardScaler::fit(&records).is_none());
    }

    #[test]
    fn row_sums() {
        let records = array![[1., 3.], [0., 0.], [2., 2.]];
        assert_abs_diff_eq!(
            row_normalize(records),
            array![[0.25, 0.75], [0., 0.], [0.5, 0.5]]
        );
    }

    #[test]
    fn unit_norm() {
        let records = array![[3., 4.], [0., 0.]];
        assert_abs_diff_eq!(l2_normalize(records), array![[0.6, 0.8], [0., 0.]]);
    }
}
