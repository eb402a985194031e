//! Construction of the feature matrix of a run
use std::collections::BTreeSet;

use log::{debug, info, warn};
use ndarray::{concatenate, Array2, ArrayView2, Axis};
#[cfg(feature = "serde")]
use serde_crate::{Deserialize, Serialize};
use storemix::traits::{Fit, Transformer};
use storemix::{ParamGuard, StoreId, StoreRecord, StoreTable, TemperatureBand};
use storemix_reduction::{Pca, PcaParams, PcaTarget, ReductionError};

use crate::block::{FeatureBlockSpec, MissingPolicy, Transform};
use crate::error::{FeatureSpecError, Result};
use crate::scaling::{l2_normalize, row_normalize, StandardScaler};

/// What happened to a block while building the feature matrix
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate")
)]
#[derive(Clone, Debug, PartialEq)]
pub struct BlockReport {
    pub name: String,
    pub weight: f64,
    /// Number of source columns
    pub input_dim: usize,
    /// Number of columns in the feature matrix, 0 for a disabled block
    pub output_dim: usize,
    /// Fraction of the variance kept by PCA, `None` without a PCA step
    pub variance_explained: Option<f64>,
    /// Whether PCA was skipped because the block is already small enough
    pub pca_skipped: bool,
    pub disabled: bool,
}

/// The per-store feature vectors of a run, one row per store in table order
#[derive(Clone, Debug, PartialEq)]
pub struct FeatureMatrix {
    pub store_ids: Vec<StoreId>,
    pub bands: Vec<TemperatureBand>,
    pub records: Array2<f64>,
    pub column_names: Vec<String>,
    pub block_reports: Vec<BlockReport>,
    /// Conditions worth surfacing to the caller, such as skipped reductions
    pub warnings: Vec<String>,
}

impl FeatureMatrix {
    pub fn nstores(&self) -> usize {
        self.records.nrows()
    }

    pub fn nfeatures(&self) -> usize {
        self.records.ncols()
    }
}

/// Checked feature block configuration
///
/// Fitting it on a [`StoreTable`] produces the [`FeatureMatrix`]:
/// * source columns are looked up in the product-mix values, then in the profile attributes,
///   missing cells are filled according to the block's [`MissingPolicy`]
/// * the block pipeline runs in declared order, PCA being fitted on the whole population
/// * every value is multiplied by the block weight
/// * enabled blocks are concatenated in declared order and rows are optionally scaled to unit
///   euclidean norm
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate")
)]
#[derive(Clone, Debug, PartialEq)]
pub struct FeatureBlockBuilder {
    blocks: Vec<FeatureBlockSpec>,
    normalize_rows: bool,
}

/// Unchecked feature block configuration, see [`FeatureBlockBuilder`]
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate")
)]
#[derive(Clone, Debug, PartialEq)]
pub struct FeatureBlockBuilderParams(FeatureBlockBuilder);

impl FeatureBlockBuilder {
    pub fn params() -> FeatureBlockBuilderParams {
        FeatureBlockBuilderParams(FeatureBlockBuilder {
            blocks: Vec::new(),
            normalize_rows: false,
        })
    }

    pub fn blocks(&self) -> &[FeatureBlockSpec] {
        &self.blocks
    }

    pub fn normalize_rows(&self) -> bool {
        self.normalize_rows
    }
}

impl Default for FeatureBlockBuilderParams {
    fn default() -> Self {
        FeatureBlockBuilder::params()
    }
}

impl FeatureBlockBuilderParams {
    /// Append a block, blocks are concatenated in the order they are added
    pub fn block(mut self, block: FeatureBlockSpec) -> Self {
        self.0.blocks.push(block);
        self
    }

    pub fn blocks<I: IntoIterator<Item = FeatureBlockSpec>>(mut self, blocks: I) -> Self {
        self.0.blocks.extend(blocks);
        self
    }

    /// Scale every feature vector to unit euclidean norm after concatenation
    pub fn normalize_rows(mut self, normalize_rows: bool) -> Self {
        self.0.normalize_rows = normalize_rows;
        self
    }
}

impl ParamGuard for FeatureBlockBuilderParams {
    type Checked = FeatureBlockBuilder;
    type Error = FeatureSpecError;

    fn check_ref(&self) -> Result<&Self::Checked> {
        let mut names = BTreeSet::new();
        let mut columns = BTreeSet::new();
        for block in &self.0.blocks {
            block.validate()?;
            if !names.insert(block.name.as_str()) {
                return Err(FeatureSpecError::DuplicateBlock(block.name.clone()));
            }
            if !block.is_enabled() || block.pca().is_some() {
                continue;
            }
            for column in block.passthrough_columns() {
                if !columns.insert(column.clone()) {
                    return Err(FeatureSpecError::DuplicateColumn(column));
                }
            }
        }
        if !self.0.blocks.iter().any(|b| b.is_enabled()) {
            return Err(FeatureSpecError::NoActiveBlock);
        }
        Ok(&self.0)
    }

    fn check(self) -> Result<Self::Checked> {
        self.check_ref()?;
        Ok(self.0)
    }
}

impl Fit<StoreTable, FeatureSpecError> for FeatureBlockBuilder {
    type Object = FeatureMatrix;

    fn fit(&self, table: &StoreTable) -> Result<FeatureMatrix> {
        let mut outputs = Vec::new();
        let mut column_names = Vec::new();
        let mut block_reports = Vec::new();
        let mut warnings = Vec::new();

        for block in &self.blocks {
            if !block.is_enabled() {
                warn!("feature block `{}` has weight 0 and is disabled", block.name);
                block_reports.push(BlockReport {
                    name: block.name.clone(),
                    weight: 0.0,
                    input_dim: block.source_columns.len(),
                    output_dim: 0,
                    variance_explained: None,
                    pca_skipped: false,
                    disabled: true,
                });
                continue;
            }

            let built = build_block(block, table)?;
            if built.report.pca_skipped {
                warnings.push(format!(
                    "feature block `{}` has {} columns, PCA skipped",
                    block.name, built.report.input_dim
                ));
            }
            debug!(
                "feature block `{}`: {} columns in, {} out",
                block.name, built.report.input_dim, built.report.output_dim
            );
            column_names.extend(built.columns);
            block_reports.push(built.report);
            outputs.push(built.records);
        }

        let mut seen = BTreeSet::new();
        for name in &column_names {
            if !seen.insert(name) {
                return Err(FeatureSpecError::DuplicateColumn(name.clone()));
            }
        }

        let views = outputs.iter().map(|o| o.view()).collect::<Vec<ArrayView2<f64>>>();
        let mut records = concatenate(Axis(1), &views)
            .map_err(|_| FeatureSpecError::NoActiveBlock)?;
        if self.normalize_rows {
            records = l2_normalize(records);
        }

        info!(
            "built {} features for {} stores from {} blocks",
            records.ncols(),
            records.nrows(),
            outputs.len()
        );

        Ok(FeatureMatrix {
            store_ids: table.store_ids(),
            bands: table.bands(),
            records,
            column_names,
            block_reports,
            warnings,
        })
    }
}

struct BuiltBlock {
    records: Array2<f64>,
    columns: Vec<String>,
    report: BlockReport,
}

fn build_block(block: &FeatureBlockSpec, table: &StoreTable) -> Result<BuiltBlock> {
    let stores = table.records();
    let mut records = extract(block, table)?;
    let mut columns = block.passthrough_columns();
    let mut variance_explained = None;
    let mut pca_skipped = false;

    for transform in &block.transforms {
        records = match *transform {
            Transform::Log1p => log1p(block, stores, records)?,
            Transform::RowNormalize => row_normalize(records),
            Transform::Standardize => match StandardScaler::fit(&records) {
                Some(scaler) => scaler.transform(records),
                None => records,
            },
            Transform::Pca(target) => {
                let n_features = records.ncols();
                match target {
                    PcaTarget::Components(n) if n_features <= n => {
                        warn!(
                            "feature block `{}` has {} columns, not more than the {} components requested, PCA skipped",
                            block.name, n_features, n
                        );
                        pca_skipped = true;
                        variance_explained = Some(1.0);
                        records
                    }
                    _ => {
                        let fitted: std::result::Result<Pca<f64>, ReductionError> =
                            PcaParams::from(target).fit(&records);
                        let pca = fitted?;
                        variance_explained = Some(pca.variance_explained());
                        columns = block.component_columns(pca.n_components());
                        debug!(
                            "feature block `{}` reduced to {} components, {:.4} of the variance",
                            block.name,
                            pca.n_components(),
                            pca.variance_explained()
                        );
                        pca.transform(&records)
                    }
                }
            }
        };
    }

    records.mapv_inplace(|el| el * block.weight);

    Ok(BuiltBlock {
        report: BlockReport {
            name: block.name.clone(),
            weight: block.weight,
            input_dim: block.source_columns.len(),
            output_dim: records.ncols(),
            variance_explained,
            pca_skipped,
            disabled: false,
        },
        records,
        columns,
    })
}

/// Reads the source columns of a block, filling missing cells
fn extract(block: &FeatureBlockSpec, table: &StoreTable) -> Result<Array2<f64>> {
    let stores = table.records();
    let mut records = Array2::zeros((stores.len(), block.source_columns.len()));
    for (mut col, name) in records.columns_mut().into_iter().zip(&block.source_columns) {
        let values = stores.iter().map(|s| s.value(name)).collect::<Vec<_>>();
        let mut present = values.iter().flatten().copied().collect::<Vec<f64>>();
        if present.is_empty() {
            return Err(FeatureSpecError::UnknownColumn {
                block: block.name.clone(),
                column: name.clone(),
            });
        }
        let fill = match block.missing {
            MissingPolicy::BySource if table.is_profile_column(name) => median(&mut present),
            MissingPolicy::BySource | MissingPolicy::Zero => 0.0,
            MissingPolicy::Median => median(&mut present),
        };
        for (cell, value) in col.iter_mut().zip(values) {
            *cell = value.unwrap_or(fill);
        }
    }
    Ok(records)
}

fn median(values: &mut [f64]) -> f64 {
    values.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    let mid = values.len() / 2;
    if values.len() % 2 == 0 {
        (values[mid - 1] + values[mid]) / 2.0
    } else {
        values[mid]
    }
}

fn log1p(
    block: &FeatureBlockSpec,
    stores: &[StoreRecord],
    mut records: Array2<f64>,
) -> Result<Array2<f64>> {
    for ((row, col), &value) in records.indexed_iter() {
        if value < 0.0 {
            return Err(FeatureSpecError::NegativeValue {
                store: stores[row].store_id.clone(),
                column: block.source_columns[col].clone(),
                value,
            });
        }
    }
    records.mapv_inplace(f64::ln_1p);
    Ok(records)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use ndarray::array;

    fn table() -> StoreTable {
        StoreTable::new(vec![
            StoreRecord::new("a", "Hot")
                .with_feature("juice", 3.)
                .with_feature("soup", 1.)
                .with_attribute("area", 100.),
            StoreRecord::new("b", "Cold")
                .with_feature("soup", 4.)
                .with_attribute("area", 300.),
            StoreRecord::new("c", "Cold").with_feature("juice", 2.),
        ])
        .unwrap()
    }

    #[test]
    fn missing_values() {
        let features = FeatureBlockBuilder::params()
            .block(FeatureBlockSpec::new("mix", &["juice", "soup"]))
            .block(FeatureBlockSpec::new("profile", &["area"]).missing(MissingPolicy::Median))
            .fit(&table())
            .unwrap();
        assert_abs_diff_eq!(
            features.records,
            array![[3., 1., 100.], [0., 4., 300.], [2., 0., 200.]]
        );
        assert_eq!(features.store_ids, vec!["a", "b", "c"]);
        assert_eq!(features.bands[1], TemperatureBand::from("Cold"));
    }

    #[test]
    fn profile_attributes_default_to_the_median() {
        let features = FeatureBlockBuilder::params()
            .block(FeatureBlockSpec::new("profile", &["area"]))
            .fit(&table())
            .unwrap();
        assert_abs_diff_eq!(features.records, array![[100.], [300.], [200.]]);
    }

    #[test]
    fn product_mix_defaults_to_zero_and_overrides_apply() {
        let features = FeatureBlockBuilder::params()
            .block(FeatureBlockSpec::new("mix", &["juice"]))
            .block(FeatureBlockSpec::new("mix_median", &["soup"]).missing(MissingPolicy::Median))
            .block(FeatureBlockSpec::new("profile", &["area"]).missing(MissingPolicy::Zero))
            .fit(&table())
            .unwrap();
        assert_abs_diff_eq!(
            features.records,
            array![[3., 1., 100.], [0., 4., 300.], [2., 2.5, 0.]]
        );
    }

    #[test]
    fn weights_and_disabled_blocks() {
        let features = FeatureBlockBuilder::params()
            .block(FeatureBlockSpec::new("mix", &["juice", "soup"]).weight(2.))
            .block(FeatureBlockSpec::new("profile", &["area"]).weight(0.))
            .fit(&table())
            .unwrap();
        assert_eq!(features.column_names, vec!["juice", "soup"]);
        assert_abs_diff_eq!(features.records, array![[6., 2.], [0., 8.], [4., 0.]]);
        assert!(features.block_reports[1].disabled);
        assert_eq!(features.block_reports[1].output_dim, 0);
    }

    #[test]
    fn log_then_row_normalize() {
        let features = FeatureBlockBuilder::params()
            .block(
                FeatureBlockSpec::new("mix", &["juice", "soup"])
                    .transform(Transform::Log1p)
                    .transform(Transform::RowNormalize),
            )
            .fit(&table())
            .unwrap();
        let a = (4f64).ln() / ((4f64).ln() + (2f64).ln());
        assert_abs_diff_eq!(features.records.row(0), array![a, 1. - a], epsilon = 1e-12);
        assert_abs_diff_eq!(features.records.row(2), array![1., 0.]);
    }

    #[test]
    fn negative_values_cannot_be_logged() {
        let table = StoreTable::new(vec![
            StoreRecord::new("a", "Hot").with_feature("juice", 1.),
            StoreRecord::new("b", "Hot").with_feature("juice", -1.),
        ])
        .unwrap();
        let res = FeatureBlockBuilder::params()
            .block(FeatureBlockSpec::new("mix", &["juice"]).transform(Transform::Log1p))
            .fit(&table);
        match res {
            Err(FeatureSpecError::NegativeValue { store, column, .. }) => {
                assert_eq!(store, "b");
                assert_eq!(column, "juice");
            }
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn unknown_column() {
        let res = FeatureBlockBuilder::params()
            .block(FeatureBlockSpec::new("mix", &["juice", "bread"]))
            .fit(&table());
        assert!(matches!(
            res,
            Err(FeatureSpecError::UnknownColumn { ref column, .. }) if column == "bread"
        ));
    }

    #[test]
    fn configuration_errors() {
        let res = FeatureBlockBuilder::params()
            .block(FeatureBlockSpec::new("mix", &["juice"]))
            .block(FeatureBlockSpec::new("mix", &["soup"]))
            .check();
        assert!(matches!(res, Err(FeatureSpecError::DuplicateBlock(_))));

        let res = FeatureBlockBuilder::params()
            .block(FeatureBlockSpec::new("mix", &["juice"]))
            .block(FeatureBlockSpec::new("other", &["juice"]))
            .check();
        assert!(matches!(res, Err(FeatureSpecError::DuplicateColumn(_))));

        let res = FeatureBlockBuilder::params()
            .block(FeatureBlockSpec::new("mix", &["juice"]).weight(0.))
            .check();
        assert!(matches!(res, Err(FeatureSpecError::NoActiveBlock)));
        assert!(matches!(
            FeatureBlockBuilder::params().check(),
            Err(FeatureSpecError::NoActiveBlock)
        ));
    }

    #[test]
    fn small_block_skips_pca() {
        let features = FeatureBlockBuilder::params()
            .block(
                FeatureBlockSpec::new("mix", &["juice", "soup"])
                    .transform(Transform::Pca(PcaTarget::Components(2))),
            )
            .fit(&table())
            .unwrap();
        let report = &features.block_reports[0];
        assert!(report.pca_skipped);
        assert_eq!(report.variance_explained, Some(1.0));
        assert_eq!(features.column_names, vec!["juice", "soup"]);
        assert_eq!(features.warnings.len(), 1);
    }

    #[test]
    fn pca_columns_are_named_after_the_block() {
        let features = FeatureBlockBuilder::params()
            .block(
                FeatureBlockSpec::new("mix", &["juice", "soup"])
                    .transform(Transform::Pca(PcaTarget::Components(1))),
            )
            .normalize_rows(true)
            .fit(&table())
            .unwrap();
        assert_eq!(features.column_names, vec!["mix.pc1"]);
        assert_eq!(features.nfeatures(), 1);
        let report = &features.block_reports[0];
        assert!(!report.pca_skipped);
        assert!(report.variance_explained.unwrap() > 0.5);
        for &value in features.records.iter() {
            assert_abs_diff_eq!(value.abs(), 1.0, epsilon = 1e-12);
        }
    }
}
