use std::collections::BTreeSet;
use std::fmt;

#[cfg(feature = "serde")]
use serde_crate::{Deserialize, Serialize};
use storemix::ParamGuard;
use storemix_reduction::{PcaParams, PcaTarget};

use crate::error::{FeatureSpecError, Result};

/// A single step of a block pipeline
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate", rename_all = "snake_case")
)]
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum Transform {
    /// `ln(1 + x)`, only defined for non-negative values
    Log1p,
    /// Divide every value by the sum of its row, all-zero rows are left untouched
    RowNormalize,
    /// Zero mean and unit variance per column, constant columns become 0
    Standardize,
    /// Principal component projection, must come last
    Pca(PcaTarget),
}

impl fmt::Display for Transform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Transform::Log1p => write!(f, "log1p"),
            Transform::RowNormalize => write!(f, "row-normalize"),
            Transform::Standardize => write!(f, "standardize"),
            Transform::Pca(PcaTarget::Components(n)) => write!(f, "pca({} components)", n),
            Transform::Pca(PcaTarget::Variance(v)) => write!(f, "pca({} variance)", v),
        }
    }
}

/// How a store without a value in a source column is filled in
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate", rename_all = "snake_case")
)]
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum MissingPolicy {
    /// `Median` for profile attributes, `Zero` for product-mix values
    BySource,
    /// The value is 0, the natural reading of a product that was not sold
    Zero,
    /// The median over the stores having the value
    Median,
}

impl Default for MissingPolicy {
    fn default() -> Self {
        MissingPolicy::BySource
    }
}

fn default_weight() -> f64 {
    1.0
}

/// A named group of source columns with its transform pipeline and weight
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate")
)]
#[derive(Clone, Debug, PartialEq)]
pub struct FeatureBlockSpec {
    pub name: String,
    pub source_columns: Vec<String>,
    #[cfg_attr(feature = "serde", serde(default))]
    pub transforms: Vec<Transform>,
    #[cfg_attr(feature = "serde", serde(default = "default_weight"))]
    pub weight: f64,
    #[cfg_attr(feature = "serde", serde(default))]
    pub missing: MissingPolicy,
}

impl FeatureBlockSpec {
    /// A block reading `columns`, with an empty pipeline, a weight of 1 and source-dependent filling
    pub fn new<I>(name: &str, columns: I) -> Self
    where
        I: IntoIterator,
        I::Item: AsRef<str>,
    {
        FeatureBlockSpec {
            name: name.to_string(),
            source_columns: columns.into_iter().map(|c| c.as_ref().to_string()).collect(),
            transforms: Vec::new(),
            weight: default_weight(),
            missing: MissingPolicy::default(),
        }
    }

    /// Append a step to the pipeline
    pub fn transform(mut self, transform: Transform) -> Self {
        self.transforms.push(transform);
        self
    }

    pub fn weight(mut self, weight: f64) -> Self {
        self.weight = weight;
        self
    }

    pub fn missing(mut self, missing: MissingPolicy) -> Self {
        self.missing = missing;
        self
    }

    /// A block with a weight of 0 takes no part in the feature matrix
    pub fn is_enabled(&self) -> bool {
        self.weight != 0.0
    }

    /// The final PCA step, if any
    pub fn pca(&self) -> Option<PcaTarget> {
        match self.transforms.last() {
            Some(Transform::Pca(target)) => Some(*target),
            _ => None,
        }
    }

    /// Output column names when the block is not reduced
    pub(crate) fn passthrough_columns(&self) -> Vec<String> {
        self.source_columns.clone()
    }

    /// Output column names of a block reduced to `n` components
    pub(crate) fn component_columns(&self, n: usize) -> Vec<String> {
        (1..=n).map(|i| format!("{}.pc{}", self.name, i)).collect()
    }

    /// Checks everything that does not depend on the store table
    pub fn validate(&self) -> Result<()> {
        if self.name.trim().is_empty() {
            return Err(FeatureSpecError::EmptyName);
        }
        if self.source_columns.is_empty() {
            return Err(FeatureSpecError::NoColumns(self.name.clone()));
        }
        if !self.weight.is_finite() || self.weight < 0.0 {
            return Err(FeatureSpecError::InvalidWeight {
                block: self.name.clone(),
                weight: self.weight,
            });
        }

        let mut columns = BTreeSet::new();
        for column in &self.source_columns {
            if !columns.insert(column) {
                return Err(FeatureSpecError::DuplicateColumn(column.clone()));
            }
        }

        let n_pca = self
            .transforms
            .iter()
            .filter(|t| matches!(t, Transform::Pca(_)))
            .count();
        if n_pca > 1 {
            return Err(self.malformed("pca appears more than once"));
        }
        if n_pca == 1 {
            let target = match self.pca() {
                Some(target) => target,
                None => return Err(self.malformed("pca must be the last step")),
            };
            PcaParams::from(target).check_ref()?;
        }
        Ok(())
    }

    fn malformed(&self, reason: &str) -> FeatureSpecError {
        FeatureSpecError::MalformedPipeline {
            block: self.name.clone(),
            reason: reason.to_string(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn valid_block() {
        let block = FeatureBlockSpec::new("mix", &["a", "b", "c"])
            .transform(Transform::Log1p)
            .transform(Transform::RowNormalize)
            .transform(Transform::Pca(PcaTarget::Variance(0.9)))
            .weight(2.0);
        assert!(block.validate().is_ok());
        assert_eq!(block.pca(), Some(PcaTarget::Variance(0.9)));
        assert_eq!(block.component_columns(2), vec!["mix.pc1", "mix.pc2"]);
    }

    #[test]
    fn pca_must_be_last_and_unique() {
        let block = FeatureBlockSpec::new("mix", &["a", "b"])
            .transform(Transform::Pca(PcaTarget::Components(1)))
            .transform(Transform::Standardize);
        assert!(matches!(
            block.validate(),
            Err(FeatureSpecError::MalformedPipeline { .. })
        ));

        let block = FeatureBlockSpec::new("mix", &["a", "b"])
            .transform(Transform::Pca(PcaTarget::Components(1)))
            .transform(Transform::Pca(PcaTarget::Components(1)));
        assert!(matches!(
            block.validate(),
            Err(FeatureSpecError::MalformedPipeline { .. })
        ));
    }

    #[test]
    fn pca_target_is_checked() {
        let block = FeatureBlockSpec::new("mix", &["a", "b"])
            .transform(Transform::Pca(PcaTarget::Variance(1.5)));
        assert!(matches!(
            block.validate(),
            Err(FeatureSpecError::Reduction(_))
        ));
    }

    #[test]
    fn weights() {
        for &weight in &[-1.0, f64::NAN, f64::INFINITY] {
            let block = FeatureBlockSpec::new("mix", &["a"]).weight(weight);
            assert!(matches!(
                block.validate(),
                Err(FeatureSpecError::InvalidWeight { .. })
            ));
        }
        let disabled = FeatureBlockSpec::new("mix", &["a"]).weight(0.0);
        assert!(disabled.validate().is_ok());
        assert!(!disabled.is_enabled());
    }

    #[test]
    fn structural_errors() {
        let empty: [&str; 0] = [];
        assert!(matches!(
            FeatureBlockSpec::new("mix", &empty).validate(),
            Err(FeatureSpecError::NoColumns(_))
        ));
        assert!(matches!(
            FeatureBlockSpec::new(" ", &["a"]).validate(),
            Err(FeatureSpecError::EmptyName)
        ));
        assert!(matches!(
            FeatureBlockSpec::new("mix", &["a", "a"]).validate(),
            Err(FeatureSpecError::DuplicateColumn(_))
        ));
    }
}
