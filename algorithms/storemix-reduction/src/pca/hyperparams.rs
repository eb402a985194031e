use crate::ReductionError;
use storemix::ParamGuard;
#[cfg(feature = "serde")]
use serde_crate::{Deserialize, Serialize};

/// How many principal components to keep
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate", rename_all = "snake_case")
)]
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum PcaTarget {
    /// A fixed number of components
    Components(usize),
    /// The smallest number of components whose cumulative explained variance ratio reaches the
    /// given fraction
    Variance(f64),
}

/// Checked PCA hyperparameters
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate")
)]
#[derive(Clone, Debug, PartialEq)]
pub struct PcaValidParams {
    target: PcaTarget,
}

impl PcaValidParams {
    pub fn target(&self) -> PcaTarget {
        self.target
    }
}

/// PCA hyperparameters, checked on fit
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate")
)]
#[derive(Clone, Debug, PartialEq)]
pub struct PcaParams(PcaValidParams);

impl PcaParams {
    /// Keep exactly `n_components` components
    pub fn new(n_components: usize) -> Self {
        Self(PcaValidParams {
            target: PcaTarget::Components(n_components),
        })
    }

    /// Keep as many components as needed to explain `fraction` of the total variance
    pub fn explained_variance(fraction: f64) -> Self {
        Self(PcaValidParams {
            target: PcaTarget::Variance(fraction),
        })
    }

    pub fn target(mut self, target: PcaTarget) -> Self {
        self.0.target = target;
        self
    }
}

impl From<PcaTarget> for PcaParams {
    fn from(target: PcaTarget) -> Self {
        Self(PcaValidParams { target })
    }
}

impl ParamGuard for PcaParams {
    type Checked = PcaValidParams;
    type Error = ReductionError;

    fn check_ref(&self) -> Result<&Self::Checked, Self::Error> {
        match self.0.target {
            PcaTarget::Components(0) => Err(ReductionError::NonPositiveEmbeddingSize),
            PcaTarget::Variance(f) if !(f > 0. && f <= 1.) => {
                Err(ReductionError::InvalidVarianceFraction(f))
            }
            _ => Ok(&self.0),
        }
    }

    fn check(self) -> Result<Self::Checked, Self::Error> {
        self.check_ref()?;
        Ok(self.0)
    }
}
