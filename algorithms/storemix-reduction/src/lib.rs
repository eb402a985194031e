//! `storemix-reduction` compresses wide feature blocks, typically the product-mix share of every
//! SKU, into a handful of principal components before clustering.
//!
//! The projection is always fit on the full store population of a run so that centroids computed
//! later on live in a single comparable space.
mod error;
mod pca;

pub use error::{ReductionError, Result};
pub use pca::{Pca, PcaParams, PcaTarget, PcaValidParams};
