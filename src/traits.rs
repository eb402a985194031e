//! Provide traits for the different stages of a clustering run
//!
//! Each stage is either a `Transformer`, mapping records to a new representation without
//! learning anything, or a `Fit`, learning a model from the whole store population of a run.

use std::error::Error;

/// Transformation algorithms
///
/// A transformer takes a dataset and transforms it into a different one. It has no concept of
/// state and provides therefore no method to predict new data.
pub trait Transformer<R, T> {
    fn transform(&self, x: R) -> T;
}

/// Fittable algorithms
///
/// A fittable algorithm takes the records of a run and creates a concept of some kind about it.
/// The checked hyperparameters implement this trait; the unchecked ones get it through
/// [`ParamGuard`](crate::ParamGuard).
pub trait Fit<R, E: Error> {
    type Object;

    fn fit(&self, records: &R) -> Result<Self::Object, E>;
}
