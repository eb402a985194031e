//! `storemix-preprocessing` turns the raw columns of a [`StoreTable`](storemix::StoreTable) into
//! the feature matrix the clustering stages work on.
//!
//! Columns are grouped into [feature blocks](FeatureBlockSpec), typically a wide product-mix
//! block and a small profile block. Every block runs its own transform pipeline and is weighted
//! before the blocks are concatenated, so that the relative influence of each block on the
//! euclidean distances is set explicitly rather than by its number of columns.
//!
//! ```
//! use storemix::prelude::*;
//! use storemix_preprocessing::{FeatureBlockBuilder, FeatureBlockSpec, Transform};
//!
//! let table = StoreTable::new(vec![
//!     StoreRecord::new("a", "Hot").with_feature("juice", 3.).with_attribute("area", 120.),
//!     StoreRecord::new("b", "Cold").with_feature("soup", 2.).with_attribute("area", 80.),
//! ])
//! .unwrap();
//!
//! let features = FeatureBlockBuilder::params()
//!     .block(FeatureBlockSpec::new("mix", &["juice", "soup"]).transform(Transform::RowNormalize))
//!     .block(FeatureBlockSpec::new("profile", &["area"]).transform(Transform::Standardize).weight(0.5))
//!     .fit(&table)
//!     .unwrap();
//!
//! assert_eq!(features.column_names, vec!["juice", "soup", "area"]);
//! assert_eq!(features.records.row(0).to_vec(), vec![1., 0., 0.5]);
//! ```
mod block;
mod builder;
mod error;
pub mod scaling;

pub use block::{FeatureBlockSpec, MissingPolicy, Transform};
pub use builder::{BlockReport, FeatureBlockBuilder, FeatureBlockBuilderParams, FeatureMatrix};
pub use error::{FeatureSpecError, Result};
