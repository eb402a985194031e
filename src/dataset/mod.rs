//! Store records
//!
//! This module implements the per-store input rows of a clustering run and the numeric trait
//! bound shared by every algorithm crate of the workspace.
use ndarray::{NdFloat, ScalarOperand};
use num_traits::{AsPrimitive, FromPrimitive, NumAssignOps, NumCast};
use rand::distributions::uniform::SampleUniform;

#[cfg(feature = "serde")]
use serde_crate::{Deserialize, Serialize};

use std::collections::{BTreeMap, HashSet};
use std::fmt;
use std::iter::Sum;
use std::ops::{AddAssign, DivAssign, MulAssign, SubAssign};

use crate::error::{Error, Result};

/// Floating point numbers
///
/// This trait bound multiplexes to the most common assumption of floating point number and
/// implement them for 32bit and 64bit floating points. Feature matrices, centroids and quality
/// metrics are all generic over it.
pub trait Float:
    FromPrimitive
    + num_traits::Float
    + NdFloat
    + PartialOrd
    + Sync
    + Send
    + Default
    + fmt::Display
    + fmt::Debug
    + Sum
    + NumAssignOps
    + AsPrimitive<usize>
    + for<'a> AddAssign<&'a Self>
    + for<'a> MulAssign<&'a Self>
    + for<'a> SubAssign<&'a Self>
    + for<'a> DivAssign<&'a Self>
    + SampleUniform
    + ScalarOperand
    + approx::AbsDiffEq
{
    fn cast<T: NumCast>(x: T) -> Self {
        NumCast::from(x).unwrap()
    }
}

impl Float for f32 {}

impl Float for f64 {}

/// Unique key of a store
pub type StoreId = String;

/// Climate band of a store, assigned upstream and never changed during a run
///
/// Bands are compared lexicographically, which gives a deterministic tie-break whenever two
/// bands are equally represented in a cluster.
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate", transparent)
)]
#[derive(Clone, Debug, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct TemperatureBand(String);

impl TemperatureBand {
    pub fn new<S: Into<String>>(band: S) -> Self {
        TemperatureBand(band.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for TemperatureBand {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<&str> for TemperatureBand {
    fn from(band: &str) -> Self {
        TemperatureBand::new(band)
    }
}

/// A single store as handed over by the data acquisition stage
///
/// `raw_features` is sparse: a product-mix column that is absent simply was not sold.
/// `profile_attributes` hold low-dimensional descriptors (type, traffic, grade) and may be
/// absent for some stores.
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate")
)]
#[derive(Clone, Debug, PartialEq)]
pub struct StoreRecord {
    pub store_id: StoreId,
    pub raw_features: BTreeMap<String, f64>,
    pub temperature_band: TemperatureBand,
    pub profile_attributes: BTreeMap<String, f64>,
}

impl StoreRecord {
    pub fn new<S: Into<StoreId>, B: Into<TemperatureBand>>(store_id: S, band: B) -> Self {
        StoreRecord {
            store_id: store_id.into(),
            raw_features: BTreeMap::new(),
            temperature_band: band.into(),
            profile_attributes: BTreeMap::new(),
        }
    }

    /// Add a product-mix value
    pub fn with_feature<S: Into<String>>(mut self, name: S, value: f64) -> Self {
        self.raw_features.insert(name.into(), value);
        self
    }

    /// Add a profile attribute
    pub fn with_attribute<S: Into<String>>(mut self, name: S, value: f64) -> Self {
        self.profile_attributes.insert(name.into(), value);
        self
    }

    /// Looks a column up in the product-mix values first, then in the profile attributes
    pub fn value(&self, column: &str) -> Option<f64> {
        self.raw_features
            .get(column)
            .or_else(|| self.profile_attributes.get(column))
            .copied()
    }
}

/// The full store population of a run
///
/// Row order is insertion order and is the row order of every matrix derived from the table.
#[cfg_attr(
    feature = "serde",
    derive(Serialize, Deserialize),
    serde(crate = "serde_crate")
)]
#[derive(Clone, Debug, PartialEq)]
pub struct StoreTable {
    records: Vec<StoreRecord>,
}

impl StoreTable {
    /// Creates a table, failing on an empty input or a repeated store id
    pub fn new(records: Vec<StoreRecord>) -> Result<Self> {
        if records.is_empty() {
            return Err(Error::NotEnoughSamples);
        }
        let mut seen = HashSet::with_capacity(records.len());
        for record in &records {
            if !seen.insert(record.store_id.as_str()) {
                return Err(Error::DuplicateStore(record.store_id.clone()));
            }
        }

        Ok(StoreTable { records })
    }

    pub fn records(&self) -> &[StoreRecord] {
        &self.records
    }

    pub fn nstores(&self) -> usize {
        self.records.len()
    }

    pub fn store_ids(&self) -> Vec<StoreId> {
        self.records.iter().map(|r| r.store_id.clone()).collect()
    }

    pub fn bands(&self) -> Vec<TemperatureBand> {
        self.records
            .iter()
            .map(|r| r.temperature_band.clone())
            .collect()
    }

    /// Returns `true` if `column` is a profile attribute of some store and a product-mix value
    /// of none
    pub fn is_profile_column(&self, column: &str) -> bool {
        self.records
            .iter()
            .any(|r| r.profile_attributes.contains_key(column))
            && !self
                .records
                .iter()
                .any(|r| r.raw_features.contains_key(column))
    }
}
