//! `storemix-clustering` computes the partition of a store population.
//!
//! ## Current state
//!
//! Two stages are provided:
//! * [K-Means](KMeans), producing the initial partition of the feature vectors, with the number
//!   of clusters either fixed or derived from a target average cluster size
//! * [Constraint balancing](BalanceParams), repairing that partition until every cluster
//!   respects its size bounds and temperature-band purity, or reporting what could not be
//!   repaired
//!
//! Implementation choices and algorithmic details can be found in the page dedicated to each
//! stage.
mod balance;
#[allow(clippy::new_ret_no_self)]
mod k_means;

pub use balance::*;
pub use k_means::*;
