//! `storemix-run` wires the stages of a clustering run together.
//!
//! A run takes a [`StoreTable`](storemix::StoreTable) and a [`RunConfig`], and goes through
//! feature construction, k-means partitioning and constraint balancing. It returns a
//! [`ClusteringResult`] with the assignment of every store, a summary of every cluster, the
//! quality of the partition before and after balancing and every constraint left unresolved.
//!
//! ```
//! use storemix::prelude::*;
//! use storemix_preprocessing::FeatureBlockSpec;
//! use storemix_run::{ClusteringRun, RunConfig};
//!
//! let stores = (0..12)
//!     .map(|i| {
//!         let band = if i < 6 { "Hot" } else { "Cold" };
//!         let offset = if i < 6 { 0. } else { 10. };
//!         StoreRecord::new(format!("s{}", i), band)
//!             .with_feature("x", offset + (i % 3) as f64)
//!             .with_feature("y", offset + (i % 2) as f64)
//!     })
//!     .collect();
//! let table = StoreTable::new(stores).unwrap();
//!
//! let config = RunConfig::with_k(2, 3, 6).block(FeatureBlockSpec::new("mix", &["x", "y"]));
//! let result = ClusteringRun::new(config).run(&table).unwrap();
//!
//! assert!(result.is_satisfied());
//! assert_eq!(result.assignments.len(), 12);
//! ```
mod config;
mod error;
pub mod io;
mod report;
mod run;

pub use config::RunConfig;
pub use error::{Result, RunError};
pub use report::{Assignment, ClusterSummary, ClusteringResult, MetricsRecord};
pub use run::ClusteringRun;
