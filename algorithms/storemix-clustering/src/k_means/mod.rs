mod algorithm;
mod cluster_count;
mod errors;
mod hyperparams;
mod init;

pub use algorithm::*;
pub use cluster_count::*;
pub use errors::*;
pub use hyperparams::*;
pub use init::KMeansInit;
