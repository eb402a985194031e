mod algorithm;
mod errors;
mod hyperparams;
mod partition;

pub use algorithm::*;
pub use errors::*;
pub use hyperparams::*;
pub use partition::*;
