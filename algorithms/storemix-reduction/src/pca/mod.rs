mod algorithms;
mod hyperparams;

pub use algorithms::Pca;
pub use hyperparams::{PcaParams, PcaTarget, PcaValidParams};
