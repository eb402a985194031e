//! Error types in storemix
//!

use thiserror::Error;

pub type Result<T> = std::result::Result<T, Error>;

#[derive(Error, Debug, Clone)]
pub enum Error {
    #[error("invalid parameter {0}")]
    Parameters(String),
    #[error("Not enough samples to evaluate the partition")]
    NotEnoughSamples,
    #[error("store `{0}` appears more than once in the store table")]
    DuplicateStore(String),
    #[error("{0} memberships given for {1} samples")]
    MembershipMismatch(usize, usize),
}
