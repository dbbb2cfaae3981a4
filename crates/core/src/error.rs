use thiserror::Error;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum Error {
    /// A declared target count was not a positive integer.
    #[error("invalid target count: {input:?}")]
    InvalidTargetCount { input: String },

    /// Token allocation gave up after repeated collisions.
    #[error("could not allocate a unique token after {attempts} attempts")]
    TokenSpaceExhausted { attempts: usize },
}

pub type Result<T> = std::result::Result<T, Error>;
