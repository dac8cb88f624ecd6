use thiserror::Error;

pub type Result<A, E = Error> = std::result::Result<A, E>;

#[derive(Debug, Error)]
pub enum Error {
    #[error("{0}")]
    CoreFailure(#[from] logweave::error::Error),
}
