use error::Error;

pub mod error;
pub mod query;

pub type Result<T, E = Error> = std::result::Result<T, E>;
