//! Payload Shape Errors

use thiserror::Error;

/// Errors raised when a change value does not have the shape a route needs.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum Error {
    /// A required member is absent, null or empty.
    #[error("missing field: {0}")]
    MissingField(&'static str),
    /// The value is not a JSON object.
    #[error("{0} is not a JSON object")]
    NotAnObject(&'static str),
}

/// Result alias for payload reads.
pub type Result<T> = std::result::Result<T, Error>;
