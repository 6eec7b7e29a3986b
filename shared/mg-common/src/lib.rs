//! Messaging Gateway Common Library
//!
//! Wire types for inbound platform webhooks and the errors raised while
//! reading them.

pub mod error;
pub mod types;

pub use error::{Error, Result};
pub use types::*;
