//! Shared Types

pub mod event;

pub use event::*;
