//! Shared foundational types used across the Ember analysis crates.
//!
//! This crate provides content fingerprints for change detection and the
//! internal-error type used to report contract violations inside the core.

#![warn(missing_docs)]

pub mod hash;
pub mod result;

pub use hash::ContentHash;
pub use result::{EmberResult, InternalError};
