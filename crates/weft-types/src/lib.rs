//! Weft Types
//!
//! This crate defines the value types shared across the Weft workspace
//! (currently `weft-core` and `weft-prelude`). It provides the heap handle
//! `FsAddr` and the slot value `FeatureValue` without pulling in the engine.

#![deny(clippy::all)]
#![deny(missing_docs)]

mod types;
pub use types::{FeatureValue, FsAddr};
