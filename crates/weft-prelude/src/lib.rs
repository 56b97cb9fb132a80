//! Weft Prelude
//!
//! This crate re-exports the most frequently used public items from the Weft
//! crates (`weft-core` and `weft-types`). Down-stream applications can depend
//! on `weft-prelude` to avoid long import lists and to stay insulated from
//! internal module reshuffles.

#![deny(missing_docs)]

// Engine & lifecycle ------------------------------------------------------------------------------

pub use weft_core::{Cas, CasConfig, CasStats, SharedCas};

// Type system & heap values -----------------------------------------------------------------------

pub use weft_core::{ArrayKind, FeatureId, TypeId, TypeSystem};
pub use weft_types::{FeatureValue, FsAddr};

// Views, indexes & constraints --------------------------------------------------------------------

pub use weft_core::{
    Constraint, FeaturePath, FsIterator, IndexKind, IndexSpec, Operator, SortOrder, ViewId,
};

// Covers & errors ---------------------------------------------------------------------------------

pub use weft_core::{AnnotationCover, Cover, TopCover, WeftError, WeftResult};
