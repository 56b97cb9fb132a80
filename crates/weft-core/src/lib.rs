#![deny(clippy::all)]
#![allow(missing_docs)]
//! Core functionality for the Weft feature-structure store.
//!
//! This crate provides a typed, arena-backed store of feature structures
//! multiplexed across views that share one type system and one heap while
//! keeping separate sofas and indexes.

use tracing::{debug, instrument};

/// Engine configuration from code, YAML or the environment
pub mod config;
/// Built-in names and default sizes
pub mod constants;
/// Constraints for filtered iteration
pub mod constraint;
/// Typed wrappers over heap addresses and their identity cache
pub mod cover_cache;
/// The `Cas` engine and its lifecycle
pub mod engine;
/// Error type shared by every engine operation
pub mod error;
/// Generation-tagged record arena
pub mod heap;
/// Per-view sorted, set and bag indexes
pub mod index_repository;
/// Type hierarchy and feature registry
pub mod type_system;
/// Views and sofas
pub mod view;

pub use config::CasConfig;
pub use constraint::{Constraint, FeaturePath, LogicalOperator, Operator};
pub use cover_cache::{AnnotationCover, Cover, CoverCache, TopCover};
pub use engine::{Cas, CasStats, SharedCas};
pub use error::{ErrorSeverity, WeftError, WeftResult};
pub use heap::{ArrayData, FsHeap};
pub use index_repository::{
    FilteredIterator, FsIterator, IndexDefinition, IndexKind, IndexRepository, IndexSpec, KeySpec,
    SortOrder,
};
pub use type_system::{ArrayKind, Diagnostics, FeatureId, TypeId, TypeKind, TypeSystem};
pub use view::{Sofa, SofaData, View, ViewId};
pub use weft_types::{FeatureValue, FsAddr};

/// Initialize the core engine components
#[instrument]
pub fn init() -> anyhow::Result<()> {
    debug!("Initializing Weft core engine");
    Ok(())
}
