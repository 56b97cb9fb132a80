//! Error handling for the Weft engine
//!
//! Every failure the engine reports is a `WeftError`. None of them are
//! transient, so nothing in the engine retries; callers either pick another
//! name, fix their setup order, or treat the error as a logic bug.

use std::fmt;
use thiserror::Error;
use weft_types::FsAddr;

/// Error type for all Weft engine operations
#[derive(Error, Debug, Clone, PartialEq)]
pub enum WeftError {
    /// A type name did not resolve
    #[error("Type not found: {name}")]
    TypeNotFound { name: String },

    /// A feature name did not resolve on the given type
    #[error("Feature not found: {type_name}:{feature}")]
    FeatureNotFound { type_name: String, feature: String },

    /// A value or type is incompatible with what the operation expects
    #[error("Type mismatch in {context}: expected {expected}, found {actual}")]
    TypeMismatch { context: String, expected: String, actual: String },

    /// A feature was used on a record whose type does not carry it
    #[error("Feature {feature} is not defined for type {type_name}")]
    WrongFeatureForType { feature: String, type_name: String },

    /// The address was never issued by the current heap generation
    #[error("Invalid address: {addr}")]
    InvalidAddress { addr: FsAddr },

    /// The address belongs to a generation that has since been reset
    #[error("Stale address {addr}: heap is at generation {current_generation}")]
    StaleAddress { addr: FsAddr, current_generation: u32 },

    /// Array element access outside `0..length`
    #[error("Array index {index} out of bounds for array {addr} of length {length}")]
    ArrayIndexOutOfBounds { addr: FsAddr, index: usize, length: usize },

    /// A view with this name already exists
    #[error("Duplicate view name: {name}")]
    DuplicateViewName { name: String },

    /// No view with this name exists
    #[error("View not found: {name}")]
    ViewNotFound { name: String },

    /// The view name cannot be used
    #[error("Invalid view name {name:?}: {reason}")]
    InvalidViewName { name: String, reason: String },

    /// The sofa payload of a view is write-once
    #[error("Sofa data for view {view} is already set")]
    SofaAlreadySet { view: String },

    /// Records can only be created once the type system is frozen
    #[error("Type system must be frozen before {operation}")]
    FrozenTypeSystemRequired { operation: String },

    /// Type system and index definitions are closed after freeze
    #[error("Type system is frozen; cannot {operation}")]
    TypeSystemFrozen { operation: String },

    /// A type, feature or index label was registered twice
    #[error("Duplicate {kind} definition: {name}")]
    DuplicateDefinition { kind: String, name: String },

    /// No index with this label is defined
    #[error("Index not found: {label}")]
    IndexNotFound { label: String },

    /// Configuration could not be loaded or is invalid
    #[error("Configuration error: {message}")]
    Configuration { message: String, setting: Option<String> },

    /// The shared engine lock was poisoned by a panicking writer
    #[error("Engine lock poisoned")]
    LockPoisoned,
}

impl WeftError {
    /// Get the error category for logging
    pub fn category(&self) -> &'static str {
        match self {
            WeftError::TypeNotFound { .. }
            | WeftError::FeatureNotFound { .. }
            | WeftError::DuplicateDefinition { .. }
            | WeftError::TypeSystemFrozen { .. } => "type_system",
            WeftError::TypeMismatch { .. } | WeftError::WrongFeatureForType { .. } => "type_check",
            WeftError::InvalidAddress { .. }
            | WeftError::StaleAddress { .. }
            | WeftError::ArrayIndexOutOfBounds { .. }
            | WeftError::FrozenTypeSystemRequired { .. } => "heap",
            WeftError::DuplicateViewName { .. }
            | WeftError::ViewNotFound { .. }
            | WeftError::InvalidViewName { .. }
            | WeftError::SofaAlreadySet { .. } => "view",
            WeftError::IndexNotFound { .. } => "index",
            WeftError::Configuration { .. } => "configuration",
            WeftError::LockPoisoned => "concurrency",
        }
    }

    /// Get the error severity level
    pub fn severity(&self) -> ErrorSeverity {
        match self {
            WeftError::TypeNotFound { .. } | WeftError::FeatureNotFound { .. } => {
                ErrorSeverity::Low
            }
            WeftError::DuplicateViewName { .. }
            | WeftError::ViewNotFound { .. }
            | WeftError::InvalidViewName { .. }
            | WeftError::SofaAlreadySet { .. }
            | WeftError::IndexNotFound { .. }
            | WeftError::DuplicateDefinition { .. } => ErrorSeverity::Medium,
            WeftError::TypeMismatch { .. }
            | WeftError::WrongFeatureForType { .. }
            | WeftError::ArrayIndexOutOfBounds { .. }
            | WeftError::TypeSystemFrozen { .. } => ErrorSeverity::High,
            WeftError::InvalidAddress { .. }
            | WeftError::StaleAddress { .. }
            | WeftError::FrozenTypeSystemRequired { .. }
            | WeftError::Configuration { .. }
            | WeftError::LockPoisoned => ErrorSeverity::Critical,
        }
    }

    /// Check if the caller can recover by choosing differently
    pub fn is_recoverable(&self) -> bool {
        match self {
            WeftError::TypeNotFound { .. } => true,
            WeftError::FeatureNotFound { .. } => true, // Optional features are probed
            WeftError::DuplicateViewName { .. } => true,
            WeftError::ViewNotFound { .. } => true,
            WeftError::InvalidViewName { .. } => true,
            WeftError::SofaAlreadySet { .. } => true,
            WeftError::IndexNotFound { .. } => true,
            WeftError::DuplicateDefinition { .. } => true,
            WeftError::TypeMismatch { .. } => false, // Caller logic error
            WeftError::WrongFeatureForType { .. } => false,
            WeftError::InvalidAddress { .. } => false, // Would corrupt index invariants
            WeftError::StaleAddress { .. } => false,
            WeftError::ArrayIndexOutOfBounds { .. } => false,
            WeftError::FrozenTypeSystemRequired { .. } => false, // Setup ordering bug
            WeftError::TypeSystemFrozen { .. } => false,
            WeftError::Configuration { .. } => false,
            WeftError::LockPoisoned => false,
        }
    }
}

/// Error severity levels for logging
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, serde::Serialize, serde::Deserialize)]
pub enum ErrorSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl fmt::Display for ErrorSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ErrorSeverity::Low => write!(f, "LOW"),
            ErrorSeverity::Medium => write!(f, "MEDIUM"),
            ErrorSeverity::High => write!(f, "HIGH"),
            ErrorSeverity::Critical => write!(f, "CRITICAL"),
        }
    }
}

/// Result type alias for engine operations
pub type WeftResult<T> = Result<T, WeftError>;

/// Convenience constructors for common error scenarios
impl WeftError {
    pub fn type_not_found(name: impl Into<String>) -> Self {
        Self::TypeNotFound { name: name.into() }
    }

    pub fn feature_not_found(type_name: impl Into<String>, feature: impl Into<String>) -> Self {
        Self::FeatureNotFound { type_name: type_name.into(), feature: feature.into() }
    }

    pub fn type_mismatch(
        context: impl Into<String>,
        expected: impl Into<String>,
        actual: impl Into<String>,
    ) -> Self {
        Self::TypeMismatch { context: context.into(), expected: expected.into(), actual: actual.into() }
    }

    pub fn duplicate(kind: &str, name: impl Into<String>) -> Self {
        Self::DuplicateDefinition { kind: kind.to_string(), name: name.into() }
    }

    pub fn frozen(operation: impl Into<String>) -> Self {
        Self::TypeSystemFrozen { operation: operation.into() }
    }

    pub fn not_frozen(operation: impl Into<String>) -> Self {
        Self::FrozenTypeSystemRequired { operation: operation.into() }
    }

    /// Create a configuration error naming the offending setting
    pub fn configuration(setting: &str, message: impl Into<String>) -> Self {
        Self::Configuration { message: message.into(), setting: Some(setting.to_string()) }
    }
}

impl From<serde_yaml::Error> for WeftError {
    fn from(err: serde_yaml::Error) -> Self {
        WeftError::Configuration { message: format!("YAML error: {err}"), setting: None }
    }
}

impl<T> From<std::sync::PoisonError<T>> for WeftError {
    fn from(_: std::sync::PoisonError<T>) -> Self {
        WeftError::LockPoisoned
    }
}
