//! Constraints evaluated against feature structures
//!
//! A constraint is a small closed algebra: comparisons of a value reached
//! through a feature path, type tests, and logical combinations of both.
//! Constraints are evaluated lazily, one record at a time, by
//! `FilteredIterator`.

use crate::error::{WeftError, WeftResult};
use crate::heap::FsHeap;
use crate::type_system::{FeatureId, TypeId, TypeSystem};
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use weft_types::{FeatureValue, FsAddr};

/// Sequence of features followed from a record through its reference slots
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FeaturePath {
    features: Vec<FeatureId>,
}

impl FeaturePath {
    pub fn new(features: Vec<FeatureId>) -> Self {
        Self { features }
    }

    pub fn single(feature: FeatureId) -> Self {
        Self { features: vec![feature] }
    }

    /// Resolve a `/`-separated path of feature names starting at type `start`
    pub fn parse(ts: &TypeSystem, start: TypeId, path: &str) -> WeftResult<Self> {
        let names: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).collect();
        if names.is_empty() {
            return Err(WeftError::feature_not_found(ts.type_name(start), path));
        }

        let mut features = Vec::with_capacity(names.len());
        let mut current = start;
        for (position, name) in names.iter().enumerate() {
            let feature = ts.feature_by_name(current, name)?;
            let range = ts.feature_def(feature)?.range();
            let is_last = position + 1 == names.len();
            if !is_last && ts.is_primitive(range) {
                return Err(WeftError::type_mismatch(
                    format!("feature path {path}"),
                    "reference-valued feature",
                    ts.type_name(range),
                ));
            }
            features.push(feature);
            current = range;
        }

        Ok(Self { features })
    }

    pub fn features(&self) -> &[FeatureId] {
        &self.features
    }

    /// Value at the end of the path, or `None` if any step cannot be followed
    pub fn evaluate(&self, heap: &FsHeap, ts: &TypeSystem, addr: FsAddr) -> Option<FeatureValue> {
        let (last, steps) = self.features.split_last()?;
        let mut current = addr;
        for &feature in steps {
            current = heap.get_slot(ts, current, feature).ok()?.as_ref_addr()?;
        }
        heap.get_slot(ts, current, *last).ok()
    }
}

/// Comparison operators
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Operator {
    Equal,
    NotEqual,
    GreaterThan,
    LessThan,
    GreaterThanOrEqual,
    LessThanOrEqual,
    Contains,
}

/// Logical operators for combining constraints
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum LogicalOperator {
    And,
    Or,
    Not,
}

/// Predicate over a feature structure
#[derive(Debug, Clone, PartialEq)]
pub enum Constraint {
    Compare { path: FeaturePath, operator: Operator, value: FeatureValue },
    IsType(TypeId),
    Complex { operator: LogicalOperator, constraints: Vec<Constraint> },
}

impl Constraint {
    pub fn compare(path: FeaturePath, operator: Operator, value: impl Into<FeatureValue>) -> Self {
        Constraint::Compare { path, operator, value: value.into() }
    }

    pub fn eq(path: FeaturePath, value: impl Into<FeatureValue>) -> Self {
        Self::compare(path, Operator::Equal, value)
    }

    /// `low <= value < high`
    pub fn between(
        path: FeaturePath,
        low: impl Into<FeatureValue>,
        high: impl Into<FeatureValue>,
    ) -> Self {
        Self::and(vec![
            Self::compare(path.clone(), Operator::GreaterThanOrEqual, low),
            Self::compare(path, Operator::LessThan, high),
        ])
    }

    pub fn is_type(ty: TypeId) -> Self {
        Constraint::IsType(ty)
    }

    pub fn and(constraints: Vec<Constraint>) -> Self {
        Constraint::Complex { operator: LogicalOperator::And, constraints }
    }

    pub fn or(constraints: Vec<Constraint>) -> Self {
        Constraint::Complex { operator: LogicalOperator::Or, constraints }
    }

    pub fn not(constraint: Constraint) -> Self {
        Constraint::Complex { operator: LogicalOperator::Not, constraints: vec![constraint] }
    }

    /// Evaluate against the record at `addr`.
    ///
    /// Unreachable paths, stale addresses and incomparable values never match.
    pub fn matches(&self, heap: &FsHeap, ts: &TypeSystem, addr: FsAddr) -> bool {
        match self {
            Constraint::Compare { path, operator, value } => path
                .evaluate(heap, ts, addr)
                .is_some_and(|actual| test_operator(&actual, *operator, value)),
            Constraint::IsType(ty) => heap.type_of(addr).is_ok_and(|actual| ts.subsumes(*ty, actual)),
            Constraint::Complex { operator, constraints } => match operator {
                LogicalOperator::And => constraints.iter().all(|c| c.matches(heap, ts, addr)),
                LogicalOperator::Or => constraints.iter().any(|c| c.matches(heap, ts, addr)),
                LogicalOperator::Not => {
                    !constraints.first().is_some_and(|c| c.matches(heap, ts, addr))
                }
            },
        }
    }
}

fn test_operator(actual: &FeatureValue, operator: Operator, expected: &FeatureValue) -> bool {
    let ordering = actual.compare(expected);
    match operator {
        Operator::Equal => ordering == Some(Ordering::Equal),
        Operator::NotEqual => ordering != Some(Ordering::Equal),
        Operator::GreaterThan => ordering == Some(Ordering::Greater),
        Operator::LessThan => ordering == Some(Ordering::Less),
        Operator::GreaterThanOrEqual => {
            matches!(ordering, Some(Ordering::Greater | Ordering::Equal))
        }
        Operator::LessThanOrEqual => matches!(ordering, Some(Ordering::Less | Ordering::Equal)),
        Operator::Contains => match (actual, expected) {
            (FeatureValue::String(haystack), FeatureValue::String(needle)) => {
                haystack.contains(needle.as_str())
            }
            _ => false,
        },
    }
}
