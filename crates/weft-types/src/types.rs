use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::fmt;

/// Handle to a feature structure on the heap.
///
/// A handle is only meaningful for the heap generation that issued it; once the
/// owning engine is reset, every older handle is rejected as stale.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FsAddr {
    generation: u32,
    index: u32,
}

impl FsAddr {
    /// Create a handle for slot `index` of heap generation `generation`
    pub const fn new(generation: u32, index: u32) -> Self {
        Self { generation, index }
    }

    /// Heap generation that issued this handle
    pub const fn generation(self) -> u32 {
        self.generation
    }

    /// Position of the record within its generation
    pub const fn index(self) -> u32 {
        self.index
    }
}

impl fmt::Display for FsAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "fs#{}:{}", self.generation, self.index)
    }
}

/// Possible values held by a feature slot or array element
#[derive(Debug, Clone, Serialize, Deserialize)]
pub enum FeatureValue {
    /// Integer value
    Integer(i64),
    /// Floating point value
    Float(f64),
    /// Boolean value
    Boolean(bool),
    /// String value
    String(String),
    /// Reference to another feature structure
    Ref(FsAddr),
    /// Unset string or reference
    Null,
}

impl FeatureValue {
    /// Rank used to order values of different variants against each other
    const fn rank(&self) -> u8 {
        match self {
            Self::Null => 0,
            Self::Boolean(_) => 1,
            Self::Integer(_) => 2,
            Self::Float(_) => 3,
            Self::String(_) => 4,
            Self::Ref(_) => 5,
        }
    }

    /// Total order over all values.
    ///
    /// Values of different variants order by variant (`Null` first, references
    /// last); floats use IEEE total ordering. Index comparators rely on this
    /// never returning an inconsistent answer.
    pub fn total_cmp(&self, other: &Self) -> Ordering {
        match (self, other) {
            (Self::Integer(a), Self::Integer(b)) => a.cmp(b),
            (Self::Float(a), Self::Float(b)) => a.total_cmp(b),
            (Self::Boolean(a), Self::Boolean(b)) => a.cmp(b),
            (Self::String(a), Self::String(b)) => a.cmp(b),
            (Self::Ref(a), Self::Ref(b)) => a.cmp(b),
            _ => self.rank().cmp(&other.rank()),
        }
    }

    /// Semantic comparison used by constraints.
    ///
    /// Integers and floats compare numerically with each other; any other
    /// cross-variant comparison has no ordering.
    pub fn compare(&self, other: &Self) -> Option<Ordering> {
        match (self, other) {
            (Self::Integer(a), Self::Integer(b)) => Some(a.cmp(b)),
            (Self::Float(a), Self::Float(b)) => a.partial_cmp(b),
            #[allow(clippy::cast_precision_loss)]
            (Self::Integer(a), Self::Float(b)) => (*a as f64).partial_cmp(b),
            #[allow(clippy::cast_precision_loss)]
            (Self::Float(a), Self::Integer(b)) => a.partial_cmp(&(*b as f64)),
            (Self::Boolean(a), Self::Boolean(b)) => Some(a.cmp(b)),
            (Self::String(a), Self::String(b)) => Some(a.cmp(b)),
            (Self::Ref(a), Self::Ref(b)) if a == b => Some(Ordering::Equal),
            (Self::Null, Self::Null) => Some(Ordering::Equal),
            _ => None,
        }
    }

    /// Name of the value kind, for error messages
    pub const fn kind_name(&self) -> &'static str {
        match self {
            Self::Integer(_) => "Integer",
            Self::Float(_) => "Float",
            Self::Boolean(_) => "Boolean",
            Self::String(_) => "String",
            Self::Ref(_) => "Ref",
            Self::Null => "Null",
        }
    }

    /// Integer payload, if any
    pub const fn as_integer(&self) -> Option<i64> {
        match self {
            Self::Integer(i) => Some(*i),
            _ => None,
        }
    }

    /// Float payload, if any
    pub const fn as_float(&self) -> Option<f64> {
        match self {
            Self::Float(f) => Some(*f),
            _ => None,
        }
    }

    /// Boolean payload, if any
    pub const fn as_bool(&self) -> Option<bool> {
        match self {
            Self::Boolean(b) => Some(*b),
            _ => None,
        }
    }

    /// String payload, if any
    pub fn as_str(&self) -> Option<&str> {
        match self {
            Self::String(s) => Some(s),
            _ => None,
        }
    }

    /// Referenced feature structure, if any
    pub const fn as_ref_addr(&self) -> Option<FsAddr> {
        match self {
            Self::Ref(addr) => Some(*addr),
            _ => None,
        }
    }

    /// True for an unset string or reference
    pub const fn is_null(&self) -> bool {
        matches!(self, Self::Null)
    }
}

impl PartialEq for FeatureValue {
    fn eq(&self, other: &Self) -> bool {
        self.total_cmp(other) == Ordering::Equal
    }
}

impl Eq for FeatureValue {}

impl PartialOrd for FeatureValue {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl Ord for FeatureValue {
    fn cmp(&self, other: &Self) -> Ordering {
        self.total_cmp(other)
    }
}

impl std::hash::Hash for FeatureValue {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.rank().hash(state);
        match self {
            Self::Integer(i) => i.hash(state),
            Self::Float(f) => f.to_bits().hash(state),
            Self::Boolean(b) => b.hash(state),
            Self::String(s) => s.hash(state),
            Self::Ref(addr) => addr.hash(state),
            Self::Null => {}
        }
    }
}

impl fmt::Display for FeatureValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Integer(i) => write!(f, "{i}"),
            Self::Float(fl) => write!(f, "{fl}"),
            Self::Boolean(b) => write!(f, "{b}"),
            Self::String(s) => write!(f, "{s}"),
            Self::Ref(addr) => write!(f, "{addr}"),
            Self::Null => write!(f, "null"),
        }
    }
}

impl From<i64> for FeatureValue {
    fn from(value: i64) -> Self {
        Self::Integer(value)
    }
}

impl From<i32> for FeatureValue {
    fn from(value: i32) -> Self {
        Self::Integer(i64::from(value))
    }
}

impl From<f64> for FeatureValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<bool> for FeatureValue {
    fn from(value: bool) -> Self {
        Self::Boolean(value)
    }
}

impl From<&str> for FeatureValue {
    fn from(value: &str) -> Self {
        Self::String(value.to_string())
    }
}

impl From<String> for FeatureValue {
    fn from(value: String) -> Self {
        Self::String(value)
    }
}

impl From<FsAddr> for FeatureValue {
    fn from(value: FsAddr) -> Self {
        Self::Ref(value)
    }
}

impl From<Option<FsAddr>> for FeatureValue {
    fn from(value: Option<FsAddr>) -> Self {
        value.map_or(Self::Null, Self::Ref)
    }
}

// -------------------------------------------------------------------------------------------------
// Conversion to `serde_json::Value` for read-only inspection. References render as their
// handle string so a snapshot never pretends to be a loadable document.
// -------------------------------------------------------------------------------------------------

impl From<&FeatureValue> for serde_json::Value {
    fn from(value: &FeatureValue) -> Self {
        match value {
            FeatureValue::Integer(i) => Self::Number(serde_json::Number::from(*i)),
            FeatureValue::Float(f) => {
                serde_json::Number::from_f64(*f).map_or(Self::Null, Self::Number)
            }
            FeatureValue::Boolean(b) => Self::Bool(*b),
            FeatureValue::String(s) => Self::String(s.clone()),
            FeatureValue::Ref(addr) => Self::String(addr.to_string()),
            FeatureValue::Null => Self::Null,
        }
    }
}
