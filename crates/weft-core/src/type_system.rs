//! Type hierarchy and feature registry
//!
//! Types form a single-inheritance tree rooted at `uima.cas.TOP`. Features are
//! registered against a declaring type while the type system is open; freezing
//! flattens every type's feature list (ancestor features first) and assigns
//! each feature its slot offset. Subtypes therefore see inherited features at
//! the same offsets as their ancestors, and a record of a subtype can be used
//! wherever the supertype is expected without re-copying.

use crate::constants::{feature_names, type_names};
use crate::error::{WeftError, WeftResult};
use std::collections::HashMap;
use tracing::{debug, info, warn};
use weft_types::FeatureValue;

/// Handle to a registered type
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct TypeId(u32);

impl TypeId {
    // Built-in types are registered at these positions by `TypeSystem::new()`
    pub const TOP: TypeId = TypeId(0);
    pub const INTEGER: TypeId = TypeId(1);
    pub const FLOAT: TypeId = TypeId(2);
    pub const BOOLEAN: TypeId = TypeId(3);
    pub const STRING: TypeId = TypeId(4);
    pub const INTEGER_ARRAY: TypeId = TypeId(5);
    pub const FLOAT_ARRAY: TypeId = TypeId(6);
    pub const STRING_ARRAY: TypeId = TypeId(7);
    pub const FS_ARRAY: TypeId = TypeId(8);
    pub const ANNOTATION: TypeId = TypeId(9);
    pub const DOCUMENT_ANNOTATION: TypeId = TypeId(10);

    /// Raw position in the type table
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Handle to a registered feature
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct FeatureId(u32);

impl FeatureId {
    pub const ANNOTATION_BEGIN: FeatureId = FeatureId(0);
    pub const ANNOTATION_END: FeatureId = FeatureId(1);
    pub const DOCUMENT_LANGUAGE: FeatureId = FeatureId(2);

    /// Raw position in the feature table
    pub fn index(self) -> usize {
        self.0 as usize
    }
}

/// Leaf value kinds usable as feature ranges
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum PrimitiveKind {
    Integer,
    Float,
    Boolean,
    String,
}

/// Element kinds of array records
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ArrayKind {
    Integer,
    Float,
    String,
    FeatureStructure,
}

impl ArrayKind {
    pub const ALL: [ArrayKind; 4] =
        [ArrayKind::Integer, ArrayKind::Float, ArrayKind::String, ArrayKind::FeatureStructure];

    /// Built-in array type holding elements of this kind
    pub fn array_type(self) -> TypeId {
        match self {
            ArrayKind::Integer => TypeId::INTEGER_ARRAY,
            ArrayKind::Float => TypeId::FLOAT_ARRAY,
            ArrayKind::String => TypeId::STRING_ARRAY,
            ArrayKind::FeatureStructure => TypeId::FS_ARRAY,
        }
    }

    pub(crate) fn slot(self) -> usize {
        match self {
            ArrayKind::Integer => 0,
            ArrayKind::Float => 1,
            ArrayKind::String => 2,
            ArrayKind::FeatureStructure => 3,
        }
    }
}

/// What records of a type look like
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TypeKind {
    /// Record with feature slots
    Structure,
    /// Range-only type; never allocated on its own
    Primitive(PrimitiveKind),
    /// Contiguous element sequence
    Array(ArrayKind),
}

/// A registered type
#[derive(Debug, Clone)]
pub struct TypeDef {
    name: String,
    parent: Option<TypeId>,
    kind: TypeKind,
    own_features: Vec<FeatureId>,
    features: Vec<FeatureId>,
    subtypes: Vec<TypeId>,
}

impl TypeDef {
    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn parent(&self) -> Option<TypeId> {
        self.parent
    }

    pub fn kind(&self) -> TypeKind {
        self.kind
    }

    /// Features declared directly on this type
    pub fn own_features(&self) -> &[FeatureId] {
        &self.own_features
    }
}

/// A registered feature
#[derive(Debug, Clone)]
pub struct FeatureDef {
    name: String,
    domain: TypeId,
    range: TypeId,
    offset: usize,
}

impl FeatureDef {
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Declaring type
    pub fn domain(&self) -> TypeId {
        self.domain
    }

    /// Type of the values the feature holds
    pub fn range(&self) -> TypeId {
        self.range
    }

    /// Slot offset within a record; assigned at freeze
    pub fn offset(&self) -> usize {
        self.offset
    }
}

/// Collects diagnostics from lenient lookups instead of failing hard
#[derive(Debug, Default, Clone)]
pub struct Diagnostics {
    errors: Vec<WeftError>,
}

impl Diagnostics {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&mut self, error: WeftError) {
        warn!(category = error.category(), error = %error, "Recorded type system diagnostic");
        self.errors.push(error);
    }

    pub fn errors(&self) -> &[WeftError] {
        &self.errors
    }

    pub fn is_empty(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.errors.len()
    }
}

/// Registry of types and features shared by every view of an engine
#[derive(Debug, Clone)]
pub struct TypeSystem {
    types: Vec<TypeDef>,
    features: Vec<FeatureDef>,
    type_names: HashMap<String, TypeId>,
    frozen: bool,
}

impl Default for TypeSystem {
    fn default() -> Self {
        Self::new()
    }
}

impl TypeSystem {
    /// Create an open type system holding only the built-in types
    pub fn new() -> Self {
        let mut ts = Self {
            types: Vec::new(),
            features: Vec::new(),
            type_names: HashMap::new(),
            frozen: false,
        };

        // Registration order must match the reserved TypeId/FeatureId constants
        ts.register_type(type_names::TOP, None, TypeKind::Structure);
        let top = Some(TypeId::TOP);
        ts.register_type(type_names::INTEGER, top, TypeKind::Primitive(PrimitiveKind::Integer));
        ts.register_type(type_names::FLOAT, top, TypeKind::Primitive(PrimitiveKind::Float));
        ts.register_type(type_names::BOOLEAN, top, TypeKind::Primitive(PrimitiveKind::Boolean));
        ts.register_type(type_names::STRING, top, TypeKind::Primitive(PrimitiveKind::String));
        ts.register_type(type_names::INTEGER_ARRAY, top, TypeKind::Array(ArrayKind::Integer));
        ts.register_type(type_names::FLOAT_ARRAY, top, TypeKind::Array(ArrayKind::Float));
        ts.register_type(type_names::STRING_ARRAY, top, TypeKind::Array(ArrayKind::String));
        ts.register_type(type_names::FS_ARRAY, top, TypeKind::Array(ArrayKind::FeatureStructure));
        ts.register_type(type_names::ANNOTATION, top, TypeKind::Structure);
        ts.register_type(
            type_names::DOCUMENT_ANNOTATION,
            Some(TypeId::ANNOTATION),
            TypeKind::Structure,
        );

        ts.register_feature(TypeId::ANNOTATION, feature_names::BEGIN, TypeId::INTEGER);
        ts.register_feature(TypeId::ANNOTATION, feature_names::END, TypeId::INTEGER);
        ts.register_feature(TypeId::DOCUMENT_ANNOTATION, feature_names::LANGUAGE, TypeId::STRING);

        ts
    }

    fn register_type(&mut self, name: &str, parent: Option<TypeId>, kind: TypeKind) -> TypeId {
        let id = TypeId(self.types.len() as u32);
        self.types.push(TypeDef {
            name: name.to_string(),
            parent,
            kind,
            own_features: Vec::new(),
            features: Vec::new(),
            subtypes: Vec::new(),
        });
        if let Some(parent) = parent {
            self.types[parent.index()].subtypes.push(id);
        }
        self.type_names.insert(name.to_string(), id);
        id
    }

    fn register_feature(&mut self, domain: TypeId, name: &str, range: TypeId) -> FeatureId {
        let id = FeatureId(self.features.len() as u32);
        self.features.push(FeatureDef { name: name.to_string(), domain, range, offset: 0 });
        self.types[domain.index()].own_features.push(id);
        id
    }

    /// Register a new structure type below `parent`
    pub fn add_type(&mut self, name: &str, parent: TypeId) -> WeftResult<TypeId> {
        if self.frozen {
            return Err(WeftError::frozen(format!("add type {name}")));
        }
        if self.type_names.contains_key(name) {
            return Err(WeftError::duplicate("type", name));
        }
        let parent_def = self.type_def(parent)?;
        if parent_def.kind != TypeKind::Structure {
            return Err(WeftError::type_mismatch(
                format!("supertype of {name}"),
                "structure type",
                parent_def.name.clone(),
            ));
        }

        let id = self.register_type(name, Some(parent), TypeKind::Structure);
        debug!(type_name = name, type_id = id.0, "Registered type");
        Ok(id)
    }

    /// Register a feature on `domain` holding values of type `range`
    pub fn add_feature(&mut self, domain: TypeId, name: &str, range: TypeId) -> WeftResult<FeatureId> {
        if self.frozen {
            return Err(WeftError::frozen(format!("add feature {name}")));
        }
        let domain_def = self.type_def(domain)?;
        if domain_def.kind != TypeKind::Structure {
            return Err(WeftError::type_mismatch(
                format!("domain of feature {name}"),
                "structure type",
                domain_def.name.clone(),
            ));
        }
        self.type_def(range)?;

        // Feature names share one namespace along every inheritance chain
        let clashes_upward = self.lookup_feature(domain, name).is_some();
        let clashes_downward = self.descendants(domain).into_iter().any(|sub| {
            self.types[sub.index()]
                .own_features
                .iter()
                .any(|f| self.features[f.index()].name == name)
        });
        if clashes_upward || clashes_downward {
            return Err(WeftError::duplicate(
                "feature",
                format!("{}:{name}", self.type_name(domain)),
            ));
        }

        let id = self.register_feature(domain, name, range);
        debug!(
            feature = name,
            domain = %self.type_name(domain),
            range = %self.type_name(range),
            "Registered feature"
        );
        Ok(id)
    }

    /// Close the type system and compute the flattened feature layout.
    ///
    /// Freezing twice is a no-op.
    pub fn freeze(&mut self) {
        if self.frozen {
            return;
        }

        // Parents are always registered before their children
        for index in 0..self.types.len() {
            let mut flattened = match self.types[index].parent {
                Some(parent) => self.types[parent.index()].features.clone(),
                None => Vec::new(),
            };
            for &feature in &self.types[index].own_features {
                self.features[feature.index()].offset = flattened.len();
                flattened.push(feature);
            }
            self.types[index].features = flattened;
        }

        self.frozen = true;
        info!(
            type_count = self.types.len(),
            feature_count = self.features.len(),
            "Type system frozen"
        );
    }

    pub fn is_frozen(&self) -> bool {
        self.frozen
    }

    /// Resolve a type by name
    pub fn type_by_name(&self, name: &str) -> WeftResult<TypeId> {
        self.type_names.get(name).copied().ok_or_else(|| WeftError::type_not_found(name))
    }

    /// Resolve a feature by name on `ty`, including inherited features
    pub fn feature_by_name(&self, ty: TypeId, name: &str) -> WeftResult<FeatureId> {
        self.type_def(ty)?;
        self.lookup_feature(ty, name)
            .ok_or_else(|| WeftError::feature_not_found(self.type_name(ty), name))
    }

    /// Resolve a feature for tooling that tolerates optional features.
    ///
    /// A missing feature, or one whose range is not `expected_range`, is
    /// recorded in `diagnostics` and reported as `None`.
    pub fn resolve_feature_lenient(
        &self,
        ty: TypeId,
        name: &str,
        expected_range: Option<&str>,
        diagnostics: &mut Diagnostics,
    ) -> Option<FeatureId> {
        let feature = match self.feature_by_name(ty, name) {
            Ok(feature) => feature,
            Err(err) => {
                diagnostics.record(err);
                return None;
            }
        };

        if let Some(expected) = expected_range {
            let actual = self.type_name(self.features[feature.index()].range);
            if actual != expected {
                diagnostics.record(WeftError::type_mismatch(
                    format!("range of {}:{name}", self.type_name(ty)),
                    expected,
                    actual,
                ));
                return None;
            }
        }

        Some(feature)
    }

    fn lookup_feature(&self, ty: TypeId, name: &str) -> Option<FeatureId> {
        let mut current = Some(ty);
        while let Some(t) = current {
            let def = &self.types[t.index()];
            if let Some(&found) =
                def.own_features.iter().find(|f| self.features[f.index()].name == name)
            {
                return Some(found);
            }
            current = def.parent;
        }
        None
    }

    fn descendants(&self, ty: TypeId) -> Vec<TypeId> {
        let mut result = Vec::new();
        let mut stack = self.types[ty.index()].subtypes.clone();
        while let Some(t) = stack.pop() {
            stack.extend_from_slice(&self.types[t.index()].subtypes);
            result.push(t);
        }
        result
    }

    pub fn type_def(&self, ty: TypeId) -> WeftResult<&TypeDef> {
        self.types.get(ty.index()).ok_or_else(|| WeftError::type_not_found(format!("#{}", ty.0)))
    }

    pub fn feature_def(&self, feature: FeatureId) -> WeftResult<&FeatureDef> {
        self.features
            .get(feature.index())
            .ok_or_else(|| WeftError::feature_not_found("<any>", format!("#{}", feature.0)))
    }

    /// Name of a type, or `<invalid>` for a foreign handle
    pub fn type_name(&self, ty: TypeId) -> &str {
        self.types.get(ty.index()).map_or("<invalid>", |def| def.name.as_str())
    }

    /// Name of a feature, or `<invalid>` for a foreign handle
    pub fn feature_name(&self, feature: FeatureId) -> &str {
        self.features.get(feature.index()).map_or("<invalid>", |def| def.name.as_str())
    }

    pub fn parent(&self, ty: TypeId) -> Option<TypeId> {
        self.types.get(ty.index()).and_then(|def| def.parent)
    }

    pub fn direct_subtypes(&self, ty: TypeId) -> &[TypeId] {
        self.types.get(ty.index()).map_or(&[], |def| def.subtypes.as_slice())
    }

    /// True when `sub` is `sup` or one of its descendants
    pub fn subsumes(&self, sup: TypeId, sub: TypeId) -> bool {
        let mut current = Some(sub);
        while let Some(t) = current {
            if t == sup {
                return true;
            }
            current = self.parent(t);
        }
        false
    }

    /// Flattened feature list of `ty` in offset order; empty until frozen
    pub fn features(&self, ty: TypeId) -> &[FeatureId] {
        self.types.get(ty.index()).map_or(&[], |def| def.features.as_slice())
    }

    pub fn kind(&self, ty: TypeId) -> WeftResult<TypeKind> {
        Ok(self.type_def(ty)?.kind)
    }

    pub fn is_primitive(&self, ty: TypeId) -> bool {
        matches!(self.kind(ty), Ok(TypeKind::Primitive(_)))
    }

    pub fn is_array(&self, ty: TypeId) -> bool {
        matches!(self.kind(ty), Ok(TypeKind::Array(_)))
    }

    pub fn array_kind(&self, ty: TypeId) -> Option<ArrayKind> {
        match self.kind(ty) {
            Ok(TypeKind::Array(kind)) => Some(kind),
            _ => None,
        }
    }

    pub fn type_count(&self) -> usize {
        self.types.len()
    }

    pub fn feature_count(&self) -> usize {
        self.features.len()
    }

    /// Iterate over all registered types in registration order
    pub fn types(&self) -> impl Iterator<Item = (TypeId, &TypeDef)> {
        self.types.iter().enumerate().map(|(i, def)| (TypeId(i as u32), def))
    }

    /// Value a fresh slot of `range` holds before it is first written
    pub fn default_value(&self, range: TypeId) -> FeatureValue {
        match self.kind(range) {
            Ok(TypeKind::Primitive(PrimitiveKind::Integer)) => FeatureValue::Integer(0),
            Ok(TypeKind::Primitive(PrimitiveKind::Float)) => FeatureValue::Float(0.0),
            Ok(TypeKind::Primitive(PrimitiveKind::Boolean)) => FeatureValue::Boolean(false),
            _ => FeatureValue::Null,
        }
    }

    /// Check a non-reference value against a primitive range.
    ///
    /// References are range-checked by the heap, which knows the target's type.
    pub fn accepts_primitive(&self, range: TypeId, value: &FeatureValue) -> bool {
        match (self.kind(range), value) {
            (Ok(TypeKind::Primitive(PrimitiveKind::Integer)), FeatureValue::Integer(_)) => true,
            (Ok(TypeKind::Primitive(PrimitiveKind::Float)), FeatureValue::Float(_)) => true,
            (Ok(TypeKind::Primitive(PrimitiveKind::Boolean)), FeatureValue::Boolean(_)) => true,
            (Ok(TypeKind::Primitive(PrimitiveKind::String)), FeatureValue::String(_)) => true,
            (Ok(TypeKind::Primitive(PrimitiveKind::String)), FeatureValue::Null) => true,
            (Ok(TypeKind::Structure | TypeKind::Array(_)), FeatureValue::Null) => true,
            _ => false,
        }
    }

    /// True when a record of type `target` may be stored in a slot of `range`
    pub fn accepts_reference(&self, range: TypeId, target: TypeId) -> bool {
        !self.is_primitive(range) && self.subsumes(range, target)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn token_type_system() -> (TypeSystem, TypeId, FeatureId) {
        let mut ts = TypeSystem::new();
        let token = ts.add_type("Token", TypeId::ANNOTATION).unwrap();
        let pos = ts.add_feature(token, "pos", TypeId::STRING).unwrap();
        (ts, token, pos)
    }

    #[test]
    fn test_builtin_types_resolve() {
        let ts = TypeSystem::new();
        assert_eq!(ts.type_by_name(type_names::TOP).unwrap(), TypeId::TOP);
        assert_eq!(ts.type_by_name(type_names::ANNOTATION).unwrap(), TypeId::ANNOTATION);
        assert_eq!(
            ts.feature_by_name(TypeId::ANNOTATION, "begin").unwrap(),
            FeatureId::ANNOTATION_BEGIN
        );
        assert_eq!(
            ts.feature_by_name(TypeId::DOCUMENT_ANNOTATION, "end").unwrap(),
            FeatureId::ANNOTATION_END
        );
        assert_eq!(ts.array_kind(TypeId::FS_ARRAY), Some(ArrayKind::FeatureStructure));
        assert!(ts.is_primitive(TypeId::STRING));
    }

    #[test]
    fn test_unknown_names_fail() {
        let ts = TypeSystem::new();
        assert!(matches!(ts.type_by_name("Nope"), Err(WeftError::TypeNotFound { .. })));
        assert!(matches!(
            ts.feature_by_name(TypeId::ANNOTATION, "nope"),
            Err(WeftError::FeatureNotFound { .. })
        ));
    }

    #[test]
    fn test_inherited_features_keep_offsets() {
        let (mut ts, token, pos) = token_type_system();
        ts.freeze();

        let annotation_features = ts.features(TypeId::ANNOTATION).to_vec();
        let token_features = ts.features(token);
        assert_eq!(&token_features[..annotation_features.len()], annotation_features.as_slice());
        assert_eq!(ts.feature_def(pos).unwrap().offset(), 2);
        assert_eq!(ts.feature_def(FeatureId::ANNOTATION_END).unwrap().offset(), 1);
        assert!(ts.subsumes(TypeId::ANNOTATION, token));
        assert!(!ts.subsumes(token, TypeId::ANNOTATION));
    }

    #[test]
    fn test_feature_added_to_parent_after_subtype() {
        let mut ts = TypeSystem::new();
        let base = ts.add_type("Base", TypeId::TOP).unwrap();
        let derived = ts.add_type("Derived", base).unwrap();
        let own = ts.add_feature(derived, "own", TypeId::INTEGER).unwrap();
        let late = ts.add_feature(base, "late", TypeId::INTEGER).unwrap();
        ts.freeze();

        assert_eq!(ts.features(derived), &[late, own]);
        assert_eq!(ts.feature_def(late).unwrap().offset(), 0);
        assert_eq!(ts.feature_def(own).unwrap().offset(), 1);
    }

    #[test]
    fn test_duplicate_definitions_rejected() {
        let (mut ts, token, _) = token_type_system();
        assert!(matches!(
            ts.add_type("Token", TypeId::TOP),
            Err(WeftError::DuplicateDefinition { .. })
        ));
        // Inherited from Annotation
        assert!(matches!(
            ts.add_feature(token, "begin", TypeId::INTEGER),
            Err(WeftError::DuplicateDefinition { .. })
        ));
        // Already declared on a subtype
        assert!(matches!(
            ts.add_feature(TypeId::ANNOTATION, "pos", TypeId::STRING),
            Err(WeftError::DuplicateDefinition { .. })
        ));
    }

    #[test]
    fn test_cannot_subtype_primitive_or_array() {
        let mut ts = TypeSystem::new();
        assert!(matches!(
            ts.add_type("MyInt", TypeId::INTEGER),
            Err(WeftError::TypeMismatch { .. })
        ));
        assert!(matches!(
            ts.add_type("MyArray", TypeId::FS_ARRAY),
            Err(WeftError::TypeMismatch { .. })
        ));
    }

    #[test]
    fn test_registration_closed_after_freeze() {
        let (mut ts, token, _) = token_type_system();
        ts.freeze();
        ts.freeze();
        assert!(matches!(
            ts.add_type("Late", TypeId::TOP),
            Err(WeftError::TypeSystemFrozen { .. })
        ));
        assert!(matches!(
            ts.add_feature(token, "late", TypeId::INTEGER),
            Err(WeftError::TypeSystemFrozen { .. })
        ));
    }

    #[test]
    fn test_lenient_feature_resolution_records_diagnostics() {
        let (ts, token, pos) = token_type_system();
        let mut diagnostics = Diagnostics::new();

        assert_eq!(
            ts.resolve_feature_lenient(token, "pos", Some(type_names::STRING), &mut diagnostics),
            Some(pos)
        );
        assert!(diagnostics.is_empty());

        assert_eq!(ts.resolve_feature_lenient(token, "lemma", None, &mut diagnostics), None);
        assert_eq!(
            ts.resolve_feature_lenient(token, "pos", Some(type_names::INTEGER), &mut diagnostics),
            None
        );
        assert_eq!(diagnostics.len(), 2);
        assert!(matches!(diagnostics.errors()[0], WeftError::FeatureNotFound { .. }));
        assert!(matches!(diagnostics.errors()[1], WeftError::TypeMismatch { .. }));
    }

    #[test]
    fn test_value_acceptance() {
        let (ts, token, _) = token_type_system();
        assert!(ts.accepts_primitive(TypeId::INTEGER, &FeatureValue::Integer(1)));
        assert!(!ts.accepts_primitive(TypeId::INTEGER, &FeatureValue::Float(1.0)));
        assert!(ts.accepts_primitive(TypeId::STRING, &FeatureValue::Null));
        assert!(!ts.accepts_primitive(TypeId::BOOLEAN, &FeatureValue::Null));
        assert!(ts.accepts_reference(TypeId::ANNOTATION, token));
        assert!(!ts.accepts_reference(token, TypeId::ANNOTATION));
        assert!(!ts.accepts_reference(TypeId::INTEGER, token));
        assert_eq!(ts.default_value(TypeId::FLOAT), FeatureValue::Float(0.0));
        assert_eq!(ts.default_value(token), FeatureValue::Null);
    }
}
