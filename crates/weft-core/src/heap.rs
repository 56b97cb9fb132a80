//! Arena storage for feature structures
//!
//! Records live in a single vector and are addressed by position, as in an
//! arena: an `FsAddr` carries the record's index plus the heap generation that
//! issued it. Nothing is freed individually; `reset` drops every record at once
//! and moves to a new generation so that old handles fail with `StaleAddress`
//! instead of silently reading whatever lives at that index afterwards.
//!
//! Generations are drawn from one process-wide counter, so no two heaps (and
//! no two generations of one heap) ever hand out the same `FsAddr`. A handle
//! issued by another engine is rejected rather than resolved against this
//! heap's records.

use crate::error::{WeftError, WeftResult};
use crate::type_system::{ArrayKind, FeatureId, TypeId, TypeKind, TypeSystem};
use std::sync::atomic::{AtomicU32, Ordering};
use tracing::debug;
use weft_types::{FeatureValue, FsAddr};

/// Element storage of an array record
#[derive(Debug, Clone, PartialEq)]
pub enum ArrayData {
    Integer(Vec<i64>),
    Float(Vec<f64>),
    String(Vec<Option<String>>),
    FeatureStructure(Vec<Option<FsAddr>>),
}

impl ArrayData {
    fn new(kind: ArrayKind, length: usize) -> Self {
        match kind {
            ArrayKind::Integer => ArrayData::Integer(vec![0; length]),
            ArrayKind::Float => ArrayData::Float(vec![0.0; length]),
            ArrayKind::String => ArrayData::String(vec![None; length]),
            ArrayKind::FeatureStructure => ArrayData::FeatureStructure(vec![None; length]),
        }
    }

    pub fn len(&self) -> usize {
        match self {
            ArrayData::Integer(v) => v.len(),
            ArrayData::Float(v) => v.len(),
            ArrayData::String(v) => v.len(),
            ArrayData::FeatureStructure(v) => v.len(),
        }
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn get(&self, index: usize) -> Option<FeatureValue> {
        match self {
            ArrayData::Integer(v) => v.get(index).map(|i| FeatureValue::Integer(*i)),
            ArrayData::Float(v) => v.get(index).map(|f| FeatureValue::Float(*f)),
            ArrayData::String(v) => v
                .get(index)
                .map(|s| s.as_ref().map_or(FeatureValue::Null, |s| FeatureValue::String(s.clone()))),
            ArrayData::FeatureStructure(v) => v.get(index).map(|a| FeatureValue::from(*a)),
        }
    }
}

#[derive(Debug, Clone)]
enum RecordBody {
    Slots(Vec<FeatureValue>),
    Array(ArrayData),
}

/// A feature structure as stored on the heap
#[derive(Debug, Clone)]
pub struct FsRecord {
    type_id: TypeId,
    body: RecordBody,
}

impl FsRecord {
    pub fn fs_type(&self) -> TypeId {
        self.type_id
    }

    pub fn is_array(&self) -> bool {
        matches!(self.body, RecordBody::Array(_))
    }

    /// Element storage, for array records
    pub fn array_data(&self) -> Option<&ArrayData> {
        match &self.body {
            RecordBody::Array(data) => Some(data),
            RecordBody::Slots(_) => None,
        }
    }
}

static NEXT_GENERATION: AtomicU32 = AtomicU32::new(0);

fn next_generation() -> u32 {
    NEXT_GENERATION.fetch_add(1, Ordering::Relaxed)
}

/// Typed record store shared by every view of an engine
#[derive(Debug)]
pub struct FsHeap {
    records: Vec<FsRecord>,
    generation: u32,
    empty_arrays: [Option<FsAddr>; 4],
}

impl Default for FsHeap {
    fn default() -> Self {
        Self::new()
    }
}

impl FsHeap {
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    /// Create a heap with room for `capacity` records before reallocating
    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            records: Vec::with_capacity(capacity),
            generation: next_generation(),
            empty_arrays: [None; 4],
        }
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }

    /// Look up a live record, rejecting handles from other generations
    pub fn record(&self, addr: FsAddr) -> WeftResult<&FsRecord> {
        let index = self.check_generation(addr)?;
        self.records.get(index).ok_or(WeftError::InvalidAddress { addr })
    }

    fn record_mut(&mut self, addr: FsAddr) -> WeftResult<&mut FsRecord> {
        let index = self.check_generation(addr)?;
        self.records.get_mut(index).ok_or(WeftError::InvalidAddress { addr })
    }

    /// Older generations are stale; newer ones were never issued by this heap
    fn check_generation(&self, addr: FsAddr) -> WeftResult<usize> {
        match addr.generation().cmp(&self.generation) {
            std::cmp::Ordering::Equal => Ok(addr.index() as usize),
            std::cmp::Ordering::Less => {
                Err(WeftError::StaleAddress { addr, current_generation: self.generation })
            }
            std::cmp::Ordering::Greater => Err(WeftError::InvalidAddress { addr }),
        }
    }

    pub fn type_of(&self, addr: FsAddr) -> WeftResult<TypeId> {
        Ok(self.record(addr)?.type_id)
    }

    fn push(&mut self, record: FsRecord) -> WeftResult<FsAddr> {
        let index = u32::try_from(self.records.len()).map_err(|_| {
            WeftError::configuration("heap", "heap address space exhausted for this generation")
        })?;
        self.records.push(record);
        Ok(FsAddr::new(self.generation, index))
    }

    /// Allocate a structure record with every slot at its default value
    pub fn allocate(&mut self, ts: &TypeSystem, ty: TypeId) -> WeftResult<FsAddr> {
        if !ts.is_frozen() {
            return Err(WeftError::not_frozen("allocating feature structures"));
        }
        let def = ts.type_def(ty)?;
        if def.kind() != TypeKind::Structure {
            return Err(WeftError::type_mismatch(
                "allocate",
                "structure type (arrays use allocate_array)",
                def.name(),
            ));
        }

        let slots = ts
            .features(ty)
            .iter()
            .map(|&feature| {
                let range = ts.feature_def(feature).map(|f| f.range()).unwrap_or(TypeId::TOP);
                ts.default_value(range)
            })
            .collect();

        self.push(FsRecord { type_id: ty, body: RecordBody::Slots(slots) })
    }

    /// Resolve the slot offset of `feature` on a record of type `record_type`
    fn slot_offset(ts: &TypeSystem, record_type: TypeId, feature: FeatureId) -> WeftResult<usize> {
        let def = ts.feature_def(feature)?;
        if !ts.subsumes(def.domain(), record_type) {
            return Err(WeftError::WrongFeatureForType {
                feature: def.name().to_string(),
                type_name: ts.type_name(record_type).to_string(),
            });
        }
        Ok(def.offset())
    }

    pub fn get_slot(&self, ts: &TypeSystem, addr: FsAddr, feature: FeatureId) -> WeftResult<FeatureValue> {
        let record = self.record(addr)?;
        let offset = Self::slot_offset(ts, record.type_id, feature)?;
        match &record.body {
            RecordBody::Slots(slots) => {
                slots.get(offset).cloned().ok_or(WeftError::InvalidAddress { addr })
            }
            RecordBody::Array(_) => Err(WeftError::WrongFeatureForType {
                feature: ts.feature_name(feature).to_string(),
                type_name: ts.type_name(record.type_id).to_string(),
            }),
        }
    }

    /// Write a slot after checking the value against the feature's range
    pub fn set_slot(
        &mut self,
        ts: &TypeSystem,
        addr: FsAddr,
        feature: FeatureId,
        value: FeatureValue,
    ) -> WeftResult<()> {
        let record_type = self.type_of(addr)?;
        let offset = Self::slot_offset(ts, record_type, feature)?;
        let range = ts.feature_def(feature)?.range();
        self.check_value(ts, range, &value, ts.feature_name(feature))?;

        match &mut self.record_mut(addr)?.body {
            RecordBody::Slots(slots) => match slots.get_mut(offset) {
                Some(slot) => {
                    *slot = value;
                    Ok(())
                }
                None => Err(WeftError::InvalidAddress { addr }),
            },
            RecordBody::Array(_) => Err(WeftError::WrongFeatureForType {
                feature: ts.feature_name(feature).to_string(),
                type_name: ts.type_name(record_type).to_string(),
            }),
        }
    }

    fn check_value(
        &self,
        ts: &TypeSystem,
        range: TypeId,
        value: &FeatureValue,
        context: &str,
    ) -> WeftResult<()> {
        match value {
            FeatureValue::Ref(target) => {
                let target_type = self.type_of(*target)?;
                if ts.accepts_reference(range, target_type) {
                    Ok(())
                } else {
                    Err(WeftError::type_mismatch(
                        context,
                        ts.type_name(range),
                        ts.type_name(target_type),
                    ))
                }
            }
            other if ts.accepts_primitive(range, other) => Ok(()),
            other => Err(WeftError::type_mismatch(context, ts.type_name(range), other.kind_name())),
        }
    }

    /// Allocate an array; zero-length requests share one singleton per kind
    pub fn allocate_array(
        &mut self,
        ts: &TypeSystem,
        kind: ArrayKind,
        length: usize,
    ) -> WeftResult<FsAddr> {
        if length == 0 {
            return self.empty_array(ts, kind);
        }
        if !ts.is_frozen() {
            return Err(WeftError::not_frozen("allocating arrays"));
        }
        self.push(FsRecord {
            type_id: kind.array_type(),
            body: RecordBody::Array(ArrayData::new(kind, length)),
        })
    }

    /// Shared zero-length array of `kind`, created on first request
    pub fn empty_array(&mut self, ts: &TypeSystem, kind: ArrayKind) -> WeftResult<FsAddr> {
        if let Some(addr) = self.empty_arrays[kind.slot()] {
            return Ok(addr);
        }
        if !ts.is_frozen() {
            return Err(WeftError::not_frozen("allocating arrays"));
        }

        let addr = self.push(FsRecord {
            type_id: kind.array_type(),
            body: RecordBody::Array(ArrayData::new(kind, 0)),
        })?;
        self.empty_arrays[kind.slot()] = Some(addr);
        debug!(kind = ?kind, addr = %addr, "Created empty array singleton");
        Ok(addr)
    }

    fn array(&self, addr: FsAddr) -> WeftResult<&ArrayData> {
        let record = self.record(addr)?;
        record
            .array_data()
            .ok_or_else(|| WeftError::type_mismatch("array access", "array type", "structure record"))
    }

    pub fn array_len(&self, addr: FsAddr) -> WeftResult<usize> {
        Ok(self.array(addr)?.len())
    }

    /// Fail with `ArrayIndexOutOfBounds` unless `index` is a valid element position
    pub fn check_array_bounds(&self, addr: FsAddr, index: usize) -> WeftResult<()> {
        let length = self.array_len(addr)?;
        if index >= length {
            return Err(WeftError::ArrayIndexOutOfBounds { addr, index, length });
        }
        Ok(())
    }

    pub fn array_get(&self, addr: FsAddr, index: usize) -> WeftResult<FeatureValue> {
        let data = self.array(addr)?;
        data.get(index).ok_or(WeftError::ArrayIndexOutOfBounds { addr, index, length: data.len() })
    }

    /// Copy of every element, for read-only consumers
    pub fn array_elements(&self, addr: FsAddr) -> WeftResult<Vec<FeatureValue>> {
        let data = self.array(addr)?;
        Ok((0..data.len()).filter_map(|i| data.get(i)).collect())
    }

    pub fn array_set(
        &mut self,
        ts: &TypeSystem,
        addr: FsAddr,
        index: usize,
        value: FeatureValue,
    ) -> WeftResult<()> {
        self.check_array_bounds(addr, index)?;
        let array_type = self.type_of(addr)?;

        // Reference elements must point at live records
        if let FeatureValue::Ref(target) = &value {
            self.type_of(*target)?;
        }

        let mismatch = |value: &FeatureValue| {
            WeftError::type_mismatch("array element", ts.type_name(array_type), value.kind_name())
        };

        let RecordBody::Array(data) = &mut self.record_mut(addr)?.body else {
            return Err(WeftError::type_mismatch("array access", "array type", ts.type_name(array_type)));
        };
        match (data, value) {
            (ArrayData::Integer(v), FeatureValue::Integer(i)) => v[index] = i,
            (ArrayData::Float(v), FeatureValue::Float(f)) => v[index] = f,
            (ArrayData::String(v), FeatureValue::String(s)) => v[index] = Some(s),
            (ArrayData::String(v), FeatureValue::Null) => v[index] = None,
            (ArrayData::FeatureStructure(v), FeatureValue::Ref(a)) => v[index] = Some(a),
            (ArrayData::FeatureStructure(v), FeatureValue::Null) => v[index] = None,
            (_, other) => return Err(mismatch(&other)),
        }
        Ok(())
    }

    /// Drop every record and start a new generation
    pub fn reset(&mut self) {
        self.records.clear();
        self.empty_arrays = [None; 4];
        self.generation = next_generation();
        debug!(generation = self.generation, "Heap reset");
    }
}
