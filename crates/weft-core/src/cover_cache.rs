//! Cover objects and the generation-scoped cache that hands them out
//!
//! A cover is a typed wrapper around a heap address. Handing out the same
//! `Arc` for the same address keeps wrapper identity (`Arc::ptr_eq`) in step
//! with record identity. The cache never evicts single entries; the whole map
//! is dropped when the heap starts a new generation.

use crate::engine::Cas;
use crate::error::{WeftError, WeftResult};
use crate::type_system::{FeatureId, TypeId};
use crate::view::ViewId;
use ahash::AHashMap;
use std::any::Any;
use std::sync::Arc;
use weft_types::FsAddr;

/// A typed wrapper that can be built from a heap address
pub trait Cover: Any + Send + Sync {
    /// Build the wrapper for the record at `addr` whose runtime type is `type_id`
    fn from_fs(addr: FsAddr, type_id: TypeId) -> Self
    where
        Self: Sized;
}

/// Untyped cover usable for any record
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopCover {
    addr: FsAddr,
    type_id: TypeId,
}

impl TopCover {
    pub fn addr(&self) -> FsAddr {
        self.addr
    }

    /// Runtime type of the wrapped record
    pub fn fs_type(&self) -> TypeId {
        self.type_id
    }
}

impl Cover for TopCover {
    fn from_fs(addr: FsAddr, type_id: TypeId) -> Self {
        Self { addr, type_id }
    }
}

/// Cover for `uima.tcas.Annotation` and its subtypes
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AnnotationCover {
    addr: FsAddr,
}

impl AnnotationCover {
    pub fn addr(&self) -> FsAddr {
        self.addr
    }

    pub fn begin(&self, cas: &Cas) -> WeftResult<i64> {
        self.int_feature(cas, FeatureId::ANNOTATION_BEGIN)
    }

    pub fn end(&self, cas: &Cas) -> WeftResult<i64> {
        self.int_feature(cas, FeatureId::ANNOTATION_END)
    }

    pub fn set_span(&self, cas: &mut Cas, begin: i64, end: i64) -> WeftResult<()> {
        cas.set_slot(self.addr, FeatureId::ANNOTATION_BEGIN, begin.into())?;
        cas.set_slot(self.addr, FeatureId::ANNOTATION_END, end.into())
    }

    /// Text of `view`'s sofa between `begin` and `end`
    pub fn covered_text(&self, cas: &Cas, view: ViewId) -> WeftResult<String> {
        cas.covered_text(view, self.addr)
    }

    fn int_feature(&self, cas: &Cas, feature: FeatureId) -> WeftResult<i64> {
        let value = cas.get_slot(self.addr, feature)?;
        value.as_integer().ok_or_else(|| {
            WeftError::type_mismatch(
                cas.type_system().feature_name(feature),
                "Integer",
                value.kind_name(),
            )
        })
    }
}

impl Cover for AnnotationCover {
    fn from_fs(addr: FsAddr, _type_id: TypeId) -> Self {
        Self { addr }
    }
}

/// Address-to-cover map for one heap generation
#[derive(Debug, Default)]
pub struct CoverCache {
    generation: u32,
    map: AHashMap<FsAddr, Arc<dyn Any + Send + Sync>>,
    hits: u64,
    misses: u64,
}

impl CoverCache {
    pub fn new(generation: u32) -> Self {
        Self { generation, ..Self::default() }
    }

    /// Record `cover` as the wrapper for `addr`, replacing any earlier binding
    pub fn bind<C: Any + Send + Sync>(&mut self, addr: FsAddr, cover: Arc<C>) -> WeftResult<()> {
        if addr.generation() != self.generation {
            return Err(WeftError::StaleAddress { addr, current_generation: self.generation });
        }
        self.map.insert(addr, cover);
        Ok(())
    }

    /// Wrapper previously bound for `addr`, if it has type `C`
    pub fn lookup<C: Any + Send + Sync>(&mut self, addr: FsAddr) -> Option<Arc<C>> {
        let found = self.map.get(&addr).cloned().and_then(|cover| cover.downcast::<C>().ok());
        if found.is_some() {
            self.hits += 1;
        } else {
            self.misses += 1;
        }
        found
    }

    pub fn contains(&self, addr: FsAddr) -> bool {
        self.map.contains_key(&addr)
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }

    /// Discard every binding and start serving `generation`
    pub fn clear(&mut self, generation: u32) {
        self.map.clear();
        self.generation = generation;
        self.hits = 0;
        self.misses = 0;
    }

    pub fn stats(&self) -> CoverCacheStats {
        CoverCacheStats {
            generation: self.generation,
            size: self.map.len(),
            hits: self.hits,
            misses: self.misses,
        }
    }
}

/// Cover cache statistics
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CoverCacheStats {
    pub generation: u32,
    pub size: usize,
    pub hits: u64,
    pub misses: u64,
}

impl CoverCacheStats {
    /// Fraction of lookups answered from the cache
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 { 0.0 } else { self.hits as f64 / total as f64 }
    }
}
