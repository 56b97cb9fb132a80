//! Per-view index repository
//!
//! Each view owns one `IndexRepository`. The repository holds every index
//! defined on the engine (the definitions themselves are shared between
//! views) plus a membership table recording which records are indexed in
//! this view.
//!
//! Entries are kept in `Arc<Vec<IndexEntry>>` storage. Iterators hold a clone
//! of that `Arc`, and mutation goes through `Arc::make_mut`, so an iterator
//! keeps seeing the contents it was created over while later iterators see
//! the update.
//!
//! Every index orders its entries by `(sort key, insertion sequence)`. The
//! sequence number is assigned when a record first enters the repository and
//! is kept if the record is detached and re-attached around a key update, so
//! ties always break the same way for the same sequence of calls.

use crate::constants::indexes::ANNOTATION_INDEX;
use crate::constants::{feature_names, type_names};
use crate::constraint::Constraint;
use crate::error::{WeftError, WeftResult};
use crate::heap::FsHeap;
use crate::type_system::{FeatureId, TypeId, TypeSystem};
use ahash::AHashMap;
use serde::{Deserialize, Serialize};
use std::cmp::Ordering;
use std::sync::Arc;
use weft_types::{FeatureValue, FsAddr};

/// How an index organizes its entries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IndexKind {
    /// Ordered by key, equal keys ordered by insertion sequence
    Sorted,
    /// Ordered by key, at most one record per key
    Set,
    /// Insertion order, no keys
    Bag,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SortOrder {
    #[default]
    Ascending,
    Descending,
}

/// Name-based sort key declaration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct KeySpec {
    /// Feature name, optionally qualified as `Type:feature`
    pub feature: String,
    #[serde(default)]
    pub order: SortOrder,
}

/// Name-based index declaration, resolved against the type system at freeze
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct IndexSpec {
    pub label: String,
    pub type_name: String,
    pub kind: IndexKind,
    #[serde(default)]
    pub keys: Vec<KeySpec>,
}

impl IndexSpec {
    pub fn new(label: impl Into<String>, type_name: impl Into<String>, kind: IndexKind) -> Self {
        Self { label: label.into(), type_name: type_name.into(), kind, keys: Vec::new() }
    }

    pub fn sorted(label: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self::new(label, type_name, IndexKind::Sorted)
    }

    pub fn set(label: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self::new(label, type_name, IndexKind::Set)
    }

    pub fn bag(label: impl Into<String>, type_name: impl Into<String>) -> Self {
        Self::new(label, type_name, IndexKind::Bag)
    }

    /// Append a sort key
    pub fn key(mut self, feature: impl Into<String>, order: SortOrder) -> Self {
        self.keys.push(KeySpec { feature: feature.into(), order });
        self
    }

    /// The built-in annotation index: `begin` ascending, then `end` descending
    pub fn annotation_index() -> Self {
        Self::sorted(ANNOTATION_INDEX, type_names::ANNOTATION)
            .key(feature_names::BEGIN, SortOrder::Ascending)
            .key(feature_names::END, SortOrder::Descending)
    }

    /// Resolve type and feature names into an `IndexDefinition`
    pub fn resolve(&self, ts: &TypeSystem) -> WeftResult<IndexDefinition> {
        let type_id = ts.type_by_name(&self.type_name)?;

        if self.kind == IndexKind::Bag && !self.keys.is_empty() {
            return Err(WeftError::configuration(
                "indexes",
                format!("bag index {} cannot declare sort keys", self.label),
            ));
        }

        let keys = self
            .keys
            .iter()
            .map(|key| {
                let feature = resolve_key_feature(ts, type_id, &key.feature)?;
                let range = ts.feature_def(feature)?.range();
                if !ts.is_primitive(range) {
                    return Err(WeftError::type_mismatch(
                        format!("sort key {} of index {}", key.feature, self.label),
                        "primitive-valued feature",
                        ts.type_name(range),
                    ));
                }
                Ok(IndexKey { feature, order: key.order })
            })
            .collect::<WeftResult<Vec<_>>>()?;

        Ok(IndexDefinition { label: self.label.clone(), type_id, kind: self.kind, keys })
    }
}

fn resolve_key_feature(ts: &TypeSystem, index_type: TypeId, name: &str) -> WeftResult<FeatureId> {
    let Some((type_name, feature_name)) = name.split_once(':') else {
        return ts.feature_by_name(index_type, name);
    };

    let domain = ts.type_by_name(type_name)?;
    let feature = ts.feature_by_name(domain, feature_name)?;
    let declared_on = ts.feature_def(feature)?.domain();
    if !ts.subsumes(declared_on, index_type) {
        return Err(WeftError::WrongFeatureForType {
            feature: name.to_string(),
            type_name: ts.type_name(index_type).to_string(),
        });
    }
    Ok(feature)
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct IndexKey {
    pub feature: FeatureId,
    pub order: SortOrder,
}

/// Index declaration with names resolved to handles
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexDefinition {
    label: String,
    type_id: TypeId,
    kind: IndexKind,
    keys: Vec<IndexKey>,
}

impl IndexDefinition {
    pub fn label(&self) -> &str {
        &self.label
    }

    /// Type the index is declared over; subtypes are covered as well
    pub fn indexed_type(&self) -> TypeId {
        self.type_id
    }

    pub fn kind(&self) -> IndexKind {
        self.kind
    }

    pub fn keys(&self) -> &[IndexKey] {
        &self.keys
    }

    pub fn covers(&self, ts: &TypeSystem, ty: TypeId) -> bool {
        ts.subsumes(self.type_id, ty)
    }

    pub fn is_keyed_on(&self, feature: FeatureId) -> bool {
        self.keys.iter().any(|key| key.feature == feature)
    }

    fn compare_keys(&self, a: &[FeatureValue], b: &[FeatureValue]) -> Ordering {
        self.keys
            .iter()
            .zip(a.iter().zip(b))
            .map(|(key, (x, y))| match key.order {
                SortOrder::Ascending => x.total_cmp(y),
                SortOrder::Descending => y.total_cmp(x),
            })
            .find(|ordering| ordering.is_ne())
            .unwrap_or(Ordering::Equal)
    }

    fn compare_entries(&self, a: &IndexEntry, key: &[FeatureValue], seq: u64) -> Ordering {
        self.compare_keys(&a.key, key).then(a.seq.cmp(&seq))
    }
}

#[derive(Debug, Clone)]
struct IndexEntry {
    key: Vec<FeatureValue>,
    seq: u64,
    addr: FsAddr,
    type_id: TypeId,
}

#[derive(Debug, Clone, Default)]
struct FsIndex {
    entries: Arc<Vec<IndexEntry>>,
}

/// A record's place in the repository
#[derive(Debug, Clone)]
struct Membership {
    seq: u64,
    type_id: TypeId,
    /// Positions of the indexes holding the record, with the key it was filed under
    placed: Vec<(usize, Vec<FeatureValue>)>,
}

/// All indexes of one view
#[derive(Debug, Clone)]
pub struct IndexRepository {
    definitions: Arc<[IndexDefinition]>,
    indexes: Vec<FsIndex>,
    members: AHashMap<FsAddr, Membership>,
    next_seq: u64,
}

impl Default for IndexRepository {
    fn default() -> Self {
        Self::new(Arc::from(Vec::new()))
    }
}

impl IndexRepository {
    pub fn new(definitions: Arc<[IndexDefinition]>) -> Self {
        let indexes = vec![FsIndex::default(); definitions.len()];
        Self { definitions, indexes, members: AHashMap::new(), next_seq: 0 }
    }

    pub fn definitions(&self) -> &[IndexDefinition] {
        &self.definitions
    }

    pub fn definition(&self, label: &str) -> Option<&IndexDefinition> {
        self.definitions.iter().find(|def| def.label == label)
    }

    fn position(&self, label: &str) -> WeftResult<usize> {
        self.definitions
            .iter()
            .position(|def| def.label == label)
            .ok_or_else(|| WeftError::IndexNotFound { label: label.to_string() })
    }

    /// Index `addr` in every index covering its type.
    ///
    /// Returns `false` without touching anything if the record is already indexed.
    pub fn add(&mut self, heap: &FsHeap, ts: &TypeSystem, addr: FsAddr) -> WeftResult<bool> {
        if self.members.contains_key(&addr) {
            heap.type_of(addr)?;
            return Ok(false);
        }
        let seq = self.next_seq;
        self.insert_with_seq(heap, ts, addr, seq)?;
        self.next_seq += 1;
        Ok(true)
    }

    /// Remove `addr` from every index; `false` if it was not indexed
    pub fn remove(&mut self, addr: FsAddr) -> bool {
        self.detach(addr).is_some()
    }

    /// Remove `addr` and hand back its insertion sequence for `reattach`
    pub(crate) fn detach(&mut self, addr: FsAddr) -> Option<u64> {
        let membership = self.members.remove(&addr)?;
        for (position, key) in &membership.placed {
            let definition = &self.definitions[*position];
            let entries = Arc::make_mut(&mut self.indexes[*position].entries);
            if let Ok(found) =
                entries.binary_search_by(|e| definition.compare_entries(e, key, membership.seq))
            {
                entries.remove(found);
            }
        }
        Some(membership.seq)
    }

    /// Re-index `addr` under a sequence number obtained from `detach`
    pub(crate) fn reattach(
        &mut self,
        heap: &FsHeap,
        ts: &TypeSystem,
        addr: FsAddr,
        seq: u64,
    ) -> WeftResult<()> {
        self.insert_with_seq(heap, ts, addr, seq)
    }

    fn insert_with_seq(
        &mut self,
        heap: &FsHeap,
        ts: &TypeSystem,
        addr: FsAddr,
        seq: u64,
    ) -> WeftResult<()> {
        let type_id = heap.type_of(addr)?;

        // Read every key before touching any index
        let mut keyed = Vec::new();
        for (position, definition) in self.definitions.iter().enumerate() {
            if !definition.covers(ts, type_id) {
                continue;
            }
            let key = definition
                .keys
                .iter()
                .map(|k| heap.get_slot(ts, addr, k.feature))
                .collect::<WeftResult<Vec<_>>>()?;
            keyed.push((position, key));
        }

        let mut placed = Vec::with_capacity(keyed.len());
        for (position, key) in keyed {
            let definition = &self.definitions[position];
            let entries = Arc::make_mut(&mut self.indexes[position].entries);
            let at = entries.partition_point(|e| definition.compare_entries(e, &key, seq).is_lt());

            if definition.kind == IndexKind::Set {
                let clashes_before =
                    at > 0 && definition.compare_keys(&entries[at - 1].key, &key).is_eq();
                let clashes_after =
                    entries.get(at).is_some_and(|e| definition.compare_keys(&e.key, &key).is_eq());
                if clashes_before || clashes_after {
                    continue;
                }
            }

            entries.insert(at, IndexEntry { key: key.clone(), seq, addr, type_id });
            placed.push((position, key));
        }

        self.members.insert(addr, Membership { seq, type_id, placed });
        Ok(())
    }

    /// True when writing `feature` on `addr` would move it within an index
    pub fn is_keyed_on(&self, ts: &TypeSystem, addr: FsAddr, feature: FeatureId) -> bool {
        self.members.get(&addr).is_some_and(|membership| {
            self.definitions
                .iter()
                .any(|def| def.covers(ts, membership.type_id) && def.is_keyed_on(feature))
        })
    }

    pub fn contains(&self, addr: FsAddr) -> bool {
        self.members.contains_key(&addr)
    }

    /// Number of distinct records indexed in this view
    pub fn len(&self) -> usize {
        self.members.len()
    }

    pub fn is_empty(&self) -> bool {
        self.members.is_empty()
    }

    pub fn size(&self, label: &str) -> WeftResult<usize> {
        Ok(self.indexes[self.position(label)?].entries.len())
    }

    /// Snapshot iterator over one index
    pub fn iterate(&self, label: &str) -> WeftResult<FsIterator> {
        let position = self.position(label)?;
        Ok(FsIterator::new(Arc::clone(&self.indexes[position].entries)))
    }

    /// Snapshot iterator over the entries of `ty` (and its subtypes) in one index
    pub fn iterate_type(&self, ts: &TypeSystem, label: &str, ty: TypeId) -> WeftResult<FsIterator> {
        let position = self.position(label)?;
        let definition = &self.definitions[position];
        if !definition.covers(ts, ty) {
            return Err(WeftError::type_mismatch(
                format!("iteration over index {label}"),
                format!("subtype of {}", ts.type_name(definition.type_id)),
                ts.type_name(ty),
            ));
        }
        if ty == definition.type_id {
            return self.iterate(label);
        }

        let entries = self.indexes[position]
            .entries
            .iter()
            .filter(|e| ts.subsumes(ty, e.type_id))
            .cloned()
            .collect();
        Ok(FsIterator::new(Arc::new(entries)))
    }

    /// Every record of `ty` indexed in this view, in insertion order
    pub fn all_indexed(&self, ts: &TypeSystem, ty: TypeId) -> FsIterator {
        let mut entries: Vec<IndexEntry> = self
            .members
            .iter()
            .filter(|(_, m)| ts.subsumes(ty, m.type_id))
            .map(|(addr, m)| IndexEntry { key: Vec::new(), seq: m.seq, addr: *addr, type_id: m.type_id })
            .collect();
        entries.sort_by_key(|e| e.seq);
        FsIterator::new(Arc::new(entries))
    }

    /// Entry count per index label
    pub fn index_sizes(&self) -> Vec<(String, usize)> {
        self.definitions
            .iter()
            .zip(&self.indexes)
            .map(|(def, index)| (def.label.clone(), index.entries.len()))
            .collect()
    }

    /// Empty every index; live iterators keep their snapshots
    pub fn clear(&mut self) {
        for index in &mut self.indexes {
            index.entries = Arc::new(Vec::new());
        }
        self.members.clear();
        self.next_seq = 0;
    }
}

/// Restartable iterator over a snapshot of index contents
#[derive(Debug, Clone)]
pub struct FsIterator {
    entries: Arc<Vec<IndexEntry>>,
    front: usize,
    back: usize,
}

impl FsIterator {
    fn new(entries: Arc<Vec<IndexEntry>>) -> Self {
        let back = entries.len();
        Self { entries, front: 0, back }
    }

    pub fn empty() -> Self {
        Self::new(Arc::new(Vec::new()))
    }

    /// Rewind to the first element of the snapshot
    pub fn restart(&mut self) {
        self.front = 0;
        self.back = self.entries.len();
    }

    /// Next element without advancing
    pub fn peek(&self) -> Option<FsAddr> {
        if self.front < self.back { self.entries.get(self.front).map(|e| e.addr) } else { None }
    }

    /// Number of elements in the snapshot, consumed or not
    pub fn snapshot_len(&self) -> usize {
        self.entries.len()
    }
}

impl Iterator for FsIterator {
    type Item = FsAddr;

    fn next(&mut self) -> Option<FsAddr> {
        let addr = self.peek()?;
        self.front += 1;
        Some(addr)
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let remaining = self.back - self.front;
        (remaining, Some(remaining))
    }
}

impl DoubleEndedIterator for FsIterator {
    fn next_back(&mut self) -> Option<FsAddr> {
        if self.front >= self.back {
            return None;
        }
        self.back -= 1;
        self.entries.get(self.back).map(|e| e.addr)
    }
}

impl ExactSizeIterator for FsIterator {}

/// Lazy filter of an `FsIterator` through a `Constraint`
pub struct FilteredIterator<'a> {
    base: FsIterator,
    constraint: &'a Constraint,
    heap: &'a FsHeap,
    ts: &'a TypeSystem,
}

impl<'a> FilteredIterator<'a> {
    pub fn new(
        base: FsIterator,
        constraint: &'a Constraint,
        heap: &'a FsHeap,
        ts: &'a TypeSystem,
    ) -> Self {
        Self { base, constraint, heap, ts }
    }

    pub fn restart(&mut self) {
        self.base.restart();
    }
}

impl Iterator for FilteredIterator<'_> {
    type Item = FsAddr;

    fn next(&mut self) -> Option<FsAddr> {
        let (constraint, heap, ts) = (self.constraint, self.heap, self.ts);
        self.base.find(|&addr| constraint.matches(heap, ts, addr))
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        (0, self.base.size_hint().1)
    }
}

impl DoubleEndedIterator for FilteredIterator<'_> {
    fn next_back(&mut self) -> Option<FsAddr> {
        let (constraint, heap, ts) = (self.constraint, self.heap, self.ts);
        self.base.rfind(|&addr| constraint.matches(heap, ts, addr))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::constraint::FeaturePath;

    struct Fixture {
        ts: TypeSystem,
        heap: FsHeap,
        token: TypeId,
        pos: FeatureId,
        repo: IndexRepository,
    }

    fn fixture(extra: Vec<IndexSpec>) -> Fixture {
        let mut ts = TypeSystem::new();
        let token = ts.add_type("Token", TypeId::ANNOTATION).unwrap();
        let pos = ts.add_feature(token, "pos", TypeId::STRING).unwrap();
        ts.freeze();

        let mut definitions = vec![IndexSpec::annotation_index().resolve(&ts).unwrap()];
        definitions.extend(extra.iter().map(|spec| spec.resolve(&ts).unwrap()));
        let repo = IndexRepository::new(Arc::from(definitions));
        Fixture { ts, heap: FsHeap::new(), token, pos, repo }
    }

    fn span(f: &mut Fixture, ty: TypeId, begin: i64, end: i64) -> FsAddr {
        let addr = f.heap.allocate(&f.ts, ty).unwrap();
        f.heap.set_slot(&f.ts, addr, FeatureId::ANNOTATION_BEGIN, begin.into()).unwrap();
        f.heap.set_slot(&f.ts, addr, FeatureId::ANNOTATION_END, end.into()).unwrap();
        addr
    }

    #[test]
    fn test_resolve_rejects_bad_specs() {
        let f = fixture(vec![]);
        let missing_type = IndexSpec::sorted("x", "Nope").resolve(&f.ts);
        assert!(matches!(missing_type, Err(WeftError::TypeNotFound { .. })));

        let missing_feature =
            IndexSpec::sorted("x", "Token").key("lemma", SortOrder::Ascending).resolve(&f.ts);
        assert!(matches!(missing_feature, Err(WeftError::FeatureNotFound { .. })));

        let foreign = IndexSpec::sorted("x", type_names::ANNOTATION)
            .key("Token:pos", SortOrder::Ascending)
            .resolve(&f.ts);
        assert!(matches!(foreign, Err(WeftError::WrongFeatureForType { .. })));

        let keyed_bag = IndexSpec::bag("x", "Token").key("pos", SortOrder::Ascending).resolve(&f.ts);
        assert!(matches!(keyed_bag, Err(WeftError::Configuration { .. })));

        let qualified = IndexSpec::sorted("x", "Token")
            .key("uima.tcas.Annotation:begin", SortOrder::Descending)
            .resolve(&f.ts)
            .unwrap();
        assert_eq!(qualified.keys()[0].feature, FeatureId::ANNOTATION_BEGIN);
    }

    #[test]
    fn test_sorted_order_with_ties_by_insertion() {
        let mut f = fixture(vec![]);
        let wide = span(&mut f, TypeId::ANNOTATION, 0, 10);
        let narrow = span(&mut f, TypeId::ANNOTATION, 0, 4);
        let later = span(&mut f, TypeId::ANNOTATION, 5, 9);
        let twin_a = span(&mut f, TypeId::ANNOTATION, 0, 4);

        for addr in [later, narrow, twin_a, wide] {
            assert!(f.repo.add(&f.heap, &f.ts, addr).unwrap());
        }

        let order: Vec<_> = f.repo.iterate(ANNOTATION_INDEX).unwrap().collect();
        assert_eq!(order, vec![wide, narrow, twin_a, later]);
    }

    #[test]
    fn test_add_and_remove_are_idempotent() {
        let mut f = fixture(vec![]);
        let a = span(&mut f, TypeId::ANNOTATION, 1, 2);

        assert!(f.repo.add(&f.heap, &f.ts, a).unwrap());
        assert!(!f.repo.add(&f.heap, &f.ts, a).unwrap());
        assert_eq!(f.repo.size(ANNOTATION_INDEX).unwrap(), 1);

        assert!(f.repo.remove(a));
        assert!(!f.repo.remove(a));
        assert!(f.repo.is_empty());
        assert_eq!(f.repo.size(ANNOTATION_INDEX).unwrap(), 0);
    }

    #[test]
    fn test_iterators_are_snapshots() {
        let mut f = fixture(vec![]);
        let a = span(&mut f, TypeId::ANNOTATION, 0, 1);
        let b = span(&mut f, TypeId::ANNOTATION, 2, 3);
        f.repo.add(&f.heap, &f.ts, a).unwrap();

        let mut before = f.repo.iterate(ANNOTATION_INDEX).unwrap();
        f.repo.add(&f.heap, &f.ts, b).unwrap();
        f.repo.remove(a);

        assert_eq!(before.len(), 1);
        assert_eq!(before.peek(), Some(a));
        assert_eq!(before.next(), Some(a));
        assert_eq!(before.next(), None);
        before.restart();
        assert_eq!(before.collect::<Vec<_>>(), vec![a]);

        assert_eq!(f.repo.iterate(ANNOTATION_INDEX).unwrap().collect::<Vec<_>>(), vec![b]);
    }

    #[test]
    fn test_double_ended_iteration() {
        let mut f = fixture(vec![]);
        let addrs: Vec<_> = (0..4).map(|i| span(&mut f, TypeId::ANNOTATION, i, i + 1)).collect();
        for &addr in &addrs {
            f.repo.add(&f.heap, &f.ts, addr).unwrap();
        }

        let mut it = f.repo.iterate(ANNOTATION_INDEX).unwrap();
        assert_eq!(it.next_back(), Some(addrs[3]));
        assert_eq!(it.next(), Some(addrs[0]));
        assert_eq!(it.len(), 2);
        assert_eq!(it.rev().collect::<Vec<_>>(), vec![addrs[2], addrs[1]]);
    }

    #[test]
    fn test_set_index_keeps_one_record_per_key() {
        let spec = IndexSpec::set("ByPos", "Token").key("pos", SortOrder::Ascending);
        let mut f = fixture(vec![spec]);
        let token = f.token;
        let pos = f.pos;
        let first = span(&mut f, token, 0, 1);
        let second = span(&mut f, token, 2, 3);
        f.heap.set_slot(&f.ts, first, pos, "NN".into()).unwrap();
        f.heap.set_slot(&f.ts, second, pos, "NN".into()).unwrap();

        f.repo.add(&f.heap, &f.ts, first).unwrap();
        f.repo.add(&f.heap, &f.ts, second).unwrap();

        assert_eq!(f.repo.size("ByPos").unwrap(), 1);
        assert_eq!(f.repo.size(ANNOTATION_INDEX).unwrap(), 2);

        // Removing the loser must not evict the winner
        f.repo.remove(second);
        assert_eq!(f.repo.iterate("ByPos").unwrap().collect::<Vec<_>>(), vec![first]);
    }

    #[test]
    fn test_bag_and_type_restricted_iteration() {
        let mut f = fixture(vec![IndexSpec::bag("Tokens", "Token")]);
        let token = f.token;
        let plain = span(&mut f, TypeId::ANNOTATION, 0, 1);
        let t1 = span(&mut f, token, 9, 10);
        let t2 = span(&mut f, token, 1, 2);
        for addr in [t1, plain, t2] {
            f.repo.add(&f.heap, &f.ts, addr).unwrap();
        }

        assert_eq!(f.repo.iterate("Tokens").unwrap().collect::<Vec<_>>(), vec![t1, t2]);
        assert_eq!(
            f.repo.iterate_type(&f.ts, ANNOTATION_INDEX, token).unwrap().collect::<Vec<_>>(),
            vec![t2, t1]
        );
        assert!(matches!(
            f.repo.iterate_type(&f.ts, "Tokens", TypeId::ANNOTATION),
            Err(WeftError::TypeMismatch { .. })
        ));
        assert!(matches!(f.repo.iterate("Missing"), Err(WeftError::IndexNotFound { .. })));
        assert_eq!(
            f.repo.all_indexed(&f.ts, TypeId::TOP).collect::<Vec<_>>(),
            vec![t1, plain, t2]
        );
    }

    #[test]
    fn test_records_without_covering_index_are_members() {
        let mut f = fixture(vec![]);
        let array = f.heap.allocate_array(&f.ts, crate::type_system::ArrayKind::Integer, 2).unwrap();
        assert!(f.repo.add(&f.heap, &f.ts, array).unwrap());
        assert!(f.repo.contains(array));
        assert_eq!(f.repo.size(ANNOTATION_INDEX).unwrap(), 0);
        assert_eq!(f.repo.all_indexed(&f.ts, TypeId::INTEGER_ARRAY).len(), 1);
    }

    #[test]
    fn test_detach_and_reattach_keep_tie_break() {
        let mut f = fixture(vec![]);
        let a = span(&mut f, TypeId::ANNOTATION, 3, 4);
        let b = span(&mut f, TypeId::ANNOTATION, 0, 4);
        f.repo.add(&f.heap, &f.ts, a).unwrap();
        f.repo.add(&f.heap, &f.ts, b).unwrap();
        assert!(f.repo.is_keyed_on(&f.ts, a, FeatureId::ANNOTATION_BEGIN));

        let seq = f.repo.detach(a).unwrap();
        f.heap.set_slot(&f.ts, a, FeatureId::ANNOTATION_BEGIN, 0.into()).unwrap();
        f.repo.reattach(&f.heap, &f.ts, a, seq).unwrap();

        // Same key as b, but a entered first
        assert_eq!(f.repo.iterate(ANNOTATION_INDEX).unwrap().collect::<Vec<_>>(), vec![a, b]);
    }

    #[test]
    fn test_filtered_iteration_preserves_order() {
        let mut f = fixture(vec![]);
        let addrs: Vec<_> = (0..6).map(|i| span(&mut f, TypeId::ANNOTATION, i, 10)).collect();
        for &addr in &addrs {
            f.repo.add(&f.heap, &f.ts, addr).unwrap();
        }

        let odd_begin = Constraint::or(
            [1, 3, 5]
                .into_iter()
                .map(|b| Constraint::eq(FeaturePath::single(FeatureId::ANNOTATION_BEGIN), b))
                .collect(),
        );
        let base = f.repo.iterate(ANNOTATION_INDEX).unwrap();
        let matched: Vec<_> = FilteredIterator::new(base, &odd_begin, &f.heap, &f.ts).collect();
        assert_eq!(matched, vec![addrs[1], addrs[3], addrs[5]]);

        let base = f.repo.iterate(ANNOTATION_INDEX).unwrap();
        let reversed: Vec<_> = FilteredIterator::new(base, &odd_begin, &f.heap, &f.ts).rev().collect();
        assert_eq!(reversed, vec![addrs[5], addrs[3], addrs[1]]);

        let base = f.repo.iterate(ANNOTATION_INDEX).unwrap();
        let mut both_ends = FilteredIterator::new(base, &odd_begin, &f.heap, &f.ts);
        assert_eq!(both_ends.next_back(), Some(addrs[5]));
        assert_eq!(both_ends.next(), Some(addrs[1]));
        assert_eq!(both_ends.next_back(), Some(addrs[3]));
        assert_eq!(both_ends.next(), None);

        let never = Constraint::or(vec![]);
        let base = f.repo.iterate(ANNOTATION_INDEX).unwrap();
        assert_eq!(FilteredIterator::new(base, &never, &f.heap, &f.ts).count(), 0);
    }

    #[test]
    fn test_clear_empties_indexes() {
        let mut f = fixture(vec![]);
        let a = span(&mut f, TypeId::ANNOTATION, 0, 1);
        f.repo.add(&f.heap, &f.ts, a).unwrap();
        let live = f.repo.iterate(ANNOTATION_INDEX).unwrap();

        f.repo.clear();
        assert!(f.repo.is_empty());
        assert_eq!(f.repo.index_sizes(), vec![(ANNOTATION_INDEX.to_string(), 0)]);
        assert_eq!(live.len(), 1);
    }
}
