//! The `Cas` engine
//!
//! `Cas` owns the type system, the record heap and the list of views. Every
//! view shares the heap and keeps its own sofa and index repository. Sofa
//! setters, document annotations and slot writes that move records within
//! their indexes are coordinated here.

use crate::config::CasConfig;
use crate::constants::indexes::ANNOTATION_INDEX;
use crate::constants::views::{DEFAULT_LANGUAGE, TEXT_MIME_TYPE};
use crate::constraint::Constraint;
use crate::cover_cache::{Cover, CoverCache, CoverCacheStats};
use crate::error::{WeftError, WeftResult};
use crate::heap::FsHeap;
use crate::index_repository::{FilteredIterator, FsIterator, IndexDefinition, IndexSpec};
use crate::type_system::{ArrayKind, FeatureId, TypeId, TypeSystem};
use crate::view::{SofaData, View, ViewId, validate_view_name};
use ahash::AHashMap;
use serde_json::{Map, Value};
use std::sync::{Arc, RwLock};
use tracing::{debug, info, instrument};
use weft_types::{FeatureValue, FsAddr};

/// Engine behind a coarse read-write lock, for callers sharing it across threads
pub type SharedCas = Arc<RwLock<Cas>>;

/// Snapshot of engine-wide counters
#[derive(Debug, Clone, PartialEq)]
pub struct CasStats {
    pub generation: u32,
    pub record_count: usize,
    pub view_count: usize,
    /// Distinct records indexed, summed over views
    pub indexed_records: usize,
    /// Index entries, summed over every index of every view
    pub index_entries: usize,
    pub cover_cache: CoverCacheStats,
}

/// The feature-structure store: one type system and heap shared by every view
#[derive(Debug)]
pub struct Cas {
    config: CasConfig,
    type_system: Arc<TypeSystem>,
    index_specs: Vec<IndexSpec>,
    index_definitions: Arc<[IndexDefinition]>,
    heap: FsHeap,
    views: Vec<View>,
    view_names: AHashMap<String, ViewId>,
    covers: CoverCache,
}

impl Default for Cas {
    fn default() -> Self {
        Self::new()
    }
}

impl Cas {
    /// Create an engine with default configuration and an open type system
    #[instrument]
    pub fn new() -> Self {
        info!("Creating new Weft engine");
        Self::build(CasConfig::default(), Arc::new(TypeSystem::new()))
    }

    #[instrument(skip(config))]
    pub fn with_config(config: CasConfig) -> WeftResult<Self> {
        config.validate()?;
        info!(
            heap_capacity = config.initial_heap_capacity,
            index_count = config.indexes.len(),
            "Creating Weft engine from configuration"
        );
        Ok(Self::build(config, Arc::new(TypeSystem::new())))
    }

    /// Create an engine over an existing type system.
    ///
    /// A frozen type system can be shared between engines; its index
    /// definitions are resolved immediately.
    #[instrument(skip(type_system, config))]
    pub fn with_type_system(type_system: Arc<TypeSystem>, config: CasConfig) -> WeftResult<Self> {
        config.validate()?;
        let mut cas = Self::build(config, type_system);
        if cas.type_system.is_frozen() {
            cas.install_indexes()?;
        }
        Ok(cas)
    }

    /// Create an engine wrapped for sharing between threads
    pub fn new_shared(config: CasConfig) -> WeftResult<SharedCas> {
        Ok(Arc::new(RwLock::new(Self::with_config(config)?)))
    }

    /// Run `f` under the shared engine's write lock.
    ///
    /// A lock poisoned by a panicking writer is reported as
    /// [`WeftError::LockPoisoned`] instead of propagating the panic.
    pub fn with_shared_mut<R>(
        shared: &SharedCas,
        f: impl FnOnce(&mut Cas) -> WeftResult<R>,
    ) -> WeftResult<R> {
        let mut guard = shared.write()?;
        f(&mut guard)
    }

    /// Run `f` under the shared engine's read lock
    pub fn with_shared<R>(shared: &SharedCas, f: impl FnOnce(&Cas) -> WeftResult<R>) -> WeftResult<R> {
        let guard = shared.read()?;
        f(&guard)
    }

    fn build(config: CasConfig, type_system: Arc<TypeSystem>) -> Self {
        let mut index_specs = vec![IndexSpec::annotation_index()];
        index_specs.extend(config.indexes.iter().cloned());

        let index_definitions: Arc<[IndexDefinition]> = Arc::from(Vec::new());
        let base = View::new(&config.base_view_name, 1, Arc::clone(&index_definitions));
        let mut view_names = AHashMap::new();
        view_names.insert(config.base_view_name.clone(), ViewId::BASE);

        let heap = FsHeap::with_capacity(config.initial_heap_capacity);
        let covers = CoverCache::new(heap.generation());

        Self {
            config,
            type_system,
            index_specs,
            index_definitions,
            heap,
            views: vec![base],
            view_names,
            covers,
        }
    }

    pub fn config(&self) -> &CasConfig {
        &self.config
    }

    // Type system and index setup

    pub fn type_system(&self) -> &TypeSystem {
        &self.type_system
    }

    /// Shared handle to the type system, for building further engines
    pub fn shared_type_system(&self) -> Arc<TypeSystem> {
        Arc::clone(&self.type_system)
    }

    /// Mutable access for type and feature registration before freeze
    pub fn type_system_mut(&mut self) -> WeftResult<&mut TypeSystem> {
        if self.type_system.is_frozen() {
            return Err(WeftError::frozen("modify the type system"));
        }
        Ok(Arc::make_mut(&mut self.type_system))
    }

    /// Declare an index; it is resolved when the type system is frozen
    pub fn define_index(&mut self, spec: IndexSpec) -> WeftResult<()> {
        if self.type_system.is_frozen() {
            return Err(WeftError::frozen(format!("define index {}", spec.label)));
        }
        if self.index_specs.iter().any(|existing| existing.label == spec.label) {
            return Err(WeftError::duplicate("index", spec.label));
        }
        self.index_specs.push(spec);
        Ok(())
    }

    /// Freeze the type system and build every view's indexes.
    ///
    /// If an index declaration does not resolve, the type system stays open.
    #[instrument(skip(self))]
    pub fn freeze_type_system(&mut self) -> WeftResult<()> {
        if self.type_system.is_frozen() {
            return Ok(());
        }
        let definitions = self.resolve_index_specs()?;
        Arc::make_mut(&mut self.type_system).freeze();
        self.replace_definitions(definitions);
        Ok(())
    }

    pub fn is_frozen(&self) -> bool {
        self.type_system.is_frozen()
    }

    fn resolve_index_specs(&self) -> WeftResult<Vec<IndexDefinition>> {
        self.index_specs.iter().map(|spec| spec.resolve(&self.type_system)).collect()
    }

    fn install_indexes(&mut self) -> WeftResult<()> {
        let definitions = self.resolve_index_specs()?;
        self.replace_definitions(definitions);
        Ok(())
    }

    fn replace_definitions(&mut self, definitions: Vec<IndexDefinition>) {
        self.index_definitions = Arc::from(definitions);
        for view in &mut self.views {
            view.replace_indexes(Arc::clone(&self.index_definitions));
        }
        info!(index_count = self.index_definitions.len(), "Index definitions installed");
    }

    pub fn index_definitions(&self) -> &[IndexDefinition] {
        &self.index_definitions
    }

    // Lifecycle

    pub fn generation(&self) -> u32 {
        self.heap.generation()
    }

    /// Drop every record, index entry and cover and start a new generation.
    ///
    /// The base view is recreated. Named views stay registered with their
    /// sofa unset and their indexes empty. The type system is untouched.
    #[instrument(skip(self))]
    pub fn reset(&mut self) {
        let records_dropped = self.heap.len();
        self.heap.reset();
        self.covers.clear(self.heap.generation());

        for view in self.views.iter_mut().skip(1) {
            view.clear();
        }
        if let Some(base) = self.views.first_mut() {
            *base = View::new(&self.config.base_view_name, 1, Arc::clone(&self.index_definitions));
        }

        info!(generation = self.heap.generation(), records_dropped, "Engine reset");
    }

    // Records

    /// Allocate a record of `ty` with every slot at its default
    pub fn create_fs(&mut self, ty: TypeId) -> WeftResult<FsAddr> {
        self.heap.allocate(&self.type_system, ty)
    }

    /// Allocate an annotation of `ty` spanning `begin..end`; it is not indexed
    pub fn create_annotation(&mut self, ty: TypeId, begin: i64, end: i64) -> WeftResult<FsAddr> {
        if !self.type_system.subsumes(TypeId::ANNOTATION, ty) {
            return Err(WeftError::type_mismatch(
                "create_annotation",
                crate::constants::type_names::ANNOTATION,
                self.type_system.type_name(ty),
            ));
        }
        let addr = self.create_fs(ty)?;
        self.heap.set_slot(&self.type_system, addr, FeatureId::ANNOTATION_BEGIN, begin.into())?;
        self.heap.set_slot(&self.type_system, addr, FeatureId::ANNOTATION_END, end.into())?;
        Ok(addr)
    }

    pub fn get_slot(&self, addr: FsAddr, feature: FeatureId) -> WeftResult<FeatureValue> {
        self.heap.get_slot(&self.type_system, addr, feature)
    }

    /// Write a slot, moving the record within its indexes if `feature` is a
    /// sort key and `auto_reindex` is on
    pub fn set_slot(&mut self, addr: FsAddr, feature: FeatureId, value: FeatureValue) -> WeftResult<()> {
        if self.config.auto_reindex {
            self.write_slot_reindexing(addr, feature, value)
        } else {
            self.heap.set_slot(&self.type_system, addr, feature, value)
        }
    }

    fn write_slot_reindexing(
        &mut self,
        addr: FsAddr,
        feature: FeatureId,
        value: FeatureValue,
    ) -> WeftResult<()> {
        let ts: &TypeSystem = &self.type_system;

        let mut detached = Vec::new();
        for (position, view) in self.views.iter_mut().enumerate() {
            if view.indexes().is_keyed_on(ts, addr, feature) {
                if let Some(seq) = view.indexes_mut().detach(addr) {
                    detached.push((position, seq));
                }
            }
        }

        // On failure the record goes back under its unchanged key
        let written = self.heap.set_slot(ts, addr, feature, value);
        for &(position, seq) in &detached {
            self.views[position].indexes_mut().reattach(&self.heap, ts, addr, seq)?;
        }

        if written.is_ok() && !detached.is_empty() {
            debug!(
                addr = %addr,
                feature = ts.feature_name(feature),
                views = detached.len(),
                "Reindexed record after key update"
            );
        }
        written
    }

    pub fn type_of(&self, addr: FsAddr) -> WeftResult<TypeId> {
        self.heap.type_of(addr)
    }

    /// Number of records allocated in the current generation
    pub fn heap_len(&self) -> usize {
        self.heap.len()
    }

    // Arrays

    pub fn allocate_array(&mut self, kind: ArrayKind, length: usize) -> WeftResult<FsAddr> {
        self.heap.allocate_array(&self.type_system, kind, length)
    }

    pub fn empty_array(&mut self, kind: ArrayKind) -> WeftResult<FsAddr> {
        self.heap.empty_array(&self.type_system, kind)
    }

    pub fn array_len(&self, addr: FsAddr) -> WeftResult<usize> {
        self.heap.array_len(addr)
    }

    pub fn array_get(&self, addr: FsAddr, index: usize) -> WeftResult<FeatureValue> {
        self.heap.array_get(addr, index)
    }

    pub fn array_set(&mut self, addr: FsAddr, index: usize, value: FeatureValue) -> WeftResult<()> {
        self.heap.array_set(&self.type_system, addr, index, value)
    }

    pub fn array_elements(&self, addr: FsAddr) -> WeftResult<Vec<FeatureValue>> {
        self.heap.array_elements(addr)
    }

    // Indexes

    fn view_position(&self, view: ViewId) -> WeftResult<usize> {
        if view.index() < self.views.len() {
            Ok(view.index())
        } else {
            Err(WeftError::ViewNotFound { name: view.to_string() })
        }
    }

    /// Index `addr` in `view`; a no-op if it is already indexed there
    pub fn add_to_indexes(&mut self, view: ViewId, addr: FsAddr) -> WeftResult<()> {
        let position = self.view_position(view)?;
        self.views[position].indexes_mut().add(&self.heap, &self.type_system, addr)?;
        Ok(())
    }

    /// Remove `addr` from `view`'s indexes; a no-op if it is not indexed there
    pub fn remove_from_indexes(&mut self, view: ViewId, addr: FsAddr) -> WeftResult<()> {
        let position = self.view_position(view)?;
        self.heap.type_of(addr)?;
        self.views[position].indexes_mut().remove(addr);
        Ok(())
    }

    pub fn iterate(&self, view: ViewId, label: &str) -> WeftResult<FsIterator> {
        self.view(view)?.indexes().iterate(label)
    }

    /// Iterator over the built-in annotation index
    pub fn annotation_iterator(&self, view: ViewId) -> WeftResult<FsIterator> {
        self.iterate(view, ANNOTATION_INDEX)
    }

    /// Iterator over the records of `ty` (or a subtype) in one index
    pub fn iterate_type(&self, view: ViewId, label: &str, ty: TypeId) -> WeftResult<FsIterator> {
        self.view(view)?.indexes().iterate_type(&self.type_system, label, ty)
    }

    /// Every record of `ty` indexed in `view`, in insertion order
    pub fn all_indexed(&self, view: ViewId, ty: TypeId) -> WeftResult<FsIterator> {
        Ok(self.view(view)?.indexes().all_indexed(&self.type_system, ty))
    }

    /// Lazily keep the elements of `base` that satisfy `constraint`
    pub fn filtered_iterate<'a>(
        &'a self,
        base: FsIterator,
        constraint: &'a Constraint,
    ) -> FilteredIterator<'a> {
        FilteredIterator::new(base, constraint, &self.heap, &self.type_system)
    }

    pub fn index_size(&self, view: ViewId, label: &str) -> WeftResult<usize> {
        self.view(view)?.indexes().size(label)
    }

    pub fn contains(&self, view: ViewId, addr: FsAddr) -> WeftResult<bool> {
        Ok(self.view(view)?.indexes().contains(addr))
    }

    // Views

    pub fn base_view(&self) -> ViewId {
        ViewId::BASE
    }

    #[instrument(skip(self))]
    pub fn create_view(&mut self, name: &str) -> WeftResult<ViewId> {
        validate_view_name(name)?;
        if self.view_names.contains_key(name) {
            return Err(WeftError::DuplicateViewName { name: name.to_string() });
        }

        let id = ViewId::from_index(self.views.len());
        let sofa_num = self.views.len() as u32 + 1;
        self.views.push(View::new(name, sofa_num, Arc::clone(&self.index_definitions)));
        self.view_names.insert(name.to_string(), id);
        info!(view = name, sofa_num, "Created view");
        Ok(id)
    }

    /// Look up a view by name
    pub fn view_id(&self, name: &str) -> WeftResult<ViewId> {
        self.view_names
            .get(name)
            .copied()
            .ok_or_else(|| WeftError::ViewNotFound { name: name.to_string() })
    }

    pub fn view(&self, view: ViewId) -> WeftResult<&View> {
        let position = self.view_position(view)?;
        Ok(&self.views[position])
    }

    /// Every view in creation order
    pub fn views(&self) -> impl Iterator<Item = (ViewId, &View)> {
        self.views.iter().enumerate().map(|(i, view)| (ViewId::from_index(i), view))
    }

    pub fn view_count(&self) -> usize {
        self.views.len()
    }

    // Sofa

    fn require_frozen(&self, operation: &str) -> WeftResult<()> {
        if self.type_system.is_frozen() {
            Ok(())
        } else {
            Err(WeftError::not_frozen(operation))
        }
    }

    /// Set the view's text sofa with MIME type `text/plain`
    #[instrument(skip(self, text))]
    pub fn set_document_text(&mut self, view: ViewId, text: &str) -> WeftResult<()> {
        self.set_sofa_data_string(view, text, TEXT_MIME_TYPE)
    }

    /// Set the view's text sofa and stretch its document annotation over it
    #[instrument(skip(self, text))]
    pub fn set_sofa_data_string(&mut self, view: ViewId, text: &str, mime_type: &str) -> WeftResult<()> {
        self.require_frozen("set sofa text")?;
        let position = self.view_position(view)?;
        self.views[position].ensure_sofa_unset()?;

        let document = self.document_annotation(view)?;
        self.views[position]
            .set_sofa(SofaData::Text(text.to_string()), Some(mime_type.to_string()))?;

        let length = text.chars().count() as i64;
        self.write_slot_reindexing(document, FeatureId::ANNOTATION_END, length.into())?;
        info!(view = self.views[position].name(), length, "Document text set");
        Ok(())
    }

    #[instrument(skip(self))]
    pub fn set_sofa_data_uri(&mut self, view: ViewId, uri: &str, mime_type: &str) -> WeftResult<()> {
        self.require_frozen("set sofa uri")?;
        let position = self.view_position(view)?;
        self.views[position].set_sofa(SofaData::Uri(uri.to_string()), Some(mime_type.to_string()))
    }

    /// Use an array record as the view's sofa
    #[instrument(skip(self))]
    pub fn set_sofa_data_array(&mut self, view: ViewId, array: FsAddr, mime_type: &str) -> WeftResult<()> {
        self.require_frozen("set sofa array")?;
        let position = self.view_position(view)?;
        let ty = self.heap.type_of(array)?;
        if !self.type_system.is_array(ty) {
            return Err(WeftError::type_mismatch(
                "array sofa",
                "array type",
                self.type_system.type_name(ty),
            ));
        }
        self.views[position].set_sofa(SofaData::Array(array), Some(mime_type.to_string()))
    }

    pub fn document_text(&self, view: ViewId) -> WeftResult<Option<&str>> {
        Ok(self.view(view)?.sofa().text())
    }

    pub fn sofa_data_uri(&self, view: ViewId) -> WeftResult<Option<&str>> {
        Ok(self.view(view)?.sofa().uri())
    }

    pub fn sofa_data_array(&self, view: ViewId) -> WeftResult<Option<FsAddr>> {
        Ok(self.view(view)?.sofa().array())
    }

    pub fn sofa_mime_type(&self, view: ViewId) -> WeftResult<Option<&str>> {
        Ok(self.view(view)?.sofa().mime_type())
    }

    /// The view's document annotation, created and indexed on first request
    pub fn document_annotation(&mut self, view: ViewId) -> WeftResult<FsAddr> {
        let position = self.view_position(view)?;
        if let Some(addr) = self.views[position].document_annotation() {
            return Ok(addr);
        }

        let length = self.views[position].sofa().text().map_or(0, |text| text.chars().count());
        let addr = self.create_fs(TypeId::DOCUMENT_ANNOTATION)?;
        let ts: &TypeSystem = &self.type_system;
        self.heap.set_slot(ts, addr, FeatureId::ANNOTATION_END, (length as i64).into())?;
        self.heap.set_slot(ts, addr, FeatureId::DOCUMENT_LANGUAGE, DEFAULT_LANGUAGE.into())?;

        let target = &mut self.views[position];
        target.indexes_mut().add(&self.heap, ts, addr)?;
        target.set_document_annotation(addr);
        debug!(view = target.name(), addr = %addr, "Created document annotation");
        Ok(addr)
    }

    /// Language of the view's document, `x-unspecified` until set
    pub fn document_language(&self, view: ViewId) -> WeftResult<String> {
        let Some(document) = self.view(view)?.document_annotation() else {
            return Ok(DEFAULT_LANGUAGE.to_string());
        };
        let language = self.get_slot(document, FeatureId::DOCUMENT_LANGUAGE)?;
        Ok(language.as_str().unwrap_or(DEFAULT_LANGUAGE).to_string())
    }

    pub fn set_document_language(&mut self, view: ViewId, language: &str) -> WeftResult<()> {
        let document = self.document_annotation(view)?;
        self.set_slot(document, FeatureId::DOCUMENT_LANGUAGE, language.into())
    }

    /// Text of `view`'s sofa between the annotation's `begin` and `end`.
    ///
    /// Offsets count characters and are clamped to the text; a view without
    /// a text sofa yields an empty string.
    pub fn covered_text(&self, view: ViewId, annotation: FsAddr) -> WeftResult<String> {
        let text = self.view(view)?.sofa().text().unwrap_or("");
        let begin = self.span_offset(annotation, FeatureId::ANNOTATION_BEGIN)?;
        let end = self.span_offset(annotation, FeatureId::ANNOTATION_END)?;
        Ok(text.chars().skip(begin).take(end.saturating_sub(begin)).collect())
    }

    fn span_offset(&self, annotation: FsAddr, feature: FeatureId) -> WeftResult<usize> {
        let value = self.get_slot(annotation, feature)?;
        let offset = value.as_integer().ok_or_else(|| {
            WeftError::type_mismatch(self.type_system.feature_name(feature), "Integer", value.kind_name())
        })?;
        Ok(usize::try_from(offset).unwrap_or(0))
    }

    // Covers

    /// The cover of type `C` for `addr`, the same `Arc` on every call within a generation
    pub fn cover<C: Cover>(&mut self, addr: FsAddr) -> WeftResult<Arc<C>> {
        let ty = self.heap.type_of(addr)?;
        if let Some(cover) = self.covers.lookup::<C>(addr) {
            return Ok(cover);
        }
        let cover = Arc::new(C::from_fs(addr, ty));
        self.covers.bind(addr, Arc::clone(&cover))?;
        Ok(cover)
    }

    // Introspection

    pub fn stats(&self) -> CasStats {
        CasStats {
            generation: self.heap.generation(),
            record_count: self.heap.len(),
            view_count: self.views.len(),
            indexed_records: self.views.iter().map(|v| v.indexes().len()).sum(),
            index_entries: self
                .views
                .iter()
                .flat_map(|v| v.indexes().index_sizes())
                .map(|(_, size)| size)
                .sum(),
            cover_cache: self.covers.stats(),
        }
    }

    /// Read-only JSON view of one record, keyed by feature name
    pub fn fs_snapshot(&self, addr: FsAddr) -> WeftResult<Value> {
        let ts: &TypeSystem = &self.type_system;
        let record = self.heap.record(addr)?;
        let ty = record.fs_type();

        let mut map = Map::new();
        map.insert("_type".to_string(), Value::from(ts.type_name(ty)));
        map.insert("_addr".to_string(), Value::from(addr.to_string()));

        if record.is_array() {
            let elements = self.heap.array_elements(addr)?;
            map.insert("elements".to_string(), elements.iter().map(Value::from).collect());
        } else {
            for &feature in ts.features(ty) {
                let value = self.heap.get_slot(ts, addr, feature)?;
                map.insert(ts.feature_name(feature).to_string(), Value::from(&value));
            }
        }
        Ok(Value::Object(map))
    }
}
