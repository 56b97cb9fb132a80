//! Views and their subjects of analysis

use crate::error::{WeftError, WeftResult};
use crate::index_repository::{IndexDefinition, IndexRepository};
use std::fmt;
use std::sync::Arc;
use weft_types::FsAddr;

/// Handle to a view of one engine
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ViewId(u32);

impl ViewId {
    /// The view every engine is created with
    pub const BASE: ViewId = ViewId(0);

    pub(crate) fn from_index(index: usize) -> Self {
        Self(index as u32)
    }

    pub fn index(self) -> usize {
        self.0 as usize
    }
}

impl fmt::Display for ViewId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "view#{}", self.0)
    }
}

/// Payload a view analyzes
#[derive(Debug, Clone, PartialEq)]
pub enum SofaData {
    Text(String),
    Uri(String),
    Array(FsAddr),
}

/// Write-once subject of analysis
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Sofa {
    data: Option<SofaData>,
    mime_type: Option<String>,
}

impl Sofa {
    pub fn data(&self) -> Option<&SofaData> {
        self.data.as_ref()
    }

    pub fn mime_type(&self) -> Option<&str> {
        self.mime_type.as_deref()
    }

    pub fn is_set(&self) -> bool {
        self.data.is_some()
    }

    pub fn text(&self) -> Option<&str> {
        match &self.data {
            Some(SofaData::Text(text)) => Some(text),
            _ => None,
        }
    }

    pub fn uri(&self) -> Option<&str> {
        match &self.data {
            Some(SofaData::Uri(uri)) => Some(uri),
            _ => None,
        }
    }

    pub fn array(&self) -> Option<FsAddr> {
        match &self.data {
            Some(SofaData::Array(addr)) => Some(*addr),
            _ => None,
        }
    }
}

/// A named index namespace over the shared heap, with its sofa
#[derive(Debug, Clone)]
pub struct View {
    name: String,
    sofa_num: u32,
    sofa: Sofa,
    document_annotation: Option<FsAddr>,
    indexes: IndexRepository,
}

impl View {
    pub(crate) fn new(name: &str, sofa_num: u32, definitions: Arc<[IndexDefinition]>) -> Self {
        Self {
            name: name.to_string(),
            sofa_num,
            sofa: Sofa::default(),
            document_annotation: None,
            indexes: IndexRepository::new(definitions),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// 1-based position of the view in creation order
    pub fn sofa_num(&self) -> u32 {
        self.sofa_num
    }

    pub fn sofa(&self) -> &Sofa {
        &self.sofa
    }

    pub fn indexes(&self) -> &IndexRepository {
        &self.indexes
    }

    pub(crate) fn indexes_mut(&mut self) -> &mut IndexRepository {
        &mut self.indexes
    }

    /// The document annotation, if it has been created
    pub fn document_annotation(&self) -> Option<FsAddr> {
        self.document_annotation
    }

    pub(crate) fn set_document_annotation(&mut self, addr: FsAddr) {
        self.document_annotation = Some(addr);
    }

    pub(crate) fn ensure_sofa_unset(&self) -> WeftResult<()> {
        if self.sofa.is_set() {
            return Err(WeftError::SofaAlreadySet { view: self.name.clone() });
        }
        Ok(())
    }

    pub(crate) fn set_sofa(&mut self, data: SofaData, mime_type: Option<String>) -> WeftResult<()> {
        self.ensure_sofa_unset()?;
        self.sofa = Sofa { data: Some(data), mime_type };
        Ok(())
    }

    pub(crate) fn replace_indexes(&mut self, definitions: Arc<[IndexDefinition]>) {
        self.indexes = IndexRepository::new(definitions);
    }

    /// Forget the sofa and document annotation and empty every index
    pub(crate) fn clear(&mut self) {
        self.sofa = Sofa::default();
        self.document_annotation = None;
        self.indexes.clear();
    }
}

/// View names must be non-empty and free of whitespace
pub fn validate_view_name(name: &str) -> WeftResult<()> {
    let reason = if name.is_empty() {
        "name is empty"
    } else if name.chars().any(char::is_whitespace) {
        "name contains whitespace"
    } else {
        return Ok(());
    };
    Err(WeftError::InvalidViewName { name: name.to_string(), reason: reason.to_string() })
}
