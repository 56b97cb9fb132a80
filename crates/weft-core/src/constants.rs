/// Core system constants used throughout the Weft engine
///
/// This module centralizes the built-in names and default sizes so the type
/// system, the views and the configuration layer agree on them.
/// Names of the built-in types registered by every type system
pub mod type_names {
    /// Root of the type hierarchy
    pub const TOP: &str = "uima.cas.TOP";

    pub const INTEGER: &str = "uima.cas.Integer";
    pub const FLOAT: &str = "uima.cas.Float";
    pub const BOOLEAN: &str = "uima.cas.Boolean";
    pub const STRING: &str = "uima.cas.String";

    pub const INTEGER_ARRAY: &str = "uima.cas.IntegerArray";
    pub const FLOAT_ARRAY: &str = "uima.cas.FloatArray";
    pub const STRING_ARRAY: &str = "uima.cas.StringArray";
    pub const FS_ARRAY: &str = "uima.cas.FSArray";

    /// Span over the subject of analysis
    pub const ANNOTATION: &str = "uima.tcas.Annotation";
    /// Per-view singleton annotation covering the whole document
    pub const DOCUMENT_ANNOTATION: &str = "uima.tcas.DocumentAnnotation";
}

/// Names of the built-in features
pub mod feature_names {
    pub const BEGIN: &str = "begin";
    pub const END: &str = "end";
    pub const LANGUAGE: &str = "language";
}

/// View and sofa defaults
pub mod views {
    /// Name of the view every engine starts with
    pub const BASE_VIEW_NAME: &str = "_InitialView";

    /// Language reported before one is set
    pub const DEFAULT_LANGUAGE: &str = "x-unspecified";

    /// MIME type recorded by `set_document_text`
    pub const TEXT_MIME_TYPE: &str = "text/plain";
}

/// Index repository defaults
pub mod indexes {
    /// Label of the built-in annotation index
    pub const ANNOTATION_INDEX: &str = "AnnotationIndex";
}

/// Heap sizing
pub mod heap {
    /// Default capacity hint for the record arena
    pub const DEFAULT_CAPACITY: usize = 1024;
}

/// Environment variables read by `CasConfig::from_env`
pub mod env {
    pub const HEAP_CAPACITY: &str = "WEFT_HEAP_CAPACITY";
    pub const BASE_VIEW: &str = "WEFT_BASE_VIEW";
    pub const AUTO_REINDEX: &str = "WEFT_AUTO_REINDEX";
}
