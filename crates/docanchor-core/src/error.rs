//! Error types for the docanchor-core library.

use thiserror::Error;

use crate::models::template::AnchorId;
use crate::page::TextSource;

/// Main error type for the docanchor library.
#[derive(Error, Debug)]
pub enum DocAnchorError {
    /// Template is malformed or inconsistent.
    #[error("invalid template: {0}")]
    Template(#[from] TemplateError),

    /// Anchor resolution error.
    #[error("anchor error: {0}")]
    Anchor(#[from] AnchorError),

    /// Field extraction error.
    #[error("extraction error: {0}")]
    Extraction(#[from] ExtractionError),

    /// Page data provider error.
    #[error("page error: {0}")]
    Page(#[from] PageError),

    /// Image processing error.
    #[error("image error: {0}")]
    Image(#[from] image::ImageError),

    /// JSON (de)serialization error.
    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    /// I/O error.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Configuration error.
    #[error("configuration error: {0}")]
    Config(String),
}

/// Authoring defects detected when a template is loaded.
///
/// These abort processing of the whole template; they never depend on page
/// content.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum TemplateError {
    /// Two anchors share an id.
    #[error("duplicate anchor id {0}")]
    DuplicateAnchorId(AnchorId),

    /// Something refers to an anchor id that is not defined.
    #[error("{referrer} refers to undefined anchor {anchor_id}")]
    UnknownAnchor { referrer: String, anchor_id: AnchorId },

    /// The parent chain starting at the first id loops back on itself.
    #[error("cyclic parent chain: {}", format_chain(.0))]
    ParentCycle(Vec<AnchorId>),

    /// The template document could not be parsed.
    #[error("failed to parse template: {0}")]
    Parse(String),
}

fn format_chain(chain: &[AnchorId]) -> String {
    chain
        .iter()
        .map(|id| id.to_string())
        .collect::<Vec<_>>()
        .join(" -> ")
}

/// Outcome of an anchor search that did not produce candidates.
#[derive(Error, Debug)]
pub enum AnchorError {
    /// No anchor with this id exists in the template.
    #[error("anchor {0} does not exist")]
    Unknown(AnchorId),

    /// The anchor or one of its ancestors has no defining pattern yet.
    #[error("anchor {0} is not set")]
    NotSet(AnchorId),

    /// The search completed but nothing satisfied the tolerances.
    #[error("anchor {0} not found")]
    NotFound(AnchorId),

    /// The page data provider failed during the search.
    #[error("page data unavailable: {0}")]
    Page(#[from] PageError),
}

/// Errors raised by a page data provider.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum PageError {
    /// Character boxes for the requested source are not available.
    #[error("no {0:?} character boxes for this page")]
    CharBoxesUnavailable(TextSource),

    /// The page bitmap could not be produced.
    #[error("page bitmap unavailable: {0}")]
    BitmapUnavailable(String),

    /// OCR failed or is not available.
    #[error("OCR failed: {0}")]
    Ocr(String),

    /// Cropping or scaling a bitmap region failed.
    #[error("failed to crop bitmap: {0}")]
    Crop(String),
}

/// Errors related to extracting a single field.
#[derive(Error, Debug)]
pub enum ExtractionError {
    /// An anchor the field depends on is not configured.
    #[error("field {field}: anchor {anchor_id} is not set")]
    AnchorNotSet { field: String, anchor_id: AnchorId },

    /// An anchor the field depends on was not found on the page.
    #[error("field {field}: anchor {anchor_id} not found")]
    AnchorNotFound { field: String, anchor_id: AnchorId },

    /// The field refers to an anchor that does not exist.
    #[error("field {field}: anchor {anchor_id} does not exist")]
    UnknownAnchor { field: String, anchor_id: AnchorId },

    /// The page data provider failed.
    #[error("field {field}: {source}")]
    Failure {
        field: String,
        #[source]
        source: PageError,
    },
}

impl ExtractionError {
    /// Wrap an anchor resolution error for the given field.
    pub fn from_anchor(field: &str, error: AnchorError) -> Self {
        let field = field.to_string();
        match error {
            AnchorError::Unknown(anchor_id) => Self::UnknownAnchor { field, anchor_id },
            AnchorError::NotSet(anchor_id) => Self::AnchorNotSet { field, anchor_id },
            AnchorError::NotFound(anchor_id) => Self::AnchorNotFound { field, anchor_id },
            AnchorError::Page(source) => Self::Failure { field, source },
        }
    }

    /// Whether the outcome only means "value absent on this page".
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            Self::AnchorNotSet { .. } | Self::AnchorNotFound { .. }
        )
    }
}

/// Result type for the docanchor library.
pub type Result<T> = std::result::Result<T, DocAnchorError>;
