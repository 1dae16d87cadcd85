//! Core library for anchor-based field extraction from document pages.
//!
//! This crate provides:
//! - Template model (anchors, marks and fields for one document layout)
//! - Anchor resolution over PDF text, OCR text and page bitmaps
//! - Candidate ranking for anchors whose pattern recurs on a page
//! - Field extraction relative to resolved anchors
//! - Page snapshots as a ready-made page data source

pub mod anchor;
pub mod error;
pub mod extract;
pub mod models;
pub mod page;

pub use anchor::{
    AnchorPosition, AnchorResolver, AnchorStatus, CandidateRanker, MatchSet, RankingPolicy,
};
pub use error::{AnchorError, DocAnchorError, ExtractionError, PageError, Result, TemplateError};
pub use extract::{FieldExtractor, FieldOutcome, FieldValue, PageExtraction};
pub use models::config::DocAnchorConfig;
pub use models::geometry::{PointF, Rect, RectangleF, SizeF};
pub use models::template::{Anchor, AnchorId, EntityType, Field, Mark, Template};
pub use page::{PageSnapshot, PageSource, TextSource};
