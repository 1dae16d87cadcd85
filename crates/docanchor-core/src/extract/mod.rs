//! Field extraction module.

mod extractor;

pub use extractor::FieldExtractor;

use image::DynamicImage;

use crate::error::ExtractionError;
use crate::models::template::EntityType;

/// Result type for extraction operations.
pub type Result<T> = std::result::Result<T, ExtractionError>;

/// Value read for one field.
#[derive(Debug, Clone, PartialEq)]
pub enum FieldValue {
    /// The field has no rectangle.
    Empty,
    /// Normalized text.
    Text(String),
    /// Cropped bitmap region, scaled to PDF units.
    Image(DynamicImage),
}

impl FieldValue {
    /// Whether the value carries nothing usable.
    pub fn is_empty(&self) -> bool {
        match self {
            FieldValue::Empty => true,
            FieldValue::Text(text) => text.is_empty(),
            FieldValue::Image(image) => image.width() == 0 || image.height() == 0,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            FieldValue::Text(text) => Some(text),
            _ => None,
        }
    }

    pub fn as_image(&self) -> Option<&DynamicImage> {
        match self {
            FieldValue::Image(image) => Some(image),
            _ => None,
        }
    }
}

/// Outcome of extracting one field of a page.
#[derive(Debug)]
pub struct FieldOutcome {
    pub name: String,
    pub field_type: EntityType,
    pub result: Result<FieldValue>,
}

impl FieldOutcome {
    /// The value, if extraction succeeded.
    pub fn value(&self) -> Option<&FieldValue> {
        self.result.as_ref().ok()
    }

    pub fn error(&self) -> Option<&ExtractionError> {
        self.result.as_ref().err()
    }
}

/// Outcomes for every field of a template on one page, in template order.
#[derive(Debug)]
pub struct PageExtraction {
    pub template: String,
    pub fields: Vec<FieldOutcome>,
}

impl PageExtraction {
    /// First non-empty value among the fields called `name`.
    pub fn value(&self, name: &str) -> Option<&FieldValue> {
        self.fields
            .iter()
            .filter(|f| f.name == name)
            .filter_map(FieldOutcome::value)
            .find(|v| !v.is_empty())
    }

    /// Number of fields that produced a non-empty value.
    pub fn extracted_count(&self) -> usize {
        self.fields
            .iter()
            .filter(|f| f.value().is_some_and(|v| !v.is_empty()))
            .count()
    }

    /// Fields whose extraction failed for reasons other than a missing or
    /// unset anchor.
    pub fn failures(&self) -> impl Iterator<Item = &FieldOutcome> {
        self.fields
            .iter()
            .filter(|f| f.error().is_some_and(|e| !e.is_recoverable()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::PageError;

    fn outcome(name: &str, result: Result<FieldValue>) -> FieldOutcome {
        FieldOutcome {
            name: name.to_string(),
            field_type: EntityType::PdfText,
            result,
        }
    }

    #[test]
    fn test_page_extraction_lookup() {
        let page = PageExtraction {
            template: "t".to_string(),
            fields: vec![
                outcome(
                    "total",
                    Err(ExtractionError::AnchorNotFound {
                        field: "total".to_string(),
                        anchor_id: 1,
                    }),
                ),
                outcome("total", Ok(FieldValue::Text(String::new()))),
                outcome("total", Ok(FieldValue::Text("12.50".to_string()))),
                outcome(
                    "date",
                    Err(ExtractionError::Failure {
                        field: "date".to_string(),
                        source: PageError::Ocr("timeout".to_string()),
                    }),
                ),
            ],
        };

        assert_eq!(page.value("total"), Some(&FieldValue::Text("12.50".to_string())));
        assert_eq!(page.value("date"), None);
        assert_eq!(page.extracted_count(), 1);
        assert_eq!(page.failures().count(), 1);
    }

    #[test]
    fn test_field_value_accessors() {
        assert!(FieldValue::Empty.is_empty());
        assert_eq!(FieldValue::Text("a".to_string()).as_text(), Some("a"));
        let image = FieldValue::Image(DynamicImage::new_luma8(2, 2));
        assert!(!image.is_empty());
        assert!(image.as_text().is_none());
        assert!(image.as_image().is_some());
    }
}
