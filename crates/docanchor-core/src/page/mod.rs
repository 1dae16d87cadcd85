//! Page data: the interface the engine reads pages through, plus a
//! snapshot-backed implementation.

mod snapshot;
pub mod text;

pub use snapshot::PageSnapshot;

use image::DynamicImage;
use image::imageops::FilterType;
use serde::{Deserialize, Serialize};

use crate::error::PageError;
use crate::models::config::IMAGE_TO_PDF_RESOLUTION_RATIO;
use crate::models::geometry::{Rect, RectangleF};
use crate::models::template::{CharBox, EntityType};

/// Which character stream to read.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum TextSource {
    /// Character boxes embedded in the PDF.
    Pdf,
    /// Character boxes produced by OCR over the page bitmap.
    Ocr,
}

impl TextSource {
    /// Text source an entity of the given type reads from.
    pub fn for_type(entity_type: EntityType) -> Option<Self> {
        match entity_type {
            EntityType::PdfText => Some(TextSource::Pdf),
            EntityType::OcrText => Some(TextSource::Ocr),
            EntityType::ImageData => None,
        }
    }
}

/// Result type for page data operations.
pub type Result<T> = std::result::Result<T, PageError>;

/// Source of everything the engine needs to know about one page.
///
/// Implementations hold an immutable snapshot of the page: the bitmap has
/// already been rotated/deskewed, and all coordinates handed out are in PDF
/// space except bitmap pixels.
pub trait PageSource {
    /// Character boxes of the page, in stream order.
    fn char_boxes(&self, source: TextSource) -> Result<&[CharBox]>;

    /// The page bitmap.
    fn bitmap(&self) -> Result<&DynamicImage>;

    /// Recognize the text inside `rectangle` (PDF space).
    fn run_ocr(&self, bitmap: &DynamicImage, rectangle: RectangleF) -> Result<String>;

    /// Crop `rectangle` (pixel space) out of `bitmap` and resize by `scale`.
    fn crop_and_scale(&self, bitmap: &DynamicImage, rectangle: Rect, scale: f32) -> Result<DynamicImage> {
        crop_and_scale(bitmap, rectangle, scale)
    }

    /// Assemble the text of the characters inside `rectangle`.
    fn extract_text_by_rectangle(
        &self,
        char_boxes: &[CharBox],
        rectangle: RectangleF,
        auto_space_threshold: f32,
    ) -> String {
        text::text_in_rectangle(char_boxes, rectangle, auto_space_threshold)
    }

    /// Factor converting bitmap pixels to PDF units.
    fn image_to_pdf_ratio(&self) -> f32 {
        IMAGE_TO_PDF_RESOLUTION_RATIO
    }
}

/// Crop a pixel region and resize it by `scale`.
///
/// The region is clipped to the bitmap; a region entirely outside fails.
pub fn crop_and_scale(bitmap: &DynamicImage, rectangle: Rect, scale: f32) -> Result<DynamicImage> {
    let clipped = rectangle
        .clamp_to(bitmap.width(), bitmap.height())
        .ok_or_else(|| {
            PageError::Crop(format!(
                "region {:?} is outside the {}x{} bitmap",
                rectangle,
                bitmap.width(),
                bitmap.height()
            ))
        })?;
    if scale.is_nan() || scale <= 0.0 {
        return Err(PageError::Crop(format!("invalid scale {}", scale)));
    }

    let cropped = bitmap.crop_imm(
        clipped.x as u32,
        clipped.y as u32,
        clipped.width as u32,
        clipped.height as u32,
    );
    if scale == 1.0 {
        return Ok(cropped);
    }

    let width = ((clipped.width as f32 * scale).round() as u32).max(1);
    let height = ((clipped.height as f32 * scale).round() as u32).max(1);
    Ok(cropped.resize_exact(width, height, FilterType::Triangle))
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma};

    #[test]
    fn test_crop_and_scale() {
        let mut img = GrayImage::new(100, 50);
        img.put_pixel(20, 10, Luma([255]));
        let bitmap = DynamicImage::ImageLuma8(img);

        let cropped = crop_and_scale(&bitmap, Rect::new(20, 10, 40, 20), 1.0).unwrap();
        assert_eq!((cropped.width(), cropped.height()), (40, 20));
        assert_eq!(cropped.to_luma8().get_pixel(0, 0)[0], 255);

        let scaled = crop_and_scale(&bitmap, Rect::new(0, 0, 100, 50), 0.24).unwrap();
        assert_eq!((scaled.width(), scaled.height()), (24, 12));
    }

    #[test]
    fn test_crop_clips_and_rejects() {
        let bitmap = DynamicImage::ImageLuma8(GrayImage::new(10, 10));
        let clipped = crop_and_scale(&bitmap, Rect::new(5, 5, 20, 20), 1.0).unwrap();
        assert_eq!((clipped.width(), clipped.height()), (5, 5));

        assert!(matches!(
            crop_and_scale(&bitmap, Rect::new(20, 20, 5, 5), 1.0),
            Err(PageError::Crop(_))
        ));
        assert!(crop_and_scale(&bitmap, Rect::new(0, 0, 5, 5), 0.0).is_err());
    }

    #[test]
    fn test_text_source_for_type() {
        assert_eq!(TextSource::for_type(EntityType::PdfText), Some(TextSource::Pdf));
        assert_eq!(TextSource::for_type(EntityType::OcrText), Some(TextSource::Ocr));
        assert_eq!(TextSource::for_type(EntityType::ImageData), None);
    }
}
