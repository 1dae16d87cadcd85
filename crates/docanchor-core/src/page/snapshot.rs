//! Page data captured ahead of time: character boxes and a bitmap on disk.

use std::path::{Path, PathBuf};

use image::DynamicImage;
use serde::Deserialize;
use tracing::{debug, warn};

use super::{PageSource, Result, TextSource, text};
use crate::error::PageError;
use crate::models::config::IMAGE_TO_PDF_RESOLUTION_RATIO;
use crate::models::geometry::RectangleF;
use crate::models::template::{CharBox, PageRotation};

/// On-disk layout of a snapshot.
#[derive(Debug, Deserialize)]
struct SnapshotFile {
    #[serde(default)]
    pdf_char_boxes: Option<Vec<CharBox>>,
    #[serde(default)]
    ocr_char_boxes: Option<Vec<CharBox>>,
    /// Bitmap path, relative to the snapshot file.
    #[serde(default)]
    bitmap: Option<PathBuf>,
    #[serde(default)]
    ocr_space_threshold: Option<f32>,
}

/// A page whose data was produced by an external renderer and OCR engine.
///
/// OCR requests are answered from the recorded OCR character boxes, so the
/// snapshot never runs recognition itself.
#[derive(Debug, Clone)]
pub struct PageSnapshot {
    pdf_char_boxes: Option<Vec<CharBox>>,
    ocr_char_boxes: Option<Vec<CharBox>>,
    bitmap: Option<DynamicImage>,
    ocr_space_threshold: f32,
    image_to_pdf_ratio: f32,
}

impl Default for PageSnapshot {
    fn default() -> Self {
        Self::new()
    }
}

impl PageSnapshot {
    /// Create an empty snapshot.
    pub fn new() -> Self {
        Self {
            pdf_char_boxes: None,
            ocr_char_boxes: None,
            bitmap: None,
            ocr_space_threshold: 6.0,
            image_to_pdf_ratio: IMAGE_TO_PDF_RESOLUTION_RATIO,
        }
    }

    /// Set the PDF character stream.
    pub fn with_pdf_char_boxes(mut self, boxes: Vec<CharBox>) -> Self {
        self.pdf_char_boxes = Some(boxes);
        self
    }

    /// Set the OCR character boxes.
    pub fn with_ocr_char_boxes(mut self, boxes: Vec<CharBox>) -> Self {
        self.ocr_char_boxes = Some(boxes);
        self
    }

    /// Set the page bitmap.
    pub fn with_bitmap(mut self, bitmap: DynamicImage) -> Self {
        self.bitmap = Some(bitmap);
        self
    }

    /// Set the pixel to PDF unit factor.
    pub fn with_image_to_pdf_ratio(mut self, ratio: f32) -> Self {
        self.image_to_pdf_ratio = ratio;
        self
    }

    /// Set the gap above which OCR text gets an inferred space.
    pub fn with_ocr_space_threshold(mut self, threshold: f32) -> Self {
        self.ocr_space_threshold = threshold;
        self
    }

    /// Load a snapshot JSON file and the bitmap it points to.
    pub fn from_file(path: &Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let file: SnapshotFile = serde_json::from_str(&content)?;

        let mut snapshot = Self::new();
        snapshot.pdf_char_boxes = file.pdf_char_boxes;
        snapshot.ocr_char_boxes = file.ocr_char_boxes;
        if let Some(threshold) = file.ocr_space_threshold {
            snapshot.ocr_space_threshold = threshold;
        }

        if let Some(bitmap_path) = file.bitmap {
            let resolved = match path.parent() {
                Some(dir) if bitmap_path.is_relative() => dir.join(&bitmap_path),
                _ => bitmap_path,
            };
            let bitmap = image::open(&resolved)?;
            debug!(
                "Loaded page bitmap {} ({}x{})",
                resolved.display(),
                bitmap.width(),
                bitmap.height()
            );
            snapshot.bitmap = Some(bitmap);
        }

        debug!(
            "Loaded page snapshot {}: {} PDF chars, {} OCR chars",
            path.display(),
            snapshot.pdf_char_boxes.as_ref().map_or(0, Vec::len),
            snapshot.ocr_char_boxes.as_ref().map_or(0, Vec::len)
        );

        Ok(snapshot)
    }

    /// Rotate the bitmap clockwise as the template requests.
    ///
    /// Character boxes are expected to be recorded in the rotated page space
    /// already. Automatic orientation detection belongs to whatever produced
    /// the snapshot and is left alone here.
    pub fn apply_rotation(&mut self, rotation: PageRotation) {
        let Some(bitmap) = self.bitmap.take() else {
            return;
        };
        let rotated = match rotation {
            PageRotation::None => bitmap,
            PageRotation::Clockwise90 => bitmap.rotate90(),
            PageRotation::Clockwise180 => bitmap.rotate180(),
            PageRotation::Clockwise270 => bitmap.rotate270(),
            PageRotation::AutoDetection => {
                warn!("Automatic rotation detection is not performed on snapshots");
                bitmap
            }
        };
        self.bitmap = Some(rotated);
    }
}

impl PageSource for PageSnapshot {
    fn char_boxes(&self, source: TextSource) -> Result<&[CharBox]> {
        let boxes = match source {
            TextSource::Pdf => self.pdf_char_boxes.as_deref(),
            TextSource::Ocr => self.ocr_char_boxes.as_deref(),
        };
        boxes.ok_or(PageError::CharBoxesUnavailable(source))
    }

    fn bitmap(&self) -> Result<&DynamicImage> {
        self.bitmap
            .as_ref()
            .ok_or_else(|| PageError::BitmapUnavailable("snapshot has no bitmap".to_string()))
    }

    fn run_ocr(&self, _bitmap: &DynamicImage, rectangle: RectangleF) -> Result<String> {
        let boxes = self
            .ocr_char_boxes
            .as_deref()
            .ok_or_else(|| PageError::Ocr("no OCR data recorded for this page".to_string()))?;
        Ok(text::text_in_rectangle(
            boxes,
            rectangle,
            self.ocr_space_threshold,
        ))
    }

    fn image_to_pdf_ratio(&self) -> f32 {
        self.image_to_pdf_ratio
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{GrayImage, Luma};

    #[test]
    fn test_from_file_resolves_relative_bitmap() {
        let dir = tempfile::tempdir().unwrap();
        let mut img = GrayImage::new(4, 2);
        img.put_pixel(3, 1, Luma([9]));
        img.save(dir.path().join("page.png")).unwrap();

        let json = r#"{
            "pdf_char_boxes": [{"char": "A", "rectangle": {"x": 1.0, "y": 1.0, "width": 2.0, "height": 2.0}}],
            "bitmap": "page.png"
        }"#;
        let path = dir.path().join("page.json");
        std::fs::write(&path, json).unwrap();

        let snapshot = PageSnapshot::from_file(&path).unwrap();
        assert_eq!(snapshot.char_boxes(TextSource::Pdf).unwrap().len(), 1);
        assert_eq!(
            snapshot.char_boxes(TextSource::Ocr).unwrap_err(),
            PageError::CharBoxesUnavailable(TextSource::Ocr)
        );
        let bitmap = snapshot.bitmap().unwrap();
        assert_eq!(bitmap.to_luma8().get_pixel(3, 1)[0], 9);
    }

    #[test]
    fn test_ocr_without_data_fails() {
        let snapshot = PageSnapshot::new().with_bitmap(DynamicImage::new_luma8(2, 2));
        let bitmap = snapshot.bitmap().unwrap().clone();
        assert!(matches!(
            snapshot.run_ocr(&bitmap, RectangleF::new(0.0, 0.0, 1.0, 1.0)),
            Err(PageError::Ocr(_))
        ));
    }

    #[test]
    fn test_ocr_reads_recorded_boxes() {
        let snapshot = PageSnapshot::new().with_ocr_char_boxes(vec![
            CharBox::new("4", RectangleF::new(10.0, 10.0, 5.0, 8.0)),
            CharBox::new("2", RectangleF::new(15.0, 10.0, 5.0, 8.0)),
            CharBox::new("X", RectangleF::new(90.0, 90.0, 5.0, 8.0)),
        ]);
        let bitmap = DynamicImage::new_luma8(1, 1);
        let text = snapshot
            .run_ocr(&bitmap, RectangleF::new(0.0, 0.0, 50.0, 50.0))
            .unwrap();
        assert_eq!(text, "42");
    }

    #[test]
    fn test_rotation() {
        let mut snapshot = PageSnapshot::new().with_bitmap(DynamicImage::new_luma8(4, 2));
        snapshot.apply_rotation(PageRotation::Clockwise90);
        let bitmap = snapshot.bitmap().unwrap();
        assert_eq!((bitmap.width(), bitmap.height()), (2, 4));

        snapshot.apply_rotation(PageRotation::AutoDetection);
        let bitmap = snapshot.bitmap().unwrap();
        assert_eq!((bitmap.width(), bitmap.height()), (2, 4));
    }
}
