//! Configuration structures for the extraction engine.

use serde::{Deserialize, Serialize};

use crate::anchor::RankingPolicy;

/// Main configuration for the docanchor engine.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct DocAnchorConfig {
    /// Page geometry configuration.
    pub pdf: PdfConfig,

    /// Anchor resolution configuration.
    pub resolution: ResolutionConfig,

    /// Field extraction configuration.
    pub extraction: ExtractionConfig,
}

/// Relationship between PDF coordinates and page bitmaps.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct PdfConfig {
    /// DPI the page bitmaps were rendered at.
    pub render_dpi: u32,

    /// Units per inch of the PDF coordinate space.
    pub pdf_dpi: u32,
}

impl Default for PdfConfig {
    fn default() -> Self {
        Self {
            render_dpi: 300,
            pdf_dpi: 72,
        }
    }
}

impl PdfConfig {
    /// Factor converting bitmap pixels to PDF units.
    pub fn image_to_pdf_ratio(&self) -> f32 {
        if self.render_dpi == 0 {
            return IMAGE_TO_PDF_RESOLUTION_RATIO;
        }
        self.pdf_dpi as f32 / self.render_dpi as f32
    }
}

/// Ratio for the default 300 DPI renders of 72 DPI PDF pages.
pub const IMAGE_TO_PDF_RESOLUTION_RATIO: f32 = 72.0 / 300.0;

/// Anchor resolution configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolutionConfig {
    /// Which candidate represents an anchor when its pattern recurs.
    pub ranking: RankingPolicy,

    /// Rotate snapshot bitmaps according to the template's page rotation.
    pub apply_page_rotation: bool,
}

/// Field extraction configuration.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
#[serde(default)]
pub struct ExtractionConfig {
    /// Gap (PDF units) above which a space is inserted between OCR
    /// character boxes. Overrides the value recorded in page snapshots.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub ocr_space_threshold: Option<f32>,

    /// Skip fields whose rectangle is not set instead of reporting them.
    pub skip_unset_fields: bool,
}

impl DocAnchorConfig {
    /// Load configuration from a JSON file.
    pub fn from_file(path: &std::path::Path) -> Result<Self, std::io::Error> {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content).map_err(|e| {
            std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string())
        })
    }

    /// Save configuration to a JSON file.
    pub fn save(&self, path: &std::path::Path) -> Result<(), std::io::Error> {
        let content = serde_json::to_string_pretty(self).map_err(|e| {
            std::io::Error::new(std::io::ErrorKind::InvalidData, e.to_string())
        })?;
        std::fs::write(path, content)
    }
}
