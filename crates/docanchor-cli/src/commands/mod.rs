//! Subcommands and the helpers they share.

pub mod anchors;
pub mod batch;
pub mod config;
pub mod extract;
pub mod validate;

use std::path::Path;

use anyhow::Context;
use tracing::debug;

use docanchor_core::models::config::DocAnchorConfig;
use docanchor_core::{PageSnapshot, Template};

/// Output format for extraction results.
#[derive(Clone, Copy, Debug, clap::ValueEnum)]
pub enum OutputFormat {
    /// JSON output
    Json,
    /// CSV output
    Csv,
    /// Plain text summary
    Text,
}

impl OutputFormat {
    pub fn extension(self) -> &'static str {
        match self {
            OutputFormat::Json => "json",
            OutputFormat::Csv => "csv",
            OutputFormat::Text => "txt",
        }
    }
}

/// Load the configuration file, or the defaults when none is given.
pub fn load_config(config_path: Option<&str>) -> anyhow::Result<DocAnchorConfig> {
    match config_path {
        Some(path) => DocAnchorConfig::from_file(Path::new(path))
            .with_context(|| format!("Failed to load config from {}", path)),
        None => Ok(DocAnchorConfig::default()),
    }
}

/// Load and validate a template.
pub fn load_template(path: &Path) -> anyhow::Result<Template> {
    if !path.exists() {
        anyhow::bail!("Template file not found: {}", path.display());
    }
    Template::from_file(path).with_context(|| format!("Failed to load template {}", path.display()))
}

/// Load a page snapshot and prepare it for `template`.
pub fn load_page(
    path: &Path,
    template: &Template,
    config: &DocAnchorConfig,
) -> anyhow::Result<PageSnapshot> {
    if !path.exists() {
        anyhow::bail!("Page file not found: {}", path.display());
    }
    let mut page = PageSnapshot::from_file(path)
        .with_context(|| format!("Failed to load page {}", path.display()))?
        .with_image_to_pdf_ratio(config.pdf.image_to_pdf_ratio());

    if let Some(threshold) = config.extraction.ocr_space_threshold {
        page = page.with_ocr_space_threshold(threshold);
    }
    if config.resolution.apply_page_rotation {
        debug!("Applying page rotation {:?}", template.page_rotation);
        page.apply_rotation(template.page_rotation);
    }

    Ok(page)
}
