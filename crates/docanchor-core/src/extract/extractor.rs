//! Anchor-relative field extraction.

use tracing::{debug, info, warn};

use super::{FieldOutcome, FieldValue, PageExtraction, Result};
use crate::anchor::{AnchorResolver, CandidateRanker, RankingPolicy};
use crate::error::{AnchorError, ExtractionError, PageError, TemplateError};
use crate::models::config::DocAnchorConfig;
use crate::models::geometry::{RectangleF, SizeF};
use crate::models::template::{AnchorId, EntityType, Field, Mark, Template};
use crate::page::{PageSource, TextSource, text};

/// Reads field values off a page using the template's anchors.
#[derive(Debug, Clone)]
pub struct FieldExtractor<'t, R = RankingPolicy> {
    resolver: AnchorResolver<'t, R>,
    skip_unset_fields: bool,
}

impl<'t> FieldExtractor<'t> {
    /// Create an extractor with the default ranking policy.
    pub fn new(template: &'t Template) -> std::result::Result<Self, TemplateError> {
        Ok(Self::with_resolver(AnchorResolver::new(template)?))
    }

    /// Create an extractor configured from `config`.
    pub fn from_config(
        template: &'t Template,
        config: &DocAnchorConfig,
    ) -> std::result::Result<Self, TemplateError> {
        let resolver = AnchorResolver::new(template)?.with_ranker(config.resolution.ranking);
        let mut extractor = Self::with_resolver(resolver);
        extractor.skip_unset_fields = config.extraction.skip_unset_fields;
        Ok(extractor)
    }
}

impl<'t, R: CandidateRanker> FieldExtractor<'t, R> {
    pub fn with_resolver(resolver: AnchorResolver<'t, R>) -> Self {
        Self {
            resolver,
            skip_unset_fields: false,
        }
    }

    pub fn resolver(&self) -> &AnchorResolver<'t, R> {
        &self.resolver
    }

    fn template(&self) -> &'t Template {
        self.resolver.template()
    }

    /// The field's rectangle on `page`, after applying its anchors.
    ///
    /// `None` when the field has no rectangle.
    pub fn field_rectangle<P: PageSource + ?Sized>(
        &self,
        page: &P,
        field: &Field,
    ) -> Result<Option<RectangleF>> {
        let Some(mut r) = field.rectangle else {
            return Ok(None);
        };

        if let Some(id) = field.anchor_id {
            let origin = self.locate(page, field, id)?.position;
            r = r.offset(SizeF::new(origin.x, origin.y));
        }
        let r0 = r;

        if let Some(id) = field.left_anchor_id {
            let shift = self.locate(page, field, id)?.shift;
            r.x += shift.width;
        }
        if let Some(id) = field.top_anchor_id {
            let shift = self.locate(page, field, id)?.shift;
            r.y += shift.height;
        }
        if let Some(id) = field.right_anchor_id {
            let shift = self.locate(page, field, id)?.shift;
            r.width += (r0.x - r.x) + shift.width;
        }
        if let Some(id) = field.bottom_anchor_id {
            let shift = self.locate(page, field, id)?.shift;
            r.height += (r0.y - r.y) + shift.height;
        }

        debug!(
            "Field '{}' rectangle ({}, {}, {}, {})",
            field.name, r.x, r.y, r.width, r.height
        );
        Ok(Some(r))
    }

    /// Read one field's value from `page`.
    pub fn extract<P: PageSource + ?Sized>(&self, page: &P, field: &Field) -> Result<FieldValue> {
        let Some(r) = self.field_rectangle(page, field)? else {
            return Ok(FieldValue::Empty);
        };
        let failure = |source: PageError| ExtractionError::Failure {
            field: field.name.clone(),
            source,
        };

        match field.field_type {
            EntityType::PdfText => {
                let boxes = page.char_boxes(TextSource::Pdf).map_err(failure)?;
                let raw = page.extract_text_by_rectangle(
                    boxes,
                    r,
                    self.template().text_auto_insert_space_threshold,
                );
                Ok(FieldValue::Text(text::normalize_text(&raw)))
            }
            EntityType::OcrText => {
                let bitmap = page.bitmap().map_err(failure)?;
                let raw = page.run_ocr(bitmap, r).map_err(failure)?;
                Ok(FieldValue::Text(text::normalize_text(&raw)))
            }
            EntityType::ImageData => {
                let bitmap = page.bitmap().map_err(failure)?;
                let ratio = page.image_to_pdf_ratio();
                let pixels = r.scale(1.0 / ratio).to_rect();
                let image = page.crop_and_scale(bitmap, pixels, ratio).map_err(failure)?;
                Ok(FieldValue::Image(image))
            }
        }
    }

    /// Value of the first field called `name` that yields something.
    ///
    /// Fields sharing a name are alternatives tried in template order; a
    /// missing or unset anchor moves on to the next one. Provider failures
    /// stop the search.
    pub fn extract_by_name<P: PageSource + ?Sized>(&self, page: &P, name: &str) -> Result<FieldValue> {
        let mut last_error = None;

        for field in self.template().fields_named(name) {
            match self.extract(page, field) {
                Ok(value) if !value.is_empty() => return Ok(value),
                Ok(_) => {}
                Err(e) if e.is_recoverable() => {
                    debug!("{}", e);
                    last_error = Some(e);
                }
                Err(e) => return Err(e),
            }
        }

        match last_error {
            Some(e) => Err(e),
            None => Ok(FieldValue::Empty),
        }
    }

    /// Extract every field of the template, recording per-field outcomes.
    pub fn extract_page<P: PageSource + ?Sized>(&self, page: &P) -> PageExtraction {
        let template = self.template();
        let mut fields = Vec::with_capacity(template.fields.len());

        for field in &template.fields {
            if self.skip_unset_fields && !field.is_set() {
                continue;
            }
            let result = self.extract(page, field);
            if let Err(e) = &result {
                if e.is_recoverable() {
                    debug!("{}", e);
                } else {
                    warn!("{}", e);
                }
            }
            fields.push(FieldOutcome {
                name: field.name.clone(),
                field_type: field.field_type,
                result,
            });
        }

        let extraction = PageExtraction {
            template: template.name.clone(),
            fields,
        };
        info!(
            "Template '{}': {}/{} fields extracted",
            extraction.template,
            extraction.extracted_count(),
            extraction.fields.len()
        );
        extraction
    }

    /// A mark's rectangle on `page`, relative to its anchor when it has one.
    pub fn mark_rectangle<P: PageSource + ?Sized>(
        &self,
        page: &P,
        mark: &Mark,
    ) -> std::result::Result<Option<RectangleF>, AnchorError> {
        let Some(r) = mark.rectangle else {
            return Ok(None);
        };
        match mark.anchor_id {
            Some(id) => {
                let origin = self.resolver.locate(page, id)?.position;
                Ok(Some(r.offset(SizeF::new(origin.x, origin.y))))
            }
            None => Ok(Some(r)),
        }
    }

    fn locate<P: PageSource + ?Sized>(
        &self,
        page: &P,
        field: &Field,
        id: AnchorId,
    ) -> Result<crate::anchor::AnchorPosition> {
        self.resolver
            .locate(page, id)
            .map_err(|e| ExtractionError::from_anchor(&field.name, e))
    }
}
