//! Resolving anchors against one page.

use serde::Serialize;
use tracing::{debug, trace};

use super::ranker::{CandidateRanker, RankingPolicy, select_representative};
use super::{MatchSet, PositionTolerance, raster, text};
use crate::error::{AnchorError, TemplateError};
use crate::models::geometry::{PointF, RectangleF, SizeF};
use crate::models::template::{Anchor, AnchorId, AnchorIndex, AnchorPattern, Template};
use crate::page::{PageSource, TextSource};

/// Where an anchor was found on a page.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnchorPosition {
    pub anchor_id: AnchorId,
    /// Every occurrence, in resolution order.
    pub candidates: Vec<MatchSet>,
    /// Index of the candidate chosen by the ranker.
    pub representative: usize,
    /// Top-left corner of the representative's primary rectangle.
    pub position: PointF,
    /// Observed position minus authored position.
    pub shift: SizeF,
}

/// Terminal state of one resolution attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "candidates", rename_all = "snake_case")]
pub enum AnchorStatus {
    NotSet,
    NotFound,
    Found(usize),
}

/// Resolves the anchors of a template.
///
/// The template is validated on construction, so parent chains are known to
/// be acyclic and every parent id exists. Nothing is cached between calls:
/// each call searches the page it is given from scratch.
#[derive(Debug, Clone)]
pub struct AnchorResolver<'t, R = RankingPolicy> {
    template: &'t Template,
    index: AnchorIndex,
    ranker: R,
}

impl<'t> AnchorResolver<'t> {
    /// Validate `template` and create a resolver with the default ranking.
    pub fn new(template: &'t Template) -> Result<Self, TemplateError> {
        let index = template.validate()?;
        Ok(Self {
            template,
            index,
            ranker: RankingPolicy::default(),
        })
    }
}

impl<'t, R: CandidateRanker> AnchorResolver<'t, R> {
    /// Replace the ranker used to pick representative candidates.
    pub fn with_ranker<Q: CandidateRanker>(self, ranker: Q) -> AnchorResolver<'t, Q> {
        AnchorResolver {
            template: self.template,
            index: self.index,
            ranker,
        }
    }

    pub fn template(&self) -> &'t Template {
        self.template
    }

    pub fn ranker(&self) -> &R {
        &self.ranker
    }

    /// Every occurrence of the anchor on `page`.
    ///
    /// Fails with `NotSet` before touching the page if the anchor or any of
    /// its ancestors has no pattern, and with `NotFound` if the anchor or an
    /// ancestor has no occurrence.
    pub fn resolve<P: PageSource + ?Sized>(
        &self,
        page: &P,
        id: AnchorId,
    ) -> Result<Vec<MatchSet>, AnchorError> {
        self.search_chain(page, id).map(|(candidates, _)| candidates)
    }

    /// Resolve the anchor and pick its representative position.
    pub fn locate<P: PageSource + ?Sized>(
        &self,
        page: &P,
        id: AnchorId,
    ) -> Result<AnchorPosition, AnchorError> {
        let (candidates, parent_shift) = self.search_chain(page, id)?;
        let anchor = self.anchor(id)?;
        let authored = anchor.authored_position().ok_or(AnchorError::NotSet(id))?;
        let expected = shifted(authored, parent_shift);

        let (rectangle, representative) =
            select_representative(&self.ranker, &candidates, expected)
                .ok_or(AnchorError::NotFound(id))?;
        let position = rectangle.location();
        let shift = position.offset_from(authored);

        debug!(
            "Anchor {} at ({}, {}), shift ({}, {}), {} candidate(s)",
            id,
            position.x,
            position.y,
            shift.width,
            shift.height,
            candidates.len()
        );

        Ok(AnchorPosition {
            anchor_id: id,
            candidates,
            representative,
            position,
            shift,
        })
    }

    /// Classify the anchor's resolution outcome on `page`.
    ///
    /// Only provider failures and unknown ids are reported as errors.
    pub fn status<P: PageSource + ?Sized>(
        &self,
        page: &P,
        id: AnchorId,
    ) -> Result<AnchorStatus, AnchorError> {
        match self.resolve(page, id) {
            Ok(candidates) => Ok(AnchorStatus::Found(candidates.len())),
            Err(AnchorError::NotSet(_)) => Ok(AnchorStatus::NotSet),
            Err(AnchorError::NotFound(_)) => Ok(AnchorStatus::NotFound),
            Err(e) => Err(e),
        }
    }

    fn anchor(&self, id: AnchorId) -> Result<&'t Anchor, AnchorError> {
        self.index
            .position(id)
            .and_then(|pos| self.template.anchors.get(pos))
            .ok_or(AnchorError::Unknown(id))
    }

    /// Search the chain from its root down to `id`.
    ///
    /// Returns the anchor's candidates and the shift of its parent.
    fn search_chain<P: PageSource + ?Sized>(
        &self,
        page: &P,
        id: AnchorId,
    ) -> Result<(Vec<MatchSet>, SizeF), AnchorError> {
        let chain = self.index.chain(id).ok_or(AnchorError::Unknown(id))?;
        let anchors = &self.template.anchors;

        if let Some(unset) = chain.iter().map(|&pos| &anchors[pos]).find(|a| !a.is_set()) {
            debug!("Anchor {} is not set (requested {})", unset.id, id);
            return Err(AnchorError::NotSet(unset.id));
        }

        let mut parent_shift = SizeF::default();
        let mut levels = chain.iter().rev().peekable();
        while let Some(&pos) = levels.next() {
            let anchor = &anchors[pos];
            let candidates = self.find(page, anchor, parent_shift)?;
            if candidates.is_empty() {
                debug!("Anchor {} not found (requested {})", anchor.id, id);
                return Err(AnchorError::NotFound(anchor.id));
            }
            if levels.peek().is_none() {
                return Ok((candidates, parent_shift));
            }

            let authored = anchor
                .authored_position()
                .ok_or(AnchorError::NotSet(anchor.id))?;
            let (rectangle, _) = select_representative(
                &self.ranker,
                &candidates,
                shifted(authored, parent_shift),
            )
            .ok_or(AnchorError::NotFound(anchor.id))?;
            parent_shift = rectangle.location().offset_from(authored);
            trace!(
                "Parent anchor {} shifts children by ({}, {})",
                anchor.id, parent_shift.width, parent_shift.height
            );
        }

        Err(AnchorError::Unknown(id))
    }

    /// Search one anchor, its search area moved by the parent's shift.
    fn find<P: PageSource + ?Sized>(
        &self,
        page: &P,
        anchor: &Anchor,
        parent_shift: SizeF,
    ) -> Result<Vec<MatchSet>, AnchorError> {
        let search = search_rectangle(anchor, parent_shift);
        let tolerance = PositionTolerance::of(anchor);
        trace!("Searching anchor {} in {:?}", anchor.id, search);

        let found = match &anchor.pattern {
            AnchorPattern::PdfText { char_boxes } => {
                let boxes = page.char_boxes(TextSource::Pdf)?;
                text::find_matches(char_boxes, boxes, search, tolerance)
            }
            AnchorPattern::OcrText { char_boxes } => {
                let boxes = page.char_boxes(TextSource::Ocr)?;
                text::find_matches(char_boxes, boxes, search, tolerance)
            }
            AnchorPattern::ImageData(pattern) => {
                let bitmap = page.bitmap()?;
                raster::find_matches(
                    pattern,
                    bitmap,
                    page.image_to_pdf_ratio(),
                    search,
                    tolerance,
                )
            }
        };

        Ok(found)
    }
}

/// The area to search, or `None` for the whole page.
fn search_rectangle(anchor: &Anchor, parent_shift: SizeF) -> Option<RectangleF> {
    if anchor.search_rectangle_margin < 0 {
        return None;
    }
    anchor
        .authored_extent()
        .map(|r| r.offset(parent_shift).inflate(anchor.search_rectangle_margin as f32))
}

fn shifted(point: PointF, shift: SizeF) -> PointF {
    PointF::new(point.x + shift.width, point.y + shift.height)
}

#[cfg(test)]
mod tests {
    use std::cell::Cell;

    use super::*;
    use crate::error::PageError;
    use crate::models::template::CharBox;
    use crate::page::PageSnapshot;
    use image::DynamicImage;
    use pretty_assertions::assert_eq;

    fn word(text: &str, x: f32, y: f32) -> Vec<CharBox> {
        text.chars()
            .enumerate()
            .map(|(i, c)| {
                CharBox::new(c.to_string(), RectangleF::new(x + i as f32 * 6.0, y, 5.0, 8.0))
            })
            .collect()
    }

    /// Page that counts how often it is queried.
    struct CountingPage {
        inner: PageSnapshot,
        queries: Cell<usize>,
    }

    impl CountingPage {
        fn new(inner: PageSnapshot) -> Self {
            Self {
                inner,
                queries: Cell::new(0),
            }
        }
    }

    impl PageSource for CountingPage {
        fn char_boxes(&self, source: TextSource) -> crate::page::Result<&[CharBox]> {
            self.queries.set(self.queries.get() + 1);
            self.inner.char_boxes(source)
        }

        fn bitmap(&self) -> crate::page::Result<&DynamicImage> {
            self.queries.set(self.queries.get() + 1);
            self.inner.bitmap()
        }

        fn run_ocr(&self, bitmap: &DynamicImage, rectangle: RectangleF) -> crate::page::Result<String> {
            self.queries.set(self.queries.get() + 1);
            self.inner.run_ocr(bitmap, rectangle)
        }
    }

    fn template() -> Template {
        let mut template = Template::new("test");
        template.anchors = vec![
            Anchor::pdf_text(1, word("Invoice", 10.0, 10.0)),
            Anchor::pdf_text(2, word("Total", 10.0, 100.0))
                .with_parent(1)
                .with_search_margin(10),
            Anchor::pdf_text(3, vec![]),
            Anchor::pdf_text(4, word("Net", 10.0, 200.0)).with_parent(3),
        ];
        template
    }

    #[test]
    fn test_unset_ancestor_never_queries_page() {
        let template = template();
        let resolver = AnchorResolver::new(&template).unwrap();
        let page = CountingPage::new(PageSnapshot::new().with_pdf_char_boxes(word("Net", 10.0, 200.0)));

        assert!(matches!(resolver.resolve(&page, 4), Err(AnchorError::NotSet(3))));
        assert!(matches!(resolver.resolve(&page, 3), Err(AnchorError::NotSet(3))));
        assert_eq!(page.queries.get(), 0);
        assert_eq!(resolver.status(&page, 4).unwrap(), AnchorStatus::NotSet);
    }

    #[test]
    fn test_not_found() {
        let template = template();
        let resolver = AnchorResolver::new(&template).unwrap();
        let page = PageSnapshot::new().with_pdf_char_boxes(word("Receipt", 10.0, 10.0));

        assert!(matches!(resolver.resolve(&page, 1), Err(AnchorError::NotFound(1))));
        // The parent is missing, so the child is never searched.
        assert!(matches!(resolver.resolve(&page, 2), Err(AnchorError::NotFound(1))));
        assert_eq!(resolver.status(&page, 1).unwrap(), AnchorStatus::NotFound);
    }

    #[test]
    fn test_unknown_anchor() {
        let template = template();
        let resolver = AnchorResolver::new(&template).unwrap();
        let page = PageSnapshot::new();
        assert!(matches!(resolver.resolve(&page, 99), Err(AnchorError::Unknown(99))));
    }

    #[test]
    fn test_parent_shift_moves_child_search_area() {
        let template = template();
        let resolver = AnchorResolver::new(&template).unwrap();

        // Whole layout moved by (30, 40): the child's margin of 10 is only
        // enough because the parent's shift is applied first.
        let mut boxes = word("Invoice", 40.0, 50.0);
        boxes.extend(word("Total", 40.0, 140.0));
        let page = PageSnapshot::new().with_pdf_char_boxes(boxes);

        let position = resolver.locate(&page, 2).unwrap();
        assert_eq!(position.position, PointF::new(40.0, 140.0));
        assert_eq!(position.shift, SizeF::new(30.0, 40.0));
        assert_eq!(position.candidates.len(), 1);
    }

    #[test]
    fn test_child_outside_shifted_area_is_not_found() {
        let template = template();
        let resolver = AnchorResolver::new(&template).unwrap();

        let mut boxes = word("Invoice", 10.0, 10.0);
        boxes.extend(word("Total", 40.0, 140.0));
        let page = PageSnapshot::new().with_pdf_char_boxes(boxes);

        assert!(matches!(resolver.resolve(&page, 2), Err(AnchorError::NotFound(2))));
    }

    #[test]
    fn test_ranker_picks_representative() {
        let mut template = Template::new("repeat");
        template.anchors = vec![Anchor::pdf_text(1, word("Qty", 10.0, 10.0))];

        let mut boxes = word("Qty", 10.0, 12.0);
        boxes.extend(word("Qty", 10.0, 300.0));
        let page = PageSnapshot::new().with_pdf_char_boxes(boxes);

        let resolver = AnchorResolver::new(&template).unwrap();
        let last = resolver.locate(&page, 1).unwrap();
        assert_eq!(last.representative, 1);
        assert_eq!(last.position, PointF::new(10.0, 300.0));
        assert_eq!(last.candidates.len(), 2);

        let resolver = resolver.with_ranker(RankingPolicy::NearestToAuthored);
        let nearest = resolver.locate(&page, 1).unwrap();
        assert_eq!(nearest.representative, 0);
        assert_eq!(nearest.shift, SizeF::new(0.0, 2.0));
    }

    #[test]
    fn test_leading_blank_does_not_shift() {
        let boxes = vec![
            CharBox::new(" ", RectangleF::new(4.0, 10.0, 5.0, 8.0)),
            CharBox::new("T", RectangleF::new(10.0, 10.0, 5.0, 8.0)),
            CharBox::new("o", RectangleF::new(16.0, 10.0, 5.0, 8.0)),
        ];
        let mut template = Template::new("blank");
        template.anchors = vec![Anchor::pdf_text(1, boxes.clone())];
        let resolver = AnchorResolver::new(&template).unwrap();
        let page = PageSnapshot::new().with_pdf_char_boxes(boxes);

        let position = resolver.locate(&page, 1).unwrap();
        assert_eq!(position.position, PointF::new(10.0, 10.0));
        assert_eq!(position.shift, SizeF::new(0.0, 0.0));
    }

    #[test]
    fn test_provider_failure_propagates() {
        let mut template = Template::new("ocr");
        template.anchors = vec![Anchor::ocr_text(1, word("Sum", 0.0, 0.0))];
        let resolver = AnchorResolver::new(&template).unwrap();
        let page = PageSnapshot::new();

        assert!(matches!(
            resolver.resolve(&page, 1),
            Err(AnchorError::Page(PageError::CharBoxesUnavailable(TextSource::Ocr)))
        ));
        assert!(resolver.status(&page, 1).is_err());
    }

    #[test]
    fn test_invalid_template_is_rejected() {
        let mut template = Template::new("cycle");
        template.anchors = vec![
            Anchor::pdf_text(1, word("A", 0.0, 0.0)).with_parent(2),
            Anchor::pdf_text(2, word("B", 0.0, 0.0)).with_parent(1),
        ];
        assert!(matches!(
            AnchorResolver::new(&template),
            Err(TemplateError::ParentCycle(_))
        ));
    }
}
