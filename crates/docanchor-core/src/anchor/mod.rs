//! Anchor resolution: locating template landmarks on a live page.
//!
//! The resolver walks an anchor's parent chain, searches each anchor of the
//! chain from the root down, and returns every occurrence of the pattern.
//! A [`CandidateRanker`] then picks the occurrence that represents the anchor
//! when a single position is needed.

mod raster;
mod ranker;
mod resolver;
mod text;

pub use ranker::{CandidateRanker, RankingPolicy, select_representative};
pub use resolver::{AnchorPosition, AnchorResolver, AnchorStatus};

use serde::Serialize;

use crate::models::geometry::{PointF, RectangleF};
use crate::models::template::Anchor;

/// One occurrence of an anchor pattern on a page.
///
/// The first rectangle is the primary one; the rest are the rectangles of
/// the individual elements (characters or secondary images) that make up
/// the occurrence.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MatchSet {
    rectangles: Vec<RectangleF>,
}

impl MatchSet {
    pub fn new(primary: RectangleF, secondary: Vec<RectangleF>) -> Self {
        let mut rectangles = Vec::with_capacity(secondary.len() + 1);
        rectangles.push(primary);
        rectangles.extend(secondary);
        Self { rectangles }
    }

    /// The rectangle whose top-left corner is the anchor position.
    pub fn primary(&self) -> RectangleF {
        self.rectangles[0]
    }

    pub fn secondary(&self) -> &[RectangleF] {
        &self.rectangles[1..]
    }

    pub fn rectangles(&self) -> &[RectangleF] {
        &self.rectangles
    }
}

/// Allowed displacement of a pattern element from where it is expected.
#[derive(Debug, Clone, Copy)]
pub(crate) struct PositionTolerance {
    deviation: f32,
    absolute: bool,
}

impl PositionTolerance {
    pub(crate) fn of(anchor: &Anchor) -> Self {
        Self {
            deviation: anchor.position_deviation.max(0.0),
            absolute: anchor.position_deviation_is_absolute,
        }
    }

    /// Maximum horizontal and vertical displacement for an element.
    pub(crate) fn limits(&self, expected: &RectangleF) -> (f32, f32) {
        if self.absolute {
            (self.deviation, self.deviation)
        } else {
            (
                self.deviation * expected.width.abs(),
                self.deviation * expected.height.abs(),
            )
        }
    }

    pub(crate) fn allows(&self, expected: &RectangleF, observed: PointF) -> bool {
        let (dx, dy) = self.limits(expected);
        (observed.x - expected.x).abs() <= dx && (observed.y - expected.y).abs() <= dy
    }
}
