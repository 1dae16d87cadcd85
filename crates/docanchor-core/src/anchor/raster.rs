//! Pixel comparison of reference snippets against the page bitmap.

use std::borrow::Cow;

use image::{DynamicImage, GrayImage};
use tracing::{debug, trace};

use super::{MatchSet, PositionTolerance};
use crate::models::geometry::{Rect, RectangleF, SizeF};
use crate::models::snippet::ImageSnippet;
use crate::models::template::{ImageBox, ImagePattern};

/// Per-pixel and per-snippet thresholds, in integer units.
#[derive(Debug, Clone, Copy)]
pub(crate) struct ImageTolerance {
    /// Largest brightness delta that still counts as equal.
    max_delta: i16,
    /// Fraction of pixels allowed to differ.
    different_fraction: f32,
}

impl ImageTolerance {
    pub(crate) fn new(brightness_tolerance: f32, different_pixel_number_tolerance: f32) -> Self {
        Self {
            max_delta: (brightness_tolerance.clamp(0.0, 1.0) * 255.0).round() as i16,
            different_fraction: different_pixel_number_tolerance.clamp(0.0, 1.0),
        }
    }

    fn max_different(&self, pixel_count: usize) -> usize {
        (self.different_fraction as f64 * pixel_count as f64 + 1e-6).floor() as usize
    }
}

/// How far a snippet is from the bitmap at one position.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub(crate) struct Difference {
    pub different_pixels: usize,
    pub total_delta: u64,
}

/// Compare `snippet` with the bitmap area whose top-left is (x, y).
///
/// Returns `None` as soon as more pixels differ than the tolerance allows.
pub(crate) fn compare(
    bitmap: &GrayImage,
    snippet: &ImageSnippet,
    x: u32,
    y: u32,
    tolerance: ImageTolerance,
) -> Option<Difference> {
    if x + snippet.width() > bitmap.width() || y + snippet.height() > bitmap.height() {
        return None;
    }
    let max_different = tolerance.max_different(snippet.pixel_count());
    let mut diff = Difference {
        different_pixels: 0,
        total_delta: 0,
    };

    for sy in 0..snippet.height() {
        for sx in 0..snippet.width() {
            let page = bitmap.get_pixel(x + sx, y + sy)[0] as i16;
            let delta = (page - snippet.get(sx, sy) as i16).abs();
            diff.total_delta += delta as u64;
            if delta > tolerance.max_delta {
                diff.different_pixels += 1;
                if diff.different_pixels > max_different {
                    return None;
                }
            }
        }
    }

    Some(diff)
}

/// Inclusive range of top-left positions to try.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub(crate) struct PositionRange {
    x0: u32,
    y0: u32,
    x1: u32,
    y1: u32,
}

impl PositionRange {
    /// Positions where the snippet lies completely inside `area` and the bitmap.
    pub(crate) fn within(area: Option<Rect>, bitmap: &GrayImage, snippet: &ImageSnippet) -> Option<Self> {
        let area = area.unwrap_or(Rect::new(0, 0, bitmap.width() as i32, bitmap.height() as i32));
        let area = area.clamp_to(bitmap.width(), bitmap.height())?;
        let x1 = area.right() - snippet.width() as i32;
        let y1 = area.bottom() - snippet.height() as i32;
        if x1 < area.x || y1 < area.y {
            return None;
        }
        Some(Self {
            x0: area.x as u32,
            y0: area.y as u32,
            x1: x1 as u32,
            y1: y1 as u32,
        })
    }

    /// Positions within `dx`/`dy` of `expected` that keep the snippet on the bitmap.
    pub(crate) fn around(
        expected: (i32, i32),
        dx: i32,
        dy: i32,
        bitmap: &GrayImage,
        snippet: &ImageSnippet,
    ) -> Option<Self> {
        let max_x = bitmap.width() as i32 - snippet.width() as i32;
        let max_y = bitmap.height() as i32 - snippet.height() as i32;
        let x0 = expected.0.saturating_sub(dx).max(0);
        let y0 = expected.1.saturating_sub(dy).max(0);
        let x1 = expected.0.saturating_add(dx).min(max_x);
        let y1 = expected.1.saturating_add(dy).min(max_y);
        if x1 < x0 || y1 < y0 {
            return None;
        }
        Some(Self {
            x0: x0 as u32,
            y0: y0 as u32,
            x1: x1 as u32,
            y1: y1 as u32,
        })
    }

    /// Positions in scan order: rows top to bottom, each left to right.
    fn positions(self) -> impl Iterator<Item = (u32, u32)> {
        (self.y0..=self.y1).flat_map(move |y| (self.x0..=self.x1).map(move |x| (x, y)))
    }
}

/// Every acceptable position in scan order.
pub(crate) fn scan(
    bitmap: &GrayImage,
    snippet: &ImageSnippet,
    range: PositionRange,
    tolerance: ImageTolerance,
) -> Vec<(u32, u32, Difference)> {
    range
        .positions()
        .filter_map(|(x, y)| compare(bitmap, snippet, x, y, tolerance).map(|d| (x, y, d)))
        .collect()
}

/// First acceptable position, or the best one when `find_best` is set.
pub(crate) fn find_one(
    bitmap: &GrayImage,
    snippet: &ImageSnippet,
    range: PositionRange,
    tolerance: ImageTolerance,
    find_best: bool,
) -> Option<(u32, u32)> {
    if find_best {
        let mut hits = scan(bitmap, snippet, range, tolerance);
        hits.sort_by_key(|&(_, _, d)| d);
        hits.first().map(|&(x, y, _)| (x, y))
    } else {
        range
            .positions()
            .find(|&(x, y)| compare(bitmap, snippet, x, y, tolerance).is_some())
    }
}

/// Resolve an image pattern against the page bitmap.
///
/// `search` is in PDF space; `ratio` converts bitmap pixels to PDF units.
/// The first image box is primary. Each acceptable primary position is
/// tried in turn (scan order, or ascending difference with
/// `find_best_image_match`), and every further image box has to match
/// within the position tolerance of where the primary's shift puts it.
/// The first complete occurrence is the only one returned; a primary
/// position whose secondary images fail is skipped, not fatal.
pub(crate) fn find_matches(
    pattern: &ImagePattern,
    bitmap: &DynamicImage,
    ratio: f32,
    search: Option<RectangleF>,
    position_tolerance: PositionTolerance,
) -> Vec<MatchSet> {
    let Some((primary, rest)) = pattern.image_boxes.split_first() else {
        return Vec::new();
    };
    if ratio <= 0.0 {
        return Vec::new();
    }

    let gray: Cow<GrayImage> = match bitmap.as_luma8() {
        Some(g) => Cow::Borrowed(g),
        None => Cow::Owned(bitmap.to_luma8()),
    };
    let tolerance = ImageTolerance::new(
        pattern.brightness_tolerance,
        pattern.different_pixel_number_tolerance,
    );

    let area = search.map(|s| s.scale(1.0 / ratio).to_rect());
    let Some(range) = PositionRange::within(area, &gray, &primary.image_data) else {
        debug!("Search area {:?} cannot hold the primary image", area);
        return Vec::new();
    };

    let complete = |x: u32, y: u32| {
        let found = pixel_rectangle(x, y, &primary.image_data, ratio);
        let shift = found.location().offset_from(primary.rectangle.location());

        let secondary: Option<Vec<RectangleF>> = rest
            .iter()
            .map(|image_box| {
                find_secondary(
                    &gray,
                    image_box,
                    shift,
                    ratio,
                    tolerance,
                    position_tolerance,
                    pattern.find_best_image_match,
                )
            })
            .collect();

        if secondary.is_none() {
            trace!("Secondary images missing for primary at ({}, {})", x, y);
        }
        secondary.map(|secondary| MatchSet::new(found, secondary))
    };

    let found = if pattern.find_best_image_match {
        let mut hits = scan(&gray, &primary.image_data, range, tolerance);
        hits.sort_by_key(|&(_, _, d)| d);
        trace!("{} primary image positions qualify", hits.len());
        hits.into_iter().find_map(|(x, y, _)| complete(x, y))
    } else {
        // Stops at the first complete occurrence without scanning the rest.
        range
            .positions()
            .filter(|&(x, y)| compare(&gray, &primary.image_data, x, y, tolerance).is_some())
            .find_map(|(x, y)| complete(x, y))
    };

    found.into_iter().collect()
}

fn find_secondary(
    bitmap: &GrayImage,
    image_box: &ImageBox,
    shift: SizeF,
    ratio: f32,
    tolerance: ImageTolerance,
    position_tolerance: PositionTolerance,
    find_best: bool,
) -> Option<RectangleF> {
    let expected = image_box.rectangle.offset(shift);
    let (dx, dy) = position_tolerance.limits(&expected);
    let origin = expected.scale(1.0 / ratio).to_rect();
    let range = PositionRange::around(
        (origin.x, origin.y),
        (dx / ratio).ceil() as i32,
        (dy / ratio).ceil() as i32,
        bitmap,
        &image_box.image_data,
    )?;
    let (x, y) = find_one(bitmap, &image_box.image_data, range, tolerance, find_best)?;
    Some(pixel_rectangle(x, y, &image_box.image_data, ratio))
}

fn pixel_rectangle(x: u32, y: u32, snippet: &ImageSnippet, ratio: f32) -> RectangleF {
    Rect::new(
        x as i32,
        y as i32,
        snippet.width() as i32,
        snippet.height() as i32,
    )
    .to_rectangle_f()
    .scale(ratio)
}
