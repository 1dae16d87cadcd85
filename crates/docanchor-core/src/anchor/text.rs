//! Matching a recorded character sequence against a page's character boxes.

use tracing::trace;

use super::{MatchSet, PositionTolerance};
use crate::models::geometry::{PointF, RectangleF};
use crate::models::template::{CharBox, significant_char_boxes};

/// Every occurrence of `pattern` on the page, in page stream order.
///
/// The first non-blank recorded character drives the search: each page box
/// with the same character whose top-left lies in `search` proposes a shift.
/// Every other recorded character must then be present at its recorded
/// offset, give or take `tolerance`; the nearest qualifying box is taken.
/// A proposal missing any character is dropped and the search goes on with
/// the next one.
pub(crate) fn find_matches(
    pattern: &[CharBox],
    page: &[CharBox],
    search: Option<RectangleF>,
    tolerance: PositionTolerance,
) -> Vec<MatchSet> {
    let pattern: Vec<&CharBox> = significant_char_boxes(pattern).collect();
    let Some((first, rest)) = pattern.split_first() else {
        return Vec::new();
    };

    let mut matches = Vec::new();

    for candidate in page.iter().filter(|p| p.text == first.text) {
        let origin = candidate.rectangle.location();
        if let Some(area) = search {
            if !area.contains_point(origin) {
                continue;
            }
        }
        let shift = origin.offset_from(first.rectangle.location());

        let mut matched = vec![candidate.rectangle];
        for expected_box in rest {
            let expected = expected_box.rectangle.offset(shift);
            match nearest(page, &expected_box.text, &expected, tolerance) {
                Some(found) => matched.push(found.rectangle),
                None => {
                    trace!(
                        "Dropping candidate at ({}, {}): '{}' not near ({}, {})",
                        origin.x,
                        origin.y,
                        expected_box.text,
                        expected.x,
                        expected.y
                    );
                    matched.clear();
                    break;
                }
            }
        }
        if matched.is_empty() {
            continue;
        }

        if let Some(primary) = RectangleF::union_all(matched.iter()) {
            matches.push(MatchSet::new(primary, matched));
        }
    }

    matches
}

fn nearest<'a>(
    page: &'a [CharBox],
    text: &str,
    expected: &RectangleF,
    tolerance: PositionTolerance,
) -> Option<&'a CharBox> {
    let target = expected.location();
    page.iter()
        .filter(|p| p.text == text && tolerance.allows(expected, p.rectangle.location()))
        .min_by(|a, b| {
            distance(a.rectangle.location(), target)
                .total_cmp(&distance(b.rectangle.location(), target))
        })
}

fn distance(a: PointF, b: PointF) -> f32 {
    (a.x - b.x).powi(2) + (a.y - b.y).powi(2)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::template::Anchor;
    use pretty_assertions::assert_eq;

    fn boxes(text: &str, x: f32, y: f32) -> Vec<CharBox> {
        text.chars()
            .enumerate()
            .map(|(i, c)| {
                CharBox::new(c.to_string(), RectangleF::new(x + i as f32 * 6.0, y, 5.0, 8.0))
            })
            .collect()
    }

    fn tolerance(deviation: f32) -> PositionTolerance {
        PositionTolerance::of(&Anchor::pdf_text(1, vec![]).with_deviation(deviation, true))
    }

    #[test]
    fn test_finds_every_occurrence() {
        let pattern = boxes("Total", 10.0, 10.0);
        let mut page = boxes("Total", 13.0, 20.0);
        page.extend(boxes("Subtotal", 0.0, 40.0));
        page.extend(boxes("Total", 50.0, 70.0));

        let found = find_matches(&pattern, &page, None, tolerance(0.5));
        // "Subtotal" has a lower-case 't' where 'T' is expected.
        assert_eq!(found.len(), 2);
        assert_eq!(found[0].primary(), RectangleF::new(13.0, 20.0, 29.0, 8.0));
        assert_eq!(found[0].secondary().len(), 5);
        assert_eq!(found[1].primary().location(), PointF::new(50.0, 70.0));
    }

    #[test]
    fn test_drifted_character_within_tolerance() {
        let pattern = boxes("No", 10.0, 10.0);
        let mut page = boxes("N", 20.0, 20.0);
        page.push(CharBox::new("o", RectangleF::new(26.4, 20.3, 5.0, 8.0)));

        assert_eq!(find_matches(&pattern, &page, None, tolerance(0.5)).len(), 1);
        assert!(find_matches(&pattern, &page, None, tolerance(0.3)).is_empty());
    }

    #[test]
    fn test_search_rectangle_limits_primary() {
        let pattern = boxes("ID", 10.0, 10.0);
        let mut page = boxes("ID", 10.0, 10.0);
        page.extend(boxes("ID", 300.0, 300.0));

        let area = RectangleF::new(0.0, 0.0, 50.0, 50.0);
        let found = find_matches(&pattern, &page, Some(area), tolerance(0.1));
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].primary().location(), PointF::new(10.0, 10.0));
    }

    #[test]
    fn test_failed_secondary_keeps_searching() {
        let pattern = boxes("AB", 0.0, 0.0);
        let mut page = boxes("A", 0.0, 0.0);
        page.extend(boxes("AB", 100.0, 0.0));

        let found = find_matches(&pattern, &page, None, tolerance(0.1));
        assert_eq!(found.len(), 1);
        assert_eq!(found[0].primary().location(), PointF::new(100.0, 0.0));
    }

    #[test]
    fn test_blank_pattern_matches_nothing() {
        let pattern = vec![CharBox::new(" ", RectangleF::new(0.0, 0.0, 3.0, 8.0))];
        let page = boxes("a b", 0.0, 0.0);
        assert!(find_matches(&pattern, &page, None, tolerance(1.0)).is_empty());
    }
}
