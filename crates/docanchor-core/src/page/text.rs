//! Text assembly from character boxes and whitespace normalization.

use lazy_static::lazy_static;
use regex::Regex;

use crate::models::geometry::RectangleF;
use crate::models::template::CharBox;

lazy_static! {
    static ref HORIZONTAL_SPACE: Regex = Regex::new(r"[ \t\u{00A0}\u{2007}\u{202F}]+").unwrap();
}

/// A line of characters being assembled.
struct Line<'a> {
    top: f32,
    bottom: f32,
    chars: Vec<&'a CharBox>,
}

impl Line<'_> {
    fn accepts(&self, rectangle: &RectangleF) -> bool {
        let center = rectangle.y + rectangle.height / 2.0;
        center >= self.top && center <= self.bottom
    }
}

/// Text of the characters whose top-left corner lies inside `rectangle`.
///
/// Characters are grouped into lines by vertical overlap and read left to
/// right. A space is inserted between two characters when the gap between
/// them is wider than `auto_space_threshold`; a threshold of zero or less
/// disables inferred spaces.
pub fn text_in_rectangle(
    char_boxes: &[CharBox],
    rectangle: RectangleF,
    auto_space_threshold: f32,
) -> String {
    let mut inside: Vec<&CharBox> = char_boxes
        .iter()
        .filter(|c| rectangle.contains_point(c.rectangle.location()))
        .collect();
    inside.sort_by(|a, b| {
        a.rectangle
            .y
            .total_cmp(&b.rectangle.y)
            .then(a.rectangle.x.total_cmp(&b.rectangle.x))
    });

    let mut lines: Vec<Line> = Vec::new();
    for cb in inside {
        match lines.iter_mut().find(|l| l.accepts(&cb.rectangle)) {
            Some(line) => {
                line.top = line.top.min(cb.rectangle.y);
                line.bottom = line.bottom.max(cb.rectangle.bottom());
                line.chars.push(cb);
            }
            None => lines.push(Line {
                top: cb.rectangle.y,
                bottom: cb.rectangle.bottom(),
                chars: vec![cb],
            }),
        }
    }
    lines.sort_by(|a, b| a.top.total_cmp(&b.top));

    lines
        .iter_mut()
        .map(|line| {
            line.chars
                .sort_by(|a, b| a.rectangle.x.total_cmp(&b.rectangle.x));
            assemble_line(&line.chars, auto_space_threshold)
        })
        .collect::<Vec<_>>()
        .join("\n")
}

fn assemble_line(chars: &[&CharBox], auto_space_threshold: f32) -> String {
    let mut text = String::new();
    let mut previous: Option<&CharBox> = None;

    for cb in chars {
        if let Some(prev) = previous {
            let gap = cb.rectangle.x - prev.rectangle.right();
            if auto_space_threshold > 0.0
                && gap > auto_space_threshold
                && !text.ends_with(' ')
                && !cb.text.starts_with(' ')
            {
                text.push(' ');
            }
        }
        text.push_str(&cb.text);
        previous = Some(cb);
    }

    text
}

/// Normalize whitespace the same way for PDF and OCR text.
///
/// Line breaks become `\n`, runs of horizontal whitespace collapse to one
/// space, lines are trimmed and blank lines dropped.
pub fn normalize_text(text: &str) -> String {
    text.replace("\r\n", "\n")
        .replace('\r', "\n")
        .lines()
        .map(|line| HORIZONTAL_SPACE.replace_all(line, " ").trim().to_string())
        .filter(|line| !line.is_empty())
        .collect::<Vec<_>>()
        .join("\n")
}
