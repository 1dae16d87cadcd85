//! Template data model: anchors, marks and fields for one document layout.

use std::collections::{HashMap, HashSet};
use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::debug;

use super::geometry::{PointF, RectangleF};
use super::snippet::ImageSnippet;
use crate::error::TemplateError;

/// Identifier of an anchor, unique within a template.
pub type AnchorId = i32;

/// Kind of content an anchor, mark or field deals with.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EntityType {
    /// Text taken from the PDF character stream.
    PdfText,
    /// Text recognized from the page bitmap.
    OcrText,
    /// Raw image region of the page bitmap.
    ImageData,
}

/// Page rotation applied before anything is searched.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub enum PageRotation {
    #[default]
    None,
    Clockwise90,
    Clockwise180,
    Clockwise270,
    AutoDetection,
}

/// Parsing rules for one document layout.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Template {
    /// Template name.
    pub name: String,

    /// Rotation the page data provider applies to the bitmap.
    #[serde(default)]
    pub page_rotation: PageRotation,

    /// Whether the provider deskews the bitmap.
    #[serde(default)]
    pub auto_deskew: bool,

    /// Deskew sensitivity passed through to the provider.
    #[serde(default = "default_auto_deskew_threshold")]
    pub auto_deskew_threshold: i32,

    /// Horizontal gap (PDF units) above which a space is inserted when
    /// assembling text from character boxes.
    #[serde(default = "default_text_auto_insert_space_threshold")]
    pub text_auto_insert_space_threshold: f32,

    #[serde(default)]
    pub anchors: Vec<Anchor>,

    #[serde(default)]
    pub marks: Vec<Mark>,

    #[serde(default)]
    pub fields: Vec<Field>,
}

fn default_auto_deskew_threshold() -> i32 {
    100
}

fn default_text_auto_insert_space_threshold() -> f32 {
    6.0
}

impl Template {
    /// Create an empty template.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            page_rotation: PageRotation::None,
            auto_deskew: false,
            auto_deskew_threshold: default_auto_deskew_threshold(),
            text_auto_insert_space_threshold: default_text_auto_insert_space_threshold(),
            anchors: Vec::new(),
            marks: Vec::new(),
            fields: Vec::new(),
        }
    }

    /// Parse and validate a template from JSON.
    pub fn from_json(json: &str) -> Result<Self, TemplateError> {
        let template: Template =
            serde_json::from_str(json).map_err(|e| TemplateError::Parse(e.to_string()))?;
        template.validate()?;
        Ok(template)
    }

    /// Load and validate a template from a JSON file.
    pub fn from_file(path: &Path) -> crate::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let template = Self::from_json(&content)?;
        debug!(
            "Loaded template '{}' from {}: {} anchors, {} marks, {} fields",
            template.name,
            path.display(),
            template.anchors.len(),
            template.marks.len(),
            template.fields.len()
        );
        Ok(template)
    }

    /// Save the template as pretty-printed JSON.
    pub fn save(&self, path: &Path) -> crate::Result<()> {
        let content = serde_json::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Check every structural invariant and build the anchor index.
    pub fn validate(&self) -> Result<AnchorIndex, TemplateError> {
        let index = AnchorIndex::build(&self.anchors)?;

        for mark in &self.marks {
            if let Some(id) = mark.anchor_id {
                index.require(id, || "mark".to_string())?;
            }
        }

        for field in &self.fields {
            for id in field.referenced_anchors() {
                index.require(id, || format!("field '{}'", field.name))?;
            }
        }

        Ok(index)
    }

    /// Find an anchor by id.
    pub fn anchor(&self, id: AnchorId) -> Option<&Anchor> {
        self.anchors.iter().find(|a| a.id == id)
    }

    /// All fields with the given name, in template order.
    pub fn fields_named<'a>(&'a self, name: &'a str) -> impl Iterator<Item = &'a Field> + 'a {
        self.fields.iter().filter(move |f| f.name == name)
    }

    /// Distinct field names in template order.
    pub fn field_names(&self) -> Vec<&str> {
        let mut seen = HashSet::new();
        self.fields
            .iter()
            .map(|f| f.name.as_str())
            .filter(|n| seen.insert(*n))
            .collect()
    }
}

/// Flat arena of a template's anchors keyed by id.
///
/// Building the index is where duplicate ids, dangling parents and parent
/// cycles are rejected, so traversal never has to guard against them.
#[derive(Debug, Clone, Default)]
pub struct AnchorIndex {
    positions: HashMap<AnchorId, usize>,
    parents: Vec<Option<usize>>,
}

impl AnchorIndex {
    /// Index a list of anchors.
    pub fn build(anchors: &[Anchor]) -> Result<Self, TemplateError> {
        let mut positions = HashMap::with_capacity(anchors.len());
        for (i, anchor) in anchors.iter().enumerate() {
            if positions.insert(anchor.id, i).is_some() {
                return Err(TemplateError::DuplicateAnchorId(anchor.id));
            }
        }

        let mut parents = Vec::with_capacity(anchors.len());
        for anchor in anchors {
            let parent = match anchor.parent_anchor_id {
                Some(pid) => Some(*positions.get(&pid).ok_or_else(|| {
                    TemplateError::UnknownAnchor {
                        referrer: format!("anchor {}", anchor.id),
                        anchor_id: pid,
                    }
                })?),
                None => None,
            };
            parents.push(parent);
        }

        let index = Self { positions, parents };
        index.check_acyclic(anchors)?;
        Ok(index)
    }

    fn check_acyclic(&self, anchors: &[Anchor]) -> Result<(), TemplateError> {
        let mut terminated: HashSet<usize> = HashSet::new();

        for start in 0..anchors.len() {
            let mut path: Vec<usize> = Vec::new();
            let mut on_path: HashSet<usize> = HashSet::new();
            let mut current = Some(start);

            while let Some(i) = current {
                if terminated.contains(&i) {
                    break;
                }
                if !on_path.insert(i) {
                    let mut chain: Vec<AnchorId> = path.iter().map(|&p| anchors[p].id).collect();
                    chain.push(anchors[i].id);
                    return Err(TemplateError::ParentCycle(chain));
                }
                path.push(i);
                current = self.parents[i];
            }

            terminated.extend(path);
        }

        Ok(())
    }

    fn require(&self, id: AnchorId, referrer: impl FnOnce() -> String) -> Result<(), TemplateError> {
        if self.positions.contains_key(&id) {
            Ok(())
        } else {
            Err(TemplateError::UnknownAnchor {
                referrer: referrer(),
                anchor_id: id,
            })
        }
    }

    /// Arena position of an anchor id.
    pub fn position(&self, id: AnchorId) -> Option<usize> {
        self.positions.get(&id).copied()
    }

    /// Positions of the anchor and all its ancestors, anchor first, root last.
    pub fn chain(&self, id: AnchorId) -> Option<Vec<usize>> {
        let mut chain = vec![self.position(id)?];
        while let Some(parent) = chain.last().and_then(|&i| self.parents[i]) {
            chain.push(parent);
        }
        Some(chain)
    }

    /// Arena position of the anchor's parent.
    pub fn parent(&self, position: usize) -> Option<usize> {
        self.parents.get(position).copied().flatten()
    }

    pub fn len(&self) -> usize {
        self.parents.len()
    }

    pub fn is_empty(&self) -> bool {
        self.parents.is_empty()
    }
}

/// A character with its bounding rectangle.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CharBox {
    /// The character (a string so ligatures survive).
    #[serde(rename = "char")]
    pub text: String,
    pub rectangle: RectangleF,
}

impl CharBox {
    pub fn new(text: impl Into<String>, rectangle: RectangleF) -> Self {
        Self {
            text: text.into(),
            rectangle,
        }
    }

    /// Whitespace boxes carry no shape and are never matched.
    pub fn is_blank(&self) -> bool {
        self.text.trim().is_empty()
    }
}

/// The char boxes of a text pattern that take part in matching.
pub fn significant_char_boxes(char_boxes: &[CharBox]) -> impl Iterator<Item = &CharBox> {
    char_boxes.iter().filter(|c| !c.is_blank())
}

/// A reference image with its expected location.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImageBox {
    pub image_data: ImageSnippet,
    pub rectangle: RectangleF,
}

/// A landmark used as a coordinate origin for fields.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Anchor {
    pub id: AnchorId,

    /// Pixels added around the authored area to form the search region.
    /// Negative means the whole page is searched.
    #[serde(default = "default_search_rectangle_margin")]
    pub search_rectangle_margin: i32,

    /// Allowed displacement of secondary elements relative to the primary.
    #[serde(default = "default_position_deviation")]
    pub position_deviation: f32,

    /// Whether `position_deviation` is in page units or a fraction of the
    /// element size.
    #[serde(default = "default_true")]
    pub position_deviation_is_absolute: bool,

    /// Anchor whose resolved position this anchor's search region follows.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_anchor_id: Option<AnchorId>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub group: Option<String>,

    #[serde(flatten)]
    pub pattern: AnchorPattern,
}

fn default_search_rectangle_margin() -> i32 {
    -1
}

fn default_position_deviation() -> f32 {
    0.1
}

fn default_true() -> bool {
    true
}

/// What an anchor looks for.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum AnchorPattern {
    PdfText {
        #[serde(default)]
        char_boxes: Vec<CharBox>,
    },
    OcrText {
        #[serde(default)]
        char_boxes: Vec<CharBox>,
    },
    ImageData(ImagePattern),
}

/// Image anchor pattern with its matching tolerances.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImagePattern {
    #[serde(default)]
    pub image_boxes: Vec<ImageBox>,

    /// Brightness delta tolerated per pixel, as a fraction of full scale.
    #[serde(default = "default_anchor_brightness_tolerance")]
    pub brightness_tolerance: f32,

    /// Fraction of pixels allowed to exceed `brightness_tolerance`.
    #[serde(default = "default_anchor_different_pixel_number_tolerance")]
    pub different_pixel_number_tolerance: f32,

    /// Return the best-scoring position instead of the first acceptable one.
    #[serde(default)]
    pub find_best_image_match: bool,
}

fn default_anchor_brightness_tolerance() -> f32 {
    0.20
}

fn default_anchor_different_pixel_number_tolerance() -> f32 {
    0.15
}

impl ImagePattern {
    pub fn new(image_boxes: Vec<ImageBox>) -> Self {
        Self {
            image_boxes,
            brightness_tolerance: default_anchor_brightness_tolerance(),
            different_pixel_number_tolerance: default_anchor_different_pixel_number_tolerance(),
            find_best_image_match: false,
        }
    }
}

impl Anchor {
    fn with_pattern(id: AnchorId, pattern: AnchorPattern) -> Self {
        Self {
            id,
            search_rectangle_margin: default_search_rectangle_margin(),
            position_deviation: default_position_deviation(),
            position_deviation_is_absolute: true,
            parent_anchor_id: None,
            group: None,
            pattern,
        }
    }

    /// Text anchor over the PDF character stream.
    pub fn pdf_text(id: AnchorId, char_boxes: Vec<CharBox>) -> Self {
        Self::with_pattern(id, AnchorPattern::PdfText { char_boxes })
    }

    /// Text anchor over OCR character boxes.
    pub fn ocr_text(id: AnchorId, char_boxes: Vec<CharBox>) -> Self {
        Self::with_pattern(id, AnchorPattern::OcrText { char_boxes })
    }

    /// Image anchor.
    pub fn image(id: AnchorId, pattern: ImagePattern) -> Self {
        Self::with_pattern(id, AnchorPattern::ImageData(pattern))
    }

    pub fn with_parent(mut self, parent: AnchorId) -> Self {
        self.parent_anchor_id = Some(parent);
        self
    }

    pub fn with_search_margin(mut self, margin: i32) -> Self {
        self.search_rectangle_margin = margin;
        self
    }

    pub fn with_deviation(mut self, deviation: f32, absolute: bool) -> Self {
        self.position_deviation = deviation;
        self.position_deviation_is_absolute = absolute;
        self
    }

    /// Variant discriminator.
    pub fn anchor_type(&self) -> EntityType {
        match self.pattern {
            AnchorPattern::PdfText { .. } => EntityType::PdfText,
            AnchorPattern::OcrText { .. } => EntityType::OcrText,
            AnchorPattern::ImageData(_) => EntityType::ImageData,
        }
    }

    /// Whether a defining pattern has been recorded.
    pub fn is_set(&self) -> bool {
        match &self.pattern {
            AnchorPattern::PdfText { char_boxes } | AnchorPattern::OcrText { char_boxes } => {
                !char_boxes.is_empty()
            }
            AnchorPattern::ImageData(p) => !p.image_boxes.is_empty(),
        }
    }

    /// Primary rectangle as authored: the union of the non-blank char boxes
    /// for text anchors, the first image box for image anchors.
    pub fn authored_rectangle(&self) -> Option<RectangleF> {
        match &self.pattern {
            AnchorPattern::PdfText { char_boxes } | AnchorPattern::OcrText { char_boxes } => {
                RectangleF::union_all(significant_char_boxes(char_boxes).map(|c| &c.rectangle))
            }
            AnchorPattern::ImageData(p) => p.image_boxes.first().map(|b| b.rectangle),
        }
    }

    /// Top-left corner of the authored primary rectangle.
    pub fn authored_position(&self) -> Option<PointF> {
        self.authored_rectangle().map(|r| r.location())
    }

    /// Area covered by every element of the pattern.
    pub fn authored_extent(&self) -> Option<RectangleF> {
        match &self.pattern {
            AnchorPattern::PdfText { .. } | AnchorPattern::OcrText { .. } => {
                self.authored_rectangle()
            }
            AnchorPattern::ImageData(p) => {
                RectangleF::union_all(p.image_boxes.iter().map(|b| &b.rectangle))
            }
        }
    }

    /// Literal text of a text anchor.
    pub fn text(&self) -> Option<String> {
        match &self.pattern {
            AnchorPattern::PdfText { char_boxes } | AnchorPattern::OcrText { char_boxes } => {
                Some(char_boxes.iter().map(|c| c.text.as_str()).collect())
            }
            AnchorPattern::ImageData(_) => None,
        }
    }
}

/// An authored sample of what an anchor or field looked like.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Mark {
    /// When set, `rectangle` is relative to this anchor's position.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anchor_id: Option<AnchorId>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rectangle: Option<RectangleF>,

    #[serde(flatten)]
    pub content: MarkContent,
}

/// Content recorded by a mark.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type")]
pub enum MarkContent {
    PdfText {
        #[serde(default)]
        text: String,
    },
    OcrText {
        #[serde(default)]
        text: String,
    },
    ImageData {
        #[serde(default, skip_serializing_if = "Option::is_none")]
        image_data: Option<ImageSnippet>,
        #[serde(default = "default_mark_brightness_tolerance")]
        brightness_tolerance: f32,
        #[serde(default = "default_mark_different_pixel_number_tolerance")]
        different_pixel_number_tolerance: f32,
        #[serde(default)]
        find_best_image_match: bool,
    },
}

fn default_mark_brightness_tolerance() -> f32 {
    0.4
}

fn default_mark_different_pixel_number_tolerance() -> f32 {
    0.02
}

impl Mark {
    pub fn new(content: MarkContent) -> Self {
        Self {
            anchor_id: None,
            rectangle: None,
            content,
        }
    }

    /// Empty image mark with default tolerances.
    pub fn image() -> Self {
        Self::new(MarkContent::ImageData {
            image_data: None,
            brightness_tolerance: default_mark_brightness_tolerance(),
            different_pixel_number_tolerance: default_mark_different_pixel_number_tolerance(),
            find_best_image_match: false,
        })
    }

    pub fn mark_type(&self) -> EntityType {
        match self.content {
            MarkContent::PdfText { .. } => EntityType::PdfText,
            MarkContent::OcrText { .. } => EntityType::OcrText,
            MarkContent::ImageData { .. } => EntityType::ImageData,
        }
    }

    pub fn is_set(&self) -> bool {
        self.anchor_id.is_some() || self.rectangle.is_some()
    }
}

/// A named value to extract.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Field {
    pub name: String,

    /// Extraction method.
    #[serde(rename = "type")]
    pub field_type: EntityType,

    /// Authored rectangle; relative to `anchor_id` when that is set.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub rectangle: Option<RectangleF>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub anchor_id: Option<AnchorId>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub left_anchor_id: Option<AnchorId>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub top_anchor_id: Option<AnchorId>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub right_anchor_id: Option<AnchorId>,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub bottom_anchor_id: Option<AnchorId>,
}

impl Field {
    pub fn new(name: impl Into<String>, field_type: EntityType, rectangle: RectangleF) -> Self {
        Self {
            name: name.into(),
            field_type,
            rectangle: Some(rectangle),
            anchor_id: None,
            left_anchor_id: None,
            top_anchor_id: None,
            right_anchor_id: None,
            bottom_anchor_id: None,
        }
    }

    pub fn with_origin_anchor(mut self, id: AnchorId) -> Self {
        self.anchor_id = Some(id);
        self
    }

    pub fn with_left_anchor(mut self, id: AnchorId) -> Self {
        self.left_anchor_id = Some(id);
        self
    }

    pub fn with_top_anchor(mut self, id: AnchorId) -> Self {
        self.top_anchor_id = Some(id);
        self
    }

    pub fn with_right_anchor(mut self, id: AnchorId) -> Self {
        self.right_anchor_id = Some(id);
        self
    }

    pub fn with_bottom_anchor(mut self, id: AnchorId) -> Self {
        self.bottom_anchor_id = Some(id);
        self
    }

    pub fn is_set(&self) -> bool {
        self.rectangle.is_some()
    }

    /// Every anchor id this field depends on.
    pub fn referenced_anchors(&self) -> impl Iterator<Item = AnchorId> {
        [
            self.anchor_id,
            self.left_anchor_id,
            self.top_anchor_id,
            self.right_anchor_id,
            self.bottom_anchor_id,
        ]
        .into_iter()
        .flatten()
    }
}
