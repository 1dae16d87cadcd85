//! Grayscale reference images stored inside templates.

use image::{DynamicImage, GrayImage};
use serde::{Deserialize, Serialize};

/// A grayscale raster snippet, row-major, one byte per pixel.
///
/// Snippets are captured from a page bitmap at template-authoring time and
/// compared against the live bitmap when an image anchor is resolved.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(try_from = "RawSnippet", into = "RawSnippet")]
pub struct ImageSnippet {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

#[derive(Serialize, Deserialize)]
struct RawSnippet {
    width: u32,
    height: u32,
    pixels: Vec<u8>,
}

impl TryFrom<RawSnippet> for ImageSnippet {
    type Error = String;

    fn try_from(raw: RawSnippet) -> Result<Self, Self::Error> {
        Self::new(raw.width, raw.height, raw.pixels).ok_or_else(|| {
            format!(
                "snippet of {}x{} needs {} pixels",
                raw.width,
                raw.height,
                raw.width as usize * raw.height as usize
            )
        })
    }
}

impl From<ImageSnippet> for RawSnippet {
    fn from(s: ImageSnippet) -> Self {
        Self {
            width: s.width,
            height: s.height,
            pixels: s.pixels,
        }
    }
}

impl ImageSnippet {
    /// Create a snippet; `None` if the buffer does not match the dimensions
    /// or the snippet would be empty.
    pub fn new(width: u32, height: u32, pixels: Vec<u8>) -> Option<Self> {
        if width == 0 || height == 0 || pixels.len() != width as usize * height as usize {
            return None;
        }
        Some(Self {
            width,
            height,
            pixels,
        })
    }

    /// Capture a snippet from any image (converted to 8-bit luma).
    pub fn from_image(image: &DynamicImage) -> Option<Self> {
        let gray = image.to_luma8();
        let (width, height) = gray.dimensions();
        Self::new(width, height, gray.into_raw())
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn pixels(&self) -> &[u8] {
        &self.pixels
    }

    pub fn pixel_count(&self) -> usize {
        self.pixels.len()
    }

    /// Brightness at (x, y).
    pub fn get(&self, x: u32, y: u32) -> u8 {
        self.pixels[(y * self.width + x) as usize]
    }

    pub fn to_gray_image(&self) -> GrayImage {
        GrayImage::from_raw(self.width, self.height, self.pixels.clone())
            .unwrap_or_else(|| GrayImage::new(self.width, self.height))
    }
}

impl From<&GrayImage> for ImageSnippet {
    fn from(image: &GrayImage) -> Self {
        Self {
            width: image.width(),
            height: image.height(),
            pixels: image.as_raw().clone(),
        }
    }
}
