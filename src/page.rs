//! Per-page extraction results.
//!
//! A [`Page`] is produced once per successful
//! [`crate::backend::PageExtractorBackend::image2page`] call and owned by
//! the caller from then on. Layout rectangles are in pixel coordinates of
//! the source image and never exceed its extent.

use crate::metering::OcrTokensMetering;
use crate::pipeline::postprocess::normalize_text;
use image::DynamicImage;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Role tag used for plain body text regions.
pub const TEXT_ROLE: &str = "text";

/// Pixel-space bounding rectangle: `(left, top, right, bottom)`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Rect {
    pub left: u32,
    pub top: u32,
    pub right: u32,
    pub bottom: u32,
}

impl Rect {
    pub const fn new(left: u32, top: u32, right: u32, bottom: u32) -> Self {
        Self {
            left,
            top,
            right,
            bottom,
        }
    }

    /// The whole image.
    pub const fn full(width: u32, height: u32) -> Self {
        Self::new(0, 0, width, height)
    }

    /// Clip into `[0, width] × [0, height]`, keeping `left <= right` and
    /// `top <= bottom`.
    pub fn clamp_to(self, width: u32, height: u32) -> Self {
        let right = self.right.min(width);
        let bottom = self.bottom.min(height);
        Self {
            left: self.left.min(right),
            top: self.top.min(bottom),
            right,
            bottom,
        }
    }

    pub fn width(&self) -> u32 {
        self.right.saturating_sub(self.left)
    }

    pub fn height(&self) -> u32 {
        self.bottom.saturating_sub(self.top)
    }

    pub fn as_tuple(&self) -> (u32, u32, u32, u32) {
        (self.left, self.top, self.right, self.bottom)
    }
}

/// One recognised text region.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PageLayout {
    /// Region role, e.g. `"text"`, `"title"`, `"table"`.
    pub role: String,
    pub det: Rect,
    /// Normalised text: no surrogates, trimmed.
    pub text: String,
    /// Reading order among layouts of the same page.
    pub order: usize,
    /// Content hash, for backends that deduplicate or cache regions.
    pub hash: Option<String>,
}

impl PageLayout {
    /// The single full-extent layout emitted by backends that cannot
    /// segment a page.
    pub fn degraded(width: u32, height: u32, text: &str) -> Self {
        Self {
            role: TEXT_ROLE.to_string(),
            det: Rect::full(width, height),
            text: normalize_text(Some(text)),
            order: 0,
            hash: None,
        }
    }
}

/// The result of extracting one page image.
#[derive(Debug, Clone)]
pub struct Page {
    /// Zero-based page index, copied verbatim from the request.
    pub index: usize,
    /// Source image, retained only when the request asked for it.
    pub image: Option<DynamicImage>,
    pub body_layouts: Vec<PageLayout>,
    /// Empty when the backend cannot tell footnotes from body text.
    pub footnotes_layouts: Vec<PageLayout>,
    pub input_tokens: u64,
    pub output_tokens: u64,
}

impl Page {
    pub fn metering(&self) -> OcrTokensMetering {
        OcrTokensMetering::new(self.input_tokens, self.output_tokens)
    }

    /// Body text in reading order, regions separated by blank lines.
    pub fn body_text(&self) -> String {
        let mut layouts: Vec<&PageLayout> = self.body_layouts.iter().collect();
        layouts.sort_by_key(|l| l.order);
        layouts
            .iter()
            .map(|l| l.text.as_str())
            .filter(|t| !t.is_empty())
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

/// DeepSeek-OCR resolution mode. Only meaningful to local engines.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OcrSize {
    Tiny,
    Small,
    Base,
    Large,
    /// Dynamic tiling (default).
    #[default]
    Gundam,
}

/// Handle to the store where backends register extracted assets
/// (figures, table crops). Opaque to the remote backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AssetHub {
    root: PathBuf,
}

impl AssetHub {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Path an asset with the given content hash would be stored at.
    pub fn asset_path(&self, hash: &str, extension: &str) -> PathBuf {
        self.root.join(format!("{hash}.{extension}"))
    }
}
