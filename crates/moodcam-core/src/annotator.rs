//! Per-frame annotation: locate faces, classify each, draw the overlay.

use crate::classifier::EmotionClassifier;
use crate::detector::FaceLocator;
use crate::types::Region;
use ab_glyph::{Font, FontArc, PxScale, ScaleFont};
use image::{imageops, Rgb, RgbImage};
use imageproc::drawing::{draw_hollow_rect_mut, draw_text_mut};
use imageproc::rect::Rect;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;

pub const BOX_COLOR: Rgb<u8> = Rgb([255, 0, 0]);
pub const BOX_THICKNESS: u32 = 2;
/// Gap between the box top and the primary label baseline.
pub const LABEL_OFFSET: i32 = 10;
/// Distance between the box bottom and the first ranked line, and between lines.
pub const SCORE_LINE_SPACING: i32 = 20;
/// Number of ranked scores drawn under each face.
pub const TOP_SCORES: usize = 3;

pub const LABEL_STYLE: TextStyle = TextStyle { color: Rgb([255, 0, 0]), size: 27.0 };
pub const SCORE_STYLE: TextStyle = TextStyle { color: Rgb([255, 255, 255]), size: 15.0 };

/// DejaVu Sans, compiled in so text rendering never depends on the host.
static EMBEDDED_FONT: &[u8] = include_bytes!("../assets/DejaVuSans.ttf");

#[derive(Error, Debug)]
pub enum PainterError {
    #[error("failed to read font {path}: {source}")]
    FontRead {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("invalid font file: {0}")]
    InvalidFont(PathBuf),
    #[error("embedded overlay font is corrupt")]
    InvalidEmbeddedFont,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct TextStyle {
    pub color: Rgb<u8>,
    /// Pixel height of the rendered glyphs.
    pub size: f32,
}

/// Drawing backend for overlays.
pub trait Painter {
    fn rectangle(&mut self, frame: &mut RgbImage, region: Region, color: Rgb<u8>, thickness: u32);

    /// Draw `text` with its baseline at `baseline_y`, starting at `x`.
    fn text(&mut self, frame: &mut RgbImage, text: &str, x: i32, baseline_y: i32, style: TextStyle);
}

/// Draws boxes with `imageproc` and text with a TrueType font.
#[derive(Clone)]
pub struct OverlayPainter {
    font: FontArc,
}

impl OverlayPainter {
    /// Painter using the built-in DejaVu Sans.
    pub fn embedded() -> Result<Self, PainterError> {
        let font = FontArc::try_from_slice(EMBEDDED_FONT).map_err(|_| PainterError::InvalidEmbeddedFont)?;
        Ok(Self { font })
    }

    pub fn load(font_path: &Path) -> Result<Self, PainterError> {
        let bytes = std::fs::read(font_path).map_err(|source| PainterError::FontRead {
            path: font_path.to_path_buf(),
            source,
        })?;
        let font = FontArc::try_from_vec(bytes)
            .map_err(|_| PainterError::InvalidFont(font_path.to_path_buf()))?;

        tracing::info!(path = %font_path.display(), "loaded overlay font");
        Ok(Self { font })
    }

    /// Use the configured font if one is given and loads, else the built-in one.
    pub fn with_override(configured: Option<&Path>) -> Result<Self, PainterError> {
        if let Some(path) = configured {
            match Self::load(path) {
                Ok(painter) => return Ok(painter),
                Err(e) => tracing::warn!(error = %e, "falling back to built-in overlay font"),
            }
        }
        Self::embedded()
    }
}

impl Painter for OverlayPainter {
    fn rectangle(&mut self, frame: &mut RgbImage, region: Region, color: Rgb<u8>, thickness: u32) {
        draw_box(frame, region, color, thickness);
    }

    fn text(&mut self, frame: &mut RgbImage, text: &str, x: i32, baseline_y: i32, style: TextStyle) {
        let scale = PxScale::from(style.size);
        let ascent = self.font.as_scaled(scale).ascent();
        let top = baseline_y - ascent.round() as i32;
        draw_text_mut(frame, style.color, x, top, scale, &self.font, text);
    }
}

/// Draw a hollow box `thickness` pixels wide, growing inward from the region edge.
pub fn draw_box(frame: &mut RgbImage, region: Region, color: Rgb<u8>, thickness: u32) {
    for i in 0..thickness {
        let (w, h) = (region.width.saturating_sub(2 * i), region.height.saturating_sub(2 * i));
        if w == 0 || h == 0 {
            break;
        }
        let rect = Rect::at((region.x + i) as i32, (region.y + i) as i32).of_size(w, h);
        draw_hollow_rect_mut(frame, rect, color);
    }
}

/// Locates faces, classifies each one and draws the result into the frame.
pub struct FrameAnnotator<P> {
    locator: Arc<dyn FaceLocator>,
    classifier: EmotionClassifier,
    painter: P,
}

impl<P: Painter> FrameAnnotator<P> {
    pub fn new(locator: Arc<dyn FaceLocator>, classifier: EmotionClassifier, painter: P) -> Self {
        Self { locator, classifier, painter }
    }

    /// Annotate `frame` in place and hand it back.
    ///
    /// Faces are processed in detector order. Each face is cropped and
    /// classified before its own overlay is drawn, so a crop may include
    /// overlays of faces drawn earlier in the same frame. Calling this twice
    /// draws everything twice.
    pub fn annotate<'f>(&mut self, frame: &'f mut RgbImage) -> &'f mut RgbImage {
        let regions = match self.locator.locate(frame) {
            Ok(regions) => regions,
            Err(e) => {
                tracing::warn!(error = %e, "face location failed; streaming frame unannotated");
                return frame;
            }
        };

        for region in regions {
            let face = imageops::crop_imm(&*frame, region.x, region.y, region.width, region.height).to_image();
            let result = self.classifier.classify(&face);

            self.painter.rectangle(frame, region, BOX_COLOR, BOX_THICKNESS);

            let x = region.x as i32;
            self.painter
                .text(frame, &result.caption(), x, region.y as i32 - LABEL_OFFSET, LABEL_STYLE);

            let mut line_y = region.bottom() as i32 + SCORE_LINE_SPACING;
            for (key, pct) in result.top_scores(TOP_SCORES) {
                self.painter.text(frame, &format!("{key}: {pct:.1}%"), x, line_y, SCORE_STYLE);
                line_y += SCORE_LINE_SPACING;
            }
        }

        frame
    }
}
