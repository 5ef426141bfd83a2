use crate::config::AnnotationConfig;
use crate::detector::BoundingBox;
use crate::error::{Error, Result};
use ab_glyph::{FontArc, FontVec, PxScale};
use image::{DynamicImage, ImageError, ImageFormat, ImageReader, Rgba};
use imageproc::drawing::{draw_hollow_rect_mut, draw_text_mut, text_size};
use imageproc::rect::Rect;
use log::{debug, info, warn};
use std::path::Path;

/// DejaVu Sans, used for labels unless `annotation.font_path` overrides it
static BUNDLED_FONT: &[u8] = include_bytes!("../../assets/fonts/DejaVuSans.ttf");

/// Label pixel height at font scale 1.0
const BASE_TEXT_PX: f32 = 22.0;
/// Gap between the label and the top edge of its box
const LABEL_OFFSET: i32 = 10;

/// Label font scale for a box of the given pixel height
pub fn font_scale(box_height: f32) -> f32 {
    (box_height / 100.0).clamp(0.5, 2.0)
}

/// Result of one annotation call
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AnnotationSummary {
    pub boxes_drawn: usize,
}

/// Draws person detections onto images
pub struct Annotator {
    font: FontArc,
    color: Rgba<u8>,
    thickness: u32,
}

impl Annotator {
    /// Create an annotator using the configured label font, or the bundled one
    pub fn new(config: &AnnotationConfig) -> Result<Self> {
        let font = match &config.font_path {
            Some(path) => {
                info!("Using label font {}", path.display());
                FontArc::new(load_font(path)?)
            }
            None => bundled_font()?,
        };
        Ok(Self::with_font(config, font))
    }

    pub fn with_font(config: &AnnotationConfig, font: FontArc) -> Self {
        let [r, g, b] = config.box_color;
        Self {
            font,
            color: Rgba([r, g, b, 255]),
            thickness: config.thickness.max(1),
        }
    }

    /// Draw the person boxes of `boxes` onto the image at `source` and write
    /// the result to `destination` in the source's encoding format.
    pub fn annotate(
        &self,
        source: &Path,
        boxes: &[BoundingBox],
        destination: &Path,
    ) -> Result<AnnotationSummary> {
        let (mut image, format) = decode_with_format(source)?;
        let boxes_drawn = self.draw(&mut image, boxes);

        let format = output_format(format.or_else(|| ImageFormat::from_path(destination).ok()));
        match image.save_with_format(destination, format) {
            Err(ImageError::Unsupported(e)) if format != ImageFormat::Png => {
                warn!(
                    "Cannot encode {} as {:?} ({}); writing PNG instead",
                    destination.display(),
                    format,
                    e
                );
                image.save_with_format(destination, ImageFormat::Png)
            }
            other => other,
        }
        .map_err(|e| {
            Error::Io(format!(
                "Failed to write annotated image {}: {}",
                destination.display(),
                e
            ))
        })?;

        debug!(
            "Wrote {} with {} person boxes",
            destination.display(),
            boxes_drawn
        );
        Ok(AnnotationSummary { boxes_drawn })
    }

    /// Draw person boxes in place, returning how many rectangles were drawn.
    /// Labels are numbered by position in `boxes`, not by person index.
    pub fn draw(&self, image: &mut DynamicImage, boxes: &[BoundingBox]) -> usize {
        let mut drawn = 0;
        for (idx, bbox) in boxes.iter().enumerate() {
            if !bbox.is_person() {
                continue;
            }

            let x1 = bbox.x1 as i32;
            let y1 = bbox.y1 as i32;
            let width = (bbox.x2 as i32 - x1).max(1) as u32;
            let height = (bbox.y2 as i32 - y1).max(1) as u32;
            self.draw_outline(image, x1, y1, width, height);
            drawn += 1;

            let text = format!("Person {}", idx + 1);
            let scale = label_scale(bbox);
            let (_, text_h) = text_size(scale, &self.font, &text);
            let text_y = (y1 - LABEL_OFFSET - text_h as i32).max(0);
            draw_text_mut(image, self.color, x1, text_y, scale, &self.font, &text);
        }
        drawn
    }

    fn draw_outline(&self, image: &mut DynamicImage, x: i32, y: i32, width: u32, height: u32) {
        for inset in 0..self.thickness {
            let shrink = inset * 2;
            if width <= shrink || height <= shrink {
                break;
            }
            let rect = Rect::at(x + inset as i32, y + inset as i32)
                .of_size(width - shrink, height - shrink);
            draw_hollow_rect_mut(image, rect, self.color);
        }
    }
}

fn label_scale(bbox: &BoundingBox) -> PxScale {
    PxScale::from(BASE_TEXT_PX * font_scale(bbox.height()))
}

/// Encoding used for the annotated copy. Formats this build can only decode
/// are written as PNG.
fn output_format(source: Option<ImageFormat>) -> ImageFormat {
    match source {
        Some(format) if format.writing_enabled() => format,
        _ => ImageFormat::Png,
    }
}

fn decode_with_format(path: &Path) -> Result<(DynamicImage, Option<ImageFormat>)> {
    let load_error = |e: &dyn std::fmt::Display| {
        Error::ImageLoad(format!(
            "Could not load image from path: {}: {}",
            path.display(),
            e
        ))
    };

    let reader = ImageReader::open(path)
        .map_err(|e| load_error(&e))?
        .with_guessed_format()
        .map_err(|e| load_error(&e))?;
    let format = reader.format();
    let image = reader.decode().map_err(|e| load_error(&e))?;
    Ok((image, format))
}

fn load_font(path: &Path) -> Result<FontVec> {
    let data = std::fs::read(path)
        .map_err(|e| Error::Config(format!("Failed to read font {}: {}", path.display(), e)))?;
    FontVec::try_from_vec(data)
        .map_err(|e| Error::Config(format!("Invalid font {}: {}", path.display(), e)))
}

fn bundled_font() -> Result<FontArc> {
    FontArc::try_from_slice(BUNDLED_FONT)
        .map_err(|e| Error::Config(format!("Invalid bundled font: {}", e)))
}
