//! Frame type, decoding and annotation.

use ab_glyph::{FontVec, PxScale};
use image::imageops::{self, FilterType};
use image::{ImageFormat, Rgb, RgbImage};
use imageproc::drawing::{draw_hollow_rect_mut, draw_text_mut};
use imageproc::rect::Rect;
use std::path::Path;
use watchpost_core::BoundingBox;

/// Box and label color for a recognized face.
pub const KNOWN_COLOR: Rgb<u8> = Rgb([0, 255, 0]);
/// Box and label color for an unrecognized face.
pub const INTRUDER_COLOR: Rgb<u8> = Rgb([255, 0, 0]);

const LABEL_SCALE: f32 = 22.0;
const LABEL_GAP: i32 = 10;

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("image decode/encode failed: {0}")]
    Image(#[from] image::ImageError),
    #[error("empty frame")]
    Empty,
}

/// A decoded RGB camera frame.
#[derive(Debug, Clone)]
pub struct Frame {
    pub image: RgbImage,
    pub captured_at: chrono::DateTime<chrono::Utc>,
}

impl Frame {
    pub fn new(image: RgbImage) -> Self {
        Self {
            image,
            captured_at: chrono::Utc::now(),
        }
    }

    /// Decode an encoded still (JPEG, PNG, ...) into an RGB frame.
    pub fn decode(bytes: &[u8]) -> Result<Self, FrameError> {
        let image = image::load_from_memory(bytes)?.to_rgb8();
        if image.width() == 0 || image.height() == 0 {
            return Err(FrameError::Empty);
        }
        Ok(Self::new(image))
    }

    pub fn width(&self) -> u32 {
        self.image.width()
    }

    pub fn height(&self) -> u32 {
        self.image.height()
    }

    /// Bilinear downscale by `factor` (e.g. 0.25 for quarter size).
    pub fn downscale(&self, factor: f32) -> RgbImage {
        downscale(&self.image, factor)
    }
}

/// Bilinear resize by `factor`, never below 1×1.
pub fn downscale(image: &RgbImage, factor: f32) -> RgbImage {
    let w = ((image.width() as f32 * factor).round() as u32).max(1);
    let h = ((image.height() as f32 * factor).round() as u32).max(1);
    if (w, h) == image.dimensions() {
        return image.clone();
    }
    imageops::resize(image, w, h, FilterType::Triangle)
}

/// Write an RGB image as JPEG.
pub fn save_jpeg(image: &RgbImage, path: &Path) -> Result<(), FrameError> {
    image.save_with_format(path, ImageFormat::Jpeg)?;
    Ok(())
}

/// Draws face boxes and name labels onto frames.
///
/// Labels need a TrueType font; without one only boxes are drawn.
pub struct Annotator {
    font: Option<FontVec>,
}

impl Annotator {
    pub fn new(font_path: Option<&Path>) -> Self {
        let font = font_path.and_then(|path| {
            let bytes = match std::fs::read(path) {
                Ok(bytes) => bytes,
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "label font unreadable; drawing boxes only");
                    return None;
                }
            };
            match FontVec::try_from_vec(bytes) {
                Ok(font) => Some(font),
                Err(e) => {
                    tracing::warn!(path = %path.display(), error = %e, "invalid label font; drawing boxes only");
                    None
                }
            }
        });
        Self { font }
    }

    /// Annotator that never draws labels.
    pub fn boxes_only() -> Self {
        Self { font: None }
    }

    pub fn has_font(&self) -> bool {
        self.font.is_some()
    }

    /// Draw a 2px box around `bbox` with `label` above its top-left corner.
    pub fn draw(&self, image: &mut RgbImage, bbox: &BoundingBox, label: &str, color: Rgb<u8>) {
        let left = bbox.x.round() as i32;
        let top = bbox.y.round() as i32;
        let width = bbox.width.round().max(1.0) as u32;
        let height = bbox.height.round().max(1.0) as u32;

        draw_hollow_rect_mut(image, Rect::at(left, top).of_size(width, height), color);
        if width > 2 && height > 2 {
            draw_hollow_rect_mut(
                image,
                Rect::at(left + 1, top + 1).of_size(width - 2, height - 2),
                color,
            );
        }

        if let Some(font) = &self.font {
            let y = (top - LABEL_GAP - LABEL_SCALE as i32).max(0);
            draw_text_mut(image, color, left.max(0), y, PxScale::from(LABEL_SCALE), font, label);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Cursor;

    fn bbox(x: f32, y: f32, w: f32, h: f32) -> BoundingBox {
        BoundingBox {
            x,
            y,
            width: w,
            height: h,
            confidence: 1.0,
            landmarks: None,
        }
    }

    #[test]
    fn test_decode_jpeg() {
        let image = RgbImage::from_pixel(16, 8, Rgb([10, 20, 30]));
        let mut bytes = Vec::new();
        image.write_to(&mut Cursor::new(&mut bytes), ImageFormat::Jpeg).unwrap();

        let frame = Frame::decode(&bytes).unwrap();
        assert_eq!((frame.width(), frame.height()), (16, 8));
    }

    #[test]
    fn test_decode_garbage_fails() {
        assert!(matches!(Frame::decode(b"not an image"), Err(FrameError::Image(_))));
    }

    #[test]
    fn test_downscale_quarter() {
        let frame = Frame::new(RgbImage::new(640, 480));
        assert_eq!(frame.downscale(0.25).dimensions(), (160, 120));
    }

    #[test]
    fn test_downscale_never_empty() {
        let image = RgbImage::new(2, 2);
        assert_eq!(downscale(&image, 0.1).dimensions(), (1, 1));
    }

    #[test]
    fn test_draw_box_outline() {
        let mut image = RgbImage::new(50, 50);
        Annotator::boxes_only().draw(&mut image, &bbox(10.0, 10.0, 20.0, 20.0), "Intruder", INTRUDER_COLOR);

        assert_eq!(*image.get_pixel(10, 10), INTRUDER_COLOR);
        assert_eq!(*image.get_pixel(11, 15), INTRUDER_COLOR);
        assert_eq!(*image.get_pixel(29, 29), INTRUDER_COLOR);
        // Interior untouched
        assert_eq!(*image.get_pixel(20, 20), Rgb([0, 0, 0]));
    }

    #[test]
    fn test_draw_box_partially_outside() {
        let mut image = RgbImage::new(20, 20);
        Annotator::boxes_only().draw(&mut image, &bbox(-5.0, -5.0, 40.0, 40.0), "John", KNOWN_COLOR);
        assert_eq!(*image.get_pixel(10, 10), Rgb([0, 0, 0]));
    }

    #[test]
    fn test_missing_font_falls_back_to_boxes() {
        let annotator = Annotator::new(Some(Path::new("/nonexistent/font.ttf")));
        assert!(!annotator.has_font());
    }

    #[test]
    fn test_save_jpeg() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out.jpg");
        save_jpeg(&RgbImage::new(8, 8), &path).unwrap();
        assert_eq!(image::open(&path).unwrap().width(), 8);
    }
}
