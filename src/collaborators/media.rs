//! Image upload processing: downscale oversized photos, report the
//! dimensions the client should render the embed at.
//!
//! GIFs are passed through untouched (re-encoding would break the
//! animation); JPEG and PNG are decoded, downscaled if they exceed the
//! configured maximum, and re-encoded.

use image::imageops::FilterType;
use image::{GenericImageView, ImageFormat};
use std::io::Cursor;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ImageError {
    #[error("unsupported image type: {0}")]
    UnsupportedType(String),
    #[error("failed to decode image: {0}")]
    Decode(#[from] image::ImageError),
}

pub struct ProcessedImage {
    pub bytes: Vec<u8>,
    pub width: u32,
    pub height: u32,
}

pub struct ImageProcessor {
    pub max_width: u32,
    pub preview_width: u32,
}

impl Default for ImageProcessor {
    fn default() -> Self {
        ImageProcessor {
            max_width: 1280,
            preview_width: 640,
        }
    }
}

impl ImageProcessor {
    /// `declared_type` is the MIME type the client claimed (`image/jpeg`,
    /// `image/gif`, `image/png`); anything else is rejected before decoding.
    pub fn process(&self, declared_type: &str, data: &[u8]) -> Result<ProcessedImage, ImageError> {
        let format = match declared_type {
            "image/jpeg" => ImageFormat::Jpeg,
            "image/png" => ImageFormat::Png,
            "image/gif" => ImageFormat::Gif,
            other => return Err(ImageError::UnsupportedType(other.to_string())),
        };

        let decoded = image::load_from_memory_with_format(data, format)?;
        let (width, height) = (decoded.width(), decoded.height());

        if format == ImageFormat::Gif {
            // Re-encoding would discard animation frames; ship it as-is.
            return Ok(ProcessedImage {
                bytes: data.to_vec(),
                width,
                height,
            });
        }

        let (target_w, target_h) = scaled_dimensions(width, height, self.max_width);
        let resized = if target_w < width {
            decoded.resize(target_w, target_h, FilterType::Triangle)
        } else {
            decoded
        };

        let mut buf = Cursor::new(Vec::new());
        resized.write_to(&mut buf, format)?;

        Ok(ProcessedImage {
            bytes: buf.into_inner(),
            width: resized.width(),
            height: resized.height(),
        })
    }

    /// The smaller preview size a client should display the embed at before
    /// the user expands it to full size.
    pub fn preview_dimensions(&self, width: u32, height: u32) -> (u32, u32) {
        scaled_dimensions(width, height, self.preview_width)
    }
}

fn scaled_dimensions(width: u32, height: u32, max_longest_edge: u32) -> (u32, u32) {
    if width == 0 || height == 0 {
        return (width, height);
    }
    if width >= height {
        if width > max_longest_edge {
            let new_height = ((height as f64 / width as f64) * max_longest_edge as f64) as u32;
            return (max_longest_edge, new_height.max(1));
        }
    } else if height > max_longest_edge {
        let new_width = ((width as f64 / height as f64) * max_longest_edge as f64) as u32;
        return (new_width.max(1), max_longest_edge);
    }
    (width, height)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsupported_type_is_rejected_before_decode() {
        let processor = ImageProcessor::default();
        let err = processor.process("image/webp", b"not-real-data").unwrap_err();
        assert!(matches!(err, ImageError::UnsupportedType(_)));
    }

    #[test]
    fn scaled_dimensions_keeps_small_images_unchanged() {
        assert_eq!(scaled_dimensions(100, 50, 1280), (100, 50));
    }

    #[test]
    fn scaled_dimensions_caps_the_longest_edge() {
        let (w, h) = scaled_dimensions(2560, 1280, 1280);
        assert_eq!(w, 1280);
        assert_eq!(h, 640);
    }
}
