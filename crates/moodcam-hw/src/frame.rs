//! Frame type and pixel format conversion from YUYV and MJPG to RGB.

use image::{ImageFormat, RgbImage};

/// A captured colour camera frame.
#[derive(Clone)]
pub struct Frame {
    pub image: RgbImage,
    pub sequence: u32,
}

/// Convert packed YUYV (4:2:2) to RGB using BT.601 limited-range integer maths.
///
/// YUYV packs two pixels per 4 bytes: [Y0, U, Y1, V]; both pixels share U/V.
pub fn yuyv_to_rgb(yuyv: &[u8], width: u32, height: u32) -> Result<RgbImage, FrameError> {
    if width % 2 != 0 {
        return Err(FrameError::OddWidth(width));
    }
    let expected = (width * height * 2) as usize;
    if yuyv.len() < expected {
        return Err(FrameError::InvalidLength {
            expected,
            actual: yuyv.len(),
        });
    }

    let mut rgb = Vec::with_capacity((width * height * 3) as usize);
    for chunk in yuyv[..expected].chunks_exact(4) {
        let (y0, u, y1, v) = (chunk[0], chunk[1], chunk[2], chunk[3]);
        rgb.extend_from_slice(&ycbcr_to_rgb(y0, u, v));
        rgb.extend_from_slice(&ycbcr_to_rgb(y1, u, v));
    }

    RgbImage::from_raw(width, height, rgb).ok_or(FrameError::InvalidLength {
        expected,
        actual: yuyv.len(),
    })
}

fn ycbcr_to_rgb(y: u8, u: u8, v: u8) -> [u8; 3] {
    let c = y as i32 - 16;
    let d = u as i32 - 128;
    let e = v as i32 - 128;

    let clip = |x: i32| x.clamp(0, 255) as u8;
    [
        clip((298 * c + 409 * e + 128) >> 8),
        clip((298 * c - 100 * d - 208 * e + 128) >> 8),
        clip((298 * c + 516 * d + 128) >> 8),
    ]
}

/// Decode one MJPG buffer to RGB, checking it matches the negotiated size.
pub fn mjpeg_to_rgb(jpeg: &[u8], width: u32, height: u32) -> Result<RgbImage, FrameError> {
    let image = image::load_from_memory_with_format(jpeg, ImageFormat::Jpeg)?.to_rgb8();
    if image.dimensions() != (width, height) {
        return Err(FrameError::UnexpectedSize {
            expected: (width, height),
            actual: image.dimensions(),
        });
    }
    Ok(image)
}

#[derive(Debug, thiserror::Error)]
pub enum FrameError {
    #[error("invalid YUYV length: expected {expected}, got {actual}")]
    InvalidLength { expected: usize, actual: usize },
    #[error("YUYV width must be even, got {0}")]
    OddWidth(u32),
    #[error("decoded frame is {actual:?}, negotiated {expected:?}")]
    UnexpectedSize { expected: (u32, u32), actual: (u32, u32) },
    #[error("MJPG decode failed: {0}")]
    Decode(#[from] image::ImageError),
}
