//! Pixel preprocessing shared by the detector and the classifier.
//!
//! Both models consume single-channel input. Conversion and resizing are done
//! here with integer / fixed-order float maths so the same frame always yields
//! the same tensor.

use image::{GrayImage, RgbImage};

// BT.601 luma weights in 14-bit fixed point (sum = 1 << 14).
const LUMA_R: u32 = 4899;
const LUMA_G: u32 = 9617;
const LUMA_B: u32 = 1868;
const LUMA_SHIFT: u32 = 14;

/// Convert an RGB frame to BT.601 grayscale.
pub fn to_grayscale(rgb: &RgbImage) -> GrayImage {
    let (width, height) = rgb.dimensions();
    let data: Vec<u8> = rgb
        .as_raw()
        .chunks_exact(3)
        .map(|px| {
            let y = px[0] as u32 * LUMA_R
                + px[1] as u32 * LUMA_G
                + px[2] as u32 * LUMA_B
                + (1 << (LUMA_SHIFT - 1));
            (y >> LUMA_SHIFT) as u8
        })
        .collect();

    // Buffer length is width * height by construction.
    GrayImage::from_raw(width, height, data).unwrap_or_else(|| GrayImage::new(width, height))
}

/// Resize a grayscale buffer with bilinear interpolation and half-pixel centres.
///
/// Source coordinates are clamped at the borders, so any non-empty source can
/// be scaled up or down.
pub fn resize_bilinear(
    src: &[u8],
    width: usize,
    height: usize,
    new_w: usize,
    new_h: usize,
) -> Vec<u8> {
    let mut resized = vec![0u8; new_w * new_h];
    if width == 0 || height == 0 || src.len() < width * height {
        return resized;
    }

    let scale_x = width as f32 / new_w as f32;
    let scale_y = height as f32 / new_h as f32;

    for y in 0..new_h {
        let src_y = (y as f32 + 0.5) * scale_y - 0.5;
        let y0 = (src_y.floor() as i32).clamp(0, height as i32 - 1) as usize;
        let y1 = (y0 + 1).min(height - 1);
        let fy = (src_y - src_y.floor()).clamp(0.0, 1.0);

        for x in 0..new_w {
            let src_x = (x as f32 + 0.5) * scale_x - 0.5;
            let x0 = (src_x.floor() as i32).clamp(0, width as i32 - 1) as usize;
            let x1 = (x0 + 1).min(width - 1);
            let fx = (src_x - src_x.floor()).clamp(0.0, 1.0);

            let tl = src[y0 * width + x0] as f32;
            let tr = src[y0 * width + x1] as f32;
            let bl = src[y1 * width + x0] as f32;
            let br = src[y1 * width + x1] as f32;

            let val = tl * (1.0 - fx) * (1.0 - fy)
                + tr * fx * (1.0 - fy)
                + bl * (1.0 - fx) * fy
                + br * fx * fy;

            resized[y * new_w + x] = val.round().clamp(0.0, 255.0) as u8;
        }
    }

    resized
}
