// src/engine/convert.rs
//
// Row-wise pixel conversion between color types and alpha types.
// Color spaces are tags only; values are carried over unchanged.

use crate::engine::color::{AlphaType, ColorType, ImageInfo};
use crate::error::ImageError;
use rayon::prelude::*;

type ConvertResult<T> = std::result::Result<T, ImageError>;

/// Below this many pixels the rayon fan-out costs more than it saves.
const PARALLEL_THRESHOLD_PIXELS: usize = 1 << 16;

#[inline]
pub fn premul(c: u8, a: u8) -> u8 {
    ((c as u32 * a as u32 + 127) / 255) as u8
}

#[inline]
pub fn unpremul(c: u8, a: u8) -> u8 {
    if a == 0 {
        return 0;
    }
    ((c as u32 * 255 + a as u32 / 2) / a as u32).min(255) as u8
}

#[inline]
fn luma(rgb: [u8; 3]) -> u8 {
    // Rec.709 weights in 8.8 fixed point
    ((rgb[0] as u32 * 54 + rgb[1] as u32 * 183 + rgb[2] as u32 * 19 + 128) >> 8) as u8
}

/// Decode one pixel to unpremultiplied RGBA.
#[inline]
pub fn load_rgba(ct: ColorType, at: AlphaType, px: &[u8]) -> [u8; 4] {
    let rgba = match ct {
        ColorType::Unknown => [0, 0, 0, 0],
        ColorType::Alpha8 => return [0, 0, 0, px[0]],
        ColorType::Gray8 => return [px[0], px[0], px[0], 255],
        ColorType::Rgb888x => return [px[0], px[1], px[2], 255],
        ColorType::Rgba8888 => [px[0], px[1], px[2], px[3]],
        ColorType::Bgra8888 => [px[2], px[1], px[0], px[3]],
    };
    match at {
        AlphaType::Premul => {
            let a = rgba[3];
            [unpremul(rgba[0], a), unpremul(rgba[1], a), unpremul(rgba[2], a), a]
        }
        AlphaType::Opaque => [rgba[0], rgba[1], rgba[2], 255],
        _ => rgba,
    }
}

/// Encode one unpremultiplied RGBA pixel.
#[inline]
pub fn store_rgba(ct: ColorType, at: AlphaType, rgba: [u8; 4], px: &mut [u8]) {
    let [r, g, b, a] = match at {
        AlphaType::Premul => [
            premul(rgba[0], rgba[3]),
            premul(rgba[1], rgba[3]),
            premul(rgba[2], rgba[3]),
            rgba[3],
        ],
        AlphaType::Opaque => [rgba[0], rgba[1], rgba[2], 255],
        _ => rgba,
    };
    match ct {
        ColorType::Unknown => {}
        ColorType::Alpha8 => px[0] = rgba[3],
        ColorType::Gray8 => px[0] = luma([rgba[0], rgba[1], rgba[2]]),
        ColorType::Rgb888x => px[..4].copy_from_slice(&[r, g, b, 255]),
        ColorType::Rgba8888 => px[..4].copy_from_slice(&[r, g, b, a]),
        ColorType::Bgra8888 => px[..4].copy_from_slice(&[b, g, r, a]),
    }
}

fn check_buffer(info: &ImageInfo, len: usize, row_bytes: usize, what: &str) -> ConvertResult<()> {
    if !info.valid_row_bytes(row_bytes) {
        return Err(ImageError::invalid_argument(
            format!("{what}_row_bytes"),
            row_bytes.to_string(),
            format!("must be at least {} and pixel aligned", info.min_row_bytes64()),
        ));
    }
    let needed = info
        .compute_byte_size(row_bytes)
        .ok_or_else(|| ImageError::byte_size_overflow(info.width(), info.height(), row_bytes))?;
    if len < needed {
        return Err(ImageError::invalid_argument(
            format!("{what}_len"),
            len.to_string(),
            format!("buffer needs {needed} bytes"),
        ));
    }
    Ok(())
}

fn convert_row(dst_info: &ImageInfo, dst: &mut [u8], src_info: &ImageInfo, src: &[u8]) {
    let width = dst_info.width() as usize;
    let (dct, dat) = (dst_info.color_type(), dst_info.alpha_type());
    let (sct, sat) = (src_info.color_type(), src_info.alpha_type());
    let dbpp = dct.bytes_per_pixel();
    let sbpp = sct.bytes_per_pixel();
    if dct == sct && (dat == sat || sct.is_alpha_only() || dct.is_always_opaque()) {
        let n = width * dbpp;
        dst[..n].copy_from_slice(&src[..n]);
        return;
    }
    for x in 0..width {
        let rgba = load_rgba(sct, sat, &src[x * sbpp..]);
        store_rgba(dct, dat, rgba, &mut dst[x * dbpp..]);
    }
}

/// Convert `src` (described by `src_info`) into `dst` (described by
/// `dst_info`). Both infos must have the same dimensions.
pub fn convert_pixels(
    dst_info: &ImageInfo,
    dst: &mut [u8],
    dst_row_bytes: usize,
    src_info: &ImageInfo,
    src: &[u8],
    src_row_bytes: usize,
) -> ConvertResult<()> {
    if dst_info.dimensions() != src_info.dimensions() {
        return Err(ImageError::invalid_argument(
            "dimensions",
            format!("{:?} vs {:?}", dst_info.dimensions(), src_info.dimensions()),
            "conversion requires equal dimensions",
        ));
    }
    if dst_info.color_type() == ColorType::Unknown || src_info.color_type() == ColorType::Unknown {
        return Err(ImageError::unknown_color_type());
    }
    if dst_info.is_empty() {
        return Ok(());
    }
    check_buffer(dst_info, dst.len(), dst_row_bytes, "dst")?;
    check_buffer(src_info, src.len(), src_row_bytes, "src")?;

    let height = dst_info.height() as usize;
    let pixels = dst_info.width() as usize * height;
    if pixels >= PARALLEL_THRESHOLD_PIXELS {
        dst.par_chunks_mut(dst_row_bytes)
            .take(height)
            .enumerate()
            .for_each(|(y, row)| {
                convert_row(dst_info, row, src_info, &src[y * src_row_bytes..]);
            });
    } else {
        for (y, row) in dst.chunks_mut(dst_row_bytes).take(height).enumerate() {
            convert_row(dst_info, row, src_info, &src[y * src_row_bytes..]);
        }
    }
    Ok(())
}
