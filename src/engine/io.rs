// src/engine/io.rs
//
// ICC profile extraction from encoded containers.
// An embedded profile becomes the color space tag of a lazily decoded image.

use crate::engine::color::ColorSpace;
use img_parts::{jpeg::Jpeg, png::Png, webp::WebP, ImageICC};

/// Extract ICC profile from image data.
/// Supports JPEG (APP2 marker), PNG (iCCP chunk), and WebP (ICCP chunk).
pub fn extract_icc_profile(data: &[u8]) -> Option<Vec<u8>> {
    if data.len() < 12 {
        return None;
    }

    let icc_data = if data[0] == 0xFF && data[1] == 0xD8 {
        extract_icc_from_jpeg(data)?
    } else if data[0..4] == [0x89, 0x50, 0x4E, 0x47] {
        extract_icc_from_png(data)?
    } else if &data[0..4] == b"RIFF" && &data[8..12] == b"WEBP" {
        extract_icc_from_webp(data)?
    } else {
        return None;
    };

    // Invalid profiles are dropped rather than propagated as a tag.
    validate_icc_profile(&icc_data).then_some(icc_data)
}

/// Color space tag for encoded data: the embedded profile if any.
pub fn color_space_from_encoded(data: &[u8]) -> Option<ColorSpace> {
    extract_icc_profile(data).map(ColorSpace::from_icc)
}

fn is_ascii_signature(bytes: &[u8]) -> bool {
    bytes.iter().all(|&b| (32..=126).contains(&b) || b == 0)
}

/// Validate ICC profile header.
/// ICC profiles must start with a 128-byte header containing specific fields.
pub(crate) fn validate_icc_profile(icc_data: &[u8]) -> bool {
    if icc_data.len() < 128 {
        return false;
    }

    // Profile size field (bytes 0-3, big-endian) must match the data length
    let profile_size =
        u32::from_be_bytes([icc_data[0], icc_data[1], icc_data[2], icc_data[3]]) as usize;
    if profile_size != icc_data.len() {
        return false;
    }

    // Major version (byte 8) is typically 2, 4 or 5
    if icc_data[8] > 10 {
        return false;
    }

    // CMM type, profile class, data color space and PCS are ASCII signatures
    is_ascii_signature(&icc_data[4..8])
        && is_ascii_signature(&icc_data[12..16])
        && is_ascii_signature(&icc_data[16..20])
        && is_ascii_signature(&icc_data[20..24])
}

pub(crate) fn extract_icc_from_jpeg(data: &[u8]) -> Option<Vec<u8>> {
    let jpeg = Jpeg::from_bytes(data.to_vec().into()).ok()?;
    jpeg.icc_profile().map(|icc| icc.to_vec())
}

pub(crate) fn extract_icc_from_png(data: &[u8]) -> Option<Vec<u8>> {
    let png = Png::from_bytes(data.to_vec().into()).ok()?;
    png.icc_profile().map(|icc| icc.to_vec())
}

pub(crate) fn extract_icc_from_webp(data: &[u8]) -> Option<Vec<u8>> {
    let webp = WebP::from_bytes(data.to_vec().into()).ok()?;
    webp.icc_profile().map(|icc| icc.to_vec())
}
