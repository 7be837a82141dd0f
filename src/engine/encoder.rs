// src/engine/encoder.rs
//
// Encoder operations: JPEG (mozjpeg), PNG (image + oxipng), WebP (libwebp).
// ICC profiles of tagged pixmaps are embedded with img-parts.

use crate::engine::common::run_with_panic_policy;
use crate::engine::pixmap::Pixmap;
use crate::error::ImageError;
use crate::ops::OutputFormat;
use image::{DynamicImage, ImageFormat};
use img_parts::{jpeg::Jpeg, png::Png, ImageICC};
use mozjpeg::{ColorSpace, Compress, ScanMode};
use std::borrow::Cow;
use std::io::Cursor;

use crate::engine::MAX_DIMENSION;

// Always ImageError so encode failures keep their category.
type EncoderResult<T> = std::result::Result<T, ImageError>;

/// Encoder knobs derived from one 0-100 quality value.
/// - High (>=85): visual quality first
/// - Balanced (70-84)
/// - Fast (<70): speed first
#[derive(Debug, Clone, Copy)]
pub struct QualitySettings {
    quality: f32,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum QualityBand {
    High,
    Balanced,
    Fast,
}

impl QualitySettings {
    pub fn new(quality: u8) -> Self {
        Self {
            quality: quality.min(100) as f32,
        }
    }

    fn band(&self) -> QualityBand {
        if self.quality >= 85.0 {
            QualityBand::High
        } else if self.quality >= 70.0 {
            QualityBand::Balanced
        } else {
            QualityBand::Fast
        }
    }

    pub fn jpeg_smoothing(&self) -> u8 {
        if self.quality >= 90.0 {
            0
        } else if self.quality >= 70.0 {
            5
        } else if self.quality >= 60.0 {
            10
        } else {
            18
        }
    }

    pub fn webp_method(&self) -> i32 {
        4
    }

    pub fn webp_sns_strength(&self) -> i32 {
        match self.band() {
            QualityBand::High => 50,
            QualityBand::Balanced => 70,
            QualityBand::Fast => 80,
        }
    }

    pub fn webp_filter_strength(&self) -> i32 {
        if self.quality >= 80.0 {
            20
        } else if self.quality >= 60.0 {
            30
        } else {
            40
        }
    }

    pub fn webp_filter_sharpness(&self) -> i32 {
        match self.band() {
            QualityBand::High => 2,
            QualityBand::Balanced | QualityBand::Fast => 0,
        }
    }
}

/// Encode a pixmap. Alpha is unpremultiplied first; an ICC color space
/// is embedded in the output container.
pub fn encode_pixmap(pixmap: &Pixmap, format: OutputFormat) -> EncoderResult<Vec<u8>> {
    let img = pixmap.to_dynamic_image()?;
    let icc = pixmap.info().color_space().and_then(|cs| cs.icc_profile());
    match format {
        OutputFormat::Jpeg { quality } => encode_jpeg(&img, quality, icc),
        OutputFormat::Png => encode_png(&img, icc),
        OutputFormat::WebP { quality } => encode_webp(&img, quality, icc),
    }
}

/// Encode to JPEG using mozjpeg with progressive, optimized scans.
pub fn encode_jpeg(img: &DynamicImage, quality: u8, icc: Option<&[u8]>) -> EncoderResult<Vec<u8>> {
    run_with_panic_policy("encode:jpeg", || {
        let rgb: Cow<'_, image::RgbImage> = match img {
            DynamicImage::ImageRgb8(rgb_img) => Cow::Borrowed(rgb_img),
            _ => Cow::Owned(img.to_rgb8()),
        };
        let (w, h) = rgb.dimensions();
        let pixels: &[u8] = rgb.as_raw();

        if w == 0 || h == 0 {
            return Err(ImageError::encode_failed("jpeg", "width or height is zero"));
        }
        if w > MAX_DIMENSION || h > MAX_DIMENSION {
            return Err(ImageError::dimension_exceeds_limit(w.max(h), MAX_DIMENSION));
        }

        let settings = QualitySettings::new(quality);
        let mut comp = Compress::new(ColorSpace::JCS_RGB);
        comp.set_size(w as usize, h as usize);
        comp.set_color_space(ColorSpace::JCS_YCbCr);
        comp.set_quality(settings.quality);
        comp.set_chroma_sampling_pixel_sizes((2, 2), (2, 2));
        comp.set_progressive_mode();
        comp.set_optimize_coding(true);
        comp.set_optimize_scans(true);
        comp.set_scan_optimization_mode(ScanMode::AllComponentsTogether);
        comp.set_smoothing_factor(settings.jpeg_smoothing());

        let estimated_size = (w as usize * h as usize * 3 / 10).max(4096);
        let mut output = Vec::with_capacity(estimated_size);

        let encoded = {
            let mut writer = comp.start_compress(&mut output).map_err(|e| {
                ImageError::encode_failed("jpeg", format!("mozjpeg: failed to start compress: {e:?}"))
            })?;

            let stride = w as usize * 3;
            for row in pixels.chunks(stride) {
                writer.write_scanlines(row).map_err(|e| {
                    ImageError::encode_failed(
                        "jpeg",
                        format!("mozjpeg: failed to write scanlines: {e:?}"),
                    )
                })?;
            }

            writer.finish().map_err(|e| {
                ImageError::encode_failed("jpeg", format!("mozjpeg: failed to finish: {e:?}"))
            })?;

            output
        };

        match icc {
            Some(icc_data) => embed_icc_jpeg(encoded, icc_data),
            None => Ok(encoded),
        }
    })
}

/// Embed ICC profile into JPEG using img-parts
pub fn embed_icc_jpeg(jpeg_data: Vec<u8>, icc: &[u8]) -> EncoderResult<Vec<u8>> {
    run_with_panic_policy("encode:jpeg:embed_icc", || {
        use img_parts::jpeg::{markers::APP2, JpegSegment};
        use img_parts::Bytes;

        let mut jpeg = Jpeg::from_bytes(Bytes::from(jpeg_data)).map_err(|e| {
            ImageError::encode_failed("jpeg", format!("failed to parse JPEG for ICC: {e}"))
        })?;

        let mut marker_data = Vec::with_capacity(14 + icc.len());
        marker_data.extend_from_slice(b"ICC_PROFILE\0");
        marker_data.push(1);
        marker_data.push(1);
        marker_data.extend_from_slice(icc);

        let segment = JpegSegment::new_with_contents(APP2, Bytes::from(marker_data));
        jpeg.segments_mut().insert(0, segment);

        let mut output = Vec::new();
        jpeg.encoder().write_to(&mut output).map_err(|e| {
            ImageError::encode_failed("jpeg", format!("failed to write JPEG with ICC: {e}"))
        })?;

        Ok(output)
    })
}

/// Encode to PNG using the image crate, then recompress losslessly with oxipng.
pub fn encode_png(img: &DynamicImage, icc: Option<&[u8]>) -> EncoderResult<Vec<u8>> {
    run_with_panic_policy("encode:png", || {
        let mut buf = Vec::new();
        img.write_to(&mut Cursor::new(&mut buf), ImageFormat::Png)
            .map_err(|e| ImageError::encode_failed("png", format!("PNG encode failed: {e}")))?;

        let mut options = oxipng::Options::from_preset(4);
        // keep metadata chunks, ICC in particular
        options.strip = oxipng::StripChunks::None;

        let optimized = oxipng::optimize_from_memory(&buf, &options).map_err(|e| {
            ImageError::encode_failed("png", format!("oxipng optimization failed: {e}"))
        })?;

        match icc {
            Some(icc_data) => embed_icc_png(optimized, icc_data),
            None => Ok(optimized),
        }
    })
}

/// Embed ICC profile into PNG using img-parts
pub fn embed_icc_png(png_data: Vec<u8>, icc: &[u8]) -> EncoderResult<Vec<u8>> {
    run_with_panic_policy("encode:png:embed_icc", || {
        use img_parts::Bytes;

        let mut png = Png::from_bytes(Bytes::from(png_data)).map_err(|e| {
            ImageError::encode_failed("png", format!("failed to parse PNG for ICC: {e}"))
        })?;

        png.set_icc_profile(Some(Bytes::from(icc.to_vec())));

        let mut output = Vec::new();
        png.encoder().write_to(&mut output).map_err(|e| {
            ImageError::encode_failed("png", format!("failed to write PNG with ICC: {e}"))
        })?;

        Ok(output)
    })
}

/// Encode to WebP. RGBA input keeps its alpha channel.
pub fn encode_webp(img: &DynamicImage, quality: u8, icc: Option<&[u8]>) -> EncoderResult<Vec<u8>> {
    run_with_panic_policy("encode:webp", || {
        let settings = QualitySettings::new(quality);
        let mut config = webp::WebPConfig::new()
            .map_err(|_| ImageError::internal_panic("failed to create WebPConfig"))?;
        config.quality = settings.quality;
        config.method = settings.webp_method();
        config.pass = 1;
        config.preprocessing = 0;
        config.sns_strength = settings.webp_sns_strength();
        config.autofilter = 1;
        config.filter_strength = settings.webp_filter_strength();
        config.filter_sharpness = settings.webp_filter_sharpness();

        let mem = match img {
            DynamicImage::ImageRgba8(rgba) => {
                let (w, h) = rgba.dimensions();
                webp::Encoder::from_rgba(rgba.as_raw(), w, h).encode_advanced(&config)
            }
            _ => {
                let rgb: Cow<'_, image::RgbImage> = match img {
                    DynamicImage::ImageRgb8(rgb_img) => Cow::Borrowed(rgb_img),
                    _ => Cow::Owned(img.to_rgb8()),
                };
                let (w, h) = rgb.dimensions();
                webp::Encoder::from_rgb(rgb.as_raw(), w, h).encode_advanced(&config)
            }
        }
        .map_err(|e| ImageError::encode_failed("webp", format!("WebP encode failed: {e:?}")))?;

        let encoded = mem.to_vec();

        match icc {
            Some(icc_data) => embed_icc_webp(encoded, icc_data),
            None => Ok(encoded),
        }
    })
}

/// Embed ICC profile into WebP using img-parts
pub fn embed_icc_webp(webp_data: Vec<u8>, icc: &[u8]) -> EncoderResult<Vec<u8>> {
    run_with_panic_policy("encode:webp:embed_icc", || {
        use img_parts::webp::WebP;
        use img_parts::Bytes;

        let mut webp = WebP::from_bytes(Bytes::from(webp_data)).map_err(|e| {
            ImageError::encode_failed("webp", format!("failed to parse WebP for ICC: {e}"))
        })?;

        webp.set_icc_profile(Some(Bytes::from(icc.to_vec())));

        let mut output = Vec::new();
        webp.encoder().write_to(&mut output).map_err(|e| {
            ImageError::encode_failed("webp", format!("failed to write WebP with ICC: {e}"))
        })?;

        Ok(output)
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::color::{AlphaType, ColorType, ImageInfo};
    use crate::engine::decoder::{decode_image, detect_format};
    use crate::engine::io::{extract_icc_profile, tests::fake_icc_profile};
    use crate::engine::color::ColorSpace as Cs;

    fn create_test_pixmap(width: i32, height: i32, color_space: Option<Cs>) -> Pixmap {
        let info = ImageInfo::new(width, height, ColorType::Rgba8888, AlphaType::Premul, color_space);
        let mut data = Vec::new();
        for y in 0..height {
            for x in 0..width {
                data.extend_from_slice(&[(x * 10) as u8, (y * 10) as u8, 64, 255]);
            }
        }
        Pixmap::from_vec(info, width as usize * 4, data).unwrap()
    }

    #[test]
    fn quality_bands() {
        assert_eq!(QualitySettings::new(95).webp_sns_strength(), 50);
        assert_eq!(QualitySettings::new(75).webp_sns_strength(), 70);
        assert_eq!(QualitySettings::new(10).webp_filter_strength(), 40);
        assert_eq!(QualitySettings::new(200).jpeg_smoothing(), 0);
    }

    #[test]
    fn png_round_trip_is_lossless() {
        let pm = create_test_pixmap(6, 4, None);
        let png = encode_pixmap(&pm, OutputFormat::Png).unwrap();
        assert_eq!(detect_format(&png), Some(ImageFormat::Png));
        let (decoded, _) = decode_image(&png).unwrap();
        let rgba = decoded.to_rgba8();
        assert_eq!(rgba.get_pixel(5, 3).0, [50, 30, 64, 255]);
    }

    #[test]
    fn jpeg_and_webp_produce_their_formats() {
        let pm = create_test_pixmap(8, 8, None);
        let jpeg = encode_pixmap(&pm, OutputFormat::Jpeg { quality: 80 }).unwrap();
        assert_eq!(detect_format(&jpeg), Some(ImageFormat::Jpeg));
        let webp = encode_pixmap(&pm, OutputFormat::WebP { quality: 80 }).unwrap();
        assert_eq!(detect_format(&webp), Some(ImageFormat::WebP));
    }

    #[test]
    fn icc_color_space_is_embedded() {
        let icc = fake_icc_profile(132);
        let pm = create_test_pixmap(4, 4, Some(Cs::from_icc(icc.clone())));
        let png = encode_pixmap(&pm, OutputFormat::Png).unwrap();
        assert_eq!(extract_icc_profile(&png), Some(icc.clone()));
        let jpeg = encode_pixmap(&pm, OutputFormat::Jpeg { quality: 90 }).unwrap();
        assert_eq!(extract_icc_profile(&jpeg), Some(icc));
    }
}
