// src/engine/generator.rs
//
// Pixel generators behind lazily generated images: encoded bytes decoded on
// demand, and picture replay through a per-pixel paint closure.

use crate::engine::color::{AlphaType, ColorSpace, ColorType, ImageInfo};
use crate::engine::config::PipelineConfig;
use crate::engine::convert::store_rgba;
use crate::engine::decoder::{decode_image, probe_header, HeaderInfo};
use crate::engine::io::color_space_from_encoded;
use crate::engine::pixmap::Pixmap;
use crate::error::ImageError;
use rayon::prelude::*;
use std::fmt;
use std::sync::Arc;
use tracing::debug;

type GeneratorResult<T> = std::result::Result<T, ImageError>;

/// Produces the full frame of a lazily generated image on request.
pub trait ImageGenerator: Send + Sync + fmt::Debug {
    fn info(&self) -> &ImageInfo;

    /// The encoded bytes this generator decodes from, if any.
    fn ref_encoded_data(&self) -> Option<Arc<Vec<u8>>> {
        None
    }

    /// Write the whole frame into `dst`, converted to `info`. `info` must have
    /// the generator's dimensions.
    fn get_pixels(&self, info: &ImageInfo, dst: &mut [u8], row_bytes: usize)
        -> GeneratorResult<()>;
}

fn check_frame(expected: &ImageInfo, requested: &ImageInfo) -> GeneratorResult<()> {
    if expected.dimensions() != requested.dimensions() {
        return Err(ImageError::read_pixels_failed(format!(
            "generator produces {}x{}, asked for {}x{}",
            expected.width(),
            expected.height(),
            requested.width(),
            requested.height()
        )));
    }
    Ok(())
}

fn color_type_for_header(header: &HeaderInfo) -> (ColorType, AlphaType) {
    use image::ColorType as Ct;
    match header.color_type {
        Ct::L8 | Ct::L16 => (ColorType::Gray8, AlphaType::Opaque),
        Ct::Rgb8 | Ct::Rgb16 | Ct::Rgb32F => (ColorType::Rgb888x, AlphaType::Opaque),
        _ => (ColorType::Rgba8888, AlphaType::Unpremul),
    }
}

/// Decodes JPEG, PNG or WebP bytes each time pixels are requested.
pub struct EncodedGenerator {
    info: ImageInfo,
    data: Arc<Vec<u8>>,
}

impl EncodedGenerator {
    /// Reads the header only. Fails for unsupported formats and for
    /// dimensions over the configured limits.
    pub fn new(data: Arc<Vec<u8>>) -> GeneratorResult<Self> {
        let header = probe_header(&data)?;
        PipelineConfig::global().enforce_dimensions(header.width, header.height)?;
        let (color_type, alpha_type) = color_type_for_header(&header);
        let info = ImageInfo::new(
            header.width as i32,
            header.height as i32,
            color_type,
            alpha_type,
            color_space_from_encoded(&data),
        );
        debug!(
            width = header.width,
            height = header.height,
            format = ?header.format,
            "encoded generator"
        );
        Ok(Self { info, data })
    }
}

impl fmt::Debug for EncodedGenerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("EncodedGenerator")
            .field("info", &self.info)
            .field("encoded_len", &self.data.len())
            .finish()
    }
}

impl ImageGenerator for EncodedGenerator {
    fn info(&self) -> &ImageInfo {
        &self.info
    }

    fn ref_encoded_data(&self) -> Option<Arc<Vec<u8>>> {
        Some(Arc::clone(&self.data))
    }

    fn get_pixels(&self, info: &ImageInfo, dst: &mut [u8], row_bytes: usize) -> GeneratorResult<()> {
        check_frame(&self.info, info)?;
        let (img, _) = decode_image(&self.data)?;
        let decoded = Pixmap::from_dynamic_image(img, self.info.color_space().cloned())?;
        if decoded.info().dimensions() != self.info.dimensions() {
            return Err(ImageError::decode_failed("decoded size differs from header"));
        }
        decoded.read_pixels(info, dst, row_bytes, 0, 0)
    }
}

/// Paint callback: unpremultiplied RGBA for pixel (x, y).
pub type PaintFn = Arc<dyn Fn(i32, i32) -> [u8; 4] + Send + Sync>;

/// Replays a picture by evaluating `paint` at every pixel center.
#[derive(Clone)]
pub struct PictureGenerator {
    info: ImageInfo,
    paint: PaintFn,
}

impl PictureGenerator {
    pub fn new(info: ImageInfo, paint: PaintFn) -> GeneratorResult<Self> {
        if !info.is_valid() {
            return Err(ImageError::invalid_image_info(format!(
                "cannot replay a picture into {}x{} {:?}",
                info.width(),
                info.height(),
                info.color_type()
            )));
        }
        Ok(Self { info, paint })
    }

    fn render(&self) -> GeneratorResult<Pixmap> {
        let mut pixmap = Pixmap::alloc(self.info.clone())?;
        let row_bytes = pixmap.row_bytes();
        let width = self.info.width() as usize;
        let bpp = self.info.bytes_per_pixel();
        let (ct, at) = (self.info.color_type(), self.info.alpha_type());
        let pixels = pixmap
            .pixels_mut()
            .ok_or_else(|| ImageError::internal_panic("fresh pixmap storage is shared"))?;
        pixels
            .par_chunks_mut(row_bytes)
            .enumerate()
            .for_each(|(y, row)| {
                for x in 0..width {
                    let rgba = (self.paint)(x as i32, y as i32);
                    store_rgba(ct, at, rgba, &mut row[x * bpp..]);
                }
            });
        Ok(pixmap)
    }
}

impl fmt::Debug for PictureGenerator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("PictureGenerator")
            .field("info", &self.info)
            .finish_non_exhaustive()
    }
}

impl ImageGenerator for PictureGenerator {
    fn info(&self) -> &ImageInfo {
        &self.info
    }

    fn get_pixels(&self, info: &ImageInfo, dst: &mut [u8], row_bytes: usize) -> GeneratorResult<()> {
        check_frame(&self.info, info)?;
        self.render()?.read_pixels(info, dst, row_bytes, 0, 0)
    }
}

/// A picture covering `width` x `height` in sRGB premultiplied N32.
pub fn picture_info(width: i32, height: i32) -> ImageInfo {
    ImageInfo::new(
        width,
        height,
        ColorType::N32,
        AlphaType::Premul,
        Some(ColorSpace::Srgb),
    )
}
