// src/engine/rescale.rs
//
// Rescaling and asynchronous read-back.
//
// Resizing goes through fast_image_resize on RGBA8 with alpha premultiplied
// around the convolution, and falls back to the image crate when fir
// rejects the buffers. Texture read-backs are queued on the image's backend
// and hold a memory permit while their buffers are alive.

use crate::engine::color::{AlphaType, ColorSpace, ColorType, ImageInfo};
use crate::engine::common::run_with_panic_policy;
use crate::engine::geometry::{IRect, ISize};
use crate::engine::image::Image;
use crate::engine::memory::{estimate_readback_bytes, readback_semaphore};
use crate::engine::pixmap::Pixmap;
use crate::error::ImageError;
use crate::ops::{
    CachingHint, FilterMode, FilterQuality, MipmapMode, RescaleGamma, SamplingOptions,
    YuvColorSpace,
};
use fast_image_resize::{self as fir, ImageBufferError, MulDiv, PixelType, ResizeOptions};
use image::{imageops::FilterType, RgbaImage};
use std::sync::{Arc, OnceLock};
use tracing::{debug, warn};

type RescaleResult<T> = std::result::Result<T, ImageError>;

// =============================================================================
// READ RESULTS
// =============================================================================

#[derive(Clone, Debug)]
pub struct ReadPlane {
    data: Vec<u8>,
    row_bytes: usize,
}

/// Pixels delivered to a read-back callback. RGBA read-backs have one plane.
#[derive(Clone, Debug)]
pub struct AsyncReadResult {
    planes: Vec<ReadPlane>,
    info: ImageInfo,
}

impl AsyncReadResult {
    fn single(pixmap: &Pixmap) -> Self {
        Self {
            planes: vec![ReadPlane {
                data: pixmap.bytes().to_vec(),
                row_bytes: pixmap.row_bytes(),
            }],
            info: pixmap.info().clone(),
        }
    }

    pub fn count(&self) -> usize {
        self.planes.len()
    }

    pub fn data(&self, index: usize) -> Option<&[u8]> {
        self.planes.get(index).map(|p| p.data.as_slice())
    }

    pub fn row_bytes(&self, index: usize) -> Option<usize> {
        self.planes.get(index).map(|p| p.row_bytes)
    }

    pub fn info(&self) -> &ImageInfo {
        &self.info
    }
}

// =============================================================================
// ASYNC READ-BACK
// =============================================================================

/// Read `src_rect` of `image`, rescaled to `info`, and hand it to
/// `callback`. The callback runs exactly once, on the calling thread for
/// CPU images and on the read-back pool for texture images.
pub fn async_rescale_and_read_pixels<C, F>(
    image: &Arc<Image>,
    info: &ImageInfo,
    src_rect: &IRect,
    gamma: RescaleGamma,
    quality: FilterQuality,
    context: C,
    callback: F,
) where
    C: Send + 'static,
    F: FnOnce(C, RescaleResult<AsyncReadResult>) + Send + 'static,
{
    if !image.bounds().contains(src_rect) {
        callback(
            context,
            Err(ImageError::invalid_subset(src_rect.ltrb(), image.width(), image.height())),
        );
        return;
    }
    if !info.is_valid() {
        callback(
            context,
            Err(ImageError::invalid_image_info(format!(
                "cannot read back into {}x{} {:?}",
                info.width(),
                info.height(),
                info.color_type()
            ))),
        );
        return;
    }

    let Some(backend) = image.backend_context().cloned() else {
        callback(context, rescale_read(image, info, src_rect, gamma, quality));
        return;
    };
    if let Err(e) = backend.check_alive() {
        callback(context, Err(e));
        return;
    }

    let image = Arc::clone(image);
    let info = info.clone();
    let src_rect = *src_rect;
    let weight = estimate_readback_bytes(src_rect.width(), src_rect.height(), &info);
    debug!(
        context = backend.id(),
        width = info.width(),
        height = info.height(),
        weight,
        "queueing texture read-back"
    );
    backend.backend().submit(Box::new(move |status| match status {
        Ok(()) => {
            let _permit = readback_semaphore().acquire(weight);
            let result = rescale_read(&image, &info, &src_rect, gamma, quality);
            callback(context, result);
        }
        Err(e) => {
            warn!(error = %e, "read-back refused by backend");
            callback(context, Err(e));
        }
    }));
}

/// Planar YUV 4:2:0 read-back. Arguments are validated, then the request
/// is reported as unsupported through the callback.
#[allow(clippy::too_many_arguments)]
pub fn async_rescale_and_read_pixels_yuv420<C, F>(
    image: &Arc<Image>,
    yuv_color_space: YuvColorSpace,
    dst_color_space: Option<ColorSpace>,
    src_rect: &IRect,
    dst_size: ISize,
    gamma: RescaleGamma,
    quality: FilterQuality,
    context: C,
    callback: F,
) where
    C: Send + 'static,
    F: FnOnce(C, RescaleResult<AsyncReadResult>) + Send + 'static,
{
    if !image.bounds().contains(src_rect) {
        callback(
            context,
            Err(ImageError::invalid_subset(src_rect.ltrb(), image.width(), image.height())),
        );
        return;
    }
    if dst_size.is_empty() {
        callback(
            context,
            Err(ImageError::invalid_destination_size(
                dst_size.width,
                dst_size.height,
                "destination must be non-empty",
            )),
        );
        return;
    }
    if dst_size.width % 2 != 0 || dst_size.height % 2 != 0 {
        callback(
            context,
            Err(ImageError::invalid_destination_size(
                dst_size.width,
                dst_size.height,
                "chroma planes need even dimensions",
            )),
        );
        return;
    }
    debug!(
        ?yuv_color_space,
        dst_color_space = dst_color_space.as_ref().map(ColorSpace::name),
        ?gamma,
        ?quality,
        "yuv420 read-back requested"
    );
    callback(context, Err(ImageError::unsupported("yuv420 rescale read-back")));
}

fn rescale_read(
    image: &Image,
    info: &ImageInfo,
    src_rect: &IRect,
    gamma: RescaleGamma,
    quality: FilterQuality,
) -> RescaleResult<AsyncReadResult> {
    let region = match image.peek_pixels() {
        Some(pixmap) => pixmap.extract_subset(src_rect).ok_or_else(|| {
            ImageError::invalid_subset(src_rect.ltrb(), pixmap.width(), pixmap.height())
        })?,
        None => read_region(image, src_rect)?,
    };
    let scaled = if region.info().dimensions() == info.dimensions() {
        region.copy_as(info)?
    } else {
        scale_pixmap(&region, info, gamma, &SamplingOptions::from(quality))?
    };
    Ok(AsyncReadResult::single(&scaled))
}

fn read_region(image: &Image, src_rect: &IRect) -> RescaleResult<Pixmap> {
    let region_info = image.info().make_dimensions(src_rect.size());
    let row_bytes = region_info.min_row_bytes().ok_or_else(|| {
        ImageError::byte_size_overflow(region_info.width(), region_info.height(), usize::MAX)
    })?;
    let size = region_info.compute_byte_size(row_bytes).ok_or_else(|| {
        ImageError::byte_size_overflow(region_info.width(), region_info.height(), row_bytes)
    })?;
    let mut data = vec![0u8; size];
    image
        .read_pixels(
            None,
            &region_info,
            &mut data,
            row_bytes,
            src_rect.left,
            src_rect.top,
            CachingHint::Allow,
        )
        .map_err(|e| ImageError::read_pixels_failed(format!("source region: {e}")))?;
    Pixmap::from_vec(region_info, row_bytes, data)
}

// =============================================================================
// RESIZE
// =============================================================================

/// Resize `src` to `dst_info`'s dimensions and convert to its color settings.
pub fn scale_pixmap(
    src: &Pixmap,
    dst_info: &ImageInfo,
    gamma: RescaleGamma,
    sampling: &SamplingOptions,
) -> RescaleResult<Pixmap> {
    if dst_info.is_empty() {
        return Err(ImageError::invalid_destination_size(
            dst_info.width(),
            dst_info.height(),
            "destination must be non-empty",
        ));
    }
    let src_dims = (src.width() as u32, src.height() as u32);
    let dst_dims = (dst_info.width() as u32, dst_info.height() as u32);

    let rgba_info = ImageInfo::new(
        src.width(),
        src.height(),
        ColorType::Rgba8888,
        AlphaType::Unpremul,
        src.info().color_space().cloned(),
    );
    let rgba = src.copy_as(&rgba_info)?;
    let pixels = rgba.bytes().to_vec();
    let options = ResizeOptions::new().resize_alg(resize_alg(sampling, src_dims, dst_dims));

    let resized = run_with_panic_policy("rescale", || {
        let result = match gamma {
            RescaleGamma::Src => resize_rgba8(src_dims, pixels, dst_dims, &options, sampling),
            RescaleGamma::Linear => resize_linear(src_dims, &pixels, dst_dims, &options),
        };
        result.map_err(|reason| ImageError::resize_failed(src_dims, dst_dims, reason))
    })?;

    debug!(
        src_width = src_dims.0,
        src_height = src_dims.1,
        dst_width = dst_dims.0,
        dst_height = dst_dims.1,
        ?gamma,
        "rescaled"
    );
    let out = Pixmap::from_vec(
        rgba_info.make_wh(dst_info.width(), dst_info.height()),
        dst_dims.0 as usize * 4,
        resized,
    )?;
    out.copy_as(dst_info)
}

fn is_downscale(src: (u32, u32), dst: (u32, u32)) -> bool {
    dst.0 < src.0 || dst.1 < src.1
}

fn resize_alg(sampling: &SamplingOptions, src: (u32, u32), dst: (u32, u32)) -> fir::ResizeAlg {
    if let Some(cubic) = sampling.cubic {
        let filter = if cubic.b == 0.0 && cubic.c == 0.5 {
            fir::FilterType::CatmullRom
        } else {
            fir::FilterType::Mitchell
        };
        return fir::ResizeAlg::Convolution(filter);
    }
    if sampling.mipmap != MipmapMode::None && is_downscale(src, dst) {
        return fir::ResizeAlg::Convolution(fir::FilterType::Box);
    }
    match sampling.filter {
        FilterMode::Nearest => fir::ResizeAlg::Nearest,
        FilterMode::Linear => fir::ResizeAlg::Convolution(fir::FilterType::Bilinear),
    }
}

fn fallback_filter(sampling: &SamplingOptions) -> FilterType {
    if sampling.use_cubic() {
        return FilterType::CatmullRom;
    }
    match sampling.filter {
        FilterMode::Nearest if sampling.mipmap == MipmapMode::None => FilterType::Nearest,
        _ => FilterType::Triangle,
    }
}

fn required_bytes(dims: (u32, u32), pixel_type: PixelType) -> Result<usize, String> {
    (dims.0 as usize)
        .checked_mul(dims.1 as usize)
        .and_then(|n| n.checked_mul(pixel_type.size()))
        .ok_or_else(|| "image buffer size overflow during resize".to_string())
}

fn resize_rgba8(
    src_dims: (u32, u32),
    mut src_pixels: Vec<u8>,
    dst_dims: (u32, u32),
    options: &ResizeOptions,
    sampling: &SamplingOptions,
) -> Result<Vec<u8>, String> {
    let needed = required_bytes(src_dims, PixelType::U8x4)?;
    if src_pixels.len() < needed {
        return Err(format!(
            "source buffer holds {} bytes, expected {needed}",
            src_pixels.len()
        ));
    }

    let primary = match fir::images::Image::from_slice_u8(
        src_dims.0,
        src_dims.1,
        src_pixels.as_mut_slice(),
        PixelType::U8x4,
    ) {
        Ok(src_image) => resize_premultiplied(src_image, dst_dims, options),
        Err(ImageBufferError::InvalidBufferAlignment) => {
            let aligned = copy_to_aligned(src_dims, PixelType::U8x4, &src_pixels, needed)?;
            resize_premultiplied(aligned, dst_dims, options)
        }
        Err(other) => Err(format!("fir source image error: {other:?}")),
    };

    primary.or_else(|err| {
        warn!(error = %err, "fir resize failed; retrying with the image crate");
        let rgba = RgbaImage::from_raw(src_dims.0, src_dims.1, src_pixels[..needed].to_vec())
            .ok_or_else(|| format!("{err}; fallback could not wrap source"))?;
        Ok(image::imageops::resize(&rgba, dst_dims.0, dst_dims.1, fallback_filter(sampling)).into_raw())
    })
}

fn copy_to_aligned(
    dims: (u32, u32),
    pixel_type: PixelType,
    src_pixels: &[u8],
    needed: usize,
) -> Result<fir::images::Image<'static>, String> {
    let mut aligned = fir::images::Image::new(dims.0, dims.1, pixel_type);
    let buffer = aligned.buffer_mut();
    if buffer.len() != needed {
        return Err(format!(
            "aligned buffer holds {} bytes, expected {needed}",
            buffer.len()
        ));
    }
    buffer.copy_from_slice(&src_pixels[..needed]);
    Ok(aligned)
}

// Fully opaque sources skip the multiply and divide passes.
fn is_fully_opaque(image: &fir::images::Image<'_>) -> bool {
    image.buffer().iter().skip(3).step_by(4).all(|&a| a == 255)
}

fn resize_premultiplied(
    mut src_image: fir::images::Image<'_>,
    dst_dims: (u32, u32),
    options: &ResizeOptions,
) -> Result<Vec<u8>, String> {
    let pixel_type = src_image.pixel_type();
    let mut dst_image = fir::images::Image::new(dst_dims.0, dst_dims.1, pixel_type);
    let needs_premultiply = pixel_type == PixelType::U8x4 && !is_fully_opaque(&src_image);

    let mul_div = MulDiv::default();
    if needs_premultiply {
        mul_div
            .multiply_alpha_inplace(&mut src_image)
            .map_err(|e| format!("failed to premultiply alpha: {e}"))?;
    }
    fir::Resizer::new()
        .resize(&src_image, &mut dst_image, options)
        .map_err(|e| format!("fir resize error: {e:?}"))?;
    if needs_premultiply {
        mul_div
            .divide_alpha_inplace(&mut dst_image)
            .map_err(|e| format!("failed to unpremultiply alpha: {e}"))?;
    }
    Ok(dst_image.into_vec())
}

// -----------------------------------------------------------------------------
// Linear light
// -----------------------------------------------------------------------------

const LINEAR_LUT_BITS: u32 = 12;

fn srgb_to_linear_lut() -> &'static [u16; 256] {
    static LUT: OnceLock<[u16; 256]> = OnceLock::new();
    LUT.get_or_init(|| {
        let mut lut = [0u16; 256];
        for (i, v) in lut.iter_mut().enumerate() {
            let c = i as f32 / 255.0;
            let l = if c <= 0.04045 {
                c / 12.92
            } else {
                ((c + 0.055) / 1.055).powf(2.4)
            };
            *v = (l * 65535.0 + 0.5) as u16;
        }
        lut
    })
}

fn linear_to_srgb_lut() -> &'static [u8] {
    static LUT: OnceLock<Vec<u8>> = OnceLock::new();
    LUT.get_or_init(|| {
        let size = 1usize << LINEAR_LUT_BITS;
        (0..size)
            .map(|i| {
                let l = i as f32 / (size - 1) as f32;
                let c = if l <= 0.003_130_8 {
                    l * 12.92
                } else {
                    1.055 * l.powf(1.0 / 2.4) - 0.055
                };
                (c * 255.0 + 0.5).clamp(0.0, 255.0) as u8
            })
            .collect()
    })
}

fn linear_to_srgb(v: u16) -> u8 {
    linear_to_srgb_lut()[(v >> (16 - LINEAR_LUT_BITS)) as usize]
}

/// Resize in linear light: RGB channels are decoded from sRGB into 16-bit
/// linear values, resized, then encoded back.
fn resize_linear(
    src_dims: (u32, u32),
    src_pixels: &[u8],
    dst_dims: (u32, u32),
    options: &ResizeOptions,
) -> Result<Vec<u8>, String> {
    let to_linear = srgb_to_linear_lut();
    let needed = required_bytes(src_dims, PixelType::U16x4)?;
    let mut src_image = fir::images::Image::new(src_dims.0, src_dims.1, PixelType::U16x4);
    let buffer = src_image.buffer_mut();
    if buffer.len() != needed || src_pixels.len() * 2 < needed {
        return Err("linear resize buffer size mismatch".to_string());
    }
    for (out, px) in buffer.chunks_exact_mut(8).zip(src_pixels.chunks_exact(4)) {
        let values = [
            to_linear[px[0] as usize],
            to_linear[px[1] as usize],
            to_linear[px[2] as usize],
            px[3] as u16 * 257,
        ];
        for (bytes, v) in out.chunks_exact_mut(2).zip(values) {
            bytes.copy_from_slice(&v.to_ne_bytes());
        }
    }

    let mut dst_image = fir::images::Image::new(dst_dims.0, dst_dims.1, PixelType::U16x4);
    let mul_div = MulDiv::default();
    mul_div
        .multiply_alpha_inplace(&mut src_image)
        .map_err(|e| format!("failed to premultiply alpha: {e}"))?;
    fir::Resizer::new()
        .resize(&src_image, &mut dst_image, options)
        .map_err(|e| format!("fir resize error: {e:?}"))?;
    mul_div
        .divide_alpha_inplace(&mut dst_image)
        .map_err(|e| format!("failed to unpremultiply alpha: {e}"))?;

    let wide = dst_image.into_vec();
    let mut out = Vec::with_capacity(wide.len() / 2);
    for px in wide.chunks_exact(8) {
        let ch = |i: usize| u16::from_ne_bytes([px[2 * i], px[2 * i + 1]]);
        out.extend_from_slice(&[
            linear_to_srgb(ch(0)),
            linear_to_srgb(ch(1)),
            linear_to_srgb(ch(2)),
            (ch(3) >> 8) as u8,
        ]);
    }
    Ok(out)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::backend::BackendContext;
    use crate::ops::Mipmapped;
    use std::sync::mpsc;
    use std::time::Duration;

    fn checker(width: i32, height: i32) -> Arc<Image> {
        let info = ImageInfo::n32_premul(width, height);
        let mut data = Vec::with_capacity((width * height * 4) as usize);
        for y in 0..height {
            for x in 0..width {
                let v = if (x + y) % 2 == 0 { 255 } else { 0 };
                data.extend_from_slice(&[v, v, v, 255]);
            }
        }
        Image::from_raster_data(info, Arc::new(data), width as usize * 4).unwrap()
    }

    fn solid(width: i32, height: i32, rgba: [u8; 4]) -> Pixmap {
        let info = ImageInfo::new(width, height, ColorType::Rgba8888, AlphaType::Unpremul, None);
        let data = rgba.repeat((width * height) as usize);
        Pixmap::from_vec(info, width as usize * 4, data).unwrap()
    }

    fn read_sync(
        image: &Arc<Image>,
        info: &ImageInfo,
        src_rect: &IRect,
        gamma: RescaleGamma,
        quality: FilterQuality,
    ) -> RescaleResult<AsyncReadResult> {
        let (tx, rx) = mpsc::channel();
        image.async_rescale_and_read_pixels(info, src_rect, gamma, quality, 7u32, move |ctx, r| {
            assert_eq!(ctx, 7);
            tx.send(r).unwrap();
        });
        let result = rx.recv_timeout(Duration::from_secs(10)).unwrap();
        assert!(rx.try_recv().is_err(), "callback ran twice");
        result
    }

    #[test]
    fn same_size_read_copies_region() {
        let image = checker(8, 8);
        let info = ImageInfo::n32_premul(4, 4);
        let rect = IRect::from_xywh(1, 0, 4, 4);
        let result = read_sync(&image, &info, &rect, RescaleGamma::Src, FilterQuality::None).unwrap();
        assert_eq!(result.count(), 1);
        assert_eq!(result.row_bytes(0), Some(16));
        let data = result.data(0).unwrap();
        // (1,0) is black, (2,0) is white
        assert_eq!(&data[0..4], &[0, 0, 0, 255]);
        assert_eq!(&data[4..8], &[255, 255, 255, 255]);
        assert!(result.data(1).is_none());
    }

    #[test]
    fn downscale_averages_checkerboard() {
        let image = checker(16, 16);
        let info = ImageInfo::n32_premul(2, 2);
        let result = read_sync(
            &image,
            &info,
            &IRect::from_wh(16, 16),
            RescaleGamma::Src,
            FilterQuality::Medium,
        )
        .unwrap();
        for px in result.data(0).unwrap().chunks_exact(4) {
            assert!((px[0] as i32 - 128).abs() <= 2, "got {px:?}");
            assert_eq!(px[3], 255);
        }
    }

    #[test]
    fn linear_downscale_is_brighter_than_src() {
        let image = checker(16, 16);
        let info = ImageInfo::n32_premul(1, 1);
        let rect = IRect::from_wh(16, 16);
        let src = read_sync(&image, &info, &rect, RescaleGamma::Src, FilterQuality::Low).unwrap();
        let lin = read_sync(&image, &info, &rect, RescaleGamma::Linear, FilterQuality::Low).unwrap();
        assert!(lin.data(0).unwrap()[0] > src.data(0).unwrap()[0] + 40);
    }

    #[test]
    fn constant_color_survives_every_quality() {
        let pixmap = solid(10, 6, [200, 40, 90, 255]);
        for quality in [
            FilterQuality::None,
            FilterQuality::Low,
            FilterQuality::Medium,
            FilterQuality::High,
        ] {
            for gamma in [RescaleGamma::Src, RescaleGamma::Linear] {
                let dst = ImageInfo::new(5, 12, ColorType::Rgba8888, AlphaType::Unpremul, None);
                let out = scale_pixmap(&pixmap, &dst, gamma, &SamplingOptions::from(quality)).unwrap();
                let px = out.get_color(2, 7).unwrap();
                for (got, want) in px.iter().zip([200u8, 40, 90, 255]) {
                    assert!((*got as i32 - want as i32).abs() <= 1, "{quality:?} {gamma:?}: {px:?}");
                }
            }
        }
    }

    #[test]
    fn scale_converts_to_destination_color_type() {
        let pixmap = solid(4, 4, [10, 20, 30, 128]);
        let dst = ImageInfo::a8(2, 2);
        let out = scale_pixmap(&pixmap, &dst, RescaleGamma::Src, &SamplingOptions::nearest()).unwrap();
        assert_eq!(out.color_type(), ColorType::Alpha8);
        assert_eq!(out.bytes(), &[128, 128, 128, 128]);
    }

    #[test]
    fn picks_resize_algorithm_from_sampling() {
        type Dims = ((u32, u32), (u32, u32));
        let down: Dims = ((100, 100), (10, 10));
        let up: Dims = ((10, 10), (100, 100));
        let alg = |q: FilterQuality, (s, d): Dims| resize_alg(&SamplingOptions::from(q), s, d);
        assert!(matches!(alg(FilterQuality::None, down), fir::ResizeAlg::Nearest));
        assert!(matches!(
            alg(FilterQuality::Medium, down),
            fir::ResizeAlg::Convolution(fir::FilterType::Box)
        ));
        assert!(matches!(
            alg(FilterQuality::Medium, up),
            fir::ResizeAlg::Convolution(fir::FilterType::Bilinear)
        ));
        assert!(matches!(
            alg(FilterQuality::High, up),
            fir::ResizeAlg::Convolution(fir::FilterType::Mitchell)
        ));
    }

    #[test]
    fn rejects_bad_requests_through_callback() {
        let image = checker(8, 8);
        let info = ImageInfo::n32_premul(4, 4);
        let outside = read_sync(
            &image,
            &info,
            &IRect::from_xywh(6, 6, 4, 4),
            RescaleGamma::Src,
            FilterQuality::None,
        );
        assert!(matches!(outside, Err(ImageError::InvalidSubset { .. })));

        let unknown = ImageInfo::new(4, 4, ColorType::Unknown, AlphaType::Premul, None);
        let invalid = read_sync(&image, &unknown, &IRect::from_wh(4, 4), RescaleGamma::Src, FilterQuality::None);
        assert!(matches!(invalid, Err(ImageError::InvalidImageInfo { .. })));
    }

    #[test]
    fn texture_read_back_runs_on_backend() {
        let ctx = BackendContext::host();
        let texture = checker(8, 8).make_texture_image(&ctx, Mipmapped::No).unwrap();
        let info = ImageInfo::n32_premul(8, 8);
        let result = read_sync(&texture, &info, &IRect::from_wh(8, 8), RescaleGamma::Src, FilterQuality::None)
            .unwrap();
        assert_eq!(&result.data(0).unwrap()[0..4], &[255, 255, 255, 255]);

        ctx.backend().abandon();
        let refused = read_sync(&texture, &info, &IRect::from_wh(8, 8), RescaleGamma::Src, FilterQuality::None);
        assert!(matches!(refused, Err(ImageError::BackendAbandoned { .. })));
    }

    #[test]
    fn yuv420_validates_then_reports_unsupported() {
        let image = checker(8, 8);
        let run = |size: ISize| {
            let (tx, rx) = mpsc::channel();
            image.async_rescale_and_read_pixels_yuv420(
                YuvColorSpace::Rec709,
                None,
                &IRect::from_wh(8, 8),
                size,
                RescaleGamma::Src,
                FilterQuality::Low,
                (),
                move |_, r| tx.send(r).unwrap(),
            );
            rx.recv_timeout(Duration::from_secs(5)).unwrap()
        };
        assert!(matches!(run(ISize::new(3, 4)), Err(ImageError::InvalidDestinationSize { .. })));
        assert!(matches!(run(ISize::new(0, 4)), Err(ImageError::InvalidDestinationSize { .. })));
        assert!(matches!(run(ISize::new(4, 4)), Err(ImageError::Unsupported { .. })));
    }
}
