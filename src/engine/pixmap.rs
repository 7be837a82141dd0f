// src/engine/pixmap.rs
//
// CPU pixel view: ImageInfo + row stride over reference-counted storage.
// Subsets share storage; nothing here copies unless asked to.

use crate::engine::color::{AlphaType, ColorInfo, ColorSpace, ColorType, ImageInfo};
use crate::engine::convert::{convert_pixels, load_rgba};
use crate::engine::geometry::{IPoint, IRect};
use crate::error::ImageError;
use image::{DynamicImage, GrayImage, RgbImage, RgbaImage};
use std::sync::Arc;

type PixmapResult<T> = std::result::Result<T, ImageError>;

#[derive(Clone, Debug)]
pub struct Pixmap {
    info: ImageInfo,
    row_bytes: usize,
    offset: usize,
    storage: Arc<Vec<u8>>,
}

impl Pixmap {
    /// Wrap existing storage. `storage` must hold at least
    /// `info.compute_byte_size(row_bytes)` bytes.
    pub fn new(info: ImageInfo, row_bytes: usize, storage: Arc<Vec<u8>>) -> PixmapResult<Self> {
        if info.color_type() == ColorType::Unknown {
            return Err(ImageError::unknown_color_type());
        }
        if !info.valid_row_bytes(row_bytes) {
            return Err(ImageError::invalid_argument(
                "row_bytes",
                row_bytes.to_string(),
                format!("must be at least {} and pixel aligned", info.min_row_bytes64()),
            ));
        }
        let needed = info
            .compute_byte_size(row_bytes)
            .ok_or_else(|| ImageError::byte_size_overflow(info.width(), info.height(), row_bytes))?;
        if storage.len() < needed {
            return Err(ImageError::invalid_argument(
                "storage",
                storage.len().to_string(),
                format!("needs {needed} bytes"),
            ));
        }
        Ok(Self {
            info,
            row_bytes,
            offset: 0,
            storage,
        })
    }

    pub fn from_vec(info: ImageInfo, row_bytes: usize, data: Vec<u8>) -> PixmapResult<Self> {
        Self::new(info, row_bytes, Arc::new(data))
    }

    /// Allocate zeroed, tightly packed pixels.
    pub fn alloc(info: ImageInfo) -> PixmapResult<Self> {
        let row_bytes = info
            .min_row_bytes()
            .ok_or_else(|| ImageError::byte_size_overflow(info.width(), info.height(), usize::MAX))?;
        let size = info
            .compute_byte_size(row_bytes)
            .ok_or_else(|| ImageError::byte_size_overflow(info.width(), info.height(), row_bytes))?;
        Self::from_vec(info, row_bytes, vec![0u8; size])
    }

    pub fn info(&self) -> &ImageInfo {
        &self.info
    }

    pub fn row_bytes(&self) -> usize {
        self.row_bytes
    }

    pub fn width(&self) -> i32 {
        self.info.width()
    }

    pub fn height(&self) -> i32 {
        self.info.height()
    }

    pub fn bounds(&self) -> IRect {
        self.info.bounds()
    }

    pub fn color_type(&self) -> ColorType {
        self.info.color_type()
    }

    pub fn alpha_type(&self) -> AlphaType {
        self.info.alpha_type()
    }

    pub fn byte_size(&self) -> usize {
        // validated in new()
        self.info.compute_byte_size(self.row_bytes).unwrap_or(0)
    }

    /// Pixel bytes from the first pixel to the end of the last row.
    pub fn bytes(&self) -> &[u8] {
        &self.storage[self.offset..self.offset + self.byte_size()]
    }

    /// Writable pixels, while this pixmap is the only owner of its storage.
    pub fn pixels_mut(&mut self) -> Option<&mut [u8]> {
        let len = self.byte_size();
        let offset = self.offset;
        Arc::get_mut(&mut self.storage).map(|s| &mut s[offset..offset + len])
    }

    pub fn row(&self, y: i32) -> &[u8] {
        let start = self.offset + y as usize * self.row_bytes;
        let len = self.info.min_row_bytes64() as usize;
        &self.storage[start..start + len]
    }

    pub fn shares_storage_with(&self, other: &Pixmap) -> bool {
        Arc::ptr_eq(&self.storage, &other.storage)
    }

    /// Zero-copy view of `rect`, or `None` when `rect` is not inside bounds.
    pub fn extract_subset(&self, rect: &IRect) -> Option<Pixmap> {
        if !self.bounds().contains(rect) {
            return None;
        }
        let offset = self.offset
            + rect.top as usize * self.row_bytes
            + rect.left as usize * self.info.bytes_per_pixel();
        Some(Pixmap {
            info: self.info.make_wh(rect.width(), rect.height()),
            row_bytes: self.row_bytes,
            offset,
            storage: Arc::clone(&self.storage),
        })
    }

    /// Relabel the pixels without touching them. The color type must keep
    /// the same pixel size.
    pub fn with_color_info(&self, color_info: ColorInfo) -> PixmapResult<Pixmap> {
        if color_info.bytes_per_pixel() != self.info.bytes_per_pixel() {
            return Err(ImageError::conversion_unsupported(format!(
                "cannot relabel {:?} pixels as {:?}",
                self.color_type(),
                color_info.color_type()
            )));
        }
        Ok(Pixmap {
            info: self.info.make_color_info(color_info),
            ..self.clone()
        })
    }

    /// Copy into `dst`, converting to `dst_info`. The source rectangle at
    /// (`src_x`, `src_y`) is trimmed to bounds and the destination shifted
    /// to match; fails only when nothing overlaps.
    pub fn read_pixels(
        &self,
        dst_info: &ImageInfo,
        dst: &mut [u8],
        dst_row_bytes: usize,
        src_x: i32,
        src_y: i32,
    ) -> PixmapResult<()> {
        let requested = IRect::from_xywh(src_x, src_y, dst_info.width(), dst_info.height());
        let src_rect = self
            .bounds()
            .intersect(&requested)
            .ok_or_else(|| {
                let (l, t, r, b) = requested.ltrb();
                ImageError::invalid_subset((l, t, r, b), self.width(), self.height())
            })?;
        let dst_origin = IPoint::new((-src_x).max(0), (-src_y).max(0));
        let dst_offset = dst_origin.y as usize * dst_row_bytes
            + dst_origin.x as usize * dst_info.bytes_per_pixel();
        if dst_offset > dst.len() {
            return Err(ImageError::invalid_argument(
                "dst",
                dst.len().to_string(),
                "destination too small",
            ));
        }
        let src = self
            .extract_subset(&src_rect)
            .ok_or_else(|| ImageError::read_pixels_failed("subset outside bounds"))?;
        let trimmed_dst_info = dst_info.make_dimensions(src_rect.size());
        convert_pixels(
            &trimmed_dst_info,
            &mut dst[dst_offset..],
            dst_row_bytes,
            src.info(),
            src.bytes(),
            src.row_bytes,
        )
    }

    /// Deep copy into tightly packed storage with `info`'s color settings.
    pub fn copy_as(&self, info: &ImageInfo) -> PixmapResult<Pixmap> {
        let target = info.make_dimensions(self.info.dimensions());
        let row_bytes = target
            .min_row_bytes()
            .ok_or_else(|| ImageError::byte_size_overflow(target.width(), target.height(), usize::MAX))?;
        let size = target
            .compute_byte_size(row_bytes)
            .ok_or_else(|| ImageError::byte_size_overflow(target.width(), target.height(), row_bytes))?;
        let mut data = vec![0u8; size];
        self.read_pixels(&target, &mut data, row_bytes, 0, 0)?;
        Pixmap::from_vec(target, row_bytes, data)
    }

    /// Unpremultiplied RGBA of one pixel.
    pub fn get_color(&self, x: i32, y: i32) -> Option<[u8; 4]> {
        if !self.bounds().contains_point(x, y) {
            return None;
        }
        let bpp = self.info.bytes_per_pixel();
        let px = &self.row(y)[x as usize * bpp..];
        Some(load_rgba(self.color_type(), self.alpha_type(), px))
    }

    /// Convert to an `image` buffer for codecs. Alpha is unpremultiplied.
    pub fn to_dynamic_image(&self) -> PixmapResult<DynamicImage> {
        let (w, h) = (self.width() as u32, self.height() as u32);
        match self.color_type() {
            ColorType::Gray8 => {
                let copy = self.copy_as(self.info())?;
                GrayImage::from_raw(w, h, copy.bytes().to_vec())
                    .map(DynamicImage::ImageLuma8)
                    .ok_or_else(|| ImageError::encode_failed("raw", "failed to build gray image"))
            }
            ColorType::Rgb888x => {
                let mut rgb = Vec::with_capacity(w as usize * h as usize * 3);
                for y in 0..self.height() {
                    for px in self.row(y).chunks_exact(4) {
                        rgb.extend_from_slice(&px[..3]);
                    }
                }
                RgbImage::from_raw(w, h, rgb)
                    .map(DynamicImage::ImageRgb8)
                    .ok_or_else(|| ImageError::encode_failed("raw", "failed to build rgb image"))
            }
            _ => {
                let target = ImageInfo::new(
                    self.width(),
                    self.height(),
                    ColorType::Rgba8888,
                    AlphaType::Unpremul,
                    self.info.color_space().cloned(),
                );
                let copy = self.copy_as(&target)?;
                RgbaImage::from_raw(w, h, copy.bytes().to_vec())
                    .map(DynamicImage::ImageRgba8)
                    .ok_or_else(|| ImageError::encode_failed("raw", "failed to build rgba image"))
            }
        }
    }

    /// Take ownership of decoded pixels. RGB input is padded to 32 bits.
    pub fn from_dynamic_image(
        img: DynamicImage,
        color_space: Option<ColorSpace>,
    ) -> PixmapResult<Pixmap> {
        let (w, h) = (img.width() as i32, img.height() as i32);
        let (info, data) = match img {
            DynamicImage::ImageLuma8(gray) => (
                ImageInfo::new(w, h, ColorType::Gray8, AlphaType::Opaque, color_space),
                gray.into_raw(),
            ),
            DynamicImage::ImageRgb8(rgb) => {
                let mut padded = Vec::with_capacity(w as usize * h as usize * 4);
                for px in rgb.as_raw().chunks_exact(3) {
                    padded.extend_from_slice(&[px[0], px[1], px[2], 255]);
                }
                (
                    ImageInfo::new(w, h, ColorType::Rgb888x, AlphaType::Opaque, color_space),
                    padded,
                )
            }
            other => {
                let rgba = other.into_rgba8().into_raw();
                let opaque = rgba.iter().skip(3).step_by(4).all(|&a| a == 255);
                let alpha = if opaque {
                    AlphaType::Opaque
                } else {
                    AlphaType::Unpremul
                };
                (
                    ImageInfo::new(w, h, ColorType::Rgba8888, alpha, color_space),
                    rgba,
                )
            }
        };
        let row_bytes = info.min_row_bytes64() as usize;
        Pixmap::from_vec(info, row_bytes, data)
    }
}
