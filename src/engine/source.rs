// src/engine/source.rs
//
// Pixel storage behind an image: CPU raster, lazily generated, or resident
// on a backend. Subsetting a lazy or texture source records the crop and
// never materializes pixels.

use crate::engine::backend::{BackendContext, TextureId};
use crate::engine::color::{ColorInfo, ImageInfo};
use crate::engine::generator::ImageGenerator;
use crate::engine::geometry::{IPoint, IRect, ISize};
use crate::engine::pixmap::Pixmap;
use crate::error::ImageError;
use crate::ops::Mipmapped;
use bitflags::bitflags;
use std::sync::Arc;
use tracing::debug;

type SourceResult<T> = std::result::Result<T, ImageError>;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct SourceCapabilities: u8 {
        /// Pixels are addressable in CPU memory without a read.
        const PEEKABLE = 1 << 0;
        const TEXTURE_BACKED = 1 << 1;
        const LAZILY_GENERATED = 1 << 2;
    }
}

/// Source rectangle and destination byte offset for a read of
/// `dst_info`-sized pixels at (`x`, `y`) from a `bounds`-sized source.
/// Trims to the overlap like [`Pixmap::read_pixels`].
fn trim_read(
    bounds: ISize,
    dst_info: &ImageInfo,
    dst_row_bytes: usize,
    x: i32,
    y: i32,
) -> SourceResult<(IRect, usize)> {
    let requested = IRect::from_xywh(x, y, dst_info.width(), dst_info.height());
    let src_rect = IRect::from_size(bounds)
        .intersect(&requested)
        .ok_or_else(|| ImageError::invalid_subset(requested.ltrb(), bounds.width, bounds.height))?;
    let dst_origin = IPoint::new((-x).max(0), (-y).max(0));
    let offset =
        dst_origin.y as usize * dst_row_bytes + dst_origin.x as usize * dst_info.bytes_per_pixel();
    Ok((src_rect, offset))
}

/// A generator plus the crop of its frame this source exposes.
#[derive(Clone, Debug)]
pub struct LazySource {
    generator: Arc<dyn ImageGenerator>,
    subset: IRect,
}

impl LazySource {
    pub fn new(generator: Arc<dyn ImageGenerator>) -> Self {
        let subset = generator.info().bounds();
        Self { generator, subset }
    }

    pub fn generator(&self) -> &Arc<dyn ImageGenerator> {
        &self.generator
    }

    pub fn subset(&self) -> IRect {
        self.subset
    }

    pub fn is_full_frame(&self) -> bool {
        self.subset == self.generator.info().bounds()
    }

    /// Run the generator and return this source's crop, labelled with the
    /// color info of `info`.
    pub fn generate(&self, info: &ImageInfo) -> SourceResult<Pixmap> {
        let frame_info = self.generator.info().clone();
        let mut frame = Pixmap::alloc(frame_info.clone())?;
        let row_bytes = frame.row_bytes();
        let pixels = frame
            .pixels_mut()
            .ok_or_else(|| ImageError::internal_panic("fresh pixmap storage is shared"))?;
        self.generator
            .get_pixels(&frame_info, pixels, row_bytes)
            .map_err(|e| ImageError::read_pixels_failed(format!("generator failed: {e}")))?;
        debug!(
            width = self.subset.width(),
            height = self.subset.height(),
            "lazy source generated"
        );
        let cropped = frame.extract_subset(&self.subset).ok_or_else(|| {
            ImageError::invalid_subset(self.subset.ltrb(), frame_info.width(), frame_info.height())
        })?;
        cropped.with_color_info(info.color_info().clone())
    }

    fn make_subset(&self, rect: &IRect) -> LazySource {
        Self {
            generator: Arc::clone(&self.generator),
            subset: rect.offset_by(self.subset.origin()),
        }
    }
}

/// A resident texture. Its backend storage is released when the last
/// owner drops.
#[derive(Debug)]
pub struct TextureSource {
    context: BackendContext,
    texture: TextureId,
    dimensions: ISize,
    mipmapped: Mipmapped,
}

impl TextureSource {
    /// Take ownership of `texture`, which must live on `context`.
    pub fn adopt(context: BackendContext, texture: TextureId, mipmapped: Mipmapped) -> SourceResult<Self> {
        context.check_alive()?;
        let dimensions = context.backend().texture_dimensions(texture).ok_or_else(|| {
            ImageError::invalid_argument("texture", texture.to_string(), "not resident on context")
        })?;
        Ok(Self {
            context,
            texture,
            dimensions,
            mipmapped,
        })
    }

    pub fn context(&self) -> &BackendContext {
        &self.context
    }

    pub fn texture(&self) -> TextureId {
        self.texture
    }

    pub fn dimensions(&self) -> ISize {
        self.dimensions
    }

    pub fn mipmapped(&self) -> Mipmapped {
        self.mipmapped
    }
}

impl Drop for TextureSource {
    fn drop(&mut self) {
        self.context.backend().release_texture(self.texture);
    }
}

/// A rectangle of a shared texture.
#[derive(Clone, Debug)]
pub struct TextureView {
    source: Arc<TextureSource>,
    subset: IRect,
}

impl TextureView {
    pub fn new(source: TextureSource) -> Self {
        let subset = IRect::from_size(source.dimensions);
        Self {
            source: Arc::new(source),
            subset,
        }
    }

    pub fn source(&self) -> &Arc<TextureSource> {
        &self.source
    }

    pub fn subset(&self) -> IRect {
        self.subset
    }

    pub fn context(&self) -> &BackendContext {
        &self.source.context
    }

    /// Read from the view's local coordinates into `dst`.
    pub fn read(
        &self,
        dst_info: &ImageInfo,
        dst: &mut [u8],
        dst_row_bytes: usize,
        x: i32,
        y: i32,
    ) -> SourceResult<()> {
        self.context().check_alive()?;
        let (local, offset) = trim_read(self.subset.size(), dst_info, dst_row_bytes, x, y)?;
        if offset > dst.len() {
            return Err(ImageError::invalid_argument(
                "dst",
                dst.len().to_string(),
                "destination too small",
            ));
        }
        let src_rect = local.offset_by(self.subset.origin());
        self.context().backend().read_texture(
            self.source.texture,
            &src_rect,
            &dst_info.make_dimensions(local.size()),
            &mut dst[offset..],
            dst_row_bytes,
        )
    }

    /// Read the whole view into a new CPU pixmap described by `info`.
    pub fn read_to_pixmap(&self, info: &ImageInfo) -> SourceResult<Pixmap> {
        let target = info.make_dimensions(self.subset.size());
        let mut pixmap = Pixmap::alloc(target.clone())?;
        let row_bytes = pixmap.row_bytes();
        let pixels = pixmap
            .pixels_mut()
            .ok_or_else(|| ImageError::internal_panic("fresh pixmap storage is shared"))?;
        self.read(&target, pixels, row_bytes, 0, 0)?;
        Ok(pixmap)
    }

    /// Convert on the backend. The result stays resident.
    pub fn convert(&self, dst_info: &ImageInfo) -> SourceResult<TextureView> {
        self.context().check_alive()?;
        let target = dst_info.make_dimensions(self.subset.size());
        let texture = self
            .context()
            .backend()
            .convert_texture(self.source.texture, &self.subset, &target)?;
        let source = TextureSource::adopt(self.context().clone(), texture, Mipmapped::No)?;
        Ok(TextureView::new(source))
    }

    fn make_subset(&self, rect: &IRect) -> TextureView {
        Self {
            source: Arc::clone(&self.source),
            subset: rect.offset_by(self.subset.origin()),
        }
    }
}

/// Storage variant behind an image.
#[derive(Clone, Debug)]
pub enum PixelSource {
    Raster(Pixmap),
    Lazy(LazySource),
    Texture(TextureView),
}

impl PixelSource {
    pub fn capabilities(&self) -> SourceCapabilities {
        match self {
            PixelSource::Raster(_) => SourceCapabilities::PEEKABLE,
            PixelSource::Lazy(_) => SourceCapabilities::LAZILY_GENERATED,
            PixelSource::Texture(_) => SourceCapabilities::TEXTURE_BACKED,
        }
    }

    pub fn peek(&self) -> Option<&Pixmap> {
        match self {
            PixelSource::Raster(pixmap) => Some(pixmap),
            _ => None,
        }
    }

    pub fn is_texture_backed(&self) -> bool {
        self.capabilities().contains(SourceCapabilities::TEXTURE_BACKED)
    }

    pub fn is_lazily_generated(&self) -> bool {
        self.capabilities().contains(SourceCapabilities::LAZILY_GENERATED)
    }

    pub fn backend_context(&self) -> Option<&BackendContext> {
        match self {
            PixelSource::Texture(view) => Some(view.context()),
            _ => None,
        }
    }

    /// Synchronous read from local coordinates (`x`, `y`). `image_info`
    /// describes the pixels this source holds. Never consults a cache.
    pub fn read_into(
        &self,
        image_info: &ImageInfo,
        dst_info: &ImageInfo,
        dst: &mut [u8],
        dst_row_bytes: usize,
        x: i32,
        y: i32,
    ) -> SourceResult<()> {
        match self {
            PixelSource::Raster(pixmap) => pixmap.read_pixels(dst_info, dst, dst_row_bytes, x, y),
            PixelSource::Lazy(lazy) => {
                lazy.generate(image_info)?
                    .read_pixels(dst_info, dst, dst_row_bytes, x, y)
            }
            PixelSource::Texture(view) => view.read(dst_info, dst, dst_row_bytes, x, y),
        }
    }

    /// Crop to `rect`, given in this source's local coordinates. The caller
    /// has checked `rect` against the bounds.
    pub fn make_subset(&self, rect: &IRect) -> SourceResult<PixelSource> {
        match self {
            PixelSource::Raster(pixmap) => pixmap
                .extract_subset(rect)
                .map(PixelSource::Raster)
                .ok_or_else(|| {
                    ImageError::invalid_subset(rect.ltrb(), pixmap.width(), pixmap.height())
                }),
            PixelSource::Lazy(lazy) => Ok(PixelSource::Lazy(lazy.make_subset(rect))),
            PixelSource::Texture(view) => {
                view.context().check_alive()?;
                Ok(PixelSource::Texture(view.make_subset(rect)))
            }
        }
    }

    /// Same storage under a new color label.
    pub fn relabel(&self, color_info: ColorInfo) -> SourceResult<PixelSource> {
        match self {
            PixelSource::Raster(pixmap) => pixmap.with_color_info(color_info).map(PixelSource::Raster),
            // lazy and texture pixels are labelled when read
            PixelSource::Lazy(_) | PixelSource::Texture(_) => Ok(self.clone()),
        }
    }

    /// Encoded bytes that decode to exactly `info`: a full-frame lazy source
    /// whose color info is the generator's.
    pub fn ref_encoded(&self, info: &ImageInfo) -> Option<Arc<Vec<u8>>> {
        let PixelSource::Lazy(lazy) = self else {
            return None;
        };
        let gen_info = lazy.generator.info();
        let same_colors = gen_info.color_type() == info.color_type()
            && gen_info.alpha_type() == info.alpha_type()
            && gen_info.color_info().same_color_space(info.color_space());
        if lazy.is_full_frame() && same_colors {
            lazy.generator.ref_encoded_data()
        } else {
            None
        }
    }

    pub fn shares_storage_with(&self, other: &PixelSource) -> bool {
        match (self, other) {
            (PixelSource::Raster(a), PixelSource::Raster(b)) => a.shares_storage_with(b),
            (PixelSource::Lazy(a), PixelSource::Lazy(b)) => Arc::ptr_eq(&a.generator, &b.generator),
            (PixelSource::Texture(a), PixelSource::Texture(b)) => Arc::ptr_eq(&a.source, &b.source),
            _ => false,
        }
    }
}
