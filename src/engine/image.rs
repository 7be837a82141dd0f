// src/engine/image.rs
//
// The immutable logical image. Derivations return a new Arc<Image> that may
// share the pixel source, or the receiver itself when nothing would change.

use crate::engine::backend::{BackendContext, TextureId};
use crate::engine::cache::BitmapCache;
use crate::engine::color::{AlphaType, ColorInfo, ColorSpace, ColorType, ImageInfo};
use crate::engine::encoder::encode_pixmap;
use crate::engine::filter::{self, FilteredImage, ImageFilter};
use crate::engine::generator::{EncodedGenerator, ImageGenerator, PaintFn, PictureGenerator};
use crate::engine::geometry::{IRect, ISize};
use crate::engine::identity::{notify_stale, ImageId};
use crate::engine::mipmap::MipLevelChain;
use crate::engine::pixmap::Pixmap;
use crate::engine::rescale::{self, AsyncReadResult};
use crate::engine::source::{LazySource, PixelSource, TextureSource, TextureView};
use crate::error::ImageError;
use crate::ops::{
    CachingHint, FilterQuality, Mipmapped, OutputFormat, RescaleGamma, SamplingOptions,
    YuvColorSpace,
};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tracing::debug;

type ImageResult<T> = std::result::Result<T, ImageError>;

#[derive(Debug)]
pub struct Image {
    info: ImageInfo,
    unique_id: ImageId,
    source: PixelSource,
    mips: Option<Arc<MipLevelChain>>,
    added_to_raster_cache: AtomicBool,
}

impl Image {
    fn new(info: ImageInfo, source: PixelSource, mips: Option<Arc<MipLevelChain>>) -> Arc<Image> {
        assert!(
            info.width() > 0 && info.height() > 0,
            "image dimensions must be positive, got {}x{}",
            info.width(),
            info.height()
        );
        Arc::new(Image {
            info,
            unique_id: ImageId::next(),
            source,
            mips,
            added_to_raster_cache: AtomicBool::new(false),
        })
    }

    // -------------------------------------------------------------------------
    // Factories
    // -------------------------------------------------------------------------

    /// Lazily decoded image. Only the header is read here.
    pub fn from_encoded(data: Arc<Vec<u8>>) -> ImageResult<Arc<Image>> {
        if data.is_empty() {
            return Err(ImageError::decode_failed("encoded data is empty"));
        }
        Self::from_generator(Arc::new(EncodedGenerator::new(data)?))
    }

    pub fn from_generator(generator: Arc<dyn ImageGenerator>) -> ImageResult<Arc<Image>> {
        let info = generator.info().clone();
        if !info.is_valid() {
            return Err(ImageError::invalid_image_info(format!(
                "generator reports {}x{} {:?}/{:?}",
                info.width(),
                info.height(),
                info.color_type(),
                info.alpha_type()
            )));
        }
        Ok(Self::new(info, PixelSource::Lazy(LazySource::new(generator)), None))
    }

    /// Picture replay: `paint` is evaluated lazily, once per pixel.
    pub fn from_picture(dimensions: ISize, color_space: Option<ColorSpace>, paint: PaintFn) -> ImageResult<Arc<Image>> {
        let info = ImageInfo::new(
            dimensions.width,
            dimensions.height,
            ColorType::N32,
            AlphaType::Premul,
            color_space,
        );
        Self::from_generator(Arc::new(PictureGenerator::new(info, paint)?))
    }

    /// Share `pixmap`'s storage.
    pub fn from_raster(pixmap: Pixmap) -> ImageResult<Arc<Image>> {
        if !pixmap.info().is_valid() {
            return Err(ImageError::invalid_image_info(format!(
                "raster {}x{} {:?}/{:?}",
                pixmap.width(),
                pixmap.height(),
                pixmap.color_type(),
                pixmap.alpha_type()
            )));
        }
        Ok(Self::new(pixmap.info().clone(), PixelSource::Raster(pixmap), None))
    }

    /// Deep-copy `pixmap` into tightly packed storage.
    pub fn from_raster_copy(pixmap: &Pixmap) -> ImageResult<Arc<Image>> {
        Self::from_raster(pixmap.copy_as(pixmap.info())?)
    }

    pub fn from_raster_data(info: ImageInfo, data: Arc<Vec<u8>>, row_bytes: usize) -> ImageResult<Arc<Image>> {
        Self::from_raster(Pixmap::new(info, row_bytes, data)?)
    }

    /// Adopt `texture`, resident on `context`. The texture is released when
    /// the last image over it drops.
    pub fn from_texture(
        context: &BackendContext,
        texture: TextureId,
        color_info: ColorInfo,
        mipmapped: Mipmapped,
    ) -> ImageResult<Arc<Image>> {
        let source = TextureSource::adopt(context.clone(), texture, mipmapped)?;
        let info = ImageInfo::from_color_info(source.dimensions(), color_info);
        if !info.is_valid() {
            return Err(ImageError::invalid_image_info("texture color info is not usable"));
        }
        Ok(Self::new(info, PixelSource::Texture(TextureView::new(source)), None))
    }

    // -------------------------------------------------------------------------
    // Queries
    // -------------------------------------------------------------------------

    pub fn info(&self) -> &ImageInfo {
        &self.info
    }

    pub fn width(&self) -> i32 {
        self.info.width()
    }

    pub fn height(&self) -> i32 {
        self.info.height()
    }

    pub fn dimensions(&self) -> ISize {
        self.info.dimensions()
    }

    pub fn bounds(&self) -> IRect {
        self.info.bounds()
    }

    pub fn color_info(&self) -> &ColorInfo {
        self.info.color_info()
    }

    pub fn color_type(&self) -> ColorType {
        self.info.color_type()
    }

    pub fn alpha_type(&self) -> AlphaType {
        self.info.alpha_type()
    }

    pub fn color_space(&self) -> Option<&ColorSpace> {
        self.info.color_space()
    }

    pub fn unique_id(&self) -> ImageId {
        self.unique_id
    }

    pub fn source(&self) -> &PixelSource {
        &self.source
    }

    pub fn is_alpha_only(&self) -> bool {
        self.info.color_type().is_alpha_only()
    }

    pub fn is_opaque(&self) -> bool {
        self.info.is_opaque()
    }

    pub fn is_texture_backed(&self) -> bool {
        self.source.is_texture_backed()
    }

    pub fn is_lazy_generated(&self) -> bool {
        self.source.is_lazily_generated()
    }

    pub fn backend_context(&self) -> Option<&BackendContext> {
        self.source.backend_context()
    }

    /// Whether the image can be drawn with `context`.
    pub fn is_valid(&self, context: Option<&BackendContext>) -> bool {
        if context.is_some_and(BackendContext::abandoned) {
            return false;
        }
        match self.source.backend_context() {
            Some(own) => !own.abandoned() && context.map_or(true, |c| own.matches(Some(c))),
            None => true,
        }
    }

    fn check_context(&self, context: Option<&BackendContext>) -> ImageResult<()> {
        match self.source.backend_context() {
            Some(own) if !own.matches(context) => {
                Err(ImageError::backend_mismatch(own.id(), context.map(BackendContext::id)))
            }
            _ => Ok(()),
        }
    }

    pub fn has_mipmaps(&self) -> bool {
        self.mips.is_some()
    }

    pub fn mipmaps(&self) -> Option<&Arc<MipLevelChain>> {
        self.mips.as_ref()
    }

    // -------------------------------------------------------------------------
    // Pixel access
    // -------------------------------------------------------------------------

    pub fn peek_pixels(&self) -> Option<&Pixmap> {
        self.source.peek()
    }

    /// CPU pixels for the whole image. Lazy images go through the raster
    /// cache when `hint` allows it.
    pub fn lock_raster(&self, hint: CachingHint) -> ImageResult<Pixmap> {
        match &self.source {
            PixelSource::Raster(pixmap) => Ok(pixmap.clone()),
            PixelSource::Lazy(lazy) => {
                let cache = BitmapCache::global();
                if hint == CachingHint::Allow {
                    if let Some(pixmap) = cache.find(self.unique_id) {
                        return Ok(pixmap);
                    }
                }
                let pixmap = lazy.generate(&self.info)?;
                if hint == CachingHint::Allow && cache.insert(self.unique_id, pixmap.clone()) {
                    self.added_to_raster_cache.store(true, Ordering::Release);
                }
                Ok(pixmap)
            }
            PixelSource::Texture(view) => view.read_to_pixmap(&self.info),
        }
    }

    /// Copy pixels starting at (`src_x`, `src_y`) into `dst`, converting to
    /// `dst_info`. The source rectangle is trimmed to the image bounds.
    /// `context` of `None` reads a texture through its own context.
    #[allow(clippy::too_many_arguments)]
    pub fn read_pixels(
        &self,
        context: Option<&BackendContext>,
        dst_info: &ImageInfo,
        dst: &mut [u8],
        dst_row_bytes: usize,
        src_x: i32,
        src_y: i32,
        hint: CachingHint,
    ) -> ImageResult<()> {
        if context.is_some() {
            self.check_context(context)?;
        }
        match &self.source {
            PixelSource::Lazy(_) if hint == CachingHint::Allow => {
                self.lock_raster(hint)?
                    .read_pixels(dst_info, dst, dst_row_bytes, src_x, src_y)
            }
            source => source.read_into(&self.info, dst_info, dst, dst_row_bytes, src_x, src_y),
        }
    }

    /// Read into `dst_info`, rescaling when the dimensions differ.
    pub fn scale_pixels(
        &self,
        dst_info: &ImageInfo,
        dst: &mut [u8],
        dst_row_bytes: usize,
        sampling: SamplingOptions,
        hint: CachingHint,
    ) -> ImageResult<()> {
        if dst_info.dimensions() == self.dimensions() {
            return self.read_pixels(None, dst_info, dst, dst_row_bytes, 0, 0, hint);
        }
        let pixmap = self.lock_raster(hint)?;
        let scaled = rescale::scale_pixmap(&pixmap, dst_info, RescaleGamma::Src, &sampling)?;
        scaled.read_pixels(dst_info, dst, dst_row_bytes, 0, 0)
    }

    /// N32 copy with no color space tag.
    pub fn as_legacy_bitmap(&self) -> ImageResult<Pixmap> {
        let alpha = ColorType::N32
            .validate_alpha_type(self.alpha_type())
            .unwrap_or(AlphaType::Premul);
        let info = ImageInfo::new(self.width(), self.height(), ColorType::N32, alpha, None);
        let mut pixmap = Pixmap::alloc(info.clone())?;
        let row_bytes = pixmap.row_bytes();
        let pixels = pixmap
            .pixels_mut()
            .ok_or_else(|| ImageError::internal_panic("fresh pixmap storage is shared"))?;
        self.read_pixels(None, &info, pixels, row_bytes, 0, 0, CachingHint::Allow)?;
        Ok(pixmap)
    }

    // -------------------------------------------------------------------------
    // Derivations
    // -------------------------------------------------------------------------

    pub fn make_subset(self: &Arc<Self>, rect: &IRect, context: Option<&BackendContext>) -> ImageResult<Arc<Image>> {
        if rect.is_empty() {
            let (l, t, r, b) = rect.ltrb();
            return Err(ImageError::empty_subset(l, t, r, b));
        }
        let bounds = self.bounds();
        if !bounds.contains(rect) {
            return Err(ImageError::invalid_subset(rect.ltrb(), self.width(), self.height()));
        }
        self.check_context(context)?;
        if *rect == bounds {
            return Ok(Arc::clone(self));
        }
        let source = self.source.make_subset(rect)?;
        debug!(image_id = self.unique_id.get(), ?rect, "subset");
        Ok(Self::new(self.info.make_dimensions(rect.size()), source, None))
    }

    pub fn make_color_type_and_color_space(
        self: &Arc<Self>,
        color_type: ColorType,
        color_space: Option<ColorSpace>,
        context: Option<&BackendContext>,
    ) -> ImageResult<Arc<Image>> {
        if color_type == ColorType::Unknown {
            return Err(ImageError::unknown_color_type());
        }
        let color_space = color_space.ok_or_else(ImageError::missing_color_space)?;
        self.check_context(context)?;
        if self.color_info().is_no_op(color_type, Some(&color_space)) {
            return Ok(Arc::clone(self));
        }
        let alpha = color_type
            .validate_alpha_type(self.alpha_type())
            .unwrap_or(AlphaType::Premul);
        let target = self
            .info
            .make_color_type(color_type)
            .make_alpha_type(alpha)
            .make_color_space(Some(color_space));
        let source = match &self.source {
            PixelSource::Texture(view) => PixelSource::Texture(view.convert(&target)?),
            _ => PixelSource::Raster(self.lock_raster(CachingHint::Allow)?.copy_as(&target)?),
        };
        debug!(
            image_id = self.unique_id.get(),
            from = ?self.color_type(),
            to = ?color_type,
            "color conversion"
        );
        Ok(Self::new(target, source, None))
    }

    pub fn make_color_space(
        self: &Arc<Self>,
        color_space: Option<ColorSpace>,
        context: Option<&BackendContext>,
    ) -> ImageResult<Arc<Image>> {
        self.make_color_type_and_color_space(self.color_type(), color_space, context)
    }

    /// Same pixels under a new color space tag. Mips are dropped.
    pub fn reinterpret_color_space(self: &Arc<Self>, color_space: Option<ColorSpace>) -> ImageResult<Arc<Image>> {
        let color_space = color_space.ok_or_else(ImageError::missing_color_space)?;
        if self.is_alpha_only() || self.color_info().same_color_space(Some(&color_space)) {
            return Ok(Arc::clone(self));
        }
        let color_info = self.color_info().make_color_space(Some(color_space));
        let source = self.source.relabel(color_info.clone())?;
        Ok(Self::new(self.info.make_color_info(color_info), source, None))
    }

    /// Receiver when its pixels are peekable, otherwise a raster copy.
    pub fn make_raster_image(self: &Arc<Self>, hint: CachingHint) -> ImageResult<Arc<Image>> {
        if self.peek_pixels().is_some() {
            return Ok(Arc::clone(self));
        }
        let row_bytes = self
            .info
            .min_row_bytes()
            .ok_or_else(|| ImageError::byte_size_overflow(self.width(), self.height(), usize::MAX))?;
        let size = self
            .info
            .compute_byte_size(row_bytes)
            .ok_or_else(|| ImageError::byte_size_overflow(self.width(), self.height(), row_bytes))?;
        let mut data = vec![0u8; size];
        self.read_pixels(None, &self.info, &mut data, row_bytes, 0, 0, hint)?;
        Self::from_raster_data(self.info.clone(), Arc::new(data), row_bytes)
    }

    pub fn make_non_texture_image(self: &Arc<Self>) -> ImageResult<Arc<Image>> {
        if !self.is_texture_backed() {
            return Ok(Arc::clone(self));
        }
        self.make_raster_image(CachingHint::Allow)
    }

    /// Upload to `context`. Receiver when it already lives there.
    pub fn make_texture_image(
        self: &Arc<Self>,
        context: &BackendContext,
        mipmapped: Mipmapped,
    ) -> ImageResult<Arc<Image>> {
        context.check_alive()?;
        if let Some(own) = self.backend_context() {
            if own.matches(Some(context)) {
                return Ok(Arc::clone(self));
            }
            return Err(ImageError::backend_mismatch(own.id(), Some(context.id())));
        }
        let pixmap = self.lock_raster(CachingHint::Allow)?;
        let texture = context.backend().upload(&pixmap, mipmapped)?;
        let source = TextureSource::adopt(context.clone(), texture, mipmapped)?;
        Ok(Self::new(self.info.clone(), PixelSource::Texture(TextureView::new(source)), None))
    }

    /// Attach `mips`, or a chain built from the image's pixels for `None`.
    /// Returns the receiver when the chain does not fit or the source
    /// cannot carry one.
    pub fn with_mipmaps(self: &Arc<Self>, mips: Option<Arc<MipLevelChain>>) -> Arc<Image> {
        if self.is_texture_backed() {
            return Arc::clone(self);
        }
        let chain = match mips {
            Some(chain) if chain.valid_for_root_level(&self.info) => chain,
            Some(_) => {
                debug!(image_id = self.unique_id.get(), "mip chain does not fit root level");
                return Arc::clone(self);
            }
            None => match self
                .lock_raster(CachingHint::Allow)
                .and_then(|pixmap| MipLevelChain::build_from_pixmap(&pixmap))
            {
                Ok(chain) => Arc::new(chain),
                Err(err) => {
                    debug!(image_id = self.unique_id.get(), error = %err, "no default mips");
                    return Arc::clone(self);
                }
            },
        };
        Self::new(self.info.clone(), self.source.clone(), Some(chain))
    }

    pub fn with_default_mipmaps(self: &Arc<Self>) -> Arc<Image> {
        self.with_mipmaps(None)
    }

    // -------------------------------------------------------------------------
    // Encoding
    // -------------------------------------------------------------------------

    pub fn ref_encoded_data(&self) -> Option<Arc<Vec<u8>>> {
        self.source.ref_encoded(&self.info)
    }

    /// The bytes this image was decoded from, else a PNG encoding.
    pub fn encode_to_data(&self) -> ImageResult<Arc<Vec<u8>>> {
        if let Some(encoded) = self.ref_encoded_data() {
            return Ok(encoded);
        }
        self.encode_to_data_as(OutputFormat::Png)
    }

    pub fn encode_to_data_as(&self, format: OutputFormat) -> ImageResult<Arc<Vec<u8>>> {
        let pixmap = self.lock_raster(CachingHint::Allow)?;
        encode_pixmap(&pixmap, format).map(Arc::new)
    }

    // -------------------------------------------------------------------------
    // Pipelines
    // -------------------------------------------------------------------------

    pub fn make_with_filter(
        self: &Arc<Self>,
        context: Option<&BackendContext>,
        filter: &dyn ImageFilter,
        subset: &IRect,
        clip: &IRect,
    ) -> ImageResult<FilteredImage> {
        filter::apply(self, context, filter, subset, clip)
    }

    pub fn async_rescale_and_read_pixels<C, F>(
        self: &Arc<Self>,
        info: &ImageInfo,
        src_rect: &IRect,
        gamma: RescaleGamma,
        quality: FilterQuality,
        context: C,
        callback: F,
    ) where
        C: Send + 'static,
        F: FnOnce(C, ImageResult<AsyncReadResult>) + Send + 'static,
    {
        rescale::async_rescale_and_read_pixels(self, info, src_rect, gamma, quality, context, callback)
    }

    #[allow(clippy::too_many_arguments)]
    pub fn async_rescale_and_read_pixels_yuv420<C, F>(
        self: &Arc<Self>,
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
        F: FnOnce(C, ImageResult<AsyncReadResult>) + Send + 'static,
    {
        rescale::async_rescale_and_read_pixels_yuv420(
            self,
            yuv_color_space,
            dst_color_space,
            src_rect,
            dst_size,
            gamma,
            quality,
            context,
            callback,
        )
    }
}

impl Drop for Image {
    fn drop(&mut self) {
        if self.added_to_raster_cache.load(Ordering::Acquire) {
            notify_stale(self.unique_id);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::generator::picture_info;

    fn create_test_image(width: i32, height: i32) -> Arc<Image> {
        let info = ImageInfo::new(width, height, ColorType::Rgba8888, AlphaType::Premul, None);
        let mut data = Vec::with_capacity((width * height * 4) as usize);
        for y in 0..height {
            for x in 0..width {
                data.extend_from_slice(&[x as u8, y as u8, 128, 255]);
            }
        }
        Image::from_raster_data(info, Arc::new(data), width as usize * 4).unwrap()
    }

    fn create_lazy_image(width: i32, height: i32) -> Arc<Image> {
        let paint: PaintFn = Arc::new(|x, y| [x as u8, y as u8, 128, 255]);
        Image::from_generator(Arc::new(
            PictureGenerator::new(picture_info(width, height), paint).unwrap(),
        ))
        .unwrap()
    }

    #[test]
    fn ids_are_unique() {
        let a = create_test_image(2, 2);
        let b = create_test_image(2, 2);
        assert_ne!(a.unique_id(), b.unique_id());
    }

    #[test]
    #[should_panic(expected = "image dimensions must be positive")]
    fn zero_dimensions_are_an_invariant_violation() {
        let pixmap = Pixmap::alloc(ImageInfo::n32_premul(1, 1)).unwrap();
        Image::new(ImageInfo::n32_premul(0, 4), PixelSource::Raster(pixmap), None);
    }

    #[test]
    fn full_bounds_subset_returns_receiver() {
        let image = create_test_image(10, 10);
        let same = image.make_subset(&image.bounds(), None).unwrap();
        assert!(Arc::ptr_eq(&image, &same));
    }

    #[test]
    fn subset_rejects_empty_and_outside_rects() {
        let image = create_test_image(10, 10);
        assert!(matches!(
            image.make_subset(&IRect::from_ltrb(3, 3, 3, 8), None),
            Err(ImageError::EmptySubset { .. })
        ));
        assert!(matches!(
            image.make_subset(&IRect::from_ltrb(5, 5, 11, 8), None),
            Err(ImageError::InvalidSubset { .. })
        ));
    }

    #[test]
    fn raster_subset_shares_pixels() {
        let image = create_test_image(10, 10);
        let sub = image.make_subset(&IRect::from_ltrb(2, 3, 6, 9), None).unwrap();
        assert_eq!(sub.dimensions(), ISize::new(4, 6));
        assert!(sub.source().shares_storage_with(image.source()));
        assert_eq!(sub.peek_pixels().unwrap().get_color(0, 0), Some([2, 3, 128, 255]));
    }

    #[test]
    fn lazy_subset_does_not_materialize() {
        let image = create_lazy_image(16, 16);
        let sub = image.make_subset(&IRect::from_ltrb(4, 4, 8, 8), None).unwrap();
        assert!(sub.is_lazy_generated());
        assert!(!BitmapCache::global().contains(sub.unique_id()));
        let raster = sub.make_raster_image(CachingHint::Disallow).unwrap();
        assert_eq!(raster.peek_pixels().unwrap().get_color(1, 2), Some([5, 6, 128, 255]));
    }

    #[test]
    fn color_conversion_fast_paths() {
        let image = create_test_image(4, 4);
        assert!(matches!(
            image.make_color_type_and_color_space(ColorType::Unknown, Some(ColorSpace::Srgb), None),
            Err(ImageError::UnknownColorType)
        ));
        assert!(matches!(
            image.make_color_type_and_color_space(ColorType::Rgba8888, None, None),
            Err(ImageError::MissingColorSpace)
        ));
        let same = image
            .make_color_type_and_color_space(ColorType::Rgba8888, Some(ColorSpace::Srgb), None)
            .unwrap();
        assert!(Arc::ptr_eq(&image, &same));
    }

    #[test]
    fn color_type_conversion_rewrites_pixels() {
        let image = create_test_image(4, 4);
        let bgra = image
            .make_color_type_and_color_space(ColorType::Bgra8888, Some(ColorSpace::DisplayP3), None)
            .unwrap();
        assert_eq!(bgra.color_type(), ColorType::Bgra8888);
        assert_eq!(bgra.color_space(), Some(&ColorSpace::DisplayP3));
        assert_eq!(bgra.dimensions(), image.dimensions());
        assert_eq!(bgra.peek_pixels().unwrap().row(1)[4..8], [128, 1, 1, 255]);
    }

    #[test]
    fn reinterpret_shares_storage() {
        let image = create_test_image(4, 4);
        let same = image.reinterpret_color_space(Some(ColorSpace::Srgb)).unwrap();
        assert!(Arc::ptr_eq(&image, &same));
        let p3 = image.reinterpret_color_space(Some(ColorSpace::DisplayP3)).unwrap();
        assert_eq!(p3.color_space(), Some(&ColorSpace::DisplayP3));
        assert!(p3.source().shares_storage_with(image.source()));
        assert!(image.reinterpret_color_space(None).is_err());
    }

    #[test]
    fn alpha_only_reinterpret_is_identity() {
        let a8 = Image::from_raster(Pixmap::alloc(ImageInfo::a8(3, 3)).unwrap()).unwrap();
        let same = a8.reinterpret_color_space(Some(ColorSpace::Rec2020)).unwrap();
        assert!(Arc::ptr_eq(&a8, &same));
    }

    #[test]
    fn raster_image_of_raster_is_receiver() {
        let image = create_test_image(3, 3);
        assert!(Arc::ptr_eq(&image, &image.make_raster_image(CachingHint::Allow).unwrap()));
        assert!(Arc::ptr_eq(&image, &image.make_non_texture_image().unwrap()));
    }

    #[test]
    fn lazy_image_populates_and_purges_raster_cache() {
        let image = create_lazy_image(8, 8);
        let id = image.unique_id();
        image.lock_raster(CachingHint::Allow).unwrap();
        assert!(BitmapCache::global().contains(id));
        drop(image);
        assert!(!BitmapCache::global().contains(id));
    }

    #[test]
    fn disallowed_hint_bypasses_cache() {
        let image = create_lazy_image(8, 8);
        let info = ImageInfo::n32_premul(2, 2);
        let mut dst = vec![0u8; 16];
        image
            .read_pixels(None, &info, &mut dst, 8, 3, 3, CachingHint::Disallow)
            .unwrap();
        assert_eq!(&dst[0..4], &[3, 3, 128, 255]);
        assert!(!BitmapCache::global().contains(image.unique_id()));
    }

    #[test]
    fn mipmaps_attach_only_when_valid() {
        let image = create_test_image(8, 4);
        let with = image.with_default_mipmaps();
        assert!(with.has_mipmaps());
        assert_eq!(with.mipmaps().unwrap().count_levels(), 3);
        assert!(with.source().shares_storage_with(image.source()));

        let wrong = Arc::new(MipLevelChain::build(&ImageInfo::n32_premul(16, 16)).unwrap());
        let same = image.with_mipmaps(Some(wrong));
        assert!(Arc::ptr_eq(&image, &same));

        let tiny = create_test_image(1, 1);
        assert!(Arc::ptr_eq(&tiny, &tiny.with_default_mipmaps()));
    }

    #[test]
    fn encode_is_stable_for_rasters() {
        let image = create_test_image(5, 5);
        let a = image.encode_to_data().unwrap();
        let b = image.encode_to_data().unwrap();
        assert_eq!(a, b);
        let decoded = Image::from_encoded(a).unwrap();
        assert_eq!(decoded.dimensions(), image.dimensions());
    }

    #[test]
    fn legacy_bitmap_is_n32_without_color_space() {
        let image = create_test_image(2, 2)
            .reinterpret_color_space(Some(ColorSpace::AdobeRgb))
            .unwrap();
        let bitmap = image.as_legacy_bitmap().unwrap();
        assert_eq!(bitmap.color_type(), ColorType::N32);
        assert!(bitmap.info().color_space().is_none());
        assert_eq!(bitmap.get_color(1, 1), Some([1, 1, 128, 255]));
    }

    #[test]
    fn texture_images_need_matching_context() {
        let ctx = BackendContext::host();
        let other = BackendContext::host();
        let image = create_test_image(6, 6);
        let tex = image.make_texture_image(&ctx, Mipmapped::No).unwrap();
        assert!(tex.is_texture_backed());
        assert!(Arc::ptr_eq(&tex, &tex.make_texture_image(&ctx, Mipmapped::No).unwrap()));
        assert!(tex.is_valid(Some(&ctx)));
        assert!(!tex.is_valid(Some(&other)));

        let rect = IRect::from_ltrb(1, 1, 3, 3);
        assert!(matches!(
            tex.make_subset(&rect, Some(&other)),
            Err(ImageError::BackendMismatch { .. })
        ));
        assert!(tex.make_subset(&rect, None).is_err());
        let sub = tex.make_subset(&rect, Some(&ctx)).unwrap();
        assert!(sub.is_texture_backed());

        let raster = sub.make_non_texture_image().unwrap();
        assert_eq!(raster.peek_pixels().unwrap().get_color(0, 1), Some([1, 2, 128, 255]));
    }

    #[test]
    fn texture_conversion_stays_resident() {
        let ctx = BackendContext::host();
        let tex = create_test_image(4, 4).make_texture_image(&ctx, Mipmapped::No).unwrap();
        let gray = tex
            .make_color_type_and_color_space(ColorType::Gray8, Some(ColorSpace::Srgb), Some(&ctx))
            .unwrap();
        assert!(gray.is_texture_backed());
        assert_eq!(gray.alpha_type(), AlphaType::Opaque);
        assert_eq!(ctx.backend().resident_textures(), 2);
        drop(gray);
        assert_eq!(ctx.backend().resident_textures(), 1);
    }

    #[test]
    fn abandoned_texture_fails_raster_read() {
        let ctx = BackendContext::host();
        let tex = create_test_image(4, 4).make_texture_image(&ctx, Mipmapped::No).unwrap();
        ctx.backend().abandon();
        assert!(!tex.is_valid(None));
        assert!(matches!(
            tex.make_raster_image(CachingHint::Allow),
            Err(ImageError::BackendAbandoned { .. })
        ));
    }
}
