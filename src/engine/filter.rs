// src/engine/filter.rs
//
// Filter application over an image subset.
//
// Filters work in the local space of the subset, where (0,0) is the
// subset's top-left corner. Crop rects and the clip are given in image
// space, so the context carries the translation into local space. The
// returned offset is translated back and clipped against the exact clip.

use crate::engine::backend::BackendContext;
use crate::engine::color::{AlphaType, ColorInfo, ColorType, ImageInfo};
use crate::engine::config::PipelineConfig;
use crate::engine::convert::premul;
use crate::engine::decoder::check_dimensions;
use crate::engine::geometry::{IPoint, IRect, ISize};
use crate::engine::identity::ImageId;
use crate::engine::image::Image;
use crate::engine::pixmap::Pixmap;
use crate::error::ImageError;
use crate::ops::CachingHint;
use image::RgbaImage;
use parking_lot::Mutex;
use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;
use tracing::{debug, trace};

type FilterResult<T> = std::result::Result<T, ImageError>;

// =============================================================================
// SPECIAL IMAGES
// =============================================================================

/// A rectangle of an image, used only while filters run.
#[derive(Clone, Debug)]
pub struct SpecialImage {
    image: Arc<Image>,
    subset: IRect,
}

impl SpecialImage {
    pub fn new(image: Arc<Image>, subset: IRect) -> FilterResult<Self> {
        if !image.bounds().contains(&subset) {
            return Err(ImageError::invalid_subset(subset.ltrb(), image.width(), image.height()));
        }
        Ok(Self { image, subset })
    }

    pub fn from_pixmap(pixmap: Pixmap) -> FilterResult<Self> {
        let image = Image::from_raster(pixmap)?;
        let subset = image.bounds();
        Ok(Self { image, subset })
    }

    /// The backing image; `subset` locates this special image inside it.
    pub fn image(&self) -> &Arc<Image> {
        &self.image
    }

    pub fn subset(&self) -> IRect {
        self.subset
    }

    pub fn dimensions(&self) -> ISize {
        self.subset.size()
    }

    /// Sub-rectangle given in this special image's coordinates.
    pub fn make_subset(&self, rect: &IRect) -> FilterResult<SpecialImage> {
        let local = IRect::from_size(self.dimensions());
        if !local.contains(rect) {
            return Err(ImageError::invalid_subset(
                rect.ltrb(),
                local.width(),
                local.height(),
            ));
        }
        Ok(Self {
            image: Arc::clone(&self.image),
            subset: rect.offset_by(self.subset.origin()),
        })
    }

    /// CPU pixels of the subset.
    pub fn as_pixmap(&self) -> FilterResult<Pixmap> {
        let pixmap = self.image.lock_raster(CachingHint::Allow)?;
        pixmap.extract_subset(&self.subset).ok_or_else(|| {
            ImageError::invalid_subset(self.subset.ltrb(), pixmap.width(), pixmap.height())
        })
    }

    /// Premultiplied RGBA copy of the subset.
    fn to_premul_rgba(&self, color_info: &ColorInfo) -> FilterResult<Pixmap> {
        let target = ImageInfo::new(
            self.subset.width(),
            self.subset.height(),
            ColorType::Rgba8888,
            AlphaType::Premul,
            color_info.color_space().cloned(),
        );
        self.as_pixmap()?.copy_as(&target)
    }
}

// =============================================================================
// TRANSIENT CACHE
// =============================================================================

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct FilterCacheKey {
    filter_id: u32,
    ctm: IPoint,
    clip: IRect,
    source_id: ImageId,
    source_subset: IRect,
}

impl FilterCacheKey {
    fn new(filter_id: u32, ctx: &FilterContext<'_>) -> Self {
        Self {
            filter_id,
            ctm: ctx.ctm,
            clip: ctx.clip,
            source_id: ctx.source.image.unique_id(),
            source_subset: ctx.source.subset,
        }
    }
}

#[derive(Debug)]
struct CacheEntry {
    output: FilterOutput,
    bytes: usize,
    last_used: u64,
}

#[derive(Debug, Default)]
struct CacheState {
    entries: HashMap<FilterCacheKey, CacheEntry>,
    total_bytes: usize,
    tick: u64,
    hits: u64,
}

/// Results of filter nodes within one application. Created per call and
/// dropped with it.
#[derive(Debug)]
pub struct TransientFilterCache {
    budget_bytes: usize,
    state: Mutex<CacheState>,
}

impl TransientFilterCache {
    pub fn new(budget_bytes: usize) -> Self {
        Self {
            budget_bytes,
            state: Mutex::new(CacheState::default()),
        }
    }

    pub fn with_default_budget() -> Self {
        Self::new(PipelineConfig::global().filter_cache_bytes)
    }

    pub fn get(&self, key: &FilterCacheKey) -> Option<FilterOutput> {
        let mut state = self.state.lock();
        state.tick += 1;
        let tick = state.tick;
        let entry = state.entries.get_mut(key)?;
        entry.last_used = tick;
        let output = entry.output.clone();
        state.hits += 1;
        trace!(filter_id = key.filter_id, "filter cache hit");
        Some(output)
    }

    pub fn set(&self, key: FilterCacheKey, output: FilterOutput) {
        let size = output.image.dimensions();
        let bytes = size.area().max(0) as usize * output.image.image.info().bytes_per_pixel();
        if bytes > self.budget_bytes {
            return;
        }
        let mut state = self.state.lock();
        state.tick += 1;
        let last_used = state.tick;
        if let Some(old) = state.entries.insert(
            key,
            CacheEntry {
                output,
                bytes,
                last_used,
            },
        ) {
            state.total_bytes -= old.bytes;
        }
        state.total_bytes += bytes;
        while state.total_bytes > self.budget_bytes {
            let victim = state
                .entries
                .iter()
                .filter(|(k, _)| **k != key)
                .min_by_key(|(_, e)| e.last_used)
                .map(|(k, _)| *k);
            let Some(victim) = victim else { break };
            if let Some(evicted) = state.entries.remove(&victim) {
                state.total_bytes -= evicted.bytes;
            }
        }
    }

    pub fn len(&self) -> usize {
        self.state.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn hits(&self) -> u64 {
        self.state.lock().hits
    }
}

// =============================================================================
// FILTER CONTRACT
// =============================================================================

/// What a filter node sees: the translation from image space into local
/// space, the clip in local space, the per-call cache and the source.
#[derive(Clone, Debug)]
pub struct FilterContext<'a> {
    ctm: IPoint,
    clip: IRect,
    cache: &'a TransientFilterCache,
    color_info: ColorInfo,
    source: SpecialImage,
}

impl<'a> FilterContext<'a> {
    pub fn new(
        ctm: IPoint,
        clip: IRect,
        cache: &'a TransientFilterCache,
        color_info: ColorInfo,
        source: SpecialImage,
    ) -> Self {
        Self {
            ctm,
            clip,
            cache,
            color_info,
            source,
        }
    }

    pub fn ctm(&self) -> IPoint {
        self.ctm
    }

    pub fn clip(&self) -> IRect {
        self.clip
    }

    pub fn cache(&self) -> &'a TransientFilterCache {
        self.cache
    }

    pub fn color_info(&self) -> &ColorInfo {
        &self.color_info
    }

    pub fn source(&self) -> &SpecialImage {
        &self.source
    }

    /// Map a rect from image space into local space.
    pub fn map_rect(&self, rect: &IRect) -> IRect {
        rect.offset_by(self.ctm)
    }

    /// Context for a filter whose input is `source`, already placed at
    /// `offset` in this context's local space.
    fn for_input(&self, source: SpecialImage, offset: IPoint) -> FilterContext<'a> {
        Self {
            ctm: self.ctm - offset,
            clip: self.clip.offset_by(-offset),
            cache: self.cache,
            color_info: self.color_info.clone(),
            source,
        }
    }
}

/// A filter result and its position in the caller's local space.
#[derive(Clone, Debug)]
pub struct FilterOutput {
    pub image: SpecialImage,
    pub offset: IPoint,
}

static NEXT_FILTER_ID: AtomicU32 = AtomicU32::new(1);

pub fn next_filter_id() -> u32 {
    NEXT_FILTER_ID.fetch_add(1, Ordering::Relaxed)
}

pub trait ImageFilter: Send + Sync + fmt::Debug {
    fn unique_id(&self) -> u32;

    fn on_filter_image(&self, ctx: &FilterContext<'_>) -> FilterResult<FilterOutput>;

    /// Run the filter, consulting the context's transient cache first.
    fn filter_image(&self, ctx: &FilterContext<'_>) -> FilterResult<FilterOutput> {
        let key = FilterCacheKey::new(self.unique_id(), ctx);
        if let Some(hit) = ctx.cache().get(&key) {
            return Ok(hit);
        }
        let output = self.on_filter_image(ctx)?;
        ctx.cache().set(key, output.clone());
        Ok(output)
    }
}

fn filter_input(
    input: Option<&Arc<dyn ImageFilter>>,
    ctx: &FilterContext<'_>,
) -> FilterResult<FilterOutput> {
    match input {
        Some(filter) => filter.filter_image(ctx),
        None => Ok(FilterOutput {
            image: ctx.source().clone(),
            offset: IPoint::default(),
        }),
    }
}

/// Restrict `image` placed at `offset` to `bounds`, both in local space.
fn clip_output(image: SpecialImage, offset: IPoint, bounds: &IRect) -> FilterResult<FilterOutput> {
    let placed = IRect::from_pt_size(offset, image.dimensions());
    let kept = placed
        .intersect(bounds)
        .ok_or_else(|| ImageError::filter_failed("output is outside the clip"))?;
    if kept == placed {
        return Ok(FilterOutput { image, offset });
    }
    Ok(FilterOutput {
        image: image.make_subset(&kept.offset_by(-offset))?,
        offset: kept.origin(),
    })
}

// =============================================================================
// BUILT-IN FILTERS
// =============================================================================

/// Passes its source through.
#[derive(Debug)]
pub struct IdentityFilter {
    id: u32,
}

impl IdentityFilter {
    pub fn new() -> Self {
        Self { id: next_filter_id() }
    }
}

impl Default for IdentityFilter {
    fn default() -> Self {
        Self::new()
    }
}

impl ImageFilter for IdentityFilter {
    fn unique_id(&self) -> u32 {
        self.id
    }

    fn on_filter_image(&self, ctx: &FilterContext<'_>) -> FilterResult<FilterOutput> {
        filter_input(None, ctx)
    }
}

/// Translates its input.
#[derive(Debug)]
pub struct OffsetFilter {
    id: u32,
    delta: IPoint,
    input: Option<Arc<dyn ImageFilter>>,
}

impl OffsetFilter {
    pub fn new(dx: i32, dy: i32, input: Option<Arc<dyn ImageFilter>>) -> Self {
        Self {
            id: next_filter_id(),
            delta: IPoint::new(dx, dy),
            input,
        }
    }
}

impl ImageFilter for OffsetFilter {
    fn unique_id(&self) -> u32 {
        self.id
    }

    fn on_filter_image(&self, ctx: &FilterContext<'_>) -> FilterResult<FilterOutput> {
        let out = filter_input(self.input.as_ref(), ctx)?;
        Ok(FilterOutput {
            image: out.image,
            offset: out.offset + self.delta,
        })
    }
}

/// Restricts its input to a rect given in image space.
#[derive(Debug)]
pub struct CropFilter {
    id: u32,
    rect: IRect,
    input: Option<Arc<dyn ImageFilter>>,
}

impl CropFilter {
    pub fn new(rect: IRect, input: Option<Arc<dyn ImageFilter>>) -> Self {
        Self {
            id: next_filter_id(),
            rect,
            input,
        }
    }
}

impl ImageFilter for CropFilter {
    fn unique_id(&self) -> u32 {
        self.id
    }

    fn on_filter_image(&self, ctx: &FilterContext<'_>) -> FilterResult<FilterOutput> {
        let out = filter_input(self.input.as_ref(), ctx)?;
        let crop = ctx
            .map_rect(&self.rect)
            .intersect(&ctx.clip())
            .ok_or_else(|| ImageError::filter_failed("crop rect is outside the clip"))?;
        clip_output(out.image, out.offset, &crop)
    }
}

/// Larger blur sigmas are clamped to this value.
pub const MAX_BLUR_SIGMA: f32 = 532.0;

/// Gaussian blur. The output grows by three sigma on each side.
#[derive(Debug)]
pub struct BlurFilter {
    id: u32,
    sigma: f32,
    input: Option<Arc<dyn ImageFilter>>,
}

impl BlurFilter {
    pub fn new(sigma: f32, input: Option<Arc<dyn ImageFilter>>) -> Self {
        Self {
            id: next_filter_id(),
            sigma,
            input,
        }
    }

    /// Sigma actually used, after clamping to `MAX_BLUR_SIGMA`.
    pub fn effective_sigma(&self) -> f32 {
        self.sigma.min(MAX_BLUR_SIGMA)
    }

    fn pad(&self) -> i32 {
        (self.effective_sigma() * 3.0).ceil() as i32
    }
}

/// Local-space area the blur has to render: the input grown by `pad`,
/// limited to what can still reach `clip`.
fn blur_canvas(placed: &IRect, clip: &IRect, pad: i32) -> FilterResult<IRect> {
    let grown = placed.outset(pad, pad);
    let canvas = grown
        .intersect(clip)
        .and_then(|visible| visible.outset(pad, pad).intersect(&grown))
        .ok_or_else(|| ImageError::filter_failed("output is outside the clip"))?;
    check_dimensions(canvas.width() as u32, canvas.height() as u32)?;
    Ok(canvas)
}

impl ImageFilter for BlurFilter {
    fn unique_id(&self) -> u32 {
        self.id
    }

    fn on_filter_image(&self, ctx: &FilterContext<'_>) -> FilterResult<FilterOutput> {
        if self.sigma.is_infinite() {
            return Err(ImageError::invalid_argument(
                "sigma",
                self.sigma.to_string(),
                "blur sigma must be finite",
            ));
        }
        let out = filter_input(self.input.as_ref(), ctx)?;
        if self.sigma.is_nan() || self.sigma <= 0.0 {
            return Ok(out);
        }
        let sigma = self.effective_sigma();
        let pad = self.pad();
        let src = out.image.to_premul_rgba(ctx.color_info())?;
        let placed = IRect::from_pt_size(out.offset, src.bounds().size());
        let canvas = blur_canvas(&placed, &ctx.clip(), pad)?;
        let (w, h) = (canvas.width(), canvas.height());
        let mut padded = RgbaImage::new(w as u32, h as u32);
        let shift = out.offset - canvas.origin();
        for y in 0..src.height() {
            let dy = y + shift.y;
            if !(0..h).contains(&dy) {
                continue;
            }
            for (x, px) in src.row(y).chunks_exact(4).enumerate() {
                let dx = x as i32 + shift.x;
                if !(0..w).contains(&dx) {
                    continue;
                }
                padded.put_pixel(dx as u32, dy as u32, image::Rgba([px[0], px[1], px[2], px[3]]));
            }
        }
        // channels are blurred as stored, so premultiplied stays consistent
        let blurred = image::imageops::blur(&padded, sigma);
        let info = ImageInfo::new(
            w,
            h,
            ColorType::Rgba8888,
            AlphaType::Premul,
            ctx.color_info().color_space().cloned(),
        );
        let pixmap = Pixmap::from_vec(info, w as usize * 4, blurred.into_raw())?;
        debug!(sigma, width = w, height = h, "blur");
        clip_output(SpecialImage::from_pixmap(pixmap)?, canvas.origin(), &ctx.clip())
    }
}

/// Applies `inner`, then `outer` to the result. Offsets accumulate.
#[derive(Debug)]
pub struct ComposeFilter {
    id: u32,
    outer: Arc<dyn ImageFilter>,
    inner: Arc<dyn ImageFilter>,
}

impl ComposeFilter {
    pub fn new(outer: Arc<dyn ImageFilter>, inner: Arc<dyn ImageFilter>) -> Self {
        Self {
            id: next_filter_id(),
            outer,
            inner,
        }
    }
}

impl ImageFilter for ComposeFilter {
    fn unique_id(&self) -> u32 {
        self.id
    }

    fn on_filter_image(&self, ctx: &FilterContext<'_>) -> FilterResult<FilterOutput> {
        let inner = self.inner.filter_image(ctx)?;
        let outer_ctx = ctx.for_input(inner.image, inner.offset);
        let outer = self.outer.filter_image(&outer_ctx)?;
        Ok(FilterOutput {
            image: outer.image,
            offset: inner.offset + outer.offset,
        })
    }
}

/// Source-over of every input, first input at the bottom.
#[derive(Debug)]
pub struct MergeFilter {
    id: u32,
    inputs: Vec<Option<Arc<dyn ImageFilter>>>,
}

impl MergeFilter {
    pub fn new(inputs: Vec<Option<Arc<dyn ImageFilter>>>) -> Self {
        Self {
            id: next_filter_id(),
            inputs,
        }
    }
}

fn src_over(dst: &mut [u8], src: &[u8]) {
    let inv = 255 - src[3];
    for c in 0..4 {
        dst[c] = src[c].saturating_add(premul(dst[c], inv));
    }
}

impl ImageFilter for MergeFilter {
    fn unique_id(&self) -> u32 {
        self.id
    }

    fn on_filter_image(&self, ctx: &FilterContext<'_>) -> FilterResult<FilterOutput> {
        let outputs = self
            .inputs
            .iter()
            .map(|input| filter_input(input.as_ref(), ctx))
            .collect::<FilterResult<Vec<_>>>()?;
        let bounds = outputs
            .iter()
            .map(|o| IRect::from_pt_size(o.offset, o.image.dimensions()))
            .fold(IRect::default(), |acc, r| acc.join(&r))
            .intersect(&ctx.clip())
            .ok_or_else(|| ImageError::filter_failed("merge inputs are outside the clip"))?;

        let info = ImageInfo::new(
            bounds.width(),
            bounds.height(),
            ColorType::Rgba8888,
            AlphaType::Premul,
            ctx.color_info().color_space().cloned(),
        );
        let mut pixmap = Pixmap::alloc(info)?;
        let row_bytes = pixmap.row_bytes();
        let dst = pixmap
            .pixels_mut()
            .ok_or_else(|| ImageError::internal_panic("fresh pixmap storage is shared"))?;
        for output in &outputs {
            let placed = IRect::from_pt_size(output.offset, output.image.dimensions());
            let Some(overlap) = placed.intersect(&bounds) else {
                continue;
            };
            let src = output.image.to_premul_rgba(ctx.color_info())?;
            for y in overlap.top..overlap.bottom {
                let src_row = src.row(y - placed.top);
                let dst_row = &mut dst[(y - bounds.top) as usize * row_bytes..];
                for x in overlap.left..overlap.right {
                    let s = ((x - placed.left) * 4) as usize;
                    let d = ((x - bounds.left) * 4) as usize;
                    src_over(&mut dst_row[d..d + 4], &src_row[s..s + 4]);
                }
            }
        }
        Ok(FilterOutput {
            image: SpecialImage::from_pixmap(pixmap)?,
            offset: bounds.origin(),
        })
    }
}

// =============================================================================
// APPLICATION
// =============================================================================

/// Result of filtering: draw `image[subset]` at `offset` in image space.
#[derive(Clone, Debug)]
pub struct FilteredImage {
    image: Arc<Image>,
    subset: IRect,
    offset: IPoint,
}

impl FilteredImage {
    pub fn image(&self) -> &Arc<Image> {
        &self.image
    }

    pub fn subset(&self) -> IRect {
        self.subset
    }

    pub fn offset(&self) -> IPoint {
        self.offset
    }

    /// CPU pixels of `image[subset]`.
    pub fn to_pixmap(&self) -> FilterResult<Pixmap> {
        SpecialImage::new(Arc::clone(&self.image), self.subset)?.as_pixmap()
    }
}

/// Filter `image[subset]` and clip the result to `clip`. `subset` and `clip`
/// are in image space.
pub fn apply(
    image: &Arc<Image>,
    context: Option<&BackendContext>,
    filter: &dyn ImageFilter,
    subset: &IRect,
    clip: &IRect,
) -> FilterResult<FilteredImage> {
    if !image.bounds().contains(subset) {
        return Err(ImageError::invalid_subset(subset.ltrb(), image.width(), image.height()));
    }
    if let Some(own) = image.backend_context() {
        if !own.matches(context) {
            return Err(ImageError::backend_mismatch(own.id(), context.map(BackendContext::id)));
        }
    }
    let source = SpecialImage::new(Arc::clone(image), *subset)?;
    let cache = TransientFilterCache::with_default_budget();
    let origin = subset.origin();
    let ctx = FilterContext::new(
        -origin,
        clip.offset_by(-origin),
        &cache,
        image.color_info().clone(),
        source,
    );

    let result = filter.filter_image(&ctx)?;
    let mut offset = result.offset + origin;

    // the context clip may have grown for pixel-moving filters; clip exactly
    let dst_rect = result.image.subset();
    let clipped = dst_rect
        .intersect(&clip.offset_by(dst_rect.origin() - offset))
        .ok_or_else(|| ImageError::filter_failed("result does not intersect the clip"))?;
    offset += clipped.origin() - dst_rect.origin();

    Ok(FilteredImage {
        image: Arc::clone(result.image.image()),
        subset: clipped,
        offset,
    })
}
