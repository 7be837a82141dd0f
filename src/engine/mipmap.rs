// src/engine/mipmap.rs
//
// Mip level chains: half-scale levels below the base image down to 1x1.
// The base level is the image itself and is not stored in the chain.

use crate::engine::color::{ColorType, ImageInfo};
use crate::engine::geometry::ISize;
use crate::engine::image::Image;
use crate::engine::pixmap::Pixmap;
use crate::error::ImageError;
use rayon::prelude::*;
use std::sync::Arc;
use tracing::debug;

type MipResult<T> = std::result::Result<T, ImageError>;

#[derive(Clone, Debug)]
pub struct MipLevel {
    scale: (f32, f32),
    pixmap: Pixmap,
}

impl MipLevel {
    /// Level size relative to the base, per axis.
    pub fn scale(&self) -> (f32, f32) {
        self.scale
    }

    pub fn pixmap(&self) -> &Pixmap {
        &self.pixmap
    }
}

#[derive(Clone, Debug)]
pub struct MipLevelChain {
    levels: Vec<MipLevel>,
}

impl MipLevelChain {
    /// Levels below a `width` x `height` base: floor(log2(max(width, height))).
    pub fn compute_level_count(width: i32, height: i32) -> usize {
        if width <= 0 || height <= 0 {
            return 0;
        }
        let largest = width.max(height) as u32;
        (31 - largest.leading_zeros()) as usize
    }

    /// Size of level `index` (0 is the first level below the base).
    pub fn level_size(base: ISize, index: usize) -> ISize {
        let shift = (index + 1).min(31) as u32;
        ISize::new((base.width >> shift).max(1), (base.height >> shift).max(1))
    }

    /// Allocate zeroed levels for a base described by `info`.
    pub fn build(info: &ImageInfo) -> MipResult<Self> {
        if info.is_empty() {
            return Err(ImageError::invalid_mipmaps(format!(
                "base level {}x{} is empty",
                info.width(),
                info.height()
            )));
        }
        if info.color_type() == ColorType::Unknown {
            return Err(ImageError::invalid_mipmaps("base level color type is unknown"));
        }
        let count = Self::compute_level_count(info.width(), info.height());
        if count == 0 {
            return Err(ImageError::invalid_mipmaps("a 1x1 base has no levels below it"));
        }
        let base = info.dimensions();
        let levels = (0..count)
            .map(|i| {
                let size = Self::level_size(base, i);
                let pixmap = Pixmap::alloc(info.make_dimensions(size))?;
                Ok(MipLevel {
                    scale: (
                        size.width as f32 / base.width as f32,
                        size.height as f32 / base.height as f32,
                    ),
                    pixmap,
                })
            })
            .collect::<MipResult<Vec<_>>>()?;
        Ok(Self { levels })
    }

    /// Build every level from `base` with a 2x2 box filter.
    pub fn build_from_pixmap(base: &Pixmap) -> MipResult<Self> {
        let mut chain = Self::build(base.info())?;
        let mut previous = base.clone();
        for level in chain.levels.iter_mut() {
            let row_bytes = level.pixmap.row_bytes();
            let pixels = level
                .pixmap
                .pixels_mut()
                .ok_or_else(|| ImageError::internal_panic("fresh mip level storage is shared"))?;
            downsample_box(&previous, pixels, row_bytes);
            previous = level.pixmap.clone();
        }
        debug!(
            width = base.width(),
            height = base.height(),
            levels = chain.levels.len(),
            "built mip chain"
        );
        Ok(chain)
    }

    /// Whether this chain can hang off a base described by `root`: one
    /// level per halving, each of the expected size and color type.
    pub fn valid_for_root_level(&self, root: &ImageInfo) -> bool {
        let expected = Self::compute_level_count(root.width(), root.height());
        if expected == 0 || self.levels.len() != expected {
            return false;
        }
        self.levels.iter().enumerate().all(|(i, level)| {
            let info = level.pixmap.info();
            info.dimensions() == Self::level_size(root.dimensions(), i)
                && info.color_type() == root.color_type()
        })
    }

    pub fn count_levels(&self) -> usize {
        self.levels.len()
    }

    pub fn level(&self, index: usize) -> Option<&MipLevel> {
        self.levels.get(index)
    }

    pub fn levels(&self) -> &[MipLevel] {
        &self.levels
    }
}

// Averages every byte channel over a clamped 2x2 footprint. Premultiplied
// inputs stay premultiplied.
fn downsample_box(src: &Pixmap, dst: &mut [u8], dst_row_bytes: usize) {
    let bpp = src.info().bytes_per_pixel();
    let (sw, sh) = (src.width(), src.height());
    let dw = (sw >> 1).max(1) as usize;
    dst.par_chunks_mut(dst_row_bytes)
        .enumerate()
        .for_each(|(y, out)| {
            let y0 = (2 * y as i32).min(sh - 1);
            let y1 = (2 * y as i32 + 1).min(sh - 1);
            let (r0, r1) = (src.row(y0), src.row(y1));
            for x in 0..dw {
                let x0 = (2 * x).min(sw as usize - 1) * bpp;
                let x1 = (2 * x + 1).min(sw as usize - 1) * bpp;
                for c in 0..bpp {
                    let sum = r0[x0 + c] as u32
                        + r0[x1 + c] as u32
                        + r1[x0 + c] as u32
                        + r1[x1 + c] as u32;
                    out[x * bpp + c] = ((sum + 2) / 4) as u8;
                }
            }
        });
}

/// Fills a chain level by level before attaching it to an image.
#[derive(Debug)]
pub struct MipChainBuilder {
    chain: MipLevelChain,
}

impl MipChainBuilder {
    pub fn new(info: &ImageInfo) -> MipResult<Self> {
        Ok(Self {
            chain: MipLevelChain::build(info)?,
        })
    }

    pub fn count_levels(&self) -> usize {
        self.chain.count_levels()
    }

    pub fn level(&self, index: usize) -> Option<&Pixmap> {
        self.chain.level(index).map(MipLevel::pixmap)
    }

    /// Writable pixels of level `index`.
    pub fn level_mut(&mut self, index: usize) -> Option<&mut [u8]> {
        self.chain.levels.get_mut(index)?.pixmap.pixels_mut()
    }

    /// Attach the levels to `image`. Returns `image` itself when they do
    /// not fit it.
    pub fn attach_to(self, image: &Arc<Image>) -> Arc<Image> {
        image.with_mipmaps(Some(Arc::new(self.chain)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::color::{AlphaType, ImageInfo};

    #[test]
    fn level_count_halves_to_one() {
        assert_eq!(MipLevelChain::compute_level_count(1, 1), 0);
        assert_eq!(MipLevelChain::compute_level_count(2, 1), 1);
        assert_eq!(MipLevelChain::compute_level_count(100, 30), 6);
        assert_eq!(MipLevelChain::compute_level_count(256, 256), 8);
        assert_eq!(MipLevelChain::compute_level_count(0, 8), 0);
    }

    #[test]
    fn level_sizes_clamp_at_one() {
        let base = ISize::new(100, 30);
        assert_eq!(MipLevelChain::level_size(base, 0), ISize::new(50, 15));
        assert_eq!(MipLevelChain::level_size(base, 4), ISize::new(3, 1));
        assert_eq!(MipLevelChain::level_size(base, 5), ISize::new(1, 1));
    }

    #[test]
    fn build_rejects_unusable_bases() {
        assert!(MipLevelChain::build(&ImageInfo::n32_premul(0, 4)).is_err());
        assert!(MipLevelChain::build(&ImageInfo::n32_premul(1, 1)).is_err());
        let unknown = ImageInfo::new(4, 4, ColorType::Unknown, AlphaType::Premul, None);
        assert!(MipLevelChain::build(&unknown).is_err());
    }

    #[test]
    fn box_filter_averages_quads() {
        let info = ImageInfo::a8(4, 2);
        let base = Pixmap::from_vec(info, 4, vec![0, 4, 8, 8, 4, 8, 8, 8]).unwrap();
        let chain = MipLevelChain::build_from_pixmap(&base).unwrap();
        assert_eq!(chain.count_levels(), 2);
        assert_eq!(chain.level(0).unwrap().pixmap().bytes(), &[4, 8]);
        assert_eq!(chain.level(1).unwrap().pixmap().bytes(), &[6]);
        assert_eq!(chain.level(1).unwrap().scale(), (0.25, 0.5));
    }

    #[test]
    fn chain_validates_against_its_root_only() {
        let info = ImageInfo::n32_premul(16, 8);
        let chain = MipLevelChain::build(&info).unwrap();
        assert!(chain.valid_for_root_level(&info));
        assert!(!chain.valid_for_root_level(&ImageInfo::n32_premul(8, 8)));
        assert!(!chain.valid_for_root_level(&info.make_color_type(ColorType::Gray8)));
    }

    #[test]
    fn builder_levels_are_writable() {
        let mut builder = MipChainBuilder::new(&ImageInfo::a8(4, 4)).unwrap();
        assert_eq!(builder.count_levels(), 2);
        builder.level_mut(1).unwrap()[0] = 9;
        assert_eq!(builder.level(1).unwrap().bytes(), &[9]);
        assert!(builder.level_mut(2).is_none());
    }
}
