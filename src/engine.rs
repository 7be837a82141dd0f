// src/engine.rs
//
// The core of shared-image. Immutable images that:
// 1. Wrap a pixel source (raster, lazy generator or backend texture)
// 2. Derive new images without copying when they can share the source
// 3. Run filters over subsets and read pixels back asynchronously
//
// This file is a facade over the modules in engine/

// =============================================================================
// SECURITY LIMITS
// =============================================================================

/// Maximum allowed image dimension (width or height).
/// Larger images are rejected to prevent decompression bombs.
pub const MAX_DIMENSION: u32 = 32768;

/// Maximum allowed total pixels (width * height).
/// 100 megapixels = 400MB uncompressed RGBA.
pub const MAX_PIXELS: u64 = 100_000_000;

// =============================================================================
// MODULES
// =============================================================================

pub mod backend;
pub mod cache;
pub mod color;
mod common;
pub mod config;
pub mod convert;
mod decoder;
pub mod encoder;
pub mod filter;
pub mod generator;
pub mod geometry;
pub mod identity;
pub mod image;
mod io;
pub mod memory;
pub mod mipmap;
pub mod pixmap;
mod pool;
pub mod rescale;
pub mod source;

pub use backend::{Backend, BackendContext, BackendJob, HostBackend, TextureId};
pub use cache::BitmapCache;
pub use color::{AlphaType, ColorInfo, ColorSpace, ColorType, ImageInfo};
pub use config::{ConfigPolicy, PipelineConfig};
pub use decoder::{check_dimensions, probe_header, HeaderInfo};
pub use encoder::{encode_pixmap, QualitySettings};
pub use filter::{
    BlurFilter, ComposeFilter, CropFilter, FilterContext, FilterOutput, FilteredImage,
    IdentityFilter, ImageFilter, MergeFilter, OffsetFilter, SpecialImage, TransientFilterCache,
};
pub use generator::{picture_info, EncodedGenerator, ImageGenerator, PaintFn, PictureGenerator};
pub use geometry::{IPoint, IRect, ISize};
pub use identity::{register_stale_listener, unregister_stale_listener, ImageId, ListenerHandle};
pub use image::Image;
pub use io::{color_space_from_encoded, extract_icc_profile};
pub use memory::{readback_semaphore, MemoryPermit, WeightedSemaphore};
pub use mipmap::{MipChainBuilder, MipLevel, MipLevelChain};
pub use pixmap::Pixmap;
pub use rescale::{scale_pixmap, AsyncReadResult};
pub use source::{PixelSource, SourceCapabilities};
