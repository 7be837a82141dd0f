// lib.rs
//
// shared-image: immutable, reference-counted images with cheap derivation
//
// Design goals:
// - Images never change once built; every transform returns a new image
// - Derivations share pixel storage whenever they can
// - Lazy sources decode on demand through a bounded raster cache
// - Texture read-backs run off the caller's thread with memory backpressure

pub mod engine;
pub mod error;
pub mod ops;

pub use engine::{
    AlphaType, AsyncReadResult, BackendContext, ColorInfo, ColorSpace, ColorType, FilteredImage,
    IPoint, IRect, ISize, Image, ImageFilter, ImageId, ImageInfo, MipLevelChain, Pixmap,
};
pub use error::{ErrorCategory, ImageError};
pub use ops::{
    CachingHint, FilterQuality, Mipmapped, OutputFormat, RescaleGamma, SamplingOptions,
    YuvColorSpace,
};

/// Library version
pub fn version() -> &'static str {
    env!("CARGO_PKG_VERSION")
}
