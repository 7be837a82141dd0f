// src/error.rs
//
// Unified error handling for shared-image
// Uses thiserror for simple, type-safe error handling
//
// Error Taxonomy:
// - UserError: Precondition violations, recoverable
// - BackendRefusal: Abandoned backend or unsupported conversion, recoverable
// - ResourceLimit: Size overflow and dimension limits
// - CodecError: Format/encoding/resampling issues
// - InternalBug: Library bugs (should not happen)

use std::borrow::Cow;
use thiserror::Error;

/// Error taxonomy for derivation and read-back failures.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum ErrorCategory {
    /// Invalid input, recoverable by the caller
    UserError,
    /// The backend declined the work
    BackendRefusal,
    /// Memory/dimension limits
    ResourceLimit,
    /// Format/encoding issues
    CodecError,
    /// Library bugs (should not happen)
    InternalBug,
}

impl ErrorCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCategory::UserError => "UserError",
            ErrorCategory::BackendRefusal => "BackendRefusal",
            ErrorCategory::ResourceLimit => "ResourceLimit",
            ErrorCategory::CodecError => "CodecError",
            ErrorCategory::InternalBug => "InternalBug",
        }
    }
}

/// shared-image error types
#[derive(Debug, Clone, Error)]
pub enum ImageError {
    // Precondition violations
    #[error("Subset {left},{top} {right}x{bottom} is empty")]
    EmptySubset {
        left: i32,
        top: i32,
        right: i32,
        bottom: i32,
    },

    #[error("Rect ({left},{top})-({right},{bottom}) is not contained in image bounds {width}x{height}")]
    InvalidSubset {
        left: i32,
        top: i32,
        right: i32,
        bottom: i32,
        width: i32,
        height: i32,
    },

    #[error("Invalid image info: {reason}")]
    InvalidImageInfo { reason: Cow<'static, str> },

    #[error("Target color type is unknown")]
    UnknownColorType,

    #[error("Target color space is missing")]
    MissingColorSpace,

    #[error("Backend context mismatch: image lives on context {expected}, got {actual:?}")]
    BackendMismatch { expected: u64, actual: Option<u64> },

    #[error("Invalid destination size {width}x{height}: {reason}")]
    InvalidDestinationSize {
        width: i32,
        height: i32,
        reason: Cow<'static, str>,
    },

    #[error("Mip chain rejected: {reason}")]
    InvalidMipmaps { reason: Cow<'static, str> },

    #[error("Invalid value for {name}: {value}. {reason}")]
    InvalidArgument {
        name: Cow<'static, str>,
        value: Cow<'static, str>,
        reason: Cow<'static, str>,
    },

    // Backend refusals
    #[error("Backend context {context} has been abandoned")]
    BackendAbandoned { context: u64 },

    #[error("Conversion not supported: {reason}")]
    ConversionUnsupported { reason: Cow<'static, str> },

    #[error("Pixel read failed: {reason}")]
    ReadPixelsFailed { reason: Cow<'static, str> },

    #[error("Unsupported operation: {operation}")]
    Unsupported { operation: Cow<'static, str> },

    #[error("Filter produced no pixels: {reason}")]
    FilterFailed { reason: Cow<'static, str> },

    // Size limits
    #[error("Byte size overflow for {width}x{height} at {row_bytes} bytes per row")]
    ByteSizeOverflow {
        width: i32,
        height: i32,
        row_bytes: usize,
    },

    #[error("Image dimension {dimension} exceeds maximum {max}")]
    DimensionExceedsLimit { dimension: u32, max: u32 },

    #[error("Image pixel count {pixels} exceeds maximum {max}")]
    PixelCountExceedsLimit { pixels: u64, max: u64 },

    // Codec errors
    #[error("Unsupported image format: {format}")]
    UnsupportedFormat { format: Cow<'static, str> },

    #[error("Failed to decode image: {message}")]
    DecodeFailed { message: Cow<'static, str> },

    #[error("Failed to encode as {format}: {message}")]
    EncodeFailed {
        format: Cow<'static, str>,
        message: Cow<'static, str>,
    },

    #[error("Resize failed ({source_width}x{source_height} -> {target_width}x{target_height}): {message}")]
    ResizeFailed {
        source_width: u32,
        source_height: u32,
        target_width: u32,
        target_height: u32,
        message: Cow<'static, str>,
    },

    // Internal errors
    #[error("Internal error: {message}")]
    InternalPanic { message: Cow<'static, str> },
}

impl ImageError {
    pub fn empty_subset(left: i32, top: i32, right: i32, bottom: i32) -> Self {
        Self::EmptySubset {
            left,
            top,
            right,
            bottom,
        }
    }

    pub fn invalid_subset(
        ltrb: (i32, i32, i32, i32),
        width: i32,
        height: i32,
    ) -> Self {
        Self::InvalidSubset {
            left: ltrb.0,
            top: ltrb.1,
            right: ltrb.2,
            bottom: ltrb.3,
            width,
            height,
        }
    }

    pub fn invalid_image_info(reason: impl Into<Cow<'static, str>>) -> Self {
        Self::InvalidImageInfo {
            reason: reason.into(),
        }
    }

    pub fn unknown_color_type() -> Self {
        Self::UnknownColorType
    }

    pub fn missing_color_space() -> Self {
        Self::MissingColorSpace
    }

    pub fn backend_mismatch(expected: u64, actual: Option<u64>) -> Self {
        Self::BackendMismatch { expected, actual }
    }

    pub fn invalid_destination_size(
        width: i32,
        height: i32,
        reason: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self::InvalidDestinationSize {
            width,
            height,
            reason: reason.into(),
        }
    }

    pub fn invalid_mipmaps(reason: impl Into<Cow<'static, str>>) -> Self {
        Self::InvalidMipmaps {
            reason: reason.into(),
        }
    }

    pub fn invalid_argument(
        name: impl Into<Cow<'static, str>>,
        value: impl Into<Cow<'static, str>>,
        reason: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self::InvalidArgument {
            name: name.into(),
            value: value.into(),
            reason: reason.into(),
        }
    }

    pub fn backend_abandoned(context: u64) -> Self {
        Self::BackendAbandoned { context }
    }

    pub fn conversion_unsupported(reason: impl Into<Cow<'static, str>>) -> Self {
        Self::ConversionUnsupported {
            reason: reason.into(),
        }
    }

    pub fn read_pixels_failed(reason: impl Into<Cow<'static, str>>) -> Self {
        Self::ReadPixelsFailed {
            reason: reason.into(),
        }
    }

    pub fn unsupported(operation: impl Into<Cow<'static, str>>) -> Self {
        Self::Unsupported {
            operation: operation.into(),
        }
    }

    pub fn filter_failed(reason: impl Into<Cow<'static, str>>) -> Self {
        Self::FilterFailed {
            reason: reason.into(),
        }
    }

    pub fn byte_size_overflow(width: i32, height: i32, row_bytes: usize) -> Self {
        Self::ByteSizeOverflow {
            width,
            height,
            row_bytes,
        }
    }

    pub fn dimension_exceeds_limit(dimension: u32, max: u32) -> Self {
        Self::DimensionExceedsLimit { dimension, max }
    }

    pub fn pixel_count_exceeds_limit(pixels: u64, max: u64) -> Self {
        Self::PixelCountExceedsLimit { pixels, max }
    }

    pub fn unsupported_format(format: impl Into<Cow<'static, str>>) -> Self {
        Self::UnsupportedFormat {
            format: format.into(),
        }
    }

    pub fn decode_failed(message: impl Into<Cow<'static, str>>) -> Self {
        Self::DecodeFailed {
            message: message.into(),
        }
    }

    pub fn encode_failed(
        format: impl Into<Cow<'static, str>>,
        message: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self::EncodeFailed {
            format: format.into(),
            message: message.into(),
        }
    }

    pub fn resize_failed(
        source_dims: (u32, u32),
        target_dims: (u32, u32),
        message: impl Into<Cow<'static, str>>,
    ) -> Self {
        Self::ResizeFailed {
            source_width: source_dims.0,
            source_height: source_dims.1,
            target_width: target_dims.0,
            target_height: target_dims.1,
            message: message.into(),
        }
    }

    pub fn internal_panic(message: impl Into<Cow<'static, str>>) -> Self {
        Self::InternalPanic {
            message: message.into(),
        }
    }

    /// Check if the caller can recover from this error.
    ///
    /// Everything except an internal bug is a returned value the caller may
    /// act on; nothing is retried internally.
    pub fn is_recoverable(&self) -> bool {
        !matches!(self.category(), ErrorCategory::InternalBug)
    }

    /// Get the error category for this error
    pub fn category(&self) -> ErrorCategory {
        match self {
            Self::EmptySubset { .. }
            | Self::InvalidSubset { .. }
            | Self::InvalidImageInfo { .. }
            | Self::UnknownColorType
            | Self::MissingColorSpace
            | Self::BackendMismatch { .. }
            | Self::InvalidDestinationSize { .. }
            | Self::InvalidMipmaps { .. }
            | Self::InvalidArgument { .. } => ErrorCategory::UserError,

            Self::BackendAbandoned { .. }
            | Self::ConversionUnsupported { .. }
            | Self::ReadPixelsFailed { .. }
            | Self::Unsupported { .. }
            | Self::FilterFailed { .. } => ErrorCategory::BackendRefusal,

            Self::ByteSizeOverflow { .. }
            | Self::DimensionExceedsLimit { .. }
            | Self::PixelCountExceedsLimit { .. } => ErrorCategory::ResourceLimit,

            Self::UnsupportedFormat { .. }
            | Self::DecodeFailed { .. }
            | Self::EncodeFailed { .. }
            | Self::ResizeFailed { .. } => ErrorCategory::CodecError,

            Self::InternalPanic { .. } => ErrorCategory::InternalBug,
        }
    }
}

// Result type alias
pub type Result<T> = std::result::Result<T, ImageError>;
