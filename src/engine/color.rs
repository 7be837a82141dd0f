// src/engine/color.rs
//
// Color descriptors: color type, alpha type, color space, and the
// (width, height, ColorInfo) triple that every image and pixmap carries.

use crate::engine::geometry::{IRect, ISize};
use crate::engine::MAX_DIMENSION;
use std::fmt;
use std::sync::Arc;

/// Pixel memory layout.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum ColorType {
    #[default]
    Unknown,
    /// Single 8-bit alpha channel
    Alpha8,
    /// Single 8-bit luminance channel, always opaque
    Gray8,
    /// RGB in 32 bits, padding byte ignored
    Rgb888x,
    Rgba8888,
    Bgra8888,
}

impl ColorType {
    /// Native 32-bit layout for this crate.
    pub const N32: ColorType = ColorType::Rgba8888;

    pub fn bytes_per_pixel(&self) -> usize {
        match self {
            ColorType::Unknown => 0,
            ColorType::Alpha8 | ColorType::Gray8 => 1,
            ColorType::Rgb888x | ColorType::Rgba8888 | ColorType::Bgra8888 => 4,
        }
    }

    pub fn is_alpha_only(&self) -> bool {
        matches!(self, ColorType::Alpha8)
    }

    pub fn is_always_opaque(&self) -> bool {
        matches!(self, ColorType::Gray8 | ColorType::Rgb888x)
    }

    /// Canonical alpha type for this color type, or `None` when `alpha`
    /// is not meaningful for it.
    pub fn validate_alpha_type(&self, alpha: AlphaType) -> Option<AlphaType> {
        match self {
            ColorType::Unknown => Some(AlphaType::Unknown),
            ColorType::Alpha8 => match alpha {
                AlphaType::Unknown => None,
                AlphaType::Unpremul => Some(AlphaType::Premul),
                other => Some(other),
            },
            ColorType::Gray8 | ColorType::Rgb888x => Some(AlphaType::Opaque),
            ColorType::Rgba8888 | ColorType::Bgra8888 => match alpha {
                AlphaType::Unknown => None,
                other => Some(other),
            },
        }
    }
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum AlphaType {
    #[default]
    Unknown,
    Opaque,
    Premul,
    Unpremul,
}

impl AlphaType {
    pub fn is_opaque(&self) -> bool {
        matches!(self, AlphaType::Opaque)
    }
}

/// Color space tag.
///
/// Named spaces compare by name; ICC spaces compare by profile bytes.
#[derive(Clone, PartialEq, Eq, Hash)]
pub enum ColorSpace {
    Srgb,
    SrgbLinear,
    DisplayP3,
    AdobeRgb,
    Rec2020,
    Icc(Arc<[u8]>),
}

impl ColorSpace {
    pub fn from_icc(profile: impl Into<Arc<[u8]>>) -> Self {
        ColorSpace::Icc(profile.into())
    }

    pub fn is_srgb(&self) -> bool {
        matches!(self, ColorSpace::Srgb)
    }

    /// Whether stored values are already linear light.
    pub fn is_linear(&self) -> bool {
        matches!(self, ColorSpace::SrgbLinear)
    }

    pub fn icc_profile(&self) -> Option<&[u8]> {
        match self {
            ColorSpace::Icc(bytes) => Some(bytes),
            _ => None,
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            ColorSpace::Srgb => "srgb",
            ColorSpace::SrgbLinear => "srgb-linear",
            ColorSpace::DisplayP3 => "display-p3",
            ColorSpace::AdobeRgb => "adobe-rgb",
            ColorSpace::Rec2020 => "rec2020",
            ColorSpace::Icc(_) => "icc",
        }
    }
}

impl fmt::Debug for ColorSpace {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ColorSpace::Icc(bytes) => write!(f, "Icc({} bytes)", bytes.len()),
            other => f.write_str(other.name()),
        }
    }
}

/// Color type, alpha type and optional color space of an image.
///
/// An absent color space compares as sRGB.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct ColorInfo {
    color_type: ColorType,
    alpha_type: AlphaType,
    color_space: Option<ColorSpace>,
}

impl ColorInfo {
    pub fn new(
        color_type: ColorType,
        alpha_type: AlphaType,
        color_space: Option<ColorSpace>,
    ) -> Self {
        Self {
            color_type,
            alpha_type,
            color_space,
        }
    }

    pub fn color_type(&self) -> ColorType {
        self.color_type
    }

    pub fn alpha_type(&self) -> AlphaType {
        self.alpha_type
    }

    pub fn color_space(&self) -> Option<&ColorSpace> {
        self.color_space.as_ref()
    }

    /// The color space used for comparisons.
    pub fn effective_color_space(&self) -> ColorSpace {
        self.color_space.clone().unwrap_or(ColorSpace::Srgb)
    }

    pub fn is_alpha_only(&self) -> bool {
        self.color_type.is_alpha_only()
    }

    pub fn is_opaque(&self) -> bool {
        self.alpha_type.is_opaque() || self.color_type.is_always_opaque()
    }

    pub fn bytes_per_pixel(&self) -> usize {
        self.color_type.bytes_per_pixel()
    }

    pub fn same_color_space(&self, other: Option<&ColorSpace>) -> bool {
        let mine = self.color_space.as_ref().unwrap_or(&ColorSpace::Srgb);
        let theirs = other.unwrap_or(&ColorSpace::Srgb);
        mine == theirs
    }

    /// True when moving to (`color_type`, `color_space`) needs no pixel work.
    /// Alpha-only pixels ignore the color space.
    pub fn is_no_op(&self, color_type: ColorType, color_space: Option<&ColorSpace>) -> bool {
        self.color_type == color_type && (self.is_alpha_only() || self.same_color_space(color_space))
    }

    pub fn make_color_type(&self, color_type: ColorType) -> Self {
        Self {
            color_type,
            ..self.clone()
        }
    }

    pub fn make_alpha_type(&self, alpha_type: AlphaType) -> Self {
        Self {
            alpha_type,
            ..self.clone()
        }
    }

    pub fn make_color_space(&self, color_space: Option<ColorSpace>) -> Self {
        Self {
            color_space,
            ..self.clone()
        }
    }
}

/// Dimensions plus color description.
#[derive(Clone, Debug, Default, PartialEq, Eq, Hash)]
pub struct ImageInfo {
    width: i32,
    height: i32,
    color_info: ColorInfo,
}

impl ImageInfo {
    pub fn new(
        width: i32,
        height: i32,
        color_type: ColorType,
        alpha_type: AlphaType,
        color_space: Option<ColorSpace>,
    ) -> Self {
        Self::from_color_info(
            ISize::new(width, height),
            ColorInfo::new(color_type, alpha_type, color_space),
        )
    }

    pub fn from_color_info(size: ISize, color_info: ColorInfo) -> Self {
        Self {
            width: size.width,
            height: size.height,
            color_info,
        }
    }

    pub fn n32_premul(width: i32, height: i32) -> Self {
        Self::new(width, height, ColorType::N32, AlphaType::Premul, None)
    }

    pub fn a8(width: i32, height: i32) -> Self {
        Self::new(width, height, ColorType::Alpha8, AlphaType::Premul, None)
    }

    pub fn width(&self) -> i32 {
        self.width
    }

    pub fn height(&self) -> i32 {
        self.height
    }

    pub fn dimensions(&self) -> ISize {
        ISize::new(self.width, self.height)
    }

    pub fn bounds(&self) -> IRect {
        IRect::from_wh(self.width, self.height)
    }

    pub fn color_info(&self) -> &ColorInfo {
        &self.color_info
    }

    pub fn color_type(&self) -> ColorType {
        self.color_info.color_type()
    }

    pub fn alpha_type(&self) -> AlphaType {
        self.color_info.alpha_type()
    }

    pub fn color_space(&self) -> Option<&ColorSpace> {
        self.color_info.color_space()
    }

    pub fn bytes_per_pixel(&self) -> usize {
        self.color_info.bytes_per_pixel()
    }

    pub fn is_empty(&self) -> bool {
        self.width <= 0 || self.height <= 0
    }

    pub fn is_opaque(&self) -> bool {
        self.color_info.is_opaque()
    }

    pub fn min_row_bytes64(&self) -> u64 {
        self.width.max(0) as u64 * self.bytes_per_pixel() as u64
    }

    /// Tightly packed row length, or `None` if it does not fit in 31 bits.
    pub fn min_row_bytes(&self) -> Option<usize> {
        let rb = self.min_row_bytes64();
        (rb <= i32::MAX as u64).then_some(rb as usize)
    }

    pub fn valid_row_bytes(&self, row_bytes: usize) -> bool {
        if (row_bytes as u64) < self.min_row_bytes64() {
            return false;
        }
        let bpp = self.bytes_per_pixel();
        bpp == 0 || row_bytes % bpp == 0
    }

    /// Bytes needed for `height` rows at `row_bytes`; the last row only
    /// needs its pixels. `None` on overflow.
    pub fn compute_byte_size(&self, row_bytes: usize) -> Option<usize> {
        if self.height <= 0 {
            return Some(0);
        }
        let last_row = usize::try_from(self.min_row_bytes64()).ok()?;
        (self.height as usize - 1)
            .checked_mul(row_bytes)?
            .checked_add(last_row)
    }

    pub fn compute_min_byte_size(&self) -> Option<usize> {
        self.compute_byte_size(self.min_row_bytes()?)
    }

    /// Structural validity: positive bounded dimensions, known color and
    /// alpha types that agree with each other.
    pub fn is_valid(&self) -> bool {
        if self.width <= 0 || self.height <= 0 {
            return false;
        }
        if self.width as u32 > MAX_DIMENSION || self.height as u32 > MAX_DIMENSION {
            return false;
        }
        if self.color_type() == ColorType::Unknown || self.alpha_type() == AlphaType::Unknown {
            return false;
        }
        if self.color_type().is_always_opaque() && self.alpha_type() != AlphaType::Opaque {
            return false;
        }
        self.color_type().validate_alpha_type(self.alpha_type()).is_some()
    }

    pub fn make_wh(&self, width: i32, height: i32) -> Self {
        Self {
            width,
            height,
            color_info: self.color_info.clone(),
        }
    }

    pub fn make_dimensions(&self, size: ISize) -> Self {
        self.make_wh(size.width, size.height)
    }

    pub fn make_color_type(&self, color_type: ColorType) -> Self {
        Self {
            color_info: self.color_info.make_color_type(color_type),
            ..self.clone()
        }
    }

    pub fn make_alpha_type(&self, alpha_type: AlphaType) -> Self {
        Self {
            color_info: self.color_info.make_alpha_type(alpha_type),
            ..self.clone()
        }
    }

    pub fn make_color_space(&self, color_space: Option<ColorSpace>) -> Self {
        Self {
            color_info: self.color_info.make_color_space(color_space),
            ..self.clone()
        }
    }

    pub fn make_color_info(&self, color_info: ColorInfo) -> Self {
        Self {
            color_info,
            ..self.clone()
        }
    }
}
