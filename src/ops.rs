// src/ops.rs
//
// Request value types shared by the derivation and read-back pipelines.
// These are cheap to create and copy - the expensive work happens in engine/.

/// Output format for encoding
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OutputFormat {
    Jpeg { quality: u8 },
    Png,
    WebP { quality: u8 },
}

impl OutputFormat {
    pub fn from_str(format: &str, quality: Option<u8>) -> Result<Self, String> {
        let q = quality.unwrap_or(80);
        match format.to_lowercase().as_str() {
            "jpeg" | "jpg" => Ok(Self::Jpeg { quality: q }),
            "png" => Ok(Self::Png),
            "webp" => Ok(Self::WebP { quality: q }),
            other => Err(format!("unsupported format: {other}")),
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Self::Jpeg { .. } => "jpeg",
            Self::Png => "png",
            Self::WebP { .. } => "webp",
        }
    }
}

/// Legacy filter quality levels used by scaling and read-back.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash)]
pub enum FilterQuality {
    /// Nearest neighbor
    #[default]
    None,
    /// Bilinear
    Low,
    /// Bilinear with nearest mip level
    Medium,
    /// Bicubic (Mitchell)
    High,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum FilterMode {
    Nearest,
    Linear,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub enum MipmapMode {
    None,
    Nearest,
    Linear,
}

/// Cubic resampler coefficients (B, C).
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct CubicResampler {
    pub b: f32,
    pub c: f32,
}

impl CubicResampler {
    pub const fn mitchell() -> Self {
        Self {
            b: 1.0 / 3.0,
            c: 1.0 / 3.0,
        }
    }

    pub const fn catmull_rom() -> Self {
        Self { b: 0.0, c: 0.5 }
    }
}

/// Concrete sampling parameters derived from a [`FilterQuality`].
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SamplingOptions {
    pub filter: FilterMode,
    pub mipmap: MipmapMode,
    pub cubic: Option<CubicResampler>,
}

impl SamplingOptions {
    pub const fn nearest() -> Self {
        Self {
            filter: FilterMode::Nearest,
            mipmap: MipmapMode::None,
            cubic: None,
        }
    }

    pub fn use_cubic(&self) -> bool {
        self.cubic.is_some()
    }
}

impl Default for SamplingOptions {
    fn default() -> Self {
        Self::nearest()
    }
}

impl From<FilterQuality> for SamplingOptions {
    fn from(quality: FilterQuality) -> Self {
        match quality {
            FilterQuality::High => Self {
                filter: FilterMode::Nearest,
                mipmap: MipmapMode::None,
                cubic: Some(CubicResampler::mitchell()),
            },
            FilterQuality::Medium => Self {
                filter: FilterMode::Linear,
                mipmap: MipmapMode::Nearest,
                cubic: None,
            },
            FilterQuality::Low => Self {
                filter: FilterMode::Linear,
                mipmap: MipmapMode::None,
                cubic: None,
            },
            FilterQuality::None => Self::nearest(),
        }
    }
}

/// Whether rescaling happens on the stored values or in linear light.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum RescaleGamma {
    #[default]
    Src,
    Linear,
}

/// Whether a synchronous read may consult or populate the raster cache.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum CachingHint {
    #[default]
    Allow,
    Disallow,
}

#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum Mipmapped {
    #[default]
    No,
    Yes,
}

/// YUV matrix used by planar read-back.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum YuvColorSpace {
    #[default]
    Jpeg,
    Rec601,
    Rec709,
    Rec2020,
    Identity,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn output_format_parses_aliases() {
        assert_eq!(
            OutputFormat::from_str("JPG", Some(90)).unwrap(),
            OutputFormat::Jpeg { quality: 90 }
        );
        assert_eq!(OutputFormat::from_str("png", None).unwrap(), OutputFormat::Png);
        assert_eq!(
            OutputFormat::from_str("webp", None).unwrap(),
            OutputFormat::WebP { quality: 80 }
        );
        assert!(OutputFormat::from_str("gif", None).is_err());
    }

    #[test]
    fn filter_quality_maps_to_sampling() {
        let high = SamplingOptions::from(FilterQuality::High);
        assert!(high.use_cubic());
        assert_eq!(high.cubic, Some(CubicResampler::mitchell()));

        let medium = SamplingOptions::from(FilterQuality::Medium);
        assert_eq!(medium.filter, FilterMode::Linear);
        assert_eq!(medium.mipmap, MipmapMode::Nearest);

        let low = SamplingOptions::from(FilterQuality::Low);
        assert_eq!(low.filter, FilterMode::Linear);
        assert_eq!(low.mipmap, MipmapMode::None);

        assert_eq!(SamplingOptions::from(FilterQuality::None), SamplingOptions::nearest());
    }
}
