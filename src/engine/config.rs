// src/engine/config.rs
//
// Pipeline configuration presets and enforcement helpers.

use crate::engine::decoder::check_dimensions;
use crate::error::ImageError;
use std::sync::OnceLock;
use tracing::debug;

const STRICT_MAX_PIXELS: u64 = 40_000_000; // ~8K x 5K
const DEFAULT_FILTER_CACHE_BYTES: usize = 32 * 1024 * 1024;
const STRICT_FILTER_CACHE_BYTES: usize = 8 * 1024 * 1024;
const LENIENT_FILTER_CACHE_BYTES: usize = 128 * 1024 * 1024;
const DEFAULT_RASTER_CACHE_BYTES: usize = 64 * 1024 * 1024;
const STRICT_RASTER_CACHE_BYTES: usize = 16 * 1024 * 1024;
const LENIENT_RASTER_CACHE_BYTES: usize = 256 * 1024 * 1024;
const STRICT_READBACK_BUDGET_BYTES: u64 = 256 * 1024 * 1024;

/// Overrides the read-back worker count.
pub const ENV_READBACK_THREADS: &str = "SHARED_IMAGE_READBACK_THREADS";
/// Overrides the raster cache budget in bytes.
pub const ENV_RASTER_CACHE_BYTES: &str = "SHARED_IMAGE_RASTER_CACHE_BYTES";

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ConfigPolicy {
    Default,
    Strict,
    Lenient,
    Custom,
}

#[derive(Clone, Debug)]
pub struct PipelineConfig {
    pub policy: ConfigPolicy,
    /// Largest decoded image accepted by lazy sources.
    pub max_pixels: u64,
    /// Budget of the per-call transient filter cache.
    pub filter_cache_bytes: usize,
    /// Budget of the process-wide raster cache.
    pub raster_cache_bytes: usize,
    /// Bytes of read-back buffers allowed in flight; `None` uses the built-in fallback.
    pub readback_budget_bytes: Option<u64>,
    /// Read-back worker threads; `None` uses available parallelism.
    pub readback_threads: Option<usize>,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            policy: ConfigPolicy::Default,
            max_pixels: crate::engine::MAX_PIXELS,
            filter_cache_bytes: DEFAULT_FILTER_CACHE_BYTES,
            raster_cache_bytes: DEFAULT_RASTER_CACHE_BYTES,
            readback_budget_bytes: None,
            readback_threads: None,
        }
    }
}

impl PipelineConfig {
    pub fn strict() -> Self {
        Self {
            policy: ConfigPolicy::Strict,
            max_pixels: STRICT_MAX_PIXELS,
            filter_cache_bytes: STRICT_FILTER_CACHE_BYTES,
            raster_cache_bytes: STRICT_RASTER_CACHE_BYTES,
            readback_budget_bytes: Some(STRICT_READBACK_BUDGET_BYTES),
            readback_threads: None,
        }
    }

    pub fn lenient() -> Self {
        Self {
            policy: ConfigPolicy::Lenient,
            max_pixels: crate::engine::MAX_PIXELS,
            filter_cache_bytes: LENIENT_FILTER_CACHE_BYTES,
            raster_cache_bytes: LENIENT_RASTER_CACHE_BYTES,
            readback_budget_bytes: None,
            readback_threads: None,
        }
    }

    pub fn custom() -> Self {
        Self {
            policy: ConfigPolicy::Custom,
            ..Self::default()
        }
    }

    pub fn apply_policy(policy: ConfigPolicy) -> Self {
        match policy {
            ConfigPolicy::Default => Self::default(),
            ConfigPolicy::Strict => Self::strict(),
            ConfigPolicy::Lenient => Self::lenient(),
            ConfigPolicy::Custom => Self::custom(),
        }
    }

    pub fn from_policy_name(name: &str) -> Result<Self, ImageError> {
        match name.to_lowercase().as_str() {
            "default" => Ok(Self::default()),
            "strict" => Ok(Self::strict()),
            "lenient" => Ok(Self::lenient()),
            other => Err(ImageError::invalid_argument(
                "policy",
                other.to_string(),
                "expected default, strict or lenient",
            )),
        }
    }

    /// Apply environment overrides on top of this config.
    pub fn with_env_overrides(mut self) -> Self {
        if let Some(threads) = read_env_usize(ENV_READBACK_THREADS).filter(|&n| n > 0) {
            self.readback_threads = Some(threads);
        }
        if let Some(bytes) = read_env_usize(ENV_RASTER_CACHE_BYTES) {
            self.raster_cache_bytes = bytes;
        }
        self
    }

    pub fn enforce_dimensions(&self, width: u32, height: u32) -> Result<(), ImageError> {
        check_dimensions(width, height)?;
        let pixels = width as u64 * height as u64;
        if pixels > self.max_pixels {
            return Err(ImageError::pixel_count_exceeds_limit(pixels, self.max_pixels));
        }
        Ok(())
    }

    /// Install the process-wide config. Only the first call wins; later
    /// calls hand the rejected config back.
    pub fn install(self) -> Result<(), PipelineConfig> {
        GLOBAL_CONFIG.set(self)
    }

    pub fn global() -> &'static PipelineConfig {
        GLOBAL_CONFIG.get_or_init(|| {
            let config = PipelineConfig::default().with_env_overrides();
            debug!(?config, "using default pipeline config");
            config
        })
    }
}

static GLOBAL_CONFIG: OnceLock<PipelineConfig> = OnceLock::new();

fn read_env_usize(name: &str) -> Option<usize> {
    std::env::var(name)
        .ok()
        .and_then(|raw| raw.trim().parse::<usize>().ok())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn presets_differ_where_expected() {
        let strict = PipelineConfig::strict();
        let lenient = PipelineConfig::lenient();
        assert!(strict.max_pixels < lenient.max_pixels);
        assert!(strict.filter_cache_bytes < PipelineConfig::default().filter_cache_bytes);
        assert_eq!(PipelineConfig::default().filter_cache_bytes, 32 * 1024 * 1024);
        assert_eq!(
            PipelineConfig::apply_policy(ConfigPolicy::Custom).policy,
            ConfigPolicy::Custom
        );
    }

    #[test]
    fn policy_names_parse() {
        assert_eq!(
            PipelineConfig::from_policy_name("STRICT").unwrap().policy,
            ConfigPolicy::Strict
        );
        assert!(PipelineConfig::from_policy_name("paranoid").is_err());
    }

    #[test]
    fn enforce_dimensions_uses_policy_limit() {
        let strict = PipelineConfig::strict();
        assert!(strict.enforce_dimensions(4000, 4000).is_ok());
        assert!(matches!(
            strict.enforce_dimensions(8000, 8000),
            Err(ImageError::PixelCountExceedsLimit { .. })
        ));
        assert!(matches!(
            PipelineConfig::default().enforce_dimensions(40_000, 1),
            Err(ImageError::DimensionExceedsLimit { .. })
        ));
    }

    #[test]
    fn install_keeps_the_first_config() {
        // custom() carries default limits, so other tests see the same values
        let first = PipelineConfig::custom().with_env_overrides().install();
        let installed = PipelineConfig::global();
        if first.is_ok() {
            assert_eq!(installed.policy, ConfigPolicy::Custom);
        }

        let rejected = PipelineConfig::strict().install().unwrap_err();
        assert_eq!(rejected.policy, ConfigPolicy::Strict);
        assert!(std::ptr::eq(PipelineConfig::global(), installed));
        assert_ne!(PipelineConfig::global().policy, ConfigPolicy::Strict);
    }
}
