// src/engine/common.rs
//
// Common utilities shared across engine modules.

use crate::error::ImageError;
use std::panic::{catch_unwind, AssertUnwindSafe};
use tracing::warn;

pub type EngineResult<T> = std::result::Result<T, ImageError>;

/// Run a codec call, turning a panic inside third-party code into an
/// `InternalPanic` error labelled with `label`.
pub fn run_with_panic_policy<T, F>(label: &'static str, f: F) -> EngineResult<T>
where
    F: FnOnce() -> EngineResult<T>,
{
    match catch_unwind(AssertUnwindSafe(f)) {
        Ok(result) => result,
        Err(payload) => {
            let message = payload
                .downcast_ref::<&str>()
                .map(|s| s.to_string())
                .or_else(|| payload.downcast_ref::<String>().cloned())
                .unwrap_or_else(|| "unknown panic payload".to_string());
            warn!(label, %message, "codec panicked");
            Err(ImageError::internal_panic(format!("{label}: {message}")))
        }
    }
}
