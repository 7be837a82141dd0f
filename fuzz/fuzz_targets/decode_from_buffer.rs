#![no_main]

use libfuzzer_sys::fuzz_target;
use shared_image::{CachingHint, Image};
use std::sync::Arc;

fuzz_target!(|data: &[u8]| {
    if data.is_empty() {
        return;
    }
    let Ok(image) = Image::from_encoded(Arc::new(data.to_vec())) else {
        return;
    };
    let _ = image.make_raster_image(CachingHint::Disallow);
});
