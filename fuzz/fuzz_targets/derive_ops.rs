#![no_main]

use arbitrary::Arbitrary;
use libfuzzer_sys::fuzz_target;
use shared_image::engine::{BlurFilter, CropFilter, OffsetFilter};
use shared_image::{
    CachingHint, ColorSpace, ColorType, FilterQuality, IRect, Image, ImageFilter, ImageInfo,
    RescaleGamma,
};
use std::sync::Arc;

#[derive(Arbitrary, Debug)]
struct OperationSeed {
    kind: u8,
    a: i32,
    b: i32,
    c: i32,
    d: i32,
}

#[derive(Arbitrary, Debug)]
struct Input {
    width: u8,
    height: u8,
    fill: Vec<u8>,
    seeds: Vec<OperationSeed>,
}

fn build_image(input: &Input) -> Option<Arc<Image>> {
    let width = input.width as i32 % 64 + 1;
    let height = input.height as i32 % 64 + 1;
    let mut data = vec![0u8; (width * height * 4) as usize];
    if !input.fill.is_empty() {
        for (i, byte) in data.iter_mut().enumerate() {
            *byte = input.fill[i % input.fill.len()];
        }
    }
    Image::from_raster_data(ImageInfo::n32_premul(width, height), Arc::new(data), width as usize * 4).ok()
}

fn rect(seed: &OperationSeed) -> IRect {
    IRect::from_xywh(
        seed.a % 80,
        seed.b % 80,
        seed.c.rem_euclid(80),
        seed.d.rem_euclid(80),
    )
}

fn filter(seed: &OperationSeed) -> Arc<dyn ImageFilter> {
    match seed.kind % 3 {
        0 => Arc::new(OffsetFilter::new(seed.a % 16, seed.b % 16, None)),
        1 => Arc::new(CropFilter::new(rect(seed), None)),
        _ => Arc::new(BlurFilter::new((seed.c % 8) as f32 * 0.5, None)),
    }
}

fuzz_target!(|input: Input| {
    let Some(mut image) = build_image(&input) else {
        return;
    };
    for seed in input.seeds.iter().take(16) {
        let next = match seed.kind % 5 {
            0 => image.make_subset(&rect(seed), None),
            1 => image.make_color_type_and_color_space(
                [ColorType::Alpha8, ColorType::Gray8, ColorType::Bgra8888][(seed.a.unsigned_abs() % 3) as usize],
                Some(ColorSpace::Srgb),
                None,
            ),
            2 => {
                let _ = image.make_with_filter(None, filter(seed).as_ref(), &rect(seed), &image.bounds());
                Ok(Arc::clone(&image))
            }
            3 => {
                let info = ImageInfo::n32_premul(seed.c.rem_euclid(64) + 1, seed.d.rem_euclid(64) + 1);
                image.async_rescale_and_read_pixels(
                    &info,
                    &rect(seed),
                    RescaleGamma::Src,
                    FilterQuality::Medium,
                    (),
                    |_, _| {},
                );
                Ok(Arc::clone(&image))
            }
            _ => image.make_raster_image(CachingHint::Allow),
        };
        if let Ok(next) = next {
            image = next;
        }
    }
});
