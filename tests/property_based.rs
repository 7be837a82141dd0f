use proptest::prelude::*;
use shared_image::engine::{IdentityFilter, MipLevelChain};
use shared_image::{CachingHint, IRect, ISize, Image, ImageInfo};
use std::sync::Arc;

fn create_test_image(width: i32, height: i32) -> Arc<Image> {
    let info = ImageInfo::n32_premul(width, height);
    let mut data = Vec::with_capacity((width * height * 4) as usize);
    for y in 0..height {
        for x in 0..width {
            data.extend_from_slice(&[x as u8, y as u8, (x ^ y) as u8, 255]);
        }
    }
    Image::from_raster_data(info, Arc::new(data), width as usize * 4).unwrap()
}

fn valid_subset_strategy() -> impl Strategy<Value = (i32, i32, IRect)> {
    (1i32..=48, 1i32..=48)
        .prop_flat_map(|(img_w, img_h)| (Just(img_w), Just(img_h), 1..=img_w, 1..=img_h))
        .prop_flat_map(|(img_w, img_h, sub_w, sub_h)| {
            (
                Just(img_w),
                Just(img_h),
                0..=img_w - sub_w,
                0..=img_h - sub_h,
                Just(sub_w),
                Just(sub_h),
            )
        })
        .prop_map(|(img_w, img_h, x, y, w, h)| (img_w, img_h, IRect::from_xywh(x, y, w, h)))
}

fn read_all(image: &Image) -> Vec<u8> {
    let info = ImageInfo::n32_premul(image.width(), image.height());
    let mut data = vec![0u8; (image.width() * image.height() * 4) as usize];
    image
        .read_pixels(None, &info, &mut data, image.width() as usize * 4, 0, 0, CachingHint::Allow)
        .unwrap();
    data
}

proptest! {
    #![proptest_config(ProptestConfig {
        cases: 64,
        .. ProptestConfig::default()
    })]

    #[test]
    fn prop_subset_has_requested_size_and_pixels(
        (img_w, img_h, rect) in valid_subset_strategy(),
    ) {
        let image = create_test_image(img_w, img_h);
        let sub = image.make_subset(&rect, None).unwrap();
        prop_assert_eq!(sub.dimensions(), rect.size());
        let pixels = read_all(&sub);
        prop_assert_eq!(pixels[0], rect.left as u8);
        prop_assert_eq!(pixels[1], rect.top as u8);
        prop_assert_eq!(sub.unique_id() == image.unique_id(), rect == image.bounds());
    }

    #[test]
    fn prop_subset_outside_bounds_fails(
        img_w in 1i32..=32,
        img_h in 1i32..=32,
        x in -8i32..=40,
        y in -8i32..=40,
        w in 1i32..=40,
        h in 1i32..=40,
    ) {
        let image = create_test_image(img_w, img_h);
        let rect = IRect::from_xywh(x, y, w, h);
        let inside = image.bounds().contains(&rect);
        prop_assert_eq!(image.make_subset(&rect, None).is_ok(), inside);
    }

    #[test]
    fn prop_identity_filter_reproduces_subset(
        (img_w, img_h, rect) in valid_subset_strategy(),
    ) {
        let image = create_test_image(img_w, img_h);
        let out = image
            .make_with_filter(None, &IdentityFilter::new(), &rect, &rect)
            .unwrap();
        prop_assert_eq!(out.offset(), rect.origin());
        let filtered = out.to_pixmap().unwrap();
        let direct = read_all(&image.make_subset(&rect, None).unwrap());
        let copied = filtered.copy_as(&ImageInfo::n32_premul(rect.width(), rect.height())).unwrap();
        prop_assert_eq!(copied.bytes(), &direct[..]);
    }

    #[test]
    fn prop_mip_levels_halve_to_one(
        w in 1i32..=4096,
        h in 1i32..=4096,
    ) {
        let count = MipLevelChain::compute_level_count(w, h);
        let base = ISize::new(w, h);
        if count > 0 {
            let last = MipLevelChain::level_size(base, count - 1);
            prop_assert_eq!(last, ISize::new(1.max(w >> count), 1.max(h >> count)));
            prop_assert!(last.width == 1 || last.height == 1);
            prop_assert_eq!(last.width.max(last.height), 1);
        } else {
            prop_assert_eq!(w.max(h), 1);
        }
    }
}
