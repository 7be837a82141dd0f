// tests/derivation.rs
//
// End-to-end derivation flows across sources: encoded, picture, raster and
// texture images, filtered and read back.

use shared_image::engine::{
    BackendContext, BlurFilter, ComposeFilter, CropFilter, MipChainBuilder, OffsetFilter,
    PaintFn, PictureGenerator,
};
use shared_image::engine::generator::picture_info;
use shared_image::{
    AlphaType, CachingHint, ColorSpace, ColorType, FilterQuality, IPoint, IRect, ISize, Image,
    ImageError, ImageFilter, ImageInfo, Mipmapped, OutputFormat, Pixmap, RescaleGamma,
    SamplingOptions,
};
use std::sync::{mpsc, Arc};
use std::thread;
use std::time::Duration;

fn gradient(width: i32, height: i32) -> Arc<Image> {
    let info = ImageInfo::n32_premul(width, height);
    let mut data = Vec::with_capacity((width * height * 4) as usize);
    for y in 0..height {
        for x in 0..width {
            data.extend_from_slice(&[(x * 4) as u8, (y * 4) as u8, 100, 255]);
        }
    }
    Image::from_raster_data(info, Arc::new(data), width as usize * 4).unwrap()
}

fn picture(width: i32, height: i32) -> Arc<Image> {
    let paint: PaintFn = Arc::new(|x, y| [(x * 4) as u8, (y * 4) as u8, 100, 255]);
    Image::from_generator(Arc::new(
        PictureGenerator::new(picture_info(width, height), paint).unwrap(),
    ))
    .unwrap()
}

fn read_all(image: &Image) -> Pixmap {
    let info = ImageInfo::n32_premul(image.width(), image.height());
    let mut data = vec![0u8; (image.width() * image.height() * 4) as usize];
    image
        .read_pixels(None, &info, &mut data, image.width() as usize * 4, 0, 0, CachingHint::Allow)
        .unwrap();
    Pixmap::from_vec(info, image.width() as usize * 4, data).unwrap()
}

#[test]
fn encoded_image_round_trips_through_png() {
    let raster = gradient(24, 16);
    let png = raster.encode_to_data_as(OutputFormat::Png).unwrap();
    let lazy = Image::from_encoded(Arc::clone(&png)).unwrap();

    assert!(lazy.is_lazy_generated());
    assert_eq!(lazy.dimensions(), ISize::new(24, 16));
    assert!(Arc::ptr_eq(&lazy.ref_encoded_data().unwrap(), &png));
    assert!(Arc::ptr_eq(&lazy.encode_to_data().unwrap(), &png));

    let decoded = read_all(&lazy);
    assert_eq!(decoded.get_color(5, 3), Some([20, 12, 100, 255]));

    // a subset no longer matches the encoded frame
    let sub = lazy.make_subset(&IRect::from_xywh(4, 4, 8, 8), None).unwrap();
    assert!(sub.ref_encoded_data().is_none());
    assert_eq!(read_all(&sub).get_color(0, 0), Some([16, 16, 100, 255]));
}

#[test]
fn jpeg_encoding_keeps_dimensions() {
    let image = gradient(32, 20);
    let jpeg = image.encode_to_data_as(OutputFormat::Jpeg { quality: 85 }).unwrap();
    let decoded = Image::from_encoded(jpeg).unwrap();
    assert_eq!(decoded.dimensions(), ISize::new(32, 20));
    assert!(decoded.is_opaque());
}

#[test]
fn subset_chain_matches_direct_subset() {
    for image in [gradient(40, 30), picture(40, 30)] {
        let outer = image.make_subset(&IRect::from_ltrb(5, 5, 35, 25), None).unwrap();
        let inner = outer.make_subset(&IRect::from_ltrb(3, 2, 13, 12), None).unwrap();
        let direct = image.make_subset(&IRect::from_ltrb(8, 7, 18, 17), None).unwrap();
        assert_eq!(read_all(&inner).bytes(), read_all(&direct).bytes());
    }
}

#[test]
fn filter_chain_offsets_compose() {
    let image = gradient(40, 40);
    let crop: Arc<dyn ImageFilter> = Arc::new(CropFilter::new(IRect::from_ltrb(12, 12, 20, 20), None));
    let shift: Arc<dyn ImageFilter> = Arc::new(OffsetFilter::new(5, 1, None));
    let chain = ComposeFilter::new(shift, crop);

    let subset = IRect::from_ltrb(10, 10, 30, 30);
    let out = image
        .make_with_filter(None, &chain, &subset, &IRect::from_wh(40, 40))
        .unwrap();
    assert_eq!(out.offset(), IPoint::new(17, 13));
    assert_eq!(out.subset().size(), ISize::new(8, 8));
    assert_eq!(out.to_pixmap().unwrap().get_color(0, 0), Some([48, 48, 100, 255]));
}

#[test]
fn blurred_filter_result_stays_inside_clip() {
    let image = picture(30, 30);
    let clip = IRect::from_ltrb(8, 8, 22, 22);
    let out = image
        .make_with_filter(None, &BlurFilter::new(2.0, None), &IRect::from_ltrb(10, 10, 20, 20), &clip)
        .unwrap();
    let placed = IRect::from_pt_size(out.offset(), out.subset().size());
    assert!(clip.contains(&placed));
    assert_eq!(placed, clip);
}

#[test]
fn async_read_of_lazy_image_rescales() {
    let image = picture(64, 32);
    let (tx, rx) = mpsc::channel();
    let info = ImageInfo::new(16, 8, ColorType::Rgba8888, AlphaType::Unpremul, None);
    image.async_rescale_and_read_pixels(
        &info,
        &image.bounds(),
        RescaleGamma::Src,
        FilterQuality::Medium,
        "lazy",
        move |tag, result| tx.send((tag, result)).unwrap(),
    );
    let (tag, result) = rx.recv_timeout(Duration::from_secs(10)).unwrap();
    assert_eq!(tag, "lazy");
    let result = result.unwrap();
    assert_eq!(result.info().dimensions(), ISize::new(16, 8));
    assert_eq!(result.data(0).unwrap().len(), 16 * 8 * 4);
}

#[test]
fn texture_round_trip_through_backend() {
    let ctx = BackendContext::host();
    let raster = gradient(16, 16);
    let texture = raster.make_texture_image(&ctx, Mipmapped::No).unwrap();
    assert!(texture.is_texture_backed());
    assert!(texture.is_valid(Some(&ctx)));
    assert!(!texture.is_valid(Some(&BackendContext::host())));

    let sub = texture.make_subset(&IRect::from_xywh(2, 2, 4, 4), Some(&ctx)).unwrap();
    assert!(sub.is_texture_backed());
    let back = sub.make_non_texture_image().unwrap();
    assert!(!back.is_texture_backed());
    assert_eq!(back.peek_pixels().unwrap().get_color(0, 0), Some([8, 8, 100, 255]));

    let gray = texture
        .make_color_type_and_color_space(ColorType::Gray8, Some(ColorSpace::Srgb), Some(&ctx))
        .unwrap();
    assert!(gray.is_texture_backed());
    assert_eq!(gray.color_type(), ColorType::Gray8);

    let (tx, rx) = mpsc::channel();
    texture.async_rescale_and_read_pixels(
        &ImageInfo::n32_premul(8, 8),
        &texture.bounds(),
        RescaleGamma::Linear,
        FilterQuality::High,
        (),
        move |_, result| tx.send(result).unwrap(),
    );
    let result = rx.recv_timeout(Duration::from_secs(10)).unwrap().unwrap();
    assert_eq!(result.row_bytes(0), Some(32));
}

#[test]
fn abandoning_backend_invalidates_textures() {
    let ctx = BackendContext::host();
    let texture = gradient(8, 8).make_texture_image(&ctx, Mipmapped::No).unwrap();
    ctx.backend().abandon();
    assert!(!texture.is_valid(None));
    assert!(matches!(
        texture.make_texture_image(&ctx, Mipmapped::No),
        Err(ImageError::BackendAbandoned { .. })
    ));
    assert!(texture.make_raster_image(CachingHint::Allow).is_err());
}

#[test]
fn scale_pixels_matches_requested_size() {
    let image = picture(50, 50);
    let info = ImageInfo::n32_premul(10, 10);
    let mut data = vec![0u8; 10 * 10 * 4];
    image
        .scale_pixels(&info, &mut data, 40, SamplingOptions::from(FilterQuality::Low), CachingHint::Allow)
        .unwrap();
    assert!(data.chunks_exact(4).all(|px| px[3] == 255));
}

#[test]
fn builder_mips_attach_to_matching_image() {
    let image = gradient(8, 8);
    let mut builder = MipChainBuilder::new(image.info()).unwrap();
    assert_eq!(builder.count_levels(), 3);
    for i in 0..builder.count_levels() {
        builder.level_mut(i).unwrap().fill(7);
    }
    let mipped = builder.attach_to(&image);
    assert!(mipped.has_mipmaps());
    assert_ne!(mipped.unique_id(), image.unique_id());
    assert_eq!(mipped.mipmaps().unwrap().level(2).unwrap().pixmap().bytes(), &[7, 7, 7, 7]);

    let wrong = MipChainBuilder::new(&ImageInfo::n32_premul(4, 4)).unwrap();
    assert!(Arc::ptr_eq(&wrong.attach_to(&image), &image));
}

#[test]
fn shared_image_derives_from_many_threads() {
    let image = picture(64, 64);
    let handles: Vec<_> = (0..8)
        .map(|i| {
            let image = Arc::clone(&image);
            thread::spawn(move || {
                let rect = IRect::from_xywh(i * 4, i * 4, 16, 16);
                let sub = image.make_subset(&rect, None).unwrap();
                let pixels = read_all(&sub);
                assert_eq!(pixels.get_color(0, 0), Some([(i * 16) as u8, (i * 16) as u8, 100, 255]));
                sub.unique_id()
            })
        })
        .collect();
    let mut ids: Vec<_> = handles.into_iter().map(|h| h.join().unwrap()).collect();
    ids.sort();
    ids.dedup();
    assert_eq!(ids.len(), 8);
}
