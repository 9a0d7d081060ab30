use image::{Rgba, RgbaImage};
use lineart_fx::compositor::{sampler, Compositor, Region, RenderUniforms};
use lineart_fx::segmentation::{MaskTexture, ProbabilityMap};

const EDGE_THRESHOLD: f32 = 0.2;

fn half_black_half_white(width: u32, height: u32) -> RgbaImage {
    RgbaImage::from_fn(width, height, |x, _| {
        if x < width / 2 {
            Rgba([0, 0, 0, 255])
        } else {
            Rgba([255, 255, 255, 255])
        }
    })
}

fn to_u8(v: f32) -> u8 {
    (v.clamp(0.0, 1.0) * 255.0).round() as u8
}

#[test]
fn cold_start_red_frame_is_muted_everywhere() {
    let compositor = Compositor::default();
    let frame = RgbaImage::from_pixel(2, 2, Rgba([255, 0, 0, 255]));
    let mask = MaskTexture::default();

    let out = compositor.render(&RenderUniforms::new(&frame, &mask, EDGE_THRESHOLD));

    let muted = compositor.muted([1.0, 0.0, 0.0]);
    let expected = Rgba([to_u8(muted[0]), to_u8(muted[1]), to_u8(muted[2]), 255]);
    assert_eq!(expected, Rgba([65, 27, 27, 255]));
    for pixel in out.pixels() {
        assert_eq!(*pixel, expected);
        assert_ne!(*pixel, Rgba([0, 0, 0, 255]));
        assert_ne!(*pixel, Rgba([255, 255, 255, 255]));
    }
}

#[test]
fn default_mask_classifies_every_point_as_background() {
    let mask = MaskTexture::default();
    for i in 0..=10 {
        for j in 0..=10 {
            let value = mask.sample(i as f32 / 10.0, j as f32 / 10.0);
            assert_eq!(Region::classify(value), Region::Background);
        }
    }
}

#[test]
fn full_person_mask_draws_a_black_line_on_white() {
    let compositor = Compositor::default();
    let frame = half_black_half_white(8, 4);
    // mask resolution deliberately differs from the frame
    let mask = MaskTexture::from_probabilities(&ProbabilityMap::filled(3, 3, 1.0));

    let out = compositor.render(&RenderUniforms::new(&frame, &mask, EDGE_THRESHOLD));

    for (x, y, pixel) in out.enumerate_pixels() {
        // the step sits between columns 3 and 4, so both neighbours see it
        let expected = if x == 3 || x == 4 {
            Rgba([0, 0, 0, 255])
        } else {
            Rgba([255, 255, 255, 255])
        };
        assert_eq!(*pixel, expected, "pixel ({x}, {y})");
    }
}

#[test]
fn mask_exactly_at_cutoff_is_background() {
    let compositor = Compositor::default();
    assert_eq!(Region::classify(0.5), Region::Background);

    let color = [0.2, 0.4, 0.6];
    let shaded = compositor.shade(color, 0.5, 10.0, EDGE_THRESHOLD);
    assert_eq!(shaded, compositor.muted(color));
}

#[test]
fn rendering_is_deterministic() {
    let compositor = Compositor::default();
    let frame = RgbaImage::from_fn(7, 5, |x, y| {
        Rgba([(x * 37) as u8, (y * 51) as u8, ((x + y) * 19) as u8, 255])
    });
    let map = ProbabilityMap::new(2, 2, vec![1.0, 0.0, 0.0, 1.0]).unwrap();
    let mask = MaskTexture::from_probabilities(&map);
    let uniforms = RenderUniforms::new(&frame, &mask, EDGE_THRESHOLD);

    let first = compositor.render(&uniforms);
    let second = compositor.render(&uniforms);
    assert_eq!(first, second);

    for &(u, v) in &[(0.1, 0.1), (0.5, 0.5), (0.9, 0.3)] {
        assert_eq!(
            compositor.shade_at(&uniforms, u, v),
            compositor.shade_at(&uniforms, u, v)
        );
    }
}

#[test]
fn mismatched_resolutions_sample_without_panicking() {
    let frame = RgbaImage::from_pixel(8, 4, Rgba([10, 20, 30, 255]));
    let mask = MaskTexture::from_probabilities(&ProbabilityMap::filled(3, 5, 1.0));

    let points = [-0.5, 0.0, 0.01, 0.33, 0.5, 0.99, 1.0, 1.5];
    for &u in &points {
        for &v in &points {
            let color = sampler::sample(&frame, u, v);
            let value = mask.sample(u, v);
            assert!((color[0] - 10.0 / 255.0).abs() < 1e-5);
            assert!((value - 1.0).abs() < 1e-6);
        }
    }

    let out = Compositor::default().render(&RenderUniforms::new(&frame, &mask, EDGE_THRESHOLD));
    assert_eq!(out.dimensions(), (8, 4));
}
