use std::time::Duration;

use image::{Rgba, RgbaImage};
use lineart_fx::capture::AnimatedClip;
use lineart_fx::playback::FrameDriver;

const RED: Rgba<u8> = Rgba([255, 0, 0, 255]);
const BLUE: Rgba<u8> = Rgba([0, 0, 255, 255]);

fn solid_clip(color: Rgba<u8>, frames: usize, delay_ms: u64) -> Box<AnimatedClip> {
    let frames = (0..frames)
        .map(|_| (RgbaImage::from_pixel(4, 3, color), Duration::from_millis(delay_ms)))
        .collect();
    Box::new(AnimatedClip::from_frames(frames).unwrap())
}

#[test]
fn swapping_sources_never_shows_the_old_frame() {
    let (mut driver, tap) = FrameDriver::new();

    let first = driver.load_source(solid_clip(RED, 4, 100));
    driver.tick(Duration::ZERO);
    driver.play().unwrap();
    driver.tick(Duration::from_millis(150));
    assert_eq!(*driver.render_frame().unwrap().get_pixel(0, 0), RED);
    assert_eq!(driver.state().current_time, Duration::from_millis(150));
    assert_eq!(tap.borrow().source_id, first);

    let second = driver.load_source(solid_clip(BLUE, 2, 100));
    assert_ne!(first, second);

    // nothing is drawable until the new source reports readiness
    let state = driver.state();
    assert_eq!(state.current_time, Duration::ZERO);
    assert!(!state.ready);
    assert!(state.paused);
    assert!(driver.render_frame().is_none());
    assert!(tap.borrow().frame.is_none());
    assert_eq!(tap.borrow().source_id, second);

    driver.tick(Duration::from_millis(40));
    assert!(driver.state().ready);
    assert_eq!(driver.state().current_time, Duration::ZERO);
    assert_eq!(driver.texture().unwrap().source_id(), second);

    driver.play().unwrap();
    for _ in 0..5 {
        driver.tick(Duration::from_millis(30));
        if let Some(frame) = driver.render_frame() {
            assert!(frame.pixels().all(|p| *p == BLUE));
        }
        if let Some(frame) = tap.borrow().frame.as_ref() {
            assert!(frame.pixels().all(|p| *p == BLUE));
        }
    }
}

#[test]
fn clip_plays_to_the_end_and_restarts() {
    let (mut driver, tap) = FrameDriver::new();
    driver.load_source(solid_clip(RED, 2, 50));
    driver.tick(Duration::ZERO);
    assert_eq!(driver.state().duration, Some(Duration::from_millis(100)));
    assert_eq!(driver.state().native_size, Some((4, 3)));

    driver.play().unwrap();
    assert!(tap.borrow().playing);
    driver.tick(Duration::from_millis(120));
    let state = driver.state();
    assert!(state.ended);
    assert!(state.paused);
    assert!(!tap.borrow().playing);
    // the last frame stays on screen
    assert!(driver.render_frame().is_some());

    driver.play().unwrap();
    assert!(!driver.state().ended);
    assert_eq!(driver.state().current_time, Duration::ZERO);
}

#[test]
fn unload_releases_texture_and_frame() {
    let (mut driver, tap) = FrameDriver::new();
    driver.load_source(solid_clip(RED, 2, 50));
    driver.tick(Duration::ZERO);
    assert!(driver.render_frame().is_some());

    driver.unload();
    assert!(driver.texture().is_none());
    assert!(driver.render_frame().is_none());
    assert!(tap.borrow().frame.is_none());
    assert!(driver.play().is_err());
}
