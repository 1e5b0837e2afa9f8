//! Facade behaviour against the software backend, where pixels can be read
//! back after every call.

use approx::assert_relative_eq;
use futures::executor::block_on;
use image::{Rgba, RgbaImage};
use jdxlib::software::{Bitmap, PixelSurface};
use jdxlib::{
    Backend, BlendMode, Config, DrawError, DxLib, Handle, InitError, Policy, Screen,
    SoftwareBackend, Surface,
};
use std::f64::consts::FRAC_PI_2;
use std::path::PathBuf;
use std::time::Instant;
use tempfile::TempDir;

const RED: [u8; 4] = [255, 0, 0, 255];
const GREEN: [u8; 4] = [0, 255, 0, 255];
const BLUE: [u8; 4] = [0, 0, 255, 255];
const CLEAR: [u8; 4] = [0, 0, 0, 0];

// ==========================================================================
// Fixtures
// ==========================================================================

/// 4x2 sprite: top-left pixel green, the rest of the left half red, right
/// half blue
fn sprite() -> RgbaImage {
    let mut image = RgbaImage::from_fn(4, 2, |x, _| if x < 2 { Rgba(RED) } else { Rgba(BLUE) });
    image.put_pixel(0, 0, Rgba(GREEN));
    image
}

fn write_png(dir: &TempDir, name: &str, image: &RgbaImage) -> String {
    let path: PathBuf = dir.path().join(name);
    image.save(&path).unwrap();
    path.to_string_lossy().into_owned()
}

fn backend() -> SoftwareBackend {
    SoftwareBackend::new().with_display(Config::DEFAULT_CANVAS_ID)
}

fn init(config: Config) -> DxLib<SoftwareBackend> {
    DxLib::initialize(backend(), config).unwrap()
}

fn init_with_sprite() -> (DxLib<SoftwareBackend>, Handle, TempDir) {
    let dir = TempDir::new().unwrap();
    let path = write_png(&dir, "sprite.png", &sprite());
    let mut lib = init(Config::default());
    let handle = block_on(lib.load_image(&path)).unwrap();
    (lib, handle, dir)
}

fn active(lib: &DxLib<SoftwareBackend>) -> &PixelSurface {
    match lib.active() {
        Screen::Back => lib.back(),
        Screen::Front => lib.front(),
    }
}

// ==========================================================================
// Initialization
// ==========================================================================

#[test]
fn initialize_sizes_both_surfaces_and_targets_front() {
    let lib = init(Config::default());
    assert_eq!((lib.front().width(), lib.front().height()), (640, 480));
    assert_eq!((lib.back().width(), lib.back().height()), (640, 480));
    assert_eq!(lib.active(), Screen::Front);
    assert_eq!(lib.blend().mode, BlendMode::NoBlend);
    assert_eq!(lib.image_count(), 0);
}

#[test]
fn initialize_honours_configured_size() {
    let config = Config {
        width: 32,
        height: 16,
        ..Config::default()
    };
    let lib = init(config);
    assert_eq!((lib.front().width(), lib.front().height()), (32, 16));
    assert_eq!((lib.back().width(), lib.back().height()), (32, 16));
}

#[test]
fn initialize_fails_without_display_surface() {
    let config = Config {
        canvas_id: "missing".into(),
        ..Config::default()
    };
    match DxLib::initialize(backend(), config) {
        Err(InitError::DisplaySurface { id, .. }) => assert_eq!(id, "missing"),
        Err(other) => panic!("unexpected error {other}"),
        Ok(_) => panic!("initialize should fail"),
    }
}

#[test]
fn initialize_refuses_oversized_surfaces() {
    for (width, height) in [(u32::MAX, u32::MAX), (u32::MAX, 1), (1 << 15, 1 << 14)] {
        let config = Config {
            width,
            height,
            ..Config::default()
        };
        match DxLib::initialize(backend(), config) {
            Err(InitError::DisplaySurface { id, .. }) => {
                assert_eq!(id, Config::DEFAULT_CANVAS_ID)
            }
            Err(other) => panic!("unexpected error {other}"),
            Ok(_) => panic!("{width}x{height} should be refused"),
        }
    }
}

// ==========================================================================
// Loading
// ==========================================================================

#[test]
fn sprite_drawn_on_back_is_visible_after_present() {
    let (mut lib, handle, _dir) = init_with_sprite();
    assert_eq!(handle, Handle(0));

    lib.set_active_surface(Screen::Back);
    lib.draw_image(10.0, 20.0, handle).unwrap();
    // nothing visible until the flip
    assert_eq!(lib.front().pixel(10, 20), Some(CLEAR));

    lib.present().unwrap();
    assert_eq!(lib.front().pixel(10, 20), Some(GREEN));
    assert_eq!(lib.front().pixel(11, 20), Some(RED));
    assert_eq!(lib.front().pixel(13, 21), Some(BLUE));
    assert_eq!(lib.front().pixel(0, 0), Some(CLEAR));
}

#[test]
fn failed_load_registers_nothing() {
    let dir = TempDir::new().unwrap();
    let mut lib = init(Config::default());

    let missing = dir.path().join("nope.png");
    let err = block_on(lib.load_image(&missing.to_string_lossy())).unwrap_err();
    assert!(err.path.ends_with("nope.png"));
    assert_eq!(lib.image_count(), 0);

    let corrupt = dir.path().join("corrupt.png");
    std::fs::write(&corrupt, b"definitely not a png").unwrap();
    assert!(block_on(lib.load_image(&corrupt.to_string_lossy())).is_err());
    assert_eq!(lib.image_count(), 0);

    // the next good load still gets the first handle
    let path = write_png(&dir, "sprite.png", &sprite());
    assert_eq!(block_on(lib.load_image(&path)).unwrap(), Handle(0));
    assert_eq!(lib.image_size(Handle(0)), Some((4, 2)));
}

#[test]
fn handles_increase_monotonically() {
    let (mut lib, first, dir) = init_with_sprite();
    let path = write_png(&dir, "other.png", &RgbaImage::new(1, 1));
    let second = block_on(lib.load_image(&path)).unwrap();
    let third = lib.register_image(Bitmap(RgbaImage::new(2, 2)));
    assert_eq!((first, second, third), (Handle(0), Handle(1), Handle(2)));
    assert_eq!(lib.image_count(), 3);
}

#[test]
fn concurrent_decodes_register_afterwards() {
    let dir = TempDir::new().unwrap();
    let a = write_png(&dir, "a.png", &RgbaImage::from_pixel(1, 1, Rgba(RED)));
    let b = write_png(&dir, "b.png", &RgbaImage::from_pixel(3, 3, Rgba(BLUE)));
    let mut lib = init(Config::default());

    let backend = SoftwareBackend::new();
    let (a, b) = block_on(async { futures::join!(backend.load_image(&a), backend.load_image(&b)) });
    let a = lib.register_image(a.unwrap());
    let b = lib.register_image(b.unwrap());
    assert_eq!(lib.image_size(a), Some((1, 1)));
    assert_eq!(lib.image_size(b), Some((3, 3)));
}

#[test]
fn blocking_policy_loads_synchronously() {
    let dir = TempDir::new().unwrap();
    let path = write_png(&dir, "sprite.png", &sprite());
    let config = Config {
        sync_settle_ms: 5,
        ..Config::default().with_policy(Policy::Blocking)
    };
    let mut lib = init(config);

    let started = Instant::now();
    let handle = lib.load_image_blocking(&path).unwrap();
    assert!(started.elapsed().as_millis() >= 5);
    lib.draw_image(0.0, 0.0, handle).unwrap();
    assert_eq!(lib.front().pixel(0, 0), Some(GREEN));

    // the async entry point takes the blocking path too
    assert_eq!(block_on(lib.load_image(&path)).unwrap(), Handle(1));
    assert!(lib.load_image_blocking("no/such/file.png").is_err());
    assert_eq!(lib.image_count(), 2);
}

// ==========================================================================
// Drawing
// ==========================================================================

#[test]
fn unknown_handle_fails_and_leaves_surface_untouched() {
    let (mut lib, handle, _dir) = init_with_sprite();
    lib.draw_image(0.0, 0.0, handle).unwrap();
    let before = active(&lib).pixels().clone();

    let bogus = Handle(42);
    assert!(matches!(
        lib.draw_image(5.0, 5.0, bogus),
        Err(DrawError::UnknownHandle(Handle(42)))
    ));
    assert!(matches!(
        lib.draw_image_stretched(0.0, 0.0, 100.0, 100.0, bogus),
        Err(DrawError::UnknownHandle(_))
    ));
    assert!(matches!(
        lib.draw_image_rotated(50.0, 50.0, 2.0, 1.0, bogus, true),
        Err(DrawError::UnknownHandle(_))
    ));
    assert_eq!(active(&lib).pixels(), &before);
}

#[test]
fn stretched_draw_fills_the_rectangle() {
    let mut lib = init(Config::default());
    let dot = lib.register_image(Bitmap(RgbaImage::from_pixel(1, 1, Rgba(RED))));

    lib.draw_image_stretched(2.0, 2.0, 6.0, 4.0, dot).unwrap();
    let front = lib.front();
    assert_eq!(front.pixel(2, 2), Some(RED));
    assert_eq!(front.pixel(5, 3), Some(RED));
    assert_eq!(front.pixel(6, 3), Some(CLEAR));
    assert_eq!(front.pixel(5, 4), Some(CLEAR));
    assert_eq!(front.pixel(1, 2), Some(CLEAR));
}

#[test]
fn reversed_rectangle_flips_and_empty_one_draws_nothing() {
    let (mut lib, handle, _dir) = init_with_sprite();

    // x2 < x1: mirrored horizontally
    lib.draw_image_stretched(4.0, 0.0, 0.0, 2.0, handle).unwrap();
    assert_eq!(lib.front().pixel(3, 0), Some(GREEN));
    assert_eq!(lib.front().pixel(0, 0), Some(BLUE));

    lib.clear_surface().unwrap();
    lib.draw_image_stretched(10.0, 10.0, 10.0, 30.0, handle).unwrap();
    assert!(lib.front().is_transparent());
}

#[test]
fn rotated_draw_centres_scales_and_mirrors() {
    let (mut lib, handle, _dir) = init_with_sprite();

    // 4x2 scaled by 2 around (20, 20) covers x 16..24, y 18..22
    lib.draw_image_rotated(20.0, 20.0, 2.0, 0.0, handle, false).unwrap();
    assert_eq!(lib.front().pixel(16, 18), Some(GREEN));
    assert_eq!(lib.front().pixel(23, 21), Some(BLUE));
    assert_eq!(lib.front().pixel(15, 18), Some(CLEAR));

    lib.clear_surface().unwrap();
    lib.draw_image_rotated(20.0, 20.0, 2.0, 0.0, handle, true).unwrap();
    assert_eq!(lib.front().pixel(23, 18), Some(GREEN));
    assert_eq!(lib.front().pixel(16, 18), Some(BLUE));
}

#[test]
fn quarter_turn_is_clockwise_on_screen() {
    let (mut lib, handle, _dir) = init_with_sprite();

    // 4x2 turned by +pi/2 around (20, 20) covers x 19..21, y 18..22 and
    // its top-left corner ends up top-right
    lib.draw_image_rotated(20.0, 20.0, 1.0, FRAC_PI_2, handle, false).unwrap();
    assert_eq!(lib.front().pixel(20, 18), Some(GREEN));
    assert_eq!(lib.front().pixel(19, 18), Some(RED));
    assert_eq!(lib.front().pixel(19, 21), Some(BLUE));
    assert_eq!(lib.front().pixel(18, 20), Some(CLEAR));
}

#[test]
fn rotated_draw_does_not_leak_its_transform() {
    let (mut lib, handle, _dir) = init_with_sprite();
    lib.draw_image_rotated(100.0, 100.0, 3.0, 1.2, handle, true).unwrap();
    lib.clear_surface().unwrap();

    lib.draw_image(0.0, 0.0, handle).unwrap();
    assert_eq!(lib.front().pixel(0, 0), Some(GREEN));
    assert_eq!(lib.front().pixel(3, 1), Some(BLUE));
    assert_eq!(lib.front().pixel(4, 0), Some(CLEAR));
}

#[test]
fn clear_makes_the_whole_surface_transparent() {
    let (mut lib, handle, _dir) = init_with_sprite();
    lib.set_active_surface(Screen::Back);
    for i in 0..10 {
        let offset = f64::from(i) * 50.0;
        lib.draw_image_stretched(offset, offset, offset + 60.0, offset + 40.0, handle)
            .unwrap();
    }
    assert!(!lib.back().is_transparent());
    lib.clear_surface().unwrap();
    assert!(lib.back().is_transparent());
}

#[test]
fn present_replaces_previous_front_contents() {
    let (mut lib, handle, _dir) = init_with_sprite();
    // straight onto the front page
    lib.draw_image(0.0, 0.0, handle).unwrap();

    lib.set_active_surface(Screen::Back);
    lib.draw_image(30.0, 30.0, handle).unwrap();
    lib.present().unwrap();
    assert_eq!(lib.front().pixel(0, 0), Some(CLEAR));
    assert_eq!(lib.front().pixel(30, 30), Some(GREEN));
}

// ==========================================================================
// Modes
// ==========================================================================

#[test]
fn alpha_blend_draws_translucent() {
    let mut lib = init(Config::default());
    let dot = lib.register_image(Bitmap(RgbaImage::from_pixel(1, 1, Rgba(RED))));

    lib.set_blend_mode(BlendMode::Alpha, 128);
    lib.draw_image(0.0, 0.0, dot).unwrap();
    assert_eq!(lib.front().pixel(0, 0), Some([255, 0, 0, 128]));

    lib.set_blend_mode(BlendMode::NoBlend, 0);
    lib.draw_image(1.0, 0.0, dot).unwrap();
    assert_eq!(lib.front().pixel(1, 0), Some(RED));
}

#[test]
fn blend_param_is_clamped() {
    let mut lib = init(Config::default());
    lib.set_blend_mode(BlendMode::Alpha, 1000);
    assert_eq!(lib.blend().param, 255);
    assert_relative_eq!(lib.front().global_alpha(), 1.0);

    lib.set_blend_mode(BlendMode::Alpha, -20);
    assert_eq!(lib.blend().param, 0);
    assert_relative_eq!(lib.front().global_alpha(), 0.0);
}

#[test]
fn blend_follows_surface_switches() {
    let mut lib = init(Config::default());
    lib.set_blend_mode(BlendMode::Alpha, 100);
    assert_relative_eq!(lib.front().global_alpha(), 100.0 / 255.0);

    lib.set_active_surface(Screen::Back);
    assert_relative_eq!(lib.back().global_alpha(), 100.0 / 255.0);

    lib.set_active_surface(Screen::Front);
    assert_eq!(lib.blend().mode, BlendMode::Alpha);
    assert_eq!(lib.blend().param, 100);
    assert_relative_eq!(lib.front().global_alpha(), 100.0 / 255.0);
}

#[test]
fn raw_constants_drive_the_typed_api() {
    let mut lib = init(Config::default());
    lib.set_active_surface(Screen::try_from(jdxlib::engine::raw::SCREEN_BACK).unwrap());
    assert_eq!(lib.active(), Screen::Back);
    assert!(Screen::try_from(12).is_err());
    assert!(BlendMode::try_from(7).is_err());
    // a rejected value leaves the state alone
    assert_eq!(lib.active(), Screen::Back);
}

// ==========================================================================
// Resize
// ==========================================================================

#[test]
fn resize_reallocates_both_surfaces() {
    let (mut lib, handle, _dir) = init_with_sprite();
    lib.set_active_surface(Screen::Back);
    lib.set_blend_mode(BlendMode::Alpha, 51);
    lib.draw_image(0.0, 0.0, handle).unwrap();

    for (w, h) in [(800, 600), (17, 3), (800, 600)] {
        lib.resize(w, h).unwrap();
        assert_eq!((lib.front().width(), lib.front().height()), (w, h));
        assert_eq!((lib.back().width(), lib.back().height()), (w, h));
    }
    assert!(lib.back().is_transparent());
    assert!(lib.front().is_transparent());
    // blend survives reallocation on the active surface
    assert_relative_eq!(lib.back().global_alpha(), 0.2);
}

#[test]
fn refused_resize_leaves_both_surfaces_as_they_were() {
    let (mut lib, handle, _dir) = init_with_sprite();
    lib.set_active_surface(Screen::Back);
    lib.set_blend_mode(BlendMode::Alpha, 51);
    lib.draw_image(0.0, 0.0, handle).unwrap();
    let drawn = lib.back().pixel(1, 1);
    assert_ne!(drawn, Some(CLEAR));

    for (w, h) in [(u32::MAX, u32::MAX), (u32::MAX, 480), (640, u32::MAX)] {
        match lib.resize(w, h) {
            Err(DrawError::Surface(_)) => {}
            other => panic!("resize to {w}x{h} gave {other:?}"),
        }
        assert_eq!((lib.front().width(), lib.front().height()), (640, 480));
        assert_eq!((lib.back().width(), lib.back().height()), (640, 480));
    }
    assert_eq!(lib.back().pixel(1, 1), drawn);
    assert_relative_eq!(lib.back().global_alpha(), 0.2);

    // still usable afterwards
    lib.resize(32, 16).unwrap();
    assert_eq!((lib.front().width(), lib.front().height()), (32, 16));
    assert_eq!((lib.back().width(), lib.back().height()), (32, 16));
}

// ==========================================================================
// Timing
// ==========================================================================

#[test]
fn deferred_delay_waits() {
    let lib = init(Config::default());
    let started = Instant::now();
    block_on(lib.delay(20));
    assert!(started.elapsed().as_millis() >= 20);
}

#[test]
fn blocking_delay_spins() {
    let lib = init(Config::default().with_policy(Policy::Blocking));
    let started = Instant::now();
    block_on(lib.delay(10));
    assert!(started.elapsed().as_millis() >= 10);

    let started = Instant::now();
    lib.delay_blocking(5);
    assert!(started.elapsed().as_millis() >= 5);
}
