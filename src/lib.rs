// ==================== Imports ====================
use wasm_bindgen::prelude::*;
use wasm_bindgen::JsValue;

mod bindings;
mod browser;
pub mod canvas;
pub mod config;
pub mod engine;
pub mod error;
pub mod facade;
pub mod software;

pub use bindings::{JDx, SentinelApi};
pub use canvas::WebBackend;
pub use config::{Config, Policy};
pub use engine::{Backend, Blend, BlendMode, Handle, ImageSource, Screen, Surface};
pub use error::{DrawError, InitError, InvalidArgument, LoadError};
pub use facade::DxLib;
pub use software::SoftwareBackend;

// ==================== Demo ====================
const DEMO_CONFIG: &str = "jdxlib.json";
const DEMO_SPRITE: &str = "sprite.png";
const DEMO_FRAMES: u32 = 240;
// ~60 fps
const DEMO_FRAME_MS: u32 = 16;

/// Main entry for the Webassembly module
/// - installs panic hook and console logger
/// - spins a sprite on the back page and flips it to the canvas
#[wasm_bindgen]
pub fn main_js() -> Result<(), JsValue> {
    // better panic messages for debugging
    console_error_panic_hook::set_once();
    if let Err(err) = console_log::init_with_level(log::Level::Debug) {
        web_sys::console::warn_1(&format!("logger already set : {}", err).into());
    }

    browser::spawn_local(async move {
        if let Err(err) = run_demo().await {
            log::error!("demo stopped : {:#}", err);
        }
    });

    Ok(())
}

async fn run_demo() -> anyhow::Result<()> {
    let config = match Config::fetch(DEMO_CONFIG).await {
        Ok(config) => config,
        Err(err) => {
            log::info!("using default config ({:#})", err);
            Config::default()
        }
    };
    let (width, height) = (f64::from(config.width), f64::from(config.height));

    let mut lib = DxLib::initialize(WebBackend::new(), config)?;
    let sprite = lib.load_image(DEMO_SPRITE).await?;

    lib.set_active_surface(Screen::Back);
    lib.set_blend_mode(BlendMode::Alpha, 200);
    for frame in 0..DEMO_FRAMES {
        let angle = f64::from(frame) * std::f64::consts::TAU / f64::from(DEMO_FRAMES);
        lib.clear_surface()?;
        lib.draw_image(0.0, 0.0, sprite)?;
        lib.draw_image_rotated(width * 0.5, height * 0.5, 2.0, angle, sprite, frame % 60 < 30)?;
        lib.present()?;
        lib.delay(DEMO_FRAME_MS).await;
    }
    Ok(())
}
