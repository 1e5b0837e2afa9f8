use crate::error::InvalidArgument;
use anyhow::Result;
// ELI5: web assembly is a single threaded environment, so none of these
// traits ask for Send
use async_trait::async_trait;
use std::fmt;

// ==================== Raw constants ====================
// Numeric values the DxLib-style API uses for screens and blend modes
pub mod raw {
    pub const SCREEN_BACK: u32 = 0xffff_fffe;
    pub const SCREEN_FRONT: u32 = 0xffff_fffc;
    pub const BLENDMODE_NOBLEND: u32 = 0;
    pub const BLENDMODE_ALPHA: u32 = 1;
}

// ==================== Traits ====================
/// Anything that can be drawn onto a [`Surface`] and knows its pixel size.
pub trait ImageSource {
    fn width(&self) -> u32;
    fn height(&self) -> u32;
}

/// A 2D pixel buffer with a canvas-like drawing context.
///
/// Coordinates are Y-down. Transform calls compose onto the current
/// transform in call order, so the last call applies to the image first.
pub trait Surface {
    type Image: ImageSource;

    fn width(&self) -> u32;
    fn height(&self) -> u32;

    /// Fail if `set_size(width, height)` would be refused, without
    /// touching the surface.
    fn check_size(&self, _width: u32, _height: u32) -> Result<()> {
        Ok(())
    }

    /// Reallocate the pixel buffer. Contents and drawing state are reset.
    /// On failure the surface keeps its old buffer.
    fn set_size(&mut self, width: u32, height: u32) -> Result<()>;

    fn global_alpha(&self) -> f64;
    fn set_global_alpha(&mut self, alpha: f64);

    fn save(&mut self);
    fn restore(&mut self);
    fn translate(&mut self, x: f64, y: f64) -> Result<()>;
    fn rotate(&mut self, angle: f64) -> Result<()>;
    fn scale(&mut self, x: f64, y: f64) -> Result<()>;

    /// Draw `image` scaled into the rectangle `(x, y, width, height)`.
    /// Negative extents flip the image along that axis.
    fn draw_image(
        &mut self,
        image: &Self::Image,
        x: f64,
        y: f64,
        width: f64,
        height: f64,
    ) -> Result<()>;

    /// Clear the whole buffer to transparent, ignoring the current transform.
    fn clear(&mut self) -> Result<()>;

    /// Replace this surface's pixels with `source`'s, drawn at the origin
    /// with full opacity.
    fn copy_from(&mut self, source: &Self) -> Result<()>;
}

/// Host platform services: where surfaces come from, how images are
/// decoded and how time passes.
#[async_trait(?Send)]
pub trait Backend {
    type Image: ImageSource;
    type Surface: Surface<Image = Self::Image>;

    /// Bind to a pre-existing visible surface provided by the host.
    fn display_surface(&self, id: &str) -> Result<Self::Surface>;

    /// Allocate a new off-screen surface.
    fn offscreen_surface(&self, width: u32, height: u32) -> Result<Self::Surface>;

    /// Resolve once `source` is fully decoded.
    async fn load_image(&self, source: &str) -> Result<Self::Image>;

    /// Start loading `source` and return without waiting on the host.
    /// The image may not be decoded yet when this returns.
    fn begin_load_image(&self, source: &str) -> Result<Self::Image>;

    /// Suspend the caller for `millis` without blocking the host.
    async fn sleep(&self, millis: u32);

    /// Monotonic clock in milliseconds.
    fn now(&self) -> f64;

    /// Burn CPU until `millis` have passed on [`Backend::now`].
    fn spin_wait(&self, millis: u32) {
        let deadline = self.now() + f64::from(millis);
        while self.now() < deadline {
            std::hint::spin_loop();
        }
    }
}

// ==================== Types ====================
/// Opaque identifier for an image registered with a facade.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct Handle(pub usize);

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "handle #{}", self.0)
    }
}

/// Which of the two surfaces draw and clear calls target.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Screen {
    /// Off-screen work buffer
    Back,
    /// The visible surface
    Front,
}

impl TryFrom<u32> for Screen {
    type Error = InvalidArgument;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            raw::SCREEN_BACK => Ok(Screen::Back),
            raw::SCREEN_FRONT => Ok(Screen::Front),
            _ => Err(InvalidArgument {
                kind: "screen",
                value,
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlendMode {
    /// Draw at full opacity
    NoBlend,
    /// Draw at `param / 255` opacity
    Alpha,
}

impl TryFrom<u32> for BlendMode {
    type Error = InvalidArgument;

    fn try_from(value: u32) -> Result<Self, Self::Error> {
        match value {
            raw::BLENDMODE_NOBLEND => Ok(BlendMode::NoBlend),
            raw::BLENDMODE_ALPHA => Ok(BlendMode::Alpha),
            _ => Err(InvalidArgument {
                kind: "blend mode",
                value,
            }),
        }
    }
}

/// Current blend mode together with its 0..=255 parameter.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Blend {
    pub mode: BlendMode,
    pub param: u8,
}

impl Blend {
    /// Build a blend setting, clamping `param` into 0..=255.
    pub fn new(mode: BlendMode, param: i32) -> Self {
        Blend {
            mode,
            param: param.clamp(0, 255) as u8,
        }
    }

    /// The global alpha a surface should draw with.
    pub fn alpha(&self) -> f64 {
        match self.mode {
            BlendMode::NoBlend => 1.0,
            BlendMode::Alpha => f64::from(self.param) / 255.0,
        }
    }
}

impl Default for Blend {
    fn default() -> Self {
        Blend {
            mode: BlendMode::NoBlend,
            param: 255,
        }
    }
}
