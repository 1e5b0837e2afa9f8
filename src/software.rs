//! CPU backend: surfaces are plain RGBA buffers, images are decoded with the
//! `image` crate. Used for headless hosts and for the test suite, where
//! pixels have to be read back.
use crate::engine::{Backend, ImageSource, Surface};
use anyhow::{anyhow, Context, Result};
use async_trait::async_trait;
use futures::channel::oneshot::channel;
use image::{imageops, Rgba, RgbaImage};
use std::path::Path;
use std::thread;
use std::time::{Duration, Instant};

// a fresh <canvas> element is 300x150 until someone resizes it
const DISPLAY_WIDTH: u32 = 300;
const DISPLAY_HEIGHT: u32 = 150;

const TRANSPARENT: Rgba<u8> = Rgba([0, 0, 0, 0]);

// largest area browsers agree to allocate for one canvas
const MAX_PIXELS: u64 = 1 << 28;

// ==================== Bitmap ====================
/// A decoded image, stored as straight (not premultiplied) RGBA8.
#[derive(Debug, Clone, PartialEq)]
pub struct Bitmap(pub RgbaImage);

impl Bitmap {
    pub fn open(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref();
        let decoded = image::open(path)
            .with_context(|| format!("could not decode {}", path.display()))?;
        Ok(Bitmap(decoded.to_rgba8()))
    }
}

impl From<RgbaImage> for Bitmap {
    fn from(pixels: RgbaImage) -> Self {
        Bitmap(pixels)
    }
}

impl ImageSource for Bitmap {
    fn width(&self) -> u32 {
        self.0.width()
    }

    fn height(&self) -> u32 {
        self.0.height()
    }
}

// ==================== Transform ====================
/// 2D affine matrix in canvas order:
/// x' = a*x + c*y + e, y' = b*x + d*y + f
#[derive(Debug, Clone, Copy, PartialEq)]
struct Transform {
    a: f64,
    b: f64,
    c: f64,
    d: f64,
    e: f64,
    f: f64,
}

impl Transform {
    const IDENTITY: Transform = Transform {
        a: 1.0,
        b: 0.0,
        c: 0.0,
        d: 1.0,
        e: 0.0,
        f: 0.0,
    };

    /// `self * other`: `other` is applied to a point first
    fn then(&self, other: &Transform) -> Transform {
        Transform {
            a: self.a * other.a + self.c * other.b,
            b: self.b * other.a + self.d * other.b,
            c: self.a * other.c + self.c * other.d,
            d: self.b * other.c + self.d * other.d,
            e: self.a * other.e + self.c * other.f + self.e,
            f: self.b * other.e + self.d * other.f + self.f,
        }
    }

    fn apply(&self, x: f64, y: f64) -> (f64, f64) {
        (
            self.a * x + self.c * y + self.e,
            self.b * x + self.d * y + self.f,
        )
    }

    /// `None` when the matrix collapses the plane
    fn invert(&self) -> Option<Transform> {
        let det = self.a * self.d - self.b * self.c;
        if det.abs() < f64::EPSILON {
            return None;
        }
        Some(Transform {
            a: self.d / det,
            b: -self.b / det,
            c: -self.c / det,
            d: self.a / det,
            e: (self.c * self.f - self.d * self.e) / det,
            f: (self.b * self.e - self.a * self.f) / det,
        })
    }

    fn is_finite(&self) -> bool {
        [self.a, self.b, self.c, self.d, self.e, self.f]
            .iter()
            .all(|v| v.is_finite())
    }
}

/// Source-over composite of one straight-alpha pixel onto another
fn source_over(dst: [u8; 4], src: [u8; 4], opacity: f64) -> [u8; 4] {
    let sa = f64::from(src[3]) / 255.0 * opacity.clamp(0.0, 1.0);
    if sa <= 0.0 {
        return dst;
    }
    let da = f64::from(dst[3]) / 255.0;
    let out_a = sa + da * (1.0 - sa);

    let mut out = [0u8; 4];
    for i in 0..3 {
        let c = (f64::from(src[i]) * sa + f64::from(dst[i]) * da * (1.0 - sa)) / out_a;
        out[i] = c.round().clamp(0.0, 255.0) as u8;
    }
    out[3] = (out_a * 255.0).round().clamp(0.0, 255.0) as u8;
    out
}

// ==================== PixelSurface ====================
#[derive(Debug, Clone, Copy)]
struct DrawState {
    transform: Transform,
    global_alpha: f64,
}

impl Default for DrawState {
    fn default() -> Self {
        DrawState {
            transform: Transform::IDENTITY,
            global_alpha: 1.0,
        }
    }
}

pub struct PixelSurface {
    pixels: RgbaImage,
    state: DrawState,
    saved: Vec<DrawState>,
}

/// Reject sizes whose RGBA buffer cannot be allocated
fn check_area(width: u32, height: u32) -> Result<()> {
    let pixels = u64::from(width) * u64::from(height);
    let bytes = usize::try_from(pixels)
        .ok()
        .and_then(|pixels| pixels.checked_mul(4));
    match bytes {
        Some(_) if pixels <= MAX_PIXELS => Ok(()),
        _ => Err(anyhow!(
            "surface of {}x{} exceeds {} pixels",
            width,
            height,
            MAX_PIXELS
        )),
    }
}

impl PixelSurface {
    pub fn new(width: u32, height: u32) -> Result<Self> {
        check_area(width, height)?;
        Ok(PixelSurface {
            pixels: RgbaImage::new(width, height),
            state: DrawState::default(),
            saved: Vec::new(),
        })
    }

    /// RGBA at `(x, y)`, `None` outside the buffer
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        self.pixels.get_pixel_checked(x, y).map(|p| p.0)
    }

    pub fn pixels(&self) -> &RgbaImage {
        &self.pixels
    }

    pub fn is_transparent(&self) -> bool {
        self.pixels.pixels().all(|p| p[3] == 0)
    }
}

impl Surface for PixelSurface {
    type Image = Bitmap;

    fn width(&self) -> u32 {
        self.pixels.width()
    }

    fn height(&self) -> u32 {
        self.pixels.height()
    }

    fn check_size(&self, width: u32, height: u32) -> Result<()> {
        check_area(width, height)
    }

    fn set_size(&mut self, width: u32, height: u32) -> Result<()> {
        // on failure the old buffer stays as it was
        *self = PixelSurface::new(width, height)?;
        Ok(())
    }

    fn global_alpha(&self) -> f64 {
        self.state.global_alpha
    }

    fn set_global_alpha(&mut self, alpha: f64) {
        // canvas ignores out of range values
        if (0.0..=1.0).contains(&alpha) {
            self.state.global_alpha = alpha;
        }
    }

    fn save(&mut self) {
        self.saved.push(self.state);
    }

    fn restore(&mut self) {
        if let Some(state) = self.saved.pop() {
            self.state = state;
        }
    }

    fn translate(&mut self, x: f64, y: f64) -> Result<()> {
        let step = Transform {
            e: x,
            f: y,
            ..Transform::IDENTITY
        };
        self.state.transform = self.state.transform.then(&step);
        Ok(())
    }

    fn rotate(&mut self, angle: f64) -> Result<()> {
        let (sin, cos) = angle.sin_cos();
        let step = Transform {
            a: cos,
            b: sin,
            c: -sin,
            d: cos,
            e: 0.0,
            f: 0.0,
        };
        self.state.transform = self.state.transform.then(&step);
        Ok(())
    }

    fn scale(&mut self, x: f64, y: f64) -> Result<()> {
        let step = Transform {
            a: x,
            d: y,
            ..Transform::IDENTITY
        };
        self.state.transform = self.state.transform.then(&step);
        Ok(())
    }

    fn draw_image(&mut self, image: &Bitmap, x: f64, y: f64, width: f64, height: f64) -> Result<()> {
        let (iw, ih) = (image.width(), image.height());
        if iw == 0 || ih == 0 {
            return Ok(());
        }
        let placement = Transform {
            a: width / f64::from(iw),
            b: 0.0,
            c: 0.0,
            d: height / f64::from(ih),
            e: x,
            f: y,
        };
        let to_surface = self.state.transform.then(&placement);
        if !to_surface.is_finite() {
            return Err(anyhow!(
                "non-finite geometry ({}, {}, {}, {})",
                x,
                y,
                width,
                height
            ));
        }
        // zero-area destination: nothing to paint
        let Some(to_image) = to_surface.invert() else {
            return Ok(());
        };

        let corners = [(0, 0), (iw, 0), (0, ih), (iw, ih)]
            .map(|(u, v)| to_surface.apply(f64::from(u), f64::from(v)));
        let min_x = corners.iter().map(|p| p.0).fold(f64::INFINITY, f64::min);
        let max_x = corners.iter().map(|p| p.0).fold(f64::NEG_INFINITY, f64::max);
        let min_y = corners.iter().map(|p| p.1).fold(f64::INFINITY, f64::min);
        let max_y = corners.iter().map(|p| p.1).fold(f64::NEG_INFINITY, f64::max);

        let x0 = min_x.floor().max(0.0) as u32;
        let y0 = min_y.floor().max(0.0) as u32;
        let x1 = max_x.ceil().min(f64::from(self.width())).max(0.0) as u32;
        let y1 = max_y.ceil().min(f64::from(self.height())).max(0.0) as u32;

        let alpha = self.state.global_alpha;
        for py in y0..y1 {
            for px in x0..x1 {
                // sample at pixel centres, nearest neighbour
                let (u, v) = to_image.apply(f64::from(px) + 0.5, f64::from(py) + 0.5);
                if u < 0.0 || v < 0.0 || u >= f64::from(iw) || v >= f64::from(ih) {
                    continue;
                }
                let src = image.0.get_pixel(u as u32, v as u32).0;
                let dst = self.pixels.get_pixel_mut(px, py);
                dst.0 = source_over(dst.0, src, alpha);
            }
        }
        Ok(())
    }

    fn clear(&mut self) -> Result<()> {
        self.pixels.pixels_mut().for_each(|p| *p = TRANSPARENT);
        Ok(())
    }

    fn copy_from(&mut self, source: &Self) -> Result<()> {
        self.clear()?;
        imageops::replace(&mut self.pixels, &source.pixels, 0, 0);
        Ok(())
    }
}

// ==================== SoftwareBackend ====================
/// Headless host. Display surfaces must be announced up front with
/// [`SoftwareBackend::with_display`]; image sources are file paths.
#[derive(Clone)]
pub struct SoftwareBackend {
    displays: Vec<String>,
    epoch: Instant,
}

impl SoftwareBackend {
    pub fn new() -> Self {
        SoftwareBackend {
            displays: Vec::new(),
            epoch: Instant::now(),
        }
    }

    pub fn with_display(mut self, id: impl Into<String>) -> Self {
        self.displays.push(id.into());
        self
    }
}

impl Default for SoftwareBackend {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait(?Send)]
impl Backend for SoftwareBackend {
    type Image = Bitmap;
    type Surface = PixelSurface;

    fn display_surface(&self, id: &str) -> Result<PixelSurface> {
        if !self.displays.iter().any(|d| d == id) {
            return Err(anyhow!("No display surface registered with ID : '{}'", id));
        }
        PixelSurface::new(DISPLAY_WIDTH, DISPLAY_HEIGHT)
    }

    fn offscreen_surface(&self, width: u32, height: u32) -> Result<PixelSurface> {
        PixelSurface::new(width, height)
    }

    /// Decodes on a worker thread so the caller's executor keeps running
    async fn load_image(&self, source: &str) -> Result<Bitmap> {
        let (tx, rx) = channel::<Result<Bitmap>>();
        let path = source.to_string();
        thread::Builder::new()
            .name("jdxlib-decode".into())
            .spawn(move || {
                let _ = tx.send(Bitmap::open(&path));
            })
            .context("could not spawn decode thread")?;

        // Result<Result<Bitmap>, oneshot::Canceled>
        rx.await?
    }

    fn begin_load_image(&self, source: &str) -> Result<Bitmap> {
        // nothing to defer to here, decode right away
        Bitmap::open(source)
    }

    async fn sleep(&self, millis: u32) {
        let (tx, rx) = channel::<()>();
        let duration = Duration::from_millis(u64::from(millis));
        let spawned = thread::Builder::new()
            .name("jdxlib-timer".into())
            .spawn(move || {
                thread::sleep(duration);
                let _ = tx.send(());
            });
        match spawned {
            Ok(_) => {
                let _ = rx.await;
            }
            Err(err) => {
                log::warn!("timer thread unavailable ({}), sleeping inline", err);
                thread::sleep(duration);
            }
        }
    }

    fn now(&self) -> f64 {
        self.epoch.elapsed().as_secs_f64() * 1000.0
    }
}
