//! The drawing facade: two surfaces, an image registry and the current
//! blend/target state, all owned by one [`DxLib`] value.
use crate::config::{Config, Policy};
use crate::engine::{Backend, Blend, BlendMode, Handle, ImageSource, Screen, Surface};
use crate::error::{DrawError, InitError, LoadError};

/// TABLE
/// ┌──────────────────── Frame Flow ────────────────────┐
/// │                                                    │
/// │  set_active_surface(Back)                          │
/// │        │                                           │
/// │        ▼                                           │
/// │  clear_surface / draw_image* ──► back surface      │
/// │                                       │            │
/// │                               present │ copy       │
/// │                                       ▼            │
/// │                                 front surface      │
/// │                                  (visible)         │
/// └────────────────────────────────────────────────────┘
pub struct DxLib<B: Backend> {
    backend: B,
    config: Config,
    back: B::Surface,
    front: B::Surface,
    // index == handle, images are never freed
    images: Vec<B::Image>,
    active: Screen,
    blend: Blend,
}

impl<B: Backend> DxLib<B> {
    /// Bind the host's display surface and allocate the back surface, both
    /// at `config.width × config.height`. Drawing targets the front surface.
    pub fn initialize(backend: B, config: Config) -> Result<Self, InitError> {
        let mut front =
            backend
                .display_surface(&config.canvas_id)
                .map_err(|reason| InitError::DisplaySurface {
                    id: config.canvas_id.clone(),
                    reason,
                })?;
        front
            .set_size(config.width, config.height)
            .map_err(|reason| InitError::DisplaySurface {
                id: config.canvas_id.clone(),
                reason,
            })?;
        let back = backend
            .offscreen_surface(config.width, config.height)
            .map_err(InitError::BackSurface)?;

        log::debug!(
            "initialized {}x{} on '{}' ({:?})",
            config.width,
            config.height,
            config.canvas_id,
            config.policy
        );
        let mut lib = DxLib {
            backend,
            config,
            back,
            front,
            images: Vec::new(),
            active: Screen::Front,
            blend: Blend::default(),
        };
        lib.apply_blend();
        Ok(lib)
    }

    // ==================== Images ====================
    /// Load and register an image. Under [`Policy::Deferred`] the handle is
    /// assigned once the host finishes decoding; under [`Policy::Blocking`]
    /// this is [`DxLib::load_image_blocking`].
    pub async fn load_image(&mut self, source: &str) -> Result<Handle, LoadError> {
        if self.config.policy == Policy::Blocking {
            return self.load_image_blocking(source);
        }
        let image = self
            .backend
            .load_image(source)
            .await
            .map_err(|reason| Self::load_failed(source, reason))?;
        Ok(self.register_image(image))
    }

    /// Start loading, register the handle right away, then spin for
    /// `config.sync_settle_ms`.
    ///
    /// On the web the decode may still be running when this returns, and a
    /// broken resource is only noticed when it is drawn.
    pub fn load_image_blocking(&mut self, source: &str) -> Result<Handle, LoadError> {
        let image = self
            .backend
            .begin_load_image(source)
            .map_err(|reason| Self::load_failed(source, reason))?;
        let handle = self.register_image(image);
        self.backend.spin_wait(self.config.sync_settle_ms);
        Ok(handle)
    }

    /// Register an image decoded elsewhere and hand out the next handle
    pub fn register_image(&mut self, image: B::Image) -> Handle {
        let handle = Handle(self.images.len());
        log::debug!(
            "registered {} ({}x{})",
            handle,
            image.width(),
            image.height()
        );
        self.images.push(image);
        handle
    }

    pub fn image(&self, handle: Handle) -> Option<&B::Image> {
        self.images.get(handle.0)
    }

    pub fn image_size(&self, handle: Handle) -> Option<(u32, u32)> {
        self.image(handle).map(|image| (image.width(), image.height()))
    }

    pub fn image_count(&self) -> usize {
        self.images.len()
    }

    fn load_failed(source: &str, reason: anyhow::Error) -> LoadError {
        log::warn!("loading '{}' failed: {:#}", source, reason);
        LoadError {
            path: source.to_string(),
            reason,
        }
    }

    // ==================== Drawing ====================
    /// Draw unscaled with the top-left corner at `(x, y)`
    pub fn draw_image(&mut self, x: f64, y: f64, handle: Handle) -> Result<(), DrawError> {
        let (surface, image) = self.target_and_image(handle)?;
        let (width, height) = (f64::from(image.width()), f64::from(image.height()));
        surface
            .draw_image(image, x, y, width, height)
            .map_err(DrawError::Surface)
    }

    /// Stretch the image over the rectangle `(x1, y1)`–`(x2, y2)`. Reversed
    /// corners flip the image, a zero-area rectangle draws nothing.
    pub fn draw_image_stretched(
        &mut self,
        x1: f64,
        y1: f64,
        x2: f64,
        y2: f64,
        handle: Handle,
    ) -> Result<(), DrawError> {
        let (surface, image) = self.target_and_image(handle)?;
        surface
            .draw_image(image, x1, y1, x2 - x1, y2 - y1)
            .map_err(DrawError::Surface)
    }

    /// Draw centred on `(x, y)`, scaled by `scale` and rotated by `angle`
    /// radians (clockwise on screen, since Y points down). `mirror` flips the
    /// image horizontally before it is rotated.
    pub fn draw_image_rotated(
        &mut self,
        x: f64,
        y: f64,
        scale: f64,
        angle: f64,
        handle: Handle,
        mirror: bool,
    ) -> Result<(), DrawError> {
        let (surface, image) = self.target_and_image(handle)?;
        let width = f64::from(image.width()) * scale;
        let height = f64::from(image.height()) * scale;

        surface.save();
        let drawn = (|| -> anyhow::Result<()> {
            surface.translate(x, y)?;
            surface.rotate(angle)?;
            if mirror {
                surface.scale(-1.0, 1.0)?;
            }
            surface.draw_image(image, -width * 0.5, -height * 0.5, width, height)
        })();
        // restore on every path so later draws see the old transform
        surface.restore();
        drawn.map_err(DrawError::Surface)
    }

    // ==================== Modes ====================
    /// Set the blend mode; `param` is clamped into 0..=255. The setting
    /// follows the active surface across [`DxLib::set_active_surface`].
    pub fn set_blend_mode(&mut self, mode: BlendMode, param: i32) {
        self.blend = Blend::new(mode, param);
        log::debug!("blend mode {:?} / {}", self.blend.mode, self.blend.param);
        self.apply_blend();
    }

    pub fn set_active_surface(&mut self, screen: Screen) {
        self.active = screen;
        log::debug!("drawing to {:?}", screen);
        self.apply_blend();
    }

    pub fn clear_surface(&mut self) -> Result<(), DrawError> {
        self.target_mut().clear().map_err(DrawError::Surface)
    }

    /// Copy the back surface onto the (cleared) front surface
    pub fn present(&mut self) -> Result<(), DrawError> {
        self.front.copy_from(&self.back).map_err(DrawError::Surface)
    }

    /// Reallocate both surfaces at the new size. Contents are dropped; the
    /// current blend setting is re-applied to the active surface.
    /// A size either surface refuses leaves both untouched.
    pub fn resize(&mut self, width: u32, height: u32) -> Result<(), DrawError> {
        self.back
            .check_size(width, height)
            .and_then(|_| self.front.check_size(width, height))
            .map_err(|err| {
                log::warn!("resize to {}x{} refused: {:#}", width, height, err);
                DrawError::Surface(err)
            })?;

        let (old_width, old_height) = (self.front.width(), self.front.height());
        let mut resized = self.back.set_size(width, height);
        if resized.is_ok() {
            resized = self.front.set_size(width, height);
            if resized.is_err() {
                // keep the pair the same size even when the front page balks
                if let Err(err) = self.back.set_size(old_width, old_height) {
                    log::warn!("could not roll back back surface: {:#}", err);
                }
            }
        }
        self.apply_blend();
        resized.map_err(DrawError::Surface)?;
        log::debug!("resized to {}x{}", width, height);
        Ok(())
    }

    // ==================== Timing ====================
    /// Wait `millis`. Suspends under [`Policy::Deferred`], spins under
    /// [`Policy::Blocking`].
    pub async fn delay(&self, millis: u32) {
        match self.config.policy {
            Policy::Deferred => self.backend.sleep(millis).await,
            Policy::Blocking => self.delay_blocking(millis),
        }
    }

    /// Busy-wait `millis`, blocking the calling thread
    pub fn delay_blocking(&self, millis: u32) {
        self.backend.spin_wait(millis);
    }

    // ==================== Accessors ====================
    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn policy(&self) -> Policy {
        self.config.policy
    }

    pub fn front(&self) -> &B::Surface {
        &self.front
    }

    pub fn back(&self) -> &B::Surface {
        &self.back
    }

    pub fn active(&self) -> Screen {
        self.active
    }

    pub fn blend(&self) -> Blend {
        self.blend
    }

    fn target_mut(&mut self) -> &mut B::Surface {
        match self.active {
            Screen::Back => &mut self.back,
            Screen::Front => &mut self.front,
        }
    }

    /// Split borrow: the active surface mutably, the image shared
    fn target_and_image(
        &mut self,
        handle: Handle,
    ) -> Result<(&mut B::Surface, &B::Image), DrawError> {
        let image = self
            .images
            .get(handle.0)
            .ok_or(DrawError::UnknownHandle(handle))?;
        let surface = match self.active {
            Screen::Back => &mut self.back,
            Screen::Front => &mut self.front,
        };
        Ok((surface, image))
    }

    fn apply_blend(&mut self) {
        let alpha = self.blend.alpha();
        self.target_mut().set_global_alpha(alpha);
    }
}
