//! Browser backend: surfaces are `<canvas>` elements driven through their
//! 2D context, images are `<img>` elements decoded by the browser.
use crate::browser;
use crate::engine::{Backend, ImageSource, Surface};
use anyhow::{anyhow, Error, Result};
use async_trait::async_trait;
use futures::channel::oneshot::channel;
use std::cell::RefCell;
use std::rc::Rc;
use wasm_bindgen::{
    // unchecked_ref casts a closure to a js Function, we built the closure
    // ourselves so the expected type is known
    JsCast,
    JsValue,
};
use web_sys::{CanvasRenderingContext2d, HtmlCanvasElement, HtmlImageElement};

impl ImageSource for HtmlImageElement {
    fn width(&self) -> u32 {
        self.natural_width()
    }

    fn height(&self) -> u32 {
        self.natural_height()
    }
}

pub struct CanvasSurface {
    canvas: HtmlCanvasElement,
    context: CanvasRenderingContext2d,
}

impl CanvasSurface {
    pub fn new(canvas: HtmlCanvasElement) -> Result<Self> {
        let context = browser::context(&canvas)?;
        Ok(CanvasSurface { canvas, context })
    }

    pub fn canvas(&self) -> &HtmlCanvasElement {
        &self.canvas
    }

    pub fn context(&self) -> &CanvasRenderingContext2d {
        &self.context
    }

    fn reset_transform(&self) -> Result<()> {
        self.context
            .set_transform(1.0, 0.0, 0.0, 1.0, 0.0, 0.0)
            .map_err(|err| anyhow!("Error resetting transform : {:#?}", err))
    }
}

impl Surface for CanvasSurface {
    type Image = HtmlImageElement;

    fn width(&self) -> u32 {
        self.canvas.width()
    }

    fn height(&self) -> u32 {
        self.canvas.height()
    }

    fn set_size(&mut self, width: u32, height: u32) -> Result<()> {
        // assigning either dimension reallocates the bitmap and resets the
        // context state
        self.canvas.set_width(width);
        self.canvas.set_height(height);
        Ok(())
    }

    fn global_alpha(&self) -> f64 {
        self.context.global_alpha()
    }

    fn set_global_alpha(&mut self, alpha: f64) {
        self.context.set_global_alpha(alpha);
    }

    fn save(&mut self) {
        self.context.save();
    }

    fn restore(&mut self) {
        self.context.restore();
    }

    fn translate(&mut self, x: f64, y: f64) -> Result<()> {
        self.context
            .translate(x, y)
            .map_err(|err| anyhow!("Error translating : {:#?}", err))
    }

    fn rotate(&mut self, angle: f64) -> Result<()> {
        self.context
            .rotate(angle)
            .map_err(|err| anyhow!("Error rotating : {:#?}", err))
    }

    fn scale(&mut self, x: f64, y: f64) -> Result<()> {
        self.context
            .scale(x, y)
            .map_err(|err| anyhow!("Error scaling : {:#?}", err))
    }

    fn draw_image(
        &mut self,
        image: &HtmlImageElement,
        x: f64,
        y: f64,
        width: f64,
        height: f64,
    ) -> Result<()> {
        self.context
            .draw_image_with_html_image_element_and_dw_and_dh(image, x, y, width, height)
            .map_err(|err| anyhow!("Error drawing image : {:#?}", err))
    }

    fn clear(&mut self) -> Result<()> {
        self.context.save();
        let cleared = self.reset_transform().map(|_| {
            self.context
                .clear_rect(0.0, 0.0, self.width().into(), self.height().into())
        });
        self.context.restore();
        cleared
    }

    fn copy_from(&mut self, source: &Self) -> Result<()> {
        self.context.save();
        let copied = self.reset_transform().and_then(|_| {
            self.context.set_global_alpha(1.0);
            self.context
                .clear_rect(0.0, 0.0, self.width().into(), self.height().into());
            self.context
                .draw_image_with_html_canvas_element(&source.canvas, 0.0, 0.0)
                .map_err(|err| anyhow!("Error copying canvas : {:#?}", err))
        });
        self.context.restore();
        copied
    }
}

/// Backend for a page that already holds the visible canvas.
#[derive(Debug, Default, Clone, Copy)]
pub struct WebBackend;

impl WebBackend {
    pub fn new() -> Self {
        WebBackend
    }
}

#[async_trait(?Send)]
impl Backend for WebBackend {
    type Image = HtmlImageElement;
    type Surface = CanvasSurface;

    fn display_surface(&self, id: &str) -> Result<CanvasSurface> {
        CanvasSurface::new(browser::canvas(id)?)
    }

    fn offscreen_surface(&self, width: u32, height: u32) -> Result<CanvasSurface> {
        let mut surface = CanvasSurface::new(browser::create_canvas()?)?;
        surface.set_size(width, height)?;
        Ok(surface)
    }

    /// Resolves on the image's `load` event, fails on its `error` event
    async fn load_image(&self, source: &str) -> Result<HtmlImageElement> {
        let image = browser::new_image()?;
        let (tx, rx) = channel::<Result<(), Error>>();
        let success_tx = Rc::new(RefCell::new(Some(tx)));
        let error_tx = success_tx.clone();

        let success_callback = browser::closure_once(move || {
            if let Some(tx) = success_tx.borrow_mut().take() {
                let _ = tx.send(Ok(()));
            }
        });

        let error_callback = browser::closure_once(move |err: JsValue| {
            if let Some(tx) = error_tx.borrow_mut().take() {
                let _ = tx.send(Err(anyhow!("Error loading image: {:#?}", err)));
            }
        });

        image.set_onload(Some(success_callback.as_ref().unchecked_ref()));
        image.set_onerror(Some(error_callback.as_ref().unchecked_ref()));
        image.set_src(source);

        // keep callbacks alive until the image loads or errors
        success_callback.forget();
        error_callback.forget();

        // Result<Result<(), Error>, oneshot::Canceled>
        // - first ? is the channel, second ? is the load itself
        rx.await??;

        Ok(image)
    }

    fn begin_load_image(&self, source: &str) -> Result<HtmlImageElement> {
        let image = browser::new_image()?;
        image.set_src(source);
        Ok(image)
    }

    async fn sleep(&self, millis: u32) {
        let (tx, rx) = channel::<()>();
        let callback = browser::closure_once(move || {
            let _ = tx.send(());
        });
        match browser::set_timeout(&callback, millis) {
            Ok(_) => {
                callback.forget();
                let _ = rx.await;
            }
            Err(err) => log::warn!("sleep({}) resolved early: {:#}", millis, err),
        }
    }

    fn now(&self) -> f64 {
        browser::now().unwrap_or_else(|_| js_sys::Date::now())
    }
}
