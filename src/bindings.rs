//! JavaScript entry points with the DxLib call names.
//!
//! Synchronous calls return `0` on success and `-1` on failure (the typed
//! error is logged); `LoadGraph` and `WaitTimer` return promises.
use crate::canvas::WebBackend;
use crate::config::{Config, Policy};
use crate::engine::{Backend, BlendMode, Handle, Screen};
use crate::error::InvalidArgument;
use crate::facade::DxLib;
use std::cell::RefCell;
use std::fmt::Display;
use std::future::Future;
use std::rc::Rc;
use wasm_bindgen::prelude::*;
use wasm_bindgen_futures::future_to_promise;

pub const OK: i32 = 0;
pub const FAILED: i32 = -1;

const NOT_INITIALIZED: &str = "Lib_Init has not been called";

// ELI5: LoadGraph keeps running after it returns a promise, so the facade
// is shared between the caller and the pending load
type SharedLib<B> = Rc<RefCell<Option<DxLib<B>>>>;

// ==================== SentinelApi ====================
/// The DxLib call table over any backend: raw constants in, `0` / `-1`
/// out. [`JDx`] exposes it to JavaScript on top of [`WebBackend`].
pub struct SentinelApi<B: Backend> {
    lib: SharedLib<B>,
    backend: B,
    config: Config,
}

impl<B: Backend + Clone> SentinelApi<B> {
    pub fn new(backend: B, config: Config) -> Self {
        SentinelApi {
            lib: Rc::new(RefCell::new(None)),
            backend,
            config,
        }
    }

    /// Look at the facade, `None` before `lib_init` succeeded
    pub fn inspect<R>(&self, f: impl FnOnce(&DxLib<B>) -> R) -> Option<R> {
        self.lib.borrow().as_ref().map(f)
    }

    pub fn lib_init(&self) -> i32 {
        match DxLib::initialize(self.backend.clone(), self.config.clone()) {
            Ok(lib) => {
                *self.lib.borrow_mut() = Some(lib);
                OK
            }
            Err(err) => failed("Lib_Init", err),
        }
    }

    /// Resolves to the new handle, or to `-1` on failure
    pub fn load_graph(&self, file_name: String) -> impl Future<Output = Result<u32, i32>> {
        let lib = self.lib.clone();
        let backend = self.backend.clone();
        let policy = self.config.policy;
        async move {
            if policy == Policy::Blocking {
                let loaded = match lib.borrow_mut().as_mut() {
                    Some(lib) => lib
                        .load_image_blocking(&file_name)
                        .map(handle_value)
                        .map_err(|err| failed("LoadGraph", err)),
                    None => Err(failed("LoadGraph", NOT_INITIALIZED)),
                };
                return loaded;
            }
            if lib.borrow().is_none() {
                return Err(failed("LoadGraph", NOT_INITIALIZED));
            }
            // decode without holding the borrow so other calls (and other
            // loads) can run meanwhile
            let image = backend
                .load_image(&file_name)
                .await
                .map_err(|err| failed("LoadGraph", format!("{:#}", err)))?;
            let registered = match lib.borrow_mut().as_mut() {
                Some(lib) => Ok(handle_value(lib.register_image(image))),
                None => Err(failed("LoadGraph", NOT_INITIALIZED)),
            };
            registered
        }
    }

    pub fn draw_graph(&self, x: f64, y: f64, gr_handle: u32) -> i32 {
        self.with_lib("DrawGraph", |lib| {
            lib.draw_image(x, y, Handle(gr_handle as usize))
        })
    }

    pub fn draw_extend_graph(&self, x1: f64, y1: f64, x2: f64, y2: f64, gr_handle: u32) -> i32 {
        self.with_lib("DrawExtendGraph", |lib| {
            lib.draw_image_stretched(x1, y1, x2, y2, Handle(gr_handle as usize))
        })
    }

    /// `turn_flag == Some(1)` mirrors the image
    pub fn draw_rota_graph(
        &self,
        x: f64,
        y: f64,
        ext_rate: f64,
        angle: f64,
        gr_handle: u32,
        turn_flag: Option<i32>,
    ) -> i32 {
        let mirror = turn_flag == Some(1);
        self.with_lib("DrawRotaGraph", |lib| {
            lib.draw_image_rotated(x, y, ext_rate, angle, Handle(gr_handle as usize), mirror)
        })
    }

    /// A missing `pal` keeps the current parameter
    pub fn set_draw_blend_mode(&self, blend_mode: u32, pal: Option<i32>) -> i32 {
        self.with_lib("SetDrawBlendMode", |lib| {
            let mode = BlendMode::try_from(blend_mode)?;
            let param = pal.unwrap_or_else(|| i32::from(lib.blend().param));
            lib.set_blend_mode(mode, param);
            Ok::<(), InvalidArgument>(())
        })
    }

    pub fn set_draw_screen(&self, draw_screen: u32) -> i32 {
        self.with_lib("SetDrawScreen", |lib| {
            let screen = Screen::try_from(draw_screen)?;
            lib.set_active_surface(screen);
            Ok::<(), InvalidArgument>(())
        })
    }

    pub fn clear_draw_screen(&self) -> i32 {
        self.with_lib("ClearDrawScreen", |lib| lib.clear_surface())
    }

    pub fn screen_flip(&self) -> i32 {
        self.with_lib("ScreenFlip", |lib| lib.present())
    }

    pub fn set_graph_mode(&self, size_x: u32, size_y: u32) -> i32 {
        self.with_lib("SetGraphMode", |lib| lib.resize(size_x, size_y))
    }

    /// Resolves to `0` after `wait_time` milliseconds
    pub fn wait_timer(&self, wait_time: u32) -> impl Future<Output = i32> {
        let backend = self.backend.clone();
        let policy = self.config.policy;
        async move {
            match policy {
                Policy::Deferred => backend.sleep(wait_time).await,
                Policy::Blocking => backend.spin_wait(wait_time),
            }
            OK
        }
    }

    fn with_lib<F, E>(&self, call: &str, f: F) -> i32
    where
        F: FnOnce(&mut DxLib<B>) -> Result<(), E>,
        E: Display,
    {
        let Ok(mut guard) = self.lib.try_borrow_mut() else {
            return failed(call, "facade is busy");
        };
        match guard.as_mut() {
            Some(lib) => match f(lib) {
                Ok(()) => OK,
                Err(err) => failed(call, err),
            },
            None => failed(call, NOT_INITIALIZED),
        }
    }
}

fn handle_value(handle: Handle) -> u32 {
    handle.0 as u32
}

fn failed(call: &str, err: impl Display) -> i32 {
    log::warn!("{} failed: {}", call, err);
    FAILED
}

// ==================== JDx ====================
#[wasm_bindgen]
pub struct JDx {
    api: SentinelApi<WebBackend>,
}

impl Default for JDx {
    fn default() -> Self {
        JDx::new()
    }
}

#[wasm_bindgen]
impl JDx {
    #[wasm_bindgen(constructor)]
    pub fn new() -> JDx {
        JDx {
            api: SentinelApi::new(WebBackend::new(), Config::default()),
        }
    }

    /// Build with a (partial) config object, e.g. `{ canvas_id: "game" }`
    #[wasm_bindgen(js_name = withConfig)]
    pub fn with_config(config: JsValue) -> Result<JDx, JsValue> {
        let config: Config = serde_wasm_bindgen::from_value(config)?;
        Ok(JDx {
            api: SentinelApi::new(WebBackend::new(), config),
        })
    }

    #[wasm_bindgen(js_name = Lib_Init)]
    pub fn lib_init(&self) -> i32 {
        self.api.lib_init()
    }

    /// Resolves to the new handle, rejects with `-1`
    #[wasm_bindgen(js_name = LoadGraph)]
    pub fn load_graph(&self, file_name: String) -> js_sys::Promise {
        let loading = self.api.load_graph(file_name);
        future_to_promise(async move { loading.await.map(JsValue::from).map_err(JsValue::from) })
    }

    #[wasm_bindgen(js_name = DrawGraph)]
    pub fn draw_graph(&self, x: f64, y: f64, gr_handle: u32, _trans_flag: Option<i32>) -> i32 {
        self.api.draw_graph(x, y, gr_handle)
    }

    #[wasm_bindgen(js_name = DrawExtendGraph)]
    pub fn draw_extend_graph(
        &self,
        x1: f64,
        y1: f64,
        x2: f64,
        y2: f64,
        gr_handle: u32,
        _trans_flag: Option<i32>,
    ) -> i32 {
        self.api.draw_extend_graph(x1, y1, x2, y2, gr_handle)
    }

    #[allow(clippy::too_many_arguments)]
    #[wasm_bindgen(js_name = DrawRotaGraph)]
    pub fn draw_rota_graph(
        &self,
        x: f64,
        y: f64,
        ext_rate: f64,
        angle: f64,
        gr_handle: u32,
        _trans_flag: Option<i32>,
        turn_flag: Option<i32>,
    ) -> i32 {
        self.api
            .draw_rota_graph(x, y, ext_rate, angle, gr_handle, turn_flag)
    }

    #[wasm_bindgen(js_name = SetDrawBlendMode)]
    pub fn set_draw_blend_mode(&self, blend_mode: u32, pal: Option<i32>) -> i32 {
        self.api.set_draw_blend_mode(blend_mode, pal)
    }

    #[wasm_bindgen(js_name = SetDrawScreen)]
    pub fn set_draw_screen(&self, draw_screen: u32) -> i32 {
        self.api.set_draw_screen(draw_screen)
    }

    #[wasm_bindgen(js_name = ClearDrawScreen)]
    pub fn clear_draw_screen(&self) -> i32 {
        self.api.clear_draw_screen()
    }

    #[wasm_bindgen(js_name = ScreenFlip)]
    pub fn screen_flip(&self) -> i32 {
        self.api.screen_flip()
    }

    /// Colour depth is accepted for call compatibility and ignored
    #[wasm_bindgen(js_name = SetGraphMode)]
    pub fn set_graph_mode(&self, size_x: u32, size_y: u32, _color_bit_num: Option<u32>) -> i32 {
        self.api.set_graph_mode(size_x, size_y)
    }

    /// Resolves to `0` after `wait_time` milliseconds
    #[wasm_bindgen(js_name = WaitTimer)]
    pub fn wait_timer(&self, wait_time: u32) -> js_sys::Promise {
        let waiting = self.api.wait_timer(wait_time);
        future_to_promise(async move { Ok(JsValue::from(waiting.await)) })
    }
}
