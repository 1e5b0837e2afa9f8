//! Error types returned by the drawing facade.
//!
//! Backends and browser helpers speak `anyhow`; these are the typed errors
//! callers see once a failure crosses the facade boundary.
use crate::engine::Handle;
use thiserror::Error;

/// The host display surface (or the off-screen buffer) could not be set up.
#[derive(Debug, Error)]
pub enum InitError {
    #[error("display surface '{id}' is unavailable: {reason:#}")]
    DisplaySurface { id: String, reason: anyhow::Error },

    #[error("could not allocate back surface: {0:#}")]
    BackSurface(anyhow::Error),
}

/// An image resource could not be fetched or decoded. No handle is registered.
#[derive(Debug, Error)]
#[error("could not load image '{path}': {reason:#}")]
pub struct LoadError {
    pub path: String,
    pub reason: anyhow::Error,
}

#[derive(Debug, Error)]
pub enum DrawError {
    #[error("no image registered for {0}")]
    UnknownHandle(Handle),

    #[error("surface rejected the draw call: {0:#}")]
    Surface(anyhow::Error),
}

/// A raw mode or screen constant that does not name anything.
#[derive(Debug, Error, PartialEq, Eq)]
#[error("invalid {kind} value {value:#x}")]
pub struct InvalidArgument {
    pub kind: &'static str,
    pub value: u32,
}
