use crate::browser;
use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};

/// How `load_image` and `delay` wait.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Policy {
    /// Suspend the caller and let the host keep running
    #[default]
    Deferred,
    /// Block the calling thread (spin) until done
    Blocking,
}

/// Facade settings. Every field has a default, so a partial JSON document
/// (or none at all) is fine.
#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
#[serde(default)]
pub struct Config {
    /// Id of the host's visible canvas element
    pub canvas_id: String,
    pub width: u32,
    pub height: u32,
    pub policy: Policy,
    /// How long a blocking load spins after kicking off the decode
    pub sync_settle_ms: u32,
}

impl Config {
    pub const DEFAULT_CANVAS_ID: &'static str = "mainCanvas";
    pub const DEFAULT_WIDTH: u32 = 640;
    pub const DEFAULT_HEIGHT: u32 = 480;
    pub const DEFAULT_SYNC_SETTLE_MS: u32 = 100;

    /// Fetch a JSON config document from the host (wasm only).
    pub async fn fetch(path: &str) -> Result<Self> {
        browser::fetch_json::<Config>(path)
            .await
            .with_context(|| format!("Failed to load config from : {}", path))
    }

    pub fn with_policy(mut self, policy: Policy) -> Self {
        self.policy = policy;
        self
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            canvas_id: Self::DEFAULT_CANVAS_ID.to_string(),
            width: Self::DEFAULT_WIDTH,
            height: Self::DEFAULT_HEIGHT,
            policy: Policy::default(),
            sync_settle_ms: Self::DEFAULT_SYNC_SETTLE_MS,
        }
    }
}
