use async_trait::async_trait;
use std::sync::Arc;

use crate::config::Config;
use crate::errors::{ShopError, ShopResult};
use crate::wire::{GenerateCall, OperationHandle, VideoRequest};

pub mod gemini;

/// The generative backend. Built once at startup and shared by every
/// dispatcher, poller and conversation thread.
#[async_trait]
pub trait Backend: Send + Sync {
    /// One-shot generation; returns the model's text payload.
    async fn generate(&self, call: &GenerateCall) -> ShopResult<String>;

    /// Submit a video job; returns the initial handle.
    async fn submit_video(&self, model: &str, req: &VideoRequest) -> ShopResult<OperationHandle>;

    /// Fetch the current state of a previously submitted job.
    async fn refresh_operation(&self, handle: &OperationHandle) -> ShopResult<OperationHandle>;

    /// Turn a finished media URI into a URL that can be fetched without further auth.
    fn media_url(&self, uri: &str) -> ShopResult<String>;

    /// Download finished media bytes.
    async fn fetch_media(&self, url: &str) -> ShopResult<bytes::Bytes>;
}

pub type DynBackend = Arc<dyn Backend>;

pub fn make_backend(cfg: &Config) -> ShopResult<DynBackend> {
    let key = cfg
        .api_key
        .clone()
        .filter(|k| !k.is_empty())
        .ok_or_else(|| {
            ShopError::Config(format!("no API key set; export {} or add api_key to the config file", crate::config::API_KEY_VARS[0]))
        })?;
    Ok(Arc::new(gemini::GeminiBackend::new(&cfg.api_base, key, cfg.timeout())?))
}
