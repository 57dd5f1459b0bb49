use std::time::Duration;
use tokio_util::sync::CancellationToken;

use crate::errors::{ShopError, ShopResult};
use crate::provider::DynBackend;
use crate::wire::{MediaReference, OperationHandle, OperationStatus, VideoRequest};

/// Submits long-running video jobs and waits for them.
///
/// The handle is refreshed once per `interval` while it is pending or running.
/// Polling stops for good at the first terminal status, when `max_attempts`
/// refreshes have been spent (`OperationTimeout`), or when the token fires
/// (`Cancelled`).
pub struct Poller {
    backend: DynBackend,
    model: String,
    interval: Duration,
    max_attempts: u32,
}

impl Poller {
    pub fn new(backend: DynBackend, model: impl Into<String>, interval: Duration, max_attempts: u32) -> Self {
        Self { backend, model: model.into(), interval, max_attempts }
    }

    pub async fn submit_and_poll(
        &self,
        req: &VideoRequest,
        cancel: &CancellationToken,
        on_status: impl Fn(&OperationHandle),
    ) -> ShopResult<MediaReference> {
        let handle = self.backend.submit_video(&self.model, req).await?;
        log::info!("video job {} submitted ({:?})", handle.id, handle.status);
        on_status(&handle);
        let handle = self.wait(handle, cancel, &on_status).await?;
        self.resolve(handle)
    }

    async fn wait(
        &self,
        mut handle: OperationHandle,
        cancel: &CancellationToken,
        on_status: &impl Fn(&OperationHandle),
    ) -> ShopResult<OperationHandle> {
        let mut attempts = 0u32;
        while !handle.status.is_terminal() {
            if attempts >= self.max_attempts {
                log::warn!("video job {} still {:?} after {attempts} checks", handle.id, handle.status);
                return Err(ShopError::OperationTimeout { id: handle.id, attempts });
            }
            tokio::select! {
                _ = cancel.cancelled() => {
                    log::info!("video job {} abandoned by caller", handle.id);
                    return Err(ShopError::Cancelled);
                }
                _ = tokio::time::sleep(self.interval) => {}
            }
            handle = self.backend.refresh_operation(&handle).await?;
            attempts += 1;
            log::debug!("video job {} -> {:?} (check {attempts})", handle.id, handle.status);
            on_status(&handle);
        }
        Ok(handle)
    }

    fn resolve(&self, handle: OperationHandle) -> ShopResult<MediaReference> {
        match handle.status {
            OperationStatus::Done => {
                let uri = handle.result_ref.ok_or_else(|| {
                    ShopError::GenerationFailure(format!("job {} finished without a result", handle.id))
                })?;
                let fetch_url = self.backend.media_url(&uri)?;
                Ok(MediaReference { uri, fetch_url })
            }
            OperationStatus::Error => Err(ShopError::GenerationFailure(
                handle.error_detail.unwrap_or_else(|| format!("job {} failed", handle.id)),
            )),
            OperationStatus::Pending | OperationStatus::Running => {
                Err(ShopError::GenerationFailure(format!("job {} is not finished", handle.id)))
            }
        }
    }

    /// Download finished media to `dest`.
    pub async fn download(&self, media: &MediaReference, dest: &std::path::Path) -> ShopResult<u64> {
        let bytes = self.backend.fetch_media(&media.fetch_url).await?;
        if let Some(parent) = dest.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs_err::create_dir_all(parent)?;
        }
        fs_err::write(dest, &bytes)?;
        Ok(bytes.len() as u64)
    }
}
