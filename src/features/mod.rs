use futures::future::join_all;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::collab::{ReportRecord, ReportStore, Session};
use crate::config::Config;
use crate::context::{ConversationRegistry, ConversationThread};
use crate::dispatch::Dispatcher;
use crate::entitlement::EntitlementGate;
use crate::errors::ShopResult;
use crate::poll::Poller;
use crate::prompt::{self, Feature, FeatureInput, VideoStyle};
use crate::provider::DynBackend;
use crate::shape::{self, FeatureResult, ImageReview};
use crate::wire::{ImageAttachment, MediaReference, OperationHandle, ResponseMode, VideoRequest};

/// Everything one feature screen needs, built once at startup.
pub struct Orchestrator {
    cfg: Config,
    dispatcher: Dispatcher,
    poller: Poller,
    gate: EntitlementGate,
    session: Arc<dyn Session>,
    reports: Arc<dyn ReportStore>,
    threads: ConversationRegistry,
}

impl Orchestrator {
    pub fn new(
        cfg: Config,
        backend: DynBackend,
        gate: EntitlementGate,
        session: Arc<dyn Session>,
        reports: Arc<dyn ReportStore>,
    ) -> Self {
        let dispatcher = Dispatcher::new(backend.clone(), cfg.text_model.clone());
        let poller = Poller::new(backend, cfg.video_model.clone(), cfg.poll_interval(), cfg.poll_max_attempts);
        Self { cfg, dispatcher, poller, gate, session, reports, threads: ConversationRegistry::default() }
    }

    fn account_id(&self) -> Option<String> {
        self.session.current().map(|a| a.id)
    }

    /// Take the feature's cost, run `work`, and hand the credits back if it fails.
    async fn costed<T, F>(&self, feature: Feature, work: F) -> ShopResult<T>
    where
        F: std::future::Future<Output = ShopResult<T>>,
    {
        let account = self.account_id();
        let cost = self.cfg.cost_of(feature);
        self.gate.require(account.as_deref(), cost).await?;
        let out = work.await;
        if let (Err(e), Some(acct)) = (&out, account.as_deref()) {
            if cost > 0 {
                log::info!("refunding {cost} credits after failed {}: {e}", feature.as_str());
                if let Err(refund_err) = self.gate.top_up(acct, cost).await {
                    log::warn!("refund of {cost} credits for {acct} failed: {refund_err}");
                }
            }
        }
        out
    }

    async fn generate(&self, input: &FeatureInput, image: Option<ImageAttachment>) -> ShopResult<FeatureResult> {
        let req = prompt::compose(input, image);
        let raw = self.dispatcher.dispatch(&req, ResponseMode::Structured).await?;
        Ok(match input {
            FeatureInput::ShopAudit { .. } => FeatureResult::ShopAudit(shape::extract(&raw)?),
            FeatureInput::ListingCopy { .. } => FeatureResult::ListingCopy(shape::extract(&raw)?),
            FeatureInput::TrendScan { .. } => FeatureResult::TrendScan(shape::extract(&raw)?),
            FeatureInput::CompetitorScan { .. } => FeatureResult::CompetitorScan(shape::extract(&raw)?),
            FeatureInput::ImageReview { .. } => FeatureResult::ImageReview(shape::extract(&raw)?),
        })
    }

    /// Gate, compose, dispatch, normalize and validate one analysis.
    pub async fn run(&self, input: &FeatureInput, image: Option<ImageAttachment>) -> ShopResult<FeatureResult> {
        log::info!("running {}", input.feature().as_str());
        self.costed(input.feature(), self.generate(input, image)).await
    }

    /// Review several photos at once. Each photo is charged and judged on its
    /// own, so one bad reply leaves the others intact.
    pub async fn review_images(
        &self,
        product: &str,
        images: Vec<(String, ImageAttachment)>,
    ) -> Vec<(String, ShopResult<ImageReview>)> {
        let input = FeatureInput::ImageReview { product: product.to_string() };
        let jobs = images.into_iter().map(|(label, img)| {
            let input = &input;
            async move {
                let res = self
                    .costed(Feature::ImageReview, async {
                        let req = prompt::compose(input, Some(img));
                        let raw = self.dispatcher.dispatch(&req, ResponseMode::Structured).await?;
                        shape::extract::<ImageReview>(&raw)
                    })
                    .await;
                if let Err(e) = &res {
                    log::warn!("review of {label} failed: {e}");
                }
                (label, res)
            }
        });
        join_all(jobs).await
    }

    pub async fn generate_video(
        &self,
        product: &str,
        style: VideoStyle,
        image: ImageAttachment,
        cancel: &CancellationToken,
        on_status: impl Fn(&OperationHandle),
    ) -> ShopResult<MediaReference> {
        let req = VideoRequest {
            prompt: prompt::compose_video(product, style),
            source_image: image,
            resolution: self.cfg.video_resolution.clone(),
            aspect_ratio: self.cfg.video_aspect_ratio.clone(),
        };
        self.costed(Feature::Video, self.poller.submit_and_poll(&req, cancel, on_status)).await
    }

    pub async fn download(&self, media: &MediaReference, dest: &std::path::Path) -> ShopResult<u64> {
        self.poller.download(media, dest).await
    }

    pub fn save(&self, title: &str, result: FeatureResult) -> bool {
        self.reports.save(&ReportRecord::from_result(title, result))
    }

    /// Open a follow-up chat about a finished result.
    pub fn open_thread(&self, feature: Feature, result: &FeatureResult) -> ShopResult<Arc<ConversationThread>> {
        let artifact = serde_json::to_string_pretty(result)?;
        Ok(self.threads.open(feature, &artifact))
    }

    pub async fn ask(&self, thread: Uuid, text: &str, image: Option<ImageAttachment>) -> ShopResult<String> {
        self.threads.get(thread)?.send(&self.dispatcher, text, image).await
    }

    pub fn close_thread(&self, thread: Uuid) -> bool {
        self.threads.close(thread)
    }
}
