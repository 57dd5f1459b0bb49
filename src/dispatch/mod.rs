use crate::errors::{ShopError, ShopResult};
use crate::provider::DynBackend;
use crate::wire::{GenerateCall, GenerationRequest, MultiTurnPayload, ResponseMode, Role, Turn};

/// Issues one-shot generation calls. Never retries; failures go straight back to the caller.
#[derive(Clone)]
pub struct Dispatcher {
    backend: DynBackend,
    model: String,
}

impl Dispatcher {
    pub fn new(backend: DynBackend, model: impl Into<String>) -> Self {
        Self { backend, model: model.into() }
    }

    pub async fn dispatch(&self, req: &GenerationRequest, mode: ResponseMode) -> ShopResult<String> {
        log::debug!("dispatching request expecting {:?} output", req.expected_shape);
        if req.image_count() > 1 {
            return Err(ShopError::GenerationFailure(format!(
                "a request carries at most one image, got {}",
                req.image_count()
            )));
        }
        let call = GenerateCall {
            model: self.model.clone(),
            turns: vec![Turn { role: Role::Requester, parts: req.prompt_parts.clone() }],
            mode,
            use_web_signals: req.options.use_web_signals,
            temperature: req.options.temperature,
            system_instruction: None,
        };
        self.send(&call).await
    }

    /// Send a built conversation; replies are always prose.
    pub async fn dispatch_conversation(&self, payload: &MultiTurnPayload) -> ShopResult<String> {
        let call = GenerateCall {
            model: self.model.clone(),
            turns: payload.turns.clone(),
            mode: ResponseMode::Text,
            use_web_signals: false,
            temperature: None,
            system_instruction: Some(payload.system_instruction.clone()),
        };
        self.send(&call).await
    }

    async fn send(&self, call: &GenerateCall) -> ShopResult<String> {
        log::debug!(
            "dispatch model={} mode={:?} turns={} web={}",
            call.model,
            call.mode,
            call.turns.len(),
            call.use_web_signals
        );
        self.backend.generate(call).await.map_err(|e| {
            log::warn!("generation call failed: {e}");
            match e {
                e @ ShopError::GenerationFailure(_) => e,
                other => ShopError::GenerationFailure(other.to_string()),
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::prompt::{compose, FeatureInput};
    use crate::provider::fake::ScriptedBackend;
    use crate::wire::{GenerationOptions, ImageAttachment, PromptPart, ShapeHint};
    use std::sync::Arc;

    #[tokio::test]
    async fn structured_dispatch_forwards_options() {
        let backend = Arc::new(ScriptedBackend::with_replies(vec![Ok("[]".into())]));
        let d = Dispatcher::new(backend.clone(), "text-model");
        let req = compose(&FeatureInput::TrendScan { niche: "tea".into(), region: "UK".into() }, None);

        let out = d.dispatch(&req, ResponseMode::Structured).await.unwrap();
        assert_eq!(out, "[]");

        let calls = backend.calls.lock();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].model, "text-model");
        assert_eq!(calls[0].mode, ResponseMode::Structured);
        assert!(calls[0].use_web_signals);
        assert_eq!(calls[0].turns[0].role, Role::Requester);
    }

    #[tokio::test]
    async fn failure_is_not_retried() {
        let backend = Arc::new(ScriptedBackend::with_replies(vec![
            Err(ShopError::GenerationFailure("503".into())),
            Ok("would succeed".into()),
        ]));
        let d = Dispatcher::new(backend.clone(), "m");
        let req = compose(&FeatureInput::ImageReview { product: "mug".into() }, None);

        let err = d.dispatch(&req, ResponseMode::Text).await.unwrap_err();
        assert!(matches!(err, ShopError::GenerationFailure(_)));
        assert_eq!(backend.calls.lock().len(), 1);
    }

    #[tokio::test]
    async fn two_images_are_refused_before_sending() {
        let backend = Arc::new(ScriptedBackend::default());
        let d = Dispatcher::new(backend.clone(), "m");
        let img = ImageAttachment::new("image/png", vec![1u8]);
        let req = GenerationRequest {
            prompt_parts: vec![PromptPart::Image(img.clone()), PromptPart::Image(img)],
            expected_shape: ShapeHint::FreeText,
            options: GenerationOptions::default(),
        };
        assert!(d.dispatch(&req, ResponseMode::Text).await.is_err());
        assert!(backend.calls.lock().is_empty());
    }
}
