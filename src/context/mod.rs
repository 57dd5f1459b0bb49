use std::collections::HashMap;
use std::sync::Arc;
use tokio::sync::Mutex;
use uuid::Uuid;

use crate::dispatch::Dispatcher;
use crate::errors::{ShopError, ShopResult};
use crate::prompt::{self, Feature};
use crate::wire::{
    ConversationContext, ImageAttachment, Message, MultiTurnPayload, PromptPart, Role, Turn,
};

fn turn(role: Role, text: &str, image: Option<&ImageAttachment>) -> Turn {
    let mut parts = Vec::with_capacity(2);
    if let Some(img) = image {
        parts.push(PromptPart::Image(img.clone()));
    }
    parts.push(PromptPart::Text(text.to_string()));
    Turn { role, parts }
}

/// Turn history plus a new user message into role-tagged turns.
/// The input history is left untouched; turns keep the history's order.
pub fn build(
    ctx: &ConversationContext,
    new_text: &str,
    new_image: Option<&ImageAttachment>,
) -> MultiTurnPayload {
    let mut turns: Vec<Turn> = ctx
        .history()
        .iter()
        .map(|m| turn(m.sender.into(), &m.text, m.image.as_ref()))
        .collect();
    turns.push(turn(Role::Requester, new_text, new_image));
    MultiTurnPayload { system_instruction: ctx.system_instruction.clone(), turns }
}

/// One open assistant thread about a single artifact.
///
/// The lock is held for the whole round trip, so a second message waits until
/// the previous reply (or failure) has settled.
pub struct ConversationThread {
    pub id: Uuid,
    pub feature: Feature,
    ctx: Mutex<ConversationContext>,
}

impl ConversationThread {
    pub fn open(feature: Feature, artifact: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            feature,
            ctx: Mutex::new(ConversationContext::new(prompt::follow_up_instruction(feature, artifact))),
        }
    }

    /// Send one message and return the reply. On failure nothing is appended.
    pub async fn send(
        &self,
        dispatcher: &Dispatcher,
        text: &str,
        image: Option<ImageAttachment>,
    ) -> ShopResult<String> {
        let mut ctx = self.ctx.lock().await;
        let payload = build(&ctx, text, image.as_ref());
        log::debug!("thread {} sending turn {}", self.id, payload.turns.len());
        let reply = dispatcher.dispatch_conversation(&payload).await?;
        ctx.push(Message::user(text, image));
        ctx.push(Message::ai(reply.clone()));
        Ok(reply)
    }

    pub async fn history(&self) -> Vec<Message> {
        self.ctx.lock().await.history().to_vec()
    }
}

/// Threads open right now, keyed by id. Closing a thread drops its context.
#[derive(Default)]
pub struct ConversationRegistry {
    threads: parking_lot::Mutex<HashMap<Uuid, Arc<ConversationThread>>>,
}

impl ConversationRegistry {
    pub fn open(&self, feature: Feature, artifact: &str) -> Arc<ConversationThread> {
        let thread = Arc::new(ConversationThread::open(feature, artifact));
        self.threads.lock().insert(thread.id, thread.clone());
        log::info!("opened {} thread {}", feature.as_str(), thread.id);
        thread
    }

    pub fn get(&self, id: Uuid) -> ShopResult<Arc<ConversationThread>> {
        self.threads
            .lock()
            .get(&id)
            .cloned()
            .ok_or_else(|| ShopError::Storage(format!("no open conversation {id}")))
    }

    pub fn close(&self, id: Uuid) -> bool {
        self.threads.lock().remove(&id).is_some()
    }

    pub fn open_count(&self) -> usize {
        self.threads.lock().len()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::provider::fake::ScriptedBackend;

    #[test]
    fn builds_turns_in_history_order() {
        let mut ctx = ConversationContext::new("sys");
        ctx.push(Message::user("hi", None));
        ctx.push(Message::ai("hello"));

        let payload = build(&ctx, "help", None);
        let roles: Vec<Role> = payload.turns.iter().map(|t| t.role).collect();
        assert_eq!(roles, vec![Role::Requester, Role::Assistant, Role::Requester]);
        assert_eq!(payload.turns[2].parts, vec![PromptPart::Text("help".into())]);
        assert_eq!(payload.system_instruction, "sys");
        assert_eq!(ctx.history().len(), 2);
    }

    #[test]
    fn image_part_comes_before_text() {
        let img = ImageAttachment::new("image/jpeg", vec![9u8]);
        let mut ctx = ConversationContext::new("sys");
        ctx.push(Message::user("old photo", Some(img.clone())));

        let payload = build(&ctx, "new photo", Some(&img));
        for t in &payload.turns {
            assert_eq!(t.parts[0], PromptPart::Image(img.clone()));
            assert!(matches!(t.parts[1], PromptPart::Text(_)));
        }
    }

    #[test]
    fn no_alternation_check() {
        let mut ctx = ConversationContext::new("sys");
        ctx.push(Message::ai("a"));
        ctx.push(Message::ai("b"));
        let roles: Vec<Role> = build(&ctx, "c", None).turns.iter().map(|t| t.role).collect();
        assert_eq!(roles, vec![Role::Assistant, Role::Assistant, Role::Requester]);
    }

    #[tokio::test]
    async fn thread_appends_only_on_success() {
        let backend = Arc::new(ScriptedBackend::with_replies(vec![
            Ok("Use daylight.".into()),
            Err(ShopError::GenerationFailure("down".into())),
        ]));
        let dispatcher = Dispatcher::new(backend.clone(), "m");
        let thread = ConversationThread::open(Feature::ShopAudit, "{\"overallScore\": 60}");

        assert_eq!(thread.send(&dispatcher, "how do I fix photos?", None).await.unwrap(), "Use daylight.");
        assert!(thread.send(&dispatcher, "and pricing?", None).await.is_err());

        let history = thread.history().await;
        assert_eq!(history.len(), 2);
        assert_eq!(history[0], Message::user("how do I fix photos?", None));
        assert_eq!(history[1], Message::ai("Use daylight."));

        let calls = backend.calls.lock();
        assert_eq!(calls[1].turns.len(), 3);
        assert!(calls[0].system_instruction.as_deref().unwrap().contains("overallScore"));
    }

    #[tokio::test]
    async fn concurrent_sends_on_one_thread_stay_ordered() {
        let backend = Arc::new(ScriptedBackend::with_replies(vec![Ok("one".into()), Ok("two".into())]));
        let dispatcher = Dispatcher::new(backend.clone(), "m");
        let thread = ConversationThread::open(Feature::ListingCopy, "listing");

        let (a, b) = tokio::join!(
            thread.send(&dispatcher, "first", None),
            thread.send(&dispatcher, "second", None)
        );
        assert!(a.is_ok() && b.is_ok());

        let history = thread.history().await;
        let senders: Vec<_> = history.iter().map(|m| m.sender).collect();
        use crate::wire::Sender::*;
        assert_eq!(senders, vec![User, Ai, User, Ai]);
        // the second call saw the first exchange
        assert_eq!(backend.calls.lock()[1].turns.len(), 3);
    }

    #[test]
    fn registry_tracks_open_threads() {
        let reg = ConversationRegistry::default();
        let a = reg.open(Feature::TrendScan, "trends");
        let b = reg.open(Feature::ImageReview, "photo");
        assert_eq!(reg.open_count(), 2);
        assert_eq!(reg.get(a.id).unwrap().feature, Feature::TrendScan);
        assert!(reg.close(b.id));
        assert!(!reg.close(b.id));
        assert!(reg.get(b.id).is_err());
    }
}
