use bytes::Bytes;
use serde::{Deserialize, Serialize};

/// ========================================
/// Orchestration data model
/// ========================================

/// Raw image bytes plus their MIME type. Encoded to base64 only when sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageAttachment {
    pub mime_type: String,
    pub data: Bytes,
}

impl ImageAttachment {
    pub fn new(mime_type: impl Into<String>, data: impl Into<Bytes>) -> Self {
        Self { mime_type: mime_type.into(), data: data.into() }
    }

    /// Guess the MIME type from a file extension; unknown extensions fall back to PNG.
    pub fn mime_for_path(path: &std::path::Path) -> &'static str {
        match path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.to_ascii_lowercase())
            .as_deref()
        {
            Some("jpg") | Some("jpeg") => "image/jpeg",
            Some("webp") => "image/webp",
            Some("gif") => "image/gif",
            Some("heic") => "image/heic",
            _ => "image/png",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Sender {
    User,
    Ai,
}

/// One entry of a conversation. Never mutated once appended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Message {
    pub sender: Sender,
    pub text: String,
    pub image: Option<ImageAttachment>,
}

impl Message {
    pub fn user(text: impl Into<String>, image: Option<ImageAttachment>) -> Self {
        Self { sender: Sender::User, text: text.into(), image }
    }

    pub fn ai(text: impl Into<String>) -> Self {
        Self { sender: Sender::Ai, text: text.into(), image: None }
    }
}

#[derive(Debug, Clone, Default)]
pub struct ConversationContext {
    pub system_instruction: String,
    history: Vec<Message>,
}

impl ConversationContext {
    pub fn new(system_instruction: impl Into<String>) -> Self {
        Self { system_instruction: system_instruction.into(), history: Vec::new() }
    }

    pub fn history(&self) -> &[Message] {
        &self.history
    }

    pub fn push(&mut self, msg: Message) {
        self.history.push(msg);
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum PromptPart {
    Text(String),
    Image(ImageAttachment),
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum ShapeHint {
    Object,
    Array,
    FreeText,
}

#[derive(Debug, Clone, Default, PartialEq)]
pub struct GenerationOptions {
    pub use_web_signals: bool,
    pub temperature: Option<f32>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct GenerationRequest {
    pub prompt_parts: Vec<PromptPart>,
    pub expected_shape: ShapeHint,
    pub options: GenerationOptions,
}

impl GenerationRequest {
    pub fn image_count(&self) -> usize {
        self.prompt_parts.iter().filter(|p| matches!(p, PromptPart::Image(_))).count()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    /// The human side of the exchange.
    Requester,
    /// The model side of the exchange.
    Assistant,
}

impl From<Sender> for Role {
    fn from(s: Sender) -> Self {
        match s {
            Sender::User => Role::Requester,
            Sender::Ai => Role::Assistant,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct Turn {
    pub role: Role,
    pub parts: Vec<PromptPart>,
}

/// A built conversation ready for dispatch.
#[derive(Debug, Clone, PartialEq)]
pub struct MultiTurnPayload {
    pub system_instruction: String,
    pub turns: Vec<Turn>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ResponseMode {
    Text,
    Structured,
}

/// Backend-neutral body of one generation call.
#[derive(Debug, Clone, PartialEq)]
pub struct GenerateCall {
    pub model: String,
    pub turns: Vec<Turn>,
    pub mode: ResponseMode,
    pub use_web_signals: bool,
    pub temperature: Option<f32>,
    pub system_instruction: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct VideoRequest {
    pub prompt: String,
    pub source_image: ImageAttachment,
    pub resolution: String,
    pub aspect_ratio: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationStatus {
    Pending,
    Running,
    Done,
    Error,
}

impl OperationStatus {
    pub fn is_terminal(self) -> bool {
        matches!(self, OperationStatus::Done | OperationStatus::Error)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct OperationHandle {
    pub id: String,
    pub status: OperationStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result_ref: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error_detail: Option<String>,
}

/// A finished video: the backend URI and the URL that can actually be fetched.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MediaReference {
    pub uri: String,
    pub fetch_url: String,
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::Path;

    #[test]
    fn sender_maps_to_role() {
        assert_eq!(Role::from(Sender::User), Role::Requester);
        assert_eq!(Role::from(Sender::Ai), Role::Assistant);
    }

    #[test]
    fn terminal_statuses() {
        assert!(!OperationStatus::Pending.is_terminal());
        assert!(!OperationStatus::Running.is_terminal());
        assert!(OperationStatus::Done.is_terminal());
        assert!(OperationStatus::Error.is_terminal());
    }

    #[test]
    fn mime_guess_from_extension() {
        assert_eq!(ImageAttachment::mime_for_path(Path::new("a/shot.JPG")), "image/jpeg");
        assert_eq!(ImageAttachment::mime_for_path(Path::new("b.webp")), "image/webp");
        assert_eq!(ImageAttachment::mime_for_path(Path::new("noext")), "image/png");
    }
}
