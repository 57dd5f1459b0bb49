use async_trait::async_trait;
use base64::engine::general_purpose::STANDARD as B64;
use base64::Engine;
use reqwest::{Client, Url};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};
use std::time::Duration;

use super::Backend;
use crate::errors::{ShopError, ShopResult};
use crate::wire::{
    GenerateCall, ImageAttachment, OperationHandle, OperationStatus, PromptPart, ResponseMode, Role,
    Turn, VideoRequest,
};

/// Backend speaking the Generative Language REST API.
pub struct GeminiBackend {
    base: String,
    api_key: String,
    client: Client,
}

impl GeminiBackend {
    pub fn new(base: &str, api_key: String, timeout: Duration) -> ShopResult<Self> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| ShopError::Config(format!("http client: {e}")))?;
        Ok(Self { base: base.trim_end_matches('/').to_string(), api_key, client })
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.base, path.trim_start_matches('/'))
    }

    async fn read_json(&self, resp: reqwest::Response) -> ShopResult<Value> {
        let status = resp.status();
        let text = resp.text().await?;
        log::debug!("backend status {status}, {} bytes", text.len());

        if !status.is_success() {
            let message = serde_json::from_str::<ErrorEnvelope>(&text)
                .ok()
                .and_then(|e| e.error)
                .map(|e| e.message)
                .unwrap_or(text);
            return Err(ShopError::GenerationFailure(format!("backend error ({status}): {message}")));
        }

        serde_json::from_str(&text)
            .map_err(|e| ShopError::GenerationFailure(format!("unreadable backend response: {e}")))
    }
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerateBody {
    contents: Vec<Content>,
    #[serde(skip_serializing_if = "Option::is_none")]
    system_instruction: Option<Content>,
    generation_config: GenerationConfig,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: Vec<Value>,
}

#[derive(Serialize)]
struct Content {
    #[serde(skip_serializing_if = "Option::is_none")]
    role: Option<&'static str>,
    parts: Vec<Part>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Part {
    #[serde(skip_serializing_if = "Option::is_none")]
    text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    inline_data: Option<InlineData>,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct InlineData {
    mime_type: String,
    data: String,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct GenerationConfig {
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    response_mime_type: Option<&'static str>,
}

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    candidates: Vec<Candidate>,
}

#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct Candidate {
    content: Option<CandidateContent>,
    finish_reason: Option<String>,
}

#[derive(Deserialize)]
struct CandidateContent {
    #[serde(default)]
    parts: Vec<CandidatePart>,
}

#[derive(Deserialize)]
struct CandidatePart {
    text: Option<String>,
}

#[derive(Deserialize)]
struct ErrorEnvelope {
    error: Option<ErrorDetail>,
}

#[derive(Deserialize)]
struct ErrorDetail {
    #[serde(default)]
    message: String,
}

#[derive(Deserialize)]
struct Operation {
    name: String,
    #[serde(default)]
    done: bool,
    metadata: Option<Value>,
    error: Option<ErrorDetail>,
    response: Option<Value>,
}

fn wire_role(role: Role) -> &'static str {
    match role {
        Role::Requester => "user",
        Role::Assistant => "model",
    }
}

fn inline(img: &ImageAttachment) -> InlineData {
    InlineData { mime_type: img.mime_type.clone(), data: B64.encode(&img.data) }
}

fn to_content(turn: &Turn) -> Content {
    let parts = turn
        .parts
        .iter()
        .map(|p| match p {
            PromptPart::Text(t) => Part { text: Some(t.clone()), inline_data: None },
            PromptPart::Image(img) => Part { text: None, inline_data: Some(inline(img)) },
        })
        .collect();
    Content { role: Some(wire_role(turn.role)), parts }
}

fn build_body(call: &GenerateCall) -> GenerateBody {
    // The backend rejects a JSON mime constraint combined with search grounding;
    // grounded structured calls rely on the normalizer instead.
    let response_mime_type = match call.mode {
        ResponseMode::Structured if !call.use_web_signals => Some("application/json"),
        _ => None,
    };
    GenerateBody {
        contents: call.turns.iter().map(to_content).collect(),
        system_instruction: call.system_instruction.as_ref().map(|s| Content {
            role: None,
            parts: vec![Part { text: Some(s.clone()), inline_data: None }],
        }),
        generation_config: GenerationConfig { temperature: call.temperature, response_mime_type },
        tools: if call.use_web_signals { vec![json!({ "googleSearch": {} })] } else { Vec::new() },
    }
}

fn extract_text(resp: GenerateResponse) -> ShopResult<String> {
    let candidate = resp
        .candidates
        .into_iter()
        .next()
        .ok_or_else(|| ShopError::GenerationFailure("backend returned no candidates".into()))?;
    let text: String = candidate
        .content
        .map(|c| c.parts.into_iter().filter_map(|p| p.text).collect())
        .unwrap_or_default();
    if text.is_empty() {
        let reason = candidate.finish_reason.unwrap_or_else(|| "unknown".into());
        return Err(ShopError::GenerationFailure(format!("empty response (finish reason: {reason})")));
    }
    Ok(text)
}

fn to_handle(op: Operation) -> OperationHandle {
    if !op.done {
        let status = if op.metadata.is_some() { OperationStatus::Running } else { OperationStatus::Pending };
        return OperationHandle { id: op.name, status, result_ref: None, error_detail: None };
    }
    if let Some(err) = op.error {
        return OperationHandle {
            id: op.name,
            status: OperationStatus::Error,
            result_ref: None,
            error_detail: Some(err.message),
        };
    }
    let uri = op
        .response
        .as_ref()
        .and_then(|r| r.pointer("/generateVideoResponse/generatedSamples/0/video/uri"))
        .and_then(Value::as_str)
        .map(str::to_string);
    match uri {
        Some(uri) => OperationHandle {
            id: op.name,
            status: OperationStatus::Done,
            result_ref: Some(uri),
            error_detail: None,
        },
        None => {
            let filtered = op
                .response
                .as_ref()
                .and_then(|r| r.pointer("/generateVideoResponse/raiMediaFilteredReasons/0"))
                .and_then(Value::as_str)
                .map(|r| format!("video was filtered: {r}"));
            OperationHandle {
                id: op.name,
                status: OperationStatus::Error,
                result_ref: None,
                error_detail: Some(filtered.unwrap_or_else(|| "job finished without a video".into())),
            }
        }
    }
}

#[async_trait]
impl Backend for GeminiBackend {
    async fn generate(&self, call: &GenerateCall) -> ShopResult<String> {
        let url = self.url(&format!("models/{}:generateContent", call.model));
        let body = build_body(call);
        log::debug!("POST {url} ({} turns)", body.contents.len());

        let resp = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await?;
        let value = self.read_json(resp).await?;
        let parsed: GenerateResponse = serde_json::from_value(value)
            .map_err(|e| ShopError::GenerationFailure(format!("unexpected response layout: {e}")))?;
        extract_text(parsed)
    }

    async fn submit_video(&self, model: &str, req: &VideoRequest) -> ShopResult<OperationHandle> {
        let url = self.url(&format!("models/{model}:predictLongRunning"));
        let body = json!({
            "instances": [{
                "prompt": req.prompt,
                "image": {
                    "bytesBase64Encoded": B64.encode(&req.source_image.data),
                    "mimeType": req.source_image.mime_type,
                },
            }],
            "parameters": {
                "sampleCount": 1,
                "resolution": req.resolution,
                "aspectRatio": req.aspect_ratio,
            },
        });
        log::debug!("POST {url}");

        let resp = self
            .client
            .post(&url)
            .header("x-goog-api-key", &self.api_key)
            .json(&body)
            .send()
            .await?;
        let value = self.read_json(resp).await?;
        let op: Operation = serde_json::from_value(value)
            .map_err(|e| ShopError::GenerationFailure(format!("unexpected operation layout: {e}")))?;
        Ok(to_handle(op))
    }

    async fn refresh_operation(&self, handle: &OperationHandle) -> ShopResult<OperationHandle> {
        let url = self.url(&handle.id);
        let resp = self.client.get(&url).header("x-goog-api-key", &self.api_key).send().await?;
        let value = self.read_json(resp).await?;
        let op: Operation = serde_json::from_value(value)
            .map_err(|e| ShopError::GenerationFailure(format!("unexpected operation layout: {e}")))?;
        Ok(to_handle(op))
    }

    fn media_url(&self, uri: &str) -> ShopResult<String> {
        let mut url = Url::parse(uri).map_err(|e| ShopError::MalformedPayload(format!("media uri {uri:?}: {e}")))?;
        url.query_pairs_mut().append_pair("key", &self.api_key);
        Ok(url.into())
    }

    async fn fetch_media(&self, url: &str) -> ShopResult<bytes::Bytes> {
        let resp = self.client.get(url).send().await?;
        let status = resp.status();
        if !status.is_success() {
            return Err(ShopError::GenerationFailure(format!("media download failed ({status})")));
        }
        Ok(resp.bytes().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn call(mode: ResponseMode, web: bool) -> GenerateCall {
        GenerateCall {
            model: "m".into(),
            turns: vec![Turn {
                role: Role::Requester,
                parts: vec![
                    PromptPart::Image(ImageAttachment::new("image/png", vec![0u8, 1, 2])),
                    PromptPart::Text("describe".into()),
                ],
            }],
            mode,
            use_web_signals: web,
            temperature: Some(0.2),
            system_instruction: Some("be brief".into()),
        }
    }

    #[test]
    fn structured_call_requests_json() {
        let body = serde_json::to_value(build_body(&call(ResponseMode::Structured, false))).unwrap();
        assert_eq!(body["generationConfig"]["responseMimeType"], "application/json");
        assert!(body.get("tools").is_none());
        assert_eq!(body["contents"][0]["role"], "user");
        assert_eq!(body["contents"][0]["parts"][0]["inlineData"]["data"], "AAEC");
        assert_eq!(body["contents"][0]["parts"][1]["text"], "describe");
        assert_eq!(body["systemInstruction"]["parts"][0]["text"], "be brief");
    }

    #[test]
    fn grounded_call_drops_json_constraint() {
        let body = serde_json::to_value(build_body(&call(ResponseMode::Structured, true))).unwrap();
        assert!(body["generationConfig"].get("responseMimeType").is_none());
        assert_eq!(body["tools"][0], json!({ "googleSearch": {} }));
    }

    #[test]
    fn candidate_text_parts_are_joined() {
        let resp: GenerateResponse = serde_json::from_value(json!({
            "candidates": [{ "content": { "parts": [{ "text": "{\"a\":" }, { "text": "1}" }] } }]
        }))
        .unwrap();
        assert_eq!(extract_text(resp).unwrap(), "{\"a\":1}");
    }

    #[test]
    fn empty_candidate_is_generation_failure() {
        let resp: GenerateResponse =
            serde_json::from_value(json!({ "candidates": [{ "finishReason": "SAFETY" }] })).unwrap();
        let err = extract_text(resp).unwrap_err();
        assert!(err.to_string().contains("SAFETY"));
    }

    #[test]
    fn operation_states_map_to_handle() {
        let pending: Operation = serde_json::from_value(json!({ "name": "operations/1" })).unwrap();
        assert_eq!(to_handle(pending).status, OperationStatus::Pending);

        let running: Operation =
            serde_json::from_value(json!({ "name": "operations/1", "metadata": {} })).unwrap();
        assert_eq!(to_handle(running).status, OperationStatus::Running);

        let done: Operation = serde_json::from_value(json!({
            "name": "operations/1", "done": true,
            "response": { "generateVideoResponse": { "generatedSamples": [{ "video": { "uri": "https://x/v.mp4" } }] } }
        }))
        .unwrap();
        let h = to_handle(done);
        assert_eq!(h.status, OperationStatus::Done);
        assert_eq!(h.result_ref.as_deref(), Some("https://x/v.mp4"));

        let failed: Operation = serde_json::from_value(json!({
            "name": "operations/1", "done": true, "error": { "code": 3, "message": "bad image" }
        }))
        .unwrap();
        let h = to_handle(failed);
        assert_eq!(h.status, OperationStatus::Error);
        assert_eq!(h.error_detail.as_deref(), Some("bad image"));
    }

    #[test]
    fn media_url_appends_key() {
        let b = GeminiBackend::new("https://api.test/v1beta/", "k3y".into(), Duration::from_secs(5)).unwrap();
        assert_eq!(b.media_url("https://files.test/v.mp4?alt=media").unwrap(), "https://files.test/v.mp4?alt=media&key=k3y");
        assert_eq!(b.url("/models/x"), "https://api.test/v1beta/models/x");
    }
}
