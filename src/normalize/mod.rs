use regex::Regex;
use serde::de::DeserializeOwned;
use serde_json::Value;
use std::sync::OnceLock;

use crate::errors::{ShopError, ShopResult};

fn opening_fence() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^```[A-Za-z0-9_+\-]*[ \t]*(?:\r?\n|$)").expect("static fence pattern"))
}

fn closing_fence() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"(?:\r?\n)?[ \t]*```$").expect("static fence pattern"))
}

/// Remove a leading fence (with or without a language tag), a trailing fence
/// and surrounding whitespace. Backticks inside the payload are kept.
pub fn strip_fences(raw: &str) -> String {
    let text = raw.trim();
    let text = opening_fence().replace(text, "");
    closing_fence().replace(&text, "").trim().to_string()
}

/// Extract the structured payload from free-form model text.
///
/// The root is whichever of `{` / `[` appears first; the slice runs to the
/// LAST matching closer in the text, so trailing prose is dropped but a stray
/// closer inside a later string value will be included. Text with no opener
/// (or no closer after it) comes back fence-stripped and otherwise unchanged.
pub fn normalize(raw: &str) -> String {
    let text = strip_fences(raw);
    let first_obj = text.find('{');
    let first_arr = text.find('[');

    let (open_at, closer) = match (first_obj, first_arr) {
        (Some(o), Some(a)) if a < o => (a, ']'),
        (Some(o), _) => (o, '}'),
        (None, Some(a)) => (a, ']'),
        (None, None) => return text,
    };

    match text.rfind(closer) {
        Some(close_at) if close_at > open_at => text[open_at..=close_at].to_string(),
        _ => text,
    }
}

/// Normalize then parse into a generic JSON value.
pub fn parse_value(raw: &str) -> ShopResult<Value> {
    let candidate = normalize(raw);
    serde_json::from_str(&candidate).map_err(|e| {
        log::debug!("normalized payload failed to parse: {e}");
        ShopError::MalformedPayload(format!("{e} (payload starts with {:?})", preview(&candidate)))
    })
}

/// Normalize, parse, then check the value against `T`.
///
/// Unparseable text is `MalformedPayload`; valid JSON of the wrong shape is
/// `InvalidResponseShape`.
pub fn parse_as<T: DeserializeOwned>(raw: &str, feature: &'static str) -> ShopResult<T> {
    let value = parse_value(raw)?;
    serde_json::from_value(value).map_err(|e| ShopError::InvalidResponseShape {
        feature,
        detail: e.to_string(),
    })
}

fn preview(s: &str) -> String {
    s.chars().take(60).collect()
}
