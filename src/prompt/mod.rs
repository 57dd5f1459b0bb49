use serde::{Deserialize, Serialize};

use crate::wire::{GenerationOptions, GenerationRequest, ImageAttachment, PromptPart, ShapeHint};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Feature {
    ShopAudit,
    ListingCopy,
    TrendScan,
    CompetitorScan,
    ImageReview,
    Video,
}

impl Feature {
    pub fn as_str(self) -> &'static str {
        match self {
            Feature::ShopAudit => "shop_audit",
            Feature::ListingCopy => "listing_copy",
            Feature::TrendScan => "trend_scan",
            Feature::CompetitorScan => "competitor_scan",
            Feature::ImageReview => "image_review",
            Feature::Video => "video",
        }
    }

    /// Trend and competitor data goes stale quickly; those features ask for live web results.
    pub fn wants_web_signals(self) -> bool {
        matches!(self, Feature::TrendScan | Feature::CompetitorScan)
    }

    fn temperature(self) -> f32 {
        match self {
            Feature::ListingCopy | Feature::Video => 0.8,
            Feature::TrendScan | Feature::CompetitorScan => 0.4,
            Feature::ShopAudit | Feature::ImageReview => 0.2,
        }
    }
}

/// What the user typed on each feature screen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum FeatureInput {
    ShopAudit { shop_url: String, notes: Option<String> },
    ListingCopy { product: String, keywords: Vec<String>, tone: String },
    TrendScan { niche: String, region: String },
    CompetitorScan { shop_name: String, niche: String },
    ImageReview { product: String },
}

impl FeatureInput {
    pub fn feature(&self) -> Feature {
        match self {
            FeatureInput::ShopAudit { .. } => Feature::ShopAudit,
            FeatureInput::ListingCopy { .. } => Feature::ListingCopy,
            FeatureInput::TrendScan { .. } => Feature::TrendScan,
            FeatureInput::CompetitorScan { .. } => Feature::CompetitorScan,
            FeatureInput::ImageReview { .. } => Feature::ImageReview,
        }
    }

    /// Short human label used as the report title.
    pub fn title(&self) -> String {
        match self {
            FeatureInput::ShopAudit { shop_url, .. } => format!("Shop audit: {shop_url}"),
            FeatureInput::ListingCopy { product, .. } => format!("Listing: {product}"),
            FeatureInput::TrendScan { niche, region } => format!("Trends: {niche} ({region})"),
            FeatureInput::CompetitorScan { shop_name, niche } => {
                format!("Competitors of {shop_name} in {niche}")
            }
            FeatureInput::ImageReview { product } => format!("Photo review: {product}"),
        }
    }
}

fn audit_shape() -> &'static str {
r#"{
  "overallScore": <integer 0-100>,
  "summary": "<two or three sentences>",
  "findings": [
    {
      "category": "seo" | "photos" | "pricing" | "branding" | "policies" | "listings",
      "severity": "high" | "medium" | "low",
      "title": "<short headline>",
      "detail": "<what is wrong and where>",
      "recommendation": "<one concrete fix>"
    }
  ]
}
- "findings" has at least 1 and at most 12 entries, highest severity first."#
}

fn listing_shape() -> &'static str {
r#"{
  "title": "<listing title, at most 140 characters>",
  "description": "<full listing description, plain text, paragraphs separated by \n>",
  "tags": ["<tag>", ...]
}
- "tags" has EXACTLY 13 entries, each at most 20 characters, no duplicates."#
}

fn trend_shape() -> &'static str {
r#"[
  {
    "keyword": "<search phrase buyers use>",
    "trend": "rising" | "stable" | "declining",
    "demandScore": <integer 0-100>,
    "competition": "low" | "medium" | "high",
    "insight": "<one sentence on why this matters now>"
  }
]
- The array has between 3 and 10 entries."#
}

fn competitor_shape() -> &'static str {
r#"{
  "competitors": [
    {
      "name": "<shop name>",
      "priceRange": "<e.g. $12-$40>",
      "strengths": ["<strength>", ...],
      "weaknesses": ["<weakness>", ...]
    }
  ],
  "opportunities": ["<gap the user can exploit>", ...]
}
- "competitors" has between 1 and 5 entries."#
}

fn image_review_shape() -> &'static str {
r#"{
  "score": <integer 0-100>,
  "altText": "<accessible description of the photo, at most 125 characters>",
  "issues": ["<problem with lighting, framing, background, ...>", ...],
  "suggestions": ["<concrete improvement>", ...]
}"#
}

fn output_rules(shape: &str) -> String {
    format!(
r#"Output format (MANDATORY):
Return EXACTLY ONE JSON value and nothing else, matching this shape. Field names and
the quoted enumerated values must be used verbatim.

{shape}"#
    )
}

fn task_text(input: &FeatureInput) -> String {
    match input {
        FeatureInput::ShopAudit { shop_url, notes } => format!(
r#"You are an experienced e-commerce consultant for handmade and vintage marketplaces.
Audit the shop at {shop_url}. Judge search optimisation, photography, pricing,
branding, shop policies and listing quality the way a demanding buyer would.
{notes}"#,
            notes = notes
                .as_deref()
                .map(|n| format!("Seller notes: {n}"))
                .unwrap_or_default()
        ),
        FeatureInput::ListingCopy { product, keywords, tone } => format!(
r#"You are a marketplace copywriter. Write listing copy for: {product}.
Tone: {tone}.
Work these keywords in naturally: {keywords}.
Front-load the most searched phrase in the title."#,
            keywords = if keywords.is_empty() { "(none given)".to_string() } else { keywords.join(", ") }
        ),
        FeatureInput::TrendScan { niche, region } => format!(
r#"You are a market analyst. Using current search and marketplace signals, list the
search phrases gaining or losing demand in the "{niche}" niche for buyers in {region}.
Prefer specific long-tail phrases over generic ones."#
        ),
        FeatureInput::CompetitorScan { shop_name, niche } => format!(
r#"You are a competitive analyst. Find the strongest current competitors of the shop
"{shop_name}" in the "{niche}" niche and compare them honestly."#
        ),
        FeatureInput::ImageReview { product } => format!(
r#"You are a product photographer reviewing a marketplace listing photo of: {product}.
Judge the attached image only."#
        ),
    }
}

fn shape_for(feature: Feature) -> (&'static str, ShapeHint) {
    match feature {
        Feature::ShopAudit => (audit_shape(), ShapeHint::Object),
        Feature::ListingCopy => (listing_shape(), ShapeHint::Object),
        Feature::TrendScan => (trend_shape(), ShapeHint::Array),
        Feature::CompetitorScan => (competitor_shape(), ShapeHint::Object),
        Feature::ImageReview => (image_review_shape(), ShapeHint::Object),
        Feature::Video => ("", ShapeHint::FreeText),
    }
}

/// Build the full request for one feature. The image, when given, goes first.
pub fn compose(input: &FeatureInput, image: Option<ImageAttachment>) -> GenerationRequest {
    let feature = input.feature();
    let (shape, hint) = shape_for(feature);

    let mut parts = Vec::with_capacity(2);
    if let Some(img) = image {
        parts.push(PromptPart::Image(img));
    }
    parts.push(PromptPart::Text(format!("{}\n\n{}", task_text(input), output_rules(shape))));

    GenerationRequest {
        prompt_parts: parts,
        expected_shape: hint,
        options: GenerationOptions {
            use_web_signals: feature.wants_web_signals(),
            temperature: Some(feature.temperature()),
        },
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, clap::ValueEnum)]
pub enum VideoStyle {
    Showcase,
    Lifestyle,
    Unboxing,
}

/// Prompt for the product video job; the source image is sent alongside it.
pub fn compose_video(product: &str, style: VideoStyle) -> String {
    let direction = match style {
        VideoStyle::Showcase => "slow 360-degree orbit around the product on a clean studio backdrop, soft key light",
        VideoStyle::Lifestyle => "the product in use in a warm, natural home setting, gentle handheld camera",
        VideoStyle::Unboxing => "hands opening a gift box to reveal the product, close-up, shallow depth of field",
    };
    format!(
        "Create a short product video of {product}. Shot: {direction}. \
Keep the product's shape, colours and details faithful to the reference image. No text overlays."
    )
}

/// System instruction for follow-up chat about a finished result.
pub fn follow_up_instruction(feature: Feature, artifact: &str) -> String {
    let role = match feature {
        Feature::ShopAudit => "the consultant who wrote this shop audit",
        Feature::ListingCopy => "the copywriter who wrote this listing",
        Feature::TrendScan => "the analyst who produced this trend scan",
        Feature::CompetitorScan => "the analyst who produced this competitor comparison",
        Feature::ImageReview => "the photographer who reviewed this product photo",
        Feature::Video => "the director who planned this product video",
    };
    format!(
r#"You are {role}. Answer the seller's follow-up questions about it in plain, friendly
prose. Be specific and practical; do not repeat the whole result back.

The result under discussion:
{artifact}"#
    )
}
