use serde::de::DeserializeOwned;
use serde::{Deserialize, Serialize};
use std::collections::BTreeSet;

use crate::errors::{ShopError, ShopResult};
use crate::normalize;

/// ========================================
/// Per-feature result shapes
/// ========================================
///
/// Field names and enum spellings here must match the shape descriptions
/// embedded by `prompt`.

pub const LISTING_TAG_COUNT: usize = 13;
pub const LISTING_TITLE_MAX: usize = 140;
pub const TREND_MIN: usize = 3;
pub const TREND_MAX: usize = 10;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    High,
    Medium,
    Low,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AuditCategory {
    Seo,
    Photos,
    Pricing,
    Branding,
    Policies,
    Listings,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct AuditFinding {
    pub category: AuditCategory,
    pub severity: Severity,
    pub title: String,
    pub detail: String,
    pub recommendation: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ShopAudit {
    pub overall_score: u8,
    pub summary: String,
    pub findings: Vec<AuditFinding>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ListingCopy {
    pub title: String,
    pub description: String,
    pub tags: Vec<String>,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TrendDirection {
    Rising,
    Stable,
    Declining,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Competition {
    Low,
    Medium,
    High,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TrendEntry {
    pub keyword: String,
    pub trend: TrendDirection,
    pub demand_score: u8,
    pub competition: Competition,
    pub insight: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Competitor {
    pub name: String,
    pub price_range: String,
    pub strengths: Vec<String>,
    pub weaknesses: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CompetitorScan {
    pub competitors: Vec<Competitor>,
    pub opportunities: Vec<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageReview {
    pub score: u8,
    pub alt_text: String,
    pub issues: Vec<String>,
    pub suggestions: Vec<String>,
}

/// Structural rules beyond what serde enforces (ranges, cardinality).
pub trait Validate {
    const FEATURE: &'static str;
    fn validate(&self) -> Result<(), String>;
}

fn check_score(name: &str, v: u8) -> Result<(), String> {
    if v > 100 {
        return Err(format!("{name} must be 0-100, got {v}"));
    }
    Ok(())
}

impl Validate for ShopAudit {
    const FEATURE: &'static str = "shop audit";
    fn validate(&self) -> Result<(), String> {
        check_score("overallScore", self.overall_score)?;
        if self.findings.is_empty() {
            return Err("findings must not be empty".into());
        }
        Ok(())
    }
}

impl Validate for ListingCopy {
    const FEATURE: &'static str = "listing copy";
    fn validate(&self) -> Result<(), String> {
        if self.title.trim().is_empty() {
            return Err("title must not be empty".into());
        }
        if self.title.chars().count() > LISTING_TITLE_MAX {
            return Err(format!("title longer than {LISTING_TITLE_MAX} characters"));
        }
        if self.tags.len() != LISTING_TAG_COUNT {
            return Err(format!("expected {LISTING_TAG_COUNT} tags, got {}", self.tags.len()));
        }
        Ok(())
    }
}

impl Validate for Vec<TrendEntry> {
    const FEATURE: &'static str = "trend scan";
    fn validate(&self) -> Result<(), String> {
        if !(TREND_MIN..=TREND_MAX).contains(&self.len()) {
            return Err(format!("expected {TREND_MIN}-{TREND_MAX} trends, got {}", self.len()));
        }
        for t in self {
            check_score("demandScore", t.demand_score)?;
        }
        Ok(())
    }
}

impl Validate for CompetitorScan {
    const FEATURE: &'static str = "competitor scan";
    fn validate(&self) -> Result<(), String> {
        if self.competitors.is_empty() {
            return Err("competitors must not be empty".into());
        }
        Ok(())
    }
}

impl Validate for ImageReview {
    const FEATURE: &'static str = "image review";
    fn validate(&self) -> Result<(), String> {
        check_score("score", self.score)
    }
}

/// Normalize raw model text and validate it as `T`.
pub fn extract<T: Validate + DeserializeOwned>(raw: &str) -> ShopResult<T> {
    let parsed: T = normalize::parse_as(raw, T::FEATURE)?;
    parsed.validate().map_err(|detail| ShopError::InvalidResponseShape { feature: T::FEATURE, detail })?;
    Ok(parsed)
}

/// One tagged result per feature; this is what gets persisted as a report payload.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum FeatureResult {
    ShopAudit(ShopAudit),
    ListingCopy(ListingCopy),
    TrendScan(Vec<TrendEntry>),
    CompetitorScan(CompetitorScan),
    ImageReview(ImageReview),
}

impl FeatureResult {
    pub fn kind(&self) -> &'static str {
        match self {
            FeatureResult::ShopAudit(_) => "shop_audit",
            FeatureResult::ListingCopy(_) => "listing_copy",
            FeatureResult::TrendScan(_) => "trend_scan",
            FeatureResult::CompetitorScan(_) => "competitor_scan",
            FeatureResult::ImageReview(_) => "image_review",
        }
    }

    /// Headline score for report lists, where the feature has one.
    pub fn score(&self) -> Option<u8> {
        match self {
            FeatureResult::ShopAudit(a) => Some(a.overall_score),
            FeatureResult::ImageReview(r) => Some(r.score),
            FeatureResult::TrendScan(ts) if !ts.is_empty() => {
                let sum: u32 = ts.iter().map(|t| t.demand_score as u32).sum();
                Some((sum / ts.len() as u32) as u8)
            }
            _ => None,
        }
    }

    pub fn tags(&self) -> Vec<String> {
        match self {
            FeatureResult::ListingCopy(l) => l.tags.clone(),
            FeatureResult::TrendScan(ts) => ts.iter().map(|t| t.keyword.clone()).collect(),
            FeatureResult::ShopAudit(a) => {
                let cats: BTreeSet<AuditCategory> = a.findings.iter().map(|f| f.category).collect();
                // serde's spelling, so tags match the payload
                cats.into_iter()
                    .filter_map(|c| serde_json::to_value(c).ok()?.as_str().map(str::to_string))
                    .collect()
            }
            _ => Vec::new(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn tags_json(n: usize) -> String {
        let tags: Vec<String> = (0..n).map(|i| format!("\"tag{i}\"")).collect();
        format!("[{}]", tags.join(","))
    }

    #[test]
    fn audit_parses_from_chatty_output() {
        let raw = r#"Here is your audit:
```json
{"overallScore": 72, "summary": "Solid shop",
 "findings": [{"category": "photos", "severity": "high", "title": "Dark photos",
   "detail": "Most thumbnails are underexposed", "recommendation": "Use daylight"}]}
```
Let me know if you need more."#;
        let audit: ShopAudit = extract(raw).unwrap();
        assert_eq!(audit.overall_score, 72);
        assert_eq!(audit.findings[0].category, AuditCategory::Photos);
        assert_eq!(audit.findings[0].severity, Severity::High);
    }

    #[test]
    fn audit_tags_list_each_category_once() {
        let finding = |cat: &str| {
            format!(
                r#"{{"category": "{cat}", "severity": "high", "title": "t", "detail": "d", "recommendation": "r"}}"#
            )
        };
        let raw = format!(
            r#"{{"overallScore": 40, "summary": "s", "findings": [{}, {}, {}]}}"#,
            finding("seo"),
            finding("photos"),
            finding("seo")
        );
        let audit: ShopAudit = extract(&raw).unwrap();
        assert_eq!(FeatureResult::ShopAudit(audit).tags(), vec!["seo", "photos"]);
    }

    #[test]
    fn unknown_enum_value_is_invalid_shape() {
        let raw = r#"{"overallScore": 50, "summary": "x", "findings": [{"category": "shipping",
            "severity": "high", "title": "t", "detail": "d", "recommendation": "r"}]}"#;
        let err = extract::<ShopAudit>(raw).unwrap_err();
        assert!(matches!(err, ShopError::InvalidResponseShape { feature: "shop audit", .. }));
    }

    #[test]
    fn listing_requires_exact_tag_count() {
        let good = format!(r#"{{"title": "Mug", "description": "d", "tags": {}}}"#, tags_json(13));
        assert!(extract::<ListingCopy>(&good).is_ok());

        let short = format!(r#"{{"title": "Mug", "description": "d", "tags": {}}}"#, tags_json(5));
        let err = extract::<ListingCopy>(&short).unwrap_err();
        match err {
            ShopError::InvalidResponseShape { detail, .. } => assert!(detail.contains("13")),
            other => panic!("unexpected error {other:?}"),
        }
    }

    #[test]
    fn trend_scan_is_array_rooted() {
        let raw = r#"Trends: [
 {"keyword": "linen aprons", "trend": "rising", "demandScore": 80, "competition": "low", "insight": "a"},
 {"keyword": "mugs", "trend": "stable", "demandScore": 60, "competition": "high", "insight": "b"},
 {"keyword": "candles", "trend": "declining", "demandScore": 40, "competition": "medium", "insight": "c"}
] hope this helps"#;
        let trends: Vec<TrendEntry> = extract(raw).unwrap();
        assert_eq!(trends.len(), 3);
        let result = FeatureResult::TrendScan(trends);
        assert_eq!(result.score(), Some(60));
        assert_eq!(result.tags()[0], "linen aprons");
    }

    #[test]
    fn score_out_of_range_is_rejected() {
        let raw = r#"{"score": 140, "altText": "a", "issues": [], "suggestions": []}"#;
        assert!(matches!(
            extract::<ImageReview>(raw),
            Err(ShopError::InvalidResponseShape { .. })
        ));
    }

    #[test]
    fn tagged_result_round_trips_kind() {
        let review = ImageReview { score: 90, alt_text: "mug".into(), issues: vec![], suggestions: vec![] };
        let json = serde_json::to_value(FeatureResult::ImageReview(review)).unwrap();
        assert_eq!(json["type"], "image_review");
        assert_eq!(json["data"]["altText"], "mug");
    }
}
