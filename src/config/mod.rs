use anyhow::{Context, Result};
use fs_err as fs;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

use crate::prompt::Feature;

pub const API_KEY_VARS: [&str; 2] = ["SHOPSAGE_API_KEY", "GEMINI_API_KEY"];

/// Credits charged per costed feature. Fields missing from a config file keep
/// their default price.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct CreditCosts {
    pub shop_audit: u64,
    pub listing_copy: u64,
    pub trend_scan: u64,
    pub competitor_scan: u64,
    pub image_review: u64,
    pub video: u64,
}

impl Default for CreditCosts {
    fn default() -> Self {
        Self { shop_audit: 5, listing_copy: 1, trend_scan: 3, competitor_scan: 3, image_review: 1, video: 20 }
    }
}

impl CreditCosts {
    pub fn of(&self, feature: Feature) -> u64 {
        match feature {
            Feature::ShopAudit => self.shop_audit,
            Feature::ListingCopy => self.listing_copy,
            Feature::TrendScan => self.trend_scan,
            Feature::CompetitorScan => self.competitor_scan,
            Feature::ImageReview => self.image_review,
            Feature::Video => self.video,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    pub schema_version: String,
    pub api_base: String,
    #[serde(skip_serializing)]
    pub api_key: Option<String>,
    pub text_model: String,
    pub video_model: String,
    pub timeout_secs: u64,
    pub poll_interval_secs: u64,
    pub poll_max_attempts: u32,
    pub video_resolution: String,
    pub video_aspect_ratio: String,
    pub credit_costs: CreditCosts,
    pub starting_balance: u64,
    pub ledger_path: String,
    pub reports_dir: String,
    pub checkout_url: String,
    pub auth_url: String,
    /// Where the auth flow lands after sign-in.
    pub app_url: String,
    pub account_id: Option<String>,
    pub account_email: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            schema_version: "2025-06-01".into(),
            api_base: "https://generativelanguage.googleapis.com/v1beta".into(),
            api_key: None,
            text_model: "gemini-2.5-flash".into(),
            video_model: "veo-3.0-fast-generate-001".into(),
            timeout_secs: 120,
            poll_interval_secs: 5,
            // 5s * 120 = ten minutes of waiting before giving up.
            poll_max_attempts: 120,
            video_resolution: "720p".into(),
            video_aspect_ratio: "16:9".into(),
            credit_costs: CreditCosts::default(),
            starting_balance: 10,
            ledger_path: ".shopsage/ledger.json".into(),
            reports_dir: ".shopsage/reports".into(),
            checkout_url: "https://shopsage.app/checkout".into(),
            auth_url: "https://shopsage.app/auth/authorize".into(),
            app_url: "https://shopsage.app/".into(),
            account_id: None,
            account_email: None,
        }
    }
}

impl Config {
    /// Defaults, overlaid by the TOML file (if any), then by the API key env vars.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let mut cfg = match path {
            Some(p) => {
                let raw = fs::read_to_string(p)?;
                toml::from_str::<Config>(&raw)
                    .with_context(|| format!("invalid config file {}", p.display()))?
            }
            None => Config::default(),
        };
        if cfg.api_key.is_none() {
            cfg.api_key = API_KEY_VARS.iter().find_map(|v| std::env::var(v).ok()).filter(|k| !k.is_empty());
        }
        Ok(cfg)
    }

    pub fn cost_of(&self, feature: Feature) -> u64 {
        self.credit_costs.of(feature)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    pub fn poll_interval(&self) -> Duration {
        Duration::from_secs(self.poll_interval_secs)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn defaults_match_reference_polling() {
        let cfg = Config::default();
        assert_eq!(cfg.poll_interval(), Duration::from_secs(5));
        assert!(cfg.poll_max_attempts > 0);
        assert_eq!(cfg.cost_of(Feature::Video), 20);
    }

    #[test]
    fn toml_overrides_only_given_fields() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            r#"
api_key = "from-file"
poll_interval_secs = 2

[credit_costs]
shop_audit = 9
"#
        )
        .unwrap();
        let cfg = Config::load(Some(file.path())).unwrap();
        assert_eq!(cfg.api_key.as_deref(), Some("from-file"));
        assert_eq!(cfg.poll_interval_secs, 2);
        assert_eq!(cfg.cost_of(Feature::ShopAudit), 9);
        // prices the file leaves out keep their defaults
        assert_eq!(cfg.cost_of(Feature::Video), 20);
        assert_eq!(cfg.cost_of(Feature::TrendScan), 3);
        assert_eq!(cfg.text_model, Config::default().text_model);
    }

    #[test]
    fn empty_cost_table_keeps_every_default() {
        let cfg: Config = toml::from_str("[credit_costs]\n").unwrap();
        assert_eq!(cfg.credit_costs, CreditCosts::default());
        assert!([
            Feature::ShopAudit,
            Feature::ListingCopy,
            Feature::TrendScan,
            Feature::CompetitorScan,
            Feature::ImageReview,
            Feature::Video,
        ]
        .into_iter()
        .all(|f| cfg.cost_of(f) > 0));
    }

    #[test]
    fn api_key_is_never_serialized() {
        let cfg = Config { api_key: Some("secret".into()), ..Config::default() };
        let out = toml::to_string(&cfg).unwrap();
        assert!(!out.contains("secret"));
    }
}
