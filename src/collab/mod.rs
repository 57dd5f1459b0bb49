//! Interfaces to the systems around the orchestration layer: who is signed in,
//! where a top-up redirect goes, and where finished reports are kept.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use fs_err as fs;
use reqwest::Url;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::sync::watch;
use uuid::Uuid;

use crate::errors::{ShopError, ShopResult};
use crate::shape::FeatureResult;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Account {
    pub id: String,
    pub email: String,
}

/// Read side of the auth system.
pub trait Session: Send + Sync {
    fn current(&self) -> Option<Account>;
    fn subscribe(&self) -> watch::Receiver<Option<Account>>;
    fn sign_out(&self);
    fn sign_in_url(&self, provider: &str, return_to: &str) -> ShopResult<String>;
}

/// Session seeded once from configuration; sign-out clears it for all subscribers.
pub struct StaticSession {
    tx: watch::Sender<Option<Account>>,
    auth_base: String,
}

impl StaticSession {
    pub fn new(account: Option<Account>, auth_base: impl Into<String>) -> Self {
        let (tx, _rx) = watch::channel(account);
        Self { tx, auth_base: auth_base.into() }
    }
}

impl Session for StaticSession {
    fn current(&self) -> Option<Account> {
        self.tx.borrow().clone()
    }

    fn subscribe(&self) -> watch::Receiver<Option<Account>> {
        self.tx.subscribe()
    }

    fn sign_out(&self) {
        self.tx.send_replace(None);
    }

    fn sign_in_url(&self, provider: &str, return_to: &str) -> ShopResult<String> {
        let mut url = Url::parse(&self.auth_base)
            .map_err(|e| ShopError::Config(format!("auth url {:?}: {e}", self.auth_base)))?;
        url.query_pairs_mut().append_pair("provider", provider).append_pair("redirect_to", return_to);
        Ok(url.into())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum BillingCycle {
    Monthly,
    Yearly,
    /// One-off credit pack purchase.
    Once,
}

impl BillingCycle {
    fn as_str(self) -> &'static str {
        match self {
            BillingCycle::Monthly => "monthly",
            BillingCycle::Yearly => "yearly",
            BillingCycle::Once => "once",
        }
    }
}

#[async_trait]
pub trait Billing: Send + Sync {
    /// Returns the URL the user should be sent to. Not retried on failure.
    async fn initiate_checkout(
        &self,
        plan_or_pack: &str,
        cycle: BillingCycle,
        account: &Account,
    ) -> ShopResult<String>;
}

/// Builds a hosted-checkout link; the payment page does the rest.
pub struct LinkCheckout {
    base: String,
}

impl LinkCheckout {
    pub fn new(base: impl Into<String>) -> Self {
        Self { base: base.into() }
    }
}

#[async_trait]
impl Billing for LinkCheckout {
    async fn initiate_checkout(
        &self,
        plan_or_pack: &str,
        cycle: BillingCycle,
        account: &Account,
    ) -> ShopResult<String> {
        let mut url = Url::parse(&self.base)
            .map_err(|e| ShopError::Config(format!("checkout url {:?}: {e}", self.base)))?;
        url.query_pairs_mut()
            .append_pair("plan", plan_or_pack)
            .append_pair("cycle", cycle.as_str())
            .append_pair("email", &account.email)
            .append_pair("account", &account.id);
        log::info!("checkout link built for {} ({plan_or_pack})", account.id);
        Ok(url.into())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ReportRecord {
    pub id: Uuid,
    #[serde(rename = "type")]
    pub kind: String,
    pub title: String,
    pub date: DateTime<Utc>,
    pub score: Option<u8>,
    pub payload: FeatureResult,
    pub tags: Vec<String>,
}

impl ReportRecord {
    pub fn from_result(title: impl Into<String>, result: FeatureResult) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind: result.kind().to_string(),
            title: title.into(),
            date: Utc::now(),
            score: result.score(),
            tags: result.tags(),
            payload: result,
        }
    }
}

pub trait ReportStore: Send + Sync {
    /// False (not an error) when the record could not be kept.
    fn save(&self, record: &ReportRecord) -> bool;
}

/// One pretty-printed JSON file per report.
pub struct FileReportStore {
    dir: PathBuf,
}

impl FileReportStore {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    fn path_for(&self, record: &ReportRecord) -> PathBuf {
        self.dir.join(format!("{}-{}.json", record.kind, record.id))
    }

    fn try_save(&self, record: &ReportRecord) -> ShopResult<PathBuf> {
        fs::create_dir_all(&self.dir)?;
        let p = self.path_for(record);
        fs::write(&p, serde_json::to_string_pretty(record)?)?;
        Ok(p)
    }

    pub fn load(path: &Path) -> ShopResult<ReportRecord> {
        let raw = fs::read_to_string(path)?;
        serde_json::from_str(&raw).map_err(|e| ShopError::Storage(format!("{}: {e}", path.display())))
    }
}

impl ReportStore for FileReportStore {
    fn save(&self, record: &ReportRecord) -> bool {
        match self.try_save(record) {
            Ok(p) => {
                log::info!("report saved at {}", p.display());
                true
            }
            Err(e) => {
                log::warn!("could not save report {}: {e}", record.id);
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::shape::ImageReview;

    fn account() -> Account {
        Account { id: "acct_1".into(), email: "maker@example.com".into() }
    }

    #[test]
    fn sign_out_reaches_subscribers() {
        let session = StaticSession::new(Some(account()), "https://auth.test/authorize");
        let rx = session.subscribe();
        assert_eq!(session.current(), Some(account()));
        session.sign_out();
        assert!(rx.has_changed().unwrap());
        assert_eq!(*rx.borrow(), None);
        assert_eq!(session.current(), None);
    }

    #[test]
    fn sign_in_url_carries_provider() {
        let session = StaticSession::new(None, "https://auth.test/authorize");
        let url = session.sign_in_url("google", "https://app.test/").unwrap();
        assert!(url.starts_with("https://auth.test/authorize?provider=google&redirect_to="));
    }

    #[tokio::test]
    async fn checkout_link_encodes_account() {
        let billing = LinkCheckout::new("https://pay.test/checkout");
        let url = billing.initiate_checkout("credits_100", BillingCycle::Once, &account()).await.unwrap();
        assert_eq!(
            url,
            "https://pay.test/checkout?plan=credits_100&cycle=once&email=maker%40example.com&account=acct_1"
        );
    }

    #[test]
    fn report_round_trips_through_disk() {
        let dir = tempfile::tempdir().unwrap();
        let store = FileReportStore::new(dir.path().join("reports"));
        let review = ImageReview { score: 81, alt_text: "blue mug".into(), issues: vec![], suggestions: vec![] };
        let record = ReportRecord::from_result("Photo review: mug", FeatureResult::ImageReview(review));

        assert!(store.save(&record));
        let loaded = FileReportStore::load(&store.path_for(&record)).unwrap();
        assert_eq!(loaded, record);
        assert_eq!(loaded.kind, "image_review");
        assert_eq!(loaded.score, Some(81));
    }

    #[test]
    fn unwritable_dir_reports_false() {
        let file = tempfile::NamedTempFile::new().unwrap();
        // a regular file cannot be used as the reports directory
        let store = FileReportStore::new(file.path());
        let review = ImageReview { score: 1, alt_text: "x".into(), issues: vec![], suggestions: vec![] };
        assert!(!store.save(&ReportRecord::from_result("t", FeatureResult::ImageReview(review))));
    }
}
