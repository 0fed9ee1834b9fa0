//! Adapter traits for inventory, metrics and cost data, and the two
//! implementations shipped with ecotrace.
//!
//! - [`FileSource`] reads JSON documents exported from the cloud provider
//! - [`DemoSource`] generates a reproducible synthetic week of traffic
//!
//! Adapters receive a caller-owned [`Session`] on every call; nothing here
//! caches credentials.

use std::collections::{BTreeMap, HashSet};
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Duration, NaiveDate, Timelike, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tracing::{debug, trace};

use crate::error::{ImpactError, Result};
use crate::inventory::{Account, AccountResource, ModelDeployment};
use crate::models::{CostRecord, DEFAULT_CURRENCY, MetricName};

/// Scope of one reporting run.
///
/// Owned by the caller and passed explicitly to every adapter call.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Session {
    /// Subscription the run is scoped to
    pub subscription_id: String,
}

impl Session {
    pub fn new(subscription_id: impl Into<String>) -> Self {
        Self {
            subscription_id: subscription_id.into(),
        }
    }
}

/// Half-open time range `[start, end)`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct TimeWindow {
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
}

impl TimeWindow {
    /// The `days` days ending at `end`.
    pub fn last_days(days: u32, end: DateTime<Utc>) -> Self {
        Self {
            start: end - Duration::days(i64::from(days)),
            end,
        }
    }

    pub fn contains(&self, instant: DateTime<Utc>) -> bool {
        instant >= self.start && instant < self.end
    }

    pub fn contains_day(&self, day: NaiveDate) -> bool {
        day >= self.start.date_naive() && day <= self.end.date_naive()
    }
}

/// Which accounts discovery should consider.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct DiscoveryScope {
    /// Restrict to one resource group; `None` scans the whole subscription
    pub resource_group: Option<String>,
}

/// One metrics request: a single deployment (or whole account) over a window.
#[derive(Debug, Clone, PartialEq)]
pub struct MetricsQuery {
    /// Account resource id
    pub resource_id: String,

    /// Deployment name filter; `None` for the whole account
    pub deployment: Option<String>,

    pub window: TimeWindow,

    /// Sample interval, hourly by default
    pub interval: Duration,

    /// Metric names to fetch
    pub metrics: Vec<String>,
}

/// One metric sample as returned by a metrics source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricSample {
    pub timestamp: DateTime<Utc>,
    pub resource_id: String,

    /// Deployment the sample belongs to, when the source reports it
    #[serde(default)]
    pub deployment: Option<String>,

    pub metric: MetricName,
    pub value: f64,
}

/// One cost request.
#[derive(Debug, Clone, PartialEq)]
pub struct CostQuery {
    pub resource_ids: Vec<String>,
    pub window: TimeWindow,
}

/// Lists accounts and their deployments.
#[async_trait]
pub trait InventorySource: Send + Sync {
    /// List candidate account resources in scope. Filtering by kind happens
    /// in the pipeline.
    async fn list_accounts(
        &self,
        session: &Session,
        scope: &DiscoveryScope,
    ) -> Result<Vec<AccountResource>>;

    /// List model deployments of one account.
    async fn list_deployments(
        &self,
        session: &Session,
        account: &Account,
    ) -> Result<Vec<ModelDeployment>>;
}

/// Fetches hourly usage metrics.
#[async_trait]
pub trait MetricsSource: Send + Sync {
    async fn fetch_metrics(&self, session: &Session, query: &MetricsQuery)
    -> Result<Vec<MetricSample>>;
}

/// Fetches daily billed cost.
#[async_trait]
pub trait CostSource: Send + Sync {
    async fn fetch_costs(&self, session: &Session, query: &CostQuery) -> Result<Vec<CostRecord>>;
}

// =============================================================================
// Cost table decoding
// =============================================================================

/// Decode a cost document into records.
///
/// Accepts either a JSON array of [`CostRecord`] objects or the
/// column/row table returned by cost-management query APIs:
///
/// ```json
/// {"properties": {"columns": [{"name": "Cost"}, {"name": "ResourceId"}, {"name": "UsageDate"}],
///                 "rows": [[12.5, "/subscriptions/...", 20250301]]}}
/// ```
///
/// Columns are located by name. `Currency` falls back to `BillingCurrency`,
/// then to USD. `UsageDate` may be an integer `YYYYMMDD` or a date string;
/// rows without a usable date take `fallback_date`.
pub fn decode_cost_table(document: &Value, fallback_date: NaiveDate) -> Result<Vec<CostRecord>> {
    if document.is_array() {
        return Ok(serde_json::from_value(document.clone())?);
    }

    let properties = document.get("properties").unwrap_or(document);
    let columns = properties
        .get("columns")
        .and_then(Value::as_array)
        .ok_or_else(|| ImpactError::InvalidRecord("cost table has no columns".to_string()))?;
    let rows = properties
        .get("rows")
        .and_then(Value::as_array)
        .cloned()
        .unwrap_or_default();

    let index: BTreeMap<&str, usize> = columns
        .iter()
        .enumerate()
        .filter_map(|(i, c)| c.get("name").and_then(Value::as_str).map(|n| (n, i)))
        .collect();

    let cost_idx = index.get("Cost").copied().unwrap_or(0);
    let resource_idx = index.get("ResourceId").copied().unwrap_or(1);
    let currency_idx = index
        .get("Currency")
        .or_else(|| index.get("BillingCurrency"))
        .copied();
    let date_idx = index.get("UsageDate").copied();

    let mut records = Vec::with_capacity(rows.len());
    for (line, row) in rows.iter().enumerate() {
        let Some(cells) = row.as_array() else {
            trace!(line, "skipping non-array cost row");
            continue;
        };

        let amount = cells.get(cost_idx).and_then(Value::as_f64).ok_or_else(|| {
            ImpactError::InvalidRecord(format!("cost row {line} has no numeric cost"))
        })?;
        let resource_id = cells
            .get(resource_idx)
            .and_then(Value::as_str)
            .unwrap_or_default()
            .to_string();
        let currency = currency_idx
            .and_then(|i| cells.get(i))
            .and_then(Value::as_str)
            .unwrap_or(DEFAULT_CURRENCY);
        let date = date_idx
            .and_then(|i| cells.get(i))
            .and_then(parse_usage_date)
            .unwrap_or(fallback_date);

        records.push(CostRecord::new(date, resource_id, amount).with_currency(currency));
    }

    Ok(records)
}

fn parse_usage_date(value: &Value) -> Option<NaiveDate> {
    match value {
        Value::Number(n) => {
            let raw = n.as_u64()?;
            NaiveDate::parse_from_str(&raw.to_string(), "%Y%m%d").ok()
        }
        Value::String(s) => NaiveDate::parse_from_str(s, "%Y-%m-%d")
            .or_else(|_| NaiveDate::parse_from_str(s, "%Y%m%d"))
            .ok()
            .or_else(|| DateTime::parse_from_rfc3339(s).ok().map(|d| d.date_naive()))
            .or_else(|| s.get(..10).and_then(|p| NaiveDate::parse_from_str(p, "%Y-%m-%d").ok())),
        _ => None,
    }
}

// =============================================================================
// File source
// =============================================================================

/// An account in an inventory file, with its deployments inline.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InventoryEntry {
    #[serde(flatten)]
    pub resource: AccountResource,

    #[serde(default)]
    pub deployments: Vec<ModelDeployment>,
}

/// Adapter backed by JSON files on disk.
///
/// Each of the three documents is optional; a missing path yields no data.
/// Files are read on every call so a rerun picks up edits.
#[derive(Debug, Clone, Default)]
pub struct FileSource {
    inventory: Option<PathBuf>,
    metrics: Option<PathBuf>,
    costs: Option<PathBuf>,
}

impl FileSource {
    pub fn new() -> Self {
        Self::default()
    }

    /// JSON array of [`InventoryEntry`].
    pub fn with_inventory(mut self, path: impl Into<PathBuf>) -> Self {
        self.inventory = Some(path.into());
        self
    }

    /// JSON array of [`MetricSample`].
    pub fn with_metrics(mut self, path: impl Into<PathBuf>) -> Self {
        self.metrics = Some(path.into());
        self
    }

    /// Cost document, see [`decode_cost_table`].
    pub fn with_costs(mut self, path: impl Into<PathBuf>) -> Self {
        self.costs = Some(path.into());
        self
    }

    async fn read_json(path: &Path) -> Result<Value> {
        let content = tokio::fs::read_to_string(path).await?;
        let value = serde_json::from_str(&content)?;
        debug!(file = %path.display(), bytes = content.len(), "loaded input document");
        Ok(value)
    }

    async fn entries(&self) -> Result<Vec<InventoryEntry>> {
        match &self.inventory {
            Some(path) => Ok(serde_json::from_value(Self::read_json(path).await?)?),
            None => Ok(Vec::new()),
        }
    }
}

#[async_trait]
impl InventorySource for FileSource {
    async fn list_accounts(
        &self,
        _session: &Session,
        scope: &DiscoveryScope,
    ) -> Result<Vec<AccountResource>> {
        let accounts = self
            .entries()
            .await?
            .into_iter()
            .map(|e| e.resource)
            .filter(|r| match &scope.resource_group {
                Some(rg) => crate::inventory::resource_group_of(&r.id) == Some(rg.as_str()),
                None => true,
            })
            .collect();
        Ok(accounts)
    }

    async fn list_deployments(
        &self,
        _session: &Session,
        account: &Account,
    ) -> Result<Vec<ModelDeployment>> {
        Ok(self
            .entries()
            .await?
            .into_iter()
            .find(|e| e.resource.id == account.id)
            .map(|e| e.deployments)
            .unwrap_or_default())
    }
}

#[async_trait]
impl MetricsSource for FileSource {
    async fn fetch_metrics(
        &self,
        _session: &Session,
        query: &MetricsQuery,
    ) -> Result<Vec<MetricSample>> {
        let Some(path) = &self.metrics else {
            return Ok(Vec::new());
        };

        let samples: Vec<MetricSample> = serde_json::from_value(Self::read_json(path).await?)?;
        let wanted: HashSet<&str> = query.metrics.iter().map(String::as_str).collect();

        Ok(samples
            .into_iter()
            .filter(|s| s.resource_id == query.resource_id)
            .filter(|s| match (&query.deployment, &s.deployment) {
                (Some(filter), Some(name)) => filter == name,
                (Some(_), None) => false,
                (None, _) => true,
            })
            .filter(|s| wanted.is_empty() || wanted.contains(s.metric.as_str()))
            .filter(|s| query.window.contains(s.timestamp))
            .collect())
    }
}

#[async_trait]
impl CostSource for FileSource {
    async fn fetch_costs(&self, _session: &Session, query: &CostQuery) -> Result<Vec<CostRecord>> {
        let Some(path) = &self.costs else {
            return Ok(Vec::new());
        };

        let document = Self::read_json(path).await?;
        let records = decode_cost_table(&document, query.window.end.date_naive())?;

        Ok(records
            .into_iter()
            .filter(|r| query.resource_ids.iter().any(|id| *id == r.resource_id))
            .filter(|r| query.window.contains_day(r.date))
            .collect())
    }
}

// =============================================================================
// Demo source
// =============================================================================

const DEMO_SUBSCRIPTION: &str = "00000000-0000-0000-0000-000000000000";
const DEMO_GROUP: &str = "demo-rg";

/// (account, deployment, model, project tag)
const DEMO_DEPLOYMENTS: [(&str, &str, &str, &str); 4] = [
    ("gpt-4-production", "gpt-4-deployment", "gpt-4", "Customer Assistant"),
    ("gpt-4-production", "chat-deployment", "gpt-35-turbo", "Customer Assistant"),
    ("gpt-4-production", "reasoning-dept", "o1-preview", "Customer Assistant"),
    ("dall-e-lab", "img-gen", "dall-e-3", "Marketing Studio"),
];

/// Synthetic data for trying ecotrace without cloud access.
///
/// Traffic is ten times higher between 09:00 and 17:00. Values are derived
/// from a fixed seed and the sample hour, so repeated runs over the same
/// window return identical data.
#[derive(Debug, Clone)]
pub struct DemoSource {
    seed: u64,
}

impl Default for DemoSource {
    fn default() -> Self {
        Self { seed: 42 }
    }
}

impl DemoSource {
    pub fn new(seed: u64) -> Self {
        Self { seed }
    }

    /// Resource id of a demo account.
    pub fn resource_id(account: &str) -> String {
        format!(
            "/subscriptions/{DEMO_SUBSCRIPTION}/resourceGroups/{DEMO_GROUP}/providers/Microsoft.CognitiveServices/accounts/{account}"
        )
    }

    fn rng_for(&self, salt: &str, instant: i64) -> StdRng {
        let salt = salt.bytes().fold(0u64, |acc, b| acc.wrapping_mul(31).wrapping_add(u64::from(b)));
        StdRng::seed_from_u64(self.seed ^ salt ^ instant as u64)
    }

    fn hours(window: &TimeWindow) -> Vec<DateTime<Utc>> {
        let mut hour = crate::aggregator::hour_bucket(window.start);
        if hour < window.start {
            hour += Duration::hours(1);
        }
        let mut hours = Vec::new();
        while hour < window.end {
            hours.push(hour);
            hour += Duration::hours(1);
        }
        hours
    }
}

#[async_trait]
impl InventorySource for DemoSource {
    async fn list_accounts(
        &self,
        _session: &Session,
        scope: &DiscoveryScope,
    ) -> Result<Vec<AccountResource>> {
        if scope.resource_group.as_deref().is_some_and(|rg| rg != DEMO_GROUP) {
            return Ok(Vec::new());
        }

        let mut seen = HashSet::new();
        Ok(DEMO_DEPLOYMENTS
            .iter()
            .filter(|(account, ..)| seen.insert(*account))
            .map(|(account, _, _, project)| AccountResource {
                id: Self::resource_id(account),
                name: account.to_string(),
                kind: "OpenAI".to_string(),
                tags: BTreeMap::from([("Project".to_string(), project.to_string())]),
            })
            .collect())
    }

    async fn list_deployments(
        &self,
        _session: &Session,
        account: &Account,
    ) -> Result<Vec<ModelDeployment>> {
        Ok(DEMO_DEPLOYMENTS
            .iter()
            .filter(|(name, ..)| *name == account.name)
            .map(|(_, deployment, model, _)| ModelDeployment::new(*deployment, *model))
            .collect())
    }
}

#[async_trait]
impl MetricsSource for DemoSource {
    async fn fetch_metrics(
        &self,
        _session: &Session,
        query: &MetricsQuery,
    ) -> Result<Vec<MetricSample>> {
        let deployments: Vec<_> = DEMO_DEPLOYMENTS
            .iter()
            .filter(|(account, ..)| Self::resource_id(account) == query.resource_id)
            .filter(|(_, deployment, ..)| {
                query.deployment.as_deref().is_none_or(|d| d == *deployment)
            })
            .collect();

        let mut samples = Vec::new();
        for hour in Self::hours(&query.window) {
            let load = if (9..=17).contains(&hour.hour()) { 10.0 } else { 1.0 };

            for (_, deployment, model, _) in &deployments {
                let mut rng = self.rng_for(deployment, hour.timestamp());
                let sample = |metric: MetricName, value: f64| MetricSample {
                    timestamp: hour,
                    resource_id: query.resource_id.clone(),
                    deployment: Some(deployment.to_string()),
                    metric,
                    value,
                };

                if model.starts_with("dall") {
                    // Image generation only happens during business hours
                    let images = if load > 1.0 {
                        (rng.random::<f64>() * 5.0 * load).floor()
                    } else {
                        0.0
                    };
                    if images > 0.0 {
                        samples.push(sample(MetricName::GeneratedImages, images));
                    }
                } else {
                    let prompts = (rng.random_range(400.0..600.0) * load).floor();
                    let generated = (rng.random_range(150.0..250.0) * load).floor();
                    samples.push(sample(MetricName::ProcessedPromptTokens, prompts));
                    samples.push(sample(MetricName::GeneratedTokens, generated));
                }
            }
        }

        let wanted: HashSet<&str> = query.metrics.iter().map(String::as_str).collect();
        samples.retain(|s| wanted.is_empty() || wanted.contains(s.metric.as_str()));
        Ok(samples)
    }
}

#[async_trait]
impl CostSource for DemoSource {
    async fn fetch_costs(&self, _session: &Session, query: &CostQuery) -> Result<Vec<CostRecord>> {
        let ranges = [("gpt-4-production", 100.0..300.0), ("dall-e-lab", 20.0..80.0)];

        let mut records = Vec::new();
        let mut day = query.window.start.date_naive();
        while day <= query.window.end.date_naive() {
            for (account, range) in &ranges {
                let id = Self::resource_id(account);
                if !query.resource_ids.contains(&id) {
                    continue;
                }
                let instant = day.and_hms_opt(0, 0, 0).map(|d| d.and_utc().timestamp()).unwrap_or_default();
                let amount = self.rng_for(account, instant).random_range(range.clone());
                records.push(CostRecord::new(day, id, amount).with_currency("SEK"));
            }
            let Some(next) = day.succ_opt() else { break };
            day = next;
        }
        Ok(records)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn window() -> TimeWindow {
        TimeWindow::last_days(1, "2025-03-02T00:00:00Z".parse().unwrap())
    }

    #[test]
    fn test_time_window() {
        let w = window();
        assert!(w.contains("2025-03-01T00:00:00Z".parse().unwrap()));
        assert!(!w.contains("2025-03-02T00:00:00Z".parse().unwrap()));
        assert!(w.contains_day("2025-03-02".parse().unwrap()));
    }

    #[test]
    fn test_decode_cost_table_columns() {
        let doc = json!({
            "properties": {
                "columns": [
                    {"name": "Cost"}, {"name": "UsageDate"}, {"name": "ResourceId"}, {"name": "Currency"}
                ],
                "rows": [
                    [12.5, 20250301, "/subscriptions/s/resourceGroups/rg/a", "EUR"],
                    [3.0, "2025-03-02T00:00:00", "/subscriptions/s/resourceGroups/rg/b", "USD"]
                ]
            }
        });
        let fallback = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
        let records = decode_cost_table(&doc, fallback).unwrap();

        assert_eq!(records.len(), 2);
        assert_eq!(records[0].amount, 12.5);
        assert_eq!(records[0].currency, "EUR");
        assert_eq!(records[0].date, NaiveDate::from_ymd_opt(2025, 3, 1).unwrap());
        assert_eq!(records[1].date, NaiveDate::from_ymd_opt(2025, 3, 2).unwrap());
    }

    #[test]
    fn test_decode_cost_table_defaults() {
        let doc = json!({
            "properties": {
                "columns": [{"name": "Cost"}, {"name": "ResourceId"}, {"name": "BillingCurrency"}],
                "rows": [[7.0, "/x", "GBP"]]
            }
        });
        let fallback = NaiveDate::from_ymd_opt(2025, 1, 1).unwrap();
        let records = decode_cost_table(&doc, fallback).unwrap();
        assert_eq!(records[0].currency, "GBP");
        assert_eq!(records[0].date, fallback);

        let doc = json!({"properties": {"columns": [{"name": "Cost"}, {"name": "ResourceId"}], "rows": [[1.0, "/y"]]}});
        let records = decode_cost_table(&doc, fallback).unwrap();
        assert_eq!(records[0].currency, "USD");
    }

    #[test]
    fn test_decode_cost_table_plain_array() {
        let doc = json!([{"date": "2025-03-01", "resource_id": "/x", "amount": 2.0, "currency": "SEK"}]);
        let records = decode_cost_table(&doc, NaiveDate::default()).unwrap();
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].currency, "SEK");
    }

    #[test]
    fn test_decode_cost_table_rejects_missing_cost() {
        let doc = json!({"columns": [{"name": "Cost"}, {"name": "ResourceId"}], "rows": [["n/a", "/x"]]});
        assert!(decode_cost_table(&doc, NaiveDate::default()).is_err());
    }

    #[tokio::test]
    async fn test_demo_metrics_are_reproducible() {
        let demo = DemoSource::default();
        let query = MetricsQuery {
            resource_id: DemoSource::resource_id("gpt-4-production"),
            deployment: Some("gpt-4-deployment".to_string()),
            window: window(),
            interval: Duration::hours(1),
            metrics: vec![],
        };
        let session = Session::default();

        let a = demo.fetch_metrics(&session, &query).await.unwrap();
        let b = demo.fetch_metrics(&session, &query).await.unwrap();
        assert_eq!(a, b);
        // 24 hours x (prompt + generated)
        assert_eq!(a.len(), 48);
        assert!(a.iter().all(|s| s.value > 0.0));
    }

    #[tokio::test]
    async fn test_demo_images_only_in_business_hours() {
        let demo = DemoSource::default();
        let query = MetricsQuery {
            resource_id: DemoSource::resource_id("dall-e-lab"),
            deployment: None,
            window: window(),
            interval: Duration::hours(1),
            metrics: vec!["GeneratedImages".to_string()],
        };
        let samples = demo.fetch_metrics(&Session::default(), &query).await.unwrap();
        assert!(samples.iter().all(|s| (9..=17).contains(&s.timestamp.hour())));
    }

    #[tokio::test]
    async fn test_demo_inventory() {
        let demo = DemoSource::default();
        let accounts = demo
            .list_accounts(&Session::default(), &DiscoveryScope::default())
            .await
            .unwrap();
        assert_eq!(accounts.len(), 2);

        let scoped = demo
            .list_accounts(
                &Session::default(),
                &DiscoveryScope {
                    resource_group: Some("other".to_string()),
                },
            )
            .await
            .unwrap();
        assert!(scoped.is_empty());
    }
}
