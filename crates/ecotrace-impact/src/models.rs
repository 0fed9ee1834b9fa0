//! Data models for usage, cost and derived impact rows.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};

/// Sentinel deployment name for accounts without a per-deployment breakdown.
pub const AGGREGATED_DEPLOYMENT: &str = "All Models (Aggregated)";

/// Currency assumed when the cost source omits one.
pub const DEFAULT_CURRENCY: &str = "USD";

/// Workload shape of a deployment, driving which energy factor applies.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UsageType {
    Text,
    Reasoning,
    Image,
    Embedding,
}

impl UsageType {
    /// Classify a model name. Case-insensitive, first matching rule wins:
    /// `dall` → image, `o1`/`reasoning` → reasoning, `embedding` → embedding,
    /// anything else → text.
    pub fn classify(model_name: &str) -> Self {
        let name = model_name.to_lowercase();
        if name.contains("dall") {
            UsageType::Image
        } else if name.contains("o1") || name.contains("reasoning") {
            UsageType::Reasoning
        } else if name.contains("embedding") {
            UsageType::Embedding
        } else {
            UsageType::Text
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            UsageType::Text => "text",
            UsageType::Reasoning => "reasoning",
            UsageType::Image => "image",
            UsageType::Embedding => "embedding",
        }
    }
}

impl std::fmt::Display for UsageType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Name of a usage metric as reported by the metrics source.
///
/// Unrecognized names are kept verbatim so nothing is lost on the way to
/// export.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub enum MetricName {
    ProcessedPromptTokens,
    GeneratedTokens,
    GeneratedCompletionTokens,
    GeneratedImages,
    Other(String),
}

impl MetricName {
    pub fn as_str(&self) -> &str {
        match self {
            MetricName::ProcessedPromptTokens => "ProcessedPromptTokens",
            MetricName::GeneratedTokens => "GeneratedTokens",
            MetricName::GeneratedCompletionTokens => "GeneratedCompletionTokens",
            MetricName::GeneratedImages => "GeneratedImages",
            MetricName::Other(name) => name,
        }
    }
}

impl From<&str> for MetricName {
    fn from(name: &str) -> Self {
        match name {
            "ProcessedPromptTokens" => MetricName::ProcessedPromptTokens,
            "GeneratedTokens" => MetricName::GeneratedTokens,
            "GeneratedCompletionTokens" => MetricName::GeneratedCompletionTokens,
            "GeneratedImages" => MetricName::GeneratedImages,
            other => MetricName::Other(other.to_string()),
        }
    }
}

impl From<String> for MetricName {
    fn from(name: String) -> Self {
        MetricName::from(name.as_str())
    }
}

impl From<MetricName> for String {
    fn from(metric: MetricName) -> Self {
        metric.as_str().to_string()
    }
}

impl std::fmt::Display for MetricName {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One hourly metric sample, joined with its deployment's inventory row.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageRecord {
    /// Start of the hourly bucket
    pub timestamp: DateTime<Utc>,

    /// Account (resource) name
    pub account: String,

    /// Fully-qualified resource path of the account
    pub resource_id: String,

    /// Project label resolved from tags or resource group
    pub project: String,

    /// Deployment name, or [`AGGREGATED_DEPLOYMENT`]
    pub deployment: String,

    /// Model name as reported by the inventory
    pub model: String,

    /// Classified once at inventory time
    pub usage_type: UsageType,

    /// Metric the value belongs to
    pub metric: MetricName,

    /// Token or image count
    pub value: f64,
}

impl UsageRecord {
    /// Create a record for a model, classifying its usage type.
    pub fn new(
        timestamp: DateTime<Utc>,
        model: impl Into<String>,
        metric: impl Into<MetricName>,
        value: f64,
    ) -> Self {
        let model = model.into();
        Self {
            timestamp,
            account: String::new(),
            resource_id: String::new(),
            project: String::new(),
            deployment: AGGREGATED_DEPLOYMENT.to_string(),
            usage_type: UsageType::classify(&model),
            model,
            metric: metric.into(),
            value,
        }
    }

    /// Set account name and resource id.
    pub fn with_account(mut self, account: impl Into<String>, resource_id: impl Into<String>) -> Self {
        self.account = account.into();
        self.resource_id = resource_id.into();
        self
    }

    /// Set project label.
    pub fn with_project(mut self, project: impl Into<String>) -> Self {
        self.project = project.into();
        self
    }

    /// Set deployment name.
    pub fn with_deployment(mut self, deployment: impl Into<String>) -> Self {
        self.deployment = deployment.into();
        self
    }

    /// Override the usage type carried from the inventory.
    pub fn with_usage_type(mut self, usage_type: UsageType) -> Self {
        self.usage_type = usage_type;
        self
    }
}

/// A usage record with its energy and carbon estimates appended.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EnrichedRecord {
    #[serde(flatten)]
    pub record: UsageRecord,

    /// Estimated energy in kWh
    pub energy_kwh: f64,

    /// Estimated emissions in grams CO2e
    pub carbon_grams: f64,
}

fn default_currency() -> String {
    DEFAULT_CURRENCY.to_string()
}

/// Billed cost for one resource on one day.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CostRecord {
    /// Billing day
    pub date: NaiveDate,

    /// Join key to [`UsageRecord::resource_id`]
    pub resource_id: String,

    /// Amount in `currency`
    pub amount: f64,

    /// ISO currency code, `USD` when the source omits it
    #[serde(default = "default_currency")]
    pub currency: String,
}

impl CostRecord {
    pub fn new(date: NaiveDate, resource_id: impl Into<String>, amount: f64) -> Self {
        Self {
            date,
            resource_id: resource_id.into(),
            amount,
            currency: default_currency(),
        }
    }

    /// Set the currency code.
    pub fn with_currency(mut self, currency: impl Into<String>) -> Self {
        self.currency = currency.into();
        self
    }
}

/// One deployment in the inventory, with its usage type fixed.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct InventoryItem {
    /// Resource path of the owning account
    pub resource_id: String,

    /// Account name
    pub account_name: String,

    /// Resource group parsed from the resource path
    pub resource_group: String,

    /// Project label
    pub project: String,

    /// Deployment name, or [`AGGREGATED_DEPLOYMENT`]
    pub deployment_name: String,

    /// Model behind the deployment
    pub model_name: String,

    /// Usage type derived from `model_name`
    pub usage_type: UsageType,
}

impl InventoryItem {
    /// True for the placeholder row of an account without deployments.
    pub fn is_aggregated(&self) -> bool {
        self.deployment_name == AGGREGATED_DEPLOYMENT
    }
}
