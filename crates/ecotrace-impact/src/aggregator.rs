//! Grouping and summarizing of enriched usage and converted cost rows.
//!
//! Every function here is a pure transform over slices: the same input
//! always produces the same output, including row order. Group rows are
//! sorted by descending carbon (or cost) with the group key as tie-breaker.

use std::collections::{BTreeMap, BTreeSet};

use chrono::{DateTime, NaiveDate, Timelike, Utc};
use ecotrace_config::MetricAliases;
use serde::{Deserialize, Serialize};

use crate::currency::CurrencyConverter;
use crate::energy::ImpactModel;
use crate::inventory::{UNKNOWN_PROJECT, resource_group_of, resource_name_of};
use crate::models::{CostRecord, EnrichedRecord, UsageRecord, UsageType};

/// Days used to extrapolate the daily average to a month.
pub const DAYS_PER_MONTH: f64 = 30.0;

/// Dimension to group usage by.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GroupKey {
    Model,
    Project,
    Resource,
    Account,
    Deployment,
    UsageType,
    /// Hourly time bucket
    Hour,
    /// Daily time bucket
    Day,
}

impl GroupKey {
    /// The group label of a record under this key.
    pub fn key_of(&self, record: &UsageRecord) -> String {
        match self {
            GroupKey::Model => record.model.clone(),
            GroupKey::Project => record.project.clone(),
            GroupKey::Resource => record.resource_id.clone(),
            GroupKey::Account => record.account.clone(),
            GroupKey::Deployment => record.deployment.clone(),
            GroupKey::UsageType => record.usage_type.to_string(),
            GroupKey::Hour => hour_bucket(record.timestamp).to_rfc3339(),
            GroupKey::Day => record.timestamp.date_naive().to_string(),
        }
    }
}

/// Truncate a timestamp to the start of its hour.
pub fn hour_bucket(timestamp: DateTime<Utc>) -> DateTime<Utc> {
    timestamp
        .with_minute(0)
        .and_then(|t| t.with_second(0))
        .and_then(|t| t.with_nanosecond(0))
        .unwrap_or(timestamp)
}

/// Totals for one group of usage records.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct GroupSummary {
    /// Group label
    pub group_key: String,

    /// Number of samples in the group
    pub record_count: usize,

    /// Sum of all values regardless of metric
    pub total_value: f64,

    /// Sum of input-token metrics
    pub input_tokens: f64,

    /// Sum of output-token metrics
    pub output_tokens: f64,

    /// Sum of image metrics
    pub images: f64,

    /// Energy in kWh
    pub energy_kwh: f64,

    /// Emissions in grams CO2e
    pub carbon_grams: f64,
}

impl GroupSummary {
    fn new(group_key: String) -> Self {
        Self {
            group_key,
            ..Default::default()
        }
    }

    fn add(&mut self, enriched: &EnrichedRecord, aliases: &MetricAliases) {
        let record = &enriched.record;
        let metric = record.metric.as_str();

        self.record_count += 1;
        self.total_value += record.value;
        if aliases.is_input(metric) {
            self.input_tokens += record.value;
        }
        if aliases.is_output(metric) {
            self.output_tokens += record.value;
        }
        if aliases.is_image(metric) {
            self.images += record.value;
        }
        self.energy_kwh += enriched.energy_kwh;
        self.carbon_grams += enriched.carbon_grams;
    }
}

/// Group enriched records by `key`, one summary per distinct label.
pub fn aggregate_by_group(
    records: &[EnrichedRecord],
    key: GroupKey,
    aliases: &MetricAliases,
) -> Vec<GroupSummary> {
    let mut groups: BTreeMap<String, GroupSummary> = BTreeMap::new();

    for enriched in records {
        let label = key.key_of(&enriched.record);
        groups
            .entry(label.clone())
            .or_insert_with(|| GroupSummary::new(label))
            .add(enriched, aliases);
    }

    let mut summaries: Vec<GroupSummary> = groups.into_values().collect();
    summaries.sort_by(|a, b| {
        b.carbon_grams
            .total_cmp(&a.carbon_grams)
            .then_with(|| a.group_key.cmp(&b.group_key))
    });
    summaries
}

/// Headline figures over a whole pass.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ImpactTotals {
    pub record_count: usize,
    pub total_value: f64,
    pub input_tokens: f64,
    pub output_tokens: f64,
    pub images: f64,
    pub energy_kwh: f64,
    pub carbon_grams: f64,
    pub tree_days: f64,

    /// Distinct model names seen
    pub models_tracked: usize,
}

impl ImpactTotals {
    /// Sum every record. Empty input gives zeroed totals.
    /// Tree-days use the model's absorption constant.
    pub fn from_records(
        records: &[EnrichedRecord],
        aliases: &MetricAliases,
        model: &ImpactModel,
    ) -> Self {
        let mut sum = GroupSummary::default();
        let mut models = BTreeSet::new();
        for enriched in records {
            sum.add(enriched, aliases);
            models.insert(enriched.record.model.as_str());
        }

        Self {
            record_count: sum.record_count,
            total_value: sum.total_value,
            input_tokens: sum.input_tokens,
            output_tokens: sum.output_tokens,
            images: sum.images,
            energy_kwh: sum.energy_kwh,
            carbon_grams: sum.carbon_grams,
            tree_days: model.tree_days(sum.carbon_grams),
            models_tracked: models.len(),
        }
    }
}

/// Cost and usage side by side for one project.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct ProjectCostSummary {
    pub project_name: String,
    pub cost_sek: f64,
    pub carbon_grams: f64,
    pub input_tokens: f64,
    pub output_tokens: f64,
}

/// Project label for a billed resource: the lookup, then the resource-group
/// segment of the path, then `"Unknown"`.
pub fn project_for_resource(resource_id: &str, id_to_project: &BTreeMap<String, String>) -> String {
    id_to_project
        .get(resource_id)
        .map(String::as_str)
        .or_else(|| resource_group_of(resource_id))
        .unwrap_or(UNKNOWN_PROJECT)
        .to_string()
}

/// Sum SEK cost per project and outer-join with per-project usage.
///
/// `usage_by_project` is the output of [`aggregate_by_group`] with
/// [`GroupKey::Project`]. Projects present on only one side appear with the
/// other side zeroed.
pub fn aggregate_cost_by_project(
    costs: &[CostRecord],
    id_to_project: &BTreeMap<String, String>,
    converter: &CurrencyConverter,
    usage_by_project: &[GroupSummary],
) -> Vec<ProjectCostSummary> {
    let mut projects: BTreeMap<String, ProjectCostSummary> = BTreeMap::new();

    for cost in costs {
        let name = project_for_resource(&cost.resource_id, id_to_project);
        projects
            .entry(name.clone())
            .or_insert_with(|| ProjectCostSummary {
                project_name: name,
                ..Default::default()
            })
            .cost_sek += converter.to_sek(cost.amount, &cost.currency);
    }

    for usage in usage_by_project {
        let entry = projects
            .entry(usage.group_key.clone())
            .or_insert_with(|| ProjectCostSummary {
                project_name: usage.group_key.clone(),
                ..Default::default()
            });
        entry.carbon_grams += usage.carbon_grams;
        entry.input_tokens += usage.input_tokens;
        entry.output_tokens += usage.output_tokens;
    }

    let mut summaries: Vec<ProjectCostSummary> = projects.into_values().collect();
    summaries.sort_by(|a, b| {
        b.cost_sek
            .total_cmp(&a.cost_sek)
            .then_with(|| a.project_name.cmp(&b.project_name))
    });
    summaries
}

/// A cost row with its SEK value and display name.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConvertedCost {
    #[serde(flatten)]
    pub record: CostRecord,
    pub resource_name: String,
    pub project: String,
    pub cost_sek: f64,
}

/// Total SEK spend on one day, across resources.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DailyCostSek {
    pub date: NaiveDate,
    pub cost_sek: f64,
}

/// One resource's share of the period's spend.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceCostShare {
    pub resource_name: String,
    pub cost_sek: f64,
    /// Fraction of the total, 0 when the total is 0
    pub share: f64,
}

/// Billing analysis for a query window.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct CostAnalysis {
    pub total_sek: f64,

    /// Spend per day, oldest first
    pub daily: Vec<DailyCostSek>,

    /// Mean of `daily`
    pub daily_average: f64,

    /// `daily_average` extrapolated to a 30-day month
    pub projected_monthly: f64,

    /// Spend per resource, largest first
    pub by_resource: Vec<ResourceCostShare>,

    /// Every converted row, newest first
    pub ledger: Vec<ConvertedCost>,
}

impl CostAnalysis {
    /// Convert and summarize cost rows. Empty input gives zeroed figures.
    pub fn from_records(
        costs: &[CostRecord],
        id_to_project: &BTreeMap<String, String>,
        converter: &CurrencyConverter,
    ) -> Self {
        let mut ledger: Vec<ConvertedCost> = costs
            .iter()
            .map(|record| ConvertedCost {
                resource_name: resource_name_of(&record.resource_id).to_string(),
                project: project_for_resource(&record.resource_id, id_to_project),
                cost_sek: converter.to_sek(record.amount, &record.currency),
                record: record.clone(),
            })
            .collect();

        let total_sek: f64 = ledger.iter().map(|c| c.cost_sek).sum();

        let mut per_day: BTreeMap<NaiveDate, f64> = BTreeMap::new();
        let mut per_resource: BTreeMap<&str, f64> = BTreeMap::new();
        for row in &ledger {
            *per_day.entry(row.record.date).or_default() += row.cost_sek;
            *per_resource.entry(row.resource_name.as_str()).or_default() += row.cost_sek;
        }

        let daily: Vec<DailyCostSek> = per_day
            .into_iter()
            .map(|(date, cost_sek)| DailyCostSek { date, cost_sek })
            .collect();

        let daily_average = if daily.is_empty() {
            0.0
        } else {
            daily.iter().map(|d| d.cost_sek).sum::<f64>() / daily.len() as f64
        };

        let mut by_resource: Vec<ResourceCostShare> = per_resource
            .into_iter()
            .map(|(name, cost_sek)| ResourceCostShare {
                resource_name: name.to_string(),
                cost_sek,
                share: if total_sek > 0.0 { cost_sek / total_sek } else { 0.0 },
            })
            .collect();
        by_resource.sort_by(|a, b| {
            b.cost_sek
                .total_cmp(&a.cost_sek)
                .then_with(|| a.resource_name.cmp(&b.resource_name))
        });

        ledger.sort_by(|a, b| {
            b.record
                .date
                .cmp(&a.record.date)
                .then_with(|| a.resource_name.cmp(&b.resource_name))
        });

        Self {
            total_sek,
            daily,
            daily_average,
            projected_monthly: daily_average * DAYS_PER_MONTH,
            by_resource,
            ledger,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.ledger.is_empty()
    }
}

/// Prompt and completion tokens at one timestamp.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenPoint {
    pub timestamp: DateTime<Utc>,
    pub prompt_tokens: f64,
    pub completion_tokens: f64,
    pub total_tokens: f64,
}

/// Pivot token metrics into a time series, oldest first. Timestamps with
/// only non-token metrics are left out.
pub fn token_timeline(records: &[UsageRecord], aliases: &MetricAliases) -> Vec<TokenPoint> {
    let mut points: BTreeMap<DateTime<Utc>, (f64, f64)> = BTreeMap::new();

    for record in records {
        let metric = record.metric.as_str();
        let is_input = aliases.is_input(metric);
        let is_output = aliases.is_output(metric);
        if !is_input && !is_output {
            continue;
        }

        let point = points.entry(record.timestamp).or_default();
        if is_input {
            point.0 += record.value;
        }
        if is_output {
            point.1 += record.value;
        }
    }

    points
        .into_iter()
        .map(|(timestamp, (prompt, completion))| TokenPoint {
            timestamp,
            prompt_tokens: prompt,
            completion_tokens: completion,
            total_tokens: prompt + completion,
        })
        .collect()
}

/// Rough USD cost from token volume, for when billing data is missing.
/// Image samples are excluded.
pub fn estimate_cost_usd(records: &[UsageRecord], usd_per_1k_tokens: f64) -> f64 {
    let tokens: f64 = records
        .iter()
        .filter(|r| r.usage_type != UsageType::Image)
        .map(|r| r.value)
        .sum();
    tokens / 1000.0 * usd_per_1k_tokens
}
