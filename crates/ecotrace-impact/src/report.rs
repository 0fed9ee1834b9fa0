//! One complete aggregation pass over usage and cost rows.

use std::collections::BTreeMap;

use ecotrace_config::ImpactConfig;
use serde::{Deserialize, Serialize};

use crate::aggregator::{
    CostAnalysis, GroupKey, GroupSummary, ImpactTotals, ProjectCostSummary, TokenPoint,
    aggregate_by_group, aggregate_cost_by_project, estimate_cost_usd, token_timeline,
};
use crate::currency::CurrencyConverter;
use crate::energy::ImpactModel;
use crate::error::Result;
use crate::models::{CostRecord, EnrichedRecord, UsageRecord};

/// Everything the presentation layer needs from one pass.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ImpactReport {
    /// Region the carbon figures are computed for
    pub region: String,

    /// Grams CO2 per kWh of that region
    pub grid_intensity: f64,

    /// USD to SEK rate applied
    pub usd_rate: f64,

    pub totals: ImpactTotals,
    pub by_model: Vec<GroupSummary>,
    pub by_project: Vec<GroupSummary>,
    pub by_usage_type: Vec<GroupSummary>,
    pub by_day: Vec<GroupSummary>,
    pub project_costs: Vec<ProjectCostSummary>,
    pub cost: CostAnalysis,
    pub timeline: Vec<TokenPoint>,

    /// Token-based USD estimate, only set when there are no billing rows
    pub estimated_cost_usd: Option<f64>,

    /// Enriched rows, newest first
    pub records: Vec<EnrichedRecord>,
}

impl ImpactReport {
    /// Run the aggregation for the config's selected region.
    ///
    /// Samples with `value <= 0` are dropped. Fails only when the selected
    /// region is not in the grid-intensity table.
    pub fn build(
        config: &ImpactConfig,
        usage: &[UsageRecord],
        costs: &[CostRecord],
        id_to_project: &BTreeMap<String, String>,
    ) -> Result<Self> {
        let model = ImpactModel::from_config(config)?;
        let converter = CurrencyConverter::from_config(config);
        let aliases = &config.metrics;

        let mut records = model.enrich(usage);
        let usage: Vec<UsageRecord> = records.iter().map(|r| r.record.clone()).collect();

        let totals = ImpactTotals::from_records(&records, aliases, &model);
        let by_model = aggregate_by_group(&records, GroupKey::Model, aliases);
        let by_project = aggregate_by_group(&records, GroupKey::Project, aliases);
        let by_usage_type = aggregate_by_group(&records, GroupKey::UsageType, aliases);
        let mut by_day = aggregate_by_group(&records, GroupKey::Day, aliases);
        by_day.sort_by(|a, b| a.group_key.cmp(&b.group_key));

        let project_costs = aggregate_cost_by_project(costs, id_to_project, &converter, &by_project);
        let cost = CostAnalysis::from_records(costs, id_to_project, &converter);
        let estimated_cost_usd = cost
            .is_empty()
            .then(|| estimate_cost_usd(&usage, config.blended_usd_per_1k_tokens));

        let timeline = token_timeline(&usage, aliases);

        records.sort_by(|a, b| b.record.timestamp.cmp(&a.record.timestamp));

        ecotrace_core::log_impact_event!(
            region = %config.region,
            records = totals.record_count,
            energy_kwh = totals.energy_kwh,
            carbon_g = totals.carbon_grams,
            cost_sek = cost.total_sek
        );

        Ok(Self {
            region: config.region.clone(),
            grid_intensity: model.grid_intensity,
            usd_rate: converter.usd_rate(),
            totals,
            by_model,
            by_project,
            by_usage_type,
            by_day,
            project_costs,
            cost,
            timeline,
            estimated_cost_usd,
            records,
        })
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty() && self.cost.is_empty()
    }
}
