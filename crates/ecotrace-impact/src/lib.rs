//! # ecotrace-impact
//!
//! Environmental impact and cost reporting for hosted AI model deployments.
//!
//! This crate provides:
//! - [`ImpactModel`] - Energy and carbon estimates per usage record
//! - [`CurrencyConverter`] - Billing amounts normalised to SEK
//! - [`aggregate_by_group`] / [`aggregate_cost_by_project`] - Summaries per
//!   model, project or time bucket, and the usage/cost outer join
//! - [`ImpactReport`] - One aggregation pass over usage and billing rows
//! - [`Pipeline`] - Discovery, metric fan-out and cost lookup over pluggable
//!   adapters ([`FileSource`], [`DemoSource`])
//! - [`write_enriched_csv`] / [`write_grouped_csv`] - Flat exports
//!
//! ## Estimation model
//!
//! | Usage type | kWh per unit            |
//! |------------|-------------------------|
//! | text       | 0.0004 per 1000 tokens  |
//! | reasoning  | 0.0015 per 1000 tokens  |
//! | image      | 0.05 per image          |
//! | embedding  | 0.0001 per 1000 tokens  |
//!
//! Carbon is energy times the selected region's grid intensity
//! (g CO2/kWh). Tree-days divide total grams by 57.5.
//!
//! ## Example
//!
//! ```no_run
//! use ecotrace_config::ImpactConfig;
//! use ecotrace_impact::{DemoSource, Discovery, Pipeline, Session};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let pipeline = Pipeline::with_source(ImpactConfig::default(), DemoSource::default());
//!     let report = pipeline.run(&Session::default(), &Discovery::default()).await?;
//!
//!     println!(
//!         "{:.3} kWh, {:.1} g CO2",
//!         report.impact.totals.energy_kwh, report.impact.totals.carbon_grams
//!     );
//!     Ok(())
//! }
//! ```

pub mod aggregator;
pub mod currency;
pub mod energy;
pub mod error;
pub mod export;
pub mod inventory;
pub mod models;
pub mod pipeline;
pub mod report;
pub mod source;

// Re-export main types
pub use aggregator::{
    CostAnalysis, GroupKey, GroupSummary, ImpactTotals, ProjectCostSummary, TokenPoint,
    aggregate_by_group, aggregate_cost_by_project,
};
pub use currency::{CurrencyConverter, convert_to_sek};
pub use energy::{
    ImpactModel, classify_usage_type, compute_carbon, compute_energy, compute_tree_days,
};
pub use error::{ImpactError, Result, SourceErrorKind};
pub use export::{write_enriched_csv, write_grouped_csv};
pub use inventory::{Account, AccountResource, ModelDeployment};
pub use models::{CostRecord, EnrichedRecord, InventoryItem, MetricName, UsageRecord, UsageType};
pub use pipeline::{Discovery, Pipeline, PipelineReport};
pub use report::ImpactReport;
pub use source::{
    CostSource, DemoSource, FileSource, InventorySource, MetricsSource, Session, TimeWindow,
};
