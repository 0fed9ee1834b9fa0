//! Unit conversions from usage volume to energy, carbon and tree-days.
//!
//! All functions here are pure. [`ImpactModel`] bundles the constants for one
//! pass (energy factors, the selected region's grid intensity, the tree
//! absorption constant) so callers never thread them by hand.

use ecotrace_config::{EnergyFactors, GRAMS_CO2_PER_TREE_DAY, ImpactConfig};
use tracing::debug;

use crate::error::{ImpactError, Result};
use crate::models::{EnrichedRecord, UsageRecord, UsageType};

/// Classify a model name into a [`UsageType`]. Never fails; unknown models
/// are [`UsageType::Text`].
pub fn classify_usage_type(model_name: &str) -> UsageType {
    UsageType::classify(model_name)
}

/// Energy for a volume of a given usage type.
///
/// Images use the per-image factor directly; every other type is priced per
/// 1000 tokens.
pub fn energy_for(usage_type: UsageType, value: f64, factors: &EnergyFactors) -> f64 {
    let per_thousand = match usage_type {
        UsageType::Image => return value * factors.image_gen,
        UsageType::Reasoning => factors.reasoning_text,
        UsageType::Embedding => factors.embedding,
        UsageType::Text => factors.standard_text,
    };
    (value / 1000.0) * per_thousand
}

/// Energy estimate for one usage record, in kWh.
pub fn compute_energy(record: &UsageRecord, factors: &EnergyFactors) -> f64 {
    energy_for(record.usage_type, record.value, factors)
}

/// Emissions in grams for an amount of energy on a grid.
pub fn compute_carbon(energy_kwh: f64, grid_intensity: f64) -> f64 {
    energy_kwh * grid_intensity
}

/// Days one mature tree needs to absorb `total_grams`, at the default
/// [`GRAMS_CO2_PER_TREE_DAY`].
///
/// Reports use [`ImpactModel::tree_days`], which honours a configured
/// `grams_co2_per_tree_day`.
pub fn compute_tree_days(total_grams: f64) -> f64 {
    total_grams / GRAMS_CO2_PER_TREE_DAY
}

/// Constants for one impact pass.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ImpactModel {
    pub factors: EnergyFactors,
    pub grid_intensity: f64,
    pub grams_co2_per_tree_day: f64,
}

impl ImpactModel {
    /// Model with the default tree-day constant.
    pub fn new(factors: EnergyFactors, grid_intensity: f64) -> Self {
        Self {
            factors,
            grid_intensity,
            grams_co2_per_tree_day: GRAMS_CO2_PER_TREE_DAY,
        }
    }

    /// Replace the grams of CO2 one tree absorbs per day.
    pub fn with_tree_day_grams(mut self, grams: f64) -> Self {
        self.grams_co2_per_tree_day = grams;
        self
    }

    /// Build from config using its selected region.
    pub fn from_config(config: &ImpactConfig) -> Result<Self> {
        Self::for_region(config, &config.region)
    }

    /// Build from config for an explicit region name.
    pub fn for_region(config: &ImpactConfig, region: &str) -> Result<Self> {
        let grid_intensity = config
            .grid_intensity(region)
            .ok_or_else(|| ImpactError::UnknownRegion(region.to_string()))?;

        debug!(region, grid_intensity, "impact model selected");

        Ok(Self::new(config.energy, grid_intensity)
            .with_tree_day_grams(config.grams_co2_per_tree_day))
    }

    pub fn energy(&self, record: &UsageRecord) -> f64 {
        compute_energy(record, &self.factors)
    }

    pub fn carbon(&self, energy_kwh: f64) -> f64 {
        compute_carbon(energy_kwh, self.grid_intensity)
    }

    /// Tree-days at this model's absorption constant.
    pub fn tree_days(&self, total_grams: f64) -> f64 {
        total_grams / self.grams_co2_per_tree_day
    }

    /// Append energy and carbon to one record.
    pub fn enrich_one(&self, record: UsageRecord) -> EnrichedRecord {
        let energy_kwh = self.energy(&record);
        EnrichedRecord {
            carbon_grams: self.carbon(energy_kwh),
            energy_kwh,
            record,
        }
    }

    /// Enrich a batch, dropping samples with `value <= 0`.
    pub fn enrich(&self, records: &[UsageRecord]) -> Vec<EnrichedRecord> {
        records
            .iter()
            .filter(|r| r.value > 0.0)
            .cloned()
            .map(|r| self.enrich_one(r))
            .collect()
    }
}
