//! # ecotrace-config
//!
//! The constants table behind every impact calculation: grid intensities per
//! region, energy factors per usage type, exchange rates to SEK, the metric
//! alias sets and the query window.
//!
//! Loaded from `~/.ecotrace/config.yaml`. Every field is optional in the file
//! and falls back to the built-in defaults, so an empty document is a valid
//! configuration.
//!
//! ```yaml
//! region: "Europe (Sweden)"
//! usd_rate: 10.4
//! window_days: 14
//! energy:
//!   reasoning_text: 0.002
//! metrics:
//!   output: [GeneratedTokens]
//! ```

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use ecotrace_core::{EcoError, Result};
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

/// Region used when none is configured.
pub const DEFAULT_REGION: &str = "Global Average";

/// Default USD to SEK rate, adjustable per run.
pub const DEFAULT_USD_RATE: f64 = 10.8;

/// Default query window in days.
pub const DEFAULT_WINDOW_DAYS: u32 = 7;

/// Largest query window accepted.
pub const MAX_WINDOW_DAYS: u32 = 30;

/// ~21 kg CO2 absorbed per mature tree per year.
pub const GRAMS_CO2_PER_TREE_DAY: f64 = 57.5;

/// Blended USD price per 1k tokens used when no billing data is available.
pub const DEFAULT_BLENDED_USD_PER_1K_TOKENS: f64 = 0.03;

/// Config file path (`~/.ecotrace/config.yaml`).
pub fn config_path() -> Result<PathBuf> {
    Ok(ecotrace_core::logging::home_dir()?
        .join(".ecotrace")
        .join("config.yaml"))
}

/// Grid carbon intensity for a named region.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GridRegion {
    /// Display name, also the lookup key (e.g. "Europe (Sweden)")
    pub name: String,

    /// Grams of CO2 per kWh
    pub intensity: f64,
}

impl GridRegion {
    pub fn new(name: impl Into<String>, intensity: f64) -> Self {
        Self {
            name: name.into(),
            intensity,
        }
    }
}

fn default_regions() -> Vec<GridRegion> {
    vec![
        GridRegion::new("Global Average", 475.0),
        GridRegion::new("US East (Virginia)", 350.0),
        GridRegion::new("US West (California)", 200.0),
        GridRegion::new("Europe (Ireland)", 280.0),
        GridRegion::new("Europe (Sweden)", 20.0),
        GridRegion::new("Asia (average)", 550.0),
    ]
}

fn default_exchange_rates() -> BTreeMap<String, f64> {
    [("USD", 10.8), ("EUR", 11.5), ("GBP", 13.5), ("SEK", 1.0)]
        .into_iter()
        .map(|(code, rate)| (code.to_string(), rate))
        .collect()
}

/// Energy estimates in kWh.
///
/// Token factors are per 1000 tokens; the image factor is per generated image.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EnergyFactors {
    /// GPT-3.5/4 class text models
    pub standard_text: f64,

    /// o1 class models (chain of thought)
    pub reasoning_text: f64,

    /// DALL-E class image generation, per image
    pub image_gen: f64,

    /// Embedding models
    pub embedding: f64,
}

impl Default for EnergyFactors {
    fn default() -> Self {
        Self {
            standard_text: 0.0004,
            reasoning_text: 0.0015,
            image_gen: 0.05,
            embedding: 0.0001,
        }
    }
}

/// Which metric names count as input, output and image volume.
///
/// Metric sources disagree on the name of the completion-token metric, so
/// the output set carries both spellings by default.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricAliases {
    /// Metrics requested from the metrics source
    pub requested: Vec<String>,

    /// Prompt-side token metrics
    pub input: Vec<String>,

    /// Completion-side token metrics
    pub output: Vec<String>,

    /// Image count metrics
    pub images: Vec<String>,
}

impl Default for MetricAliases {
    fn default() -> Self {
        Self {
            requested: vec![
                "ProcessedPromptTokens".to_string(),
                "GeneratedTokens".to_string(),
                "GeneratedImages".to_string(),
            ],
            input: vec!["ProcessedPromptTokens".to_string()],
            output: vec![
                "GeneratedTokens".to_string(),
                "GeneratedCompletionTokens".to_string(),
            ],
            images: vec!["GeneratedImages".to_string()],
        }
    }
}

impl MetricAliases {
    pub fn is_input(&self, metric: &str) -> bool {
        self.input.iter().any(|m| m == metric)
    }

    pub fn is_output(&self, metric: &str) -> bool {
        self.output.iter().any(|m| m == metric)
    }

    pub fn is_image(&self, metric: &str) -> bool {
        self.images.iter().any(|m| m == metric)
    }
}

/// Full ecotrace configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ImpactConfig {
    /// Selected region, a key into `regions`
    pub region: String,

    /// Grid intensity table
    pub regions: Vec<GridRegion>,

    /// Energy factors per usage type
    pub energy: EnergyFactors,

    /// Static conversion rates to SEK, keyed by ISO currency code
    pub exchange_rates: BTreeMap<String, f64>,

    /// USD to SEK rate; takes precedence over `exchange_rates["USD"]`
    pub usd_rate: f64,

    /// Days of history to query
    pub window_days: u32,

    /// Metric alias sets
    pub metrics: MetricAliases,

    /// Tree absorption constant
    pub grams_co2_per_tree_day: f64,

    /// Fallback price when billing data is missing
    pub blended_usd_per_1k_tokens: f64,

    /// Resource tags checked, in order, when resolving a project name
    pub project_tags: Vec<String>,
}

impl Default for ImpactConfig {
    fn default() -> Self {
        Self {
            region: DEFAULT_REGION.to_string(),
            regions: default_regions(),
            energy: EnergyFactors::default(),
            exchange_rates: default_exchange_rates(),
            usd_rate: DEFAULT_USD_RATE,
            window_days: DEFAULT_WINDOW_DAYS,
            metrics: MetricAliases::default(),
            grams_co2_per_tree_day: GRAMS_CO2_PER_TREE_DAY,
            blended_usd_per_1k_tokens: DEFAULT_BLENDED_USD_PER_1K_TOKENS,
            project_tags: vec![
                "DigitalProduct".to_string(),
                "Project".to_string(),
                "Application".to_string(),
            ],
        }
    }
}

impl ImpactConfig {
    /// Load from the default path, or return defaults when the file is absent.
    pub fn load() -> Result<Self> {
        let path = config_path()?;
        if !path.exists() {
            debug!(path = %path.display(), "no config file, using defaults");
            return Ok(Self::default());
        }
        Self::load_from(&path)
    }

    /// Load and validate a config file.
    pub fn load_from(path: &Path) -> Result<Self> {
        if !path.exists() {
            return Err(EcoError::config_not_found(path));
        }

        let content = std::fs::read_to_string(path)
            .map_err(|e| EcoError::io("reading config", path, e))?;

        let config: Self = serde_yaml::from_str(&content).map_err(|e| EcoError::ConfigInvalid {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        config.validate()?;

        info!(path = %path.display(), region = %config.region, "loaded config");
        Ok(config)
    }

    /// Parse config from a YAML string without validating it.
    pub fn parse(content: &str) -> Result<Self> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }
        serde_yaml::from_str(content).map_err(|e| EcoError::yaml_parse("config", e))
    }

    /// Check that every value is usable.
    pub fn validate(&self) -> Result<()> {
        if self.regions.is_empty() {
            return Err(EcoError::config_validation("region table is empty"));
        }
        if let Some(region) = self.regions.iter().find(|r| r.intensity < 0.0) {
            return Err(EcoError::config_validation(format!(
                "negative grid intensity for region '{}'",
                region.name
            )));
        }
        if self.grid_intensity(&self.region).is_none() {
            return Err(EcoError::config_validation(format!(
                "unknown region '{}' (known: {})",
                self.region,
                self.region_names().join(", ")
            )));
        }

        let factors = [
            ("standard_text", self.energy.standard_text),
            ("reasoning_text", self.energy.reasoning_text),
            ("image_gen", self.energy.image_gen),
            ("embedding", self.energy.embedding),
        ];
        for (name, value) in factors {
            if value <= 0.0 {
                return Err(EcoError::config_validation(format!(
                    "energy factor '{name}' must be positive, got {value}"
                )));
            }
        }

        if self.usd_rate <= 0.0 {
            return Err(EcoError::config_validation(format!(
                "usd_rate must be positive, got {}",
                self.usd_rate
            )));
        }
        if let Some((code, rate)) = self.exchange_rates.iter().find(|(_, rate)| **rate <= 0.0) {
            return Err(EcoError::config_validation(format!(
                "exchange rate for {code} must be positive, got {rate}"
            )));
        }

        if !(1..=MAX_WINDOW_DAYS).contains(&self.window_days) {
            return Err(EcoError::config_validation(format!(
                "window_days must be between 1 and {MAX_WINDOW_DAYS}, got {}",
                self.window_days
            )));
        }

        if self.grams_co2_per_tree_day <= 0.0 {
            return Err(EcoError::config_validation(
                "grams_co2_per_tree_day must be positive",
            ));
        }

        Ok(())
    }

    /// Grid intensity for a region name, if the region is known.
    pub fn grid_intensity(&self, region: &str) -> Option<f64> {
        self.regions
            .iter()
            .find(|r| r.name == region)
            .map(|r| r.intensity)
    }

    /// Grid intensity of the selected region.
    pub fn selected_intensity(&self) -> Option<f64> {
        self.grid_intensity(&self.region)
    }

    /// Region names in table order.
    pub fn region_names(&self) -> Vec<&str> {
        self.regions.iter().map(|r| r.name.as_str()).collect()
    }
}
