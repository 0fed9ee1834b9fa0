//! Integration tests for ecotrace-impact with JSON input files.

use std::path::Path;

use chrono::{DateTime, Utc};
use ecotrace_config::ImpactConfig;
use ecotrace_impact::export::group_for_export;
use ecotrace_impact::{
    DemoSource, Discovery, FileSource, Pipeline, Session, UsageType, write_enriched_csv,
};
use tempfile::{TempDir, tempdir};

const CHAT: &str =
    "/subscriptions/sub-1/resourceGroups/rg-chat/providers/Microsoft.CognitiveServices/accounts/oai-prod";
const VISION: &str =
    "/subscriptions/sub-1/resourceGroups/rg-vision/providers/Microsoft.CognitiveServices/accounts/vision";
const DEV: &str =
    "/subscriptions/sub-1/resourceGroups/rg-dev/providers/Microsoft.CognitiveServices/accounts/oai-dev";

/// Three AI accounts and one speech resource that discovery must skip.
const INVENTORY: &str = r#"[
  {"id": "/subscriptions/sub-1/resourceGroups/rg-chat/providers/Microsoft.CognitiveServices/accounts/oai-prod",
   "name": "oai-prod", "kind": "OpenAI", "tags": {"Project": "chatbot"},
   "deployments": [
     {"deployment_name": "gpt-4-deployment", "model_name": "gpt-4"},
     {"deployment_name": "img", "model_name": "dall-e-3"}
   ]},
  {"id": "/subscriptions/sub-1/resourceGroups/rg-vision/providers/Microsoft.CognitiveServices/accounts/vision",
   "name": "vision", "kind": "CognitiveServices"},
  {"id": "/subscriptions/sub-1/resourceGroups/rg-dev/providers/Microsoft.CognitiveServices/accounts/oai-dev",
   "name": "oai-dev", "kind": "OpenAI",
   "deployments": [{"deployment_name": "chat", "model_name": "gpt-35-turbo"}]},
  {"id": "/subscriptions/sub-1/resourceGroups/rg-chat/providers/Microsoft.CognitiveServices/accounts/speech",
   "name": "speech", "kind": "SpeechServices"}
]"#;

const METRICS: &str = r#"[
  {"timestamp": "2025-03-01T10:00:00Z", "resource_id": "/subscriptions/sub-1/resourceGroups/rg-chat/providers/Microsoft.CognitiveServices/accounts/oai-prod",
   "deployment": "gpt-4-deployment", "metric": "ProcessedPromptTokens", "value": 1000},
  {"timestamp": "2025-03-01T10:00:00Z", "resource_id": "/subscriptions/sub-1/resourceGroups/rg-chat/providers/Microsoft.CognitiveServices/accounts/oai-prod",
   "deployment": "gpt-4-deployment", "metric": "GeneratedTokens", "value": 500},
  {"timestamp": "2025-03-01T10:00:00Z", "resource_id": "/subscriptions/sub-1/resourceGroups/rg-chat/providers/Microsoft.CognitiveServices/accounts/oai-prod",
   "deployment": "img", "metric": "GeneratedImages", "value": 2},
  {"timestamp": "2025-02-01T10:00:00Z", "resource_id": "/subscriptions/sub-1/resourceGroups/rg-chat/providers/Microsoft.CognitiveServices/accounts/oai-prod",
   "deployment": "gpt-4-deployment", "metric": "GeneratedTokens", "value": 99999},
  {"timestamp": "2025-03-01T11:00:00Z", "resource_id": "/subscriptions/sub-1/resourceGroups/rg-vision/providers/Microsoft.CognitiveServices/accounts/vision",
   "metric": "GeneratedTokens", "value": 0},
  {"timestamp": "2025-03-01T12:00:00Z", "resource_id": "/subscriptions/sub-1/resourceGroups/rg-dev/providers/Microsoft.CognitiveServices/accounts/oai-dev",
   "deployment": "chat", "metric": "GeneratedCompletionTokens", "value": 1000}
]"#;

/// Cost-management table: one USD row, one EUR row, one row for a
/// resource outside the inventory.
const COSTS: &str = r#"{
  "properties": {
    "columns": [
      {"name": "Cost", "type": "Number"},
      {"name": "ResourceId", "type": "String"},
      {"name": "UsageDate", "type": "Number"},
      {"name": "Currency", "type": "String"}
    ],
    "rows": [
      [10.0, "/subscriptions/sub-1/resourceGroups/rg-chat/providers/Microsoft.CognitiveServices/accounts/oai-prod", 20250301, "USD"],
      [5.0, "/subscriptions/sub-1/resourceGroups/rg-vision/providers/Microsoft.CognitiveServices/accounts/vision", 20250301, "EUR"],
      [3.0, "/subscriptions/sub-1/resourceGroups/rg-old/providers/Microsoft.CognitiveServices/accounts/old", 20250301, "SEK"]
    ]
  }
}"#;

/// Default settings, also requesting the alternate completion-token metric.
fn config() -> ImpactConfig {
    let mut config = ImpactConfig::default();
    config
        .metrics
        .requested
        .push("GeneratedCompletionTokens".to_string());
    config
}

fn end() -> DateTime<Utc> {
    "2025-03-02T00:00:00Z".parse().unwrap()
}

/// Write the three fixtures into a temp dir.
fn fixtures() -> TempDir {
    let dir = tempdir().unwrap();
    std::fs::write(dir.path().join("inventory.json"), INVENTORY).unwrap();
    std::fs::write(dir.path().join("metrics.json"), METRICS).unwrap();
    std::fs::write(dir.path().join("costs.json"), COSTS).unwrap();
    dir
}

fn file_source(dir: &Path) -> FileSource {
    FileSource::new()
        .with_inventory(dir.join("inventory.json"))
        .with_metrics(dir.join("metrics.json"))
        .with_costs(dir.join("costs.json"))
}

#[tokio::test]
async fn test_file_pipeline_end_to_end() {
    let dir = fixtures();
    let pipeline = Pipeline::with_source(config(), file_source(dir.path()));

    let report = pipeline
        .run_until(&Session::new("sub-1"), &Discovery::default(), end())
        .await
        .unwrap();

    // oai-prod: 2 deployments, vision: placeholder, oai-dev: 1 deployment
    assert_eq!(report.inventory.len(), 4);
    assert!(report.errors.is_empty());
    assert_eq!(report.cost_error, None);

    let image_row = report
        .inventory
        .iter()
        .find(|i| i.deployment_name == "img")
        .unwrap();
    assert_eq!(image_row.usage_type, UsageType::Image);

    // Old and zero-valued samples dropped
    let impact = &report.impact;
    assert_eq!(impact.records.len(), 4);
    assert!((impact.totals.energy_kwh - 0.101).abs() < 1e-9);
    assert!((impact.totals.carbon_grams - 47.975).abs() < 1e-6);
    assert_eq!(impact.totals.output_tokens, 1500.0);
    assert_eq!(impact.totals.models_tracked, 3);

    // Both alias spellings count as output tokens
    let dev = impact
        .by_project
        .iter()
        .find(|p| p.group_key == "rg-dev")
        .unwrap();
    assert_eq!(dev.output_tokens, 1000.0);
}

#[tokio::test]
async fn test_cost_usage_outer_join() {
    let dir = fixtures();
    let pipeline = Pipeline::with_source(config(), file_source(dir.path()));

    let report = pipeline
        .run_until(&Session::new("sub-1"), &Discovery::default(), end())
        .await
        .unwrap();

    let projects: Vec<(&str, f64, f64)> = report
        .impact
        .project_costs
        .iter()
        .map(|p| (p.project_name.as_str(), p.cost_sek, p.carbon_grams))
        .collect();

    assert_eq!(projects.len(), 3);

    // Cost and usage
    assert_eq!(projects[0].0, "chatbot");
    assert!((projects[0].1 - 108.0).abs() < 1e-9);
    assert!((projects[0].2 - 47.785).abs() < 1e-6);

    // Cost only
    assert_eq!(projects[1].0, "rg-vision");
    assert!((projects[1].1 - 57.5).abs() < 1e-9);
    assert_eq!(projects[1].2, 0.0);

    // Usage only
    assert_eq!(projects[2].0, "rg-dev");
    assert_eq!(projects[2].1, 0.0);
    assert!((projects[2].2 - 0.19).abs() < 1e-9);

    // Rows outside the inventory are not fetched
    assert!((report.impact.cost.total_sek - 165.5).abs() < 1e-9);
}

#[tokio::test]
async fn test_resource_group_scope() {
    let dir = fixtures();
    let pipeline = Pipeline::with_source(config(), file_source(dir.path()));
    let discovery = Discovery::Scan {
        resource_group: Some("rg-dev".to_string()),
    };

    let report = pipeline
        .run_until(&Session::new("sub-1"), &discovery, end())
        .await
        .unwrap();

    assert_eq!(report.inventory.len(), 1);
    assert_eq!(report.inventory[0].resource_id, DEV);
    assert_eq!(report.impact.records.len(), 1);
}

#[tokio::test]
async fn test_missing_input_file_is_an_error() {
    let dir = tempdir().unwrap();
    let source = FileSource::new().with_inventory(dir.path().join("absent.json"));
    let pipeline = Pipeline::with_source(ImpactConfig::default(), source);

    let result = pipeline
        .run_until(&Session::new("sub-1"), &Discovery::default(), end())
        .await;
    assert!(result.is_err());
}

#[tokio::test]
async fn test_region_changes_carbon_not_energy() {
    let dir = fixtures();
    let global = Pipeline::with_source(config(), file_source(dir.path()))
        .run_until(&Session::new("sub-1"), &Discovery::default(), end())
        .await
        .unwrap();

    let sweden_config = ImpactConfig {
        region: "Europe (Sweden)".to_string(),
        ..config()
    };
    let sweden = Pipeline::with_source(sweden_config, file_source(dir.path()))
        .run_until(&Session::new("sub-1"), &Discovery::default(), end())
        .await
        .unwrap();

    assert_eq!(
        global.impact.totals.energy_kwh,
        sweden.impact.totals.energy_kwh
    );
    assert!((sweden.impact.totals.carbon_grams - 0.101 * 20.0).abs() < 1e-9);
}

#[tokio::test]
async fn test_enriched_export_file() {
    let dir = fixtures();
    let report = Pipeline::with_source(config(), file_source(dir.path()))
        .run_until(&Session::new("sub-1"), &Discovery::default(), end())
        .await
        .unwrap();

    let out = dir.path().join("export.csv");
    let mut file = std::fs::File::create(&out).unwrap();
    write_enriched_csv(&mut file, &report.impact.records).unwrap();
    drop(file);

    let content = std::fs::read_to_string(&out).unwrap();
    let lines: Vec<&str> = content.lines().collect();
    assert_eq!(lines.len(), 5);
    assert!(lines[0].ends_with(",Value,kWh,Carbon_g"));
    assert!(lines.iter().skip(1).any(|l| l.contains(CHAT)));
    assert!(!content.contains(VISION));
}

#[tokio::test]
async fn test_demo_pipeline_is_deterministic() {
    let config = ImpactConfig::default();
    let a = Pipeline::with_source(config.clone(), DemoSource::default())
        .run_until(&Session::default(), &Discovery::default(), end())
        .await
        .unwrap();
    let b = Pipeline::with_source(config, DemoSource::default())
        .run_until(&Session::default(), &Discovery::default(), end())
        .await
        .unwrap();

    assert_eq!(a.impact, b.impact);
    assert_eq!(a.inventory.len(), 4);
    assert!(a.impact.totals.carbon_grams > 0.0);
    assert!(a.impact.totals.images > 0.0);

    // Two demo accounts billed in SEK for 8 calendar days
    assert_eq!(a.impact.cost.ledger.len(), 16);
    assert!(a.impact.estimated_cost_usd.is_none());

    let grouped = group_for_export(&a.impact.records);
    assert!(!grouped.is_empty());
    assert!(grouped.len() < a.impact.records.len());
}
