//! Flat comma-delimited export of enriched rows.
//!
//! Two layouts:
//! - [`write_enriched_csv`]: one row per sample, every usage field plus
//!   `kWh` and `Carbon_g`
//! - [`write_grouped_csv`]: rows summed per (timestamp, account, model,
//!   type), the shape BI tools import most easily

use std::collections::BTreeMap;
use std::io::Write;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::Result;
use crate::models::{EnrichedRecord, UsageType};

/// Header of the per-sample export.
pub const ENRICHED_HEADER: [&str; 11] = [
    "TimeStamp",
    "Account",
    "ResourceId",
    "Project",
    "Deployment",
    "Model",
    "Type",
    "Metric",
    "Value",
    "kWh",
    "Carbon_g",
];

/// Header of the grouped export.
pub const GROUPED_HEADER: [&str; 7] = [
    "TimeStamp", "Account", "Model", "Type", "Value", "Carbon_g", "kWh",
];

/// Quote a field when it contains a delimiter, quote or line break.
fn escape_field(field: &str) -> String {
    if field.contains([',', '"', '\n', '\r']) {
        format!("\"{}\"", field.replace('"', "\"\""))
    } else {
        field.to_string()
    }
}

fn write_row<W: Write, S: AsRef<str>>(writer: &mut W, fields: &[S]) -> Result<()> {
    let line = fields
        .iter()
        .map(|f| escape_field(f.as_ref()))
        .collect::<Vec<_>>()
        .join(",");
    writeln!(writer, "{line}")?;
    Ok(())
}

/// Write one row per enriched sample, with header.
pub fn write_enriched_csv<W: Write>(writer: &mut W, records: &[EnrichedRecord]) -> Result<()> {
    write_row(writer, &ENRICHED_HEADER)?;

    for enriched in records {
        let r = &enriched.record;
        write_row(
            writer,
            &[
                r.timestamp.to_rfc3339(),
                r.account.clone(),
                r.resource_id.clone(),
                r.project.clone(),
                r.deployment.clone(),
                r.model.clone(),
                r.usage_type.to_string(),
                r.metric.to_string(),
                r.value.to_string(),
                enriched.energy_kwh.to_string(),
                enriched.carbon_grams.to_string(),
            ],
        )?;
    }

    writer.flush()?;
    Ok(())
}

/// Enriched export as an in-memory string.
pub fn enriched_csv_string(records: &[EnrichedRecord]) -> Result<String> {
    let mut buf = Vec::new();
    write_enriched_csv(&mut buf, records)?;
    Ok(String::from_utf8_lossy(&buf).into_owned())
}

/// Summed usage for one (timestamp, account, model, type) combination.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GroupedRow {
    pub timestamp: DateTime<Utc>,
    pub account: String,
    pub model: String,
    pub usage_type: UsageType,
    pub value: f64,
    pub carbon_grams: f64,
    pub energy_kwh: f64,
}

/// Group rows for the BI export, ordered by the grouping columns.
pub fn group_for_export(records: &[EnrichedRecord]) -> Vec<GroupedRow> {
    let mut groups: BTreeMap<(DateTime<Utc>, String, String, UsageType), (f64, f64, f64)> =
        BTreeMap::new();

    for enriched in records {
        let r = &enriched.record;
        let sums = groups
            .entry((r.timestamp, r.account.clone(), r.model.clone(), r.usage_type))
            .or_default();
        sums.0 += r.value;
        sums.1 += enriched.carbon_grams;
        sums.2 += enriched.energy_kwh;
    }

    groups
        .into_iter()
        .map(
            |((timestamp, account, model, usage_type), (value, carbon_grams, energy_kwh))| {
                GroupedRow {
                    timestamp,
                    account,
                    model,
                    usage_type,
                    value,
                    carbon_grams,
                    energy_kwh,
                }
            },
        )
        .collect()
}

/// Write the grouped export, with header.
pub fn write_grouped_csv<W: Write>(writer: &mut W, records: &[EnrichedRecord]) -> Result<()> {
    write_row(writer, &GROUPED_HEADER)?;

    for row in group_for_export(records) {
        write_row(
            writer,
            &[
                row.timestamp.to_rfc3339(),
                row.account,
                row.model,
                row.usage_type.to_string(),
                row.value.to_string(),
                row.carbon_grams.to_string(),
                row.energy_kwh.to_string(),
            ],
        )?;
    }

    writer.flush()?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::energy::ImpactModel;
    use crate::models::{MetricName, UsageRecord};
    use ecotrace_config::ImpactConfig;

    fn enriched() -> Vec<EnrichedRecord> {
        let t = "2025-03-01T10:00:00Z".parse().unwrap();
        let records = vec![
            UsageRecord::new(t, "gpt-4", MetricName::ProcessedPromptTokens, 1000.0)
                .with_account("oai, prod", "/subscriptions/s/resourceGroups/rg/a")
                .with_project("chat \"v2\"")
                .with_deployment("gpt-4-deployment"),
            UsageRecord::new(t, "gpt-4", MetricName::GeneratedTokens, 500.0)
                .with_account("oai, prod", "/subscriptions/s/resourceGroups/rg/a")
                .with_project("chat \"v2\"")
                .with_deployment("gpt-4-deployment"),
        ];
        ImpactModel::from_config(&ImpactConfig::default())
            .unwrap()
            .enrich(&records)
    }

    #[test]
    fn test_escape_field() {
        assert_eq!(escape_field("plain"), "plain");
        assert_eq!(escape_field("a,b"), "\"a,b\"");
        assert_eq!(escape_field("say \"hi\""), "\"say \"\"hi\"\"\"");
    }

    #[test]
    fn test_enriched_csv_one_row_per_sample() {
        let csv = enriched_csv_string(&enriched()).unwrap();
        let lines: Vec<&str> = csv.lines().collect();

        assert_eq!(lines.len(), 3);
        assert_eq!(
            lines[0],
            "TimeStamp,Account,ResourceId,Project,Deployment,Model,Type,Metric,Value,kWh,Carbon_g"
        );
        assert_eq!(
            lines[1],
            "2025-03-01T10:00:00+00:00,\"oai, prod\",/subscriptions/s/resourceGroups/rg/a,\"chat \"\"v2\"\"\",gpt-4-deployment,gpt-4,text,ProcessedPromptTokens,1000,0.0004,0.19"
        );
    }

    #[test]
    fn test_enriched_csv_empty_has_header() {
        let csv = enriched_csv_string(&[]).unwrap();
        assert_eq!(csv.lines().count(), 1);
    }

    #[test]
    fn test_grouped_export_sums_metrics() {
        let rows = group_for_export(&enriched());
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].value, 1500.0);
        assert!((rows[0].energy_kwh - 0.0006).abs() < 1e-12);

        let mut buf = Vec::new();
        write_grouped_csv(&mut buf, &enriched()).unwrap();
        let csv = String::from_utf8(buf).unwrap();
        assert!(csv.starts_with("TimeStamp,Account,Model,Type,Value,Carbon_g,kWh\n"));
        assert_eq!(csv.lines().count(), 2);
    }
}
