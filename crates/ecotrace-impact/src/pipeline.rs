//! End-to-end reporting run over pluggable adapters.
//!
//! The run walks four steps:
//!
//! 1. Discovery: list accounts, keep AI accounts, list their deployments
//! 2. Metrics: one query per deployment, account by account
//! 3. Cost: one query for every discovered account
//! 4. Aggregation: [`ImpactReport::build`]
//!
//! Adapter calls are awaited in order. A failure on one deployment does not
//! stop the others. Bad requests (deployments that reject the metric filter)
//! are skipped silently; other failures are collected into
//! [`PipelineReport::errors`]. A cost failure is reported once in
//! [`PipelineReport::cost_error`] and the report is built without billing
//! data.

use std::collections::HashSet;
use std::sync::Arc;

use chrono::{DateTime, Duration, Utc};
use ecotrace_config::ImpactConfig;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument, warn};

use crate::error::{ImpactError, Result};
use crate::inventory::{Account, group_by_account, project_map, resource_name_of};
use crate::models::{AGGREGATED_DEPLOYMENT, InventoryItem, UsageRecord};
use crate::report::ImpactReport;
use crate::source::{
    CostQuery, CostSource, DiscoveryScope, InventorySource, MetricSample, MetricsQuery,
    MetricsSource, Session, TimeWindow,
};

/// How accounts are found.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Discovery {
    /// List every account in the subscription, optionally limited to one
    /// resource group
    Scan { resource_group: Option<String> },

    /// Use one named account without listing its deployments
    Manual {
        resource_group: String,
        resource_name: String,
    },
}

impl Default for Discovery {
    fn default() -> Self {
        Discovery::Scan {
            resource_group: None,
        }
    }
}

/// Result of one run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineReport {
    /// Classified deployments that were queried
    pub inventory: Vec<InventoryItem>,

    pub impact: ImpactReport,

    /// Human-readable discovery progress
    pub discovery_log: Vec<String>,

    /// Non-fatal adapter failures, one per failed query
    pub errors: Vec<String>,

    /// Why billing data is missing, if the cost query failed
    pub cost_error: Option<String>,
}

/// Wires the adapters to the aggregation.
#[derive(Clone)]
pub struct Pipeline {
    config: ImpactConfig,
    inventory: Arc<dyn InventorySource>,
    metrics: Arc<dyn MetricsSource>,
    costs: Arc<dyn CostSource>,
}

impl Pipeline {
    pub fn new(
        config: ImpactConfig,
        inventory: Arc<dyn InventorySource>,
        metrics: Arc<dyn MetricsSource>,
        costs: Arc<dyn CostSource>,
    ) -> Self {
        Self {
            config,
            inventory,
            metrics,
            costs,
        }
    }

    /// Use one adapter for all three concerns.
    pub fn with_source<S>(config: ImpactConfig, source: S) -> Self
    where
        S: InventorySource + MetricsSource + CostSource + 'static,
    {
        let source = Arc::new(source);
        Self::new(config, source.clone(), source.clone(), source)
    }

    pub fn config(&self) -> &ImpactConfig {
        &self.config
    }

    /// Run over the configured window ending now.
    pub async fn run(&self, session: &Session, discovery: &Discovery) -> Result<PipelineReport> {
        self.run_until(session, discovery, Utc::now()).await
    }

    /// Run over the configured window ending at `end`.
    #[instrument(skip(self, session), fields(subscription = %session.subscription_id))]
    pub async fn run_until(
        &self,
        session: &Session,
        discovery: &Discovery,
        end: DateTime<Utc>,
    ) -> Result<PipelineReport> {
        // Fail on bad settings before any adapter call
        if self.config.selected_intensity().is_none() {
            return Err(ImpactError::UnknownRegion(self.config.region.clone()));
        }
        self.config.validate()?;

        let window = TimeWindow::last_days(self.config.window_days, end);
        let mut discovery_log = Vec::new();
        let mut errors = Vec::new();

        let inventory = self
            .discover(session, discovery, &mut discovery_log, &mut errors)
            .await?;
        info!(deployments = inventory.len(), "discovery finished");

        let usage = self.collect_usage(session, &inventory, window, &mut errors).await;

        let resource_ids = unique_resource_ids(&inventory);
        let (costs, cost_error) = if resource_ids.is_empty() {
            (Vec::new(), None)
        } else {
            let query = CostQuery {
                resource_ids,
                window,
            };
            match self.costs.fetch_costs(session, &query).await {
                Ok(costs) => (costs, None),
                Err(e) => {
                    warn!(error = %e, "cost query failed");
                    (Vec::new(), Some(e.friendly_message()))
                }
            }
        };

        let impact = ImpactReport::build(&self.config, &usage, &costs, &project_map(&inventory))?;

        Ok(PipelineReport {
            inventory,
            impact,
            discovery_log,
            errors,
            cost_error,
        })
    }

    async fn discover(
        &self,
        session: &Session,
        discovery: &Discovery,
        log: &mut Vec<String>,
        errors: &mut Vec<String>,
    ) -> Result<Vec<InventoryItem>> {
        let resource_group = match discovery {
            Discovery::Manual {
                resource_group,
                resource_name,
            } => {
                let account =
                    Account::manual(&session.subscription_id, resource_group, resource_name);
                log.push(format!("Using account {} in {}", account.name, account.resource_group));
                return Ok(vec![account.manual_inventory()]);
            }
            Discovery::Scan { resource_group } => resource_group.clone(),
        };

        let scope = DiscoveryScope { resource_group };
        let resources = self.inventory.list_accounts(session, &scope).await?;
        log.push(format!("Listed {} resources", resources.len()));

        let mut inventory = Vec::new();
        for resource in &resources {
            let Some(account) = Account::from_resource(resource, &self.config.project_tags) else {
                debug!(name = %resource.name, kind = %resource.kind, "skipping non-AI resource");
                continue;
            };
            log.push(format!(
                "Found {} ({}), project {}",
                account.name, resource.kind, account.project
            ));

            let deployments = match self.inventory.list_deployments(session, &account).await {
                Ok(deployments) => deployments,
                Err(e) => {
                    warn!(account = %account.name, error = %e, "listing deployments failed");
                    errors.push(format!("Error {}: {}", account.name, e));
                    Vec::new()
                }
            };

            if deployments.is_empty() {
                log.push(format!("  {}: no deployments, querying the whole account", account.name));
            }
            for d in &deployments {
                log.push(format!("  {}: {} -> {}", account.name, d.deployment_name, d.model_name));
            }

            inventory.extend(account.inventory(&deployments));
        }

        if inventory.is_empty() {
            log.push("No AI accounts found".to_string());
        }
        Ok(inventory)
    }

    /// Query metrics account by account, one request per inventory row.
    async fn collect_usage(
        &self,
        session: &Session,
        inventory: &[InventoryItem],
        window: TimeWindow,
        errors: &mut Vec<String>,
    ) -> Vec<UsageRecord> {
        let mut usage = Vec::new();

        for (resource_id, items) in group_by_account(inventory) {
            let account = resource_name_of(&resource_id);
            let before = usage.len();

            for item in items {
                let query = MetricsQuery {
                    resource_id: item.resource_id.clone(),
                    deployment: (!item.is_aggregated()).then(|| item.deployment_name.clone()),
                    window,
                    interval: Duration::hours(1),
                    metrics: self.config.metrics.requested.clone(),
                };

                match self.metrics.fetch_metrics(session, &query).await {
                    Ok(samples) => usage.extend(
                        samples
                            .into_iter()
                            .filter(|s| s.value > 0.0)
                            .map(|s| to_usage_record(item, s)),
                    ),
                    Err(e) if e.is_bad_request() => {
                        debug!(deployment = %item.deployment_name, "metric filter rejected, skipping");
                    }
                    Err(e) => {
                        warn!(deployment = %item.deployment_name, error = %e, "metrics query failed");
                        errors.push(format!("Error {}: {}", account, e));
                    }
                }
            }

            info!(account, records = usage.len() - before, "metrics fetched");
        }
        usage
    }
}

fn to_usage_record(item: &InventoryItem, sample: MetricSample) -> UsageRecord {
    let deployment = match sample.deployment {
        Some(name) if item.is_aggregated() => name,
        _ if item.is_aggregated() => AGGREGATED_DEPLOYMENT.to_string(),
        _ => item.deployment_name.clone(),
    };

    UsageRecord::new(sample.timestamp, item.model_name.clone(), sample.metric, sample.value)
        .with_account(item.account_name.clone(), item.resource_id.clone())
        .with_project(item.project.clone())
        .with_deployment(deployment)
        .with_usage_type(item.usage_type)
}

fn unique_resource_ids(inventory: &[InventoryItem]) -> Vec<String> {
    let mut seen = HashSet::new();
    inventory
        .iter()
        .filter(|item| seen.insert(item.resource_id.as_str()))
        .map(|item| item.resource_id.clone())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::SourceErrorKind;
    use crate::inventory::{AccountResource, ModelDeployment};
    use crate::models::{CostRecord, MetricName, UsageType};
    use async_trait::async_trait;
    use chrono::NaiveDate;
    use std::collections::BTreeMap;

    const ACCOUNT: &str =
        "/subscriptions/sub-1/resourceGroups/rg-chat/providers/Microsoft.CognitiveServices/accounts/oai-prod";

    /// Fixed data with one failing deployment and a configurable cost failure.
    struct StubSource {
        cost_failure: Option<SourceErrorKind>,
    }

    fn end() -> DateTime<Utc> {
        "2025-03-02T00:00:00Z".parse().unwrap()
    }

    #[async_trait]
    impl InventorySource for StubSource {
        async fn list_accounts(
            &self,
            _session: &Session,
            _scope: &DiscoveryScope,
        ) -> Result<Vec<AccountResource>> {
            Ok(vec![
                AccountResource {
                    id: ACCOUNT.to_string(),
                    name: "oai-prod".to_string(),
                    kind: "OpenAI".to_string(),
                    tags: BTreeMap::from([("Project".to_string(), "chatbot".to_string())]),
                },
                AccountResource {
                    id: "/subscriptions/sub-1/resourceGroups/rg-chat/providers/x/speech".to_string(),
                    name: "speech".to_string(),
                    kind: "SpeechServices".to_string(),
                    tags: BTreeMap::new(),
                },
            ])
        }

        async fn list_deployments(
            &self,
            _session: &Session,
            _account: &Account,
        ) -> Result<Vec<ModelDeployment>> {
            Ok(vec![
                ModelDeployment::new("chat", "gpt-4"),
                ModelDeployment::new("legacy", "gpt-35-turbo"),
                ModelDeployment::new("broken", "gpt-4o"),
            ])
        }
    }

    #[async_trait]
    impl MetricsSource for StubSource {
        async fn fetch_metrics(
            &self,
            _session: &Session,
            query: &MetricsQuery,
        ) -> Result<Vec<MetricSample>> {
            let sample = |metric: MetricName, value: f64| MetricSample {
                timestamp: "2025-03-01T10:00:00Z".parse().unwrap(),
                resource_id: query.resource_id.clone(),
                deployment: query.deployment.clone(),
                metric,
                value,
            };
            match query.deployment.as_deref() {
                Some("chat") => Ok(vec![
                    sample(MetricName::ProcessedPromptTokens, 1000.0),
                    sample(MetricName::GeneratedTokens, 0.0),
                ]),
                Some("legacy") => Err(ImpactError::adapter(
                    "metrics",
                    SourceErrorKind::BadRequest,
                    "filter not supported",
                )),
                _ => Err(ImpactError::adapter("metrics", SourceErrorKind::Other, "timeout")),
            }
        }
    }

    #[async_trait]
    impl CostSource for StubSource {
        async fn fetch_costs(&self, _session: &Session, query: &CostQuery) -> Result<Vec<CostRecord>> {
            if let Some(kind) = self.cost_failure {
                return Err(ImpactError::adapter("cost", kind, "403 Forbidden"));
            }
            let day = NaiveDate::from_ymd_opt(2025, 3, 1).unwrap();
            Ok(query
                .resource_ids
                .iter()
                .map(|id| CostRecord::new(day, id.clone(), 10.0))
                .collect())
        }
    }

    fn pipeline(cost_failure: Option<SourceErrorKind>) -> Pipeline {
        Pipeline::with_source(ImpactConfig::default(), StubSource { cost_failure })
    }

    #[tokio::test]
    async fn test_run_collects_partial_results() {
        let report = pipeline(None)
            .run_until(&Session::new("sub-1"), &Discovery::default(), end())
            .await
            .unwrap();

        // Speech account filtered out, three deployments kept
        assert_eq!(report.inventory.len(), 3);
        assert!(report.inventory.iter().all(|i| i.project == "chatbot"));

        // Zero-valued sample dropped, bad request skipped, timeout reported
        assert_eq!(report.impact.records.len(), 1);
        assert_eq!(report.errors.len(), 1);
        assert!(report.errors[0].starts_with("Error oai-prod:"));

        assert_eq!(report.cost_error, None);
        assert!((report.impact.cost.total_sek - 108.0).abs() < 1e-9);
        assert_eq!(report.impact.project_costs[0].project_name, "chatbot");
    }

    #[tokio::test]
    async fn test_cost_failure_is_reported_not_fatal() {
        let report = pipeline(Some(SourceErrorKind::PermissionDenied))
            .run_until(&Session::new("sub-1"), &Discovery::default(), end())
            .await
            .unwrap();

        let message = report.cost_error.unwrap();
        assert!(message.contains("Cost Management Reader"));
        assert!(report.impact.cost.is_empty());
        assert_eq!(report.impact.records.len(), 1);
    }

    #[tokio::test]
    async fn test_manual_discovery_queries_whole_account() {
        let discovery = Discovery::Manual {
            resource_group: "rg-chat".to_string(),
            resource_name: "oai-prod".to_string(),
        };
        let report = pipeline(None)
            .run_until(&Session::new("sub-1"), &discovery, end())
            .await
            .unwrap();

        assert_eq!(report.inventory.len(), 1);
        assert_eq!(report.inventory[0].resource_id, ACCOUNT);
        assert_eq!(report.inventory[0].usage_type, UsageType::Text);
        // The stub fails unfiltered queries
        assert_eq!(report.errors.len(), 1);
    }

    #[tokio::test]
    async fn test_unknown_region_fails_before_adapters() {
        let config = ImpactConfig {
            region: "Atlantis".to_string(),
            ..Default::default()
        };
        let pipeline = Pipeline::with_source(config, StubSource { cost_failure: None });
        let result = pipeline
            .run_until(&Session::new("sub-1"), &Discovery::default(), end())
            .await;
        assert!(matches!(result, Err(ImpactError::UnknownRegion(_))));
    }

    #[test]
    fn test_aggregated_rows_keep_sample_deployment() {
        let account = Account::manual("sub-1", "rg-chat", "oai-prod");
        let item = account.manual_inventory();
        let sample = MetricSample {
            timestamp: end(),
            resource_id: ACCOUNT.to_string(),
            deployment: Some("chat".to_string()),
            metric: MetricName::GeneratedTokens,
            value: 5.0,
        };
        assert_eq!(to_usage_record(&item, sample.clone()).deployment, "chat");

        let unnamed = MetricSample {
            deployment: None,
            ..sample
        };
        assert_eq!(
            to_usage_record(&item, unnamed).deployment,
            AGGREGATED_DEPLOYMENT
        );
    }
}
