//! Inventory building: accounts, projects and classified deployments.
//!
//! Resource ids have the shape
//! `/subscriptions/{sub}/resourceGroups/{rg}/providers/{ns}/accounts/{name}`;
//! split on `/`, the resource group is segment 4.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::models::{AGGREGATED_DEPLOYMENT, InventoryItem, UsageType};

/// Label used when no project can be resolved.
pub const UNKNOWN_PROJECT: &str = "Unknown";

/// Model name given to the placeholder row of an account without deployments.
pub const UNKNOWN_MODEL: &str = "unknown";

/// Model name given to manually specified accounts.
pub const MANUAL_MODEL: &str = "Manual";

/// An account resource as listed by the inventory source.
#[derive(Debug, Clone, PartialEq, Default, Serialize, Deserialize)]
pub struct AccountResource {
    /// Fully-qualified resource id
    pub id: String,

    /// Resource name
    pub name: String,

    /// Resource kind (e.g. "OpenAI", "CognitiveServices", "Speech")
    #[serde(default)]
    pub kind: String,

    /// Resource tags
    #[serde(default)]
    pub tags: BTreeMap<String, String>,
}

/// A model deployment inside an account.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelDeployment {
    pub deployment_name: String,

    #[serde(default = "unknown_model")]
    pub model_name: String,

    #[serde(default)]
    pub model_version: String,

    #[serde(default)]
    pub model_format: String,
}

fn unknown_model() -> String {
    UNKNOWN_MODEL.to_string()
}

impl ModelDeployment {
    pub fn new(deployment_name: impl Into<String>, model_name: impl Into<String>) -> Self {
        Self {
            deployment_name: deployment_name.into(),
            model_name: model_name.into(),
            model_version: String::new(),
            model_format: String::new(),
        }
    }
}

/// An account accepted into the inventory, with its project resolved.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Account {
    pub id: String,
    pub name: String,
    pub resource_group: String,
    pub project: String,
    pub tags: BTreeMap<String, String>,
}

/// Whether a resource kind is an AI inference account.
pub fn is_ai_account(kind: &str) -> bool {
    kind.contains("OpenAI") || kind.contains("CognitiveServices")
}

/// Resource group segment of a resource id, if present and non-empty.
pub fn resource_group_of(resource_id: &str) -> Option<&str> {
    resource_id
        .split('/')
        .nth(4)
        .filter(|segment| !segment.is_empty())
}

/// Last path segment of a resource id, or `"Unknown"`.
pub fn resource_name_of(resource_id: &str) -> &str {
    match resource_id.rsplit('/').next() {
        Some(name) if !name.is_empty() => name,
        _ => UNKNOWN_PROJECT,
    }
}

/// Resolve a project label: the first non-empty tag among `tag_keys`, then
/// the resource group, then the resource name.
pub fn resolve_project(
    tags: &BTreeMap<String, String>,
    tag_keys: &[String],
    resource_group: &str,
    resource_name: &str,
) -> String {
    tag_keys
        .iter()
        .filter_map(|key| tags.get(key))
        .find(|value| !value.is_empty())
        .map(String::as_str)
        .or_else(|| (!resource_group.is_empty()).then_some(resource_group))
        .or_else(|| (!resource_name.is_empty()).then_some(resource_name))
        .unwrap_or(UNKNOWN_PROJECT)
        .to_string()
}

impl Account {
    /// Accept a listed resource if it is an AI account.
    pub fn from_resource(resource: &AccountResource, tag_keys: &[String]) -> Option<Self> {
        if !is_ai_account(&resource.kind) {
            return None;
        }

        let resource_group = resource_group_of(&resource.id).unwrap_or_default().to_string();
        let project = resolve_project(&resource.tags, tag_keys, &resource_group, &resource.name);

        Some(Self {
            id: resource.id.clone(),
            name: resource.name.clone(),
            resource_group,
            project,
            tags: resource.tags.clone(),
        })
    }

    /// A manually specified account, whose project is its resource group.
    pub fn manual(subscription_id: &str, resource_group: &str, resource_name: &str) -> Self {
        Self {
            id: format!(
                "/subscriptions/{subscription_id}/resourceGroups/{resource_group}/providers/Microsoft.CognitiveServices/accounts/{resource_name}"
            ),
            name: resource_name.to_string(),
            resource_group: resource_group.to_string(),
            project: resource_group.to_string(),
            tags: BTreeMap::new(),
        }
    }

    fn item(&self, deployment_name: &str, model_name: &str, usage_type: UsageType) -> InventoryItem {
        InventoryItem {
            resource_id: self.id.clone(),
            account_name: self.name.clone(),
            resource_group: self.resource_group.clone(),
            project: self.project.clone(),
            deployment_name: deployment_name.to_string(),
            model_name: model_name.to_string(),
            usage_type,
        }
    }

    /// Inventory rows for this account. Each deployment is classified once
    /// here; an account without deployments yields one aggregated row.
    pub fn inventory(&self, deployments: &[ModelDeployment]) -> Vec<InventoryItem> {
        if deployments.is_empty() {
            return vec![self.item(AGGREGATED_DEPLOYMENT, UNKNOWN_MODEL, UsageType::Text)];
        }

        deployments
            .iter()
            .map(|d| {
                self.item(
                    &d.deployment_name,
                    &d.model_name,
                    UsageType::classify(&d.model_name),
                )
            })
            .collect()
    }

    /// The single aggregated row used for manually specified accounts.
    pub fn manual_inventory(&self) -> InventoryItem {
        self.item(AGGREGATED_DEPLOYMENT, MANUAL_MODEL, UsageType::Text)
    }
}

/// Resource id to project lookup for cost attribution.
pub fn project_map(inventory: &[InventoryItem]) -> BTreeMap<String, String> {
    inventory
        .iter()
        .map(|item| {
            let project = if item.project.is_empty() {
                item.resource_group.clone()
            } else {
                item.project.clone()
            };
            (item.resource_id.clone(), project)
        })
        .collect()
}

/// Inventory rows grouped by account resource id, in first-seen order.
pub fn group_by_account(inventory: &[InventoryItem]) -> Vec<(String, Vec<&InventoryItem>)> {
    let mut groups: Vec<(String, Vec<&InventoryItem>)> = Vec::new();
    for item in inventory {
        match groups.iter_mut().find(|(id, _)| *id == item.resource_id) {
            Some((_, items)) => items.push(item),
            None => groups.push((item.resource_id.clone(), vec![item])),
        }
    }
    groups
}
