//! building-block context: ambient deployment coordinates for one run.

use crate::predicates;
use crate::validation::{validate, Outcome, RuleSet, Scope, ValidationReport};
use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

/// storage endpoint suffix of the public cloud.
pub const DEFAULT_STORAGE_ENDPOINT: &str = "core.windows.net";

/// subscription, resource group and location every resource is addressed by.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct BuildingBlock {
    #[serde(default)]
    pub subscription_id: String,
    #[serde(default)]
    pub resource_group_name: String,
    #[serde(default)]
    pub location: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cloud: Option<Cloud>,
}

/// cloud-specific endpoint suffixes.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Cloud {
    #[serde(default)]
    pub suffixes: CloudSuffixes,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct CloudSuffixes {
    #[serde(default = "default_storage_endpoint")]
    pub storage_endpoint: String,
}

impl Default for CloudSuffixes {
    fn default() -> Self {
        Self {
            storage_endpoint: default_storage_endpoint(),
        }
    }
}

fn default_storage_endpoint() -> String {
    DEFAULT_STORAGE_ENDPOINT.to_string()
}

static PRECONDITION_RULES: &RuleSet = &[
    ("subscriptionId", subscription_id_rule),
    ("resourceGroupName", predicates::not_blank),
];

fn subscription_id_rule(scope: &Scope<'_>) -> Outcome {
    if predicates::is_guid(scope.value) {
        Outcome::Valid
    } else {
        Outcome::invalid("Value must be a valid GUID")
    }
}

impl BuildingBlock {
    pub fn new(
        subscription_id: impl Into<String>,
        resource_group_name: impl Into<String>,
        location: impl Into<String>,
    ) -> Self {
        Self {
            subscription_id: subscription_id.into(),
            resource_group_name: resource_group_name.into(),
            location: location.into(),
            cloud: None,
        }
    }

    /// storage endpoint suffix, falling back to the public cloud.
    pub fn storage_endpoint(&self) -> &str {
        self.cloud
            .as_ref()
            .map(|cloud| cloud.suffixes.storage_endpoint.as_str())
            .unwrap_or(DEFAULT_STORAGE_ENDPOINT)
    }

    /// addressing fields as a json object, as stamped onto resource nodes.
    pub fn addressing(&self) -> Value {
        json!({
            "subscriptionId": self.subscription_id,
            "resourceGroupName": self.resource_group_name,
            "location": self.location,
        })
    }

    /// check the two preconditions that gate every pipeline run.
    pub fn check(&self) -> ValidationReport {
        ValidationReport::from(validate(&self.addressing(), PRECONDITION_RULES))
    }
}
