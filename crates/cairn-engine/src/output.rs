//! packaging of a run's collections as a deployment-parameters document.

use cairn_core::Accumulator;
use serde_json::{json, Map, Value};

pub const PARAMETERS_SCHEMA: &str =
    "https://schema.management.azure.com/schemas/2015-01-01/deploymentParameters.json#";
pub const CONTENT_VERSION: &str = "1.0.0.0";

/// `{$schema, contentVersion, parameters: {collection: {value}}}`, with the
/// run's secret as one more parameter when there is one.
pub fn deployment_parameters(accumulator: &Accumulator) -> Value {
    let mut parameters = Map::new();
    for (collection, resources) in &accumulator.collections {
        parameters.insert(collection.clone(), json!({ "value": resources }));
    }
    if let Some(secret) = &accumulator.secret {
        parameters.insert("secret".to_string(), json!({ "value": secret }));
    }
    json!({
        "$schema": PARAMETERS_SCHEMA,
        "contentVersion": CONTENT_VERSION,
        "parameters": parameters,
    })
}
