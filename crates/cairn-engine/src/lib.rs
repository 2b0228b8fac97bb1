//! engine orchestration: load parameters, run the pipeline per kind, package output.

mod kinds;
mod loader;
mod output;
mod pipeline;

use anyhow::{anyhow, Result};
use cairn_core::{Accumulator, BuildingBlock, ValidationReport};
use serde_json::Value;
use tracing::{debug, info};

pub use kinds::Kind;
pub use loader::{
    load_defaults, load_parameters, parse_defaults, parse_parameters, OverrideDefaults,
    ParametersDocument,
};
pub use output::{deployment_parameters, CONTENT_VERSION, PARAMETERS_SCHEMA};
pub use pipeline::{run, PipelineError};

/// helper to format a validation report into a Result with a json body.
pub fn report_to_result(report: ValidationReport) -> Result<()> {
    if report.is_ok() {
        return Ok(());
    }
    Err(anyhow!("validation failed:\n{}", report.to_json()))
}

/// merge, augment and validate `settings` without transforming them.
pub fn validate(
    kind: Kind,
    settings: &Value,
    overrides: Option<&Value>,
    context: &BuildingBlock,
) -> Result<(), PipelineError> {
    pipeline::prepare(kind, settings, overrides, context).map(|_| ())
}

/// validate every kind of a document and report all rule violations together.
///
/// error names are prefixed with the settings key they belong to. context and
/// structural failures still stop the run at once.
pub fn validate_document(
    document: &ParametersDocument,
    defaults: &OverrideDefaults,
) -> Result<(), PipelineError> {
    let mut errors = Vec::new();
    for (kind, settings) in &document.settings {
        debug!(kind = %kind, "validating");
        match validate(*kind, settings, defaults.get(kind), &document.context) {
            Ok(()) => {}
            Err(PipelineError::Validation(report)) => {
                errors.extend(report.errors.into_iter().map(|mut error| {
                    error.name = format!("{kind}{}", error.name);
                    error
                }));
            }
            Err(other) => return Err(other),
        }
    }
    if errors.is_empty() {
        Ok(())
    } else {
        Err(PipelineError::Validation(ValidationReport::from(errors)))
    }
}

/// run every kind of a document in processing order and collect one accumulator.
///
/// nothing is transformed until every kind has validated.
pub fn transform_document(
    document: &ParametersDocument,
    defaults: &OverrideDefaults,
) -> Result<Accumulator, PipelineError> {
    validate_document(document, defaults)?;
    let mut accumulator = Accumulator::new();
    for (kind, settings) in &document.settings {
        let produced = run(*kind, settings, defaults.get(kind), &document.context)?;
        accumulator.absorb(produced)?;
    }
    info!(
        kinds = document.settings.len(),
        collections = accumulator.collections.len(),
        "transformed document"
    );
    Ok(accumulator)
}

/// turn a pipeline failure into an anyhow error, reports as json.
pub fn pipeline_to_result<T>(result: Result<T, PipelineError>) -> Result<T> {
    match result {
        Ok(value) => Ok(value),
        Err(PipelineError::Validation(report)) => {
            report_to_result(report)?;
            Err(anyhow!("validation failed"))
        }
        Err(PipelineError::Precondition(report)) => Err(anyhow!(
            "building block settings are invalid:\n{}",
            report.to_json()
        )),
        Err(other) => Err(other.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use cairn_core::ValidationError;
    use serde_json::json;
    use std::collections::BTreeMap;

    const SUB: &str = "00000000-0000-1000-8000-000000000000";

    fn document(settings: BTreeMap<Kind, Value>) -> ParametersDocument {
        ParametersDocument {
            context: BuildingBlock::new(SUB, "rg", "westus"),
            settings,
        }
    }

    #[test]
    fn report_to_result_carries_json_errors() {
        assert!(report_to_result(ValidationReport::default()).is_ok());
        let report = ValidationReport::from(vec![ValidationError::new(".name", "bad")]);
        let err = report_to_result(report).unwrap_err();
        assert!(err.to_string().contains(r#"[{"name":".name","message":"bad"}]"#));
    }

    #[test]
    fn document_kinds_share_one_accumulator() {
        let settings = BTreeMap::from([
            (Kind::VirtualNetwork, json!({ "name": "vnet" })),
            (
                Kind::NetworkSecurityGroup,
                json!({
                    "name": "nsg",
                    "virtualNetworks": [{ "name": "vnet", "subnets": ["default"] }]
                }),
            ),
        ]);
        let doc = document(settings);
        validate_document(&doc, &OverrideDefaults::new()).unwrap();
        let out = transform_document(&doc, &OverrideDefaults::new()).unwrap();
        assert_eq!(out.get("virtualNetworks").len(), 1);
        assert_eq!(out.get("networkSecurityGroups").len(), 1);
        assert_eq!(out.get("subnets").len(), 1);
    }

    #[test]
    fn validation_failure_becomes_json_error() {
        let doc = document(BTreeMap::from([(
            Kind::VirtualNetwork,
            json!({ "name": "", "addressPrefixes": [] }),
        )]));
        let err = pipeline_to_result(validate_document(&doc, &OverrideDefaults::new()))
            .unwrap_err()
            .to_string();
        assert!(err.contains(r#""name":"virtualNetworkSettings.name""#), "{err}");
        assert!(err.contains(r#""name":"virtualNetworkSettings.addressPrefixes""#), "{err}");
    }

    #[test]
    fn every_failing_kind_is_reported_together() {
        let doc = document(BTreeMap::from([
            (Kind::VirtualNetwork, json!({ "name": "" })),
            (Kind::NetworkSecurityGroup, json!({ "name": "" })),
        ]));
        let err = validate_document(&doc, &OverrideDefaults::new()).unwrap_err();
        let names: Vec<_> = err
            .report()
            .unwrap()
            .errors
            .iter()
            .map(|error| error.name.as_str())
            .collect();
        assert!(names.contains(&"virtualNetworkSettings.name"), "{names:?}");
        assert!(names.contains(&"networkSecurityGroupsSettings.name"), "{names:?}");
    }

    #[test]
    fn later_kind_failure_stops_transform_before_any_output() {
        let doc = document(BTreeMap::from([
            (Kind::VirtualNetwork, json!({ "name": "vnet" })),
            (Kind::NetworkSecurityGroup, json!({ "name": "" })),
        ]));
        let err = transform_document(&doc, &OverrideDefaults::new()).unwrap_err();
        assert!(matches!(err, PipelineError::Validation(_)));
    }
}
