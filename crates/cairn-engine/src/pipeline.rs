//! staged pipeline: context check, merge, augment, validate, transform.
//!
//! each stage is its own type and only the previous stage can build the next
//! one, so a transform is never reached without a clean validation.

use crate::Kind;
use cairn_core::{
    augment, merge, validate, Accumulator, BuildingBlock, Customizer, Policy, TransformError,
    ValidationError, ValidationReport,
};
use serde_json::Value;
use thiserror::Error;
use tracing::debug;

/// why a run stopped.
#[derive(Debug, Error)]
pub enum PipelineError {
    /// the building-block context is unusable.
    #[error("building block settings are invalid:\n{0}")]
    Precondition(ValidationReport),
    #[error("validation failed:\n{0}")]
    Validation(ValidationReport),
    /// the input is not shaped like settings at all.
    #[error("{0}")]
    Structural(String),
    #[error(transparent)]
    Transform(#[from] TransformError),
}

impl PipelineError {
    /// the report carried by a precondition or validation failure.
    pub fn report(&self) -> Option<&ValidationReport> {
        match self {
            PipelineError::Precondition(report) | PipelineError::Validation(report) => {
                Some(report)
            }
            _ => None,
        }
    }
}

/// a kind bound to a context that passed its preconditions.
pub(crate) struct ContextStage<'a> {
    kind: Kind,
    policy: &'static dyn Policy,
    context: &'a BuildingBlock,
}

impl<'a> ContextStage<'a> {
    pub(crate) fn new(kind: Kind, context: &'a BuildingBlock) -> Result<Self, PipelineError> {
        let report = context.check();
        if report.is_err() {
            return Err(PipelineError::Precondition(report));
        }
        Ok(Self {
            kind,
            policy: kind.policy(),
            context,
        })
    }

    /// merge every instance over the kind's defaults, then the caller's.
    pub(crate) fn merge(
        self,
        settings: &Value,
        overrides: Option<&Value>,
    ) -> Result<MergedStage<'a>, PipelineError> {
        let merged = match settings {
            Value::Array(instances) => {
                let mut merged = Vec::with_capacity(instances.len());
                for (index, instance) in instances.iter().enumerate() {
                    merged.push(self.merge_instance(instance, overrides, &format!("[{index}]"))?);
                }
                Value::Array(merged)
            }
            Value::Object(_) | Value::Null => self.merge_instance(settings, overrides, "")?,
            _ => {
                return Err(PipelineError::Structural(format!(
                    "{} must be an object or an array",
                    self.kind
                )))
            }
        };
        debug!(kind = %self.kind, "merged settings");
        Ok(MergedStage {
            stage: self,
            settings: merged,
        })
    }

    fn merge_instance(
        &self,
        instance: &Value,
        overrides: Option<&Value>,
        prefix: &str,
    ) -> Result<Value, PipelineError> {
        let defaults = self
            .policy
            .defaults(instance)
            .map_err(|error| structural(self.kind, prefix, error))?;
        let mut layers = vec![defaults];
        layers.extend(overrides.cloned());
        let policy = self.policy;
        let hook: &Customizer<'_> = &|key, ours, theirs| policy.customize(key, ours, theirs);
        Ok(merge(instance, &layers, Some(hook)))
    }
}

fn structural(kind: Kind, prefix: &str, error: ValidationError) -> PipelineError {
    PipelineError::Structural(format!(
        "{kind}{prefix}{}: {}",
        error.name, error.message
    ))
}

pub(crate) struct MergedStage<'a> {
    stage: ContextStage<'a>,
    settings: Value,
}

impl<'a> MergedStage<'a> {
    /// stamp deployment coordinates onto resource nodes.
    pub(crate) fn augment(self) -> AugmentedStage<'a> {
        let policy = self.stage.policy;
        let settings = augment(&self.settings, self.stage.context, &|key| {
            policy.is_resource_key(key)
        });
        debug!(kind = %self.stage.kind, "augmented settings");
        AugmentedStage {
            stage: self.stage,
            settings,
        }
    }
}

pub(crate) struct AugmentedStage<'a> {
    stage: ContextStage<'a>,
    settings: Value,
}

impl<'a> AugmentedStage<'a> {
    /// run the kind's rules; every violation is reported at once.
    pub(crate) fn validate(self) -> Result<ValidatedStage<'a>, PipelineError> {
        let errors = validate(&self.settings, self.stage.policy.rules());
        debug!(kind = %self.stage.kind, errors = errors.len(), "validated settings");
        if !errors.is_empty() {
            return Err(PipelineError::Validation(ValidationReport::from(errors)));
        }
        Ok(ValidatedStage {
            stage: self.stage,
            settings: self.settings,
        })
    }
}

/// settings that passed every rule of their kind.
pub(crate) struct ValidatedStage<'a> {
    stage: ContextStage<'a>,
    settings: Value,
}

impl ValidatedStage<'_> {
    #[cfg(test)]
    pub(crate) fn settings(&self) -> &Value {
        &self.settings
    }

    pub(crate) fn transform(self) -> Result<Accumulator, PipelineError> {
        let instances = match self.settings {
            Value::Array(instances) => instances,
            single => vec![single],
        };
        let accumulator = self
            .stage
            .policy
            .transform(&instances, self.stage.context)?;
        debug!(
            kind = %self.stage.kind,
            collections = accumulator.collections.len(),
            "transformed settings"
        );
        Ok(accumulator)
    }
}

/// merge, augment and validate `settings` of `kind`.
pub(crate) fn prepare<'a>(
    kind: Kind,
    settings: &Value,
    overrides: Option<&Value>,
    context: &'a BuildingBlock,
) -> Result<ValidatedStage<'a>, PipelineError> {
    ContextStage::new(kind, context)?
        .merge(settings, overrides)?
        .augment()
        .validate()
}

/// full pipeline for one kind.
pub fn run(
    kind: Kind,
    settings: &Value,
    overrides: Option<&Value>,
    context: &BuildingBlock,
) -> Result<Accumulator, PipelineError> {
    debug!(kind = %kind, "running pipeline");
    prepare(kind, settings, overrides, context)?.transform()
}
