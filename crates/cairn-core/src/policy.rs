//! per-kind configuration of the merge, augment, validate and transform engine.

use crate::context::BuildingBlock;
use crate::transform::{transform_instances, Accumulator, TransformError, TransformPlan};
use crate::validation::{RuleSet, ValidationError};
use serde_json::Value;

/// everything the pipeline needs to know about one resource kind.
pub trait Policy: Sync {
    /// parameters-document key selecting the kind, e.g. `loadBalancerSettings`.
    fn key(&self) -> &'static str;

    /// built-in defaults for one settings instance.
    ///
    /// most kinds ignore the instance; kinds whose defaults depend on the
    /// input (os family, name prefix) read it and may refuse it outright.
    fn defaults(&self, instance: &Value) -> Result<Value, ValidationError>;

    /// per-key merge override, see [`crate::merge::Customizer`].
    fn customize(&self, _key: &str, _settings: Option<&Value>, _default: &Value) -> Option<Value> {
        None
    }

    /// keys whose objects are resources and get deployment coordinates.
    fn is_resource_key(&self, key: Option<&str>) -> bool {
        key.is_none()
    }

    fn rules(&self) -> &'static RuleSet;

    fn plan(&self) -> TransformPlan;

    /// turn validated instances into output collections.
    fn transform(
        &self,
        instances: &[Value],
        context: &BuildingBlock,
    ) -> Result<Accumulator, TransformError> {
        transform_instances(instances, &self.plan(), context)
    }
}
