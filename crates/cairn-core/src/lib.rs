//! core merge, validation, augmentation and transform primitives for cairn.

pub mod augment;
pub mod context;
pub mod merge;
pub mod policy;
pub mod predicates;
pub mod resource_id;
pub mod transform;
pub mod validation;

pub use augment::augment;
pub use context::{BuildingBlock, Cloud, CloudSuffixes, DEFAULT_STORAGE_ENDPOINT};
pub use merge::{merge, merge_object, merge_with_template, Customizer};
pub use policy::Policy;
pub use resource_id::{node_resource_id, resource_id, ResourceIdError};
pub use transform::{
    fan_out, fold_properties, merge_fragment, transform_instances, transform_into, Accumulator,
    ChildArgs, ChildHandler, ChildTable, FieldHandler, HandlerArgs, HandlerTable,
    ResourceDescriptor, TransformError, TransformPlan, SECRET_PLACEHOLDER,
};
pub use validation::{
    validate, Lineage, Outcome, RuleFn, RuleSet, Scope, ValidationError, ValidationReport,
};

/// json object map used for settings nodes and property bags.
pub type JsonMap = serde_json::Map<String, serde_json::Value>;
