//! virtual machines: per-os defaults, stamping by `vmCount`, and the
//! dependent nics, public ips, storage accounts and availability set.
//!
//! settings describe a group of identical vms. the transform stamps each group
//! into `vmCount` copies named `{namePrefix}-vm{i+1}` before running the
//! handler tables, so the stamp index doubles as the vm index within the group
//! for static ips, computer names and storage round-robin. groups share one
//! accumulator.

use super::{
    availability_set, flag, network_interface, optional_tags, positive, reference, storage, text,
    vm_count,
};
use crate::Kind;
use cairn_core::predicates::{self, is_nil_or_blank, is_string_in};
use cairn_core::{
    fan_out, merge_with_template, node_resource_id, transform_into, Accumulator,
    BuildingBlock, ChildArgs, ChildTable, HandlerArgs, HandlerTable, Outcome, Policy, RuleSet,
    Scope, TransformError, TransformPlan, ValidationError, SECRET_PLACEHOLDER,
};
use serde_json::{json, Value};
use tracing::debug;

pub(crate) struct VirtualMachine;

const OS_TYPES: [&str; 2] = ["windows", "linux"];
const AUTHENTICATION_TYPES: [&str; 2] = ["ssh", "password"];
const CACHING_TYPES: [&str; 3] = ["None", "ReadOnly", "ReadWrite"];
const CREATE_OPTIONS: [&str; 3] = ["fromImage", "empty", "attach"];
const VAULT_TYPE: &str = "Microsoft.KeyVault/vaults";

fn shared_defaults(name_prefix: &str) -> Value {
    let mut nic = network_interface::defaults();
    nic["isPublic"] = json!(false);
    json!({
        "vmCount": 1,
        "osDisk": { "caching": "ReadWrite", "createOption": "fromImage" },
        "adminUsername": "adminUser",
        "storageAccounts": storage::storage_defaults(),
        "diagnosticStorageAccounts": storage::diagnostic_defaults(),
        "nics": [nic],
        "availabilitySet": availability_set::defaults(name_prefix),
        "dataDisks": {
            "count": 0,
            "properties": { "diskSizeGB": 127, "caching": "None", "createOption": "empty" }
        },
        "tags": {}
    })
}

fn windows_defaults(name_prefix: &str) -> Value {
    let mut defaults = shared_defaults(name_prefix);
    defaults["size"] = json!("Standard_DS2_v2");
    defaults["imageReference"] = json!({
        "publisher": "MicrosoftWindowsServer",
        "offer": "WindowsServer",
        "sku": "2016-Datacenter",
        "version": "latest"
    });
    defaults["osAuthenticationType"] = json!("password");
    defaults["existingWindowsServerlicense"] = json!(false);
    defaults
}

fn linux_defaults(name_prefix: &str) -> Value {
    let mut defaults = shared_defaults(name_prefix);
    defaults["size"] = json!("Standard_DS1_v2");
    defaults["imageReference"] = json!({
        "publisher": "Canonical",
        "offer": "UbuntuServer",
        "sku": "16.04-LTS",
        "version": "latest"
    });
    defaults["osAuthenticationType"] = json!("ssh");
    defaults
}

fn os_type(vm: &Value) -> &str {
    vm.get("osDisk")
        .map(|disk| text(disk, "osType"))
        .unwrap_or_default()
}

fn display(value: Option<&Value>) -> String {
    match value {
        None => "undefined".to_string(),
        Some(Value::String(raw)) => raw.clone(),
        Some(other) => other.to_string(),
    }
}

impl Policy for VirtualMachine {
    fn key(&self) -> &'static str {
        Kind::VirtualMachine.key()
    }

    /// the os family picks the defaults, so it has to be readable before merging.
    fn defaults(&self, instance: &Value) -> Result<Value, ValidationError> {
        let disk = instance
            .get("osDisk")
            .filter(|disk| disk.is_object())
            .ok_or_else(|| {
                ValidationError::new(
                    ".osDisk",
                    format!("Invalid value: {}", display(instance.get("osDisk"))),
                )
            })?;
        let name_prefix = text(instance, "namePrefix");
        match text(disk, "osType") {
            "windows" => Ok(windows_defaults(name_prefix)),
            "linux" => Ok(linux_defaults(name_prefix)),
            _ => Err(ValidationError::new(
                ".osDisk.osType",
                format!(
                    "Invalid value: {}. Valid values for 'osType' are: {}",
                    display(disk.get("osType")),
                    predicates::allowed_list(&OS_TYPES)
                ),
            )),
        }
    }

    /// nics merge over the nic defaults; more than one nic drops the primary default.
    fn customize(&self, key: &str, settings: Option<&Value>, default: &Value) -> Option<Value> {
        if key != "nics" {
            return None;
        }
        let given = settings.and_then(Value::as_array)?;
        let mut template = network_interface::defaults();
        if let Some(Value::Object(head)) = default.as_array().and_then(|list| list.first()) {
            for (field, value) in head {
                template[field.as_str()] = value.clone();
            }
        }
        if given.len() > 1 {
            template["isPrimary"] = json!(false);
        }
        let template = template.as_object().cloned().unwrap_or_default();
        Some(Value::Array(merge_with_template(given, &template, None)))
    }

    fn is_resource_key(&self, key: Option<&str>) -> bool {
        matches!(
            key,
            None | Some(
                "virtualNetwork"
                    | "availabilitySet"
                    | "nics"
                    | "diagnosticStorageAccounts"
                    | "storageAccounts"
                    | "encryptionSettings"
                    | "loadBalancerSettings"
            )
        )
    }

    fn rules(&self) -> &'static RuleSet {
        RULES
    }

    fn plan(&self) -> TransformPlan {
        TransformPlan {
            collection: "virtualMachines",
            children: CHILDREN,
            handlers: HANDLERS,
        }
    }

    fn transform(
        &self,
        instances: &[Value],
        context: &BuildingBlock,
    ) -> Result<Accumulator, TransformError> {
        let plan = self.plan();
        let mut accumulator = Accumulator::new();
        for instance in instances {
            let count = instance.get("vmCount").and_then(Value::as_u64).unwrap_or(1) as usize;
            let prefix = text(instance, "namePrefix");
            let stamps = fan_out(instance, count, |index| format!("{prefix}-vm{}", index + 1));
            debug!(prefix, stamps = stamps.len(), "stamped virtual machines");
            transform_into(&stamps, &plan, context, &mut accumulator)?;
        }
        Ok(accumulator)
    }
}

static RULES: &RuleSet = &[
    ("virtualNetwork", virtual_network),
    ("vmCount", vm_count),
    ("namePrefix", predicates::not_blank),
    ("computerNamePrefix", computer_name_prefix),
    ("size", predicates::not_blank),
    ("osDisk", os_disk),
    ("dataDisks", data_disks),
    ("existingWindowsServerlicense", windows_license),
    ("adminUsername", predicates::not_blank),
    ("osAuthenticationType", authentication_type),
    ("adminPassword", admin_password),
    ("sshPublicKey", ssh_public_key),
    ("storageAccounts", storage_accounts),
    ("diagnosticStorageAccounts", diagnostic_storage_accounts),
    ("nics", nics),
    ("availabilitySet", availability_set::availability_set),
    ("loadBalancerSettings", load_balancer_settings),
    ("tags", optional_tags),
];

static NAMED_RULES: &RuleSet = &[("name", predicates::not_blank)];

static OS_DISK_RULES: &RuleSet = &[
    ("caching", caching),
    ("createOption", os_create_option),
    ("image", os_image),
    ("osType", os_type_rule),
    ("diskSizeGB", disk_size),
    ("encryptionSettings", encryption_settings),
];

static ENCRYPTION_RULES: &RuleSet = &[
    ("enabled", predicates::boolean),
    ("diskEncryptionKey", disk_encryption_key),
    ("keyEncryptionKey", key_encryption_key),
];

static DISK_KEY_RULES: &RuleSet = &[
    ("secretUrl", predicates::not_blank),
    ("sourceVaultName", predicates::not_blank),
];

static KEY_KEY_RULES: &RuleSet = &[
    ("keyUrl", predicates::not_blank),
    ("sourceVaultName", predicates::not_blank),
];

static DATA_DISK_RULES: &RuleSet = &[
    ("count", data_disk_count),
    ("properties", data_disk_properties),
];

static DATA_DISK_PROPERTY_RULES: &RuleSet = &[
    ("caching", caching),
    ("createOption", data_create_option),
    ("image", data_image),
    ("diskSizeGB", data_disk_size),
];

fn virtual_network(_: &Scope<'_>) -> Outcome {
    Outcome::Descend(NAMED_RULES)
}

fn load_balancer_settings(scope: &Scope<'_>) -> Outcome {
    if scope.is_nil() {
        Outcome::Valid
    } else {
        Outcome::Descend(NAMED_RULES)
    }
}

fn computer_name_prefix(scope: &Scope<'_>) -> Outcome {
    Outcome::check(
        !is_nil_or_blank(scope.value) && scope.as_str().is_some_and(|raw| raw.chars().count() < 7),
        "Value cannot be longer than 6 characters",
    )
}

fn os_disk(_: &Scope<'_>) -> Outcome {
    Outcome::Descend(OS_DISK_RULES)
}

fn data_disks(_: &Scope<'_>) -> Outcome {
    Outcome::Descend(DATA_DISK_RULES)
}

fn caching(scope: &Scope<'_>) -> Outcome {
    predicates::one_of(scope, &CACHING_TYPES)
}

/// true when the vm at `depth` levels above the rule's object uses managed disks.
fn managed_at(scope: &Scope<'_>, depth: usize) -> bool {
    scope
        .lineage
        .ancestor(depth)
        .and_then(|vm| vm.get("storageAccounts"))
        .is_some_and(|storage| flag(storage, "managed"))
}

fn create_option(scope: &Scope<'_>, depth: usize) -> Outcome {
    if !is_string_in(scope.value, &CREATE_OPTIONS) {
        return predicates::one_of(scope, &CREATE_OPTIONS);
    }
    Outcome::check(
        !(scope.as_str() == Some("attach") && managed_at(scope, depth)),
        "Value cannot be attach with managed disks",
    )
}

fn os_create_option(scope: &Scope<'_>) -> Outcome {
    create_option(scope, 1)
}

fn data_create_option(scope: &Scope<'_>) -> Outcome {
    create_option(scope, 2)
}

fn image(scope: &Scope<'_>, owner: &str) -> Outcome {
    if scope.sibling_str("createOption") != Some("attach") {
        return Outcome::Valid;
    }
    Outcome::check(
        !is_nil_or_blank(scope.value),
        format!(
            "Value of image cannot be null or empty, if value of {owner}.createOption is attach"
        ),
    )
}

fn os_image(scope: &Scope<'_>) -> Outcome {
    image(scope, ".osDisk")
}

fn data_image(scope: &Scope<'_>) -> Outcome {
    image(scope, ".dataDisks")
}

fn os_type_rule(scope: &Scope<'_>) -> Outcome {
    predicates::one_of(scope, &OS_TYPES)
}

fn disk_size(scope: &Scope<'_>) -> Outcome {
    if scope.value.is_none() {
        Outcome::Valid
    } else {
        positive(scope)
    }
}

fn data_disk_size(scope: &Scope<'_>) -> Outcome {
    positive(scope)
}

fn encryption_settings(scope: &Scope<'_>) -> Outcome {
    if scope.is_nil() {
        Outcome::Valid
    } else {
        Outcome::Descend(ENCRYPTION_RULES)
    }
}

fn disk_encryption_key(_: &Scope<'_>) -> Outcome {
    Outcome::Descend(DISK_KEY_RULES)
}

fn key_encryption_key(_: &Scope<'_>) -> Outcome {
    Outcome::Descend(KEY_KEY_RULES)
}

fn data_disk_count(scope: &Scope<'_>) -> Outcome {
    Outcome::check(
        scope.value.and_then(Value::as_u64).is_some(),
        "Invalid value for count",
    )
}

fn data_disk_properties(_: &Scope<'_>) -> Outcome {
    Outcome::Descend(DATA_DISK_PROPERTY_RULES)
}

fn windows_license(scope: &Scope<'_>) -> Outcome {
    if scope.value.is_none() {
        return Outcome::Valid;
    }
    if !predicates::is_bool(scope.value) {
        return Outcome::invalid("Value must be a boolean");
    }
    Outcome::check(
        scope.value == Some(&Value::Bool(false)) || os_type(scope.parent) == "windows",
        "Value can only be true when osType is windows",
    )
}

fn authentication_type(scope: &Scope<'_>) -> Outcome {
    if !is_string_in(scope.value, &AUTHENTICATION_TYPES) {
        return Outcome::invalid(format!(
            "Valid values for 'osAuthenticationType' are: {}",
            predicates::allowed_list(&AUTHENTICATION_TYPES)
        ));
    }
    Outcome::check(
        !(scope.as_str() == Some("ssh") && os_type(scope.parent) == "windows"),
        "Valid value for osAuthenticationType for windows is: password",
    )
}

fn admin_password(scope: &Scope<'_>) -> Outcome {
    if scope.sibling_str("osAuthenticationType") != Some("password") {
        return Outcome::Valid;
    }
    Outcome::check(
        !is_nil_or_blank(scope.value),
        "adminPassword cannot be null, empty, or only whitespace if osAuthenticationType is password",
    )
}

fn ssh_public_key(scope: &Scope<'_>) -> Outcome {
    if scope.sibling_str("osAuthenticationType") != Some("ssh") {
        return Outcome::Valid;
    }
    Outcome::check(
        !is_nil_or_blank(scope.value),
        "sshPublicKey cannot be null, empty, or only whitespace if osAuthenticationType is ssh",
    )
}

fn storage_accounts(_: &Scope<'_>) -> Outcome {
    Outcome::Descend(storage::STORAGE_RULES)
}

fn diagnostic_storage_accounts(_: &Scope<'_>) -> Outcome {
    Outcome::Descend(storage::DIAGNOSTIC_RULES)
}

fn nics(scope: &Scope<'_>) -> Outcome {
    let Some(list) = scope.value.and_then(Value::as_array) else {
        return Outcome::invalid("Value must be an array");
    };
    let primaries = list.iter().filter(|nic| flag(nic, "isPrimary")).count();
    if primaries != 1 {
        return Outcome::invalid("Virtual machine can have only 1 primary NetworkInterface.");
    }
    Outcome::Descend(network_interface::RULES)
}

static CHILDREN: &ChildTable = &[
    ("storageAccounts", storage_child),
    ("diagnosticStorageAccounts", diagnostic_child),
    ("nics", nics_child),
    ("availabilitySet", availability_set_child),
    ("osDisk", secret_child),
];

/// storage accounts are shared by a vm group, so only its first stamp creates them.
fn storage_child(
    args: &ChildArgs<'_>,
    accumulator: &mut Accumulator,
) -> Result<(), TransformError> {
    group_accounts(args, storage::STORAGE, accumulator)
}

fn diagnostic_child(
    args: &ChildArgs<'_>,
    accumulator: &mut Accumulator,
) -> Result<(), TransformError> {
    group_accounts(args, storage::DIAGNOSTIC, accumulator)
}

fn group_accounts(
    args: &ChildArgs<'_>,
    collection: &str,
    accumulator: &mut Accumulator,
) -> Result<(), TransformError> {
    if args.index > 0 {
        return Ok(());
    }
    let prefix = text(args.instance, "namePrefix");
    storage::build(args.value, collection, prefix, args.context, accumulator)
}

fn nics_child(args: &ChildArgs<'_>, accumulator: &mut Accumulator) -> Result<(), TransformError> {
    network_interface::build(args.instance, args.index, args.context, accumulator)
}

fn availability_set_child(
    args: &ChildArgs<'_>,
    accumulator: &mut Accumulator,
) -> Result<(), TransformError> {
    let vm_count = args.instance.get("vmCount").and_then(Value::as_u64).unwrap_or(1);
    if !availability_set::is_created(args.value, vm_count) {
        return Ok(());
    }
    let managed = args
        .instance
        .get("storageAccounts")
        .is_some_and(|storage| flag(storage, "managed"));
    availability_set::build(args.value, managed, args.context, accumulator)
}

/// the ssh key for linux vms using ssh, the admin password otherwise.
fn secret_child(
    args: &ChildArgs<'_>,
    accumulator: &mut Accumulator,
) -> Result<(), TransformError> {
    let vm = args.instance;
    let key = if text(args.value, "osType") == "linux"
        && text(vm, "osAuthenticationType").eq_ignore_ascii_case("ssh")
    {
        "sshPublicKey"
    } else {
        "adminPassword"
    };
    if let Some(secret) = vm.get(key).filter(|secret| !secret.is_null()) {
        accumulator.set_secret(secret.clone())?;
    }
    Ok(())
}

static HANDLERS: &HandlerTable = &[
    ("existingWindowsServerlicense", license_type),
    ("availabilitySet", availability_set_reference),
    ("size", hardware_profile),
    ("imageReference", image_reference),
    ("osDisk", os_disk_properties),
    ("dataDisks", data_disk_properties_handler),
    ("nics", network_profile),
    ("diagnosticStorageAccounts", diagnostics_profile),
    ("computerNamePrefix", computer_name),
    ("adminPassword", password_profile),
    ("sshPublicKey", ssh_profile),
    ("adminUsername", admin_username),
];

fn license_type(args: &HandlerArgs<'_>) -> Result<Option<Value>, TransformError> {
    if os_type(args.parent) == "windows" && args.value.as_bool() == Some(true) {
        Ok(Some(json!({ "licenseType": "Windows_Server" })))
    } else {
        Ok(None)
    }
}

fn availability_set_reference(args: &HandlerArgs<'_>) -> Result<Option<Value>, TransformError> {
    let set = args.value;
    let vm_count = args.parent.get("vmCount").and_then(Value::as_u64).unwrap_or(1);
    if !flag(set, "useExistingAvailabilitySet") && vm_count < 2 {
        return Ok(Some(json!({ "availabilitySet": null })));
    }
    Ok(Some(json!({
        "availabilitySet": reference(availability_set::id(set)?)
    })))
}

fn hardware_profile(args: &HandlerArgs<'_>) -> Result<Option<Value>, TransformError> {
    Ok(Some(json!({ "hardwareProfile": { "vmSize": args.value } })))
}

fn image_reference(args: &HandlerArgs<'_>) -> Result<Option<Value>, TransformError> {
    Ok(Some(json!({ "storageProfile": { "imageReference": args.value } })))
}

/// `http://{account}.blob.{endpoint}`, picking accounts round-robin by vm index.
fn blob_endpoint(
    args: &HandlerArgs<'_>,
    block_key: &str,
    collection: &str,
) -> Result<String, TransformError> {
    let vm = args.parent;
    let block = vm
        .get(block_key)
        .ok_or_else(|| TransformError::missing(text(vm, "name"), block_key))?;
    let prefix = text(vm, "namePrefix");
    let names = storage::account_names(block, collection, prefix, args.context);
    if names.is_empty() {
        return Err(TransformError::missing(
            text(vm, "name"),
            format!("{block_key}.accounts"),
        ));
    }
    let account = &names[args.index % names.len()];
    Ok(format!(
        "http://{account}.blob.{}",
        args.context.storage_endpoint()
    ))
}

/// where a disk lives: an attached image, a managed disk, or a vhd blob.
fn disk_location(
    args: &HandlerArgs<'_>,
    create_option: &str,
    image: Option<&Value>,
    vhd_name: &str,
    disk: &mut Value,
) -> Result<(), TransformError> {
    let vm = args.parent;
    let storage_block = vm.get("storageAccounts").cloned().unwrap_or(Value::Null);
    if create_option == "attach" {
        disk["image"] = json!({ "uri": image });
    } else if flag(&storage_block, "managed") {
        disk["managedDisk"] = json!({ "storageAccountType": storage_block.get("skuType") });
    } else {
        let endpoint = blob_endpoint(args, "storageAccounts", storage::STORAGE)?;
        disk["vhd"] = json!({ "uri": format!("{endpoint}/vhds/{vhd_name}") });
    }
    Ok(())
}

fn vault_id(vm: &Value, encryption: &Value, key: &Value) -> Result<String, TransformError> {
    let owner = if encryption.get("subscriptionId").is_some() {
        encryption
    } else {
        vm
    };
    Ok(node_resource_id(
        owner,
        VAULT_TYPE,
        &[text(key, "sourceVaultName")],
    )?)
}

fn os_disk_properties(args: &HandlerArgs<'_>) -> Result<Option<Value>, TransformError> {
    let vm = args.parent;
    let settings = args.value;
    let vm_name = text(vm, "name");
    let mut disk = json!({
        "name": format!("{vm_name}-os.vhd"),
        "createOption": settings.get("createOption"),
        "caching": settings.get("caching"),
        "osType": settings.get("osType"),
    });
    if let Some(size) = settings.get("diskSizeGB") {
        disk["diskSizeGB"] = size.clone();
    }
    if let Some(encryption) = settings.get("encryptionSettings").filter(|e| e.is_object()) {
        let disk_key = encryption.get("diskEncryptionKey").cloned().unwrap_or(Value::Null);
        let key_key = encryption.get("keyEncryptionKey").cloned().unwrap_or(Value::Null);
        disk["encryptionSettings"] = json!({
            "diskEncryptionKey": {
                "secretUrl": disk_key.get("secretUrl"),
                "sourceVault": reference(vault_id(vm, encryption, &disk_key)?),
            },
            "keyEncryptionKey": {
                "keyUrl": key_key.get("keyUrl"),
                "sourceVault": reference(vault_id(vm, encryption, &key_key)?),
            },
            "enabled": true,
        });
    }
    disk_location(
        args,
        text(settings, "createOption"),
        settings.get("image"),
        &format!("{vm_name}-os.vhd"),
        &mut disk,
    )?;
    Ok(Some(json!({ "storageProfile": { "osDisk": disk } })))
}

fn data_disk_properties_handler(args: &HandlerArgs<'_>) -> Result<Option<Value>, TransformError> {
    let vm_name = text(args.parent, "name");
    let count = args.value.get("count").and_then(Value::as_u64).unwrap_or(0);
    let properties = args.value.get("properties").cloned().unwrap_or(Value::Null);
    let mut disks = Vec::new();
    for lun in 0..count {
        let mut disk = json!({
            "name": format!("dataDisk{}", lun + 1),
            "diskSizeGB": properties.get("diskSizeGB"),
            "lun": lun,
            "caching": properties.get("caching"),
            "createOption": properties.get("createOption"),
        });
        disk_location(
            args,
            text(&properties, "createOption"),
            properties.get("image"),
            &format!("{vm_name}-dataDisk{}.vhd", lun + 1),
            &mut disk,
        )?;
        disks.push(disk);
    }
    Ok(Some(json!({ "storageProfile": { "dataDisks": disks } })))
}

/// nics built for this vm, found by name in the accumulator.
fn network_profile(args: &HandlerArgs<'_>) -> Result<Option<Value>, TransformError> {
    let vm = args.parent;
    let vm_name = text(vm, "name");
    let mut interfaces = Vec::new();
    for nic in args.accumulator.get(network_interface::COLLECTION) {
        let nic_name = text(nic, "name");
        if !nic_name.starts_with(&format!("{vm_name}-nic")) {
            continue;
        }
        let id = node_resource_id(vm, network_interface::RESOURCE_TYPE, &[nic_name])?;
        interfaces.push(json!({
            "id": id,
            "properties": { "primary": nic["properties"]["primary"] },
        }));
    }
    Ok(Some(json!({ "networkProfile": { "networkInterfaces": interfaces } })))
}

fn diagnostics_profile(args: &HandlerArgs<'_>) -> Result<Option<Value>, TransformError> {
    let endpoint = blob_endpoint(args, "diagnosticStorageAccounts", storage::DIAGNOSTIC)?;
    Ok(Some(json!({
        "diagnosticsProfile": { "bootDiagnostics": { "enabled": true, "storageUri": endpoint } }
    })))
}

fn computer_name(args: &HandlerArgs<'_>) -> Result<Option<Value>, TransformError> {
    let prefix = args.value.as_str().unwrap_or_default();
    Ok(Some(json!({
        "osProfile": { "computerName": format!("{prefix}-vm{}", args.index + 1) }
    })))
}

fn password_profile(args: &HandlerArgs<'_>) -> Result<Option<Value>, TransformError> {
    if !text(args.parent, "osAuthenticationType").eq_ignore_ascii_case("password") {
        return Ok(None);
    }
    if os_type(args.parent) == "windows" {
        Ok(Some(json!({
            "osProfile": {
                "adminPassword": SECRET_PLACEHOLDER,
                "windowsConfiguration": { "provisionVmAgent": true }
            }
        })))
    } else {
        Ok(Some(json!({
            "osProfile": { "adminPassword": SECRET_PLACEHOLDER, "linuxConfiguration": null }
        })))
    }
}

fn ssh_profile(args: &HandlerArgs<'_>) -> Result<Option<Value>, TransformError> {
    if !text(args.parent, "osAuthenticationType").eq_ignore_ascii_case("ssh") {
        return Ok(None);
    }
    let user = text(args.parent, "adminUsername");
    Ok(Some(json!({
        "osProfile": {
            "adminPassword": null,
            "linuxConfiguration": {
                "disablePasswordAuthentication": true,
                "ssh": {
                    "publicKeys": [{
                        "path": format!("/home/{user}/.ssh/authorized_keys"),
                        "keyData": SECRET_PLACEHOLDER
                    }]
                }
            }
        }
    })))
}

fn admin_username(args: &HandlerArgs<'_>) -> Result<Option<Value>, TransformError> {
    Ok(Some(json!({ "osProfile": { "adminUsername": args.value } })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use super::super::MAX_VM_COUNT;
    use cairn_core::{merge, validate};

    /// extra defaults layered under the settings, as a caller would supply them.
    fn with_overrides(settings: &Value, overrides: &Value) -> Value {
        merge(settings, &[overrides.clone()], None)
    }

    const SUB: &str = "00000000-0000-1000-8000-000000000000";

    fn context() -> BuildingBlock {
        BuildingBlock::new(SUB, "test-rg", "westus")
    }

    fn windows() -> Value {
        json!({
            "vmCount": 3,
            "namePrefix": "web",
            "computerNamePrefix": "web",
            "adminPassword": "P@ss1",
            "virtualNetwork": { "name": "vnet" },
            "osDisk": { "osType": "windows" },
            "nics": [{ "subnetName": "web" }]
        })
    }

    fn prepare(settings: &Value) -> Value {
        super::super::prepare(&VirtualMachine, settings, &context())
    }

    #[test]
    fn missing_os_disk_is_refused_before_merge() {
        let err = VirtualMachine.defaults(&json!({ "namePrefix": "web" })).unwrap_err();
        assert_eq!(err.name, ".osDisk");
        assert_eq!(err.message, "Invalid value: undefined");

        let err = VirtualMachine
            .defaults(&json!({ "osDisk": { "osType": "bsd" } }))
            .unwrap_err();
        assert_eq!(err.name, ".osDisk.osType");
        assert_eq!(
            err.message,
            "Invalid value: bsd. Valid values for 'osType' are: windows, linux"
        );
    }

    #[test]
    fn defaults_follow_the_os_family() {
        let merged = prepare(&windows());
        assert_eq!(merged["size"], "Standard_DS2_v2");
        assert_eq!(merged["osAuthenticationType"], "password");
        assert_eq!(merged["availabilitySet"]["name"], "web-as");
        assert_eq!(merged["nics"][0]["isPrimary"], true);
        assert_eq!(merged["nics"][0]["isPublic"], false);
        assert_eq!(merged["nics"][0]["subscriptionId"], SUB);

        let mut linux = windows();
        linux["osDisk"]["osType"] = json!("linux");
        let merged = prepare(&linux);
        assert_eq!(merged["size"], "Standard_DS1_v2");
        assert_eq!(merged["osAuthenticationType"], "ssh");
        assert_eq!(merged["imageReference"]["publisher"], "Canonical");
    }

    #[test]
    fn several_nics_default_to_non_primary() {
        let mut settings = windows();
        settings["nics"] = json!([
            { "subnetName": "web", "isPrimary": true },
            { "subnetName": "biz" }
        ]);
        let merged = prepare(&settings);
        assert_eq!(merged["nics"][1]["isPrimary"], false);
        assert!(validate(&merged, RULES).is_empty());

        settings["nics"][0]["isPrimary"] = json!(false);
        let errors = validate(&prepare(&settings), RULES);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].name, ".nics");
        assert_eq!(
            errors[0].message,
            "Virtual machine can have only 1 primary NetworkInterface."
        );
    }

    #[test]
    fn windows_scenario_validates_cleanly() {
        let errors = validate(&prepare(&windows()), RULES);
        assert!(errors.is_empty(), "{errors:?}");
    }

    #[test]
    fn authentication_rules_depend_on_os() {
        let mut settings = windows();
        settings["osAuthenticationType"] = json!("ssh");
        settings["computerNamePrefix"] = json!("toolongname");
        let errors = validate(&prepare(&settings), RULES);
        let names: Vec<_> = errors.iter().map(|error| error.name.as_str()).collect();
        assert_eq!(
            names,
            vec![".computerNamePrefix", ".osAuthenticationType", ".sshPublicKey"]
        );
        assert_eq!(
            errors[1].message,
            "Valid value for osAuthenticationType for windows is: password"
        );
    }

    #[test]
    fn attach_is_refused_with_managed_disks() {
        let mut settings = windows();
        settings["osDisk"]["createOption"] = json!("attach");
        settings["dataDisks"] = json!({ "count": 1, "properties": { "createOption": "attach" } });
        let errors = validate(&prepare(&settings), RULES);
        let names: Vec<_> = errors.iter().map(|error| error.name.as_str()).collect();
        assert_eq!(
            names,
            vec![
                ".osDisk.createOption",
                ".osDisk.image",
                ".dataDisks.properties.createOption",
                ".dataDisks.properties.image",
            ]
        );
    }

    #[test]
    fn license_only_on_windows() {
        let mut settings = windows();
        settings["osDisk"]["osType"] = json!("linux");
        settings["osAuthenticationType"] = json!("password");
        settings["existingWindowsServerlicense"] = json!(true);
        let errors = validate(&prepare(&settings), RULES);
        assert_eq!(errors.len(), 1);
        assert_eq!(errors[0].name, ".existingWindowsServerlicense");
    }

    #[test]
    fn fan_out_names_vms_and_their_nics() {
        let out = VirtualMachine
            .transform(&[prepare(&windows())], &context())
            .unwrap();
        let names: Vec<_> = out
            .get("virtualMachines")
            .iter()
            .map(|vm| vm["name"].as_str().unwrap())
            .collect();
        assert_eq!(names, vec!["web-vm1", "web-vm2", "web-vm3"]);
        let nics: Vec<_> = out
            .get("nics")
            .iter()
            .map(|nic| nic["name"].as_str().unwrap())
            .collect();
        assert_eq!(nics, vec!["web-vm1-nic1", "web-vm2-nic1", "web-vm3-nic1"]);

        let second = &out.get("virtualMachines")[1]["properties"];
        assert_eq!(second["osProfile"]["computerName"], "web-vm2");
        assert_eq!(second["hardwareProfile"]["vmSize"], "Standard_DS2_v2");
        assert_eq!(second["storageProfile"]["osDisk"]["name"], "web-vm2-os.vhd");
        assert_eq!(
            second["storageProfile"]["osDisk"]["managedDisk"]["storageAccountType"],
            "Premium_LRS"
        );
        let interfaces = second["networkProfile"]["networkInterfaces"].as_array().unwrap();
        assert_eq!(interfaces.len(), 1);
        assert!(interfaces[0]["id"].as_str().unwrap().ends_with("/web-vm2-nic1"));
        assert!(second["availabilitySet"]["id"]
            .as_str()
            .unwrap()
            .ends_with("/Microsoft.Compute/availabilitySets/web-as"));
        assert_eq!(out.get("availabilitySet").len(), 1);
        assert_eq!(out.get("diagnosticStorageAccounts").len(), 1);
        assert!(out.get("storageAccounts").is_empty());
    }

    #[test]
    fn secret_is_written_once() {
        let out = VirtualMachine
            .transform(&[prepare(&windows())], &context())
            .unwrap();
        assert_eq!(out.secret, Some(json!("P@ss1")));
        let rendered = serde_json::to_string(&out).unwrap();
        assert_eq!(rendered.matches("P@ss1").count(), 1);
        let profile = &out.get("virtualMachines")[0]["properties"]["osProfile"];
        assert_eq!(profile["adminPassword"], SECRET_PLACEHOLDER);
        assert_eq!(profile["windowsConfiguration"]["provisionVmAgent"], true);
    }

    #[test]
    fn linux_ssh_profile_uses_the_key_as_secret() {
        let mut settings = windows();
        settings["osDisk"]["osType"] = json!("linux");
        settings["sshPublicKey"] = json!("ssh-rsa AAAA");
        settings["vmCount"] = json!(1);
        let prepared = prepare(&settings);
        assert!(validate(&prepared, RULES).is_empty());
        let out = VirtualMachine.transform(&[prepared], &context()).unwrap();
        assert_eq!(out.secret, Some(json!("ssh-rsa AAAA")));
        let vm = &out.get("virtualMachines")[0]["properties"];
        assert_eq!(vm["osProfile"]["adminPassword"], Value::Null);
        assert_eq!(
            vm["osProfile"]["linuxConfiguration"]["ssh"]["publicKeys"][0]["path"],
            "/home/adminUser/.ssh/authorized_keys"
        );
        assert_eq!(vm["availabilitySet"], Value::Null);
        assert!(out.get("availabilitySet").is_empty());
    }

    #[test]
    fn unmanaged_disks_use_round_robin_vhd_accounts() {
        let overrides = json!({
            "storageAccounts": { "managed": false, "skuType": "Standard_LRS", "count": 2 },
            "dataDisks": { "count": 1 }
        });
        let settings = with_overrides(&windows(), &overrides);
        let prepared = prepare(&settings);
        assert!(validate(&prepared, RULES).is_empty());
        let out = VirtualMachine.transform(&[prepared], &context()).unwrap();
        let accounts: Vec<_> = out
            .get("storageAccounts")
            .iter()
            .map(|account| account["name"].as_str().unwrap().to_string())
            .collect();
        assert_eq!(accounts.len(), 2);
        let vms = out.get("virtualMachines");
        let uri = |vm: &Value| vm["properties"]["storageProfile"]["osDisk"]["vhd"]["uri"].clone();
        assert_eq!(
            uri(&vms[0]),
            json!(format!("http://{}.blob.core.windows.net/vhds/web-vm1-os.vhd", accounts[0]))
        );
        assert_eq!(
            uri(&vms[1]),
            json!(format!("http://{}.blob.core.windows.net/vhds/web-vm2-os.vhd", accounts[1]))
        );
        assert_eq!(
            uri(&vms[2]),
            json!(format!("http://{}.blob.core.windows.net/vhds/web-vm3-os.vhd", accounts[0]))
        );
        let data = &vms[0]["properties"]["storageProfile"]["dataDisks"][0];
        assert_eq!(data["name"], "dataDisk1");
        assert_eq!(data["lun"], 0);
        assert!(data["vhd"]["uri"].as_str().unwrap().ends_with("/vhds/web-vm1-dataDisk1.vhd"));
        assert_eq!(
            out.get("availabilitySet")[0]["properties"].get("managed"),
            None
        );
    }

    fn biz(password: &str) -> Value {
        let mut settings = windows();
        settings["vmCount"] = json!(1);
        settings["namePrefix"] = json!("biz");
        settings["computerNamePrefix"] = json!("biz");
        settings["adminPassword"] = json!(password);
        settings["storageAccounts"] = json!({ "managed": false, "count": 1 });
        settings
    }

    #[test]
    fn each_group_gets_its_own_accounts_and_indices() {
        let groups = [prepare(&windows()), prepare(&biz("P@ss1"))];
        assert!(groups.iter().all(|group| validate(group, RULES).is_empty()));
        let out = VirtualMachine.transform(&groups, &context()).unwrap();

        let accounts = out.get("storageAccounts");
        assert_eq!(accounts.len(), 1);
        let account = text(&accounts[0], "name");
        assert_eq!(account, storage::account_name(&context(), "biz", storage::STORAGE, 0));
        assert_eq!(out.get("diagnosticStorageAccounts").len(), 2);

        let vms = out.get("virtualMachines");
        assert_eq!(vms.len(), 4);
        let biz = &vms[3]["properties"];
        assert_eq!(biz["osProfile"]["computerName"], "biz-vm1");
        assert_eq!(
            biz["storageProfile"]["osDisk"]["vhd"]["uri"],
            json!(format!("http://{account}.blob.core.windows.net/vhds/biz-vm1-os.vhd"))
        );
        assert!(vms[0]["properties"]["storageProfile"]["osDisk"]["vhd"].is_null());
    }

    #[test]
    fn groups_with_different_secrets_are_refused() {
        let groups = [prepare(&windows()), prepare(&biz("BBB-pass2"))];
        let err = VirtualMachine.transform(&groups, &context()).unwrap_err();
        assert!(matches!(err, TransformError::ConflictingSecret));
    }

    #[test]
    fn vm_count_is_bounded() {
        let mut settings = windows();
        settings["vmCount"] = json!(MAX_VM_COUNT);
        assert!(validate(&prepare(&settings), RULES).is_empty());

        for count in [json!(0), json!(MAX_VM_COUNT + 1), json!(u64::MAX)] {
            settings["vmCount"] = count;
            let errors = validate(&prepare(&settings), RULES);
            let names: Vec<_> = errors.iter().map(|error| error.name.as_str()).collect();
            assert_eq!(names, vec![".vmCount"]);
        }
    }
}
