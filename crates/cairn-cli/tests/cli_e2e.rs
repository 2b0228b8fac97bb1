mod support;

use serde_json::{json, Value};
use std::fs;
use support::{cairn, parameters, stderr, stdout, write_json};
use tempfile::tempdir;

fn load_balancer() -> Value {
    json!({
        "name": "lb1",
        "frontendIPConfigurations": [{ "name": "fe1", "loadBalancerType": "Public" }],
        "backendPools": [{ "name": "bp1" }],
        "probes": [{ "name": "p1", "port": 80, "protocol": "Tcp" }],
        "loadBalancingRules": [{
            "name": "r1",
            "frontendIPConfigurationName": "fe1",
            "backendPoolName": "bp1",
            "frontendPort": 80,
            "backendPort": 80,
            "protocol": "Tcp",
            "probeName": "p1"
        }]
    })
}

fn windows_vms() -> Value {
    json!({
        "vmCount": 2,
        "namePrefix": "web",
        "computerNamePrefix": "web",
        "adminPassword": "P@ss1",
        "virtualNetwork": { "name": "vnet" },
        "osDisk": { "osType": "windows" },
        "nics": [{ "subnetName": "web" }]
    })
}

#[test]
fn kinds_lists_every_settings_key() {
    let output = cairn(&["kinds"]);
    assert!(output.status.success());
    let listed = stdout(&output);
    assert!(listed.contains("loadBalancerSettings"));
    assert!(listed.contains("virtualMachinesExtensionSettings"));
    assert_eq!(listed.lines().count(), 7);
}

#[test]
fn validate_accepts_clean_parameters() {
    let dir = tempdir().unwrap();
    let path = write_json(
        dir.path(),
        "lb.json",
        &parameters("loadBalancerSettings", load_balancer()),
    );
    let output = cairn(&["validate", "-f", path.to_str().unwrap()]);
    assert!(output.status.success(), "{}", stderr(&output));
    assert_eq!(stdout(&output).trim(), "ok");
}

#[test]
fn validate_reports_errors_as_json() {
    let dir = tempdir().unwrap();
    let mut settings = load_balancer();
    settings["loadBalancingRules"][0]["backendPoolName"] = json!("missing");
    let path = write_json(
        dir.path(),
        "lb.json",
        &parameters("loadBalancerSettings", settings),
    );
    let output = cairn(&["validate", "-f", path.to_str().unwrap()]);
    assert!(!output.status.success());
    let errors = stderr(&output);
    assert!(
        errors.contains(r#""name":"loadBalancerSettings.loadBalancingRules[0].backendPoolName""#),
        "{errors}"
    );
}

#[test]
fn transform_writes_deployment_parameters() {
    let dir = tempdir().unwrap();
    let path = write_json(
        dir.path(),
        "vms.json",
        &parameters("virtualMachinesSettings", windows_vms()),
    );
    let out = dir.path().join("out.json");
    let output = cairn(&[
        "transform",
        "-f",
        path.to_str().unwrap(),
        "-o",
        out.to_str().unwrap(),
    ]);
    assert!(output.status.success(), "{}", stderr(&output));

    let raw = fs::read_to_string(&out).unwrap();
    let document: Value = serde_json::from_str(&raw).unwrap();
    assert_eq!(document["contentVersion"], "1.0.0.0");
    let parameters = &document["parameters"];
    let vms = parameters["virtualMachines"]["value"].as_array().unwrap();
    assert_eq!(vms.len(), 2);
    assert_eq!(vms[1]["name"], "web-vm2");
    assert_eq!(parameters["nics"]["value"][0]["name"], "web-vm1-nic1");
    assert_eq!(parameters["secret"]["value"], "P@ss1");
    assert_eq!(raw.matches("P@ss1").count(), 1);
}

#[test]
fn transform_reads_yaml_and_override_defaults() {
    let dir = tempdir().unwrap();
    let path = dir.path().join("vnet.yaml");
    fs::write(
        &path,
        r#"
parameters:
  buildingBlockSettings:
    value:
      subscriptionId: 00000000-0000-1000-8000-000000000000
      resourceGroupName: test-rg
      location: westus
  virtualNetworkSettings:
    value:
      name: vnet
"#,
    )
    .unwrap();
    let defaults = write_json(
        dir.path(),
        "defaults.json",
        &json!({ "virtualNetworkSettings": { "dnsServers": ["10.0.0.4"] } }),
    );
    let output = cairn(&[
        "transform",
        "-f",
        path.to_str().unwrap(),
        "--defaults",
        defaults.to_str().unwrap(),
    ]);
    assert!(output.status.success(), "{}", stderr(&output));
    let document: Value = serde_json::from_str(&stdout(&output)).unwrap();
    let vnet = &document["parameters"]["virtualNetworks"]["value"][0];
    assert_eq!(vnet["properties"]["dhcpOptions"]["dnsServers"], json!(["10.0.0.4"]));
}

#[test]
fn unknown_settings_key_fails() {
    let dir = tempdir().unwrap();
    let path = write_json(
        dir.path(),
        "bad.json",
        &parameters("routeTableSettings", json!({})),
    );
    let output = cairn(&["validate", "-f", path.to_str().unwrap()]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains("unknown settings key routeTableSettings"));
}

#[test]
fn bad_building_block_fails_before_validation() {
    let dir = tempdir().unwrap();
    let mut document = parameters("loadBalancerSettings", load_balancer());
    document["parameters"]["buildingBlockSettings"]["value"]["subscriptionId"] = json!("nope");
    let path = write_json(dir.path(), "lb.json", &document);
    let output = cairn(&["transform", "-f", path.to_str().unwrap()]);
    assert!(!output.status.success());
    assert!(stderr(&output).contains(r#""name":".subscriptionId""#));
}
